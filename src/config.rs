use std::{fmt, time::Duration};

use crate::{env, kalman::KalmanConfig};

/// Host and port of one of the three tello channels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            host: host.to_owned(),
            port,
        }
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Where commands are sent.
    pub command: Endpoint,
    /// Local bind address of the command socket, replies arrive here.
    pub command_bind: Endpoint,
    /// Local bind address of the unsolicited state stream.
    pub telemetry: Endpoint,
    /// Local address the vehicle pushes the video stream to.
    pub video: Endpoint,
    pub image_size: (u32, u32),
    pub tick: Duration,
    pub reply_timeout: Duration,
    pub read_timeout: Duration,
    pub keepalive_period: u64,
    pub connect_retries: u32,
    /// Treat the handshake as answered, for running without a vehicle.
    pub offline: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            command: Endpoint::new(&env::ENV_TELLO_ADDR, *env::ENV_TELLO_CMD_PORT),
            command_bind: Endpoint::new("0.0.0.0", *env::ENV_TELLO_LOCAL_CMD_PORT),
            telemetry: Endpoint::new("0.0.0.0", *env::ENV_TELLO_STATE_PORT),
            video: Endpoint::new("0.0.0.0", *env::ENV_TELLO_VIDEO_PORT),
            image_size: (*env::ENV_TELLO_VIDEO_WIDTH, *env::ENV_TELLO_VIDEO_HEIGHT),
            tick: Duration::from_millis(*env::ENV_TELLO_TICK_MS),
            reply_timeout: Duration::from_millis(*env::ENV_TELLO_REPLY_TIMEOUT_MS),
            read_timeout: Duration::from_millis(*env::ENV_TELLO_READ_TIMEOUT_MS),
            keepalive_period: *env::ENV_TELLO_KEEPALIVE_TICKS,
            connect_retries: *env::ENV_TELLO_CONNECT_RETRIES,
            offline: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct FollowConfig {
    pub horizontal: bool,
    pub vertical: bool,
    pub distance: bool,
    pub rotation: bool,
    /// Distance metric the vehicle tries to hold, in detector units.
    pub distance_setpoint: f32,
    pub horizontal_scale: f32,
    pub vertical_scale: f32,
    pub distance_scale: f32,
    /// The detector runs on every Nth controller tick.
    pub cycle_divisor: u64,
    pub tick: Duration,
    pub rc_limit: i32,
    pub kalman: KalmanConfig,
}

impl Default for FollowConfig {
    fn default() -> Self {
        Self {
            horizontal: false,
            vertical: true,
            distance: true,
            rotation: true,
            distance_setpoint: 100.0,
            horizontal_scale: 6.0,
            vertical_scale: 4.0,
            distance_scale: 2.0,
            cycle_divisor: 10,
            tick: Duration::from_millis(5),
            rc_limit: *env::ENV_TELLO_RC_LIMIT,
            kalman: KalmanConfig::default(),
        }
    }
}
