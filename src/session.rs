use std::{sync::Arc, time::Duration};

use crate::{
    command::{CommandLink, CommandSender, Reply},
    config::SessionConfig,
    error::{Result, TelloError},
    scheduler::{CommandScheduler, PeriodicEntry, KEEPALIVE_CMD},
    telemetry::{TelemetryFrame, TelemetryLink},
    video::{FfmpegSource, Frame, FrameSource, VideoLink},
};

/// Command, telemetry and video channels of one vehicle behind a single
/// connect / start / stop lifecycle.
pub struct TelloSession {
    config: SessionConfig,
    link: Arc<CommandLink>,
    telemetry: TelemetryLink,
    scheduler: CommandScheduler,
    video: VideoLink,
}

impl TelloSession {
    /// Binds the sockets. Video is decoded through `ffmpeg`, spawned by
    /// [`TelloSession::start_video`].
    pub fn new(config: SessionConfig) -> Result<Self> {
        let source = FfmpegSource::new(config.video.clone(), config.image_size);
        Self::with_video_source(config, Box::new(source))
    }

    pub fn with_video_source(config: SessionConfig, source: Box<dyn FrameSource>) -> Result<Self> {
        let link = Arc::new(CommandLink::bind(
            &config.command_bind,
            &config.command,
            config.read_timeout,
        )?);
        let telemetry = TelemetryLink::bind(&config.telemetry, config.read_timeout)?;
        let scheduler = CommandScheduler::new(
            link.clone(),
            config.tick,
            config.reply_timeout,
            config.keepalive_period,
        );
        let video = VideoLink::new(source, config.image_size, link.clone());
        Ok(Self {
            config,
            link,
            telemetry,
            scheduler,
            video,
        })
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Shared handle for components that issue their own commands.
    pub fn commands(&self) -> Arc<dyn CommandSender> {
        self.link.clone()
    }

    /// Starts the reply listener and sends the handshake until the vehicle
    /// answers, giving up after `connect_retries` attempts.
    pub fn connect(&self) -> Result<()> {
        let method_name = "connect";
        self.link.start()?;
        if self.config.offline {
            tracing::info!(method_name, "offline mode, handshake skipped");
            return Ok(());
        }
        let attempts = self.config.connect_retries.max(1);
        for attempt in 1..=attempts {
            tracing::info!(method_name, attempt, "waiting to connect to tello...");
            if let Reply::Text(reply) = self.link.send_and_wait(KEEPALIVE_CMD, self.config.reply_timeout) {
                tracing::info!(method_name, reply = reply.trim_end(), "connected to tello");
                return Ok(());
            }
        }
        tracing::error!(method_name, attempts, "tello does not answer");
        Err(TelloError::NotConnected { attempts })
    }

    /// Starts the periodic commands and the telemetry listener.
    pub fn start(&self) -> Result<()> {
        self.link.start()?;
        self.scheduler.start()?;
        self.telemetry.start()
    }

    /// Starts the decoder and the stream. Once stopped, video can't be restarted
    /// on the same session.
    pub fn start_video(&self) -> Result<()> {
        self.video.start()
    }

    pub fn stop_video(&self) {
        self.video.stop();
    }

    /// Tears down in order: scheduler, telemetry, video (after `streamoff`),
    /// then the command listener. Each loop is joined before the next one
    /// stops, so nothing reaches the wire after `streamoff`.
    pub fn stop(&self) {
        tracing::info!(method_name = "stop", "closing tello session");
        self.scheduler.stop();
        self.scheduler.join();
        self.telemetry.stop();
        self.telemetry.join();
        self.video.stop();
        self.video.join();
        self.link.stop();
        self.link.join();
    }

    pub fn send_blocking(&self, cmd: &str, timeout: Duration) -> Reply {
        self.link.send_and_wait(cmd, timeout)
    }

    pub fn send_async(&self, cmd: &str) {
        self.link.send(cmd);
    }

    pub fn register_periodic(&self, cmd: &str, period_ticks: u64, label: &str) {
        self.scheduler.register(cmd, period_ticks, label);
    }

    pub fn periodic_entries(&self) -> Vec<PeriodicEntry> {
        self.scheduler.entries()
    }

    pub fn latest_telemetry(&self) -> Arc<TelemetryFrame> {
        self.telemetry.latest()
    }

    /// Blocks until a new frame arrives, `None` after the video is stopped.
    pub fn latest_frame(&self) -> Option<Frame> {
        self.video.get_frame()
    }

    pub fn latest_frame_timeout(&self, timeout: Duration) -> Option<Frame> {
        self.video.get_frame_timeout(timeout)
    }

    pub fn try_latest_frame(&self) -> Option<Frame> {
        self.video.try_frame()
    }

    pub fn takeoff(&self) {
        self.send_async("takeoff");
    }

    pub fn land(&self) {
        self.send_async("land");
    }

    pub fn up(&self, cm: u32) {
        self.send_async(&format!("up {cm}"));
    }

    pub fn down(&self, cm: u32) {
        self.send_async(&format!("down {cm}"));
    }

    pub fn cw(&self, deg: u32) {
        self.send_async(&format!("cw {deg}"));
    }

    pub fn ccw(&self, deg: u32) {
        self.send_async(&format!("ccw {deg}"));
    }
}
