use std::{
    panic::{self, AssertUnwindSafe},
    sync::{Arc, Mutex, MutexGuard},
    thread,
};

use crate::{
    command::CommandSender,
    config::FollowConfig,
    detect::{Detections, Detector, DistanceMetric, TargetPoint},
    error::{Result, TelloError},
    kalman::Kalman2d,
    rc::{RawAxes, VelocityCommand},
    slot::Latest,
    video::Frame,
    worker::CyclicWorker,
};

/// Estimators of one tracked target. Created on the first detection and kept
/// for the controller's lifetime, misses never discard them.
#[derive(Debug, Clone)]
pub struct TrackState {
    screen: Kalman2d,
    distance: Kalman2d,
    center: (f32, f32),
}

impl TrackState {
    fn new(config: &FollowConfig, frame_size: (u32, u32), size_metric: f32) -> Self {
        let center = ((frame_size.0 / 2) as f32, (frame_size.1 / 2) as f32);
        let mut screen = Kalman2d::new(config.kalman);
        screen.init(center.0, center.1);
        // x is a dummy, only the size channel is smoothed
        let mut distance = Kalman2d::new(config.kalman);
        distance.init(1.0, size_metric);
        Self {
            screen,
            distance,
            center,
        }
    }
}

/// One controller cycle, without threads. The worker in [`FollowController`]
/// drives it; tests call it directly.
pub struct FollowCore {
    config: FollowConfig,
    metric: DistanceMetric,
    detector: Box<dyn Detector>,
    track: Option<TrackState>,
    cycle: u64,
    last_detection: Option<Detections>,
}

impl FollowCore {
    pub fn new(config: FollowConfig, metric: DistanceMetric, detector: Box<dyn Detector>) -> Self {
        Self {
            config,
            metric,
            detector,
            track: None,
            cycle: 1,
            last_detection: None,
        }
    }

    pub fn config(&self) -> &FollowConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut FollowConfig {
        &mut self.config
    }

    pub fn is_tracking(&self) -> bool {
        self.track.is_some()
    }

    pub fn last_detection(&self) -> Option<&Detections> {
        self.last_detection.as_ref()
    }

    /// Runs one tick. Returns the command to send, or `None` when this tick
    /// isn't a detector tick or there is no frame yet.
    pub fn cycle(&mut self, frame: Option<&Frame>) -> Option<VelocityCommand> {
        let method_name = "follow_cycle";
        let n = self.cycle;
        self.cycle = self.cycle.wrapping_add(1);
        if n % self.config.cycle_divisor.max(1) != 0 {
            return None;
        }
        let frame = frame?;

        // a panic counts as a detector failure
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.detector.detect(frame)))
            .unwrap_or_else(|_| Err(TelloError::Detector("detector panicked".to_owned())));
        let detections = match outcome {
            Ok(d) => d,
            Err(e) => {
                tracing::warn!(method_name, cycle = n, "detector failed, holding: {e}");
                self.last_detection = None;
                return Some(VelocityCommand::hold());
            }
        };
        let Some(target) = detections.target_point(self.metric, frame.size()) else {
            tracing::debug!(method_name, cycle = n, "no detection, holding");
            self.last_detection = None;
            return Some(VelocityCommand::hold());
        };
        self.last_detection = Some(detections);

        let cmd = self.steer(target, frame.size());
        tracing::debug!(method_name, cycle = n, "{cmd}");
        Some(cmd)
    }

    fn steer(&mut self, target: TargetPoint, frame_size: (u32, u32)) -> VelocityCommand {
        let cfg = &self.config;
        let track = self.track.get_or_insert_with(|| {
            tracing::info!(method_name = "steer", size = target.size, "target acquired");
            TrackState::new(cfg, frame_size, target.size)
        });

        let (_, cp) = track.screen.predict_and_update(target.x, target.y, true);
        // positive: target right of / above the image centre
        let horizontal = ((cp.x - track.center.0) / cfg.horizontal_scale) as i32;
        let vertical = ((track.center.1 - cp.y) / cfg.vertical_scale) as i32;

        let mut distance = 0;
        if cfg.distance {
            let (_, dp) = track.distance.predict_and_update(1.0, target.size, true);
            // positive: target closer than the setpoint
            distance = ((dp.y - cfg.distance_setpoint) / cfg.distance_scale) as i32;
        }

        let mut axes = RawAxes {
            forward_backward: -distance,
            ..RawAxes::default()
        };
        // never strafe and turn at once; rotation wins when both are on
        if cfg.horizontal {
            axes.left_right = horizontal;
            axes.yaw = 0;
        }
        if cfg.rotation {
            axes.left_right = 0;
            axes.yaw = horizontal;
        }
        if cfg.vertical {
            axes.up_down = vertical;
        }
        axes.limit(cfg.rc_limit)
    }
}

/// Keeps a detected object centred by streaming `rc` commands.
pub struct FollowController {
    core: Arc<Mutex<FollowCore>>,
    inbox: Arc<Latest<Frame>>,
    commands: Arc<dyn CommandSender>,
    worker: CyclicWorker,
}

impl FollowController {
    pub fn new(
        config: FollowConfig,
        metric: DistanceMetric,
        detector: Box<dyn Detector>,
        commands: Arc<dyn CommandSender>,
    ) -> Self {
        Self {
            core: Arc::new(Mutex::new(FollowCore::new(config, metric, detector))),
            inbox: Arc::new(Latest::new()),
            commands,
            worker: CyclicWorker::new("tello-follow"),
        }
    }

    fn core(&self) -> MutexGuard<'_, FollowCore> {
        self.core.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Hands over the newest camera frame.
    pub fn set_image(&self, frame: Frame) {
        self.inbox.publish(frame);
    }

    pub fn set_tracking(&self, horizontal: bool, vertical: bool, distance: bool, rotation: bool) {
        let mut core = self.core();
        let cfg = core.config_mut();
        cfg.horizontal = horizontal;
        cfg.vertical = vertical;
        cfg.distance = distance;
        cfg.rotation = rotation;
    }

    pub fn set_distance_setpoint(&self, setpoint: f32) {
        self.core().config_mut().distance_setpoint = setpoint;
    }

    pub fn set_cycle_divisor(&self, divisor: u64) {
        self.core().config_mut().cycle_divisor = divisor.max(1);
    }

    pub fn is_tracking(&self) -> bool {
        self.core().is_tracking()
    }

    pub fn last_detection(&self) -> Option<Detections> {
        self.core().last_detection().cloned()
    }

    pub fn start(&self) -> Result<()> {
        let core = self.core.clone();
        let inbox = self.inbox.clone();
        let commands = self.commands.clone();
        let tick = self.core().config().tick;
        self.worker.start(move || {
            thread::sleep(tick);
            let frame = inbox.get();
            let cmd = core
                .lock()
                .unwrap_or_else(|p| p.into_inner())
                .cycle(frame.as_deref());
            if let Some(cmd) = cmd {
                commands.send(&cmd.to_string());
            }
            Ok(())
        })
    }

    pub fn stop(&self) {
        self.worker.stop();
    }

    pub fn join(&self) {
        self.worker.join();
    }
}
