pub mod command;
pub mod config;
pub mod detect;
pub(crate) mod env;
pub mod error;
pub mod follow;
pub mod kalman;
pub mod rc;
pub mod scheduler;
pub mod session;
pub mod slot;
pub mod telemetry;
pub(crate) mod utils;
pub mod video;
pub mod worker;

#[macro_use]
extern crate lazy_static;

pub use command::{CommandLink, CommandSender, Reply};
pub use config::{Endpoint, FollowConfig, SessionConfig};
pub use detect::{BoundingBox, Detections, Detector, DistanceMetric, TargetPoint};
pub use error::{Result, TelloError};
pub use follow::{FollowController, FollowCore};
pub use kalman::{Kalman2d, KalmanConfig};
pub use rc::{clamp_axis, RawAxes, VelocityCommand};
pub use scheduler::{CommandScheduler, PeriodicEntry};
pub use session::TelloSession;
pub use telemetry::{TelemetryFrame, TelemetryLink};
pub use video::{ChannelSource, FfmpegSource, Frame, FrameSource, VideoLink};
pub use worker::CyclicWorker;
