use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelloError {
    #[error("transport error: {0}")]
    Transport(#[from] std::io::Error),
    #[error("can't decode payload: {0}")]
    Decode(String),
    #[error("detector failure: {0}")]
    Detector(String),
    #[error("could not connect to tello after {attempts} attempts")]
    NotConnected { attempts: u32 },
    #[error("worker {0} was stopped and can't be restarted")]
    WorkerStopped(String),
}

pub type Result<T> = std::result::Result<T, TelloError>;

impl TelloError {
    /// Read timeouts on a socket with a read deadline are routine, not failures.
    pub(crate) fn is_timeout(&self) -> bool {
        match self {
            TelloError::Transport(e) => matches!(
                e.kind(),
                std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
            ),
            _ => false,
        }
    }
}
