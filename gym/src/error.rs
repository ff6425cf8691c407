use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("unknown environment id `{0}`")]
    UnknownEnv(String),
    #[error("action {action} is outside the action space of size {n}")]
    InvalidAction { action: i64, n: i64 },
    #[error("step called before reset")]
    NeedsReset,
    #[error("episode is over, call reset before stepping again")]
    EpisodeOver,
    #[error("environment check failed: {0}")]
    Check(String),
    #[error(transparent)]
    Tch(#[from] tch::TchError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
