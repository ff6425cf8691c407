use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("model file {0} does not exist")]
    MissingModel(String),
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Tch(#[from] tch::TchError),
}

pub type Result<T> = std::result::Result<T, Error>;
