use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum LimiterError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}
