use thiserror::Error;

pub type Result<T> = std::result::Result<T, StormFlowError>;

#[derive(Debug, Error)]
pub enum StormFlowError {
    #[error("unknown node `{0}` in graph")]
    UnknownNode(String),
    #[error("invalid transition from `{from}` to `{to}`")]
    InvalidTransition { from: String, to: String },
    #[error("maximum steps {0} exceeded")]
    MaxStepsExceeded(u32),
    #[error("provider error: {0}")]
    Provider(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("image error: {0}")]
    Image(String),
    #[error("checkpoint error: {0}")]
    Checkpoint(String),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<serde_json::Error> for StormFlowError {
    fn from(error: serde_json::Error) -> Self {
        StormFlowError::Parse(error.to_string())
    }
}
