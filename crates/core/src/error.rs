use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("invalid data: {0}")]
    InvalidData(String),

    #[error("invalid options: {0}")]
    InvalidOptions(String),

    #[error("missing required field `{field}` on {entity}")]
    MissingField { entity: String, field: &'static str },
}

impl From<serde_json::Error> for CoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}
