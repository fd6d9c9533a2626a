use thiserror::Error;

/// Failures of a single prediction request. Every variant is terminal and is
/// reported inside the response envelope, never as a transport error.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PredictError {
    /// A field parsed but violates its domain rule.
    #[error("{0}")]
    Validation(String),

    /// Missing key, wrong type or unparseable value.
    #[error("{0}")]
    Malformed(String),

    #[error("Model not loaded. Please check the server logs.")]
    ModelUnavailable,

    #[error("{0}")]
    Inference(String),
}

impl PredictError {
    pub fn malformed(message: impl Into<String>) -> Self {
        PredictError::Malformed(message.into())
    }

    /// Message shown to the caller. Processing faults carry the schema's
    /// prefix (`Processing Error`, `System Error`), the others stand alone.
    pub fn client_message(&self, prefix: &str) -> String {
        match self {
            PredictError::Validation(msg) => msg.clone(),
            PredictError::ModelUnavailable => self.to_string(),
            PredictError::Malformed(msg) | PredictError::Inference(msg) => {
                format!("{}: {}", prefix, msg)
            }
        }
    }
}

pub type PredictResult<T> = Result<T, PredictError>;
