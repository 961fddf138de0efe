use thiserror::Error;

#[derive(Error, Debug)]
pub enum PredictorError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("unavailable: {0}")]
    Unavailable(String),

    #[error("other error: {0}")]
    Other(String),
}

pub type PredictorResult<T> = Result<T, PredictorError>;

impl From<reqwest::Error> for PredictorError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            PredictorError::Unavailable(err.to_string())
        } else {
            PredictorError::Other(err.to_string())
        }
    }
}

impl From<serde_json::Error> for PredictorError {
    fn from(err: serde_json::Error) -> Self {
        PredictorError::Other(format!("deserialize failure: {err}"))
    }
}
