use reqwest::Error as ReqwestError;
use serde_json::Error as JsonError;
use std::io::Error as IoError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Network error: {0}")]
    Network(#[from] ReqwestError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] JsonError),

    #[error("IO error: {0}")]
    Io(#[from] IoError),

    #[error("Unknown provider: {0}")]
    UnknownProvider(String),

    #[error("Pipeline aborted at stage '{stage}': {message}")]
    PipelineAbort { stage: &'static str, message: String },

    #[error("Crypto error: {0}")]
    Crypto(String),

    #[error("Integrity check failed: reconstructed plaintext does not match stored digest")]
    Integrity,

    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl From<rsa::Error> for OrchestratorError {
    fn from(err: rsa::Error) -> Self {
        OrchestratorError::Crypto(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
