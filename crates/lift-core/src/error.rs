//! Error types for Lift

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("State '{state}' does not exist on variable '{variable}'")]
    InvalidEvidence { variable: String, state: String },

    #[error("Type mismatch: {0}")]
    TypeMismatch(String),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Training error: {0}")]
    Training(String),

    #[error("Cannot decode evidence token '{0}'")]
    Decode(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Cluster resolution error: {0}")]
    ClusterResolution(String),

    #[error("Inference error: {0}")]
    Inference(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
