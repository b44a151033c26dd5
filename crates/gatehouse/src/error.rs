use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatehouseError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Database error: {0}")]
    Database(#[from] crate::db::DatabaseError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config JSON: {0}")]
    ParseJson(#[from] serde_json::Error),

    #[error("Config validation failed: {message}")]
    Validation { message: String },

    #[error("Schema validation failed: {errors}")]
    SchemaValidation { errors: String },

    #[error("Secret reference '{reference}' could not be resolved: {reason}")]
    UnresolvedSecret { reference: String, reason: String },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to create directory '{path}': {source}")]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to read file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to decode photo data: {0}")]
    DecodePhoto(String),

    #[error("Failed to process image: {0}")]
    ProcessImage(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    #[error("Failed to spawn worker: {0}")]
    SpawnFailed(String),

    #[error("Work queue channel closed unexpectedly")]
    ChannelClosed,

    #[error("Job '{0}' not found")]
    JobNotFound(String),

    #[error("Job payload could not be serialized: {0}")]
    InvalidPayload(String),
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("Failed to spawn agent process '{program}': {source}")]
    Spawn {
        program: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Agent process exceeded the {limit_secs}s wall-clock budget")]
    Timeout { limit_secs: u64 },

    #[error("IO error during agent execution: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, GatehouseError>;
