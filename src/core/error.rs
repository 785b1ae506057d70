use std::path::PathBuf;

use thiserror::Error;

/// Error taxonomy for the whole tool. Every fatal path maps to exactly one
/// variant so the top-level handler can print a single-line diagnosis.
#[derive(Error, Debug)]
pub enum DevenvError {
    #[error("No project configuration found. Run 'devenv init' to create one")]
    ConfigNotFound,

    #[error("Failed to parse {path}: {source}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid configuration: {0}")]
    Validation(String),

    #[error(
        "Unknown modules: {}. Available modules: {}",
        requested.join(", "),
        available.join(", ")
    )]
    UnknownModules {
        requested: Vec<String>,
        available: Vec<String>,
    },

    #[error("Docker is not running or not available: {0}. Please start Docker and try again")]
    DockerUnavailable(String),

    #[error(
        "The 'devcontainer' CLI is not installed. Install it with: npm install -g @devcontainers/cli"
    )]
    ExternalToolMissing,

    #[error(
        "A container for branch '{branch}' already exists. Use 'devenv switch {branch}' to connect to it"
    )]
    ContainerExists { branch: String },

    #[error("'{command}' failed with exit code {code}")]
    Subprocess { command: String, code: i32 },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Docker error: {0}")]
    Docker(#[from] bollard::errors::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DevenvError>;
