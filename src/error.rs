//! Error types for the gateway deployment engine.
//!
//! This module provides the error hierarchy for every phase of a deployment:
//! configuration, control-plane access, certificate and asset preparation,
//! template rendering and external command execution.

use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the deployment engine.
#[derive(Debug, Error)]
pub enum DeployError {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Configuration merge errors.
    #[error("{0}")]
    Merge(#[from] MergeError),

    /// Control-plane API errors.
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    /// Certificate errors.
    #[error("{0}")]
    Certificate(#[from] CertificateError),

    /// Cloud lua module errors.
    #[error("{0}")]
    Asset(#[from] AssetError),

    /// Template rendering errors.
    #[error("{0}")]
    Template(#[from] TemplateError),

    /// External command errors.
    #[error("{0}")]
    Command(#[from] CommandError),

    /// A pre-run step failed; the step prefix identifies which one.
    #[error("{step}: {source}")]
    Prepare {
        /// The step that failed.
        step: PrepareStep,
        /// The underlying failure.
        source: Box<DeployError>,
    },

    /// The run was interrupted before an external tool was launched.
    #[error("operation cancelled")]
    Cancelled,

    /// IO errors.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

/// The steps of the per-target pre-run phase.
///
/// The `Display` text of each step is the exact prefix placed in front of
/// the underlying error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrepareStep {
    /// Resolving the default control plane for the active profile.
    GetDefaultCluster,
    /// Ensuring the certificate triple exists on disk.
    PrepareCertificate,
    /// Downloading and extracting the cloud lua module.
    DownloadModule,
    /// Fetching the startup configuration template.
    GetStartupConfig,
    /// Rendering the startup configuration template.
    RenderConfig,
    /// Merging the operator override with the essential configuration.
    MergeConfig,
    /// Writing the merged configuration to disk.
    SaveConfig,
    /// Creating the cluster namespace.
    CreateNamespace,
    /// Creating the cluster secret holding the certificates.
    CreateSecret,
    /// Creating the cluster config map holding the module files.
    CreateConfigMap,
    /// Resolving or generating the instance identifier.
    PrepareInstanceId,
}

impl fmt::Display for PrepareStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::GetDefaultCluster => "Failed to get default cluster",
            Self::PrepareCertificate => "Failed to prepare certificate",
            Self::DownloadModule => "Failed to download cloud lua module",
            Self::GetStartupConfig => "Failed to get startup config template",
            Self::RenderConfig => "Failed to render startup config",
            Self::MergeConfig => "Failed to merge configuration",
            Self::SaveConfig => "Failed to save configuration",
            Self::CreateNamespace => "Failed to create namespace",
            Self::CreateSecret => "Failed to create secret",
            Self::CreateConfigMap => "Failed to create config map",
            Self::PrepareInstanceId => "Failed to prepare instance id",
        };
        f.write_str(text)
    }
}

/// Configuration-related errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A configuration file could not be parsed.
    #[error("Failed to parse configuration: {message}")]
    ParseError {
        /// Description of the parse error.
        message: String,
        /// Optional source location.
        location: Option<String>,
    },

    /// A required setting is missing.
    #[error("Missing setting: {name}")]
    MissingSetting {
        /// Name of the missing setting.
        name: String,
    },

    /// The requested profile does not exist.
    #[error("Profile not found: {name}")]
    ProfileNotFound {
        /// Name of the missing profile.
        name: String,
    },

    /// The home directory cannot be determined.
    #[error("Cannot determine home directory")]
    NoHomeDirectory,

    /// An option value is invalid.
    #[error("Invalid option {option}: {message}")]
    InvalidOption {
        /// Option name.
        option: String,
        /// What is wrong with it.
        message: String,
    },
}

/// Errors raised while merging two YAML documents.
#[derive(Debug, Error)]
pub enum MergeError {
    /// The operator override document is not valid YAML.
    #[error("failed to parse override configuration: {message}")]
    Override {
        /// Parser message.
        message: String,
    },

    /// The essential (default) document is not valid YAML.
    #[error("failed to parse essential configuration: {message}")]
    Essential {
        /// Parser message.
        message: String,
    },

    /// The merged tree could not be serialized.
    #[error("failed to serialize configuration: {message}")]
    Serialize {
        /// Serializer message.
        message: String,
    },
}

/// Control-plane API errors.
#[derive(Debug, Error)]
pub enum ControlPlaneError {
    /// Authentication failed.
    #[error("authentication failed: {message}")]
    AuthenticationFailed {
        /// Description of the auth failure.
        message: String,
    },

    /// API request failed.
    #[error("API request failed: {status} - {message}")]
    ApiRequestFailed {
        /// HTTP status code.
        status: u16,
        /// Error message from the API.
        message: String,
    },

    /// Network error.
    #[error("network error communicating with the control plane: {message}")]
    NetworkError {
        /// Description of the network error.
        message: String,
    },

    /// Invalid response from the API.
    #[error("invalid response from the control plane: {message}")]
    InvalidResponse {
        /// Description of the response issue.
        message: String,
    },

    /// No control plane is available to the current user.
    #[error("no control plane found for the current user")]
    NoControlPlane,
}

/// Certificate preparation errors.
#[derive(Debug, Error)]
pub enum CertificateError {
    /// The cached certificate exists but cannot be parsed.
    #[error("check certificate availability: {path}: {message}")]
    Unreadable {
        /// Path of the cached certificate.
        path: PathBuf,
        /// Parser message.
        message: String,
    },

    /// The certificate bundle could not be fetched.
    #[error("failed to fetch certificate bundle: {0}")]
    Fetch(#[source] ControlPlaneError),

    /// The certificate files could not be written.
    #[error("failed to persist certificate files to {path}: {source}")]
    Persist {
        /// Target path.
        path: PathBuf,
        /// IO failure.
        source: std::io::Error,
    },
}

/// Cloud lua module errors.
#[derive(Debug, Error)]
pub enum AssetError {
    /// The archive could not be downloaded.
    #[error("could not reach control plane for module archive: {0}")]
    Download(#[source] ControlPlaneError),

    /// The archive could not be decompressed or unpacked.
    #[error("module archive is corrupt: {message}")]
    Corrupt {
        /// Description of the corruption.
        message: String,
    },

    /// The extracted tree could not be written.
    #[error("failed to extract module archive to {path}: {source}")]
    Extract {
        /// Target path.
        path: PathBuf,
        /// IO failure.
        source: std::io::Error,
    },
}

/// Template rendering errors.
#[derive(Debug, Error)]
pub enum TemplateError {
    /// The template references a field that does not exist.
    #[error("unknown placeholder '{name}' at offset {offset}")]
    UnknownPlaceholder {
        /// Placeholder name.
        name: String,
        /// Byte offset of the action.
        offset: usize,
    },

    /// An action was opened but never closed.
    #[error("malformed template: unclosed action at offset {offset}")]
    Malformed {
        /// Byte offset of the unclosed action.
        offset: usize,
    },

    /// An action other than a plain field reference.
    #[error("unsupported template action '{action}' at offset {offset}")]
    UnsupportedAction {
        /// The action text.
        action: String,
        /// Byte offset of the action.
        offset: usize,
    },
}

/// External command errors.
#[derive(Debug, Error)]
pub enum CommandError {
    /// The program could not be started.
    #[error("failed to launch {program}: {source}")]
    Launch {
        /// Program name.
        program: String,
        /// IO failure.
        source: std::io::Error,
    },

    /// The program exited unsuccessfully.
    #[error("{program} exited with {status}: {stderr}")]
    NonZeroExit {
        /// Program name.
        program: String,
        /// Exit status description.
        status: String,
        /// Captured standard output.
        stdout: String,
        /// Captured standard error.
        stderr: String,
    },

    /// The governing context was cancelled.
    #[error("{program} was cancelled")]
    Cancelled {
        /// Program name.
        program: String,
    },

    /// The governing context timed out.
    #[error("{program} timed out")]
    TimedOut {
        /// Program name.
        program: String,
    },
}

/// Result type alias for deployment operations.
pub type Result<T> = std::result::Result<T, DeployError>;

impl DeployError {
    /// Creates a new internal error with the given message.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Wraps an error with the prefix of the step that produced it.
    #[must_use]
    pub fn at_step(step: PrepareStep, source: impl Into<Self>) -> Self {
        Self::Prepare {
            step,
            source: Box::new(source.into()),
        }
    }

    /// Returns the step that failed, if this error came from the pre-run phase.
    #[must_use]
    pub const fn step(&self) -> Option<PrepareStep> {
        match self {
            Self::Prepare { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// Returns true if the error was caused by cancellation or timeout
    /// rather than by a genuine failure.
    #[must_use]
    pub fn is_cancellation(&self) -> bool {
        match self {
            Self::Cancelled
            | Self::Command(CommandError::Cancelled { .. } | CommandError::TimedOut { .. }) => true,
            Self::Prepare { source, .. } => source.is_cancellation(),
            _ => false,
        }
    }
}

impl ConfigError {
    /// Creates a parse error without location.
    #[must_use]
    pub fn parse(message: impl Into<String>) -> Self {
        Self::ParseError {
            message: message.into(),
            location: None,
        }
    }

    /// Creates an invalid option error.
    #[must_use]
    pub fn invalid_option(option: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidOption {
            option: option.into(),
            message: message.into(),
        }
    }
}

impl ControlPlaneError {
    /// Creates an API request error.
    #[must_use]
    pub fn api_error(status: u16, message: impl Into<String>) -> Self {
        Self::ApiRequestFailed {
            status,
            message: message.into(),
        }
    }

    /// Creates a network error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Creates an invalid response error.
    #[must_use]
    pub fn invalid_response(message: impl Into<String>) -> Self {
        Self::InvalidResponse {
            message: message.into(),
        }
    }
}

impl CommandError {
    /// Returns the captured standard error of a failed invocation.
    #[must_use]
    pub fn stderr(&self) -> Option<&str> {
        match self {
            Self::NonZeroExit { stderr, .. } => Some(stderr),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_prefix_is_rendered() {
        let err = DeployError::at_step(
            PrepareStep::GetDefaultCluster,
            ControlPlaneError::network("connection refused"),
        );
        assert!(err.to_string().starts_with("Failed to get default cluster: "));
        assert_eq!(err.step(), Some(PrepareStep::GetDefaultCluster));
    }

    #[test]
    fn test_cancellation_is_detected_through_steps() {
        let err = DeployError::at_step(
            PrepareStep::CreateNamespace,
            CommandError::Cancelled {
                program: String::from("kubectl"),
            },
        );
        assert!(err.is_cancellation());

        let failed = DeployError::from(CommandError::NonZeroExit {
            program: String::from("kubectl"),
            status: String::from("exit status: 1"),
            stdout: String::new(),
            stderr: String::from("boom"),
        });
        assert!(!failed.is_cancellation());

        let early = DeployError::at_step(PrepareStep::DownloadModule, DeployError::Cancelled);
        assert!(early.is_cancellation());
        assert_eq!(early.to_string(), "Failed to download cloud lua module: operation cancelled");
    }

    #[test]
    fn test_merge_error_identifies_side() {
        let override_err = MergeError::Override {
            message: String::from("bad"),
        };
        let essential_err = MergeError::Essential {
            message: String::from("bad"),
        };
        assert!(override_err.to_string().contains("override"));
        assert!(essential_err.to_string().contains("essential"));
    }
}
