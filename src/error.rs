//! Error types for SCD pattern generation.

use thiserror::Error;

/// Which configured column list failed schema validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnRole {
    PrimaryKey,
    MonitoredParameter,
}

impl std::fmt::Display for ColumnRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ColumnRole::PrimaryKey => write!(f, "Primary key"),
            ColumnRole::MonitoredParameter => write!(f, "Monitored parameter"),
        }
    }
}

/// The main error type for SCD pattern operations.
#[derive(Debug, Error)]
pub enum ScdError {
    /// Invalid or unsupported configuration.
    #[error("{0}")]
    Configuration(String),

    /// No template exists for the requested backend.
    #[error("The SCD code pattern has no template for backend \"{backend}\".")]
    UnsupportedBackend { backend: String },

    /// Configured columns are missing from the discovered input table schema.
    #[error("{role} \"{}\" not found in the input table \"{table_id}\".", .columns.join("\", \""))]
    SchemaMismatch {
        role: ColumnRole,
        columns: Vec<String>,
        table_id: String,
    },

    /// Template could not be rendered.
    #[error("Template \"{template}\" line {line}: {message}")]
    TemplateRender {
        template: String,
        line: usize,
        message: String,
    },

    /// A storage collaborator call failed.
    #[error("{context}: {message}")]
    RemoteService { context: String, message: String },

    /// Internal precondition violated. Indicates a defect.
    #[error("Application error: {0}")]
    Application(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML settings error.
    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl ScdError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Create a template error at the given line.
    pub fn template(template: &str, line: usize, message: impl Into<String>) -> Self {
        Self::TemplateRender {
            template: template.to_string(),
            line,
            message: message.into(),
        }
    }

    /// Wrap a collaborator failure with the operation it interrupted.
    pub fn remote(context: impl Into<String>, message: impl std::fmt::Display) -> Self {
        Self::RemoteService {
            context: context.into(),
            message: message.to_string(),
        }
    }

    /// Whether the error is caused by user input rather than a defect.
    pub fn is_user_error(&self) -> bool {
        !matches!(self, ScdError::Application(_))
    }
}

/// Result type alias for SCD pattern operations.
pub type ScdResult<T> = Result<T, ScdError>;
