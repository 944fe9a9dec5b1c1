//! Error types for the Runsheet core library.
//!
//! A single error enum covers the server (storage, uploads), the REST client
//! and the step update coordinator, so failures can cross those layers
//! without losing their kind.
//!
//! # Error Codes Reference
//!
//! | Code Range | Category | Description |
//! |------------|----------|-------------|
//! | E1001-E1099 | Database | Connection, query and migration errors |
//! | E2001-E2099 | Config | Environment, config file and validation errors |
//! | E3001-E3099 | Runbook | Runbook lookup errors |
//! | E4001-E4099 | Execution | Execution lookup errors |
//! | E5001-E5099 | Api | REST client, network and response errors |
//! | E6001-E6099 | Upload | Multipart upload and file storage errors |
//! | E9001-E9099 | General | Internal, IO, serialization and validation errors |

use thiserror::Error;
use tracing::{error, warn};

/// The main error type for the Runsheet core library.
#[derive(Debug, Error)]
pub enum RunsheetError {
    // ========================================================================
    // Database Errors (E1001-E1099)
    // ========================================================================
    /// Failed to establish database connection
    #[error("[E1001] Database connection failed: {0}")]
    DatabaseConnectionFailed(String),

    /// Database query execution failed
    #[error("[E1002] Database query failed: {0}")]
    DatabaseQueryFailed(String),

    /// Database migration failed
    #[error("[E1003] Database migration failed: {0}")]
    DatabaseMigrationFailed(String),

    /// Database pool exhausted or unavailable
    #[error("[E1004] Database pool unavailable: {0}")]
    DatabasePoolUnavailable(String),

    // ========================================================================
    // Configuration Errors (E2001-E2099)
    // ========================================================================
    /// Required environment variable is missing
    #[error("[E2001] Missing environment variable: {0}")]
    MissingEnvVar(String),

    /// Configuration file parse error
    #[error("[E2002] Failed to parse configuration: {0}")]
    ConfigParseError(String),

    /// Invalid configuration value
    #[error("[E2003] Invalid configuration value for '{key}': {message}")]
    InvalidConfigValue { key: String, message: String },

    // ========================================================================
    // Runbook Errors (E3001-E3099)
    // ========================================================================
    #[error("[E3001] Runbook not found: {0}")]
    RunbookNotFound(String),

    // ========================================================================
    // Execution Errors (E4001-E4099)
    // ========================================================================
    #[error("[E4001] Execution not found: {0}")]
    ExecutionNotFound(String),

    // ========================================================================
    // Api Errors (E5001-E5099)
    // ========================================================================
    /// The server answered with a non-success status
    #[error("[E5001] API request failed with status {status}: {message}")]
    ApiRequestFailed { status: u16, message: String },

    /// API response parse error
    #[error("[E5002] Failed to parse API response: {0}")]
    ApiParseError(String),

    /// Server unreachable or connection dropped
    #[error("[E5003] API service unavailable: {0}")]
    ApiServiceUnavailable(String),

    /// Request timed out
    #[error("[E5004] API request timed out: {0}")]
    ApiTimeout(String),

    // ========================================================================
    // Upload Errors (E6001-E6099)
    // ========================================================================
    /// Multipart request without a `file` part
    #[error("[E6001] No file uploaded")]
    NoFileUploaded,

    /// Upload could not be read or stored
    #[error("[E6002] Upload failed: {0}")]
    UploadFailed(String),

    // ========================================================================
    // General Errors (E9001-E9099)
    // ========================================================================
    /// Internal error (catch-all for unexpected conditions)
    #[error("[E9001] Internal error: {0}")]
    Internal(String),

    /// Validation error
    #[error("[E9002] Validation error: {0}")]
    ValidationError(String),

    /// IO error
    #[error("[E9003] IO error: {0}")]
    IoError(String),

    /// Serialization/deserialization error
    #[error("[E9004] Serialization error: {0}")]
    SerializationError(String),
}

/// Result type alias for Runsheet operations.
pub type RunsheetResult<T> = Result<T, RunsheetError>;

// ============================================================================
// From trait implementations for seamless error propagation
// ============================================================================

impl From<sqlx::Error> for RunsheetError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::PoolTimedOut => RunsheetError::DatabasePoolUnavailable(err.to_string()),
            sqlx::Error::PoolClosed => {
                RunsheetError::DatabasePoolUnavailable("Connection pool is closed".to_string())
            }
            sqlx::Error::Configuration(_) | sqlx::Error::Io(_) | sqlx::Error::Tls(_) => {
                RunsheetError::DatabaseConnectionFailed(err.to_string())
            }
            sqlx::Error::Database(db_err) => RunsheetError::DatabaseQueryFailed(db_err.to_string()),
            _ => RunsheetError::DatabaseQueryFailed(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for RunsheetError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        RunsheetError::DatabaseMigrationFailed(err.to_string())
    }
}

impl From<reqwest::Error> for RunsheetError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RunsheetError::ApiTimeout(err.to_string())
        } else if err.is_connect() {
            RunsheetError::ApiServiceUnavailable(err.to_string())
        } else if err.is_status() {
            RunsheetError::ApiRequestFailed {
                status: err.status().map(|s| s.as_u16()).unwrap_or_default(),
                message: err.to_string(),
            }
        } else if err.is_decode() {
            RunsheetError::ApiParseError(err.to_string())
        } else {
            RunsheetError::ApiServiceUnavailable(err.to_string())
        }
    }
}

impl From<serde_json::Error> for RunsheetError {
    fn from(err: serde_json::Error) -> Self {
        RunsheetError::SerializationError(err.to_string())
    }
}

impl From<std::io::Error> for RunsheetError {
    fn from(err: std::io::Error) -> Self {
        RunsheetError::IoError(err.to_string())
    }
}

impl From<config::ConfigError> for RunsheetError {
    fn from(err: config::ConfigError) -> Self {
        match err {
            config::ConfigError::NotFound(key) => RunsheetError::InvalidConfigValue {
                key,
                message: "Key not found".to_string(),
            },
            config::ConfigError::Type {
                origin,
                unexpected,
                expected,
                key,
            } => RunsheetError::InvalidConfigValue {
                key: key.unwrap_or_else(|| origin.map(|o| o.to_string()).unwrap_or_default()),
                message: format!("Expected {}, got {}", expected, unexpected),
            },
            _ => RunsheetError::ConfigParseError(err.to_string()),
        }
    }
}

impl From<crate::config::ConfigLoadError> for RunsheetError {
    fn from(err: crate::config::ConfigLoadError) -> Self {
        match err {
            crate::config::ConfigLoadError::Config(e) => e.into(),
            crate::config::ConfigLoadError::MissingRequired(key) => {
                RunsheetError::InvalidConfigValue {
                    key,
                    message: "Missing required value".to_string(),
                }
            }
            crate::config::ConfigLoadError::InvalidValue { key, message } => {
                RunsheetError::InvalidConfigValue { key, message }
            }
            crate::config::ConfigLoadError::Io(e) => e.into(),
        }
    }
}

impl From<crate::db::DatabaseError> for RunsheetError {
    fn from(err: crate::db::DatabaseError) -> Self {
        match err {
            crate::db::DatabaseError::MissingEnvVar(name) => RunsheetError::MissingEnvVar(name),
            crate::db::DatabaseError::ConnectionFailed(e) => {
                RunsheetError::DatabaseConnectionFailed(e.to_string())
            }
            crate::db::DatabaseError::MigrationFailed(e) => {
                RunsheetError::DatabaseMigrationFailed(e.to_string())
            }
            crate::db::DatabaseError::InvalidConfig(msg) => RunsheetError::InvalidConfigValue {
                key: "database".to_string(),
                message: msg,
            },
        }
    }
}

// ============================================================================
// Error categorization helpers
// ============================================================================

impl RunsheetError {
    /// Returns true for the NotFound kind of the error taxonomy.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RunsheetError::RunbookNotFound(_) | RunsheetError::ExecutionNotFound(_)
        )
    }

    /// Returns true for the NetworkFailure kind of the error taxonomy.
    pub fn is_network_error(&self) -> bool {
        matches!(
            self,
            RunsheetError::ApiRequestFailed { .. }
                | RunsheetError::ApiParseError(_)
                | RunsheetError::ApiServiceUnavailable(_)
                | RunsheetError::ApiTimeout(_)
        )
    }

    pub fn is_database_error(&self) -> bool {
        matches!(
            self,
            RunsheetError::DatabaseConnectionFailed(_)
                | RunsheetError::DatabaseQueryFailed(_)
                | RunsheetError::DatabaseMigrationFailed(_)
                | RunsheetError::DatabasePoolUnavailable(_)
        )
    }

    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            RunsheetError::MissingEnvVar(_)
                | RunsheetError::ConfigParseError(_)
                | RunsheetError::InvalidConfigValue { .. }
        )
    }

    /// Returns true if re-triggering the same operation might succeed.
    /// Nothing in Runsheet retries on its own; this only shapes messages.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RunsheetError::DatabasePoolUnavailable(_)
                | RunsheetError::DatabaseConnectionFailed(_)
                | RunsheetError::ApiServiceUnavailable(_)
                | RunsheetError::ApiTimeout(_)
        )
    }

    /// Returns an error code suitable for logging or external reporting.
    pub fn error_code(&self) -> &'static str {
        match self {
            RunsheetError::DatabaseConnectionFailed(_) => "E1001",
            RunsheetError::DatabaseQueryFailed(_) => "E1002",
            RunsheetError::DatabaseMigrationFailed(_) => "E1003",
            RunsheetError::DatabasePoolUnavailable(_) => "E1004",
            RunsheetError::MissingEnvVar(_) => "E2001",
            RunsheetError::ConfigParseError(_) => "E2002",
            RunsheetError::InvalidConfigValue { .. } => "E2003",
            RunsheetError::RunbookNotFound(_) => "E3001",
            RunsheetError::ExecutionNotFound(_) => "E4001",
            RunsheetError::ApiRequestFailed { .. } => "E5001",
            RunsheetError::ApiParseError(_) => "E5002",
            RunsheetError::ApiServiceUnavailable(_) => "E5003",
            RunsheetError::ApiTimeout(_) => "E5004",
            RunsheetError::NoFileUploaded => "E6001",
            RunsheetError::UploadFailed(_) => "E6002",
            RunsheetError::Internal(_) => "E9001",
            RunsheetError::ValidationError(_) => "E9002",
            RunsheetError::IoError(_) => "E9003",
            RunsheetError::SerializationError(_) => "E9004",
        }
    }

    /// Returns a user-friendly suggestion for how to resolve this error.
    pub fn user_suggestion(&self) -> Option<&'static str> {
        match self {
            RunsheetError::DatabaseConnectionFailed(_) => {
                Some("Check that PostgreSQL is running and DATABASE_URL is correct")
            }
            RunsheetError::DatabasePoolUnavailable(_) => {
                Some("The database is busy. Try again in a few seconds")
            }
            RunsheetError::MissingEnvVar(_) => {
                Some("Create a .env file or set the environment variable")
            }
            RunsheetError::RunbookNotFound(_) => {
                Some("Run 'runsheet runbooks list' to see existing runbooks")
            }
            RunsheetError::ExecutionNotFound(_) => {
                Some("Run 'runsheet exec list' to see existing executions")
            }
            RunsheetError::ApiServiceUnavailable(_) | RunsheetError::ApiTimeout(_) => {
                Some("Start the server with 'runsheet serve' or check RUNSHEET_SERVER_URL")
            }
            _ => None,
        }
    }

    /// Log this error with appropriate severity level.
    pub fn log(&self) {
        let code = self.error_code();
        let suggestion = self.user_suggestion();

        if self.is_transient() {
            warn!(
                error_code = %code,
                suggestion = suggestion,
                "Transient error occurred: {}",
                self
            );
        } else {
            error!(
                error_code = %code,
                suggestion = suggestion,
                "Error occurred: {}",
                self
            );
        }
    }
}
