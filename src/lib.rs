//! Order Processor Library
//!
//! A Rust library for moving tabular order records through a three-stage
//! ETL pipeline (ingest, clean/validate, aggregate) against a
//! horizontally-partitioned document store.
//!
//! This library provides tools for:
//! - Reading raw order records in bounded-memory chunks with resumable offsets
//! - Validating and normalizing records against a fixed schema
//! - Deduplicating records deterministically under parallel execution
//! - Writing clean records with partition-aware, idempotent upserts
//! - Computing fully-recomputed aggregation views for dashboard consumption
//! - Comprehensive error handling and run reporting

pub mod config;
pub mod constants;

// Core application modules
pub mod app {
    pub mod models;
    pub mod pipeline;
    pub mod services {
        pub mod aggregation;
        pub mod audit;
        pub mod cleaning;
        pub mod partition;
        pub mod schema_validator;
        pub mod source_reader;
    }
}

// CLI modules
pub mod cli {
    pub mod args;
    pub mod commands;
}

// Re-export commonly used types
pub use app::models::{CleanRecord, OrderStatus, RawRecord, RejectReason, RejectedRecord};
pub use app::pipeline::{PipelineOrchestrator, RunReport, RunState};
pub use config::Config;

/// Result type alias for the order processor
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for pipeline operations
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// I/O operation failed
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV parsing error
    #[error("CSV parsing error in file '{file}': {message}")]
    CsvParsing {
        file: String,
        message: String,
        #[source]
        source: Option<csv::Error>,
    },

    /// Source format error (unreadable or structurally broken source)
    #[error("Source format error in '{file}': {message}")]
    SourceFormat { file: String, message: String },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Data validation error
    #[error("Data validation error: {message}")]
    DataValidation { message: String },

    /// Transient store failure; safe to retry the same batch
    #[error("Transient store failure: {message}")]
    StoreTransient { message: String },

    /// Unrecoverable store failure
    #[error("Store failure: {message}")]
    StoreFatal { message: String },

    /// Audit sink write failure
    #[error("Audit sink error: {message}")]
    AuditSink {
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Serialization failure for store documents or reports
    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: serde_json::Error,
    },

    /// Processing interrupted (cooperative cancellation)
    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl Error {
    /// Create an I/O error with context
    pub fn io(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            message: message.into(),
            source,
        }
    }

    /// Create a CSV parsing error with context
    pub fn csv_parsing(
        file: impl Into<String>,
        message: impl Into<String>,
        source: Option<csv::Error>,
    ) -> Self {
        Self::CsvParsing {
            file: file.into(),
            message: message.into(),
            source,
        }
    }

    /// Create a source format error
    pub fn source_format(file: impl Into<String>, message: impl Into<String>) -> Self {
        Self::SourceFormat {
            file: file.into(),
            message: message.into(),
        }
    }

    /// Create a configuration error
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a data validation error
    pub fn data_validation(message: impl Into<String>) -> Self {
        Self::DataValidation {
            message: message.into(),
        }
    }

    /// Create a transient store error
    pub fn store_transient(message: impl Into<String>) -> Self {
        Self::StoreTransient {
            message: message.into(),
        }
    }

    /// Create an unrecoverable store error
    pub fn store_fatal(message: impl Into<String>) -> Self {
        Self::StoreFatal {
            message: message.into(),
        }
    }

    /// Create an audit sink error
    pub fn audit_sink(message: impl Into<String>, source: std::io::Error) -> Self {
        Self::AuditSink {
            message: message.into(),
            source,
        }
    }

    /// Create a processing interrupted error
    pub fn interrupted(reason: impl Into<String>) -> Self {
        Self::Interrupted {
            reason: reason.into(),
        }
    }

    /// Whether this error is safe to retry with the same input
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::StoreTransient { .. })
    }
}

// Automatic conversions from common error types
impl From<std::io::Error> for Error {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            message: "I/O operation failed".to_string(),
            source: error,
        }
    }
}

impl From<csv::Error> for Error {
    fn from(error: csv::Error) -> Self {
        Self::CsvParsing {
            file: "unknown".to_string(),
            message: "CSV parsing failed".to_string(),
            source: Some(error),
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(error: serde_json::Error) -> Self {
        Self::Serialization {
            message: "JSON serialization failed".to_string(),
            source: error,
        }
    }
}
