//! # Policy Schema Crate
//!
//! Typed model and tooling for governance policy documents. A policy targets a
//! resource type and carries named rules whose conditions are JSONPath
//! expressions over the resource's properties.
//!
//! ## Validation
//!
//! ```rust
//! use policy_schema::PolicyValidator;
//! use serde_json::json;
//!
//! let validator = PolicyValidator::new().expect("embedded contracts compile");
//! let report = validator.validate(
//!     &json!({
//!         "apiVersion": "governance/v1.0.0",
//!         "kind": "Policy",
//!         "metadata": { "name": "s3-encryption", "version": "1.0.0" },
//!         "spec": {
//!             "target": { "resourceType": "aws_s3_bucket" },
//!             "rules": [{ "name": "encrypted", "condition": "$.encryption != null" }]
//!         }
//!     }),
//!     Some("v1.0.0"),
//! );
//! assert!(report.valid);
//! ```
//!
//! ## Migration
//!
//! ```rust
//! use policy_schema::SchemaMigrator;
//! use serde_json::json;
//!
//! let migrated = SchemaMigrator::new()
//!     .migrate(
//!         json!({ "apiVersion": "governance/v1.0.0", "metadata": { "labels": { "env": "prod" } }, "spec": {} }),
//!         "v1.0.0",
//!         "v1.1.0",
//!     )
//!     .expect("path exists");
//! assert_eq!(migrated["metadata"]["tags"]["env"], "prod");
//! assert_eq!(migrated["spec"]["enforcement"], "enforce");
//! ```

pub mod condition;
pub mod files;
mod migrate;
mod model;
pub mod path;
mod validator;
mod version;

pub use condition::{Condition, ConditionError};
pub use migrate::{MigrationError, MigrationStep, SchemaMigrator};
pub use model::*;
pub use path::JsonPath;
pub use validator::*;
pub use version::SchemaVersion;

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Unsupported schema version: {0}")]
    UnsupportedVersion(String),

    #[error("Schema compilation failed for {version}: {message}")]
    SchemaCompilationFailed { version: String, message: String },

    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid policy document: {0}")]
    InvalidDocument(String),
}
