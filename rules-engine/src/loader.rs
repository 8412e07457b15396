use std::path::PathBuf;

use policy_schema::files::{collect_policy_files, read_document};
use serde::Serialize;
use tracing::{info, warn};

use crate::engine::{EngineError, Registration, RulesEngine};

/// Per-file outcome of loading policies from disk.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoadedPolicy {
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration: Option<Registration>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct LoadSummary {
    pub loaded: Vec<LoadedPolicy>,
}

impl LoadSummary {
    pub fn registered(&self) -> usize {
        self.loaded.iter().filter(|p| p.registration.is_some()).count()
    }

    pub fn failures(&self) -> impl Iterator<Item = &LoadedPolicy> {
        self.loaded.iter().filter(|p| p.error.is_some())
    }
}

impl RulesEngine {
    /// Registers every policy file under `paths`. A file that fails to parse
    /// or validate is recorded in the summary; the rest still load.
    pub fn load_policies(&self, paths: &[PathBuf]) -> Result<LoadSummary, EngineError> {
        let files = collect_policy_files(paths)?;
        let mut summary = LoadSummary::default();

        for path in files {
            let outcome = read_document(&path)
                .map_err(EngineError::from)
                .and_then(|document| self.register_policy(document));

            let entry = match outcome {
                Ok(registration) => LoadedPolicy {
                    path,
                    registration: Some(registration),
                    error: None,
                },
                Err(e) => {
                    warn!("skipping policy {}: {}", path.display(), e);
                    LoadedPolicy {
                        path,
                        registration: None,
                        error: Some(describe(&e)),
                    }
                }
            };
            summary.loaded.push(entry);
        }

        info!(
            "loaded {} of {} policy files",
            summary.registered(),
            summary.loaded.len()
        );
        Ok(summary)
    }
}

/// Error text including the first validation errors, for display.
pub fn describe(error: &EngineError) -> String {
    match error {
        EngineError::InvalidPolicy { issues, .. } => {
            let errors: Vec<String> = issues
                .iter()
                .filter(|i| i.severity == policy_schema::IssueSeverity::Error)
                .map(|i| i.to_string())
                .collect();
            format!("{}: {}", error, errors.join("; "))
        }
        other => other.to_string(),
    }
}
