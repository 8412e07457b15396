use std::collections::{HashMap, VecDeque};

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::{debug, info};

use crate::model::Enforcement;
use crate::version::SchemaVersion;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MigrationError {
    #[error("No migration path from {from} to {to}")]
    NoPath { from: String, to: String },

    #[error("Cannot migrate document: {0}")]
    InvalidDocument(String),
}

type MigrateFn = fn(&mut Map<String, Value>) -> Result<(), MigrationError>;

/// One forward migration between adjacent schema versions.
#[derive(Clone)]
pub struct MigrationStep {
    pub from: SchemaVersion,
    pub to: SchemaVersion,
    pub description: &'static str,
    apply: MigrateFn,
}

impl std::fmt::Debug for MigrationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationStep")
            .field("from", &self.from)
            .field("to", &self.to)
            .field("description", &self.description)
            .finish()
    }
}

pub struct SchemaMigrator {
    steps: Vec<MigrationStep>,
}

impl SchemaMigrator {
    pub fn new() -> Self {
        Self {
            steps: vec![MigrationStep {
                from: SchemaVersion::V1_0_0,
                to: SchemaVersion::V1_1_0,
                description: "rename metadata.labels to metadata.tags; default spec.enforcement",
                apply: v1_0_0_to_v1_1_0,
            }],
        }
    }

    pub fn steps(&self) -> &[MigrationStep] {
        &self.steps
    }

    /// Shortest chain of steps leading from `from` to `to`.
    pub fn path(&self, from: &str, to: &str) -> Result<Vec<&MigrationStep>, MigrationError> {
        let no_path = || MigrationError::NoPath {
            from: from.to_string(),
            to: to.to_string(),
        };
        let source = SchemaVersion::parse(from).map_err(|_| no_path())?;
        let target = SchemaVersion::parse(to).map_err(|_| no_path())?;

        if source == target {
            return Ok(Vec::new());
        }

        let mut came_from: HashMap<SchemaVersion, usize> = HashMap::new();
        let mut queue = VecDeque::from([source]);
        while let Some(current) = queue.pop_front() {
            if current == target {
                break;
            }
            for (idx, step) in self.steps.iter().enumerate() {
                if step.from == current && step.to != source && !came_from.contains_key(&step.to) {
                    came_from.insert(step.to, idx);
                    queue.push_back(step.to);
                }
            }
        }

        let mut chain = Vec::new();
        let mut cursor = target;
        while cursor != source {
            let idx = *came_from.get(&cursor).ok_or_else(no_path)?;
            let step = &self.steps[idx];
            chain.push(step);
            cursor = step.from;
        }
        chain.reverse();
        Ok(chain)
    }

    /// Applies every step between `from` and `to` and stamps the resulting
    /// `apiVersion`. Identity when the versions are equal.
    pub fn migrate(&self, policy: Value, from: &str, to: &str) -> Result<Value, MigrationError> {
        let chain = self.path(from, to)?;
        if chain.is_empty() {
            return Ok(policy);
        }

        let Value::Object(mut document) = policy else {
            return Err(MigrationError::InvalidDocument(
                "policy must be a mapping".to_string(),
            ));
        };

        for step in chain {
            debug!(from = %step.from, to = %step.to, "applying migration step");
            (step.apply)(&mut document)?;
            document.insert(
                "apiVersion".to_string(),
                Value::String(step.to.api_version()),
            );
        }

        info!("migrated policy from {} to {}", from, to);
        Ok(Value::Object(document))
    }
}

impl Default for SchemaMigrator {
    fn default() -> Self {
        Self::new()
    }
}

fn object_at<'a>(
    document: &'a mut Map<String, Value>,
    key: &str,
) -> Result<Option<&'a mut Map<String, Value>>, MigrationError> {
    match document.get_mut(key) {
        None => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map)),
        Some(_) => Err(MigrationError::InvalidDocument(format!(
            "'{}' must be a mapping",
            key
        ))),
    }
}

fn v1_0_0_to_v1_1_0(document: &mut Map<String, Value>) -> Result<(), MigrationError> {
    if let Some(metadata) = object_at(document, "metadata")? {
        if let Some(labels) = metadata.remove("labels") {
            let Value::Object(labels) = labels else {
                return Err(MigrationError::InvalidDocument(
                    "'metadata.labels' must be a mapping".to_string(),
                ));
            };
            let tags = metadata
                .entry("tags")
                .or_insert_with(|| Value::Object(Map::new()));
            let Value::Object(tags) = tags else {
                return Err(MigrationError::InvalidDocument(
                    "'metadata.tags' must be a mapping".to_string(),
                ));
            };
            for (key, value) in labels {
                tags.entry(key).or_insert(value);
            }
        }
    }

    if let Some(spec) = object_at(document, "spec")? {
        spec.entry("enforcement")
            .or_insert_with(|| Value::String(Enforcement::Enforce.as_str().to_string()));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn same_version_is_identity() {
        let doc = json!({ "anything": 1 });
        let migrated = SchemaMigrator::new()
            .migrate(doc.clone(), "v1.1.0", "v1.1.0")
            .unwrap();
        assert_eq!(migrated, doc);
    }

    #[test]
    fn existing_tags_win_over_labels() {
        let migrated = SchemaMigrator::new()
            .migrate(
                json!({
                    "metadata": {
                        "labels": { "env": "prod", "team": "storage" },
                        "tags": { "env": "staging" }
                    },
                    "spec": { "enforcement": "audit" }
                }),
                "v1.0.0",
                "v1.1.0",
            )
            .unwrap();

        assert_eq!(migrated["metadata"]["tags"], json!({ "env": "staging", "team": "storage" }));
        assert_eq!(migrated["spec"]["enforcement"], "audit");
        assert_eq!(migrated["apiVersion"], "governance/v1.1.0");
    }

    #[test]
    fn backwards_migration_has_no_path() {
        let err = SchemaMigrator::new()
            .migrate(json!({}), "v1.1.0", "v1.0.0")
            .unwrap_err();
        assert_eq!(
            err,
            MigrationError::NoPath {
                from: "v1.1.0".into(),
                to: "v1.0.0".into()
            }
        );
    }

    #[test]
    fn non_mapping_sections_are_rejected() {
        let err = SchemaMigrator::new()
            .migrate(json!({ "metadata": "oops" }), "v1.0.0", "v1.1.0")
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDocument(_)));

        let err = SchemaMigrator::new()
            .migrate(json!([1, 2]), "v1.0.0", "v1.1.0")
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidDocument(_)));
    }

    #[test]
    fn path_lists_steps() {
        let migrator = SchemaMigrator::new();
        let chain = migrator.path("governance/v1.0.0", "1.1.0").unwrap();
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].to, SchemaVersion::V1_1_0);

        let registered = &migrator.steps()[0];
        assert_eq!(registered.from, SchemaVersion::V1_0_0);
        assert_eq!(registered.description, chain[0].description);
    }
}
