use std::collections::{HashMap, HashSet};
use std::fmt;
use std::path::{Path, PathBuf};

use jsonschema::{Draft, JSONSchema};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::condition::Condition;
use crate::model::Severity;
use crate::version::SchemaVersion;
use crate::SchemaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Info,
    Warning,
    Error,
}

impl fmt::Display for IssueSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            IssueSeverity::Info => "info",
            IssueSeverity::Warning => "warning",
            IssueSeverity::Error => "error",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationIssue {
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rule: Option<String>,
}

impl ValidationIssue {
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Info, message)
    }

    fn new(severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            severity,
            message: message.into(),
            path: None,
            rule: None,
        }
    }

    pub fn at(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    pub fn for_rule(mut self, rule: impl Into<String>) -> Self {
        self.rule = Some(rule.into());
        self
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.message)?;
        if let Some(path) = &self.path {
            write!(f, " (at {})", path)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<SchemaVersion>,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    fn from_issues(schema_version: Option<SchemaVersion>, issues: Vec<ValidationIssue>) -> Self {
        let valid = !issues.iter().any(|i| i.severity == IssueSeverity::Error);
        Self {
            valid,
            schema_version,
            issues,
        }
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues
            .iter()
            .filter(|i| i.severity == IssueSeverity::Error)
    }

    pub fn has_warnings(&self) -> bool {
        self.issues
            .iter()
            .any(|i| i.severity == IssueSeverity::Warning)
    }
}

/// Outcome of validating a policy file on disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileReport {
    pub path: PathBuf,
    pub valid: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policy_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema_version: Option<SchemaVersion>,
    pub issues: Vec<ValidationIssue>,
}

/// Validates policy documents against the versioned JSON Schema contracts
/// plus the semantic checks a schema cannot express.
pub struct PolicyValidator {
    schemas: HashMap<SchemaVersion, JSONSchema>,
    default_version: SchemaVersion,
}

impl PolicyValidator {
    pub fn new() -> Result<Self, SchemaError> {
        let mut schemas = HashMap::new();
        for version in SchemaVersion::ALL {
            let schema_value: Value = serde_json::from_str(version.contract()).map_err(|e| {
                SchemaError::SchemaCompilationFailed {
                    version: version.to_string(),
                    message: e.to_string(),
                }
            })?;

            let compiled = JSONSchema::options()
                .with_draft(Draft::Draft7)
                .compile(&schema_value)
                .map_err(|e| SchemaError::SchemaCompilationFailed {
                    version: version.to_string(),
                    message: e.to_string(),
                })?;

            schemas.insert(version, compiled);
        }

        Ok(Self {
            schemas,
            default_version: SchemaVersion::default(),
        })
    }

    /// Version used when neither the caller nor the document names one.
    pub fn with_default_version(mut self, version: SchemaVersion) -> Self {
        self.default_version = version;
        self
    }

    pub fn default_version(&self) -> SchemaVersion {
        self.default_version
    }

    /// Validates `policy` against `version`, or against the version its
    /// `apiVersion` names when `version` is `None`.
    #[instrument(skip(self, policy))]
    pub fn validate(&self, policy: &Value, version: Option<&str>) -> ValidationReport {
        let api_version = policy.get("apiVersion").and_then(Value::as_str);

        let requested = match version.or(api_version) {
            Some(raw) => match SchemaVersion::parse(raw) {
                Ok(v) => v,
                Err(_) => {
                    return ValidationReport::from_issues(
                        None,
                        vec![ValidationIssue::error(format!(
                            "Unsupported schema version '{}'; supported versions: {}",
                            raw,
                            supported_versions()
                        ))],
                    )
                }
            },
            None => self.default_version,
        };

        let mut issues = Vec::new();
        self.check_schema(requested, policy, &mut issues);
        check_api_version(requested, api_version, version.is_some(), &mut issues);
        check_rules(policy, &mut issues);
        check_severities(policy, &mut issues);
        check_best_practices(policy, &mut issues);

        debug!(
            version = %requested,
            issues = issues.len(),
            "validated policy"
        );
        ValidationReport::from_issues(Some(requested), issues)
    }

    /// Reads a YAML or JSON policy file and validates it.
    #[instrument(skip(self))]
    pub fn validate_file(
        &self,
        path: &Path,
        version: Option<&str>,
    ) -> Result<FileReport, SchemaError> {
        let document = crate::files::read_document(path)?;
        let report = self.validate(&document, version);
        let policy_name = document
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .map(String::from);

        Ok(FileReport {
            path: path.to_path_buf(),
            valid: report.valid,
            policy_name,
            schema_version: report.schema_version,
            issues: report.issues,
        })
    }

    fn check_schema(&self, version: SchemaVersion, policy: &Value, issues: &mut Vec<ValidationIssue>) {
        let Some(schema) = self.schemas.get(&version) else {
            issues.push(ValidationIssue::error(format!(
                "No schema registered for version {}",
                version
            )));
            return;
        };

        if let Err(errors) = schema.validate(policy) {
            for error in errors {
                let pointer = error.instance_path.to_string();
                let path = if pointer.is_empty() { "/".to_string() } else { pointer };
                issues.push(
                    ValidationIssue::error(format!("Schema violation: {}", error)).at(path),
                );
            }
        }
    }
}

fn supported_versions() -> String {
    SchemaVersion::ALL
        .iter()
        .map(SchemaVersion::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

fn check_api_version(
    requested: SchemaVersion,
    api_version: Option<&str>,
    explicit: bool,
    issues: &mut Vec<ValidationIssue>,
) {
    let Some(api_version) = api_version else {
        return;
    };
    match SchemaVersion::parse(api_version) {
        Ok(declared) if declared != requested && explicit => issues.push(
            ValidationIssue::error(format!(
                "apiVersion '{}' does not match schema version {}",
                api_version, requested
            ))
            .at("/apiVersion"),
        ),
        Ok(_) => {}
        Err(_) => issues.push(
            ValidationIssue::error(format!(
                "apiVersion '{}' names an unsupported schema version; supported versions: {}",
                api_version,
                supported_versions()
            ))
            .at("/apiVersion"),
        ),
    }
}

fn rules(policy: &Value) -> impl Iterator<Item = (usize, &serde_json::Map<String, Value>)> {
    policy
        .pointer("/spec/rules")
        .and_then(Value::as_array)
        .into_iter()
        .flatten()
        .enumerate()
        .filter_map(|(idx, rule)| rule.as_object().map(|obj| (idx, obj)))
}

fn check_rules(policy: &Value, issues: &mut Vec<ValidationIssue>) {
    let mut seen = HashSet::new();

    for (idx, rule) in rules(policy) {
        let name = rule.get("name").and_then(Value::as_str);

        if let Some(name) = name {
            if !seen.insert(name) {
                issues.push(
                    ValidationIssue::error(format!("Duplicate rule name '{}'", name))
                        .at(format!("/spec/rules/{}/name", idx))
                        .for_rule(name),
                );
            }
        }

        if let Some(condition) = rule.get("condition").and_then(Value::as_str) {
            if let Err(e) = Condition::parse(condition) {
                let label = name.unwrap_or("<unnamed>");
                let mut issue = ValidationIssue::error(format!(
                    "Invalid JSONPath condition in rule '{}': {}",
                    label, e
                ))
                .at(format!("/spec/rules/{}/condition", idx));
                if let Some(name) = name {
                    issue = issue.for_rule(name);
                }
                issues.push(issue);
            }
        }
    }
}

fn check_severities(policy: &Value, issues: &mut Vec<ValidationIssue>) {
    let unusual = |value: &str, path: String| {
        ValidationIssue::warning(format!(
            "Unusual severity '{}'; expected one of {}",
            value,
            Severity::KNOWN.join(", ")
        ))
        .at(path)
    };

    if let Some(severity) = policy.pointer("/metadata/severity").and_then(Value::as_str) {
        if Severity::parse(severity).is_none() {
            issues.push(unusual(severity, "/metadata/severity".to_string()));
        }
    }

    for (idx, rule) in rules(policy) {
        if let Some(severity) = rule.get("severity").and_then(Value::as_str) {
            if Severity::parse(severity).is_none() {
                let mut issue = unusual(severity, format!("/spec/rules/{}/severity", idx));
                if let Some(name) = rule.get("name").and_then(Value::as_str) {
                    issue = issue.for_rule(name);
                }
                issues.push(issue);
            }
        }
    }
}

fn check_best_practices(policy: &Value, issues: &mut Vec<ValidationIssue>) {
    let Some(metadata) = policy.get("metadata").and_then(Value::as_object) else {
        return;
    };

    let has_description = metadata
        .get("description")
        .and_then(Value::as_str)
        .is_some_and(|d| !d.trim().is_empty());
    if !has_description {
        issues.push(
            ValidationIssue::info("Policy metadata should include a description")
                .at("/metadata/description"),
        );
    }

    let rule_list = policy.pointer("/spec/rules").and_then(Value::as_array);
    if rule_list.is_some_and(|r| r.is_empty()) {
        issues.push(ValidationIssue::info("Policy defines no rules").at("/spec/rules"));
    }

    // A message alone documents the rule; only fully bare rules get a hint.
    for (idx, rule) in rules(policy) {
        if rule.contains_key("severity") || rule.contains_key("message") {
            continue;
        }
        let name = rule.get("name").and_then(Value::as_str).unwrap_or("<unnamed>");
        issues.push(
            ValidationIssue::info(format!(
                "Rule '{}' declares neither a severity nor a message; violations use the default severity and the condition text",
                name
            ))
            .at(format!("/spec/rules/{}", idx))
            .for_rule(name),
        );
    }
}
