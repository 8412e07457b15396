use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use policy_schema::{
    Condition, Enforcement, PolicyDocument, PolicyValidator, SchemaError, Severity,
    ValidationIssue,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Policy '{name}' failed validation")]
    InvalidPolicy {
        name: String,
        issues: Vec<ValidationIssue>,
    },

    #[error("Policy not found: {0}")]
    PolicyNotFound(String),

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("Evaluation task failed: {0}")]
    TaskFailed(String),
}

/// A cloud resource as submitted for evaluation. Conditions are evaluated
/// against `properties`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub properties: Value,
}

impl Resource {
    pub fn new(id: impl Into<String>, resource_type: impl Into<String>, properties: Value) -> Self {
        Self {
            id: id.into(),
            resource_type: resource_type.into(),
            properties,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Violation {
    pub policy: String,
    pub rule: String,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub enforcement: Enforcement,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationResult {
    pub resource_id: String,
    pub resource_type: String,
    pub passed: bool,
    pub violations: Vec<Violation>,
    pub evaluated_policies: Vec<String>,
    pub evaluated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Registration {
    Created,
    Replaced,
}

#[derive(Debug, Clone)]
struct CompiledRule {
    name: String,
    condition: Condition,
    message: Option<String>,
    severity: Option<Severity>,
    remediation: Option<String>,
}

/// A registered policy with its conditions parsed once up front.
#[derive(Debug, Clone)]
pub struct CompiledPolicy {
    document: PolicyDocument,
    severity: Option<Severity>,
    rules: Vec<CompiledRule>,
}

impl CompiledPolicy {
    pub fn document(&self) -> &PolicyDocument {
        &self.document
    }

    pub fn name(&self) -> &str {
        self.document.name()
    }

    pub fn enforcement(&self) -> Enforcement {
        self.document.spec.enforcement
    }

    fn applies_to(&self, resource: &Resource) -> bool {
        self.enforcement() != Enforcement::Disabled
            && self.document.spec.target.matches(&resource.resource_type)
    }

    fn compile(document: PolicyDocument) -> Result<Self, EngineError> {
        let rules = document
            .spec
            .rules
            .iter()
            .map(|rule| -> Result<CompiledRule, EngineError> {
                let condition = Condition::parse(&rule.condition).map_err(|e| {
                    EngineError::InvalidPolicy {
                        name: document.metadata.name.clone(),
                        issues: vec![ValidationIssue::error(format!(
                            "Invalid JSONPath condition in rule '{}': {}",
                            rule.name, e
                        ))
                        .for_rule(rule.name.clone())],
                    }
                })?;
                Ok(CompiledRule {
                    name: rule.name.clone(),
                    condition,
                    message: rule.message.clone(),
                    severity: rule.severity.as_deref().and_then(Severity::parse),
                    remediation: rule.remediation.clone(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            severity: document.severity(),
            document,
            rules,
        })
    }
}

/// Registry of compiled policies plus the evaluation entry points.
///
/// Reads (evaluation) and writes (registration) may interleave from many
/// threads; evaluation works on a snapshot of the registry taken up front.
pub struct RulesEngine {
    config: EngineConfig,
    validator: PolicyValidator,
    policies: RwLock<BTreeMap<String, Arc<CompiledPolicy>>>,
}

impl RulesEngine {
    pub fn new(config: EngineConfig) -> Result<Self, EngineError> {
        let validator =
            PolicyValidator::new()?.with_default_version(config.default_schema_version);
        Ok(Self {
            config,
            validator,
            policies: RwLock::new(BTreeMap::new()),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn validator(&self) -> &PolicyValidator {
        &self.validator
    }

    /// Validates and registers a policy document under `metadata.name`,
    /// replacing any policy already registered under that name.
    ///
    /// A document without `apiVersion` is registered under the configured
    /// default schema version.
    #[instrument(skip(self, document))]
    pub fn register_policy(&self, mut document: Value) -> Result<Registration, EngineError> {
        if let Some(fields) = document.as_object_mut() {
            if !fields.contains_key("apiVersion") {
                let default = self.validator.default_version();
                debug!(version = %default, "stamping default apiVersion");
                fields.insert("apiVersion".to_string(), Value::String(default.api_version()));
            }
        }

        let report = self.validator.validate(&document, None);
        let name = document
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("<unnamed>")
            .to_string();

        if !report.valid {
            warn!(policy = %name, "rejected invalid policy");
            return Err(EngineError::InvalidPolicy {
                name,
                issues: report.issues,
            });
        }

        let compiled = CompiledPolicy::compile(PolicyDocument::from_value(document)?)?;

        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        let registration = match policies.insert(name.clone(), Arc::new(compiled)) {
            Some(_) => Registration::Replaced,
            None => Registration::Created,
        };
        info!(policy = %name, ?registration, "registered policy");
        Ok(registration)
    }

    pub fn unregister_policy(&self, name: &str) -> Result<(), EngineError> {
        let mut policies = self.policies.write().unwrap_or_else(PoisonError::into_inner);
        match policies.remove(name) {
            Some(_) => {
                info!(policy = %name, "unregistered policy");
                Ok(())
            }
            None => Err(EngineError::PolicyNotFound(name.to_string())),
        }
    }

    pub fn policy(&self, name: &str) -> Option<Arc<CompiledPolicy>> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn policy_names(&self) -> Vec<String> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<CompiledPolicy>> {
        self.policies
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    /// Evaluates every applicable policy against `resource`.
    #[instrument(skip(self, resource), fields(resource = %resource.id))]
    pub fn evaluate(&self, resource: &Resource) -> EvaluationResult {
        let mut violations = Vec::new();
        let mut evaluated_policies = Vec::new();

        for policy in self.snapshot() {
            if !policy.applies_to(resource) {
                continue;
            }
            evaluated_policies.push(policy.name().to_string());

            for rule in &policy.rules {
                if rule.condition.evaluate(&resource.properties) {
                    continue;
                }
                violations.push(Violation {
                    policy: policy.name().to_string(),
                    rule: rule.name.clone(),
                    severity: rule
                        .severity
                        .or(policy.severity)
                        .unwrap_or(self.config.default_severity),
                    message: rule.message.clone().unwrap_or_else(|| {
                        format!("Rule '{}' failed: {}", rule.name, rule.condition.source())
                    }),
                    remediation: rule.remediation.clone(),
                    enforcement: policy.enforcement(),
                });
            }
        }

        let passed = !violations
            .iter()
            .any(|v| v.enforcement == Enforcement::Enforce);
        debug!(
            passed,
            violations = violations.len(),
            policies = evaluated_policies.len(),
            "evaluated resource"
        );

        EvaluationResult {
            resource_id: resource.id.clone(),
            resource_type: resource.resource_type.clone(),
            passed,
            violations,
            evaluated_policies,
            evaluated_at: Utc::now(),
        }
    }

    /// Evaluates `resources` on the blocking pool with at most
    /// `max_concurrency` in flight. Results keep the input order.
    pub async fn evaluate_batch(
        self: Arc<Self>,
        resources: Vec<Resource>,
    ) -> Result<Vec<EvaluationResult>, EngineError> {
        let concurrency = self.config.max_concurrency.max(1);
        let total = resources.len();

        let results: Vec<_> = stream::iter(resources.into_iter().map(|resource| {
            let engine = Arc::clone(&self);
            tokio::task::spawn_blocking(move || engine.evaluate(&resource))
        }))
        .buffered(concurrency)
        .collect()
        .await;

        let results = results
            .into_iter()
            .map(|joined| joined.map_err(|e| EngineError::TaskFailed(e.to_string())))
            .collect::<Result<Vec<_>, _>>()?;

        info!(
            resources = total,
            failed = results.iter().filter(|r| !r.passed).count(),
            "evaluated batch"
        );
        Ok(results)
    }
}
