use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

const S3_POLICY: &str = r#"apiVersion: governance/v1.0.0
kind: Policy
metadata:
  name: s3-encryption
  version: 1.0.0
  description: Buckets must be encrypted at rest
spec:
  target:
    resourceType: aws_s3_bucket
  rules:
    - name: encryption-enabled
      condition: "$.encryption.enabled == true"
      severity: high
      message: Bucket must be encrypted
"#;

const INVALID_POLICY: &str = r#"apiVersion: governance/v1.0.0
kind: Policy
metadata:
  name: broken
  version: 1.0.0
spec:
  target:
    resourceType: aws_s3_bucket
  rules:
    - name: bad
      condition: "encryption == true"
"#;

fn govctl() -> Command {
    let mut cmd = Command::cargo_bin("govctl").unwrap();
    cmd.env("NO_COLOR", "1")
        .env_remove("GOVERNANCE_MAX_CONCURRENCY")
        .env_remove("GOVERNANCE_SCHEMA_VERSION")
        .env_remove("GOVERNANCE_DEFAULT_SEVERITY");
    cmd
}

fn write(dir: &Path, name: &str, contents: &str) -> String {
    let path = dir.join(name);
    fs::write(&path, contents).unwrap();
    path.to_string_lossy().into_owned()
}

#[test]
fn given_compliant_resources_when_evaluate_then_success() {
    let dir = TempDir::new().unwrap();
    let policy = write(dir.path(), "s3.yaml", S3_POLICY);
    let resources = write(
        dir.path(),
        "resources.json",
        r#"[{"id": "bucket-1", "type": "aws_s3_bucket", "properties": {"encryption": {"enabled": true}}}]"#,
    );

    govctl()
        .args(["evaluate", "--policies", &policy, "--resources", &resources])
        .assert()
        .success()
        .stdout(predicate::str::contains("✓ bucket-1 (aws_s3_bucket)"))
        .stdout(predicate::str::contains(
            "Evaluated 1 resource(s): 1 passed, 0 failed",
        ));
}

#[test]
fn given_violating_resource_when_evaluate_then_table_and_exit_code_one() {
    let dir = TempDir::new().unwrap();
    let policy = write(dir.path(), "s3.yaml", S3_POLICY);
    let resources = write(
        dir.path(),
        "resources.yaml",
        r#"resources:
  - id: bucket-1
    type: aws_s3_bucket
    properties:
      encryption:
        enabled: true
  - id: bucket-2
    type: aws_s3_bucket
    properties: {}
  - id: vm-1
    type: aws_instance
"#,
    );

    govctl()
        .args(["evaluate", "--policies", &policy, "--resources", &resources])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("✗ bucket-2 (aws_s3_bucket)"))
        .stdout(predicate::str::contains("✓ vm-1 (aws_instance) - 0 policies"))
        .stdout(predicate::str::contains("Bucket must be encrypted"))
        .stdout(predicate::str::contains(
            "Evaluated 3 resource(s): 2 passed, 1 failed",
        ));
}

#[test]
fn given_json_format_when_evaluate_then_results_keep_input_order() {
    let dir = TempDir::new().unwrap();
    let policy = write(dir.path(), "s3.yaml", S3_POLICY);
    let resources: Vec<serde_json::Value> = (0..25)
        .map(|i| {
            serde_json::json!({
                "id": format!("bucket-{}", i),
                "type": "aws_s3_bucket",
                "properties": { "encryption": { "enabled": i % 2 == 0 } }
            })
        })
        .collect();
    let resources = write(
        dir.path(),
        "resources.json",
        &serde_json::to_string(&resources).unwrap(),
    );

    let output = govctl()
        .args([
            "evaluate",
            "--policies",
            &policy,
            "--resources",
            &resources,
            "--format",
            "json",
            "--max-concurrency",
            "4",
        ])
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    let results: Vec<serde_json::Value> = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(results.len(), 25);
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result["resourceId"], format!("bucket-{}", i));
        assert_eq!(result["passed"], i % 2 == 0);
    }
}

#[test]
fn given_invalid_policy_when_evaluate_then_error_exit() {
    let dir = TempDir::new().unwrap();
    let policy = write(dir.path(), "broken.yaml", INVALID_POLICY);
    let resources = write(dir.path(), "resources.json", "[]");

    govctl()
        .args(["evaluate", "--policies", &policy, "--resources", &resources])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Invalid JSONPath condition"))
        .stderr(predicate::str::contains("1 policy file(s) failed to load"));
}

#[test]
fn given_zero_concurrency_when_evaluate_then_rejected() {
    let dir = TempDir::new().unwrap();
    let policy = write(dir.path(), "s3.yaml", S3_POLICY);
    let resources = write(dir.path(), "resources.json", "[]");

    govctl()
        .args([
            "evaluate",
            "--policies",
            &policy,
            "--resources",
            &resources,
            "--max-concurrency",
            "0",
        ])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("at least 1"));
}
