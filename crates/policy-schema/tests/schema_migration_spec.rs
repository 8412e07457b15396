use policy_schema::{MigrationError, PolicyValidator, SchemaMigrator};
use serde_json::json;

#[test]
fn given_v1_0_policy_when_migrate_to_v1_1_then_labels_become_tags() {
    let policy = json!({
        "apiVersion": "governance/v1.0.0",
        "kind": "Policy",
        "metadata": {
            "name": "test",
            "version": "1.0.0",
            "labels": { "env": "prod" }
        },
        "spec": {
            "target": { "resourceType": "aws_s3_bucket" },
            "rules": []
        }
    });

    let migrated = SchemaMigrator::new()
        .migrate(policy, "v1.0.0", "v1.1.0")
        .unwrap();

    assert_eq!(migrated["metadata"]["tags"]["env"], "prod");
    assert!(migrated["metadata"].get("labels").is_none());
    assert_eq!(migrated["spec"]["enforcement"], "enforce");
    assert_eq!(migrated["apiVersion"], "governance/v1.1.0");
}

#[test]
fn given_unknown_target_version_when_migrate_then_no_migration_path() {
    let err = SchemaMigrator::new()
        .migrate(json!({}), "v1.0.0", "v2.0.0")
        .unwrap_err();

    assert!(matches!(err, MigrationError::NoPath { .. }));
    assert!(err.to_string().contains("No migration path"));
}

#[test]
fn given_valid_v1_0_policy_when_migrated_then_valid_under_v1_1() {
    let policy = json!({
        "apiVersion": "governance/v1.0.0",
        "kind": "Policy",
        "metadata": {
            "name": "bucket-encryption",
            "version": "1.0.0",
            "description": "Buckets must be encrypted",
            "labels": { "team": "storage" }
        },
        "spec": {
            "target": { "resourceType": "aws_s3_bucket" },
            "rules": [{
                "name": "encrypted",
                "condition": "$.encryption != null",
                "message": "Must have encryption",
                "severity": "high"
            }]
        }
    });

    let validator = PolicyValidator::new().unwrap();
    assert!(validator.validate(&policy, Some("v1.0.0")).valid);

    let migrated = SchemaMigrator::new()
        .migrate(policy, "v1.0.0", "v1.1.0")
        .unwrap();
    let report = validator.validate(&migrated, Some("v1.1.0"));

    assert!(report.valid, "{:?}", report.issues);
    assert!(report.issues.is_empty());
}
