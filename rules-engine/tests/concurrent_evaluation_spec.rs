use std::sync::Arc;
use std::time::Instant;

use rules_engine::{EngineConfig, Resource, RulesEngine};
use serde_json::json;

fn engine_with_policy(max_concurrency: usize) -> Arc<RulesEngine> {
    let engine = RulesEngine::new(EngineConfig {
        max_concurrency,
        ..EngineConfig::default()
    })
    .unwrap();
    engine
        .register_policy(json!({
            "apiVersion": "governance/v1.0.0",
            "kind": "Policy",
            "metadata": { "name": "test-policy", "version": "1.0.0", "description": "Test" },
            "spec": {
                "target": { "resourceType": "aws_s3_bucket" },
                "rules": [{ "name": "encrypted", "condition": "$.encryption != null", "severity": "high", "message": "m" }]
            }
        }))
        .unwrap();
    Arc::new(engine)
}

#[tokio::test]
async fn given_hundred_resources_when_evaluate_batch_then_all_pass_in_order() {
    let engine = engine_with_policy(10);
    let resources: Vec<Resource> = (0..100)
        .map(|i| {
            Resource::new(
                format!("resource-{i}"),
                "aws_s3_bucket",
                json!({ "encryption": "AES256" }),
            )
        })
        .collect();

    let started = Instant::now();
    let results = Arc::clone(&engine).evaluate_batch(resources).await.unwrap();
    let elapsed = started.elapsed();

    assert_eq!(results.len(), 100);
    assert!(results.iter().all(|r| r.passed));
    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.resource_id, format!("resource-{i}"));
    }
    println!("Concurrent evaluation of 100 resources took {:?}", elapsed);
}

#[tokio::test]
async fn given_mixed_resources_when_evaluate_batch_then_failures_line_up() {
    let engine = engine_with_policy(3);
    let resources: Vec<Resource> = (0..20)
        .map(|i| {
            let properties = if i % 4 == 0 {
                json!({})
            } else {
                json!({ "encryption": "aws:kms" })
            };
            Resource::new(format!("bucket-{i}"), "aws_s3_bucket", properties)
        })
        .collect();

    let results = engine.evaluate_batch(resources).await.unwrap();

    for (i, result) in results.iter().enumerate() {
        assert_eq!(result.passed, i % 4 != 0, "bucket-{i}");
    }
}

#[tokio::test]
async fn given_empty_batch_when_evaluate_batch_then_empty_results() {
    let engine = engine_with_policy(4);
    let results = engine.evaluate_batch(Vec::new()).await.unwrap();
    assert!(results.is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn given_concurrent_registration_when_evaluating_then_no_deadlock() {
    let engine = engine_with_policy(8);

    let writer = {
        let engine = Arc::clone(&engine);
        tokio::task::spawn_blocking(move || {
            for i in 0..50 {
                engine
                    .register_policy(json!({
                        "apiVersion": "governance/v1.0.0",
                        "kind": "Policy",
                        "metadata": { "name": format!("extra-{i}"), "version": "1.0.0" },
                        "spec": {
                            "target": { "resourceType": "aws_ec2_instance" },
                            "rules": [{ "name": "tagged", "condition": "$.tags.owner" }]
                        }
                    }))
                    .unwrap();
            }
        })
    };

    let resources: Vec<Resource> = (0..200)
        .map(|i| Resource::new(format!("r-{i}"), "aws_s3_bucket", json!({ "encryption": "AES256" })))
        .collect();
    let results = Arc::clone(&engine).evaluate_batch(resources).await.unwrap();
    writer.await.unwrap();

    assert_eq!(results.len(), 200);
    assert!(results.iter().all(|r| r.passed));
    assert_eq!(engine.len(), 51);
}
