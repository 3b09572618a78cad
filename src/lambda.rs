// AWS Lambda entry point - every invocation runs one full mirror pass

use anyhow::Result;
use lambda_runtime::{service_fn, LambdaEvent};
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use crate::mirror::{Mirror, MirrorSummary};

/// Serve invocations from the Lambda Runtime API until the runtime shuts down
pub async fn serve(mirror: Mirror) -> Result<()> {
    let mirror = Arc::new(mirror);

    lambda_runtime::run(service_fn(move |event: LambdaEvent<Value>| {
        let mirror = mirror.clone();
        async move { handle_event(&mirror, event).await }
    }))
    .await
    .map_err(|e| anyhow::anyhow!("Lambda runtime failed: {}", e))
}

/// Run the mirror for one invocation; the event payload is not used
async fn handle_event(
    mirror: &Mirror,
    event: LambdaEvent<Value>,
) -> Result<MirrorSummary, lambda_runtime::Error> {
    info!(request_id = %event.context.request_id, "Handling mirror invocation");
    Ok(mirror.run().await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecr::testing::StubRegistry;
    use crate::mirror::{ImageTag, MirrorConfig};
    use crate::report::testing::RecordingReporter;
    use crate::transfer::testing::RecordingTransfer;
    use lambda_runtime::Context;
    use serde_json::json;

    fn mirror(registry: Arc<StubRegistry>, transfer: Arc<RecordingTransfer>) -> Mirror {
        let config = MirrorConfig {
            account_id: "123456789012".to_string(),
            region: "us-east-1".to_string(),
            image_tags: vec![
                ImageTag::parse("alpine:3.18").unwrap(),
                ImageTag::parse("nginx:1.25").unwrap(),
            ],
            concurrency: 1,
            login: false,
        };
        Mirror::new(
            config,
            registry,
            transfer,
            Arc::new(RecordingReporter::default()),
        )
    }

    #[tokio::test]
    async fn test_handler_ignores_event_payload() {
        let registry = Arc::new(StubRegistry::with_pages(&[&["alpine"]]));
        let transfer = Arc::new(RecordingTransfer::default());
        let mirror = mirror(registry.clone(), transfer.clone());

        let scheduled = json!({
            "source": "aws.events",
            "detail-type": "Scheduled Event",
            "image_tags": "redis:7",
        });
        let summary = handle_event(&mirror, LambdaEvent::new(scheduled, Context::default()))
            .await
            .unwrap();

        assert_eq!(summary.created, vec!["nginx"]);
        assert_eq!(
            summary.mirrored,
            vec![
                "123456789012.dkr.ecr.us-east-1.amazonaws.com/alpine:3.18",
                "123456789012.dkr.ecr.us-east-1.amazonaws.com/nginx:1.25",
            ]
        );
        assert!(!transfer.calls().iter().any(|call| call.contains("redis")));

        // An empty event mirrors the same configured images
        let again = handle_event(&mirror, LambdaEvent::new(Value::Null, Context::default()))
            .await
            .unwrap();
        assert_eq!(again.mirrored, summary.mirrored);
    }

    #[tokio::test]
    async fn test_handler_propagates_failures() {
        let registry = Arc::new(StubRegistry::with_pages(&[&["alpine", "nginx"]]));
        let transfer = Arc::new(RecordingTransfer::failing_pull("alpine:3.18"));
        let mirror = mirror(registry, transfer);

        let err = handle_event(&mirror, LambdaEvent::new(json!({}), Context::default()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Failed to pull alpine:3.18"));
    }
}
