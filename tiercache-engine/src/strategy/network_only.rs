//! Network-only passthrough for requests that are never cached.

use super::{fetch, unavailable, Execution, StrategyContext, StrategyOutcome};

pub(super) async fn execute(ctx: &StrategyContext<'_>) -> Execution {
    let outcome = match fetch(ctx, ctx.request).await {
        Ok(response) => StrategyOutcome::Fetched(response),
        Err(e) => StrategyOutcome::Failed(unavailable(ctx.key, &e)),
    };
    Execution::outcome(outcome)
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{FixedTransport, Harness};
    use super::super::StrategyOutcome;
    use std::time::Duration;
    use tiercache_core::{ResourceError, ResourceRequest};
    use tiercache_storage::PartitionStore;

    #[tokio::test]
    async fn test_post_bypasses_every_cache_tier() {
        let harness = Harness::new("api-v1").await;
        let get = ResourceRequest::get("https://shop.example/api/orders");
        harness.seed(&get, b"cached", Duration::from_secs(1)).await;

        let post = ResourceRequest::new("POST", "https://shop.example/api/orders");
        let transport = FixedTransport::ok(b"created", &harness.clock);
        let execution = harness.run(&post, &transport).await;

        assert_eq!(transport.calls(), 1);
        assert!(matches!(execution.outcome, StrategyOutcome::Fetched(_)));
        assert!(execution.writeback.is_none());
        assert_eq!(harness.store.stats().await.expect("stats").hits, 0);
    }

    #[tokio::test]
    async fn test_failure_is_network_unavailable() {
        let harness = Harness::new("api-v1").await;
        let post = ResourceRequest::new("PUT", "https://shop.example/api/cart");

        let execution = harness.run(&post, &FixedTransport::failing()).await;
        assert!(matches!(
            execution.outcome,
            StrategyOutcome::Failed(ResourceError::NetworkUnavailable { .. })
        ));
    }
}
