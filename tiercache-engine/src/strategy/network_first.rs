//! Network-first: fetch, and only on failure fall back to a cached record
//! that is still within its freshness window.

use super::{
    ephemeral_key, fetch, read_partition, unavailable, writeback_for, Execution, StrategyContext,
    StrategyOutcome,
};

pub(super) async fn execute(ctx: &StrategyContext<'_>) -> Execution {
    let e = match fetch(ctx, ctx.request).await {
        Ok(response) => {
            let writeback = writeback_for(ctx, ctx.key, &response);
            return Execution {
                outcome: StrategyOutcome::Fetched(response),
                writeback,
            };
        }
        Err(e) => e,
    };

    let cause = unavailable(ctx.key, &e);
    let path = ctx.url.path();
    if !ctx.rule.stale_fallback().allows(path) {
        tracing::debug!(key = %ctx.key, error = %e, "Network failed, stale fallback not allowed");
        return Execution::outcome(StrategyOutcome::Failed(cause));
    }

    let now = ctx.clock.now();
    let ephemeral = match ctx.partition {
        Some(partition) if ctx.rule.use_ephemeral() => {
            ctx.ephemeral.get(&ephemeral_key(partition, ctx.key))
        }
        _ => None,
    };
    let record = match ephemeral {
        Some(record) => Some(record),
        None => read_partition(ctx, ctx.key).await,
    };

    match record {
        Some(record) if record.is_fresh(now) => {
            tracing::warn!(
                key = %ctx.key,
                age_secs = record.age(now).as_secs(),
                error = %e,
                "Network failed, serving cached record"
            );
            Execution::outcome(StrategyOutcome::Stale {
                response: record.to_response(),
                cause,
            })
        }
        Some(record) => {
            tracing::debug!(
                key = %ctx.key,
                age_secs = record.age(now).as_secs(),
                "Network failed and cached record is past its freshness window"
            );
            Execution::outcome(StrategyOutcome::Failed(cause))
        }
        None => Execution::outcome(StrategyOutcome::Failed(cause)),
    }
}
