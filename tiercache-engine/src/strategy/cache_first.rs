//! Cache-first: serve a fresh cached record, otherwise fetch, otherwise
//! serve whatever is cached regardless of age.

use std::borrow::Cow;

use tiercache_core::{CacheKey, ResourceError, ResourceRequest};

use super::{fetch, read_partition, unavailable, writeback_for, Execution, StrategyContext, StrategyOutcome};

pub(super) async fn execute(ctx: &StrategyContext<'_>) -> Execution {
    // Alternate encoding changes only the key and URL used below
    let (request, key) = match ctx
        .rule
        .encoding_rewrite()
        .and_then(|rewrite| rewrite.apply(ctx.request, ctx.url))
    {
        Some(url) => {
            let key = CacheKey::from_parts(ctx.request.method(), &url);
            (Cow::Owned(ctx.request.with_url(url.as_str())), Cow::Owned(key))
        }
        None => (
            Cow::<ResourceRequest>::Borrowed(ctx.request),
            Cow::Borrowed(ctx.key),
        ),
    };

    let now = ctx.clock.now();
    let cached = read_partition(ctx, &key).await;
    if let Some(record) = &cached {
        if record.is_fresh(now) {
            return Execution::outcome(StrategyOutcome::Fresh(record.to_response()));
        }
    }

    match fetch(ctx, &request).await {
        Ok(response) => {
            let writeback = writeback_for(ctx, &key, &response);
            Execution {
                outcome: StrategyOutcome::Fetched(response),
                writeback,
            }
        }
        Err(e) => {
            let cause = unavailable(&key, &e);
            match cached {
                Some(record) => {
                    tracing::warn!(
                        key = %key,
                        age_secs = record.age(now).as_secs(),
                        error = %e,
                        "Network failed, serving stale record"
                    );
                    Execution::outcome(StrategyOutcome::Stale {
                        response: record.to_response(),
                        cause,
                    })
                }
                None => {
                    tracing::debug!(key = %key, error = %e, "Network failed with nothing cached");
                    Execution::outcome(StrategyOutcome::Failed(ResourceError::NotFound {
                        key: key.to_string(),
                    }))
                }
            }
        }
    }
}
