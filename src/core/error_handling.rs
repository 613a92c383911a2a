//! Strategy chains
//!
//! Operations with several ways of succeeding (HLS acquisition, YouTube
//! metadata resolution) are expressed as an ordered list of strategies. Each
//! attempt reports a tagged [`StrategyOutcome`]; the chain stops at the first
//! success or the first fatal error and otherwise escalates the last
//! retryable cause once the list is exhausted.

use std::fmt::Display;
use std::future::Future;
use tracing::{info, warn};

use super::models::{AppError, AppResult};

/// Result of a single strategy attempt
#[derive(Debug)]
pub enum StrategyOutcome<T> {
    Ok(T),
    /// The next strategy in the chain may still succeed
    Retryable(AppError),
    /// Stop the chain and surface this error
    Fatal(AppError),
}

impl<T> StrategyOutcome<T> {
    /// Tags every error as retryable
    pub fn retryable(result: AppResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ok(value),
            Err(e) => Self::Retryable(e),
        }
    }
}

/// Runs `attempt` for each strategy in order
pub async fn run_strategy_chain<'a, S, T, F, Fut>(
    operation: &str,
    strategies: &'a [S],
    mut attempt: F,
) -> AppResult<T>
where
    S: Display,
    F: FnMut(&'a S) -> Fut,
    Fut: Future<Output = StrategyOutcome<T>>,
{
    let mut last_error = None;

    for strategy in strategies {
        info!("{}: trying {}", operation, strategy);

        match attempt(strategy).await {
            StrategyOutcome::Ok(value) => {
                info!("{}: {} succeeded", operation, strategy);
                return Ok(value);
            }
            StrategyOutcome::Retryable(e) => {
                warn!("{}: {} failed, moving on: {}", operation, strategy, e);
                last_error = Some(e);
            }
            StrategyOutcome::Fatal(e) => {
                warn!("{}: {} failed fatally: {}", operation, strategy, e);
                return Err(e);
            }
        }
    }

    Err(last_error
        .unwrap_or_else(|| AppError::Config(format!("{operation}: no strategies configured"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn stops_at_first_success() {
        let calls = AtomicUsize::new(0);
        let strategies = ["a", "b", "c"];

        let result = run_strategy_chain("test", &strategies, |s| {
            calls.fetch_add(1, Ordering::SeqCst);
            let outcome = if *s == "b" {
                StrategyOutcome::Ok(s.to_string())
            } else {
                StrategyOutcome::Retryable(AppError::NoSegmentsFound)
            };
            async move { outcome }
        })
        .await;

        assert_eq!(result.unwrap(), "b");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_short_circuits() {
        let calls = AtomicUsize::new(0);
        let strategies = ["a", "b"];

        let result: AppResult<()> = run_strategy_chain("test", &strategies, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { StrategyOutcome::Fatal(AppError::NoStreamsAvailable) }
        })
        .await;

        assert!(matches!(result, Err(AppError::NoStreamsAvailable)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausted_chain_returns_last_cause() {
        let strategies = [1, 2];

        let result: AppResult<()> = run_strategy_chain("test", &strategies, |n| {
            let e = if *n == 1 {
                AppError::NoSegmentsFound
            } else {
                AppError::AllSegmentsFailed(3)
            };
            async move { StrategyOutcome::Retryable(e) }
        })
        .await;

        assert!(matches!(result, Err(AppError::AllSegmentsFailed(3))));
    }

    #[tokio::test]
    async fn empty_chain_is_a_config_error() {
        let strategies: [&str; 0] = [];
        let result: AppResult<()> =
            run_strategy_chain("test", &strategies, |_| async { StrategyOutcome::Ok(()) }).await;
        assert!(matches!(result, Err(AppError::Config(_))));
    }
}
