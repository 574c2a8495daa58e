use anyhow::Context;
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tokio::time::{interval_at, Duration, Instant, MissedTickBehavior};

use crate::execution::{BatchReport, OrderExecutor};
use crate::news::ArticleProvider;
use crate::oracle::TradeAdvisor;

/// What a single guarded cycle ended with
#[derive(Debug)]
pub enum CycleOutcome {
    NoArticles,
    Executed(BatchReport),
    /// Error or panic, already logged
    Failed(String),
}

/// News-driven scheduler
///
/// Runs the news cycle and the exit sweep on one task so the two never
/// overlap. Every cycle is guarded: an error or panic is logged and the loop
/// carries on with the next tick.
pub struct TradingLoop {
    provider: ArticleProvider,
    advisor: TradeAdvisor,
    executor: OrderExecutor,
    cycle_interval: Duration,
    exit_check_interval: Duration,
}

impl TradingLoop {
    pub fn new(
        provider: ArticleProvider,
        advisor: TradeAdvisor,
        executor: OrderExecutor,
        cycle_interval: Duration,
        exit_check_interval: Duration,
    ) -> Self {
        Self {
            provider,
            advisor,
            executor,
            cycle_interval,
            exit_check_interval,
        }
    }

    /// Fetch articles, ask the oracle and execute its advice
    pub async fn run_cycle(&mut self) -> anyhow::Result<CycleOutcome> {
        let articles = self.provider.fetch_new().await;
        if articles.is_empty() {
            tracing::info!("No new articles");
            return Ok(CycleOutcome::NoArticles);
        }

        tracing::info!("🔄 Trading on {} new articles", articles.len());

        let advices = self
            .advisor
            .advise(&articles)
            .await
            .context("Oracle call failed")?;

        let report = self.executor.execute_batch(advices).await?;
        Ok(CycleOutcome::Executed(report))
    }

    /// `run_cycle` with errors and panics turned into a logged no-op
    pub async fn run_guarded_cycle(&mut self) -> CycleOutcome {
        match guard(self.run_cycle()).await {
            Ok(outcome) => outcome,
            Err(reason) => {
                tracing::error!("✗ Trading cycle failed: {}", reason);
                CycleOutcome::Failed(reason)
            }
        }
    }

    /// Liquidate overdue positions without consulting the oracle
    pub async fn exit_sweep(&self) -> CycleOutcome {
        match guard(self.executor.execute_batch(Vec::new())).await {
            Ok(report) => CycleOutcome::Executed(report),
            Err(reason) => {
                tracing::error!("✗ Exit sweep failed: {}", reason);
                CycleOutcome::Failed(reason)
            }
        }
    }

    /// Run forever: news cycles right away and then every `cycle_interval`,
    /// exit sweeps every `exit_check_interval`
    pub async fn run(&mut self) {
        let mut news_ticker = interval_at(Instant::now(), self.cycle_interval);
        news_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut exit_ticker = interval_at(
            Instant::now() + self.exit_check_interval,
            self.exit_check_interval,
        );
        exit_ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            "Trading loop started (news every {:?}, exit checks every {:?})",
            self.cycle_interval,
            self.exit_check_interval
        );

        loop {
            tokio::select! {
                _ = news_ticker.tick() => {
                    tracing::info!(
                        "📰 [NEWS] Cycle at {}",
                        chrono::Utc::now().format("%H:%M:%S")
                    );
                    self.run_guarded_cycle().await;
                }
                _ = exit_ticker.tick() => {
                    tracing::debug!(
                        "⏰ [EXIT] Sweep at {}",
                        chrono::Utc::now().format("%H:%M:%S")
                    );
                    self.exit_sweep().await;
                }
            }
        }
    }
}

async fn guard<T, F>(cycle: F) -> Result<T, String>
where
    F: Future<Output = anyhow::Result<T>>,
{
    match AssertUnwindSafe(cycle).catch_unwind().await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(format!("{:#}", e)),
        Err(panic) => Err(format!("panic: {}", panic_message(panic.as_ref()))),
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message
    } else {
        "unknown panic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_guard_passes_values_through() {
        let result = guard(async { Ok::<_, anyhow::Error>(5) }).await;
        assert_eq!(result, Ok(5));
    }

    #[tokio::test]
    async fn test_guard_flattens_error_context() {
        let result = guard(async {
            Err::<(), _>(anyhow::anyhow!("connection reset")).context("Oracle call failed")
        })
        .await;

        assert_eq!(result.unwrap_err(), "Oracle call failed: connection reset");
    }

    #[tokio::test]
    async fn test_guard_catches_panic() {
        let result = guard(async {
            if true {
                panic!("index out of bounds");
            }
            Ok::<(), anyhow::Error>(())
        })
        .await;

        assert_eq!(result.unwrap_err(), "panic: index out of bounds");
    }
}
