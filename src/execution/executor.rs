use anyhow::Context;
use chrono::{DateTime, Utc};
use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt;
use std::sync::Arc;

use crate::exchange::{ExchangeGateway, GatewayError};
use crate::execution::{BalanceCache, PositionManager, RetryPolicy};
use crate::models::{OrderReceipt, SellTarget, Side, TradeAdvice, TradeOrder, TradingPair};
use crate::persistence::PositionStore;

/// Sizing rules applied to every order
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionSettings {
    /// Worst-case exchange fee as a fraction (0.001 = 0.1%)
    pub max_fee: Decimal,
    /// Smallest order value accepted, in quote units
    pub min_notional: Decimal,
    /// Share of free quote balance spent per buy
    pub buy_percent: Decimal,
    /// Share of the asset balance liquidated per sell
    pub sell_percent: Decimal,
    pub quote_asset: String,
    /// Order quantities are rounded down to this many decimals
    pub quantity_decimals: u32,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            max_fee: Decimal::new(1, 3),
            min_notional: Decimal::TEN,
            buy_percent: Decimal::new(5, 1),
            sell_percent: Decimal::ONE,
            quote_asset: "USDT".to_string(),
            quantity_decimals: 5,
        }
    }
}

impl ExecutionSettings {
    fn after_fee(&self, amount: Decimal) -> Decimal {
        amount * (Decimal::ONE - self.max_fee)
    }

    fn round_quantity(&self, quantity: Decimal) -> Decimal {
        quantity.round_dp_with_strategy(self.quantity_decimals, RoundingStrategy::ToZero)
    }
}

/// Why an advice produced no order
#[derive(Debug, Clone, PartialEq)]
pub enum SkipReason {
    /// The advice names the quote asset itself
    QuoteAsset,
    /// Not in the balance snapshot even after a refresh
    UnknownAsset,
    NoBalance,
    /// Rounded quantity came out as zero
    ZeroQuantity,
    BelowMinNotional {
        notional: Decimal,
        minimum: Decimal,
    },
    InvalidDuration,
    PriceUnavailable(String),
    SubmissionFailed(String),
    /// Position file could not be read, so no new position can be recorded
    StoreUnavailable,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::QuoteAsset => f.write_str("quote asset"),
            SkipReason::UnknownAsset => f.write_str("unknown asset"),
            SkipReason::NoBalance => f.write_str("no balance"),
            SkipReason::ZeroQuantity => f.write_str("quantity rounds to zero"),
            SkipReason::BelowMinNotional { notional, minimum } => {
                write!(f, "notional {} below minimum {}", notional, minimum)
            }
            SkipReason::InvalidDuration => f.write_str("holding duration must be positive"),
            SkipReason::PriceUnavailable(e) => write!(f, "price unavailable: {}", e),
            SkipReason::SubmissionFailed(e) => write!(f, "submission failed: {}", e),
            SkipReason::StoreUnavailable => f.write_str("position store unreadable"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutedOrder {
    pub order: TradeOrder,
    pub price: Decimal,
    pub receipt: OrderReceipt,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SkippedAdvice {
    pub advice: TradeAdvice,
    pub reason: SkipReason,
}

/// Outcome of one `execute_batch` call
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    /// Successful submissions in submission order
    pub submitted: Vec<ExecutedOrder>,
    pub skipped: Vec<SkippedAdvice>,
    pub saved: bool,
}

impl BatchReport {
    pub fn sides(&self) -> Vec<Side> {
        self.submitted.iter().map(|o| o.order.side).collect()
    }
}

/// Working state of a single batch, dropped when the batch ends
struct CycleState {
    balances: BalanceCache,
    positions: PositionManager,
    refreshed_on_miss: bool,
    /// False when the stored book failed to load; buys and the save are skipped
    book_loaded: bool,
}

/// Applies advice batches against the exchange and the position store
pub struct OrderExecutor {
    gateway: Arc<dyn ExchangeGateway>,
    store: PositionStore,
    settings: ExecutionSettings,
    retry: RetryPolicy,
}

impl OrderExecutor {
    pub fn new(
        gateway: Arc<dyn ExchangeGateway>,
        store: PositionStore,
        settings: ExecutionSettings,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            gateway,
            store,
            settings,
            retry,
        }
    }

    pub fn settings(&self) -> &ExecutionSettings {
        &self.settings
    }

    pub fn store(&self) -> &PositionStore {
        &self.store
    }

    pub async fn execute_batch(&self, advices: Vec<TradeAdvice>) -> anyhow::Result<BatchReport> {
        self.execute_batch_at(advices, Utc::now()).await
    }

    /// Run one batch as of `now`
    ///
    /// Overdue positions are liquidated first, then explicit sells, then buys
    /// (shortest holding period first). Only the final position snapshot is
    /// persisted; a failed save is logged and reported, not returned.
    pub async fn execute_batch_at(
        &self,
        advices: Vec<TradeAdvice>,
        now: DateTime<Utc>,
    ) -> anyhow::Result<BatchReport> {
        let mut balances = BalanceCache::default();
        balances
            .refresh(self.gateway.as_ref(), &self.retry)
            .await
            .context("Failed to refresh balances")?;

        let (positions, book_loaded) = match self.store.load() {
            Ok(positions) => (positions, true),
            Err(e) => {
                tracing::error!(
                    "✗ {}. Selling only and leaving {} untouched until it is repaired or removed",
                    e,
                    self.store.path().display()
                );
                (Default::default(), false)
            }
        };

        let mut state = CycleState {
            balances,
            positions: PositionManager::with_positions(positions),
            refreshed_on_miss: false,
            book_loaded,
        };
        let mut report = BatchReport::default();

        for asset in state.positions.overdue_at(now) {
            tracing::info!("⏰ Position in {} is past its exit time, selling", asset);
            self.sell(&mut state, &asset, &mut report).await;
        }

        for advice in order_advices(advices) {
            match &advice {
                TradeAdvice::Sell {
                    target: SellTarget::Asset(asset),
                } => self.sell(&mut state, asset, &mut report).await,
                TradeAdvice::Sell {
                    target: SellTarget::All,
                } => {
                    let held = state.balances.held_assets(&self.settings.quote_asset);
                    tracing::info!("Selling all holdings: {:?}", held);
                    for asset in held {
                        self.sell(&mut state, &asset, &mut report).await;
                    }
                }
                TradeAdvice::Buy {
                    asset,
                    duration_hours,
                } => {
                    self.buy(&mut state, asset, *duration_hours, now, &mut report)
                        .await
                }
            }
        }

        if state.book_loaded {
            match self.store.save(state.positions.positions()) {
                Ok(()) => report.saved = true,
                Err(e) => tracing::error!("✗ Failed to save positions: {}", e),
            }
        }

        tracing::info!(
            "Batch done: {} submitted, {} skipped, {} open positions",
            report.submitted.len(),
            report.skipped.len(),
            state.positions.len()
        );

        Ok(report)
    }

    async fn sell(&self, state: &mut CycleState, asset: &str, report: &mut BatchReport) {
        let advice = TradeAdvice::sell(asset);

        if asset == self.settings.quote_asset {
            return skip(report, advice, SkipReason::QuoteAsset);
        }

        if !state.balances.contains(asset) && !state.refreshed_on_miss {
            state.refreshed_on_miss = true;
            tracing::debug!("{} not in balance snapshot, refreshing once", asset);
            if let Err(e) = state
                .balances
                .refresh(self.gateway.as_ref(), &self.retry)
                .await
            {
                tracing::warn!("Balance refresh for {} failed: {}", asset, e);
            }
        }

        if !state.balances.contains(asset) {
            tracing::warn!("Cannot sell {}: asset not held on the exchange", asset);
            return skip(report, advice, SkipReason::UnknownAsset);
        }

        let balance = state.balances.get(asset);
        if balance <= Decimal::ZERO {
            return skip(report, advice, SkipReason::NoBalance);
        }

        let amount = self
            .settings
            .round_quantity(self.settings.after_fee(balance * self.settings.sell_percent));
        if amount <= Decimal::ZERO {
            return skip(report, advice, SkipReason::ZeroQuantity);
        }

        let pair = TradingPair::new(asset, self.settings.quote_asset.as_str());
        let price = match self.fetch_price(&pair).await {
            Ok(price) => price,
            Err(reason) => return skip(report, advice, reason),
        };

        let notional = amount * price;
        if notional < self.settings.min_notional {
            return skip(
                report,
                advice,
                SkipReason::BelowMinNotional {
                    notional,
                    minimum: self.settings.min_notional,
                },
            );
        }

        let receipt = match self.submit(&pair, Side::Sell, amount).await {
            Ok(receipt) => receipt,
            Err(reason) => return skip(report, advice, reason),
        };

        state.balances.credit(&self.settings.quote_asset, notional);
        state.balances.debit(asset, amount);
        state.positions.close_position(asset);

        tracing::info!(
            "💹 SOLD {} {} @ {} ({} {})",
            amount,
            asset,
            price,
            notional,
            self.settings.quote_asset
        );

        report.submitted.push(ExecutedOrder {
            order: TradeOrder {
                side: Side::Sell,
                asset: asset.to_string(),
                amount,
                duration_hours: None,
            },
            price,
            receipt,
        });
    }

    async fn buy(
        &self,
        state: &mut CycleState,
        asset: &str,
        duration_hours: u32,
        now: DateTime<Utc>,
        report: &mut BatchReport,
    ) {
        let advice = TradeAdvice::buy(asset, duration_hours);

        if asset == self.settings.quote_asset {
            return skip(report, advice, SkipReason::QuoteAsset);
        }
        if duration_hours == 0 {
            return skip(report, advice, SkipReason::InvalidDuration);
        }
        if !state.book_loaded {
            return skip(report, advice, SkipReason::StoreUnavailable);
        }

        let quote = self.settings.quote_asset.as_str();
        let budget = self
            .settings
            .after_fee(state.balances.get(quote) * self.settings.buy_percent);
        if budget < self.settings.min_notional {
            return skip(
                report,
                advice,
                SkipReason::BelowMinNotional {
                    notional: budget,
                    minimum: self.settings.min_notional,
                },
            );
        }

        let pair = TradingPair::new(asset, quote);
        let price = match self.fetch_price(&pair).await {
            Ok(price) => price,
            Err(reason) => return skip(report, advice, reason),
        };

        let quantity = self.settings.round_quantity(budget / price);
        if quantity <= Decimal::ZERO {
            return skip(report, advice, SkipReason::ZeroQuantity);
        }

        let receipt = match self.submit(&pair, Side::Buy, quantity).await {
            Ok(receipt) => receipt,
            Err(reason) => return skip(report, advice, reason),
        };

        state.balances.debit(quote, budget);
        state.balances.credit(asset, quantity);
        if let Err(e) = state.positions.open_position_at(asset, duration_hours, now) {
            tracing::error!("✗ Bought {} but could not record position: {}", asset, e);
        }

        tracing::info!(
            "💹 BOUGHT {} {} @ {} for {} {}, holding {}h",
            quantity,
            asset,
            price,
            budget,
            quote,
            duration_hours
        );

        report.submitted.push(ExecutedOrder {
            order: TradeOrder {
                side: Side::Buy,
                asset: asset.to_string(),
                amount: quantity,
                duration_hours: Some(duration_hours),
            },
            price,
            receipt,
        });
    }

    async fn fetch_price(&self, pair: &TradingPair) -> Result<Decimal, SkipReason> {
        let context = format!("fetch price {}", pair);
        let price = self
            .retry
            .run(&context, GatewayError::is_transient, || {
                self.gateway.fetch_ticker_price(pair)
            })
            .await
            .map_err(|e| SkipReason::PriceUnavailable(e.to_string()))?;

        if price <= Decimal::ZERO {
            return Err(SkipReason::PriceUnavailable(format!(
                "non-positive price {}",
                price
            )));
        }
        Ok(price)
    }

    async fn submit(
        &self,
        pair: &TradingPair,
        side: Side,
        quantity: Decimal,
    ) -> Result<OrderReceipt, SkipReason> {
        // One id for every attempt, so a retry after an unseen fill is refused as a duplicate
        let client_order_id = uuid::Uuid::new_v4().simple().to_string();
        let context = format!("{} {} {} ({})", side, quantity, pair.base, client_order_id);
        self.retry
            .run(&context, GatewayError::is_transient, || {
                self.gateway
                    .submit_market_order(pair, side, quantity, &client_order_id)
            })
            .await
            .map_err(|e| SkipReason::SubmissionFailed(e.to_string()))
    }
}

/// Sells before buys, buys by ascending duration; otherwise input order
fn order_advices(mut advices: Vec<TradeAdvice>) -> Vec<TradeAdvice> {
    advices.sort_by_key(|advice| match advice {
        TradeAdvice::Sell { .. } => (0, 0),
        TradeAdvice::Buy { duration_hours, .. } => (1, *duration_hours),
    });
    advices
}

fn skip(report: &mut BatchReport, advice: TradeAdvice, reason: SkipReason) {
    match reason {
        SkipReason::PriceUnavailable(_)
        | SkipReason::SubmissionFailed(_)
        | SkipReason::StoreUnavailable => {
            tracing::warn!("Skipping {}: {}", advice, reason)
        }
        _ => tracing::debug!("Skipping {}: {}", advice, reason),
    }
    report.skipped.push(SkippedAdvice { advice, reason });
}
