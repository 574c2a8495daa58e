use crate::exchange::{Balances, ExchangeGateway, GatewayError};
use crate::execution::RetryPolicy;
use rust_decimal::Decimal;

/// Same-cycle working copy of exchange balances
///
/// Filled once per cycle and then updated optimistically as orders succeed,
/// so a batch never re-queries the account between orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BalanceCache {
    balances: Balances,
}

impl BalanceCache {
    pub fn new(balances: Balances) -> Self {
        let mut cache = Self::default();
        cache.replace(balances);
        cache
    }

    /// Replace the snapshot with a fresh read from the exchange
    ///
    /// On failure the previous snapshot is kept.
    pub async fn refresh(
        &mut self,
        gateway: &dyn ExchangeGateway,
        retry: &RetryPolicy,
    ) -> Result<&Balances, GatewayError> {
        let balances = retry
            .run("fetch balances", GatewayError::is_transient, || {
                gateway.fetch_balances()
            })
            .await?;
        self.replace(balances);
        Ok(&self.balances)
    }

    pub fn replace(&mut self, balances: Balances) {
        self.balances = balances
            .into_iter()
            .map(|(asset, qty)| (asset, qty.max(Decimal::ZERO)))
            .collect();
    }

    /// Free balance, zero for assets the exchange did not report
    pub fn get(&self, asset: &str) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn contains(&self, asset: &str) -> bool {
        self.balances.contains_key(asset)
    }

    pub fn credit(&mut self, asset: &str, amount: Decimal) {
        let entry = self.balances.entry(asset.to_string()).or_insert(Decimal::ZERO);
        *entry = (*entry + amount).max(Decimal::ZERO);
    }

    /// Subtract `amount`, never going below zero
    pub fn debit(&mut self, asset: &str, amount: Decimal) {
        let entry = self.balances.entry(asset.to_string()).or_insert(Decimal::ZERO);
        *entry = (*entry - amount).max(Decimal::ZERO);
    }

    /// Assets other than `quote` holding a positive balance, sorted by symbol
    pub fn held_assets(&self, quote: &str) -> Vec<String> {
        let mut assets: Vec<String> = self
            .balances
            .iter()
            .filter(|(asset, qty)| asset.as_str() != quote && **qty > Decimal::ZERO)
            .map(|(asset, _)| asset.clone())
            .collect();
        assets.sort();
        assets
    }

    pub fn snapshot(&self) -> &Balances {
        &self.balances
    }
}
