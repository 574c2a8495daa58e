use chrono::{DateTime, Duration, Utc};

use crate::models::Position;
use crate::persistence::Positions;

/// In-memory book of open positions for one batch
///
/// Loaded from the position store at the start of a batch and handed back
/// to it once all orders are done. At most one position exists per asset.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PositionManager {
    positions: Positions,
}

impl PositionManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore from a stored snapshot
    pub fn with_positions(positions: Positions) -> Self {
        Self { positions }
    }

    /// Record a buy, replacing any earlier position for the asset
    ///
    /// # Arguments
    /// * `now` - Buy time; the forced exit is `now + duration_hours`
    pub fn open_position_at(
        &mut self,
        asset: &str,
        duration_hours: u32,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Position> {
        if duration_hours == 0 {
            anyhow::bail!("Holding duration for {} must be positive", asset);
        }

        let position = Position {
            buy_time: now,
            sell_time: now + Duration::hours(i64::from(duration_hours)),
        };

        if self.positions.insert(asset.to_string(), position).is_some() {
            tracing::debug!("Replaced existing position for {}", asset);
        }

        Ok(position)
    }

    /// Forget the position for `asset`, if any
    pub fn close_position(&mut self, asset: &str) -> Option<Position> {
        self.positions.remove(asset)
    }

    pub fn has_open_position(&self, asset: &str) -> bool {
        self.positions.contains_key(asset)
    }

    pub fn get_open_position(&self, asset: &str) -> Option<&Position> {
        self.positions.get(asset)
    }

    /// Assets whose forced exit time has passed, earliest exit first
    pub fn overdue_at(&self, now: DateTime<Utc>) -> Vec<String> {
        let mut overdue: Vec<(&String, &Position)> = self
            .positions
            .iter()
            .filter(|(_, p)| p.is_overdue_at(now))
            .collect();
        overdue.sort_by_key(|(asset, p)| (p.sell_time, asset.as_str()));
        overdue.into_iter().map(|(asset, _)| asset.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn positions(&self) -> &Positions {
        &self.positions
    }

    pub fn into_positions(self) -> Positions {
        self.positions
    }
}
