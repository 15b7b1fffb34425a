use chrono::{DateTime, Duration, Utc};
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};

use crate::error::DataError;
use crate::value::SqlValue;

/// Lookback used for impact summaries when none is configured.
pub const DEFAULT_LOOKBACK_HOURS: i64 = 24;

/// Summed impact of one user over a window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactSummary {
    pub total_ghg: f64,
    pub total_water: f64,
}

impl ImpactSummary {
    pub const ZERO: Self = Self {
        total_ghg: 0.0,
        total_water: 0.0,
    };

    /// Build a summary from the two `SUM(...)` columns.
    ///
    /// A NULL sum means the user had no events in the window, which is zero
    /// impact rather than missing data.
    pub fn from_sums(ghg: SqlValue, water: SqlValue) -> Result<Self, DataError> {
        Ok(Self {
            total_ghg: sum_to_f64(ghg)?,
            total_water: sum_to_f64(water)?,
        })
    }
}

fn sum_to_f64(value: SqlValue) -> Result<f64, DataError> {
    match value {
        SqlValue::Null => Ok(0.0),
        SqlValue::Int(n) => Ok(n as f64),
        SqlValue::Float(f) => Ok(f),
        SqlValue::Decimal(d) => d
            .to_f64()
            .ok_or_else(|| DataError::Query("decimal sum out of float range".to_string())),
        other => Err(DataError::Query(format!(
            "expected a numeric sum, got {}",
            other.kind()
        ))),
    }
}

/// Rolling lookback ending at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImpactWindow {
    lookback: Duration,
}

impl ImpactWindow {
    pub fn new(lookback: Duration) -> Self {
        Self { lookback }
    }

    pub fn hours(hours: i64) -> Self {
        Self::new(Duration::hours(hours))
    }

    /// Inclusive lower bound of the window ending at `now`.
    pub fn start_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now - self.lookback
    }
}

impl Default for ImpactWindow {
    fn default() -> Self {
        Self::hours(DEFAULT_LOOKBACK_HOURS)
    }
}

/// A new impact event as accepted on the write path. `ImpactTime` is assigned
/// by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactEvent {
    #[serde(rename = "UserID")]
    pub user_id: i64,
    #[serde(rename = "GHG")]
    pub ghg: f64,
    #[serde(rename = "Water")]
    pub water: f64,
}

impl ImpactEvent {
    /// Values in `USER_IMPACT.insert_fields()` order.
    pub fn values(&self) -> Vec<SqlValue> {
        vec![
            SqlValue::Int(self.user_id),
            SqlValue::Float(self.ghg),
            SqlValue::Float(self.water),
        ]
    }
}
