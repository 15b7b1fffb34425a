//! Rolling-window impact aggregation and event recording.

use chrono::{DateTime, Utc};
use ecoimpact_common::error::DataError;
use ecoimpact_common::impact::{ImpactEvent, ImpactSummary};
use ecoimpact_common::schema::{IMPACT_GHG, IMPACT_TIME, IMPACT_USER, IMPACT_WATER, USER_IMPACT};
use ecoimpact_common::sql;
use ecoimpact_common::value::SqlValue;
use tracing::{debug, warn};

use crate::connector::{Connection, Connector};
use crate::Store;

impl<C: Connector> Store<C> {
    /// Sum GHG and Water for `user_id` over events at or after `window_start`.
    ///
    /// The caller picks the window; a user with no qualifying events gets a
    /// zero summary.
    pub async fn summarize_impact(
        &self,
        user_id: i64,
        window_start: DateTime<Utc>,
    ) -> Result<ImpactSummary, DataError> {
        let sql = sql::windowed_sum(
            self.connector.dialect(),
            USER_IMPACT.table,
            &[IMPACT_GHG, IMPACT_WATER],
            IMPACT_USER,
            IMPACT_TIME,
        )?;
        let params = [SqlValue::Int(user_id), SqlValue::Timestamp(window_start)];

        let mut conn = self.connector.connect().await?;
        debug!(user_id, %window_start, "summarize impact");
        let rows = conn
            .query(&sql, &params)
            .await
            .inspect_err(|err| warn!(user_id, error = %err, "impact summary failed"))?;
        drop(conn);

        let row = rows
            .into_iter()
            .next()
            .ok_or_else(|| DataError::Query("aggregate returned no row".to_string()))?;
        match <[SqlValue; 2]>::try_from(row) {
            Ok([ghg, water]) => ImpactSummary::from_sums(ghg, water),
            Err(row) => Err(DataError::Query(format!(
                "aggregate returned {} columns, expected 2",
                row.len()
            ))),
        }
    }

    /// Append one impact event. `ImpactTime` is left to the store.
    pub async fn record_impact(&self, event: &ImpactEvent) -> Result<(), DataError> {
        self.insert(USER_IMPACT.table, &USER_IMPACT.insert_fields(), &event.values())
            .await
    }
}
