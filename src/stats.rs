use crate::api::ApiClient;
use crate::models::{MonthlyCollections, MonthlyPoint, PendingCounts, ValidationStats};
use crate::resource::{RemoteResource, ResourceSpec};
use crate::session::SessionGuard;
use serde_json::Value;
use std::time::Duration;

pub const VALIDATION_STATS_PATH: &str = "/statistics/validations";
pub const PENDING_COUNTS_PATH: &str = "/statistics/pending";
pub const MONTHLY_COLLECTIONS_PATH: &str = "/statistics/collections/monthly";

pub fn validation_stats_spec() -> ResourceSpec<ValidationStats> {
    ResourceSpec::new("validation stats", VALIDATION_STATS_PATH)
}

pub fn pending_counts_spec() -> ResourceSpec<PendingCounts> {
    ResourceSpec::new("pending counts", PENDING_COUNTS_PATH)
}

/// The monthly endpoint answers either with a bare array of points or with
/// `{ "months": [...] }`.
pub fn monthly_collections_spec() -> ResourceSpec<MonthlyCollections> {
    ResourceSpec::with_mapper(
        "monthly collections",
        MONTHLY_COLLECTIONS_PATH,
        map_monthly,
    )
}

fn map_monthly(value: Value) -> Result<MonthlyCollections, String> {
    match value {
        Value::Array(_) => serde_json::from_value::<Vec<MonthlyPoint>>(value)
            .map(|months| MonthlyCollections { months })
            .map_err(|err| err.to_string()),
        other => serde_json::from_value(other).map_err(|err| err.to_string()),
    }
}

/// The three statistics resources the dashboard widgets read from.
#[derive(Clone)]
pub struct Dashboard {
    pub validation: RemoteResource<ValidationStats>,
    pub pending: RemoteResource<PendingCounts>,
    pub monthly: RemoteResource<MonthlyCollections>,
}

impl Dashboard {
    pub fn new(api: ApiClient, session: SessionGuard, stale_window: Duration) -> Self {
        Self {
            validation: RemoteResource::new(
                validation_stats_spec(),
                api.clone(),
                session.clone(),
                stale_window,
            ),
            pending: RemoteResource::new(
                pending_counts_spec(),
                api.clone(),
                session.clone(),
                stale_window,
            ),
            monthly: RemoteResource::new(monthly_collections_spec(), api, session, stale_window),
        }
    }

    pub fn mount(&self) {
        self.validation.mount();
        self.pending.mount();
        self.monthly.mount();
    }

    pub fn unmount(&self) {
        self.validation.unmount();
        self.pending.unmount();
        self.monthly.unmount();
    }

    /// Consumer-triggered read: refetches only what fell out of the stale window.
    pub async fn revalidate(&self) {
        tokio::join!(
            self.validation.ensure_fresh(false),
            self.pending.ensure_fresh(false),
            self.monthly.ensure_fresh(false),
        );
    }

    pub async fn refetch(&self) {
        tokio::join!(
            self.validation.refetch(),
            self.pending.refetch(),
            self.monthly.refetch(),
        );
    }

    pub fn clear_errors(&self) {
        self.validation.clear_error();
        self.pending.clear_error();
        self.monthly.clear_error();
    }

    pub fn session_expired(&self) -> bool {
        self.validation.snapshot().session_expired
            || self.pending.snapshot().session_expired
            || self.monthly.snapshot().session_expired
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn monthly_accepts_bare_array() {
        let parsed = map_monthly(json!([
            { "month": "2026-01", "count": 4, "quantity": 12.5 },
            { "month": "2026-02", "count": 1 }
        ]))
        .unwrap();
        assert_eq!(parsed.months.len(), 2);
        assert_eq!(parsed.months[1].quantity, 0.0);
    }

    #[test]
    fn monthly_accepts_wrapped_object() {
        let parsed = map_monthly(json!({ "months": [{ "month": "2026-03", "count": 9 }] })).unwrap();
        assert_eq!(parsed.months[0].count, 9);
    }

    #[test]
    fn validation_spec_decodes_camel_case() {
        let stats = validation_stats_spec()
            .map(json!({ "total": 10, "validated": 7, "pending": 2, "rejected": 1 }))
            .unwrap();
        assert_eq!(
            stats,
            ValidationStats {
                total: 10,
                validated: 7,
                pending: 2,
                rejected: 1
            }
        );
    }
}
