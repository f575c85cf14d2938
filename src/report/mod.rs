use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod aggregator;
pub mod window;

pub use aggregator::aggregate;
pub use window::ReportWindow;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceClass {
    Desktop,
    Mobile,
    Tablet,
}

impl DeviceClass {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceClass::Desktop => "desktop",
            DeviceClass::Mobile => "mobile",
            DeviceClass::Tablet => "tablet",
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "mobile" => DeviceClass::Mobile,
            "tablet" => DeviceClass::Tablet,
            _ => DeviceClass::Desktop,
        }
    }
}

/// A single tracked visit. Immutable input to the aggregator.
#[derive(Debug, Clone)]
pub struct VisitRecord {
    pub client_id: String,
    pub timestamp: DateTime<Utc>,
    pub page_view_count: u32,
    pub time_on_site_seconds: u32,
    pub device_class: DeviceClass,
    pub browser_family: String,
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct BucketStats {
    pub label: String,
    pub unique_visitors: u64,
    pub page_views: u64,
}

#[derive(Debug, Serialize)]
pub struct CountMetric {
    pub current: u64,
    pub previous: u64,
    pub change_pct: f64,
}

impl CountMetric {
    pub fn new(current: u64, previous: u64) -> Self {
        Self {
            current,
            previous,
            change_pct: percent_change(current as f64, previous as f64),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RateMetric {
    pub current: f64,
    pub previous: f64,
    pub change_pct: f64,
}

impl RateMetric {
    pub fn new(current: f64, previous: f64) -> Self {
        Self {
            current,
            previous,
            change_pct: percent_change(current, previous),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct BreakdownRow {
    pub label: String,
    pub unique_visitors: u64,
    pub page_views: u64,
}

/// One report request's worth of output. Built fresh per call, never stored.
#[derive(Debug, Serialize)]
pub struct AggregateReport {
    pub window: ReportWindow,
    pub buckets: Vec<BucketStats>,
    pub unique_visitors: CountMetric,
    pub page_views: CountMetric,
    pub bounce_rate: RateMetric,
    pub engagement_rate: RateMetric,
    pub conversion_rate: RateMetric,
    pub device_breakdown: Vec<BreakdownRow>,
    pub top_paths: Vec<BreakdownRow>,
}

/// Zero baseline reports 0% rather than an infinite or undefined change, so the
/// output stays numeric. Kept for compatibility with historical dashboards.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    if previous == 0.0 {
        return 0.0;
    }
    round2((current - previous) / previous * 100.0)
}

pub(crate) fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
