use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::params;
use serde::Deserialize;
use tracing::debug;

use crate::error::AppError;
use crate::report::{aggregate, AggregateReport, DeviceClass, ReportWindow, VisitRecord};
use crate::AppState;

#[derive(Deserialize)]
pub struct ReportParams {
    pub window: ReportWindow,
}

/// Serves the dashboard analytics report. Loads the doubled window range
/// (current plus the preceding period of equal length) and hands it to the
/// aggregator; an unrecognized window value is rejected during deserialization
/// and never reaches it.
pub async fn get_analytics_report(
    State(state): State<AppState>,
    Query(query): Query<ReportParams>,
) -> Result<Json<AggregateReport>, AppError> {
    let now = Utc::now();
    let window = query.window;
    let range_start = (now - window.span() * 2).timestamp();
    let range_end = now.timestamp();

    debug!(
        "Building {:?} report over [{range_start}, {range_end}]",
        window
    );

    let records = load_visits(&state, range_start, range_end).await?;
    let conversions = load_conversions(&state, range_start, range_end).await?;

    Ok(Json(aggregate(&records, &conversions, window, now)))
}

async fn load_visits(
    state: &AppState,
    range_start: i64,
    range_end: i64,
) -> Result<Vec<VisitRecord>, AppError> {
    let rows = state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT client_id, timestamp, page_view_count, time_on_site_seconds,
                        device_class, browser_family, path
                 FROM visits
                 WHERE timestamp >= ?1 AND timestamp <= ?2",
            )?;

            let rows = stmt
                .query_map(params![range_start, range_end], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, i64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, String>(5)?,
                        row.get::<_, String>(6)?,
                    ))
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await?;

    let records = rows
        .into_iter()
        .filter_map(
            |(client_id, timestamp, views, seconds, device, browser, path)| {
                let timestamp = Utc.timestamp_opt(timestamp, 0).single()?;
                Some(VisitRecord {
                    client_id,
                    timestamp,
                    page_view_count: views.max(1) as u32,
                    time_on_site_seconds: seconds.max(0) as u32,
                    device_class: DeviceClass::parse(&device),
                    browser_family: browser,
                    path,
                })
            },
        )
        .collect();

    Ok(records)
}

async fn load_conversions(
    state: &AppState,
    range_start: i64,
    range_end: i64,
) -> Result<Vec<DateTime<Utc>>, AppError> {
    let rows = state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT timestamp FROM enquiries
                 WHERE timestamp >= ?1 AND timestamp <= ?2",
            )?;

            let rows = stmt
                .query_map(params![range_start, range_end], |row| row.get::<_, i64>(0))?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await?;

    Ok(rows
        .into_iter()
        .filter_map(|ts| Utc.timestamp_opt(ts, 0).single())
        .collect())
}
