use axum::{
    extract::{ConnectInfo, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use serde::Deserialize;
use std::net::SocketAddr;

use crate::error::AppError;
use crate::tracker::VisitTracker;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct TrackPayload {
    #[serde(rename = "u")]
    pub page_url: String,
}

pub async fn track_visit(
    State(state): State<AppState>,
    ConnectInfo(addr): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<TrackPayload>,
) -> Result<StatusCode, AppError> {
    let tracker = VisitTracker::new(state);
    tracker.record(addr, headers, payload).await
}
