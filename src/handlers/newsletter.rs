use axum::{extract::State, http::StatusCode, Json};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;
use crate::handlers::enquiry::plausible_email;
use crate::AppState;

const LISTING_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct SubscribePayload {
    pub email: String,
}

#[derive(Debug, Serialize)]
pub struct Subscriber {
    pub id: i64,
    pub email: String,
    pub timestamp: i64,
}

pub async fn subscribe_newsletter(
    State(state): State<AppState>,
    Json(payload): Json<SubscribePayload>,
) -> Result<StatusCode, AppError> {
    if !plausible_email(&payload.email) {
        return Err(AppError::MalformedPayload);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    state
        .db
        .call(move |conn| {
            // Re-subscribing is a no-op rather than an error.
            let mut stmt = conn.prepare_cached(
                "INSERT OR IGNORE INTO newsletter_subscribers (email, timestamp)
                 VALUES (?1, ?2)",
            )?;
            stmt.execute(params![payload.email.trim(), timestamp])?;
            Ok(())
        })
        .await?;

    Ok(StatusCode::CREATED)
}

pub async fn list_subscribers(
    State(state): State<AppState>,
) -> Result<Json<Vec<Subscriber>>, AppError> {
    let subscribers = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, email, timestamp
                 FROM newsletter_subscribers
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )?;

            let rows = stmt
                .query_map(params![LISTING_LIMIT], |row| {
                    Ok(Subscriber {
                        id: row.get(0)?,
                        email: row.get(1)?,
                        timestamp: row.get(2)?,
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await?;

    Ok(Json(subscribers))
}
