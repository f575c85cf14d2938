use axum::{extract::State, http::StatusCode, Json};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::AppError;
use crate::AppState;

const LISTING_LIMIT: i64 = 100;

#[derive(Debug, Deserialize)]
pub struct EnquiryPayload {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct Enquiry {
    pub id: i64,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub message: String,
    pub timestamp: i64,
}

pub async fn submit_enquiry(
    State(state): State<AppState>,
    Json(payload): Json<EnquiryPayload>,
) -> Result<StatusCode, AppError> {
    if payload.name.trim().is_empty()
        || payload.message.trim().is_empty()
        || !plausible_email(&payload.email)
    {
        return Err(AppError::MalformedPayload);
    }

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64;

    state
        .db
        .call(move |conn| {
            let mut stmt = conn.prepare_cached(
                "INSERT INTO enquiries (name, email, phone, message, timestamp)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
            )?;
            stmt.execute(params![
                payload.name.trim(),
                payload.email.trim(),
                payload.phone,
                payload.message.trim(),
                timestamp,
            ])?;
            Ok(())
        })
        .await?;

    Ok(StatusCode::CREATED)
}

pub async fn list_enquiries(
    State(state): State<AppState>,
) -> Result<Json<Vec<Enquiry>>, AppError> {
    let enquiries = state
        .db
        .call(|conn| {
            let mut stmt = conn.prepare_cached(
                "SELECT id, name, email, phone, message, timestamp
                 FROM enquiries
                 ORDER BY timestamp DESC
                 LIMIT ?1",
            )?;

            let rows = stmt
                .query_map(params![LISTING_LIMIT], |row| {
                    Ok(Enquiry {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        email: row.get(2)?,
                        phone: row.get(3)?,
                        message: row.get(4)?,
                        timestamp: row.get(5)?,
                    })
                })?
                .collect::<Result<Vec<_>, rusqlite::Error>>()?;
            Ok(rows)
        })
        .await?;

    Ok(Json(enquiries))
}

pub fn plausible_email(email: &str) -> bool {
    match email.trim().split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_ordinary_addresses() {
        assert!(plausible_email("sales@example.com"));
        assert!(plausible_email("  first.last@sub.example.co.uk "));
    }

    #[test]
    fn rejects_malformed_addresses() {
        assert!(!plausible_email(""));
        assert!(!plausible_email("no-at-sign"));
        assert!(!plausible_email("@example.com"));
        assert!(!plausible_email("user@nodot"));
        assert!(!plausible_email("user@.example"));
        assert!(!plausible_email("user@example."));
    }
}
