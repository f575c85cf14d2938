use axum::http::{HeaderMap, StatusCode};
use rusqlite::params;
use sha2::{Digest, Sha256};
use std::net::SocketAddr;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;
use url::Url;

use crate::error::AppError;
use crate::handlers::visit::TrackPayload;
use crate::remote_ip::RemoteIp;
use crate::report::DeviceClass;
use crate::AppState;

// A visit stays open while page views keep arriving within this gap.
const SESSION_WINDOW_SECONDS: i64 = 1800;

pub struct VisitTracker {
    state: AppState,
}

impl VisitTracker {
    pub fn new(state: AppState) -> Self {
        Self { state }
    }

    fn extract_user_agent(headers: &HeaderMap) -> String {
        headers
            .get("user-agent")
            .and_then(|h| h.to_str().ok())
            .unwrap_or("unknown")
            .to_string()
    }

    fn extract_path(page_url: &str) -> String {
        Url::parse(page_url)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| {
                if page_url.starts_with('/') {
                    page_url.to_string()
                } else {
                    "/".to_string()
                }
            })
    }

    fn current_timestamp() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap()
            .as_secs() as i64
    }

    pub async fn record(
        &self,
        addr: SocketAddr,
        headers: HeaderMap,
        payload: TrackPayload,
    ) -> Result<StatusCode, AppError> {
        let ip = RemoteIp::get(&headers, &addr);
        let user_agent = Self::extract_user_agent(&headers);
        let client_id = client_id(&ip, &user_agent);
        let (browser_family, device_class) = self.state.classify_user_agent(&user_agent);
        let path = Self::extract_path(&payload.page_url);
        let now = Self::current_timestamp();

        match self.find_active_visit(&client_id, now).await? {
            Some(visit_id) => {
                debug!("Extending visit {visit_id} for client {client_id}");
                self.touch_visit(visit_id, now).await?;
            }
            None => {
                self.create_visit(&client_id, &browser_family, device_class, &path, now)
                    .await?;
            }
        }

        Ok(StatusCode::CREATED)
    }

    async fn find_active_visit(
        &self,
        client_id: &str,
        now: i64,
    ) -> Result<Option<i64>, AppError> {
        let client_id = client_id.to_string();
        let result = self
            .state
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "SELECT id FROM visits
                     WHERE client_id = ?1
                     AND last_activity_at >= ?2
                     ORDER BY timestamp DESC
                     LIMIT 1",
                )?;

                let result = stmt.query_row(
                    params![client_id, now - SESSION_WINDOW_SECONDS],
                    |row| row.get::<_, i64>(0),
                );

                match result {
                    Ok(id) => Ok(Some(id)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(tokio_rusqlite::Error::from(e)),
                }
            })
            .await?;
        Ok(result)
    }

    async fn create_visit(
        &self,
        client_id: &str,
        browser_family: &str,
        device_class: DeviceClass,
        path: &str,
        now: i64,
    ) -> Result<(), AppError> {
        let client_id = client_id.to_string();
        let browser_family = browser_family.to_string();
        let path = path.to_string();

        self.state
            .db
            .call(move |conn| {
                let mut stmt = conn.prepare_cached(
                    "INSERT INTO visits (
                        client_id, page_view_count, time_on_site_seconds,
                        device_class, browser_family, path,
                        timestamp, last_activity_at
                    ) VALUES (?1, 1, 0, ?2, ?3, ?4, ?5, ?5)",
                )?;

                stmt.execute(params![
                    client_id,
                    device_class.as_str(),
                    browser_family,
                    path,
                    now,
                ])?;
                Ok(())
            })
            .await?;
        Ok(())
    }

    async fn touch_visit(&self, visit_id: i64, now: i64) -> Result<(), AppError> {
        self.state
            .db
            .call(move |conn| {
                conn.execute(
                    "UPDATE visits
                     SET page_view_count = page_view_count + 1,
                         last_activity_at = ?1,
                         time_on_site_seconds = ?1 - timestamp
                     WHERE id = ?2",
                    params![now, visit_id],
                )?;
                Ok(())
            })
            .await?;
        Ok(())
    }
}

/// Proxy identity for a visitor: a truncated digest of remote address and
/// user agent. Collides behind shared NATs and shifts when either input
/// changes, which the reporting side treats as an accepted approximation.
pub fn client_id(ip: &str, user_agent: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(ip.as_bytes());
    hasher.update(user_agent.as_bytes());
    let digest = hasher.finalize();
    digest
        .iter()
        .take(16)
        .map(|byte| format!("{byte:02x}"))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_id_is_deterministic() {
        let a = client_id("192.0.2.1", "Mozilla/5.0");
        let b = client_id("192.0.2.1", "Mozilla/5.0");
        assert_eq!(a, b);
        assert_eq!(a.len(), 32);
    }

    #[test]
    fn client_id_varies_with_inputs() {
        let base = client_id("192.0.2.1", "Mozilla/5.0");
        assert_ne!(base, client_id("192.0.2.2", "Mozilla/5.0"));
        assert_ne!(base, client_id("192.0.2.1", "curl/8.0"));
    }

    #[test]
    fn path_extraction_handles_full_urls_and_bare_paths() {
        assert_eq!(
            VisitTracker::extract_path("https://example.com/products/cctv?ref=ad"),
            "/products/cctv"
        );
        assert_eq!(VisitTracker::extract_path("/contact"), "/contact");
        assert_eq!(VisitTracker::extract_path("not a url"), "/");
    }
}
