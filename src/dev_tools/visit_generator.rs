use axum::http::HeaderMap;
use rand::{rngs::StdRng, seq::SliceRandom, Rng, SeedableRng};
use rusqlite::params;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::time::sleep;
use tracing::info;

use crate::handlers::visit::TrackPayload;
use crate::tracker::VisitTracker;
use crate::AppState;

const SAMPLE_PAGES: &[&str] = &[
    "/",
    "/products/cctv",
    "/products/access-control",
    "/products/alarms",
    "/solutions",
    "/blog",
    "/about",
    "/contact",
];

const SAMPLE_USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.124 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.1.1 Safari/605.1.15",
    "Mozilla/5.0 (iPhone; CPU iPhone OS 14_6 like Mac OS X) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0 Mobile/15E148 Safari/604.1",
    "Mozilla/5.0 (Linux; Android 11; SM-G991B) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/91.0.4472.120 Mobile Safari/537.36",
];

const SAMPLE_IPS: &[&str] = &[
    "8.8.8.8",
    "178.79.163.10",
    "35.158.210.4",
    "52.69.12.7",
    "13.54.33.2",
    "41.79.15.6",
];

const SAMPLE_NAMES: &[&str] = &["Alex Carter", "Priya Shah", "Tomas Novak", "Dana Reyes"];

pub struct VisitGenerator {
    state: AppState,
    base_url: String,
}

impl VisitGenerator {
    pub fn new(state: AppState, base_url: String) -> Self {
        Self { state, base_url }
    }

    pub async fn start(&self) {
        info!("Starting synthetic visit generation for development...");

        let mut rng = StdRng::from_entropy();

        loop {
            let page = *SAMPLE_PAGES.choose(&mut rng).unwrap();
            let ip = *SAMPLE_IPS.choose(&mut rng).unwrap();
            let addr: SocketAddr = format!("{}:12345", ip).parse().unwrap();

            let mut headers = HeaderMap::new();
            headers.insert(
                "user-agent",
                SAMPLE_USER_AGENTS.choose(&mut rng).unwrap().parse().unwrap(),
            );
            headers.insert("x-forwarded-for", ip.parse().unwrap());

            let payload = TrackPayload {
                page_url: format!("{}{}", self.base_url, page),
            };

            let tracker = VisitTracker::new(self.state.clone());
            if let Err(e) = tracker.record(addr, headers, payload).await {
                info!("Failed to process synthetic visit: {:?}", e);
            }

            // Occasionally fabricate a contact enquiry so conversion metrics
            // have data to work with.
            if rng.gen_ratio(1, 20) {
                self.insert_enquiry(&mut rng).await;
            }

            let delay = rng.gen_range(2..10);
            sleep(Duration::from_secs(delay)).await;
        }
    }

    async fn insert_enquiry(&self, rng: &mut StdRng) {
        let name = SAMPLE_NAMES.choose(rng).unwrap().to_string();
        let email = format!(
            "{}@example.com",
            name.to_lowercase().replace(' ', ".")
        );
        let timestamp = chrono::Utc::now().timestamp();

        let result = self
            .state
            .db
            .call(move |conn| {
                conn.execute(
                    "INSERT INTO enquiries (name, email, phone, message, timestamp)
                     VALUES (?1, ?2, NULL, ?3, ?4)",
                    params![name, email, "Synthetic enquiry for development", timestamp],
                )?;
                Ok(())
            })
            .await;

        if let Err(e) = result {
            info!("Failed to insert synthetic enquiry: {:?}", e);
        }
    }
}
