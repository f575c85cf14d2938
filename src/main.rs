use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use axum::{
    middleware::from_fn,
    routing::{get, post},
    Router,
};
use tokio_rusqlite::Connection;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uaparser::{Parser, UserAgentParser};

mod config;
mod dev_tools;
mod error;
mod handlers;
mod middleware;
mod migrations;
mod remote_ip;
mod report;
mod tracker;

use config::Config;
use dev_tools::visit_generator::VisitGenerator;
use handlers::{
    get_analytics_report, health_check, list_enquiries, list_subscribers, subscribe_newsletter,
    submit_enquiry, track_visit,
};
use report::DeviceClass;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Connection>,
    pub ua_parser: Option<Arc<UserAgentParser>>,
}

impl AppState {
    pub fn classify_user_agent(&self, user_agent: &str) -> (String, DeviceClass) {
        let browser_family = match &self.ua_parser {
            Some(parser) => parser.parse_user_agent(user_agent).family.to_string(),
            None => "Other".to_string(),
        };

        let device_family = self
            .ua_parser
            .as_ref()
            .map(|parser| parser.parse_device(user_agent).family.to_lowercase())
            .unwrap_or_default();
        let ua = user_agent.to_lowercase();

        let device_class = if device_family.contains("tablet") || ua.contains("ipad") {
            DeviceClass::Tablet
        } else if device_family.contains("phone")
            || ua.contains("iphone")
            || ua.contains("mobile")
            || ua.contains("android")
        {
            DeviceClass::Mobile
        } else {
            DeviceClass::Desktop
        };

        (browser_family, device_class)
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting sitepulse server...");

    let config = Config::load();

    let db = Connection::open(&config.database_path).await?;
    migrations::initialize_database(&db).await?;

    let ua_parser = if Path::new(&config.ua_regexes_path).exists() {
        Some(Arc::new(UserAgentParser::from_yaml(
            &config.ua_regexes_path,
        )?))
    } else {
        warn!(
            "User agent regexes not found at {}, using heuristic device detection",
            config.ua_regexes_path
        );
        None
    };

    let state = AppState {
        db: Arc::new(db),
        ua_parser,
    };

    if config.dev_generator {
        let generator_state = state.clone();
        tokio::spawn(async move {
            VisitGenerator::new(generator_state, "https://sitepulse.example".to_string())
                .start()
                .await;
        });
    }

    let admin_routes = Router::new()
        .route("/api/analytics", get(get_analytics_report))
        .route("/api/enquiries", get(list_enquiries))
        .route("/api/subscribers", get(list_subscribers))
        .route_layer(from_fn(middleware::basic_auth));

    let app = Router::new()
        .route("/health", get(health_check))
        .route("/api/event", post(track_visit))
        .route("/api/enquiry", post(submit_enquiry))
        .route("/api/newsletter", post(subscribe_newsletter))
        .nest("/admin", admin_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Server listening on http://{}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;
    Ok(())
}
