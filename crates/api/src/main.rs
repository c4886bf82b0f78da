use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::get,
    Json, Router,
};
use chrono::{NaiveDate, Utc};
use serde::Deserialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smp_core::config::Settings;
use smp_core::dashboard::{build_dashboard, DashboardReport, DashboardRequest};
use smp_core::ingest::{IntradayWindow, MarketDataFetcher};
use smp_core::time::{normalize, to_table, NormalizedTable};
use smp_core::watchlist::{self, WatchlistEntry, WatchlistSession};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let settings = Settings::from_env()?;
    let _sentry_guard = init_sentry(&settings);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .with(sentry_tracing::layer())
        .init();

    let fetcher = MarketDataFetcher::from_settings(&settings)?;
    tracing::info!(
        provider = fetcher.provider_name(),
        display_tz = %settings.display_tz,
        watchlist = ?settings.watchlist_symbols,
        "market data fetcher ready"
    );

    let state = AppState {
        fetcher: Arc::new(fetcher),
        settings: Arc::new(settings),
    };

    let app = Router::new()
        .route("/healthz", get(healthz))
        .route("/dashboard/:ticker", get(get_dashboard))
        .route("/watchlist", get(get_watchlist))
        .route("/intraday/:ticker", get(get_intraday))
        .with_state(state)
        .layer(TraceLayer::new_for_http());

    let port: u16 = std::env::var("PORT")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(3000);
    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));

    tracing::info!(%addr, "api listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

#[derive(Clone)]
struct AppState {
    fetcher: Arc<MarketDataFetcher>,
    settings: Arc<Settings>,
}

impl AppState {
    fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.settings.display_tz).date_naive()
    }
}

#[derive(Debug, Deserialize)]
struct DashboardQuery {
    years: Option<u32>,
}

async fn get_dashboard(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<DashboardQuery>,
) -> Result<Json<DashboardReport>, StatusCode> {
    let request = DashboardRequest::new(&ticker, query.years.unwrap_or(3)).map_err(|e| {
        tracing::info!(%ticker, error = %e, "rejected dashboard request");
        StatusCode::BAD_REQUEST
    })?;
    if request.ticker.is_empty() {
        return Err(StatusCode::BAD_REQUEST);
    }

    let report = build_dashboard(&state.fetcher, &state.settings, &request, state.today()).await;
    Ok(Json(report))
}

async fn get_watchlist(State(state): State<AppState>) -> Json<Vec<WatchlistEntry>> {
    let mut session = WatchlistSession::new();
    watchlist::refresh(
        &state.fetcher,
        &state.settings.watchlist_symbols,
        &mut session,
        state.settings.source_tz,
        state.settings.display_tz,
    )
    .await;
    Json(watchlist::entries(&session))
}

#[derive(Debug, Deserialize)]
struct IntradayQuery {
    window: Option<String>,
}

fn parse_window(raw: Option<&str>) -> Option<IntradayWindow> {
    match raw {
        None => Some(IntradayWindow::CurrentDay),
        Some(s) => IntradayWindow::parse(s),
    }
}

async fn get_intraday(
    State(state): State<AppState>,
    Path(ticker): Path<String>,
    Query(query): Query<IntradayQuery>,
) -> Result<Json<NormalizedTable>, StatusCode> {
    let window = parse_window(query.window.as_deref()).ok_or(StatusCode::BAD_REQUEST)?;

    let series = state
        .fetcher
        .fetch_intraday(&ticker, window)
        .await
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            tracing::warn!(%ticker, error = %e, "intraday fetch failed");
            StatusCode::BAD_GATEWAY
        })?;
    if series.is_empty() {
        return Err(StatusCode::NOT_FOUND);
    }

    let normalized = normalize(&series, state.settings.source_tz, state.settings.display_tz)
        .map_err(|e| {
            sentry_anyhow::capture_anyhow(&e);
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    Ok(Json(to_table(&normalized, state.settings.display_tz)))
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
}

fn init_sentry(settings: &Settings) -> Option<sentry::ClientInitGuard> {
    let dsn = settings.sentry_dsn.as_deref()?;
    Some(sentry::init((
        dsn,
        sentry::ClientOptions {
            release: sentry::release_name!(),
            ..Default::default()
        },
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intraday_window_defaults_to_current_day() {
        assert_eq!(parse_window(None), Some(IntradayWindow::CurrentDay));
        assert_eq!(parse_window(Some("7d")), Some(IntradayWindow::Trailing7Days));
        assert_eq!(parse_window(Some("1y")), None);
    }
}
