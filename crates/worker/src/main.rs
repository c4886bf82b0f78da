use clap::Parser;
use anyhow::Context;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use smp_core::config::Settings;
use smp_core::dashboard::{build_dashboard, DashboardReport, DashboardRequest, Panel};
use smp_core::ingest::MarketDataFetcher;
use smp_core::watchlist::{self, WatchlistEntry, WatchlistSession};

#[derive(Debug, Parser)]
#[command(name = "smp_worker")]
struct Args {
    /// Ticker to analyze. Defaults to DEFAULT_TICKER (AAPL).
    #[arg(long)]
    ticker: Option<String>,

    /// Forecast horizon in years.
    #[arg(long, default_value_t = 3, value_parser = clap::value_parser!(u32).range(1..=4))]
    years: u32,

    /// Also refresh the intraday watchlist.
    #[arg(long)]
    watchlist: bool,

    /// Print the full report as JSON instead of a log summary.
    #[arg(long)]
    json: bool,
}

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

    let args = Args::parse();

    let ticker = args.ticker.as_deref().unwrap_or(&settings.default_ticker);
    let request = DashboardRequest::new(ticker, args.years).context("invalid dashboard request")?;
    anyhow::ensure!(!request.ticker.is_empty(), "ticker must not be empty");

    let fetcher = MarketDataFetcher::from_settings(&settings).map_err(|e| {
        sentry_anyhow::capture_anyhow(&e);
        e
    })?;
    let today = chrono::Utc::now().with_timezone(&settings.display_tz).date_naive();

    let report = build_dashboard(&fetcher, &settings, &request, today).await;

    let entries = if args.watchlist {
        let mut session = WatchlistSession::new();
        watchlist::refresh(
            &fetcher,
            &settings.watchlist_symbols,
            &mut session,
            settings.source_tz,
            settings.display_tz,
        )
        .await;
        Some(watchlist::entries(&session))
    } else {
        None
    };

    if args.json {
        let out = serde_json::json!({
            "dashboard": report,
            "watchlist": entries,
        });
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    log_summary(&report);
    for entry in entries.iter().flatten() {
        match entry {
            WatchlistEntry::Available(q) => tracing::info!(
                ticker = %q.ticker,
                last_close = q.last_close,
                change = q.absolute_change,
                percent = q.percent_change,
                "watchlist"
            ),
            WatchlistEntry::Unavailable { ticker, message } => {
                tracing::info!(%ticker, %message, "watchlist")
            }
        }
    }

    Ok(())
}

fn log_summary(report: &DashboardReport) {
    if let Panel::Unavailable { reason } = &report.recent {
        tracing::warn!(ticker = %report.ticker, %reason, "no dashboard data");
        return;
    }

    match &report.forecast_tail {
        Panel::Ready(tail) => {
            if let Some(last) = tail.last() {
                tracing::info!(
                    ticker = %report.ticker,
                    report_id = %report.report_id,
                    bars = report.history_bars,
                    horizon_years = report.horizon_years,
                    ds = %last.ds,
                    yhat = last.yhat,
                    lower = last.yhat_lower,
                    upper = last.yhat_upper,
                    "forecast horizon end"
                );
            }
        }
        Panel::Unavailable { reason } => {
            tracing::warn!(ticker = %report.ticker, %reason, "forecast unavailable")
        }
    }
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
    fn years_are_bounded() {
        let args = Args::try_parse_from(["smp_worker", "--ticker", "msft", "--json"]).unwrap();
        assert_eq!(args.years, 3);
        assert!(args.json);
        assert!(Args::try_parse_from(["smp_worker", "--years", "5"]).is_err());
        assert!(Args::try_parse_from(["smp_worker", "--years", "0"]).is_err());
    }
}
