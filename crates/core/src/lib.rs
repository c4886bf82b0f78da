pub mod analytics;
pub mod dashboard;
pub mod domain;
pub mod forecast;
pub mod ingest;
pub mod time;
pub mod watchlist;

pub mod config {
    use anyhow::Context;
    use chrono::NaiveDate;
    use chrono_tz::Tz;

    pub const DEFAULT_BASE_URL: &str = "https://query1.finance.yahoo.com";
    pub const DEFAULT_TICKER: &str = "AAPL";
    pub const DEFAULT_WATCHLIST: [&str; 4] = ["AAPL", "GOOGL", "AMZN", "MSFT"];

    const DEFAULT_TIMEOUT_SECS: u64 = 30;
    const DEFAULT_RETRIES: u32 = 3;
    const DEFAULT_CACHE_TTL_SECS: i64 = 24 * 60 * 60;

    #[derive(Debug, Clone)]
    pub struct Settings {
        pub sentry_dsn: Option<String>,
        pub data_provider_base_url: String,
        pub data_provider_timeout_secs: u64,
        pub data_provider_retries: u32,
        pub history_start: NaiveDate,
        pub history_cache_ttl: chrono::Duration,
        pub source_tz: Tz,
        pub display_tz: Tz,
        pub watchlist_symbols: Vec<String>,
        pub default_ticker: String,
    }

    impl Default for Settings {
        fn default() -> Self {
            Self {
                sentry_dsn: None,
                data_provider_base_url: DEFAULT_BASE_URL.to_string(),
                data_provider_timeout_secs: DEFAULT_TIMEOUT_SECS,
                data_provider_retries: DEFAULT_RETRIES,
                history_start: default_history_start(),
                history_cache_ttl: chrono::Duration::seconds(DEFAULT_CACHE_TTL_SECS),
                source_tz: chrono_tz::UTC,
                display_tz: chrono_tz::US::Eastern,
                watchlist_symbols: DEFAULT_WATCHLIST.iter().map(|s| s.to_string()).collect(),
                default_ticker: DEFAULT_TICKER.to_string(),
            }
        }
    }

    impl Settings {
        pub fn from_env() -> anyhow::Result<Self> {
            let defaults = Self::default();

            let history_start = match env_non_empty("HISTORY_START") {
                Some(s) => NaiveDate::parse_from_str(&s, "%Y-%m-%d")
                    .with_context(|| format!("HISTORY_START must be YYYY-MM-DD (got {s})"))?,
                None => defaults.history_start,
            };

            let source_tz = match env_non_empty("SOURCE_TZ") {
                Some(s) => parse_tz(&s)?,
                None => defaults.source_tz,
            };
            let display_tz = match env_non_empty("DISPLAY_TZ") {
                Some(s) => parse_tz(&s)?,
                None => defaults.display_tz,
            };

            let watchlist_symbols = env_non_empty("WATCHLIST_SYMBOLS")
                .map(|s| parse_symbols(&s))
                .filter(|v| !v.is_empty())
                .unwrap_or(defaults.watchlist_symbols);

            Ok(Self {
                sentry_dsn: env_non_empty("SENTRY_DSN"),
                data_provider_base_url: env_non_empty("DATA_PROVIDER_BASE_URL")
                    .unwrap_or(defaults.data_provider_base_url),
                data_provider_timeout_secs: env_parse("DATA_PROVIDER_TIMEOUT_SECS")
                    .unwrap_or(defaults.data_provider_timeout_secs),
                data_provider_retries: env_parse("DATA_PROVIDER_RETRIES")
                    .unwrap_or(defaults.data_provider_retries),
                history_start,
                history_cache_ttl: env_parse::<i64>("HISTORY_CACHE_TTL_SECS")
                    .and_then(ttl_from_secs)
                    .unwrap_or(defaults.history_cache_ttl),
                source_tz,
                display_tz,
                watchlist_symbols,
                default_ticker: env_non_empty("DEFAULT_TICKER")
                    .map(|s| s.trim().to_ascii_uppercase())
                    .unwrap_or(defaults.default_ticker),
            })
        }
    }

    pub fn parse_tz(name: &str) -> anyhow::Result<Tz> {
        name.trim()
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("bad tz {name}: {e}"))
    }

    pub fn parse_symbols(s: &str) -> Vec<String> {
        s.split(',')
            .map(|part| part.trim().to_ascii_uppercase())
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// `None` when the value does not fit a `TimeDelta`.
    pub fn ttl_from_secs(secs: i64) -> Option<chrono::Duration> {
        chrono::TimeDelta::try_seconds(secs)
    }

    fn default_history_start() -> NaiveDate {
        NaiveDate::from_ymd_opt(2005, 1, 1).unwrap_or(NaiveDate::MIN)
    }

    fn env_non_empty(key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|s| !s.trim().is_empty())
    }

    fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
        std::env::var(key).ok().and_then(|s| s.trim().parse::<T>().ok())
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn defaults_match_dashboard_conventions() {
            let s = Settings::default();
            assert_eq!(s.default_ticker, "AAPL");
            assert_eq!(s.watchlist_symbols, vec!["AAPL", "GOOGL", "AMZN", "MSFT"]);
            assert_eq!(s.history_start, NaiveDate::from_ymd_opt(2005, 1, 1).unwrap());
            assert_eq!(s.history_cache_ttl, chrono::Duration::hours(24));
            assert_eq!(s.display_tz, chrono_tz::US::Eastern);
        }

        #[test]
        fn parses_symbol_lists_and_timezones() {
            assert_eq!(parse_symbols(" aapl, ,msft,"), vec!["AAPL", "MSFT"]);
            assert_eq!(parse_tz("US/Eastern").unwrap(), chrono_tz::US::Eastern);
            assert!(parse_tz("Mars/Olympus").is_err());
        }

        #[test]
        fn out_of_range_ttl_is_rejected_not_panicking() {
            assert_eq!(ttl_from_secs(3600), Some(chrono::Duration::hours(1)));
            assert_eq!(ttl_from_secs(i64::MAX), None);
            assert_eq!(ttl_from_secs(i64::MIN), None);
        }
    }
}
