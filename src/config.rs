use std::collections::HashMap;
use std::str::FromStr;
use thiserror::Error;

use crate::domain::Asset;

const DAY_MS: i64 = 24 * 60 * 60 * 1000;

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub bind_addr: String,
    pub binance_spot_url: String,
    pub binance_futures_url: String,
    pub bybit_api_url: String,
    pub mexc_api_url: String,
    pub recv_window_ms: u64,
    pub http_timeout_ms: u64,
    pub quote_asset: Asset,
    pub quote_priority: Vec<Asset>,
    pub bridge_assets: Vec<Asset>,
    pub symbol_cap: usize,
    pub window_concurrency: usize,
    pub max_cursor_pages: usize,
    /// Upper bound on query windows per symbol and import.
    pub max_windows: usize,
    pub history_lookback_ms: i64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            bind_addr: "127.0.0.1".to_string(),
            binance_spot_url: "https://api.binance.com".to_string(),
            binance_futures_url: "https://fapi.binance.com".to_string(),
            bybit_api_url: "https://api.bybit.com".to_string(),
            mexc_api_url: "https://api.mexc.com".to_string(),
            recv_window_ms: 5000,
            http_timeout_ms: 10_000,
            quote_asset: Asset::from("USDT"),
            quote_priority: assets("USDT,USDC,FDUSD,BTC,ETH,BNB"),
            bridge_assets: assets("USDT,BTC,ETH,BNB"),
            symbol_cap: 60,
            window_concurrency: 4,
            max_cursor_pages: 50,
            max_windows: 400,
            history_lookback_ms: 30 * DAY_MS,
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        let defaults = Config::default();

        let port = parse_or(&env_map, "PORT", defaults.port, "must be a valid u16")?;
        let bind_addr = string_or(&env_map, "BIND_ADDR", defaults.bind_addr);
        let binance_spot_url = string_or(&env_map, "BINANCE_SPOT_URL", defaults.binance_spot_url);
        let binance_futures_url =
            string_or(&env_map, "BINANCE_FUTURES_URL", defaults.binance_futures_url);
        let bybit_api_url = string_or(&env_map, "BYBIT_API_URL", defaults.bybit_api_url);
        let mexc_api_url = string_or(&env_map, "MEXC_API_URL", defaults.mexc_api_url);

        let recv_window_ms: u64 = parse_or(
            &env_map,
            "RECV_WINDOW_MS",
            defaults.recv_window_ms,
            "must be a valid u64",
        )?;
        if !(1..=60_000).contains(&recv_window_ms) {
            return Err(ConfigError::InvalidValue(
                "RECV_WINDOW_MS".to_string(),
                format!("must be between 1 and 60000, got {}", recv_window_ms),
            ));
        }

        let http_timeout_ms: u64 = parse_or(
            &env_map,
            "HTTP_TIMEOUT_MS",
            defaults.http_timeout_ms,
            "must be a valid u64",
        )?;

        let quote_asset = env_map
            .get("QUOTE_ASSET")
            .map(|s| Asset::new(s.as_str()))
            .unwrap_or(defaults.quote_asset);
        if quote_asset.as_str().is_empty() {
            return Err(ConfigError::InvalidValue(
                "QUOTE_ASSET".to_string(),
                "must not be empty".to_string(),
            ));
        }

        let quote_priority = asset_list_or(&env_map, "QUOTE_PRIORITY", defaults.quote_priority)?;
        let bridge_assets = asset_list_or(&env_map, "BRIDGE_ASSETS", defaults.bridge_assets)?;

        let symbol_cap = positive_or(&env_map, "SYMBOL_CAP", defaults.symbol_cap)?;
        let window_concurrency =
            positive_or(&env_map, "WINDOW_CONCURRENCY", defaults.window_concurrency)?;
        let max_cursor_pages = positive_or(&env_map, "MAX_CURSOR_PAGES", defaults.max_cursor_pages)?;
        let max_windows = positive_or(&env_map, "MAX_WINDOWS", defaults.max_windows)?;

        let history_lookback_ms: i64 = parse_or(
            &env_map,
            "HISTORY_LOOKBACK_MS",
            defaults.history_lookback_ms,
            "must be a valid i64",
        )?;
        if history_lookback_ms <= 0 {
            return Err(ConfigError::InvalidValue(
                "HISTORY_LOOKBACK_MS".to_string(),
                "must be positive".to_string(),
            ));
        }

        Ok(Config {
            port,
            bind_addr,
            binance_spot_url,
            binance_futures_url,
            bybit_api_url,
            mexc_api_url,
            recv_window_ms,
            http_timeout_ms,
            quote_asset,
            quote_priority,
            bridge_assets,
            symbol_cap,
            window_concurrency,
            max_cursor_pages,
            max_windows,
            history_lookback_ms,
        })
    }
}

fn string_or(env_map: &HashMap<String, String>, key: &str, default: String) -> String {
    env_map
        .get(key)
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or(default)
}

fn parse_or<T: FromStr>(
    env_map: &HashMap<String, String>,
    key: &str,
    default: T,
    expectation: &str,
) -> Result<T, ConfigError> {
    match env_map.get(key) {
        Some(raw) => raw
            .trim()
            .parse::<T>()
            .map_err(|_| ConfigError::InvalidValue(key.to_string(), expectation.to_string())),
        None => Ok(default),
    }
}

fn positive_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: usize,
) -> Result<usize, ConfigError> {
    let value: usize = parse_or(env_map, key, default, "must be a positive integer")?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be a positive integer".to_string(),
        ));
    }
    Ok(value)
}

fn asset_list_or(
    env_map: &HashMap<String, String>,
    key: &str,
    default: Vec<Asset>,
) -> Result<Vec<Asset>, ConfigError> {
    match env_map.get(key) {
        Some(raw) => {
            let list = assets(raw);
            if list.is_empty() {
                Err(ConfigError::InvalidValue(
                    key.to_string(),
                    "must list at least one asset".to_string(),
                ))
            } else {
                Ok(list)
            }
        }
        None => Ok(default),
    }
}

fn assets(csv: &str) -> Vec<Asset> {
    csv.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(Asset::from)
        .collect()
}
