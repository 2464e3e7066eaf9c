//! Bot Configuration
//!
//! Two layers: process-wide settings from the environment (`Config`), and
//! one personality file per bot (`BotConfig`) loaded with the `config` crate.

use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::curve::BondingCurve;
use crate::error::ConfigError;

/// Avalanche Fuji
pub const DEFAULT_CHAIN_ID: u64 = 43113;

const KEY_PLACEHOLDER: &str = "SET_IN_ENV_LOCAL";

/// Process configuration loaded from environment
#[derive(Debug, Clone)]
pub struct Config {
    pub rpc_url: String,
    pub factory_address: String,
    pub chain_id: u64,
    pub webhook_url: Option<String>,
    pub bot_secret: String,
    pub cache_dir: PathBuf,
    pub bot_configs: Vec<PathBuf>,
    pub force_cache_refresh: bool,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let rpc_url = std::env::var("RPC_URL")
            .or_else(|_| std::env::var("AVALANCHE_RPC_URL"))
            .unwrap_or_else(|_| "https://api.avax-test.network/ext/bc/C/rpc".to_string());

        let factory_address = std::env::var("FACTORY_ADDRESS")
            .or_else(|_| std::env::var("TOKEN_FACTORY_ADDRESS"))
            .map_err(|_| anyhow::anyhow!("FACTORY_ADDRESS environment variable required"))?;

        let chain_id = match std::env::var("CHAIN_ID") {
            Ok(raw) => raw
                .parse::<u64>()
                .map_err(|e| anyhow::anyhow!("Invalid CHAIN_ID: {}", e))?,
            Err(_) => DEFAULT_CHAIN_ID,
        };

        let webhook_url = std::env::var("WEBHOOK_URL").ok().filter(|u| !u.is_empty());
        if let Some(ref raw) = webhook_url {
            url::Url::parse(raw).map_err(|e| anyhow::anyhow!("Invalid WEBHOOK_URL: {}", e))?;
        }

        let bot_secret = std::env::var("WEBHOOK_SECRET")
            .or_else(|_| std::env::var("BOT_SECRET"))
            .unwrap_or_else(|_| "dev".to_string());

        let cache_dir = std::env::var("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| default_cache_dir());

        let bot_configs = match std::env::var("BOT_CONFIGS") {
            Ok(list) => list
                .split(',')
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(PathBuf::from)
                .collect(),
            Err(_) => {
                let dir = std::env::var("BOTS_DIR").unwrap_or_else(|_| "bots".to_string());
                discover_bot_configs(Path::new(&dir))?
            }
        };

        let force_cache_refresh = std::env::var("FORCE_CACHE_REFRESH")
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false);

        Ok(Config {
            rpc_url,
            factory_address,
            chain_id,
            webhook_url,
            bot_secret,
            cache_dir,
            bot_configs,
            force_cache_refresh,
        })
    }
}

fn default_cache_dir() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volume-bot")
}

/// Every `*.toml` / `*.json` file in `dir`, sorted by name
pub fn discover_bot_configs(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let mut paths: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| anyhow::anyhow!("Cannot read bots directory {}: {}", dir.display(), e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| {
            matches!(
                p.extension().and_then(|e| e.to_str()),
                Some("toml") | Some("json")
            )
        })
        .collect();
    paths.sort();
    Ok(paths)
}

/// One bot's personality file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BotConfig {
    pub name: String,
    #[serde(default)]
    pub display_name: String,
    #[serde(default = "default_avatar_url")]
    pub avatar_url: String,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub personality: Personality,
    #[serde(default)]
    pub phrases: Phrases,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub curve: BondingCurve,
    /// Discouraged; prefer `BOT_{NAME}_PRIVATE_KEY`
    #[serde(default, skip_serializing)]
    pub private_key: Option<String>,
}

impl BotConfig {
    /// Load and validate a bot file (TOML or JSON, by extension)
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .build()?;
        let mut bot: BotConfig = settings.try_deserialize()?;
        if bot.display_name.is_empty() {
            bot.display_name = bot.name.clone();
        }
        bot.validate()?;
        Ok(bot)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(invalid("name", "must not be empty"));
        }
        self.personality.validate()?;
        if self.cache.cache_duration_hours < 0.0 {
            return Err(invalid("cache_duration_hours", "must not be negative"));
        }
        if self.execution.max_attempts == 0 {
            return Err(invalid("max_attempts", "must be at least 1"));
        }
        if self.execution.creation_amount <= Decimal::ZERO {
            return Err(invalid("creation_amount", "must be positive"));
        }
        Ok(())
    }

    /// Find the signing key for this bot.
    ///
    /// Lookup order: `BOT_{NAME}_PRIVATE_KEY`, `BOT_PRIVATE_KEY`,
    /// `PRIVATE_KEY`, then `private_key` from the file. The placeholder
    /// `SET_IN_ENV_LOCAL` is skipped wherever it appears.
    pub fn resolve_private_key(&self) -> Result<String, ConfigError> {
        self.resolve_private_key_with(|key| std::env::var(key).ok())
    }

    pub fn resolve_private_key_with<F>(&self, lookup: F) -> Result<String, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let bot_key = format!("BOT_{}_PRIVATE_KEY", self.name.to_uppercase());
        let candidates = [
            lookup(&bot_key),
            lookup("BOT_PRIVATE_KEY"),
            lookup("PRIVATE_KEY"),
            self.private_key.clone(),
        ];

        candidates
            .into_iter()
            .flatten()
            .map(|k| k.trim().to_string())
            .find(|k| !k.is_empty() && k != KEY_PLACEHOLDER)
            .map(|k| if k.starts_with("0x") { k } else { format!("0x{}", k) })
            .ok_or_else(|| ConfigError::MissingKey(self.name.clone()))
    }
}

fn default_avatar_url() -> String { "/default-avatar.png".to_string() }

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.into(),
    }
}

/// Trading temperament
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Personality {
    #[serde(default = "default_buy_bias")]
    pub buy_bias: f64,
    #[serde(default = "default_risk_tolerance")]
    pub risk_tolerance: f64,
    #[serde(default = "default_min_trade_amount")]
    pub min_trade_amount: Decimal,
    #[serde(default = "default_max_trade_amount")]
    pub max_trade_amount: Decimal,
    #[serde(default = "default_min_interval")]
    pub min_interval: u64,
    #[serde(default = "default_max_interval")]
    pub max_interval: u64,
    #[serde(default = "default_create_token_chance")]
    pub create_token_chance: f64,
}

impl Default for Personality {
    fn default() -> Self {
        Self {
            buy_bias: default_buy_bias(),
            risk_tolerance: default_risk_tolerance(),
            min_trade_amount: default_min_trade_amount(),
            max_trade_amount: default_max_trade_amount(),
            min_interval: default_min_interval(),
            max_interval: default_max_interval(),
            create_token_chance: default_create_token_chance(),
        }
    }
}

fn default_buy_bias() -> f64 { 0.6 }
fn default_risk_tolerance() -> f64 { 0.5 }
fn default_min_trade_amount() -> Decimal { Decimal::new(5, 3) }
fn default_max_trade_amount() -> Decimal { Decimal::new(2, 2) }
fn default_min_interval() -> u64 { 15 }
fn default_max_interval() -> u64 { 60 }
fn default_create_token_chance() -> f64 { 0.02 }

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Mood {
    Bullish,
    Aggressive,
    Bearish,
    Cautious,
    Neutral,
}

impl Personality {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("buy_bias", self.buy_bias),
            ("risk_tolerance", self.risk_tolerance),
            ("create_token_chance", self.create_token_chance),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(invalid(field, format!("{} not in [0, 1]", value)));
            }
        }

        for (field, value) in [
            ("min_interval", self.min_interval),
            ("max_interval", self.max_interval),
        ] {
            if !(1..=3600).contains(&value) {
                return Err(invalid(field, format!("{}s not in [1, 3600]", value)));
            }
        }
        if self.max_interval < self.min_interval {
            return Err(invalid("max_interval", "must be >= min_interval"));
        }

        let lo = Decimal::new(1, 4);
        let hi = Decimal::from(1000);
        for (field, value) in [
            ("min_trade_amount", self.min_trade_amount),
            ("max_trade_amount", self.max_trade_amount),
        ] {
            if value < lo || value > hi {
                return Err(invalid(field, format!("{} not in [0.0001, 1000]", value)));
            }
        }
        if self.max_trade_amount < self.min_trade_amount {
            return Err(invalid("max_trade_amount", "must be >= min_trade_amount"));
        }
        Ok(())
    }

    pub fn mood(&self) -> Mood {
        if self.buy_bias > 0.7 {
            Mood::Bullish
        } else if self.risk_tolerance > 0.8 {
            Mood::Aggressive
        } else if self.buy_bias < 0.3 {
            Mood::Bearish
        } else if self.risk_tolerance < 0.3 {
            Mood::Cautious
        } else {
            Mood::Neutral
        }
    }

    /// Balance below which the bot reports itself as running low
    pub fn low_balance_threshold(&self) -> Decimal {
        self.min_trade_amount * Decimal::TWO
    }
}

/// Flavour text attached to reported events
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct Phrases {
    #[serde(default = "default_buy_phrases")]
    pub buy: Vec<String>,
    #[serde(default = "default_sell_phrases")]
    pub sell: Vec<String>,
    #[serde(default = "default_create_phrases")]
    pub create_token: Vec<String>,
    #[serde(default = "default_error_phrases")]
    pub error: Vec<String>,
}

impl Default for Phrases {
    fn default() -> Self {
        Self {
            buy: default_buy_phrases(),
            sell: default_sell_phrases(),
            create_token: default_create_phrases(),
            error: default_error_phrases(),
        }
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn default_buy_phrases() -> Vec<String> {
    strings(&[
        "Going long! 📈",
        "Buying the dip! 💎",
        "This looks bullish! 🚀",
        "Adding to my position! 💰",
    ])
}

fn default_sell_phrases() -> Vec<String> {
    strings(&[
        "Taking profits! 💰",
        "Time to secure gains! ✅",
        "Partial exit here! 📉",
        "Booking some wins! 🎯",
    ])
}

fn default_create_phrases() -> Vec<String> {
    strings(&[
        "Launching something new! 🚀",
        "Fresh opportunity incoming! ✨",
        "Creating the next gem! 💎",
    ])
}

fn default_error_phrases() -> Vec<String> {
    strings(&[
        "Minor technical hiccup! 🔧",
        "Temporary setback! ⏰",
        "Quick system adjustment! ⚙️",
    ])
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct CacheConfig {
    #[serde(default = "default_cache_duration_hours")]
    pub cache_duration_hours: f64,
    /// Ignore the snapshot's freshness on startup
    #[serde(default)]
    pub force_refresh: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_duration_hours: default_cache_duration_hours(),
            force_refresh: false,
        }
    }
}

fn default_cache_duration_hours() -> f64 { 6.0 }

/// Execution configuration (slippage, quote tolerance, retries, timeouts)
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ExecutionConfig {
    /// Max slippage in basis points (e.g., 100 for 1%)
    #[serde(default = "default_max_slippage_bps")]
    pub max_slippage_bps: u32,
    /// Max deviation between local curve estimate and on-chain quote
    #[serde(default = "default_price_tolerance_bps")]
    pub price_tolerance_bps: u32,
    /// Receipt wait in seconds
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,
    /// Native amount seeded into newly created tokens
    #[serde(default = "default_creation_amount")]
    pub creation_amount: Decimal,
    /// Submission attempts, first try included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_heartbeat_interval_secs")]
    pub heartbeat_interval_secs: u64,
    /// Upper bound on a single event report
    #[serde(default = "default_notify_timeout_secs")]
    pub notify_timeout_secs: u64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_slippage_bps: default_max_slippage_bps(),
            price_tolerance_bps: default_price_tolerance_bps(),
            confirm_timeout_secs: default_confirm_timeout_secs(),
            creation_amount: default_creation_amount(),
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            heartbeat_interval_secs: default_heartbeat_interval_secs(),
            notify_timeout_secs: default_notify_timeout_secs(),
        }
    }
}

fn default_max_slippage_bps() -> u32 { 500 }
fn default_price_tolerance_bps() -> u32 { 200 }
fn default_confirm_timeout_secs() -> u64 { 120 }
fn default_creation_amount() -> Decimal { Decimal::new(1, 2) }
fn default_max_attempts() -> u32 { 3 }
fn default_base_delay_ms() -> u64 { 1000 }
fn default_max_delay_ms() -> u64 { 8000 }
fn default_heartbeat_interval_secs() -> u64 { 300 }
fn default_notify_timeout_secs() -> u64 { 30 }

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn write_file(dir: &tempfile::TempDir, name: &str, body: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    #[test]
    fn test_load_toml_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "billy.toml",
            r#"
name = "bullish_billy"

[personality]
buy_bias = 0.8
risk_tolerance = 0.7
"#,
        );

        let bot = BotConfig::load(&path).unwrap();
        assert_eq!(bot.name, "bullish_billy");
        assert_eq!(bot.display_name, "bullish_billy");
        assert_eq!(bot.personality.buy_bias, 0.8);
        assert_eq!(bot.personality.min_interval, 15);
        assert_eq!(bot.personality.min_trade_amount, Decimal::new(5, 3));
        assert_eq!(bot.cache.cache_duration_hours, 6.0);
        assert_eq!(bot.execution.max_attempts, 3);
        assert!(!bot.phrases.buy.is_empty());
        assert_eq!(bot.personality.mood(), Mood::Bullish);
    }

    #[test]
    fn test_load_rejects_out_of_range() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_file(
            &dir,
            "bad.toml",
            r#"
name = "bad"

[personality]
buy_bias = 1.5
"#,
        );

        match BotConfig::load(&path) {
            Err(ConfigError::Invalid { field, .. }) => assert_eq!(field, "buy_bias"),
            other => panic!("expected invalid buy_bias, got {:?}", other.map(|b| b.name)),
        }
    }

    #[test]
    fn test_validate_ordering() {
        let mut p = Personality::default();
        p.min_interval = 60;
        p.max_interval = 30;
        assert!(p.validate().is_err());

        let mut p = Personality::default();
        p.min_trade_amount = Decimal::new(5, 2);
        p.max_trade_amount = Decimal::new(1, 2);
        assert!(p.validate().is_err());

        let mut p = Personality::default();
        p.max_trade_amount = Decimal::from(5000);
        assert!(p.validate().is_err());

        assert!(Personality::default().validate().is_ok());
    }

    #[test]
    fn test_mood() {
        let mut p = Personality::default();
        assert_eq!(p.mood(), Mood::Neutral);
        p.risk_tolerance = 0.9;
        assert_eq!(p.mood(), Mood::Aggressive);
        p.risk_tolerance = 0.2;
        assert_eq!(p.mood(), Mood::Cautious);
        p.buy_bias = 0.1;
        assert_eq!(p.mood(), Mood::Bearish);
    }

    #[test]
    fn test_private_key_lookup_order() {
        let mut bot: BotConfig = serde_json::from_str(r#"{"name": "jax"}"#).unwrap();
        bot.private_key = Some("filekey".to_string());

        let env: HashMap<&str, &str> = HashMap::from([
            ("BOT_JAX_PRIVATE_KEY", "SET_IN_ENV_LOCAL"),
            ("BOT_PRIVATE_KEY", "abc123"),
            ("PRIVATE_KEY", "0xdef"),
        ]);
        let key = bot
            .resolve_private_key_with(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(key, "0xabc123");

        let key = bot.resolve_private_key_with(|_| None).unwrap();
        assert_eq!(key, "0xfilekey");

        bot.private_key = None;
        assert!(matches!(
            bot.resolve_private_key_with(|_| None),
            Err(ConfigError::MissingKey(_))
        ));
    }

    #[test]
    fn test_discover_bot_configs() {
        let dir = tempfile::tempdir().unwrap();
        write_file(&dir, "b.toml", "name = \"b\"");
        write_file(&dir, "a.json", "{\"name\": \"a\"}");
        write_file(&dir, "notes.txt", "ignored");

        let found = discover_bot_configs(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.json", "b.toml"]);
    }
}
