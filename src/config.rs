//! 設定の読み込み。
//!
//! 優先順位 (低 → 高):
//! 1. 組み込みの既定値
//! 2. TOML ファイル (既定は `collatz.toml`、無ければ無視)
//! 3. `COLLATZ_` で始まる環境変数

use std::path::{Path, PathBuf};
use std::time::Duration;

use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};

use crate::candidate::{CandidateMode, MAX_RANGE_FACTOR, MIN_RANGE_FACTOR};
use crate::engine::{DEFAULT_INTERACTIVE_CAP, DEFAULT_SEARCH_CAP};
use crate::error::{CollatzError, Result};
use crate::explorer::MIN_EXPLORER_CAP;
use crate::logging;
use crate::search::SearchConfig;

pub const DEFAULT_CONFIG_FILE: &str = "collatz.toml";

/// 検査間隔スライダーの上限 (ms)
pub const MAX_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// 検査済み台帳のパス
    pub ledger_path: PathBuf,
    pub interactive_cap: u64,
    pub search_cap: u64,
    pub delay_ms: u64,
    pub range_factor: u32,
    /// true なら乱数候補、false なら逐次候補
    pub random: bool,
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            ledger_path: PathBuf::from("checked_numbers.txt"),
            interactive_cap: DEFAULT_INTERACTIVE_CAP,
            search_cap: DEFAULT_SEARCH_CAP,
            delay_ms: 100,
            range_factor: 1,
            random: false,
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    /// 既定の場所から読み込む
    pub fn load() -> Result<Self> {
        Self::load_from(DEFAULT_CONFIG_FILE)
    }

    pub fn load_from(path: impl AsRef<Path>) -> Result<Self> {
        let settings: Settings = Figment::new()
            .merge(Serialized::defaults(Settings::default()))
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("COLLATZ_"))
            .extract()
            .map_err(|e| CollatzError::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        if self.interactive_cap < MIN_EXPLORER_CAP {
            return Err(CollatzError::Config(format!(
                "interactive_cap must be >= {}, got {}",
                MIN_EXPLORER_CAP, self.interactive_cap
            )));
        }
        if self.search_cap == 0 {
            return Err(CollatzError::Config("search_cap must be >= 1".to_string()));
        }
        if self.delay_ms > MAX_DELAY_MS {
            return Err(CollatzError::Config(format!(
                "delay_ms must be <= {}, got {}",
                MAX_DELAY_MS, self.delay_ms
            )));
        }
        if !(MIN_RANGE_FACTOR..=MAX_RANGE_FACTOR).contains(&self.range_factor) {
            return Err(CollatzError::Config(format!(
                "range_factor must be in {}..={}, got {}",
                MIN_RANGE_FACTOR, MAX_RANGE_FACTOR, self.range_factor
            )));
        }
        logging::parse_level(&self.log_level)?;
        if self.ledger_path.as_os_str().is_empty() {
            return Err(CollatzError::Config("ledger_path cannot be empty".to_string()));
        }
        Ok(())
    }

    pub fn candidate_mode(&self) -> CandidateMode {
        if self.random {
            CandidateMode::random(self.range_factor)
        } else {
            CandidateMode::Sequential
        }
    }

    pub fn search_config(&self) -> SearchConfig {
        SearchConfig {
            step_cap: self.search_cap,
            delay: Duration::from_millis(self.delay_ms),
            mode: self.candidate_mode(),
            ..SearchConfig::default()
        }
    }
}
