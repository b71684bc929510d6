use std::io;

use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

use crate::error::{CollatzError, Result};

/// `off` を含むレベル名を解釈する。設定の検証もこれを使う
pub(crate) fn parse_level(level: &str) -> Result<LevelFilter> {
    level
        .parse::<LevelFilter>()
        .map_err(|_| CollatzError::Config(format!("unknown log level: {}", level)))
}

/// stderr への fmt サブスクライバを登録する。`RUST_LOG` があればそちらが優先。
///
/// 二度目以降の呼び出しは何もしない。
pub fn init(level: &str) -> Result<()> {
    let default_level = parse_level(level)?;
    let filter = EnvFilter::builder()
        .with_default_directive(default_level.into())
        .from_env_lossy();

    // 既に登録済みなら try_init が失敗するだけ
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .try_init();
    Ok(())
}
