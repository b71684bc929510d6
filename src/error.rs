use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// クレート共通のエラー型。
///
/// ステップ上限到達やサイクル検出はエラーではなく `Outcome` として返す。
#[derive(Error, Debug)]
pub enum CollatzError {
    /// 非正の開始値・ステップ上限など、計算前に弾く入力
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cannot parse integer: {0}")]
    Parse(String),

    #[error("ledger {path}: {source}")]
    Ledger {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// 台帳のロックが別スレッドの panic で汚染された
    #[error("ledger lock poisoned")]
    LockPoisoned,

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, CollatzError>;
