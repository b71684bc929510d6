//! Collatz 予想の探索ツール
//!
//! 開始値から「偶数なら半分、奇数なら 3n+1」を反復し、自明サイクル
//! {1,2,4} に到達するか、別のサイクルを見つけるか、ステップ上限に
//! 達するまで追跡する。2^68 を超える奇数の無人探索と、1つの数を
//! 手で辿る探索の2通りの使い方を持つ。

pub mod candidate;
pub mod config;
pub mod engine;
pub mod error;
pub mod explorer;
pub mod ledger;
pub mod logging;
pub mod search;
pub mod verify;

pub use candidate::{trivial_threshold, CandidateGenerator, CandidateMode};
pub use config::Settings;
pub use engine::{accelerated_step, is_trivial_cycle, step, trace, trace_with, Outcome, StepKind, Trajectory, DEFAULT_INTERACTIVE_CAP, DEFAULT_SEARCH_CAP, TRIVIAL_CYCLE};
pub use error::{CollatzError, Result};
pub use explorer::{parse_scaled, ExplorerReport, ExplorerSession};
pub use ledger::{CheckedLedger, FileLedger, MemoryLedger};
pub use search::{CheckReport, SearchCommand, SearchConfig, SearchEvent, SearchHandle, SearchState, Verdict};
pub use verify::{verify_range, VerifyResult};
