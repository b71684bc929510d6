use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{Signed, ToPrimitive};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use crate::engine::{self, Outcome, StepKind};
use crate::error::{CollatzError, Result};

/// 1チャンクあたりの奇数の個数
const CHUNK_SIZE: u64 = 1000;

/// 範囲検証の結果
#[derive(Debug, Clone, Default)]
pub struct VerifyResult {
    /// 検証した奇数の総数
    pub total_checked: u64,
    /// 自明サイクルに到達した数
    pub trivial: u64,
    /// 非自明サイクルも上限到達も無かったか
    pub all_converged: bool,
    /// 最長の軌道長
    pub longest_trajectory: usize,
    /// 最長の軌道を持つ開始値
    pub longest_trajectory_start: BigInt,
    /// 非自明サイクル (開始値, サイクル)
    pub non_trivial: Vec<(BigInt, Vec<BigInt>)>,
    /// ステップ上限に達した数
    pub failures: Vec<BigInt>,
    pub cancelled: bool,
}

#[derive(Default)]
struct ChunkSummary {
    checked: u64,
    trivial: u64,
    longest: usize,
    longest_start: Option<BigInt>,
    non_trivial: Vec<(BigInt, Vec<BigInt>)>,
    failures: Vec<BigInt>,
}

impl ChunkSummary {
    fn merge(&mut self, other: ChunkSummary) {
        self.checked += other.checked;
        self.trivial += other.trivial;
        if other.longest > self.longest {
            self.longest = other.longest;
            self.longest_start = other.longest_start;
        }
        self.non_trivial.extend(other.non_trivial);
        self.failures.extend(other.failures);
    }
}

/// [start, end] の全奇数を `trace` で検証する。チャンク単位で rayon に分配する。
/// progress_callback: (完了数, 総数) をチャンク完了ごとに呼ぶ（スレッドセーフ）。
pub fn verify_range(
    start: &BigInt,
    end: &BigInt,
    step_cap: u64,
    kind: StepKind,
    cancel: &AtomicBool,
    progress_callback: impl Fn(u64, u64) + Sync,
) -> Result<VerifyResult> {
    if !start.is_positive() {
        return Err(CollatzError::InvalidInput(format!("range start must be >= 1, got {}", start)));
    }
    if step_cap < 1 {
        return Err(CollatzError::InvalidInput("step cap must be >= 1".to_string()));
    }

    // start を奇数に調整
    let first = if start.is_even() { start + 1u32 } else { start.clone() };
    if &first > end {
        return Ok(VerifyResult { all_converged: true, longest_trajectory_start: first, ..Default::default() });
    }

    let total_odd = ((end - &first) / 2u32 + 1u32)
        .to_u64()
        .ok_or_else(|| CollatzError::InvalidInput("range too large".to_string()))?;
    let num_chunks = total_odd.div_ceil(CHUNK_SIZE);
    let done = AtomicU64::new(0);

    let partials: Vec<ChunkSummary> = (0..num_chunks)
        .into_par_iter()
        .map(|chunk_idx| -> Result<ChunkSummary> {
            let mut summary = ChunkSummary::default();
            if cancel.load(Ordering::Relaxed) {
                return Ok(summary);
            }
            let offset = chunk_idx * CHUNK_SIZE;
            let count = CHUNK_SIZE.min(total_odd - offset);
            let mut n: BigInt = &first + BigInt::from(offset) * 2u32;

            for _ in 0..count {
                if cancel.load(Ordering::Relaxed) {
                    break;
                }
                let (trajectory, outcome) = engine::trace(&n, step_cap, kind)?;
                summary.checked += 1;
                if trajectory.len() > summary.longest {
                    summary.longest = trajectory.len();
                    summary.longest_start = Some(n.clone());
                }
                match outcome {
                    Outcome::ReachedTrivialCycle => summary.trivial += 1,
                    Outcome::ReachedNonTrivialCycle { cycle } => summary.non_trivial.push((n.clone(), cycle)),
                    Outcome::StepCapReached => summary.failures.push(n.clone()),
                }
                n += 2u32;
            }

            let total_done = done.fetch_add(summary.checked, Ordering::Relaxed) + summary.checked;
            progress_callback(total_done, total_odd);
            Ok(summary)
        })
        .collect::<Result<Vec<_>>>()?;

    let mut merged = ChunkSummary::default();
    for partial in partials {
        merged.merge(partial);
    }
    let mut failures = merged.failures;
    failures.sort();
    let mut non_trivial = merged.non_trivial;
    non_trivial.sort_by(|a, b| a.0.cmp(&b.0));

    Ok(VerifyResult {
        total_checked: merged.checked,
        trivial: merged.trivial,
        all_converged: failures.is_empty() && non_trivial.is_empty(),
        longest_trajectory: merged.longest,
        longest_trajectory_start: merged.longest_start.unwrap_or(first),
        non_trivial,
        failures,
        cancelled: cancel.load(Ordering::Relaxed),
    })
}
