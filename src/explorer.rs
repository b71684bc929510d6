//! 1つの数を手で辿る探索セッション。
//!
//! 全ての中間値を見せるため、常に加速しない `step` を使う。
//! ステップ上限に達したら、蓄積した軌道の最後の値から続行できる。

use std::str::FromStr;

use num_bigint::BigInt;
use num_traits::Signed;

use crate::engine::{self, Outcome, StepKind, Trajectory};
use crate::error::{CollatzError, Result};

/// ×10^k の上限
pub const MAX_POWER_OF_TEN: u32 = 100;

/// 続行で前に進むには再開点の先に少なくとも1つ値が要る
pub const MIN_EXPLORER_CAP: u64 = 2;

/// `number × 10^power` を解釈する。結果は正でなければならない。
pub fn parse_scaled(number: &str, power: u32) -> Result<BigInt> {
    let trimmed = number.trim();
    let base = BigInt::from_str(trimmed).map_err(|_| CollatzError::Parse(trimmed.to_string()))?;
    if power > MAX_POWER_OF_TEN {
        return Err(CollatzError::InvalidInput(format!(
            "power of ten must be <= {}, got {}",
            MAX_POWER_OF_TEN, power
        )));
    }
    let n = base * num_traits::pow(BigInt::from(10u32), power as usize);
    if !n.is_positive() {
        return Err(CollatzError::InvalidInput(format!("number must be a positive integer, got {}", n)));
    }
    Ok(n)
}

/// 1回の追跡 (開始または続行) で得た結果
#[derive(Debug, Clone)]
pub struct ExplorerReport {
    /// 今回追加された値。続行時は重複する先頭を除く
    pub segment: Vec<BigInt>,
    pub outcome: Outcome,
    /// これまでの累積長
    pub total_len: usize,
}

#[derive(Debug, Clone)]
pub struct ExplorerSession {
    start: BigInt,
    step_cap: u64,
    values: Vec<BigInt>,
    last_outcome: Outcome,
    rounds: u32,
}

impl ExplorerSession {
    /// 新しいセッションを開始し、最初の `step_cap` ステップを追跡する。
    pub fn start(start: BigInt, step_cap: u64) -> Result<(Self, ExplorerReport)> {
        if step_cap < MIN_EXPLORER_CAP {
            return Err(CollatzError::InvalidInput(format!(
                "explorer step cap must be >= {}, got {}",
                MIN_EXPLORER_CAP, step_cap
            )));
        }
        let (trajectory, outcome) = engine::trace(&start, step_cap, StepKind::Unaccelerated)?;
        let values = trajectory.into_values();
        let report = ExplorerReport {
            segment: values.clone(),
            outcome: outcome.clone(),
            total_len: values.len(),
        };
        let session = ExplorerSession { start, step_cap, values, last_outcome: outcome, rounds: 1 };
        Ok((session, report))
    }

    /// 上限到達後にだけ押せる「続行」
    pub fn can_continue(&self) -> bool {
        !self.last_outcome.is_conclusive()
    }

    /// 最後の値から同じ上限で追跡を再開する。
    pub fn continue_trace(&mut self) -> Result<ExplorerReport> {
        if !self.can_continue() {
            return Err(CollatzError::InvalidInput(format!(
                "nothing to continue: trace already ended with {}",
                self.last_outcome
            )));
        }
        let Some(last) = self.values.last().cloned() else {
            return Err(CollatzError::InvalidInput("empty trajectory".to_string()));
        };
        let (trajectory, outcome) = engine::trace(&last, self.step_cap, StepKind::Unaccelerated)?;
        let segment: Vec<BigInt> = trajectory.into_values().into_iter().skip(1).collect();
        self.values.extend(segment.iter().cloned());
        self.last_outcome = outcome.clone();
        self.rounds += 1;
        Ok(ExplorerReport { segment, outcome, total_len: self.values.len() })
    }

    pub fn start_value(&self) -> &BigInt {
        &self.start
    }

    pub fn trajectory(&self) -> Trajectory {
        Trajectory::from(self.values.clone())
    }

    pub fn values(&self) -> &[BigInt] {
        &self.values
    }

    pub fn outcome(&self) -> &Outcome {
        &self.last_outcome
    }

    /// 開始と続行を合わせた追跡回数
    pub fn rounds(&self) -> u32 {
        self.rounds
    }
}
