//! 軌道エンジン。
//!
//! 開始値から Collatz 写像を反復し、訪問済みの値を索引付きで記録して
//! サイクルを検出する。呼び出し間で状態を持たない純関数として実装する。

use std::collections::{HashMap, HashSet};
use std::fmt;

use num_bigint::BigInt;
use num_integer::Integer;
use num_traits::{One, Signed};

use crate::error::{CollatzError, Result};

/// 既知の自明サイクル {1, 2, 4}
pub const TRIVIAL_CYCLE: [u32; 3] = [1, 2, 4];

/// 手動探索で使うステップ上限
pub const DEFAULT_INTERACTIVE_CAP: u64 = 1000;

/// 自動探索で使うステップ上限
pub const DEFAULT_SEARCH_CAP: u64 = 10_000;

fn ensure_positive(n: &BigInt, what: &str) -> Result<()> {
    if n.is_positive() {
        Ok(())
    } else {
        Err(CollatzError::InvalidInput(format!("{} must be >= 1, got {}", what, n)))
    }
}

/// 標準の1ステップ: 偶数なら n/2、奇数なら 3n+1。
/// 加速しないので偶数の後継を返すこともある。
pub fn step(n: &BigInt) -> Result<BigInt> {
    ensure_positive(n, "n")?;
    if n.is_even() {
        Ok(n >> 1u32)
    } else {
        Ok(n * 3u32 + 1u32)
    }
}

/// 加速ステップ: 3n+1 を計算し、2 の因子をすべて取り除く。
///
/// 奇数入力を前提とするが、偶数が来ても奇数側の 3n+1 をそのまま適用する。
/// 奇数 n に対しては、`step` を繰り返したときに次に現れる奇数と一致する。
pub fn accelerated_step(n: &BigInt) -> Result<BigInt> {
    ensure_positive(n, "n")?;
    let t = n * 3u32 + 1u32;
    // t >= 4 なので trailing_zeros は必ず Some
    let d = t.trailing_zeros().unwrap_or(0);
    Ok(t >> d)
}

/// 呼び出し側が選ぶステップ関数
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StepKind {
    /// 全ての中間値を報告する `step`
    #[default]
    Unaccelerated,
    /// 偶数の連続を畳み込む `accelerated_step`
    Accelerated,
}

impl StepKind {
    pub fn apply(self, n: &BigInt) -> Result<BigInt> {
        match self {
            StepKind::Unaccelerated => step(n),
            StepKind::Accelerated => accelerated_step(n),
        }
    }
}

impl fmt::Display for StepKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepKind::Unaccelerated => f.write_str("unaccelerated"),
            StepKind::Accelerated => f.write_str("accelerated"),
        }
    }
}

/// 訪問順の値の列。先頭は開始値。
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Trajectory(Vec<BigInt>);

impl Trajectory {
    pub fn values(&self) -> &[BigInt] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn first(&self) -> Option<&BigInt> {
        self.0.first()
    }

    pub fn last(&self) -> Option<&BigInt> {
        self.0.last()
    }

    /// 軌道中の最大値
    pub fn max_value(&self) -> Option<&BigInt> {
        self.0.iter().max()
    }

    pub fn into_values(self) -> Vec<BigInt> {
        self.0
    }
}

impl From<Vec<BigInt>> for Trajectory {
    fn from(values: Vec<BigInt>) -> Self {
        Trajectory(values)
    }
}

impl<'a> IntoIterator for &'a Trajectory {
    type Item = &'a BigInt;
    type IntoIter = std::slice::Iter<'a, BigInt>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// `trace` の終了理由
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 1 に到達した、または {1,2,4} を再訪した
    ReachedTrivialCycle,
    /// {1,2,4} 以外のサイクル。予想の反例になる
    ReachedNonTrivialCycle { cycle: Vec<BigInt> },
    /// 上限に達した。最後の値から再開できる
    StepCapReached,
}

impl Outcome {
    pub fn is_trivial(&self) -> bool {
        matches!(self, Outcome::ReachedTrivialCycle)
    }

    /// 上限到達以外は結論が出ている
    pub fn is_conclusive(&self) -> bool {
        !matches!(self, Outcome::StepCapReached)
    }

    pub fn cycle(&self) -> Option<&[BigInt]> {
        match self {
            Outcome::ReachedNonTrivialCycle { cycle } => Some(cycle),
            _ => None,
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::ReachedTrivialCycle => f.write_str("trivial cycle (4-2-1)"),
            Outcome::ReachedNonTrivialCycle { cycle } => {
                write!(f, "NON-TRIVIAL cycle of length {}", cycle.len())
            }
            Outcome::StepCapReached => f.write_str("step cap reached"),
        }
    }
}

/// サイクルの値集合が {1,2,4} と一致するか
pub fn is_trivial_cycle(cycle: &[BigInt]) -> bool {
    let values: HashSet<&BigInt> = cycle.iter().collect();
    let trivial: Vec<BigInt> = TRIVIAL_CYCLE.iter().map(|&v| BigInt::from(v)).collect();
    values.len() == trivial.len() && trivial.iter().all(|v| values.contains(v))
}

fn classify_cycle(cycle: Vec<BigInt>) -> Outcome {
    if is_trivial_cycle(&cycle) {
        Outcome::ReachedTrivialCycle
    } else {
        Outcome::ReachedNonTrivialCycle { cycle }
    }
}

/// 開始値から軌道を追跡し、サイクル検出またはステップ上限まで反復する。
///
/// 1 への到達は再訪を待たずに自明サイクルとして即座に終了する。
/// それ以外の再訪は、値集合が {1,2,4} かどうかで分類する。
pub fn trace(start: &BigInt, step_cap: u64, kind: StepKind) -> Result<(Trajectory, Outcome)> {
    trace_with(start, step_cap, |n| kind.apply(n))
}

/// 任意のステップ関数で `trace` を行う。
pub fn trace_with<F>(start: &BigInt, step_cap: u64, mut step_fn: F) -> Result<(Trajectory, Outcome)>
where
    F: FnMut(&BigInt) -> Result<BigInt>,
{
    ensure_positive(start, "start")?;
    if step_cap < 1 {
        return Err(CollatzError::InvalidInput("step cap must be >= 1".to_string()));
    }

    // 1 はそれ自体が終端値。ステップを踏まない
    if start.is_one() {
        return Ok((Trajectory(vec![start.clone()]), Outcome::ReachedTrivialCycle));
    }

    let mut trajectory: Vec<BigInt> = Vec::new();
    let mut seen: HashMap<BigInt, usize> = HashMap::new();
    let mut current = start.clone();
    let mut index = 0u64;

    while index < step_cap {
        trajectory.push(current.clone());

        if let Some(&first) = seen.get(&current) {
            let cycle = trajectory[first..].to_vec();
            return Ok((Trajectory(trajectory), classify_cycle(cycle)));
        }
        seen.insert(current.clone(), trajectory.len() - 1);

        let next = step_fn(&current)?;
        if next.is_one() {
            trajectory.push(next);
            return Ok((Trajectory(trajectory), Outcome::ReachedTrivialCycle));
        }

        current = next;
        index += 1;
    }

    Ok((Trajectory(trajectory), Outcome::StepCapReached))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn big(v: i64) -> BigInt {
        BigInt::from(v)
    }

    #[test]
    fn test_step_even_odd() {
        assert_eq!(step(&big(6)).unwrap(), big(3));
        assert_eq!(step(&big(3)).unwrap(), big(10));
        assert_eq!(step(&big(1)).unwrap(), big(4));
    }

    #[test]
    fn test_step_rejects_non_positive() {
        assert!(matches!(step(&big(0)), Err(CollatzError::InvalidInput(_))));
        assert!(matches!(step(&big(-3)), Err(CollatzError::InvalidInput(_))));
    }

    #[test]
    fn test_accelerated_step_values() {
        assert_eq!(accelerated_step(&big(1)).unwrap(), big(1));
        assert_eq!(accelerated_step(&big(3)).unwrap(), big(5));
        assert_eq!(accelerated_step(&big(5)).unwrap(), big(1));
        assert_eq!(accelerated_step(&big(7)).unwrap(), big(11));
        assert_eq!(accelerated_step(&big(27)).unwrap(), big(41));
    }

    #[test]
    fn test_accelerated_step_even_input_applies_odd_case() {
        // 3*4+1 = 13
        assert_eq!(accelerated_step(&big(4)).unwrap(), big(13));
    }

    #[test]
    fn test_is_trivial_cycle() {
        assert!(is_trivial_cycle(&[big(4), big(2), big(1), big(4)]));
        assert!(is_trivial_cycle(&[big(1), big(4), big(2)]));
        assert!(!is_trivial_cycle(&[big(2), big(4)]));
        assert!(!is_trivial_cycle(&[big(5), big(7), big(9), big(5)]));
    }

    #[test]
    fn test_trace_detects_injected_cycle() {
        // 5 -> 7 -> 9 -> 5 の人工的な写像
        let fake = |n: &BigInt| -> Result<BigInt> {
            Ok(match n.to_string().as_str() {
                "3" => big(5),
                "5" => big(7),
                "7" => big(9),
                "9" => big(5),
                _ => big(1),
            })
        };
        let (traj, outcome) = trace_with(&big(3), 100, fake).unwrap();
        assert_eq!(traj.values(), &[big(3), big(5), big(7), big(9), big(5)]);
        assert_eq!(
            outcome,
            Outcome::ReachedNonTrivialCycle { cycle: vec![big(5), big(7), big(9), big(5)] }
        );
        assert!(!outcome.is_trivial());
    }

    #[test]
    fn test_trace_revisit_without_one_is_non_trivial() {
        // 1 を経由せず 4 と 2 を往復する写像
        let fake = |n: &BigInt| -> Result<BigInt> {
            Ok(match n.to_string().as_str() {
                "8" => big(4),
                "4" => big(2),
                _ => big(4),
            })
        };
        let (traj, outcome) = trace_with(&big(8), 100, fake).unwrap();
        // 8, 4, 2, 4 で {2,4} の再訪。{1,2,4} ではないので非自明
        assert_eq!(traj.len(), 4);
        assert_eq!(outcome.cycle().map(|c| c.len()), Some(3));
    }

    #[test]
    fn test_trace_step_fn_error_propagates() {
        let failing = |_: &BigInt| -> Result<BigInt> {
            Err(CollatzError::InvalidInput("boom".to_string()))
        };
        assert!(trace_with(&big(3), 10, failing).is_err());
    }

    #[test]
    fn test_trace_zero_cap_rejected() {
        assert!(matches!(
            trace(&big(27), 0, StepKind::Unaccelerated),
            Err(CollatzError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(Outcome::StepCapReached.to_string(), "step cap reached");
        assert!(Outcome::ReachedTrivialCycle.is_conclusive());
        assert!(!Outcome::StepCapReached.is_conclusive());
    }
}
