//! 自動探索の候補生成。2^68 より大きい奇数だけを返す。

use num_bigint::{BigInt, RandBigInt};
use num_integer::Integer;
use num_traits::{One, Zero};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// これ未満は経験的に検証済みとみなす境界 (2^68)
pub const THRESHOLD_BITS: u32 = 68;

pub const MIN_RANGE_FACTOR: u32 = 1;
pub const MAX_RANGE_FACTOR: u32 = 10;

pub fn trivial_threshold() -> BigInt {
    BigInt::one() << THRESHOLD_BITS
}

/// 境界以上の最初の奇数
pub fn first_odd_candidate() -> BigInt {
    let t = trivial_threshold();
    if t.is_odd() { t } else { t + 1u32 }
}

/// 候補の選び方
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateMode {
    /// 2^68+1 から順に奇数を辿る
    Sequential,
    /// [2^68+1, 2^68 * 10^range_factor] の一様な奇数
    Random { range_factor: u32 },
}

impl CandidateMode {
    pub fn random(range_factor: u32) -> Self {
        CandidateMode::Random {
            range_factor: range_factor.clamp(MIN_RANGE_FACTOR, MAX_RANGE_FACTOR),
        }
    }
}

/// 乱数生成の上限 2^68 * 10^range_factor
pub fn random_upper_bound(range_factor: u32) -> BigInt {
    trivial_threshold() * num_traits::pow(BigInt::from(10u32), range_factor as usize)
}

pub struct CandidateGenerator {
    mode: CandidateMode,
    cursor: BigInt,
    rng: StdRng,
}

impl CandidateGenerator {
    pub fn new(mode: CandidateMode) -> Self {
        Self::with_rng(mode, StdRng::from_entropy())
    }

    /// 乱数列を固定した生成器
    pub fn with_seed(mode: CandidateMode, seed: u64) -> Self {
        Self::with_rng(mode, StdRng::seed_from_u64(seed))
    }

    fn with_rng(mode: CandidateMode, rng: StdRng) -> Self {
        CandidateGenerator { mode, cursor: first_odd_candidate(), rng }
    }

    pub fn mode(&self) -> CandidateMode {
        self.mode
    }

    /// モード切り替え。逐次モードの位置は保持する。
    pub fn set_mode(&mut self, mode: CandidateMode) {
        self.mode = match mode {
            CandidateMode::Random { range_factor } => CandidateMode::random(range_factor),
            m => m,
        };
    }

    /// 次の候補。範囲が空なら None。
    ///
    /// 逐次モードは呼ぶたびに位置を進めるので、検査済みで飛ばした値に
    /// 留まり続けることはない。
    pub fn next_candidate(&mut self) -> Option<BigInt> {
        match self.mode {
            CandidateMode::Sequential => {
                let n = self.cursor.clone();
                self.cursor += 2u32;
                Some(n)
            }
            CandidateMode::Random { range_factor } => {
                let low = first_odd_candidate();
                let high = random_upper_bound(range_factor);
                if low > high {
                    return None;
                }
                // 奇数の個数 = (high - low) / 2 + 1
                let count: BigInt = (&high - &low) / 2u32 + 1u32;
                let k = self.rng.gen_bigint_range(&BigInt::zero(), &count);
                Some(low + k * 2u32)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_value() {
        assert_eq!(trivial_threshold().to_string(), "295147905179352825856");
        assert_eq!(first_odd_candidate().to_string(), "295147905179352825857");
    }

    #[test]
    fn test_sequential_candidates_are_consecutive_odds() {
        let mut generator = CandidateGenerator::with_seed(CandidateMode::Sequential, 0);
        let a = generator.next_candidate().unwrap();
        let b = generator.next_candidate().unwrap();
        let c = generator.next_candidate().unwrap();
        assert_eq!(a, first_odd_candidate());
        assert_eq!(&b - &a, BigInt::from(2));
        assert_eq!(&c - &b, BigInt::from(2));
    }

    #[test]
    fn test_random_candidates_odd_and_in_range() {
        let mut generator = CandidateGenerator::with_seed(CandidateMode::random(3), 42);
        let high = random_upper_bound(3);
        for _ in 0..200 {
            let n = generator.next_candidate().unwrap();
            assert!(n.is_odd());
            assert!(n >= first_odd_candidate());
            assert!(n <= high);
        }
    }

    #[test]
    fn test_range_factor_clamped() {
        assert_eq!(CandidateMode::random(0), CandidateMode::Random { range_factor: 1 });
        assert_eq!(CandidateMode::random(99), CandidateMode::Random { range_factor: 10 });
    }

    #[test]
    fn test_set_mode_keeps_sequential_cursor() {
        let mut generator = CandidateGenerator::with_seed(CandidateMode::Sequential, 1);
        generator.next_candidate();
        generator.set_mode(CandidateMode::random(1));
        generator.next_candidate();
        generator.set_mode(CandidateMode::Sequential);
        assert_eq!(generator.next_candidate().unwrap(), first_odd_candidate() + 2u32);
    }
}
