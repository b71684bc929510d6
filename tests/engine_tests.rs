use collatz_explorer::*;
use num_bigint::BigInt;
use num_integer::Integer;

fn big(v: i64) -> BigInt {
    BigInt::from(v)
}

/// step を繰り返して得た軌道の奇数部分
fn odd_values(values: &[BigInt]) -> Vec<BigInt> {
    values.iter().filter(|v| v.is_odd()).cloned().collect()
}

// ===== 27 の軌道 =====

#[test]
fn test_orbit_of_27() {
    let (traj, outcome) = trace(&big(27), 1000, StepKind::Unaccelerated).unwrap();
    assert_eq!(outcome, Outcome::ReachedTrivialCycle);
    // 111 ステップ + 開始値
    assert_eq!(traj.len(), 112);
    assert_eq!(traj.first(), Some(&big(27)));
    assert_eq!(traj.last(), Some(&big(1)));
    assert_eq!(traj.max_value(), Some(&big(9232)));
}

#[test]
fn test_orbit_of_small_numbers() {
    let check = |n: i64, expected: &[i64]| {
        let (traj, outcome) = trace(&big(n), 1000, StepKind::Unaccelerated).unwrap();
        let expected: Vec<BigInt> = expected.iter().map(|&v| big(v)).collect();
        assert_eq!(traj.values(), expected.as_slice(), "orbit of {}", n);
        assert!(outcome.is_trivial());
    };
    check(2, &[2, 1]);
    check(3, &[3, 10, 5, 16, 8, 4, 2, 1]);
    check(6, &[6, 3, 10, 5, 16, 8, 4, 2, 1]);
    check(7, &[7, 22, 11, 34, 17, 52, 26, 13, 40, 20, 10, 5, 16, 8, 4, 2, 1]);
}

// ===== 加速ステップとの一致 =====

#[test]
fn test_accelerated_matches_next_odd_value() {
    for n in (1i64..=999).step_by(2) {
        let mut v = step(&big(n)).unwrap();
        while v.is_even() {
            v = step(&v).unwrap();
        }
        assert_eq!(accelerated_step(&big(n)).unwrap(), v, "n={}", n);
    }
}

#[test]
fn test_odd_subsequence_equals_accelerated_trajectory() {
    for n in (1i64..=501).step_by(2) {
        let (plain, o1) = trace(&big(n), 10_000, StepKind::Unaccelerated).unwrap();
        let (fast, o2) = trace(&big(n), 10_000, StepKind::Accelerated).unwrap();
        assert!(o1.is_trivial() && o2.is_trivial(), "n={}", n);
        assert_eq!(odd_values(plain.values()), fast.values().to_vec(), "n={}", n);
    }
}

// ===== 境界 =====

#[test]
fn test_trace_of_one_takes_no_step() {
    for cap in [1u64, 2, 1000] {
        for kind in [StepKind::Unaccelerated, StepKind::Accelerated] {
            let (traj, outcome) = trace(&big(1), cap, kind).unwrap();
            assert_eq!(traj.values(), &[big(1)]);
            assert_eq!(outcome, Outcome::ReachedTrivialCycle);
        }
    }
}

#[test]
fn test_cap_limits_trajectory_length() {
    let (traj, outcome) = trace(&big(27), 10, StepKind::Unaccelerated).unwrap();
    assert_eq!(outcome, Outcome::StepCapReached);
    assert_eq!(traj.len(), 10);
    assert!(outcome.cycle().is_none());

    let (traj, outcome) = trace(&big(27), 1, StepKind::Unaccelerated).unwrap();
    assert_eq!(outcome, Outcome::StepCapReached);
    assert_eq!(traj.values(), &[big(27)]);
}

#[test]
fn test_cap_of_two_reaches_one_from_two() {
    // 2 -> 1 は上限内で短絡される
    let (traj, outcome) = trace(&big(2), 1, StepKind::Unaccelerated).unwrap();
    assert_eq!(traj.values(), &[big(2), big(1)]);
    assert!(outcome.is_trivial());
}

// ===== 続行 =====

#[test]
fn test_resume_reproduces_single_call() {
    let (first, outcome) = trace(&big(27), 50, StepKind::Unaccelerated).unwrap();
    assert_eq!(outcome, Outcome::StepCapReached);
    assert_eq!(first.len(), 50);

    let last = first.last().unwrap().clone();
    let (rest, outcome) = trace(&last, 1000, StepKind::Unaccelerated).unwrap();
    assert!(outcome.is_trivial());

    let mut joined = first.values().to_vec();
    joined.extend(rest.values().iter().skip(1).cloned());

    let (single, _) = trace(&big(27), 1050, StepKind::Unaccelerated).unwrap();
    assert_eq!(joined, single.values().to_vec());
}

#[test]
fn test_resume_when_both_calls_hit_cap() {
    let (first, _) = trace(&big(27), 30, StepKind::Unaccelerated).unwrap();
    let (rest, outcome) = trace(first.last().unwrap(), 30, StepKind::Unaccelerated).unwrap();
    assert_eq!(outcome, Outcome::StepCapReached);

    let mut joined = first.values().to_vec();
    joined.extend(rest.values().iter().skip(1).cloned());

    // 再開点が両方に含まれるので、1回で辿る場合の上限は 30 + 30 - 1
    let (single, _) = trace(&big(27), 59, StepKind::Unaccelerated).unwrap();
    assert_eq!(joined, single.values().to_vec());
}

#[test]
fn test_resume_with_accelerated_steps() {
    let n = big(703);
    let (first, _) = trace(&n, 5, StepKind::Accelerated).unwrap();
    let (rest, outcome) = trace(first.last().unwrap(), 10_000, StepKind::Accelerated).unwrap();
    assert!(outcome.is_trivial());
    let mut joined = first.values().to_vec();
    joined.extend(rest.values().iter().skip(1).cloned());
    let (single, _) = trace(&n, 10_005, StepKind::Accelerated).unwrap();
    assert_eq!(joined, single.values().to_vec());
}

// ===== 不正入力 =====

#[test]
fn test_invalid_start_values() {
    for n in [0i64, -1, -5] {
        for kind in [StepKind::Unaccelerated, StepKind::Accelerated] {
            let err = trace(&big(n), 100, kind).unwrap_err();
            assert!(matches!(err, CollatzError::InvalidInput(_)), "n={}", n);
        }
    }
    assert!(matches!(accelerated_step(&big(0)), Err(CollatzError::InvalidInput(_))));
}

#[test]
fn test_invalid_cap() {
    let err = trace(&big(7), 0, StepKind::Accelerated).unwrap_err();
    assert!(matches!(err, CollatzError::InvalidInput(_)));
}

// ===== 決定性 =====

#[test]
fn test_trace_is_deterministic() {
    for kind in [StepKind::Unaccelerated, StepKind::Accelerated] {
        let (ta, oa) = trace(&big(837799), 10_000, kind).unwrap();
        let (tb, ob) = trace(&big(837799), 10_000, kind).unwrap();
        assert_eq!(ta, tb);
        assert_eq!(oa, ob);
    }
}

#[test]
fn test_custom_step_fn_cycle_is_reported_in_full() {
    // 13 -> 17 -> 13 を持つ人工写像
    let fake = |n: &BigInt| -> Result<BigInt> {
        if *n == big(13) {
            Ok(big(17))
        } else if *n == big(17) {
            Ok(big(13))
        } else {
            Ok(big(13))
        }
    };
    let (traj, outcome) = trace_with(&big(11), 100, fake).unwrap();
    assert_eq!(traj.values(), &[big(11), big(13), big(17), big(13)]);
    match outcome {
        Outcome::ReachedNonTrivialCycle { cycle } => {
            assert_eq!(cycle, vec![big(13), big(17), big(13)]);
            assert!(!is_trivial_cycle(&cycle));
        }
        other => panic!("expected non-trivial cycle, got {:?}", other),
    }
}
