//! Suffix-tree and heavy-hitter tests.

prelude! {}

use crate::{HeavyHitter, SuffixTree};
use rand::{rngs::SmallRng, seq::SliceRandom, Rng, SeedableRng};

/// An error bound small enough that pruning never runs in these tests.
const NO_PRUNING: f64 = 1e-9;

fn by_label(hitters: &[HeavyHitter]) -> HMap<Vec<Token>, &HeavyHitter> {
    let mut map = HMap::new();
    for hitter in hitters {
        let prev = map.insert(hitter.label.clone(), hitter);
        assert!(prev.is_none(), "duplicate label in report");
    }
    map
}

/// Two overlapping sequences: totals aggregate across the suffix topology,
/// light counts stick to the longest sequences.
#[test]
fn exact_counts_two_strings() {
    let mut tree = SuffixTree::new(NO_PRUNING);
    tree.insert(&[1, 2, 3], 1);
    tree.insert(&[2, 3, 4], 1);

    let hitters = tree.heavy_hitters(1e-9);
    let map = by_label(&hitters);
    assert_eq!(map.len(), 2);

    let a = map[&vec![1, 2, 3]];
    assert_eq!((a.light, a.total, a.upper), (1, 1, 1));
    let b = map[&vec![2, 3, 4]];
    assert_eq!((b.light, b.total, b.upper), (1, 1, 1));
}

/// A sequence inserted on its own locus keeps its own light count even when
/// it is a prefix or substring of heavier sequences.
#[test]
fn exact_counts_with_shared_substring() {
    let mut tree = SuffixTree::new(NO_PRUNING);
    tree.insert(&[1, 2, 3], 5);
    tree.insert(&[2, 3, 4], 3);
    tree.insert(&[2, 3], 2);

    let hitters = tree.heavy_hitters(1e-9);
    let map = by_label(&hitters);
    assert_eq!(map.len(), 3);

    let full = map[&vec![1, 2, 3]];
    assert_eq!((full.light, full.total), (5, 5));
    let other = map[&vec![2, 3, 4]];
    assert_eq!((other.light, other.total), (3, 3));
    // `[2, 3]` occurs in all three sequences but only two units are its
    // own.
    let shared = map[&vec![2, 3]];
    assert_eq!((shared.light, shared.total), (2, 10));

    // Ranked by light count.
    assert_eq!(hitters[0].label, vec![1, 2, 3]);
    assert_eq!(hitters[1].label, vec![2, 3, 4]);
    assert_eq!(hitters[2].label, vec![2, 3]);
}

/// Extending a previously inserted sequence reconverts its leaf into a
/// branch without losing its count.
#[test]
fn extension_reuses_leaf() {
    let mut tree = SuffixTree::new(NO_PRUNING);
    tree.insert(&[1, 2], 1);
    tree.insert(&[1, 2, 3], 1);

    let hitters = tree.heavy_hitters(1e-9);
    let map = by_label(&hitters);
    assert_eq!(map.len(), 2);
    let prefix = map[&vec![1, 2]];
    assert_eq!((prefix.light, prefix.total), (1, 2));
    let full = map[&vec![1, 2, 3]];
    assert_eq!((full.light, full.total), (1, 1));
}

/// Inserting a sequence N times with weight w matches one insertion with
/// weight N*w.
#[test]
fn idempotence() {
    let mut repeated = SuffixTree::new(NO_PRUNING);
    for _ in 0..5 {
        repeated.insert(&[10, 20, 30], 1);
    }
    let mut once = SuffixTree::new(NO_PRUNING);
    once.insert(&[10, 20, 30], 5);

    assert_eq!(repeated.total_weight(), once.total_weight());
    let lhs = repeated.heavy_hitters(0.5);
    let rhs = once.heavy_hitters(0.5);
    assert_eq!(lhs, rhs);
    assert_eq!(lhs.len(), 1);
    assert_eq!(lhs[0].label, vec![10, 20, 30]);
    assert_eq!(lhs[0].light, 5);
}

/// Reported totals match a brute-force substring count when pruning is
/// disabled.
#[test]
fn totals_match_brute_force() {
    let mut rng = SmallRng::seed_from_u64(0xbeef);
    let alphabet: Vec<Token> = (0..12).collect();

    let mut tree = SuffixTree::new(NO_PRUNING);
    let mut truth: HMap<Vec<Token>, u64> = HMap::new();

    for _ in 0..40 {
        let mut tokens = alphabet.clone();
        tokens.shuffle(&mut rng);
        tokens.truncate(rng.gen_range(1, 7));
        let weight = rng.gen_range(1, 5);

        tree.insert(&tokens, weight);
        // No repeated tokens, so every substring value occurs at most once
        // per sequence.
        for lo in 0..tokens.len() {
            for hi in lo + 1..=tokens.len() {
                *truth.entry(tokens[lo..hi].to_vec()).or_insert(0) += weight;
            }
        }
    }

    let hitters = tree.heavy_hitters(1e-9);
    assert!(!hitters.is_empty());
    for hitter in &hitters {
        let expected = truth
            .get(&hitter.label)
            .unwrap_or_else(|| panic!("reported label {:?} never inserted", hitter.label));
        assert_eq!(
            hitter.total, *expected,
            "total mismatch for label {:?}",
            hitter.label
        );
        // No pruning, no error.
        assert_eq!(hitter.upper, hitter.total);
    }
}

/// Aggressive pruning keeps the tree small and the reports empty of
/// low-frequency noise.
#[test]
fn pruning_bounds_memory() {
    let mut tree = SuffixTree::new(0.5);
    for k in 0..20u64 {
        tree.insert(&[100 + 2 * k, 101 + 2 * k], 1);
    }

    let created = 20 * 3;
    let live = tree.arena.live_count();
    assert!(
        live < 20,
        "expected pruning to keep fewer than 20 of ~{} nodes, got {}",
        created,
        live
    );

    let hitters = tree.heavy_hitters(0.9);
    assert!(hitters.is_empty(), "unexpected heavy hitters: {:?}", hitters);
}

/// The lossy-counting contract: with error 0.01 over 10,000 insertions, a
/// sequence appearing 2,000 times is reported at frequency 0.1, none of the
/// 100 rare sequences (5 occurrences each) is, and every reported node
/// clears the threshold error included.
#[test]
fn lossy_counting_scenario() {
    let frequent: Vec<Token> = vec![1, 2, 3, 4, 5];
    let rares: Vec<Vec<Token>> = (0..100u64)
        .map(|r| (0..4u64).map(|k| 1_000 + 4 * r + k).collect())
        .collect();

    let mut inserts: Vec<Vec<Token>> = vec![];
    for _ in 0..2_000 {
        inserts.push(frequent.clone())
    }
    for rare in &rares {
        for _ in 0..5 {
            inserts.push(rare.clone())
        }
    }
    for k in 0..7_500u64 {
        inserts.push((0..3u64).map(|i| 1_000_000 + 3 * k + i).collect())
    }
    assert_eq!(inserts.len(), 10_000);
    let mut rng = SmallRng::seed_from_u64(0x1055_ee);
    inserts.shuffle(&mut rng);

    let mut tree = SuffixTree::new(0.01);
    for tokens in &inserts {
        tree.insert(tokens, 1);
    }
    assert_eq!(tree.total_weight(), 10_000);

    let threshold = 1_000u64;
    let hitters = tree.heavy_hitters(0.1);

    // The frequent sequence is reported under its exact label.
    assert!(
        hitters.iter().any(|h| h.label == frequent),
        "frequent sequence missing from {} hitters",
        hitters.len()
    );
    // No rare sequence is.
    for rare in &rares {
        assert!(
            hitters.iter().all(|h| &h.label != rare),
            "rare sequence {:?} was reported",
            rare
        );
    }
    // Every report clears the threshold, lossy-counting error included.
    for hitter in &hitters {
        let delta = hitter.upper - hitter.total;
        assert!(
            hitter.light + delta > threshold,
            "reported {:?} with light {} + delta {} under threshold {}",
            hitter.label,
            hitter.light,
            delta,
            threshold
        );
    }

    // Lossy counting bounded the tree while 10,000 sequences went through.
    let live = tree.arena.live_count();
    assert!(live < 5_000, "tree kept {} live nodes", live);
}
