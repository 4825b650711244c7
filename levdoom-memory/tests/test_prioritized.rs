use anyhow::Result;
use levdoom_memory::{PerConfig, RecordStore, RecordStoreConfig, RecordStoreError};
use test_log::test;

const ABS_ERRORS: [f32; 4] = [0.1, 0.5, 0.9, 0.2];

fn scored_store(seed: u64) -> Result<RecordStore<&'static str>> {
    let config = RecordStoreConfig::default()
        .capacity(4)
        .seed(seed)
        .per_config(Some(PerConfig::default()));
    let mut store = RecordStore::new(&config)?;
    for &r in ["a", "b", "c", "d"].iter() {
        store.add(r)?;
    }
    // With capacity 4 the leaves are tree nodes 3..=6, in insertion order.
    store.batch_update(&[3, 4, 5, 6], &ABS_ERRORS)?;
    Ok(store)
}

#[test]
fn test_priorities_after_update() -> Result<()> {
    let store = scored_store(42)?;
    let sum_tree = store.sum_tree().unwrap();

    let expected: Vec<f32> = ABS_ERRORS
        .iter()
        .map(|e| (e + 0.01f32).min(1.0).powf(0.6))
        .collect();
    for (leaf, p) in (3..7).zip(expected.iter()) {
        assert!((sum_tree.priority(leaf).unwrap() - p).abs() < 1e-6);
    }
    let total: f32 = expected.iter().sum();
    assert!((sum_tree.total_priority() - total).abs() < 1e-5);
    Ok(())
}

#[test]
fn test_stratified_segments() -> Result<()> {
    for seed in 0..50 {
        let mut store = scored_store(seed)?;
        let (leaf_p, total) = {
            let sum_tree = store.sum_tree().unwrap();
            let leaf_p: Vec<f32> = (3..7).map(|l| sum_tree.priority(l).unwrap()).collect();
            (leaf_p, sum_tree.total_priority())
        };

        let batch = store.sample(2)?;
        let ixs = batch.ixs.clone().unwrap();
        assert_eq!(ixs.len(), 2);

        let segment = total / 2.0;
        for (i, &leaf) in ixs.iter().enumerate() {
            // Prefix-sum interval of the leaf must meet the i-th segment.
            let slot = leaf - 3;
            let lo: f32 = leaf_p[..slot].iter().sum();
            let hi = lo + leaf_p[slot];
            let (a, b) = (segment * i as f32, segment * (i + 1) as f32);
            assert!(
                lo <= b + 1e-5 && hi >= a - 1e-5,
                "seed={} i={} leaf={}",
                seed,
                i,
                leaf
            );
        }

        // The records come from the sampled leaves.
        let names = ["a", "b", "c", "d"];
        for (&leaf, &r) in ixs.iter().zip(batch.records.iter()) {
            assert_eq!(names[leaf - 3], r);
        }
    }
    Ok(())
}

#[test]
fn test_importance_weights() -> Result<()> {
    let mut store = scored_store(7)?;
    let batch = store.sample(2)?;
    let beta = store.beta().unwrap();
    assert!((beta - 0.401).abs() < 1e-6);

    let sum_tree = store.sum_tree().unwrap();
    let total = sum_tree.total_priority();
    let p_min = sum_tree.min_priority().unwrap() / total;
    let max_weight = (p_min * 2.0).powf(-beta);

    let (_, ixs, weight) = batch.unpack();
    for (&leaf, &w) in ixs.unwrap().iter().zip(weight.unwrap().iter()) {
        let prob = sum_tree.priority(leaf).unwrap() / total;
        let expected = (2.0 * prob).powf(-beta) / max_weight;
        assert!((w - expected).abs() < 1e-5);
        assert!(w <= 1.0 + 1e-6);
    }
    Ok(())
}

#[test]
fn test_fixed_seed_reproduces_batches() -> Result<()> {
    let mut store1 = scored_store(123)?;
    let mut store2 = scored_store(123)?;
    for _ in 0..10 {
        assert_eq!(store1.sample(2)?, store2.sample(2)?);
    }
    Ok(())
}

#[test]
fn test_high_priority_sampled_more_often() -> Result<()> {
    let config = RecordStoreConfig::default()
        .capacity(2)
        .per_config(Some(PerConfig::default().alpha(1.0)));
    let mut store = RecordStore::new(&config)?;
    store.add(0usize)?;
    store.add(1usize)?;
    store.batch_update(&[1, 2], &[0.09, 0.89])?;

    let mut counts = [0usize; 2];
    for _ in 0..2000 {
        let batch = store.sample(1)?;
        counts[batch.records[0]] += 1;
    }
    // Priorities 0.1 and 0.9.
    assert!(counts[1] > 4 * counts[0], "{:?}", counts);
    Ok(())
}

#[test]
fn test_ring_evicts_oldest() -> Result<()> {
    let config = RecordStoreConfig::default()
        .capacity(3)
        .per_config(Some(PerConfig::default()));
    let mut store = RecordStore::new(&config)?;
    for i in 0..5usize {
        store.add(i)?;
    }
    assert_eq!(store.len(), 3);

    let mut records = store.sample(3)?.records;
    records.sort();
    records.dedup();
    assert!(records.iter().all(|&r| r >= 2));
    Ok(())
}

#[test]
fn test_insufficient_data() -> Result<()> {
    let mut store = scored_store(0)?;
    let err = store.sample(5).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<RecordStoreError>(),
        Some(RecordStoreError::InsufficientData {
            requested: 5,
            available: 4
        })
    ));
    Ok(())
}
