// Scenario tests for the node comparator

use super::*;
use proptest::prelude::*;

fn comparator() -> NodeComparator {
    NodeComparator::new(StatisticsConfig::default())
}

#[test]
fn test_bimodal_split_detects_lower_cluster_shift() {
    let data = CompareData::new(
        vec![10.0, 11.0, 9.0, 90.0, 91.0, 89.0],
        vec![20.0, 21.0, 19.0, 90.0, 91.0, 89.0],
    );

    let comparison = comparator().compare(&data);

    assert!(comparison.modality.is_bimodal());
    assert_eq!(comparison.outcomes.len(), 2);
    assert!(comparison.outcomes[0].is_different(), "lower cluster shifted");
    assert!(!comparison.outcomes[1].is_different(), "upper cluster unchanged");
    assert_eq!(comparison.verdict, Verdict::Different);
}

#[test]
fn test_pooled_test_misses_cluster_shift() {
    let old = [10.0, 11.0, 9.0, 90.0, 91.0, 89.0];
    let new = [20.0, 21.0, 19.0, 90.0, 91.0, 89.0];

    // One Gaussian over both paths: the spread of the paths hides the shift
    let pooled = welch_test(&old, &new).unwrap();
    assert!(pooled.pvalue > 0.05, "pooled p-value {}", pooled.pvalue);
}

#[test]
fn test_prepare_partitions_by_cluster() {
    let data = CompareData::new(
        vec![10.0, 11.0, 9.0, 90.0, 91.0, 89.0],
        vec![20.0, 21.0, 19.0, 90.0, 91.0, 89.0],
    );

    let (prepared, removed) = comparator().prepare(&data);
    assert_eq!(removed, 0);
    match prepared {
        ComparisonData::Bimodal {
            split,
            old_lower,
            new_lower,
            old_upper,
            new_upper,
        } => {
            assert_eq!(split.cut, 52.5);
            assert_eq!(old_lower, vec![10.0, 11.0, 9.0]);
            assert_eq!(new_lower, vec![20.0, 21.0, 19.0]);
            assert_eq!(old_upper, new_upper);
        }
        other => panic!("Expected bimodal data, got {:?}", other),
    }
}

#[test]
fn test_unimodal_shift_is_different() {
    let data = CompareData::new(
        vec![10.0, 11.0, 12.0, 13.0, 14.0],
        vec![25.0, 26.0, 27.0, 28.0, 29.0],
    );
    let comparison = comparator().compare(&data);
    assert_eq!(comparison.modality, Modality::Unimodal);
    assert!(comparison.is_different());
    assert!(is_different(&data, 0.95));
}

#[test]
fn test_noise_is_not_different() {
    let data = CompareData::new(
        vec![100.0, 102.0, 98.0, 101.0, 99.0, 100.0, 103.0, 97.0],
        vec![101.0, 99.0, 100.0, 102.0, 98.0, 100.0, 97.0, 103.0],
    );
    let comparison = comparator().compare(&data);
    assert_eq!(comparison.verdict, Verdict::Same);
    assert!(!is_different(&data, 0.95));
}

#[test]
fn test_different_constants_are_different() {
    let data = CompareData::new(vec![5.0; 4], vec![6.0; 4]);
    let comparison = comparator().compare(&data);
    assert_eq!(
        comparison.outcomes,
        vec![PairOutcome::Different(Difference::ConstantShift)]
    );
    assert_eq!(comparison.outliers_removed, 0);
}

#[test]
fn test_equal_constants_are_same() {
    let data = CompareData::new(vec![5.0; 4], vec![5.0; 4]);
    assert_eq!(comparator().compare(&data).verdict, Verdict::Same);
}

#[test]
fn test_single_run_is_inconclusive() {
    let data = CompareData::new(vec![10.0], vec![100.0, 101.0, 99.0]);
    let comparison = comparator().compare(&data);
    assert_eq!(comparison.verdict, Verdict::Inconclusive);
    assert!(!comparison.is_different());
}

#[test]
fn test_added_call_is_always_different() {
    let data = CompareData::new(vec![], vec![40.0]);
    let comparison = comparator().compare(&data);
    assert_eq!(
        comparison.outcomes,
        vec![PairOutcome::Different(Difference::Appeared)]
    );
    assert!(comparison.is_different());
}

#[test]
fn test_removed_call_is_always_different() {
    let data = CompareData::new(vec![40.0, 41.0], vec![]);
    assert!(comparator().is_different(&data));
}

#[test]
fn test_unmeasured_node_is_inconclusive() {
    let data = CompareData::new(vec![], vec![]);
    assert_eq!(comparator().compare(&data).verdict, Verdict::Inconclusive);
}

#[test]
fn test_outlier_does_not_mask_equality() {
    let mut old = vec![10.0; 20];
    old.push(100.0);
    let data = CompareData::new(old, vec![10.0; 21]);

    let comparison = comparator().compare(&data);
    assert_eq!(comparison.outliers_removed, 1);
    assert_eq!(comparison.verdict, Verdict::Same);
}

#[test]
fn test_stricter_level_needs_more_evidence() {
    // Moderate shift: t = 2.5 with 8 degrees of freedom, p around 0.037
    let data = CompareData::new(
        vec![10.0, 11.0, 12.0, 13.0, 14.0],
        vec![12.5, 13.5, 14.5, 15.5, 16.5],
    );
    assert!(is_different(&data, 0.95));
    assert!(!NodeComparator::new(StatisticsConfig::strict()).is_different(&data));
}

#[test]
fn test_confidence_level_outside_range_is_not_different() {
    let data = CompareData::new(
        vec![10.0, 11.0, 12.0, 13.0, 14.0],
        vec![25.0, 26.0, 27.0, 28.0, 29.0],
    );
    assert!(is_different(&data, 0.99));
    // 0.05 is a significance level; read as confidence it would test at p < 0.95
    assert!(!is_different(&data, 0.05));
    assert!(!is_different(&data, 1.0));
    assert!(!is_different(&data, f64::NAN));
}

proptest! {
    #[test]
    fn prop_identical_samples_never_differ(
        values in prop::collection::vec(1u32..1000, 2..30)
    ) {
        let values: Vec<f32> = values.into_iter().map(|v| v as f32).collect();
        let data = CompareData::new(values.clone(), values);
        prop_assert!(!comparator().is_different(&data));
    }

    #[test]
    fn prop_comparison_is_symmetric(
        old in prop::collection::vec(1u32..1000, 0..20),
        new in prop::collection::vec(1u32..1000, 0..20),
    ) {
        let old: Vec<f32> = old.into_iter().map(|v| v as f32).collect();
        let new: Vec<f32> = new.into_iter().map(|v| v as f32).collect();
        let forward = comparator().is_different(&CompareData::new(old.clone(), new.clone()));
        let backward = comparator().is_different(&CompareData::new(new, old));
        prop_assert_eq!(forward, backward);
    }
}
