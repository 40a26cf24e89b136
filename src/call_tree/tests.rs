// Scenario tests for the call-tree model and pairing

use super::*;
use crate::error::CauseSearchError;

const VMS: usize = 10;

fn add_vm_measurements(node: &mut CallTreeNode, version: &str) {
    node.new_vm(version);
    for _ in 0..15 {
        node.add_measurement(version, 15);
    }
}

/// old: Test#test -> { A#a -> { B#b }, C#c }
fn sample_tree(version: &str) -> CallTree {
    let mut tree = CallTree::new(version, "Test#test", "public void Test.test()");
    let a = tree.add_child(tree.root(), "A#a", "public void A.a()");
    tree.add_child(a, "B#b", "public void B.b()");
    tree.add_child(tree.root(), "C#c", "public void C.c()");
    tree
}

fn find(tree: &CallTree, call: &str) -> NodeId {
    tree.ids()
        .find(|&id| tree.node(id).call() == call)
        .unwrap_or_else(|| panic!("no node {}", call))
}

#[test]
fn test_statistics_over_vm_means() {
    let mut tree = CallTree::new("A", "Test#callMethod", "public void Test.callMethod()");
    let root = tree.root();
    for _ in 0..VMS {
        add_vm_measurements(tree.node_mut(root), "A");
        add_vm_measurements(tree.node_mut(root), "B");
    }

    let node = tree.node(root);
    assert!((node.statistics("A").mean - 15.0).abs() < 0.01);
    assert!((node.statistics("B").mean - 15.0).abs() < 0.01);
    assert_eq!(node.statistics("A").n, VMS);

    let series = node.measurements("A").unwrap();
    assert_eq!(series.vm_count(), 10);
    assert_eq!(series.call_count(), 150);
}

#[test]
fn test_unmeasured_version_reports_nan() {
    let mut tree = CallTree::new("A", "Test#callMethod", "public void Test.callMethod()");
    let root = tree.root();
    for _ in 0..VMS {
        add_vm_measurements(tree.node_mut(root), "A");
    }

    let node = tree.node(root);
    assert_eq!(node.statistics("A").n, 10);
    assert!(node.statistics("B").mean.is_nan());
    assert_eq!(node.statistics("B").n, 0);
}

#[test]
fn test_children_keep_call_order() {
    let mut tree = CallTree::new("v1", "Test#test", "Test#test");
    let root = tree.root();
    let z = tree.add_child(root, "Z#z", "Z#z");
    let a = tree.add_child(root, "A#a", "A#a");
    let m = tree.add_child(root, "M#m", "M#m");
    assert_eq!(tree.children(root), &[z, a, m]);
    assert_eq!(tree.node(m).depth(), 1);
    assert_eq!(tree.node(m).parent(), Some(root));
}

#[test]
fn test_subtree_and_leaves() {
    let tree = sample_tree("v1");
    let a = find(&tree, "A#a");
    let b = find(&tree, "B#b");
    let c = find(&tree, "C#c");
    assert_eq!(tree.node(b).parent(), Some(a));
    assert_eq!(tree.leaves(), vec![b, c]);
    assert_eq!(tree.max_depth(), 2);
    assert_eq!(tree.subtree(a), vec![a, b]);
}

#[test]
fn test_pair_identical_trees() {
    let pair = CallTreePair::pair(sample_tree("v1"), sample_tree("v2"), true).unwrap();

    assert_eq!(pair.old().len(), 4);
    assert_eq!(pair.new_tree().len(), 4);
    for id in pair.old().ids() {
        assert!(!pair.is_structural(id));
        let counterpart = pair.counterpart(id);
        assert_eq!(pair.counterpart_of_new(counterpart), id);
        assert_eq!(
            pair.old().node(id).call(),
            pair.new_tree().node(counterpart).call()
        );
    }
}

#[test]
fn test_pair_added_call_gets_sentinel() {
    let old = sample_tree("v1");
    let mut new = sample_tree("v2");
    let x = new.add_child(new.root(), "X#x", "public void X.x()");
    new.add_child(x, "Y#y", "public void Y.y()");

    let mut pair = CallTreePair::pair(old, new, true).unwrap();

    // X and its child Y are mirrored as ADDED nodes in the old tree
    assert_eq!(pair.old().len(), 6);
    let added: Vec<NodeId> = pair
        .old()
        .ids()
        .filter(|&id| pair.old().node(id).sentinel() == Some(Sentinel::Added))
        .collect();
    assert_eq!(added.len(), 2);

    let x_pair = added[0];
    assert_eq!(pair.signature(x_pair), "X#x");
    assert_eq!(pair.sentinel(x_pair), Some(Sentinel::Added));
    assert_eq!(pair.pattern(x_pair, Side::Old), None);
    assert_eq!(pair.pattern(x_pair, Side::New), Some("public void X.x()"));
    assert_eq!(pair.children(x_pair), &[added[1]]);
    assert_eq!(pair.signature(added[1]), "Y#y");

    for _ in 0..3 {
        pair.new_vm(x_pair, Side::New);
        pair.add_measurement(x_pair, Side::New, 40);
    }
    assert!(pair.statistics(x_pair, Side::Old).mean.is_nan());
    assert_eq!(pair.statistics(x_pair, Side::New).mean, 40.0);
    assert!(pair.compare_data(x_pair).old().is_empty());
}

#[test]
fn test_pair_removed_call_gets_sentinel() {
    let old = sample_tree("v1");
    let mut new = CallTree::new("v2", "Test#test", "public void Test.test()");
    new.add_child(new.root(), "A#a", "public void A.a()");

    let pair = CallTreePair::pair(old, new, true).unwrap();

    let b = find(pair.old(), "B#b");
    let c = find(pair.old(), "C#c");
    assert_eq!(pair.sentinel(b), Some(Sentinel::Removed));
    assert_eq!(pair.sentinel(c), Some(Sentinel::Removed));
    assert_eq!(pair.new_tree().node(pair.counterpart(c)).call(), REMOVED);
    assert_eq!(pair.signature(c), "C#c");
}

#[test]
fn test_pairing_is_symmetric_with_sentinels() {
    let mut old = sample_tree("v1");
    old.add_child(old.root(), "Gone#gone", "Gone#gone");
    let mut new = sample_tree("v2");
    let a = find(&new, "A#a");
    new.add_child(a, "Fresh#fresh", "Fresh#fresh");

    let pair = CallTreePair::pair(old, new, true).unwrap();
    assert_eq!(pair.old().len(), pair.new_tree().len());
    for id in pair.old().ids() {
        assert_eq!(pair.counterpart_of_new(pair.counterpart(id)), id);
    }
    assert!(pair.check_consistency().is_ok());
}

#[test]
fn test_repeated_calls_matched_by_call_order() {
    let mut old = CallTree::new("v1", "Test#test", "Test#test");
    let first_old = old.add_child(old.root(), "A#a", "A#a");
    old.add_child(first_old, "Inner#first", "Inner#first");
    old.add_child(old.root(), "A#a", "A#a");

    let mut new = CallTree::new("v2", "Test#test", "Test#test");
    let first_new = new.add_child(new.root(), "A#a", "A#a");
    new.add_child(first_new, "Inner#first", "Inner#first");
    new.add_child(new.root(), "A#a", "A#a");

    let pair = CallTreePair::pair(old, new, true).unwrap();
    assert_eq!(pair.counterpart(first_old), first_new);
    assert!(pair.old().ids().all(|id| !pair.is_structural(id)));
}

#[test]
fn test_repeated_calls_without_eoi_are_a_mismatch() {
    let mut old = CallTree::new("v1", "Test#test", "Test#test");
    old.add_child(old.root(), "A#a", "A#a");
    old.add_child(old.root(), "A#a", "A#a");
    let new = old.clone();

    let result = CallTreePair::pair(old, new, false);
    match result {
        Err(CauseSearchError::StructuralMismatch { parent, reason }) => {
            assert_eq!(parent, "Test#test");
            assert!(reason.contains("A#a"));
        }
        other => panic!("Expected StructuralMismatch, got {:?}", other.map(|_| ())),
    }
}

#[test]
fn test_repeated_calls_with_duplicate_eoi_are_a_mismatch() {
    let mut old = CallTree::new("v1", "Test#test", "Test#test");
    old.add_child_with_eoi(old.root(), "A#a", "A#a", Some(1));
    old.add_child_with_eoi(old.root(), "A#a", "A#a", Some(1));
    let new = old.clone();

    assert!(matches!(
        CallTreePair::pair(old, new, false),
        Err(CauseSearchError::StructuralMismatch { .. })
    ));
}

#[test]
fn test_repeated_calls_matched_by_eoi_rank() {
    // Call order in the old trace lists the later execution first
    let mut old = CallTree::new("v1", "Test#test", "Test#test");
    let late_old = old.add_child_with_eoi(old.root(), "A#a", "A#a", Some(7));
    let early_old = old.add_child_with_eoi(old.root(), "A#a", "A#a", Some(2));

    let mut new = CallTree::new("v2", "Test#test", "Test#test");
    let early_new = new.add_child_with_eoi(new.root(), "A#a", "A#a", Some(3));
    let late_new = new.add_child_with_eoi(new.root(), "A#a", "A#a", Some(9));

    let pair = CallTreePair::pair(old, new, false).unwrap();
    assert_eq!(pair.counterpart(early_old), early_new);
    assert_eq!(pair.counterpart(late_old), late_new);
}

#[test]
fn test_pairing_rejects_sentinel_input() {
    let mut old = CallTree::new("v1", "Test#test", "Test#test");
    old.add_child(old.root(), ADDED, ADDED);
    let new = CallTree::new("v2", "Test#test", "Test#test");

    assert!(CallTreePair::pair(old, new, true).is_err());
}

#[test]
fn test_refresh_statistics_caches_every_node() {
    let mut pair = CallTreePair::pair(sample_tree("v1"), sample_tree("v2"), true).unwrap();
    let root = pair.root();
    pair.new_vm(root, Side::Old);
    pair.add_measurement(root, Side::Old, 100);
    pair.refresh_statistics();

    let series = pair.old().node(root).measurements("v1").unwrap();
    assert!(series.has_cached_statistics());
    assert!(pair.has_measurements(root));
    assert!(!pair.has_measurements(find(pair.old(), "C#c")));
}
