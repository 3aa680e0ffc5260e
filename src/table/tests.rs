use super::*;

#[derive(Debug, Clone, PartialEq, Eq)]
struct Rec {
    key: u32,
    val: &'static str,
}

impl Keyed for Rec {
    type Key = u32;

    fn key(&self) -> &u32 {
        &self.key
    }
}

fn rec(key: u32, val: &'static str) -> Rec {
    Rec { key, val }
}

fn sorted_keys(table: &Table<Rec>) -> Vec<u32> {
    let mut keys: Vec<u32> = table.iter().map(|r| r.key).collect();
    keys.sort_unstable();
    keys
}

#[test]
fn test_empty_table() {
    let table: Table<Rec> = Table::new();
    assert_eq!(table.len(), 0);
    assert!(table.is_empty());
    assert!(table.find(&1).is_none());
    assert!(table.to_vec().is_empty());
    assert_eq!(table.iter().count(), 0);
}

#[test]
fn test_insert_find_remove() {
    let mut table = Table::new();
    table.insert(rec(1, "one"));
    table.insert(rec(2, "two"));
    table.insert(rec(3, "three"));

    assert_eq!(table.find(&2).unwrap().val, "two");
    assert!(table.find(&4).is_none());

    let removed = table.remove(&2).unwrap();
    assert_eq!(removed.val, "two");
    assert!(table.find(&2).is_none());
    assert!(table.remove(&2).is_none());
    assert_eq!(table.len(), 2);

    assert_eq!(table.find(&1).unwrap().val, "one");
    assert_eq!(table.find(&3).unwrap().val, "three");
}

#[test]
fn test_len_tracks_inserts_and_removes() {
    let mut table = Table::new();
    for k in 0..10 {
        table.insert(rec(k, "x"));
        assert_eq!(table.len(), (k + 1) as usize);
    }
    for k in 0..5 {
        assert!(table.remove(&k).is_some());
    }
    assert_eq!(table.len(), 5);
    assert_eq!(sorted_keys(&table), vec![5, 6, 7, 8, 9]);
}

#[test]
fn test_find_mut() {
    let mut table = Table::new();
    table.insert(rec(1, "before"));
    table.find_mut(&1).unwrap().val = "after";
    assert_eq!(table.find(&1).unwrap().val, "after");
}

#[test]
fn test_handle_access() {
    let mut table = Table::new();
    let h1 = table.insert(rec(1, "one"));
    let h2 = table.insert(rec(2, "two"));

    assert_eq!(table.get(h1).unwrap().val, "one");
    table.get_mut(h2).unwrap().val = "zwei";
    assert_eq!(table.find(&2).unwrap().val, "zwei");

    table.remove(&1);
    assert!(table.get(h1).is_none());
}

#[test]
fn test_duplicate_key_chain_head_wins() {
    let mut table = Table::new();
    table.insert(rec(1, "old"));
    table.insert(rec(1, "new"));
    assert_eq!(table.len(), 2);

    // Most recent insertion shadows the older record.
    assert_eq!(table.find(&1).unwrap().val, "new");

    // Removing it uncovers the older one.
    assert_eq!(table.remove(&1).unwrap().val, "new");
    assert_eq!(table.find(&1).unwrap().val, "old");
    assert_eq!(table.len(), 1);
}

#[test]
fn test_growth_thresholds() {
    // One initial bucket, growth to 2n + 1 whenever len > buckets * 4 / 5
    // in integer arithmetic: 1 -> 3 after the first insert, 3 -> 7 after
    // the third.
    let mut table = Table::new();
    assert_eq!(table.buckets.len(), 1);

    let expected = [3, 3, 7, 7, 7];
    for k in 1..=5u32 {
        table.insert(rec(k, "x"));
        assert_eq!(table.buckets.len(), expected[(k - 1) as usize]);
        if k >= 3 {
            assert_eq!(table.find(&3).unwrap().key, 3);
        }
    }
    assert_eq!(table.len(), 5);
    assert_eq!(sorted_keys(&table), vec![1, 2, 3, 4, 5]);
}

#[test]
fn test_growth_preserves_records() {
    let mut table = Table::new();
    for k in 0..200 {
        table.insert(rec(k, "x"));
    }
    assert!(table.buckets.len() > 1);
    assert_eq!(table.len(), 200);
    assert_eq!(sorted_keys(&table), (0..200).collect::<Vec<_>>());
    for k in 0..200 {
        assert_eq!(table.find(&k).unwrap().key, k);
    }
}

#[test]
fn test_to_vec_matches_contents_across_growth() {
    let mut table = Table::new();
    for k in 0..3 {
        table.insert(rec(k, "x"));
    }
    let mut before: Vec<u32> = table.to_vec().iter().map(|r| r.key).collect();
    before.sort_unstable();

    // Push the table through another growth.
    for k in 3..50 {
        table.insert(rec(k, "x"));
    }
    let mut after: Vec<u32> = table.to_vec().iter().map(|r| r.key).collect();
    after.sort_unstable();

    assert_eq!(before, vec![0, 1, 2]);
    assert_eq!(after, (0..50).collect::<Vec<_>>());
}

#[test]
fn test_iter_yields_each_record_once() {
    let mut table = Table::new();
    for k in 0..32 {
        table.insert(rec(k, "x"));
    }
    let mut seen: Vec<u32> = table.iter().map(|r| r.key).collect();
    assert_eq!(seen.len(), 32);
    seen.sort_unstable();
    seen.dedup();
    assert_eq!(seen.len(), 32);
}

#[test]
fn test_slot_reuse_after_remove() {
    let mut table = Table::new();
    for k in 0..8 {
        table.insert(rec(k, "x"));
    }
    let slots_before = table.slots.len();
    for k in 0..4 {
        table.remove(&k);
    }
    for k in 8..12 {
        table.insert(rec(k, "x"));
    }
    // Freed slots are recycled before the arena grows.
    assert_eq!(table.slots.len(), slots_before);
    assert_eq!(sorted_keys(&table), vec![4, 5, 6, 7, 8, 9, 10, 11]);
}
