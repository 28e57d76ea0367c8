use rand::Rng;
use std::collections::HashMap;

const CONSUMED: usize = usize::MAX;

/// In-memory rows of one partition: every key ever inserted, in insertion
/// order, each with a consumed flag.
///
/// Unconsumed rows are additionally tracked in a dense vector so that a
/// uniformly random unconsumed row can be picked and retired in O(1).
#[derive(Debug, Default)]
pub(crate) struct Table {
    rows: Vec<u64>,
    index: HashMap<u64, usize>,
    /// For each row, its slot in `unconsumed`, or `CONSUMED`.
    slots: Vec<usize>,
    unconsumed: Vec<usize>,
}

impl Table {
    pub(crate) fn contains(&self, key: u64) -> bool {
        self.index.contains_key(&key)
    }

    /// Inserts `key` as an unconsumed row. Returns `false` if it already
    /// exists, consumed or not.
    pub(crate) fn insert(&mut self, key: u64) -> bool {
        if self.contains(key) {
            return false;
        }
        let row = self.rows.len();
        self.rows.push(key);
        self.index.insert(key, row);
        self.slots.push(self.unconsumed.len());
        self.unconsumed.push(row);
        true
    }

    /// Picks a uniformly random unconsumed key without retiring it.
    pub(crate) fn pick(&self, rng: &mut impl Rng) -> Option<u64> {
        if self.unconsumed.is_empty() {
            return None;
        }
        let slot = rng.random_range(0..self.unconsumed.len());
        Some(self.rows[self.unconsumed[slot]])
    }

    /// Flips `key` to consumed. Returns `false` if it is unknown or already
    /// consumed.
    pub(crate) fn consume(&mut self, key: u64) -> bool {
        let Some(&row) = self.index.get(&key) else {
            return false;
        };
        let slot = self.slots[row];
        if slot == CONSUMED {
            return false;
        }
        self.unconsumed.swap_remove(slot);
        if let Some(&moved) = self.unconsumed.get(slot) {
            self.slots[moved] = slot;
        }
        self.slots[row] = CONSUMED;
        true
    }

    #[cfg(test)]
    pub(crate) fn is_consumed(&self, key: u64) -> Option<bool> {
        self.index.get(&key).map(|&row| self.slots[row] == CONSUMED)
    }

    pub(crate) fn count_total(&self) -> usize {
        self.rows.len()
    }

    pub(crate) fn count_unconsumed(&self) -> usize {
        self.unconsumed.len()
    }

    /// All rows in insertion order with their consumed flag.
    pub(crate) fn rows(&self) -> impl Iterator<Item = (u64, bool)> + '_ {
        self.rows
            .iter()
            .zip(&self.slots)
            .map(|(&key, &slot)| (key, slot == CONSUMED))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn consume_keeps_slots_consistent() {
        let mut table = Table::default();
        for key in [10, 20, 30, 40] {
            assert!(table.insert(key));
        }
        assert!(!table.insert(20));

        assert!(table.consume(10));
        assert!(!table.consume(10));
        assert!(table.consume(40));
        assert!(!table.consume(99));

        assert_eq!(table.count_total(), 4);
        assert_eq!(table.count_unconsumed(), 2);
        assert_eq!(table.is_consumed(10), Some(true));
        assert_eq!(table.is_consumed(20), Some(false));

        let mut rng = rand::rng();
        let mut seen = HashSet::new();
        while let Some(key) = table.pick(&mut rng) {
            assert!(table.consume(key));
            seen.insert(key);
        }
        assert_eq!(seen, HashSet::from([20, 30]));
    }

    #[test]
    fn consumed_rows_are_never_reinserted() {
        let mut table = Table::default();
        table.insert(5);
        table.consume(5);
        assert!(!table.insert(5));
        assert_eq!(table.count_unconsumed(), 0);
    }

    #[test]
    fn rows_preserve_insertion_order() {
        let mut table = Table::default();
        for key in [3, 1, 2] {
            table.insert(key);
        }
        table.consume(1);
        let rows: Vec<_> = table.rows().collect();
        assert_eq!(rows, vec![(3, false), (1, true), (2, false)]);
    }
}
