//! Weighted random selection.
//!
//! A `WeightedList` maps entries to integer weights and draws one with
//! probability proportional to its weight, using a cumulative-sum table
//! and a single uniform roll.

use rand::Rng;

/// One entry with its weight and the running cumulative total up to and
/// including it.
#[derive(Clone, Debug)]
struct WeightedEntry<T> {
    value: T,
    weight: u32,
    cumulative: u64,
}

/// An ordered list of weighted entries.
#[derive(Clone, Debug)]
pub struct WeightedList<T> {
    entries: Vec<WeightedEntry<T>>,
    total: u64,
}

impl<T> Default for WeightedList<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> WeightedList<T> {
    pub fn new() -> Self {
        Self { entries: Vec::new(), total: 0 }
    }

    /// Add an entry. Weights below 1 are rejected and reported by the
    /// return value.
    pub fn add(&mut self, value: T, weight: u32) -> bool {
        if weight == 0 {
            return false;
        }
        self.total += u64::from(weight);
        self.entries.push(WeightedEntry { value, weight, cumulative: self.total });
        true
    }

    /// Pick an entry at random, proportional to weight. `None` when the
    /// list is empty.
    pub fn pick(&self, rng: &mut impl Rng) -> Option<&T> {
        if self.total == 0 {
            return None;
        }
        let roll = rng.gen_range(1..=self.total);
        // First entry whose cumulative sum reaches the roll.
        let idx = self
            .entries
            .partition_point(|e| e.cumulative < roll);
        self.entries.get(idx).map(|e| &e.value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn total_weight(&self) -> u64 {
        self.total
    }

    pub fn iter(&self) -> impl Iterator<Item = (&T, u32)> {
        self.entries.iter().map(|e| (&e.value, e.weight))
    }

    fn rebuild(&mut self) {
        let mut total = 0u64;
        for entry in &mut self.entries {
            total += u64::from(entry.weight);
            entry.cumulative = total;
        }
        self.total = total;
    }
}

impl<T: PartialEq> WeightedList<T> {
    /// Remove all entries equal to `value` and rebuild the cumulative
    /// table. Reports whether anything was removed.
    pub fn remove(&mut self, value: &T) -> bool {
        let before = self.entries.len();
        self.entries.retain(|e| e.value != *value);
        if self.entries.len() == before {
            return false;
        }
        self.rebuild();
        true
    }
}

impl<T> FromIterator<(T, u32)> for WeightedList<T> {
    fn from_iter<I: IntoIterator<Item = (T, u32)>>(iter: I) -> Self {
        let mut list = Self::new();
        for (value, weight) in iter {
            list.add(value, weight);
        }
        list
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_add_rejects_zero_weight() {
        let mut list = WeightedList::new();
        assert!(!list.add("a", 0));
        assert!(list.is_empty());
        assert!(list.add("a", 1));
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_pick_empty_is_none() {
        let list: WeightedList<&str> = WeightedList::new();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        assert!(list.pick(&mut rng).is_none());
    }

    #[test]
    fn test_pick_converges_to_weight_proportions() {
        let mut list = WeightedList::new();
        list.add("common", 30);
        list.add("uncommon", 9);
        list.add("rare", 1);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        let mut counts = [0usize; 3];
        let rolls = 40_000;
        for _ in 0..rolls {
            match *list.pick(&mut rng).unwrap() {
                "common" => counts[0] += 1,
                "uncommon" => counts[1] += 1,
                _ => counts[2] += 1,
            }
        }
        let freq = |c: usize| c as f64 / rolls as f64;
        assert!((freq(counts[0]) - 0.75).abs() < 0.02);
        assert!((freq(counts[1]) - 0.225).abs() < 0.02);
        assert!((freq(counts[2]) - 0.025).abs() < 0.01);
    }

    #[test]
    fn test_remove_rebuilds_cumulative_table() {
        let mut list = WeightedList::new();
        list.add("a", 5);
        list.add("b", 5);
        assert!(list.remove(&"a"));
        assert_eq!(list.total_weight(), 5);

        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            assert_eq!(*list.pick(&mut rng).unwrap(), "b");
        }
        assert!(!list.remove(&"a"));
    }
}
