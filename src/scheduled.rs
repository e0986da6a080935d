use crate::item::{Candidate, Item};
use std::collections::{HashMap, HashSet};

/// Redirect targets already requested per item while following wrappers
#[derive(Debug, Clone, Default)]
pub struct ScheduledItems {
    candidates: HashMap<Item, HashSet<Candidate>>,
}

impl ScheduledItems {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `candidate` for `item`. Returns false if it was already recorded.
    pub fn record(&mut self, item: &Item, candidate: Candidate) -> bool {
        self.candidates.entry(item.clone()).or_default().insert(candidate)
    }

    /// Number of distinct redirect targets recorded for `item`
    pub fn recorded_count(&self, item: &Item) -> usize {
        self.candidates.get(item).map_or(0, HashSet::len)
    }

    pub fn contains(&self, item: &Item, candidate: &Candidate) -> bool {
        self.candidates.get(item).is_some_and(|set| set.contains(candidate))
    }

    /// Forget everything recorded for `item`
    pub fn remove(&mut self, item: &Item) {
        self.candidates.remove(item);
    }
}

impl FromIterator<(Item, HashSet<Candidate>)> for ScheduledItems {
    fn from_iter<I: IntoIterator<Item = (Item, HashSet<Candidate>)>>(iter: I) -> Self {
        Self {
            candidates: iter.into_iter().collect(),
        }
    }
}
