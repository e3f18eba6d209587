use std::collections::{HashSet, VecDeque};

/// Bounded window of message keys already claimed for counting.
///
/// Oldest keys are evicted first once `cap` is reached.
#[derive(Debug)]
pub struct ProcessedMessages {
    cap: usize,
    order: VecDeque<String>,
    index: HashSet<String>,
}

impl ProcessedMessages {
    pub fn new(cap: usize) -> Self {
        Self {
            cap: cap.max(1),
            order: VecDeque::new(),
            index: HashSet::new(),
        }
    }

    /// Returns `false` when `key` was already claimed.
    pub fn claim(&mut self, key: &str) -> bool {
        if self.index.contains(key) {
            return false;
        }
        while self.order.len() >= self.cap {
            if let Some(evicted) = self.order.pop_front() {
                self.index.remove(&evicted);
            }
        }
        self.order.push_back(key.to_string());
        self.index.insert(key.to_string());
        true
    }

    /// Forgets a claim so a redelivery can be counted again.
    pub fn release(&mut self, key: &str) {
        if self.index.remove(key) {
            self.order.retain(|existing| existing != key);
        }
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
