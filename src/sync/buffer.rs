use std::collections::VecDeque;

/// Fixed-capacity event window. Entries are kept in arrival order and the
/// oldest entry is evicted once the capacity is reached.
#[derive(Debug, Clone)]
pub struct BoundedEventBuffer<T> {
    entries: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedEventBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `entry`, returning whatever was evicted to make room.
    pub fn push(&mut self, entry: T) -> Option<T> {
        if self.capacity == 0 {
            return Some(entry);
        }

        let evicted = if self.entries.len() == self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(entry);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter_newest_first(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().rev()
    }

    pub fn iter_oldest_first(&self) -> impl Iterator<Item = &T> {
        self.entries.iter()
    }
}

impl<T: Clone> BoundedEventBuffer<T> {
    pub fn to_vec_newest_first(&self) -> Vec<T> {
        self.iter_newest_first().cloned().collect()
    }

    pub fn to_vec_oldest_first(&self) -> Vec<T> {
        self.iter_oldest_first().cloned().collect()
    }
}
