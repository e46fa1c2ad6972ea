use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

/// Fixed-capacity ring buffer of training transitions.
///
/// Once full, each push overwrites the oldest entry.
pub struct ReplayBuffer<T> {
    buffer: Vec<T>,
    capacity: usize,
    position: usize,
    rng: StdRng,
}

impl<T: Clone> ReplayBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self::with_rng(capacity, StdRng::from_os_rng())
    }

    pub fn with_seed(capacity: usize, seed: u64) -> Self {
        Self::with_rng(capacity, StdRng::seed_from_u64(seed))
    }

    fn with_rng(capacity: usize, rng: StdRng) -> Self {
        assert!(capacity > 0, "ReplayBuffer capacity must be > 0");
        ReplayBuffer {
            buffer: Vec::with_capacity(capacity),
            capacity,
            position: 0,
            rng,
        }
    }

    /// Add a transition. Overwrites the oldest when full.
    pub fn push(&mut self, item: T) {
        if self.buffer.len() < self.capacity {
            self.buffer.push(item);
        } else {
            self.buffer[self.position] = item;
        }
        self.position = (self.position + 1) % self.capacity;
    }

    /// Sample `batch_size` distinct entries uniformly at random.
    pub fn sample(&mut self, batch_size: usize) -> Vec<T> {
        let len = self.buffer.len();
        assert!(batch_size <= len, "Not enough transitions to sample");
        let indices = index::sample(&mut self.rng, len, batch_size);
        indices.iter().map(|i| self.buffer[i].clone()).collect()
    }

    /// Entries from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        let split = if self.buffer.len() < self.capacity {
            0
        } else {
            self.position
        };
        self.buffer[split..].iter().chain(self.buffer[..split].iter())
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }
}
