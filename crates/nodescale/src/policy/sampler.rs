use std::collections::VecDeque;

/// Sliding window over the most recent workload samples.
#[derive(Debug)]
pub struct WindowedLoadSampler {
    samples: VecDeque<u32>,
    capacity: usize,
}

impl WindowedLoadSampler {
    pub fn new(capacity: u32) -> Self {
        let capacity = capacity.max(1) as usize;
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub fn record(&mut self, sample: u32) {
        if self.samples.len() == self.capacity {
            self.samples.pop_front();
        }
        self.samples.push_back(sample);
    }

    /// Rounded-up mean of the window, zero if no sample was recorded yet.
    pub fn considered_load(&self) -> u32 {
        if self.samples.is_empty() {
            return 0;
        }
        let total: u64 = self.samples.iter().map(|&sample| sample as u64).sum();
        total.div_ceil(self.samples.len() as u64) as u32
    }
}
