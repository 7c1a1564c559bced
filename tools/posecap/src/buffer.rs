use crate::sample::Sample;

/// Append-only sample accumulator owned by exactly one session.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RecordingBuffer {
    samples: Vec<Sample>,
}

impl RecordingBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a buffer from samples that were already ordered, e.g. a
    /// parsed export.
    pub fn from_samples(samples: Vec<Sample>) -> Self {
        Self { samples }
    }

    pub fn append(&mut self, sample: Sample) {
        debug_assert!(
            self.samples
                .last()
                .map_or(true, |last| last.timestamp <= sample.timestamp),
            "samples must be appended in timestamp order"
        );
        self.samples.push(sample);
    }

    pub fn snapshot(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn last_timestamp(&self) -> Option<u64> {
        self.samples.last().map(|sample| sample.timestamp)
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }
}
