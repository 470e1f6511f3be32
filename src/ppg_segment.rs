/// Filtered PPG values covering one inter-beat interval, oldest first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PpgSegment {
    samples: Vec<i64>,
}

impl PpgSegment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            samples: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, sample: i64) {
        self.samples.push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn samples(&self) -> &[i64] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<i64> {
        self.samples
    }
}

impl From<Vec<i64>> for PpgSegment {
    fn from(samples: Vec<i64>) -> Self {
        Self { samples }
    }
}

/// A segment handed off by [`PpgSegmentBuffer::split`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedSegment {
    pub segment: PpgSegment,
    /// Stream index of the first value in `segment`
    pub start_index: u64,
}

/// Collects PPG values between consecutive heartbeats.
#[derive(Debug, Clone)]
pub struct PpgSegmentBuffer {
    active: PpgSegment,
    active_start: u64,
    capacity_hint: usize,
}

impl PpgSegmentBuffer {
    /// `capacity_hint` pre-sizes each new segment, typically one R-R interval.
    pub fn new(capacity_hint: usize) -> Self {
        Self {
            active: PpgSegment::with_capacity(capacity_hint),
            active_start: 0,
            capacity_hint,
        }
    }

    pub fn append(&mut self, sample: i64) {
        self.active.push(sample);
    }

    pub fn active(&self) -> &PpgSegment {
        &self.active
    }

    /// Stream index of the first value in the active segment.
    pub fn active_start(&self) -> u64 {
        self.active_start
    }

    /// Close the active segment at a heartbeat found `delay` samples ago.
    ///
    /// The last `delay` values were recorded after the heartbeat and open
    /// the next segment. A delay longer than the segment moves every value
    /// forward and finishes an empty segment.
    pub fn split(&mut self, delay: usize) -> FinishedSegment {
        let cut = self.active.len().saturating_sub(delay);

        let mut next = Vec::with_capacity(self.capacity_hint.max(delay));
        next.extend_from_slice(&self.active.samples[cut..]);
        self.active.samples.truncate(cut);

        let finished = FinishedSegment {
            segment: std::mem::replace(&mut self.active, PpgSegment::from(next)),
            start_index: self.active_start,
        };
        self.active_start += cut as u64;
        finished
    }
}
