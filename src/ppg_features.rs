//! Pulse landmarks and tangent-line onset for one inter-beat PPG segment.
//!
//! All functions here are pure: running them again on the same
//! [`FilteredSegment`] gives the same answer.

use crate::filters::Derivative;

/// Filtered PPG values for one segment and their first difference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FilteredSegment {
    values: Vec<i64>,
    derivative: Vec<i64>,
    derivative_length: usize,
}

impl FilteredSegment {
    pub fn new(values: Vec<i64>, derivative_length: usize) -> Self {
        let derivative_length = derivative_length.max(1);
        let mut stage = Derivative::primed(derivative_length, values.first().copied().unwrap_or(0));
        let derivative = values.iter().map(|&v| stage.filter(v)).collect();
        Self {
            values,
            derivative,
            derivative_length,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn values(&self) -> &[i64] {
        &self.values
    }

    pub fn derivative(&self) -> &[i64] {
        &self.derivative
    }

    fn delay_of(&self, index: usize) -> usize {
        self.values.len() - 1 - index
    }

    fn index_of(&self, delay: usize) -> Option<usize> {
        (delay < self.values.len()).then(|| self.values.len() - 1 - delay)
    }
}

/// Peak, steepest upstroke and preceding through of a pulse, as delays
/// counted back from the last sample of the segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PpgLandmarks {
    pub peak_delay: usize,
    pub turn_delay: usize,
    pub through_delay: usize,
}

/// Pulse foot where the tangent at the turn reaches the through amplitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PulseOnset {
    /// Fractional index from the start of the segment
    pub position: f64,
    /// Samples between the onset and the end of the segment
    pub delay: f64,
    /// Filtered amplitude interpolated at `position`
    pub amplitude: f64,
}

/// First index holding the maximum of `values`.
fn first_max(values: &[i64]) -> Option<usize> {
    values
        .iter()
        .enumerate()
        .fold(None, |best: Option<(usize, i64)>, (i, &v)| match best {
            Some((_, b)) if v <= b => best,
            _ => Some((i, v)),
        })
        .map(|(i, _)| i)
}

pub fn find_landmarks(segment: &FilteredSegment) -> Option<PpgLandmarks> {
    if segment.len() < 3 {
        return None;
    }

    let peak = first_max(segment.values())?;
    let derivative = segment.derivative();
    let turn = first_max(&derivative[..peak])?;

    // Last slope sign change (or flat stretch) before the upstroke
    let through = (0..turn).rev().find(|&i| {
        let signs = derivative[i].signum() + derivative[i + 1].signum();
        (-1..=1).contains(&signs)
    })?;

    Some(PpgLandmarks {
        peak_delay: segment.delay_of(peak),
        turn_delay: segment.delay_of(turn),
        through_delay: segment.delay_of(through),
    })
}

/// Intersect the tangent at the turn with the through amplitude.
///
/// The tangent slope is the turn derivative divided by `derivative_length`,
/// since the derivative spans that many samples rather than one.
pub fn find_onset(segment: &FilteredSegment, landmarks: &PpgLandmarks) -> Option<PulseOnset> {
    let turn = segment.index_of(landmarks.turn_delay)?;
    let through = segment.index_of(landmarks.through_delay)?;
    let values = segment.values();

    let slope = segment.derivative()[turn] as f64 / segment.derivative_length as f64;
    if slope == 0.0 {
        return None;
    }

    let position = (values[through] - values[turn]) as f64 / slope + turn as f64;
    let last = (segment.len() - 1) as f64;
    if !position.is_finite() || !(0.0..=last).contains(&position) {
        return None;
    }

    let base = position.floor() as usize;
    let fraction = position - base as f64;
    let next = (base + 1).min(segment.len() - 1);
    let amplitude = values[base] as f64 + (values[next] - values[base]) as f64 * fraction;

    Some(PulseOnset {
        position,
        delay: segment.len() as f64 - position,
        amplitude,
    })
}
