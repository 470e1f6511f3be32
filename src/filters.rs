//! Integer filter cascades for the ECG and PPG channels.
//!
//! Every stage keeps a fixed-size circular buffer sized at configuration
//! time, so filtering a sample never allocates.

use crate::parameters::SampleRateParameters;

/// Saturation level of the moving-window integrator
const INTEGRATOR_CEILING: i64 = 32000;

/// Fixed-capacity circular buffer with a single write cursor.
#[derive(Debug, Clone)]
pub(crate) struct RingBuffer {
    data: Box<[i64]>,
    cursor: usize,
}

impl RingBuffer {
    pub(crate) fn new(capacity: usize) -> Self {
        Self::filled(capacity, 0)
    }

    pub(crate) fn filled(capacity: usize, value: i64) -> Self {
        Self {
            data: vec![value; capacity.max(1)].into_boxed_slice(),
            cursor: 0,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.data.len()
    }

    /// Value pushed `age` samples ago, `1..=len`. `ago(len)` is the slot the
    /// next push will overwrite.
    pub(crate) fn ago(&self, age: usize) -> i64 {
        let len = self.data.len();
        self.data[(self.cursor + len - age % len) % len]
    }

    /// Store `value` and return the sample it evicts.
    pub(crate) fn push(&mut self, value: i64) -> i64 {
        let evicted = std::mem::replace(&mut self.data[self.cursor], value);
        self.cursor = (self.cursor + 1) % self.data.len();
        evicted
    }

    /// Contents oldest-first.
    pub(crate) fn chronological(&self) -> impl Iterator<Item = i64> + '_ {
        let (newer, older) = self.data.split_at(self.cursor);
        older.iter().chain(newer.iter()).copied()
    }
}

/// `y[n] = 2y[n-1] - y[n-2] + x[n] - 2x[n-L/2] + x[n-L]`, scaled to unity gain.
#[derive(Debug, Clone)]
pub struct LowPass {
    window: RingBuffer,
    y1: i64,
    y2: i64,
}

impl LowPass {
    pub fn new(length: usize) -> Self {
        Self {
            window: RingBuffer::new(length.max(2)),
            y1: 0,
            y2: 0,
        }
    }

    pub fn filter(&mut self, x: i64) -> i64 {
        let length = self.window.len();
        let oldest = self.window.ago(length);
        let half = self.window.ago(length / 2);

        let y0 = 2 * self.y1 - self.y2 + x - 2 * half + oldest;
        self.y2 = self.y1;
        self.y1 = y0;
        self.window.push(x);

        y0 / ((length * length / 4) as i64)
    }
}

/// Subtracts the running mean of the last `H` samples from the centre sample.
#[derive(Debug, Clone)]
pub struct HighPass {
    window: RingBuffer,
    sum: i64,
}

impl HighPass {
    pub fn new(length: usize) -> Self {
        Self {
            window: RingBuffer::new(length),
            sum: 0,
        }
    }

    pub fn filter(&mut self, x: i64) -> i64 {
        let length = self.window.len();
        let half = length / 2;
        let centre = if half == 0 { x } else { self.window.ago(half) };

        let evicted = self.window.push(x);
        self.sum += x - evicted;

        centre - self.sum / length as i64
    }
}

/// `y[n] = x[n] - x[n-D]`
#[derive(Debug, Clone)]
pub struct Derivative {
    window: RingBuffer,
}

impl Derivative {
    pub fn new(length: usize) -> Self {
        Self {
            window: RingBuffer::new(length),
        }
    }

    /// A derivative whose history already holds `initial`, so a signal that
    /// starts at `initial` produces no start-up step.
    pub fn primed(length: usize, initial: i64) -> Self {
        Self {
            window: RingBuffer::filled(length, initial),
        }
    }

    pub fn filter(&mut self, x: i64) -> i64 {
        x - self.window.push(x)
    }
}

/// Running average over `window_width` samples, saturating at 32000.
#[derive(Debug, Clone)]
pub struct MovingWindowIntegrator {
    window: RingBuffer,
    sum: i64,
}

impl MovingWindowIntegrator {
    pub fn new(width: usize) -> Self {
        Self {
            window: RingBuffer::new(width),
            sum: 0,
        }
    }

    pub fn filter(&mut self, x: i64) -> i64 {
        let evicted = self.window.push(x);
        self.sum += x - evicted;
        (self.sum / self.window.len() as i64).min(INTEGRATOR_CEILING)
    }
}

/// QRS-enhancing cascade: low-pass, high-pass, derivative, absolute value and
/// moving-window integration.
#[derive(Debug, Clone)]
pub struct EcgFilterBank {
    low_pass: LowPass,
    high_pass: HighPass,
    derivative: Derivative,
    integrator: MovingWindowIntegrator,
}

impl EcgFilterBank {
    pub fn new(params: &SampleRateParameters) -> Self {
        Self {
            low_pass: LowPass::new(params.low_pass_buffer_length),
            high_pass: HighPass::new(params.high_pass_buffer_length),
            derivative: Derivative::new(params.derivative_length),
            integrator: MovingWindowIntegrator::new(params.window_width),
        }
    }

    pub fn filter(&mut self, sample: i32) -> i32 {
        let x = self.low_pass.filter(i64::from(sample));
        let x = self.high_pass.filter(x);
        let x = self.derivative.filter(x).abs();
        // The integrator output is bounded by INTEGRATOR_CEILING.
        self.integrator.filter(x) as i32
    }
}

/// Pulse cascade: low-pass and a half-second baseline-removing high-pass.
///
/// The bank is fed each raw PPG sample exactly once, in stream order.
#[derive(Debug, Clone)]
pub struct PpgFilterBank {
    low_pass: LowPass,
    high_pass: HighPass,
}

impl PpgFilterBank {
    pub fn new(params: &SampleRateParameters) -> Self {
        Self {
            low_pass: LowPass::new(params.low_pass_buffer_length),
            high_pass: HighPass::new(params.ppg_high_pass_buffer_length),
        }
    }

    pub fn filter(&mut self, sample: i32) -> i64 {
        let x = self.low_pass.filter(i64::from(sample));
        self.high_pass.filter(x)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn impulse(len: usize, amplitude: i64) -> impl Iterator<Item = i64> {
        (0..len).map(move |i| if i == 0 { amplitude } else { 0 })
    }

    #[test]
    fn test_ring_buffer_wraps() {
        let mut ring = RingBuffer::new(3);
        for v in 1..=5 {
            ring.push(v);
        }
        assert_eq!(ring.chronological().collect::<Vec<_>>(), vec![3, 4, 5]);
        assert_eq!(ring.ago(1), 5);
        assert_eq!(ring.ago(3), 3);
        assert_eq!(ring.push(6), 3);
    }

    #[test]
    fn test_low_pass_impulse_is_triangular() {
        let mut lp = LowPass::new(10);
        let response: Vec<i64> = impulse(12, 2000).map(|x| lp.filter(x)).collect();
        assert_eq!(
            response,
            vec![80, 160, 240, 320, 400, 320, 240, 160, 80, 0, 0, 0]
        );
    }

    #[test]
    fn test_low_pass_has_unity_dc_gain() {
        let mut lp = LowPass::new(10);
        let last = (0..40).map(|_| lp.filter(1234)).last().unwrap();
        assert_eq!(last, 1234);
    }

    #[test]
    fn test_high_pass_removes_constant_offset() {
        let mut hp = HighPass::new(25);
        let settled: Vec<i64> = (0..60).map(|_| hp.filter(5000)).skip(25).collect();
        assert!(settled.iter().all(|&v| v == 0));
    }

    #[test]
    fn test_derivative_of_ramp_is_constant() {
        let mut d = Derivative::new(2);
        let out: Vec<i64> = (0..10).map(|i| d.filter(7 * i)).skip(2).collect();
        assert!(out.iter().all(|&v| v == 14));
    }

    #[test]
    fn test_primed_derivative_has_no_startup_step() {
        let mut d = Derivative::primed(2, 900);
        assert_eq!(d.filter(900), 0);
        assert_eq!(d.filter(900), 0);
        assert_eq!(d.filter(910), 10);
    }

    #[test]
    fn test_integrator_saturates() {
        let mut mwi = MovingWindowIntegrator::new(4);
        let last = (0..10).map(|_| mwi.filter(1_000_000)).last().unwrap();
        assert_eq!(last, INTEGRATOR_CEILING);
    }

    #[test]
    fn test_ecg_bank_impulse_gives_single_hump() {
        let params = SampleRateParameters::new(200).unwrap();
        let mut bank = EcgFilterBank::new(&params);
        let response: Vec<i32> = (0..80)
            .map(|i| bank.filter(if i == 0 { 2000 } else { 0 }))
            .collect();

        let (max_idx, &max) = response
            .iter()
            .enumerate()
            .max_by_key(|&(i, v)| (*v, std::cmp::Reverse(i)))
            .unwrap();
        assert_eq!(max, 91);
        assert_eq!(max_idx, 22);
        // The response dies out well inside one beat at 60 bpm
        assert!(response[48..].iter().all(|&v| v == 0));
    }

    #[test]
    fn test_ppg_bank_delays_periodic_signal() {
        let params = SampleRateParameters::new(200).unwrap();
        let mut bank = PpgFilterBank::new(&params);
        // The period matches the high-pass window, so its running mean is constant
        let period = params.ppg_high_pass_buffer_length;
        let raw: Vec<i32> = (0..800).map(|n| 2000 + ((n % period) as i32)).collect();
        let filtered: Vec<i64> = raw.iter().map(|&s| bank.filter(s)).collect();

        let delay = params.ppg_filter_delay;
        let offset = filtered[560] - i64::from(raw[560 - delay]);
        for n in 560..640 {
            assert_eq!(filtered[n] - i64::from(raw[n - delay]), offset);
        }
    }
}
