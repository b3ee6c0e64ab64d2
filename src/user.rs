//! A single user: a Flow, a DiscreteBuffer, and the history arrays the
//! schedulers and reward function read back.

use crate::buffer::DiscreteBuffer;
use crate::error::SimError;
use crate::flow::{Flow, FlowConfiguration};
use rand::RngCore;
use serde::{Deserialize, Serialize};

/// Static per-user configuration, consumed at construction.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UserConfiguration {
    pub max_lat: usize,
    pub buffer_size_bits: u64,
    pub pkt_size_bits: u64,
    pub flow: FlowConfiguration,
}

impl UserConfiguration {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.max_lat < 2 {
            return Err(SimError::Config(format!("max_lat must be >= 2, got {}", self.max_lat)));
        }
        self.flow.validate()
    }
}

/// `numpy.percentile(values, 5)` under the default linear-interpolation
/// method, over an already-sorted-ascending copy of `values`.
fn percentile5(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap());
    if sorted.len() == 1 {
        return sorted[0];
    }
    let rank = 0.05 * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    sorted[lower] + (sorted[upper] - sorted[lower]) * frac
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    se: Option<f64>,
    buffer: DiscreteBuffer,
    flow: Flow,
    rbgs: Vec<usize>,
    window_max: usize,
    step: usize,

    hist_allocated_throughput: Vec<f64>,
    hist_n_allocated_rbgs: Vec<usize>,
    hist_spectral_efficiency: Vec<f64>,
    hist_avg_buffer_latency: Vec<f64>,
    hist_dropped_bits: Vec<u64>,
    hist_arrived_bits: Vec<u64>,
    hist_buffered_bits: Vec<u64>,
    hist_fifth_perc_thr: Vec<f64>,
    hist_long_term_thr: Vec<f64>,
    hist_pkt_loss_ratio: Vec<f64>,
    hist_sent_bits: Vec<u64>,
}

impl User {
    pub fn new(id: u64, config: &UserConfiguration, tti_seconds: f64, window_max: usize) -> Result<Self, SimError> {
        config.validate()?;
        let buffer = DiscreteBuffer::new(config.max_lat, config.buffer_size_bits, config.pkt_size_bits, tti_seconds)?;
        let flow = Flow::new(&config.flow, config.pkt_size_bits, tti_seconds)?;
        Ok(Self {
            id,
            se: None,
            buffer,
            flow,
            rbgs: Vec::new(),
            window_max,
            step: 0,
            hist_allocated_throughput: Vec::new(),
            hist_n_allocated_rbgs: Vec::new(),
            hist_spectral_efficiency: Vec::new(),
            hist_avg_buffer_latency: Vec::new(),
            hist_dropped_bits: Vec::new(),
            hist_arrived_bits: Vec::new(),
            hist_buffered_bits: Vec::new(),
            hist_fifth_perc_thr: Vec::new(),
            hist_long_term_thr: Vec::new(),
            hist_pkt_loss_ratio: Vec::new(),
            hist_sent_bits: Vec::new(),
        })
    }

    pub fn set_spectral_efficiency(&mut self, se: f64) {
        self.se = Some(se);
    }

    pub fn spectral_efficiency(&self) -> Option<f64> {
        self.se
    }

    /// Replace the currently-granted RBG set. Called by the intra-slice
    /// scheduler; the previous grant is discarded.
    pub fn grant_rbgs(&mut self, rbgs: Vec<usize>) {
        self.rbgs = rbgs;
    }

    pub fn granted_rbgs(&self) -> &[usize] {
        &self.rbgs
    }

    pub fn buffer(&self) -> &DiscreteBuffer {
        &self.buffer
    }

    pub fn step(&self) -> usize {
        self.step
    }

    /// `min(step + 1, window_max)`, the rolling-window cursor every
    /// "last-window" query is clamped to.
    pub fn effective_window(&self) -> usize {
        (self.step + 1).min(self.window_max).max(1)
    }

    pub fn arrive_pkts(&mut self, rng: &mut dyn RngCore) {
        let n = self.flow.generate_pkts(rng);
        self.buffer.arrive_pkts(n);
        self.hist_spectral_efficiency.push(self.se.unwrap_or(0.0));
        self.hist_arrived_bits.push(n * self.buffer.pkt_size_bits());
    }

    /// `thr = Σ_rbg bandwidth × SE`; drains the buffer at that rate and
    /// appends the full per-TTI history row.
    pub fn transmit(&mut self, rbg_bandwidth_hz: f64) -> Result<(), SimError> {
        if !self.rbgs.is_empty() && self.se.is_none() {
            return Err(SimError::UnsetPrecondition(format!(
                "user {} has granted RBGs but spectral efficiency was never set",
                self.id
            )));
        }
        let se = self.se.unwrap_or(0.0);
        let thr = self.rbgs.len() as f64 * rbg_bandwidth_hz * se;

        self.buffer.transmit(thr);
        self.step += 1;

        let w = self.effective_window() as u64;

        self.hist_allocated_throughput.push(thr);
        self.hist_n_allocated_rbgs.push(self.rbgs.len());
        self.hist_avg_buffer_latency.push(self.buffer.avg_buffer_latency_seconds());
        self.hist_dropped_bits.push(self.buffer.dropped_bits(1)?);
        self.hist_sent_bits.push(self.buffer.sent_bits(1)?);
        self.hist_buffered_bits.push(self.buffer.buffered_bits());

        let window_len = w as usize;
        let tail_start = self.hist_allocated_throughput.len().saturating_sub(window_len);
        let tail = &self.hist_allocated_throughput[tail_start..];
        self.hist_fifth_perc_thr.push(percentile5(tail));
        self.hist_long_term_thr.push(tail.iter().sum::<f64>() / tail.len() as f64);
        self.hist_pkt_loss_ratio.push(self.buffer.pkt_loss_rate(w)?);

        Ok(())
    }

    pub fn hist_allocated_throughput(&self) -> &[f64] {
        &self.hist_allocated_throughput
    }

    pub fn hist_fifth_perc_thr(&self) -> &[f64] {
        &self.hist_fifth_perc_thr
    }

    pub fn hist_long_term_thr(&self) -> &[f64] {
        &self.hist_long_term_thr
    }

    pub fn hist_pkt_loss_ratio(&self) -> &[f64] {
        &self.hist_pkt_loss_ratio
    }

    pub fn hist_spectral_efficiency(&self) -> &[f64] {
        &self.hist_spectral_efficiency
    }

    pub fn hist_n_allocated_rbgs(&self) -> &[usize] {
        &self.hist_n_allocated_rbgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn test_config() -> UserConfiguration {
        UserConfiguration {
            max_lat: 5,
            buffer_size_bits: 1_000_000,
            pkt_size_bits: 1_000,
            flow: FlowConfiguration {
                kind: "poisson".to_string(),
                throughput: 1_000_000.0,
            },
        }
    }

    #[test]
    fn transmit_without_se_and_without_rbgs_is_fine() {
        let mut user = User::new(1, &test_config(), 1e-3, 10).unwrap();
        assert!(user.transmit(180_000.0).is_ok());
    }

    #[test]
    fn transmit_with_rbgs_and_no_se_is_fatal() {
        let mut user = User::new(1, &test_config(), 1e-3, 10).unwrap();
        user.grant_rbgs(vec![0, 1]);
        let err = user.transmit(180_000.0).unwrap_err();
        assert!(matches!(err, SimError::UnsetPrecondition(_)));
    }

    #[test]
    fn fifth_percentile_matches_numpy_linear_method() {
        // numpy.percentile([1,2,3,4,5], 5) == 1.2
        let got = percentile5(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert!((got - 1.2).abs() < 1e-9, "got {}", got);
    }

    #[test]
    fn history_grows_by_one_per_transmit() {
        let mut user = User::new(1, &test_config(), 1e-3, 10).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        user.set_spectral_efficiency(2.0);
        for _ in 0..5 {
            user.arrive_pkts(&mut rng);
            user.grant_rbgs(vec![0]);
            user.transmit(180_000.0).unwrap();
        }
        assert_eq!(user.hist_allocated_throughput().len(), 5);
        assert_eq!(user.hist_fifth_perc_thr().len(), 5);
        assert_eq!(user.hist_long_term_thr().len(), 5);
        assert_eq!(user.hist_pkt_loss_ratio().len(), 5);
    }
}
