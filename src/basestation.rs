//! BaseStation: owns RBGs and Slices, runs the per-TTI pipeline, computes
//! the aggregate reward.

use crate::error::SimError;
use crate::rbg::Rbg;
use crate::scheduler::InterScheduler;
use crate::slice::{Slice, SliceConfiguration, SliceRequirements, SliceType};
use log::{debug, warn};
use rand::SeedableRng;
use rand::rngs::StdRng;
use serde::Serialize;
use std::collections::HashMap;

/// Reward weights from the design's aggregate-reward table (§4.6).
mod reward_weights {
    pub const EMBB_THR: f64 = 0.20;
    pub const EMBB_LAT: f64 = 0.05;
    pub const EMBB_LOSS: f64 = 0.05;
    pub const URLLC_THR: f64 = 0.10;
    pub const URLLC_LAT: f64 = 0.25;
    pub const URLLC_LOSS: f64 = 0.25;
    pub const BE_LONG: f64 = 0.05;
    pub const BE_FIFTH: f64 = 0.05;
}

#[derive(Debug, Clone, Serialize)]
pub struct BaseStation {
    pub id: u64,
    pub display_name: String,
    tti_seconds: f64,
    rbg_bandwidth_hz: f64,
    rbgs: Vec<Rbg>,
    slices: Vec<Slice>,
    /// user id -> index into `slices`; a lookup relation, not ownership.
    user_index: HashMap<u64, usize>,
    #[serde(skip)]
    inter_scheduler: InterScheduler,
    #[serde(skip)]
    rng: StdRng,
    step: usize,
    hist_reward: Vec<f64>,
    hist_scheduler_elapsed_seconds: Vec<f64>,
}

impl BaseStation {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: u64,
        display_name: String,
        tti_seconds: f64,
        rb_bandwidth_hz: f64,
        rbs_per_rbg: usize,
        n_rbgs: usize,
        seed: u64,
        window_max: usize,
        inter_scheduler: InterScheduler,
        slice_configs: Vec<SliceConfiguration>,
    ) -> Result<Self, SimError> {
        if slice_configs.is_empty() {
            warn!("rejecting basestation '{}': no slices configured", display_name);
            return Err(SimError::Config("basestation must own at least one slice".to_string()));
        }
        let rbg_bandwidth_hz = rbs_per_rbg as f64 * rb_bandwidth_hz;
        let rbgs = Rbg::build_fixed_list(n_rbgs, rbs_per_rbg, rb_bandwidth_hz);

        let mut slices = Vec::with_capacity(slice_configs.len());
        let mut user_index = HashMap::new();
        let mut next_user_id = 0u64;
        for (slice_id, cfg) in slice_configs.into_iter().enumerate() {
            cfg.validate()?;
            let mut users = Vec::with_capacity(cfg.users.len());
            for user_cfg in &cfg.users {
                let user = crate::user::User::new(next_user_id, user_cfg, tti_seconds, window_max)?;
                user_index.insert(next_user_id, slice_id);
                users.push(user);
                next_user_id += 1;
            }
            slices.push(Slice::new(slice_id as u64, cfg.slice_type, cfg.requirements, users)?);
        }
        debug!("basestation '{}' built with {} slices, {} RBGs, {} users", display_name, slices.len(), rbgs.len(), next_user_id);

        Ok(Self {
            id,
            display_name,
            tti_seconds,
            rbg_bandwidth_hz,
            rbgs,
            slices,
            user_index,
            inter_scheduler,
            rng: StdRng::seed_from_u64(seed),
            step: 0,
            hist_reward: Vec::new(),
            hist_scheduler_elapsed_seconds: Vec::new(),
        })
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn slices(&self) -> &[Slice] {
        &self.slices
    }

    pub fn n_rbgs(&self) -> usize {
        self.rbgs.len()
    }

    /// Deliver this TTI's spectral efficiency for a user before
    /// `arrive_pkts` runs.
    pub fn set_user_spectral_efficiency(&mut self, user_id: u64, se: f64) -> Result<(), SimError> {
        let &slice_idx = self
            .user_index
            .get(&user_id)
            .ok_or_else(|| SimError::InvalidArgument(format!("unknown user id {}", user_id)))?;
        let user = self.slices[slice_idx]
            .users_mut()
            .get_mut(&user_id)
            .expect("user_index is consistent with slice membership");
        user.set_spectral_efficiency(se);
        Ok(())
    }

    pub fn arrive_pkts(&mut self) {
        let rng = &mut self.rng;
        for slice in self.slices.iter_mut() {
            slice.arrive_pkts(rng);
        }
    }

    pub fn schedule_rbgs(&mut self) -> Result<(), SimError> {
        let start = std::time::Instant::now();
        self.inter_scheduler.schedule(&mut self.slices, self.rbgs.len(), self.rbg_bandwidth_hz, self.tti_seconds)?;
        for slice in self.slices.iter_mut() {
            slice.schedule_intra_rbgs();
        }
        self.hist_scheduler_elapsed_seconds.push(start.elapsed().as_secs_f64());
        Ok(())
    }

    pub fn transmit(&mut self) -> Result<(), SimError> {
        for slice in self.slices.iter_mut() {
            slice.transmit(self.rbg_bandwidth_hz)?;
        }
        self.step += 1;
        let reward = self.calculate_reward();
        self.hist_reward.push(reward);
        debug!("basestation '{}' tti={} reward={:.4}", self.display_name, self.step, reward);
        Ok(())
    }

    /// Weighted sum of negative QoS violations across slices; zero exactly
    /// when every active requirement is met.
    fn calculate_reward(&self) -> f64 {
        let mut reward = 0.0;
        for slice in &self.slices {
            match (slice.slice_type, slice.requirements) {
                (SliceType::Embb, SliceRequirements::ThroughputOriented { throughput, latency, pkt_loss }) => {
                    reward -= throughput_violation(slice, throughput, latency, pkt_loss, reward_weights::EMBB_THR, reward_weights::EMBB_LAT, reward_weights::EMBB_LOSS);
                }
                (SliceType::Urllc, SliceRequirements::ThroughputOriented { throughput, latency, pkt_loss }) => {
                    reward -= throughput_violation(slice, throughput, latency, pkt_loss, reward_weights::URLLC_THR, reward_weights::URLLC_LAT, reward_weights::URLLC_LOSS);
                }
                (SliceType::Be, SliceRequirements::BestEffort { long_term_thr, fifth_perc_thr }) => {
                    reward -= be_violation(slice, long_term_thr, fifth_perc_thr);
                }
                _ => unreachable!("Slice::new rejects mismatched slice_type/requirements pairs"),
            }
        }
        reward
    }

    pub fn hist_reward(&self) -> &[f64] {
        &self.hist_reward
    }

    pub fn hist_scheduler_elapsed_seconds(&self) -> &[f64] {
        &self.hist_scheduler_elapsed_seconds
    }
}

fn throughput_violation(slice: &Slice, throughput_req: f64, latency_req: f64, loss_req: f64, w_thr: f64, w_lat: f64, w_loss: f64) -> f64 {
    let mut v = 0.0;
    if let Some(thr) = slice.worst_user_throughput() {
        if thr < throughput_req && throughput_req > 0.0 {
            v += w_thr * (throughput_req - thr) / throughput_req;
        }
    }
    if let (Some(lat), Some(max_lat)) = (slice.worst_user_latency_ttis(), slice.max_lat_ttis()) {
        let max_lat = max_lat as f64;
        if lat > latency_req && max_lat > latency_req {
            v += w_lat * (lat - latency_req) / (max_lat - latency_req);
        }
    }
    if let Some(loss) = slice.worst_user_loss() {
        if loss > loss_req && loss_req < 1.0 {
            v += w_loss * (loss - loss_req) / (1.0 - loss_req);
        }
    }
    v
}

fn be_violation(slice: &Slice, long_term_req: f64, fifth_perc_req: f64) -> f64 {
    let mut v = 0.0;
    if let Some(long) = slice.worst_user_long_term_thr() {
        if long < long_term_req && long_term_req > 0.0 {
            v += reward_weights::BE_LONG * (long_term_req - long) / long_term_req;
        }
    }
    if let Some(fifth) = slice.worst_user_fifth_perc_thr() {
        if fifth < fifth_perc_req && fifth_perc_req > 0.0 {
            v += reward_weights::BE_FIFTH * (fifth_perc_req - fifth) / fifth_perc_req;
        }
    }
    v
}
