//! Simulation driver: owns numerology and the global clock, fans each TTI
//! out to every basestation.

use crate::basestation::BaseStation;
use crate::error::SimError;
use crate::scheduler::InterScheduler;
use crate::slice::SliceConfiguration;
use log::{trace, warn};
use serde::Serialize;

/// `(5G option, RBs per RBG)` — the numerology tuple basestations derive
/// their TTI and RBG bandwidth from.
#[derive(Debug, Clone, Copy)]
pub struct Numerology {
    pub option_5g: u8,
    pub rbs_per_rbg: usize,
}

impl Numerology {
    pub fn validate(&self) -> Result<(), SimError> {
        if self.option_5g > 4 {
            warn!("rejecting numerology: option_5g must be in 0..=4, got {}", self.option_5g);
            return Err(SimError::Config(format!("option_5g must be in 0..=4, got {}", self.option_5g)));
        }
        if self.rbs_per_rbg == 0 {
            warn!("rejecting numerology: rbs_per_rbg must be > 0");
            return Err(SimError::Config("rbs_per_rbg must be > 0".to_string()));
        }
        Ok(())
    }

    pub fn tti_seconds(&self) -> f64 {
        2f64.powi(-(self.option_5g as i32)) * 1e-3
    }

    pub fn sub_carrier_width_hz(&self) -> f64 {
        2f64.powi(self.option_5g as i32) * 15_000.0
    }

    pub fn rb_bandwidth_hz(&self) -> f64 {
        12.0 * self.sub_carrier_width_hz()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Simulation {
    numerology_option_5g: u8,
    numerology_rbs_per_rbg: usize,
    tti_seconds: f64,
    rb_bandwidth_hz: f64,
    basestations: Vec<BaseStation>,
    next_basestation_id: u64,
    step: usize,
}

impl Simulation {
    pub fn new(numerology: Numerology) -> Result<Self, SimError> {
        numerology.validate()?;
        Ok(Self {
            numerology_option_5g: numerology.option_5g,
            numerology_rbs_per_rbg: numerology.rbs_per_rbg,
            tti_seconds: numerology.tti_seconds(),
            rb_bandwidth_hz: numerology.rb_bandwidth_hz(),
            basestations: Vec::new(),
            next_basestation_id: 0,
            step: 0,
        })
    }

    pub fn tti_seconds(&self) -> f64 {
        self.tti_seconds
    }

    pub fn rb_bandwidth_hz(&self) -> f64 {
        self.rb_bandwidth_hz
    }

    pub fn step(&self) -> usize {
        self.step
    }

    pub fn basestations(&self) -> &[BaseStation] {
        &self.basestations
    }

    pub fn basestations_mut(&mut self) -> &mut [BaseStation] {
        &mut self.basestations
    }

    /// Construct and add a basestation, using the simulation's numerology
    /// for its TTI and RBG bandwidth. Returns the assigned id.
    #[allow(clippy::too_many_arguments)]
    pub fn add_basestation(
        &mut self,
        display_name: String,
        n_rbgs: usize,
        seed: u64,
        window_max: usize,
        inter_scheduler: InterScheduler,
        slice_configs: Vec<SliceConfiguration>,
    ) -> Result<u64, SimError> {
        let id = self.next_basestation_id;
        let bs = BaseStation::new(
            id,
            display_name,
            self.tti_seconds,
            self.rb_bandwidth_hz,
            self.numerology_rbs_per_rbg,
            n_rbgs,
            seed,
            window_max,
            inter_scheduler,
            slice_configs,
        )?;
        self.basestations.push(bs);
        self.next_basestation_id += 1;
        Ok(id)
    }

    /// Advance every basestation through one TTI: `arrive -> schedule ->
    /// transmit`, strictly sequential across all basestations within each
    /// phase (a phase completes for every basestation before the next
    /// begins).
    pub fn tick(&mut self) -> Result<(), SimError> {
        for bs in self.basestations.iter_mut() {
            bs.arrive_pkts();
        }
        for bs in self.basestations.iter_mut() {
            bs.schedule_rbgs()?;
        }
        for bs in self.basestations.iter_mut() {
            bs.transmit()?;
        }
        self.step += 1;
        trace!("simulation advanced to step {} across {} basestations", self.step, self.basestations.len());
        Ok(())
    }

    /// Same as `tick`, but fans each phase out across basestations with
    /// `rayon`, honoring the barrier between phases. Basestations share no
    /// mutable state, so this is a pure parallelization of `tick`.
    #[cfg(feature = "parallel")]
    pub fn tick_parallel(&mut self) -> Result<(), SimError> {
        use rayon::prelude::*;

        self.basestations.par_iter_mut().for_each(|bs| bs.arrive_pkts());
        self.basestations.par_iter_mut().try_for_each(|bs| bs.schedule_rbgs())?;
        self.basestations.par_iter_mut().try_for_each(|bs| bs.transmit())?;
        self.step += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowConfiguration;
    use crate::slice::{SliceRequirements, SliceType};
    use crate::user::UserConfiguration;

    fn embb_slice_config(n_users: usize) -> SliceConfiguration {
        SliceConfiguration {
            slice_type: SliceType::Embb,
            requirements: SliceRequirements::ThroughputOriented { throughput: 100.0, latency: 3.0, pkt_loss: 0.1 },
            users: (0..n_users)
                .map(|_| UserConfiguration {
                    max_lat: 5,
                    buffer_size_bits: 1_000_000,
                    pkt_size_bits: 1_000,
                    flow: FlowConfiguration { kind: "poisson".to_string(), throughput: 500_000.0 },
                })
                .collect(),
        }
    }

    #[test]
    fn numerology_option_zero_matches_standard_1ms_tti() {
        let num = Numerology { option_5g: 0, rbs_per_rbg: 1 };
        assert_eq!(num.tti_seconds(), 1e-3);
        assert_eq!(num.sub_carrier_width_hz(), 15_000.0);
        assert_eq!(num.rb_bandwidth_hz(), 180_000.0);
    }

    #[test]
    fn invalid_numerology_is_rejected() {
        let num = Numerology { option_5g: 9, rbs_per_rbg: 1 };
        assert!(matches!(Simulation::new(num), Err(SimError::Config(_))));
    }

    #[test]
    fn basestation_ids_are_monotonically_increasing() {
        let mut sim = Simulation::new(Numerology { option_5g: 0, rbs_per_rbg: 1 }).unwrap();
        let id0 = sim.add_basestation("a".to_string(), 10, 1, 10, InterScheduler::round_robin(), vec![embb_slice_config(2)]).unwrap();
        let id1 = sim.add_basestation("b".to_string(), 10, 2, 10, InterScheduler::round_robin(), vec![embb_slice_config(2)]).unwrap();
        assert_eq!(id0, 0);
        assert_eq!(id1, 1);
    }

    /// Invariant 7: a fixed seed reproduces an identical reward trajectory.
    #[test]
    fn same_seed_reproduces_identical_reward_history() {
        let run = || {
            let mut sim = Simulation::new(Numerology { option_5g: 0, rbs_per_rbg: 1 }).unwrap();
            let bs_id = sim
                .add_basestation("a".to_string(), 10, 7, 10, InterScheduler::round_robin(), vec![embb_slice_config(3)])
                .unwrap();
            for _ in 0..10 {
                sim.basestations_mut()[bs_id as usize].set_user_spectral_efficiency(0, 3.0).unwrap();
                sim.tick().unwrap();
            }
            sim.basestations()[bs_id as usize].hist_reward().to_vec()
        };
        assert_eq!(run(), run());
    }

    #[test]
    fn tick_advances_every_basestation() {
        let mut sim = Simulation::new(Numerology { option_5g: 0, rbs_per_rbg: 1 }).unwrap();
        sim.add_basestation("a".to_string(), 10, 1, 10, InterScheduler::round_robin(), vec![embb_slice_config(2)]).unwrap();
        sim.add_basestation("b".to_string(), 10, 2, 10, InterScheduler::round_robin(), vec![embb_slice_config(3)]).unwrap();
        for _ in 0..4 {
            sim.tick().unwrap();
        }
        assert_eq!(sim.step(), 4);
        for bs in sim.basestations() {
            assert_eq!(bs.step(), 4);
        }
    }
}
