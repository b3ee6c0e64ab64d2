//! Runs a small fixed basestation for a handful of TTIs and logs the
//! reward trajectory. Not part of the library's public contract — a
//! manual-inspection aid only.

use log::info;
use slice_sched_sim::{
    FlowConfiguration, InterScheduler, Numerology, Simulation, SliceConfiguration, SliceRequirements, SliceType,
    UserConfiguration,
};

fn user_config() -> UserConfiguration {
    UserConfiguration {
        max_lat: 10,
        buffer_size_bits: 1_000_000,
        pkt_size_bits: 1_000,
        flow: FlowConfiguration { kind: "poisson".to_string(), throughput: 2_000_000.0 },
    }
}

fn main() {
    env_logger::Builder::from_default_env().filter_level(log::LevelFilter::Info).init();

    let mut sim = Simulation::new(Numerology { option_5g: 0, rbs_per_rbg: 2 }).expect("valid numerology");

    let embb = SliceConfiguration {
        slice_type: SliceType::Embb,
        requirements: SliceRequirements::ThroughputOriented { throughput: 1_000_000.0, latency: 5.0, pkt_loss: 0.05 },
        users: vec![user_config(), user_config()],
    };
    let urllc = SliceConfiguration {
        slice_type: SliceType::Urllc,
        requirements: SliceRequirements::ThroughputOriented { throughput: 500_000.0, latency: 2.0, pkt_loss: 0.01 },
        users: vec![user_config()],
    };

    let bs_id = sim
        .add_basestation("demo-bs".to_string(), 20, 42, 50, InterScheduler::optimal_heuristic(false), vec![embb, urllc])
        .expect("valid basestation configuration");

    for tti in 0..20 {
        let bs = &mut sim.basestations_mut()[bs_id as usize];
        for uid in 0..3u64 {
            bs.set_user_spectral_efficiency(uid, 2.5).expect("known user id");
        }
        sim.tick().expect("TTI pipeline does not fail under this scenario");
        let bs = &sim.basestations()[bs_id as usize];
        info!("tti={} reward={:.4}", tti, bs.hist_reward().last().copied().unwrap_or(0.0));
    }
}
