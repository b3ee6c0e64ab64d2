//! Inter-slice scheduler: partitions a basestation's RBGs among its slices
//! each TTI.
//!
//! Modeled as a closed enum of tagged variants rather than a trait object —
//! dispatch is static, matching the corpus's preference for enums over
//! `dyn` for a small, fixed set of behaviors.

use crate::error::SimError;
use crate::slice::{Slice, SliceRequirements};
use log::{debug, warn};
use std::sync::Arc;

/// A trained SAC actor's inference step, injected so the crate never
/// depends on a specific model-serving backend. Takes the flattened
/// observation vector, returns the raw action vector (pre-normalization).
pub type SacPolicy = Arc<dyn Fn(&[f32]) -> Result<Vec<f32>, SimError> + Send + Sync>;

#[derive(Clone)]
pub enum InterScheduler {
    RoundRobin {
        offset: usize,
    },
    OptimalHeuristic {
        use_all_resources: bool,
        rr_offset: usize,
    },
    Sac {
        policy: SacPolicy,
    },
    /// Contract-only: the MILP formulation is out of scope. Invoking this
    /// variant always fails; it exists so configurations can name the
    /// policy without the crate silently substituting another one.
    Optimal {
        use_all_resources: bool,
    },
}

impl std::fmt::Debug for InterScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InterScheduler::RoundRobin { offset } => f.debug_struct("RoundRobin").field("offset", offset).finish(),
            InterScheduler::OptimalHeuristic { use_all_resources, rr_offset } => f
                .debug_struct("OptimalHeuristic")
                .field("use_all_resources", use_all_resources)
                .field("rr_offset", rr_offset)
                .finish(),
            InterScheduler::Sac { .. } => f.debug_struct("Sac").finish(),
            InterScheduler::Optimal { use_all_resources } => {
                f.debug_struct("Optimal").field("use_all_resources", use_all_resources).finish()
            }
        }
    }
}

impl InterScheduler {
    pub fn round_robin() -> Self {
        InterScheduler::RoundRobin { offset: 0 }
    }

    pub fn optimal_heuristic(use_all_resources: bool) -> Self {
        InterScheduler::OptimalHeuristic { use_all_resources, rr_offset: 0 }
    }

    /// Partition `n_rbgs` among `slices`, mutating each slice's granted RBG
    /// list. Prior grants are cleared first.
    pub fn schedule(&mut self, slices: &mut [Slice], n_rbgs: usize, rbg_bandwidth_hz: f64, tti_seconds: f64) -> Result<(), SimError> {
        for s in slices.iter_mut() {
            s.clear_rbgs();
        }
        let counts = match self {
            InterScheduler::RoundRobin { offset } => round_robin_counts(slices, n_rbgs, offset),
            InterScheduler::OptimalHeuristic { use_all_resources, rr_offset } => {
                optimal_heuristic_counts(slices, n_rbgs, rbg_bandwidth_hz, tti_seconds, *use_all_resources, rr_offset)?
            }
            InterScheduler::Sac { policy } => sac_counts(slices, n_rbgs, policy.as_ref())?,
            InterScheduler::Optimal { .. } => {
                warn!("Optimal inter-scheduler invoked; this variant is contract-only and always fails");
                return Err(SimError::InvariantViolation(
                    "Optimal inter-scheduler is contract-only; no MILP solver is wired in".to_string(),
                ));
            }
        };

        let total: usize = counts.iter().sum();
        if total > n_rbgs {
            return Err(SimError::InvariantViolation(format!(
                "scheduler awarded {} RBGs across slices but basestation only owns {}",
                total, n_rbgs
            )));
        }
        debug!("scheduled {} of {} RBGs across {} slices", total, n_rbgs, slices.len());

        assign_rbg_ids_from_counts(slices, &counts);
        Ok(())
    }
}

fn assign_rbg_ids_from_counts(slices: &mut [Slice], counts: &[usize]) {
    let mut next_id = 0usize;
    for (slice, &count) in slices.iter_mut().zip(counts) {
        let ids: Vec<usize> = (next_id..next_id + count).collect();
        next_id += count;
        slice.set_granted_rbgs(ids);
    }
}

/// Expand slices into a virtual id sequence where slice `s` is repeated
/// `|users(s)|` times, cycling with a persistent offset.
fn round_robin_counts(slices: &[Slice], n_rbgs: usize, offset: &mut usize) -> Vec<usize> {
    let mut sequence = Vec::new();
    for (i, s) in slices.iter().enumerate() {
        for _ in 0..s.n_users().max(1) {
            sequence.push(i);
        }
    }
    let mut counts = vec![0usize; slices.len()];
    if sequence.is_empty() {
        return counts;
    }
    for k in 0..n_rbgs {
        let idx = (*offset + k) % sequence.len();
        counts[sequence[idx]] += 1;
    }
    *offset = (*offset + n_rbgs) % sequence.len();
    counts
}

/// Per-user minimum-throughput estimate (Phase A), converted to an RBG
/// count via `ceil(min_thr / (SE * rbg_bandwidth))`. A non-positive SE
/// contributes no floor: more RBGs would not raise a non-positive-SE
/// user's throughput, so there is nothing scheduling more RBGs could fix.
fn min_rbs_for_user(user: &crate::user::User, requirements: &SliceRequirements, rbg_bandwidth_hz: f64, tti_seconds: f64) -> Result<usize, SimError> {
    let min_thr = min_thr_for_user(user, requirements, tti_seconds)?;
    let se = user.spectral_efficiency().unwrap_or(0.0);
    if se <= 0.0 || min_thr <= 0.0 {
        return Ok(0);
    }
    Ok((min_thr / (se * rbg_bandwidth_hz)).ceil() as usize)
}

fn min_thr_for_user(user: &crate::user::User, requirements: &SliceRequirements, tti_seconds: f64) -> Result<f64, SimError> {
    match *requirements {
        SliceRequirements::ThroughputOriented { throughput, latency, pkt_loss } => {
            let mut min_thr = throughput;

            let age_threshold = latency as usize;
            let max_lat = user.buffer().max_lat();
            if age_threshold < max_lat {
                let bits = user.buffer().bits_aged_at_least(age_threshold);
                min_thr = min_thr.max(bits as f64 / tti_seconds);
            }

            let w = user.effective_window() as u64;
            let denom = user.buffer().loss_window_denominator_bits(w)?;
            let budget_bits = pkt_loss * denom;
            let dropped_so_far = user.buffer().dropped_bits(w)? as f64;
            let remaining_budget = (budget_bits - dropped_so_far).max(0.0);
            let max_lat_pred_bits = (user.buffer().oldest_bucket_pkts() * user.buffer().pkt_size_bits()) as f64;
            let excess_bits = (max_lat_pred_bits - remaining_budget).max(0.0);
            let need_to_send_pkts = (excess_bits / user.buffer().pkt_size_bits() as f64).ceil();
            let pkt_loss_floor = need_to_send_pkts * user.buffer().pkt_size_bits() as f64 / tti_seconds;
            min_thr = min_thr.max(pkt_loss_floor);

            Ok(min_thr)
        }
        SliceRequirements::BestEffort { long_term_thr, fifth_perc_thr } => {
            let w = user.effective_window();
            let hist = user.hist_allocated_throughput();
            let take = (w.saturating_sub(1)).min(hist.len());
            let prev = &hist[hist.len() - take..];

            let agg_prev: f64 = prev.iter().sum();
            let long_floor = (long_term_thr * w as f64 - agg_prev).max(0.0);

            let fifth_floor = match prev.iter().cloned().fold(None, |acc: Option<f64>, v| Some(acc.map_or(v, |m| m.min(v)))) {
                None => fifth_perc_thr,
                Some(min_past) if min_past < fifth_perc_thr => min_past.min(fifth_perc_thr),
                Some(_) => 0.0,
            };

            Ok(long_floor.max(fifth_floor))
        }
    }
}

/// Phase B: sum each slice's per-user minimums, then ration RBGs to slices
/// proportionally (or award the minimums directly when they fit).
fn optimal_heuristic_counts(
    slices: &mut [Slice],
    n_rbgs: usize,
    rbg_bandwidth_hz: f64,
    tti_seconds: f64,
    use_all_resources: bool,
    rr_offset: &mut usize,
) -> Result<Vec<usize>, SimError> {
    let mut slice_min = Vec::with_capacity(slices.len());
    for slice in slices.iter() {
        let mut sum = 0usize;
        for &uid in slice.user_order() {
            let user = slice.users().get(&uid).expect("user_order is consistent with users map");
            sum += min_rbs_for_user(user, &slice.requirements, rbg_bandwidth_hz, tti_seconds)?;
        }
        slice_min.push(sum);
    }

    let total: usize = slice_min.iter().sum();
    let mut counts = if total <= n_rbgs {
        slice_min.clone()
    } else {
        let mut floors: Vec<usize> = slice_min
            .iter()
            .map(|&m| ((m as f64 / total as f64) * n_rbgs as f64).floor() as usize)
            .collect();
        let residual = n_rbgs - floors.iter().sum::<usize>();
        distribute_residual(&mut floors, residual, rr_offset);
        floors
    };

    if total > n_rbgs {
        warn!("Phase-A minimums ({}) exceed the {} available RBGs; falling back to proportional floors", total, n_rbgs);
    }
    if total <= n_rbgs && use_all_resources {
        let residual = n_rbgs - total;
        distribute_residual(&mut counts, residual, rr_offset);
    }

    Ok(counts)
}

/// Hand out `residual` RBGs one at a time in slice order, starting at the
/// persistent offset, ties favoring earlier slice ids.
fn distribute_residual(counts: &mut [usize], residual: usize, rr_offset: &mut usize) {
    if counts.is_empty() {
        return;
    }
    for k in 0..residual {
        let idx = (*rr_offset + k) % counts.len();
        counts[idx] += 1;
    }
    if residual > 0 {
        *rr_offset = (*rr_offset + residual) % counts.len();
    }
}

/// 9-metric-per-slice observation vector, concatenated after each slice's
/// requirement values (3 for eMBB/URLLC, 2 for BE).
pub fn observation_vector(slices: &[Slice], window: u64) -> Result<Vec<f32>, SimError> {
    let mut obs = Vec::new();
    for slice in slices {
        match slice.requirements {
            SliceRequirements::ThroughputOriented { throughput, latency, pkt_loss } => {
                obs.push(throughput as f32);
                obs.push(latency as f32);
                obs.push(pkt_loss as f32);
            }
            SliceRequirements::BestEffort { long_term_thr, fifth_perc_thr } => {
                obs.push(long_term_thr as f32);
                obs.push(fifth_perc_thr as f32);
            }
        }
    }
    for slice in slices {
        obs.extend(slice_metrics(slice, window)?);
    }
    Ok(obs)
}

fn slice_metrics(slice: &Slice, window: u64) -> Result<[f32; 9], SimError> {
    let users: Vec<_> = slice.user_order().iter().map(|id| slice.users().get(id).unwrap()).collect();
    let n = users.len().max(1) as f64;

    let avg_se = users.iter().map(|u| u.spectral_efficiency().unwrap_or(0.0)).sum::<f64>() / n;
    let served_thr = users.iter().filter_map(|u| u.hist_allocated_throughput().last()).sum::<f64>();
    let last_sent: u64 = users.iter().map(|u| u.buffer().sent_bits(1).unwrap_or(0)).sum();
    let occupancy = users.iter().map(|u| u.buffer().buffer_occupancy()).sum::<f64>() / n;
    let mut loss = 0.0;
    for u in &users {
        loss += u.buffer().pkt_loss_rate(window)?;
    }
    loss /= n;
    let last_arrived: u64 = users.iter().map(|u| u.buffer().arrived_bits(1).unwrap_or(0)).sum();
    let avg_lat = users.iter().map(|u| u.buffer().avg_buffer_latency_seconds()).sum::<f64>() / n;
    let long_term = users.iter().filter_map(|u| u.hist_long_term_thr().last()).sum::<f64>();
    let fifth = users.iter().filter_map(|u| u.hist_fifth_perc_thr().last()).sum::<f64>();

    Ok([
        avg_se as f32,
        served_thr as f32,
        last_sent as f32,
        occupancy as f32,
        loss as f32,
        last_arrived as f32,
        avg_lat as f32,
        long_term as f32,
        fifth as f32,
    ])
}

/// Normalize the policy's raw action into a per-slice RBG count: shift to
/// non-negative, normalize to sum 1, scale by `n_rbgs`, then round so
/// components sum exactly to `n_rbgs` by repeated ceiling on whichever
/// component is closest to its fractional target.
fn action_to_counts(action: &[f32], n_rbgs: usize) -> Vec<usize> {
    let shifted: Vec<f64> = action.iter().map(|&a| (a as f64 + 1.0).max(0.0)).collect();
    let sum: f64 = shifted.iter().sum();
    let targets: Vec<f64> = if sum > 0.0 {
        shifted.iter().map(|&s| s / sum * n_rbgs as f64).collect()
    } else {
        vec![n_rbgs as f64 / action.len().max(1) as f64; action.len()]
    };

    let mut counts: Vec<usize> = targets.iter().map(|&t| t.floor() as usize).collect();
    let mut residual = n_rbgs - counts.iter().sum::<usize>();
    let mut fracs: Vec<(usize, f64)> = targets.iter().enumerate().map(|(i, &t)| (i, t - t.floor())).collect();
    fracs.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    let mut i = 0;
    while residual > 0 && !fracs.is_empty() {
        counts[fracs[i % fracs.len()].0] += 1;
        residual -= 1;
        i += 1;
    }
    counts
}

fn sac_counts(slices: &[Slice], n_rbgs: usize, policy: &(dyn Fn(&[f32]) -> Result<Vec<f32>, SimError> + Send + Sync)) -> Result<Vec<usize>, SimError> {
    let obs = observation_vector(slices, 10)?;
    let action = policy(&obs)?;
    if action.len() != slices.len() {
        return Err(SimError::Model(format!(
            "policy returned an action of length {}, expected {}",
            action.len(),
            slices.len()
        )));
    }
    Ok(action_to_counts(&action, n_rbgs))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowConfiguration;
    use crate::slice::{Slice, SliceType};
    use crate::user::{User, UserConfiguration};

    fn user_config() -> UserConfiguration {
        UserConfiguration {
            max_lat: 5,
            buffer_size_bits: 1_000_000,
            pkt_size_bits: 1_000,
            flow: FlowConfiguration { kind: "poisson".to_string(), throughput: 0.0 },
        }
    }

    fn make_slice(id: u64, n_users: usize) -> Slice {
        let users: Vec<User> = (0..n_users).map(|i| User::new((id * 100 + i as u64), &user_config(), 1e-3, 10).unwrap()).collect();
        Slice::new(
            id,
            SliceType::Embb,
            SliceRequirements::ThroughputOriented { throughput: 1.0, latency: 3.0, pkt_loss: 0.1 },
            users,
        )
        .unwrap()
    }

    /// S3. Round-Robin proportionality: 2 and 3 users, 10 RBGs -> 4 and 6.
    #[test]
    fn s3_round_robin_proportionality() {
        let mut slices = vec![make_slice(0, 2), make_slice(1, 3)];
        let mut sched = InterScheduler::round_robin();
        sched.schedule(&mut slices, 10, 180_000.0, 1e-3).unwrap();
        assert_eq!(slices[0].granted_rbgs().len(), 4);
        assert_eq!(slices[1].granted_rbgs().len(), 6);
    }

    /// S4. OptimalHeuristic oversubscription: Phase-A sums {6,6,8}, 10 RBGs
    /// -> proportional floors {3,3,4}, no residual.
    #[test]
    fn s4_optimal_heuristic_oversubscription_floors() {
        let slice_min = vec![6usize, 6, 8];
        let total: usize = slice_min.iter().sum();
        let n_rbgs = 10usize;
        let floors: Vec<usize> = slice_min.iter().map(|&m| ((m as f64 / total as f64) * n_rbgs as f64).floor() as usize).collect();
        assert_eq!(floors, vec![3, 3, 4]);
        assert_eq!(n_rbgs - floors.iter().sum::<usize>(), 0);
    }

    #[test]
    fn optimal_is_contract_only() {
        let mut slices = vec![make_slice(0, 1)];
        let mut sched = InterScheduler::Optimal { use_all_resources: false };
        let err = sched.schedule(&mut slices, 4, 180_000.0, 1e-3).unwrap_err();
        assert!(matches!(err, SimError::InvariantViolation(_)));
    }

    #[test]
    fn rbg_grants_never_exceed_basestation_total() {
        let mut slices = vec![make_slice(0, 2), make_slice(1, 3)];
        let mut sched = InterScheduler::round_robin();
        sched.schedule(&mut slices, 10, 180_000.0, 1e-3).unwrap();
        let total: usize = slices.iter().map(|s| s.granted_rbgs().len()).sum();
        assert!(total <= 10);
    }

    #[test]
    fn action_to_counts_sums_to_n_rbgs() {
        let counts = action_to_counts(&[0.2, -0.5, 0.9], 10);
        assert_eq!(counts.iter().sum::<usize>(), 10);
    }
}
