//! Slices: owned groups of users sharing QoS requirements, plus the
//! intra-slice Round-Robin scheduler that fans a slice's granted RBGs out
//! across its users.

use crate::error::SimError;
use crate::user::{User, UserConfiguration};
use log::warn;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Traffic class. The requirements map's recognized keys depend on this tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SliceType {
    Embb,
    Urllc,
    Be,
}

/// Type-dependent QoS requirements, dense per variant rather than a single
/// open string-keyed map — a slice only ever carries the fields its type
/// defines.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub enum SliceRequirements {
    /// `throughput` (bits/s), `latency` (TTIs), `pkt_loss` (ratio).
    ThroughputOriented { throughput: f64, latency: f64, pkt_loss: f64 },
    /// `long_term_thr` (bits/s), `fifth_perc_thr` (bits/s).
    BestEffort { long_term_thr: f64, fifth_perc_thr: f64 },
}

impl SliceRequirements {
    pub fn matches(&self, slice_type: SliceType) -> bool {
        matches!(
            (self, slice_type),
            (SliceRequirements::ThroughputOriented { .. }, SliceType::Embb | SliceType::Urllc)
                | (SliceRequirements::BestEffort { .. }, SliceType::Be)
        )
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SliceConfiguration {
    pub slice_type: SliceType,
    pub requirements: SliceRequirements,
    pub users: Vec<UserConfiguration>,
}

impl SliceConfiguration {
    pub fn validate(&self) -> Result<(), SimError> {
        if !self.requirements.matches(self.slice_type) {
            warn!("rejecting slice configuration: requirements variant does not match slice type {:?}", self.slice_type);
            return Err(SimError::Config(format!(
                "requirements variant does not match slice type {:?}",
                self.slice_type
            )));
        }
        if self.users.is_empty() {
            warn!("rejecting slice configuration: no users configured for a {:?} slice", self.slice_type);
            return Err(SimError::Config("slice must own at least one user".to_string()));
        }
        for u in &self.users {
            u.validate()?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Slice {
    pub id: u64,
    pub slice_type: SliceType,
    pub requirements: SliceRequirements,
    users: HashMap<u64, User>,
    /// Stable iteration order for Round-Robin priority and Phase B ties.
    user_order: Vec<u64>,
    rr_offset: usize,
    granted_rbgs: Vec<usize>,
    hist_n_rbgs: Vec<usize>,
    hist_aggregate_throughput: Vec<f64>,
}

impl Slice {
    pub fn new(id: u64, slice_type: SliceType, requirements: SliceRequirements, users: Vec<User>) -> Result<Self, SimError> {
        if !requirements.matches(slice_type) {
            return Err(SimError::Config(format!(
                "requirements variant does not match slice type {:?}",
                slice_type
            )));
        }
        if users.is_empty() {
            return Err(SimError::Config("slice must own at least one user".to_string()));
        }
        let user_order = users.iter().map(|u| u.id).collect();
        let users = users.into_iter().map(|u| (u.id, u)).collect();
        Ok(Self {
            id,
            slice_type,
            requirements,
            users,
            user_order,
            rr_offset: 0,
            granted_rbgs: Vec::new(),
            hist_n_rbgs: Vec::new(),
            hist_aggregate_throughput: Vec::new(),
        })
    }

    pub fn users(&self) -> &HashMap<u64, User> {
        &self.users
    }

    pub fn users_mut(&mut self) -> &mut HashMap<u64, User> {
        &mut self.users
    }

    pub fn user_order(&self) -> &[u64] {
        &self.user_order
    }

    pub fn n_users(&self) -> usize {
        self.users.len()
    }

    /// Clears any prior grant. Called by the inter-scheduler before it
    /// assigns this TTI's count.
    pub fn clear_rbgs(&mut self) {
        self.granted_rbgs.clear();
    }

    pub fn granted_rbgs(&self) -> &[usize] {
        &self.granted_rbgs
    }

    pub fn set_granted_rbgs(&mut self, rbgs: Vec<usize>) {
        self.granted_rbgs = rbgs;
    }

    /// Fan the slice's granted RBGs out to its users in round-robin order,
    /// preserving the starting offset across TTIs so the user who would
    /// have received the next RBG last TTI receives the first RBG this TTI.
    pub fn schedule_intra_rbgs(&mut self) {
        let n_users = self.user_order.len();
        if n_users == 0 {
            return;
        }
        let mut per_user: HashMap<u64, Vec<usize>> = self.user_order.iter().map(|&id| (id, Vec::new())).collect();
        for (k, &rbg_id) in self.granted_rbgs.iter().enumerate() {
            let idx = (self.rr_offset + k) % n_users;
            per_user.get_mut(&self.user_order[idx]).unwrap().push(rbg_id);
        }
        if !self.granted_rbgs.is_empty() {
            self.rr_offset = (self.rr_offset + self.granted_rbgs.len()) % n_users;
        }
        for (id, rbgs) in per_user {
            if let Some(user) = self.users.get_mut(&id) {
                user.grant_rbgs(rbgs);
            }
        }
    }

    /// The rotation order starting at this TTI's offset — used by
    /// OptimalHeuristic's Phase B to walk users in priority order.
    pub fn round_robin_priority(&self) -> Vec<u64> {
        let n = self.user_order.len();
        (0..n).map(|k| self.user_order[(self.rr_offset + k) % n]).collect()
    }

    pub fn arrive_pkts(&mut self, rng: &mut dyn RngCore) {
        for id in &self.user_order {
            if let Some(user) = self.users.get_mut(id) {
                user.arrive_pkts(rng);
            }
        }
    }

    /// The lowest last-TTI throughput across the slice's users — the
    /// reward function's per-requirement worst case.
    pub fn worst_user_throughput(&self) -> Option<f64> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter_map(|u| u.hist_allocated_throughput().last().copied())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    pub fn worst_user_latency_ttis(&self) -> Option<f64> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .map(|u| u.buffer().avg_buffer_latency_ttis())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    pub fn worst_user_loss(&self) -> Option<f64> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter_map(|u| u.hist_pkt_loss_ratio().last().copied())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.max(v))))
    }

    pub fn worst_user_long_term_thr(&self) -> Option<f64> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter_map(|u| u.hist_long_term_thr().last().copied())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    pub fn worst_user_fifth_perc_thr(&self) -> Option<f64> {
        self.user_order
            .iter()
            .filter_map(|id| self.users.get(id))
            .filter_map(|u| u.hist_fifth_perc_thr().last().copied())
            .fold(None, |acc, v| Some(acc.map_or(v, |m: f64| m.min(v))))
    }

    pub fn max_lat_ttis(&self) -> Option<usize> {
        self.user_order.first().and_then(|id| self.users.get(id)).map(|u| u.buffer().max_lat())
    }

    pub fn transmit(&mut self, rbg_bandwidth_hz: f64) -> Result<(), SimError> {
        let mut total_thr = 0.0;
        for id in &self.user_order {
            let user = self.users.get_mut(id).expect("user_order is consistent with users map");
            user.transmit(rbg_bandwidth_hz)?;
            total_thr += user.hist_allocated_throughput().last().copied().unwrap_or(0.0);
        }
        self.hist_n_rbgs.push(self.granted_rbgs.len());
        self.hist_aggregate_throughput.push(total_thr);
        Ok(())
    }

    pub fn hist_aggregate_throughput(&self) -> &[f64] {
        &self.hist_aggregate_throughput
    }

    pub fn hist_n_rbgs(&self) -> &[usize] {
        &self.hist_n_rbgs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::flow::FlowConfiguration;

    fn user_config() -> UserConfiguration {
        UserConfiguration {
            max_lat: 5,
            buffer_size_bits: 1_000_000,
            pkt_size_bits: 1_000,
            flow: FlowConfiguration {
                kind: "poisson".to_string(),
                throughput: 0.0,
            },
        }
    }

    fn make_slice(n_users: usize) -> Slice {
        let users: Vec<User> = (0..n_users)
            .map(|i| User::new(i as u64, &user_config(), 1e-3, 10).unwrap())
            .collect();
        Slice::new(
            0,
            SliceType::Embb,
            SliceRequirements::ThroughputOriented {
                throughput: 1_000.0,
                latency: 3.0,
                pkt_loss: 0.1,
            },
            users,
        )
        .unwrap()
    }

    #[test]
    fn mismatched_requirements_are_rejected() {
        let users = vec![User::new(0, &user_config(), 1e-3, 10).unwrap()];
        let err = Slice::new(
            0,
            SliceType::Be,
            SliceRequirements::ThroughputOriented {
                throughput: 1.0,
                latency: 1.0,
                pkt_loss: 0.1,
            },
            users,
        )
        .unwrap_err();
        assert!(matches!(err, SimError::Config(_)));
    }

    /// S3. Round-robin intra-slice fan-out: 2 RBGs over 3 users keeps the
    /// unserved users' turn for next TTI via the persistent offset.
    #[test]
    fn intra_slice_round_robin_rotates_offset() {
        let mut slice = make_slice(3);
        slice.set_granted_rbgs(vec![10, 11]);
        slice.schedule_intra_rbgs();
        assert_eq!(slice.users().get(&0).unwrap().granted_rbgs(), &[10]);
        assert_eq!(slice.users().get(&1).unwrap().granted_rbgs(), &[11]);
        assert_eq!(slice.users().get(&2).unwrap().granted_rbgs(), &[] as &[usize]);

        slice.clear_rbgs();
        slice.set_granted_rbgs(vec![20, 21]);
        slice.schedule_intra_rbgs();
        // offset advanced by 2, so user 2 starts this round.
        assert_eq!(slice.users().get(&2).unwrap().granted_rbgs(), &[20]);
        assert_eq!(slice.users().get(&0).unwrap().granted_rbgs(), &[21]);
        assert_eq!(slice.users().get(&1).unwrap().granted_rbgs(), &[] as &[usize]);
    }
}
