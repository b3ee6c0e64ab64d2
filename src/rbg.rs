//! Resource blocks and resource block groups.
//!
//! RBGs are interchangeable within a basestation: the scheduler interface
//! only ever exchanges *counts*, never identities (see the design's
//! scheduler-RBG handshake pattern). `Rbg` still models an identity because
//! `User`/`Slice` hold the currently-granted set, but nothing compares two
//! RBGs for anything other than bandwidth.

use serde::{Deserialize, Serialize};

/// A single resource block.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Rb {
    pub bandwidth_hz: f64,
}

/// A fixed-bandwidth token: the atomic unit the schedulers hand out.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rbg {
    pub id: usize,
    pub bandwidth_hz: f64,
}

impl Rbg {
    /// Build the basestation's fixed RBG list from numerology: each RBG
    /// bundles `rbs_per_rbg` resource blocks of `rb_bandwidth_hz` each.
    pub fn build_fixed_list(n_rbgs: usize, rbs_per_rbg: usize, rb_bandwidth_hz: f64) -> Vec<Rbg> {
        let rbs = vec![Rb { bandwidth_hz: rb_bandwidth_hz }; rbs_per_rbg];
        let bandwidth_hz: f64 = rbs.iter().map(|rb| rb.bandwidth_hz).sum();
        (0..n_rbgs).map(|id| Rbg { id, bandwidth_hz }).collect()
    }
}
