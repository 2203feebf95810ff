//! Acceptance bookkeeping for the Metropolis-Hastings blocks.

use serde::{Deserialize, Serialize};

use crate::utils::usize_to_f64;

/// Proposal counters for a single Metropolis-Hastings block.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProposalStats {
    pub proposed: usize,
    pub accepted: usize,
}

impl ProposalStats {
    /// Record one proposal and whether it was accepted.
    pub const fn record(&mut self, accepted: bool) {
        self.proposed += 1;
        if accepted {
            self.accepted += 1;
        }
    }

    /// Acceptance rate in `[0, 1]`, or `0` if no proposals were made.
    #[must_use]
    pub fn acceptance_rate(self) -> f64 {
        if self.proposed == 0 {
            0.0
        } else {
            usize_to_f64(self.accepted) / usize_to_f64(self.proposed)
        }
    }

    /// Pool the counts of two chains.
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            proposed: self.proposed + other.proposed,
            accepted: self.accepted + other.accepted,
        }
    }
}

/// Counters for every MH-updated block of the quantitation model.
///
/// Only the rank that owns the global chain records proposals, so in a
/// synchronized run every other rank carries zero counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceStats {
    pub eta: ProposalStats,
    pub sigmasq_dist: ProposalStats,
    pub tausq_dist: ProposalStats,
    pub n_states_dist: ProposalStats,
}

impl AcceptanceStats {
    #[must_use]
    pub const fn merged(self, other: Self) -> Self {
        Self {
            eta: self.eta.merged(other.eta),
            sigmasq_dist: self.sigmasq_dist.merged(other.sigmasq_dist),
            tausq_dist: self.tausq_dist.merged(other.tausq_dist),
            n_states_dist: self.n_states_dist.merged(other.n_states_dist),
        }
    }

    /// Named acceptance rates in a fixed order, for reporting.
    #[must_use]
    pub fn rates(&self) -> [(&'static str, f64); 4] {
        [
            ("eta", self.eta.acceptance_rate()),
            ("sigmasq_dist", self.sigmasq_dist.acceptance_rate()),
            ("tausq_dist", self.tausq_dist.acceptance_rate()),
            ("n_states_dist", self.n_states_dist.acceptance_rate()),
        ]
    }
}
