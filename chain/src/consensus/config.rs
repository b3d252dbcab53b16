/// Consensus configuration parameters.
///
/// This includes both protocol-level knobs (epoch cadence, quorum
/// fraction) and enforcement tuning (slash amount, how many epochs of
/// proposals are retained for equivocation detection).
#[derive(Clone, Debug)]
pub struct ConsensusConfig {
    /// Fixed wall-clock duration of one epoch, in seconds.
    pub epoch_duration_secs: u64,
    /// How long a follower waits for a proposal before starting a view
    /// change, in seconds.
    pub view_change_timeout_secs: u64,
    /// Fraction of the known validator set required to commit.
    pub quorum_fraction: f64,
    /// Reward pool distributed per epoch, in token units.
    pub reward_per_epoch: u64,
    /// Debit applied to an equivocating leader, capped at its balance.
    pub slash_amount: u64,
    /// Number of recent epochs of observed proposals retained for
    /// equivocation detection.
    pub equivocation_window: usize,
}

impl ConsensusConfig {
    /// Number of votes required for quorum over a validator set of
    /// `validators` members: `⌈N · q⌉`, and never less than one.
    pub fn quorum(&self, validators: usize) -> usize {
        ((validators as f64) * self.quorum_fraction).ceil().max(1.0) as usize
    }
}

impl Default for ConsensusConfig {
    fn default() -> Self {
        Self {
            epoch_duration_secs: 10,
            view_change_timeout_secs: 8,
            quorum_fraction: 2.0 / 3.0,
            reward_per_epoch: 100,
            slash_amount: 500,
            equivocation_window: 10,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quorum_is_ceiling_of_two_thirds() {
        let cfg = ConsensusConfig::default();
        assert_eq!(cfg.quorum(1), 1);
        assert_eq!(cfg.quorum(3), 2);
        assert_eq!(cfg.quorum(4), 3);
        assert_eq!(cfg.quorum(6), 4);
        assert_eq!(cfg.quorum(7), 5);
    }

    #[test]
    fn quorum_of_empty_set_is_one() {
        // A lone node voting for itself still needs its own vote.
        assert_eq!(ConsensusConfig::default().quorum(0), 1);
    }
}
