//! # Summary
//!
//! Majority counting. Votes are tracked by voter identity per round so that
//! retransmitted or duplicated replies can never push a round over quorum
//! twice, or at all on their own.

use hashbrown::HashSet as Set;

use crate::state::Round;

/// Minimum overlapping majority for `count` participants.
pub fn size(count: usize) -> usize {
    (count + 2) / 2
}

/// Voters seen for a single round.
#[derive(Clone, Debug, Default)]
pub struct Votes {
    round: Round,
    voters: Set<usize>,
}

impl Votes {
    /// Records `voter` in `round`. Returns true exactly once per round,
    /// when the number of distinct voters first reaches `quorum`.
    /// A vote for a different round discards the votes gathered so far.
    pub fn vote(&mut self, round: Round, voter: usize, quorum: usize) -> bool {
        if round != self.round {
            self.round = round;
            self.voters.clear();
        }
        self.voters.insert(voter) && self.voters.len() == quorum
    }

    /// Number of distinct voters in the current round.
    #[cfg(test)]
    fn len(&self) -> usize {
        self.voters.len()
    }

    pub fn clear(&mut self) {
        self.voters.clear();
    }
}
