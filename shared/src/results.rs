//! Result projection over a candidate snapshot.
//!
//! [`leading_candidates`] is the one place the maximal set is computed. The
//! engine's winner query and the [`Leaderboard`] view both go through it, so
//! the two can never disagree.

use serde::{Serialize, Deserialize};

use crate::models::Candidate;

/// Every candidate holding the highest vote count, in registration order.
///
/// Returns an empty list when no vote has been cast at all.
pub fn leading_candidates(candidates: &[Candidate]) -> Vec<Candidate> {
    let max_votes = candidates.iter().map(|c| c.vote_count).max().unwrap_or(0);
    if max_votes == 0 {
        return Vec::new();
    }
    candidates.iter()
        .filter(|c| c.vote_count == max_votes)
        .cloned()
        .collect()
}

pub fn total_votes(candidates: &[Candidate]) -> u64 {
    candidates.iter().map(|c| c.vote_count).sum()
}

/// Presentation view of a tally: everyone sorted by votes, split into the
/// leading set and the rest.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Leaderboard {
    pub total_votes: u64,
    pub max_votes: u64,
    pub winners: Vec<Candidate>,
    pub others: Vec<Candidate>,
}

impl Leaderboard {
    pub fn project(candidates: &[Candidate]) -> Self {
        let winners = leading_candidates(candidates);

        // stable: equal counts keep registration order
        let mut sorted = candidates.to_vec();
        sorted.sort_by(|a, b| b.vote_count.cmp(&a.vote_count));

        let others = sorted.into_iter()
            .filter(|c| !winners.iter().any(|w| w.index == c.index))
            .collect();

        Self {
            total_votes: total_votes(candidates),
            max_votes: winners.first().map_or(0, |w| w.vote_count),
            winners,
            others,
        }
    }

    pub fn is_tie(&self) -> bool {
        self.winners.len() > 1
    }
}
