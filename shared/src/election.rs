use std::collections::HashMap;
use time::{Duration, OffsetDateTime};

use crate::error::{ElectionError, Result};
use crate::models::{Candidate, ElectionEvent, ElectionState, Identity};
use crate::results::{leading_candidates, total_votes};
use crate::validation::{validate_candidate_name, validate_setup, ValidationError};

/// A vote that passed every admission check but has not been counted yet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct PendingVote {
    voter: Identity,
    candidate_index: usize,
}

impl PendingVote {
    pub fn voter(&self) -> &Identity { &self.voter }
    pub fn candidate_index(&self) -> usize { self.candidate_index }
}

/// A candidate the owner is allowed to append, with the index it will get.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub struct PendingCandidate {
    candidate: Candidate,
}

impl PendingCandidate {
    pub fn candidate(&self) -> &Candidate { &self.candidate }
}

/// Single time-boxed, one-vote-per-identity election.
///
/// The roster is append-only and indices never move. Every query that
/// depends on time takes `now` from the caller, which is expected to read one
/// shared, non-decreasing clock while holding exclusive access to this value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Election {
    owner: Identity,
    created_at: OffsetDateTime,
    deadline: OffsetDateTime,
    candidates: Vec<Candidate>,
    voters: HashMap<Identity, bool>,
}

impl Election {
    pub fn new(
        owner: Identity,
        names: Vec<String>,
        duration_minutes: i64,
        now: OffsetDateTime,
    ) -> Result<Self> {
        validate_setup(&names, duration_minutes)?;
        let candidates = names.into_iter()
            .enumerate()
            .map(|(index, name)| Candidate::new(index, name))
            .collect();
        Ok(Self {
            owner,
            created_at: now,
            deadline: now + Duration::minutes(duration_minutes),
            candidates,
            voters: HashMap::new(),
        })
    }

    /// Rebuilds an election from stored parts.
    ///
    /// Candidates may arrive in any order but their indices must be exactly
    /// `0..len`.
    pub fn restore(
        owner: Identity,
        created_at: OffsetDateTime,
        deadline: OffsetDateTime,
        mut candidates: Vec<Candidate>,
        voters: impl IntoIterator<Item = Identity>,
    ) -> Result<Self> {
        if candidates.is_empty() {
            return Err(ValidationError::NoCandidates.into());
        }
        if deadline <= created_at {
            return Err(ValidationError::DurationTooShort.into());
        }
        candidates.sort_by_key(|c| c.index);
        if let Some((_, c)) = candidates.iter().enumerate().find(|(pos, c)| c.index != *pos) {
            return Err(ElectionError::InvalidCandidate(c.index));
        }
        Ok(Self {
            owner,
            created_at,
            deadline,
            candidates,
            voters: voters.into_iter().map(|v| (v, true)).collect(),
        })
    }

    pub fn owner(&self) -> &Identity { &self.owner }
    pub fn created_at(&self) -> OffsetDateTime { self.created_at }
    pub fn deadline(&self) -> OffsetDateTime { self.deadline }

    /// The roster in registration order with live counts.
    pub fn candidates(&self) -> &[Candidate] { &self.candidates }

    pub fn has_voted(&self, who: &Identity) -> bool {
        self.voters.get(who).copied().unwrap_or(false)
    }

    pub fn voters(&self) -> impl Iterator<Item = &Identity> {
        self.voters.iter().filter(|(_, voted)| **voted).map(|(id, _)| id)
    }

    pub fn total_votes(&self) -> u64 {
        total_votes(&self.candidates)
    }

    pub fn is_open(&self, now: OffsetDateTime) -> bool {
        now < self.deadline
    }

    pub fn state(&self, now: OffsetDateTime) -> ElectionState {
        if self.is_open(now) { ElectionState::Open } else { ElectionState::Closed }
    }

    /// Seconds until the deadline, saturating at zero. Partial seconds round
    /// up, so zero is reported exactly when voting has closed.
    pub fn remaining_seconds(&self, now: OffsetDateTime) -> u64 {
        let left = self.deadline - now;
        if !left.is_positive() {
            return 0;
        }
        let partial = u64::from(left.subsec_nanoseconds() > 0);
        u64::try_from(left.whole_seconds()).unwrap_or(0) + partial
    }

    // No time restriction: the owner may register candidates after voting
    // has started or even after the deadline.
    pub fn check_add_candidate(&self, caller: &Identity, name: &str) -> Result<PendingCandidate> {
        if *caller != self.owner {
            return Err(ElectionError::NotOwner);
        }
        validate_candidate_name(name)?;
        Ok(PendingCandidate { candidate: Candidate::new(self.candidates.len(), name) })
    }

    pub fn commit_candidate(&mut self, pending: PendingCandidate) -> ElectionEvent {
        let candidate = pending.candidate;
        debug_assert_eq!(candidate.index, self.candidates.len());
        let event = ElectionEvent::CandidateAdded {
            name: candidate.name.clone(),
            index: candidate.index,
        };
        self.candidates.push(candidate);
        event
    }

    pub fn add_candidate(&mut self, caller: &Identity, name: &str) -> Result<ElectionEvent> {
        let pending = self.check_add_candidate(caller, name)?;
        Ok(self.commit_candidate(pending))
    }

    /// Admission checks, first failure wins: open, not yet voted, index in range.
    pub fn check_vote(
        &self,
        caller: &Identity,
        candidate_index: usize,
        now: OffsetDateTime,
    ) -> Result<PendingVote> {
        if !self.is_open(now) {
            return Err(ElectionError::ElectionEnded);
        }
        if self.has_voted(caller) {
            return Err(ElectionError::AlreadyVoted);
        }
        if candidate_index >= self.candidates.len() {
            return Err(ElectionError::InvalidCandidate(candidate_index));
        }
        Ok(PendingVote { voter: caller.clone(), candidate_index })
    }

    /// Counts a vote checked against this election. The roster only grows,
    /// so the checked index stays valid.
    pub fn commit_vote(&mut self, pending: PendingVote) -> ElectionEvent {
        let PendingVote { voter, candidate_index } = pending;
        self.candidates[candidate_index].vote_count += 1;
        self.voters.insert(voter.clone(), true);
        ElectionEvent::Voted { voter, candidate_index }
    }

    pub fn vote(
        &mut self,
        caller: &Identity,
        candidate_index: usize,
        now: OffsetDateTime,
    ) -> Result<ElectionEvent> {
        let pending = self.check_vote(caller, candidate_index, now)?;
        Ok(self.commit_vote(pending))
    }

    /// Every candidate sharing the top count, in registration order. More
    /// than one entry means a tie.
    pub fn winners(&self, now: OffsetDateTime) -> Result<Vec<Candidate>> {
        if self.is_open(now) {
            return Err(ElectionError::ElectionStillOngoing);
        }
        if self.total_votes() == 0 {
            return Err(ElectionError::NoVoteCast);
        }
        Ok(leading_candidates(&self.candidates))
    }
}
