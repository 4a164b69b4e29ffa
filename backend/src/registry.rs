use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use shared::{
    Candidate, Clock, CreateElectionRequest, Election, ElectionEvent, ElectionState,
    ElectionSummary, FinalTally, Identity, Leaderboard, RemainingTime, VoteReceipt, VoterStatus,
};
use time::OffsetDateTime;
use tokio::sync::{broadcast, RwLock as AsyncRwLock};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::ApiError;
use crate::persistence::ElectionStore;

/// One hosted election.
///
/// Mutations hold the write lock for the whole check, persist, commit
/// sequence and read the clock only once they hold it. Reads take the read
/// lock and read the clock the same way, so every caller observes the
/// deadline passing at the same point in the lock order.
pub struct ElectionHandle {
    id: Uuid,
    created_at: OffsetDateTime,
    deadline: OffsetDateTime,
    election: AsyncRwLock<Election>,
    clock: Arc<dyn Clock>,
    events: broadcast::Sender<ElectionEvent>,
    store: Option<ElectionStore>,
    closed_recorded: AtomicBool,
}

impl ElectionHandle {
    fn new(
        id: Uuid,
        election: Election,
        clock: Arc<dyn Clock>,
        store: Option<ElectionStore>,
        event_buffer: usize,
    ) -> Self {
        let (events, _) = broadcast::channel(event_buffer.max(1));
        Self {
            id,
            created_at: election.created_at(),
            deadline: election.deadline(),
            election: AsyncRwLock::new(election),
            clock,
            events,
            store,
            closed_recorded: AtomicBool::new(false),
        }
    }

    pub fn id(&self) -> Uuid { self.id }
    pub fn deadline(&self) -> OffsetDateTime { self.deadline }

    pub fn subscribe(&self) -> broadcast::Receiver<ElectionEvent> {
        self.events.subscribe()
    }

    fn publish(&self, event: ElectionEvent) {
        // no subscribers is fine
        let _ = self.events.send(event);
    }

    pub async fn add_candidate(&self, caller: &Identity, name: &str) -> Result<Candidate, ApiError> {
        let mut election = self.election.write().await;
        let pending = election.check_add_candidate(caller, name)?;
        if let Some(store) = &self.store {
            store.insert_candidate(self.id, pending.candidate()).await?;
        }
        let candidate = pending.candidate().clone();
        let event = election.commit_candidate(pending);
        // still under the write guard, so subscribers see commit order
        self.publish(event);
        drop(election);

        info!("➕ Election {} registered candidate {} ({})", self.id, candidate.index, candidate.name);
        Ok(candidate)
    }

    pub async fn vote(&self, caller: &Identity, candidate_index: usize) -> Result<VoteReceipt, ApiError> {
        let mut election = self.election.write().await;
        let now = self.clock.now();
        let pending = election.check_vote(caller, candidate_index, now)?;
        if let Some(store) = &self.store {
            store.record_vote(self.id, &pending, now).await?;
        }
        let event = election.commit_vote(pending);
        self.publish(event);
        drop(election);

        debug!("Election {} counted a vote for candidate {}", self.id, candidate_index);
        Ok(VoteReceipt {
            election_id: self.id,
            voter: caller.clone(),
            candidate_index,
            cast_at: now,
        })
    }

    pub async fn candidates(&self) -> Vec<Candidate> {
        self.election.read().await.candidates().to_vec()
    }

    pub async fn remaining_time(&self) -> RemainingTime {
        let election = self.election.read().await;
        RemainingTime { remaining_seconds: election.remaining_seconds(self.clock.now()) }
    }

    pub async fn winners(&self) -> Result<Vec<Candidate>, ApiError> {
        let election = self.election.read().await;
        Ok(election.winners(self.clock.now())?)
    }

    pub async fn leaderboard(&self) -> Leaderboard {
        Leaderboard::project(self.election.read().await.candidates())
    }

    pub async fn voter_status(&self, identity: Identity) -> VoterStatus {
        let has_voted = self.election.read().await.has_voted(&identity);
        VoterStatus { identity, has_voted }
    }

    pub async fn summary(&self) -> ElectionSummary {
        let election = self.election.read().await;
        let now = self.clock.now();
        ElectionSummary {
            id: self.id,
            owner: election.owner().clone(),
            created_at: election.created_at(),
            deadline: election.deadline(),
            state: election.state(now),
            candidates: election.candidates().to_vec(),
        }
    }

    /// Final tally once the deadline has passed and it has not been recorded yet.
    async fn pending_final_tally(&self) -> Option<FinalTally> {
        if self.closed_recorded.load(Ordering::Acquire) {
            return None;
        }
        let election = self.election.read().await;
        let now = self.clock.now();
        if election.is_open(now) {
            return None;
        }
        Some(FinalTally {
            closed_at: now,
            leaderboard: Leaderboard::project(election.candidates()),
        })
    }
}

/// All elections hosted by this service, keyed by instance id.
pub struct ElectionRegistry {
    elections: RwLock<HashMap<Uuid, Arc<ElectionHandle>>>,
    clock: Arc<dyn Clock>,
    store: Option<ElectionStore>,
    event_buffer: usize,
}

impl ElectionRegistry {
    /// Registry kept in memory only.
    pub fn new(clock: Arc<dyn Clock>, event_buffer: usize) -> Self {
        Self {
            elections: RwLock::new(HashMap::new()),
            clock,
            store: None,
            event_buffer,
        }
    }

    pub fn with_store(mut self, store: ElectionStore) -> Self {
        self.store = Some(store);
        self
    }

    fn read_map(&self) -> RwLockReadGuard<'_, HashMap<Uuid, Arc<ElectionHandle>>> {
        self.elections.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write_map(&self) -> RwLockWriteGuard<'_, HashMap<Uuid, Arc<ElectionHandle>>> {
        self.elections.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn host(&self, id: Uuid, election: Election) -> Arc<ElectionHandle> {
        Arc::new(ElectionHandle::new(id, election, self.clock.clone(), self.store.clone(), self.event_buffer))
    }

    /// Loads every stored election into memory. Returns how many were loaded.
    pub async fn restore(&self) -> Result<usize, ApiError> {
        let Some(store) = &self.store else { return Ok(0) };
        let stored = store.load_all().await?;
        let count = stored.len();

        let mut map = self.write_map();
        for record in stored {
            let handle = self.host(record.id, record.election);
            if record.state == ElectionState::Closed {
                handle.closed_recorded.store(true, Ordering::Release);
            }
            map.insert(record.id, handle);
        }
        Ok(count)
    }

    pub async fn create(&self, owner: Identity, request: CreateElectionRequest) -> Result<Arc<ElectionHandle>, ApiError> {
        let election = Election::new(owner, request.candidate_names, request.duration_minutes, self.clock.now())?;
        let id = Uuid::new_v4();
        if let Some(store) = &self.store {
            store.insert_election(id, &election).await?;
        }

        info!("🗳️ Election {} created by {}, closes at {}", id, election.owner(), election.deadline());
        let handle = self.host(id, election);
        self.write_map().insert(id, handle.clone());
        Ok(handle)
    }

    pub fn get(&self, id: Uuid) -> Result<Arc<ElectionHandle>, ApiError> {
        self.read_map().get(&id).cloned().ok_or(ApiError::NotFound)
    }

    /// Open elections first, then by deadline, latest first.
    pub fn list(&self) -> Vec<Arc<ElectionHandle>> {
        let now = self.clock.now();
        let mut handles: Vec<_> = self.read_map().values().cloned().collect();
        handles.sort_by(|a, b| {
            let a_open = a.deadline > now;
            let b_open = b.deadline > now;
            b_open.cmp(&a_open)
                .then_with(|| b.deadline.cmp(&a.deadline))
                .then_with(|| b.created_at.cmp(&a.created_at))
        });
        handles
    }

    /// Records the final tally of every election whose deadline has passed.
    /// Returns how many were closed by this pass.
    pub async fn sweep_closed(&self) -> Result<usize, ApiError> {
        let handles: Vec<_> = self.read_map().values().cloned().collect();
        let mut closed = 0;
        for handle in handles {
            let Some(tally) = handle.pending_final_tally().await else { continue };
            if let Some(store) = &self.store {
                store.close_election(handle.id, &tally).await?;
            }
            handle.closed_recorded.store(true, Ordering::Release);
            info!(
                "🏁 Election {} closed with {} votes, {} leading",
                handle.id,
                tally.leaderboard.total_votes,
                tally.leaderboard.winners.len()
            );
            closed += 1;
        }
        Ok(closed)
    }
}
