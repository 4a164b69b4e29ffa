use std::collections::HashMap;

use shared::{Candidate, Election, ElectionState, FinalTally, Identity, PendingVote};
use sqlx::types::Json;
use sqlx::PgPool;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use crate::error::ApiError;

/// An election as loaded back from the database.
#[derive(Debug)]
pub struct StoredElection {
    pub id: Uuid,
    pub state: ElectionState,
    pub election: Election,
}

fn to_db_index(index: usize) -> Result<i32, ApiError> {
    i32::try_from(index).map_err(|_| ApiError::Storage(format!("candidate index {} out of range", index)))
}

fn from_db_index(idx: i32) -> Result<usize, ApiError> {
    usize::try_from(idx).map_err(|_| ApiError::Storage(format!("negative candidate index {}", idx)))
}

/// Durable record of every election, kept in step with the in-memory engines.
#[derive(Clone, Debug)]
pub struct ElectionStore {
    pool: PgPool,
}

impl ElectionStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_election(&self, id: Uuid, election: &Election) -> Result<(), ApiError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO elections (id, owner, created_at, deadline, state)
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(election.owner().as_str())
        .bind(election.created_at())
        .bind(election.deadline())
        .bind(ElectionState::Open)
        .execute(&mut *tx)
        .await?;

        for candidate in election.candidates() {
            sqlx::query("INSERT INTO candidates (election_id, idx, name, vote_count) VALUES ($1, $2, $3, 0)")
                .bind(id)
                .bind(to_db_index(candidate.index)?)
                .bind(&candidate.name)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        debug!("Stored election {} with {} candidates", id, election.candidates().len());
        Ok(())
    }

    pub async fn insert_candidate(&self, id: Uuid, candidate: &Candidate) -> Result<(), ApiError> {
        sqlx::query("INSERT INTO candidates (election_id, idx, name, vote_count) VALUES ($1, $2, $3, 0)")
            .bind(id)
            .bind(to_db_index(candidate.index)?)
            .bind(&candidate.name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Writes the voter record and the count increment in one transaction.
    pub async fn record_vote(&self, id: Uuid, vote: &PendingVote, cast_at: OffsetDateTime) -> Result<(), ApiError> {
        let idx = to_db_index(vote.candidate_index())?;
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            "INSERT INTO voter_records (election_id, identity, candidate_idx, cast_at)
             VALUES ($1, $2, $3, $4)",
        )
        .bind(id)
        .bind(vote.voter().as_str())
        .bind(idx)
        .bind(cast_at)
        .execute(&mut *tx)
        .await?;

        sqlx::query("UPDATE candidates SET vote_count = vote_count + 1 WHERE election_id = $1 AND idx = $2")
            .bind(id)
            .bind(idx)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    pub async fn close_election(&self, id: Uuid, tally: &FinalTally) -> Result<(), ApiError> {
        sqlx::query(
            "UPDATE elections SET state = $2, closed_at = $3, final_tally = $4
             WHERE id = $1 AND state = 'open'",
        )
        .bind(id)
        .bind(ElectionState::Closed)
        .bind(tally.closed_at)
        .bind(Json(tally))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn load_all(&self) -> Result<Vec<StoredElection>, ApiError> {
        let records: Vec<(Uuid, String, OffsetDateTime, OffsetDateTime, ElectionState)> = sqlx::query_as(
            "SELECT id, owner, created_at, deadline, state FROM elections ORDER BY created_at",
        )
        .fetch_all(&self.pool)
        .await?;

        let candidate_rows: Vec<(Uuid, i32, String, i64)> =
            sqlx::query_as("SELECT election_id, idx, name, vote_count FROM candidates")
                .fetch_all(&self.pool)
                .await?;

        let voter_rows: Vec<(Uuid, String)> =
            sqlx::query_as("SELECT election_id, identity FROM voter_records")
                .fetch_all(&self.pool)
                .await?;

        let mut candidates: HashMap<Uuid, Vec<Candidate>> = HashMap::new();
        for (election_id, idx, name, vote_count) in candidate_rows {
            let vote_count = u64::try_from(vote_count)
                .map_err(|_| ApiError::Storage(format!("negative vote count in {}", election_id)))?;
            candidates.entry(election_id).or_default().push(Candidate {
                index: from_db_index(idx)?,
                name,
                vote_count,
            });
        }

        let mut voters: HashMap<Uuid, Vec<Identity>> = HashMap::new();
        for (election_id, identity) in voter_rows {
            voters.entry(election_id).or_default().push(Identity::new(identity));
        }

        records.into_iter()
            .map(|(id, owner, created_at, deadline, state)| {
                let election = Election::restore(
                    Identity::new(owner),
                    created_at,
                    deadline,
                    candidates.remove(&id).unwrap_or_default(),
                    voters.remove(&id).unwrap_or_default(),
                )
                .map_err(|e| ApiError::Storage(format!("election {} cannot be restored: {}", id, e)))?;
                Ok(StoredElection { id, state, election })
            })
            .collect()
    }
}
