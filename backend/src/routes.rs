use rocket::http::Status;
use rocket::response::status::Created;
use rocket::response::stream::{Event, EventStream};
use rocket::serde::json::Json;
use rocket::tokio::select;
use rocket::tokio::sync::broadcast::error::RecvError;
use rocket::{get, post, routes, Route, Shutdown, State};
use shared::{
    AddCandidateRequest, Caller, Candidate, CreateElectionRequest, ElectionSummary, Identity,
    Leaderboard, RemainingTime, VoteReceipt, VoteRequest, VoterStatus, WinnerResponse,
};
use tracing::{debug, instrument, warn};

use crate::error::ApiError;
use crate::registry::{ElectionHandle, ElectionRegistry};
use crate::utils::parse_election_id;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<ElectionRegistry>,
}

impl AppState {
    pub fn new(registry: ElectionRegistry) -> Self {
        Self { registry: Arc::new(registry) }
    }

    fn election(&self, id: &str) -> Result<Arc<ElectionHandle>, ApiError> {
        self.registry.get(parse_election_id(id)?)
    }
}

pub fn api_routes() -> Vec<Route> {
    routes![
        create_election,
        list_elections,
        get_election,
        add_candidate,
        all_candidates,
        cast_vote,
        voter_status,
        remaining_time,
        winner,
        leaderboard,
        events,
        all_options,
    ]
}

#[rocket::options("/<_..>")]
pub async fn all_options() -> Status {
    Status::Ok
}

#[instrument(skip(state, request, caller), fields(owner = %caller.identity))]
#[post("/elections", format = "json", data = "<request>")]
pub async fn create_election(
    state: &State<AppState>,
    request: Json<CreateElectionRequest>,
    caller: Caller,
) -> Result<Created<Json<ElectionSummary>>, ApiError> {
    let handle = state.registry.create(caller.identity, request.into_inner()).await?;
    let summary = handle.summary().await;
    Ok(Created::new(format!("/api/elections/{}", summary.id)).body(Json(summary)))
}

#[get("/elections")]
pub async fn list_elections(state: &State<AppState>) -> Json<Vec<ElectionSummary>> {
    let mut summaries = Vec::new();
    for handle in state.registry.list() {
        summaries.push(handle.summary().await);
    }
    Json(summaries)
}

#[get("/elections/<id>")]
pub async fn get_election(state: &State<AppState>, id: &str) -> Result<Json<ElectionSummary>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(handle.summary().await))
}

#[instrument(skip(state, request, caller), fields(election_id = %id, caller = %caller.identity))]
#[post("/elections/<id>/candidates", format = "json", data = "<request>")]
pub async fn add_candidate(
    state: &State<AppState>,
    id: &str,
    request: Json<AddCandidateRequest>,
    caller: Caller,
) -> Result<Json<Candidate>, ApiError> {
    let handle = state.election(id)?;
    match handle.add_candidate(&caller.identity, &request.name).await {
        Ok(candidate) => Ok(Json(candidate)),
        Err(e) => {
            warn!("Candidate registration refused: {}", e);
            Err(e)
        }
    }
}

#[get("/elections/<id>/candidates")]
pub async fn all_candidates(state: &State<AppState>, id: &str) -> Result<Json<Vec<Candidate>>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(handle.candidates().await))
}

#[instrument(skip(state, request, caller), fields(election_id = %id, voter = %caller.identity))]
#[post("/elections/<id>/votes", format = "json", data = "<request>")]
pub async fn cast_vote(
    state: &State<AppState>,
    id: &str,
    request: Json<VoteRequest>,
    caller: Caller,
) -> Result<Json<VoteReceipt>, ApiError> {
    let handle = state.election(id)?;
    match handle.vote(&caller.identity, request.candidate_index).await {
        Ok(receipt) => Ok(Json(receipt)),
        Err(e) => {
            debug!("Vote refused: {}", e);
            Err(e)
        }
    }
}

#[get("/elections/<id>/voters/<identity>")]
pub async fn voter_status(state: &State<AppState>, id: &str, identity: &str) -> Result<Json<VoterStatus>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(handle.voter_status(Identity::new(identity)).await))
}

#[get("/elections/<id>/remaining-time")]
pub async fn remaining_time(state: &State<AppState>, id: &str) -> Result<Json<RemainingTime>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(handle.remaining_time().await))
}

#[get("/elections/<id>/winner")]
pub async fn winner(state: &State<AppState>, id: &str) -> Result<Json<WinnerResponse>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(WinnerResponse::from(handle.winners().await?)))
}

/// Display ordering only; `/winner` is the authoritative result.
#[get("/elections/<id>/leaderboard")]
pub async fn leaderboard(state: &State<AppState>, id: &str) -> Result<Json<Leaderboard>, ApiError> {
    let handle = state.election(id)?;
    Ok(Json(handle.leaderboard().await))
}

#[get("/elections/<id>/events")]
pub async fn events(state: &State<AppState>, id: &str, mut end: Shutdown) -> Result<EventStream![], ApiError> {
    let mut rx = state.election(id)?.subscribe();
    Ok(EventStream! {
        loop {
            let event = select! {
                msg = rx.recv() => match msg {
                    Ok(event) => event,
                    Err(RecvError::Closed) => break,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event subscriber lagged, {} notifications dropped", skipped);
                        continue;
                    }
                },
                _ = &mut end => break,
            };
            yield Event::json(&event);
        }
    })
}
