#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use futures::future::join_all;
    use rocket::http::{Header, Status};
    use rocket::local::asynchronous::{Client, LocalResponse};
    use serde::de::DeserializeOwned;
    use serde_json::json;
    use shared::{
        Caller, Candidate, CreateElectionRequest, ElectionError, ElectionEvent, ElectionState,
        ElectionSummary, ErrorCode, ErrorResponse, Identity, Leaderboard, ManualClock,
        RemainingTime, VoteReceipt, VoterStatus, WinnerResponse,
    };
    use time::{Duration, OffsetDateTime};

    use crate::config::ServiceConfig;
    use crate::error::ApiError;
    use crate::registry::ElectionRegistry;
    use crate::routes::AppState;
    use crate::build_rocket;

    const DURATION_MINUTES: i64 = 60;
    const OWNER: &str = "10.0.0.1";
    const VOTER1: &str = "10.0.1.1";
    const VOTER2: &str = "10.0.1.2";
    const VOTER3: &str = "10.0.1.3";

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn clock() -> Arc<ManualClock> {
        Arc::new(ManualClock::new(OffsetDateTime::UNIX_EPOCH + Duration::days(20_000)))
    }

    fn request() -> CreateElectionRequest {
        CreateElectionRequest {
            candidate_names: vec!["Nathan".into(), "Jane".into(), "John".into()],
            duration_minutes: DURATION_MINUTES,
        }
    }

    fn id(s: &str) -> Identity {
        Identity::new(s)
    }

    /// Identity the service derives for a client at `ip`.
    fn who(ip: &str) -> Identity {
        Caller::from_ip(ip).identity
    }

    fn real_ip(ip: &str) -> Header<'static> {
        Header::new("X-Real-IP", ip.to_string())
    }

    async fn client(clock: Arc<ManualClock>) -> Client {
        client_with(clock, ServiceConfig::default()).await
    }

    async fn client_with(clock: Arc<ManualClock>, config: ServiceConfig) -> Client {
        init_tracing();
        let registry = ElectionRegistry::new(clock, 16);
        let rocket = build_rocket(AppState::new(registry), &config)
            .mount("/bare", rocket::routes![bare_forbidden, bare_conflict]);
        Client::tracked(rocket).await.expect("valid rocket instance")
    }

    #[rocket::get("/forbidden")]
    fn bare_forbidden() -> Status {
        Status::Forbidden
    }

    #[rocket::get("/conflict")]
    fn bare_conflict() -> Status {
        Status::Conflict
    }

    async fn body<T: DeserializeOwned + Send + 'static>(response: LocalResponse<'_>) -> T {
        response.into_json::<T>().await.expect("json body")
    }

    async fn error_code(response: LocalResponse<'_>) -> ErrorCode {
        body::<ErrorResponse>(response).await.code
    }

    async fn create(client: &Client) -> ElectionSummary {
        let response = client.post("/api/elections")
            .header(real_ip(OWNER))
            .json(&request())
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Created);
        body(response).await
    }

    async fn vote<'c>(client: &'c Client, election: &ElectionSummary, voter: &str, index: usize) -> LocalResponse<'c> {
        client.post(format!("/api/elections/{}/votes", election.id))
            .header(real_ip(voter))
            .json(&json!({ "candidateIndex": index }))
            .dispatch()
            .await
    }

    async fn winner<'c>(client: &'c Client, election: &ElectionSummary) -> LocalResponse<'c> {
        client.get(format!("/api/elections/{}/winner", election.id)).dispatch().await
    }

    async fn remaining(client: &Client, election: &ElectionSummary) -> u64 {
        let response = client.get(format!("/api/elections/{}/remaining-time", election.id)).dispatch().await;
        body::<RemainingTime>(response).await.remaining_seconds
    }

    #[rocket::async_test]
    async fn test_create_election() {
        let client = client(clock()).await;
        let election = create(&client).await;

        assert_eq!(election.owner, who(OWNER));
        assert_eq!(election.state, ElectionState::Open);
        assert_eq!(election.deadline - election.created_at, Duration::minutes(DURATION_MINUTES));
        let names: Vec<_> = election.candidates.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Nathan", "Jane", "John"]);
        assert!(election.candidates.iter().all(|c| c.vote_count == 0));

        let listed: Vec<ElectionSummary> = body(client.get("/api/elections").dispatch().await).await;
        assert_eq!(listed, vec![election]);
    }

    #[rocket::async_test]
    async fn test_create_rejects_bad_setup() {
        let client = client(clock()).await;
        for payload in [
            json!({ "candidateNames": [], "durationMinutes": 60 }),
            json!({ "candidateNames": ["Nathan"], "durationMinutes": 0 }),
            json!({ "candidateNames": ["Nathan"], "durationMinutes": -3 }),
        ] {
            let response = client.post("/api/elections").json(&payload).dispatch().await;
            assert_eq!(response.status(), Status::BadRequest);
            assert_eq!(error_code(response).await, ErrorCode::ValidationFailed);
        }
        let listed: Vec<ElectionSummary> = body(client.get("/api/elections").dispatch().await).await;
        assert!(listed.is_empty());
    }

    #[rocket::async_test]
    async fn test_owner_adds_candidate() {
        let client = client(clock()).await;
        let election = create(&client).await;

        let response = client.post(format!("/api/elections/{}/candidates", election.id))
            .header(real_ip(OWNER))
            .json(&json!({ "name": "Nathan" }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Ok);
        assert_eq!(body::<Candidate>(response).await, Candidate::new(3, "Nathan"));

        let roster: Vec<Candidate> = body(
            client.get(format!("/api/elections/{}/candidates", election.id)).dispatch().await
        ).await;
        assert_eq!(roster.len(), 4);
    }

    #[rocket::async_test]
    async fn test_non_owner_cannot_add_candidate() {
        let client = client(clock()).await;
        let election = create(&client).await;

        let response = client.post(format!("/api/elections/{}/candidates", election.id))
            .header(real_ip(VOTER1))
            .json(&json!({ "name": "Mallory" }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_code(response).await, ErrorCode::NotOwner);

        let roster: Vec<Candidate> = body(
            client.get(format!("/api/elections/{}/candidates", election.id)).dispatch().await
        ).await;
        assert_eq!(roster, election.candidates);
    }

    #[rocket::async_test]
    async fn test_voting() {
        let client = client(clock()).await;
        let election = create(&client).await;

        let response = vote(&client, &election, VOTER1, 0).await;
        assert_eq!(response.status(), Status::Ok);
        let receipt: VoteReceipt = body(response).await;
        assert_eq!((receipt.voter, receipt.candidate_index), (who(VOTER1), 0));

        let response = vote(&client, &election, VOTER1, 1).await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, ErrorCode::AlreadyVoted);

        let response = vote(&client, &election, VOTER2, 99).await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_code(response).await, ErrorCode::InvalidCandidate);

        let roster: Vec<Candidate> = body(
            client.get(format!("/api/elections/{}/candidates", election.id)).dispatch().await
        ).await;
        assert_eq!(roster.iter().map(|c| c.vote_count).collect::<Vec<_>>(), vec![1, 0, 0]);

        let status: VoterStatus = body(
            client.get(format!("/api/elections/{}/voters/{}", election.id, who(VOTER1))).dispatch().await
        ).await;
        assert!(status.has_voted);
        let status: VoterStatus = body(
            client.get(format!("/api/elections/{}/voters/{}", election.id, who(VOTER2))).dispatch().await
        ).await;
        assert!(!status.has_voted);
    }

    #[rocket::async_test]
    async fn test_time_window() {
        let clock = clock();
        let client = client(clock.clone()).await;
        let election = create(&client).await;
        assert_eq!(remaining(&client, &election).await, 3600);
        clock.advance(Duration::minutes(30));
        assert_eq!(remaining(&client, &election).await, 1800);
        assert_eq!(vote(&client, &election, VOTER1, 0).await.status(), Status::Ok);

        clock.advance(Duration::minutes(30));
        assert_eq!(remaining(&client, &election).await, 0);
        let response = vote(&client, &election, VOTER2, 0).await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_code(response).await, ErrorCode::ElectionEnded);

        clock.advance(Duration::seconds(1));
        assert_eq!(remaining(&client, &election).await, 0);

        let summary: ElectionSummary = body(
            client.get(format!("/api/elections/{}", election.id)).dispatch().await
        ).await;
        assert_eq!(summary.state, ElectionState::Closed);
    }

    #[rocket::async_test]
    async fn test_single_winner() {
        let clock = clock();
        let client = client(clock.clone()).await;
        let election = create(&client).await;
        vote(&client, &election, VOTER1, 0).await;
        vote(&client, &election, VOTER2, 0).await;
        vote(&client, &election, VOTER3, 1).await;

        let response = winner(&client, &election).await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, ErrorCode::ElectionStillOngoing);

        clock.advance(Duration::minutes(DURATION_MINUTES));
        let result: WinnerResponse = body(winner(&client, &election).await).await;
        assert!(!result.tie);
        assert_eq!(result.winners.len(), 1);
        assert_eq!(result.winners[0].name, "Nathan");
        assert_eq!(result.winners[0].vote_count, 2);
    }

    #[rocket::async_test]
    async fn test_tie() {
        let clock = clock();
        let client = client(clock.clone()).await;
        let election = create(&client).await;
        vote(&client, &election, VOTER1, 0).await;
        vote(&client, &election, VOTER2, 1).await;
        vote(&client, &election, VOTER3, 2).await;

        clock.advance(Duration::minutes(DURATION_MINUTES) + Duration::seconds(1));
        let result: WinnerResponse = body(winner(&client, &election).await).await;
        assert!(result.tie);
        let names: Vec<_> = result.winners.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Nathan", "Jane", "John"]);

        let board: Leaderboard = body(
            client.get(format!("/api/elections/{}/leaderboard", election.id)).dispatch().await
        ).await;
        assert_eq!(board.winners, result.winners);
        assert!(board.others.is_empty());
    }

    #[rocket::async_test]
    async fn test_no_vote_cast() {
        let clock = clock();
        let client = client(clock.clone()).await;
        let election = create(&client).await;

        clock.advance(Duration::minutes(DURATION_MINUTES));
        let response = winner(&client, &election).await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, ErrorCode::NoVoteCast);
    }

    #[rocket::async_test]
    async fn test_unknown_and_malformed_ids() {
        let client = client(clock()).await;

        let response = client.get(format!("/api/elections/{}", uuid::Uuid::new_v4())).dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
        assert_eq!(error_code(response).await, ErrorCode::NotFound);

        let response = client.get("/api/elections/not-a-uuid/winner").dispatch().await;
        assert_eq!(response.status(), Status::BadRequest);
        assert_eq!(error_code(response).await, ErrorCode::InvalidInput);

        let response = client.get("/api/nowhere").dispatch().await;
        assert_eq!(response.status(), Status::NotFound);
    }

    #[rocket::async_test]
    async fn test_cors_for_allowed_origin() {
        let config = ServiceConfig { allowed_origin: "http://localhost:3000".into(), ..ServiceConfig::default() };
        let client = client_with(clock(), config).await;
        let response = client.get("/api/elections")
            .header(Header::new("Origin", "http://localhost:3000"))
            .dispatch()
            .await;
        assert_eq!(
            response.headers().get_one("Access-Control-Allow-Origin"),
            Some("http://localhost:3000")
        );

        for origin in ["https://elsewhere.example", "http://localhost:3000.evil.example", "http://localhost"] {
            let response = client.get("/api/elections")
                .header(Header::new("Origin", origin))
                .dispatch()
                .await;
            assert!(response.headers().get_one("Access-Control-Allow-Origin").is_none(), "{origin}");
        }
    }

    #[rocket::async_test]
    async fn test_claimed_identity_header_is_ignored() {
        let client = client(clock()).await;
        let election = create(&client).await;
        let attacker = "10.0.9.9";

        let response = client.post(format!("/api/elections/{}/candidates", election.id))
            .header(real_ip(attacker))
            .header(Header::new("X-Caller-Identity", election.owner.to_string()))
            .json(&json!({ "name": "Mallory" }))
            .dispatch()
            .await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_code(response).await, ErrorCode::NotOwner);

        let mut accepted = 0;
        for claimed in ["alice", "bob", "carol", "dave", "erin"] {
            let response = client.post(format!("/api/elections/{}/votes", election.id))
                .header(real_ip(attacker))
                .header(Header::new("X-Caller-Identity", claimed))
                .json(&json!({ "candidateIndex": 0 }))
                .dispatch()
                .await;
            if response.status() == Status::Ok {
                accepted += 1;
            } else {
                assert_eq!(error_code(response).await, ErrorCode::AlreadyVoted);
            }
        }
        assert_eq!(accepted, 1);

        let roster: Vec<Candidate> = body(
            client.get(format!("/api/elections/{}/candidates", election.id)).dispatch().await
        ).await;
        assert_eq!(roster.len(), 3);
        assert_eq!(roster[0].vote_count, 1);
    }

    #[rocket::async_test]
    async fn test_bare_statuses_get_json_bodies() {
        let client = client(clock()).await;

        let response = client.get("/bare/forbidden").dispatch().await;
        assert_eq!(response.status(), Status::Forbidden);
        assert_eq!(error_code(response).await, ErrorCode::Forbidden);

        let response = client.get("/bare/conflict").dispatch().await;
        assert_eq!(response.status(), Status::Conflict);
        assert_eq!(error_code(response).await, ErrorCode::Conflict);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_votes_from_one_caller_count_once() {
        init_tracing();
        let registry = ElectionRegistry::new(clock(), 16);
        let handle = registry.create(id("owner"), request()).await.unwrap();

        let tasks = (0..32).map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.vote(&Identity::new("racer"), i % 3).await })
        });
        let results: Vec<_> = join_all(tasks).await.into_iter().map(|r| r.unwrap()).collect();

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert!(results.iter().filter(|r| r.is_err()).all(|r| matches!(
            r,
            Err(ApiError::Election(ElectionError::AlreadyVoted))
        )));
        let total: u64 = handle.candidates().await.iter().map(|c| c.vote_count).sum();
        assert_eq!(total, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_racing_distinct_voters_all_counted() {
        let registry = ElectionRegistry::new(clock(), 16);
        let handle = registry.create(id("owner"), request()).await.unwrap();

        let tasks = (0..60).map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.vote(&Identity::new(format!("voter{i}")), i % 3).await })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }
        let counts: Vec<_> = handle.candidates().await.iter().map(|c| c.vote_count).collect();
        assert_eq!(counts, vec![20, 20, 20]);
    }

    #[tokio::test]
    async fn test_notifications_follow_commits() {
        let registry = ElectionRegistry::new(clock(), 16);
        let handle = registry.create(id("owner"), request()).await.unwrap();
        let mut rx = handle.subscribe();

        handle.add_candidate(&id("owner"), "Extra").await.unwrap();
        handle.vote(&id("voter1"), 3).await.unwrap();
        assert!(handle.vote(&id("voter1"), 0).await.is_err());
        assert!(handle.add_candidate(&id("voter1"), "Nope").await.is_err());

        assert_eq!(rx.recv().await.unwrap(), ElectionEvent::CandidateAdded { name: "Extra".into(), index: 3 });
        assert_eq!(rx.recv().await.unwrap(), ElectionEvent::Voted { voter: id("voter1"), candidate_index: 3 });
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_registrations_notify_in_index_order() {
        let registry = ElectionRegistry::new(clock(), 64);
        let handle = registry.create(id("owner"), request()).await.unwrap();
        let mut rx = handle.subscribe();

        let tasks = (0..24).map(|i| {
            let handle = handle.clone();
            tokio::spawn(async move { handle.add_candidate(&Identity::new("owner"), &format!("Late {i}")).await })
        });
        for result in join_all(tasks).await {
            assert!(result.unwrap().is_ok());
        }

        let mut indices = Vec::new();
        while let Ok(event) = rx.try_recv() {
            match event {
                ElectionEvent::CandidateAdded { index, .. } => indices.push(index),
                other => panic!("unexpected event {other:?}"),
            }
        }
        assert_eq!(indices, (3..27).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_sweep_records_each_closed_election_once() {
        let clock = clock();
        let registry = ElectionRegistry::new(clock.clone(), 16);
        registry.create(id("owner"), request()).await.unwrap();
        let mut longer = request();
        longer.duration_minutes = 2 * DURATION_MINUTES;
        registry.create(id("owner"), longer).await.unwrap();

        assert_eq!(registry.sweep_closed().await.unwrap(), 0);
        clock.advance(Duration::minutes(DURATION_MINUTES));
        assert_eq!(registry.sweep_closed().await.unwrap(), 1);
        assert_eq!(registry.sweep_closed().await.unwrap(), 0);
        clock.advance(Duration::minutes(DURATION_MINUTES));
        assert_eq!(registry.sweep_closed().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_list_puts_open_elections_first() {
        let clock = clock();
        let registry = ElectionRegistry::new(clock.clone(), 16);
        let short = registry.create(id("owner"), CreateElectionRequest { duration_minutes: 1, ..request() }).await.unwrap();
        let long = registry.create(id("owner"), request()).await.unwrap();

        clock.advance(Duration::minutes(2));
        let order: Vec<_> = registry.list().iter().map(|h| h.id()).collect();
        assert_eq!(order, vec![long.id(), short.id()]);
    }
}
