//! End-to-end session scenarios over the in-memory fake transport.

#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic, clippy::indexing_slicing)]

use std::time::Duration;

use mesh_protocol::{ParticipantId, StateEvent, Token, DEFAULT_LAYER_ID};
use mesh_test_utils::{eventually, FakeHub};
use session_core::authority::Role;
use session_core::config::Config;
use session_core::errors::SessionError;
use session_core::link::ConnectionState;
use session_core::observer::NullObserver;
use session_core::orchestrator::{SessionActor, SessionActorHandle};
use tokio::task::JoinHandle;

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn spawn_actor(hub: &FakeHub, role: Role, config: Config) -> (SessionActorHandle, JoinHandle<()>) {
    SessionActor::spawn(role, config, hub.factory(), Box::new(NullObserver))
}

fn named_config(name: &str) -> Config {
    Config {
        display_name: name.to_string(),
        ..Config::default()
    }
}

/// Carry the invite and answer blobs "out of band" between two actors.
async fn connect(host: &SessionActorHandle, guest: &SessionActorHandle) {
    let invite = host.create_invite().await.unwrap();
    let answer = guest.join(invite).await.unwrap();
    host.accept_answer(answer).await.unwrap();
}

async fn wait_connected(handle: &SessionActorHandle, peers: usize) {
    eventually("roster to settle", || async {
        let roster = handle.roster().await.unwrap();
        roster.len() == peers
            && roster
                .iter()
                .all(|entry| entry.state == ConnectionState::Connected)
    })
    .await;
}

fn token(id: &str, x: f64, y: f64) -> Token {
    Token {
        id: id.to_string(),
        x,
        y,
        color: "#336699".to_string(),
        owner: None,
        name: None,
        scale: None,
    }
}

async fn add_token(host: &SessionActorHandle, id: &str, x: f64, y: f64) {
    host.apply_event(StateEvent::TokenAdded {
        layer_id: DEFAULT_LAYER_ID.to_string(),
        token: token(id, x, y),
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn test_invite_handshake_connects_and_syncs() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, named_config("Harriet"));
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, named_config("Greta"));

    connect(&host, &guest).await;
    wait_connected(&host, 1).await;
    wait_connected(&guest, 1).await;
    assert_eq!(hub.open_channel_count(), 1);

    // The guest started with an empty document and received the host's
    // full sync.
    eventually("guest to receive full sync", || async {
        guest
            .state()
            .await
            .unwrap()
            .layer(DEFAULT_LAYER_ID)
            .is_some()
    })
    .await;

    // Names from the hello exchange appear in both rosters.
    eventually("display names to propagate", || async {
        let host_roster = host.roster().await.unwrap();
        let guest_roster = guest.roster().await.unwrap();
        host_roster[0].name.as_deref() == Some("Greta")
            && guest_roster[0].name.as_deref() == Some("Harriet")
    })
    .await;
}

#[tokio::test]
async fn test_sequential_joins_form_a_full_mesh() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, named_config("Host"));

    let mut guests = Vec::new();
    for i in 0..3 {
        let (guest, join) = spawn_actor(&hub, Role::Guest, named_config(&format!("Guest{i}")));
        connect(&host, &guest).await;
        // Joins are sequential: each settles before the next begins.
        wait_connected(&guest, i + 1).await;
        guests.push((guest, join));
    }

    // Four participants: every pair directly linked, and only once.
    wait_connected(&host, 3).await;
    for (guest, _) in &guests {
        wait_connected(guest, 3).await;
    }
    eventually("exactly one channel per pair", || async {
        hub.open_channel_count() == 6
    })
    .await;
}

#[tokio::test]
async fn test_claim_is_exclusive_and_batched() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest).await;
    wait_connected(&guest, 1).await;

    add_token(&host, "t1", 0.0, 0.0).await;
    add_token(&host, "t2", 10.0, 0.0).await;

    guest.claim_token(DEFAULT_LAYER_ID, "t1").await.unwrap();
    let guest_id = guest.participant_id().clone();
    eventually("claim to replicate", || async {
        let state = host.state().await.unwrap();
        state.find_token(DEFAULT_LAYER_ID, "t1").unwrap().owner == Some(guest_id.clone())
    })
    .await;

    // Claiming a second token releases the first in one atomic event.
    guest.claim_token(DEFAULT_LAYER_ID, "t2").await.unwrap();
    eventually("reclaim to replicate everywhere", || async {
        for handle in [&host, &guest] {
            let state = handle.state().await.unwrap();
            let t1 = state.find_token(DEFAULT_LAYER_ID, "t1").unwrap();
            let t2 = state.find_token(DEFAULT_LAYER_ID, "t2").unwrap();
            if t1.owner.is_some() || t2.owner != Some(guest_id.clone()) {
                return false;
            }
        }
        true
    })
    .await;
}

#[tokio::test]
async fn test_guest_never_mutates_locally() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest).await;
    wait_connected(&guest, 1).await;

    // Host-authored events are rejected outright on a guest.
    let result = guest
        .apply_event(StateEvent::TokenAdded {
            layer_id: DEFAULT_LAYER_ID.to_string(),
            token: token("rogue", 0.0, 0.0),
        })
        .await;
    assert!(matches!(result, Err(SessionError::NotHost)));

    // A request for a nonexistent token is forwarded, denied by the host,
    // and no echo ever arrives.
    guest
        .move_token(DEFAULT_LAYER_ID, "ghost", 5.0, 5.0)
        .await
        .unwrap();

    // A later committed mutation round-trips; the denied one left no trace.
    add_token(&host, "real", 1.0, 1.0).await;
    eventually("committed token to replicate", || async {
        guest
            .state()
            .await
            .unwrap()
            .find_token(DEFAULT_LAYER_ID, "real")
            .is_some()
    })
    .await;
    let state = guest.state().await.unwrap();
    assert!(state.find_token(DEFAULT_LAYER_ID, "ghost").is_none());
    assert!(state.find_token(DEFAULT_LAYER_ID, "rogue").is_none());
}

#[tokio::test]
async fn test_departure_removes_token_and_roster_entry() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest_1, _join_1) = spawn_actor(&hub, Role::Guest, Config::default());
    let (guest_2, guest_2_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest_1).await;
    connect(&host, &guest_2).await;
    wait_connected(&host, 2).await;
    wait_connected(&guest_1, 2).await;
    wait_connected(&guest_2, 2).await;

    add_token(&host, "t1", 0.0, 0.0).await;
    add_token(&host, "t2", 50.0, 0.0).await;
    guest_1.claim_token(DEFAULT_LAYER_ID, "t1").await.unwrap();
    guest_2.claim_token(DEFAULT_LAYER_ID, "t2").await.unwrap();
    let guest_2_id = guest_2.participant_id().clone();
    eventually("claims to replicate", || async {
        let state = host.state().await.unwrap();
        state.find_token(DEFAULT_LAYER_ID, "t2").unwrap().owner == Some(guest_2_id.clone())
    })
    .await;

    guest_2.shutdown();
    guest_2_join.await.unwrap();

    // The departed guest's token is deleted atomically and every remaining
    // peer converges.
    for handle in [&host, &guest_1] {
        eventually("departure cleanup to replicate", || async {
            let state = handle.state().await.unwrap();
            state.find_token(DEFAULT_LAYER_ID, "t2").is_none()
                && state.find_token(DEFAULT_LAYER_ID, "t1").is_some()
        })
        .await;
    }
    wait_connected(&host, 1).await;
    wait_connected(&guest_1, 1).await;
}

#[tokio::test]
async fn test_stale_answer_is_rejected() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());

    let invite = host.create_invite().await.unwrap();
    let answer = guest.join(invite).await.unwrap();
    host.accept_answer(answer.clone()).await.unwrap();

    // The invite is single-use; replaying the answer fails.
    assert!(matches!(
        host.accept_answer(answer).await,
        Err(SessionError::StaleInvite(_))
    ));
}

#[tokio::test]
async fn test_capacity_limit() {
    init_logging();
    let hub = FakeHub::new();
    let config = Config {
        max_peers: 1,
        ..Config::default()
    };
    let (host, _host_join) = spawn_actor(&hub, Role::Host, config);
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest).await;

    assert!(matches!(
        host.create_invite().await,
        Err(SessionError::CapacityExceeded)
    ));
}

#[tokio::test(start_paused = true)]
async fn test_candidate_gathering_timeout() {
    init_logging();
    let hub = FakeHub::new();
    hub.set_candidate_delay(Duration::from_secs(60));
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());

    assert!(matches!(
        host.create_invite().await,
        Err(SessionError::CandidateTimeout)
    ));
}

#[tokio::test]
async fn test_offer_setup_failure_is_recoverable() {
    init_logging();
    let hub = FakeHub::new();
    hub.fail_next_offer();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());

    assert!(matches!(
        host.create_invite().await,
        Err(SessionError::SetupFailure(_))
    ));
    // The failed attempt released its resources; a retry succeeds.
    assert!(host.create_invite().await.is_ok());
}

#[tokio::test]
async fn test_proximity_gain_follows_token_distance() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest).await;
    wait_connected(&guest, 1).await;

    let guest_id = guest.participant_id().clone();
    let host_id = host.participant_id().clone();

    // Before anyone owns a token, audio is not attenuated.
    let gain = host.audio_gain(guest_id.clone(), 0.9).await.unwrap();
    assert!((gain - 0.9).abs() < f64::EPSILON);

    add_token(&host, "h", 0.0, 0.0).await;
    add_token(&host, "g", 5_000.0, 0.0).await;
    host.claim_token(DEFAULT_LAYER_ID, "h").await.unwrap();
    guest.claim_token(DEFAULT_LAYER_ID, "g").await.unwrap();
    eventually("claims to replicate", || async {
        let state = host.state().await.unwrap();
        state.find_token(DEFAULT_LAYER_ID, "g").unwrap().owner == Some(guest_id.clone())
            && state.find_token(DEFAULT_LAYER_ID, "h").unwrap().owner == Some(host_id.clone())
    })
    .await;

    // Far beyond the falloff band: silence.
    let gain = host.audio_gain(guest_id.clone(), 1.0).await.unwrap();
    assert_eq!(gain, 0.0);

    // Move adjacent: full volume.
    host.move_token(DEFAULT_LAYER_ID, "g", 10.0, 0.0)
        .await
        .unwrap();
    eventually("move to replicate", || async {
        let gain = host.audio_gain(guest_id.clone(), 1.0).await.unwrap();
        (gain - 1.0).abs() < f64::EPSILON
    })
    .await;
}

#[tokio::test]
async fn test_guest_request_before_join_fails() {
    init_logging();
    let hub = FakeHub::new();
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());

    assert!(matches!(
        guest.move_token(DEFAULT_LAYER_ID, "t1", 0.0, 0.0).await,
        Err(SessionError::ChannelNotOpen)
    ));
}

#[tokio::test]
async fn test_mesh_peers_exchange_state_only_via_host() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest_1, _join_1) = spawn_actor(&hub, Role::Guest, Config::default());
    let (guest_2, _join_2) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest_1).await;
    connect(&host, &guest_2).await;
    wait_connected(&guest_1, 2).await;
    wait_connected(&guest_2, 2).await;

    // A request from guest 1 is committed by the host and reaches guest 2
    // even though their direct link never carries state traffic.
    add_token(&host, "t1", 0.0, 0.0).await;
    eventually("token to reach both guests", || async {
        for handle in [&guest_1, &guest_2] {
            if handle
                .state()
                .await
                .unwrap()
                .find_token(DEFAULT_LAYER_ID, "t1")
                .is_none()
            {
                return false;
            }
        }
        true
    })
    .await;

    guest_1
        .move_token(DEFAULT_LAYER_ID, "t1", 25.0, 30.0)
        .await
        .unwrap();
    eventually("move to replicate to guest 2", || async {
        let state = guest_2.state().await.unwrap();
        let t1 = state.find_token(DEFAULT_LAYER_ID, "t1").unwrap();
        (t1.x, t1.y) == (25.0, 30.0)
    })
    .await;
}

#[tokio::test]
async fn test_roster_entries_keep_participant_identity() {
    init_logging();
    let hub = FakeHub::new();
    let (host, _host_join) = spawn_actor(&hub, Role::Host, Config::default());
    let (guest, _guest_join) = spawn_actor(&hub, Role::Guest, Config::default());
    connect(&host, &guest).await;
    wait_connected(&host, 1).await;

    let roster = host.roster().await.unwrap();
    assert_eq!(
        roster[0].participant_id,
        ParticipantId::from(guest.participant_id().as_str())
    );
}
