//! End-to-end host/player session over the in-process local backend.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use qudra_client::snapshot::{read_slot_abilities, MemorySnapshotStore, SnapshotStore};
use qudra_client::transport::{LocalBackend, LocalTransport, Transport};
use qudra_client::{ConnectionManager, ConnectionState};
use qudra_protocol::{EventKind, PlayerRole, PlayerSlot, ServerMessage};

async fn settle() {
    tokio::time::sleep(Duration::from_millis(150)).await;
}

fn record_into(
    manager: &ConnectionManager,
    kind: EventKind,
    seen: &Arc<Mutex<Vec<ServerMessage>>>,
) {
    let seen = Arc::clone(seen);
    manager.on(kind, move |msg| {
        seen.lock().unwrap().push(msg.clone());
        Ok(())
    });
}

#[tokio::test]
async fn full_ability_request_flow() {
    let backend = LocalBackend::new();
    let host_transport: Arc<dyn Transport> =
        Arc::new(LocalTransport::new(Arc::clone(&backend)));
    let player_transport: Arc<dyn Transport> =
        Arc::new(LocalTransport::new(Arc::clone(&backend)));

    let store = Arc::new(MemorySnapshotStore::new());
    let host = ConnectionManager::new(host_transport).await;
    let player = ConnectionManager::with_snapshot_store(
        player_transport,
        Arc::clone(&store) as Arc<dyn SnapshotStore>,
    )
    .await;

    let requested = Arc::new(Mutex::new(Vec::new()));
    let approvals = Arc::new(Mutex::new(Vec::new()));
    record_into(&host, EventKind::AbilityRequested, &requested);
    record_into(&player, EventKind::AbilityRequestApproved, &approvals);

    host.connect().await.unwrap();
    player.connect().await.unwrap();
    assert_eq!(host.state(), ConnectionState::Connected);

    host.join_game("G1", PlayerRole::Host, "المشرف").await.unwrap();
    settle().await;
    player
        .join_game("G1", PlayerRole::Player1, "سارة")
        .await
        .unwrap();
    settle().await;
    assert!(player.player_id().is_some());

    player.request_ability("قدرة السرعة الخاطفة").await.unwrap();
    settle().await;

    let request_id = {
        let seen = requested.lock().unwrap();
        match seen.as_slice() {
            [ServerMessage::AbilityRequested { request_id, player_name, .. }] => {
                assert_eq!(player_name, "سارة");
                request_id.clone()
            }
            other => panic!("host expected one abilityRequested, got {other:?}"),
        }
    };

    host.approve_ability_request(&request_id).await.unwrap();
    settle().await;

    {
        let seen = approvals.lock().unwrap();
        assert_eq!(seen.len(), 1);
    }

    // The approved ability was persisted alongside the starters.
    let abilities = read_slot_abilities(store.as_ref(), "G1", PlayerSlot::Player1).unwrap();
    assert!(abilities.contains(&"قدرة السرعة الخاطفة".to_string()));
    assert!(abilities.contains(&"قدرة الشفاء".to_string()));
}

#[tokio::test]
async fn rejection_reaches_both_sides_without_granting() {
    let backend = LocalBackend::new();
    let host = ConnectionManager::new(Arc::new(LocalTransport::new(Arc::clone(&backend)))
        as Arc<dyn Transport>)
    .await;
    let player = ConnectionManager::new(Arc::new(LocalTransport::new(Arc::clone(&backend)))
        as Arc<dyn Transport>)
    .await;

    let requested = Arc::new(Mutex::new(Vec::new()));
    let rejections = Arc::new(Mutex::new(Vec::new()));
    let updates = Arc::new(Mutex::new(Vec::new()));
    record_into(&host, EventKind::AbilityRequested, &requested);
    record_into(&player, EventKind::AbilityRequestRejected, &rejections);
    record_into(&player, EventKind::PlayerAbilitiesUpdated, &updates);

    host.connect().await.unwrap();
    player.connect().await.unwrap();
    host.join_game("G2", PlayerRole::Host, "المشرف").await.unwrap();
    player
        .join_game("G2", PlayerRole::Player2, "ليلى")
        .await
        .unwrap();
    settle().await;

    player.request_ability("قدرة الظل").await.unwrap();
    settle().await;

    let request_id = {
        let seen = requested.lock().unwrap();
        match seen.first() {
            Some(ServerMessage::AbilityRequested { request_id, .. }) => request_id.clone(),
            other => panic!("expected abilityRequested, got {other:?}"),
        }
    };

    host.reject_ability_request(&request_id).await.unwrap();
    settle().await;

    assert_eq!(rejections.lock().unwrap().len(), 1);
    // No grant happened, so no ability-list broadcast either.
    assert!(updates.lock().unwrap().is_empty());
}

#[tokio::test]
async fn deliberate_disconnect_forgets_the_session() {
    let backend = LocalBackend::new();
    let player = ConnectionManager::new(Arc::new(LocalTransport::new(backend))
        as Arc<dyn Transport>)
    .await;

    player.connect().await.unwrap();
    player
        .join_game("G3", PlayerRole::Player1, "سارة")
        .await
        .unwrap();
    settle().await;
    assert!(player.player_id().is_some());

    player.disconnect().await;
    assert_eq!(player.state(), ConnectionState::Disconnected);
    assert!(player.player_id().is_none());

    let err = player.request_ability("قدرة الظل").await.unwrap_err();
    assert!(matches!(err, qudra_client::ClientError::NotConnected));
}
