//! Connection lifecycle, reconnection policy, and typed event dispatch.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use uuid::Uuid;

use qudra_protocol::{ClientMessage, EventKind, PlayerRole, PlayerSlot, ServerMessage};

use crate::backoff::Backoff;
use crate::error::ClientError;
use crate::events::{EventBus, SubscriptionId};
use crate::snapshot::{self, SnapshotStore};
use crate::state::{ConnectionState, ConnectionStateObserver};
use crate::transport::Transport;

/// What the caller asked to join as. Kept so an automatic reconnect can
/// rejoin the same game with the same identity.
#[derive(Debug, Clone, PartialEq)]
pub struct GameData {
    pub game_id: String,
    pub role: PlayerRole,
    pub player_name: String,
}

/// Identifiers acknowledged by the server on `gameJoined`.
#[derive(Debug, Clone)]
struct SessionIds {
    game_id: String,
    player_id: Uuid,
}

/// Drives one [`Transport`]: connect/reconnect with exponential backoff,
/// session identity bookkeeping, and fan-out of server events to typed
/// subscribers.
///
/// Game operations fail fast while disconnected or unjoined; transport
/// failures feed the retry policy instead. An unexpected link drop re-enters
/// the retry loop in the background and rejoins the previous game on
/// success; a deliberate [`disconnect`](Self::disconnect) suppresses all of
/// that until the next explicit [`connect`](Self::connect).
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    state: Arc<AtomicU8>,
    bus: EventBus,
    connecting: AtomicBool,
    intentional_disconnect: AtomicBool,
    joined: Mutex<Option<GameData>>,
    session: Mutex<Option<SessionIds>>,
    snapshots: Option<Arc<dyn SnapshotStore>>,
}

impl ConnectionManager {
    pub async fn new(transport: Arc<dyn Transport>) -> Arc<Self> {
        Self::build(transport, None).await
    }

    /// Like [`new`](Self::new), but also persists approved slot abilities
    /// through the given store whenever the server announces them.
    pub async fn with_snapshot_store(
        transport: Arc<dyn Transport>,
        store: Arc<dyn SnapshotStore>,
    ) -> Arc<Self> {
        Self::build(transport, Some(store)).await
    }

    async fn build(
        transport: Arc<dyn Transport>,
        snapshots: Option<Arc<dyn SnapshotStore>>,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            transport,
            state: Arc::new(AtomicU8::new(ConnectionState::Disconnected.to_u8())),
            bus: EventBus::new(),
            connecting: AtomicBool::new(false),
            intentional_disconnect: AtomicBool::new(false),
            joined: Mutex::new(None),
            session: Mutex::new(None),
            snapshots,
        });

        let weak = Arc::downgrade(&manager);
        manager
            .transport
            .set_on_event(Box::new(move |message| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_event(message);
                }
            }))
            .await;

        let weak = Arc::downgrade(&manager);
        manager
            .transport
            .set_on_state_change(Box::new(move |link_state| {
                if let Some(manager) = weak.upgrade() {
                    manager.handle_link_state(link_state);
                }
            }))
            .await;

        manager
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Establish the connection, retrying with exponential backoff.
    ///
    /// Resolves on the first successful attempt. After the attempt ceiling
    /// the state is `Failed` and the error is terminal; recovering requires
    /// another explicit `connect`.
    pub async fn connect(&self) -> Result<(), ClientError> {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(ClientError::AlreadyConnecting);
        }
        self.intentional_disconnect.store(false, Ordering::SeqCst);
        self.set_state(ConnectionState::Connecting);

        let result = self.run_retry_cycle(Backoff::default(), false).await;
        self.connecting.store(false, Ordering::SeqCst);
        result
    }

    /// Deliberately drop the connection and forget the session.
    ///
    /// No reconnection will be attempted for this drop.
    pub async fn disconnect(&self) {
        self.intentional_disconnect.store(true, Ordering::SeqCst);
        self.transport.disconnect().await;
        *lock(&self.session) = None;
        *lock(&self.joined) = None;
        self.set_state(ConnectionState::Disconnected);
    }

    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::SeqCst))
    }

    /// Shareable read-only view of the connection state.
    pub fn observer(&self) -> ConnectionStateObserver {
        ConnectionStateObserver::new(Arc::clone(&self.state))
    }

    /// The join this manager would restore on reconnect, if any.
    pub fn game_data(&self) -> Option<GameData> {
        lock(&self.joined).clone()
    }

    /// Connection id acknowledged by the server, once joined.
    pub fn player_id(&self) -> Option<Uuid> {
        lock(&self.session).as_ref().map(|s| s.player_id)
    }

    async fn run_retry_cycle(&self, mut backoff: Backoff, rejoin: bool) -> Result<(), ClientError> {
        loop {
            if self.intentional_disconnect.load(Ordering::SeqCst) {
                self.set_state(ConnectionState::Disconnected);
                return Err(ClientError::Cancelled);
            }
            match self.transport.connect().await {
                Ok(()) => {
                    self.set_state(ConnectionState::Connected);
                    if rejoin {
                        self.rejoin().await;
                    }
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!(
                        attempt = backoff.attempts() + 1,
                        error = %e,
                        "connection attempt failed"
                    );
                    match backoff.record_failure() {
                        Some(delay) => {
                            self.set_state(ConnectionState::Reconnecting);
                            tokio::time::sleep(Duration::from_millis(delay)).await;
                        }
                        None => {
                            tracing::error!("max connection attempts reached, giving up");
                            self.set_state(ConnectionState::Failed);
                            return Err(ClientError::ReconnectExhausted(backoff.attempts()));
                        }
                    }
                }
            }
        }
    }

    /// Background recovery after a link drop observed while connected.
    ///
    /// The drop itself counts as the first failure, so the first retry waits
    /// a full backoff step rather than hammering the server immediately.
    async fn reconnect_after_drop(self: Arc<Self>) {
        if self
            .connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return;
        }
        self.set_state(ConnectionState::Reconnecting);

        let mut backoff = Backoff::default();
        if let Some(delay) = backoff.record_failure() {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if let Err(e) = self.run_retry_cycle(backoff, true).await {
            tracing::error!(error = %e, "automatic reconnection abandoned");
        }
        self.connecting.store(false, Ordering::SeqCst);
    }

    async fn rejoin(&self) {
        let joined = lock(&self.joined).clone();
        let Some(game) = joined else {
            return;
        };
        tracing::info!(game_id = %game.game_id, "rejoining game after reconnect");
        if let Err(e) = self
            .transport
            .send(ClientMessage::JoinGame {
                game_id: game.game_id,
                role: game.role,
                player_name: game.player_name,
            })
            .await
        {
            tracing::warn!(error = %e, "rejoin failed");
        }
    }

    // ------------------------------------------------------------------
    // Game operations
    // ------------------------------------------------------------------

    pub async fn join_game(
        &self,
        game_id: impl Into<String>,
        role: PlayerRole,
        player_name: impl Into<String>,
    ) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let game = GameData {
            game_id: game_id.into(),
            role,
            player_name: player_name.into(),
        };
        *lock(&self.joined) = Some(game.clone());
        self.transport
            .send(ClientMessage::JoinGame {
                game_id: game.game_id,
                role: game.role,
                player_name: game.player_name,
            })
            .await
    }

    pub async fn request_ability(&self, ability_text: impl Into<String>) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let (game_id, player_id) = self.session_ids()?;
        self.transport
            .send(ClientMessage::RequestAbility {
                game_id,
                player_id,
                ability_text: ability_text.into(),
            })
            .await
    }

    pub async fn approve_ability_request(&self, request_id: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.transport
            .send(ClientMessage::ApproveAbilityRequest {
                request_id: request_id.to_string(),
            })
            .await
    }

    pub async fn reject_ability_request(&self, request_id: &str) -> Result<(), ClientError> {
        self.ensure_connected()?;
        self.transport
            .send(ClientMessage::RejectAbilityRequest {
                request_id: request_id.to_string(),
            })
            .await
    }

    pub async fn get_game_state(&self) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let (game_id, _) = self.session_ids()?;
        self.transport
            .send(ClientMessage::GetGameState { game_id })
            .await
    }

    pub async fn set_player_abilities(
        &self,
        player_param: PlayerSlot,
        abilities: Vec<String>,
    ) -> Result<(), ClientError> {
        self.ensure_connected()?;
        let (game_id, _) = self.session_ids()?;
        self.transport
            .send(ClientMessage::SetPlayerAbilities {
                game_id,
                player_param,
                abilities,
            })
            .await
    }

    // ------------------------------------------------------------------
    // Event subscriptions
    // ------------------------------------------------------------------

    pub fn on(
        &self,
        kind: EventKind,
        handler: impl FnMut(&ServerMessage) -> anyhow::Result<()> + Send + 'static,
    ) -> SubscriptionId {
        self.bus.subscribe(kind, handler)
    }

    /// Subscribe by wire event name; unknown names are rejected up front.
    pub fn on_named(
        &self,
        event_name: &str,
        handler: impl FnMut(&ServerMessage) -> anyhow::Result<()> + Send + 'static,
    ) -> Result<SubscriptionId, ClientError> {
        let kind = EventKind::from_str(event_name)?;
        Ok(self.bus.subscribe(kind, handler))
    }

    pub fn off(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn ensure_connected(&self) -> Result<(), ClientError> {
        if self.state() == ConnectionState::Connected {
            Ok(())
        } else {
            Err(ClientError::NotConnected)
        }
    }

    fn session_ids(&self) -> Result<(String, Uuid), ClientError> {
        lock(&self.session)
            .as_ref()
            .map(|s| (s.game_id.clone(), s.player_id))
            .ok_or(ClientError::NotJoined)
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.store(state.to_u8(), Ordering::SeqCst);
    }

    fn handle_event(self: Arc<Self>, message: ServerMessage) {
        match &message {
            ServerMessage::GameJoined { game_id, player_id } => {
                tracing::info!(game_id = %game_id, player_id = %player_id, "join acknowledged");
                *lock(&self.session) = Some(SessionIds {
                    game_id: game_id.clone(),
                    player_id: *player_id,
                });
            }
            ServerMessage::PlayerAbilitiesUpdated {
                player_param,
                abilities,
            } => {
                if let Some(store) = &self.snapshots {
                    if let Ok((game_id, _)) = self.session_ids() {
                        snapshot::write_slot_abilities(
                            store.as_ref(),
                            &game_id,
                            *player_param,
                            abilities,
                        );
                    }
                }
            }
            _ => {}
        }
        self.bus.dispatch(&message);
    }

    fn handle_link_state(self: Arc<Self>, link_state: ConnectionState) {
        if link_state != ConnectionState::Disconnected {
            return;
        }
        if self.intentional_disconnect.load(Ordering::SeqCst) {
            self.set_state(ConnectionState::Disconnected);
            return;
        }
        if self.state() == ConnectionState::Connected {
            tracing::info!("connection lost, starting automatic reconnection");
            tokio::spawn(self.reconnect_after_drop());
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
