//! Registry error types

/// Protocol-level rejection reasons for an ability request.
///
/// These are returned synchronously to the caller and never retried
/// automatically; the player decides whether to resubmit.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AbilityRequestError {
    #[error("game not found: {0}")]
    GameNotFound(String),

    #[error("player not found in game: {0}")]
    PlayerNotFound(String),

    #[error("ability already granted to this slot: {0}")]
    AlreadyUsed(String),

    /// Request ids are never reused within a session; a colliding id is a
    /// caller bug, not a retryable condition.
    #[error("request id already recorded: {0}")]
    DuplicateRequestId(String),
}

impl AbilityRequestError {
    /// Stable machine-readable reason code carried on the wire.
    pub fn code(&self) -> &'static str {
        match self {
            AbilityRequestError::GameNotFound(_) => "game_not_found",
            AbilityRequestError::PlayerNotFound(_) => "player_not_found",
            AbilityRequestError::AlreadyUsed(_) => "already_used",
            AbilityRequestError::DuplicateRequestId(_) => "duplicate_request_id",
        }
    }
}
