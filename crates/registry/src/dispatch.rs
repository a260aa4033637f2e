//! Intent routing: client messages in, addressed notifications out.
//!
//! This is the one place that encodes who hears about what. The WebSocket
//! edge and the in-process local transport both feed client messages through
//! [`dispatch`] and deliver the returned `(connection, message)` pairs over
//! whatever sinks they own, so live and offline play cannot drift apart.

use uuid::Uuid;

use qudra_protocol::{ClientMessage, ServerMessage};

use crate::registry::GameRegistry;

/// One outbound notification addressed to a specific connection.
pub type Outbound = (Uuid, ServerMessage);

fn error_to(target: Uuid, code: &str, message: impl Into<String>) -> Outbound {
    (
        target,
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        },
    )
}

/// Route one client intent into the registry and collect the notifications
/// it owes. Host authority is by convention: approval/rejection intents are
/// honoured from any connection.
pub fn dispatch(registry: &mut GameRegistry, caller: Uuid, msg: ClientMessage) -> Vec<Outbound> {
    match msg {
        ClientMessage::JoinGame {
            game_id,
            role,
            player_name,
        } => {
            // Snapshot the roster before the join so the new player is not
            // notified about itself.
            registry.create_game(&game_id);
            let existing = registry
                .get_game(&game_id)
                .map(|g| g.connections())
                .unwrap_or_default();

            registry.add_player(caller, &game_id, player_name, role);

            let mut out = vec![(
                caller,
                ServerMessage::GameJoined {
                    game_id: game_id.clone(),
                    player_id: caller,
                },
            )];
            if let Some(player) = registry
                .get_game(&game_id)
                .and_then(|g| g.find_player_by_connection(caller))
            {
                let joined = ServerMessage::PlayerJoined {
                    player: player.info(),
                };
                out.extend(existing.into_iter().map(|conn| (conn, joined.clone())));
            }
            out
        }

        ClientMessage::RequestAbility {
            game_id,
            player_id,
            ability_text,
        } => {
            let Some(player_name) = registry
                .get_game(&game_id)
                .and_then(|g| g.find_player_by_connection(player_id))
                .map(|p| p.player_name.clone())
            else {
                return vec![error_to(
                    caller,
                    "player_not_found",
                    format!("no such player connection in game {game_id}"),
                )];
            };

            let request_id = Uuid::new_v4().to_string();
            match registry.handle_ability_request(&game_id, &player_name, &ability_text, &request_id)
            {
                Ok(()) => {
                    let requested = ServerMessage::AbilityRequested {
                        request_id,
                        player_name,
                        ability_text,
                    };
                    registry
                        .get_game(&game_id)
                        .map(|g| g.host_connections())
                        .unwrap_or_default()
                        .into_iter()
                        .map(|conn| (conn, requested.clone()))
                        .collect()
                }
                Err(e) => vec![error_to(caller, e.code(), e.to_string())],
            }
        }

        ClientMessage::ApproveAbilityRequest { request_id } => {
            let Some(game_id) = registry
                .find_game_for_request(&request_id)
                .map(str::to_string)
            else {
                return vec![error_to(caller, "request_not_found", request_id)];
            };

            if !registry.approve_ability_request(&game_id, &request_id) {
                return vec![error_to(caller, "request_not_found", request_id)];
            }

            let mut out = Vec::new();
            if let Some(game) = registry.get_game(&game_id) {
                let approved = ServerMessage::AbilityRequestApproved {
                    request_id: request_id.clone(),
                };
                for conn in game.connections() {
                    out.push((conn, approved.clone()));
                }
                if let Some(request) = game.get_request(&request_id) {
                    let updated = ServerMessage::PlayerAbilitiesUpdated {
                        player_param: request.slot,
                        abilities: game.slot_abilities(request.slot).to_vec(),
                    };
                    for conn in game.connections() {
                        out.push((conn, updated.clone()));
                    }
                }
            }
            out
        }

        ClientMessage::RejectAbilityRequest { request_id } => {
            let Some(game_id) = registry
                .find_game_for_request(&request_id)
                .map(str::to_string)
            else {
                return vec![error_to(caller, "request_not_found", request_id)];
            };

            if !registry.reject_ability_request(&game_id, &request_id) {
                return vec![error_to(caller, "request_not_found", request_id)];
            }

            let rejected = ServerMessage::AbilityRequestRejected { request_id };
            registry
                .get_game(&game_id)
                .map(|g| g.connections())
                .unwrap_or_default()
                .into_iter()
                .map(|conn| (conn, rejected.clone()))
                .collect()
        }

        ClientMessage::GetGameState { game_id } => match registry.snapshot(&game_id) {
            Some(game) => vec![(caller, ServerMessage::GameState { game })],
            None => vec![error_to(caller, "game_not_found", game_id)],
        },

        ClientMessage::SetPlayerAbilities {
            game_id,
            player_param,
            abilities,
        } => {
            if !registry.set_player_abilities(&game_id, player_param, abilities) {
                return vec![error_to(caller, "game_not_found", game_id)];
            }
            let updated = ServerMessage::PlayerAbilitiesUpdated {
                player_param,
                abilities: registry
                    .get_game(&game_id)
                    .map(|g| g.slot_abilities(player_param).to_vec())
                    .unwrap_or_default(),
            };
            registry
                .get_game(&game_id)
                .map(|g| g.connections())
                .unwrap_or_default()
                .into_iter()
                .map(|conn| (conn, updated.clone()))
                .collect()
        }
    }
}

/// Handle a connection drop: remove the roster entry and tell the rest of
/// the game. Slot abilities stay behind.
pub fn dispatch_disconnect(registry: &mut GameRegistry, connection_id: Uuid) -> Vec<Outbound> {
    let Some((game_id, player)) = registry.remove_player(connection_id) else {
        return Vec::new();
    };
    let left = ServerMessage::PlayerLeft {
        player: player.info(),
    };
    registry
        .get_game(&game_id)
        .map(|g| g.connections())
        .unwrap_or_default()
        .into_iter()
        .map(|conn| (conn, left.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use qudra_protocol::{EventKind, PlayerRole};

    fn join(registry: &mut GameRegistry, name: &str, role: PlayerRole) -> Uuid {
        let conn = Uuid::new_v4();
        dispatch(
            registry,
            conn,
            ClientMessage::JoinGame {
                game_id: "G1".to_string(),
                role,
                player_name: name.to_string(),
            },
        );
        conn
    }

    fn kinds_for(out: &[Outbound], target: Uuid) -> Vec<EventKind> {
        out.iter()
            .filter(|(conn, _)| *conn == target)
            .map(|(_, msg)| msg.kind())
            .collect()
    }

    #[test]
    fn join_acknowledges_caller_and_notifies_roster() {
        let mut registry = GameRegistry::new();
        let host = join(&mut registry, "Layla", PlayerRole::Host);

        let player = Uuid::new_v4();
        let out = dispatch(
            &mut registry,
            player,
            ClientMessage::JoinGame {
                game_id: "G1".to_string(),
                role: PlayerRole::Player1,
                player_name: "Amir".to_string(),
            },
        );

        assert_eq!(kinds_for(&out, player), [EventKind::GameJoined]);
        assert_eq!(kinds_for(&out, host), [EventKind::PlayerJoined]);
    }

    #[test]
    fn ability_request_reaches_only_host() {
        let mut registry = GameRegistry::new();
        let host = join(&mut registry, "Layla", PlayerRole::Host);
        let p1 = join(&mut registry, "Amir", PlayerRole::Player1);
        let p2 = join(&mut registry, "Nour", PlayerRole::Player2);

        let out = dispatch(
            &mut registry,
            p1,
            ClientMessage::RequestAbility {
                game_id: "G1".to_string(),
                player_id: p1,
                ability_text: "قدرة جديدة".to_string(),
            },
        );

        assert_eq!(kinds_for(&out, host), [EventKind::AbilityRequested]);
        assert!(kinds_for(&out, p1).is_empty());
        assert!(kinds_for(&out, p2).is_empty());
    }

    #[test]
    fn duplicate_starter_request_errors_to_caller() {
        let mut registry = GameRegistry::new();
        let p1 = join(&mut registry, "Amir", PlayerRole::Player1);

        let out = dispatch(
            &mut registry,
            p1,
            ClientMessage::RequestAbility {
                game_id: "G1".to_string(),
                player_id: p1,
                ability_text: "قدرة الشفاء".to_string(),
            },
        );

        assert_eq!(out.len(), 1);
        let (target, msg) = &out[0];
        assert_eq!(*target, p1);
        match msg {
            ServerMessage::Error { code, .. } => assert_eq!(code, "already_used"),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn approval_broadcasts_result_and_abilities() {
        let mut registry = GameRegistry::new();
        let host = join(&mut registry, "Layla", PlayerRole::Host);
        let p1 = join(&mut registry, "Amir", PlayerRole::Player1);

        let out = dispatch(
            &mut registry,
            p1,
            ClientMessage::RequestAbility {
                game_id: "G1".to_string(),
                player_id: p1,
                ability_text: "قدرة جديدة".to_string(),
            },
        );
        let request_id = match &out[0].1 {
            ServerMessage::AbilityRequested { request_id, .. } => request_id.clone(),
            other => panic!("expected abilityRequested, got {other:?}"),
        };

        let out = dispatch(
            &mut registry,
            host,
            ClientMessage::ApproveAbilityRequest {
                request_id: request_id.clone(),
            },
        );

        for conn in [host, p1] {
            assert_eq!(
                kinds_for(&out, conn),
                [EventKind::AbilityRequestApproved, EventKind::PlayerAbilitiesUpdated]
            );
        }

        // Replaying the approval is answered with an error, not a re-grant
        let replay = dispatch(
            &mut registry,
            host,
            ClientMessage::ApproveAbilityRequest { request_id },
        );
        assert_eq!(kinds_for(&replay, host), [EventKind::Error]);
    }

    #[test]
    fn disconnect_notifies_remaining_roster() {
        let mut registry = GameRegistry::new();
        let host = join(&mut registry, "Layla", PlayerRole::Host);
        let p1 = join(&mut registry, "Amir", PlayerRole::Player1);

        let out = dispatch_disconnect(&mut registry, p1);
        assert_eq!(kinds_for(&out, host), [EventKind::PlayerLeft]);
        assert!(kinds_for(&out, p1).is_empty());
    }

    #[test]
    fn get_game_state_returns_snapshot_to_caller_only() {
        let mut registry = GameRegistry::new();
        let _host = join(&mut registry, "Layla", PlayerRole::Host);
        let p1 = join(&mut registry, "Amir", PlayerRole::Player1);

        let out = dispatch(
            &mut registry,
            p1,
            ClientMessage::GetGameState {
                game_id: "G1".to_string(),
            },
        );
        assert_eq!(out.len(), 1);
        assert_eq!(kinds_for(&out, p1), [EventKind::GameState]);
    }
}
