//! End-of-frame reconciliation of raw slot snapshots with the player arena.

use smallvec::SmallVec;

use demoscope_core::EntityIndex;

use crate::events::{DemoEvent, EventDispatcher};

use super::state::{AdditionalPlayerInfo, GameState, PlayerHandle};

/// Copy this frame's raw slot data onto the bound players and raise the
/// per-tick events.
///
/// `PlayerIdentified` events fire after every slot has been applied, in slot
/// order, at most once per user id and never for a zero steam id. Exactly one
/// `TickComplete` follows, whether or not anything changed.
pub fn reconcile_tick(game: &mut GameState, dispatcher: &mut EventDispatcher) {
    let GameState {
        raw_players,
        players,
        connected,
        additional_info,
    } = game;

    let mut identified: SmallVec<[PlayerHandle; 4]> = SmallVec::new();

    for (slot, raw) in raw_players.iter().enumerate() {
        let Some(raw) = raw else {
            continue;
        };
        let Some(handle) = players.handle_at(EntityIndex(slot)) else {
            continue;
        };

        let first_sighting = connected.register(raw.user_id, handle);

        let player = players.get_mut(handle);
        player.name.clone_from(&raw.name);
        player.steam_id = raw.xuid;
        player.is_bot = raw.is_fake_player;
        match additional_info.get(player.entity_index.0) {
            Some(info) => player.additional_info.clone_from(info),
            None => {
                tracing::debug!(index = %player.entity_index, "No scoreboard entry for player");
                player.additional_info = AdditionalPlayerInfo::default();
            }
        }

        if player.is_alive() {
            player.last_alive_position = player.position;
        }

        if first_sighting && !player.steam_id.is_zero() {
            tracing::debug!(
                user_id = %raw.user_id,
                steam_id = %player.steam_id,
                name = %player.name,
                "Player identified"
            );
            identified.push(handle);
        }
    }

    for handle in identified {
        dispatcher.dispatch(&DemoEvent::PlayerIdentified {
            handle,
            player: players.get(handle),
        });
    }

    dispatcher.dispatch(&DemoEvent::TickComplete);
}
