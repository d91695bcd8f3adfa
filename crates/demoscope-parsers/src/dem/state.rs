//! Session state: players, raw slot snapshots and the connection registry.
//!
//! Everything a parser session mutates lives in [`ParserState`], which the
//! driver owns and hands to the frame handlers and the tick reconciler.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use demoscope_core::{EntityIndex, SteamId, UserId, Vec3};

use super::header::DemoHeader;

/// Per-slot player info as last received from the network.
///
/// Replaced wholesale whenever the string-table decoder sees an update.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RawSlot {
    pub user_id: UserId,
    pub name: String,
    /// Persistent platform id, zero until assigned
    pub xuid: SteamId,
    /// Bot or other server-side fake client
    pub is_fake_player: bool,
}

/// Scoreboard data kept per entity index by the entity decoder
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct AdditionalPlayerInfo {
    pub kills: i32,
    pub deaths: i32,
    pub assists: i32,
    pub score: i32,
    pub mvps: i32,
    pub ping: i32,
    pub clan_tag: String,
    pub total_cash_spent: i32,
}

/// Stable reference to a [`Player`] inside a [`PlayerArena`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PlayerHandle(u32);

impl PlayerHandle {
    /// Position of the player in the arena
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

/// Logical player, alive for the whole session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Player {
    pub entity_index: EntityIndex,
    pub name: String,
    pub steam_id: SteamId,
    pub is_bot: bool,
    pub health: i32,
    pub position: Vec3,
    /// Position at the end of the last tick the player was alive
    pub last_alive_position: Vec3,
    pub additional_info: AdditionalPlayerInfo,
}

impl Player {
    fn new(entity_index: EntityIndex) -> Self {
        Self {
            entity_index,
            name: String::new(),
            steam_id: SteamId::NONE,
            is_bot: false,
            health: 0,
            position: Vec3::ZERO,
            last_alive_position: Vec3::ZERO,
            additional_info: AdditionalPlayerInfo::default(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.health > 0
    }
}

/// Entity index to player table with handles that stay valid for the session.
///
/// Players are never removed; re-binding an index that already has a player
/// returns the existing handle.
#[derive(Debug, Default)]
pub struct PlayerArena {
    players: Vec<Player>,
    by_index: Vec<Option<PlayerHandle>>,
}

impl PlayerArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the player at `index`, creating it on first sighting
    pub fn bind(&mut self, index: EntityIndex) -> PlayerHandle {
        if let Some(handle) = self.handle_at(index) {
            return handle;
        }

        let handle = PlayerHandle(self.players.len() as u32);
        self.players.push(Player::new(index));
        if self.by_index.len() <= index.0 {
            self.by_index.resize(index.0 + 1, None);
        }
        self.by_index[index.0] = Some(handle);
        handle
    }

    /// Handle of the player bound at `index`, if any
    pub fn handle_at(&self, index: EntityIndex) -> Option<PlayerHandle> {
        self.by_index.get(index.0).copied().flatten()
    }

    pub fn get(&self, handle: PlayerHandle) -> &Player {
        &self.players[handle.index()]
    }

    pub fn get_mut(&mut self, handle: PlayerHandle) -> &mut Player {
        &mut self.players[handle.index()]
    }

    /// Player bound at `index`, if any
    pub fn at(&self, index: EntityIndex) -> Option<&Player> {
        self.handle_at(index).map(|handle| self.get(handle))
    }

    /// Mutable player bound at `index`, if any
    pub fn at_mut(&mut self, index: EntityIndex) -> Option<&mut Player> {
        let handle = self.handle_at(index)?;
        Some(self.get_mut(handle))
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PlayerHandle, &Player)> {
        self.players
            .iter()
            .enumerate()
            .map(|(idx, player)| (PlayerHandle(idx as u32), player))
    }
}

/// User id to player mapping; grows monotonically during a session
#[derive(Debug, Default)]
pub struct ConnectedRegistry {
    by_user: HashMap<UserId, PlayerHandle>,
}

impl ConnectedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `user` unless already present. Returns true if newly added.
    pub fn register(&mut self, user: UserId, handle: PlayerHandle) -> bool {
        if self.by_user.contains_key(&user) {
            return false;
        }
        self.by_user.insert(user, handle);
        true
    }

    pub fn get(&self, user: UserId) -> Option<PlayerHandle> {
        self.by_user.get(&user).copied()
    }

    pub fn contains(&self, user: UserId) -> bool {
        self.by_user.contains_key(&user)
    }

    pub fn len(&self) -> usize {
        self.by_user.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_user.is_empty()
    }

    /// Registered users, ordered by user id
    pub fn iter(&self) -> impl Iterator<Item = (UserId, PlayerHandle)> {
        let mut entries: Vec<_> = self.by_user.iter().map(|(u, h)| (*u, *h)).collect();
        entries.sort_unstable_by_key(|(user, _)| *user);
        entries.into_iter()
    }
}

/// Game-level state the frame handlers read and write
#[derive(Debug)]
pub struct GameState {
    /// Raw player info indexed by slot; `None` for empty slots
    pub raw_players: Vec<Option<RawSlot>>,
    pub players: PlayerArena,
    pub connected: ConnectedRegistry,
    /// Scoreboard data indexed by entity index
    pub additional_info: Vec<AdditionalPlayerInfo>,
}

impl GameState {
    pub fn new(max_players: usize) -> Self {
        Self {
            raw_players: vec![None; max_players],
            players: PlayerArena::new(),
            connected: ConnectedRegistry::new(),
            additional_info: vec![AdditionalPlayerInfo::default(); max_players + 1],
        }
    }

    /// Replace the raw snapshot of `slot`, growing the table if needed
    pub fn set_raw_player(&mut self, slot: usize, raw: Option<RawSlot>) {
        if self.raw_players.len() <= slot {
            self.raw_players.resize(slot + 1, None);
        }
        self.raw_players[slot] = raw;
    }

    /// Scoreboard data for `index`, growing the table if needed
    pub fn additional_info_mut(&mut self, index: EntityIndex) -> &mut AdditionalPlayerInfo {
        if self.additional_info.len() <= index.0 {
            self.additional_info
                .resize(index.0 + 1, AdditionalPlayerInfo::default());
        }
        &mut self.additional_info[index.0]
    }

    /// Live scoreboard entry of the player behind `handle`
    pub fn additional_info_of(&self, handle: PlayerHandle) -> Option<&AdditionalPlayerInfo> {
        let index = self.players.get(handle).entity_index;
        self.additional_info.get(index.0)
    }

    /// Player registered for `user`
    pub fn connected_player(&self, user: UserId) -> Option<&Player> {
        self.connected.get(user).map(|handle| self.players.get(handle))
    }
}

/// State of one parser session
#[derive(Debug)]
pub struct ParserState {
    pub header: Option<DemoHeader>,
    pub ingame_tick: i32,
    pub current_frame: u32,
    /// Frames of the custom-data kind seen so far
    pub custom_data_frames: u32,
    pub game: GameState,
}

impl ParserState {
    pub fn new(max_players: usize) -> Self {
        Self {
            header: None,
            ingame_tick: 0,
            current_frame: 0,
            custom_data_frames: 0,
            game: GameState::new(max_players),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_is_idempotent() {
        let mut arena = PlayerArena::new();
        let first = arena.bind(EntityIndex(3));
        let second = arena.bind(EntityIndex(3));

        assert_eq!(first, second);
        assert_eq!(arena.len(), 1);
        assert_eq!(arena.get(first).entity_index, EntityIndex(3));
    }

    #[test]
    fn test_handles_are_stable() {
        let mut arena = PlayerArena::new();
        let a = arena.bind(EntityIndex(10));
        arena.get_mut(a).name = "alice".to_string();
        let b = arena.bind(EntityIndex(1));
        arena.get_mut(b).name = "bob".to_string();

        assert_eq!(arena.get(a).name, "alice");
        assert_eq!(arena.at(EntityIndex(1)).map(|p| p.name.as_str()), Some("bob"));
        assert!(arena.handle_at(EntityIndex(5)).is_none());
        assert!(arena.handle_at(EntityIndex(500)).is_none());
    }

    #[test]
    fn test_registry_registers_once() {
        let mut arena = PlayerArena::new();
        let handle = arena.bind(EntityIndex(1));
        let other = arena.bind(EntityIndex(2));
        let mut registry = ConnectedRegistry::new();

        assert!(registry.register(UserId(7), handle));
        assert!(!registry.register(UserId(7), other));
        assert_eq!(registry.get(UserId(7)), Some(handle));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_registry_iter_sorted() {
        let mut arena = PlayerArena::new();
        let mut registry = ConnectedRegistry::new();
        for user in [9, 2, 5] {
            let handle = arena.bind(EntityIndex(user as usize));
            registry.register(UserId(user), handle);
        }

        let users: Vec<_> = registry.iter().map(|(user, _)| user.0).collect();
        assert_eq!(users, vec![2, 5, 9]);
    }

    #[test]
    fn test_set_raw_player_grows() {
        let mut game = GameState::new(2);
        game.set_raw_player(5, Some(RawSlot::default()));

        assert_eq!(game.raw_players.len(), 6);
        assert!(game.raw_players[5].is_some());
        assert!(game.raw_players[1].is_none());
    }

    #[test]
    fn test_additional_info_lookup_by_handle() {
        let mut game = GameState::new(4);
        let inside = game.players.bind(EntityIndex(2));
        let outside = game.players.bind(EntityIndex(40));
        game.additional_info_mut(EntityIndex(2)).mvps = 3;

        assert_eq!(game.additional_info_of(inside).map(|i| i.mvps), Some(3));
        assert!(game.additional_info_of(outside).is_none());
    }

    #[test]
    fn test_is_alive() {
        let mut player = Player::new(EntityIndex(1));
        assert!(!player.is_alive());
        player.health = 100;
        assert!(player.is_alive());
    }
}
