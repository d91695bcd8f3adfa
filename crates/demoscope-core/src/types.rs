//! Common types used across demoscope
//!
//! Identifier newtypes and small value types shared by the parser and the CLI.

use serde::{Deserialize, Serialize};

/// Index of a networked entity (and of the player slot that mirrors it)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityIndex(pub usize);

impl EntityIndex {
    /// Create a new entity index
    pub fn new(index: usize) -> Self {
        Self(index)
    }

    /// Get the raw index value
    pub fn value(&self) -> usize {
        self.0
    }
}

impl std::fmt::Display for EntityIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<usize> for EntityIndex {
    fn from(value: usize) -> Self {
        Self(value)
    }
}

/// Server-assigned user id of a connection.
///
/// Stays the same for the whole connection, even when the player's
/// storage slot is reused by somebody else later on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct UserId(pub i32);

impl std::fmt::Display for UserId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<i32> for UserId {
    fn from(value: i32) -> Self {
        Self(value)
    }
}

/// Persistent platform identifier (SteamID64 / xuid).
///
/// Zero means "not assigned yet"; bots and freshly connected players carry it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SteamId(pub u64);

impl SteamId {
    /// The unassigned id
    pub const NONE: Self = Self(0);

    /// Whether the id has not been assigned
    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Account id part of the SteamID64 (lower 32 bits)
    pub fn account_id(&self) -> u32 {
        (self.0 & 0xFFFF_FFFF) as u32
    }
}

impl std::fmt::Display for SteamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for SteamId {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

/// 3D vector (world position, velocity, etc.)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Vec3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0, z: 0.0 };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    pub fn length(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn distance(&self, other: &Self) -> f32 {
        Vec3::new(self.x - other.x, self.y - other.y, self.z - other.z).length()
    }
}

impl Default for Vec3 {
    fn default() -> Self {
        Self::ZERO
    }
}

impl std::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({:.1}, {:.1}, {:.1})", self.x, self.y, self.z)
    }
}
