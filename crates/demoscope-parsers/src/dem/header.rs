//! Demo file header (1072 bytes)
//!
//! ```text
//! offset  size  field
//! 0       8     filestamp "HL2DEMO\0"
//! 8       4     demo protocol (i32)
//! 12      4     network protocol (i32)
//! 16      260   server name
//! 276     260   client name
//! 536     260   map name
//! 796     260   game directory
//! 1056    4     playback time in seconds (f32)
//! 1060    4     playback ticks (i32)
//! 1064    4     playback frames (i32)
//! 1068    4     signon length (i32)
//! ```

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};
use serde::{Deserialize, Serialize};

use crate::bitreader::BitReader;
use crate::traits::{ParseError, ParseResult};

/// Expected filestamp
pub const DEMO_MAGIC: &str = "HL2DEMO";

/// Size of the filestamp field
pub const FILESTAMP_SIZE: usize = 8;

/// Capacity of every string field after the filestamp
pub const MAX_OS_PATH: usize = 260;

/// Total encoded size of the header
pub const HEADER_SIZE: usize = FILESTAMP_SIZE + 2 * 4 + 4 * MAX_OS_PATH + 4 + 3 * 4;

/// Demo header, written once at the start of every demo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DemoHeader {
    pub filestamp: String,
    pub protocol: i32,
    pub network_protocol: i32,
    pub server_name: String,
    pub client_name: String,
    pub map_name: String,
    pub game_directory: String,
    /// Playback duration in seconds
    pub playback_time: f32,
    pub playback_ticks: i32,
    pub playback_frames: i32,
    pub signon_length: i32,
}

impl DemoHeader {
    /// Validate the filestamp, then read the remaining header fields.
    ///
    /// Input that does not start with the filestamp is rejected as
    /// [`ParseError::InvalidFormat`] whatever its length. Consumes exactly
    /// [`HEADER_SIZE`] bytes on success.
    pub fn parse(reader: &mut BitReader<'_>) -> ParseResult<Self> {
        let stamp_len = FILESTAMP_SIZE.min(reader.remaining_bits() / 8);
        let filestamp = reader.read_cstring(stamp_len)?;
        if filestamp != DEMO_MAGIC {
            return Err(ParseError::InvalidFormat {
                expected: DEMO_MAGIC.to_string(),
                found: filestamp,
            });
        }
        if stamp_len < FILESTAMP_SIZE {
            reader.skip_bytes(FILESTAMP_SIZE - stamp_len)?;
        }

        Ok(DemoHeader {
            filestamp,
            protocol: reader.read_signed_int(32)?,
            network_protocol: reader.read_signed_int(32)?,
            server_name: reader.read_cstring(MAX_OS_PATH)?,
            client_name: reader.read_cstring(MAX_OS_PATH)?,
            map_name: reader.read_cstring(MAX_OS_PATH)?,
            game_directory: reader.read_cstring(MAX_OS_PATH)?,
            playback_time: reader.read_float()?,
            playback_ticks: reader.read_signed_int(32)?,
            playback_frames: reader.read_signed_int(32)?,
            signon_length: reader.read_signed_int(32)?,
        })
    }

    /// Encode the header in its on-disk layout.
    ///
    /// Strings longer than their field are cut at the last character
    /// boundary that fits the field capacity.
    pub fn write_to<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        write_fixed_string(writer, &self.filestamp, FILESTAMP_SIZE)?;
        writer.write_i32::<LittleEndian>(self.protocol)?;
        writer.write_i32::<LittleEndian>(self.network_protocol)?;
        write_fixed_string(writer, &self.server_name, MAX_OS_PATH)?;
        write_fixed_string(writer, &self.client_name, MAX_OS_PATH)?;
        write_fixed_string(writer, &self.map_name, MAX_OS_PATH)?;
        write_fixed_string(writer, &self.game_directory, MAX_OS_PATH)?;
        writer.write_f32::<LittleEndian>(self.playback_time)?;
        writer.write_i32::<LittleEndian>(self.playback_ticks)?;
        writer.write_i32::<LittleEndian>(self.playback_frames)?;
        writer.write_i32::<LittleEndian>(self.signon_length)?;
        Ok(())
    }

    /// Frames per second of the recording, 0 if the playback time is unknown
    pub fn frame_rate(&self) -> f32 {
        if self.playback_time == 0.0 {
            0.0
        } else {
            self.playback_frames as f32 / self.playback_time
        }
    }

    /// Server tick rate, 0 if the playback time is unknown
    pub fn tick_rate(&self) -> f32 {
        if self.playback_time == 0.0 {
            0.0
        } else {
            self.playback_ticks as f32 / self.playback_time
        }
    }

    /// Seconds per tick, 0 if the tick count is unknown
    pub fn tick_time(&self) -> f32 {
        if self.playback_ticks == 0 {
            0.0
        } else {
            self.playback_time / self.playback_ticks as f32
        }
    }
}

impl Default for DemoHeader {
    fn default() -> Self {
        Self {
            filestamp: DEMO_MAGIC.to_string(),
            protocol: 4,
            network_protocol: 13_700,
            server_name: String::new(),
            client_name: String::new(),
            map_name: String::new(),
            game_directory: "csgo".to_string(),
            playback_time: 0.0,
            playback_ticks: 0,
            playback_frames: 0,
            signon_length: 0,
        }
    }
}

fn write_fixed_string<W: Write>(writer: &mut W, value: &str, capacity: usize) -> std::io::Result<()> {
    let mut len = value.len().min(capacity);
    while !value.is_char_boundary(len) {
        len -= 1;
    }
    writer.write_all(&value.as_bytes()[..len])?;
    writer.write_all(&vec![0u8; capacity - len])
}
