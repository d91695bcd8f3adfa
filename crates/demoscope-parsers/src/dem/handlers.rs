//! Payload handlers called by the frame decoder.
//!
//! The frame decoder only knows the outer framing of each demo command. What
//! is inside a packet, a data-table dump or a string-table dump is the job of
//! a [`FrameHandlers`] implementation. [`SkipHandlers`] walks each payload
//! using its on-disk framing without interpreting it, which is enough to run
//! any demo to the end and to feed raw packets to the message queue.

use crate::bitreader::BitReader;
use crate::queue::{DecodedMessage, MessageSink};
use crate::traits::ParseResult;

use super::frame::DemoCommand;
use super::state::GameState;

/// Bytes of per-player command info in front of every packet
/// (split-screen view origins and angles)
pub const PACKET_COMMAND_INFO_SIZE: usize = 152;

/// Two `i32` sequence numbers following the command info
pub const PACKET_SEQUENCE_INFO_SIZE: usize = 8;

/// Position of a frame in the stream, handed to every handler call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameInfo {
    pub frame: u32,
    pub ingame_tick: i32,
    pub command: DemoCommand,
}

/// Decoders for the payloads the frame decoder does not interpret itself.
///
/// Every method must leave the reader at the end of what it consumed;
/// an `Err` means the framing is lost and ends the session.
pub trait FrameHandlers {
    /// Signon and packet frames
    fn parse_packet(
        &mut self,
        reader: &mut BitReader<'_>,
        game: &mut GameState,
        sink: &mut MessageSink,
        info: FrameInfo,
    ) -> ParseResult<()>;

    /// Data-table dump. The reader is confined to the dump; unread bytes are
    /// skipped when the chunk closes.
    fn parse_data_tables(
        &mut self,
        reader: &mut BitReader<'_>,
        game: &mut GameState,
    ) -> ParseResult<()>;

    /// String-table dump, with its own length prefix
    fn parse_string_tables(
        &mut self,
        reader: &mut BitReader<'_>,
        game: &mut GameState,
    ) -> ParseResult<()>;

    /// Runs after a data-table frame, once the dump is fully applied
    fn map_equipment(&mut self, _game: &mut GameState) {}

    /// Runs after [`map_equipment`](FrameHandlers::map_equipment)
    fn bind_entities(&mut self, _game: &mut GameState) {}
}

/// Handlers that skip every payload
#[derive(Debug, Clone)]
pub struct SkipHandlers {
    /// Whether packet payloads are pushed to the message queue
    pub forward_packets: bool,
}

impl SkipHandlers {
    pub fn new(forward_packets: bool) -> Self {
        Self { forward_packets }
    }
}

impl Default for SkipHandlers {
    fn default() -> Self {
        Self::new(true)
    }
}

impl FrameHandlers for SkipHandlers {
    fn parse_packet(
        &mut self,
        reader: &mut BitReader<'_>,
        _game: &mut GameState,
        sink: &mut MessageSink,
        info: FrameInfo,
    ) -> ParseResult<()> {
        reader.skip_bytes(PACKET_COMMAND_INFO_SIZE + PACKET_SEQUENCE_INFO_SIZE)?;
        let length = reader.begin_sized_chunk()?;
        if self.forward_packets && sink.is_subscribed() {
            let payload = reader.read_bytes(length)?;
            sink.push(DecodedMessage {
                frame: info.frame,
                ingame_tick: info.ingame_tick,
                command: info.command,
                payload,
            });
        }
        reader.end_chunk()
    }

    fn parse_data_tables(
        &mut self,
        _reader: &mut BitReader<'_>,
        _game: &mut GameState,
    ) -> ParseResult<()> {
        Ok(())
    }

    fn parse_string_tables(
        &mut self,
        reader: &mut BitReader<'_>,
        _game: &mut GameState,
    ) -> ParseResult<()> {
        reader.begin_sized_chunk()?;
        reader.end_chunk()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::Completion;

    fn packet_bytes(payload: &[u8]) -> Vec<u8> {
        let mut data = vec![0u8; PACKET_COMMAND_INFO_SIZE + PACKET_SEQUENCE_INFO_SIZE];
        data.extend_from_slice(&(payload.len() as i32).to_le_bytes());
        data.extend_from_slice(payload);
        data
    }

    fn info() -> FrameInfo {
        FrameInfo {
            frame: 4,
            ingame_tick: 120,
            command: DemoCommand::Packet,
        }
    }

    #[test]
    fn test_skip_packet_forwards_payload() {
        let data = packet_bytes(&[9, 8, 7]);
        let mut reader = BitReader::new(&data);
        let mut game = GameState::new(4);
        let mut sink = MessageSink::new(Completion::new());
        let stream = sink.subscribe(None).unwrap();

        SkipHandlers::default()
            .parse_packet(&mut reader, &mut game, &mut sink, info())
            .unwrap();

        assert!(reader.chunk_finished());
        let message = stream.try_next().unwrap();
        assert_eq!(message.payload, vec![9, 8, 7]);
        assert_eq!(message.ingame_tick, 120);
    }

    #[test]
    fn test_skip_packet_without_forwarding() {
        let data = packet_bytes(&[1, 2]);
        let mut reader = BitReader::new(&data);
        let mut game = GameState::new(4);
        let mut sink = MessageSink::new(Completion::new());
        let stream = sink.subscribe(None).unwrap();

        SkipHandlers::new(false)
            .parse_packet(&mut reader, &mut game, &mut sink, info())
            .unwrap();

        assert!(reader.chunk_finished());
        assert!(stream.try_next().is_none());
    }

    #[test]
    fn test_skip_string_tables() {
        let mut data = 3i32.to_le_bytes().to_vec();
        data.extend_from_slice(&[1, 2, 3, 0xEE]);
        let mut reader = BitReader::new(&data);
        let mut game = GameState::new(4);

        SkipHandlers::default()
            .parse_string_tables(&mut reader, &mut game)
            .unwrap();

        assert_eq!(reader.read_single_byte().unwrap(), 0xEE);
    }

    #[test]
    fn test_truncated_packet_is_an_error() {
        let data = vec![0u8; 40];
        let mut reader = BitReader::new(&data);
        let mut game = GameState::new(4);
        let mut sink = MessageSink::new(Completion::new());

        assert!(SkipHandlers::default()
            .parse_packet(&mut reader, &mut game, &mut sink, info())
            .is_err());
    }
}
