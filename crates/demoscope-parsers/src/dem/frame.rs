//! Frame decoding: command tag, routing metadata and payload dispatch.

use serde::{Deserialize, Serialize};

use crate::bitreader::BitReader;
use crate::queue::MessageSink;
use crate::traits::{Fault, ParseError, ParseResult};

use super::handlers::{FrameHandlers, FrameInfo};
use super::state::ParserState;

/// Demo commands (frame kinds)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum DemoCommand {
    /// Handshake packet, before the client is fully connected
    Signon = 1,
    /// Network packet
    Packet = 2,
    /// Client clock sync marker
    SyncTick = 3,
    ConsoleCommand = 4,
    UserCommand = 5,
    DataTables = 6,
    /// Last frame in the demo
    Stop = 7,
    /// Plugin data, not decoded
    CustomData = 8,
    StringTables = 9,
}

impl DemoCommand {
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(DemoCommand::Signon),
            2 => Some(DemoCommand::Packet),
            3 => Some(DemoCommand::SyncTick),
            4 => Some(DemoCommand::ConsoleCommand),
            5 => Some(DemoCommand::UserCommand),
            6 => Some(DemoCommand::DataTables),
            7 => Some(DemoCommand::Stop),
            8 => Some(DemoCommand::CustomData),
            9 => Some(DemoCommand::StringTables),
            _ => None,
        }
    }

    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

impl TryFrom<u8> for DemoCommand {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        DemoCommand::from_u8(value).ok_or(value)
    }
}

/// Decode one frame. Returns `Ok(false)` for the stop frame.
///
/// The frame counter and ingame tick are updated before the payload is
/// looked at, whatever the command turns out to be.
pub(crate) fn decode_frame<H: FrameHandlers>(
    reader: &mut BitReader<'_>,
    state: &mut ParserState,
    handlers: &mut H,
    sink: &mut MessageSink,
) -> Result<bool, Fault> {
    let (tag, ingame_tick) = read_routing(reader).map_err(|e| Fault::TruncatedFrame {
        frame: state.current_frame + 1,
        message: e.to_string(),
    })?;

    state.ingame_tick = ingame_tick;
    state.current_frame += 1;

    let command = DemoCommand::from_u8(tag).ok_or(Fault::UnknownCommand {
        command: tag,
        frame: state.current_frame,
    })?;

    let info = FrameInfo {
        frame: state.current_frame,
        ingame_tick,
        command,
    };
    tracing::trace!(frame = info.frame, tick = ingame_tick, ?command, "Decoding frame");

    dispatch(reader, state, handlers, sink, info).map_err(|e| Fault::CorruptFrame {
        frame: info.frame,
        command,
        message: e.to_string(),
    })
}

fn read_routing(reader: &mut BitReader<'_>) -> ParseResult<(u8, i32)> {
    let tag = reader.read_single_byte()?;
    let ingame_tick = reader.read_signed_int(32)?;
    // Player slot, only meaningful for split-screen recordings
    reader.read_single_byte()?;
    Ok((tag, ingame_tick))
}

fn dispatch<H: FrameHandlers>(
    reader: &mut BitReader<'_>,
    state: &mut ParserState,
    handlers: &mut H,
    sink: &mut MessageSink,
    info: FrameInfo,
) -> ParseResult<bool> {
    match info.command {
        DemoCommand::SyncTick => {}

        DemoCommand::Stop => return Ok(false),

        DemoCommand::ConsoleCommand => skip_sized_chunk(reader)?,

        DemoCommand::DataTables => {
            reader.begin_sized_chunk()?;
            handlers.parse_data_tables(reader, &mut state.game)?;
            reader.end_chunk()?;

            handlers.map_equipment(&mut state.game);
            handlers.bind_entities(&mut state.game);
        }

        DemoCommand::StringTables => handlers.parse_string_tables(reader, &mut state.game)?,

        DemoCommand::UserCommand => {
            // Outgoing sequence number
            reader.read_int(32)?;
            skip_sized_chunk(reader)?;
        }

        DemoCommand::Signon | DemoCommand::Packet => {
            handlers.parse_packet(reader, &mut state.game, sink, info)?
        }

        DemoCommand::CustomData => {
            state.custom_data_frames += 1;
            tracing::warn!(frame = info.frame, tick = info.ingame_tick, "Found CustomData frame but not handled");
        }
    }
    Ok(true)
}

fn skip_sized_chunk(reader: &mut BitReader<'_>) -> Result<(), ParseError> {
    reader.begin_sized_chunk()?;
    reader.end_chunk()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::handlers::SkipHandlers;
    use crate::queue::Completion;

    struct Decoder {
        state: ParserState,
        handlers: RecordingHandlers,
        sink: MessageSink,
    }

    #[derive(Default)]
    struct RecordingHandlers {
        calls: Vec<&'static str>,
        inner: SkipHandlers,
    }

    impl FrameHandlers for RecordingHandlers {
        fn parse_packet(
            &mut self,
            reader: &mut BitReader<'_>,
            game: &mut crate::dem::GameState,
            sink: &mut MessageSink,
            info: FrameInfo,
        ) -> ParseResult<()> {
            self.calls.push(match info.command {
                DemoCommand::Signon => "signon",
                _ => "packet",
            });
            self.inner.parse_packet(reader, game, sink, info)
        }

        fn parse_data_tables(
            &mut self,
            reader: &mut BitReader<'_>,
            _game: &mut crate::dem::GameState,
        ) -> ParseResult<()> {
            self.calls.push("data_tables");
            // Read only part of the dump; the chunk must skip the rest
            reader.read_single_byte()?;
            Ok(())
        }

        fn parse_string_tables(
            &mut self,
            reader: &mut BitReader<'_>,
            game: &mut crate::dem::GameState,
        ) -> ParseResult<()> {
            self.calls.push("string_tables");
            self.inner.parse_string_tables(reader, game)
        }

        fn map_equipment(&mut self, _game: &mut crate::dem::GameState) {
            self.calls.push("map_equipment");
        }

        fn bind_entities(&mut self, _game: &mut crate::dem::GameState) {
            self.calls.push("bind_entities");
        }
    }

    impl Decoder {
        fn new() -> Self {
            Self {
                state: ParserState::new(4),
                handlers: RecordingHandlers::default(),
                sink: MessageSink::new(Completion::new()),
            }
        }

        fn decode(&mut self, data: &[u8]) -> (Result<bool, Fault>, usize) {
            let mut reader = BitReader::new(data);
            let result = decode_frame(&mut reader, &mut self.state, &mut self.handlers, &mut self.sink);
            (result, reader.byte_position())
        }
    }

    fn frame(command: u8, tick: i32, body: &[u8]) -> Vec<u8> {
        let mut data = vec![command];
        data.extend_from_slice(&tick.to_le_bytes());
        data.push(0);
        data.extend_from_slice(body);
        data
    }

    fn sized(body: &[u8]) -> Vec<u8> {
        let mut data = (body.len() as i32).to_le_bytes().to_vec();
        data.extend_from_slice(body);
        data
    }

    #[test]
    fn test_command_from_u8() {
        assert_eq!(DemoCommand::from_u8(7), Some(DemoCommand::Stop));
        assert_eq!(DemoCommand::try_from(9), Ok(DemoCommand::StringTables));
        assert_eq!(DemoCommand::try_from(0), Err(0));
        assert_eq!(DemoCommand::from_u8(10), None);
        assert_eq!(DemoCommand::CustomData.as_u8(), 8);
    }

    #[test]
    fn test_synctick_is_noop() {
        let mut decoder = Decoder::new();
        let (result, consumed) = decoder.decode(&frame(3, 55, &[]));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6);
        assert_eq!(decoder.state.ingame_tick, 55);
        assert_eq!(decoder.state.current_frame, 1);
    }

    #[test]
    fn test_stop_returns_false() {
        let mut decoder = Decoder::new();
        let (result, _) = decoder.decode(&frame(7, 900, &[]));

        assert_eq!(result, Ok(false));
        assert_eq!(decoder.state.current_frame, 1);
        assert_eq!(decoder.state.ingame_tick, 900);
    }

    #[test]
    fn test_console_command_skipped() {
        let mut decoder = Decoder::new();
        let body = sized(b"say hello\0");
        let (result, consumed) = decoder.decode(&frame(4, 1, &body));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6 + body.len());
        assert!(decoder.handlers.calls.is_empty());
    }

    #[test]
    fn test_user_command_skipped() {
        let mut decoder = Decoder::new();
        let mut body = 77i32.to_le_bytes().to_vec();
        body.extend_from_slice(&sized(&[1, 2, 3, 4, 5]));
        let (result, consumed) = decoder.decode(&frame(5, 1, &body));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6 + 4 + 4 + 5);
    }

    #[test]
    fn test_data_tables_then_follow_up_steps() {
        let mut decoder = Decoder::new();
        let body = sized(&[0xAA; 16]);
        let (result, consumed) = decoder.decode(&frame(6, 1, &body));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6 + body.len());
        assert_eq!(
            decoder.handlers.calls,
            vec!["data_tables", "map_equipment", "bind_entities"]
        );
    }

    #[test]
    fn test_string_tables_routed() {
        let mut decoder = Decoder::new();
        let body = sized(&[1, 2, 3]);
        let (result, consumed) = decoder.decode(&frame(9, 1, &body));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6 + body.len());
        assert_eq!(decoder.handlers.calls, vec!["string_tables"]);
    }

    #[test]
    fn test_signon_and_packet_share_handler() {
        let mut decoder = Decoder::new();
        let mut body = vec![0u8; 160];
        body.extend_from_slice(&sized(&[4, 2]));

        assert_eq!(decoder.decode(&frame(1, 0, &body)).0, Ok(true));
        assert_eq!(decoder.decode(&frame(2, 1, &body)).0, Ok(true));
        assert_eq!(decoder.handlers.calls, vec!["signon", "packet"]);
    }

    #[test]
    fn test_custom_data_is_not_fatal() {
        let mut decoder = Decoder::new();
        let (result, consumed) = decoder.decode(&frame(8, 3, &[]));

        assert_eq!(result, Ok(true));
        assert_eq!(consumed, 6);
        assert_eq!(decoder.state.custom_data_frames, 1);
        assert_eq!(decoder.state.current_frame, 1);
    }

    #[test]
    fn test_unknown_command_is_a_fault() {
        let mut decoder = Decoder::new();
        let (result, _) = decoder.decode(&frame(42, 17, &[]));

        assert_eq!(result, Err(Fault::UnknownCommand { command: 42, frame: 1 }));
        assert_eq!(decoder.state.current_frame, 1);
        assert_eq!(decoder.state.ingame_tick, 17);
    }

    #[test]
    fn test_truncated_payload_is_a_fault() {
        let mut decoder = Decoder::new();
        let (result, _) = decoder.decode(&frame(4, 1, &100i32.to_le_bytes()));

        match result {
            Err(Fault::CorruptFrame { frame, command, .. }) => {
                assert_eq!(frame, 1);
                assert_eq!(command, DemoCommand::ConsoleCommand);
            }
            other => panic!("Expected CorruptFrame, got {:?}", other),
        }
    }

    #[test]
    fn test_empty_input_is_a_fault() {
        let mut decoder = Decoder::new();
        let (result, _) = decoder.decode(&[]);

        assert!(matches!(result, Err(Fault::TruncatedFrame { frame: 1, .. })));
        assert_eq!(decoder.state.current_frame, 0);
    }
}
