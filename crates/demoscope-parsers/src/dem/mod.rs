// demoscope-parsers/src/dem/mod.rs
//! Source engine demo (`.dem`) parser
//!
//! A demo is a fixed-size header followed by a flat sequence of frames. Each
//! frame starts with a command tag; the rest of the frame is only understood
//! by the decoder for that command, so a single unknown tag makes the rest
//! of the stream unreadable.
//!
//! # Format Structure
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      DEM File Structure                     │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                  Header (1072 bytes)                    ││
//! │  │  - Filestamp "HL2DEMO"                                  ││
//! │  │  - Protocol versions, server/client/map names           ││
//! │  │  - Playback time, ticks, frames, signon length          ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │                   Frame (repeated)                      ││
//! │  │  - Command (u8)                                         ││
//! │  │  - Ingame tick (i32)                                    ││
//! │  │  - Player slot (u8)                                     ││
//! │  │  - Command specific payload                             ││
//! │  └─────────────────────────────────────────────────────────┘│
//! │  ┌─────────────────────────────────────────────────────────┐│
//! │  │               Stop frame (command 7)                    ││
//! │  └─────────────────────────────────────────────────────────┘│
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod frame;
mod handlers;
mod header;
mod reconcile;
mod state;
mod writer;

pub use frame::DemoCommand;
pub use handlers::{
    FrameHandlers, FrameInfo, SkipHandlers, PACKET_COMMAND_INFO_SIZE, PACKET_SEQUENCE_INFO_SIZE,
};
pub use header::{DemoHeader, DEMO_MAGIC, FILESTAMP_SIZE, HEADER_SIZE, MAX_OS_PATH};
pub use reconcile::reconcile_tick;
pub use state::{
    AdditionalPlayerInfo, ConnectedRegistry, GameState, ParserState, Player, PlayerArena,
    PlayerHandle, RawSlot,
};
pub use writer::DemoWriter;

use crossbeam_channel::{Receiver, Sender, TryRecvError};

use crate::bitreader::BitReader;
use crate::events::{DemoEvent, EventDispatcher, ListenerId};
use crate::queue::{Completion, MessageSink, MessageStream};
use crate::traits::{Fault, ParseError, ParseResult, ParserConfig};

/// Requests cancellation of a running parse from any thread
#[derive(Debug, Clone)]
pub struct CancelHandle {
    tx: Sender<()>,
}

impl CancelHandle {
    /// Ask the parser to stop before its next frame.
    ///
    /// Never blocks. Repeated requests before the parser reacts collapse
    /// into one.
    pub fn cancel(&self) {
        let _ = self.tx.try_send(());
    }
}

/// Demo parser session.
///
/// Owns the read cursor and all session state. Decoding happens on the
/// thread that calls [`parse_to_end`](DemoParser::parse_to_end) or
/// [`parse_next_frame`](DemoParser::parse_next_frame); other threads interact
/// only through a [`CancelHandle`], a [`MessageStream`] or a [`Completion`].
pub struct DemoParser<'a, H = SkipHandlers> {
    reader: BitReader<'a>,
    state: ParserState,
    handlers: H,
    dispatcher: EventDispatcher,
    sink: MessageSink,
    completion: Completion,
    cancel_tx: Sender<()>,
    cancel_rx: Receiver<()>,
    config: ParserConfig,
    finished: bool,
    fault: Option<Fault>,
}

impl<'a> DemoParser<'a, SkipHandlers> {
    /// Create a parser with default configuration that skips all payloads
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_config(data, ParserConfig::default())
    }

    /// Create a parser that skips all payloads
    pub fn with_config(data: &'a [u8], config: ParserConfig) -> Self {
        let handlers = SkipHandlers::new(config.forward_packets);
        Self::with_handlers(data, handlers, config)
    }
}

impl<'a, H: FrameHandlers> DemoParser<'a, H> {
    /// Create a parser that hands payloads to `handlers`
    pub fn with_handlers(data: &'a [u8], handlers: H, config: ParserConfig) -> Self {
        let (cancel_tx, cancel_rx) = crossbeam_channel::bounded(1);
        let completion = Completion::new();
        Self {
            reader: BitReader::new(data),
            state: ParserState::new(config.max_players),
            handlers,
            dispatcher: EventDispatcher::new(),
            sink: MessageSink::new(completion.clone()),
            completion,
            cancel_tx,
            cancel_rx,
            config,
            finished: false,
            fault: None,
        }
    }

    /// Register an event listener
    pub fn register_handler<F>(&mut self, listener: F) -> ListenerId
    where
        F: FnMut(&DemoEvent<'_>) + Send + 'static,
    {
        self.dispatcher.register(listener)
    }

    /// Remove an event listener
    pub fn unregister_handler(&mut self, id: ListenerId) -> bool {
        self.dispatcher.unregister(id)
    }

    /// Open the decoded-message stream.
    ///
    /// Only one stream exists per session; later calls return `None`.
    /// Messages produced before the stream is opened are not kept.
    pub fn message_stream(&mut self) -> Option<MessageStream> {
        self.sink.subscribe(self.config.message_queue_capacity)
    }

    /// Signal resolved once the stop frame has been decoded
    pub fn completion(&self) -> Completion {
        self.completion.clone()
    }

    /// Handle for cancelling from another thread
    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: self.cancel_tx.clone(),
        }
    }

    /// Stop [`parse_to_end`](DemoParser::parse_to_end) before the next frame
    pub fn cancel(&self) {
        let _ = self.cancel_tx.try_send(());
    }

    /// Parse and validate the demo header.
    ///
    /// Must be called exactly once, before any frame is decoded. On error
    /// no header is stored and no event is raised.
    pub fn parse_header(&mut self) -> ParseResult<DemoHeader> {
        if self.state.header.is_some() {
            return Err(ParseError::HeaderAlreadyParsed);
        }

        let header = DemoHeader::parse(&mut self.reader)?;
        tracing::info!(
            map = %header.map_name,
            server = %header.server_name,
            protocol = header.protocol,
            network_protocol = header.network_protocol,
            ticks = header.playback_ticks,
            frames = header.playback_frames,
            "Parsed demo header"
        );

        self.state.header = Some(header.clone());
        self.dispatcher.dispatch(&DemoEvent::HeaderParsed {
            header: header.clone(),
        });
        Ok(header)
    }

    /// Parse frames until the stop frame.
    ///
    /// Returns [`ParseError::Cancelled`] if a cancel request is pending at
    /// the start of a frame; a frame that already started always completes.
    /// Framing loss is returned as [`ParseError::Fault`].
    pub fn parse_to_end(&mut self) -> ParseResult<()> {
        loop {
            if self.finished {
                return Ok(());
            }

            match self.cancel_rx.try_recv() {
                Ok(()) => {
                    tracing::info!(frame = self.state.current_frame, "Parsing cancelled");
                    return Err(ParseError::Cancelled);
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => {}
            }

            if !self.parse_next_frame()? {
                return Ok(());
            }

            let total = self.state.header.as_ref().map_or(0, |h| h.playback_frames.max(0));
            crate::logging::log_progress(self.state.current_frame as usize, total as usize);
        }
    }

    /// Decode exactly one frame, reconcile players and raise `TickComplete`.
    ///
    /// Returns `Ok(false)` once the stop frame has been decoded.
    ///
    /// # Panics
    ///
    /// Panics if [`parse_header`](DemoParser::parse_header) has not
    /// succeeded yet.
    pub fn parse_next_frame(&mut self) -> Result<bool, Fault> {
        assert!(
            self.state.header.is_some(),
            "Tried to parse a frame before parsing the header"
        );

        if let Some(fault) = &self.fault {
            return Err(fault.clone());
        }
        if self.finished {
            return Ok(false);
        }

        let more = match frame::decode_frame(
            &mut self.reader,
            &mut self.state,
            &mut self.handlers,
            &mut self.sink,
        ) {
            Ok(more) => more,
            Err(fault) => {
                tracing::error!(error = %fault, "Demo framing lost; aborting session");
                self.sink.abort();
                self.fault = Some(fault.clone());
                return Err(fault);
            }
        };

        reconcile_tick(&mut self.state.game, &mut self.dispatcher);

        if !more {
            self.finished = true;
            self.sink.complete();
            tracing::info!(
                frames = self.state.current_frame,
                tick = self.state.ingame_tick,
                players = self.state.game.connected.len(),
                "Reached end of demo"
            );
        }

        Ok(more)
    }

    pub fn header(&self) -> Option<&DemoHeader> {
        self.state.header.as_ref()
    }

    /// Number of frames decoded so far
    pub fn current_frame(&self) -> u32 {
        self.state.current_frame
    }

    /// Ingame tick of the last decoded frame
    pub fn ingame_tick(&self) -> i32 {
        self.state.ingame_tick
    }

    /// Decoded messages discarded because the bounded queue was full
    pub fn dropped_messages(&self) -> u64 {
        self.sink.dropped()
    }

    /// Custom-data frames skipped so far
    pub fn custom_data_frames(&self) -> u32 {
        self.state.custom_data_frames
    }

    pub fn game_state(&self) -> &GameState {
        &self.state.game
    }

    /// Every player seen so far, in order of first binding
    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.state.game.players.iter().map(|(_, player)| player)
    }

    /// Players registered by user id, ordered by user id
    pub fn connected_players(&self) -> impl Iterator<Item = &Player> {
        self.state
            .game
            .connected
            .iter()
            .map(|(_, handle)| self.state.game.players.get(handle))
    }

    pub fn handlers(&self) -> &H {
        &self.handlers
    }

    pub fn handlers_mut(&mut self) -> &mut H {
        &mut self.handlers
    }

    pub fn config(&self) -> &ParserConfig {
        &self.config
    }

    /// Whether the stop frame has been decoded
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Fault that ended the session, if any
    pub fn fault(&self) -> Option<&Fault> {
        self.fault.as_ref()
    }

    /// Fraction of the frames announced by the header decoded so far
    pub fn progress(&self) -> f32 {
        if self.finished {
            return 1.0;
        }
        match &self.state.header {
            Some(header) if header.playback_frames > 0 => {
                (self.state.current_frame as f32 / header.playback_frames as f32).min(1.0)
            }
            _ => 0.0,
        }
    }
}

impl<H> std::fmt::Debug for DemoParser<'_, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DemoParser")
            .field("position", &self.reader.position())
            .field("frame", &self.state.current_frame)
            .field("ingame_tick", &self.state.ingame_tick)
            .field("finished", &self.finished)
            .field("fault", &self.fault)
            .finish()
    }
}
