//! demoscope-parsers
//!
//! Decoder for Source engine `HL2DEMO` replay files.
//!
//! # Components
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`bitreader`] | Little-endian bit cursor with nested sized chunks |
//! | [`dem`] | Header reader, frame decoder, tick reconciliation and the [`DemoParser`] driver |
//! | [`events`] | Synchronous event fan-out to registered listeners |
//! | [`queue`] | Decoded-message stream and the completion signal |
//! | [`logging`] | `tracing` subscriber setup |
//!
//! # Example
//!
//! ```rust,no_run
//! use demoscope_parsers::{DemoEvent, DemoParser};
//!
//! let data = std::fs::read("match.dem")?;
//! let mut parser = DemoParser::new(&data);
//!
//! parser.register_handler(|event| {
//!     if let DemoEvent::PlayerIdentified { player, .. } = event {
//!         println!("{} ({})", player.name, player.steam_id);
//!     }
//! });
//!
//! let header = parser.parse_header()?;
//! println!("Map: {}", header.map_name);
//! parser.parse_to_end()?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

pub mod bitreader;
pub mod dem;
pub mod events;
pub mod logging;
pub mod queue;
pub mod traits;

// Re-export main types
pub use traits::{Fault, ParseError, ParseResult, ParserConfig};

pub use bitreader::BitReader;

pub use dem::{
    CancelHandle, DemoCommand, DemoHeader, DemoParser, DemoWriter, FrameHandlers, FrameInfo,
    GameState, Player, PlayerHandle, SkipHandlers,
};

pub use events::{DemoEvent, EventDispatcher, ListenerId};

pub use queue::{Completion, DecodedMessage, MessageSink, MessageStream};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
