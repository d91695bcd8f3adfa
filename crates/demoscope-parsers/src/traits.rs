// demoscope-parsers/src/traits.rs
//! Error types and configuration shared by every part of the demo parser.
//!
//! Errors come in two categories:
//! - [`ParseError`]: ordinary, returned results (bad file type, truncated
//!   header, cancellation). The caller decides what to do next.
//! - [`Fault`]: the stream framing can no longer be trusted. A session that
//!   produced a fault is poisoned and never decodes another byte.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::dem::DemoCommand;

/// Errors that can occur during parsing operations
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid file type: expected {expected:?} in the first 8 bytes, found {found:?}")]
    InvalidFormat { expected: String, found: String },

    #[error("Unexpected end of data at bit {position}: requested {requested} bits, {available} available")]
    UnexpectedEof {
        position: usize,
        requested: usize,
        available: usize,
    },

    #[error("Chunk overrun: read up to bit {position} but chunk ends at bit {end}")]
    ChunkOverrun { position: usize, end: usize },

    #[error("Invalid structure: {0}")]
    InvalidStructure(String),

    #[error("Header has already been parsed")]
    HeaderAlreadyParsed,

    #[error("Parsing was cancelled before it finished")]
    Cancelled,

    #[error(transparent)]
    Fault(#[from] Fault),

    #[error("Nested error in {context}: {source}")]
    Nested {
        context: String,
        #[source]
        source: Box<ParseError>,
    },
}

impl ParseError {
    /// Wrap this error with additional context
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ParseError::Nested {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Whether this error ended the session for good.
    ///
    /// Fatal errors must not be retried: the stream position is undefined.
    pub fn is_fatal(&self) -> bool {
        match self {
            ParseError::Fault(_) => true,
            ParseError::Nested { source, .. } => source.is_fatal(),
            _ => false,
        }
    }
}

/// Result type alias for parsing operations
pub type ParseResult<T> = Result<T, ParseError>;

/// Loss of stream synchronization.
///
/// Returned by [`DemoParser::parse_next_frame`](crate::DemoParser::parse_next_frame)
/// and wrapped in [`ParseError::Fault`] by `parse_to_end`. Once raised, the
/// parser keeps returning the same fault.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    #[error("Unknown demo command {command} in frame {frame}; stream framing lost")]
    UnknownCommand { command: u8, frame: u32 },

    #[error("Frame {frame} ends before its command header: {message}")]
    TruncatedFrame { frame: u32, message: String },

    #[error("Frame {frame} ({command:?}) could not be decoded: {message}")]
    CorruptFrame {
        frame: u32,
        command: DemoCommand,
        message: String,
    },
}

impl Fault {
    /// Frame number the fault was raised in
    pub fn frame(&self) -> u32 {
        match self {
            Fault::UnknownCommand { frame, .. }
            | Fault::TruncatedFrame { frame, .. }
            | Fault::CorruptFrame { frame, .. } => *frame,
        }
    }
}

/// Configuration options for a parser session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Number of player slots tracked per tick
    pub max_players: usize,
    /// Capacity of the decoded-message queue (`None` = unbounded).
    /// Decoding never waits on a full queue; overflowing messages are dropped.
    pub message_queue_capacity: Option<usize>,
    /// Whether the packet handler forwards packet payloads to the message queue
    pub forward_packets: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            max_players: 64,
            message_queue_capacity: None,
            forward_packets: true,
        }
    }
}
