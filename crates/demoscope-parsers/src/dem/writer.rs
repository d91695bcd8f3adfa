//! Demo writer.
//!
//! [`DemoWriter`] streams a header and frames to any `Write` sink using the
//! same layout the parser reads. Useful for fixtures and for cutting demos.

use std::io::Write;

use byteorder::{LittleEndian, WriteBytesExt};

use super::frame::DemoCommand;
use super::handlers::{PACKET_COMMAND_INFO_SIZE, PACKET_SEQUENCE_INFO_SIZE};
use super::header::DemoHeader;

/// Writes demo data to a byte stream.
///
/// # Examples
///
/// ```
/// use demoscope_parsers::{DemoHeader, DemoParser, DemoWriter};
///
/// let mut writer = DemoWriter::new(Vec::new(), &DemoHeader::default()).unwrap();
/// writer.write_sync_tick(1).unwrap();
/// writer.write_stop(2).unwrap();
/// let data = writer.into_inner();
///
/// let mut parser = DemoParser::new(&data);
/// parser.parse_header().unwrap();
/// parser.parse_to_end().unwrap();
/// assert_eq!(parser.current_frame(), 2);
/// ```
pub struct DemoWriter<W: Write> {
    writer: W,
    frames_written: u32,
}

impl<W: Write> DemoWriter<W> {
    /// Create a writer, immediately writing the header
    pub fn new(mut writer: W, header: &DemoHeader) -> std::io::Result<Self> {
        header.write_to(&mut writer)?;
        Ok(Self {
            writer,
            frames_written: 0,
        })
    }

    /// Write the command tag, ingame tick and player slot of a frame
    pub fn write_frame_header(&mut self, command: u8, ingame_tick: i32) -> std::io::Result<()> {
        self.writer.write_u8(command)?;
        self.writer.write_i32::<LittleEndian>(ingame_tick)?;
        self.writer.write_u8(0)?;
        self.frames_written += 1;
        Ok(())
    }

    fn write_sized(&mut self, payload: &[u8]) -> std::io::Result<()> {
        self.writer.write_i32::<LittleEndian>(payload.len() as i32)?;
        self.writer.write_all(payload)
    }

    pub fn write_sync_tick(&mut self, ingame_tick: i32) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::SyncTick.as_u8(), ingame_tick)
    }

    pub fn write_stop(&mut self, ingame_tick: i32) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::Stop.as_u8(), ingame_tick)
    }

    pub fn write_console_command(&mut self, ingame_tick: i32, command: &str) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::ConsoleCommand.as_u8(), ingame_tick)?;
        let mut payload = command.as_bytes().to_vec();
        payload.push(0);
        self.write_sized(&payload)
    }

    pub fn write_user_command(
        &mut self,
        ingame_tick: i32,
        sequence: i32,
        payload: &[u8],
    ) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::UserCommand.as_u8(), ingame_tick)?;
        self.writer.write_i32::<LittleEndian>(sequence)?;
        self.write_sized(payload)
    }

    pub fn write_data_tables(&mut self, ingame_tick: i32, payload: &[u8]) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::DataTables.as_u8(), ingame_tick)?;
        self.write_sized(payload)
    }

    pub fn write_string_tables(&mut self, ingame_tick: i32, payload: &[u8]) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::StringTables.as_u8(), ingame_tick)?;
        self.write_sized(payload)
    }

    /// Write a packet (or signon) frame with zeroed command and sequence info
    pub fn write_packet(
        &mut self,
        command: DemoCommand,
        ingame_tick: i32,
        payload: &[u8],
    ) -> std::io::Result<()> {
        self.write_frame_header(command.as_u8(), ingame_tick)?;
        self.writer
            .write_all(&[0u8; PACKET_COMMAND_INFO_SIZE + PACKET_SEQUENCE_INFO_SIZE])?;
        self.write_sized(payload)
    }

    /// Write a custom-data frame; its payload is never read back
    pub fn write_custom_data(&mut self, ingame_tick: i32) -> std::io::Result<()> {
        self.write_frame_header(DemoCommand::CustomData.as_u8(), ingame_tick)
    }

    pub fn flush(&mut self) -> std::io::Result<()> {
        self.writer.flush()
    }

    /// Number of frames written so far
    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Consume the writer and return the underlying `Write` sink
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dem::header::HEADER_SIZE;

    #[test]
    fn test_frame_sizes() {
        let mut writer = DemoWriter::new(Vec::new(), &DemoHeader::default()).unwrap();
        writer.write_sync_tick(0).unwrap();
        assert_eq!(writer.writer.len(), HEADER_SIZE + 6);

        writer.write_console_command(1, "echo").unwrap();
        assert_eq!(writer.writer.len(), HEADER_SIZE + 6 + 6 + 4 + 5);

        writer.write_packet(DemoCommand::Packet, 2, &[1, 2, 3]).unwrap();
        assert_eq!(writer.frames_written(), 3);
        assert_eq!(
            writer.into_inner().len(),
            HEADER_SIZE + 6 + 15 + 6 + 160 + 4 + 3
        );
    }

    #[test]
    fn test_frame_header_layout() {
        let mut writer = DemoWriter::new(Vec::new(), &DemoHeader::default()).unwrap();
        writer.write_stop(0x0102_0304).unwrap();
        let data = writer.into_inner();

        assert_eq!(&data[HEADER_SIZE..], &[7, 0x04, 0x03, 0x02, 0x01, 0]);
    }
}
