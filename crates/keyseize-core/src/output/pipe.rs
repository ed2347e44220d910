// Keyseize Output Layer - Transport Sinks
// Writers that forward decoded key events to the consumer

use std::io::Write;
use std::sync::mpsc::Sender;

use strum_macros::{AsRefStr, Display, EnumString};

use crate::input::KeyEvent;

/// Size of one binary key event record
pub const RECORD_LEN: usize = 16;

/// Error types for transport operations
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Failed to write event: {0}")]
    Io(#[from] std::io::Error),

    #[error("Event consumer disconnected")]
    Disconnected,
}

/// Consumer of decoded key events.
///
/// Called on the monitor thread once per transition; implementations must
/// not block for long since every owned keyboard shares that thread.
pub trait KeySink {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError>;
}

impl<S: KeySink + ?Sized> KeySink for &mut S {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
        (**self).send(event)
    }
}

impl<S: KeySink + ?Sized> KeySink for Box<S> {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
        (**self).send(event)
    }
}

/// Wire format selection for the launcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Display, AsRefStr, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum OutputFormat {
    /// Fixed-size native-endian records (see [`encode_record`])
    #[default]
    Binary,
    /// One human-readable line per event
    Text,
}

/// Encode an event as `u64 state | u32 usage_page | u32 usage`, native endian.
pub fn encode_record(event: &KeyEvent) -> [u8; RECORD_LEN] {
    let mut record = [0u8; RECORD_LEN];
    record[0..8].copy_from_slice(&event.transition.state().to_ne_bytes());
    record[8..12].copy_from_slice(&event.usage_page.to_ne_bytes());
    record[12..16].copy_from_slice(&event.usage.to_ne_bytes());
    record
}

/// Writes one binary record per event, flushing each so a pipe reader sees
/// transitions immediately.
pub struct PipeSink<W: Write> {
    writer: W,
}

impl<W: Write> PipeSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> KeySink for PipeSink<W> {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
        self.writer.write_all(&encode_record(&event))?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Writes `down page=0x07 usage=0x04` style lines
pub struct TextSink<W: Write> {
    writer: W,
}

impl<W: Write> TextSink<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> KeySink for TextSink<W> {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
        writeln!(
            self.writer,
            "{} page={:#04x} usage={:#04x}",
            event.transition, event.usage_page, event.usage
        )?;
        self.writer.flush()?;
        Ok(())
    }
}

/// Forwards events to another thread over a channel
pub struct ChannelSink {
    sender: Sender<KeyEvent>,
}

impl ChannelSink {
    pub fn new(sender: Sender<KeyEvent>) -> Self {
        Self { sender }
    }
}

impl KeySink for ChannelSink {
    fn send(&mut self, event: KeyEvent) -> Result<(), TransportError> {
        self.sender
            .send(event)
            .map_err(|_| TransportError::Disconnected)
    }
}
