//! Management-channel frame codec.
//!
//! Frames are line-oriented: the fixed [`FRAME_HEADER`] literal opens a
//! frame, `Key: Value` lines populate its field map, and a blank line closes
//! it. The grammar is strict: any line matching none of those three shapes
//! is a protocol violation that is fatal to the session, since the peer is
//! an unmodified external worker whose framing must match byte-for-byte.
//!
//! [`FrameDecoder`] is the pure two-state machine. [`MgmtCodec`] layers it
//! over [`LinesCodec`] for use with
//! [`tokio_util::codec::FramedRead`] on the control socket.
//! [`encode_command`] is the structural inverse, used to inject runtime
//! commands into a running session's channel.

use std::collections::BTreeMap;

use bytes::BytesMut;
use tokio_util::codec::{Decoder, LinesCodec, LinesCodecError};

use crate::mgmt::event::{denormalize_key, Event};
use crate::{AppError, Result};

/// Header literal opening every management frame.
pub const FRAME_HEADER: &str = "FASPMGR 2";

/// Maximum line length accepted on the control channel: 1 MiB.
///
/// Longer lines cause a protocol error rather than unbounded allocation for
/// a single message.
pub const MAX_LINE_BYTES: usize = 1_048_576;

/// Strict two-state frame machine: no-open-frame / open-frame.
#[derive(Debug, Default)]
pub struct FrameDecoder {
    fields: Option<BTreeMap<String, String>>,
}

impl FrameDecoder {
    /// Create a decoder with no open frame.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a frame is currently open.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.fields.is_some()
    }

    /// Feed one line (without its terminator) into the machine.
    ///
    /// Returns `Ok(Some(event))` when the line closes a frame, `Ok(None)`
    /// when the frame is still being assembled.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Protocol` on a header inside an open frame, a
    /// field or terminator line outside any frame, or a line matching no
    /// known shape. Protocol errors are fatal to the session.
    pub fn feed_line(&mut self, line: &str) -> Result<Option<Event>> {
        if line == FRAME_HEADER {
            if self.fields.is_some() {
                return Err(AppError::Protocol(
                    "frame header received while a frame is already open".into(),
                ));
            }
            self.fields = Some(BTreeMap::new());
            return Ok(None);
        }

        if line.is_empty() {
            return match self.fields.take() {
                Some(fields) => Ok(Some(Event { fields })),
                None => Err(AppError::Protocol(
                    "frame terminator received with no open frame".into(),
                )),
            };
        }

        if let Some((key, rest)) = line.split_once(':') {
            if key.is_empty() {
                return Err(AppError::Protocol(format!(
                    "management line with empty field key: {line}"
                )));
            }
            let Some(fields) = self.fields.as_mut() else {
                return Err(AppError::Protocol(format!(
                    "field line received with no open frame: {line}"
                )));
            };
            let value = rest.strip_prefix(' ').unwrap_or(rest);
            // Last write wins on duplicate keys.
            fields.insert(key.to_owned(), value.to_owned());
            return Ok(None);
        }

        Err(AppError::Protocol(format!(
            "unrecognized management line: {line}"
        )))
    }
}

/// Frame codec for the control socket: line framing plus the frame machine.
#[derive(Debug)]
pub struct MgmtCodec {
    lines: LinesCodec,
    frames: FrameDecoder,
}

impl MgmtCodec {
    /// Create a codec with the default [`MAX_LINE_BYTES`] limit.
    #[must_use]
    pub fn new() -> Self {
        Self {
            lines: LinesCodec::new_with_max_length(MAX_LINE_BYTES),
            frames: FrameDecoder::new(),
        }
    }
}

impl Default for MgmtCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for MgmtCodec {
    type Item = Event;
    type Error = AppError;

    /// Decode the next complete frame from `src`.
    ///
    /// Returns `Ok(None)` while no frame has closed yet (buffering).
    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        while let Some(line) = self.lines.decode(src).map_err(map_codec_error)? {
            if let Some(event) = self.frames.feed_line(line.trim_end_matches('\r'))? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }

    /// Decode any final frame when the stream reaches EOF.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Event>> {
        while let Some(line) = self.lines.decode_eof(src).map_err(map_codec_error)? {
            if let Some(event) = self.frames.feed_line(line.trim_end_matches('\r'))? {
                return Ok(Some(event));
            }
        }
        Ok(None)
    }
}

/// Encode an outbound runtime command as a management frame.
///
/// Structural inverse of decoding: each key is capitalized to its wire form,
/// the `Key: Value` lines are framed by the header line and two trailing
/// blank lines.
#[must_use]
pub fn encode_command(fields: &BTreeMap<String, String>) -> String {
    let mut out = String::with_capacity(64);
    out.push_str(FRAME_HEADER);
    out.push('\n');
    for (key, value) in fields {
        out.push_str(&denormalize_key(key));
        out.push_str(": ");
        out.push_str(value);
        out.push('\n');
    }
    out.push('\n');
    out.push('\n');
    out
}

/// Map a [`LinesCodecError`] into the application error family.
fn map_codec_error(err: LinesCodecError) -> AppError {
    match err {
        LinesCodecError::MaxLineLengthExceeded => AppError::Protocol(format!(
            "management line too long: exceeded {MAX_LINE_BYTES} bytes"
        )),
        LinesCodecError::Io(io_err) => AppError::Io(io_err.to_string()),
    }
}
