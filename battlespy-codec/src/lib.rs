#![warn(missing_docs)]
//! The frame codec (C7): splits a raw TCP byte stream into protocol frames
//! on the 4-NUL delimiter and recognises the title tag, per §6/§4.6.
//!
//! A valid frame is the UTF-8 sequence
//! `"battlefield2\0\0\0<validate:8 bytes><filter>\0<field1>\<field2>\...\0"`;
//! frames are separated on the wire by the 4-byte sequence `\0\0\0\0`. This
//! codec only recognises where one frame ends and the next begins, and
//! filters out frames that don't start with the title tag — it does not
//! interpret a frame's internal structure (that's `battlespy-server`'s
//! Session).

use bytes::{Buf, Bytes, BytesMut};
use tokio_util::codec::{Decoder, Encoder};

/// The title tag this core's default configuration recognises.
pub const BATTLEFIELD2_TAG: &[u8] = b"battlefield2";

/// The wire frame delimiter: four NUL bytes.
const DELIMITER: &[u8] = b"\0\0\0\0";

/// One recognised request frame: the raw bytes between two delimiters,
/// already confirmed to start with the configured title tag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame(pub Bytes);

impl Frame {
    /// The frame's bytes, including the leading title tag.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// Splits a byte stream into [`Frame`]s on the 4-NUL delimiter, silently
/// dropping any frame that doesn't start with `title_tag` (§4.6: "frames not
/// matching the title tag are silently ignored").
pub struct FrameCodec {
    title_tag: Bytes,
}

impl FrameCodec {
    /// A codec recognising the given title tag, e.g. [`BATTLEFIELD2_TAG`].
    pub fn new(title_tag: impl Into<Bytes>) -> Self {
        Self {
            title_tag: title_tag.into(),
        }
    }
}

impl Default for FrameCodec {
    fn default() -> Self {
        Self::new(BATTLEFIELD2_TAG)
    }
}

impl Decoder for FrameCodec {
    type Item = Frame;
    type Error = std::io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        loop {
            let pos = match memchr::memmem::find(src, DELIMITER) {
                Some(pos) => pos,
                None => return Ok(None),
            };

            let frame_bytes = src.split_to(pos).freeze();
            src.advance(DELIMITER.len());

            if frame_bytes.starts_with(&self.title_tag) {
                return Ok(Some(Frame(frame_bytes)));
            }

            tracing::debug!(len = frame_bytes.len(), "dropping frame with unrecognised title tag");
        }
    }

    /// The wire request (§6) carries no trailing 4-NUL delimiter — the client
    /// sends one frame and half-closes. `decode` alone never surfaces that
    /// final frame since it never finds a closing [`DELIMITER`], so on EOF we
    /// take whatever's left in `src` as the last frame, matching it against
    /// the title tag exactly as `decode` does.
    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<Frame>, Self::Error> {
        if let Some(frame) = self.decode(src)? {
            return Ok(Some(frame));
        }
        if src.is_empty() {
            return Ok(None);
        }

        let frame_bytes = src.split_to(src.len()).freeze();
        if frame_bytes.starts_with(&self.title_tag) {
            Ok(Some(Frame(frame_bytes)))
        } else {
            tracing::debug!(len = frame_bytes.len(), "dropping final frame with unrecognised title tag");
            Ok(None)
        }
    }
}

impl Encoder<Bytes> for FrameCodec {
    type Error = std::io::Error;

    /// The response is a raw enctypex-wrapped blob with no further framing
    /// (§6): written verbatim, followed by connection close.
    fn encode(&mut self, item: Bytes, dst: &mut BytesMut) -> Result<(), Self::Error> {
        dst.extend_from_slice(&item);
        Ok(())
    }
}
