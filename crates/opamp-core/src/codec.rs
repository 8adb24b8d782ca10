//! WebSocket frame codec.
//!
//! Every OpAMP message carried over WebSocket is a binary frame holding a
//! varint header followed by the protobuf payload. The only header value
//! defined by the protocol is `0`.

use prost::Message;

/// The only header value this codec writes or accepts.
pub const FRAME_HEADER: u64 = 0;

/// Failure decoding a binary frame.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The varint header could not be read.
    #[error("failed to read frame header: {0}")]
    Header(#[source] prost::DecodeError),

    /// The header was readable but not `0`.
    #[error("unsupported frame header {0}")]
    UnsupportedHeader(u64),

    /// The payload is not a valid protobuf message.
    #[error("failed to decode frame payload: {0}")]
    Decode(#[source] prost::DecodeError),
}

/// Encode `msg` into a binary frame.
pub fn encode_frame<M: Message>(msg: &M) -> Vec<u8> {
    let mut buf = Vec::with_capacity(1 + msg.encoded_len());
    prost::encoding::encode_varint(FRAME_HEADER, &mut buf);
    msg.encode_raw(&mut buf);
    buf
}

/// Decode a binary frame into `M`.
pub fn decode_frame<M: Message + Default>(frame: &[u8]) -> Result<M, FrameError> {
    let mut buf = frame;
    let header = prost::encoding::decode_varint(&mut buf).map_err(FrameError::Header)?;
    if header != FRAME_HEADER {
        return Err(FrameError::UnsupportedHeader(header));
    }
    M::decode(buf).map_err(FrameError::Decode)
}
