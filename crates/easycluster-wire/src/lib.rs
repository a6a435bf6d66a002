//! Wire protocol for EasyCluster connections.
//!
//! Every message travels as a frame: a one-byte [`MessageKind`], a
//! big-endian `u32` payload length, the payload, and (when the connection
//! is keyed) a 32-byte HMAC-SHA256 tag. Each direction keeps its own MAC
//! chain: a tag covers the previous tag in that direction as well as the
//! frame, so frames cannot be replayed, dropped or reordered without
//! detection. `ERROR` frames are never signed, which lets either side
//! report a failure even after the chains have diverged.
//!
//! Payloads are JSON documents described by the types in [`message`] and
//! [`value`]. Live server objects never cross the wire; they are replaced by
//! [`RemoteRef`] handles on the way out and resolved from [`WireValue::Handle`]
//! on the way in.

mod errors;
mod frame;
mod kind;
mod mac;
pub mod message;
mod nonce;
pub mod value;
mod version;

pub use errors::{FrameError, PayloadError};
pub use frame::{
    FRAME_HEADER_BYTES, Frame, FrameReader, FrameWriter, INITIAL_FRAME_LIMIT, MAX_FRAME_BYTES,
};
pub use kind::MessageKind;
pub use mac::{CLIENT_LABEL, MAC_BYTES, MacChain, SERVER_LABEL};
pub use message::{
    ErrorMessage, Goodbye, LineSelector, Outcome, ReleaseMessage, RemoteError, RequestMessage,
    ResponseMessage, SessionInit, decode_payload, encode_payload,
};
pub use nonce::{NONCE_BYTES, Nonce};
pub use value::{RemoteRef, TypeDescriptor, WireValue};
pub use version::{MIN_PEER_VERSION, PROTOCOL_VERSION, version_is_compatible};
