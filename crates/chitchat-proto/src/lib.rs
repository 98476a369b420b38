//! Chit-Chat wire protocol.
//!
//! Data model and codec for everything that crosses the peer data channel or
//! lands in the persisted message log.
//!
//! # Frames
//!
//! Every frame is a single CBOR map carrying a string `type` discriminator:
//!
//! - `text`, `code`, `file`: a chat [`Message`], appended to the log
//! - `status`, `read`, `reaction`: a [`ControlFrame`], applied to local state
//!   and never persisted
//!
//! [`Frame::decode`] validates the discriminator before anything else, so
//! unknown frame types surface as [`ProtocolError::UnknownFrameType`] instead
//! of being mistaken for messages.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod errors;
mod file;
mod frame;
mod ids;
mod message;

pub use errors::{ProtocolError, Result};
pub use file::{DEFAULT_MIME_TYPE, FilePayload};
pub use frame::{ControlFrame, Frame, MAX_FRAME_SIZE};
pub use ids::{ID_ALPHABET, MessageId, PeerId, id_from_random_bytes};
pub use message::{DEFAULT_CODE_LANGUAGE, Message, MessageBody, MessageKind, RawMessage, Reaction};
