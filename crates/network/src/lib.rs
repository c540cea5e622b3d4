//! BigFS Wire Protocol
//!
//! Two framing concerns live here and are kept apart:
//!
//! ## Modules
//! - `codec`: length-prefixed JSON frames carrying every structured message
//! - `messages`: the closed set of messages exchanged with nodes and the directory
//! - `transfer`: declared-length handshake used to move raw file bytes

pub mod codec;
pub mod messages;
pub mod transfer;

// ------------------------------------------------------------
// Re-exports for workspace-wide use
// ------------------------------------------------------------

pub use codec::{decode, read_frame, read_frame_bytes, write_frame, WireError, FRAME_HEADER_LEN};
pub use messages::{Command, DirectoryReply, DirectoryRequest, Handshake, Reply};
pub use transfer::{
    acknowledge, read_declaration, receive_body, receive_payload, refuse, send_payload,
    TransferError, TransferLimits,
};
