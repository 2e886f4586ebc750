//! SIBS remote-purchase terminal protocol client.
//!
//! Two protocol generations are supported: the legacy ASCII command set and
//! the current one with hex-encoded fields and base64 receipts embedded in
//! the reply. The generation is chosen once, when the client is created.

mod client;
mod io;
mod parser;
mod protocol;
mod receipt;
mod status;
mod types;

#[cfg(test)]
mod tests;

// Re-export public API
pub use client::TerminalClient;
pub use io::{MessageObserver, decode_reply};
pub use parser::decode;
pub use protocol::{WireCommand, encode, length_frame, to_hex_pairs};
pub use receipt::{format_receipt, strip_accents};
pub use status::{NegativeResponse, StatusCode, UNKNOWN_PROCESSING_ERROR, describe_negative_response};
pub use types::{CURRENT, Generation, LEGACY, ProtocolProfile};
