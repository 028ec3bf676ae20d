//! Screen mirroring pipeline.
//!
//! | Module        | Purpose                                          |
//! |---------------|--------------------------------------------------|
//! | [`types`]     | `StreamMessage` and `CanonicalFrame`             |
//! | [`rle`]       | Block RLE used by the WebSocket stream           |
//! | [`decoder`]   | Raw frame → canonical RGB24                      |
//! | [`transport`] | WebSocket vs HTTP polling selection              |

pub mod decoder;
pub mod rle;
pub mod transport;
pub mod types;

pub use decoder::{FrameDecoder, decode_frame};
pub use rle::{rle_decode, rle_encode};
pub use transport::{CLOUD_POLL_FLOOR, ConnectionKind, TransportKind, select_transport};
pub use types::{CanonicalFrame, StreamMessage};
