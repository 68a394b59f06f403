//! Wire types shared by the relay server and its clients.
//!
//! Nothing here performs IO: upstream payload shapes live under [`openai`],
//! the downstream envelope under [`envelope`], and the line framing both
//! sides use under [`sse`].

pub mod envelope;
pub mod markdown;
pub mod openai;
pub mod sse;
pub mod turn;

pub use envelope::StreamEvent;
pub use markdown::needs_buffering;
pub use sse::{LineSplitter, sse_data, sse_json_bytes};
pub use turn::{Role, Turn};
