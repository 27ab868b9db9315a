//! Client-side Telnet sessions: minimal option negotiation, prompt
//! detection over an arbitrarily chunked byte stream, login automation,
//! and a request/response command primitive.

pub mod config;
pub mod error;
pub mod session;
pub mod version;

pub use config::ConnectOptions;
pub use error::{TelnetError, TelnetResult};
pub use session::{SessionEvent, Telnet};
