//! Chat protocol core: line parsing, typed events, dispatch and the
//! connection loop.
//!
//! The crate does not decide what to say. Inbound chat messages leave through
//! an unbounded queue and replies come back as [`SendRequest`]s.

mod connection;
mod dispatch;
mod error;
mod event;
mod parser;
mod transport;
mod types;
mod wire;

pub use connection::{ConnectionState, Disconnect, IrcClient};
pub use dispatch::{Action, Dispatcher, Handler, HandlerContext};
pub use error::{DecodeError, IrcError, ParseError, Result, TransportError};
pub use event::{
    ChatMessage, CommandTable, DecodeFn, Event, EventKind, Membership, Notice, StateUpdate,
};
pub use parser::{LowLevelRecord, Tags, parse_batch, parse_line};
pub use transport::{FrameStream, LineSink, connect};
pub use types::{ClientConfig, DEFAULT_ENDPOINT, SendRequest, normalize_channel};
pub use wire::CAPABILITIES;
