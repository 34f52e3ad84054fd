//! Typed events built from low-level records.

use crate::error::DecodeError;
use crate::parser::{LowLevelRecord, Tags};
use std::collections::HashMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ChatMessage,
    UserState,
    RoomState,
    ChannelJoin,
    ChannelPart,
    Notice,
    Ping,
}

impl EventKind {
    pub fn command(self) -> &'static str {
        match self {
            Self::ChatMessage => "PRIVMSG",
            Self::UserState => "USERSTATE",
            Self::RoomState => "ROOMSTATE",
            Self::ChannelJoin => "JOIN",
            Self::ChannelPart => "PART",
            Self::Notice => "NOTICE",
            Self::Ping => "PING",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub tags: Tags,
    pub username: String,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateUpdate {
    pub tags: Tags,
    pub channel: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Membership {
    pub channel: String,
    pub username: String,
}

/// Server notice. `channel` is `*` for notices not tied to a channel, such as
/// login rejections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub tags: Tags,
    pub channel: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    ChatMessage(ChatMessage),
    UserState(StateUpdate),
    RoomState(StateUpdate),
    ChannelJoin(Membership),
    ChannelPart(Membership),
    Notice(Notice),
    Ping { payload: String },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ChatMessage(_) => EventKind::ChatMessage,
            Self::UserState(_) => EventKind::UserState,
            Self::RoomState(_) => EventKind::RoomState,
            Self::ChannelJoin(_) => EventKind::ChannelJoin,
            Self::ChannelPart(_) => EventKind::ChannelPart,
            Self::Notice(_) => EventKind::Notice,
            Self::Ping { .. } => EventKind::Ping,
        }
    }
}

pub type DecodeFn = fn(LowLevelRecord) -> Result<Event, DecodeError>;

/// Command name to constructor mapping.
///
/// Built once at startup and handed to the connection loop; commands that are
/// not in the table decode to `None` and are dropped by the caller.
#[derive(Clone)]
pub struct CommandTable {
    decoders: HashMap<String, DecodeFn>,
}

impl Default for CommandTable {
    fn default() -> Self {
        Self::empty()
            .with("PRIVMSG", decode_chat_message)
            .with("USERSTATE", decode_user_state)
            .with("ROOMSTATE", decode_room_state)
            .with("JOIN", decode_join)
            .with("PART", decode_part)
            .with("NOTICE", decode_notice)
            .with("PING", decode_ping)
    }
}

impl CommandTable {
    pub fn empty() -> Self {
        Self {
            decoders: HashMap::new(),
        }
    }

    pub fn with(mut self, command: &str, decoder: DecodeFn) -> Self {
        self.decoders.insert(command.to_ascii_uppercase(), decoder);
        self
    }

    pub fn contains(&self, command: &str) -> bool {
        self.decoders.contains_key(command)
    }

    pub fn decode(&self, record: LowLevelRecord) -> Result<Option<Event>, DecodeError> {
        match self.decoders.get(record.command.as_str()) {
            Some(decoder) => decoder(record).map(Some),
            None => Ok(None),
        }
    }
}

fn decode_error(record: &LowLevelRecord, reason: &str) -> DecodeError {
    DecodeError {
        command: record.command.clone(),
        text: record.remainder.clone(),
        reason: reason.to_string(),
    }
}

fn username(record: &LowLevelRecord) -> Result<String, DecodeError> {
    let origin = record
        .origin
        .as_deref()
        .ok_or_else(|| decode_error(record, "missing origin"))?;
    let name = origin.split('!').next().unwrap_or(origin);
    if name.is_empty() {
        return Err(decode_error(record, "empty username in origin"));
    }
    Ok(name.to_string())
}

fn channel_name(raw: &str) -> String {
    raw.trim().trim_start_matches('#').to_string()
}

fn decode_chat_message(record: LowLevelRecord) -> Result<Event, DecodeError> {
    let username = username(&record)?;
    let (channel, text) = record
        .remainder
        .split_once(" :")
        .ok_or_else(|| decode_error(&record, "missing ' :' between channel and text"))?;
    let channel = channel_name(channel);
    let text = text.to_string();
    Ok(Event::ChatMessage(ChatMessage {
        tags: record.tags.unwrap_or_default(),
        username,
        channel,
        text,
    }))
}

fn state_update(record: LowLevelRecord) -> StateUpdate {
    StateUpdate {
        channel: channel_name(&record.remainder),
        tags: record.tags.unwrap_or_default(),
    }
}

fn decode_user_state(record: LowLevelRecord) -> Result<Event, DecodeError> {
    Ok(Event::UserState(state_update(record)))
}

fn decode_room_state(record: LowLevelRecord) -> Result<Event, DecodeError> {
    Ok(Event::RoomState(state_update(record)))
}

fn membership(record: &LowLevelRecord) -> Result<Membership, DecodeError> {
    Ok(Membership {
        username: username(record)?,
        channel: channel_name(&record.remainder),
    })
}

fn decode_join(record: LowLevelRecord) -> Result<Event, DecodeError> {
    membership(&record).map(Event::ChannelJoin)
}

fn decode_part(record: LowLevelRecord) -> Result<Event, DecodeError> {
    membership(&record).map(Event::ChannelPart)
}

fn decode_notice(record: LowLevelRecord) -> Result<Event, DecodeError> {
    let (channel, text) = match record.remainder.split_once(" :") {
        Some((channel, text)) => (channel_name(channel), text.to_string()),
        None => (channel_name(&record.remainder), String::new()),
    };
    Ok(Event::Notice(Notice {
        tags: record.tags.unwrap_or_default(),
        channel,
        text,
    }))
}

fn decode_ping(record: LowLevelRecord) -> Result<Event, DecodeError> {
    Ok(Event::Ping {
        payload: record.remainder,
    })
}
