//! Per-kind event handlers.
//!
//! Handlers never touch the session directly. They return an [`Action`] and the
//! connection loop carries it out, so handler behavior stays testable without a
//! socket.

use crate::event::{ChatMessage, Event, EventKind, Notice};
use crate::wire;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// Hand a chat message to the responder queue.
    Forward(ChatMessage),
    /// Write a control line ahead of queued user sends.
    Reply(String),
    /// The server refused the login; end the attempt as an authentication
    /// failure.
    Refuse(String),
}

/// Notice texts the server sends right before dropping a bad login.
const LOGIN_REJECTIONS: &[&str] = &[
    "login authentication failed",
    "login unsuccessful",
    "improperly formatted auth",
    "invalid nick",
];

#[derive(Debug, Clone, Copy)]
pub struct HandlerContext<'a> {
    pub identity: &'a str,
}

pub type Handler = Arc<dyn Fn(Event, &HandlerContext<'_>) -> Option<Action> + Send + Sync>;

#[derive(Clone)]
pub struct Dispatcher {
    handlers: HashMap<EventKind, Handler>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::empty()
            .on(EventKind::ChatMessage, forward_unless_own)
            .on(EventKind::Ping, reply_pong)
            .on(EventKind::Notice, refuse_rejected_login)
            .on(EventKind::ChannelJoin, observe)
            .on(EventKind::ChannelPart, observe)
            .on(EventKind::UserState, observe)
            .on(EventKind::RoomState, observe)
    }
}

impl Dispatcher {
    pub fn empty() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register the handler for `kind`, replacing any previous one.
    pub fn on<F>(mut self, kind: EventKind, handler: F) -> Self
    where
        F: Fn(Event, &HandlerContext<'_>) -> Option<Action> + Send + Sync + 'static,
    {
        self.handlers.insert(kind, Arc::new(handler));
        self
    }

    pub fn dispatch(&self, event: Event, ctx: &HandlerContext<'_>) -> Option<Action> {
        let handler = self.handlers.get(&event.kind())?;
        handler(event, ctx)
    }
}

fn forward_unless_own(event: Event, ctx: &HandlerContext<'_>) -> Option<Action> {
    let Event::ChatMessage(message) = event else {
        return None;
    };
    if message.username.eq_ignore_ascii_case(ctx.identity) {
        tracing::trace!(channel = %message.channel, "ignoring own chat message");
        return None;
    }
    Some(Action::Forward(message))
}

fn reply_pong(event: Event, _ctx: &HandlerContext<'_>) -> Option<Action> {
    let Event::Ping { payload } = event else {
        return None;
    };
    Some(Action::Reply(wire::pong(&payload)))
}

fn refuse_rejected_login(event: Event, _ctx: &HandlerContext<'_>) -> Option<Action> {
    let Event::Notice(Notice { channel, text, .. }) = event else {
        return None;
    };
    let lowered = text.to_lowercase();
    if channel == "*" && LOGIN_REJECTIONS.iter().any(|r| lowered.contains(r)) {
        return Some(Action::Refuse(text));
    }
    tracing::info!(%channel, notice = %text, "server notice");
    None
}

fn observe(event: Event, _ctx: &HandlerContext<'_>) -> Option<Action> {
    match &event {
        Event::ChannelJoin(m) | Event::ChannelPart(m) => {
            tracing::debug!(kind = %event.kind(), channel = %m.channel, username = %m.username, "membership event");
        }
        Event::UserState(s) | Event::RoomState(s) => {
            tracing::debug!(kind = %event.kind(), channel = %s.channel, tags = s.tags.len(), "state event");
        }
        Event::ChatMessage(_) | Event::Notice(_) | Event::Ping { .. } => {}
    }
    None
}
