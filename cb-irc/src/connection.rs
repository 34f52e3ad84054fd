//! One connection attempt: handshake, then the receive and send duties.

use crate::dispatch::{Action, Dispatcher, HandlerContext};
use crate::error::{IrcError, Result, TransportError};
use crate::event::{ChatMessage, CommandTable};
use crate::parser::parse_batch;
use crate::transport::{self, FrameStream, LineSink};
use crate::types::{ClientConfig, SendRequest};
use crate::wire;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Authenticating,
    CapabilityNegotiation,
    Joining,
    Active,
    Closed,
}

/// How an attempt ended when it did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Disconnect {
    /// The shared shutdown token fired.
    Shutdown,
    /// The remote side went away. `active` is false when that happened while
    /// joining channels.
    TransportClosed {
        reason: TransportError,
        active: bool,
    },
}

impl Disconnect {
    /// Whether the attempt got as far as the Active state and the server sent
    /// something other than a login rejection.
    pub fn reached_active(&self) -> bool {
        matches!(self, Disconnect::TransportClosed { active: true, .. })
    }
}

enum DutyExit {
    Shutdown,
    Closed(TransportError),
    Refused(TransportError),
}

pub struct IrcClient {
    config: ClientConfig,
    commands: CommandTable,
    dispatcher: Dispatcher,
}

impl IrcClient {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            commands: CommandTable::default(),
            dispatcher: Dispatcher::default(),
        }
    }

    pub fn with_commands(mut self, commands: CommandTable) -> Self {
        self.commands = commands;
        self
    }

    pub fn with_dispatcher(mut self, dispatcher: Dispatcher) -> Self {
        self.dispatcher = dispatcher;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Open the configured endpoint and run one attempt on it.
    pub async fn connect_and_run(
        &self,
        inbound_tx: &UnboundedSender<ChatMessage>,
        outbound_rx: &mut UnboundedReceiver<SendRequest>,
        shutdown: &CancellationToken,
    ) -> Result<Disconnect> {
        let (frames, lines) = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return Ok(Disconnect::Shutdown),
            connected = transport::connect(self.config.endpoint()) => connected?,
        };
        self.run(frames, lines, inbound_tx, outbound_rx, shutdown)
            .await
    }

    /// Run one attempt over an already open session.
    ///
    /// Returns once both duties have stopped. The outbound receiver is borrowed
    /// so requests queued while disconnected survive into the next attempt.
    #[tracing::instrument(level = "info", skip_all, fields(identity = %self.config.identity()))]
    pub async fn run(
        &self,
        frames: FrameStream,
        mut lines: LineSink,
        inbound_tx: &UnboundedSender<ChatMessage>,
        outbound_rx: &mut UnboundedReceiver<SendRequest>,
        shutdown: &CancellationToken,
    ) -> Result<Disconnect> {
        let mut state = ConnectionState::Disconnected;
        if let Some(closed) = self.handshake(&mut lines, &mut state).await? {
            advance(&mut state, ConnectionState::Closed);
            return Ok(Disconnect::TransportClosed {
                reason: closed,
                active: false,
            });
        }
        advance(&mut state, ConnectionState::Active);

        let session = shutdown.child_token();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let mut acknowledged = false;
        let (received, sent) = tokio::join!(
            self.receive_duty(frames, inbound_tx, control_tx, &session, &mut acknowledged),
            send_duty(&mut lines, control_rx, outbound_rx, &session),
        );
        advance(&mut state, ConnectionState::Closed);

        if let Err(e) = lines.close().await {
            tracing::debug!(error = %e, "closing session sink failed");
        }

        match (received, sent) {
            (DutyExit::Refused(e), _) | (_, DutyExit::Refused(e)) => {
                tracing::warn!(reason = %e, "server refused the login");
                Err(IrcError::AuthenticationFailure(e))
            }
            (DutyExit::Closed(e), _) | (_, DutyExit::Closed(e)) if !acknowledged => {
                tracing::warn!(reason = %e, "session closed before the server said anything");
                Err(IrcError::AuthenticationFailure(e))
            }
            (DutyExit::Closed(e), _) | (_, DutyExit::Closed(e)) => {
                tracing::info!(reason = %e, "session closed by transport");
                Ok(Disconnect::TransportClosed {
                    reason: e,
                    active: true,
                })
            }
            (DutyExit::Shutdown, DutyExit::Shutdown) => {
                tracing::info!("session stopped by shutdown");
                Ok(Disconnect::Shutdown)
            }
        }
    }

    /// Write credentials, capabilities and joins.
    ///
    /// A write failure before capabilities are requested is an authentication
    /// failure; a failure while joining is an ordinary closure.
    async fn handshake(
        &self,
        lines: &mut LineSink,
        state: &mut ConnectionState,
    ) -> Result<Option<TransportError>> {
        advance(state, ConnectionState::Authenticating);
        lines
            .send(wire::pass(self.config.access_token()))
            .await
            .map_err(IrcError::AuthenticationFailure)?;
        lines
            .send(wire::nick(self.config.identity()))
            .await
            .map_err(IrcError::AuthenticationFailure)?;

        advance(state, ConnectionState::CapabilityNegotiation);
        lines
            .send(wire::cap_req(wire::CAPABILITIES))
            .await
            .map_err(IrcError::AuthenticationFailure)?;

        advance(state, ConnectionState::Joining);
        for channel in self.config.channels() {
            if let Err(e) = lines.send(wire::join(channel)).await {
                tracing::warn!(%channel, error = %e, "join request failed");
                return Ok(Some(e));
            }
            tracing::info!(%channel, "join requested");
        }
        Ok(None)
    }

    async fn receive_duty(
        &self,
        mut frames: FrameStream,
        inbound_tx: &UnboundedSender<ChatMessage>,
        control_tx: UnboundedSender<String>,
        session: &CancellationToken,
        acknowledged: &mut bool,
    ) -> DutyExit {
        loop {
            let frame = tokio::select! {
                biased;
                _ = session.cancelled() => return DutyExit::Shutdown,
                frame = frames.next() => frame,
            };
            match frame {
                Some(Ok(raw)) => {
                    if let Some(reason) = self.handle_frame(&raw, inbound_tx, &control_tx) {
                        session.cancel();
                        return DutyExit::Refused(TransportError::Closed(Some(reason)));
                    }
                    *acknowledged = true;
                }
                Some(Err(e)) => {
                    session.cancel();
                    return DutyExit::Closed(e);
                }
                None => {
                    session.cancel();
                    return DutyExit::Closed(TransportError::Closed(None));
                }
            }
        }
    }

    /// Dispatch every line of one frame. Returns the rejection text when the
    /// server refused the login.
    fn handle_frame(
        &self,
        raw: &str,
        inbound_tx: &UnboundedSender<ChatMessage>,
        control_tx: &UnboundedSender<String>,
    ) -> Option<String> {
        let ctx = HandlerContext {
            identity: self.config.identity(),
        };
        for parsed in parse_batch(raw) {
            let record = match parsed {
                Ok(record) => record,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping unparseable line");
                    continue;
                }
            };
            let event = match self.commands.decode(record) {
                Ok(Some(event)) => event,
                Ok(None) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping undecodable event");
                    continue;
                }
            };
            match self.dispatcher.dispatch(event, &ctx) {
                Some(Action::Forward(message)) => {
                    if inbound_tx.send(message).is_err() {
                        tracing::warn!("inbound queue closed; chat message dropped");
                    }
                }
                Some(Action::Reply(line)) => {
                    // The receiver lives until the send duty returns.
                    let _ = control_tx.send(line);
                }
                Some(Action::Refuse(reason)) => return Some(reason),
                None => {}
            }
        }
        None
    }
}

async fn send_duty(
    lines: &mut LineSink,
    mut control_rx: UnboundedReceiver<String>,
    outbound_rx: &mut UnboundedReceiver<SendRequest>,
    session: &CancellationToken,
) -> DutyExit {
    let mut outbound_open = true;
    loop {
        let line = tokio::select! {
            biased;
            _ = session.cancelled() => return DutyExit::Shutdown,
            Some(line) = control_rx.recv() => line,
            request = outbound_rx.recv(), if outbound_open => match request {
                Some(request) => {
                    tracing::debug!(channel = %request.channel, chars = request.text.len(), "sending chat message");
                    request.to_line()
                }
                None => {
                    tracing::info!("outbound queue closed; serving control lines only");
                    outbound_open = false;
                    continue;
                }
            },
        };
        if let Err(e) = lines.send(line).await {
            session.cancel();
            return DutyExit::Closed(e);
        }
    }
}

fn advance(state: &mut ConnectionState, next: ConnectionState) {
    tracing::debug!(from = ?*state, to = ?next, "connection state change");
    *state = next;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::{Event, EventKind, Membership};
    use futures::channel::mpsc as fmpsc;

    struct Wires {
        frames_tx: fmpsc::UnboundedSender<std::result::Result<String, TransportError>>,
        written_rx: fmpsc::UnboundedReceiver<String>,
        frames: FrameStream,
        lines: LineSink,
    }

    fn wires() -> Wires {
        let (frames_tx, frames_rx) = fmpsc::unbounded();
        let (written_tx, written_rx) = fmpsc::unbounded::<String>();
        Wires {
            frames_tx,
            written_rx,
            frames: Box::pin(frames_rx),
            lines: Box::pin(written_tx.sink_map_err(|_| TransportError::Closed(None))),
        }
    }

    fn client() -> IrcClient {
        let cfg = ClientConfig::new("botname", "oauth:secret", &["#chan".to_string()])
            .expect("valid config");
        IrcClient::new(cfg)
    }

    async fn take(written_rx: &mut fmpsc::UnboundedReceiver<String>, n: usize) -> Vec<String> {
        let mut out = Vec::with_capacity(n);
        for _ in 0..n {
            out.push(written_rx.next().await.expect("line written"));
        }
        out
    }

    #[tokio::test]
    async fn handshake_is_written_in_order() {
        let Wires {
            frames_tx,
            mut written_rx,
            frames,
            lines,
        } = wires();
        frames_tx
            .unbounded_send(Ok(":tmi.twitch.tv 001 botname :Welcome, GLHF!\r\n".to_string()))
            .expect("queue welcome");
        drop(frames_tx);
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();

        let result = client()
            .run(frames, lines, &inbound_tx, &mut outbound_rx, &shutdown)
            .await
            .expect("attempt runs");
        assert_eq!(
            result,
            Disconnect::TransportClosed {
                reason: TransportError::Closed(None),
                active: true,
            }
        );
        assert!(result.reached_active());

        let written: Vec<String> = written_rx.by_ref().collect().await;
        assert_eq!(
            written,
            vec![
                "PASS oauth:secret",
                "NICK botname",
                "CAP REQ :twitch.tv/tags twitch.tv/commands twitch.tv/membership",
                "JOIN #chan",
            ]
        );
    }

    #[tokio::test]
    async fn closed_transport_during_handshake_is_authentication_failure() {
        let Wires {
            frames,
            lines,
            written_rx,
            ..
        } = wires();
        drop(written_rx);
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let err = client()
            .run(
                frames,
                lines,
                &inbound_tx,
                &mut outbound_rx,
                &CancellationToken::new(),
            )
            .await
            .expect_err("handshake must fail");
        assert!(matches!(err, IrcError::AuthenticationFailure(_)), "{err}");
    }

    #[tokio::test]
    async fn close_before_any_server_line_is_authentication_failure() {
        let Wires {
            frames_tx,
            written_rx: _written_rx,
            frames,
            lines,
        } = wires();
        frames_tx
            .unbounded_send(Err(TransportError::Closed(None)))
            .expect("queue close");
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let err = client()
            .run(
                frames,
                lines,
                &inbound_tx,
                &mut outbound_rx,
                &CancellationToken::new(),
            )
            .await
            .expect_err("silent close after the handshake");
        assert!(matches!(err, IrcError::AuthenticationFailure(_)), "{err}");
    }

    #[tokio::test]
    async fn login_rejection_notice_is_authentication_failure() {
        let Wires {
            frames_tx,
            mut written_rx,
            frames,
            lines,
        } = wires();
        frames_tx
            .unbounded_send(Ok(":tmi.twitch.tv NOTICE * :Login authentication failed\r\n".to_string()))
            .expect("queue notice");
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        outbound_tx
            .send(SendRequest::new("chan", "queued"))
            .expect("queue request");

        let err = client()
            .run(
                frames,
                lines,
                &inbound_tx,
                &mut outbound_rx,
                &CancellationToken::new(),
            )
            .await
            .expect_err("rejected login");
        match err {
            IrcError::AuthenticationFailure(TransportError::Closed(Some(reason))) => {
                assert_eq!(reason, "Login authentication failed");
            }
            other => panic!("unexpected error: {other}"),
        }

        let written: Vec<String> = written_rx.by_ref().collect().await;
        assert_eq!(written.len(), 4, "only the handshake went out: {written:?}");
        drop(frames_tx);
    }

    #[tokio::test]
    async fn custom_commands_and_hooks_are_used() {
        let Wires {
            frames_tx,
            written_rx: _written_rx,
            frames,
            lines,
        } = wires();
        frames_tx
            .unbounded_send(Ok(concat!(
                ":tmi.twitch.tv CLEARCHAT #chan :spammer\r\n",
                ":viewer!viewer@viewer.tmi.twitch.tv JOIN #chan\r\n",
            )
            .to_string()))
            .expect("queue frame");
        drop(frames_tx);

        let (hook_tx, mut hook_rx) = mpsc::unbounded_channel::<String>();
        let commands = CommandTable::default().with("CLEARCHAT", |record| {
            let (channel, user) = record.remainder.split_once(" :").unwrap_or(("", ""));
            Ok(Event::ChannelPart(Membership {
                channel: channel.trim_start_matches('#').to_string(),
                username: user.to_string(),
            }))
        });
        let part_tx = hook_tx.clone();
        let dispatcher = Dispatcher::default()
            .on(EventKind::ChannelPart, move |event, _| {
                if let Event::ChannelPart(m) = event {
                    let _ = part_tx.send(format!("part {}", m.username));
                }
                None
            })
            .on(EventKind::ChannelJoin, move |event, ctx| {
                if let Event::ChannelJoin(m) = event {
                    let _ = hook_tx.send(format!("join {} seen by {}", m.username, ctx.identity));
                }
                None
            });
        let client = client().with_commands(commands).with_dispatcher(dispatcher);
        assert_eq!(client.config().identity(), "botname");

        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let result = client
            .run(
                frames,
                lines,
                &inbound_tx,
                &mut outbound_rx,
                &CancellationToken::new(),
            )
            .await
            .expect("attempt runs");
        assert!(result.reached_active());

        assert_eq!(hook_rx.try_recv().expect("part hook"), "part spammer");
        assert_eq!(
            hook_rx.try_recv().expect("join hook"),
            "join viewer seen by botname"
        );
    }

    #[tokio::test]
    async fn bad_lines_do_not_stop_the_batch_and_own_messages_are_suppressed() {
        let Wires {
            frames_tx,
            written_rx: _written_rx,
            frames,
            lines,
        } = wires();
        let batch = concat!(
            "@broken :x!x@x PRIVMSG #chan :a\r\n",
            ":u!u@u PRIVMSG #chan no-separator\r\n",
            ":tmi.twitch.tv 001 botname :Welcome, GLHF!\r\n",
            ":botname!botname@botname.tmi.twitch.tv PRIVMSG #chan :talking to myself\r\n",
            "@color=#FF4500 :viewer!viewer@viewer.tmi.twitch.tv PRIVMSG #chan :hey BotName :)\r\n",
        );
        frames_tx
            .unbounded_send(Ok(batch.to_string()))
            .expect("queue frame");
        frames_tx
            .unbounded_send(Err(TransportError::Io("reset by peer".to_string())))
            .expect("queue error");
        let (inbound_tx, mut inbound_rx) = mpsc::unbounded_channel();
        let (_outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();

        let result = client()
            .run(
                frames,
                lines,
                &inbound_tx,
                &mut outbound_rx,
                &CancellationToken::new(),
            )
            .await
            .expect("attempt runs");
        assert_eq!(
            result,
            Disconnect::TransportClosed {
                reason: TransportError::Io("reset by peer".to_string()),
                active: true,
            }
        );

        let forwarded = inbound_rx.try_recv().expect("viewer message forwarded");
        assert_eq!(forwarded.username, "viewer");
        assert_eq!(forwarded.channel, "chan");
        assert_eq!(forwarded.text, "hey BotName :)");
        assert_eq!(forwarded.tags["color"], "#FF4500");
        assert!(inbound_rx.try_recv().is_err(), "nothing else forwarded");
    }

    #[tokio::test]
    async fn pong_overtakes_queued_sends() {
        let Wires {
            frames_tx,
            mut written_rx,
            frames,
            lines,
        } = wires();
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        outbound_tx
            .send(SendRequest::new("chan", "first"))
            .expect("queue first");
        outbound_tx
            .send(SendRequest::new("chan", "second"))
            .expect("queue second");
        frames_tx
            .unbounded_send(Ok("PING :tmi.twitch.tv\r\n".to_string()))
            .expect("queue ping");
        let shutdown = CancellationToken::new();
        let client = client();

        let run = client.run(frames, lines, &inbound_tx, &mut outbound_rx, &shutdown);
        let observe = async {
            let _handshake = take(&mut written_rx, 4).await;
            let after = take(&mut written_rx, 3).await;
            shutdown.cancel();
            after
        };
        let (result, after) = tokio::join!(run, observe);

        assert_eq!(result.expect("attempt runs"), Disconnect::Shutdown);
        assert_eq!(
            after,
            vec![
                "PONG tmi.twitch.tv",
                "PRIVMSG #chan :first",
                "PRIVMSG #chan :second",
            ]
        );
        drop(frames_tx);
    }

    #[tokio::test]
    async fn shutdown_while_waiting_stops_both_duties_without_sending_more() {
        let Wires {
            frames_tx,
            mut written_rx,
            frames,
            lines,
        } = wires();
        let (inbound_tx, _inbound_rx) = mpsc::unbounded_channel();
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let shutdown = CancellationToken::new();
        let client = client();

        let run = client.run(frames, lines, &inbound_tx, &mut outbound_rx, &shutdown);
        let stop = async {
            take(&mut written_rx, 4).await;
            shutdown.cancel();
            outbound_tx
                .send(SendRequest::new("chan", "too late"))
                .expect("queue after shutdown");
        };
        let (result, ()) = tokio::join!(run, stop);

        assert_eq!(result.expect("attempt runs"), Disconnect::Shutdown);
        let rest: Vec<String> = written_rx.collect().await;
        assert!(rest.is_empty(), "unexpected writes after shutdown: {rest:?}");
        assert_eq!(
            outbound_rx.try_recv().expect("request stays queued").text,
            "too late"
        );
        drop(frames_tx);
    }
}
