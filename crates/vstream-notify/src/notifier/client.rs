//! Per-connection client actor.
//!
//! Every accepted socket is split into a read path and a write path running
//! as separate tasks:
//! - the read path parses `join` commands, consults the authorization gate
//!   and joins rooms; its termination tears the whole client down
//! - the write path drains the unbounded outbound queue and sends keepalive
//!   pings
//!
//! ```text
//!  socket ──► read path ──► gate ──► registry/room.join
//!                │
//!                └─ teardown: close queue, leave rooms, deregister
//!  rooms ──► outbound queue ──► write path ──► socket
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use vstream_models::{ClientCommand, ServerMessage, TopicPath};

use super::gate::Admission;
use super::room::RoomHandle;
use super::{NotifierContext, NotifyError, NotifyResult};
use crate::auth::Identity;
use crate::metrics;

/// Attempts at joining when the resolved room retires underneath us.
const JOIN_ATTEMPTS: usize = 3;

/// Connection id, assigned in accept order for the process lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub u64);

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Connection lifecycle. Transitions only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ClientState {
    Connecting,
    Open,
    Closing,
    Closed,
}

/// Sending side of a client's outbound queue.
///
/// The queue is unbounded: publishers never wait on a slow consumer, and a
/// stalled consumer is cut off by the keepalive deadline instead.
#[derive(Clone)]
pub struct ClientHandle {
    id: ClientId,
    tx: mpsc::UnboundedSender<Arc<str>>,
}

impl ClientHandle {
    pub(super) fn new(id: ClientId) -> (Self, mpsc::UnboundedReceiver<Arc<str>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { id, tx }, rx)
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    /// Serialize `message` and append it to the outbound queue.
    pub fn emit(&self, message: &ServerMessage) -> NotifyResult<()> {
        let json = message.to_json()?;
        if self.deliver(Arc::from(json)) {
            metrics::record_event_sent(message.event());
            Ok(())
        } else {
            Err(NotifyError::ClientClosed(self.id))
        }
    }

    /// Append an already serialized frame; false once the queue is closed.
    pub fn deliver(&self, frame: Arc<str>) -> bool {
        self.tx.send(frame).is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl fmt::Debug for ClientHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientHandle").field("id", &self.id).finish()
    }
}

/// Start the read and write paths for an upgraded socket.
pub(super) fn spawn(
    id: ClientId,
    identity: Identity,
    socket: WebSocket,
    ctx: NotifierContext,
) -> ClientHandle {
    let (handle, outbound) = ClientHandle::new(id);
    let (sink, stream) = socket.split();
    let (close_tx, close_rx) = oneshot::channel();

    if let Err(e) = handle.emit(&ServerMessage::ready()) {
        warn!(client_id = %id, "Failed to queue ready event: {}", e);
    }

    let writer = tokio::spawn(write_loop(id, sink, outbound, close_rx, ctx.config.ping_interval));

    let client = Client {
        id,
        identity,
        state: ClientState::Connecting,
        outbound: handle.clone(),
        rooms: HashMap::new(),
        ctx,
    };
    tokio::spawn(client.run(stream, writer, close_tx));

    handle
}

/// Write path: forward queued frames and send pings until the queue is
/// closed, the read path asks us to stop, or a send fails.
async fn write_loop(
    id: ClientId,
    mut sink: SplitSink<WebSocket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Arc<str>>,
    mut close_rx: oneshot::Receiver<()>,
    ping_interval: std::time::Duration,
) {
    let mut ping = interval_at(Instant::now() + ping_interval, ping_interval);
    ping.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if let Err(e) = sink.send(Message::Text(frame.to_string())).await {
                    debug!(client_id = %id, "Write failed: {}", e);
                    break;
                }
            }
            _ = ping.tick() => {
                if let Err(e) = sink.send(Message::Ping(Vec::new())).await {
                    debug!(client_id = %id, "Ping failed: {}", e);
                    break;
                }
            }
            _ = &mut close_rx => break,
        }
    }

    outbound.close();
    let _ = sink.close().await;
}

struct Client {
    id: ClientId,
    identity: Identity,
    state: ClientState,
    outbound: ClientHandle,
    rooms: HashMap<TopicPath, RoomHandle>,
    ctx: NotifierContext,
}

impl Client {
    fn transition(&mut self, next: ClientState) {
        debug_assert!(next >= self.state, "client state moved backwards");
        if next > self.state {
            debug!(client_id = %self.id, from = ?self.state, to = ?next, "Client state");
            self.state = next;
        }
    }

    /// Read path. Any inbound frame resets the read deadline; exceeding it,
    /// a receive error, or the write path ending terminates the client.
    async fn run(
        mut self,
        mut stream: SplitStream<WebSocket>,
        mut writer: JoinHandle<()>,
        close_tx: oneshot::Sender<()>,
    ) {
        self.transition(ClientState::Open);
        info!(client_id = %self.id, user = %self.identity, "Client connected");

        let deadline = self.ctx.config.pong_timeout;
        let mut writer_done = false;

        loop {
            tokio::select! {
                frame = timeout(deadline, stream.next()) => match frame {
                    Err(_) => {
                        debug!(client_id = %self.id, "Read deadline exceeded");
                        break;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(e))) => {
                        debug!(client_id = %self.id, "Read failed: {}", e);
                        break;
                    }
                    Ok(Some(Ok(Message::Close(_)))) => break,
                    Ok(Some(Ok(msg))) => self.handle_frame(msg).await,
                },
                _ = &mut writer => {
                    writer_done = true;
                    break;
                }
            }
        }

        self.transition(ClientState::Closing);
        let _ = close_tx.send(());
        for (_, room) in self.rooms.drain() {
            room.leave(self.id);
        }
        self.ctx.supervisor.deregister(self.id);
        if !writer_done {
            let _ = writer.await;
        }
        self.transition(ClientState::Closed);
        info!(client_id = %self.id, "Client disconnected");
    }

    async fn handle_frame(&mut self, msg: Message) {
        metrics::record_ws_frame_received();

        // Pings and pongs only count as activity.
        let Message::Text(text) = msg else { return };

        let path = match ClientCommand::from_text(&text) {
            Ok(ClientCommand::Join(path)) => path,
            Err(e) => {
                debug!(client_id = %self.id, "Ignoring frame: {}", e);
                return;
            }
        };

        match TopicPath::parse(&path) {
            Ok(topic) => self.watch_encode(topic).await,
            Err(e) => debug!(client_id = %self.id, "Ignoring join: {}", e),
        }
    }

    /// Gate the join, then either answer from the fast path or subscribe.
    async fn watch_encode(&mut self, topic: TopicPath) {
        for _ in 0..JOIN_ATTEMPTS {
            match self.ctx.gate.check(&topic, &self.identity).await {
                Admission::Denied(reason) => {
                    debug!(client_id = %self.id, topic = %topic, ?reason, "Join denied");
                    metrics::record_join_decision("denied");
                    return;
                }
                Admission::Completed(video) => {
                    let sent = ServerMessage::encoded(&video)
                        .map_err(NotifyError::from)
                        .and_then(|msg| self.outbound.emit(&msg));
                    if let Err(e) = sent {
                        warn!(client_id = %self.id, topic = %topic, "Fast path emit failed: {}", e);
                    }
                    metrics::record_join_decision("fast_path");
                    return;
                }
                Admission::Pending => {}
            }

            let room = match self.ctx.registry.resolve(&topic, &self.ctx.supervisor).await {
                Ok(room) => room,
                Err(e) => {
                    warn!(client_id = %self.id, topic = %topic, "Room resolution failed: {}", e);
                    return;
                }
            };

            match room.join(self.outbound.clone()).await {
                Ok(()) => {
                    debug!(client_id = %self.id, topic = %topic, room = %room.id(), "Joined");
                    metrics::record_join_decision("subscribed");
                    self.rooms.insert(topic, room);
                    return;
                }
                Err(NotifyError::RoomClosed(_)) => {
                    debug!(
                        client_id = %self.id,
                        topic = %topic,
                        room = %room.id(),
                        "Room retired during join, retrying"
                    );
                    // No-op unless the registry still maps to the dead room.
                    self.ctx.supervisor.retire_room(topic.clone(), room.id()).await;
                }
                Err(e) => {
                    warn!(client_id = %self.id, topic = %topic, "Join failed: {}", e);
                    return;
                }
            }
        }
    }
}
