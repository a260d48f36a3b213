//! One task per room.
//!
//! The task owns the client set and every uploaded file; connections talk
//! to it through [`RoomHandle`]. Commands are applied one at a time, in the
//! order they were queued. The same task drains the room's broadcast queue and fans each frame out
//! to every connected client.

use std::{collections::HashMap, sync::Arc, time::Duration};

use axum::extract::ws::Message;
use bytes::{Bytes, BytesMut};
use tokio::{
    sync::{mpsc, oneshot},
    time::Instant,
};
use tracing::{debug, info, warn};

use crate::{
    error::{AppErr, AppResult},
    protocol,
};

pub type ClientId = uuid::Uuid;
/// Outbound queue of one connection; its writer task owns the socket sink.
pub type Outbox = mpsc::Sender<Message>;
/// Frames a connection may have queued before senders wait on its socket.
pub const OUTBOX_CAPACITY: usize = 16;

/// First frame queued for a client, written before it is visible to the room.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Greeting {
    /// The room key, for the sharer that opened it.
    RoomKey,
    /// `FILES:` snapshot, for a receiver.
    FileList,
}
/// Position of an upload in the room's file list (0-based).
pub type Slot = usize;

enum Cmd {
    Join   { id: ClientId, tx: Outbox, greet: Option<Greeting>, reply: oneshot::Sender<Vec<String>> },
    Leave  { id: ClientId },
    Begin  { name: String, reply: oneshot::Sender<Slot> },
    Append { slot: Slot, data: Bytes },
    Finish { slot: Slot },
    Files  { reply: oneshot::Sender<Vec<String>> },
    Fetch  { index: usize, reply: oneshot::Sender<Option<(String, Bytes)>> },
    Idle   { reply: oneshot::Sender<Option<Duration>> },
    Count  { reply: oneshot::Sender<usize> },
}

struct StoredFile {
    name: String,
    body: Body,
}

enum Body {
    Receiving(BytesMut),
    Complete(Bytes),
}

impl Body {
    /// Complete bodies are shared; a partial one is copied as it stands.
    fn snapshot(&self) -> Bytes {
        match self {
            Body::Receiving(b) => Bytes::copy_from_slice(b),
            Body::Complete(b) => b.clone(),
        }
    }

    fn len(&self) -> usize {
        match self {
            Body::Receiving(b) => b.len(),
            Body::Complete(b) => b.len(),
        }
    }
}

struct Room {
    key:        Arc<str>,
    clients:    HashMap<ClientId, Outbox>,
    files:      Vec<StoredFile>,
    idle_since: Option<Instant>,
}

/* ---------------- handle ---------------- */
#[derive(Clone)]
pub struct RoomHandle {
    key:       Arc<str>,
    cmd:       mpsc::UnboundedSender<Cmd>,
    broadcast: mpsc::UnboundedSender<Bytes>,
}

impl std::fmt::Debug for RoomHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RoomHandle").field("key", &self.key).finish()
    }
}

impl RoomHandle {
    /// Starts the room task and returns the only way to reach it.
    pub fn spawn(key: &str) -> Self {
        let key: Arc<str> = Arc::from(key);
        let (cmd, cmd_rx) = mpsc::unbounded_channel();
        let (broadcast, bcast_rx) = mpsc::unbounded_channel();
        let room = Room {
            key:        key.clone(),
            clients:    HashMap::new(),
            files:      Vec::new(),
            // the creator joins right after; idle starts on the first leave
            idle_since: None,
        };
        tokio::spawn(room.run(cmd_rx, bcast_rx));
        Self { key, cmd, broadcast }
    }

    pub fn key(&self) -> &str { &self.key }

    /// True when both handles drive the same room task.
    pub fn same_room(&self, other: &RoomHandle) -> bool {
        self.cmd.same_channel(&other.cmd)
    }

    /// Registers a client and returns the file list as it was at that moment.
    /// A `greet` frame is queued on `tx` ahead of any broadcast, and the client
    /// is registered by the time the peer can read it.
    pub async fn join(&self, id: ClientId, tx: Outbox, greet: Option<Greeting>) -> AppResult<Vec<String>> {
        self.ask(|reply| Cmd::Join { id, tx, greet, reply }).await
    }

    pub fn leave(&self, id: ClientId) {
        let _ = self.cmd.send(Cmd::Leave { id });
    }

    pub async fn begin_upload(&self, name: String) -> AppResult<Slot> {
        self.ask(|reply| Cmd::Begin { name, reply }).await
    }

    pub fn append(&self, slot: Slot, data: Bytes) -> AppResult<()> {
        self.tell(Cmd::Append { slot, data })
    }

    pub fn finish_upload(&self, slot: Slot) -> AppResult<()> {
        self.tell(Cmd::Finish { slot })
    }

    pub async fn files(&self) -> AppResult<Vec<String>> {
        self.ask(|reply| Cmd::Files { reply }).await
    }

    /// `index` is 1-based. Out of range gives `None`.
    pub async fn fetch(&self, index: usize) -> AppResult<Option<(String, Bytes)>> {
        self.ask(|reply| Cmd::Fetch { index, reply }).await
    }

    /// How long the client set has been empty, `None` while anyone is connected.
    pub async fn idle_for(&self) -> AppResult<Option<Duration>> {
        self.ask(|reply| Cmd::Idle { reply }).await
    }

    pub async fn client_count(&self) -> AppResult<usize> {
        self.ask(|reply| Cmd::Count { reply }).await
    }

    /// Queues a binary frame for every client currently in the room.
    pub fn broadcast(&self, frame: Bytes) -> AppResult<()> {
        self.broadcast.send(frame).map_err(|_| AppErr::RoomClosed)
    }

    fn tell(&self, cmd: Cmd) -> AppResult<()> {
        self.cmd.send(cmd).map_err(|_| AppErr::RoomClosed)
    }

    async fn ask<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Cmd) -> AppResult<T> {
        let (tx, rx) = oneshot::channel();
        self.tell(make(tx))?;
        rx.await.map_err(|_| AppErr::RoomClosed)
    }
}

/* ---------------- task ---------------- */
impl Room {
    async fn run(
        mut self,
        mut cmd_rx: mpsc::UnboundedReceiver<Cmd>,
        mut bcast_rx: mpsc::UnboundedReceiver<Bytes>,
    ) {
        loop {
            tokio::select! {
                biased;
                Some(frame) = bcast_rx.recv() => self.fan_out(frame),
                Some(cmd) = cmd_rx.recv() => self.apply(cmd),
                else => break,
            }
        }
        info!(room = %self.key, "room task stopped");
    }

    fn apply(&mut self, cmd: Cmd) {
        match cmd {
            Cmd::Join { id, tx, greet, reply } => {
                let names = self.names();
                // fresh outbox, nothing queued ahead of the greeting
                let first = match greet {
                    Some(Greeting::RoomKey) => Some(protocol::room_key(&self.key)),
                    Some(Greeting::FileList) => Some(protocol::file_list(&names)),
                    None => None,
                };
                if let Some(m) = first {
                    let _ = tx.try_send(m);
                }
                self.clients.insert(id, tx);
                self.idle_since = None;
                let _ = reply.send(names);
            }
            Cmd::Leave { id } => {
                self.clients.remove(&id);
                if self.clients.is_empty() {
                    self.idle_since = Some(Instant::now());
                }
            }
            Cmd::Begin { name, reply } => {
                let slot = self.files.len();
                debug!(room = %self.key, %name, slot, "upload started");
                self.files.push(StoredFile { name, body: Body::Receiving(BytesMut::new()) });
                let _ = reply.send(slot);
            }
            Cmd::Append { slot, data } => match self.files.get_mut(slot).map(|f| &mut f.body) {
                Some(Body::Receiving(buf)) => buf.extend_from_slice(&data),
                Some(Body::Complete(_)) => warn!(room = %self.key, slot, "chunk after EOF dropped"),
                None => warn!(room = %self.key, slot, "chunk for unknown upload dropped"),
            },
            Cmd::Finish { slot } => {
                if let Some(f) = self.files.get_mut(slot) {
                    if let Body::Receiving(buf) = &mut f.body {
                        let done = std::mem::take(buf).freeze();
                        f.body = Body::Complete(done);
                    }
                    info!(room = %self.key, name = %f.name, bytes = f.body.len(), "upload complete");
                }
            }
            Cmd::Files { reply } => {
                let _ = reply.send(self.names());
            }
            Cmd::Fetch { index, reply } => {
                let hit = index
                    .checked_sub(1)
                    .and_then(|i| self.files.get(i))
                    .map(|f| {
                        if let Body::Receiving(_) = f.body {
                            debug!(room = %self.key, name = %f.name, "serving partial upload");
                        }
                        (f.name.clone(), f.body.snapshot())
                    });
                let _ = reply.send(hit);
            }
            Cmd::Idle { reply } => {
                let _ = reply.send(self.idle_since.map(|t| t.elapsed()));
            }
            Cmd::Count { reply } => {
                let _ = reply.send(self.clients.len());
            }
        }
    }

    fn fan_out(&mut self, frame: Bytes) {
        let key = &self.key;
        // a client whose queue is full is treated like a failed write
        self.clients.retain(|id, tx| match tx.try_send(Message::Binary(frame.to_vec())) {
            Ok(()) => true,
            Err(e) => {
                warn!(room = %key, client = %id, "broadcast write failed, dropping client: {e}");
                false
            }
        });
        if self.clients.is_empty() && self.idle_since.is_none() {
            self.idle_since = Some(Instant::now());
        }
    }

    fn names(&self) -> Vec<String> {
        self.files.iter().map(|f| f.name.clone()).collect()
    }
}
