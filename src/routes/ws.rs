use std::{sync::Arc, time::Duration};

use axum::{
    extract::{ws::{Message, WebSocket, WebSocketUpgrade}, Extension, Query},
    response::IntoResponse,
    routing::get,
    Router,
};
use futures_util::{
    sink::SinkExt,
    stream::{SplitSink, StreamExt},
};
use serde::Deserialize;
use tokio::{sync::mpsc, time::timeout};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    error::{bad, io, AppErr, AppResult},
    protocol::{self, ClientFrame},
    room::{ClientId, Greeting, Outbox, RoomHandle, Slot, OUTBOX_CAPACITY},
    state::RoomRegistry,
};

#[derive(Deserialize)]
pub struct WsQuery {
    role: Option<String>,
    key:  Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// Opens a fresh room and uploads into it.
    Sharer,
    /// Joins the room with this key and downloads from it.
    Receiver(String),
}

impl WsQuery {
    pub fn new(role: Option<&str>, key: Option<&str>) -> Self {
        Self { role: role.map(str::to_string), key: key.map(str::to_string) }
    }

    /// An explicit `role` must agree with the key; without one, a key means receiver.
    pub fn role(self) -> AppResult<Role> {
        let key = self.key.filter(|k| !k.is_empty());
        match (self.role.as_deref(), key) {
            (None, None)                                     => Ok(Role::Sharer),
            (None, Some(k))                                  => Ok(Role::Receiver(k)),
            (Some("share" | "sharer"), None)                 => Ok(Role::Sharer),
            (Some("share" | "sharer"), Some(_))              => Err(bad("a sharer cannot pass a room key")),
            (Some("receive" | "receiver"), Some(k))          => Ok(Role::Receiver(k)),
            (Some("receive" | "receiver"), None)             => Err(bad("a receiver needs a room key")),
            (Some(other), _)                                 => Err(AppErr::Bad(format!("unknown role {other:?}"))),
        }
    }
}

pub fn router() -> Router {
    Router::new().route("/ws", get(ws_handler))
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(q): Query<WsQuery>,
    Extension(rooms): Extension<RoomRegistry>,
    Extension(cfg): Extension<Arc<Config>>,
) -> AppResult<impl IntoResponse> {
    let role = q.role()?;
    let idle = cfg.idle_timeout;
    Ok(ws
        .max_message_size(cfg.max_frame)
        .max_frame_size(cfg.max_frame)
        .on_upgrade(move |s| client_ws(s, role, rooms, idle)))
}

/* ---------------- per connection ---------------- */
enum Flow { Continue, Stop }

struct Session {
    id:     ClientId,
    role:   Role,
    room:   RoomHandle,
    tx:     Outbox,
    /// Upload receiving binary chunks, if any.
    upload: Option<Slot>,
}

async fn client_ws(mut sock: WebSocket, role: Role, rooms: RoomRegistry, idle: Option<Duration>) {
    let id = ClientId::new_v4();

    /* resolve room */
    let room = match &role {
        Role::Sharer => rooms.create_room().await.map(|(_, r)| r),
        Role::Receiver(key) => rooms.lookup(key).await,
    };
    let room = match room {
        Ok(r) => r,
        Err(e) => {
            warn!(client = %id, "refusing connection: {e}");
            let reason = match e {
                AppErr::RoomNotFound(_) => "room not found",
                _ => "room unavailable",
            };
            let _ = sock.send(protocol::error(reason)).await;
            let _ = sock.close().await;
            return;
        }
    };

    let (sink, mut stream) = sock.split();
    let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
    let writer = tokio::spawn(write_loop(sink, rx));

    /* greet + register */
    let greet = match role {
        Role::Sharer => Greeting::RoomKey,
        Role::Receiver(_) => Greeting::FileList,
    };
    let joined = room.join(id, tx.clone(), Some(greet)).await;
    if let Err(e) = joined {
        warn!(client = %id, room = %room.key(), "join failed: {e}");
        drop(tx);
        let _ = writer.await;
        return;
    }
    info!(client = %id, room = %room.key(), role = ?role, "client joined");

    let mut s = Session { id, role, room, tx, upload: None };
    loop {
        let next = match idle {
            Some(d) => match timeout(d, stream.next()).await {
                Ok(n) => n,
                Err(_) => {
                    info!(client = %s.id, "idle timeout");
                    break;
                }
            },
            None => stream.next().await,
        };
        let msg = match next {
            Some(Ok(m)) => m,
            Some(Err(e)) => {
                debug!(client = %s.id, "read error: {e}");
                break;
            }
            None => break,
        };
        match s.on_frame(ClientFrame::from(msg)).await {
            Ok(Flow::Continue) => {}
            Ok(Flow::Stop) => break,
            Err(e) => {
                warn!(client = %s.id, "session aborted: {e}");
                break;
            }
        }
    }

    /* leave */
    if let Some(slot) = s.upload.take() {
        let _ = s.room.finish_upload(slot);
    }
    s.room.leave(s.id);
    info!(client = %s.id, room = %s.room.key(), "client left");
    drop(s);
    let _ = writer.await;
}

async fn write_loop(
    mut sink: SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<Message>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = sink.send(msg).await {
            debug!("write failed: {e}");
            return;
        }
    }
    let _ = sink.close().await;
}

impl Session {
    async fn on_frame(&mut self, frame: ClientFrame) -> AppResult<Flow> {
        let sharer = self.role == Role::Sharer;
        match frame {
            ClientFrame::File(name) if sharer => {
                if let Some(prev) = self.upload.take() {
                    self.room.finish_upload(prev)?;
                }
                debug!(client = %self.id, %name, "FILE");
                self.upload = Some(self.room.begin_upload(name).await?);
            }
            ClientFrame::Chunk(data) => match self.upload {
                Some(slot) => self.room.append(slot, data)?,
                None => debug!(client = %self.id, len = data.len(), "chunk without upload dropped"),
            },
            ClientFrame::Eof if sharer => {
                if let Some(slot) = self.upload.take() {
                    self.room.finish_upload(slot)?;
                }
            }
            ClientFrame::Close if sharer => return Ok(Flow::Stop),
            ClientFrame::Get(Some(n)) if !sharer => {
                match self.room.fetch(n).await? {
                    Some((name, data)) => {
                        debug!(client = %self.id, %name, len = data.len(), "GET");
                        // waits while the peer is not reading
                        for m in protocol::download(&name, data) {
                            self.tx.send(m).await.map_err(|_| io(std::io::ErrorKind::BrokenPipe))?;
                        }
                    }
                    None => debug!(client = %self.id, n, "GET out of range ignored"),
                }
            }
            ClientFrame::Get(None) => debug!(client = %self.id, "GET without a valid index ignored"),
            ClientFrame::Disconnect => return Ok(Flow::Stop),
            ClientFrame::Ignored => {}
            other => warn!(client = %self.id, role = ?self.role, frame = ?other, "frame not allowed, ignored"),
        }
        Ok(Flow::Continue)
    }
}
