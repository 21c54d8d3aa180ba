//! The sensor side stream server: accepts client connections, mints tokens
//! for newly registered streams, and fans frames out to every session
//! subscribed to a stream.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use slog::{debug, info, o, warn, Logger};
use tokio::net::TcpListener;
use tokio::sync::Notify;

use crate::buffer::{BufferPool, BufferView};
use crate::executor::Executor;
use crate::net::frame::{self, Message};
use crate::net::session::{Session, SessionState};
use crate::streaming::token::Token;

/// Whether a stream tolerates dropping in-flight frames to stay caught up
/// with the producer, or must deliver every frame it is handed, in order.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FanoutMode {
    /// A new frame replaces any not-yet-sent frame still queued for a
    /// session. Appropriate for camera-style sensors where only the latest
    /// frame matters.
    Lossy,
    /// Every frame handed to `send` is delivered, in order. Appropriate for
    /// control-style channels where a gap would be a correctness bug.
    Synchronous,
}

struct LossySlot {
    pending: Mutex<Option<BufferView>>,
    notify: Notify,
}

struct Attachment {
    session: Arc<Session>,
    lossy_slot: Option<Arc<LossySlot>>,
}

struct StreamState {
    mode: FanoutMode,
    attachments: Mutex<Vec<Attachment>>,
}

/// Owns every registered stream and the sessions subscribed to each.
pub struct StreamServer {
    streams: DashMap<u32, Arc<StreamState>>,
    next_stream_id: AtomicU32,
    pool: BufferPool,
    executor: Executor,
    log: Logger,
}

impl StreamServer {
    pub fn new(executor: Executor, pool: BufferPool, log: Logger) -> Arc<StreamServer> {
        Arc::new(StreamServer {
            streams: DashMap::new(),
            next_stream_id: AtomicU32::new(1),
            pool,
            executor,
            log: log.new(o!("component" => "stream_server")),
        })
    }

    /// Registers a new stream and returns the id a sensor will publish
    /// under. Minting the client-facing [`Token`] is the caller's job,
    /// since it needs to know the externally reachable address this server
    /// is listening on.
    pub fn register_stream(&self, mode: FanoutMode) -> u32 {
        let stream_id = self.next_stream_id.fetch_add(1, Ordering::SeqCst);
        self.streams.insert(
            stream_id,
            Arc::new(StreamState {
                mode,
                attachments: Mutex::new(Vec::new()),
            }),
        );
        stream_id
    }

    pub fn mint_token(&self, stream_id: u32, local_addr: SocketAddr) -> Token {
        Token::new(stream_id, local_addr)
    }

    /// Runs the accept loop. Each connection sends a single 4-byte
    /// little-endian stream id as its first frame, after which it is
    /// attached as a subscriber of that stream and receives no further
    /// control traffic.
    pub async fn listen(self: Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(self.log, "stream server listening"; "addr" => %addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            let this = self.clone();
            self.executor.spawn(async move {
                if let Err(e) = this.clone().accept_subscriber(stream, peer).await {
                    warn!(this.log, "subscriber handshake failed"; "peer" => %peer, "error" => %e);
                }
            });
        }
    }

    async fn accept_subscriber(
        self: Arc<Self>,
        mut stream: tokio::net::TcpStream,
        peer: SocketAddr,
    ) -> std::io::Result<()> {
        use tokio::io::AsyncReadExt;
        let mut header = [0u8; 4];
        stream.read_exact(&mut header).await?;
        let stream_id = frame::decode_header(&header);

        let Some(state) = self.streams.get(&stream_id).map(|r| r.clone()) else {
            warn!(self.log, "subscriber requested unknown stream"; "stream_id" => stream_id, "peer" => %peer);
            return Ok(());
        };

        let session_id = peer.port() as u32 | ((stream_id) << 16);
        let streams = self.streams.clone();
        let session = Session::open(
            session_id,
            stream,
            self.pool.clone(),
            crate::net::session::DEFAULT_SESSION_TIMEOUT,
            &self.executor,
            self.log.clone(),
            Arc::new(|_payload| {
                // Stream subscribers are write-only from the server's
                // perspective; inbound bytes (if any) are ignored.
            }),
            Box::new(move |id| {
                if let Some(entry) = streams.get(&stream_id) {
                    entry
                        .attachments
                        .lock()
                        .unwrap()
                        .retain(|a| a.session.id() != id);
                }
            }),
        );

        let lossy_slot = match state.mode {
            FanoutMode::Lossy => {
                let slot = Arc::new(LossySlot {
                    pending: Mutex::new(None),
                    notify: Notify::new(),
                });
                spawn_lossy_forwarder(&self.executor, session.clone(), slot.clone());
                Some(slot)
            }
            FanoutMode::Synchronous => None,
        };

        state.attachments.lock().unwrap().push(Attachment {
            session,
            lossy_slot,
        });
        debug!(self.log, "subscriber attached"; "stream_id" => stream_id, "peer" => %peer);
        Ok(())
    }

    /// Sends one frame to every session currently attached to `stream_id`.
    /// Sessions that are no longer open are skipped; they are pruned when
    /// their `on_closed` callback fires rather than here.
    pub fn send(&self, stream_id: u32, payload: BufferView) {
        let Some(state) = self.streams.get(&stream_id) else {
            return;
        };
        let attachments = state.attachments.lock().unwrap();
        for attachment in attachments.iter() {
            if !attachment.session.is_open() {
                continue;
            }
            match &attachment.lossy_slot {
                Some(slot) => {
                    *slot.pending.lock().unwrap() = Some(payload.clone());
                    slot.notify.notify_one();
                }
                None => {
                    let _ = attachment
                        .session
                        .write(Message::single(payload.clone()));
                }
            }
        }
    }

    pub fn subscriber_count(&self, stream_id: u32) -> usize {
        self.streams
            .get(&stream_id)
            .map(|s| s.attachments.lock().unwrap().len())
            .unwrap_or(0)
    }
}

fn spawn_lossy_forwarder(executor: &Executor, session: Arc<Session>, slot: Arc<LossySlot>) {
    executor.spawn(async move {
        loop {
            slot.notify.notified().await;
            if session.state() != SessionState::Open {
                break;
            }
            let next = slot.pending.lock().unwrap().take();
            if let Some(view) = next {
                if session.write(Message::single(view)).is_err() {
                    break;
                }
            }
        }
    });
}
