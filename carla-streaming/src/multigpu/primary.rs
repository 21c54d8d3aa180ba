//! The primary side of the multi-GPU control plane: accepts connections
//! from secondary render nodes, dispatches commands to them round-robin or
//! to a specific node, and feeds responses back through a [`Correlator`].

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;

use byteorder::{ByteOrder, LittleEndian};
use dashmap::DashMap;
use slog::{info, o, warn, Logger};
use tokio::net::TcpListener;

use crate::buffer::{BufferPool, BufferView};
use crate::executor::Executor;
use crate::net::frame::Message;
use crate::net::session::{Session, DEFAULT_SESSION_TIMEOUT};
use crate::multigpu::commands::{join_command, MultiGPUCommand};
use crate::multigpu::correlator::{Correlator, CorrelatorError};
use crate::multigpu::directory::{BoxFuture, SecondaryDispatch, TokenDirectory};
use crate::streaming::token::{Token, TOKEN_SIZE};

#[derive(Debug)]
pub enum PrimaryError {
    NoSecondaryConnected,
    RequestAlreadyPending,
    SessionClosed,
    Io(std::io::Error),
}

impl From<std::io::Error> for PrimaryError {
    fn from(e: std::io::Error) -> Self {
        PrimaryError::Io(e)
    }
}

/// Listens for secondary render nodes and dispatches multi-GPU commands to
/// them. Holds the live session table and the round-robin cursor that
/// spreads newly activated sensors across connected nodes.
pub struct Primary {
    sessions: DashMap<u32, Arc<Session>>,
    next_session_id: AtomicU32,
    round_robin: AtomicUsize,
    correlator: Correlator,
    directory: Arc<TokenDirectory>,
    pool: BufferPool,
    executor: Executor,
    log: Logger,
}

impl Primary {
    pub fn new(executor: Executor, pool: BufferPool, directory: Arc<TokenDirectory>, log: Logger) -> Arc<Primary> {
        Arc::new(Primary {
            sessions: DashMap::new(),
            next_session_id: AtomicU32::new(1),
            round_robin: AtomicUsize::new(0),
            correlator: Correlator::new(),
            directory,
            pool,
            executor,
            log: log.new(o!("component" => "multigpu_primary")),
        })
    }

    pub fn connected_count(&self) -> usize {
        self.sessions.len()
    }

    /// Binds `addr` and accepts secondary connections until the listener
    /// errors. Each accepted connection becomes a [`Session`] whose inbound
    /// messages are treated as responses to outstanding requests.
    pub async fn listen(self: &Arc<Self>, addr: SocketAddr) -> std::io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!(self.log, "multi-gpu primary listening"; "addr" => %addr);
        loop {
            let (stream, peer) = listener.accept().await?;
            let session_id = self.next_session_id.fetch_add(1, Ordering::SeqCst);
            info!(self.log, "secondary connected"; "session_id" => session_id, "peer" => %peer);

            let this = self.clone();
            let this_for_close = self.clone();
            let session = Session::open(
                session_id,
                stream,
                self.pool.clone(),
                DEFAULT_SESSION_TIMEOUT,
                &self.executor,
                self.log.clone(),
                Arc::new(move |payload| this.on_message(session_id, payload)),
                Box::new(move |id| this_for_close.on_closed(id)),
            );
            self.sessions.insert(session_id, session);
        }
    }

    fn on_message(&self, session_id: u32, payload: BufferView) {
        if !self.correlator.resolve(session_id, payload) {
            warn!(self.log, "got data from secondary without a pending request"; "session_id" => session_id);
        }
    }

    fn on_closed(&self, session_id: u32) {
        self.sessions.remove(&session_id);
        self.correlator.cancel(session_id);
        self.directory.invalidate_server(session_id);
        info!(self.log, "secondary disconnected"; "session_id" => session_id);
    }

    /// Picks the next session in round-robin order among currently
    /// connected secondaries, advancing the cursor.
    fn pick_next(&self) -> Option<(u32, Arc<Session>)> {
        let snapshot: Vec<(u32, Arc<Session>)> = self
            .sessions
            .iter()
            .map(|entry| (*entry.key(), entry.value().clone()))
            .collect();
        if snapshot.is_empty() {
            return None;
        }
        let index = self.round_robin.fetch_add(1, Ordering::SeqCst) % snapshot.len();
        Some(snapshot[index].clone())
    }

    fn session_for(&self, server_id: u32) -> Option<Arc<Session>> {
        self.sessions.get(&server_id).map(|entry| entry.value().clone())
    }

    async fn request(&self, server_id: u32, session: &Arc<Session>, id: MultiGPUCommand, body: &[u8]) -> Result<BufferView, PrimaryError> {
        let rx = self.correlator.begin(server_id).map_err(|e| match e {
            CorrelatorError::AlreadyPending => PrimaryError::RequestAlreadyPending,
            CorrelatorError::SessionClosed => PrimaryError::SessionClosed,
        })?;
        let payload = join_command(id, body);
        session
            .write(Message::single(BufferView::from(payload)))
            .map_err(|_| PrimaryError::SessionClosed)?;
        rx.await.map_err(|_| PrimaryError::SessionClosed)
    }

    /// Sends `body` to every connected secondary without waiting for a
    /// response. Used for fire-and-forget broadcasts like `SendFrame` and
    /// `LoadMap`.
    pub fn broadcast(&self, id: MultiGPUCommand, body: &[u8]) -> usize {
        let payload = join_command(id, body);
        let mut sent = 0;
        for entry in self.sessions.iter() {
            let msg = Message::single(BufferView::from(payload.clone()));
            if entry.value().write(msg).is_ok() {
                sent += 1;
            }
        }
        sent
    }

    /// Sends `body` to one specific secondary without waiting for a
    /// response.
    pub fn write_to_one(&self, server_id: u32, id: MultiGPUCommand, body: &[u8]) -> Result<(), PrimaryError> {
        let session = self.session_for(server_id).ok_or(PrimaryError::NoSecondaryConnected)?;
        let payload = join_command(id, body);
        session
            .write(Message::single(BufferView::from(payload)))
            .map_err(|_| PrimaryError::SessionClosed)
    }
}

impl SecondaryDispatch for Primary {
    fn dispatch_get_token<'a>(&'a self, sensor_id: u32) -> BoxFuture<'a, std::io::Result<(u32, Token)>> {
        Box::pin(async move {
            let (server_id, session) = self.pick_next().ok_or_else(|| {
                std::io::Error::new(std::io::ErrorKind::NotConnected, "no secondary servers connected")
            })?;
            let mut body = [0u8; 4];
            LittleEndian::write_u32(&mut body, sensor_id);
            let response = self
                .request(server_id, &session, MultiGPUCommand::GetToken, &body)
                .await
                .map_err(primary_error_to_io)?;
            if response.len() != TOKEN_SIZE {
                return Err(std::io::Error::new(std::io::ErrorKind::InvalidData, "malformed token response"));
            }
            let bytes: [u8; TOKEN_SIZE] = response.as_slice().try_into().unwrap();
            Ok((server_id, Token::from_bytes(&bytes)))
        })
    }

    fn send_set_ros<'a>(&'a self, server_id: u32, sensor_id: u32, enable: bool) -> BoxFuture<'a, std::io::Result<bool>> {
        Box::pin(async move {
            let session = self
                .session_for(server_id)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "secondary disconnected"))?;
            let mut body = [0u8; 4];
            LittleEndian::write_u32(&mut body, sensor_id);
            let command = if enable { MultiGPUCommand::EnableRos } else { MultiGPUCommand::DisableRos };
            let response = self
                .request(server_id, &session, command, &body)
                .await
                .map_err(primary_error_to_io)?;
            Ok(response.as_slice().first().copied().unwrap_or(0) != 0)
        })
    }

    fn send_is_ros_enabled<'a>(&'a self, server_id: u32, sensor_id: u32) -> BoxFuture<'a, std::io::Result<bool>> {
        Box::pin(async move {
            let session = self
                .session_for(server_id)
                .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotConnected, "secondary disconnected"))?;
            let mut body = [0u8; 4];
            LittleEndian::write_u32(&mut body, sensor_id);
            let response = self
                .request(server_id, &session, MultiGPUCommand::IsEnabledRos, &body)
                .await
                .map_err(primary_error_to_io)?;
            Ok(response.as_slice().first().copied().unwrap_or(0) != 0)
        })
    }
}

fn primary_error_to_io(e: PrimaryError) -> std::io::Error {
    match e {
        PrimaryError::NoSecondaryConnected => std::io::Error::new(std::io::ErrorKind::NotConnected, "no secondary connected"),
        PrimaryError::RequestAlreadyPending => std::io::Error::new(std::io::ErrorKind::WouldBlock, "request already pending for this secondary"),
        PrimaryError::SessionClosed => std::io::Error::new(std::io::ErrorKind::BrokenPipe, "secondary session closed"),
        PrimaryError::Io(e) => e,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration as StdDuration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpStream;

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn round_robin_cycles_through_connected_sessions() {
        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let directory = Arc::new(TokenDirectory::new(test_logger()));
        let primary = Primary::new(executor.clone(), pool, directory, test_logger());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let primary_listener = primary.clone();
        executor.spawn(async move {
            let _ = primary_listener.listen(addr).await;
        });

        let mut clients = Vec::new();
        for _ in 0..3 {
            clients.push(TcpStream::connect(addr).await.unwrap());
        }
        tokio::time::sleep(StdDuration::from_millis(100)).await;
        assert_eq!(primary.connected_count(), 3);

        let mut picked = Vec::new();
        for _ in 0..6 {
            let (server_id, _) = primary.pick_next().unwrap();
            picked.push(server_id);
        }
        assert_eq!(&picked[0..3], &picked[3..6]);

        for mut c in clients {
            let _ = c.shutdown().await;
        }
    }

    #[tokio::test]
    async fn get_token_round_trips_through_a_fake_secondary() {
        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let directory = Arc::new(TokenDirectory::new(test_logger()));
        let primary = Primary::new(executor.clone(), pool, directory.clone(), test_logger());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let primary_listener = primary.clone();
        executor.spawn(async move {
            let _ = primary_listener.listen(addr).await;
        });

        let mut client = TcpStream::connect(addr).await.unwrap();
        tokio::time::sleep(StdDuration::from_millis(50)).await;

        // Fake secondary: read the GetToken request and reply with a token.
        executor.spawn(async move {
            let mut header = [0u8; 4];
            client.read_exact(&mut header).await.unwrap();
            let size = LittleEndian::read_u32(&header);
            let mut body = vec![0u8; size as usize];
            client.read_exact(&mut body).await.unwrap();

            let addr: SocketAddr = "10.0.0.5:7000".parse().unwrap();
            let token = Token::new(99, addr).to_bytes();
            client.write_all(&(token.len() as u32).to_le_bytes()).await.unwrap();
            client.write_all(&token).await.unwrap();
        });

        let token = directory.get_token(primary.as_ref(), 7).await.unwrap();
        assert_eq!(token.stream_id, 99);
    }
}
