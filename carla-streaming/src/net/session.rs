//! Generic TCP session state machine shared by every long-lived connection
//! in the simulator: sensor stream subscribers, the multi-GPU primary's
//! listener side, and the multi-GPU secondary's client side all build on
//! this type rather than reimplementing socket bookkeeping.
//!
//! A session keeps exactly one read and one write in flight at any time.
//! Reads run directly on the session's own task since they are naturally
//! sequential; writes drain an ordered queue on a second task so that a
//! slow write never blocks the read side from observing a close. A third
//! task watches a single shared idle deadline, rearmed by either side
//! completing an I/O operation, and closes the session once nothing has
//! moved in either direction for the configured timeout.

use std::fmt;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use carla_common::error::{ErrorType, NetworkError};
use slog::{debug, o, warn, Logger};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, Notify};

use crate::buffer::{BufferPool, BufferView};
use crate::executor::Executor;
use crate::net::frame::{self, Message};

pub const DEFAULT_SESSION_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
#[repr(u8)]
pub enum SessionState {
    Connecting = 0,
    Open = 1,
    Closing = 2,
    Closed = 3,
}

impl From<u8> for SessionState {
    fn from(value: u8) -> Self {
        match value {
            0 => SessionState::Connecting,
            1 => SessionState::Open,
            2 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A callback invoked with every complete payload the peer sends.
pub type MessageHandler = Arc<dyn Fn(BufferView) + Send + Sync>;
/// A callback invoked exactly once, after the session has fully closed.
pub type ClosedHandler = Box<dyn FnOnce(u32) + Send>;

/// A generic, length-prefix-framed TCP session.
pub struct Session {
    id: u32,
    state: AtomicU8,
    write_tx: mpsc::UnboundedSender<Message>,
    close_signal: Notify,
    last_activity: Mutex<Instant>,
    log: Logger,
}

impl Session {
    /// Takes ownership of an already-connected socket and spawns its read
    /// and write loops on `executor`. The returned handle is already `Open`.
    #[allow(clippy::too_many_arguments)]
    pub fn open(
        id: u32,
        stream: TcpStream,
        pool: BufferPool,
        timeout: Duration,
        executor: &Executor,
        log: Logger,
        on_message: MessageHandler,
        on_closed: ClosedHandler,
    ) -> Arc<Session> {
        let _ = stream.set_nodelay(true);
        let (read_half, write_half) = stream.into_split();
        let (write_tx, write_rx) = mpsc::unbounded_channel::<Message>();

        let session = Arc::new(Session {
            id,
            state: AtomicU8::new(SessionState::Open as u8),
            write_tx,
            close_signal: Notify::new(),
            last_activity: Mutex::new(Instant::now()),
            log: log.new(o!("session_id" => id)),
        });

        let read_session = session.clone();
        let read_log = session.log.clone();
        executor.spawn(async move {
            read_loop(read_session, read_half, pool, on_message, read_log).await;
        });

        let write_session = session.clone();
        let write_log = session.log.clone();
        executor.spawn(async move {
            write_loop(write_session, write_half, write_rx, write_log, on_closed).await;
        });

        let idle_session = session.clone();
        let idle_log = session.log.clone();
        executor.spawn(async move {
            watch_idle(idle_session, timeout, idle_log).await;
        });

        debug!(session.log, "session opened");
        session
    }

    pub fn id(&self) -> u32 {
        self.id
    }

    pub fn state(&self) -> SessionState {
        SessionState::from(self.state.load(Ordering::SeqCst))
    }

    pub fn is_open(&self) -> bool {
        self.state() == SessionState::Open
    }

    /// Rearms the shared idle deadline. Called after every successful read
    /// or write, from either loop.
    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Instant::now();
    }

    fn idle_for(&self) -> Duration {
        self.last_activity.lock().unwrap().elapsed()
    }

    /// Queues a message for the write loop. Messages are written in the
    /// order this is called. Returns an error if the session is already
    /// closing or closed.
    pub fn write(&self, msg: Message) -> Result<(), NetworkError> {
        if self.state() != SessionState::Open {
            return Err(NetworkError::Fatal(ErrorType::Io(
                std::io::ErrorKind::NotConnected,
            )));
        }
        self.write_tx
            .send(msg)
            .map_err(|_| NetworkError::Fatal(ErrorType::Io(std::io::ErrorKind::BrokenPipe)))
    }

    /// Requests the session close. Idempotent: a session already closing or
    /// closed ignores further calls.
    pub fn close(&self) {
        let prev = self
            .state
            .compare_exchange(
                SessionState::Open as u8,
                SessionState::Closing as u8,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .unwrap_or_else(|prev| prev);
        if prev == SessionState::Open as u8 {
            self.close_signal.notify_waiters();
        }
    }

    fn mark_closed(&self) {
        self.state.store(SessionState::Closed as u8, Ordering::SeqCst);
    }
}

async fn read_loop(
    session: Arc<Session>,
    mut read_half: tokio::net::tcp::OwnedReadHalf,
    pool: BufferPool,
    on_message: MessageHandler,
    log: Logger,
) {
    loop {
        let outcome = tokio::select! {
            result = frame::read_message(&mut read_half, &pool) => result,
            _ = session.close_signal.notified() => break,
        };
        match outcome {
            Ok(Some(payload)) => {
                session.touch();
                on_message(payload);
            }
            Ok(None) => {
                debug!(log, "peer closed connection");
                break;
            }
            Err(e) => {
                warn!(log, "read error, closing session"; "error" => %e);
                break;
            }
        }
    }
    session.close();
}

async fn write_loop(
    session: Arc<Session>,
    mut write_half: tokio::net::tcp::OwnedWriteHalf,
    mut write_rx: mpsc::UnboundedReceiver<Message>,
    log: Logger,
    on_closed: ClosedHandler,
) {
    loop {
        let next = tokio::select! {
            msg = write_rx.recv() => msg,
            _ = session.close_signal.notified() => None,
        };
        let Some(msg) = next else { break };

        match frame::write_message(&mut write_half, &msg).await {
            Ok(()) => session.touch(),
            Err(e) => {
                warn!(log, "write error, closing session"; "error" => %e);
                break;
            }
        }
    }

    let _ = write_half.shutdown().await;
    session.mark_closed();
    debug!(log, "session closed");
    on_closed(session.id());
}

/// Watches the session's single shared idle deadline, closing it once
/// neither a read nor a write has completed for `timeout`.
async fn watch_idle(session: Arc<Session>, timeout: Duration, log: Logger) {
    loop {
        let idle = session.idle_for();
        if idle >= timeout {
            warn!(log, "session idle timeout, closing"; "timeout_secs" => timeout.as_secs());
            session.close();
            return;
        }
        tokio::select! {
            _ = tokio::time::sleep(timeout - idle) => {}
            _ = session.close_signal.notified() => return,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufferPool;
    use std::sync::atomic::AtomicUsize;
    use tokio::net::{TcpListener, TcpStream};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn open_transitions_to_open_and_delivers_messages() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let mut client = TcpStream::connect(addr).await.unwrap();
        let server_stream = accept.await.unwrap();

        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let received = Arc::new(AtomicUsize::new(0));
        let received_clone = received.clone();

        let session = Session::open(
            1,
            server_stream,
            pool,
            Duration::from_secs(5),
            &executor,
            test_logger(),
            Arc::new(move |_payload| {
                received_clone.fetch_add(1, Ordering::SeqCst);
            }),
            Box::new(|_id| {}),
        );
        assert_eq!(session.state(), SessionState::Open);

        client.write_all(&frame::encode_header(3)).await.unwrap();
        client.write_all(&[1, 2, 3]).await.unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(received.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let _client = TcpStream::connect(addr).await.unwrap();
        let server_stream = accept.await.unwrap();

        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let session = Session::open(
            2,
            server_stream,
            pool,
            Duration::from_secs(5),
            &executor,
            test_logger(),
            Arc::new(|_| {}),
            Box::new(|_| {}),
        );

        session.close();
        session.close();
        session.close();
        assert_eq!(session.state(), SessionState::Closing);
    }

    #[tokio::test]
    async fn write_after_close_is_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let accept = tokio::spawn(async move { listener.accept().await.unwrap().0 });
        let _client = TcpStream::connect(addr).await.unwrap();
        let server_stream = accept.await.unwrap();

        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let session = Session::open(
            3,
            server_stream,
            pool,
            Duration::from_secs(5),
            &executor,
            test_logger(),
            Arc::new(|_| {}),
            Box::new(|_| {}),
        );
        session.close();

        let msg = Message::single(BufferView::from(vec![1]));
        assert!(session.write(msg).is_err());
    }
}
