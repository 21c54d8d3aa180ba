//! The secondary (render node) side of the multi-GPU control plane: connects
//! out to a primary's listener, reconnecting on a fixed one-second backoff
//! if the connection drops or never comes up, and dispatches every inbound
//! command to an application-supplied processor.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use slog::{info, o, warn, Logger};
use tokio::net::TcpStream;

use crate::buffer::{BufferPool, BufferView};
use crate::executor::Executor;
use crate::multigpu::commands::{split_command, CommandHeader};
use crate::net::frame::Message;
use crate::net::session::{Session, DEFAULT_SESSION_TIMEOUT};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Handles one decoded command, optionally producing a reply payload that
/// is written back to the primary on the same session.
pub type CommandProcessor = Arc<dyn Fn(CommandHeader, BufferView) -> Option<Vec<u8>> + Send + Sync>;

/// Connects to a multi-GPU primary and keeps the connection alive,
/// reconnecting with a fixed delay whenever it drops.
///
/// Unlike [`crate::multigpu::primary::Primary`], which tracks many sessions,
/// a `SecondaryClient` only ever has one active session at a time — the
/// single connection back to its primary.
pub struct SecondaryClient {
    addr: SocketAddr,
    pool: BufferPool,
    executor: Executor,
    processor: CommandProcessor,
    log: Logger,
}

impl SecondaryClient {
    pub fn new(addr: SocketAddr, pool: BufferPool, executor: Executor, processor: CommandProcessor, log: Logger) -> Arc<SecondaryClient> {
        Arc::new(SecondaryClient {
            addr,
            pool,
            executor,
            processor,
            log: log.new(o!("component" => "multigpu_secondary", "primary" => addr.to_string())),
        })
    }

    /// Runs the connect/reconnect loop forever. Intended to be driven by
    /// the hosting binary's top-level task; never returns under normal
    /// operation.
    pub async fn run(self: Arc<Self>) {
        loop {
            match TcpStream::connect(self.addr).await {
                Ok(stream) => {
                    info!(self.log, "connected to primary");
                    let closed = tokio::sync::oneshot::channel::<()>();
                    self.clone().run_session(stream, closed.0);
                    let _ = closed.1.await;
                    warn!(self.log, "session with primary closed, reconnecting"; "delay_secs" => RECONNECT_DELAY.as_secs());
                }
                Err(e) => {
                    warn!(self.log, "connection to primary failed, retrying"; "error" => %e, "delay_secs" => RECONNECT_DELAY.as_secs());
                }
            }
            tokio::time::sleep(RECONNECT_DELAY).await;
        }
    }

    fn run_session(self: Arc<Self>, stream: TcpStream, closed_tx: tokio::sync::oneshot::Sender<()>) {
        let closed_tx = std::sync::Mutex::new(Some(closed_tx));
        let this = self.clone();
        let session_holder: Arc<std::sync::Mutex<Option<Arc<Session>>>> = Arc::new(std::sync::Mutex::new(None));
        let session_holder_for_message = session_holder.clone();

        let on_message: Arc<dyn Fn(BufferView) + Send + Sync> = Arc::new(move |payload| {
            let Some((header, body)) = split_command(payload.as_slice()) else {
                warn!(this.log, "dropping malformed command from primary");
                return;
            };
            if let Some(reply) = (this.processor)(header, BufferView::from(body.to_vec())) {
                if let Some(session) = session_holder_for_message.lock().unwrap().as_ref() {
                    let _ = session.write(Message::single(BufferView::from(reply)));
                }
            }
        });

        let session = Session::open(
            0,
            stream,
            self.pool.clone(),
            DEFAULT_SESSION_TIMEOUT,
            &self.executor,
            self.log.clone(),
            on_message,
            Box::new(move |_id| {
                if let Some(tx) = closed_tx.lock().unwrap().take() {
                    let _ = tx.send(());
                }
            }),
        );
        *session_holder.lock().unwrap() = Some(session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use crate::multigpu::commands::{join_command, MultiGPUCommand};
    use byteorder::{ByteOrder, LittleEndian};

    fn test_logger() -> Logger {
        Logger::root(slog::Discard, o!())
    }

    #[tokio::test]
    async fn dispatches_commands_and_writes_back_replies() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let executor = Executor::new(2).unwrap();
        let pool = BufferPool::new(4096);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        let processor: CommandProcessor = Arc::new(move |header, _body| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
            assert_eq!(header.id, MultiGPUCommand::YouAlive);
            Some(vec![1u8])
        });

        let client = SecondaryClient::new(addr, pool, executor.clone(), processor, test_logger());
        executor.spawn(async move {
            client.run().await;
        });

        let (mut server_stream, _) = listener.accept().await.unwrap();

        let payload = join_command(MultiGPUCommand::YouAlive, &[]);
        server_stream.write_all(&(payload.len() as u32).to_le_bytes()).await.unwrap();
        server_stream.write_all(&payload).await.unwrap();

        let mut header = [0u8; 4];
        server_stream.read_exact(&mut header).await.unwrap();
        let size = LittleEndian::read_u32(&header);
        let mut reply = vec![0u8; size as usize];
        server_stream.read_exact(&mut reply).await.unwrap();

        assert_eq!(reply, vec![1u8]);
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
