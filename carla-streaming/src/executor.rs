//! The thread pool every component runs on, and the per-session serializer
//! built on top of it.
//!
//! [`Executor`] wraps a multi-threaded `tokio` runtime, playing the role the
//! original implementation's `boost::asio::io_context` thread pool played:
//! a shared place to post work that gets picked up by whichever worker
//! thread is free. [`Strand`] is the "exactly one job running at a time"
//! primitive built on top of it — the idiomatic mapping is a dedicated task
//! draining an ordered channel of futures, so jobs posted to the same
//! strand never run concurrently with each other even though the executor
//! itself is multi-threaded.

use std::future::Future;
use std::io;
use std::pin::Pin;
use std::sync::Arc;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

type BoxedJob = Pin<Box<dyn Future<Output = ()> + Send>>;

/// A handle to a multi-threaded `tokio` runtime shared by every component in
/// the process.
#[derive(Clone)]
pub struct Executor {
    runtime: Arc<Runtime>,
}

impl Executor {
    pub fn new(worker_threads: usize) -> io::Result<Executor> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .enable_all()
            .build()?;
        Ok(Executor {
            runtime: Arc::new(runtime),
        })
    }

    /// Spawns a future onto the shared runtime without waiting for it.
    pub fn spawn<F>(&self, future: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.runtime.spawn(future);
    }

    /// Blocks the calling thread running a future to completion. Used by
    /// binaries to drive their top-level server loop.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }

    pub fn handle(&self) -> tokio::runtime::Handle {
        self.runtime.handle().clone()
    }
}

/// A FIFO serializer: jobs posted to the same `Strand` always run one after
/// another, in the order they were posted, even though they may be picked up
/// by different worker threads of the underlying executor over the
/// strand's lifetime.
pub struct Strand {
    tx: mpsc::UnboundedSender<BoxedJob>,
}

impl Strand {
    pub fn new(executor: &Executor) -> Strand {
        let (tx, mut rx) = mpsc::unbounded_channel::<BoxedJob>();
        executor.spawn(async move {
            while let Some(job) = rx.recv().await {
                job.await;
            }
        });
        Strand { tx }
    }

    /// Posts a job onto the strand. Returns immediately; the job itself may
    /// run later, after any jobs already queued ahead of it.
    pub fn post<F>(&self, job: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        // The strand's background task may have exited if the executor is
        // shutting down; dropping the job silently in that case matches
        // the rest of the crate's shutdown behavior (no retry after close).
        let _ = self.tx.send(Box::pin(job));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[test]
    fn jobs_run_in_posted_order() {
        let executor = Executor::new(4).unwrap();
        let strand = Strand::new(&executor);
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));

        for i in 0..20 {
            let order = order.clone();
            strand.post(async move {
                tokio::time::sleep(Duration::from_micros(100)).await;
                order.lock().unwrap().push(i);
            });
        }

        executor.block_on(async {
            tokio::time::sleep(Duration::from_millis(200)).await;
        });

        let observed = order.lock().unwrap().clone();
        let expected: Vec<i32> = (0..20).collect();
        assert_eq!(observed, expected);
    }

    #[test]
    fn executor_runs_spawned_work_across_threads() {
        let executor = Executor::new(4).unwrap();
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..50 {
            let counter = counter.clone();
            executor.spawn(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            });
        }

        executor.block_on(async {
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        assert_eq!(counter.load(Ordering::SeqCst), 50);
    }
}
