use super::{Error, Result};

use tokio::runtime::{Builder, Handle, Runtime};
use tracing::debug;

use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

/// A dedicated, bounded runtime for network work that may stall: transport bootstrap,
/// connection attempts and listener setup.
///
/// Sockets created on the pool keep being driven by its reactor, so the pool has to outlive
/// every connection it produced. Cloning is cheap; the runtime is shut down when the last
/// clone is dropped or [IoPool::shutdown] is called.
#[derive(Clone)]
pub struct IoPool {
    inner: Arc<Inner>,
}

struct Inner {
    handle: Handle,
    runtime: Mutex<Option<Runtime>>,
}

impl IoPool {
    pub fn new(worker_threads: usize) -> Result<IoPool> {
        let runtime = Builder::new_multi_thread()
            .worker_threads(worker_threads.max(1))
            .thread_name("network-io")
            .enable_all()
            .build()?;
        let handle = runtime.handle().clone();
        Ok(IoPool { inner: Arc::new(Inner { handle, runtime: Mutex::new(Some(runtime)) }) })
    }

    /// Runs `future` on the pool and waits for its output from the calling runtime.
    pub async fn run<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        match self.inner.handle.spawn(future).await {
            Ok(result) => result,
            Err(_) => Err(Error::IoPoolShutdown),
        }
    }

    pub fn spawn<F>(&self, future: F) -> tokio::task::JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.inner.handle.spawn(future)
    }

    /// Stops the pool without waiting for its tasks. Idempotent.
    pub fn shutdown(&self) {
        if let Some(runtime) = self.inner.runtime.lock().take() {
            debug!("shutting down network io pool");
            runtime.shutdown_background();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(runtime) = self.runtime.get_mut().take() {
            runtime.shutdown_background();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[actix_rt::test]
    async fn runs_on_the_pool_threads() {
        let pool = IoPool::new(2).unwrap();
        let name = pool
            .run(async { Ok(std::thread::current().name().map(|n| n.to_owned())) })
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some("network-io"));
    }

    #[actix_rt::test]
    async fn run_after_shutdown_fails() {
        let pool = IoPool::new(1).unwrap();
        pool.shutdown();
        pool.shutdown();
        assert!(matches!(pool.run(async { Ok(1) }).await, Err(Error::IoPoolShutdown)));
    }
}
