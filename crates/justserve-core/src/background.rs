//! HTTP servers running in background tasks.

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// An `axum` server bound to its own listener, stoppable from outside.
#[derive(Debug)]
pub(crate) struct BackgroundServer {
    addr: SocketAddr,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl BackgroundServer {
    /// Serve `router` on `listener` until `cancel` fires.
    ///
    /// `on_error` runs if the accept loop dies on its own.
    pub(crate) fn spawn<F>(
        listener: TcpListener,
        router: Router,
        cancel: CancellationToken,
        on_error: F,
    ) -> std::io::Result<Self>
    where
        F: FnOnce(std::io::Error) + Send + 'static,
    {
        let addr = listener.local_addr()?;
        let signal = cancel.clone();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, router)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;

            match result {
                Ok(()) => tracing::debug!("Server on {} stopped", addr),
                Err(e) => {
                    tracing::error!("Server on {} failed: {}", addr, e);
                    on_error(e);
                }
            }
        });

        Ok(Self {
            addr,
            cancel,
            handle,
        })
    }

    /// Address the listener is bound to.
    pub(crate) fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    /// Stop accepting, let open requests drain for up to `timeout`, then
    /// abort whatever is left of the serve task.
    ///
    /// The listener is released as soon as the accept loop sees the signal.
    pub(crate) async fn shutdown(mut self, timeout: Duration) {
        self.cancel.cancel();

        if tokio::time::timeout(timeout, &mut self.handle).await.is_err() {
            tracing::warn!(
                "Server on {} did not drain within {:?}, forcing close",
                self.addr,
                timeout
            );
            self.handle.abort();
        }
    }
}
