//! Reconnecting connection supervisor.

use crate::error::SyncResult;
use crate::events::{ConnComplete, ConnFinished};
use crate::handle::RepoHandle;
use crate::transport::Conn;
use docmesh_repo::CrdtEngine;
use docmesh_types::RepoId;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

impl<E: CrdtEngine> RepoHandle<E> {
    /// Keeps a connection to `remote` alive.
    ///
    /// Dials, registers the connection and waits for it to finish, then
    /// sleeps `delay` and dials again, whatever the reason the connection
    /// ended. Stops with [`ConnFinished::Canceled`] when `cancel` fires
    /// (tearing down the live connection), with
    /// [`ConnFinished::DialFailed`] when a dial fails, and with
    /// [`ConnFinished::LocalClose`] once the handle is closed.
    pub fn add_conn_with_retry<F, Fut, C>(
        &self,
        remote: RepoId,
        dial: F,
        delay: Duration,
        cancel: CancellationToken,
    ) -> ConnComplete
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = SyncResult<C>> + Send + 'static,
        C: Conn + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let handle = self.clone();
        tokio::spawn(async move {
            let reason = handle.supervise(remote, dial, delay, cancel).await;
            info!(%remote, ?reason, "connection supervisor stopped");
            let _ = tx.send(reason);
        });
        ConnComplete::new(rx)
    }

    async fn supervise<F, Fut, C>(
        &self,
        remote: RepoId,
        mut dial: F,
        delay: Duration,
        cancel: CancellationToken,
    ) -> ConnFinished
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = SyncResult<C>>,
        C: Conn + 'static,
    {
        loop {
            let conn = tokio::select! {
                _ = cancel.cancelled() => return ConnFinished::Canceled,
                dialed = dial() => match dialed {
                    Ok(conn) => conn,
                    Err(error) => {
                        warn!(%remote, %error, "dial failed");
                        return ConnFinished::DialFailed(error);
                    }
                },
            };

            let (generation, complete) = self.register(remote, Arc::new(conn)).await;
            let Some(generation) = generation else {
                return ConnFinished::LocalClose;
            };

            tokio::select! {
                finished = complete.wait() => {
                    debug!(%remote, ?finished, "supervised connection finished");
                }
                _ = cancel.cancelled() => {
                    self.remove_generation(remote, generation).await;
                    return ConnFinished::Canceled;
                }
            }

            if self.is_closed() {
                return ConnFinished::LocalClose;
            }

            tokio::select! {
                _ = cancel.cancelled() => return ConnFinished::Canceled,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
