//! Accept loop that gives up on resource exhaustion.
//!
//! `axum::serve` logs every accept error and retries after a pause. Errors
//! tied to a single peer are retried here too, but anything else (out of file
//! descriptors, out of memory) stops the server with
//! [`ServerError::Transport`].

use std::{
    future::{Future, IntoFuture},
    io,
    net::SocketAddr,
};

use axum::Router;
use tokio::{
    io::{AsyncRead, AsyncWrite},
    net::{TcpListener, TcpStream},
    sync::oneshot,
};

use crate::error::ServerError;

/// Source of inbound connections whose accept errors are visible.
pub(crate) trait Accept: Send + 'static {
    /// Accepted stream type.
    type Io: AsyncRead + AsyncWrite + Unpin + Send + 'static;

    /// Accept the next connection.
    fn try_accept(&mut self) -> impl Future<Output = io::Result<(Self::Io, SocketAddr)>> + Send;

    /// Address being listened on.
    fn local_addr(&self) -> io::Result<SocketAddr>;
}

impl Accept for TcpListener {
    type Io = TcpStream;

    fn try_accept(&mut self) -> impl Future<Output = io::Result<(TcpStream, SocketAddr)>> + Send {
        self.accept()
    }

    fn local_addr(&self) -> io::Result<SocketAddr> {
        TcpListener::local_addr(self)
    }
}

/// Errors that only concern the connection being accepted.
fn is_transient(err: &io::Error) -> bool {
    matches!(
        err.kind(),
        io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::Interrupted
    )
}

struct FailFast<A> {
    inner: A,
    fatal: Option<oneshot::Sender<io::Error>>,
}

impl<A: Accept> axum::serve::Listener for FailFast<A> {
    type Io = A::Io;
    type Addr = SocketAddr;

    async fn accept(&mut self) -> (Self::Io, Self::Addr) {
        loop {
            match self.inner.try_accept().await {
                Ok(accepted) => return accepted,
                Err(e) if is_transient(&e) => tracing::debug!("accept failed: {}", e),
                Err(e) => {
                    tracing::error!("cannot accept connections: {}", e);
                    if let Some(fatal) = self.fatal.take() {
                        let _ = fatal.send(e);
                    }
                    std::future::pending::<()>().await;
                },
            }
        }
    }

    fn local_addr(&self) -> io::Result<Self::Addr> {
        self.inner.local_addr()
    }
}

/// Serve `router` on `accept` until `shutdown` resolves or accepting fails
/// for good.
pub(crate) async fn serve_until<A, F>(
    accept: A,
    router: Router,
    shutdown: F,
) -> Result<(), ServerError>
where
    A: Accept,
    F: Future<Output = ()> + Send + 'static,
{
    let (fatal_tx, mut fatal_rx) = oneshot::channel();
    let listener = FailFast { inner: accept, fatal: Some(fatal_tx) };
    let serve = axum::serve(listener, router).with_graceful_shutdown(shutdown).into_future();

    tokio::select! {
        result = serve => Ok(result?),
        Ok(e) = &mut fatal_rx => Err(ServerError::Transport(format!("listener failed: {e}"))),
    }
}
