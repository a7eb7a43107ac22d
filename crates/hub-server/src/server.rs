//! Command-channel listener.
//!
//! Accepts TCP connections and spawns one independent [`Session`] per
//! device. A failing accept ends this loop only; sessions already running
//! are unaffected.

use std::net::SocketAddr;

use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use smarthub_oplog::OpLog;

use crate::ServerError;
use crate::command_source::CommandSource;
use crate::session::{Session, SessionContext};

/// TCP accept loop for the command channel.
pub struct CommandServer<C> {
    listener: TcpListener,
    local_addr: SocketAddr,
    ctx: SessionContext<C>,
    cancel: CancellationToken,
}

impl<C: CommandSource> CommandServer<C> {
    /// Binds the listener. Port 0 picks an ephemeral port.
    pub async fn bind(
        addr: SocketAddr,
        ctx: SessionContext<C>,
        cancel: CancellationToken,
    ) -> Result<Self, ServerError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| ServerError::Bind { addr, source })?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            ctx,
            cancel,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    fn oplog(&self) -> &OpLog {
        &self.ctx.oplog
    }

    /// Accepts connections until cancelled or until accept fails.
    pub async fn run(self) -> Result<(), ServerError> {
        self.oplog().record(format!(
            "TCP Smart Hub listening on {}",
            self.local_addr
        ));

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    tracing::info!("command server shutting down");
                    break Ok(());
                }

                result = self.listener.accept() => {
                    match result {
                        Ok((stream, peer)) => {
                            if let Err(e) = stream.set_nodelay(true) {
                                tracing::debug!(%peer, "set_nodelay failed: {e}");
                            }
                            let session = Session::new(stream, peer, self.ctx.clone());
                            let span = tracing::info_span!("session", %peer, id = %session.id());
                            tokio::spawn(
                                async move {
                                    let reason = session.run().await;
                                    tracing::debug!(%reason, "session finished");
                                }
                                .instrument(span),
                            );
                        }
                        Err(e) => {
                            self.oplog().warn(format!("Error on accept: {e}"));
                            break Err(ServerError::Accept(e));
                        }
                    }
                }
            }
        }
    }
}
