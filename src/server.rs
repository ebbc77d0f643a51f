use bytes::Bytes;
use dashmap::DashMap;
use futures::future::join_all;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::codec::{parse_stream, DecodeError};
use crate::config::Config;
use crate::connection::Connection;
use crate::database::Engine;
use crate::frame::Frame;
use crate::reply::Reply;
use crate::Error;

/// Binds the configured address and serves until a termination signal arrives.
pub async fn run(config: Config) -> Result<(), Error> {
    let _ = tracing_subscriber::fmt()
        .try_init()
        .map_err(|e| debug!("Failed to initialize global tracing: {}", e));

    let listener = TcpListener::bind(config.bind).await?;

    serve(listener, &config, shutdown_signal()).await
}

/// Serves connections accepted on `listener` until `shutdown` resolves, then closes every active
/// connection and the engine. Returns once all connection tasks have finished.
pub async fn serve(
    listener: TcpListener,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    serve_with_engine(listener, config.engine()?, config, shutdown).await
}

/// Like [`serve`], with an engine built by the caller instead of the one `config` names.
pub async fn serve_with_engine(
    listener: TcpListener,
    engine: Arc<dyn Engine>,
    config: &Config,
    shutdown: impl Future<Output = ()>,
) -> Result<(), Error> {
    let handler = Arc::new(Handler {
        engine,
        active: DashMap::new(),
        closing: CancellationToken::new(),
        drain_timeout: config.drain_timeout(),
        max_bulk_len: config.max_bulk_len,
    });
    let tracker = TaskTracker::new();

    info!("Server listening on {}", listener.local_addr()?);

    tokio::pin!(shutdown);
    loop {
        tokio::select! {
            res = listener.accept() => match res {
                Ok((socket, client_address)) => {
                    debug!("Accepted connection from {}", client_address);
                    let handler = handler.clone();
                    tracker.spawn(async move { handler.handle(socket, client_address).await });
                }
                Err(e) => error!("Failed to accept connection: {}", e),
            },
            _ = &mut shutdown => break,
        }
    }

    drop(listener);
    handler.close().await;

    tracker.close();
    tracker.wait().await;
    handler.engine.close();

    info!("Server stopped");
    Ok(())
}

/// Resolves on the first termination signal.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let kinds = [
            SignalKind::hangup(),
            SignalKind::quit(),
            SignalKind::terminate(),
            SignalKind::interrupt(),
        ];

        let mut streams = vec![];
        for kind in kinds {
            match signal(kind) {
                Ok(stream) => streams.push(stream),
                Err(e) => warn!("Failed to install signal handler: {}", e),
            }
        }

        if !streams.is_empty() {
            let received = streams.iter_mut().map(|s| Box::pin(s.recv()));
            futures::future::select_all(received).await;
            info!("Received termination signal, shutting down");
            return;
        }
    }

    match signal::ctrl_c().await {
        Ok(()) => info!("Received Ctrl-C, shutting down"),
        Err(e) => error!("Failed to listen for Ctrl-C: {}", e),
    }
}

/// State shared by every connection task of one server.
struct Handler {
    engine: Arc<dyn Engine>,
    active: DashMap<Uuid, Arc<Connection>>,
    /// Cancelled when the server starts shutting down. New connections are then refused.
    closing: CancellationToken,
    drain_timeout: Duration,
    max_bulk_len: usize,
}

impl Handler {
    #[instrument(
        name = "connection",
        skip(self, stream),
        fields(connection_id, client_address)
    )]
    async fn handle(&self, stream: TcpStream, client_address: SocketAddr) {
        if self.closing.is_cancelled() {
            debug!("Server is closing, refusing connection from {}", client_address);
            return;
        }

        let (reader, writer) = stream.into_split();
        let conn = Arc::new(Connection::new(writer, client_address, self.drain_timeout));

        tracing::Span::current()
            .record("connection_id", conn.id.to_string())
            .record("client_address", client_address.to_string());

        self.active.insert(conn.id, conn.clone());
        // Shutdown may have walked the registry between the check above and the insert.
        if self.closing.is_cancelled() {
            self.close_client(&conn).await;
            return;
        }

        info!("Connection opened");

        let mut payloads = parse_stream(reader, self.max_bulk_len);
        loop {
            let payload = tokio::select! {
                payload = payloads.recv() => payload,
                _ = conn.closed() => break,
            };

            match payload {
                Some(Ok(frame)) => self.on_frame(&conn, frame).await,
                Some(Err(err)) if !err.is_transport() => {
                    warn!("{}", err);
                    if let Err(e) = conn.write(&protocol_error(&err)).await {
                        info!("Failed to write error reply: {}", e);
                        break;
                    }
                }
                Some(Err(err)) => {
                    info!("Stopped reading: {}", err);
                    break;
                }
                None => break,
            }
        }

        self.close_client(&conn).await;
    }

    async fn on_frame(&self, conn: &Connection, frame: Frame) {
        let cmd_line: Vec<Bytes> = match frame {
            Frame::Array(args) if args.is_empty() => {
                debug!("Ignoring empty request");
                return;
            }
            Frame::Array(args) => args,
            frame => {
                warn!("Ignoring `{}`, requests must be arrays", frame);
                return;
            }
        };

        debug!("Received request: {:?}", cmd_line);
        let res = self.engine.exec(conn, &cmd_line).unwrap_or(Reply::UnknownError);
        debug!("Sending reply: {}", res);

        if let Err(e) = conn.write(&res).await {
            debug!("Failed to write reply: {}", e);
        }
    }

    async fn close_client(&self, conn: &Connection) {
        conn.close().await;
        self.engine.after_client_close(conn);
        self.active.remove(&conn.id);
        info!("Connection closed");
    }

    /// Stops accepting clients, then drains and closes every active connection concurrently.
    async fn close(&self) {
        info!("Shutting down");
        self.closing.cancel();

        let conns: Vec<Arc<Connection>> =
            self.active.iter().map(|entry| entry.value().clone()).collect();
        join_all(conns.iter().map(|conn| conn.close())).await;
    }
}

fn protocol_error(err: &DecodeError) -> Reply {
    Reply::error(format!("ERR {}", err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::ProtocolError;

    #[test]
    fn protocol_error_reply() {
        let err = DecodeError::from(ProtocolError::InvalidBulkLength("bad".to_string()));

        assert_eq!(
            protocol_error(&err).to_bytes(),
            Bytes::from("-ERR Protocol error: invalid bulk length 'bad'\r\n")
        );
    }
}
