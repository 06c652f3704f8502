//! Firehose relay client.
//!
//! The relay speaks newline-delimited JSON over TCP: the client sends one
//! subscription line naming an app guid, the relay answers with that app's
//! envelopes, one per line, until either side hangs up.

use serde::Serialize;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use paasmon_core::{App, FirehoseConfig};
use paasmon_events::{BoxFuture, Envelope, EnvelopeStream, StreamError, StreamProvider};

#[derive(Serialize)]
struct Subscription<'a> {
    app_guid: &'a str,
}

/// Opens one relay connection per watched app.
pub struct TcpStreamProvider {
    address: String,
    buffer: usize,
}

impl TcpStreamProvider {
    pub fn new(address: impl Into<String>, buffer: usize) -> Self {
        Self {
            address: address.into(),
            buffer: buffer.max(1),
        }
    }

    pub fn from_config(config: &FirehoseConfig) -> Self {
        Self::new(config.address.clone(), config.buffer)
    }

    async fn subscribe(&self, app: &App) -> Result<TcpStream, StreamError> {
        let mut socket = TcpStream::connect(&self.address)
            .await
            .map_err(|e| StreamError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let subscribe_err = |reason: String| StreamError::Subscribe {
            app: app.guid.clone(),
            reason,
        };
        let mut line = serde_json::to_vec(&Subscription {
            app_guid: &app.guid,
        })
        .map_err(|e| subscribe_err(e.to_string()))?;
        line.push(b'\n');
        socket
            .write_all(&line)
            .await
            .map_err(|e| subscribe_err(e.to_string()))?;

        Ok(socket)
    }
}

impl StreamProvider for TcpStreamProvider {
    fn open_stream_for<'a>(
        &'a self,
        app: &'a App,
    ) -> BoxFuture<'a, Result<EnvelopeStream, StreamError>> {
        Box::pin(async move {
            let socket = self.subscribe(app).await?;
            let (tx, rx) = mpsc::channel(self.buffer);
            tokio::spawn(forward(app.guid.clone(), socket, tx));
            debug!(app = %app.guid, address = %self.address, "firehose stream opened");
            Ok(rx)
        })
    }
}

/// Decode envelopes from `socket` into `tx` until the relay hangs up or the
/// receiving watcher goes away.
async fn forward(app: String, socket: TcpStream, tx: mpsc::Sender<Envelope>) {
    let mut lines = BufReader::new(socket).lines();

    loop {
        tokio::select! {
            _ = tx.closed() => {
                debug!(%app, "firehose stream released");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<Envelope>(&line) {
                        Ok(envelope) => {
                            if tx.send(envelope).await.is_err() {
                                break;
                            }
                        }
                        Err(e) => trace!(%app, error = %e, "undecodable envelope skipped"),
                    }
                }
                Ok(None) => {
                    info!(%app, "firehose relay closed the stream");
                    break;
                }
                Err(e) => {
                    warn!(%app, error = %e, "firehose read failed");
                    break;
                }
            },
        }
    }
}
