//! The stream capability the watcher consumes envelopes from.

use std::future::Future;
use std::pin::Pin;

use tokio::sync::mpsc;

use paasmon_core::App;

use crate::envelope::Envelope;
use crate::error::StreamError;

/// Ordered envelopes for one application. Ends when every sender is gone.
pub type EnvelopeStream = mpsc::Receiver<Envelope>;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Opens per-application envelope streams.
pub trait StreamProvider: Send + Sync {
    fn open_stream_for<'a>(
        &'a self,
        app: &'a App,
    ) -> BoxFuture<'a, Result<EnvelopeStream, StreamError>>;
}
