//! Streaming response body fed by an execution task.

use std::convert::Infallible;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::body::Body;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::Stream;
use tokio_util::sync::{CancellationToken, DropGuard};

use crate::multiplexer::{ResponseSink, SinkClosed};

/// Frames queued between the execution task and hyper.
const BODY_CAPACITY: usize = 16;

/// Creates a streaming body and the sink writing into it.
///
/// The token is cancelled once hyper drops the body, which happens when the
/// client disconnects or the server shuts down.
pub fn response_channel() -> (ChannelSink, CancellationToken, Body) {
    let (tx, rx) = mpsc::channel(BODY_CAPACITY);
    let cancel = CancellationToken::new();
    let stream = BodyStream {
        frames: ReceiverStream::new(rx),
        _disconnect: cancel.clone().drop_guard(),
    };
    (ChannelSink { tx }, cancel, Body::from_stream(stream))
}

/// Writes into a body created by [`response_channel`].
#[derive(Debug)]
pub struct ChannelSink {
    tx: mpsc::Sender<Result<Bytes, Infallible>>,
}

impl ResponseSink for ChannelSink {
    async fn write(&mut self, chunk: Bytes) -> Result<(), SinkClosed> {
        self.tx.send(Ok(chunk)).await.map_err(|_| SinkClosed)
    }
}

struct BodyStream {
    frames: ReceiverStream<Result<Bytes, Infallible>>,
    _disconnect: DropGuard,
}

impl Stream for BodyStream {
    type Item = Result<Bytes, Infallible>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.frames).poll_next(cx)
    }
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;

    use super::*;

    #[tokio::test]
    async fn written_chunks_form_the_body() {
        let (mut sink, _cancel, body) = response_channel();
        let writer = tokio::spawn(async move {
            sink.write(Bytes::from("hello ")).await.unwrap();
            sink.write(Bytes::from("world")).await.unwrap();
        });
        let bytes = to_bytes(body, usize::MAX).await.unwrap();
        writer.await.unwrap();
        assert_eq!(bytes, "hello world");
    }

    #[tokio::test]
    async fn dropping_the_body_cancels() {
        let (mut sink, cancel, body) = response_channel();
        assert!(!cancel.is_cancelled());
        drop(body);
        assert!(cancel.is_cancelled());
        assert!(sink.write(Bytes::from("late")).await.is_err());
    }
}
