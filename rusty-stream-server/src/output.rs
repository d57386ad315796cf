//! Background workers reading the output of a child process.
//!
//! Each worker pushes chunks of at most [`CHUNK_SIZE`] bytes into a channel and
//! closes it when the output ends. A read error ends the output as well, after
//! its description has been sent as a last chunk.

use std::io::{self, Read};
use std::thread;

use bytes::Bytes;
use rusty_stream_api::CHUNK_SIZE;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;

/// Chunks buffered between a worker and the consumer.
const CHANNEL_CAPACITY: usize = 16;

/// Ordered, single-use output of one process.
#[derive(Debug)]
pub struct OutputSource {
    rx: mpsc::Receiver<Bytes>,
}

impl OutputSource {
    /// A source fed by the returned sender. It ends when all senders are dropped.
    pub fn channel() -> (mpsc::Sender<Bytes>, Self) {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        (tx, Self { rx })
    }

    /// The next chunk, or `None` once the output has ended.
    ///
    /// Cancel safe.
    pub async fn next_chunk(&mut self) -> Option<Bytes> {
        self.rx.recv().await
    }
}

/// Reads stdout and stderr concurrently on one task.
///
/// The order within each stream is kept, how the two interleave depends on timing.
pub fn spawn_pipe_reader<O, E>(stdout: O, stderr: E) -> OutputSource
where
    O: AsyncRead + Unpin + Send + 'static,
    E: AsyncRead + Unpin + Send + 'static,
{
    let (tx, source) = OutputSource::channel();
    tokio::spawn(async move {
        tokio::join!(pump(stdout, tx.clone()), pump(stderr, tx));
    });
    source
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, tx: mpsc::Sender<Bytes>) {
    let mut buf = [0u8; CHUNK_SIZE];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(Bytes::copy_from_slice(&buf[..n])).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                log::debug!(e:display; "pipe read failed");
                let _ = tx.send(Bytes::from(e.to_string())).await;
                break;
            }
        }
    }
}

/// Reads a pty master on a dedicated thread, its reads block.
///
/// # Errors
/// If the thread cannot be spawned.
pub fn spawn_pty_reader(mut reader: Box<dyn Read + Send>) -> io::Result<OutputSource> {
    let (tx, source) = OutputSource::channel();
    thread::Builder::new()
        .name(String::from("pty-reader"))
        .spawn(move || {
            let mut buf = [0u8; CHUNK_SIZE];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break,
                    Ok(n) => {
                        if tx.blocking_send(Bytes::copy_from_slice(&buf[..n])).is_err() {
                            break;
                        }
                    }
                    Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                    Err(e) if is_hangup(&e) => break,
                    Err(e) => {
                        log::debug!(e:display; "pty read failed");
                        let _ = tx.blocking_send(Bytes::from(e.to_string()));
                        break;
                    }
                }
            }
        })?;
    Ok(source)
}

/// Linux reports a closed slave side as `EIO` on the master instead of EOF.
fn is_hangup(e: &io::Error) -> bool {
    e.raw_os_error() == Some(nix::errno::Errno::EIO as i32)
}
