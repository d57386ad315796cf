//! Drives one execution: forwards process output to the client, keeps the
//! connection alive while the process is silent and kills it when the client
//! goes away.

use std::future::Future;
use std::time::Duration;

use bytes::Bytes;
use rusty_stream_api::{HEARTBEAT, HEARTBEAT_PERIOD};
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::error::ExecError;
use crate::heartbeat::Heartbeat;
use crate::output::OutputSource;
use crate::supervisor::ProcessSupervisor;

/// How long a killed process gets to be reaped before it is given up on.
const REAP_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Error)]
#[error("response sink closed")]
pub struct SinkClosed;

/// Where the response bytes go.
pub trait ResponseSink: Send {
    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), SinkClosed>> + Send;

    /// Sinks that buffer push their buffer to the client here.
    fn flush(&mut self) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        async { Ok(()) }
    }
}

impl<T: ResponseSink> ResponseSink for &mut T {
    fn write(&mut self, chunk: Bytes) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        (**self).write(chunk)
    }

    fn flush(&mut self) -> impl Future<Output = Result<(), SinkClosed>> + Send {
        (**self).flush()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// Forwarding output and heartbeats.
    Running,
    /// Output ended, waiting for the process to exit.
    Draining,
    /// The client went away, the process was killed.
    Cancelled,
    /// The process exited on its own and was reaped.
    Done,
}

#[derive(Debug)]
pub struct StreamOutcome {
    /// Either [`StreamState::Done`] or [`StreamState::Cancelled`].
    pub state: StreamState,
    pub exit: Result<(), ExecError>,
}

enum Event {
    Output(Bytes),
    Heartbeat,
    EndOfOutput,
    Cancelled,
}

pub struct Multiplexer<'a, K> {
    id: u64,
    state: StreamState,
    source: OutputSource,
    supervisor: &'a mut dyn ProcessSupervisor,
    sink: &'a mut K,
    cancel: CancellationToken,
}

impl<'a, K: ResponseSink> Multiplexer<'a, K> {
    /// `cancel` fires when the client disconnects.
    pub fn new(
        id: u64,
        source: OutputSource,
        supervisor: &'a mut dyn ProcessSupervisor,
        sink: &'a mut K,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            id,
            state: StreamState::Running,
            source,
            supervisor,
            sink,
            cancel,
        }
    }

    /// Runs until the output ends or the client goes away, then reaps the process.
    ///
    /// Chunks reach the sink in the order they were read. Heartbeats may land
    /// anywhere between them.
    pub async fn run(mut self) -> StreamOutcome {
        let mut heartbeat = Heartbeat::start(HEARTBEAT_PERIOD);
        while self.state == StreamState::Running {
            let event = tokio::select! {
                chunk = self.source.next_chunk() => chunk.map_or(Event::EndOfOutput, Event::Output),
                () = heartbeat.tick() => Event::Heartbeat,
                () = self.cancel.cancelled() => Event::Cancelled,
            };
            self.handle(event).await;
        }
        heartbeat.stop();

        let exit = if self.state == StreamState::Draining {
            self.reap().await
        } else {
            self.abort().await
        };
        StreamOutcome {
            state: self.state,
            exit,
        }
    }

    async fn handle(&mut self, event: Event) {
        match event {
            Event::Output(chunk) => self.emit(chunk).await,
            Event::Heartbeat => self.emit(Bytes::from_static(&[HEARTBEAT])).await,
            Event::EndOfOutput => {
                log::debug!(id = self.id; "output ended");
                self.state = StreamState::Draining;
            }
            Event::Cancelled => {
                log::info!(id = self.id; "client disconnected");
                self.state = StreamState::Cancelled;
            }
        }
    }

    async fn emit(&mut self, chunk: Bytes) {
        let written = match self.sink.write(chunk).await {
            Ok(()) => self.sink.flush().await,
            Err(e) => Err(e),
        };
        if written.is_err() {
            log::info!(id = self.id; "client stopped receiving");
            self.state = StreamState::Cancelled;
        }
    }

    async fn reap(&mut self) -> Result<(), ExecError> {
        let exit = tokio::select! {
            exit = self.supervisor.wait() => exit,
            () = self.cancel.cancelled() => {
                log::info!(id = self.id; "client disconnected before the process exited");
                self.state = StreamState::Cancelled;
                return self.abort().await;
            }
        };
        self.state = StreamState::Done;
        exit
    }

    async fn abort(&mut self) -> Result<(), ExecError> {
        log::debug!(id = self.id; "killing process");
        self.supervisor.kill();
        if let Ok(exit) = tokio::time::timeout(REAP_GRACE, self.supervisor.wait()).await {
            log::debug!(id = self.id; "killed process reaped");
            exit
        } else {
            log::warn!(id = self.id, grace:debug = REAP_GRACE; "killed process did not exit");
            Err(ExecError::Capture(String::from("killed process did not exit")))
        }
    }
}
