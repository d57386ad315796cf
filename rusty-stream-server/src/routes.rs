use std::sync::Arc;

use axum::extract::{RawQuery, State};
use axum::http::header::CONTENT_TYPE;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Router;
use bytes::Bytes;
use rusty_stream_api::api::RequestArguments;
use rusty_stream_api::{is_identified_client, CLIENT_HEADER};
use tokio_util::sync::CancellationToken;

use crate::body::response_channel;
use crate::config::ServerConfig;
use crate::error::ExecError;
use crate::multiplexer::{Multiplexer, ResponseSink, StreamState};
use crate::output::OutputSource;
use crate::supervisor::ProcessSupervisor;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Every method on every path runs the command.
pub fn routes(config: Arc<ServerConfig>) -> Router {
    Router::new().fallback(run_command).with_state(config)
}

async fn run_command(
    State(config): State<Arc<ServerConfig>>,
    headers: HeaderMap,
    RawQuery(query): RawQuery,
) -> Response {
    let id = fastrand::u64(..);

    let client = headers
        .get(CLIENT_HEADER)
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .unwrap_or_default();
    if !is_identified_client(&client) {
        log::debug!(id, client:debug; "ignoring unidentified client");
        return ().into_response();
    }

    let arguments = request_arguments(id, &config, query.as_deref());
    let argv = config.command.argv_with(arguments.as_slice());
    log::info!(id; "received request");
    log::debug!(id; "argv: {argv:?}");

    let invocation = match config.mode.launcher().invocation(argv) {
        Ok(invocation) => invocation,
        Err(e) => return failure(id, &e),
    };
    let mut supervisor = config.capture.supervisor(invocation);
    let source = match supervisor.start() {
        Ok(source) => source,
        Err(e) => return failure(id, &e),
    };

    let (sink, cancel, body) = response_channel();
    tokio::spawn(execute(id, supervisor, source, sink, cancel));
    ([(CONTENT_TYPE, TEXT_PLAIN)], body).into_response()
}

/// The `?arg=` parameters, if the server permits them.
fn request_arguments(id: u64, config: &ServerConfig, query: Option<&str>) -> RequestArguments {
    let Some(query) = query.filter(|_| config.permit_arguments) else {
        return RequestArguments::default();
    };
    RequestArguments::from_query(query).unwrap_or_else(|e| {
        log::debug!(id, e:display; "ignoring malformed query");
        RequestArguments::default()
    })
}

fn failure(id: u64, error: &ExecError) -> Response {
    log::info!(id, error:display; "failed to start process");
    ([(CONTENT_TYPE, TEXT_PLAIN)], format!("{error}\n")).into_response()
}

/// Streams one started process into `sink` and reports how it ended.
pub async fn execute<K: ResponseSink>(
    id: u64,
    mut supervisor: Box<dyn ProcessSupervisor>,
    source: OutputSource,
    mut sink: K,
    cancel: CancellationToken,
) {
    let outcome = Multiplexer::new(id, source, supervisor.as_mut(), &mut sink, cancel)
        .run()
        .await;

    match (outcome.state, outcome.exit) {
        (StreamState::Done, Ok(())) => log::info!(id; "process exited successfully"),
        (StreamState::Done, Err(e)) => {
            log::info!(id, e:display; "process failed");
            // The client may already be gone, nothing to report to then.
            let _ = sink.write(Bytes::from(format!("{e}\n"))).await;
        }
        (state, exit) => log::info!(id, state:debug, exit:debug; "execution ended early"),
    }
}
