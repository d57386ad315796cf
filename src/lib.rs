//! This crate describes the wire protocol of a command streaming server.
//! Additionally there is a canonical server implementation in the same repository.
//!
//! The server runs one fixed command per request and streams its output back,
//! as raw bytes, while the command runs.
//!
//! ## Usage
//! * Any method on any path runs the command.
//! * The request must carry a [`CLIENT_HEADER`] containing [`CLIENT_MARKER`],
//!   otherwise the response is empty and nothing is run.
//! * If the server permits it, repeated `?arg=` parameters are appended to the command line.
//!   See [`api::RequestArguments`].
//!
//! ## Reading the response
//! The body is the combined stdout and stderr of the command.
//! While the command is silent the server writes a [`HEARTBEAT`] byte every
//! [`HEARTBEAT_PERIOD`] to keep the connection alive. Remove them with
//! [`strip_heartbeats`]. If the command fails, a one line description of the
//! failure is the last thing in the body.
//!
//! Disconnecting kills the command.
//!
//! ## Security
//! The identification check is not authentication, this is *remote execution as a service!*.
//! Make sure it is only reachable from trusted hosts. E.g. by means of ssh port forwarding.

use std::time::Duration;

pub mod api;

/// Written to keep an idle connection alive. Never part of the command output.
pub const HEARTBEAT: u8 = 0x00;

/// Time between two heartbeats.
pub const HEARTBEAT_PERIOD: Duration = Duration::from_secs(1);

/// Upper bound for the size of a single chunk of command output.
pub const CHUNK_SIZE: usize = 512;

/// Header identifying the client.
pub const CLIENT_HEADER: &str = "user-agent";

/// Must be contained in [`CLIENT_HEADER`], compared ascii case-insensitively.
pub const CLIENT_MARKER: &str = "curl";

/// Query key carrying additional command line arguments.
pub const ARGUMENT_KEY: &str = "arg";

/// Checks a [`CLIENT_HEADER`] value for the [`CLIENT_MARKER`].
///
/// ```
/// assert!(rusty_stream_api::is_identified_client("curl/8.5.0"));
/// assert!(rusty_stream_api::is_identified_client("Mozilla CURL"));
/// assert!(!rusty_stream_api::is_identified_client("Mozilla/5.0"));
/// ```
pub fn is_identified_client(header_value: &str) -> bool {
    header_value
        .to_ascii_lowercase()
        .contains(&CLIENT_MARKER.to_ascii_lowercase())
}

/// Removes all [`HEARTBEAT`] bytes from a response body.
///
/// ```
/// let body = b"\0\0hi\n\0";
/// assert_eq!(rusty_stream_api::strip_heartbeats(body), b"hi\n");
/// ```
pub fn strip_heartbeats(body: &[u8]) -> Vec<u8> {
    body.iter().copied().filter(|b| *b != HEARTBEAT).collect()
}
