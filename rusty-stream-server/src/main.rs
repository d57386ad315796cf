use std::future::IntoFuture;
use std::io;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, ValueHint};
use log::LevelFilter;
use tokio::net::{TcpListener, UnixListener};
use tokio::signal::unix::{signal, SignalKind};
use tower_http::trace::TraceLayer;

use crate::config::{CaptureMode, CommandSpec, ExecutionMode, ServerConfig};

mod body;
mod config;
mod error;
mod heartbeat;
mod launcher;
mod multiplexer;
mod output;
mod pty;
mod routes;
mod supervisor;
#[cfg(test)]
mod testing;

// Process groups, ptys and signals are only handled for unix.
#[cfg(not(unix))]
compile_error!("Only unix targets are supported!");

#[tokio::main]
async fn main() -> io::Result<ExitCode> {
    env_logger::builder()
        .filter_level(LevelFilter::Info)
        .filter(Some("tower_http"), LevelFilter::Debug)
        .filter(Some("rusty_stream_server"), LevelFilter::Debug)
        .parse_default_env()
        .init();

    let args = CliArgs::parse();
    if args.version {
        println!("{}", env!("CARGO_PKG_VERSION"));
        return Ok(ExitCode::FAILURE);
    }
    let addr = args.addr.clone();
    let config = Arc::new(args.into_config());

    log::info!(
        version = env!("CARGO_PKG_VERSION"),
        mode:debug = config.mode,
        capture:debug = config.capture,
        permit_arguments = config.permit_arguments;
        "Initializing server"
    );
    log::debug!("command: {:?}", config.command.argv());

    let router = routes::routes(config).layer(TraceLayer::new_for_http());

    let signal = if is_unix_socket(&addr) {
        let listener = UnixListener::bind(&addr)?;
        log::info!(path:display = addr; "listening to unix socket");
        let signal = serve_until_signal(axum::serve(listener, router.into_make_service())).await;
        // Unlike tcp, the socket file outlives the listener.
        if let Err(e) = std::fs::remove_file(&addr) {
            log::warn!(path:display = addr, e:display; "failed to remove unix socket");
        }
        signal?
    } else {
        let addr = tcp_address(&addr);
        let listener = TcpListener::bind(&addr).await?;
        log::info!(addr:display = addr; "listening to TCP");
        serve_until_signal(axum::serve(listener, router.into_make_service())).await?
    };

    log::info!(signal; "received signal, shutting down");
    Ok(ExitCode::FAILURE)
}

/// Exposes a command over http, streaming its output to every caller.
#[derive(Parser)]
#[allow(clippy::struct_excessive_bools)]
#[command(
    about,
    override_usage = "rusty-stream-server [OPTIONS] <COMMAND>..."
)]
struct CliArgs {
    /// Address to listen on. Addresses containing a `/` are unix socket paths.
    #[arg(
        short,
        long,
        value_name = "ADDR",
        value_hint = ValueHint::Other,
        default_value = ":8080",
        env = "RUSTY_STREAM_ADDR",
    )]
    addr: String,
    /// Execute the command directly instead of passing it to `sh -c`.
    #[arg(short = 'x', long, env = "RUSTY_STREAM_EXEC")]
    exec: bool,
    /// Permit clients to append command line arguments in the url
    /// (e.g. `http://example.com:8080/?arg=AAA&arg=BBB`).
    #[arg(long = "permit-argument", env = "RUSTY_STREAM_PERMIT_ARGUMENT")]
    permit_argument: bool,
    /// Run the command on a pseudo terminal instead of pipes.
    #[arg(short = 't', long, env = "RUSTY_STREAM_PTY")]
    pty: bool,
    /// Output version information and exit.
    #[arg(short = 'v', long)]
    version: bool,
    /// The command to run for every request. Everything after its first token belongs to it.
    #[arg(
        value_name = "COMMAND",
        required_unless_present = "version",
        trailing_var_arg = true,
        allow_hyphen_values = true,
    )]
    command: Vec<String>,
}

impl CliArgs {
    fn into_config(self) -> ServerConfig {
        ServerConfig {
            command: CommandSpec::new(self.command),
            mode: if self.exec {
                ExecutionMode::Exec
            } else {
                ExecutionMode::Shell
            },
            capture: if self.pty {
                CaptureMode::Pty
            } else {
                CaptureMode::Pipe
            },
            permit_arguments: self.permit_argument,
        }
    }
}

fn is_unix_socket(addr: &str) -> bool {
    addr.contains('/')
}

/// A bare `:port` listens on all interfaces.
fn tcp_address(addr: &str) -> String {
    if addr.starts_with(':') {
        format!("0.0.0.0{addr}")
    } else {
        addr.to_string()
    }
}

/// Serves until a shutdown signal arrives and returns its name.
///
/// The listener is closed when this returns.
async fn serve_until_signal<S>(server: S) -> io::Result<&'static str>
where
    S: IntoFuture<Output = io::Result<()>>,
{
    tokio::select! {
        result = server.into_future() => {
            result?;
            Err(io::Error::other("server stopped unexpectedly"))
        }
        signal = shutdown_signal() => signal,
    }
}

async fn shutdown_signal() -> io::Result<&'static str> {
    let mut hangup = signal(SignalKind::hangup())?;
    let mut interrupt = signal(SignalKind::interrupt())?;
    let mut terminate = signal(SignalKind::terminate())?;
    let mut quit = signal(SignalKind::quit())?;

    Ok(tokio::select! {
        _ = hangup.recv() => "SIGHUP",
        _ = interrupt.recv() => "SIGINT",
        _ = terminate.recv() => "SIGTERM",
        _ = quit.recv() => "SIGQUIT",
    })
}
