//! qstream CLI
//!
//! Sends one chat turn for (account, application, user) and prints the
//! aggregated result as JSON on stdout.

use clap::{Parser, ValueEnum};
use tracing::{error, info};

use qstream_cli::connection::{ConnectionConfig, GrpcTransport};
use qstream_cli::demo::{self, Overrides, TurnTarget};
use qstream_cli::qbusiness::QBusinessTransport;
use qstream_core::config::load_config;
use qstream_core::session::SessionError;
use qstream_core::tracing_init::init_tracing;
use qstream_core::transport::memory::{MemoryTransport, spawn_echo_backend};

/// Which backend carries the turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Backend {
    /// `qstream.v1.ChatService` over gRPC
    Grpc,
    /// Amazon Q Business `Chat`, credentials from the AWS environment
    QBusiness,
}

#[derive(Parser, Debug)]
#[command(name = "qstream")]
#[command(version, about = "Stream a chat turn to a qstream backend", long_about = None)]
struct Cli {
    /// Messages to send, in order (defaults to apple, banana, cherry)
    messages: Vec<String>,

    /// Account the turn runs under
    #[arg(long, default_value = "account")]
    account: String,

    /// Application the turn runs under
    #[arg(long, default_value = "app")]
    application: String,

    /// User the turn runs as
    #[arg(long, default_value = "user")]
    user: String,

    /// Backend to stream the turn to
    #[arg(long, value_enum, env = "QSTREAM_BACKEND", default_value_t = Backend::Grpc)]
    backend: Backend,

    /// Backend address (gRPC only)
    #[arg(long, env = "QSTREAM_ENDPOINT")]
    endpoint: Option<String>,

    /// Bearer token for the backend
    #[arg(long, env = "QSTREAM_AUTH_TOKEN", hide_env_values = true)]
    auth_token: Option<String>,

    /// Read messages from stdin, one per line
    #[arg(long, conflicts_with = "messages")]
    stdin: bool,

    /// Answer locally with the built-in echo backend, whatever `--backend` says
    #[arg(long)]
    offline: bool,

    /// Give up on the turn after this many seconds
    #[arg(long)]
    timeout: Option<u64>,

    /// Emit JSON log lines on stderr
    #[arg(long)]
    log_json: bool,
}

#[tokio::main]
#[allow(clippy::print_stdout)]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing("qstream=info", cli.log_json);
    info!(version = env!("CARGO_PKG_VERSION"), "Starting qstream");

    let project_dir = std::env::current_dir().ok();
    let mut config = load_config(project_dir.as_deref())?;
    Overrides {
        endpoint: cli.endpoint,
        auth_token: cli.auth_token,
        turn_timeout_secs: cli.timeout,
    }
    .apply(&mut config);

    let target = TurnTarget {
        account: cli.account,
        application: cli.application,
        user: cli.user,
    };
    let source = if cli.stdin {
        demo::stdin_source()
    } else {
        demo::message_source(cli.messages)
    };

    let outcome = if cli.offline {
        let (transport, listener) = MemoryTransport::with_config(&config.session);
        let _backend = spawn_echo_backend(listener);
        demo::run_turn(transport, &target, &config, source).await
    } else {
        match cli.backend {
            Backend::Grpc => {
                let transport = GrpcTransport::new(ConnectionConfig::from_config(&config));
                demo::run_turn(transport, &target, &config, source).await
            }
            Backend::QBusiness => {
                let transport = QBusinessTransport::from_config(&config);
                demo::run_turn(transport, &target, &config, source).await
            }
        }
    };

    match outcome {
        Ok(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        Err(e) => {
            if let SessionError::StreamAborted { partial, .. } = &e {
                error!(partial = %serde_json::to_string(partial)?, "Turn aborted");
            }
            if e.is_retryable() {
                error!("Connection failed; the turn may be retried");
            }
            Err(e.into())
        }
    }
}
