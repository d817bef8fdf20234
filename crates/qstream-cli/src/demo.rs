//! Demo runner: one chat turn from the command line.

use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use qstream_core::config::Config;
use qstream_core::{BoxError, ChatResult, EventSource, SessionError, Transport, prepare_turn};

/// Messages sent when none are given.
pub const DEFAULT_MESSAGES: [&str; 3] = ["apple", "banana", "cherry"];

/// Who the turn runs as.
#[derive(Debug, Clone)]
pub struct TurnTarget {
    pub account: String,
    pub application: String,
    pub user: String,
}

/// Command-line values layered over the resolved settings.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub endpoint: Option<String>,
    pub auth_token: Option<String>,
    pub turn_timeout_secs: Option<u64>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(endpoint) = &self.endpoint {
            config.connection.endpoint.clone_from(endpoint);
        }
        if let Some(token) = &self.auth_token {
            config.connection.auth_token = Some(token.clone());
        }
        if let Some(secs) = self.turn_timeout_secs {
            config.session.turn_timeout_secs = Some(secs);
        }
    }
}

/// The given messages, or the default fruit list when there are none.
pub fn message_source(messages: Vec<String>) -> EventSource {
    if messages.is_empty() {
        EventSource::from_values(DEFAULT_MESSAGES)
    } else {
        EventSource::from_values(messages)
    }
}

/// Stream stdin line by line. A read error ends the source with that error.
pub fn stdin_source() -> EventSource {
    let (tx, rx) = mpsc::channel::<Result<String, BoxError>>(16);
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            let item = match lines.next_line().await {
                Ok(Some(line)) if line.trim().is_empty() => continue,
                Ok(Some(line)) => Ok(line),
                Ok(None) => break,
                Err(e) => Err(BoxError::from(e)),
            };
            let failed = item.is_err();
            if tx.send(item).await.is_err() || failed {
                break;
            }
        }
    });
    EventSource::from_receiver(rx)
}

/// Run one turn. Ctrl-C cancels it.
pub async fn run_turn<T: Transport>(
    transport: T,
    target: &TurnTarget,
    config: &Config,
    source: EventSource,
) -> Result<ChatResult, SessionError> {
    let turn = prepare_turn(
        Arc::new(transport),
        target.account.as_str(),
        target.application.as_str(),
        target.user.as_str(),
    )?
    .with_settings(config.session.clone());

    let session = turn.session();
    let cancel = session.cancellation_token();
    let ctrl_c = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling turn");
            cancel.cancel();
        }
    });

    info!(identity = %turn.identity(), "Sending turn");
    let outcome = session.send(source).await;
    ctrl_c.abort();
    outcome
}
