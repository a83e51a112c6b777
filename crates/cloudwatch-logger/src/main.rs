// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

#![cfg_attr(not(test), deny(clippy::panic))]
#![cfg_attr(not(test), deny(clippy::unwrap_used))]
#![cfg_attr(not(test), deny(clippy::expect_used))]
#![cfg_attr(not(test), deny(clippy::todo))]
#![cfg_attr(not(test), deny(clippy::unimplemented))]

mod config;

use std::{process::ExitCode, sync::Arc};
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

use cloudwatch_logs_stream::{
    forward_lines, HttpLogsApi, HttpLogsApiConfig, LogsApi, StreamSession,
};

use crate::config::{ForwarderConfig, DEFAULT_LOG_LEVEL};

fn filter_directives(log_level: &str) -> String {
    format!("h2=off,hyper=off,rustls=off,{log_level}")
}

#[tokio::main]
pub async fn main() -> ExitCode {
    let config = ForwarderConfig::from_env();
    let log_level = config
        .as_ref()
        .map_or(DEFAULT_LOG_LEVEL, |config| config.log_level.as_str());

    let filter = EnvFilter::try_new(filter_directives(log_level))
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_LEVEL));

    let subscriber = tracing_subscriber::fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_level(true)
        .with_thread_names(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("setting default subscriber failed: {e}");
        return ExitCode::FAILURE;
    }

    debug!("Logging subsystem enabled");

    let config = match config {
        Ok(config) => config,
        Err(e) => {
            error!("CWL | {e}");
            return ExitCode::FAILURE;
        }
    };

    let api = HttpLogsApi::new(&HttpLogsApiConfig {
        endpoint: config.endpoint.clone(),
        https_proxy: config.https_proxy.clone(),
        timeout: config.stream.submission_timeout,
    });
    let session = StreamSession::new(Arc::new(api) as Arc<dyn LogsApi>, config.stream.clone());

    if let Err(e) = session.setup(config.identity()).await {
        error!("CWL | Unable to set up {}: {e}", config.identity());
        return ExitCode::FAILURE;
    }
    info!(
        "CWL | Forwarding stdin to {} via {}",
        config.identity(),
        config.endpoint
    );

    let cancel_token = CancellationToken::new();
    let signal_token = cancel_token.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => signal_token.cancel(),
            Err(e) => error!("CWL | Unable to listen for shutdown signal: {e}"),
        }
    });

    let stdin = BufReader::new(tokio::io::stdin());
    let mut exit_code = ExitCode::SUCCESS;
    tokio::select! {
        result = forward_lines(stdin, &session) => match result {
            Ok(count) => info!("CWL | End of input after {count} lines"),
            Err(e) => {
                error!("CWL | Forwarding stopped: {e}");
                exit_code = ExitCode::FAILURE;
            }
        },
        () = cancel_token.cancelled() => info!("CWL | Interrupted, draining buffered records"),
    }

    if let Err(e) = session.shutdown().await {
        error!("CWL | Shutdown failed: {e}");
        exit_code = ExitCode::FAILURE;
    }
    exit_code
}
