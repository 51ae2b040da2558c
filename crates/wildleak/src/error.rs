// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Harness errors.

use crate::config::ConfigError;
use thiserror::Error;
use wildleak_broker::BrokerError;

/// Errors that abort harness startup or a run.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Node '{node}' did not start within {waited_ms} ms")]
    StartupTimeout { node: String, waited_ms: u64 },

    #[error("Harness already shut down")]
    ShutDown,

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<tokio::task::JoinError> for HarnessError {
    fn from(err: tokio::task::JoinError) -> Self {
        HarnessError::Task(err.to_string())
    }
}
