// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Broker error types.

use thiserror::Error;

/// Errors raised by the broker model and its client surfaces.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Broker '{0}' is not started")]
    NotStarted(String),

    #[error("Broker '{0}' is already running")]
    AlreadyRunning(String),

    #[error("Connection refused: {0}")]
    ConnectionRefused(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Address not found: {0}")]
    AddressNotFound(String),

    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    #[error("Queue '{0}' already exists with a different configuration")]
    QueueExists(String),

    #[error("Address '{0}' does not allow auto-creation")]
    AutoCreateDisabled(String),

    #[error("{0} is closed")]
    Closed(&'static str),

    #[error("Message handler already set on queue {0}")]
    HandlerAlreadySet(String),

    #[error("Not connected: {0}")]
    NotConnected(String),

    #[error("Endpoint already bound: {0}")]
    AddressInUse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),
}

/// Convenience alias used across the broker crate.
pub type Result<T> = std::result::Result<T, BrokerError>;
