// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Client surfaces: core sessions and an MQTT-style client.

pub mod core;
pub mod mqtt;

use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::thread::JoinHandle;
use std::time::Duration;

/// Latch opened once by `start()`.
#[derive(Default)]
pub(crate) struct StartGate {
    open: Mutex<bool>,
    cv: Condvar,
}

impl StartGate {
    pub(crate) fn open(&self) {
        *self.open.lock() = true;
        self.cv.notify_all();
    }

    /// Wait up to `timeout`; returns whether the gate is open.
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let mut open = self.open.lock();
        if !*open {
            self.cv.wait_for(&mut open, timeout);
        }
        *open
    }
}

/// Run a user callback, logging instead of unwinding into the delivery loop.
pub(crate) fn invoke_handler(what: &str, f: impl FnOnce()) {
    if catch_unwind(AssertUnwindSafe(f)).is_err() {
        tracing::warn!("{}: message handler panicked", what);
    }
}

/// Join a delivery thread unless called from that thread.
pub(crate) fn join_delivery_thread(handle: JoinHandle<()>) {
    if handle.thread().id() == std::thread::current().id() {
        return;
    }
    if handle.join().is_err() {
        tracing::warn!("Delivery thread panicked");
    }
}
