// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! In-VM transport fabric.
//!
//! Servers bind acceptors at `host:port`; clients and cluster bridges connect
//! through the same fabric. Nothing leaves the process.

use crate::error::{BrokerError, Result};
use crate::server::ServerInner;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, Weak};

/// Protocol spoken by an acceptor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Core,
    Mqtt,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Core => write!(f, "core"),
            Protocol::Mqtt => write!(f, "mqtt"),
        }
    }
}

/// `host:port` pair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl Endpoint {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    /// Parse `tcp://host:port` (the scheme is optional).
    pub fn parse_url(url: &str) -> Result<Self> {
        let rest = url.strip_prefix("tcp://").unwrap_or(url);
        let (host, port) = rest
            .rsplit_once(':')
            .ok_or_else(|| BrokerError::InvalidUrl(url.to_string()))?;
        if host.is_empty() {
            return Err(BrokerError::InvalidUrl(url.to_string()));
        }
        let port = port
            .trim_end_matches('/')
            .parse::<u16>()
            .map_err(|_| BrokerError::InvalidUrl(url.to_string()))?;
        Ok(Self::new(host, port))
    }

    pub fn to_url(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

struct Acceptor {
    protocol: Protocol,
    server: Weak<ServerInner>,
}

/// Registry of live acceptors. Cloning shares the registry.
#[derive(Clone, Default)]
pub struct Fabric {
    acceptors: Arc<DashMap<Endpoint, Acceptor>>,
}

impl Fabric {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bind(
        &self,
        endpoint: Endpoint,
        protocol: Protocol,
        server: &Arc<ServerInner>,
    ) -> Result<()> {
        match self.acceptors.entry(endpoint) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().server.strong_count() > 0 {
                    return Err(BrokerError::AddressInUse(occupied.key().to_string()));
                }
                occupied.insert(Acceptor {
                    protocol,
                    server: Arc::downgrade(server),
                });
            }
            Entry::Vacant(vacant) => {
                vacant.insert(Acceptor {
                    protocol,
                    server: Arc::downgrade(server),
                });
            }
        }
        Ok(())
    }

    /// Remove the acceptor at `endpoint` if it belongs to `server`.
    pub(crate) fn unbind(&self, endpoint: &Endpoint, server: &Arc<ServerInner>) {
        self.acceptors
            .remove_if(endpoint, |_, a| std::ptr::eq(a.server.as_ptr(), Arc::as_ptr(server)));
    }

    /// Reach the started server behind `endpoint`.
    pub(crate) fn connect(&self, endpoint: &Endpoint, protocol: Protocol) -> Result<Arc<ServerInner>> {
        let refused = || BrokerError::ConnectionRefused(format!("{} ({})", endpoint, protocol));
        let acceptor = self.acceptors.get(endpoint).ok_or_else(refused)?;
        if acceptor.protocol != protocol {
            return Err(refused());
        }
        let server = acceptor.server.upgrade().ok_or_else(refused)?;
        drop(acceptor);
        if !server.is_started() {
            return Err(refused());
        }
        Ok(server)
    }

    /// True if a live acceptor is bound at `endpoint`.
    pub fn is_bound(&self, endpoint: &Endpoint) -> bool {
        self.acceptors
            .get(endpoint)
            .map(|a| a.server.strong_count() > 0)
            .unwrap_or(false)
    }

    pub fn endpoints(&self) -> Vec<Endpoint> {
        self.acceptors.iter().map(|a| a.key().clone()).collect()
    }
}

impl fmt::Debug for Fabric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Fabric")
            .field("acceptors", &self.acceptors.len())
            .finish()
    }
}
