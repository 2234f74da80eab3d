//! Proxy endpoints and the ordered pool they are tried from.
//!
//! The pool only ever shrinks during a run: a proxy that fails a feed fetch is
//! discarded and never re-added. Order is trial order.

mod source;

pub use source::{parse_proxy_list, ProxySource, ProxySourceError, RetryPolicy};

use std::collections::VecDeque;
use std::fmt;

/// A forward proxy address as published by the listing page (`host:port`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ProxyEndpoint(String);

impl ProxyEndpoint {
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Proxy URL for HTTP clients; bare `host:port` is treated as `http://`.
    pub fn url(&self) -> String {
        if self.0.contains("://") {
            self.0.clone()
        } else {
            format!("http://{}", self.0)
        }
    }
}

impl fmt::Display for ProxyEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Ordered set of candidate proxies for one run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProxyPool {
    proxies: VecDeque<ProxyEndpoint>,
}

impl ProxyPool {
    pub fn new(proxies: impl IntoIterator<Item = ProxyEndpoint>) -> Self {
        Self {
            proxies: proxies.into_iter().collect(),
        }
    }

    /// The proxy to try next, without removing it.
    pub fn head(&self) -> Option<&ProxyEndpoint> {
        self.proxies.front()
    }

    /// Drop the head proxy after it failed.
    pub fn discard_head(&mut self) -> Option<ProxyEndpoint> {
        self.proxies.pop_front()
    }

    pub fn len(&self) -> usize {
        self.proxies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.proxies.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProxyEndpoint> {
        self.proxies.iter()
    }
}

impl FromIterator<ProxyEndpoint> for ProxyPool {
    fn from_iter<I: IntoIterator<Item = ProxyEndpoint>>(iter: I) -> Self {
        Self::new(iter)
    }
}
