//! Endpoint discovery from daemon output.
//!
//! The daemon picks its API port at startup and announces it with a log line
//! of the form `API listening on 127.0.0.1:8384`. Output arrives in chunks
//! that need not align with lines, so the extractor keeps the unfinished
//! tail of the stream and rescans it on every feed.

use regex::Regex;
use std::fmt;
use std::net::{IpAddr, SocketAddr};

/// Announcement line emitted by the daemon once its API socket is bound.
const ANNOUNCEMENT_PATTERN: &str = r"API listening on ([0-9a-fA-F.:\[\]]+)";

/// Upper bound on unterminated output kept between feeds.
///
/// Only relevant when the daemon writes very long lines; an announcement is
/// far shorter than this, so trimming never loses a match in progress.
const MAX_PENDING_BYTES: usize = 64 * 1024;

/// Bytes kept from an oversized unterminated line.
const PENDING_TAIL_BYTES: usize = 256;

/// Address at which the daemon's HTTP API is reachable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Endpoint {
    addr: SocketAddr,
}

impl Endpoint {
    pub fn new(addr: SocketAddr) -> Self {
        Self { addr }
    }

    /// Parses the address part of an announcement: `a.b.c.d:port` or `[v6]:port`.
    pub fn parse_announced(text: &str) -> Option<Self> {
        text.parse::<SocketAddr>().ok().map(Self::new)
    }

    /// Always `http`; the daemon is configured for a plain loopback listener.
    pub fn scheme(&self) -> &'static str {
        "http"
    }

    pub fn host(&self) -> IpAddr {
        self.addr.ip()
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Base URL with trailing slash, e.g. `http://[::1]:9999/`.
    pub fn base_url(&self) -> String {
        format!("{}://{}/", self.scheme(), self.addr)
    }

    /// Address in the form the daemon accepts for `STGUIADDRESS`.
    pub fn gui_address(&self) -> String {
        format!("{}://{}", self.scheme(), self.addr)
    }

    /// Absolute URL for an API path such as `/rest/system/status`.
    pub fn url(&self, path: &str) -> String {
        format!(
            "{}://{}/{}",
            self.scheme(),
            self.addr,
            path.trim_start_matches('/')
        )
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.base_url())
    }
}

/// Incremental scanner for the endpoint announcement.
///
/// Yields the first well-formed endpoint of a run exactly once. Later feeds
/// are no-ops until [`EndpointExtractor::reset`] is called for the next run.
#[derive(Debug, Clone)]
pub struct EndpointExtractor {
    pattern: Regex,
    pending: String,
    found: bool,
}

impl Default for EndpointExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl EndpointExtractor {
    pub fn new() -> Self {
        Self {
            pattern: Regex::new(ANNOUNCEMENT_PATTERN)
                .expect("announcement pattern is a valid regex"),
            pending: String::new(),
            found: false,
        }
    }

    /// Returns true once this run's endpoint has been extracted.
    pub fn is_found(&self) -> bool {
        self.found
    }

    /// Clears buffered text and re-arms the extractor for a new daemon run.
    pub fn reset(&mut self) {
        self.pending.clear();
        self.found = false;
    }

    /// Appends a chunk of output and returns the endpoint if it became known.
    pub fn feed(&mut self, chunk: &str) -> Option<Endpoint> {
        if self.found {
            return None;
        }
        self.pending.push_str(chunk);

        let mut endpoint = None;
        for captures in self.pattern.captures_iter(&self.pending) {
            let Some(addr) = captures.get(1) else {
                continue;
            };
            // A capture touching the end of the buffer may still grow
            // (e.g. the port is split across chunks).
            if addr.end() == self.pending.len() {
                break;
            }
            if let Some(parsed) = Endpoint::parse_announced(addr.as_str()) {
                endpoint = Some(parsed);
                break;
            }
        }

        if endpoint.is_some() {
            self.found = true;
            self.pending.clear();
        } else {
            self.compact();
        }
        endpoint
    }

    /// Drops completed lines; an announcement never spans a newline.
    fn compact(&mut self) {
        if let Some(pos) = self.pending.rfind('\n') {
            self.pending.drain(..=pos);
        }
        if self.pending.len() > MAX_PENDING_BYTES {
            let mut cut = self.pending.len() - PENDING_TAIL_BYTES;
            while !self.pending.is_char_boundary(cut) {
                cut += 1;
            }
            self.pending.drain(..cut);
        }
    }
}

#[cfg(test)]
#[path = "tests/endpoint_tests.rs"]
mod tests;
