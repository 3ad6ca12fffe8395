//! Request validation and target resolution.
//!
//! # Responsibilities
//! - Reject malformed requests before any network activity
//! - Extract scheme, host and port from the request URI
//! - Produce the canonical `host:port` dial address
//!
//! # Design Decisions
//! - A relative URI (no scheme, no authority) counts as a missing URL
//! - The header map always exists on `http::Request`, so "missing headers"
//!   cannot be expressed and needs no check

use std::fmt;

use http::{Request, Uri};

use crate::error::InvalidRequest;

/// Supported URL schemes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scheme {
    Http,
    Https,
}

impl Scheme {
    pub fn parse(scheme: &str) -> Option<Self> {
        if scheme.eq_ignore_ascii_case("http") {
            Some(Self::Http)
        } else if scheme.eq_ignore_ascii_case("https") {
            Some(Self::Https)
        } else {
            None
        }
    }

    pub fn default_port(self) -> u16 {
        match self {
            Self::Http => 80,
            Self::Https => 443,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Http => "http",
            Self::Https => "https",
        }
    }

    pub fn is_tls(self) -> bool {
        self == Self::Https
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a validated request is going.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target {
    scheme: Scheme,
    host: String,
    port: Option<u16>,
}

impl Target {
    /// Validate the request shape and extract its target.
    pub fn from_request<B>(request: &Request<B>) -> Result<Self, InvalidRequest> {
        Self::from_uri(request.uri())
    }

    pub fn from_uri(uri: &Uri) -> Result<Self, InvalidRequest> {
        if uri.scheme().is_none() && uri.authority().is_none() {
            return Err(InvalidRequest::MissingUrl);
        }
        let scheme = uri.scheme_str().unwrap_or_default();
        match uri.authority() {
            Some(authority) => Self::from_parts(scheme, authority.host(), authority.port_u16()),
            None => Self::from_parts(scheme, "", None),
        }
    }

    /// Validate already-split URL components.
    pub fn from_parts(scheme: &str, host: &str, port: Option<u16>) -> Result<Self, InvalidRequest> {
        let scheme = Scheme::parse(scheme)
            .ok_or_else(|| InvalidRequest::UnsupportedScheme(scheme.to_owned()))?;
        if host.is_empty() {
            return Err(InvalidRequest::MissingHost);
        }
        Ok(Self {
            scheme,
            host: host.to_owned(),
            port,
        })
    }

    pub fn scheme(&self) -> Scheme {
        self.scheme
    }

    /// Host as written in the URL; IPv6 literals keep their brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Host suitable for TLS server-name checks (brackets stripped).
    pub fn server_name(&self) -> &str {
        self.host.trim_start_matches('[').trim_end_matches(']')
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or_else(|| self.scheme.default_port())
    }

    /// `host:port`, with the scheme default port appended when none was given.
    pub fn canonical_addr(&self) -> String {
        format!("{}:{}", self.host, self.port())
    }

    /// Value for the `Host` header: the authority exactly as requested.
    pub fn authority(&self) -> String {
        match self.port {
            Some(port) => format!("{}:{}", self.host, port),
            None => self.host.clone(),
        }
    }
}
