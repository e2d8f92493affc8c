use crate::transport::TransportError;
use crate::types::Method;
use bytes::Bytes;
use thiserror::Error;

/// Structured error context for configuration and decoding failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorContext {
    /// URL (or relative path) of the request that produced the error
    pub url: Option<String>,
    /// Request method, when known
    pub method: Option<Method>,
    /// Additional context about the error (e.g., expected type, offending key)
    pub details: Option<String>,
    /// Source of the error (e.g., "session_builder", "json_decoder")
    pub source: Option<String>,
}

impl ErrorContext {
    pub fn new() -> Self {
        Self {
            url: None,
            method: None,
            details: None,
            source: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }
}

impl Default for ErrorContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Every failure a dispatch can end with.
///
/// Cache and throttle bookkeeping never produce errors of their own; I/O problems
/// in a cache store degrade to a miss and only show up in logs.
#[derive(Debug, Error)]
pub enum Error {
    #[error("Network unavailable: session is in offline mode")]
    Offline,

    #[error("Bad URL '{url}': {reason}")]
    BadUrl { url: String, reason: String },

    #[error("Request type disabled: {method}")]
    RequestTypeDisabled { method: Method },

    #[error("Request throttled: {key}")]
    Throttled { key: String },

    #[error("Unauthorized: HTTP {status}")]
    Unauthorized { status: u16 },

    #[error("HTTP status error: {status}")]
    HttpStatus { status: u16, body: Bytes },

    #[error("Decode error: {message}{}", format_context(.context))]
    Decode {
        message: String,
        context: ErrorContext,
    },

    #[error("Request cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Network transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Configuration error: {message}{}", format_context(.context))]
    Configuration {
        message: String,
        context: ErrorContext,
    },
}

fn format_context(ctx: &ErrorContext) -> String {
    let mut parts = Vec::new();
    if let Some(ref method) = ctx.method {
        parts.push(format!("method: {}", method));
    }
    if let Some(ref url) = ctx.url {
        parts.push(format!("url: {}", url));
    }
    if let Some(ref details) = ctx.details {
        parts.push(format!("details: {}", details));
    }
    if let Some(ref source) = ctx.source {
        parts.push(format!("source: {}", source));
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" ({})", parts.join(", "))
    }
}

impl Error {
    pub fn decode_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Decode {
            message: msg.into(),
            context,
        }
    }

    pub fn configuration_with_context(msg: impl Into<String>, context: ErrorContext) -> Self {
        Error::Configuration {
            message: msg.into(),
            context,
        }
    }

    /// HTTP status carried by the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::HttpStatus { status, .. } | Error::Unauthorized { status } => Some(*status),
            _ => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Cancelled)
    }

    pub fn is_throttled(&self) -> bool {
        matches!(self, Error::Throttled { .. })
    }

    /// Whether the error came out of a network attempt, i.e. whether a contingent
    /// cache entry may stand in for it.
    pub fn is_network_failure(&self) -> bool {
        matches!(self, Error::Transport(_) | Error::HttpStatus { .. })
    }

    pub fn context(&self) -> Option<&ErrorContext> {
        match self {
            Error::Decode { context, .. } | Error::Configuration { context, .. } => Some(context),
            _ => None,
        }
    }
}
