//! Error types for the Proxmox management crate.

use std::collections::BTreeMap;
use std::fmt;

/// Categorised error kinds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProxmoxErrorKind {
    /// Ticket exchange failed or returned an unusable body
    AuthenticationError,
    /// Non-2xx from an authenticated API call
    ApiRequestError,
    /// Payload / codec precondition violated before any I/O
    ValidationError,
    /// Inspection found no matching resource
    NotFound,
    /// Host unreachable / connection refused
    ConnectionError,
    /// Timeout
    Timeout,
    /// JSON parse / deserialization error
    ParseError,
    /// Invalid client configuration
    ConfigError,
    /// Generic
    Other,
}

/// Where an error happened: operation name plus the VM it targeted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationContext {
    pub operation: &'static str,
    pub node: Option<String>,
    pub vmid: Option<u32>,
}

impl OperationContext {
    pub fn new(operation: &'static str) -> Self {
        Self { operation, node: None, vmid: None }
    }

    pub fn node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }

    pub fn vmid(mut self, vmid: u32) -> Self {
        self.vmid = Some(vmid);
        self
    }
}

impl fmt::Display for OperationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.operation)?;
        if let Some(ref node) = self.node {
            write!(f, " node={node}")?;
        }
        if let Some(vmid) = self.vmid {
            write!(f, " vmid={vmid}")?;
        }
        Ok(())
    }
}

/// Crate error type carrying a kind, a message and optional upstream detail.
#[derive(Debug, Clone)]
pub struct ProxmoxError {
    pub kind: ProxmoxErrorKind,
    pub message: String,
    /// HTTP status returned by the hypervisor, when one was received.
    pub status: Option<u16>,
    /// Per-parameter errors from the `errors` member of the response body.
    pub upstream_errors: BTreeMap<String, String>,
    pub context: Option<OperationContext>,
}

impl ProxmoxError {
    pub fn new(kind: ProxmoxErrorKind, msg: impl Into<String>) -> Self {
        Self {
            kind,
            message: msg.into(),
            status: None,
            upstream_errors: BTreeMap::new(),
            context: None,
        }
    }

    pub fn auth(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::AuthenticationError, msg)
    }

    pub fn api(status: u16, msg: impl Into<String>) -> Self {
        let mut err = Self::new(ProxmoxErrorKind::ApiRequestError, msg);
        err.status = Some(status);
        err
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::ValidationError, msg)
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::NotFound, msg)
    }

    pub fn connection(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::ConnectionError, msg)
    }

    pub fn timeout(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::Timeout, msg)
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::ParseError, msg)
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::new(ProxmoxErrorKind::ConfigError, msg)
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_upstream_errors(mut self, errors: BTreeMap<String, String>) -> Self {
        self.upstream_errors = errors;
        self
    }

    /// Attach the operation context unless a more specific one is already set.
    pub fn with_context(mut self, ctx: &OperationContext) -> Self {
        if self.context.is_none() {
            self.context = Some(ctx.clone());
        }
        self
    }

    /// Failures that happened on the wire rather than in our own validation.
    ///
    /// Best-effort inspections (`list_vm_ips`, `get_vm_vlan_tag`) degrade on
    /// these and propagate everything else.
    pub fn is_transport_failure(&self) -> bool {
        matches!(
            self.kind,
            ProxmoxErrorKind::AuthenticationError
                | ProxmoxErrorKind::ApiRequestError
                | ProxmoxErrorKind::ConnectionError
                | ProxmoxErrorKind::Timeout
                | ProxmoxErrorKind::ParseError
                | ProxmoxErrorKind::Other
        )
    }
}

impl fmt::Display for ProxmoxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:?}] ", self.kind)?;
        if let Some(ref ctx) = self.context {
            write!(f, "{ctx}: ")?;
        }
        write!(f, "{}", self.message)?;
        if let Some(status) = self.status {
            write!(f, " (HTTP {status})")?;
        }
        if !self.upstream_errors.is_empty() {
            let detail: Vec<String> = self
                .upstream_errors
                .iter()
                .map(|(k, v)| format!("{k}: {v}"))
                .collect();
            write!(f, " [{}]", detail.join("; "))?;
        }
        Ok(())
    }
}

impl std::error::Error for ProxmoxError {}

impl From<ProxmoxError> for String {
    fn from(e: ProxmoxError) -> String {
        e.to_string()
    }
}

impl From<reqwest::Error> for ProxmoxError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::timeout(format!("HTTP timeout: {e}"))
        } else if e.is_connect() {
            Self::connection(format!("Connection failed: {e}"))
        } else {
            Self::new(ProxmoxErrorKind::Other, format!("HTTP error: {e}"))
        }
    }
}

impl From<serde_json::Error> for ProxmoxError {
    fn from(e: serde_json::Error) -> Self {
        Self::parse(format!("JSON parse error: {e}"))
    }
}

/// Convenience alias.
pub type ProxmoxResult<T> = Result<T, ProxmoxError>;
