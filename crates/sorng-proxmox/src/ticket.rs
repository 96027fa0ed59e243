//! Session ticket handshake.
//!
//! `POST /access/ticket` exchanges username + password for a ticket and a
//! CSRF token. The ticket travels as the `PVEAuthCookie` cookie and the token
//! as the `CSRFPreventionToken` header; the two are only valid as a pair.
//!
//! By default every operation performs its own handshake
//! ([`TicketPolicy::PerRequest`]). [`TicketPolicy::Cached`] reuses a ticket
//! until it reaches the configured age.

use crate::error::{ProxmoxError, ProxmoxResult};
use crate::transport::{ApiRequest, ProxmoxTransport};
use crate::types::*;

use chrono::Utc;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::Mutex;

pub const AUTH_COOKIE_NAME: &str = "PVEAuthCookie";

const TICKET_PATH: &str = "/access/ticket";

#[derive(Deserialize)]
struct TicketData {
    ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    csrf_token: String,
    username: String,
    #[serde(default)]
    cap: serde_json::Value,
}

/// Pair the ticket with its CSRF token as request headers.
pub fn build_auth_headers(ticket: &SessionTicket) -> AuthHeaders {
    AuthHeaders {
        cookie: format!("{AUTH_COOKIE_NAME}={}", ticket.ticket),
        csrf_prevention_token: ticket.csrf_token.clone(),
    }
}

pub struct TicketManager {
    transport: Arc<dyn ProxmoxTransport>,
    credentials: Credentials,
    policy: TicketPolicy,
    cached: Mutex<Option<SessionTicket>>,
}

impl TicketManager {
    pub fn new(
        transport: Arc<dyn ProxmoxTransport>,
        credentials: Credentials,
        policy: TicketPolicy,
    ) -> Self {
        Self {
            transport,
            credentials,
            policy,
            cached: Mutex::new(None),
        }
    }

    pub fn policy(&self) -> TicketPolicy {
        self.policy
    }

    pub fn username(&self) -> &str {
        &self.credentials.username
    }

    /// Perform the handshake. Any failure, including a transport error or a
    /// body missing either token, is an `AuthenticationError`.
    pub async fn acquire_ticket(&self) -> ProxmoxResult<SessionTicket> {
        let request = ApiRequest::post(TICKET_PATH).form(vec![
            ("username".to_string(), self.credentials.username.clone()),
            ("password".to_string(), self.credentials.password.clone()),
        ]);

        let resp = self.transport.execute(request).await.map_err(|e| {
            let mut err = ProxmoxError::auth(format!(
                "Ticket request for {} failed: {}",
                self.credentials.username, e.message
            ));
            err.status = e.status;
            err
        })?;

        if !resp.is_success() {
            log::warn!(
                "[Proxmox] ticket request for {} rejected: HTTP {} {}",
                self.credentials.username,
                resp.status,
                resp.status_text
            );
            let message = resp
                .body
                .get("message")
                .and_then(|m| m.as_str())
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| resp.status_text.clone());
            return Err(ProxmoxError::auth(format!("Authentication failed: {message}"))
                .with_status(resp.status));
        }

        let data = resp
            .body
            .get("data")
            .filter(|d| !d.is_null())
            .cloned()
            .ok_or_else(|| {
                ProxmoxError::auth("Ticket response has no data").with_status(resp.status)
            })?;
        let parsed: TicketData = serde_json::from_value(data).map_err(|e| {
            ProxmoxError::auth(format!("Unparseable ticket response: {e}")).with_status(resp.status)
        })?;
        if parsed.ticket.is_empty() || parsed.csrf_token.is_empty() {
            return Err(ProxmoxError::auth("Ticket response carries an empty token")
                .with_status(resp.status));
        }

        log::debug!("[Proxmox] acquired ticket for {}", parsed.username);
        Ok(SessionTicket {
            ticket: parsed.ticket,
            csrf_token: parsed.csrf_token,
            username: parsed.username,
            capabilities: parsed.cap,
            acquired_at: Utc::now(),
        })
    }

    /// Headers for the next request, honouring the ticket policy.
    pub async fn auth_headers(&self) -> ProxmoxResult<AuthHeaders> {
        match self.policy {
            TicketPolicy::PerRequest => {
                let ticket = self.acquire_ticket().await?;
                Ok(build_auth_headers(&ticket))
            }
            TicketPolicy::Cached { ttl_secs } => {
                let mut cached = self.cached.lock().await;
                if let Some(ref ticket) = *cached {
                    let age = Utc::now().signed_duration_since(ticket.acquired_at);
                    if age.num_seconds() >= 0 && (age.num_seconds() as u64) < ttl_secs {
                        return Ok(build_auth_headers(ticket));
                    }
                    log::debug!("[Proxmox] cached ticket for {} expired", ticket.username);
                }
                let ticket = self.acquire_ticket().await?;
                let headers = build_auth_headers(&ticket);
                *cached = Some(ticket);
                Ok(headers)
            }
        }
    }

    /// Drop any cached ticket so the next call re-authenticates.
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }
}
