//! Authenticated Proxmox VE API client.
//!
//! Wraps a [`ProxmoxTransport`] and a [`TicketManager`]: every call gets fresh
//! auth headers, non-2xx responses become `ApiRequestError`s carrying the
//! upstream `errors` map, and the `{ "data": ... }` envelope is unwrapped
//! exactly once.

use crate::error::{OperationContext, ProxmoxError, ProxmoxResult};
use crate::ticket::TicketManager;
use crate::transport::{ApiRequest, ApiResponse, HttpTransport, ProxmoxTransport};
use crate::types::ProxmoxConfig;

use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;

pub struct ProxmoxClient {
    transport: Arc<dyn ProxmoxTransport>,
    tickets: TicketManager,
    config: ProxmoxConfig,
}

impl ProxmoxClient {
    /// Build a client backed by reqwest.
    pub fn new(config: &ProxmoxConfig) -> ProxmoxResult<Self> {
        config.validate()?;
        let transport: Arc<dyn ProxmoxTransport> = Arc::new(HttpTransport::new(config)?);
        Ok(Self::with_transport(config, transport))
    }

    /// Build a client over any transport. The config is not validated here.
    pub fn with_transport(config: &ProxmoxConfig, transport: Arc<dyn ProxmoxTransport>) -> Self {
        let tickets = TicketManager::new(
            transport.clone(),
            config.credentials(),
            config.ticket_policy,
        );
        Self {
            transport,
            tickets,
            config: config.clone(),
        }
    }

    pub fn config(&self) -> &ProxmoxConfig {
        &self.config
    }

    pub fn tickets(&self) -> &TicketManager {
        &self.tickets
    }

    // ── Request execution ───────────────────────────────────────────

    /// Send an authenticated request and deserialize its `data` member.
    pub async fn send<T: DeserializeOwned>(
        &self,
        request: ApiRequest,
        ctx: &OperationContext,
    ) -> ProxmoxResult<T> {
        let data = self.send_raw(request, ctx).await?;
        serde_json::from_value(data).map_err(|e| {
            ProxmoxError::parse(format!("Unexpected response payload: {e}")).with_context(ctx)
        })
    }

    /// Send an authenticated request and return the unwrapped `data` value.
    pub async fn send_raw(
        &self,
        mut request: ApiRequest,
        ctx: &OperationContext,
    ) -> ProxmoxResult<serde_json::Value> {
        let headers = self
            .tickets
            .auth_headers()
            .await
            .map_err(|e| e.with_context(ctx))?;
        request.headers.extend(headers.into_pairs());

        let resp = self
            .transport
            .execute(request)
            .await
            .map_err(|e| e.with_context(ctx))?;

        if !resp.is_success() {
            let err = Self::api_error(&resp).with_context(ctx);
            log::error!("[Proxmox] {err}");
            return Err(err);
        }

        match resp.body {
            serde_json::Value::Object(mut envelope) => Ok(envelope
                .remove("data")
                .unwrap_or(serde_json::Value::Null)),
            other => Err(ProxmoxError::parse(format!(
                "Response is not a data envelope: {}",
                truncate(&other.to_string())
            ))
            .with_context(ctx)),
        }
    }

    // ── Internal helpers ────────────────────────────────────────────

    fn api_error(resp: &ApiResponse) -> ProxmoxError {
        let upstream: BTreeMap<String, String> = resp
            .body
            .get("errors")
            .and_then(|e| e.as_object())
            .map(|errors| {
                errors
                    .iter()
                    .map(|(k, v)| {
                        let msg = v
                            .as_str()
                            .map(|s| s.trim().to_string())
                            .unwrap_or_else(|| v.to_string());
                        (k.clone(), msg)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let message = resp
            .body
            .get("message")
            .and_then(|m| m.as_str())
            .map(|m| m.trim().to_string())
            .filter(|m| !m.is_empty())
            .unwrap_or_else(|| resp.status_text.clone());

        ProxmoxError::api(resp.status, message).with_upstream_errors(upstream)
    }
}

fn truncate(s: &str) -> &str {
    match s.char_indices().nth(500) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxmoxErrorKind;
    use crate::transport::testing::*;
    use crate::transport::HttpMethod;
    use serde_json::json;

    fn client(mock: Arc<MockTransport>) -> ProxmoxClient {
        let config = ProxmoxConfig {
            host: "pve".into(),
            username: "root@pam".into(),
            password: "secret".into(),
            ..Default::default()
        };
        ProxmoxClient::with_transport(&config, mock)
    }

    #[tokio::test]
    async fn attaches_auth_headers_and_unwraps_data() {
        let mock = Arc::new(
            MockTransport::new()
                .with_ticket()
                .on(HttpMethod::Get, "/version", Ok(ok(json!({ "version": "8.2.4" })))),
        );
        let c = client(mock.clone());
        let v: serde_json::Value = c
            .send(ApiRequest::get("/version"), &OperationContext::new("get_version"))
            .await
            .unwrap();
        assert_eq!(v["version"], "8.2.4");

        let req = mock.last_request_to("/version");
        assert_eq!(req.header("Cookie"), Some("PVEAuthCookie=PVE:root@pam:65A1B2C3::sig"));
        assert_eq!(req.header("CSRFPreventionToken"), Some("65A1B2C3:csrf"));
    }

    #[tokio::test]
    async fn non_success_carries_status_and_upstream_errors() {
        let mock = Arc::new(MockTransport::new().with_ticket().on(
            HttpMethod::Post,
            "/nodes/pve/qemu",
            Ok(status(
                400,
                "Parameter verification failed.",
                json!({ "data": null, "errors": { "vmid": "VM 100 already exists\n" } }),
            )),
        ));
        let ctx = OperationContext::new("create_vm").node("pve").vmid(100);
        let err = client(mock)
            .send::<String>(ApiRequest::post("/nodes/pve/qemu"), &ctx)
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProxmoxErrorKind::ApiRequestError);
        assert_eq!(err.status, Some(400));
        assert_eq!(err.upstream_errors["vmid"], "VM 100 already exists");
        assert_eq!(err.context, Some(ctx));
    }

    #[tokio::test]
    async fn null_data_is_not_a_task_id() {
        let mock = Arc::new(MockTransport::new().with_ticket().on(
            HttpMethod::Post,
            "/nodes/pve/qemu/100/status/start",
            Ok(ok(serde_json::Value::Null)),
        ));
        let err = client(mock)
            .send::<String>(
                ApiRequest::post("/nodes/pve/qemu/100/status/start"),
                &OperationContext::new("start_vm"),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProxmoxErrorKind::ParseError);
    }

    #[tokio::test]
    async fn auth_failure_aborts_before_the_call() {
        let mock = Arc::new(MockTransport::new().on(
            HttpMethod::Post,
            "/access/ticket",
            Ok(status(401, "authentication failure", json!({ "data": null }))),
        ));
        let err = client(mock.clone())
            .send_raw(ApiRequest::get("/version"), &OperationContext::new("get_version"))
            .await
            .unwrap_err();
        assert_eq!(err.kind, ProxmoxErrorKind::AuthenticationError);
        assert!(mock.requests_to("/version").is_empty());
    }
}
