//! Cluster-wide queries.

use crate::client::ProxmoxClient;
use crate::error::{OperationContext, ProxmoxResult};
use crate::transport::ApiRequest;
use crate::types::*;

pub struct ClusterManager<'a> {
    client: &'a ProxmoxClient,
}

impl<'a> ClusterManager<'a> {
    pub fn new(client: &'a ProxmoxClient) -> Self {
        Self { client }
    }

    pub async fn get_version(&self) -> ProxmoxResult<ProxmoxVersion> {
        self.client
            .send(ApiRequest::get("/version"), &OperationContext::new("get_version"))
            .await
    }

    /// Every VM template in the cluster, across all nodes.
    pub async fn list_templates(&self) -> ProxmoxResult<Vec<ClusterResource>> {
        let resources: Vec<ClusterResource> = self
            .client
            .send(
                ApiRequest::get("/cluster/resources"),
                &OperationContext::new("list_templates"),
            )
            .await?;
        let templates: Vec<ClusterResource> =
            resources.into_iter().filter(|r| r.is_template()).collect();
        log::debug!("[Proxmox] {} templates in cluster", templates.len());
        Ok(templates)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxmoxErrorKind;
    use crate::transport::testing::*;
    use crate::transport::HttpMethod;
    use serde_json::json;
    use std::sync::Arc;

    fn client(mock: Arc<MockTransport>) -> ProxmoxClient {
        let config = ProxmoxConfig {
            host: "pve".into(),
            username: "root@pam".into(),
            ..Default::default()
        };
        ProxmoxClient::with_transport(&config, mock)
    }

    #[tokio::test]
    async fn version_is_parsed() {
        let mock = Arc::new(MockTransport::new().with_ticket().on(
            HttpMethod::Get,
            "/version",
            Ok(ok(json!({ "version": "8.2.4", "release": "8.2", "repoid": "faa83925c9641325" }))),
        ));
        let v = ClusterManager::new(&client(mock)).get_version().await.unwrap();
        assert_eq!(v.version, "8.2.4");
        assert_eq!(v.release.as_deref(), Some("8.2"));
    }

    #[tokio::test]
    async fn only_templates_are_listed() {
        let mock = Arc::new(MockTransport::new().with_ticket().on(
            HttpMethod::Get,
            "/cluster/resources",
            Ok(ok(json!([
                {"id": "qemu/9000", "type": "qemu", "node": "pve", "vmid": 9000, "name": "debian-tpl", "template": 1},
                {"id": "qemu/100", "type": "qemu", "node": "pve", "vmid": 100, "name": "web-01", "template": 0},
                {"id": "node/pve", "type": "node", "node": "pve"},
                {"id": "storage/pve/local", "type": "storage", "node": "pve"}
            ]))),
        ));
        let templates = ClusterManager::new(&client(mock)).list_templates().await.unwrap();
        assert_eq!(templates.len(), 1);
        assert_eq!(templates[0].vmid, Some(9000));
    }

    #[tokio::test]
    async fn upstream_failure_is_an_api_error() {
        let mock = Arc::new(MockTransport::new().with_ticket().on(
            HttpMethod::Get,
            "/cluster/resources",
            Ok(status(403, "Permission check failed", json!({ "data": null }))),
        ));
        let err = ClusterManager::new(&client(mock)).list_templates().await.unwrap_err();
        assert_eq!(err.kind, ProxmoxErrorKind::ApiRequestError);
        assert_eq!(err.status, Some(403));
        assert_eq!(err.context.unwrap().operation, "list_templates");
    }
}
