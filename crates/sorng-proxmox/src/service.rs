//! Aggregate service façade for the Proxmox crate.
//!
//! `ProxmoxService` owns one `ProxmoxClient` and exposes every domain
//! operation. All methods take `&self`; share the service behind an `Arc`.

use crate::client::ProxmoxClient;
use crate::cluster::ClusterManager;
use crate::error::ProxmoxResult;
use crate::storage::StorageManager;
use crate::transport::ProxmoxTransport;
use crate::types::*;
use crate::vm::VmManager;

use std::net::IpAddr;
use std::sync::Arc;

/// Top-level service that aggregates all Proxmox subsystems.
pub struct ProxmoxService {
    client: ProxmoxClient,
}

impl ProxmoxService {
    /// Validate the config and build a reqwest-backed service.
    pub fn new(config: ProxmoxConfig) -> ProxmoxResult<Self> {
        let client = ProxmoxClient::new(&config)?;
        log::info!(
            "[Proxmox] service ready for {} as {} ({:?})",
            config.origin(),
            config.username,
            config.ticket_policy
        );
        Ok(Self { client })
    }

    /// Build a service over a caller-supplied transport.
    pub fn with_transport(
        config: ProxmoxConfig,
        transport: Arc<dyn ProxmoxTransport>,
    ) -> ProxmoxResult<Self> {
        config.validate()?;
        Ok(Self {
            client: ProxmoxClient::with_transport(&config, transport),
        })
    }

    /// Current config (without password).
    pub fn get_config(&self) -> ProxmoxConfigSafe {
        ProxmoxConfigSafe::from(self.client.config())
    }

    /// Drop a cached ticket, if any.
    pub async fn invalidate_ticket(&self) {
        self.client.tickets().invalidate().await;
    }

    // ── Cluster ─────────────────────────────────────────────────────

    pub async fn get_version(&self) -> ProxmoxResult<ProxmoxVersion> {
        ClusterManager::new(&self.client).get_version().await
    }

    pub async fn list_templates(&self) -> ProxmoxResult<Vec<ClusterResource>> {
        ClusterManager::new(&self.client).list_templates().await
    }

    // ── VM operations ───────────────────────────────────────────────

    pub async fn list_vms(&self, node: &str) -> ProxmoxResult<Vec<QemuMachine>> {
        VmManager::new(&self.client).list_vms(node).await
    }

    pub async fn get_vm_config(&self, vm: &VmIdentity) -> ProxmoxResult<VmConfig> {
        VmManager::new(&self.client).get_vm_config(vm).await
    }

    pub async fn get_vm_network(&self, vm: &VmIdentity, index: u8) -> ProxmoxResult<NetworkSpec> {
        VmManager::new(&self.client).get_vm_network(vm, index).await
    }

    pub async fn create_vm(&self, payload: &CreateVmPayload) -> ProxmoxResult<Upid> {
        VmManager::new(&self.client).create_vm(payload).await
    }

    pub async fn update_vm(&self, payload: &UpdateVmPayload) -> ProxmoxResult<Option<Upid>> {
        VmManager::new(&self.client).update_vm(payload).await
    }

    pub async fn delete_vm(&self, payload: &DeleteVmPayload) -> ProxmoxResult<Upid> {
        VmManager::new(&self.client).delete_vm(payload).await
    }

    pub async fn clone_vm(&self, payload: &CloneVmPayload) -> ProxmoxResult<Upid> {
        VmManager::new(&self.client).clone_vm(payload).await
    }

    pub async fn start_vm(&self, vm: &VmIdentity) -> ProxmoxResult<Upid> {
        VmManager::new(&self.client).start_vm(vm).await
    }

    pub async fn stop_vm(&self, vm: &VmIdentity) -> ProxmoxResult<Upid> {
        VmManager::new(&self.client).stop_vm(vm).await
    }

    pub async fn resize_disk(&self, payload: &ResizeDiskPayload) -> ProxmoxResult<Option<Upid>> {
        VmManager::new(&self.client).resize_disk(payload).await
    }

    pub async fn list_vm_ips(&self, vm: &VmIdentity) -> ProxmoxResult<Vec<IpAddr>> {
        VmManager::new(&self.client).list_vm_ips(vm).await
    }

    pub async fn get_vm_vlan_tag(&self, vm: &VmIdentity) -> ProxmoxResult<u16> {
        VmManager::new(&self.client).get_vm_vlan_tag(vm).await
    }

    // ── Storage ─────────────────────────────────────────────────────

    pub async fn download_iso_image(&self, payload: &DownloadIsoPayload) -> ProxmoxResult<Upid> {
        StorageManager::new(&self.client).download_iso_image(payload).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxmoxErrorKind;
    use crate::transport::testing::*;
    use crate::transport::HttpMethod;
    use serde_json::json;

    fn config() -> ProxmoxConfig {
        ProxmoxConfig {
            host: "pve.lab.local".into(),
            username: "root@pam".into(),
            password: "hunter2".into(),
            ..Default::default()
        }
    }

    #[test]
    fn safe_config_hides_password() {
        let svc = ProxmoxService::with_transport(config(), Arc::new(MockTransport::new())).unwrap();
        let safe = svc.get_config();
        assert_eq!(safe.host, "pve.lab.local");
        assert!(!serde_json::to_string(&safe).unwrap().contains("hunter2"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut cfg = config();
        cfg.host = String::new();
        let err = ProxmoxService::with_transport(cfg, Arc::new(MockTransport::new()))
            .err()
            .unwrap();
        assert_eq!(err.kind, ProxmoxErrorKind::ConfigError);
    }

    #[tokio::test]
    async fn cached_policy_shares_one_ticket_across_operations() {
        let mock = Arc::new(
            MockTransport::new()
                .with_ticket()
                .on(HttpMethod::Get, "/version", Ok(ok(json!({ "version": "8.2.4" }))))
                .on(HttpMethod::Get, "/nodes/pve/qemu", Ok(ok(json!([])))),
        );
        let mut cfg = config();
        cfg.ticket_policy = TicketPolicy::Cached { ttl_secs: 600 };
        let svc = ProxmoxService::with_transport(cfg, mock.clone()).unwrap();

        svc.get_version().await.unwrap();
        assert!(svc.list_vms("pve").await.unwrap().is_empty());
        assert_eq!(mock.requests_to("/access/ticket").len(), 1);

        svc.invalidate_ticket().await;
        svc.get_version().await.unwrap();
        assert_eq!(mock.requests_to("/access/ticket").len(), 2);
    }

    #[tokio::test]
    async fn vlan_and_ips_delegate_to_vm_manager() {
        let mock = Arc::new(
            MockTransport::new()
                .with_ticket()
                .on(
                    HttpMethod::Get,
                    "/nodes/pve/qemu/100/config",
                    Ok(ok(json!({ "net0": "virtio=BC:24:11:2E:4A:01,bridge=vmbr0,tag=30" }))),
                )
                .on(
                    HttpMethod::Get,
                    "/nodes/pve/qemu/100/agent/network-get-interfaces",
                    Ok(ok(json!({ "result": [] }))),
                ),
        );
        let svc = ProxmoxService::with_transport(config(), mock).unwrap();
        let vm = VmIdentity::new("pve", 100);
        assert_eq!(svc.get_vm_vlan_tag(&vm).await.unwrap(), 30);
        assert!(svc.list_vm_ips(&vm).await.unwrap().is_empty());
    }
}
