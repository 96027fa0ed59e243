//! QEMU VM lifecycle via the Proxmox VE API.
//!
//! Builds proxmox-shaped request bodies through [`crate::codec`] and sends
//! them through [`ProxmoxClient`]. `list_vm_ips` and `get_vm_vlan_tag` are
//! best-effort inspections that degrade on transport failures; everything
//! else fails loudly.

use crate::client::ProxmoxClient;
use crate::codec;
use crate::error::{OperationContext, ProxmoxError, ProxmoxResult};
use crate::transport::ApiRequest;
use crate::types::*;

use serde_json::{json, Map, Value};
use std::net::IpAddr;

const SCSI_CONTROLLER: &str = "virtio-scsi-single";

/// High-level VM operations backed by `ProxmoxClient`.
pub struct VmManager<'a> {
    client: &'a ProxmoxClient,
}

impl<'a> VmManager<'a> {
    pub fn new(client: &'a ProxmoxClient) -> Self {
        Self { client }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// List QEMU VMs on a node.
    pub async fn list_vms(&self, node: &str) -> ProxmoxResult<Vec<QemuMachine>> {
        let ctx = OperationContext::new("list_vms").node(node);
        validate_node(node).map_err(|e| e.with_context(&ctx))?;
        self.client
            .send(ApiRequest::get(format!("/nodes/{node}/qemu")), &ctx)
            .await
    }

    /// Current VM configuration as raw key/value pairs.
    pub async fn get_vm_config(&self, vm: &VmIdentity) -> ProxmoxResult<VmConfig> {
        let ctx = context("get_vm_config", vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        self.fetch_config(vm, &ctx).await
    }

    /// Decode `net{index}` in full.
    pub async fn get_vm_network(&self, vm: &VmIdentity, index: u8) -> ProxmoxResult<NetworkSpec> {
        let ctx = context("get_vm_network", vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        let config = self.fetch_config(vm, &ctx).await?;
        let key = format!("net{index}");
        let line = config_line(&config, &key).map_err(|e| e.with_context(&ctx))?;
        codec::decode_network(line).map_err(|e| e.with_context(&ctx))
    }

    // ── Create / Update / Delete ────────────────────────────────────

    /// Create a VM. Returns the task UPID.
    pub async fn create_vm(&self, payload: &CreateVmPayload) -> ProxmoxResult<Upid> {
        let vm = VmIdentity::new(&payload.node, payload.vmid);
        let ctx = context("create_vm", &vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        let body = build_create_body(payload).map_err(|e| e.with_context(&ctx))?;

        log::info!("[Proxmox {vm}] creating VM '{}'", payload.name);
        self.client
            .send(
                ApiRequest::post(format!("/nodes/{}/qemu", vm.node)).json(Value::Object(body)),
                &ctx,
            )
            .await
    }

    /// Update the VM config. Only fields present in the payload are sent,
    /// apart from `ipconfig0` which falls back to DHCP.
    pub async fn update_vm(&self, payload: &UpdateVmPayload) -> ProxmoxResult<Option<Upid>> {
        let vm = VmIdentity::new(&payload.node, payload.vmid);
        let ctx = context("update_vm", &vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        let body = build_update_body(payload).map_err(|e| e.with_context(&ctx))?;

        log::info!("[Proxmox {vm}] updating config ({} fields)", body.len());
        self.client
            .send(
                ApiRequest::put(format!("/nodes/{}/qemu/{}/config", vm.node, vm.vmid))
                    .json(Value::Object(body)),
                &ctx,
            )
            .await
    }

    /// Destroy a VM. Returns the task UPID.
    pub async fn delete_vm(&self, payload: &DeleteVmPayload) -> ProxmoxResult<Upid> {
        let vm = VmIdentity::new(&payload.node, payload.vmid);
        let ctx = context("delete_vm", &vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;

        let mut request = ApiRequest::delete(format!("/nodes/{}/qemu/{}", vm.node, vm.vmid));
        if payload.destroy_unreferenced_disks {
            request = request.query("destroy-unreferenced-disks", "1");
        }
        if payload.purge {
            request = request.query("purge", "1");
        }
        if payload.skiplock {
            request = request.query("skiplock", "1");
        }

        log::info!("[Proxmox {vm}] deleting VM");
        self.client.send(request, &ctx).await
    }

    // ── Clone ───────────────────────────────────────────────────────

    /// Clone a VM or template. Returns the task UPID.
    pub async fn clone_vm(&self, payload: &CloneVmPayload) -> ProxmoxResult<Upid> {
        let vm = VmIdentity::new(&payload.node, payload.vmid);
        let ctx = context("clone_vm", &vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        let body = build_clone_body(payload).map_err(|e| e.with_context(&ctx))?;

        log::info!("[Proxmox {vm}] cloning to {}", payload.newid);
        self.client
            .send(
                ApiRequest::post(format!("/nodes/{}/qemu/{}/clone", vm.node, vm.vmid))
                    .json(Value::Object(body)),
                &ctx,
            )
            .await
    }

    // ── Power operations ────────────────────────────────────────────

    pub async fn start_vm(&self, vm: &VmIdentity) -> ProxmoxResult<Upid> {
        self.power(vm, "start_vm", "start").await
    }

    /// Hard stop (not an ACPI shutdown).
    pub async fn stop_vm(&self, vm: &VmIdentity) -> ProxmoxResult<Upid> {
        self.power(vm, "stop_vm", "stop").await
    }

    async fn power(
        &self,
        vm: &VmIdentity,
        operation: &'static str,
        action: &'static str,
    ) -> ProxmoxResult<Upid> {
        let ctx = context(operation, vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;

        log::info!("[Proxmox {vm}] {action}");
        self.client
            .send(
                ApiRequest::post(format!("/nodes/{}/qemu/{}/status/{action}", vm.node, vm.vmid)),
                &ctx,
            )
            .await
    }

    // ── Disks ───────────────────────────────────────────────────────

    /// Grow a disk by `size_gib`. Newer releases answer with a UPID, older
    /// ones with nothing.
    pub async fn resize_disk(&self, payload: &ResizeDiskPayload) -> ProxmoxResult<Option<Upid>> {
        let vm = VmIdentity::new(&payload.node, payload.vmid);
        let ctx = context("resize_disk", &vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;
        let size = codec::encode_resize(&payload.disk, payload.size_gib)
            .map_err(|e| e.with_context(&ctx))?;

        log::info!("[Proxmox {vm}] resizing {} by {size}", payload.disk);
        self.client
            .send(
                ApiRequest::put(format!("/nodes/{}/qemu/{}/resize", vm.node, vm.vmid))
                    .json(json!({ "disk": payload.disk, "size": size })),
                &ctx,
            )
            .await
    }

    // ── Inspection ──────────────────────────────────────────────────

    /// IPv4 addresses reported by the guest agent, loopback excluded.
    ///
    /// Transport failures (agent not running, VM stopped, auth rejected)
    /// yield an empty list; a malformed report is still an error.
    pub async fn list_vm_ips(&self, vm: &VmIdentity) -> ProxmoxResult<Vec<IpAddr>> {
        let ctx = context("list_vm_ips", vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;

        let path = format!(
            "/nodes/{}/qemu/{}/agent/network-get-interfaces",
            vm.node, vm.vmid
        );
        let report = match self.client.send_raw(ApiRequest::get(path), &ctx).await {
            Ok(report) => report,
            Err(e) if e.is_transport_failure() => {
                log::warn!("[Proxmox {vm}] guest agent query failed, reporting no IPs: {e}");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        codec::extract_ipv4_addresses(&report).map_err(|e| e.with_context(&ctx))
    }

    /// VLAN tag of `net0`, or 1 when untagged or when the config cannot be
    /// fetched.
    pub async fn get_vm_vlan_tag(&self, vm: &VmIdentity) -> ProxmoxResult<u16> {
        let ctx = context("get_vm_vlan_tag", vm);
        vm.validate().map_err(|e| e.with_context(&ctx))?;

        let config = match self.fetch_config(vm, &ctx).await {
            Ok(config) => config,
            Err(e) if e.is_transport_failure() => {
                log::warn!(
                    "[Proxmox {vm}] config fetch failed, assuming VLAN {}: {e}",
                    codec::DEFAULT_VLAN_TAG
                );
                return Ok(codec::DEFAULT_VLAN_TAG);
            }
            Err(e) => return Err(e),
        };
        let line = config_line(&config, "net0").map_err(|e| e.with_context(&ctx))?;
        codec::extract_vlan_tag(line).map_err(|e| e.with_context(&ctx))
    }

    // ── Internal helpers ────────────────────────────────────────────

    async fn fetch_config(&self, vm: &VmIdentity, ctx: &OperationContext) -> ProxmoxResult<VmConfig> {
        self.client
            .send(
                ApiRequest::get(format!("/nodes/{}/qemu/{}/config", vm.node, vm.vmid)),
                ctx,
            )
            .await
    }
}

fn context(operation: &'static str, vm: &VmIdentity) -> OperationContext {
    OperationContext::new(operation).node(&vm.node).vmid(vm.vmid)
}

fn config_line<'c>(config: &'c VmConfig, key: &str) -> ProxmoxResult<&'c str> {
    config
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or_else(|| ProxmoxError::not_found(format!("VM config has no '{key}' entry")))
}

fn flag(b: bool) -> Value {
    json!(u8::from(b))
}

fn insert_networks(body: &mut Map<String, Value>, networks: &[NetworkSpec]) -> ProxmoxResult<()> {
    for (i, net) in networks.iter().enumerate() {
        body.insert(format!("net{i}"), json!(codec::encode_network(net)?));
    }
    Ok(())
}

pub(crate) fn build_create_body(payload: &CreateVmPayload) -> ProxmoxResult<Map<String, Value>> {
    if payload.name.trim().is_empty() {
        return Err(ProxmoxError::validation("VM name must not be empty"));
    }
    let storage = payload.local_storage_name.as_str();
    let format = DiskFormat::for_storage(storage);

    let efidisk = codec::encode_efi_disk(&EfiDiskSpec {
        storage_id: storage.to_string(),
        format,
        pre_enrolled_keys: true,
    })?;
    let root_disk = codec::encode_disk(&DiskSpec {
        storage_id: storage.to_string(),
        size_gib: payload.disk_size_gib,
        format,
        iothread: true,
        media: None,
    })?;

    let mut body = Map::new();
    body.insert("vmid".into(), json!(payload.vmid));
    body.insert("name".into(), json!(payload.name));
    body.insert("efidisk0".into(), json!(efidisk));
    body.insert("scsi0".into(), json!(root_disk));
    body.insert("scsihw".into(), json!(SCSI_CONTROLLER));
    body.insert("sockets".into(), json!(1));
    body.insert("numa".into(), json!(0));

    if let Some(autostart) = payload.autostart {
        body.insert("autostart".into(), flag(autostart));
    }
    if let Some(bios) = payload.bios {
        body.insert("bios".into(), serde_json::to_value(bios)?);
    }
    if let Some(ostype) = payload.ostype {
        body.insert("ostype".into(), serde_json::to_value(ostype)?);
    }
    if let Some(cores) = payload.core_count {
        body.insert("cores".into(), json!(cores));
    }
    if let Some(memory) = payload.memory {
        body.insert("memory".into(), json!(memory));
    }
    if let Some(ref iso) = payload.iso_name {
        let cdrom = codec::encode_cdrom(&CdromSpec {
            storage_id: storage.to_string(),
            iso_name: iso.clone(),
        })?;
        body.insert("scsi2".into(), json!(cdrom));
    }

    if payload.networks.is_empty() {
        insert_networks(&mut body, &[NetworkSpec::default()])?;
    } else {
        insert_networks(&mut body, &payload.networks)?;
    }
    Ok(body)
}

pub(crate) fn build_update_body(payload: &UpdateVmPayload) -> ProxmoxResult<Map<String, Value>> {
    let mut body = Map::new();

    if let Some(ref name) = payload.name {
        body.insert("name".into(), json!(name));
    }
    if let Some(cores) = payload.core_count {
        body.insert("cores".into(), json!(cores));
    }
    if let Some(memory) = payload.memory {
        body.insert("memory".into(), json!(memory));
    }
    if let Some(ref tags) = payload.tags {
        body.insert("tags".into(), json!(codec::encode_tags(tags)?));
    }
    if let Some(ref networks) = payload.networks {
        insert_networks(&mut body, networks)?;
    }

    let ip_mode = payload
        .cloud_init
        .as_ref()
        .map(|ci| ci.ip_mode.clone())
        .unwrap_or_default();
    body.insert("ipconfig0".into(), json!(codec::encode_ip_config(&ip_mode)?));

    if let Some(ref ci) = payload.cloud_init {
        if let Some(ref user) = ci.override_user {
            body.insert("ciuser".into(), json!(user));
        }
        if let Some(ref password) = ci.override_password {
            body.insert("cipassword".into(), json!(password));
        }
        if !ci.ssh_public_keys.is_empty() {
            body.insert("sshkeys".into(), json!(codec::encode_ssh_keys(&ci.ssh_public_keys)?));
        }
    }
    Ok(body)
}

pub(crate) fn build_clone_body(payload: &CloneVmPayload) -> ProxmoxResult<Map<String, Value>> {
    validate_vmid(payload.newid)?;
    if payload.newid == payload.vmid {
        return Err(ProxmoxError::validation("Clone target vmid equals the source vmid"));
    }
    if payload.storage.is_some() && !payload.full {
        return Err(ProxmoxError::validation("A target storage requires a full clone"));
    }
    let target = payload.target.as_deref().unwrap_or(&payload.node);
    validate_node(target)?;

    let mut body = Map::new();
    body.insert("newid".into(), json!(payload.newid));
    body.insert("full".into(), flag(payload.full));
    body.insert("target".into(), json!(target));
    if let Some(ref name) = payload.name {
        body.insert("name".into(), json!(name));
    }
    if let Some(ref storage) = payload.storage {
        body.insert("storage".into(), json!(storage));
    }
    if let Some(ref pool) = payload.pool {
        body.insert("pool".into(), json!(pool));
    }
    if let Some(ref description) = payload.description {
        body.insert("description".into(), json!(description));
    }
    Ok(body)
}
