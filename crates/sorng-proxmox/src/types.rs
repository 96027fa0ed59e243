//! Shared types for Proxmox VE management.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::error::{ProxmoxError, ProxmoxResult};

/// Lowest VMID the hypervisor accepts.
pub const MIN_VMID: u32 = 100;
/// Highest VMID the hypervisor accepts.
pub const MAX_VMID: u32 = 999_999_999;

/// Task identifier returned by asynchronous operations (`UPID:...`).
pub type Upid = String;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Connection / Config
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// How long an acquired session ticket is reused.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum TicketPolicy {
    /// Fresh handshake for every operation.
    PerRequest,
    /// Reuse a ticket until it is `ttl_secs` old.
    Cached {
        #[serde(rename = "ttlSecs")]
        ttl_secs: u64,
    },
}

impl Default for TicketPolicy {
    fn default() -> Self {
        Self::PerRequest
    }
}

/// Top-level configuration for connecting to a Proxmox VE node or cluster.
#[derive(Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxmoxConfig {
    /// Hostname / IP (e.g. "pve.lab.local") or a full origin
    /// ("https://pve.lab.local:8006")
    pub host: String,
    /// Port (default 8006), ignored when `host` carries a scheme
    #[serde(default = "default_port")]
    pub port: u16,
    /// Username including realm (e.g. "root@pam")
    pub username: String,
    /// Password
    pub password: String,
    /// Skip TLS certificate verification for this client only (self-signed labs)
    #[serde(default)]
    pub insecure: bool,
    /// Request timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub ticket_policy: TicketPolicy,
}

fn default_port() -> u16 { 8006 }
fn default_timeout() -> u64 { 30 }

impl Default for ProxmoxConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: 8006,
            username: String::new(),
            password: String::new(),
            insecure: false,
            timeout_secs: 30,
            ticket_policy: TicketPolicy::PerRequest,
        }
    }
}

impl fmt::Debug for ProxmoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxmoxConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("insecure", &self.insecure)
            .field("timeout_secs", &self.timeout_secs)
            .field("ticket_policy", &self.ticket_policy)
            .finish()
    }
}

impl ProxmoxConfig {
    /// Scheme + host + port, without the API prefix.
    pub fn origin(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("https://") || host.starts_with("http://") {
            host.to_string()
        } else {
            format!("https://{}:{}", host, self.port)
        }
    }

    /// Base URL every API path is appended to.
    pub fn api_base_url(&self) -> String {
        format!("{}/api2/json", self.origin())
    }

    pub fn validate(&self) -> ProxmoxResult<()> {
        if self.host.trim().is_empty() {
            return Err(ProxmoxError::config("Proxmox host is required"));
        }
        if self.username.trim().is_empty() {
            return Err(ProxmoxError::config("Proxmox username is required"));
        }
        if self.timeout_secs == 0 {
            return Err(ProxmoxError::config("timeout_secs must be greater than zero"));
        }
        if let TicketPolicy::Cached { ttl_secs: 0 } = self.ticket_policy {
            return Err(ProxmoxError::config("cached ticket TTL must be greater than zero"));
        }
        url::Url::parse(&self.origin())
            .map_err(|e| ProxmoxError::config(format!("Invalid Proxmox host '{}': {e}", self.host)))?;
        Ok(())
    }

    pub fn credentials(&self) -> Credentials {
        Credentials {
            host: self.origin(),
            username: self.username.clone(),
            password: self.password.clone(),
        }
    }
}

/// Config without the password, safe to hand back to a UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProxmoxConfigSafe {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub insecure: bool,
    pub ticket_policy: TicketPolicy,
}

impl From<&ProxmoxConfig> for ProxmoxConfigSafe {
    fn from(c: &ProxmoxConfig) -> Self {
        Self {
            host: c.host.clone(),
            port: c.port,
            username: c.username.clone(),
            insecure: c.insecure,
            ticket_policy: c.ticket_policy,
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Session
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Clone)]
pub struct Credentials {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("host", &self.host)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Ticket + CSRF token pair issued by `/access/ticket`.
#[derive(Clone)]
pub struct SessionTicket {
    pub ticket: String,
    pub csrf_token: String,
    pub username: String,
    pub capabilities: serde_json::Value,
    pub acquired_at: DateTime<Utc>,
}

impl fmt::Debug for SessionTicket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionTicket")
            .field("ticket", &"<redacted>")
            .field("csrf_token", &"<redacted>")
            .field("username", &self.username)
            .field("acquired_at", &self.acquired_at)
            .finish()
    }
}

/// The two headers every authenticated request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthHeaders {
    pub cookie: String,
    pub csrf_prevention_token: String,
}

impl AuthHeaders {
    pub fn into_pairs(self) -> Vec<(String, String)> {
        vec![
            ("Cookie".to_string(), self.cookie),
            ("CSRFPreventionToken".to_string(), self.csrf_prevention_token),
        ]
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Resource specs
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskFormat {
    Raw,
    Qcow2,
}

impl DiskFormat {
    /// Directory storage named `local` takes qcow2; LVM-thin style storages
    /// (`local-lvm` and friends) only accept raw volumes.
    pub fn for_storage(storage_id: &str) -> Self {
        if storage_id == "local" {
            Self::Qcow2
        } else {
            Self::Raw
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Raw => "raw",
            Self::Qcow2 => "qcow2",
        }
    }

    pub fn parse(s: &str) -> ProxmoxResult<Self> {
        match s {
            "raw" => Ok(Self::Raw),
            "qcow2" => Ok(Self::Qcow2),
            other => Err(ProxmoxError::validation(format!(
                "Unsupported disk format '{other}' (expected raw or qcow2)"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DiskMedia {
    Disk,
    Cdrom,
}

impl DiskMedia {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disk => "disk",
            Self::Cdrom => "cdrom",
        }
    }

    pub fn parse(s: &str) -> ProxmoxResult<Self> {
        match s {
            "disk" => Ok(Self::Disk),
            "cdrom" => Ok(Self::Cdrom),
            other => Err(ProxmoxError::validation(format!("Unknown disk media '{other}'"))),
        }
    }
}

/// New volume allocation: `storage:size_gib,...`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DiskSpec {
    pub storage_id: String,
    pub size_gib: u32,
    pub format: DiskFormat,
    #[serde(default)]
    pub iothread: bool,
    #[serde(default)]
    pub media: Option<DiskMedia>,
}

/// OVMF variables disk. Size (1) and type (4m) are fixed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct EfiDiskSpec {
    pub storage_id: String,
    pub format: DiskFormat,
    #[serde(default = "default_true")]
    pub pre_enrolled_keys: bool,
}

/// ISO image attached as a CD-ROM drive.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CdromSpec {
    pub storage_id: String,
    pub iso_name: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NetworkModel {
    Virtio,
    E1000,
    Rtl8139,
    Vmxnet3,
}

impl Default for NetworkModel {
    fn default() -> Self { Self::Virtio }
}

impl NetworkModel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Virtio => "virtio",
            Self::E1000 => "e1000",
            Self::Rtl8139 => "rtl8139",
            Self::Vmxnet3 => "vmxnet3",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "virtio" => Some(Self::Virtio),
            "e1000" => Some(Self::E1000),
            "rtl8139" => Some(Self::Rtl8139),
            "vmxnet3" => Some(Self::Vmxnet3),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSpec {
    #[serde(default)]
    pub model: NetworkModel,
    pub bridge: String,
    #[serde(default = "default_true")]
    pub firewall: bool,
    #[serde(default)]
    pub vlan_tag: Option<u16>,
}

impl Default for NetworkSpec {
    fn default() -> Self {
        Self {
            model: NetworkModel::Virtio,
            bridge: "vmbr0".to_string(),
            firewall: true,
            vlan_tag: None,
        }
    }
}

fn default_true() -> bool { true }

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", tag = "mode")]
pub enum IpMode {
    Dhcp,
    Static {
        /// Address in CIDR notation, e.g. "10.0.0.5/24"
        cidr: String,
        #[serde(default)]
        gateway: Option<String>,
    },
}

impl Default for IpMode {
    fn default() -> Self { Self::Dhcp }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CloudInitConfig {
    #[serde(default)]
    pub ip_mode: IpMode,
    #[serde(default)]
    pub ssh_public_keys: Vec<String>,
    #[serde(default)]
    pub override_user: Option<String>,
    #[serde(default)]
    pub override_password: Option<String>,
}

/// A VM addressed by node + vmid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct VmIdentity {
    pub node: String,
    pub vmid: u32,
}

impl VmIdentity {
    pub fn new(node: impl Into<String>, vmid: u32) -> Self {
        Self { node: node.into(), vmid }
    }

    pub fn validate(&self) -> ProxmoxResult<()> {
        validate_node(&self.node)?;
        validate_vmid(self.vmid)
    }
}

impl fmt::Display for VmIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.node, self.vmid)
    }
}

pub fn validate_vmid(vmid: u32) -> ProxmoxResult<()> {
    if !(MIN_VMID..=MAX_VMID).contains(&vmid) {
        return Err(ProxmoxError::validation(format!(
            "vmid {vmid} out of range [{MIN_VMID}, {MAX_VMID}]"
        )));
    }
    Ok(())
}

pub fn validate_node(node: &str) -> ProxmoxResult<()> {
    if node.is_empty() || node.contains('/') {
        return Err(ProxmoxError::validation(format!("Invalid node name '{node}'")));
    }
    Ok(())
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Operation payloads
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Bios {
    Seabios,
    Ovmf,
}

/// Guest OS hint (`ostype`).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OsType {
    Other,
    Wxp,
    W2k,
    W2k3,
    W2k8,
    Wvista,
    Win7,
    Win8,
    Win10,
    Win11,
    L24,
    L26,
    Solaris,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateVmPayload {
    pub node: String,
    pub vmid: u32,
    pub name: String,
    #[serde(default)]
    pub autostart: Option<bool>,
    #[serde(default)]
    pub bios: Option<Bios>,
    /// Memory in MiB
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub ostype: Option<OsType>,
    #[serde(default)]
    pub core_count: Option<u32>,
    /// File name of an ISO already present on `local_storage_name`
    #[serde(default)]
    pub iso_name: Option<String>,
    /// Storage holding VM disks ("local", "local-lvm", ...)
    pub local_storage_name: String,
    #[serde(default = "default_disk_size")]
    pub disk_size_gib: u32,
    #[serde(default)]
    pub networks: Vec<NetworkSpec>,
}

fn default_disk_size() -> u32 { 32 }

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateVmPayload {
    pub node: String,
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub core_count: Option<u32>,
    #[serde(default)]
    pub memory: Option<u64>,
    #[serde(default)]
    pub tags: Option<Vec<String>>,
    #[serde(default)]
    pub networks: Option<Vec<NetworkSpec>>,
    #[serde(default)]
    pub cloud_init: Option<CloudInitConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteVmPayload {
    pub node: String,
    pub vmid: u32,
    /// Also destroy disks carrying this vmid that the config no longer references
    #[serde(default)]
    pub destroy_unreferenced_disks: bool,
    /// Remove the vmid from backup / replication / HA configuration
    #[serde(default)]
    pub purge: bool,
    /// Ignore locks (root only)
    #[serde(default)]
    pub skiplock: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloneVmPayload {
    pub node: String,
    pub vmid: u32,
    pub newid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub full: bool,
    /// Target node (defaults to the source node)
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub storage: Option<String>,
    #[serde(default)]
    pub pool: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeDiskPayload {
    pub node: String,
    pub vmid: u32,
    /// Disk key, e.g. "scsi0"
    pub disk: String,
    /// Growth in GiB
    pub size_gib: u32,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DownloadContent {
    Iso,
    Vztmpl,
}

impl DownloadContent {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Iso => "iso",
            Self::Vztmpl => "vztmpl",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadIsoPayload {
    pub node: String,
    pub storage: String,
    pub url: String,
    pub content: DownloadContent,
    /// Target file name (normalised by the hypervisor)
    pub filename: String,
    #[serde(default)]
    pub checksum: Option<String>,
    /// e.g. "sha256"
    #[serde(default)]
    pub checksum_algorithm: Option<String>,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  API responses
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum QemuStatus {
    Running,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl Default for QemuStatus {
    fn default() -> Self { Self::Unknown }
}

/// Entry of `GET /nodes/{node}/qemu`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QemuMachine {
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: QemuStatus,
    #[serde(default)]
    pub cpus: Option<f64>,
    /// Root disk size in bytes
    #[serde(default)]
    pub maxdisk: Option<u64>,
    /// Maximum memory in bytes
    #[serde(default)]
    pub maxmem: Option<u64>,
    /// `;`-separated tag line
    #[serde(default)]
    pub tags: Option<String>,
    /// Uptime in seconds
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub template: Option<u8>,
}

/// Entry of `GET /cluster/resources`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterResource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: String,
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default)]
    pub vmid: Option<u32>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub template: Option<u8>,
    #[serde(default)]
    pub tags: Option<String>,
    #[serde(default)]
    pub maxdisk: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
}

impl ClusterResource {
    pub fn is_template(&self) -> bool {
        self.template == Some(1)
    }
}

/// `GET /version`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ProxmoxVersion {
    pub version: String,
    #[serde(default)]
    pub release: Option<String>,
    #[serde(default)]
    pub repoid: Option<String>,
}

/// Raw VM configuration: every key maps to its property string or scalar.
pub type VmConfig = BTreeMap<String, serde_json::Value>;

/// Guest agent `network-get-interfaces` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentNetworkReport {
    pub result: Vec<AgentInterface>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentInterface {
    pub name: String,
    #[serde(default, rename = "hardware-address")]
    pub hardware_address: Option<String>,
    #[serde(default, rename = "ip-addresses")]
    pub ip_addresses: Vec<AgentIpEntry>,
    #[serde(default)]
    pub statistics: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentIpEntry {
    #[serde(rename = "ip-address")]
    pub ip_address: String,
    #[serde(rename = "ip-address-type")]
    pub ip_address_type: String,
    #[serde(default)]
    pub prefix: Option<u8>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn origin_from_bare_host_uses_port() {
        let cfg = ProxmoxConfig {
            host: "pve.lab.local".into(),
            username: "root@pam".into(),
            ..Default::default()
        };
        assert_eq!(cfg.origin(), "https://pve.lab.local:8006");
        assert_eq!(cfg.api_base_url(), "https://pve.lab.local:8006/api2/json");
    }

    #[test]
    fn origin_with_scheme_is_verbatim() {
        let cfg = ProxmoxConfig {
            host: "http://10.0.0.2:8006/".into(),
            port: 1,
            ..Default::default()
        };
        assert_eq!(cfg.origin(), "http://10.0.0.2:8006");
    }

    #[test]
    fn config_defaults_from_json() {
        let cfg: ProxmoxConfig = serde_json::from_str(
            r#"{"host":"pve","username":"root@pam","password":"secret"}"#,
        )
        .unwrap();
        assert_eq!(cfg.port, 8006);
        assert_eq!(cfg.timeout_secs, 30);
        assert!(!cfg.insecure);
        assert_eq!(cfg.ticket_policy, TicketPolicy::PerRequest);
    }

    #[test]
    fn cached_policy_from_json() {
        let cfg: ProxmoxConfig = serde_json::from_str(
            r#"{"host":"pve","username":"u","password":"p","ticketPolicy":{"mode":"cached","ttlSecs":600}}"#,
        )
        .unwrap();
        assert_eq!(cfg.ticket_policy, TicketPolicy::Cached { ttl_secs: 600 });
    }

    #[test]
    fn validate_rejects_missing_fields() {
        assert!(ProxmoxConfig::default().validate().is_err());
        let cfg = ProxmoxConfig {
            host: "pve".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
        let cfg = ProxmoxConfig {
            host: "pve".into(),
            username: "root@pam".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn debug_redacts_secrets() {
        let cfg = ProxmoxConfig {
            host: "pve".into(),
            username: "root@pam".into(),
            password: "hunter2".into(),
            ..Default::default()
        };
        assert!(!format!("{cfg:?}").contains("hunter2"));
        assert!(!format!("{:?}", cfg.credentials()).contains("hunter2"));
    }

    #[test]
    fn disk_format_follows_storage() {
        assert_eq!(DiskFormat::for_storage("local"), DiskFormat::Qcow2);
        assert_eq!(DiskFormat::for_storage("local-lvm"), DiskFormat::Raw);
        assert_eq!(DiskFormat::for_storage("ceph-pool"), DiskFormat::Raw);
    }

    #[test]
    fn vmid_bounds() {
        assert!(validate_vmid(99).is_err());
        assert!(validate_vmid(100).is_ok());
        assert!(validate_vmid(999_999_999).is_ok());
        assert!(validate_vmid(1_000_000_000).is_err());
    }

    #[test]
    fn qemu_status_unknown_fallback() {
        let m: QemuMachine =
            serde_json::from_str(r#"{"vmid":101,"status":"paused"}"#).unwrap();
        assert_eq!(m.status, QemuStatus::Unknown);
    }
}
