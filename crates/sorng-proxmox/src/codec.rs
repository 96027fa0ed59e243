//! Property-string codec.
//!
//! Proxmox describes attached resources (disks, NICs, cloud-init IP
//! settings) as single-line, comma-separated strings such as
//! `local-lvm:32,format=raw,iothread=on` or
//! `model=virtio,bridge=vmbr0,firewall=1,tag=42`. This module turns the
//! structured specs from [`crate::types`] into that grammar and parses stored
//! lines back. Everything here is pure; malformed input is a
//! `ValidationError`, never a panic or a guess.

use std::collections::HashSet;
use std::net::{IpAddr, Ipv4Addr};

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

use crate::error::{ProxmoxError, ProxmoxResult};
use crate::types::*;

/// Untagged traffic is VLAN 1.
pub const DEFAULT_VLAN_TAG: u16 = 1;

const MAX_VLAN_TAG: u16 = 4094;

/// Same set `encodeURIComponent` escapes: everything but `A-Za-z0-9-_.!~*'()`.
const SSH_KEY_ENCODE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

const ENCODED_NEWLINE: &str = "%0A";

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Generic grammar
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// A parsed property string: an optional leading positional value followed
/// by `key=value` pairs in their original order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropertyString {
    pub positional: Option<String>,
    pub pairs: Vec<(String, String)>,
}

impl PropertyString {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Key of the first pair, used for `model=MAC` style NIC lines.
    pub fn first_key(&self) -> Option<&str> {
        self.pairs.first().map(|(k, _)| k.as_str())
    }
}

/// Parse a property string.
///
/// Unknown keys are kept. Empty segments, empty keys, duplicate keys and a
/// positional value anywhere but the first segment are rejected.
pub fn parse_property_string(line: &str) -> ProxmoxResult<PropertyString> {
    let line = line.trim();
    if line.is_empty() {
        return Err(ProxmoxError::validation("Empty property string"));
    }

    let mut positional = None;
    let mut pairs = Vec::new();
    let mut seen = HashSet::new();

    for (idx, segment) in line.split(',').enumerate() {
        let segment = segment.trim();
        if segment.is_empty() {
            return Err(ProxmoxError::validation(format!(
                "Empty segment at position {idx} in '{line}'"
            )));
        }
        match segment.split_once('=') {
            Some((key, value)) => {
                let key = key.trim();
                if key.is_empty() {
                    return Err(ProxmoxError::validation(format!(
                        "Segment '{segment}' has an empty key in '{line}'"
                    )));
                }
                if !seen.insert(key.to_string()) {
                    return Err(ProxmoxError::validation(format!(
                        "Duplicate key '{key}' in '{line}'"
                    )));
                }
                pairs.push((key.to_string(), value.trim().to_string()));
            }
            None if idx == 0 => positional = Some(segment.to_string()),
            None => {
                return Err(ProxmoxError::validation(format!(
                    "Unexpected positional segment '{segment}' in '{line}'"
                )))
            }
        }
    }

    Ok(PropertyString { positional, pairs })
}

fn validate_token(what: &str, value: &str) -> ProxmoxResult<()> {
    if value.is_empty() {
        return Err(ProxmoxError::validation(format!("{what} must not be empty")));
    }
    if value
        .chars()
        .any(|c| c == ',' || c == '=' || c == ':' || c.is_whitespace())
    {
        return Err(ProxmoxError::validation(format!(
            "{what} '{value}' contains a reserved character"
        )));
    }
    Ok(())
}

fn parse_flag(key: &str, value: &str) -> ProxmoxResult<bool> {
    match value {
        "1" | "on" | "yes" | "true" => Ok(true),
        "0" | "off" | "no" | "false" => Ok(false),
        other => Err(ProxmoxError::validation(format!(
            "Invalid boolean '{other}' for '{key}'"
        ))),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Disks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `storage:size,format=F[,iothread=on][,media=M]`
pub fn encode_disk(spec: &DiskSpec) -> ProxmoxResult<String> {
    validate_token("Storage id", &spec.storage_id)?;
    if spec.size_gib == 0 {
        return Err(ProxmoxError::validation("Disk size must be greater than 0 GiB"));
    }

    let mut out = format!(
        "{}:{},format={}",
        spec.storage_id,
        spec.size_gib,
        spec.format.as_str()
    );
    if spec.iothread {
        out.push_str(",iothread=on");
    }
    if let Some(media) = spec.media {
        out.push_str(",media=");
        out.push_str(media.as_str());
    }
    Ok(out)
}

/// Inverse of [`encode_disk`]. A missing `format=` means raw.
pub fn decode_disk(line: &str) -> ProxmoxResult<DiskSpec> {
    let props = parse_property_string(line)?;
    let volume = props
        .positional
        .as_deref()
        .ok_or_else(|| ProxmoxError::validation(format!("Disk line '{line}' has no volume")))?;
    let (storage_id, size) = volume.split_once(':').ok_or_else(|| {
        ProxmoxError::validation(format!("Disk volume '{volume}' is not storage:size"))
    })?;
    validate_token("Storage id", storage_id)?;
    let size_gib: u32 = size.parse().map_err(|_| {
        ProxmoxError::validation(format!("Disk size '{size}' is not a whole number of GiB"))
    })?;
    if size_gib == 0 {
        return Err(ProxmoxError::validation("Disk size must be greater than 0 GiB"));
    }

    let format = props
        .get("format")
        .map(DiskFormat::parse)
        .transpose()?
        .unwrap_or(DiskFormat::Raw);
    let iothread = props
        .get("iothread")
        .map(|v| parse_flag("iothread", v))
        .transpose()?
        .unwrap_or(false);
    let media = props.get("media").map(DiskMedia::parse).transpose()?;

    Ok(DiskSpec {
        storage_id: storage_id.to_string(),
        size_gib,
        format,
        iothread,
        media,
    })
}

/// `storage:1,efitype=4m,pre-enrolled-keys=1,format=F`
pub fn encode_efi_disk(spec: &EfiDiskSpec) -> ProxmoxResult<String> {
    validate_token("Storage id", &spec.storage_id)?;
    Ok(format!(
        "{}:1,efitype=4m,pre-enrolled-keys={},format={}",
        spec.storage_id,
        u8::from(spec.pre_enrolled_keys),
        spec.format.as_str()
    ))
}

/// `storage:iso/NAME,media=cdrom`
pub fn encode_cdrom(spec: &CdromSpec) -> ProxmoxResult<String> {
    validate_token("Storage id", &spec.storage_id)?;
    if spec.iso_name.is_empty() || spec.iso_name.contains(',') || spec.iso_name.contains('/') {
        return Err(ProxmoxError::validation(format!(
            "Invalid ISO file name '{}'",
            spec.iso_name
        )));
    }
    Ok(format!("{}:iso/{},media=cdrom", spec.storage_id, spec.iso_name))
}

/// `+{size_gib}G`. Only growth is supported.
pub fn encode_resize(disk: &str, size_gib: u32) -> ProxmoxResult<String> {
    if disk.is_empty() || !disk.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(ProxmoxError::validation(format!("Invalid disk id '{disk}'")));
    }
    if size_gib == 0 {
        return Err(ProxmoxError::validation(format!(
            "Resize of {disk} must grow the disk by at least 1 GiB"
        )));
    }
    Ok(format!("+{size_gib}G"))
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Network
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn parse_vlan_tag(value: &str) -> ProxmoxResult<u16> {
    let tag: u16 = value
        .parse()
        .map_err(|_| ProxmoxError::validation(format!("VLAN tag '{value}' is not an integer")))?;
    check_vlan_tag(tag)?;
    Ok(tag)
}

fn check_vlan_tag(tag: u16) -> ProxmoxResult<()> {
    if tag == 0 || tag > MAX_VLAN_TAG {
        return Err(ProxmoxError::validation(format!(
            "VLAN tag {tag} out of range [1, {MAX_VLAN_TAG}]"
        )));
    }
    Ok(())
}

/// `model=M,bridge=B,firewall=0|1[,tag=T]`
pub fn encode_network(spec: &NetworkSpec) -> ProxmoxResult<String> {
    validate_token("Bridge", &spec.bridge)?;
    let mut out = format!(
        "model={},bridge={},firewall={}",
        spec.model.as_str(),
        spec.bridge,
        u8::from(spec.firewall)
    );
    if let Some(tag) = spec.vlan_tag {
        check_vlan_tag(tag)?;
        out.push_str(&format!(",tag={tag}"));
    }
    Ok(out)
}

/// Full NIC decode. Accepts `model=M`, a bare leading model, or the stored
/// `M=MAC` form.
pub fn decode_network(line: &str) -> ProxmoxResult<NetworkSpec> {
    let props = parse_property_string(line)?;

    let model = if let Some(m) = props.get("model") {
        NetworkModel::parse(m)
            .ok_or_else(|| ProxmoxError::validation(format!("Unknown NIC model '{m}'")))?
    } else if let Some(ref pos) = props.positional {
        NetworkModel::parse(pos)
            .ok_or_else(|| ProxmoxError::validation(format!("Unknown NIC model '{pos}'")))?
    } else {
        props
            .first_key()
            .and_then(NetworkModel::parse)
            .ok_or_else(|| ProxmoxError::validation(format!("NIC line '{line}' has no model")))?
    };

    let bridge = props
        .get("bridge")
        .ok_or_else(|| ProxmoxError::validation(format!("NIC line '{line}' has no bridge")))?;
    validate_token("Bridge", bridge)?;

    let firewall = props
        .get("firewall")
        .map(|v| parse_flag("firewall", v))
        .transpose()?
        .unwrap_or(false);
    let vlan_tag = props.get("tag").map(parse_vlan_tag).transpose()?;

    Ok(NetworkSpec {
        model,
        bridge: bridge.to_string(),
        firewall,
        vlan_tag,
    })
}

/// VLAN tag of a NIC line, or [`DEFAULT_VLAN_TAG`] when it carries none.
pub fn extract_vlan_tag(line: &str) -> ProxmoxResult<u16> {
    let props = parse_property_string(line)?;
    match props.get("tag") {
        Some(value) => parse_vlan_tag(value),
        None => Ok(DEFAULT_VLAN_TAG),
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Cloud-init
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Percent-encode each key and join them with an encoded newline.
pub fn encode_ssh_keys(keys: &[String]) -> ProxmoxResult<String> {
    if keys.is_empty() {
        return Err(ProxmoxError::validation(
            "No SSH keys given; omit the sshkeys field instead",
        ));
    }

    let mut encoded = Vec::with_capacity(keys.len());
    for (i, key) in keys.iter().enumerate() {
        let key = key.trim();
        if key.is_empty() {
            return Err(ProxmoxError::validation(format!("SSH key #{i} is empty")));
        }
        if key.contains('\n') || key.contains('\r') {
            return Err(ProxmoxError::validation(format!(
                "SSH key #{i} spans multiple lines"
            )));
        }
        encoded.push(utf8_percent_encode(key, SSH_KEY_ENCODE_SET).to_string());
    }
    Ok(encoded.join(ENCODED_NEWLINE))
}

/// Inverse of [`encode_ssh_keys`].
pub fn decode_ssh_keys(encoded: &str) -> ProxmoxResult<Vec<String>> {
    let decoded = percent_decode_str(encoded)
        .decode_utf8()
        .map_err(|e| ProxmoxError::validation(format!("sshkeys is not valid UTF-8: {e}")))?;
    let keys: Vec<String> = decoded
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect();
    if keys.is_empty() {
        return Err(ProxmoxError::validation("sshkeys contains no keys"));
    }
    Ok(keys)
}

fn parse_cidr(cidr: &str) -> ProxmoxResult<IpAddr> {
    let (addr, prefix) = cidr
        .split_once('/')
        .ok_or_else(|| ProxmoxError::validation(format!("'{cidr}' is not in CIDR notation")))?;
    let addr: IpAddr = addr
        .parse()
        .map_err(|_| ProxmoxError::validation(format!("'{addr}' is not an IP address")))?;
    let prefix: u8 = prefix
        .parse()
        .map_err(|_| ProxmoxError::validation(format!("'{prefix}' is not a prefix length")))?;
    let max = if addr.is_ipv4() { 32 } else { 128 };
    if prefix > max {
        return Err(ProxmoxError::validation(format!(
            "Prefix /{prefix} too long for {addr}"
        )));
    }
    Ok(addr)
}

/// `ip=dhcp`, `ip=CIDR[,gw=GW]` or `ip6=CIDR[,gw6=GW]`.
pub fn encode_ip_config(mode: &IpMode) -> ProxmoxResult<String> {
    match mode {
        IpMode::Dhcp => Ok("ip=dhcp".to_string()),
        IpMode::Static { cidr, gateway } => {
            let addr = parse_cidr(cidr)?;
            let (ip_key, gw_key) = if addr.is_ipv4() { ("ip", "gw") } else { ("ip6", "gw6") };
            let mut out = format!("{ip_key}={cidr}");
            if let Some(gw) = gateway {
                let gw_addr: IpAddr = gw
                    .parse()
                    .map_err(|_| ProxmoxError::validation(format!("Gateway '{gw}' is not an IP address")))?;
                if gw_addr.is_ipv4() != addr.is_ipv4() {
                    return Err(ProxmoxError::validation(format!(
                        "Gateway {gw} is not the same address family as {cidr}"
                    )));
                }
                out.push_str(&format!(",{gw_key}={gw}"));
            }
            Ok(out)
        }
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tags
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

fn valid_tag(tag: &str) -> bool {
    let mut chars = tag.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphanumeric() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '.' | '-'))
}

/// `;`-joined tag line. An empty list clears the tags.
pub fn encode_tags(tags: &[String]) -> ProxmoxResult<String> {
    for tag in tags {
        if !valid_tag(tag) {
            return Err(ProxmoxError::validation(format!("Invalid tag '{tag}'")));
        }
    }
    Ok(tags.join(";"))
}

pub fn decode_tags(line: &str) -> Vec<String> {
    line.split(|c| c == ';' || c == ',' || c == ' ')
        .filter(|t| !t.is_empty())
        .map(String::from)
        .collect()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Guest agent
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Flatten a `network-get-interfaces` report into its IPv4 addresses,
/// dropping `127.0.0.1`. Interface and address order is kept.
pub fn extract_ipv4_addresses(report: &serde_json::Value) -> ProxmoxResult<Vec<IpAddr>> {
    let interfaces: Vec<AgentInterface> = match report {
        serde_json::Value::Array(_) => serde_json::from_value(report.clone()),
        _ => serde_json::from_value::<AgentNetworkReport>(report.clone()).map(|r| r.result),
    }
    .map_err(|e| ProxmoxError::validation(format!("Malformed guest agent report: {e}")))?;

    let mut out = Vec::new();
    for entry in interfaces.iter().flat_map(|i| i.ip_addresses.iter()) {
        if entry.ip_address_type != "ipv4" {
            continue;
        }
        let addr: Ipv4Addr = entry.ip_address.parse().map_err(|_| {
            ProxmoxError::validation(format!(
                "Guest agent reported invalid IPv4 address '{}'",
                entry.ip_address
            ))
        })?;
        if addr == Ipv4Addr::LOCALHOST {
            continue;
        }
        out.push(IpAddr::V4(addr));
    }
    Ok(out)
}
