//! Domain records served by the zone.

use hickory_proto::rr::Name;
use std::fmt;
use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use crate::error::CoolDnsError;

/// Byte used to join multi-valued fields in the persisted columns.
pub const RECORD_SEPARATOR: char = '\x1f';

/// Longest string a single TXT character-string can carry.
pub const MAX_TXT_LEN: usize = 255;

/// A mail exchanger for a hostname.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MxEntry {
    /// Exchange hostname (FQDN).
    pub target: String,
    /// Preference, lower is preferred.
    pub priority: u16,
}

impl MxEntry {
    /// Create an MX entry.
    pub fn new(target: impl Into<String>, priority: u16) -> Self {
        Self {
            target: target.into(),
            priority,
        }
    }
}

/// Parses `"<priority> <target>"`.
impl FromStr for MxEntry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut fields = s.split_whitespace();
        match (fields.next(), fields.next(), fields.next()) {
            (Some(priority), Some(target), None) => {
                let priority = priority
                    .parse::<u16>()
                    .map_err(|e| format!("bad priority in {s:?}: {e}"))?;
                Ok(MxEntry::new(target, priority))
            }
            _ => Err(format!("expected \"<priority> <target>\", got {s:?}")),
        }
    }
}

/// Everything the zone can answer for one owner name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DomainRecord {
    /// Normalized FQDN, the unique key.
    pub hostname: String,
    /// IPv4 addresses in insertion order.
    pub ipv4: Vec<Ipv4Addr>,
    /// IPv6 addresses in insertion order.
    pub ipv6: Vec<Ipv6Addr>,
    /// TXT strings, served together as one record.
    pub txt: Vec<String>,
    /// Mail exchangers in insertion order.
    pub mx: Vec<MxEntry>,
    /// Alias target. When set it is the only thing answered.
    pub cname: Option<String>,
    /// Offline records are persisted but not served.
    pub offline: bool,
}

impl DomainRecord {
    /// Create an empty online record for `hostname` (normalized).
    pub fn new(hostname: &str) -> Self {
        Self {
            hostname: normalize_hostname(hostname),
            ..Default::default()
        }
    }

    /// Check the record can be persisted and served unchanged.
    pub fn validate(&self) -> Result<(), CoolDnsError> {
        if self.hostname.is_empty() || !self.hostname.ends_with('.') {
            return Err(CoolDnsError::InvalidRecord(format!(
                "hostname {:?} is not fully qualified",
                self.hostname
            )));
        }
        if self.hostname.contains(RECORD_SEPARATOR) {
            return Err(invalid_separator("hostname"));
        }
        if self.hostname != normalize_hostname(&self.hostname) {
            return Err(CoolDnsError::InvalidRecord(format!(
                "hostname {:?} is not normalized",
                self.hostname
            )));
        }
        for txt in &self.txt {
            if txt.is_empty() {
                return Err(CoolDnsError::InvalidRecord("empty TXT string".to_string()));
            }
            if txt.len() > MAX_TXT_LEN {
                return Err(CoolDnsError::InvalidRecord(format!(
                    "TXT string longer than {MAX_TXT_LEN} bytes"
                )));
            }
            if txt.contains(RECORD_SEPARATOR) {
                return Err(invalid_separator("TXT"));
            }
        }
        for mx in &self.mx {
            if mx.target.is_empty() || mx.target.chars().any(char::is_whitespace) {
                return Err(CoolDnsError::InvalidRecord(format!(
                    "MX target {:?} must be a single non-empty name",
                    mx.target
                )));
            }
            if mx.target.contains(RECORD_SEPARATOR) {
                return Err(invalid_separator("MX"));
            }
        }
        if let Some(cname) = &self.cname {
            if cname.is_empty() {
                return Err(CoolDnsError::InvalidRecord("empty CNAME target".to_string()));
            }
            if cname.contains(RECORD_SEPARATOR) {
                return Err(invalid_separator("CNAME"));
            }
        }
        Ok(())
    }
}

impl fmt::Display for DomainRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ipv4={:?} ipv6={:?} txt={:?} mx={:?} cname={:?} offline={}",
            self.hostname, self.ipv4, self.ipv6, self.txt, self.mx, self.cname, self.offline
        )
    }
}

fn invalid_separator(field: &str) -> CoolDnsError {
    CoolDnsError::InvalidRecord(format!("{field} contains the reserved separator byte 0x1f"))
}

/// Normalize a hostname into its directory key.
///
/// Lowercases, makes it fully qualified and decodes punycode labels to
/// Unicode. If IDNA decoding fails the lowercased name is used as is.
pub fn normalize_hostname(hostname: &str) -> String {
    let lower = hostname.trim().to_lowercase();
    let bare = lower.trim_end_matches('.');
    if bare.is_empty() {
        return String::new();
    }

    let (unicode, result) = idna::domain_to_unicode(bare);
    let decoded = match result {
        Ok(()) => unicode,
        Err(_) => bare.to_string(),
    };
    format!("{decoded}.")
}

/// Turn user input into a hostname under `zone`.
///
/// The name is lowercased, repeated dots are collapsed and the zone is
/// appended when missing. Returns `None` if less than two characters remain
/// in front of the zone or the result is not a valid domain name.
pub fn validate_subdomain(subdomain: &str, zone: &str) -> Option<String> {
    let zone = normalize_hostname(zone);
    if zone.is_empty() {
        return None;
    }

    let mut sub = subdomain.trim().to_lowercase();
    while sub.contains("..") {
        sub = sub.replace("..", ".");
    }
    let sub = sub.trim_start_matches('.');
    if sub.is_empty() {
        return None;
    }

    let mut fqdn = normalize_hostname(sub);
    if !is_subdomain_of(&fqdn, &zone) {
        fqdn = format!("{fqdn}{zone}");
    }
    if !is_subdomain_of(&fqdn, &zone) {
        return None;
    }

    let label_part = &fqdn[..fqdn.len() - zone.len()];
    if label_part.chars().filter(|c| *c != '.').count() < 2 {
        return None;
    }

    match Name::from_utf8(&fqdn) {
        Ok(name) if name.is_fqdn() => Some(fqdn),
        _ => None,
    }
}

/// True if `name` is strictly below `zone`, both normalized.
fn is_subdomain_of(name: &str, zone: &str) -> bool {
    name.len() > zone.len()
        && name.ends_with(zone)
        && name[..name.len() - zone.len()].ends_with('.')
}
