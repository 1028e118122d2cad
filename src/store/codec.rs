//! Column encoding for multi-valued record fields.
//!
//! Each list is stored as one text column, elements joined by
//! [`RECORD_SEPARATOR`]. MX elements are `"<priority> <target>"`.
//! An empty list is the empty string.

use std::net::{Ipv4Addr, Ipv6Addr};
use std::str::FromStr;
use tracing::warn;

use crate::record::{DomainRecord, MxEntry, RECORD_SEPARATOR};

/// A record row as stored in the `cooldns` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordRow {
    /// `hostname` column.
    pub hostname: String,
    /// `ip4` column.
    pub ip4: String,
    /// `ip6` column.
    pub ip6: String,
    /// `offline` column.
    pub offline: bool,
    /// `txt` column.
    pub txt: String,
    /// `mx` column.
    pub mx: String,
    /// `cname` column, NULL when unset.
    pub cname: Option<String>,
}

/// Encode a record into its row form.
pub fn encode_record(record: &DomainRecord) -> RecordRow {
    RecordRow {
        hostname: record.hostname.clone(),
        ip4: join(record.ipv4.iter().map(ToString::to_string)),
        ip6: join(record.ipv6.iter().map(ToString::to_string)),
        offline: record.offline,
        txt: join(record.txt.iter().cloned()),
        mx: join(record.mx.iter().map(|mx| format!("{} {}", mx.priority, mx.target))),
        cname: record.cname.clone(),
    }
}

/// Decode a stored row.
///
/// Addresses that do not parse are dropped one by one. A malformed MX
/// column leaves the record without MX entries.
pub fn decode_record(row: RecordRow) -> DomainRecord {
    let ipv4 = parse_addrs::<Ipv4Addr>(&row.hostname, "ip4", &row.ip4);
    let ipv6 = parse_addrs::<Ipv6Addr>(&row.hostname, "ip6", &row.ip6);

    let mx = match decode_mx(&row.mx) {
        Ok(mx) => mx,
        Err(reason) => {
            warn!(hostname = %row.hostname, %reason, "malformed mx column, dropping mx entries");
            Vec::new()
        }
    };

    DomainRecord {
        hostname: row.hostname,
        ipv4,
        ipv6,
        txt: split(&row.txt).map(str::to_string).collect(),
        mx,
        cname: row.cname.filter(|c| !c.is_empty()),
        offline: row.offline,
    }
}

/// Decode an MX column into entries.
pub fn decode_mx(column: &str) -> Result<Vec<MxEntry>, String> {
    split(column).map(str::parse).collect()
}

fn join(items: impl Iterator<Item = String>) -> String {
    items.collect::<Vec<_>>().join(&RECORD_SEPARATOR.to_string())
}

fn split(column: &str) -> impl Iterator<Item = &str> {
    // "" is the empty list, not a list holding one empty string
    column
        .split(RECORD_SEPARATOR)
        .filter(move |_| !column.is_empty())
}

fn parse_addrs<T: FromStr>(hostname: &str, field: &str, column: &str) -> Vec<T>
where
    T::Err: std::fmt::Display,
{
    split(column)
        .filter_map(|addr| match addr.parse::<T>() {
            Ok(parsed) => Some(parsed),
            Err(e) => {
                warn!(%hostname, field, element = addr, error = %e, "dropping bad address");
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn full_record() -> DomainRecord {
        DomainRecord {
            hostname: "h.zone.".to_string(),
            ipv4: vec!["10.0.0.2".parse().unwrap(), "10.0.0.1".parse().unwrap()],
            ipv6: vec!["fd00::2".parse().unwrap(), "fd00::1".parse().unwrap()],
            txt: vec!["second".to_string(), "first with spaces".to_string()],
            mx: vec![MxEntry::new("mx2.zone.", 20), MxEntry::new("mx1.zone.", 10)],
            cname: None,
            offline: false,
        }
    }

    #[test]
    fn test_encode_layout() {
        let row = encode_record(&full_record());
        assert_eq!(row.ip4, "10.0.0.2\x1f10.0.0.1");
        assert_eq!(row.mx, "20 mx2.zone.\x1f10 mx1.zone.");
        assert_eq!(row.txt, "second\x1ffirst with spaces");
        assert_eq!(row.cname, None);
    }

    #[test]
    fn test_decode_preserves_order() {
        let record = full_record();
        let decoded = decode_record(encode_record(&record));
        assert_eq!(decoded, record);
    }

    #[test]
    fn test_empty_columns_are_empty_lists() {
        let record = DomainRecord::new("empty.zone.");
        let row = encode_record(&record);
        assert_eq!(row.ip4, "");
        assert_eq!(row.txt, "");

        let decoded = decode_record(row);
        assert!(decoded.txt.is_empty());
        assert!(decoded.ipv4.is_empty());
        assert!(decoded.mx.is_empty());
    }

    #[test]
    fn test_malformed_mx_drops_all_mx() {
        let mut row = encode_record(&full_record());
        row.mx = "10 good.zone.\x1fnotanumber bad.zone.".to_string();

        let decoded = decode_record(row);
        assert!(decoded.mx.is_empty());
        assert_eq!(decoded.ipv4.len(), 2);
    }

    #[test]
    fn test_negative_priority_is_malformed() {
        assert!(decode_mx("-1 mail.zone.").is_err());
        assert!(decode_mx("70000 mail.zone.").is_err());
        assert!(decode_mx("10").is_err());
    }

    #[test]
    fn test_bad_address_dropped_alone() {
        let mut row = encode_record(&full_record());
        row.ip4 = "not-an-ip\x1f10.0.0.1".to_string();
        row.ip6 = "garbage".to_string();

        let decoded = decode_record(row);
        assert_eq!(decoded.ipv4, vec![Ipv4Addr::new(10, 0, 0, 1)]);
        assert!(decoded.ipv6.is_empty());
        assert_eq!(decoded.txt.len(), 2);
        assert_eq!(decoded.mx.len(), 2);
    }

    #[test]
    fn test_empty_cname_column_is_none() {
        let mut row = encode_record(&full_record());
        row.cname = Some(String::new());
        assert_eq!(decode_record(row).cname, None);
    }
}
