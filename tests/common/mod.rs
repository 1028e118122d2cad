//! Shared test infrastructure for cooldns integration tests.

#![allow(dead_code)]

use std::net::{Ipv4Addr, Ipv6Addr};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hickory_proto::dnssec::rdata::tsig::TsigAlgorithm;
use hickory_proto::dnssec::tsig::TSigner;
use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::{DNSClass, Name, RData, RecordType};

use cooldns::authority::{Transport, ZoneAuthority};
use cooldns::config::DnsConfig;
use cooldns::record::MxEntry;
use cooldns::{Directory, DomainRecord};

// --- Constants ---

pub const ZONE: &str = "zone.example.";
pub const TTL: u32 = 60;

/// Base64 of "cooldns-test-secret".
pub const TSIG_SECRET: &str = "Y29vbGRucy10ZXN0LXNlY3JldA==";

// --- Config builders ---

pub fn test_dns_config() -> DnsConfig {
    DnsConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        zone: ZONE.to_string(),
        ttl: TTL,
        tsig_key: None,
    }
}

pub fn test_dns_config_with_tsig() -> DnsConfig {
    DnsConfig {
        tsig_key: Some(TSIG_SECRET.to_string()),
        ..test_dns_config()
    }
}

/// Client side signer holding the same secret as [`test_dns_config_with_tsig`].
pub fn test_signer() -> TSigner {
    let secret = STANDARD.decode(TSIG_SECRET).unwrap();
    TSigner::new(
        secret,
        TsigAlgorithm::HmacSha256,
        Name::from_ascii(ZONE).unwrap(),
        300,
    )
    .unwrap()
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs()
}

// --- Directory builder ---

/// Builds a directory of records under [`ZONE`].
pub struct TestDirectoryBuilder {
    directory: Directory,
}

impl TestDirectoryBuilder {
    pub fn new() -> Self {
        Self {
            directory: Directory::new(),
        }
    }

    /// Insert (or replace) the record for `host` after letting `edit` fill it.
    pub fn with_host(self, host: &str, edit: impl FnOnce(&mut DomainRecord)) -> Self {
        let hostname = format!("{host}.{ZONE}");
        let mut record = self
            .directory
            .get(&hostname)
            .map(|r| (*r).clone())
            .unwrap_or_else(|| DomainRecord::new(&hostname));
        edit(&mut record);
        self.directory.put(record);
        self
    }

    pub fn with_ipv4(self, host: &str, ip: &str) -> Self {
        let ip: Ipv4Addr = ip.parse().unwrap();
        self.with_host(host, |r| r.ipv4.push(ip))
    }

    pub fn with_ipv6(self, host: &str, ip: &str) -> Self {
        let ip: Ipv6Addr = ip.parse().unwrap();
        self.with_host(host, |r| r.ipv6.push(ip))
    }

    pub fn with_mx(self, host: &str, target: &str, priority: u16) -> Self {
        self.with_host(host, |r| r.mx.push(MxEntry::new(target, priority)))
    }

    pub fn with_txt(self, host: &str, txt: &str) -> Self {
        self.with_host(host, |r| r.txt.push(txt.to_string()))
    }

    pub fn with_cname(self, host: &str, target: &str) -> Self {
        self.with_host(host, |r| r.cname = Some(target.to_string()))
    }

    pub fn build(self) -> Directory {
        self.directory
    }
}

pub fn build_authority(config: &DnsConfig, directory: Directory) -> ZoneAuthority {
    ZoneAuthority::new(config, directory).expect("failed to create ZoneAuthority")
}

// --- Query construction ---

/// Build a DNS query message.
pub fn build_query(name: &str, record_type: RecordType, id: u16) -> Message {
    let mut msg = Message::new();
    msg.set_id(id);
    msg.set_message_type(MessageType::Query);
    msg.set_op_code(OpCode::Query);
    msg.set_recursion_desired(true);
    let mut query = Query::new();
    query.set_name(Name::from_ascii(name).unwrap());
    query.set_query_type(record_type);
    query.set_query_class(DNSClass::IN);
    msg.add_query(query);
    msg
}

/// Build wire-format bytes for a DNS query.
pub fn build_query_bytes(name: &str, record_type: RecordType, id: u16) -> Vec<u8> {
    build_query(name, record_type, id).to_vec().unwrap()
}

/// Build wire-format bytes for a DNS query carrying an OPT record.
pub fn build_edns_query_bytes(
    name: &str,
    record_type: RecordType,
    id: u16,
    payload: u16,
) -> Vec<u8> {
    let mut msg = build_query(name, record_type, id);
    let mut edns = Edns::new();
    edns.set_max_payload(payload);
    msg.set_edns(edns);
    msg.to_vec().unwrap()
}

// --- Response helpers ---

/// Answer a UDP query through the authority and parse the reply.
pub fn execute_query(
    authority: &ZoneAuthority,
    name: &str,
    record_type: RecordType,
    id: u16,
) -> Message {
    let bytes = build_query_bytes(name, record_type, id);
    let reply = authority
        .respond(&bytes, Transport::Udp)
        .expect("authority dropped a valid query");
    Message::from_vec(&reply).expect("failed to parse reply")
}

/// Extract A addresses from a response, in answer order.
pub fn extract_a_ips(msg: &Message) -> Vec<Ipv4Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::A(a) => Some(a.0),
            _ => None,
        })
        .collect()
}

/// Extract AAAA addresses from a response, in answer order.
pub fn extract_aaaa_ips(msg: &Message) -> Vec<Ipv6Addr> {
    msg.answers()
        .iter()
        .filter_map(|r| match r.data() {
            RData::AAAA(aaaa) => Some(aaaa.0),
            _ => None,
        })
        .collect()
}

/// Assert response code.
pub fn assert_response_code(msg: &Message, expected: ResponseCode) {
    assert_eq!(
        msg.response_code(),
        expected,
        "expected {:?}, got {:?}",
        expected,
        msg.response_code()
    );
}

/// Read the ARCOUNT field of an encoded message.
pub fn additional_count(bytes: &[u8]) -> u16 {
    u16::from_be_bytes([bytes[10], bytes[11]])
}
