//! Answer construction for the served zone.
//!
//! Every question is answered from the [`Directory`] alone. A CNAME
//! short-circuits everything else for its owner and is never chased.

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::{A, AAAA, CNAME, MX, TXT};
use hickory_proto::rr::{Name, RData, Record, RecordType};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, trace, warn};

use crate::config::DnsConfig;
use crate::error::CoolDnsError;
use crate::metrics::{self, QueryResult, Timer};
use crate::record::DomainRecord;
use crate::state::Directory;
use crate::tsig::{self, TsigKey};

/// Largest UDP reply sent without EDNS.
pub const MIN_UDP_PAYLOAD: u16 = 512;

/// Payload size advertised in our own OPT record.
pub const ADVERTISED_UDP_PAYLOAD: u16 = 4096;

/// Transport a request arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    /// UDP datagram, replies are size limited.
    Udp,
    /// TCP stream.
    Tcp,
}

/// Authority for one zone backed by the directory.
#[derive(Debug, Clone)]
pub struct ZoneAuthority {
    origin: Name,
    directory: Directory,
    ttl: u32,
    tsig: Option<TsigKey>,
}

impl ZoneAuthority {
    /// Create a new authority for the given configuration and directory.
    pub fn new(config: &DnsConfig, directory: Directory) -> Result<Self, CoolDnsError> {
        let mut origin = Name::from_utf8(&config.zone)?.to_lowercase();
        origin.set_fqdn(true);

        let tsig = config
            .tsig_key
            .as_deref()
            .map(|secret| TsigKey::from_base64(origin.clone(), secret))
            .transpose()?;

        Ok(Self {
            origin,
            directory,
            ttl: config.ttl,
            tsig,
        })
    }

    /// Zone origin.
    pub fn origin(&self) -> &Name {
        &self.origin
    }

    /// Whether replies are TSIG signed.
    pub fn signs_replies(&self) -> bool {
        self.tsig.is_some()
    }

    /// Answer records for one question.
    ///
    /// Unknown names and unsupported types give no records.
    pub fn lookup(&self, query: &Query) -> Vec<Record> {
        let owner = query.name();
        let hostname = normalize_owner(owner);

        let Some(entry) = self.directory.get(&hostname) else {
            debug!(name = %hostname, "lookup: no record");
            return Vec::new();
        };

        if let Some(target) = &entry.cname {
            trace!(name = %hostname, %target, "lookup: answering with cname");
            return match parse_name(target) {
                Some(target) => vec![self.record(owner, RData::CNAME(CNAME(target)))],
                None => Vec::new(),
            };
        }

        self.records_for_type(owner, &entry, query.query_type())
    }

    fn records_for_type(
        &self,
        owner: &Name,
        entry: &DomainRecord,
        rtype: RecordType,
    ) -> Vec<Record> {
        match rtype {
            RecordType::AAAA => entry
                .ipv6
                .iter()
                .map(|ip| self.record(owner, RData::AAAA(AAAA::from(*ip))))
                .collect(),
            RecordType::A => entry
                .ipv4
                .iter()
                .map(|ip| self.record(owner, RData::A(A::from(*ip))))
                .collect(),
            RecordType::TXT => {
                if entry.txt.is_empty() {
                    Vec::new()
                } else {
                    vec![self.record(owner, RData::TXT(TXT::new(entry.txt.clone())))]
                }
            }
            RecordType::MX => entry
                .mx
                .iter()
                .filter_map(|mx| {
                    let exchange = parse_name(&mx.target)?;
                    Some(self.record(owner, RData::MX(MX::new(mx.priority, exchange))))
                })
                .collect(),
            _ => {
                trace!(name = %entry.hostname, rtype = ?rtype, "unsupported record type");
                Vec::new()
            }
        }
    }

    fn record(&self, owner: &Name, rdata: RData) -> Record {
        Record::from_rdata(owner.clone(), self.ttl, rdata)
    }

    /// Build the reply message for a parsed request.
    pub fn build_response(&self, request: &Message) -> Message {
        let mut response = Message::new();
        response
            .set_id(request.id())
            .set_message_type(MessageType::Response)
            .set_op_code(request.op_code())
            .set_authoritative(true)
            .set_recursion_desired(request.recursion_desired())
            .set_recursion_available(false);
        response.add_queries(request.queries().iter().cloned());

        if request.extensions().is_some() {
            let mut edns = Edns::new();
            edns.set_max_payload(ADVERTISED_UDP_PAYLOAD);
            response.set_edns(edns);
        }

        if request.op_code() != OpCode::Query {
            debug!(op_code = ?request.op_code(), "unsupported opcode");
            for query in request.queries() {
                let rtype = query.query_type().to_string();
                metrics::record_query(&rtype, QueryResult::NotImplemented, Duration::ZERO);
            }
            response.set_response_code(ResponseCode::NotImp);
            return response;
        }

        for query in request.queries() {
            let timer = Timer::start();
            let rtype = query.query_type().to_string();

            if !self.origin.zone_of(query.name()) {
                debug!(name = %query.name(), "query outside served zone");
                metrics::record_query(&rtype, QueryResult::Refused, timer.elapsed());
                response.set_response_code(ResponseCode::Refused);
                continue;
            }

            let answers = self.lookup(query);
            let result = if answers.is_empty() {
                QueryResult::Empty
            } else {
                QueryResult::Answered
            };
            debug!(
                name = %query.name(),
                rtype = %rtype,
                count = answers.len(),
                "answered question"
            );
            metrics::record_query(&rtype, result, timer.elapsed());
            response.add_answers(answers);
        }

        response
    }

    /// Handle one encoded request and return the encoded (and signed) reply.
    ///
    /// Returns `None` for packets that are not parseable DNS queries.
    pub fn respond(&self, packet: &[u8], transport: Transport) -> Option<Vec<u8>> {
        let request = match Message::from_vec(packet) {
            Ok(request) => request,
            Err(e) => {
                debug!(error = %e, "dropping unparseable packet");
                metrics::record_malformed_packet();
                return None;
            }
        };
        if request.message_type() != MessageType::Query {
            debug!(id = request.id(), "dropping packet that is not a query");
            metrics::record_malformed_packet();
            return None;
        }

        let response = self.build_response(&request);
        let limit = match transport {
            Transport::Tcp => usize::from(u16::MAX),
            Transport::Udp => usize::from(
                request
                    .extensions()
                    .as_ref()
                    .map(|edns| edns.max_payload())
                    .unwrap_or(MIN_UDP_PAYLOAD)
                    .max(MIN_UDP_PAYLOAD),
            ),
        };

        match self.encode(&response, &request, limit) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                warn!(id = request.id(), error = %e, "failed to encode reply");
                None
            }
        }
    }

    /// Encode, truncating to `limit` and signing when a key is configured.
    fn encode(
        &self,
        response: &Message,
        request: &Message,
        limit: usize,
    ) -> Result<Vec<u8>, CoolDnsError> {
        let overhead = self.tsig.as_ref().map(TsigKey::overhead).unwrap_or(0);

        let mut bytes = response.to_vec()?;
        let short;
        let response = if bytes.len() + overhead > limit {
            debug!(size = bytes.len(), limit, "reply too large, truncating");
            short = truncated(response);
            bytes = short.to_vec()?;
            &short
        } else {
            response
        };

        match &self.tsig {
            Some(key) => key.sign(response, tsig::request_mac(request), unix_now()),
            None => Ok(bytes),
        }
    }
}

/// Header and question copy of `response` with TC set.
fn truncated(response: &Message) -> Message {
    let mut short = Message::new();
    short
        .set_id(response.id())
        .set_message_type(MessageType::Response)
        .set_op_code(response.op_code())
        .set_authoritative(response.authoritative())
        .set_recursion_desired(response.recursion_desired())
        .set_response_code(response.response_code())
        .set_truncated(true);
    short.add_queries(response.queries().iter().cloned());
    if let Some(edns) = response.extensions() {
        short.set_edns(edns.clone());
    }
    short
}

/// Directory key for a query name: lowercased, punycode decoded when possible.
pub fn normalize_owner(name: &Name) -> String {
    let ascii = name.to_lowercase().to_ascii();
    let bare = ascii.trim_end_matches('.');
    if bare.is_empty() {
        return ascii;
    }
    match idna::domain_to_unicode(bare) {
        (unicode, Ok(())) => format!("{unicode}."),
        (_, Err(_)) => format!("{bare}."),
    }
}

fn parse_name(name: &str) -> Option<Name> {
    match Name::from_utf8(name) {
        Ok(mut parsed) => {
            parsed.set_fqdn(true);
            Some(parsed)
        }
        Err(e) => {
            warn!(name, error = %e, "stored target is not a valid name");
            None
        }
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
