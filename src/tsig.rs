//! TSIG (RFC 8945) signing of replies with HMAC-SHA256.
//!
//! The reply is encoded first so the MAC covers exactly the bytes sent,
//! prefixed by the request MAC when the request was signed. The TSIG record
//! built by hickory's `make_tsig_record` is then appended to the message.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use hickory_proto::dnssec::rdata::tsig::{make_tsig_record, TsigAlgorithm, TSIG};
use hickory_proto::dnssec::rdata::DNSSECRData;
use hickory_proto::dnssec::tsig::TSigner;
use hickory_proto::op::Message;
use hickory_proto::rr::{Name, RData};
use hickory_proto::serialize::binary::BinEncoder;

use crate::error::CoolDnsError;

/// Allowed clock skew in seconds.
pub const FUDGE: u16 = 300;

const ALGORITHM: TsigAlgorithm = TsigAlgorithm::HmacSha256;

/// Shared secret used to sign replies for a zone.
#[derive(Clone)]
pub struct TsigKey {
    signer: TSigner,
}

impl std::fmt::Debug for TsigKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TsigKey")
            .field("name", self.name())
            .finish_non_exhaustive()
    }
}

impl TsigKey {
    /// Create a key from a raw secret.
    pub fn new(name: Name, secret: Vec<u8>) -> Result<Self, CoolDnsError> {
        let signer = TSigner::new(secret, ALGORITHM, name.to_lowercase(), FUDGE)?;
        Ok(Self { signer })
    }

    /// Create a key from a base64 secret, as found in configuration.
    pub fn from_base64(name: Name, secret: &str) -> Result<Self, CoolDnsError> {
        let secret = STANDARD
            .decode(secret.trim())
            .map_err(|e| CoolDnsError::InvalidTsigKey(e.to_string()))?;
        if secret.is_empty() {
            return Err(CoolDnsError::InvalidTsigKey("empty secret".to_string()));
        }
        Self::new(name, secret)
    }

    /// Key name (the zone).
    pub fn name(&self) -> &Name {
        self.signer.signer_name()
    }

    /// Encode and sign a reply.
    ///
    /// `request_mac` is the MAC of the request's TSIG record, if it had one.
    /// `time_signed` is seconds since the Unix epoch.
    pub fn sign(
        &self,
        reply: &Message,
        request_mac: Option<&[u8]>,
        time_signed: u64,
    ) -> Result<Vec<u8>, CoolDnsError> {
        let unsigned = reply.to_vec()?;
        let pre_tsig = TSIG::new(
            ALGORITHM,
            time_signed,
            FUDGE,
            Vec::new(),
            reply.id(),
            0,
            Vec::new(),
        );

        let mut tbs = Vec::with_capacity(unsigned.len() + 128);
        {
            let mut encoder = BinEncoder::new(&mut tbs);
            if let Some(request_mac) = request_mac {
                encoder.emit_u16(request_mac.len() as u16)?;
                encoder.emit_vec(request_mac)?;
            }
            encoder.emit_vec(&unsigned)?;
            pre_tsig.emit_tsig_for_mac(&mut encoder, self.name())?;
        }
        let mac = self.signer.sign(&tbs)?;

        let mut signed = reply.clone();
        signed.add_tsig(make_tsig_record(self.name().clone(), pre_tsig.set_mac(mac)));
        Ok(signed.to_vec()?)
    }

    /// Upper bound of the size a signature adds to a reply.
    pub fn overhead(&self) -> usize {
        let mac_len = ALGORITHM.output_len().unwrap_or(64);
        // owner + type/class/ttl/rdlength + algorithm + time/fudge/size/id/error/other len + MAC
        wire_len(self.name()) + 10 + wire_len(&ALGORITHM.to_name()) + 16 + mac_len
    }
}

/// MAC of the TSIG record carried by a parsed message, if any.
pub fn request_mac(message: &Message) -> Option<&[u8]> {
    message.signature().iter().find_map(|record| match record.data() {
        RData::DNSSEC(DNSSECRData::TSIG(tsig)) => Some(tsig.mac()),
        _ => None,
    })
}

/// Uncompressed wire length of a name.
fn wire_len(name: &Name) -> usize {
    let mut buf = Vec::with_capacity(64);
    let emitted = name.emit_as_canonical(&mut BinEncoder::new(&mut buf), true);
    match emitted {
        Ok(()) => buf.len(),
        Err(_) => usize::from(u8::MAX),
    }
}
