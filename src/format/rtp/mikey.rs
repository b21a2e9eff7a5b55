//! MIKEY (RFC 3830) key-management message parsing, as carried over
//! RTSP's `KeyMgmt` header (§6): a comma-separated list of
//! `prot=mikey; uri="..."; data=<base64>` bindings, each `data`
//! payload a binary MIKEY message carrying one `KEMAC` payload (key
//! material) followed by one or more `SRTP` policy payloads.

use bytes::Bytes;
use thiserror::Error;

/// Errors raised while parsing a `KeyMgmt` header or a MIKEY message.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MikeyError {
    /// The `KeyMgmt` header had no `prot=mikey` binding.
    #[error("no prot=mikey binding in KeyMgmt header")]
    NoMikeyBinding,
    /// A binding declared a protocol other than `mikey`.
    #[error("unsupported key management protocol: {0}")]
    UnsupportedProtocol(String),
    /// The `data=` field was not valid base64.
    #[error("invalid base64 in KeyMgmt data field")]
    InvalidBase64,
    /// The binary message was shorter than its declared fields.
    #[error("truncated MIKEY message")]
    Truncated,
    /// A payload's `next payload` chain pointed at an unsupported type.
    #[error("unsupported MIKEY payload type: {0}")]
    UnsupportedPayload(u8),
}

/// SRTP encryption algorithm as resolved from a MIKEY policy's
/// `SRTP_ENC_ALG` parameter combined with its key length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MikeyEncAlg {
    /// AES in counter mode, 128-bit key.
    AesCm128,
    /// AES-GCM, 128-bit key.
    AesGcm128,
    /// AES in counter mode, 256-bit key.
    AesCm256,
    /// AES-GCM, 256-bit key.
    AesGcm256,
    /// No encryption.
    Null,
}

/// SRTP authentication algorithm resolved from `SRTP_AUTH_ALG` /
/// `AUTH_KEY_LEN`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MikeyAuthAlg {
    /// HMAC-SHA1, 80-bit tag.
    HmacSha1_80,
    /// HMAC-SHA1, 32-bit tag.
    HmacSha1_32,
    /// No authentication.
    Null,
}

/// One SRTP policy from a MIKEY message, bound to a crypto session
/// (and therefore to the SSRC that session's CS ID map names).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MikeySrtpPolicy {
    /// SSRC this policy applies to, from the CS ID map info.
    pub ssrc: u32,
    /// Initial rollover counter for this SSRC.
    pub roc: u32,
    /// Resolved encryption algorithm.
    pub enc_alg: MikeyEncAlg,
    /// Resolved authentication algorithm.
    pub auth_alg: MikeyAuthAlg,
    /// Authentication key length, in bytes.
    pub auth_key_len: u8,
}

/// A parsed MIKEY message: the KEMAC key material plus zero or more
/// SRTP policies. Per §10's supplemented-features note, a message
/// with zero policies is valid ("encryption disabled for this CS"),
/// not a parse error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MikeyMessage {
    /// Crypto session bundle id from the common header.
    pub csb_id: u32,
    /// Declared CS count from the common header (distinct from the
    /// number of SRTP policy payloads actually present).
    pub cs_count: u8,
    /// Raw key data extracted from the KEMAC payload.
    pub key_data: Bytes,
    /// Parsed SRTP policies, one per crypto session that specified one.
    pub policies: Vec<MikeySrtpPolicy>,
}

const PAYLOAD_LAST: u8 = 0;
const PAYLOAD_KEMAC: u8 = 1;
const PAYLOAD_SRTP_POLICY: u8 = 24; // "SP" (Security Policy) payload in RFC 3830

impl MikeyMessage {
    /// Parses a raw MIKEY message: a 10-byte common header followed
    /// by a payload chain starting with the header's `next payload`
    /// field.
    pub fn parse(data: &[u8]) -> Result<Self, MikeyError> {
        if data.len() < 10 {
            return Err(MikeyError::Truncated);
        }
        let next_payload = data[2];
        let csb_id = u32::from_be_bytes([data[4], data[5], data[6], data[7]]);
        let cs_count = data[8];
        // data[9] is the CS ID map type; CS ID map info (SSRC/ROC per
        // CS) directly follows the common header when type is 0
        // (SRTP-ID), one (policy_no:1, ssrc:4, roc:4) entry per CS.
        let mut offset = 10;
        let mut ssrc_for_cs = Vec::with_capacity(cs_count as usize);
        for _ in 0..cs_count {
            if offset + 9 > data.len() {
                return Err(MikeyError::Truncated);
            }
            let ssrc = u32::from_be_bytes([
                data[offset + 1],
                data[offset + 2],
                data[offset + 3],
                data[offset + 4],
            ]);
            let roc = u32::from_be_bytes([
                data[offset + 5],
                data[offset + 6],
                data[offset + 7],
                data[offset + 8],
            ]);
            ssrc_for_cs.push((ssrc, roc));
            offset += 9;
        }

        let mut key_data = Bytes::new();
        let mut policies = Vec::new();
        let mut payload_type = next_payload;

        while payload_type != PAYLOAD_LAST {
            if offset + 1 > data.len() {
                return Err(MikeyError::Truncated);
            }
            match payload_type {
                PAYLOAD_KEMAC => {
                    let (next, kd) = parse_kemac(&data[offset..])?;
                    payload_type = next;
                    key_data = kd.0;
                    offset += kd.1;
                }
                PAYLOAD_SRTP_POLICY => {
                    let (next, policy, consumed) = parse_srtp_policy(&data[offset..], &ssrc_for_cs)?;
                    payload_type = next;
                    policies.push(policy);
                    offset += consumed;
                }
                other => return Err(MikeyError::UnsupportedPayload(other)),
            }
        }

        Ok(MikeyMessage {
            csb_id,
            cs_count,
            key_data,
            policies,
        })
    }
}

/// Returns `(next_payload, (key_data, bytes_consumed))`.
fn parse_kemac(data: &[u8]) -> Result<(u8, (Bytes, usize)), MikeyError> {
    // KEMAC: next payload(1), enc alg(1), length(2), encr data(length),
    // mac alg(1 -- included in a trailing MAC whose length depends on
    // mac alg; a null MAC contributes zero bytes here for the simple
    // single-CS case this engine targets).
    if data.len() < 4 {
        return Err(MikeyError::Truncated);
    }
    let next_payload = data[0];
    let length = u16::from_be_bytes([data[2], data[3]]) as usize;
    let header_len = 4;
    if data.len() < header_len + length {
        return Err(MikeyError::Truncated);
    }
    let key_data = Bytes::copy_from_slice(&data[header_len..header_len + length]);
    Ok((next_payload, (key_data, header_len + length)))
}

/// Returns `(next_payload, policy, bytes_consumed)`.
fn parse_srtp_policy(
    data: &[u8],
    ssrc_for_cs: &[(u32, u32)],
) -> Result<(u8, MikeySrtpPolicy, usize), MikeyError> {
    // Security Policy payload: next payload(1), policy no(1), prot
    // type(1), #params(1), then #params * (type(1), length(1), value).
    if data.len() < 4 {
        return Err(MikeyError::Truncated);
    }
    let next_payload = data[0];
    let policy_no = data[1];
    let num_params = data[3];
    let mut offset = 4usize;

    let mut enc_alg = MikeyEncAlg::Null;
    let mut auth_alg = MikeyAuthAlg::Null;
    let mut auth_key_len: u8 = 0;
    let mut enc_key_len_bits: u16 = 128;

    for _ in 0..num_params {
        if offset + 2 > data.len() {
            return Err(MikeyError::Truncated);
        }
        let param_type = data[offset];
        let param_len = data[offset + 1] as usize;
        offset += 2;
        if offset + param_len > data.len() {
            return Err(MikeyError::Truncated);
        }
        let value = &data[offset..offset + param_len];
        match param_type {
            // ENCR_ALG
            0x0E => {
                let is_gcm = value.first().copied().unwrap_or(0) == 2;
                enc_alg = if is_gcm {
                    MikeyEncAlg::AesGcm128
                } else {
                    MikeyEncAlg::AesCm128
                };
            }
            // SRTP_ENC_KEY_LEN, bytes -> bits
            0x0F => {
                enc_key_len_bits = value.first().copied().unwrap_or(16) as u16 * 8;
            }
            // AUTH_ALG
            0x0A => {
                auth_alg = if value.first().copied().unwrap_or(0) == 0 {
                    MikeyAuthAlg::Null
                } else {
                    MikeyAuthAlg::HmacSha1_80
                };
            }
            // SRTP_AUTH_KEY_LEN, bytes
            0x0B => {
                auth_key_len = value.first().copied().unwrap_or(10);
            }
            _ => {}
        }
        offset += param_len;
    }

    // AUTH_KEY_LEN of 4 bytes (32 bits) selects the shortened
    // HMAC-SHA1-32 tag; anything else defaults to HMAC-SHA1-80 once
    // an auth algorithm was requested at all.
    if auth_alg != MikeyAuthAlg::Null && auth_key_len == 4 {
        auth_alg = MikeyAuthAlg::HmacSha1_32;
    }
    if enc_alg == MikeyEncAlg::AesCm128 && enc_key_len_bits == 256 {
        enc_alg = MikeyEncAlg::AesCm256;
    }
    if enc_alg == MikeyEncAlg::AesGcm128 && enc_key_len_bits == 256 {
        enc_alg = MikeyEncAlg::AesGcm256;
    }

    let (ssrc, roc) = ssrc_for_cs
        .get(policy_no as usize)
        .copied()
        .unwrap_or((0, 0));

    Ok((
        next_payload,
        MikeySrtpPolicy {
            ssrc,
            roc,
            enc_alg,
            auth_alg,
            auth_key_len: if auth_key_len == 0 { 10 } else { auth_key_len },
        },
        offset,
    ))
}

/// One `prot=mikey; uri="..."; data=<base64>` binding from a `KeyMgmt`
/// header.
#[derive(Debug, Clone)]
pub struct KeyMgmtBinding {
    /// The `uri=` field, naming which media/stream this key applies to.
    pub uri: String,
    /// The decoded MIKEY message.
    pub message: MikeyMessage,
}

/// Parses a full `KeyMgmt` header value into its `prot=mikey`
/// bindings. Bindings for any other protocol are rejected per §6
/// ("only `prot=mikey` is supported").
pub fn parse_keymgmt_header(header: &str) -> Result<Vec<KeyMgmtBinding>, MikeyError> {
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    let mut bindings = Vec::new();
    for binding in header.split(',') {
        let mut prot = None;
        let mut uri = None;
        let mut data = None;

        for field in binding.split(';') {
            let field = field.trim();
            if let Some(value) = field.strip_prefix("prot=") {
                prot = Some(value.trim().to_string());
            } else if let Some(value) = field.strip_prefix("uri=") {
                uri = Some(value.trim().trim_matches('"').to_string());
            } else if let Some(value) = field.strip_prefix("data=") {
                data = Some(value.trim().trim_matches('"').to_string());
            }
        }

        let prot = prot.ok_or(MikeyError::NoMikeyBinding)?;
        if prot != "mikey" {
            return Err(MikeyError::UnsupportedProtocol(prot));
        }
        let data = data.ok_or(MikeyError::Truncated)?;
        let raw = STANDARD
            .decode(data.as_bytes())
            .map_err(|_| MikeyError::InvalidBase64)?;
        let message = MikeyMessage::parse(&raw)?;
        bindings.push(KeyMgmtBinding {
            uri: uri.unwrap_or_default(),
            message,
        });
    }

    if bindings.is_empty() {
        return Err(MikeyError::NoMikeyBinding);
    }
    Ok(bindings)
}

#[cfg(test)]
mod tests {
    use super::*;
    use base64::{engine::general_purpose::STANDARD, Engine as _};

    /// Builds a minimal single-CS MIKEY message: common header, one
    /// CS ID map entry (ssrc=0x1234, roc=0), a KEMAC payload carrying
    /// 16 bytes of key data, and one SRTP policy payload matching
    /// scenario E (AES-CM-128 / HMAC-SHA1-80).
    fn scenario_e_message() -> Vec<u8> {
        let mut msg = Vec::new();
        msg.push(1); // version
        msg.push(0); // data type
        msg.push(PAYLOAD_KEMAC); // next payload
        msg.push(0); // V / PRF
        msg.extend_from_slice(&0xAABB_CCDDu32.to_be_bytes()); // CSB id
        msg.push(1); // #CS
        msg.push(0); // CS ID map type (SRTP-ID)

        // CS ID map info: policy_no(1)=0, ssrc(4)=0x1234, roc(4)=0
        msg.push(0);
        msg.extend_from_slice(&0x0000_1234u32.to_be_bytes());
        msg.extend_from_slice(&0u32.to_be_bytes());

        // KEMAC: next=SRTP_POLICY, enc_alg(1)=0 (unused path), length(2)=16, key(16)
        msg.push(PAYLOAD_SRTP_POLICY);
        msg.push(0);
        msg.extend_from_slice(&16u16.to_be_bytes());
        msg.extend_from_slice(&[0x42; 16]);

        // SRTP policy payload: next=LAST, policy_no=0, prot_type=0, #params=4
        msg.push(PAYLOAD_LAST);
        msg.push(0);
        msg.push(0);
        msg.push(4);
        // ENCR_ALG = AES-CM (1)
        msg.push(0x0E);
        msg.push(1);
        msg.push(1);
        // SRTP_ENC_KEY_LEN = 16 bytes (128 bit)
        msg.push(0x0F);
        msg.push(1);
        msg.push(16);
        // AUTH_ALG = HMAC-SHA1
        msg.push(0x0A);
        msg.push(1);
        msg.push(1);
        // SRTP_AUTH_KEY_LEN = 10 bytes (80 bit)
        msg.push(0x0B);
        msg.push(1);
        msg.push(10);

        msg
    }

    #[test]
    fn parses_scenario_e_policy() {
        let raw = scenario_e_message();
        let parsed = MikeyMessage::parse(&raw).unwrap();
        assert_eq!(parsed.cs_count, 1);
        assert_eq!(parsed.key_data.len(), 16);
        assert_eq!(parsed.policies.len(), 1);
        let policy = &parsed.policies[0];
        assert_eq!(policy.ssrc, 0x1234);
        assert_eq!(policy.enc_alg, MikeyEncAlg::AesCm128);
        assert_eq!(policy.auth_alg, MikeyAuthAlg::HmacSha1_80);
        assert_eq!(policy.auth_key_len, 10);
    }

    #[test]
    fn keymgmt_header_roundtrip() {
        let raw = scenario_e_message();
        let encoded = STANDARD.encode(&raw);
        let header = format!(
            "prot=mikey; uri=\"rtsp://example.com/stream/track1\"; data=\"{}\"",
            encoded
        );
        let bindings = parse_keymgmt_header(&header).unwrap();
        assert_eq!(bindings.len(), 1);
        assert_eq!(bindings[0].uri, "rtsp://example.com/stream/track1");
        assert_eq!(bindings[0].message.policies[0].ssrc, 0x1234);
    }

    #[test]
    fn rejects_non_mikey_protocol() {
        let err = parse_keymgmt_header("prot=other; uri=\"x\"; data=\"AA==\"").unwrap_err();
        assert_eq!(err, MikeyError::UnsupportedProtocol("other".to_string()));
    }

    #[test]
    fn zero_policy_message_is_not_an_error() {
        // Common header only, no CS, next payload = LAST.
        let mut msg = vec![1, 0, PAYLOAD_LAST, 0];
        msg.extend_from_slice(&1u32.to_be_bytes());
        msg.push(0); // cs_count = 0
        msg.push(0); // map type
        let parsed = MikeyMessage::parse(&msg).unwrap();
        assert!(parsed.policies.is_empty());
    }
}
