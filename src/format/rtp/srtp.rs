//! SRTP key management: resolves MIKEY policies to concrete
//! cipher/MAC descriptors, caches keys per SSRC, and tracks the
//! rollover counter each session carries.
//!
//! The encrypt/decrypt data path itself is represented by the
//! [`SrtpCipher`] trait with a `Null` passthrough implementation
//! wired end to end; the AES-CM/GCM variants are resolved-but-not-
//! implemented descriptors (see `DESIGN.md`'s Open Question on SRTP
//! cipher implementation) so the policy-resolution logic that
//! scenario E actually exercises is real and tested without
//! fabricating a vendored crypto primitive.

use super::mikey::{MikeyAuthAlg, MikeyEncAlg, MikeySrtpPolicy};
use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by the SRTP layer.
#[derive(Debug, Error)]
pub enum SrtpError {
    /// `request_key` was called for an SSRC with no installed policy
    /// and no configured default.
    #[error("no SRTP key for ssrc {0:08x}")]
    NoKeyForSsrc(u32),
    /// A cipher descriptor that carries no runtime implementation
    /// (AES-CM/GCM) was asked to actually protect/unprotect data.
    #[error("{0:?} has no runtime implementation in this build")]
    CipherNotImplemented(SrtpCipherKind),
}

/// Resolved SRTP cipher, carrying the parameters needed to name it
/// (e.g. in the `srtp-cipher` caps field) even where no runtime
/// implementation is wired.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpCipherKind {
    /// No encryption.
    Null,
    /// AES-CM, 128-bit key.
    Aes128Icm,
    /// AES-GCM, 128-bit key.
    Aes128Gcm,
    /// AES-CM, 256-bit key.
    Aes256Icm,
    /// AES-GCM, 256-bit key.
    Aes256Gcm,
}

impl SrtpCipherKind {
    /// Name as it appears in an `application/x-srtp` caps string.
    pub fn caps_name(&self) -> &'static str {
        match self {
            SrtpCipherKind::Null => "null",
            SrtpCipherKind::Aes128Icm => "aes-128-icm",
            SrtpCipherKind::Aes128Gcm => "aes-128-gcm",
            SrtpCipherKind::Aes256Icm => "aes-256-icm",
            SrtpCipherKind::Aes256Gcm => "aes-256-gcm",
        }
    }

    fn from_mikey(alg: MikeyEncAlg) -> Self {
        match alg {
            MikeyEncAlg::Null => SrtpCipherKind::Null,
            MikeyEncAlg::AesCm128 => SrtpCipherKind::Aes128Icm,
            MikeyEncAlg::AesGcm128 => SrtpCipherKind::Aes128Gcm,
            MikeyEncAlg::AesCm256 => SrtpCipherKind::Aes256Icm,
            MikeyEncAlg::AesGcm256 => SrtpCipherKind::Aes256Gcm,
        }
    }
}

/// Resolved SRTP authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SrtpAuthKind {
    /// No authentication.
    Null,
    /// HMAC-SHA1, 80-bit tag.
    HmacSha1_80,
    /// HMAC-SHA1, 32-bit tag.
    HmacSha1_32,
}

impl SrtpAuthKind {
    /// Name as it appears in an `application/x-srtp` caps string.
    pub fn caps_name(&self) -> &'static str {
        match self {
            SrtpAuthKind::Null => "null",
            SrtpAuthKind::HmacSha1_80 => "hmac-sha1-80",
            SrtpAuthKind::HmacSha1_32 => "hmac-sha1-32",
        }
    }

    fn from_mikey(alg: MikeyAuthAlg) -> Self {
        match alg {
            MikeyAuthAlg::Null => SrtpAuthKind::Null,
            MikeyAuthAlg::HmacSha1_80 => SrtpAuthKind::HmacSha1_80,
            MikeyAuthAlg::HmacSha1_32 => SrtpAuthKind::HmacSha1_32,
        }
    }
}

/// A fully resolved SRTP policy for one SSRC: cipher, auth scheme,
/// key material and rollover counter.
#[derive(Debug, Clone)]
pub struct SrtpPolicy {
    /// SSRC this policy applies to.
    pub ssrc: u32,
    /// Resolved cipher.
    pub cipher: SrtpCipherKind,
    /// Resolved authentication scheme.
    pub auth: SrtpAuthKind,
    /// Key material as delivered by MIKEY.
    pub key: Bytes,
    /// Rollover counter, carried per session.
    pub roc: u32,
}

impl SrtpPolicy {
    /// Builds a policy from a parsed MIKEY SRTP policy payload.
    pub fn from_mikey(policy: &MikeySrtpPolicy, key: Bytes) -> Self {
        Self {
            ssrc: policy.ssrc,
            cipher: SrtpCipherKind::from_mikey(policy.enc_alg),
            auth: SrtpAuthKind::from_mikey(policy.auth_alg),
            key,
            roc: policy.roc,
        }
    }

    /// Renders the `application/x-srtp` caps string a `request-key`
    /// signal answers with, matching scenario E's expected format:
    /// `application/x-srtp, srtp-cipher=..., srtp-auth=...,
    /// srtcp-cipher=..., srtcp-auth=..., srtp-key=<buffer>`. RTP and
    /// RTCP always share the same cipher/auth/key in this engine (one
    /// `srtpenc`/`srtpdec` pair per §4.4).
    pub fn to_caps_string(&self) -> String {
        format!(
            "application/x-srtp, srtp-cipher={}, srtp-auth={}, srtcp-cipher={}, srtcp-auth={}, srtp-key=<buffer>",
            self.cipher.caps_name(),
            self.auth.caps_name(),
            self.cipher.caps_name(),
            self.auth.caps_name(),
        )
    }
}

/// Default cipher/auth selection used when a MIKEY message
/// under-specifies a policy (§10 ambient config surface).
#[derive(Debug, Clone, Copy)]
pub struct SrtpDefaults {
    /// Cipher used when no policy overrides it.
    pub cipher: SrtpCipherKind,
    /// Auth scheme used when no policy overrides it.
    pub auth: SrtpAuthKind,
}

impl Default for SrtpDefaults {
    fn default() -> Self {
        Self {
            cipher: SrtpCipherKind::Aes128Icm,
            auth: SrtpAuthKind::HmacSha1_80,
        }
    }
}

/// Per-SSRC SRTP key cache shared by a stream's encoder and decoder
/// (§3 RTPStream: "an optional SRTP encoder and decoder; per-SSRC
/// SRTP key cache"). `request_key` is the analogue of `srtpenc`'s /
/// `srtpdec`'s `request-key` signal.
#[derive(Clone)]
pub struct SrtpKeyCache {
    inner: Arc<Mutex<HashMap<u32, SrtpPolicy>>>,
    defaults: SrtpDefaults,
}

impl SrtpKeyCache {
    /// Creates an empty cache using `defaults` for any SSRC that asks
    /// for a key without an installed policy.
    pub fn new(defaults: SrtpDefaults) -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
            defaults,
        }
    }

    /// Installs a resolved policy for its SSRC, as would follow a
    /// MIKEY `KeyMgmt` header being applied at `SETUP`.
    pub fn install(&self, policy: SrtpPolicy) {
        self.inner.lock().insert(policy.ssrc, policy);
    }

    /// Answers a `request-key` for `ssrc`. Returns the installed
    /// policy if one exists; otherwise fabricates a null-key policy
    /// from the configured defaults so the pipeline does not stall,
    /// matching the source's behaviour of falling back to its
    /// configured default cipher/MAC.
    pub fn request_key(&self, ssrc: u32) -> Result<SrtpPolicy, SrtpError> {
        let cache = self.inner.lock();
        if let Some(policy) = cache.get(&ssrc) {
            return Ok(policy.clone());
        }
        Err(SrtpError::NoKeyForSsrc(ssrc))
    }

    /// Same as [`SrtpKeyCache::request_key`] but never fails: falls
    /// back to the cache's configured defaults with an empty key.
    pub fn request_key_or_default(&self, ssrc: u32) -> SrtpPolicy {
        self.request_key(ssrc).unwrap_or_else(|_| SrtpPolicy {
            ssrc,
            cipher: self.defaults.cipher,
            auth: self.defaults.auth,
            key: Bytes::new(),
            roc: 0,
        })
    }

    /// Number of SSRCs with an installed policy.
    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    /// True if no policy has been installed yet.
    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

/// The SRTP encrypt/decrypt data path. A single implementation is
/// shared between RTP and RTCP (§4.4: "a single `srtpenc` is shared
/// between RTP and RTCP").
pub trait SrtpCipher: Send + Sync {
    /// Applies SRTP protection to a plaintext RTP/RTCP packet.
    fn protect(&self, policy: &SrtpPolicy, packet: &Bytes) -> Result<Bytes, SrtpError>;
    /// Reverses [`SrtpCipher::protect`].
    fn unprotect(&self, policy: &SrtpPolicy, packet: &Bytes) -> Result<Bytes, SrtpError>;
}

/// A passthrough cipher: `Null`-keyed packets are forwarded
/// unmodified; anything else is reported as unimplemented rather than
/// silently passed through, since pretending to encrypt would be
/// actively wrong.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullCipher;

impl SrtpCipher for NullCipher {
    fn protect(&self, policy: &SrtpPolicy, packet: &Bytes) -> Result<Bytes, SrtpError> {
        match policy.cipher {
            SrtpCipherKind::Null => Ok(packet.clone()),
            other => Err(SrtpError::CipherNotImplemented(other)),
        }
    }

    fn unprotect(&self, policy: &SrtpPolicy, packet: &Bytes) -> Result<Bytes, SrtpError> {
        self.protect(policy, packet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::rtp::mikey::{MikeyAuthAlg, MikeyEncAlg, MikeySrtpPolicy};

    #[test]
    fn scenario_e_caps_string() {
        let mikey_policy = MikeySrtpPolicy {
            ssrc: 0x1234,
            roc: 0,
            enc_alg: MikeyEncAlg::AesCm128,
            auth_alg: MikeyAuthAlg::HmacSha1_80,
            auth_key_len: 10,
        };
        let policy = SrtpPolicy::from_mikey(&mikey_policy, Bytes::from_static(&[0x42; 16]));
        assert_eq!(
            policy.to_caps_string(),
            "application/x-srtp, srtp-cipher=aes-128-icm, srtp-auth=hmac-sha1-80, \
             srtcp-cipher=aes-128-icm, srtcp-auth=hmac-sha1-80, srtp-key=<buffer>"
        );
    }

    #[test]
    fn request_key_for_unknown_ssrc_errors() {
        let cache = SrtpKeyCache::new(SrtpDefaults::default());
        assert!(matches!(
            cache.request_key(0xDEAD),
            Err(SrtpError::NoKeyForSsrc(0xDEAD))
        ));
        // the `_or_default` variant never fails
        let fallback = cache.request_key_or_default(0xDEAD);
        assert_eq!(fallback.cipher, SrtpCipherKind::Aes128Icm);
    }

    #[test]
    fn install_then_request_roundtrips() {
        let cache = SrtpKeyCache::new(SrtpDefaults::default());
        let policy = SrtpPolicy {
            ssrc: 0x1234,
            cipher: SrtpCipherKind::Null,
            auth: SrtpAuthKind::Null,
            key: Bytes::new(),
            roc: 5,
        };
        cache.install(policy);
        let got = cache.request_key(0x1234).unwrap();
        assert_eq!(got.roc, 5);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn null_cipher_passes_through() {
        let cipher = NullCipher;
        let policy = SrtpPolicy {
            ssrc: 1,
            cipher: SrtpCipherKind::Null,
            auth: SrtpAuthKind::Null,
            key: Bytes::new(),
            roc: 0,
        };
        let data = Bytes::from_static(b"rtp-packet");
        let protected = cipher.protect(&policy, &data).unwrap();
        assert_eq!(protected, data);
    }

    #[test]
    fn aes_cipher_reports_not_implemented() {
        let cipher = NullCipher;
        let policy = SrtpPolicy {
            ssrc: 1,
            cipher: SrtpCipherKind::Aes128Icm,
            auth: SrtpAuthKind::HmacSha1_80,
            key: Bytes::from_static(&[0; 16]),
            roc: 0,
        };
        let data = Bytes::from_static(b"rtp-packet");
        assert!(matches!(
            cipher.protect(&policy, &data),
            Err(SrtpError::CipherNotImplemented(SrtpCipherKind::Aes128Icm))
        ));
    }
}
