//! RTSP `Transport` header parsing and rendering (§6): the wire
//! encoding of a [`TransportDescriptor`], the struct the RTP engine
//! actually validates against a stream's allowed profiles/lower
//! transports.

use crate::format::rtp::{LowerTransport, RtpProfile};
use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while parsing or validating a `Transport` header.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The header named a profile this stream does not allow.
    #[error("unsupported profile")]
    UnsupportedProfile,
    /// The header named a lower transport this stream does not allow.
    #[error("unsupported lower transport")]
    UnsupportedLowerTransport,
    /// The header could not be parsed at all.
    #[error("malformed transport header: {0}")]
    Malformed(String),
}

/// An inclusive even/odd port pair, as carried by `client_port=` /
/// `server_port=` (§6: "client_port.min even, client_port.max =
/// min+1; server_port symmetric").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PortPair {
    /// Lower, even port (RTP).
    pub min: u16,
    /// Upper, odd port (RTCP), always `min + 1`.
    pub max: u16,
}

impl PortPair {
    /// Builds a pair from the RTP port, deriving the RTCP port.
    pub fn from_rtp_port(rtp_port: u16) -> Self {
        Self {
            min: rtp_port,
            max: rtp_port + 1,
        }
    }
}

/// A parsed `Transport` header line, independent of cast type or
/// lower transport (§3, §6).
#[derive(Debug, Clone, PartialEq)]
pub struct TransportDescriptor {
    /// Lower transport the client requested.
    pub lower_transport: LowerTransport,
    /// RTP profile (AVP/AVPF/SAVP/SAVPF).
    pub profile: RtpProfile,
    /// Client-side port pair (UDP transports).
    pub client_port: Option<PortPair>,
    /// Server-side port pair, filled in once the engine allocates one.
    pub server_port: Option<PortPair>,
    /// Multicast TTL, capped at 255 (§6).
    pub ttl: Option<u8>,
    /// Destination address string (multicast group, or client address
    /// for unicast when explicitly given).
    pub destination: Option<String>,
    /// Interleaved TCP channel pair (`interleaved=rtp-rtcp`).
    pub interleaved: Option<(u8, u8)>,
    /// `ssrc=` parameter, if present.
    pub ssrc: Option<u32>,
    /// `mode=` parameter (`PLAY`/`RECORD`).
    pub mode: Option<String>,
    /// Any parameters not otherwise recognised, preserved verbatim.
    pub extra_params: HashMap<String, Option<String>>,
}

fn parse_profile(token: &str) -> Result<RtpProfile, TransportError> {
    match token {
        "RTP/AVP" | "RTP/AVP/UDP" => Ok(RtpProfile::Avp),
        "RTP/AVPF" | "RTP/AVPF/UDP" => Ok(RtpProfile::Avpf),
        "RTP/SAVP" | "RTP/SAVP/UDP" => Ok(RtpProfile::Savp),
        "RTP/SAVPF" | "RTP/SAVPF/UDP" => Ok(RtpProfile::Savpf),
        _ => Err(TransportError::UnsupportedProfile),
    }
}

fn profile_lower_transport(token: &str) -> LowerTransport {
    if token.ends_with("/TCP") {
        LowerTransport::Tcp
    } else {
        LowerTransport::Udp
    }
}

fn parse_port_pair(value: &str) -> Option<PortPair> {
    let (lo, hi) = value.split_once('-')?;
    Some(PortPair {
        min: lo.parse().ok()?,
        max: hi.parse().ok()?,
    })
}

fn parse_channel_pair(value: &str) -> Option<(u8, u8)> {
    let (lo, hi) = value.split_once('-')?;
    Some((lo.parse().ok()?, hi.parse().ok()?))
}

impl TransportDescriptor {
    /// Parses a single `Transport` header value (one of possibly
    /// several comma-separated alternatives; callers should try each
    /// in turn and use the first that parses and validates).
    pub fn parse(transport: &str) -> Result<Self, TransportError> {
        let mut parts = transport.split(';');
        let proto_token = parts
            .next()
            .ok_or_else(|| TransportError::Malformed("empty transport spec".into()))?
            .trim();

        let profile = parse_profile(proto_token)?;
        let mut lower_transport = profile_lower_transport(proto_token);
        let mut client_port = None;
        let mut server_port = None;
        let mut ttl = None;
        let mut destination = None;
        let mut interleaved = None;
        let mut ssrc = None;
        let mut mode = None;
        let mut extra_params = HashMap::new();
        let mut saw_multicast = false;

        for part in parts {
            let part = part.trim();
            if part.is_empty() {
                continue;
            }
            if part == "unicast" {
                continue;
            }
            if part == "multicast" {
                saw_multicast = true;
                continue;
            }
            match part.split_once('=') {
                Some(("client_port", value)) => client_port = parse_port_pair(value),
                Some(("server_port", value)) => server_port = parse_port_pair(value),
                Some(("port", value)) => {
                    // bare "port=" is used for multicast, shared client/server.
                    let pair = parse_port_pair(value);
                    client_port = pair;
                    server_port = pair;
                }
                Some(("ttl", value)) => ttl = value.parse::<u32>().ok().map(|v| v.min(255) as u8),
                Some(("destination", value)) => destination = Some(value.to_string()),
                Some(("interleaved", value)) => interleaved = parse_channel_pair(value),
                Some(("ssrc", value)) => {
                    ssrc = u32::from_str_radix(value.trim_start_matches("0x"), 16).ok()
                }
                Some(("mode", value)) => mode = Some(value.trim_matches('"').to_string()),
                Some((key, value)) => {
                    extra_params.insert(key.to_string(), Some(value.to_string()));
                }
                None => {
                    extra_params.insert(part.to_string(), None);
                }
            }
        }

        if saw_multicast {
            lower_transport = LowerTransport::UdpMulticast;
        } else if interleaved.is_some() {
            lower_transport = LowerTransport::Tcp;
        }

        // SAVP/SAVPF over TCP is nonsensical for this engine's
        // purposes but the profile itself still parses; only the
        // lower-transport/profile *allow-list* check in
        // `validate_against` rejects unsupported combinations.

        Ok(TransportDescriptor {
            lower_transport,
            profile,
            client_port,
            server_port,
            ttl,
            destination,
            interleaved,
            ssrc,
            mode,
            extra_params,
        })
    }

    /// Validates this descriptor against a stream's allow-lists,
    /// returning the specific "unsupported profile" / "unsupported
    /// lower transport" errors named in §6.
    pub fn validate_against(
        &self,
        allowed_profiles: &[RtpProfile],
        allowed_lower_transports: &[LowerTransport],
    ) -> Result<(), TransportError> {
        if !allowed_profiles.contains(&self.profile) {
            return Err(TransportError::UnsupportedProfile);
        }
        if !allowed_lower_transports.contains(&self.lower_transport) {
            return Err(TransportError::UnsupportedLowerTransport);
        }
        Ok(())
    }

    /// Renders the profile token as it appears on the wire.
    fn profile_token(&self) -> &'static str {
        match (self.profile, self.lower_transport) {
            (RtpProfile::Avp, LowerTransport::Tcp) => "RTP/AVP/TCP",
            (RtpProfile::Avp, _) => "RTP/AVP",
            (RtpProfile::Avpf, LowerTransport::Tcp) => "RTP/AVPF/TCP",
            (RtpProfile::Avpf, _) => "RTP/AVPF",
            (RtpProfile::Savp, LowerTransport::Tcp) => "RTP/SAVP/TCP",
            (RtpProfile::Savp, _) => "RTP/SAVP",
            (RtpProfile::Savpf, LowerTransport::Tcp) => "RTP/SAVPF/TCP",
            (RtpProfile::Savpf, _) => "RTP/SAVPF",
        }
    }

    /// Renders this descriptor back into a `Transport` header value,
    /// as the server answers a `SETUP` request with its chosen server
    /// ports filled in.
    pub fn to_header_value(&self) -> String {
        let mut parts = vec![self.profile_token().to_string()];

        parts.push(
            match self.lower_transport {
                LowerTransport::UdpMulticast => "multicast",
                _ => "unicast",
            }
            .to_string(),
        );

        if let Some(pair) = self.client_port {
            parts.push(format!("client_port={}-{}", pair.min, pair.max));
        }
        if let Some(pair) = self.server_port {
            parts.push(format!("server_port={}-{}", pair.min, pair.max));
        }
        if let Some((lo, hi)) = self.interleaved {
            parts.push(format!("interleaved={}-{}", lo, hi));
        }
        if let Some(ttl) = self.ttl {
            parts.push(format!("ttl={}", ttl));
        }
        if let Some(ref dest) = self.destination {
            parts.push(format!("destination={}", dest));
        }
        if let Some(ssrc) = self.ssrc {
            parts.push(format!("ssrc={:08x}", ssrc));
        }
        if let Some(ref mode) = self.mode {
            parts.push(format!("mode={}", mode));
        }
        for (key, value) in &self.extra_params {
            match value {
                Some(v) => parts.push(format!("{}={}", key, v)),
                None => parts.push(key.clone()),
            }
        }

        parts.join(";")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unicast_udp_avp() {
        let d = TransportDescriptor::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        assert_eq!(d.profile, RtpProfile::Avp);
        assert_eq!(d.lower_transport, LowerTransport::Udp);
        assert_eq!(d.client_port, Some(PortPair { min: 5000, max: 5001 }));
    }

    #[test]
    fn parses_scenario_b_multicast_with_ttl() {
        let d = TransportDescriptor::parse(
            "RTP/AVP;multicast;destination=239.1.2.3;port=5000-5001;ttl=16",
        )
        .unwrap();
        assert_eq!(d.lower_transport, LowerTransport::UdpMulticast);
        assert_eq!(d.ttl, Some(16));
        assert_eq!(d.destination.as_deref(), Some("239.1.2.3"));
        assert_eq!(d.client_port, Some(PortPair { min: 5000, max: 5001 }));
    }

    #[test]
    fn ttl_is_capped_at_255() {
        let d = TransportDescriptor::parse("RTP/AVP;multicast;port=5000-5001;ttl=999").unwrap();
        assert_eq!(d.ttl, Some(255));
    }

    #[test]
    fn parses_interleaved_tcp() {
        let d = TransportDescriptor::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        assert_eq!(d.lower_transport, LowerTransport::Tcp);
        assert_eq!(d.interleaved, Some((0, 1)));
    }

    #[test]
    fn rejects_unsupported_profile_against_allow_list() {
        let d = TransportDescriptor::parse("RTP/AVPF;unicast;client_port=5000-5001").unwrap();
        let err = d
            .validate_against(&[RtpProfile::Avp], &[LowerTransport::Udp])
            .unwrap_err();
        assert_eq!(err, TransportError::UnsupportedProfile);
    }

    #[test]
    fn rejects_unsupported_lower_transport_against_allow_list() {
        let d = TransportDescriptor::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap();
        let err = d
            .validate_against(&[RtpProfile::Avp], &[LowerTransport::Udp])
            .unwrap_err();
        assert_eq!(err, TransportError::UnsupportedLowerTransport);
    }

    #[test]
    fn header_value_roundtrips_ports() {
        let mut d = TransportDescriptor::parse("RTP/AVP;unicast;client_port=5000-5001").unwrap();
        d.server_port = Some(PortPair::from_rtp_port(6000));
        let rendered = d.to_header_value();
        assert!(rendered.contains("client_port=5000-5001"));
        assert!(rendered.contains("server_port=6000-6001"));
    }
}
