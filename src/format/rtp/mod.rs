//! # Real-time Transport Protocol (RTP) support
//!
//! The pieces needed by a server-side RTSP media engine to push RTP
//! over a transport it has already negotiated: port allocation
//! (`address_pool`), key management for SRTP-secured sessions
//! (`mikey`, `srtp`), and the per-stream send/fan-out engine
//! (`stream`).
//!
//! ## Example: enqueueing a pre-built sample on a stream
//!
//! ```rust
//! use vdkio::format::rtp::{LowerTransport, NullCipher, Role, RtpProfile, RtpSample, RtpStream};
//! use std::sync::Arc;
//! use bytes::Bytes;
//!
//! let stream = RtpStream::new(
//!     0,
//!     vec![RtpProfile::Avp],
//!     vec![LowerTransport::Udp],
//!     Arc::new(NullCipher),
//! );
//! stream.enqueue(Role::Rtp, RtpSample::Single(Bytes::from_static(b"payload")), Some(0));
//! ```

pub mod address_pool;
pub mod mikey;
pub mod srtp;
pub mod stream;

pub use address_pool::{
    AddressFamily, AddressPool, AddressPoolError, AddressPoolFlags, CastKind, PooledAddress,
};
pub use mikey::{
    KeyMgmtBinding, MikeyAuthAlg, MikeyEncAlg, MikeyError, MikeyMessage, MikeySrtpPolicy,
    parse_keymgmt_header,
};
pub use srtp::{
    NullCipher, SrtpAuthKind, SrtpCipher, SrtpCipherKind, SrtpDefaults, SrtpError, SrtpKeyCache,
    SrtpPolicy,
};
pub use stream::{
    BlockingInfo, FecConfig, LowerTransport, Role, RtpError, RtpProfile, RtpSample, RtxConfig,
    StreamEvent, StreamTransportSink, TransportList, TransportOverflow, RtpStream,
};
