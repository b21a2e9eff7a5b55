//! # RTSP Media Engine
//!
//! This module provides the server-side RTSP media/stream engine:
//! transport descriptor parsing ([`transport::TransportDescriptor`]),
//! per-client attachment ([`stream_transport::StreamTransport`]), and
//! the per-session [`media::Media`] state machine that ties a set of
//! [`crate::format::rtp::RtpStream`]s together through `DESCRIBE`,
//! `SETUP`, `PLAY`, `PAUSE` and `TEARDOWN`.
//!
//! SDP is consumed (not produced) via [`sdp`]; `KeyMgmt` headers are
//! parsed by [`crate::format::rtp::mikey`].
//!
//! ## Quick Start
//!
//! ```rust
//! use vdkio::format::rtsp::media::{Media, TransportMode};
//! use vdkio::format::rtp::{RtpProfile, LowerTransport};
//!
//! let media = Media::new(
//!     TransportMode::Play,
//!     vec![RtpProfile::Avp],
//!     vec![LowerTransport::Udp, LowerTransport::Tcp],
//! );
//! media.prepare(Vec::new).unwrap();
//! assert!(media.stream_count() == 0);
//! ```

pub mod media;
pub mod sdp;
pub mod stream_transport;
pub mod transport;

pub use media::{Media, MediaStatus, Segment, Seekability, SuspendMode, TransportMode};
pub use sdp::{MediaDescription, SessionDescription};
pub use stream_transport::StreamTransport;
pub use transport::{PortPair, TransportDescriptor, TransportError};
