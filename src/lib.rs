#![doc(html_root_url = "https://docs.rs/vdkio/0.1.0")]
#![cfg_attr(docsrs, feature(doc_cfg))]
#![deny(missing_docs)]
#![deny(rustdoc::missing_crate_level_docs)]

//! # vdkio - MPEG Program Stream and RTSP Media Engine
//!
//! `vdkio` demultiplexes MPEG Program Streams and serves their
//! elementary streams out over RTSP/RTP, in the spirit of a GStreamer
//! `rtspserver` deployment but built from independent async Rust
//! primitives rather than a pipeline graph.
//!
//! ## Features
//!
//! ### Program stream demultiplexing
//! - Resynchronising byte-level pack/PES parser ([`format::ps`])
//! - SCR tracking, seek, and stream-id-to-type resolution
//!
//! ### RTSP/RTP media engine
//! - Per-stream RTP/RTCP transport engine with UDP unicast,
//!   multicast, and interleaved-TCP delivery ([`format::rtp`])
//! - Per-client transport backlog with bounded duration/length
//!   overflow ([`format::rtsp::stream_transport`])
//! - Media lifecycle (`prepare`/`suspend`/`seek`/`unprepare`) built
//!   around a `UNPREPARED..PREPARED..SUSPENDED` state machine
//!   ([`format::rtsp::media`])
//! - Address pool, MIKEY key-management header parsing, and SRTP
//!   policy resolution
//!
//! ## Quick Start
//!
//! Add this to your `Cargo.toml`:
//!
//! ```toml
//! [dependencies]
//! vdkio = "0.1.0"
//! ```
//!
//! ### Demultiplexing a program stream
//!
//! ```rust,no_run
//! use vdkio::format::ps::PsDemuxer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let file = tokio::fs::File::open("input.mpg").await?;
//!     let mut demuxer = PsDemuxer::new(file);
//!     while let Some(packet) = demuxer.read_packet().await? {
//!         println!("stream {}: {} bytes", packet.stream_index, packet.data.len());
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ### Building a media and its streams
//!
//! ```rust
//! use vdkio::format::rtsp::media::{Media, TransportMode};
//! use vdkio::format::rtp::{RtpProfile, LowerTransport, RtpStream, NullCipher};
//! use std::sync::Arc;
//!
//! let media = Media::new(
//!     TransportMode::Play,
//!     vec![RtpProfile::Avp],
//!     vec![LowerTransport::Udp, LowerTransport::Tcp],
//! );
//! media
//!     .prepare(|| {
//!         vec![Arc::new(RtpStream::new(
//!             0,
//!             vec![RtpProfile::Avp],
//!             vec![LowerTransport::Udp, LowerTransport::Tcp],
//!             Arc::new(NullCipher),
//!         ))]
//!     })
//!     .unwrap();
//! assert_eq!(media.stream_count(), 1);
//! ```
//!
//! ## Module Overview
//!
//! - `format::ps`: MPEG Program Stream demultiplexer
//! - `format::rtp`: RTP/RTCP packet handling, address pool, MIKEY,
//!   SRTP, and the `RtpStream` transport engine
//! - `format::rtsp`: the server-side media/stream-transport engine
//! - `error`: crate-wide error types
//! - `config`: ambient runtime configuration (ports, timeouts,
//!   backlog thresholds, SRTP defaults)

/// Error types and utilities
pub mod error;

/// Core audio/video packet type shared by the demuxer and media engine
pub mod av;

/// Media format implementations (MPEG-PS demuxer, RTP/RTCP, RTSP media engine)
pub mod format;

/// Configuration module
pub mod config;

pub use error::{Result, VdkError};
