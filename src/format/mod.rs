//! # Media Format Implementations
//!
//! This module provides the program-stream demultiplexer and the
//! RTSP/RTP media engine built around it:
//!
//! - **PS**: MPEG Program Stream demultiplexing (pack headers, PES
//!   framing, SCR tracking)
//! - **RTCP**: RTP Control Protocol for stream feedback
//! - **RTP**: Real-time Transport Protocol, address pool, MIKEY/SRTP
//!   key management, and the `RtpStream` transport engine
//! - **RTSP**: the server-side media/stream-transport engine
//!
//! ## Example: demultiplexing a program stream
//!
//! ```rust,no_run
//! use vdkio::format::ps::PsDemuxer;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let file = tokio::fs::File::open("input.mpg").await?;
//! let mut demuxer = PsDemuxer::new(file);
//! while let Some(packet) = demuxer.read_packet().await? {
//!     println!("stream {} : {} bytes", packet.stream_index, packet.data.len());
//! }
//! # Ok(())
//! # }
//! ```

/// MPEG Program Stream demultiplexing (pack headers, PES framing, SCR tracking)
pub mod ps;
/// RTP Control Protocol (RTCP) implementation for stream feedback and statistics
pub mod rtcp;
/// Real-time Transport Protocol (RTP) implementation, address pool, MIKEY/SRTP
/// key management, and the per-stream transport engine
pub mod rtp;
/// Real Time Streaming Protocol (RTSP) server-side media/stream engine
pub mod rtsp;

// Re-export commonly used types
pub use self::ps::{PsDemuxer, PsError};
pub use self::rtcp::{RTCPPacket, ReceptionReport};
pub use self::rtp::RtpStream;
pub use self::rtsp::{Media, MediaDescription, TransportDescriptor};
