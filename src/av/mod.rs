//! # Core Packet Type
//!
//! A minimal, format-agnostic packet carrying an elementary stream's
//! payload plus timing and stream-index metadata. The PS demuxer
//! ([`crate::format::ps::PsDemuxer`]) is the only producer.
//!
//! ```rust
//! use vdkio::av::Packet;
//!
//! let packet = Packet::new(vec![0u8; 4])
//!     .with_pts(1000)
//!     .with_stream_index(0);
//! assert_eq!(packet.stream_index, 0);
//! ```

/// Media packet handling and management
pub mod packet;
pub use packet::Packet;
