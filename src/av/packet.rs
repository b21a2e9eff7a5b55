use bytes::Bytes;
use std::time::Duration;

/// A single elementary-stream access unit, as produced by the PS
/// demuxer from one delivered PES payload.
#[derive(Debug, Clone)]
pub struct Packet {
    /// The access unit's payload bytes.
    pub data: Bytes,
    /// Presentation timestamp in 90 kHz ticks, if the PES header carried one.
    pub pts: Option<i64>,
    /// Decode timestamp in 90 kHz ticks, if the PES header carried one.
    pub dts: Option<i64>,
    /// Index of the elementary stream this packet belongs to.
    pub stream_index: usize,
    /// Whether this access unit is a random-access point.
    pub is_key: bool,
    /// Duration of this access unit, if known.
    pub duration: Option<Duration>,
}

impl Packet {
    /// Builds a packet from raw payload bytes with no timing metadata set.
    pub fn new(data: impl Into<Bytes>) -> Self {
        Self {
            data: data.into(),
            pts: None,
            dts: None,
            stream_index: 0,
            is_key: false,
            duration: None,
        }
    }

    /// Sets the presentation timestamp.
    pub fn with_pts(mut self, pts: i64) -> Self {
        self.pts = Some(pts);
        self
    }

    /// Sets the decode timestamp.
    pub fn with_dts(mut self, dts: i64) -> Self {
        self.dts = Some(dts);
        self
    }

    /// Sets the owning elementary stream's index.
    pub fn with_stream_index(mut self, index: usize) -> Self {
        self.stream_index = index;
        self
    }

    /// Sets the random-access-point flag.
    pub fn with_key_flag(mut self, is_key: bool) -> Self {
        self.is_key = is_key;
        self
    }

    /// Sets the access unit's duration.
    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }
}
