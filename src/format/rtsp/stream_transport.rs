//! Per-client transport attachment (§3 StreamTransport, §4.6): binds
//! one RTSP client's `SETUP`'d transport descriptor to its owning
//! [`RtpStream`], carries the send callbacks for that transport kind,
//! and — for interleaved TCP clients — the backlog that lets one slow
//! client fall behind without stalling the others.

use crate::format::rtp::{RtpSample, RtpStream, Role, StreamTransportSink, TransportOverflow};
use crate::format::rtsp::transport::TransportDescriptor;
use log::warn;
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

/// Global counter handing out stable [`StreamTransport`] identities.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// 10 seconds of buffered media, expressed in 90kHz ticks, past which
/// a backlog is considered overflowed (§4.6).
const BACKLOG_MAX_DURATION_TICKS: i64 = 10 * 90_000;
/// Item-count floor below which a long-duration backlog is still
/// tolerated (§4.6: overflow requires *both* duration and length).
const BACKLOG_MAX_LEN: usize = 100;

/// Outcome of attempting to deliver a sample directly to the peer
/// (as opposed to queueing it in the backlog).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendOutcome {
    /// The sample was written to the transport.
    Sent,
    /// The transport is not ready; the caller should queue instead.
    WouldBlock,
}

/// A send callback for one role (RTP or RTCP) on one transport.
pub type SendFn = Arc<dyn Fn(&RtpSample) -> SendOutcome + Send + Sync>;
/// A zero-argument notification callback (keep-alive, message-sent).
pub type NotifyFn = Arc<dyn Fn() + Send + Sync>;

struct BacklogItem {
    sample: RtpSample,
    is_rtp: bool,
    dts_90k: Option<i64>,
}

/// The interleaved-TCP backlog: an ordered queue of not-yet-sent
/// samples, tracking the duration spanned by its RTP items so the
/// overflow policy in §4.6 can be enforced without rescanning on
/// every push.
#[derive(Default)]
struct Backlog {
    items: VecDeque<BacklogItem>,
    oldest_rtp_ts: Option<i64>,
}

impl Backlog {
    fn newest_rtp_ts(&self, incoming: Option<i64>) -> Option<i64> {
        incoming.or_else(|| self.items.iter().rev().find(|i| i.is_rtp).and_then(|i| i.dts_90k))
    }

    fn push(&mut self, item: BacklogItem) -> Result<(), TransportOverflow> {
        if item.is_rtp {
            if self.oldest_rtp_ts.is_none() {
                self.oldest_rtp_ts = item.dts_90k;
            }
            if let (Some(oldest), Some(newest)) = (self.oldest_rtp_ts, self.newest_rtp_ts(item.dts_90k)) {
                let duration = newest - oldest;
                if duration > BACKLOG_MAX_DURATION_TICKS && self.items.len() + 1 > BACKLOG_MAX_LEN {
                    return Err(TransportOverflow);
                }
            }
        }
        self.items.push_back(item);
        Ok(())
    }

    fn pop(&mut self) -> Option<BacklogItem> {
        let item = self.items.pop_front()?;
        self.oldest_rtp_ts = self.items.iter().find(|i| i.is_rtp).and_then(|i| i.dts_90k);
        Some(item)
    }

    fn len(&self) -> usize {
        self.items.len()
    }

    fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A single attached client transport: the RTSP-side counterpart of
/// an `RtpStream`'s entry in its [`crate::format::rtp::TransportList`].
pub struct StreamTransport {
    id: u64,
    /// Non-owning back-reference to the stream this transport serves,
    /// per design note §9's cyclic-reference guidance: the stream
    /// owns the transport via `Arc`, the transport only ever reaches
    /// back through a `Weak`.
    stream: Weak<RtpStream>,
    descriptor: ReentrantMutex<RefCell<TransportDescriptor>>,
    url: String,
    send_rtp: ReentrantMutex<RefCell<Option<SendFn>>>,
    send_rtcp: ReentrantMutex<RefCell<Option<SendFn>>>,
    keep_alive: ReentrantMutex<RefCell<Option<NotifyFn>>>,
    message_sent: ReentrantMutex<RefCell<Option<NotifyFn>>>,
    timed_out: AtomicBool,
    backlog: ReentrantMutex<RefCell<Backlog>>,
    last_activity: ReentrantMutex<RefCell<Instant>>,
}

impl StreamTransport {
    /// Creates a new transport for `descriptor`, attached to `stream`.
    pub fn new(stream: &Arc<RtpStream>, descriptor: TransportDescriptor, url: String) -> Arc<Self> {
        Arc::new(Self {
            id: NEXT_ID.fetch_add(1, Ordering::SeqCst),
            stream: Arc::downgrade(stream),
            descriptor: ReentrantMutex::new(RefCell::new(descriptor)),
            url,
            send_rtp: ReentrantMutex::new(RefCell::new(None)),
            send_rtcp: ReentrantMutex::new(RefCell::new(None)),
            keep_alive: ReentrantMutex::new(RefCell::new(None)),
            message_sent: ReentrantMutex::new(RefCell::new(None)),
            timed_out: AtomicBool::new(false),
            backlog: ReentrantMutex::new(RefCell::new(Backlog::default())),
            last_activity: ReentrantMutex::new(RefCell::new(Instant::now())),
        })
    }

    /// Stable identity used in the owning stream's transport list.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The per-transport control URL (`a=control:` resolved against
    /// the session URL).
    pub fn url(&self) -> &str {
        &self.url
    }

    /// A clone of the current transport descriptor.
    pub fn descriptor(&self) -> TransportDescriptor {
        let guard = self.descriptor.lock();
        guard.borrow().clone()
    }

    /// Upgrades the back-reference to the owning stream, if it is
    /// still alive.
    pub fn stream(&self) -> Option<Arc<RtpStream>> {
        self.stream.upgrade()
    }

    /// Installs the RTP/RTCP send callbacks (scalar and list variants
    /// are both represented by [`RtpSample`]).
    pub fn set_send_callbacks(&self, send_rtp: SendFn, send_rtcp: SendFn) {
        *self.send_rtp.lock().borrow_mut() = Some(send_rtp);
        *self.send_rtcp.lock().borrow_mut() = Some(send_rtcp);
    }

    /// Installs the keep-alive callback, invoked by the owning
    /// media's idle-timeout sweep.
    pub fn set_keep_alive(&self, callback: NotifyFn) {
        *self.keep_alive.lock().borrow_mut() = Some(callback);
    }

    /// Installs the message-sent callback, invoked once per
    /// successful backlog drain (§4.6).
    pub fn set_message_sent(&self, callback: NotifyFn) {
        *self.message_sent.lock().borrow_mut() = Some(callback);
    }

    /// Invokes the keep-alive callback, if any.
    pub fn send_keep_alive(&self) {
        if let Some(cb) = self.keep_alive.lock().borrow().as_ref() {
            cb();
        }
    }

    /// Whether this transport has been marked timed out (no activity
    /// within the configured idle window).
    pub fn timed_out(&self) -> bool {
        self.timed_out.load(Ordering::SeqCst)
    }

    /// Marks this transport as timed out.
    pub fn mark_timed_out(&self) {
        self.timed_out.store(true, Ordering::SeqCst);
    }

    /// Records activity (a send, or an RTCP receipt), resetting the
    /// idle-timeout clock. RTCP receipts resetting the clock even
    /// though RTCP isn't the data channel is a supplemented behaviour:
    /// a receiver that is still sending RTCP reports is not idle.
    pub fn note_activity(&self) {
        *self.last_activity.lock().borrow_mut() = Instant::now();
    }

    /// Time elapsed since the last recorded activity.
    pub fn idle_for(&self) -> std::time::Duration {
        self.last_activity.lock().borrow().elapsed()
    }

    /// Number of items currently queued in the backlog.
    pub fn backlog_len(&self) -> usize {
        self.backlog.lock().borrow().len()
    }

    fn role_send_fn(&self, role: Role) -> Option<SendFn> {
        match role {
            Role::Rtp => self.send_rtp.lock().borrow().clone(),
            Role::Rtcp => self.send_rtcp.lock().borrow().clone(),
        }
    }

    /// Attempts to send one item directly via the role's callback. A
    /// transport with no callback installed (not yet wired to a
    /// socket) reports `WouldBlock` so the caller queues instead.
    fn try_send_direct(&self, role: Role, sample: &RtpSample) -> SendOutcome {
        match self.role_send_fn(role) {
            Some(send) => send(sample),
            None => SendOutcome::WouldBlock,
        }
    }

    /// Back-pressure check used before a direct send is attempted
    /// (§4.6's `check_back_pressure`): true when the backlog already
    /// holds items for this role, meaning direct sends must queue
    /// behind them to preserve ordering.
    pub fn check_back_pressure(&self, is_rtp: bool) -> bool {
        let backlog = self.backlog.lock();
        let backlog = backlog.borrow();
        backlog.items.iter().any(|i| i.is_rtp == is_rtp)
    }
}

impl StreamTransportSink for StreamTransport {
    fn sink_id(&self) -> u64 {
        self.id
    }

    fn is_tcp(&self) -> bool {
        self.descriptor().interleaved.is_some()
    }

    fn deliver(
        &self,
        role: Role,
        sample: RtpSample,
        dts_90k: Option<i64>,
    ) -> Result<(), TransportOverflow> {
        let is_rtp = role == Role::Rtp;
        if !self.check_back_pressure(is_rtp) {
            if self.try_send_direct(role, &sample) == SendOutcome::Sent {
                self.note_activity();
                if let Some(cb) = self.message_sent.lock().borrow().as_ref() {
                    cb();
                }
                return Ok(());
            }
        }
        let backlog = self.backlog.lock();
        let mut backlog = backlog.borrow_mut();
        let result = backlog.push(BacklogItem {
            sample,
            is_rtp,
            dts_90k,
        });
        if result.is_err() {
            warn!("stream transport {}: backlog overflow, {} items queued", self.id, backlog.len());
        }
        result
    }

    fn drain_one_if_clear(&self, role: Role) {
        let is_rtp = role == Role::Rtp;
        let item = {
            let backlog = self.backlog.lock();
            let mut backlog = backlog.borrow_mut();
            if backlog.is_empty() {
                return;
            }
            backlog.pop()
        };
        if let Some(item) = item {
            if self.try_send_direct(role, &item.sample) == SendOutcome::Sent {
                self.note_activity();
                if let Some(cb) = self.message_sent.lock().borrow().as_ref() {
                    cb();
                }
            } else {
                // still blocked: put it back at the front.
                let backlog = self.backlog.lock();
                let mut backlog = backlog.borrow_mut();
                backlog.items.push_front(BacklogItem {
                    sample: item.sample,
                    is_rtp: item.is_rtp,
                    dts_90k: item.dts_90k,
                });
                if backlog.oldest_rtp_ts.is_none() && item.is_rtp {
                    backlog.oldest_rtp_ts = item.dts_90k;
                }
            }
        }
    }
}

impl std::fmt::Debug for StreamTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamTransport")
            .field("id", &self.id)
            .field("url", &self.url)
            .field("timed_out", &self.timed_out())
            .field("backlog_len", &self.backlog_len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::rtp::{LowerTransport, NullCipher, RtpProfile};
    use bytes::Bytes;
    use std::sync::Mutex as StdMutex;

    fn descriptor_tcp() -> TransportDescriptor {
        TransportDescriptor::parse("RTP/AVP/TCP;unicast;interleaved=0-1").unwrap()
    }

    fn make_stream() -> Arc<RtpStream> {
        Arc::new(RtpStream::new(
            0,
            vec![RtpProfile::Avp],
            vec![LowerTransport::Tcp],
            Arc::new(NullCipher),
        ))
    }

    #[test]
    fn queues_when_no_callback_installed_then_drains_once_wired() {
        let stream = make_stream();
        let transport = StreamTransport::new(&stream, descriptor_tcp(), "rtsp://x/track1".into());

        let sample = RtpSample::Single(Bytes::from_static(b"rtp"));
        transport.deliver(Role::Rtp, sample, Some(0)).unwrap();
        assert_eq!(transport.backlog_len(), 1);

        let sent = Arc::new(StdMutex::new(Vec::new()));
        let sent_clone = sent.clone();
        let send_rtp: SendFn = Arc::new(move |s: &RtpSample| {
            sent_clone.lock().unwrap().push(s.len());
            SendOutcome::Sent
        });
        let send_rtcp: SendFn = Arc::new(|_| SendOutcome::Sent);
        transport.set_send_callbacks(send_rtp, send_rtcp);

        transport.drain_one_if_clear(Role::Rtp);
        assert_eq!(transport.backlog_len(), 0);
        assert_eq!(sent.lock().unwrap().len(), 1);
    }

    #[test]
    fn backlog_overflows_past_duration_and_length_thresholds() {
        let stream = make_stream();
        let transport = StreamTransport::new(&stream, descriptor_tcp(), "rtsp://x/track1".into());

        // 101 ms spacing * 100 steps = 10.1s > 10s, with 101 items > 100.
        let spacing_ticks: i64 = (90_000.0 * 0.101) as i64;
        let mut last_err = false;
        for i in 0..101 {
            let ts = i as i64 * spacing_ticks;
            let result = transport.deliver(
                Role::Rtp,
                RtpSample::Single(Bytes::from_static(b"x")),
                Some(ts),
            );
            last_err = result.is_err();
        }
        assert!(last_err, "101st push spanning >10s should overflow");
    }

    #[test]
    fn backlog_tolerates_long_duration_under_length_cap() {
        let stream = make_stream();
        let transport = StreamTransport::new(&stream, descriptor_tcp(), "rtsp://x/track1".into());
        // Only two pushes, huge duration, but well under the length cap.
        transport
            .deliver(Role::Rtp, RtpSample::Single(Bytes::from_static(b"x")), Some(0))
            .unwrap();
        transport
            .deliver(
                Role::Rtp,
                RtpSample::Single(Bytes::from_static(b"x")),
                Some(100 * 90_000),
            )
            .unwrap();
        assert_eq!(transport.backlog_len(), 2);
    }

    #[test]
    fn rtcp_activity_resets_idle_clock() {
        let stream = make_stream();
        let transport = StreamTransport::new(&stream, descriptor_tcp(), "rtsp://x/track1".into());
        std::thread::sleep(std::time::Duration::from_millis(5));
        let before = transport.idle_for();
        transport.note_activity();
        let after = transport.idle_for();
        assert!(after < before);
    }

    #[test]
    fn weak_back_reference_does_not_keep_stream_alive() {
        let stream = make_stream();
        let transport = StreamTransport::new(&stream, descriptor_tcp(), "rtsp://x/track1".into());
        assert!(transport.stream().is_some());
        drop(stream);
        assert!(transport.stream().is_none());
    }
}
