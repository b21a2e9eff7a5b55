//! `RtpStream`: the per-elementary-stream RTP/RTCP transport engine
//! (§3 RTPStream, §4.4, §4.5). Owns the fan-out/fan-in points that
//! replace the original pipeline's TEE/FUNNEL elements, the transport
//! list clients attach to via RTSP `SETUP`, SRTP key material, and
//! the TCP send core that paces slow interleaved clients from their
//! own backlog rather than stalling the rest.
//!
//! The GStreamer pipeline graph in §4.4 collapses, per design note
//! §9, into a broadcast fan-out feeding bounded per-transport
//! channels: `rtp_tee`/`rtcp_tee` are the TEEs, and TCP transports
//! drain through [`StreamTransportSink`] rather than an `appsink`.

use super::address_pool::{AddressFamily, AddressPool, AddressPoolError, AddressPoolFlags, CastKind};
use super::srtp::{SrtpCipher, SrtpKeyCache};
use bytes::Bytes;
use log::{debug, info, warn};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::net::UdpSocket;
use tokio::sync::{broadcast, Notify};

/// Errors raised by the RTP transport engine.
#[derive(Debug, Error)]
pub enum RtpError {
    /// Address pool exhausted or rejected the request.
    #[error("address pool error: {0}")]
    AddressPool(#[from] AddressPoolError),
    /// Socket bind failed after exhausting the retry budget.
    #[error("failed to bind socket after {0} attempts: {1}")]
    BindFailed(u32, std::io::Error),
    /// SRTP key/cipher error.
    #[error("srtp error: {0}")]
    Srtp(#[from] super::srtp::SrtpError),
    /// A transport descriptor named a profile/lower-transport this
    /// stream does not allow (§6).
    #[error("unsupported profile")]
    UnsupportedProfile,
    /// See above.
    #[error("unsupported lower transport")]
    UnsupportedLowerTransport,
}

/// RTSP transport profile (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RtpProfile {
    /// Plain RTP/AVP.
    Avp,
    /// RTP/AVPF (feedback profile).
    Avpf,
    /// Secure RTP/SAVP.
    Savp,
    /// Secure RTP/SAVPF.
    Savpf,
}

/// Lower transport a client may request (§3, §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LowerTransport {
    /// UDP unicast.
    Udp,
    /// UDP multicast.
    UdpMulticast,
    /// Interleaved over the RTSP TCP control connection.
    Tcp,
}

/// RTP vs RTCP, used to index the two parallel fan-out/backlog paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The RTP data channel.
    Rtp,
    /// The RTCP control channel.
    Rtcp,
}

/// One delivered unit: a single buffer or a buffer list, mirroring
/// the "(buffer | buffer_list, is_rtp)" backlog item shape in §3.
#[derive(Debug, Clone)]
pub enum RtpSample {
    /// A single packet.
    Single(Bytes),
    /// A list of packets delivered together (e.g. a retransmission burst).
    List(Vec<Bytes>),
}

impl RtpSample {
    /// Number of individual packets this sample carries.
    pub fn len(&self) -> usize {
        match self {
            RtpSample::Single(_) => 1,
            RtpSample::List(items) => items.len(),
        }
    }
}

/// Raised by a [`StreamTransportSink`] when its backlog overflows;
/// the caller drops the offending transport (§7 kind 4).
#[derive(Debug, Clone, Copy)]
pub struct TransportOverflow;

/// The interface an `RtpStream` uses to push samples at a concrete
/// client transport, implemented by `rtsp::stream_transport::StreamTransport`.
/// Defined here (rather than depending on the `rtsp` module) so the
/// dependency runs `rtsp -> rtp`, never the reverse, per design note
/// §9's "break cyclic references" guidance.
pub trait StreamTransportSink: Send + Sync {
    /// Stable identity used to remove this sink from the transport list.
    fn sink_id(&self) -> u64;
    /// True for interleaved-TCP transports, which alone participate
    /// in backlog-based pacing (§4.5 names this "the TCP send core").
    fn is_tcp(&self) -> bool;
    /// Delivers one sample for `role`, either directly or into the
    /// transport's backlog if currently back-pressured.
    fn deliver(
        &self,
        role: Role,
        sample: RtpSample,
        dts_90k: Option<i64>,
    ) -> Result<(), TransportOverflow>;
    /// Drains at most one backlog item for `role` if the transport is
    /// no longer back-pressured (§4.5's `check_transport_backlog`).
    fn drain_one_if_clear(&self, role: Role);
}

struct TransportListInner {
    cookie: u64,
    items: Vec<Arc<dyn StreamTransportSink>>,
}

/// The stream's transport list: every client currently attached,
/// guarded by a cookie that increments on every add/remove so
/// concurrent iterators can detect a stale snapshot (§3 invariants,
/// §8 property 6).
pub struct TransportList {
    inner: Mutex<TransportListInner>,
}

impl Default for TransportList {
    fn default() -> Self {
        Self {
            inner: Mutex::new(TransportListInner {
                cookie: 0,
                items: Vec::new(),
            }),
        }
    }
}

impl TransportList {
    /// Adds a transport, incrementing the cookie by one.
    pub fn add(&self, sink: Arc<dyn StreamTransportSink>) -> u64 {
        let mut inner = self.inner.lock();
        inner.items.push(sink);
        inner.cookie += 1;
        inner.cookie
    }

    /// Removes the transport with the given sink id, incrementing the
    /// cookie by one regardless of whether anything was found.
    pub fn remove(&self, sink_id: u64) -> u64 {
        let mut inner = self.inner.lock();
        inner.items.retain(|t| t.sink_id() != sink_id);
        inner.cookie += 1;
        inner.cookie
    }

    /// Current cookie value.
    pub fn cookie(&self) -> u64 {
        self.inner.lock().cookie
    }

    /// Snapshot of `(cookie, transports)` taken atomically; callers
    /// that iterate the list compare the cookie again afterwards and
    /// restart if it changed (§3 invariants).
    pub fn snapshot(&self) -> (u64, Vec<Arc<dyn StreamTransportSink>>) {
        let inner = self.inner.lock();
        (inner.cookie, inner.items.clone())
    }

    /// Number of attached transports.
    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }
}

/// Records the first observed RTP packet on a send-src while the
/// pipeline is held between `DESCRIBE` and `PLAY` (§4.4 "Blocking
/// probes").
#[derive(Debug, Clone, Copy, Default)]
pub struct BlockingInfo {
    /// First observed sequence number.
    pub seqnum: u16,
    /// First observed RTP timestamp.
    pub rtptime: u32,
    /// Running time at first observation, in nanoseconds.
    pub running_time_ns: u64,
    /// Negotiated clock rate for this stream.
    pub clock_rate: u32,
}

#[derive(Default)]
struct BlockingState {
    rtp: Option<BlockingInfo>,
    rtcp: Option<BlockingInfo>,
    /// "Drop probe" arming: when true, the next buffer for that role
    /// is dropped and the probe disarms itself.
    drop_armed: [bool; 2],
}

fn role_index(role: Role) -> usize {
    match role {
        Role::Rtp => 0,
        Role::Rtcp => 1,
    }
}

/// Event a stream posts for its owning media to observe, replacing
/// the pipeline bus messages ("StreamBlocking" etc.) of the original.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    /// A blocking probe recorded its first buffer.
    Blocking { role: Role, info: BlockingInfo },
}

/// Retransmission configuration (§4.4).
#[derive(Debug, Clone, Default)]
pub struct RtxConfig {
    /// payloader PT -> rtx PT, seeded on the send side.
    pub pt_map: HashMap<u8, u8>,
    /// Time window retained for retransmission requests.
    pub time_window: std::time::Duration,
}

/// ULPFEC configuration (§4.4, RFC 5109).
#[derive(Debug, Clone, Copy)]
pub struct FecConfig {
    /// Payload type used for FEC packets.
    pub pt: u8,
    /// Percentage of redundancy to generate.
    pub percentage: u8,
}

struct StreamSockets {
    rtp_v4: Option<Arc<UdpSocket>>,
    rtcp_v4: Option<Arc<UdpSocket>>,
    rtp_v6: Option<Arc<UdpSocket>>,
    rtcp_v6: Option<Arc<UdpSocket>>,
    mcast_rtp: Option<Arc<UdpSocket>>,
    mcast_rtcp: Option<Arc<UdpSocket>>,
}

impl Default for StreamSockets {
    fn default() -> Self {
        Self {
            rtp_v4: None,
            rtcp_v4: None,
            rtp_v6: None,
            rtcp_v6: None,
            mcast_rtp: None,
            mcast_rtcp: None,
        }
    }
}

struct SendCore {
    notify: Notify,
    continue_sending: AtomicBool,
    send_cookie: AtomicU64,
    pending: Mutex<[Option<(RtpSample, Option<i64>)>; 2]>,
}

impl Default for SendCore {
    fn default() -> Self {
        Self {
            notify: Notify::new(),
            continue_sending: AtomicBool::new(true),
            send_cookie: AtomicU64::new(0),
            pending: Mutex::new([None, None]),
        }
    }
}

/// The per-elementary-stream transport engine. One instance per media
/// stream (§3 RTPStream); created when a media is configured and
/// destroyed with it.
pub struct RtpStream {
    /// Stable index within the owning media's stream list.
    pub index: usize,
    allowed_profiles: Vec<RtpProfile>,
    allowed_lower_transports: Vec<LowerTransport>,
    configured_protocols: Mutex<Vec<LowerTransport>>,
    server_addr: Mutex<HashMap<AddressFamily, SocketAddr>>,
    mcast_addr: Mutex<HashMap<AddressFamily, SocketAddr>>,
    sockets: Mutex<StreamSockets>,
    rtp_tee: broadcast::Sender<RtpSample>,
    rtcp_tee: broadcast::Sender<RtpSample>,
    events: broadcast::Sender<StreamEvent>,
    srtp_encoder: Mutex<Option<SrtpKeyCache>>,
    srtp_decoder: Mutex<Option<SrtpKeyCache>>,
    srtp_cipher: Arc<dyn SrtpCipher>,
    pub transports: TransportList,
    pt_caps: Mutex<HashMap<u8, String>>,
    blocking: Mutex<BlockingState>,
    rate_control: AtomicBool,
    rtx: Mutex<Option<RtxConfig>>,
    fec: Mutex<Option<FecConfig>>,
    enable_rtcp: AtomicBool,
    send: SendCore,
}

impl RtpStream {
    /// Creates a new stream allowing `profiles`/`lower_transports`.
    pub fn new(
        index: usize,
        profiles: Vec<RtpProfile>,
        lower_transports: Vec<LowerTransport>,
        srtp_cipher: Arc<dyn SrtpCipher>,
    ) -> Self {
        let (rtp_tee, _) = broadcast::channel(16);
        let (rtcp_tee, _) = broadcast::channel(16);
        let (events, _) = broadcast::channel(16);
        Self {
            index,
            allowed_profiles: profiles,
            allowed_lower_transports: lower_transports,
            configured_protocols: Mutex::new(Vec::new()),
            server_addr: Mutex::new(HashMap::new()),
            mcast_addr: Mutex::new(HashMap::new()),
            sockets: Mutex::new(StreamSockets::default()),
            rtp_tee,
            rtcp_tee,
            events,
            srtp_encoder: Mutex::new(None),
            srtp_decoder: Mutex::new(None),
            srtp_cipher,
            transports: TransportList::default(),
            pt_caps: Mutex::new(HashMap::new()),
            blocking: Mutex::new(BlockingState::default()),
            rate_control: AtomicBool::new(true),
            rtx: Mutex::new(None),
            fec: Mutex::new(None),
            enable_rtcp: AtomicBool::new(true),
            send: SendCore::default(),
        }
    }

    /// Validates a requested profile/lower-transport pair against
    /// what this stream allows (§6).
    pub fn validate_transport_request(
        &self,
        profile: RtpProfile,
        lower_transport: LowerTransport,
    ) -> Result<(), RtpError> {
        if !self.allowed_profiles.contains(&profile) {
            return Err(RtpError::UnsupportedProfile);
        }
        if !self.allowed_lower_transports.contains(&lower_transport) {
            return Err(RtpError::UnsupportedLowerTransport);
        }
        Ok(())
    }

    /// True iff `lower_transport`'s subgraph has been constructed
    /// (§3 invariant: "A stream is in configured_protocols iff...").
    pub fn is_configured(&self, lower_transport: LowerTransport) -> bool {
        self.configured_protocols.lock().contains(&lower_transport)
    }

    fn mark_configured(&self, lower_transport: LowerTransport) {
        let mut configured = self.configured_protocols.lock();
        if !configured.contains(&lower_transport) {
            configured.push(lower_transport);
        }
    }

    /// Acquires a UDP unicast port pair from `pool` and binds the
    /// RTP/RTCP sockets, retrying up to `max_retries` times on bind
    /// failure (§4.4). Falls back to OS-assigned ephemeral ports when
    /// `pool` is `None`.
    pub async fn configure_udp(
        &self,
        pool: Option<&AddressPool>,
        family: AddressFamily,
        bind_ip: std::net::IpAddr,
        max_retries: u32,
    ) -> Result<(), RtpError> {
        let mut last_err = None;
        for attempt in 0..max_retries.max(1) {
            let (rtp_port, rtcp_port, _guard) = match pool {
                Some(pool) => {
                    let addr = pool.acquire(AddressPoolFlags {
                        family,
                        cast: CastKind::Unicast,
                    })?;
                    (addr.rtp_port(), addr.rtcp_port(), Some(addr))
                }
                None => (0, 0, None),
            };
            match (
                UdpSocket::bind((bind_ip, rtp_port)).await,
                UdpSocket::bind((bind_ip, rtcp_port)).await,
            ) {
                (Ok(rtp_sock), Ok(rtcp_sock)) => {
                    let local_rtp = rtp_sock.local_addr().unwrap_or((bind_ip, rtp_port).into());
                    let mut sockets = self.sockets.lock();
                    match family {
                        AddressFamily::V4 => {
                            sockets.rtp_v4 = Some(Arc::new(rtp_sock));
                            sockets.rtcp_v4 = Some(Arc::new(rtcp_sock));
                        }
                        AddressFamily::V6 => {
                            sockets.rtp_v6 = Some(Arc::new(rtp_sock));
                            sockets.rtcp_v6 = Some(Arc::new(rtcp_sock));
                        }
                    }
                    drop(sockets);
                    self.server_addr.lock().insert(family, local_rtp);
                    self.mark_configured(LowerTransport::Udp);
                    info!("stream {}: bound UDP {:?} at {}", self.index, family, local_rtp);
                    return Ok(());
                }
                (Err(e), _) | (_, Err(e)) => {
                    debug!("stream {}: UDP bind attempt {} failed: {}", self.index, attempt, e);
                    last_err = Some(e);
                }
            }
        }
        Err(RtpError::BindFailed(
            max_retries,
            last_err.unwrap_or_else(|| std::io::Error::new(std::io::ErrorKind::Other, "no attempts made")),
        ))
    }

    /// Binds the multicast sender/receiver socket pair for `family`
    /// at `group`, joining the group on the sink side only (§4.4,
    /// design note §9.3: dual-family duplication preserved by
    /// parameterising on family rather than allocating separate
    /// pools).
    pub async fn configure_multicast(
        &self,
        family: AddressFamily,
        group: std::net::IpAddr,
        rtp_port: u16,
        ttl: u8,
    ) -> Result<(), RtpError> {
        let bind_ip = match family {
            AddressFamily::V4 => std::net::IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED),
            AddressFamily::V6 => std::net::IpAddr::V6(std::net::Ipv6Addr::UNSPECIFIED),
        };
        let rtp_sock = UdpSocket::bind((bind_ip, rtp_port))
            .await
            .map_err(|e| RtpError::BindFailed(1, e))?;
        let rtcp_sock = UdpSocket::bind((bind_ip, rtp_port + 1))
            .await
            .map_err(|e| RtpError::BindFailed(1, e))?;

        if let (std::net::IpAddr::V4(group_v4), AddressFamily::V4) = (group, family) {
            let _ = rtp_sock.set_multicast_ttl_v4(ttl as u32);
            let _ = rtp_sock.join_multicast_v4(group_v4, std::net::Ipv4Addr::UNSPECIFIED);
        }

        let mut sockets = self.sockets.lock();
        sockets.mcast_rtp = Some(Arc::new(rtp_sock));
        sockets.mcast_rtcp = Some(Arc::new(rtcp_sock));
        drop(sockets);

        self.mcast_addr.lock().insert(family, SocketAddr::new(group, rtp_port));
        self.mark_configured(LowerTransport::UdpMulticast);
        info!(
            "stream {}: multicast {:?} group={} ttl={}",
            self.index, family, group, ttl
        );
        Ok(())
    }

    /// The resolved unicast server address for `family`, if configured.
    pub fn server_addr(&self, family: AddressFamily) -> Option<SocketAddr> {
        self.server_addr.lock().get(&family).copied()
    }

    /// The resolved multicast group address for `family`, if configured.
    pub fn mcast_addr(&self, family: AddressFamily) -> Option<SocketAddr> {
        self.mcast_addr.lock().get(&family).copied()
    }

    /// Installs the SRTP encoder/decoder key caches, sharing a single
    /// cipher between RTP and RTCP per §4.4.
    pub fn enable_srtp(&self, encoder: SrtpKeyCache, decoder: SrtpKeyCache) {
        *self.srtp_encoder.lock() = Some(encoder);
        *self.srtp_decoder.lock() = Some(decoder);
    }

    /// Returns the installed SRTP decoder key cache, if any.
    pub fn srtp_decoder(&self) -> Option<SrtpKeyCache> {
        self.srtp_decoder.lock().clone()
    }

    /// Returns the installed SRTP encoder key cache, if any.
    pub fn srtp_encoder(&self) -> Option<SrtpKeyCache> {
        self.srtp_encoder.lock().clone()
    }

    /// Shared cipher implementation (Null/unimplemented descriptors).
    pub fn srtp_cipher(&self) -> Arc<dyn SrtpCipher> {
        self.srtp_cipher.clone()
    }

    /// Records caps for a payload type (`pt_caps` in §3).
    pub fn set_pt_caps(&self, pt: u8, caps: String) {
        self.pt_caps.lock().insert(pt, caps);
    }

    /// Looks up caps for a payload type.
    pub fn pt_caps(&self, pt: u8) -> Option<String> {
        self.pt_caps.lock().get(&pt).cloned()
    }

    /// Subscribes to this stream's events (blocking notifications etc).
    pub fn subscribe_events(&self) -> broadcast::Receiver<StreamEvent> {
        self.events.subscribe()
    }

    /// Records the first observed packet on a blocking probe for
    /// `role`. No-op (returns `false`) if already recorded; otherwise
    /// records it and posts a `StreamBlocking` event (`true`).
    pub fn record_blocking(&self, role: Role, info: BlockingInfo) -> bool {
        let mut blocking = self.blocking.lock();
        let slot = match role {
            Role::Rtp => &mut blocking.rtp,
            Role::Rtcp => &mut blocking.rtcp,
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(info);
        drop(blocking);
        let _ = self.events.send(StreamEvent::Blocking { role, info });
        true
    }

    /// Clears recorded blocking state, e.g. after a seek unblocks and
    /// a fresh preroll is expected.
    pub fn clear_blocking(&self) {
        let mut blocking = self.blocking.lock();
        blocking.rtp = None;
        blocking.rtcp = None;
    }

    /// Returns the recorded blocking info for `role`, if any.
    pub fn blocking_info(&self, role: Role) -> Option<BlockingInfo> {
        let blocking = self.blocking.lock();
        match role {
            Role::Rtp => blocking.rtp,
            Role::Rtcp => blocking.rtcp,
        }
    }

    /// Arms a one-shot "drop probe" for `role`: the next buffer
    /// offered through [`RtpStream::next_output_buffer_should_drop`]
    /// is dropped and the probe disarms itself.
    pub fn arm_drop_probe(&self, role: Role) {
        self.blocking.lock().drop_armed[role_index(role)] = true;
    }

    /// Consumes the drop-probe arming for `role`, if any: returns
    /// `true` exactly once per [`RtpStream::arm_drop_probe`] call.
    pub fn next_output_buffer_should_drop(&self, role: Role) -> bool {
        let mut blocking = self.blocking.lock();
        let armed = &mut blocking.drop_armed[role_index(role)];
        if *armed {
            *armed = false;
            true
        } else {
            false
        }
    }

    /// Enables rate control (RTCP SR timestamping, sync on sinks).
    /// Disabling it switches the stream to ONVIF-style timestamps
    /// (§4.7 "Rates").
    pub fn set_rate_control(&self, enabled: bool) {
        self.rate_control.store(enabled, Ordering::SeqCst);
    }

    /// Current rate-control setting.
    pub fn rate_control(&self) -> bool {
        self.rate_control.load(Ordering::SeqCst)
    }

    /// Installs retransmission configuration (§4.4).
    pub fn enable_rtx(&self, config: RtxConfig) {
        *self.rtx.lock() = Some(config);
    }

    /// Current retransmission configuration, if enabled.
    pub fn rtx_config(&self) -> Option<RtxConfig> {
        self.rtx.lock().clone()
    }

    /// Installs ULPFEC configuration (§4.4).
    pub fn enable_fec(&self, config: FecConfig) {
        *self.fec.lock() = Some(config);
    }

    /// Current FEC configuration, if enabled.
    pub fn fec_config(&self) -> Option<FecConfig> {
        *self.fec.lock()
    }

    /// Enables or disables RTCP for this stream.
    pub fn set_enable_rtcp(&self, enabled: bool) {
        self.enable_rtcp.store(enabled, Ordering::SeqCst);
    }

    /// Whether RTCP is enabled.
    pub fn rtcp_enabled(&self) -> bool {
        self.enable_rtcp.load(Ordering::SeqCst)
    }

    /// Subscribes a UDP/multicast consumer to the RTP fan-out point
    /// (the TEE's queue leg in §4.4).
    pub fn subscribe_rtp(&self) -> broadcast::Receiver<RtpSample> {
        self.rtp_tee.subscribe()
    }

    /// Subscribes a consumer to the RTCP fan-out point.
    pub fn subscribe_rtcp(&self) -> broadcast::Receiver<RtpSample> {
        self.rtcp_tee.subscribe()
    }

    /// Enqueues a sample for delivery on `role`: broadcasts to any UDP
    /// subscribers and marks it pending for the TCP send core, waking
    /// the sender task.
    pub fn enqueue(&self, role: Role, sample: RtpSample, dts_90k: Option<i64>) {
        let tee = match role {
            Role::Rtp => &self.rtp_tee,
            Role::Rtcp => &self.rtcp_tee,
        };
        let _ = tee.send(sample.clone());
        self.send.pending.lock()[role_index(role)] = Some((sample, dts_90k));
        self.send.notify.notify_one();
    }

    /// Runs one iteration of the TCP send core's dispatch loop
    /// (§4.5): RTCP before RTP, pop the pending sample for each ready
    /// role, push it at every TCP transport (directly or into its
    /// backlog), then give every affected transport a chance to drain
    /// one backlog item now that the stream lock (here, just the
    /// pending-sample lock) has been released.
    pub fn dispatch_once(&self) {
        for role in [Role::Rtcp, Role::Rtp] {
            let popped = self.send.pending.lock()[role_index(role)].take();
            let Some((sample, dts_90k)) = popped else {
                continue;
            };
            let (_, transports) = self.transports.snapshot();
            for sink in &transports {
                if !sink.is_tcp() {
                    continue;
                }
                if sink.deliver(role, sample.clone(), dts_90k).is_err() {
                    warn!(
                        "stream {}: transport {} overflowed, dropping",
                        self.index,
                        sink.sink_id()
                    );
                    self.transports.remove(sink.sink_id());
                }
            }
            let (_, transports) = self.transports.snapshot();
            for sink in &transports {
                if sink.is_tcp() {
                    sink.drain_one_if_clear(role);
                }
            }
        }
    }

    /// Spawns the dedicated sender task described in §4.5, looping
    /// until [`RtpStream::stop_sending`] is called.
    pub fn spawn_send_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let stream = self.clone();
        tokio::spawn(async move {
            while stream.send.continue_sending.load(Ordering::SeqCst) {
                stream.send.notify.notified().await;
                if !stream.send.continue_sending.load(Ordering::SeqCst) {
                    break;
                }
                stream.dispatch_once();
            }
        })
    }

    /// Cancels the sender task: toggles `continue_sending` and wakes
    /// it so it observes the flag and exits (§5 cancellation).
    pub fn stop_sending(&self) {
        self.send.continue_sending.store(false, Ordering::SeqCst);
        self.send.send_cookie.fetch_add(1, Ordering::SeqCst);
        self.send.notify.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::rtp::srtp::NullCipher;
    use std::sync::atomic::AtomicU32;

    fn make_stream() -> Arc<RtpStream> {
        Arc::new(RtpStream::new(
            0,
            vec![RtpProfile::Avp, RtpProfile::Savp],
            vec![LowerTransport::Udp, LowerTransport::UdpMulticast, LowerTransport::Tcp],
            Arc::new(NullCipher),
        ))
    }

    #[test]
    fn validates_allowed_profile_and_transport() {
        let stream = make_stream();
        assert!(stream
            .validate_transport_request(RtpProfile::Avp, LowerTransport::Tcp)
            .is_ok());
        assert!(matches!(
            stream.validate_transport_request(RtpProfile::Avpf, LowerTransport::Tcp),
            Err(RtpError::UnsupportedProfile)
        ));
    }

    #[test]
    fn transport_list_cookie_increments_by_two_on_add_remove() {
        struct FakeSink(u64);
        impl StreamTransportSink for FakeSink {
            fn sink_id(&self) -> u64 {
                self.0
            }
            fn is_tcp(&self) -> bool {
                true
            }
            fn deliver(&self, _: Role, _: RtpSample, _: Option<i64>) -> Result<(), TransportOverflow> {
                Ok(())
            }
            fn drain_one_if_clear(&self, _: Role) {}
        }

        let list = TransportList::default();
        let start_cookie = list.cookie();
        list.add(Arc::new(FakeSink(1)));
        list.remove(1);
        assert_eq!(list.cookie(), start_cookie + 2);
        assert_eq!(list.len(), 0);
    }

    #[test]
    fn blocking_probe_fires_once() {
        let stream = make_stream();
        let info = BlockingInfo {
            seqnum: 10,
            rtptime: 1000,
            running_time_ns: 0,
            clock_rate: 90000,
        };
        assert!(stream.record_blocking(Role::Rtp, info));
        assert!(!stream.record_blocking(Role::Rtp, info));
        assert_eq!(stream.blocking_info(Role::Rtp).unwrap().seqnum, 10);
    }

    #[test]
    fn drop_probe_fires_exactly_once() {
        let stream = make_stream();
        assert!(!stream.next_output_buffer_should_drop(Role::Rtp));
        stream.arm_drop_probe(Role::Rtp);
        assert!(stream.next_output_buffer_should_drop(Role::Rtp));
        assert!(!stream.next_output_buffer_should_drop(Role::Rtp));
    }

    #[tokio::test]
    async fn dispatch_prioritises_rtcp_before_rtp() {
        let stream = make_stream();
        let order = Arc::new(Mutex::new(Vec::new()));

        struct RecordingSink {
            id: u64,
            order: Arc<Mutex<Vec<Role>>>,
            delivered: AtomicU32,
        }
        impl StreamTransportSink for RecordingSink {
            fn sink_id(&self) -> u64 {
                self.id
            }
            fn is_tcp(&self) -> bool {
                true
            }
            fn deliver(&self, role: Role, _: RtpSample, _: Option<i64>) -> Result<(), TransportOverflow> {
                self.order.lock().push(role);
                self.delivered.fetch_add(1, Ordering::SeqCst);
                Ok(())
            }
            fn drain_one_if_clear(&self, _: Role) {}
        }

        stream.transports.add(Arc::new(RecordingSink {
            id: 1,
            order: order.clone(),
            delivered: AtomicU32::new(0),
        }));

        stream.enqueue(Role::Rtp, RtpSample::Single(Bytes::from_static(b"rtp")), Some(0));
        stream.enqueue(Role::Rtcp, RtpSample::Single(Bytes::from_static(b"rtcp")), None);
        stream.dispatch_once();

        let order = order.lock().clone();
        assert_eq!(order, vec![Role::Rtcp, Role::Rtp]);
    }
}
