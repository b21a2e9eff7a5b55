//! Address pool: allocates RTP/RTCP port pairs out of a configured
//! range, refcounted with copy-on-acquire semantics so a pool entry
//! stays reserved as long as any clone of its handle is alive.

use log::warn;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised while allocating from an [`AddressPool`].
#[derive(Debug, Error)]
pub enum AddressPoolError {
    /// No even/odd port pair was free in the configured range.
    #[error("address pool exhausted")]
    Exhausted,
    /// Caller asked for an odd port as the RTP (even) half of a pair.
    #[error("requested RTP port {0} is odd, even port required")]
    OddPort(u16),
    /// The requested port lies outside the pool's configured range.
    #[error("port {0} outside pool range {1}-{2}")]
    OutOfRange(u16, u16, u16),
}

/// IP address family a pool entry was allocated for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4.
    V4,
    /// IPv6.
    V6,
}

/// Unicast or multicast allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// Unicast allocation; the server's own address is used.
    Unicast,
    /// Multicast allocation; `multicast_address` supplies the group.
    Multicast,
}

/// Flags describing the kind of port pair a caller needs, mirroring
/// the `{EVEN_PORT, MULTICAST|UNICAST, IPV4|IPV6}` flag set in §4.4.
#[derive(Debug, Clone, Copy)]
pub struct AddressPoolFlags {
    /// Family the returned address should belong to.
    pub family: AddressFamily,
    /// Unicast or multicast.
    pub cast: CastKind,
}

/// A port pair handed out by the pool: an even RTP port and the next
/// odd RTCP port. Dropping the last clone releases the pool slot.
#[derive(Clone)]
pub struct PooledAddress {
    inner: Arc<PooledAddressInner>,
}

struct PooledAddressInner {
    pool: Arc<Inner>,
    rtp_port: u16,
    family: AddressFamily,
    cast: CastKind,
}

impl Drop for PooledAddressInner {
    fn drop(&mut self) {
        self.pool.release(self.rtp_port);
    }
}

impl PooledAddress {
    /// The even RTP port.
    pub fn rtp_port(&self) -> u16 {
        self.inner.rtp_port
    }

    /// The RTCP port, always `rtp_port + 1`.
    pub fn rtcp_port(&self) -> u16 {
        self.inner.rtp_port + 1
    }

    /// The family this pair was allocated for.
    pub fn family(&self) -> AddressFamily {
        self.inner.family
    }

    /// Unicast or multicast.
    pub fn cast(&self) -> CastKind {
        self.inner.cast
    }
}

impl std::fmt::Debug for PooledAddress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledAddress")
            .field("rtp_port", &self.rtp_port())
            .field("rtcp_port", &self.rtcp_port())
            .field("family", &self.family())
            .field("cast", &self.cast())
            .finish()
    }
}

struct Inner {
    min_port: u16,
    max_port: u16,
    refcounts: Mutex<HashMap<u16, u32>>,
}

impl Inner {
    fn release(&self, rtp_port: u16) {
        let mut refcounts = self.refcounts.lock();
        if let Some(count) = refcounts.get_mut(&rtp_port) {
            *count -= 1;
            if *count == 0 {
                refcounts.remove(&rtp_port);
            }
        }
    }
}

/// A shared, process-wide port allocator. Per design note §9, this is
/// an explicitly injected service rather than a singleton: construct
/// one and hand clones of the `Arc` to whichever `RtpStream`s need it.
#[derive(Clone)]
pub struct AddressPool {
    inner: Arc<Inner>,
    multicast_address_v4: Option<IpAddr>,
    multicast_address_v6: Option<IpAddr>,
    next_hint: Arc<Mutex<u16>>,
}

impl AddressPool {
    /// Creates a pool handing out even RTP ports in `[min_port,
    /// max_port]` (inclusive; `max_port` must be even or the last odd
    /// port is simply unusable as an RTP port).
    pub fn new(min_port: u16, max_port: u16) -> Self {
        let min_port = min_port + (min_port % 2);
        Self {
            inner: Arc::new(Inner {
                min_port,
                max_port,
                refcounts: Mutex::new(HashMap::new()),
            }),
            multicast_address_v4: None,
            multicast_address_v6: None,
            next_hint: Arc::new(Mutex::new(min_port)),
        }
    }

    /// Attaches the multicast group address used for a given family.
    pub fn with_multicast_address(mut self, family: AddressFamily, addr: IpAddr) -> Self {
        match family {
            AddressFamily::V4 => self.multicast_address_v4 = Some(addr),
            AddressFamily::V6 => self.multicast_address_v6 = Some(addr),
        }
        self
    }

    /// Returns the configured multicast group address for `family`, if any.
    pub fn multicast_address(&self, family: AddressFamily) -> Option<IpAddr> {
        match family {
            AddressFamily::V4 => self.multicast_address_v4,
            AddressFamily::V6 => self.multicast_address_v6,
        }
    }

    /// Acquires an even RTP port plus the next odd RTCP port matching
    /// `flags`. Scans forward from a rotating hint so repeated calls
    /// spread allocations across the range rather than always
    /// restarting at `min_port`.
    pub fn acquire(&self, flags: AddressPoolFlags) -> Result<PooledAddress, AddressPoolError> {
        let mut refcounts = self.inner.refcounts.lock();
        let mut hint = self.next_hint.lock();

        let span = (self.inner.max_port - self.inner.min_port) / 2 + 1;
        for step in 0..span {
            let candidate = self.inner.min_port + ((*hint - self.inner.min_port) / 2 + step) % span * 2;
            if candidate >= self.inner.max_port {
                continue;
            }
            let free = !refcounts.contains_key(&candidate) && !refcounts.contains_key(&(candidate + 1));
            if free {
                refcounts.insert(candidate, 1);
                *hint = candidate + 2;
                return Ok(PooledAddress {
                    inner: Arc::new(PooledAddressInner {
                        pool: self.inner.clone(),
                        rtp_port: candidate,
                        family: flags.family,
                        cast: flags.cast,
                    }),
                });
            }
        }
        warn!(
            "address pool: exhausted scanning {}-{}",
            self.inner.min_port, self.inner.max_port
        );
        Err(AddressPoolError::Exhausted)
    }

    /// Reserves a caller-specified RTP port (must be even, must lie
    /// in range). Used when a client requests a specific port pair.
    pub fn acquire_port(
        &self,
        rtp_port: u16,
        flags: AddressPoolFlags,
    ) -> Result<PooledAddress, AddressPoolError> {
        if rtp_port % 2 != 0 {
            return Err(AddressPoolError::OddPort(rtp_port));
        }
        if rtp_port < self.inner.min_port || rtp_port + 1 > self.inner.max_port {
            return Err(AddressPoolError::OutOfRange(
                rtp_port,
                self.inner.min_port,
                self.inner.max_port,
            ));
        }
        let mut refcounts = self.inner.refcounts.lock();
        if refcounts.contains_key(&rtp_port) || refcounts.contains_key(&(rtp_port + 1)) {
            return Err(AddressPoolError::Exhausted);
        }
        refcounts.insert(rtp_port, 1);
        Ok(PooledAddress {
            inner: Arc::new(PooledAddressInner {
                pool: self.inner.clone(),
                rtp_port,
                family: flags.family,
                cast: flags.cast,
            }),
        })
    }

    /// Port range this pool was constructed with.
    pub fn range(&self) -> (u16, u16) {
        (self.inner.min_port, self.inner.max_port)
    }
}
