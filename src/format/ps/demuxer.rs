//! Program stream demultiplexer: drives the PES filter, recognises
//! pack/system/program-stream-map headers, tracks the System Clock
//! Reference and its byte rate, and exposes seek and duration.

use super::byte_adapter::ByteAdapter;
use super::pes_filter::{ParseOutcome as PesOutcome, PesFilter};
use super::types::{
    self, ElementaryType, ProgramStreamMap, AC3_REMAP_STREAM_ID, AC3_SYNC_WORD,
};
use crate::av::Packet;
use bytes::Bytes;
use log::{debug, warn};
use std::collections::HashMap;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncSeek, AsyncSeekExt};

/// Errors raised by [`PsDemuxer`] that are exceptional enough to
/// propagate as `Result::Err` rather than being absorbed as an
/// internal resync. The byte-level parser itself never throws (it
/// reports `OK` / `NeedMoreData` / `LostSync` / `Eos` through
/// [`PesOutcome`]); `PsError` covers the layer above that: I/O
/// failures and the seek algorithm's own bounds.
#[derive(Debug, Error)]
pub enum PsError {
    /// Underlying reader failed.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// The stream ended before a seek target's SCR bounds could be
    /// established.
    #[error("end of stream while seeking")]
    SeekEos,
    /// Seek recursion exceeded the 100-step bound in §4.3.
    #[error("seek recursion depth exceeded")]
    SeekRecursionExceeded,
    /// `seek` was called before `first_scr`/`last_scr` are known and
    /// the stream is not seekable (e.g. SCR rate denominator is
    /// zero).
    #[error("stream is not seekable")]
    NotSeekable,
}

type Result<T> = std::result::Result<T, PsError>;

/// Per-elementary-stream bookkeeping (§3 PSDemux state, per-stream
/// records).
#[derive(Debug, Clone)]
pub struct StreamRecord {
    /// Resolved elementary type.
    pub elementary_type: ElementaryType,
    /// Last delivered timestamp in nanoseconds, if any.
    pub last_timestamp: Option<u64>,
    /// One-shot discontinuity flag, set after a resync or SCR
    /// discontinuity and cleared on the next delivered packet.
    pub discontinuity: bool,
    /// Whether this stream still needs its initial segment event
    /// (first packet after creation or after a seek).
    pub needs_segment: bool,
}

impl StreamRecord {
    fn new(elementary_type: ElementaryType) -> Self {
        Self {
            elementary_type,
            last_timestamp: None,
            discontinuity: false,
            needs_segment: true,
        }
    }
}

/// A minimal MSB-first bit cursor over a byte slice, used only for
/// the pack/system header's non-byte-aligned fields. The PES filter
/// uses direct byte masking instead because its fields happen to be
/// byte-aligned once timestamps are isolated; pack headers are not.
struct BitCursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> BitCursor<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn read(&mut self, n: u32) -> Option<u64> {
        let mut out = 0u64;
        for _ in 0..n {
            let byte_idx = self.pos / 8;
            if byte_idx >= self.data.len() {
                return None;
            }
            let bit_idx = 7 - (self.pos % 8);
            let bit = (self.data[byte_idx] >> bit_idx) & 1;
            out = (out << 1) | bit as u64;
            self.pos += 1;
        }
        Some(out)
    }

    fn expect_marker(&mut self) -> Option<()> {
        if self.read(1)? == 1 {
            Some(())
        } else {
            None
        }
    }
}

/// A parsed pack header (§4.3): SCR in 90 kHz ticks, mux rate in
/// bytes/second, and whether the MPEG-2 discriminator was set.
#[derive(Debug, Clone, Copy, PartialEq)]
struct PackHeader {
    scr: u64,
    mux_rate: u32,
    mpeg2: bool,
    total_len: usize,
}

fn parse_pack_header(buf: &[u8]) -> Option<PackHeader> {
    let disc = buf.get(4)?;
    if disc & 0xC0 == 0x40 {
        if buf.len() < 14 {
            return None;
        }
        let mut c = BitCursor::new(&buf[4..14]);
        c.read(2)?; // '01' discriminator, already matched above
        let top = c.read(3)?;
        c.expect_marker()?;
        let mid = c.read(15)?;
        c.expect_marker()?;
        let low = c.read(15)?;
        c.expect_marker()?;
        let ext = c.read(9)?;
        c.expect_marker()?;
        let mux_rate = c.read(22)?;
        c.expect_marker()?;
        c.expect_marker()?;
        c.read(5)?; // reserved
        let stuffing_len = c.read(3)? as usize;
        let base = (top << 30) | (mid << 15) | low;
        let scr = (base.saturating_mul(300) + (ext % 300)) / 300;
        Some(PackHeader {
            scr,
            mux_rate: mux_rate as u32,
            mpeg2: true,
            total_len: 14 + stuffing_len,
        })
    } else if disc & 0xF0 == 0x20 {
        if buf.len() < 12 {
            return None;
        }
        let mut c = BitCursor::new(&buf[4..12]);
        c.read(4)?; // '0010' discriminator
        let top = c.read(3)?;
        c.expect_marker()?;
        let mid = c.read(15)?;
        c.expect_marker()?;
        let low = c.read(15)?;
        c.expect_marker()?;
        let mux_rate = c.read(22)?;
        c.expect_marker()?;
        let scr = (top << 30) | (mid << 15) | low;
        Some(PackHeader {
            scr,
            mux_rate: mux_rate as u32,
            mpeg2: false,
            total_len: 12,
        })
    } else {
        None
    }
}

/// One 90 kHz tick's worth of byte rate, derived from two (SCR, byte
/// offset) samples. Zero denominator means "not yet known".
#[derive(Debug, Clone, Copy, Default)]
pub struct ScrRate {
    /// Numerator: bytes.
    pub n: u64,
    /// Denominator: 90 kHz ticks.
    pub d: u64,
}

impl ScrRate {
    /// Converts a tick delta to a byte delta using this rate.
    pub fn bytes_for_ticks(&self, ticks: u64) -> u64 {
        if self.d == 0 {
            return 0;
        }
        // 128-bit intermediate to avoid overflow on long streams.
        ((ticks as u128 * self.n as u128) / self.d as u128) as u64
    }
}

/// Program stream demultiplexer (§3/§4.3).
pub struct PsDemuxer<R> {
    reader: R,
    adapter: ByteAdapter,
    filter: PesFilter,
    psm: ProgramStreamMap,
    streams: HashMap<u8, StreamRecord>,

    first_scr: Option<i64>,
    last_scr: Option<i64>,
    current_scr: Option<i64>,
    scr_adjust: i64,
    first_scr_offset: Option<u64>,
    last_scr_offset: Option<u64>,
    scr_rate: ScrRate,
    mux_rate: Option<u32>,
    bytes_since_scr: u64,
    base_time_ns: u64,
    mpeg2_pack: bool,
    eos: bool,
    /// Duration estimate refined as more SCR samples arrive (§10
    /// supplement).
    duration_estimate_ns: Option<u64>,
    duration_refined: bool,
}

impl<R> PsDemuxer<R> {
    fn note_scr(&mut self, scr: u64, byte_offset: u64) {
        let scr = scr as i64;
        let adjusted = scr + self.scr_adjust;

        if let Some(current) = self.current_scr {
            let delta = (adjusted - current).abs();
            if delta > types::SCR_DISCONTINUITY_THRESHOLD {
                // Install a new offset so future SCRs stay monotonic;
                // do not fold this sample into the rate estimate.
                self.scr_adjust += current - scr;
                self.current_scr = Some(current);
                for s in self.streams.values_mut() {
                    s.discontinuity = true;
                }
                return;
            }
        }

        self.current_scr = Some(adjusted);
        if self.first_scr.is_none() {
            self.first_scr = Some(adjusted);
            self.first_scr_offset = Some(byte_offset);
        }
        self.last_scr = Some(adjusted);
        self.last_scr_offset = Some(byte_offset);

        if let (Some(first), Some(first_off)) = (self.first_scr, self.first_scr_offset) {
            if adjusted > first && byte_offset > first_off {
                self.scr_rate = ScrRate {
                    n: byte_offset - first_off,
                    d: (adjusted - first) as u64,
                };
                let elapsed_ticks = (adjusted - first) as u64;
                self.duration_estimate_ns = Some(types::ticks_to_ns(elapsed_ticks));
            }
        }
    }

    /// Currently known SCR byte rate (bytes per 90 kHz tick).
    pub fn scr_rate(&self) -> ScrRate {
        self.scr_rate
    }

    /// Best-effort duration estimate derived from the SCR samples
    /// seen so far; `is_refined` (paired accessor) distinguishes a
    /// running estimate from one derived from a full forward/backward
    /// SCR scan during `seek`.
    pub fn duration_estimate(&self) -> Option<u64> {
        self.duration_estimate_ns
    }

    /// Whether `duration_estimate` reflects a full SCR scan rather
    /// than an in-flight running estimate.
    pub fn duration_is_refined(&self) -> bool {
        self.duration_refined
    }

    /// Streams discovered so far, keyed by 8-bit stream id.
    pub fn streams(&self) -> &HashMap<u8, StreamRecord> {
        &self.streams
    }

    fn resolve_stream_id(&mut self, stream_id: u8, data: &Bytes) -> u8 {
        if stream_id == (types::START_CODE_PRIVATE_STREAM_1 & 0xFF) as u8
            && data.len() >= 2
            && u16::from_be_bytes([data[0], data[1]]) == AC3_SYNC_WORD
        {
            return AC3_REMAP_STREAM_ID;
        }
        stream_id
    }
}

impl<R: AsyncRead + Unpin + Send> PsDemuxer<R> {
    /// Creates a demuxer reading from `reader`, with all parser state
    /// at its post-construction defaults (§3 Lifecycles).
    pub fn new(reader: R) -> Self {
        Self {
            reader,
            adapter: ByteAdapter::new(),
            filter: PesFilter::new(),
            psm: ProgramStreamMap::new(),
            streams: HashMap::new(),
            first_scr: None,
            last_scr: None,
            current_scr: None,
            scr_adjust: 0,
            first_scr_offset: None,
            last_scr_offset: None,
            scr_rate: ScrRate::default(),
            mux_rate: None,
            bytes_since_scr: 0,
            base_time_ns: 0,
            mpeg2_pack: false,
            eos: false,
            duration_estimate_ns: None,
            duration_refined: false,
        }
    }

    async fn fill_at_least(&mut self, n: usize) -> Result<bool> {
        let mut buf = vec![0u8; 4096];
        while self.adapter.available() < n {
            let read = self.reader.read(&mut buf).await?;
            if read == 0 {
                return Ok(false);
            }
            self.adapter.append(Bytes::copy_from_slice(&buf[..read]));
            self.bytes_since_scr += read as u64;
        }
        Ok(true)
    }

    /// Top-level resync (§4.3): scan for the 4-byte `00 00 01 xx`
    /// prefix, discarding skipped bytes (forward playback).
    async fn resync(&mut self) -> Result<()> {
        loop {
            if !self.fill_at_least(4).await? {
                return Err(PsError::SeekEos);
            }
            let avail = self.adapter.available();
            let buf = self.adapter.map(avail).unwrap();
            let mut found = None;
            if avail >= 4 {
                for i in 0..=avail - 4 {
                    if buf[i] == 0x00 && buf[i + 1] == 0x00 && buf[i + 2] == 0x01 {
                        found = Some(i);
                        break;
                    }
                }
            }
            match found {
                Some(pos) => {
                    debug!("ps demuxer: resync found start code after skipping {} bytes", pos);
                    self.adapter.flush(pos);
                    return Ok(());
                }
                None => {
                    let keep = 3.min(avail);
                    self.adapter.flush(avail - keep);
                }
            }
        }
    }

    async fn parse_pack(&mut self) -> Result<()> {
        loop {
            if !self.fill_at_least(14).await? {
                // may still be a (shorter) MPEG-1 header or truncated tail
                if !self.fill_at_least(12).await? {
                    return Err(PsError::SeekEos);
                }
            }
            let buf = self.adapter.map(self.adapter.available()).unwrap();
            match parse_pack_header(&buf) {
                Some(hdr) => {
                    if self.adapter.available() < hdr.total_len {
                        if !self.fill_at_least(hdr.total_len).await? {
                            return Err(PsError::SeekEos);
                        }
                        continue;
                    }
                    let offset = self.adapter.source_offset();
                    self.mpeg2_pack = hdr.mpeg2;
                    self.psm.note_mpeg2_pack(hdr.mpeg2);
                    if hdr.mux_rate != 0 {
                        self.mux_rate = Some(hdr.mux_rate.saturating_mul(50));
                    }
                    self.adapter.flush(hdr.total_len);
                    self.note_scr(hdr.scr, offset);
                    return Ok(());
                }
                None => {
                    self.adapter.flush(4);
                    return Ok(());
                }
            }
        }
    }

    async fn parse_system_header(&mut self) -> Result<()> {
        if !self.fill_at_least(6).await? {
            return Err(PsError::SeekEos);
        }
        let buf = self.adapter.map(6).unwrap();
        let len = u16::from_be_bytes([buf[4], buf[5]]) as usize;
        let total = 6 + len;
        if !self.fill_at_least(total).await? {
            return Err(PsError::SeekEos);
        }
        // Advisory content only; validated and discarded.
        self.adapter.flush(total);
        Ok(())
    }

    fn apply_program_stream_map(&mut self, data: &[u8]) {
        // ISO/IEC 13818-1 program_stream_map: a 2-byte
        // program_stream_map_length occurs after a handful of flag
        // bits, followed by elementary_stream_map_length and
        // (stream_type, elementary_stream_id) pairs, each followed by
        // a 2-byte per-entry info length. We only need the
        // (stream_id -> stream_type) pairs.
        if data.len() < 6 {
            return;
        }
        let psm_len = u16::from_be_bytes([data[2], data[3]]) as usize;
        if data.len() < 4 + psm_len || psm_len < 2 {
            return;
        }
        let es_map_len = u16::from_be_bytes([data[4], data[5]]) as usize;
        let mut i = 6usize;
        let end = (6 + es_map_len).min(data.len());
        while i + 4 <= end {
            let stream_type = data[i];
            let elementary_stream_id = data[i + 1];
            let info_len = u16::from_be_bytes([data[i + 2], data[i + 3]]) as usize;
            self.psm
                .set(elementary_stream_id, ElementaryType::PsmDeclared(stream_type));
            i += 4 + info_len;
        }
    }

    /// Reads and returns the next elementary-stream packet, driving
    /// pack/system/PSM parsing and PES filtering as needed, resyncing
    /// on `LostSync` until a packet is produced or the stream ends.
    pub async fn read_packet(&mut self) -> Result<Option<Packet>> {
        if self.eos {
            return Ok(None);
        }
        loop {
            if !self.fill_at_least(4).await? {
                self.eos = true;
                return Ok(None);
            }
            let head = self.adapter.map(4).unwrap();
            let code = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);

            if code == types::START_CODE_PACK {
                self.parse_pack().await?;
                continue;
            }
            if code == types::START_CODE_SYSTEM_HEADER {
                self.parse_system_header().await?;
                continue;
            }
            if code == types::START_CODE_END {
                self.adapter.flush(4);
                self.eos = true;
                return Ok(None);
            }

            loop {
                match self.filter.process(&mut self.adapter) {
                    PesOutcome::NeedMoreData => {
                        if !self.fill_at_least(self.adapter.available() + 1).await? {
                            self.eos = true;
                            return Ok(None);
                        }
                    }
                    PesOutcome::LostSync => {
                        warn!("ps demuxer: lost sync at offset {}, resyncing", self.adapter.source_offset());
                        self.resync().await?;
                        break;
                    }
                    PesOutcome::Eos => {
                        self.eos = true;
                        return Ok(None);
                    }
                    PesOutcome::Skipped { .. } => {
                        // Padding stream: nothing to deliver, keep going.
                    }
                    PesOutcome::Delivered {
                        stream_id,
                        pts,
                        dts,
                        data,
                        is_first,
                    } => {
                        if stream_id == (types::START_CODE_PROGRAM_STREAM_MAP & 0xFF) as u8 {
                            self.apply_program_stream_map(&data);
                            continue;
                        }
                        let resolved_id = self.resolve_stream_id(stream_id, &data);
                        let is_new = !self.streams.contains_key(&resolved_id);
                        if is_new {
                            let ty = self.psm.get(resolved_id);
                            self.streams.insert(resolved_id, StreamRecord::new(ty));
                        }
                        let record = self.streams.get_mut(&resolved_id).unwrap();

                        let pts_ns = pts.map(|t| types::ticks_to_ns(t as u64));
                        let dts_ns = dts.map(|t| types::ticks_to_ns(t as u64));
                        if is_first {
                            if let Some(ts) = dts_ns.or(pts_ns) {
                                record.last_timestamp = Some(ts);
                            }
                        }

                        let mut packet = Packet::new(data).with_stream_index(resolved_id as usize);
                        if let Some(pts_ns) = pts_ns {
                            packet = packet.with_pts(pts_ns as i64);
                        }
                        if let Some(dts_ns) = dts_ns {
                            packet = packet.with_dts(dts_ns as i64);
                        }
                        if record.discontinuity {
                            record.discontinuity = false;
                        }
                        record.needs_segment = false;
                        return Ok(Some(packet));
                    }
                }
            }
        }
    }
}

impl<R: AsyncRead + AsyncSeek + Unpin + Send> PsDemuxer<R> {
    /// Scans forward from `start` for the first pack header's SCR,
    /// up to a 4 MiB cap, without disturbing demuxer state otherwise.
    async fn scan_scr_forward(&mut self, start: u64, cap: u64) -> Result<Option<(u64, u64)>> {
        self.reader.seek(std::io::SeekFrom::Start(start)).await?;
        self.adapter = ByteAdapter::with_source_offset(start);
        let mut scanned = 0u64;
        loop {
            if scanned > cap {
                return Ok(None);
            }
            if !self.fill_at_least(4).await? {
                return Ok(None);
            }
            let head = self.adapter.map(4).unwrap();
            let code = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);
            if code == types::START_CODE_PACK {
                if !self.fill_at_least(14).await? {
                    return Ok(None);
                }
                let buf = self.adapter.map(self.adapter.available()).unwrap();
                if let Some(hdr) = parse_pack_header(&buf) {
                    let off = self.adapter.source_offset();
                    return Ok(Some((hdr.scr, off)));
                }
            }
            scanned += 1;
            self.adapter.flush(1);
        }
    }

    /// Seek algorithm (§4.3 pull mode): interpolates a byte offset
    /// for `target_ticks` (90 kHz), confirms by scanning, and
    /// recurses with tightened bounds up to 100 times.
    pub async fn seek(&mut self, target_ticks: u64, stream_len: u64) -> Result<()> {
        const BLOCK_SZ: u64 = 32 * 1024;
        const SCAN_CAP: u64 = 4 * 1024 * 1024;
        const MAX_RECURSION: u32 = 100;

        if self.first_scr.is_none() || self.last_scr.is_none() {
            let first = self.scan_scr_forward(0, SCAN_CAP).await?;
            let last = self.scan_scr_backward(stream_len, SCAN_CAP).await?;
            match (first, last) {
                (Some((fscr, foff)), Some((lscr, loff))) if lscr > fscr && loff > foff => {
                    self.first_scr = Some(fscr as i64);
                    self.first_scr_offset = Some(foff);
                    self.last_scr = Some(lscr as i64);
                    self.last_scr_offset = Some(loff);
                    self.scr_rate = ScrRate {
                        n: loff - foff,
                        d: (lscr - fscr),
                    };
                    self.duration_refined = true;
                    self.duration_estimate_ns = Some(types::ticks_to_ns(lscr - fscr));
                }
                _ => return Err(PsError::NotSeekable),
            }
        }
        if self.scr_rate.d == 0 {
            return Err(PsError::NotSeekable);
        }

        let first_scr = self.first_scr.unwrap() as u64;
        let first_off = self.first_scr_offset.unwrap();
        let mut lo = first_off;
        let mut hi = stream_len;
        let mut depth = 0u32;

        loop {
            if depth >= MAX_RECURSION {
                return Err(PsError::SeekRecursionExceeded);
            }
            depth += 1;

            let delta_ticks = target_ticks.saturating_sub(first_scr);
            let interpolated = first_off + self.scr_rate.bytes_for_ticks(delta_ticks);
            let candidate = interpolated.clamp(lo, hi);

            let found = self.scan_scr_forward(candidate, SCAN_CAP).await?;
            match found {
                Some((scr, off)) if scr >= target_ticks || off + BLOCK_SZ >= hi => {
                    self.finish_seek(off).await?;
                    return Ok(());
                }
                Some((scr, off)) if scr < target_ticks => {
                    lo = off;
                    continue;
                }
                _ => {
                    hi = candidate;
                    continue;
                }
            }
        }
    }

    async fn scan_scr_backward(&mut self, end: u64, cap: u64) -> Result<Option<(u64, u64)>> {
        let start = end.saturating_sub(cap);
        self.scan_scr_forward(start, cap).await
    }

    async fn finish_seek(&mut self, byte_offset: u64) -> Result<()> {
        self.reader
            .seek(std::io::SeekFrom::Start(byte_offset))
            .await?;
        self.adapter = ByteAdapter::with_source_offset(byte_offset);
        self.filter.reset();
        self.eos = false;
        for s in self.streams.values_mut() {
            s.needs_segment = true;
            s.discontinuity = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn mpeg2_pack_bytes(scr_base: u64, scr_ext: u16, mux_rate: u32) -> Vec<u8> {
        let mut bits: Vec<u8> = Vec::new();
        // Build the 80-bit field by hand using a simple bit writer.
        struct BitWriter {
            bytes: Vec<u8>,
            cur: u8,
            nbits: u8,
        }
        impl BitWriter {
            fn new() -> Self {
                Self { bytes: Vec::new(), cur: 0, nbits: 0 }
            }
            fn push(&mut self, value: u64, n: u8) {
                for i in (0..n).rev() {
                    let bit = ((value >> i) & 1) as u8;
                    self.cur = (self.cur << 1) | bit;
                    self.nbits += 1;
                    if self.nbits == 8 {
                        self.bytes.push(self.cur);
                        self.cur = 0;
                        self.nbits = 0;
                    }
                }
            }
            fn finish(mut self) -> Vec<u8> {
                if self.nbits > 0 {
                    self.cur <<= 8 - self.nbits;
                    self.bytes.push(self.cur);
                }
                self.bytes
            }
        }
        let mut w = BitWriter::new();
        w.push(0b01, 2);
        w.push((scr_base >> 30) & 0x7, 3);
        w.push(1, 1);
        w.push((scr_base >> 15) & 0x7FFF, 15);
        w.push(1, 1);
        w.push(scr_base & 0x7FFF, 15);
        w.push(1, 1);
        w.push(scr_ext as u64, 9);
        w.push(1, 1);
        w.push(mux_rate as u64, 22);
        w.push(1, 1);
        w.push(1, 1);
        w.push(0, 5);
        w.push(0, 3); // no stuffing bytes
        bits.extend(w.finish());
        assert_eq!(bits.len(), 10);
        bits
    }

    fn pack_header(scr: u64, mux_rate: u32) -> Vec<u8> {
        let mut v = vec![0x00, 0x00, 0x01, 0xBA];
        v.extend(mpeg2_pack_bytes(scr, 0, mux_rate));
        v
    }

    #[tokio::test]
    async fn smallest_ps_stream_scenario_a() {
        let mut data = pack_header(0, 2000);
        // PES id=0xE0, length=0 (unbounded), no PTS/DTS, 8 bytes payload.
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"DEADBEEF");

        let mut demux = PsDemuxer::new(Cursor::new(data));
        let packet = demux.read_packet().await.unwrap().expect("one packet");
        assert_eq!(packet.stream_index, 0xE0);
        assert_eq!(&packet.data[..], b"DEADBEEF");
        assert_eq!(packet.pts, None);
        assert_eq!(packet.dts, None);

        let streams = demux.streams();
        assert_eq!(streams.get(&0xE0).unwrap().elementary_type, ElementaryType::Mpeg2Video);
    }

    #[tokio::test]
    async fn ac3_sync_word_remaps_private_stream_1_to_0x80() {
        let mut data = pack_header(0, 2000);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xBD, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(&[0x0B, 0x77, 0x01, 0x02]);

        let mut demux = PsDemuxer::new(Cursor::new(data));
        let packet = demux.read_packet().await.unwrap().expect("one packet");
        assert_eq!(packet.stream_index, 0x80);
    }

    #[tokio::test]
    async fn program_stream_map_does_not_surface_as_a_packet() {
        let mut data = pack_header(0, 2000);
        // program_stream_map with one entry: stream_type=0x02 (video), id=0xE0
        let psm_body: Vec<u8> = vec![
            0x00, 0x00, // reserved/flags (2 bytes) + will be covered by psm_len below
        ];
        let _ = psm_body;
        let es_entries = vec![0x02u8, 0xE0, 0x00, 0x00];
        let es_map_len = es_entries.len() as u16;
        let mut psm_payload = vec![0x00u8, 0x00]; // reserved + flags word (2 bytes, unused by our parser)
        let psm_len_placeholder_idx = psm_payload.len();
        psm_payload.extend_from_slice(&[0, 0]); // program_stream_map_length placeholder
        psm_payload.extend_from_slice(&es_map_len.to_be_bytes());
        psm_payload.extend_from_slice(&es_entries);
        psm_payload.extend_from_slice(&[0, 0, 0, 0]); // CRC32 placeholder
        let psm_len = (psm_payload.len() - psm_len_placeholder_idx - 2) as u16;
        psm_payload[psm_len_placeholder_idx..psm_len_placeholder_idx + 2]
            .copy_from_slice(&psm_len.to_be_bytes());

        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xBC]);
        data.extend_from_slice(&(psm_payload.len() as u16).to_be_bytes());
        data.extend_from_slice(&psm_payload);

        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"12345678");

        let mut demux = PsDemuxer::new(Cursor::new(data));
        let packet = demux.read_packet().await.unwrap().expect("one packet");
        assert_eq!(packet.stream_index, 0xE0);
        assert_eq!(
            demux.streams().get(&0xE0).unwrap().elementary_type,
            ElementaryType::PsmDeclared(0x02)
        );
    }

    #[tokio::test]
    async fn scr_rate_becomes_available_after_two_samples() {
        let mut data = pack_header(0, 2000);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"AAAA");
        data.extend_from_slice(&pack_header(90_000, 2000));
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"BBBB");

        let mut demux = PsDemuxer::new(Cursor::new(data));
        let _ = demux.read_packet().await.unwrap();
        let _ = demux.read_packet().await.unwrap();
        assert!(demux.scr_rate().d > 0);
        assert!(demux.scr_rate().n > 0);
    }

    #[test]
    fn parses_mpeg2_pack_header_fields_exactly() {
        let mut full: Vec<u8> = vec![0, 0, 0, 0]; // start code bytes, ignored by parse_pack_header
        full.extend(mpeg2_pack_bytes(12_345, 7, 500_000));
        let parsed = parse_pack_header(&full).expect("valid mpeg2 pack header");
        pretty_assertions::assert_eq!(
            parsed,
            PackHeader { scr: 12_345, mux_rate: 500_000, mpeg2: true, total_len: 14 }
        );
    }

    #[tokio::test]
    async fn reassembles_a_packet_delivered_across_several_reads() {
        let mut data = pack_header(0, 2000);
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"DEADBEEF");

        let mut mock = tokio_test::io::Builder::new();
        for chunk in data.chunks(3) {
            mock.read(chunk);
        }
        let mut demux = PsDemuxer::new(mock.build());
        let packet = demux.read_packet().await.unwrap().expect("one packet");
        assert_eq!(&packet.data[..], b"DEADBEEF");
    }

    #[tokio::test]
    async fn lost_sync_resyncs_and_keeps_reading() {
        let mut data = pack_header(0, 2000);
        data.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]); // garbage, not a start code
        data.extend_from_slice(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00]);
        data.extend_from_slice(&[0x80, 0x00, 0x00]);
        data.extend_from_slice(b"RECOVER!");

        let mut demux = PsDemuxer::new(Cursor::new(data));
        let packet = demux.read_packet().await.unwrap().expect("recovers a packet");
        assert_eq!(&packet.data[..], b"RECOVER!");
    }
}
