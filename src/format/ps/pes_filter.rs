//! Packetized Elementary Stream filter: turns an adapter's bytes into
//! zero or more delivered PES payloads plus PTS/DTS, one PES unit at
//! a time.

use super::byte_adapter::ByteAdapter;
use super::types;
use bytes::Bytes;
use log::debug;

/// State of [`PesFilter`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterState {
    /// Parsing a start code and optional header fields.
    HeaderParse,
    /// Delivering the payload of the packet currently being parsed.
    DataPush,
    /// Discarding the payload of a padding packet.
    DataSkip,
}

/// Outcome of one [`PesFilter::process`] call. The filter never
/// returns an error type directly: callers inspect this enum and
/// decide how to react (LostSync triggers a demuxer-level resync,
/// NeedMoreData means "call me again once more bytes are appended").
#[derive(Debug, Clone, PartialEq)]
pub enum ParseOutcome {
    /// Not enough bytes buffered to make progress; append more and
    /// call again.
    NeedMoreData,
    /// A chunk of a PES payload is ready. `is_first` marks the first
    /// chunk of a given PES packet, the only one that can carry a
    /// decoded PTS/DTS.
    Delivered {
        /// Stream id this payload belongs to.
        stream_id: u8,
        /// Presentation timestamp in 90 kHz ticks, if present and
        /// this is the first fragment.
        pts: Option<i64>,
        /// Decode timestamp in 90 kHz ticks, if present and this is
        /// the first fragment.
        dts: Option<i64>,
        /// Payload bytes.
        data: Bytes,
        /// Whether this is the first fragment of its PES packet.
        is_first: bool,
    },
    /// A padding packet's bytes were discarded rather than delivered.
    Skipped {
        /// Stream id (always the padding stream id).
        stream_id: u8,
        /// Number of bytes discarded in this call.
        bytes: usize,
    },
    /// The start code at the front of the adapter was not a
    /// recognised PES start code (§4.2 step 1) or a marker-bit /
    /// flag-combination check failed while parsing the optional
    /// header. Exactly 4 bytes have already been flushed.
    LostSync,
    /// The program-end code (`0x000001B9`) was encountered.
    Eos,
}

/// Stream ids that carry no PES header and whose payload is forwarded
/// unparsed: program-stream-map, private-stream-2, ECM, EMM, program
/// stream directory, DSM-CC, and ITU-T Rec. H.222.1 type E.
fn is_headerless(stream_id: u8) -> bool {
    matches!(stream_id, 0xBC | 0xBF | 0xF0 | 0xF1 | 0xF2 | 0xF8 | 0xFF)
}

/// Decodes one 5-byte PTS or DTS field per the canonical
/// 4+3+1+15+1+15+1 marker-bit layout. Returns `None` if any marker bit
/// is not set.
fn decode_timestamp_field(bytes: &[u8]) -> Option<i64> {
    debug_assert_eq!(bytes.len(), 5);
    if bytes[0] & 0x01 != 1 || bytes[2] & 0x01 != 1 || bytes[4] & 0x01 != 1 {
        return None;
    }
    let top3 = ((bytes[0] >> 1) & 0x07) as i64;
    let mid15 = (((bytes[1] as i64) << 7) | ((bytes[2] as i64) >> 1)) & 0x7FFF;
    let low15 = (((bytes[3] as i64) << 7) | ((bytes[4] as i64) >> 1)) & 0x7FFF;
    Some((top3 << 30) | (mid15 << 15) | low15)
}

/// PES filter state machine (§4.2).
#[derive(Debug)]
pub struct PesFilter {
    state: FilterState,
    /// Wait for a full bounded PES before delivering anything.
    gather_pes: bool,
    /// Whether a zero declared length is legal outside the usual
    /// video/extended cases.
    allow_unbounded: bool,
    stream_id: u8,
    pts: Option<i64>,
    dts: Option<i64>,
    /// STD buffer size field (MPEG-1 only), kept for diagnostics.
    std_buffer_size: Option<u16>,
    remaining: usize,
    unbounded: bool,
    first_fragment: bool,
}

impl Default for PesFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl PesFilter {
    /// Creates a filter with `gather_pes` and `allow_unbounded` both
    /// off.
    pub fn new() -> Self {
        Self {
            state: FilterState::HeaderParse,
            gather_pes: false,
            allow_unbounded: false,
            stream_id: 0,
            pts: None,
            dts: None,
            std_buffer_size: None,
            remaining: 0,
            unbounded: false,
            first_fragment: true,
        }
    }

    /// Creates a filter with explicit `gather_pes` / `allow_unbounded`
    /// flags (§3 PESFilter state).
    pub fn with_options(gather_pes: bool, allow_unbounded: bool) -> Self {
        Self {
            gather_pes,
            allow_unbounded,
            ..Self::new()
        }
    }

    /// Current state, exposed for property-based tests (e.g. "state
    /// returns to HEADER_PARSE after a boundary").
    pub fn state(&self) -> FilterState {
        self.state
    }

    /// STD buffer size parsed from the most recent MPEG-1 header, if
    /// any. Advisory only; does not affect delivery.
    pub fn std_buffer_size(&self) -> Option<u16> {
        self.std_buffer_size
    }

    /// Resets to HEADER_PARSE, discarding any in-progress packet
    /// state. Used when the PS demuxer performs a resync or a seek.
    pub fn reset(&mut self) {
        self.state = FilterState::HeaderParse;
        self.pts = None;
        self.dts = None;
        self.remaining = 0;
        self.unbounded = false;
        self.first_fragment = true;
    }

    /// Advances the state machine by at most one delivered/skipped
    /// chunk. Call in a loop, appending more bytes to `adapter`
    /// whenever it returns `NeedMoreData`.
    pub fn process(&mut self, adapter: &mut ByteAdapter) -> ParseOutcome {
        match self.state {
            FilterState::HeaderParse => self.process_header(adapter),
            FilterState::DataPush => self.process_data_push(adapter),
            FilterState::DataSkip => self.process_data_skip(adapter),
        }
    }

    fn process_header(&mut self, adapter: &mut ByteAdapter) -> ParseOutcome {
        if adapter.available() < 6 {
            return ParseOutcome::NeedMoreData;
        }
        let head = adapter.map(6).unwrap();
        let start_code = u32::from_be_bytes([head[0], head[1], head[2], head[3]]);

        if start_code == types::START_CODE_END {
            adapter.flush(4);
            return ParseOutcome::Eos;
        }
        if !types::is_pes_start_code(start_code) {
            debug!("pes filter: lost sync at 0x{:08x}", start_code);
            adapter.flush(4);
            return ParseOutcome::LostSync;
        }

        let stream_id = (start_code & 0xFF) as u8;
        let declared_len = u16::from_be_bytes([head[4], head[5]]) as usize;
        let is_video = types::VIDEO_STREAM_RANGE.contains(&start_code);
        let is_extended = types::EXTENDED_STREAM_RANGE.contains(&start_code);
        let unbounded = declared_len == 0 && (is_video || is_extended || self.allow_unbounded);

        if self.gather_pes && !unbounded && declared_len > 0 && adapter.available() < 6 + declared_len {
            return ParseOutcome::NeedMoreData;
        }

        if is_headerless(stream_id) {
            adapter.flush(6);
            self.begin_payload(stream_id, declared_len, unbounded, None, None);
            return self.process(adapter);
        }

        if stream_id == (types::START_CODE_PADDING & 0xFF) as u8 {
            adapter.flush(6);
            self.stream_id = stream_id;
            if declared_len == 0 {
                return ParseOutcome::Skipped { stream_id, bytes: 0 };
            }
            self.state = FilterState::DataSkip;
            self.remaining = declared_len;
            return self.process(adapter);
        }

        if declared_len == 0 && !unbounded {
            adapter.flush(6);
            return ParseOutcome::Delivered {
                stream_id,
                pts: None,
                dts: None,
                data: Bytes::new(),
                is_first: true,
            };
        }

        match self.parse_optional_header(adapter, declared_len) {
            Ok(None) => ParseOutcome::NeedMoreData,
            Ok(Some((consumed, pts, dts))) => {
                let consumed_after_base = consumed - 6;
                if consumed_after_base > declared_len && !unbounded {
                    debug!(
                        "pes filter: lost sync, optional header overran declared length ({} > {})",
                        consumed_after_base, declared_len
                    );
                    adapter.flush(4);
                    return ParseOutcome::LostSync;
                }
                adapter.flush(consumed);
                let remaining = if unbounded { 0 } else { declared_len - consumed_after_base };
                self.begin_payload(stream_id, remaining, unbounded, pts, dts);
                self.process(adapter)
            }
            Err(()) => {
                debug!("pes filter: lost sync, malformed optional header");
                adapter.flush(4);
                ParseOutcome::LostSync
            }
        }
    }

    fn begin_payload(
        &mut self,
        stream_id: u8,
        remaining_or_len: usize,
        unbounded: bool,
        pts: Option<i64>,
        dts: Option<i64>,
    ) {
        self.stream_id = stream_id;
        self.pts = pts;
        self.dts = dts;
        self.unbounded = unbounded;
        self.remaining = remaining_or_len;
        self.first_fragment = true;
        self.state = FilterState::DataPush;
    }

    /// Parses everything between the 6-byte base header and the
    /// start of payload data: `0xFF` stuffing, an optional MPEG-1 STD
    /// buffer field, and exactly one of the three timestamp variants
    /// in §4.2 step 6. Returns the total header length consumed
    /// (counted from byte 0) plus the decoded PTS/DTS, or `Ok(None)`
    /// if more bytes are needed, or `Err(())` on a marker-bit or
    /// flag-combination violation.
    fn parse_optional_header(
        &mut self,
        adapter: &mut ByteAdapter,
        _declared_len: usize,
    ) -> Result<Option<(usize, Option<i64>, Option<i64>)>, ()> {
        let mut cursor = 6usize;

        loop {
            let buf = match adapter.map(cursor + 1) {
                Some(b) => b,
                None => return Ok(None),
            };
            if buf[cursor] == 0xFF {
                cursor += 1;
                continue;
            }
            break;
        }

        {
            let buf = match adapter.map(cursor + 1) {
                Some(b) => b,
                None => return Ok(None),
            };
            if buf[cursor] & 0xC0 == 0x40 {
                let buf2 = match adapter.map(cursor + 2) {
                    Some(b) => b,
                    None => return Ok(None),
                };
                self.std_buffer_size =
                    Some((((buf2[cursor] & 0x3F) as u16) << 8) | buf2[cursor + 1] as u16);
                cursor += 2;
            }
        }

        let marker = match adapter.map(cursor + 1) {
            Some(b) => b[cursor],
            None => return Ok(None),
        };

        if marker & 0xF0 == 0x20 {
            let buf = match adapter.map(cursor + 5) {
                Some(b) => b,
                None => return Ok(None),
            };
            let pts = decode_timestamp_field(&buf[cursor..cursor + 5]).ok_or(())?;
            Ok(Some((cursor + 5, Some(pts), None)))
        } else if marker & 0xF0 == 0x30 {
            let buf = match adapter.map(cursor + 10) {
                Some(b) => b,
                None => return Ok(None),
            };
            let pts = decode_timestamp_field(&buf[cursor..cursor + 5]).ok_or(())?;
            let dts = decode_timestamp_field(&buf[cursor + 5..cursor + 10]).ok_or(())?;
            Ok(Some((cursor + 10, Some(pts), Some(dts))))
        } else if marker & 0xC0 == 0x80 {
            let buf = match adapter.map(cursor + 3) {
                Some(b) => b,
                None => return Ok(None),
            };
            let pts_dts_flags = (buf[cursor + 1] >> 6) & 0x3;
            let hdr_data_len = buf[cursor + 2] as usize;
            let total = cursor + 3 + hdr_data_len;
            let full = match adapter.map(total) {
                Some(b) => b,
                None => return Ok(None),
            };
            let body = cursor + 3;
            match pts_dts_flags {
                0b00 => Ok(Some((total, None, None))),
                0b10 => {
                    if hdr_data_len < 5 {
                        return Err(());
                    }
                    let pts = decode_timestamp_field(&full[body..body + 5]).ok_or(())?;
                    Ok(Some((total, Some(pts), None)))
                }
                0b11 => {
                    if hdr_data_len < 10 {
                        return Err(());
                    }
                    let pts = decode_timestamp_field(&full[body..body + 5]).ok_or(())?;
                    let dts = decode_timestamp_field(&full[body + 5..body + 10]).ok_or(())?;
                    Ok(Some((total, Some(pts), Some(dts))))
                }
                // DTS-only is not a legal combination.
                0b01 => Err(()),
                _ => unreachable!(),
            }
        } else if marker == 0x0F {
            // "Not sure what this clause is for" in the source PES
            // parser: retain the skip-one-byte behaviour.
            Ok(Some((cursor + 1, None, None)))
        } else {
            Err(())
        }
    }

    fn process_data_push(&mut self, adapter: &mut ByteAdapter) -> ParseOutcome {
        if !self.unbounded && self.remaining == 0 && self.first_fragment {
            // A fully-parsed header with zero residual payload still
            // delivers its PTS/DTS as an empty first fragment.
            self.first_fragment = false;
            self.state = FilterState::HeaderParse;
            return ParseOutcome::Delivered {
                stream_id: self.stream_id,
                pts: self.pts,
                dts: self.dts,
                data: Bytes::new(),
                is_first: true,
            };
        }

        let avail = adapter.available();
        if avail == 0 {
            return ParseOutcome::NeedMoreData;
        }

        if self.unbounded {
            let buf = adapter.map(avail).unwrap();
            let mut boundary = None;
            if avail >= 4 {
                for i in 1..=avail - 3 {
                    if buf[i] == 0x00 && buf[i + 1] == 0x00 && buf[i + 2] == 0x01 {
                        boundary = Some(i);
                        break;
                    }
                }
            }
            return match boundary {
                Some(pos) => {
                    let data = adapter.take(pos).unwrap();
                    let is_first = self.first_fragment;
                    self.first_fragment = false;
                    self.state = FilterState::HeaderParse;
                    ParseOutcome::Delivered {
                        stream_id: self.stream_id,
                        pts: if is_first { self.pts } else { None },
                        dts: if is_first { self.dts } else { None },
                        data,
                        is_first,
                    }
                }
                None => {
                    let data = adapter.take(avail).unwrap();
                    let is_first = self.first_fragment;
                    self.first_fragment = false;
                    ParseOutcome::Delivered {
                        stream_id: self.stream_id,
                        pts: if is_first { self.pts } else { None },
                        dts: if is_first { self.dts } else { None },
                        data,
                        is_first,
                    }
                }
            };
        }

        let take = avail.min(self.remaining);
        let data = adapter.take(take).unwrap();
        self.remaining -= take;
        let is_first = self.first_fragment;
        self.first_fragment = false;
        if self.remaining == 0 {
            self.state = FilterState::HeaderParse;
        }
        ParseOutcome::Delivered {
            stream_id: self.stream_id,
            pts: if is_first { self.pts } else { None },
            dts: if is_first { self.dts } else { None },
            data,
            is_first,
        }
    }

    fn process_data_skip(&mut self, adapter: &mut ByteAdapter) -> ParseOutcome {
        let avail = adapter.available();
        if avail == 0 {
            return ParseOutcome::NeedMoreData;
        }
        let take = avail.min(self.remaining);
        adapter.flush(take);
        self.remaining -= take;
        if self.remaining == 0 {
            self.state = FilterState::HeaderParse;
        }
        ParseOutcome::Skipped {
            stream_id: self.stream_id,
            bytes: take,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lost_sync_on_unrecognised_start_code() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0x05, 0x00, 0x00][..]);
        assert_eq!(f.process(&mut a), ParseOutcome::LostSync);
        assert_eq!(a.source_offset(), 4);
    }

    #[test]
    fn need_more_data_for_short_header() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01][..]);
        assert_eq!(f.process(&mut a), ParseOutcome::NeedMoreData);
    }

    #[test]
    fn eos_on_program_end_code() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xB9, 0x00, 0x00][..]);
        assert_eq!(f.process(&mut a), ParseOutcome::Eos);
        assert_eq!(a.source_offset(), 4);
    }

    #[test]
    fn unbounded_video_delivers_all_bytes_when_no_boundary_follows() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        // start code 0x000001E0 (video), length 0 (unbounded)
        a.append(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00][..]);
        // MPEG-2 optional header, no PTS/DTS present
        a.append(&[0x80, 0x00, 0x00][..]);
        a.append(&b"DEADBEEFDEADBEEF"[..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { stream_id, data, is_first, pts, dts, .. } => {
                assert_eq!(stream_id, 0xE0);
                assert_eq!(&data[..], b"DEADBEEFDEADBEEF");
                assert!(is_first);
                assert_eq!(pts, None);
                assert_eq!(dts, None);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
        assert_eq!(f.state(), FilterState::DataPush);
    }

    #[test]
    fn unbounded_video_returns_to_header_parse_at_next_start_code() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x00][..]);
        a.append(&[0x80, 0x00, 0x00][..]);
        let mut payload = b"DEADBEEF".to_vec();
        payload.extend_from_slice(&[0x00, 0x00, 0x01, 0xE1, 0x00, 0x00]);
        a.append(payload);

        match f.process(&mut a) {
            ParseOutcome::Delivered { data, .. } => assert_eq!(&data[..], b"DEADBEEF"),
            other => panic!("expected Delivered, got {other:?}"),
        }
        assert_eq!(f.state(), FilterState::HeaderParse);
    }

    #[test]
    fn pts_only_header_decodes_zero_with_all_markers_set() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        // start code 0x000001C0 (audio), length 5 (just the PTS field)
        a.append(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x05][..]);
        a.append(&[0x21, 0x00, 0x01, 0x00, 0x01][..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { pts, dts, data, .. } => {
                assert_eq!(pts, Some(0));
                assert_eq!(dts, None);
                assert!(data.is_empty());
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn pts_dts_header_decodes_zero_with_all_markers_set() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        // 10-byte PTS+DTS field, all value bits zero, every marker bit set.
        let pts_dts = [0x31, 0x00, 0x01, 0x00, 0x01, 0x11, 0x00, 0x01, 0x00, 0x01];
        a.append(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x0A][..]);
        a.append(&pts_dts[..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { pts, dts, .. } => {
                assert_eq!(pts, Some(0));
                assert_eq!(dts, Some(0));
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn mpeg2_header_dts_only_is_lost_sync() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        // flags byte: pts_dts_flags = 0b01 (DTS-only, invalid)
        a.append(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x08][..]);
        a.append(&[0x80, 0x40, 0x00][..]);
        assert_eq!(f.process(&mut a), ParseOutcome::LostSync);
    }

    #[test]
    fn mpeg2_header_no_pts_dts_delivers_remainder() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        // flags byte: pts_dts_flags = 0b00, hdr_data_len = 0
        a.append(&[0x00, 0x00, 0x01, 0xE0, 0x00, 0x05][..]);
        a.append(&[0x80, 0x00, 0x00][..]);
        a.append(&b"xy"[..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { data, pts, dts, .. } => {
                assert_eq!(&data[..], b"xy");
                assert_eq!(pts, None);
                assert_eq!(dts, None);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn padding_stream_is_skipped_not_delivered() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xBE, 0x00, 0x03][..]);
        a.append(&[0xAA, 0xBB, 0xCC][..]);
        assert_eq!(
            f.process(&mut a),
            ParseOutcome::Skipped { stream_id: 0xBE, bytes: 3 }
        );
        assert_eq!(f.state(), FilterState::HeaderParse);
    }

    #[test]
    fn program_stream_map_is_forwarded_without_header_parse() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xBC, 0x00, 0x02][..]);
        a.append(&[0x01, 0x02][..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { stream_id, data, pts, dts, .. } => {
                assert_eq!(stream_id, 0xBC);
                assert_eq!(&data[..], &[0x01, 0x02]);
                assert_eq!(pts, None);
                assert_eq!(dts, None);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn gather_pes_waits_for_full_bounded_packet() {
        let mut f = PesFilter::with_options(true, false);
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x05][..]);
        a.append(&[0x21, 0x00][..]);
        assert_eq!(f.process(&mut a), ParseOutcome::NeedMoreData);
        a.append(&[0x01, 0x00, 0x01][..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { pts, .. } => assert_eq!(pts, Some(0)),
            other => panic!("expected Delivered, got {other:?}"),
        }
    }

    #[test]
    fn unknown_flags_byte_0x0f_is_skipped_by_one() {
        let mut f = PesFilter::new();
        let mut a = ByteAdapter::new();
        a.append(&[0x00, 0x00, 0x01, 0xC0, 0x00, 0x03][..]);
        a.append(&[0x0F, b'a', b'b'][..]);
        match f.process(&mut a) {
            ParseOutcome::Delivered { data, pts, dts, .. } => {
                assert_eq!(&data[..], b"ab");
                assert_eq!(pts, None);
                assert_eq!(dts, None);
            }
            other => panic!("expected Delivered, got {other:?}"),
        }
    }
}
