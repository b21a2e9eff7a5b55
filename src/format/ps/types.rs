//! Start-code constants, the default stream-id-to-type table, and the
//! nanosecond/90kHz conversion used throughout the PS demuxer.

/// Pack-start start code (`0x000001BA`).
pub const START_CODE_PACK: u32 = 0x0000_01BA;
/// System-header start code (`0x000001BB`).
pub const START_CODE_SYSTEM_HEADER: u32 = 0x0000_01BB;
/// Program-stream-map start code (`0x000001BC`).
pub const START_CODE_PROGRAM_STREAM_MAP: u32 = 0x0000_01BC;
/// Private-stream-1 start code (`0x000001BD`).
pub const START_CODE_PRIVATE_STREAM_1: u32 = 0x0000_01BD;
/// Padding-stream start code (`0x000001BE`).
pub const START_CODE_PADDING: u32 = 0x0000_01BE;
/// Private-stream-2 start code (`0x000001BF`).
pub const START_CODE_PRIVATE_STREAM_2: u32 = 0x0000_01BF;
/// Program-end start code (`0x000001B9`).
pub const START_CODE_END: u32 = 0x0000_01B9;

/// Inclusive range of audio stream-id start codes.
pub const AUDIO_STREAM_RANGE: std::ops::RangeInclusive<u32> = 0x0000_01C0..=0x0000_01DF;
/// Inclusive range of video stream-id start codes.
pub const VIDEO_STREAM_RANGE: std::ops::RangeInclusive<u32> = 0x0000_01E0..=0x0000_01EF;
/// Inclusive range of extended stream-id start codes.
pub const EXTENDED_STREAM_RANGE: std::ops::RangeInclusive<u32> = 0x0000_01F0..=0x0000_01FF;

/// Returns true if `code` is one of the start codes a PES filter
/// accepts to begin a new header (§4.2 step 1).
pub fn is_pes_start_code(code: u32) -> bool {
    code == START_CODE_PROGRAM_STREAM_MAP
        || code == START_CODE_PRIVATE_STREAM_1
        || code == START_CODE_PADDING
        || AUDIO_STREAM_RANGE.contains(&code)
        || VIDEO_STREAM_RANGE.contains(&code)
        || EXTENDED_STREAM_RANGE.contains(&code)
}

/// AC3 sync word as the first two bytes of a private-stream-1 payload
/// (`0x0B77`), used to auto-detect raw AC3 and remap to stream id
/// `0x80`.
pub const AC3_SYNC_WORD: u16 = 0x0B77;
/// Stream id AC3 auto-detection remaps private-stream-1 payloads to.
pub const AC3_REMAP_STREAM_ID: u8 = 0x80;

/// Elementary stream type, as resolved from the default psm table or
/// an explicit program-stream-map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementaryType {
    /// DVD subpicture (stream ids 0x20-0x3F).
    DvdSubpicture,
    /// DVD AC3 audio (stream ids 0x80-0x87), also the AC3
    /// auto-detection target for private-stream-1.
    DvdAc3,
    /// DVD DTS audio (stream ids 0x88-0x9F).
    DvdDts,
    /// DVD LPCM audio (stream ids 0xA0-0xAF).
    DvdLpcm,
    /// MPEG-1 audio (stream ids 0xC0-0xDF).
    Mpeg1Audio,
    /// MPEG-1 video, upgraded to `Mpeg2Video` when the controlling
    /// pack header declared MPEG-2 (stream ids 0xE0-0xEF).
    Mpeg1Video,
    /// MPEG-2 video.
    Mpeg2Video,
    /// Type from an explicit program-stream-map entry whose meaning
    /// this demuxer does not further specialise; carries the raw
    /// stream-type byte from ISO/IEC 13818-1 Table 2-29.
    PsmDeclared(u8),
    /// Unknown / not yet classified.
    Unknown,
}

/// Resolves the default elementary type for a stream id per the §4.3
/// table, before any explicit PSM override is applied. `mpeg2_pack`
/// reflects whether the controlling pack header declared MPEG-2,
/// which upgrades video from MPEG-1 to MPEG-2.
pub fn default_elementary_type(stream_id: u8, mpeg2_pack: bool) -> ElementaryType {
    match stream_id {
        0x20..=0x3F => ElementaryType::DvdSubpicture,
        0x80..=0x87 => ElementaryType::DvdAc3,
        0x88..=0x9F => ElementaryType::DvdDts,
        0xA0..=0xAF => ElementaryType::DvdLpcm,
        0xC0..=0xDF => ElementaryType::Mpeg1Audio,
        0xE0..=0xEF => {
            if mpeg2_pack {
                ElementaryType::Mpeg2Video
            } else {
                ElementaryType::Mpeg1Video
            }
        }
        _ => ElementaryType::Unknown,
    }
}

/// One 90 kHz tick expressed in nanoseconds, as a ratio: ns = ticks *
/// `NS_PER_TICK_NUM` / `NS_PER_TICK_DEN`.
pub const NS_PER_TICK_NUM: u64 = 100_000;
/// See [`NS_PER_TICK_NUM`].
pub const NS_PER_TICK_DEN: u64 = 9;

/// Converts a 90 kHz tick count to nanoseconds, saturating on
/// overflow per §6.
pub fn ticks_to_ns(ticks: u64) -> u64 {
    ticks.saturating_mul(NS_PER_TICK_NUM) / NS_PER_TICK_DEN
}

/// Converts nanoseconds to a 90 kHz tick count, saturating on
/// overflow per §6.
pub fn ns_to_ticks(ns: u64) -> u64 {
    ns.saturating_mul(NS_PER_TICK_DEN) / NS_PER_TICK_NUM
}

/// One second in 90 kHz ticks, the discontinuity threshold in §4.3.
pub const SCR_DISCONTINUITY_THRESHOLD: i64 = 90_000;

/// Program-stream-map: stream-id (0..=255) -> elementary type.
///
/// Seeded with the default table on construction; `apply_psm` installs
/// explicit entries from a parsed program-stream-map packet, except
/// for private-stream-1 (0xBD) whose type is always resolved by
/// payload inspection (AC3 sync-word detection) rather than PSM
/// declaration.
#[derive(Debug, Clone)]
pub struct ProgramStreamMap {
    entries: [ElementaryType; 256],
}

impl Default for ProgramStreamMap {
    fn default() -> Self {
        let mut entries = [ElementaryType::Unknown; 256];
        for (id, entry) in entries.iter_mut().enumerate() {
            *entry = default_elementary_type(id as u8, false);
        }
        Self { entries }
    }
}

impl ProgramStreamMap {
    /// Builds the default table, MPEG-1 video assumed until a pack
    /// header says otherwise.
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up the currently resolved type for `stream_id`.
    pub fn get(&self, stream_id: u8) -> ElementaryType {
        self.entries[stream_id as usize]
    }

    /// Installs an explicit PSM entry. Silently ignored for 0xBD,
    /// whose type the demuxer resolves from payload inspection.
    pub fn set(&mut self, stream_id: u8, ty: ElementaryType) {
        if stream_id == 0xBD {
            return;
        }
        self.entries[stream_id as usize] = ty;
    }

    /// Re-derives the default MPEG-1/2 video entries once the pack
    /// header's MPEG-2 discriminator is known, leaving any explicit
    /// PSM overrides already applied untouched — this only refreshes
    /// slots still at their as-yet-undeclared default.
    pub fn note_mpeg2_pack(&mut self, mpeg2_pack: bool) {
        if !mpeg2_pack {
            return;
        }
        for id in 0xE0u16..=0xEF {
            if self.entries[id as usize] == ElementaryType::Mpeg1Video {
                self.entries[id as usize] = ElementaryType::Mpeg2Video;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_table_matches_spec_ranges() {
        assert_eq!(default_elementary_type(0x25, false), ElementaryType::DvdSubpicture);
        assert_eq!(default_elementary_type(0x83, false), ElementaryType::DvdAc3);
        assert_eq!(default_elementary_type(0x90, false), ElementaryType::DvdDts);
        assert_eq!(default_elementary_type(0xA5, false), ElementaryType::DvdLpcm);
        assert_eq!(default_elementary_type(0xC1, false), ElementaryType::Mpeg1Audio);
        assert_eq!(default_elementary_type(0xE0, false), ElementaryType::Mpeg1Video);
        assert_eq!(default_elementary_type(0xE0, true), ElementaryType::Mpeg2Video);
    }

    #[test]
    fn pes_start_code_ranges() {
        assert!(is_pes_start_code(START_CODE_PROGRAM_STREAM_MAP));
        assert!(is_pes_start_code(0x0000_01C5));
        assert!(is_pes_start_code(0x0000_01E5));
        assert!(is_pes_start_code(0x0000_01F5));
        assert!(!is_pes_start_code(START_CODE_PACK));
        assert!(!is_pes_start_code(0x0000_0100));
    }

    #[test]
    fn tick_conversion_round_trips_at_boundaries() {
        assert_eq!(ticks_to_ns(0), 0);
        assert_eq!(ticks_to_ns(9), 100_000);
        assert_eq!(ns_to_ticks(100_000), 9);
        assert_eq!(ns_to_ticks(u64::MAX), u64::MAX / NS_PER_TICK_NUM * NS_PER_TICK_DEN);
    }

    #[test]
    fn psm_default_then_override() {
        let mut psm = ProgramStreamMap::new();
        assert_eq!(psm.get(0xE5), ElementaryType::Mpeg1Video);
        psm.note_mpeg2_pack(true);
        assert_eq!(psm.get(0xE5), ElementaryType::Mpeg2Video);

        psm.set(0xBD, ElementaryType::DvdAc3);
        // 0xBD overrides are ignored; resolved by payload inspection instead.
        assert_eq!(psm.get(0xBD), ElementaryType::Unknown);

        psm.set(0x10, ElementaryType::PsmDeclared(0x1B));
        assert_eq!(psm.get(0x10), ElementaryType::PsmDeclared(0x1B));
    }
}
