//! MPEG Program Stream demultiplexing: a byte adapter, a PES filter
//! state machine built on top of it, and the demuxer that drives both
//! while tracking pack headers, the System Clock Reference, and the
//! program stream map.

mod byte_adapter;
mod demuxer;
mod pes_filter;
mod types;

pub use byte_adapter::ByteAdapter;
pub use demuxer::{PsDemuxer, PsError, ScrRate, StreamRecord};
pub use pes_filter::{FilterState, ParseOutcome, PesFilter};
pub use types::{
    default_elementary_type, is_pes_start_code, ElementaryType, ProgramStreamMap,
    AC3_REMAP_STREAM_ID, AC3_SYNC_WORD, NS_PER_TICK_DEN, NS_PER_TICK_NUM,
    SCR_DISCONTINUITY_THRESHOLD, START_CODE_END, START_CODE_PACK, START_CODE_PADDING,
    START_CODE_PRIVATE_STREAM_1, START_CODE_PRIVATE_STREAM_2, START_CODE_PROGRAM_STREAM_MAP,
    START_CODE_SYSTEM_HEADER,
};
