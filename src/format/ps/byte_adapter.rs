//! A growable FIFO of byte buffers with a cursor that survives across
//! parser steps, used by the PES filter and the PS demuxer to avoid
//! copying every time they need to look a few bytes ahead.

use bytes::{Bytes, BytesMut};
use std::collections::VecDeque;

/// Ordered sequence of appended buffers with an absolute source offset.
///
/// `append` is O(1) amortised; it never copies. `map` only coalesces
/// the buffers it needs to satisfy a request, and only when the
/// requested range actually straddles more than one buffer. `flush`
/// advances the read cursor without copying whenever it lands on a
/// buffer boundary.
#[derive(Debug, Default)]
pub struct ByteAdapter {
    chunks: VecDeque<Bytes>,
    /// Offset into `chunks[0]` of the first unconsumed byte.
    head_offset: usize,
    available: usize,
    /// Absolute stream offset of the first unconsumed byte.
    source_offset: u64,
}

impl ByteAdapter {
    /// Creates an empty adapter whose first byte is reported at
    /// offset 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an empty adapter whose first byte is reported at
    /// `source_offset`. Used after a seek repositions the underlying
    /// reader.
    pub fn with_source_offset(source_offset: u64) -> Self {
        Self {
            source_offset,
            ..Self::default()
        }
    }

    /// Appends a buffer. O(1) amortised, never copies.
    pub fn append(&mut self, buf: impl Into<Bytes>) {
        let buf = buf.into();
        if buf.is_empty() {
            return;
        }
        self.available += buf.len();
        self.chunks.push_back(buf);
    }

    /// Total unconsumed bytes currently buffered.
    pub fn available(&self) -> usize {
        self.available
    }

    /// Absolute offset of the first unconsumed byte in the original
    /// stream.
    pub fn source_offset(&self) -> u64 {
        self.source_offset
    }

    /// Returns up to `n` contiguous bytes without consuming them.
    /// Coalesces buffers only when `n` spans more than the first
    /// chunk. Returns `None` if fewer than `n` bytes are available.
    pub fn map(&mut self, n: usize) -> Option<Bytes> {
        if n > self.available {
            return None;
        }
        if n == 0 {
            return Some(Bytes::new());
        }
        if let Some(first) = self.chunks.front() {
            if first.len() - self.head_offset >= n {
                return Some(first.slice(self.head_offset..self.head_offset + n));
            }
        }
        // Slow path: coalesce just enough chunks to satisfy the request.
        let mut out = BytesMut::with_capacity(n);
        let mut remaining = n;
        for (i, chunk) in self.chunks.iter().enumerate() {
            let start = if i == 0 { self.head_offset } else { 0 };
            let slice = &chunk[start..];
            let take = remaining.min(slice.len());
            out.extend_from_slice(&slice[..take]);
            remaining -= take;
            if remaining == 0 {
                break;
            }
        }
        Some(out.freeze())
    }

    /// Advances the read cursor by `n` bytes, dropping buffers that
    /// are fully consumed. Copy-free except for a single byte offset
    /// update. Bumps the reported source offset by `n`.
    ///
    /// Panics if `n` exceeds `available()` — callers are expected to
    /// have checked `available()` first, same as `map`/`take`.
    pub fn flush(&mut self, n: usize) {
        assert!(n <= self.available, "flush past available bytes");
        self.available -= n;
        self.source_offset += n as u64;
        let mut remaining = n;
        while remaining > 0 {
            let front_len = self.chunks.front().map(|c| c.len()).unwrap_or(0) - self.head_offset;
            if front_len == 0 {
                self.chunks.pop_front();
                self.head_offset = 0;
                continue;
            }
            if front_len <= remaining {
                remaining -= front_len;
                self.chunks.pop_front();
                self.head_offset = 0;
            } else {
                self.head_offset += remaining;
                remaining = 0;
            }
        }
    }

    /// Detaches exactly `n` bytes as an owned buffer, equivalent to
    /// `map(n)` followed by `flush(n)` but without re-touching the
    /// mapped bytes. Returns `None` if fewer than `n` bytes are
    /// available.
    pub fn take(&mut self, n: usize) -> Option<Bytes> {
        let out = self.map(n)?;
        self.flush(n);
        Some(out)
    }

    /// Discards all buffered bytes without advancing the source
    /// offset (used when resetting on a state transition).
    pub fn clear(&mut self) {
        self.chunks.clear();
        self.head_offset = 0;
        self.available = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_map_single_chunk() {
        let mut a = ByteAdapter::new();
        a.append(&b"hello world"[..]);
        assert_eq!(a.available(), 11);
        assert_eq!(a.map(5).unwrap(), &b"hello"[..]);
        // map does not consume
        assert_eq!(a.available(), 11);
    }

    #[test]
    fn map_coalesces_across_chunks() {
        let mut a = ByteAdapter::new();
        a.append(&b"ab"[..]);
        a.append(&b"cde"[..]);
        a.append(&b"fg"[..]);
        assert_eq!(a.map(6).unwrap(), &b"abcdef"[..]);
        assert_eq!(a.available(), 7);
    }

    #[test]
    fn flush_drops_whole_and_partial_chunks() {
        let mut a = ByteAdapter::new();
        a.append(&b"abc"[..]);
        a.append(&b"defg"[..]);
        a.flush(4);
        assert_eq!(a.available(), 3);
        assert_eq!(a.source_offset(), 4);
        assert_eq!(a.map(3).unwrap(), &b"efg"[..]);
    }

    #[test]
    fn take_detaches_and_flushes() {
        let mut a = ByteAdapter::new();
        a.append(&b"0123456789"[..]);
        let first = a.take(4).unwrap();
        assert_eq!(first, &b"0123"[..]);
        assert_eq!(a.available(), 6);
        assert_eq!(a.source_offset(), 4);
    }

    #[test]
    fn insufficient_bytes_returns_none() {
        let mut a = ByteAdapter::new();
        a.append(&b"ab"[..]);
        assert!(a.map(3).is_none());
        assert!(a.take(3).is_none());
    }

    #[test]
    fn source_offset_seeds_from_constructor() {
        let a = ByteAdapter::with_source_offset(1_000);
        assert_eq!(a.source_offset(), 1_000);
    }

    #[test]
    fn double_map_with_monotonically_decreasing_size_is_stable() {
        let mut a = ByteAdapter::new();
        a.append(&b"abcdef"[..]);
        let first = a.map(6).unwrap();
        let second = a.map(3).unwrap();
        assert_eq!(first, &b"abcdef"[..]);
        assert_eq!(second, &b"abc"[..]);
    }

    #[quickcheck_macros::quickcheck]
    fn take_reassembles_source_regardless_of_chunking(chunk_lens: Vec<u8>, take_len: u8) -> bool {
        let mut source = Vec::new();
        let mut a = ByteAdapter::new();
        for (i, len) in chunk_lens.iter().enumerate() {
            let chunk: Vec<u8> = (0..*len).map(|b| b.wrapping_add(i as u8)).collect();
            source.extend_from_slice(&chunk);
            a.append(chunk);
        }

        let n = (take_len as usize).min(source.len());
        match a.take(n) {
            Some(taken) => taken.as_ref() == &source[..n] && a.available() == source.len() - n,
            None => n > source.len(),
        }
    }
}
