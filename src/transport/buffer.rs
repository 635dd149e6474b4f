//! Non-contiguous, zero-copy byte buffer: an ordered list of reference
//! counted slices.
//!
//! [`bytes::Bytes`] already is a reference-counted immutable byte slice
//! with O(1) sub-slicing; `NonContiguousBuffer` is a deque of them, which
//! gives the "ordered sequence of reference-counted byte slices" the data
//! model asks for without re-deriving ref-counted slice semantics that the
//! ecosystem already provides.

use bytes::Bytes;
use std::collections::VecDeque;

/// An ordered, zero-copy sequence of byte slices.
///
/// Parsers are expected to operate on this directly and only call
/// [`NonContiguousBuffer::linearize`] where an underlying parser library
/// requires a contiguous slice; everywhere else, `Cut`/`Skip`/iteration
/// avoid copying.
#[derive(Debug, Clone, Default)]
pub struct NonContiguousBuffer {
    slices: VecDeque<Bytes>,
    len: usize,
}

impl NonContiguousBuffer {
    #[inline]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a slice to the end of the buffer without copying.
    #[inline]
    pub fn push(&mut self, data: Bytes) {
        if data.is_empty() {
            return;
        }
        self.len += data.len();
        self.slices.push_back(data);
    }

    /// Total number of bytes across all slices.
    #[inline]
    pub fn byte_size(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Splits off the first `n` bytes as a new, independently owned
    /// buffer, advancing `self` past them. Panics if `n > self.byte_size()`.
    pub fn cut(&mut self, n: usize) -> NonContiguousBuffer {
        assert!(n <= self.len, "cut({n}) exceeds buffer size {}", self.len);

        let mut out = NonContiguousBuffer::new();
        let mut remaining = n;
        while remaining > 0 {
            let front = self.slices.front_mut().expect("len tracked remaining bytes");
            if front.len() <= remaining {
                remaining -= front.len();
                let piece = self.slices.pop_front().unwrap();
                out.len += piece.len();
                out.slices.push_back(piece);
            } else {
                let piece = front.split_to(remaining);
                out.len += piece.len();
                out.slices.push_back(piece);
                remaining = 0;
            }
        }
        self.len -= n;
        out
    }

    /// Discards the first `n` bytes without retaining them.
    pub fn skip(&mut self, n: usize) {
        let _ = self.cut(n);
    }

    /// True if the buffer holds no bytes.
    #[inline]
    pub fn empty(&self) -> bool {
        self.is_empty()
    }

    /// Iterates the underlying slices in order, without copying.
    #[inline]
    pub fn iter_slices(&self) -> impl Iterator<Item = &Bytes> {
        self.slices.iter()
    }

    /// Copies every slice into one contiguous `Vec<u8>`. Only use where a
    /// downstream parser genuinely requires contiguity.
    pub fn linearize(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.len);
        for slice in &self.slices {
            out.extend_from_slice(slice);
        }
        out
    }

    /// Appends the contents of `other` onto the end of `self`, consuming
    /// `other`.
    pub fn extend(&mut self, mut other: NonContiguousBuffer) {
        self.len += other.len;
        self.slices.append(&mut other.slices);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> NonContiguousBuffer {
        let mut buf = NonContiguousBuffer::new();
        buf.push(Bytes::from_static(b"hello "));
        buf.push(Bytes::from_static(b"world"));
        buf
    }

    #[test]
    fn byte_size_sums_all_slices() {
        assert_eq!(sample().byte_size(), 11);
    }

    #[test]
    fn linearize_joins_in_order() {
        assert_eq!(sample().linearize(), b"hello world");
    }

    // Property 2: for all buf and 0 <= n <= buf.size, cut(n).size +
    // buf.size_after == original.size, and cut(n) ++ buf == original.
    #[test]
    fn cut_invariants_hold_across_all_split_points() {
        let original = sample();
        let original_bytes = original.linearize();

        for n in 0..=original_bytes.len() {
            let mut buf = sample();
            let head = buf.cut(n);

            assert_eq!(head.byte_size() + buf.byte_size(), original.byte_size());

            let mut rejoined = head;
            rejoined.extend(buf);
            assert_eq!(rejoined.linearize(), original_bytes);
        }
    }

    #[test]
    fn cut_splits_within_a_single_slice() {
        let mut buf = sample();
        let head = buf.cut(3);
        assert_eq!(head.linearize(), b"hel");
        assert_eq!(buf.linearize(), b"lo world");
    }

    #[test]
    fn skip_discards_without_retaining() {
        let mut buf = sample();
        buf.skip(6);
        assert_eq!(buf.linearize(), b"world");
    }

    #[test]
    #[should_panic]
    fn cut_past_end_panics() {
        let mut buf = sample();
        buf.cut(buf.byte_size() + 1);
    }

    #[test]
    fn empty_slices_are_not_retained() {
        let mut buf = NonContiguousBuffer::new();
        buf.push(Bytes::new());
        assert!(buf.empty());
        assert_eq!(buf.iter_slices().count(), 0);
    }
}
