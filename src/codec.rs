//! Codec boundary and the backward LZ77 scheme used for code sections.
//!
//! # Stream layout
//! A compressed stream is `[raw head][compressed region][pad][footer]`.
//! The 8-byte footer (two LE u32 words) carries `top_and_bottom` — the low
//! 24 bits are the length of the compressed region including the footer,
//! the high 8 bits are the footer-plus-padding length — and `size_delta`,
//! the number of bytes the stream grows by when expanded.
//!
//! Decompression copies the whole stream into the output buffer and expands
//! the compressed region in place, walking backwards from the footer. Each
//! flag byte governs the next eight items: a clear bit is a literal, a set
//! bit a back-reference of 3..=18 bytes at a distance of 3..=0x1002 toward
//! higher addresses. Because expansion is in place, the write cursor must
//! stay above the read cursor at every step; the compressor picks the
//! raw-head/compressed-tail split accordingly.

use thiserror::Error;

pub const MIN_MATCH: usize = 3;
pub const MAX_MATCH: usize = MIN_MATCH + 0xF;
pub const MAX_DISTANCE: usize = MIN_MATCH + 0xFFF;
const FOOTER_LEN: usize = 8;

#[derive(Error, Debug)]
pub enum CodecError {
    #[error("compressed stream too short: {0} bytes")]
    TooShort(usize),
    #[error("corrupt stream: {0}")]
    Corrupt(&'static str),
    #[error("data does not shrink under backward LZ77")]
    Inflate,
    #[error("declared uncompressed size {expected} does not match stream ({actual})")]
    SizeMismatch { expected: u32, actual: u32 },
}

/// The narrow contract the container engine consumes compression through.
pub trait Codec {
    /// Read the expanded size out of a compressed stream without expanding it.
    fn uncompressed_size(&self, compressed: &[u8]) -> Result<u32, CodecError>;

    /// Expand `compressed` to exactly `uncompressed_size` bytes.
    fn decompress(&self, compressed: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, CodecError>;

    /// Compress `raw`. May legitimately fail when the result would not
    /// shrink; callers are expected to fall back to storing raw bytes.
    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError>;
}

pub struct BackwardLz77;

impl Codec for BackwardLz77 {
    fn uncompressed_size(&self, compressed: &[u8]) -> Result<u32, CodecError> {
        if compressed.len() < FOOTER_LEN {
            return Err(CodecError::TooShort(compressed.len()));
        }
        let delta = le_u32(&compressed[compressed.len() - 4..]);
        (compressed.len() as u32)
            .checked_add(delta)
            .ok_or(CodecError::Corrupt("size delta overflows"))
    }

    fn decompress(&self, compressed: &[u8], uncompressed_size: u32) -> Result<Vec<u8>, CodecError> {
        let n = compressed.len();
        let total = self.uncompressed_size(compressed)? as usize;
        if total != uncompressed_size as usize {
            return Err(CodecError::SizeMismatch {
                expected: uncompressed_size,
                actual: total as u32,
            });
        }
        let top_and_bottom = le_u32(&compressed[n - 8..]);
        let bottom = (top_and_bottom >> 24) as usize;
        let top = (top_and_bottom & 0x00FF_FFFF) as usize;
        if bottom < FOOTER_LEN || bottom > top || top > n {
            return Err(CodecError::Corrupt("footer region out of range"));
        }

        let mut out = vec![0u8; total];
        out[..n].copy_from_slice(compressed);
        let end = n - top;
        let mut src = n - bottom;
        let mut dest = total;
        while src > end {
            src -= 1;
            let flag = out[src];
            for bit in 0..8 {
                if (flag << bit) & 0x80 == 0 {
                    if src <= end || dest <= end {
                        return Err(CodecError::Corrupt("literal out of range"));
                    }
                    src -= 1;
                    dest -= 1;
                    out[dest] = out[src];
                } else {
                    if src < end + 2 {
                        return Err(CodecError::Corrupt("truncated back-reference"));
                    }
                    src -= 1;
                    let b1 = out[src] as usize;
                    src -= 1;
                    let b2 = out[src] as usize;
                    let len = (b1 >> 4) + MIN_MATCH;
                    let distance = ((b1 & 0x0F) << 8 | b2) + MIN_MATCH;
                    if len > dest - end {
                        return Err(CodecError::Corrupt("back-reference underruns output"));
                    }
                    if dest + distance > total {
                        return Err(CodecError::Corrupt("back-reference past end of output"));
                    }
                    let mut from = dest + distance;
                    for _ in 0..len {
                        from -= 1;
                        dest -= 1;
                        out[dest] = out[from];
                    }
                }
                if src <= end {
                    break;
                }
            }
        }
        if dest != end {
            return Err(CodecError::Corrupt("stream does not expand to the declared size"));
        }
        Ok(out)
    }

    fn compress(&self, raw: &[u8]) -> Result<Vec<u8>, CodecError> {
        if raw.len() <= FOOTER_LEN {
            return Err(CodecError::Inflate);
        }

        // Greedy pass over the whole input, back to front. `stream` holds the
        // emitted bytes in decoder read order (highest file address first);
        // split points are recorded at every flag-group boundary so the best
        // raw-head/compressed-tail split can be chosen afterwards.
        let mut stream: Vec<u8> = Vec::with_capacity(raw.len());
        let mut splits = vec![SplitPoint { consumed: 0, emitted: 0, max_margin: 0 }];
        let mut consumed = 0usize;
        // Max over all stream-read events of (output produced - stream
        // consumed); the in-place expansion stays safe as long as the final
        // shrinkage is at least this margin.
        let mut max_margin = 0i64;
        let mut p = raw.len();
        while p > 0 {
            max_margin = max_margin.max(consumed as i64 - stream.len() as i64);
            let flag_index = stream.len();
            stream.push(0);
            let mut flag = 0u8;
            for bit in 0..8 {
                if p == 0 {
                    break;
                }
                match find_match(raw, p) {
                    Some((distance, len)) => {
                        flag |= 0x80 >> bit;
                        max_margin = max_margin.max(consumed as i64 - stream.len() as i64);
                        stream.push((((len - MIN_MATCH) << 4) | ((distance - MIN_MATCH) >> 8)) as u8);
                        max_margin = max_margin.max(consumed as i64 - stream.len() as i64);
                        stream.push(((distance - MIN_MATCH) & 0xFF) as u8);
                        p -= len;
                        consumed += len;
                    }
                    None => {
                        max_margin = max_margin.max(consumed as i64 - stream.len() as i64);
                        stream.push(raw[p - 1]);
                        p -= 1;
                        consumed += 1;
                    }
                }
            }
            stream[flag_index] = flag;
            splits.push(SplitPoint { consumed, emitted: stream.len(), max_margin });
        }

        // Pick the split with the best shrinkage among the safe ones.
        let mut best = &splits[0];
        for split in &splits {
            let f = split.consumed as i64 - split.emitted as i64;
            if f >= split.max_margin && f >= best.consumed as i64 - best.emitted as i64 {
                best = split;
            }
        }

        let head = raw.len() - best.consumed;
        let pad = (4 - (head + best.emitted) % 4) % 4;
        let bottom = FOOTER_LEN + pad;
        let top = best.emitted + bottom;
        let total = head + best.emitted + bottom;
        if total >= raw.len() || top > 0x00FF_FFFF {
            return Err(CodecError::Inflate);
        }

        let mut out = Vec::with_capacity(total);
        out.extend_from_slice(&raw[..head]);
        out.extend(stream[..best.emitted].iter().rev());
        out.extend(std::iter::repeat(0xFFu8).take(pad));
        out.extend_from_slice(&(((bottom as u32) << 24) | top as u32).to_le_bytes());
        out.extend_from_slice(&((raw.len() - total) as u32).to_le_bytes());
        Ok(out)
    }
}

struct SplitPoint {
    consumed: usize,
    emitted: usize,
    max_margin: i64,
}

/// Longest match for the chunk ending at `p`, searched over every legal
/// distance. Linear probing is plenty for the section sizes this tool sees.
fn find_match(raw: &[u8], p: usize) -> Option<(usize, usize)> {
    let max_len = MAX_MATCH.min(p);
    if max_len < MIN_MATCH {
        return None;
    }
    let max_distance = MAX_DISTANCE.min(raw.len() - p);
    let mut best: Option<(usize, usize)> = None;
    for distance in MIN_MATCH..=max_distance {
        let mut len = 0;
        while len < max_len && raw[p - 1 - len] == raw[p + distance - 1 - len] {
            len += 1;
        }
        if len >= MIN_MATCH && best.map_or(true, |(_, l)| len > l) {
            best = Some((distance, len));
            if len == MAX_MATCH {
                break;
            }
        }
    }
    best
}

fn le_u32(bytes: &[u8]) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&bytes[..4]);
    u32::from_le_bytes(raw)
}
