//! Minimal GIF block walker for the animation loop count.
//!
//! The `image` crate decodes GIF frames and their delays but does not expose
//! the NETSCAPE2.0 application extension, so the loop count is read here.
//!
//! Stream layout (GIF89a):
//!   Header:             `GIF87a` / `GIF89a` (6 bytes)
//!   Screen descriptor:  7 bytes; byte 4 flags, bit 7 = global color table,
//!                       bits 0-2 = table size exponent
//!   Blocks:             `0x21` extension, `0x2C` image, `0x3B` trailer
//!
//! The loop extension is `0x21 0xFF 0x0B "NETSCAPE2.0"` followed by the
//! sub-block `0x03 0x01 <count lo> <count hi>`. Count 0 means loop forever.

use super::backend::LoopCount;

const EXTENSION: u8 = 0x21;
const IMAGE: u8 = 0x2C;
const TRAILER: u8 = 0x3B;
const APPLICATION_LABEL: u8 = 0xFF;
const LOOP_IDENTIFIERS: [&[u8]; 2] = [b"NETSCAPE2.0", b"ANIMEXTS1.0"];

/// Loop count of a GIF stream. No loop extension means the animation plays once.
pub fn loop_count(data: &[u8]) -> LoopCount {
    match read_loop_extension(data) {
        Some(0) => LoopCount::Infinite,
        Some(n) => LoopCount::Finite(n),
        None => LoopCount::Finite(0),
    }
}

/// Raw count from the first loop extension, or `None` when there is none.
fn read_loop_extension(data: &[u8]) -> Option<u16> {
    if data.len() < 13 || !data.starts_with(b"GIF8") {
        return None;
    }
    let mut pos = 13 + color_table_len(data[10]);

    while pos < data.len() {
        match data[pos] {
            EXTENSION => {
                let label = *data.get(pos + 1)?;
                pos += 2;
                if label == APPLICATION_LABEL {
                    if let Some(count) = read_application(data, pos) {
                        return Some(count);
                    }
                }
                pos = skip_sub_blocks(data, pos)?;
            }
            IMAGE => {
                // Separator + 9-byte descriptor, flags in the last byte.
                let flags = *data.get(pos + 9)?;
                pos += 10 + color_table_len(flags);
                // LZW minimum code size precedes the data sub-blocks.
                pos = skip_sub_blocks(data, pos + 1)?;
            }
            TRAILER => return None,
            _ => return None,
        }
    }
    None
}

/// Parse an application extension whose first sub-block starts at `pos`.
fn read_application(data: &[u8], pos: usize) -> Option<u16> {
    let size = usize::from(*data.get(pos)?);
    let identifier = data.get(pos + 1..pos + 1 + size)?;
    if !LOOP_IDENTIFIERS.contains(&identifier) {
        return None;
    }
    let sub = pos + 1 + size;
    match data.get(sub..sub + 4)? {
        [3, 1, lo, hi] => Some(u16::from_le_bytes([*lo, *hi])),
        _ => None,
    }
}

/// Skip a chain of length-prefixed sub-blocks ending with a zero-length block.
fn skip_sub_blocks(data: &[u8], mut pos: usize) -> Option<usize> {
    loop {
        let len = usize::from(*data.get(pos)?);
        pos += 1;
        if len == 0 {
            return Some(pos);
        }
        pos += len;
    }
}

fn color_table_len(flags: u8) -> usize {
    if flags & 0x80 == 0 {
        0
    } else {
        3 * (1 << ((flags & 0x07) + 1))
    }
}
