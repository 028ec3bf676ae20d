//! Run-length codec used by the WebSocket screen stream.
//!
//! # Wire format
//!
//! ```text
//! ┌──────────┬──────────────────────────────────────┐
//! │ ctrl (1) │ payload                              │
//! ├──────────┼──────────────────────────────────────┤
//! │ 1nnnnnnn │ n unique blocks, n * block_size bytes│
//! │ 0nnnnnnn │ one block repeated n times           │
//! └──────────┴──────────────────────────────────────┘
//! ```
//!
//! A stream is a back-to-back sequence of such records and must end exactly
//! on a record boundary.

/// High bit of the control byte: "raw/unique" record.
pub const RAW_FLAG: u8 = 0x80;

/// Largest block count a single control byte can carry.
pub const MAX_RUN: usize = 0x7F;

/// Decode an RLE stream of `block_size`-byte blocks.
///
/// Returns `None` on any truncated record, or one whose size does not fit
/// in `usize`; a partial buffer is never returned.
pub fn rle_decode(data: &[u8], block_size: usize) -> Option<Vec<u8>> {
    if block_size == 0 {
        return None;
    }

    let mut out = Vec::with_capacity(data.len() * 2);
    let mut offset = 0;

    while offset < data.len() {
        let ctrl = data[offset];
        offset += 1;

        if ctrl & RAW_FLAG != 0 {
            let need = usize::from(ctrl & !RAW_FLAG).checked_mul(block_size)?;
            let Some(raw) = data.get(offset..offset.checked_add(need)?) else {
                tracing::debug!("rle raw record truncated at offset {}", offset - 1);
                return None;
            };
            out.extend_from_slice(raw);
            offset += need;
        } else {
            let Some(block) = data.get(offset..offset.checked_add(block_size)?) else {
                tracing::debug!("rle repeat record missing block at offset {}", offset - 1);
                return None;
            };
            for _ in 0..ctrl {
                out.extend_from_slice(block);
            }
            offset += block_size;
        }
    }

    Some(out)
}

/// Encode `data` (a whole number of `block_size`-byte blocks) as RLE.
///
/// Two or more equal consecutive blocks become a repeat record; everything
/// else is grouped into raw records. Returns `None` if `data` is not block
/// aligned.
pub fn rle_encode(data: &[u8], block_size: usize) -> Option<Vec<u8>> {
    if block_size == 0 || data.len() % block_size != 0 {
        return None;
    }

    let blocks: Vec<&[u8]> = data.chunks_exact(block_size).collect();
    let mut out = Vec::with_capacity(data.len() + data.len() / block_size / MAX_RUN + 1);
    let mut i = 0;

    while i < blocks.len() {
        let run = blocks[i..]
            .iter()
            .take(MAX_RUN)
            .take_while(|b| **b == blocks[i])
            .count();

        if run >= 2 {
            out.push(run as u8);
            out.extend_from_slice(blocks[i]);
            i += run;
            continue;
        }

        // Collect unique blocks until the next repeat starts.
        let start = i;
        while i < blocks.len()
            && i - start < MAX_RUN
            && !(i + 1 < blocks.len() && blocks[i] == blocks[i + 1])
        {
            i += 1;
        }
        out.push(RAW_FLAG | (i - start) as u8);
        for block in &blocks[start..i] {
            out.extend_from_slice(block);
        }
    }

    Some(out)
}

// ── Tests ────────────────────────────────────────────────────────
