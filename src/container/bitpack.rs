//! Bit-packing for uncompressed raw payloads. Samples are packed
//! contiguously at `bits_per_pixel` bits each, LSB-first within a
//! little-endian bitstream formed by reading the source bytes in order.

/// Unpacks `count` samples of `bpp` bits each from `data`, least
/// significant bit first, after first discarding `bit_offset` leading
/// bits. `bit_offset` lets a caller start mid-word when the sample it
/// wants does not begin at a byte boundary. `bpp` must be in `{10, 12,
/// 14, 16}`; any other value still works bit-mechanically but is not a
/// format MLV emits.
pub fn unpack_bits(data: &[u8], bpp: u16, count: usize, bit_offset: u32) -> Vec<u16> {
    let bpp = bpp as u32;
    let mut out = Vec::with_capacity(count);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;
    let mut byte_pos = 0usize;

    let mut to_discard = bit_offset;
    while to_discard > 0 {
        while acc_bits < to_discard && byte_pos < data.len() {
            acc |= (data[byte_pos] as u64) << acc_bits;
            acc_bits += 8;
            byte_pos += 1;
        }
        let take = to_discard.min(acc_bits);
        acc >>= take;
        acc_bits -= take;
        to_discard -= take;
        if take == 0 {
            break;
        }
    }

    while out.len() < count {
        while acc_bits < bpp && byte_pos < data.len() {
            acc |= (data[byte_pos] as u64) << acc_bits;
            acc_bits += 8;
            byte_pos += 1;
        }
        if acc_bits < bpp {
            out.push(0);
            continue;
        }
        let mask = (1u64 << bpp) - 1;
        out.push((acc & mask) as u16);
        acc >>= bpp;
        acc_bits -= bpp;
    }

    out
}

/// Inverse of [`unpack_bits`]: packs `samples` (each holding at most
/// `bpp` significant bits) into a tightly-packed LSB-first bitstream.
pub fn pack_bits(samples: &[u16], bpp: u16) -> Vec<u8> {
    let bpp = bpp as u32;
    let mask = (1u64 << bpp) - 1;
    let mut out = Vec::with_capacity((samples.len() * bpp as usize + 7) / 8);
    let mut acc: u64 = 0;
    let mut acc_bits: u32 = 0;

    for &s in samples {
        acc |= (s as u64 & mask) << acc_bits;
        acc_bits += bpp;
        while acc_bits >= 8 {
            out.push((acc & 0xFF) as u8);
            acc >>= 8;
            acc_bits -= 8;
        }
    }
    if acc_bits > 0 {
        out.push((acc & 0xFF) as u8);
    }
    out
}

/// Number of 16-bit source words needed to unpack `len` output bytes
/// (i.e. `len/2` samples) at `bpp`, including the two-sample tail
/// padding the frame-record math in `raw_payload` relies on.
pub fn words_needed_for_bytes(len: usize, bpp: u16) -> usize {
    let samples = len / 2 + 2;
    let bits = samples * bpp as usize;
    (bits + 15) / 16
}
