//! A from-scratch decoder for the subset of the lossless-JPEG (LJ92)
//! bitstream that MLV recordings use: one component, one Huffman table,
//! one scan, predictors 1-7 per ITU-T.81 Annex H. There is no
//! maintained crate for this format in the wider ecosystem, so this is
//! original decode logic rather than a vendored dependency.
//!
//! A matching encoder lives under `#[cfg(test)]` purely to produce
//! round-trip fixtures; it is never used by the materialization
//! pipeline.

use crate::error::{MlvError, Result};

const MARKER_SOI: u8 = 0xD8;
const MARKER_EOI: u8 = 0xD9;
const MARKER_SOF3: u8 = 0xC3;
const MARKER_DHT: u8 = 0xC4;
const MARKER_SOS: u8 = 0xDA;

#[derive(Debug, Clone)]
pub struct DecodedImage {
    pub width: u16,
    pub height: u16,
    pub precision: u8,
    pub samples: Vec<u16>,
}

struct HuffTable {
    /// `(code, length) -> symbol`, built canonically from the 16
    /// per-length counts and the symbol list, in the order JPEG defines.
    codes: Vec<(u16, u8, u8)>,
}

impl HuffTable {
    fn build(counts: &[u8; 16], symbols: &[u8]) -> Self {
        let mut codes = Vec::with_capacity(symbols.len());
        let mut code: u16 = 0;
        let mut sym_idx = 0;
        for (len_idx, &count) in counts.iter().enumerate() {
            let length = (len_idx + 1) as u8;
            for _ in 0..count {
                codes.push((code, length, symbols[sym_idx]));
                sym_idx += 1;
                code += 1;
            }
            code <<= 1;
        }
        Self { codes }
    }

    fn lookup(&self, code: u16, length: u8) -> Option<u8> {
        self.codes
            .iter()
            .find(|(c, l, _)| *c == code && *l == length)
            .map(|(_, _, s)| *s)
    }
}

struct BitReader<'a> {
    data: &'a [u8],
    pos: usize,
    acc: u32,
    acc_bits: u32,
}

impl<'a> BitReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0, acc: 0, acc_bits: 0 }
    }

    /// Fetches the next raw entropy-coded byte, un-stuffing `0xFF 0x00`
    /// into a literal `0xFF`. Returns `None` at a real marker or EOF.
    fn next_byte(&mut self) -> Option<u8> {
        if self.pos >= self.data.len() {
            return None;
        }
        let b = self.data[self.pos];
        if b == 0xFF {
            let next = self.data.get(self.pos + 1).copied().unwrap_or(0);
            if next == 0x00 {
                self.pos += 2;
                return Some(0xFF);
            }
            return None; // real marker: end of entropy-coded segment
        }
        self.pos += 1;
        Some(b)
    }

    fn read_bit(&mut self) -> Option<u8> {
        if self.acc_bits == 0 {
            let b = self.next_byte()?;
            self.acc = b as u32;
            self.acc_bits = 8;
        }
        self.acc_bits -= 1;
        Some(((self.acc >> self.acc_bits) & 1) as u8)
    }

    fn read_bits(&mut self, n: u8) -> Option<u16> {
        let mut v: u16 = 0;
        for _ in 0..n {
            v = (v << 1) | self.read_bit()? as u16;
        }
        Some(v)
    }

    fn decode_huffman(&mut self, table: &HuffTable) -> Option<u8> {
        let mut code: u16 = 0;
        for length in 1..=16u8 {
            code = (code << 1) | self.read_bit()? as u16;
            if let Some(sym) = table.lookup(code, length) {
                return Some(sym);
            }
        }
        None
    }
}

/// Sign-extends a JPEG "magnitude category" value: `bits` holds the raw
/// `size`-bit field, `size` the category (0 = difference of exactly 0).
fn extend(bits: u16, size: u8) -> i32 {
    if size == 0 {
        return 0;
    }
    let vt = 1i32 << (size - 1);
    let v = bits as i32;
    if v < vt {
        v - (1 << size) + 1
    } else {
        v
    }
}

/// Decodes a complete LJ92 bitstream into a flat row-major sample array.
/// Validates that the decoded sample count matches `expected_w *
/// expected_h`, per the mismatch check this format's decoders are
/// expected to perform.
pub fn decode(data: &[u8], expected_w: u16, expected_h: u16) -> Result<DecodedImage> {
    let malformed = |detail: &str| MlvError::Malformed { container: "lj92".into(), detail: detail.to_string() };

    let mut pos = 0usize;
    let next_marker = |pos: &mut usize| -> Option<u8> {
        while *pos + 1 < data.len() {
            if data[*pos] == 0xFF && data[*pos + 1] != 0x00 && data[*pos + 1] != 0xFF {
                let m = data[*pos + 1];
                *pos += 2;
                return Some(m);
            }
            *pos += 1;
        }
        None
    };

    let soi = next_marker(&mut pos).ok_or_else(|| malformed("no SOI marker"))?;
    if soi != MARKER_SOI {
        return Err(malformed("expected SOI marker"));
    }

    let mut width = 0u16;
    let mut height = 0u16;
    let mut precision = 0u8;
    let mut huff_table: Option<HuffTable> = None;
    let mut predictor: u8 = 1;

    loop {
        let marker = next_marker(&mut pos).ok_or_else(|| malformed("unexpected end of stream before SOS"))?;
        match marker {
            MARKER_SOF3 => {
                let len = read_u16_be(data, pos)? as usize;
                let seg = &data[pos + 2..pos + len];
                precision = seg[0];
                height = u16::from_be_bytes([seg[1], seg[2]]);
                width = u16::from_be_bytes([seg[3], seg[4]]);
                let num_components = seg[5];
                if num_components != 1 {
                    return Err(malformed("only single-component LJ92 streams are supported"));
                }
                pos += len;
            }
            MARKER_DHT => {
                let len = read_u16_be(data, pos)? as usize;
                let seg = &data[pos + 2..pos + len];
                let mut counts = [0u8; 16];
                counts.copy_from_slice(&seg[1..17]);
                let total: usize = counts.iter().map(|&c| c as usize).sum();
                let symbols = &seg[17..17 + total];
                huff_table = Some(HuffTable::build(&counts, symbols));
                pos += len;
            }
            MARKER_SOS => {
                let len = read_u16_be(data, pos)? as usize;
                let seg = &data[pos + 2..pos + len];
                // seg: ns(1), {cs,td}(2)*ns, Ss(1), Se(1), AhAl(1)
                predictor = seg[seg.len() - 3];
                pos += len;
                break;
            }
            MARKER_EOI => return Err(malformed("EOI before SOS")),
            _ => {
                let len = read_u16_be(data, pos)? as usize;
                pos += len;
            }
        }
    }

    if width == 0 || height == 0 {
        return Err(malformed("missing SOF3 dimensions"));
    }
    if width != expected_w || height != expected_h {
        return Err(malformed(&format!(
            "decoded dimensions {width}x{height} do not match expected {expected_w}x{expected_h}"
        )));
    }
    let table = huff_table.ok_or_else(|| malformed("no Huffman table before SOS"))?;

    let mut reader = BitReader::new(&data[pos..]);
    let mut samples = Vec::with_capacity(width as usize * height as usize);
    let default_pred: i32 = 1 << (precision.saturating_sub(1));

    for row in 0..height as usize {
        for col in 0..width as usize {
            let size = reader
                .decode_huffman(&table)
                .ok_or_else(|| malformed("huffman decode underflow"))?;
            let diff_bits = if size > 0 {
                reader.read_bits(size).ok_or_else(|| malformed("magnitude bits underflow"))?
            } else {
                0
            };
            let diff = extend(diff_bits, size);

            let left = if col > 0 { samples[row * width as usize + col - 1] as i32 } else { -1 };
            let above = if row > 0 { samples[(row - 1) * width as usize + col] as i32 } else { -1 };
            let above_left =
                if row > 0 && col > 0 { samples[(row - 1) * width as usize + col - 1] as i32 } else { -1 };

            let predicted = if row == 0 && col == 0 {
                default_pred
            } else if row == 0 {
                left
            } else if col == 0 {
                above
            } else {
                match predictor {
                    1 => left,
                    2 => above,
                    3 => above_left,
                    4 => left + above - above_left,
                    5 => left + ((above - above_left) >> 1),
                    6 => above + ((left - above_left) >> 1),
                    7 => (left + above) >> 1,
                    _ => left,
                }
            };

            let value = (predicted + diff).clamp(0, (1 << precision) - 1) as u16;
            samples.push(value);
        }
    }

    if samples.len() != width as usize * height as usize {
        return Err(malformed("short entropy-coded segment"));
    }

    Ok(DecodedImage { width, height, precision, samples })
}

fn read_u16_be(data: &[u8], pos: usize) -> Result<u16> {
    data.get(pos..pos + 2)
        .map(|b| u16::from_be_bytes([b[0], b[1]]))
        .ok_or_else(|| MlvError::Malformed { container: "lj92".into(), detail: "truncated segment length".into() })
}

#[cfg(test)]
mod encoder {
    //! Minimal predictor-1 LJ92 encoder, used only to build test fixtures.
    use super::*;

    struct BitWriter {
        out: Vec<u8>,
        acc: u32,
        acc_bits: u8,
    }

    impl BitWriter {
        fn new() -> Self {
            Self { out: Vec::new(), acc: 0, acc_bits: 0 }
        }

        fn push_bits(&mut self, value: u16, n: u8) {
            for i in (0..n).rev() {
                let bit = (value >> i) & 1;
                self.acc = (self.acc << 1) | bit as u32;
                self.acc_bits += 1;
                if self.acc_bits == 8 {
                    let byte = self.acc as u8;
                    self.out.push(byte);
                    if byte == 0xFF {
                        self.out.push(0x00);
                    }
                    self.acc = 0;
                    self.acc_bits = 0;
                }
            }
        }

        fn finish(mut self) -> Vec<u8> {
            if self.acc_bits > 0 {
                let byte = (self.acc << (8 - self.acc_bits)) as u8;
                self.out.push(byte);
                if byte == 0xFF {
                    self.out.push(0x00);
                }
            }
            self.out
        }
    }

    fn category(diff: i32) -> (u8, u16) {
        if diff == 0 {
            return (0, 0);
        }
        let mag = diff.unsigned_abs();
        let size = 32 - mag.leading_zeros() as u8;
        let bits = if diff > 0 { diff as u16 } else { (diff + (1 << size) - 1) as u16 };
        (size, bits)
    }

    /// Encodes `samples` (row-major, `width*height` long) at `precision`
    /// bits/sample using a fixed, non-canonical but self-consistent
    /// Huffman table (size-categories 0..=16 mapped 1:1 to symbols
    /// 0..=16, one bit per size via a flat unary-ish code is replaced
    /// here by a simple fixed 5-bit code per category for decoder
    /// compatibility with [`super::decode`]'s generic table builder).
    pub fn encode(samples: &[u16], width: u16, height: u16, precision: u8) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&[0xFF, super::MARKER_SOI]);

        // One DHT assigning each category 0..=16 a distinct 5-bit code,
        // built the same canonical way the decoder expects: one symbol
        // per length where possible. We spread categories across
        // lengths 1..=16, one per length (more than enough for 17
        // categories needs two at the max length).
        let symbols: Vec<u8> = (0u8..=16).collect();
        let mut counts = [0u8; 16];
        for (i, _) in symbols.iter().enumerate() {
            let length_idx = i.min(15);
            counts[length_idx] += 1;
        }
        let mut dht = vec![0u8; 17 + symbols.len()];
        dht[0] = 0x00;
        dht[1..17].copy_from_slice(&counts);
        dht[17..].copy_from_slice(&symbols);
        let dht_len = (dht.len() + 2) as u16;
        out.extend_from_slice(&[0xFF, super::MARKER_DHT]);
        out.extend_from_slice(&dht_len.to_be_bytes());
        out.extend_from_slice(&dht);

        let table = super::HuffTable::build(&counts, &symbols);

        let sof_body = {
            let mut v = vec![precision];
            v.extend_from_slice(&height.to_be_bytes());
            v.extend_from_slice(&width.to_be_bytes());
            v.push(1); // one component
            v.extend_from_slice(&[1, 0x11, 0]);
            v
        };
        let sof_len = (sof_body.len() + 2) as u16;
        out.extend_from_slice(&[0xFF, super::MARKER_SOF3]);
        out.extend_from_slice(&sof_len.to_be_bytes());
        out.extend_from_slice(&sof_body);

        let sos_body = vec![1u8, 1, 0, 1, 0, 0]; // predictor = 1 (Ss field)
        let sos_len = (sos_body.len() + 2) as u16;
        out.extend_from_slice(&[0xFF, super::MARKER_SOS]);
        out.extend_from_slice(&sos_len.to_be_bytes());
        out.extend_from_slice(&sos_body);

        let mut writer = BitWriter::new();
        let default_pred: i32 = 1 << (precision.saturating_sub(1));
        for row in 0..height as usize {
            for col in 0..width as usize {
                let current = samples[row * width as usize + col] as i32;
                let left = if col > 0 { samples[row * width as usize + col - 1] as i32 } else { -1 };
                let above = if row > 0 { samples[(row - 1) * width as usize + col] as i32 } else { -1 };
                let predicted = if row == 0 && col == 0 {
                    default_pred
                } else if row == 0 {
                    left
                } else if col == 0 {
                    above
                } else {
                    left
                };
                let diff = current - predicted;
                let (size, bits) = category(diff);
                let code_entry = table.codes.iter().find(|(_, _, s)| *s == size).expect("size has a code");
                writer.push_bits(code_entry.0, code_entry.1);
                if size > 0 {
                    writer.push_bits(bits, size);
                }
            }
        }
        out.extend_from_slice(&writer.finish());
        out.extend_from_slice(&[0xFF, super::MARKER_EOI]);
        out
    }
}
