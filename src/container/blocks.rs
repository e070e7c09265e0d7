//! Block tag constants and typed payloads for the handful of MLV block
//! kinds the core understands. Every block carries a common 16-byte
//! prefix (`{type[4], size[4], timestamp[8]}`, spec §6); the structs here
//! describe what follows that prefix for each known type.
//!
//! Field layouts are this crate's own stable, documented encoding (spec
//! §6 calls block internals "implementation-defined but stable") rather
//! than a byte-for-byte mirror of any particular upstream recorder;
//! what must hold is internal consistency between the writer used by
//! tests and the reader used by the pipeline.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Cursor, Read, Write};

use chrono::NaiveDateTime;

pub const BLOCK_PREFIX_LEN: u64 = 16;

pub const TAG_MLVI: [u8; 4] = *b"MLVI";
pub const TAG_RAWI: [u8; 4] = *b"RAWI";
pub const TAG_RTCI: [u8; 4] = *b"RTCI";
pub const TAG_IDNT: [u8; 4] = *b"IDNT";
pub const TAG_EXPO: [u8; 4] = *b"EXPO";
pub const TAG_LENS: [u8; 4] = *b"LENS";
pub const TAG_WBAL: [u8; 4] = *b"WBAL";
pub const TAG_WAVI: [u8; 4] = *b"WAVI";
pub const TAG_VIDF: [u8; 4] = *b"VIDF";
pub const TAG_AUDF: [u8; 4] = *b"AUDF";
pub const TAG_DEBG: [u8; 4] = *b"DEBG";
pub const TAG_NULL: [u8; 4] = *b"NULL";

/// Classification of a block's 4-byte tag. `Other` covers `NULL` and any
/// tag this crate does not model — those blocks still get an xref entry
/// (scan invariant (i)) but never contribute to a `FrameRecord`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Mlvi,
    Rawi,
    Rtci,
    Idnt,
    Expo,
    Lens,
    Wbal,
    Wavi,
    Vidf,
    Audf,
    Debg,
    Other([u8; 4]),
}

impl BlockKind {
    pub fn from_tag(tag: [u8; 4]) -> Self {
        match tag {
            TAG_MLVI => BlockKind::Mlvi,
            TAG_RAWI => BlockKind::Rawi,
            TAG_RTCI => BlockKind::Rtci,
            TAG_IDNT => BlockKind::Idnt,
            TAG_EXPO => BlockKind::Expo,
            TAG_LENS => BlockKind::Lens,
            TAG_WBAL => BlockKind::Wbal,
            TAG_WAVI => BlockKind::Wavi,
            TAG_VIDF => BlockKind::Vidf,
            TAG_AUDF => BlockKind::Audf,
            TAG_DEBG => BlockKind::Debg,
            other => BlockKind::Other(other),
        }
    }

    pub fn is_vidf(&self) -> bool {
        matches!(self, BlockKind::Vidf)
    }
}

/// Bayer CFA order, stored as the four-character pattern DNG's
/// `CFAPattern` tag expects, e.g. `b"RGGB"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BayerPattern(pub [u8; 4]);

impl BayerPattern {
    pub const RGGB: BayerPattern = BayerPattern(*b"RGGB");
    pub const BGGR: BayerPattern = BayerPattern(*b"BGGR");
    pub const GRBG: BayerPattern = BayerPattern(*b"GRBG");
    pub const GBRG: BayerPattern = BayerPattern(*b"GBRG");

    /// DNG's `CFAPattern` tag wants 0=Red,1=Green,2=Blue,3=Cyan... index
    /// codes, not ASCII. This maps the 4 ASCII bytes to their DNG color
    /// plane indices.
    pub fn dng_indices(&self) -> [u8; 4] {
        self.0.map(|c| match c {
            b'R' => 0,
            b'G' => 1,
            b'B' => 2,
            _ => 1,
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct MlviBlock {
    pub file_num: u32,
    pub video_class: u16,
    pub audio_class: u16,
    pub frame_count: u32,
    pub fps_num: u32,
    pub fps_denom: u32,
}

impl MlviBlock {
    pub const WIRE_LEN: usize = 4 + 2 + 2 + 4 + 4 + 4;

    pub fn is_lzma(&self) -> bool {
        self.video_class & 0x01 != 0
    }

    pub fn is_lj92(&self) -> bool {
        self.video_class & 0x02 != 0
    }

    pub fn fps(&self) -> f64 {
        if self.fps_denom == 0 {
            0.0
        } else {
            self.fps_num as f64 / self.fps_denom as f64
        }
    }

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        Ok(Self {
            file_num: data.read_u32::<LittleEndian>()?,
            video_class: data.read_u16::<LittleEndian>()?,
            audio_class: data.read_u16::<LittleEndian>()?,
            frame_count: data.read_u32::<LittleEndian>()?,
            fps_num: data.read_u32::<LittleEndian>()?,
            fps_denom: data.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.file_num)?;
        out.write_u16::<LittleEndian>(self.video_class)?;
        out.write_u16::<LittleEndian>(self.audio_class)?;
        out.write_u32::<LittleEndian>(self.frame_count)?;
        out.write_u32::<LittleEndian>(self.fps_num)?;
        out.write_u32::<LittleEndian>(self.fps_denom)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RawiBlock {
    pub width: u32,
    pub height: u32,
    pub bits_per_pixel: u16,
    pub black_level: u16,
    pub white_level: u16,
    pub pattern: BayerPattern,
    pub crop_x: u16,
    pub crop_y: u16,
}

impl RawiBlock {
    pub const WIRE_LEN: usize = 4 + 4 + 2 + 2 + 2 + 4 + 2 + 2;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        let width = data.read_u32::<LittleEndian>()?;
        let height = data.read_u32::<LittleEndian>()?;
        let bits_per_pixel = data.read_u16::<LittleEndian>()?;
        let black_level = data.read_u16::<LittleEndian>()?;
        let white_level = data.read_u16::<LittleEndian>()?;
        let mut pattern = [0u8; 4];
        data.read_exact(&mut pattern)?;
        let crop_x = data.read_u16::<LittleEndian>()?;
        let crop_y = data.read_u16::<LittleEndian>()?;
        Ok(Self {
            width,
            height,
            bits_per_pixel,
            black_level,
            white_level,
            pattern: BayerPattern(pattern),
            crop_x,
            crop_y,
        })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.width)?;
        out.write_u32::<LittleEndian>(self.height)?;
        out.write_u16::<LittleEndian>(self.bits_per_pixel)?;
        out.write_u16::<LittleEndian>(self.black_level)?;
        out.write_u16::<LittleEndian>(self.white_level)?;
        out.write_all(&self.pattern.0)?;
        out.write_u16::<LittleEndian>(self.crop_x)?;
        out.write_u16::<LittleEndian>(self.crop_y)
    }

    pub fn pixel_count(&self) -> u64 {
        self.width as u64 * self.height as u64
    }

    pub fn image_byte_len(&self) -> u64 {
        self.pixel_count() * 2
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RtciBlock {
    pub datetime: NaiveDateTime,
}

impl RtciBlock {
    pub const WIRE_LEN: usize = 8;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        let year = data.read_u16::<LittleEndian>()?;
        let month = data.read_u8()?;
        let day = data.read_u8()?;
        let hour = data.read_u8()?;
        let minute = data.read_u8()?;
        let second = data.read_u8()?;
        let _reserved = data.read_u8()?;
        let datetime = chrono::NaiveDate::from_ymd_opt(year as i32, month.max(1) as u32, day.max(1) as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
            .unwrap_or_else(|| chrono::NaiveDateTime::UNIX_EPOCH);
        Ok(Self { datetime })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        use chrono::Datelike;
        use chrono::Timelike;
        out.write_u16::<LittleEndian>(self.datetime.year() as u16)?;
        out.write_u8(self.datetime.month() as u8)?;
        out.write_u8(self.datetime.day() as u8)?;
        out.write_u8(self.datetime.hour() as u8)?;
        out.write_u8(self.datetime.minute() as u8)?;
        out.write_u8(self.datetime.second() as u8)?;
        out.write_u8(0)
    }
}

#[derive(Debug, Clone)]
pub struct IdntBlock {
    pub camera_model: u32,
    pub camera_name: String,
}

impl IdntBlock {
    pub fn wire_len(&self) -> usize {
        4 + 2 + self.camera_name.len()
    }

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        let camera_model = data.read_u32::<LittleEndian>()?;
        let name_len = data.read_u16::<LittleEndian>()? as usize;
        let mut buf = vec![0u8; name_len];
        data.read_exact(&mut buf)?;
        let camera_name = String::from_utf8_lossy(&buf).into_owned();
        Ok(Self { camera_model, camera_name })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.camera_model)?;
        let bytes = self.camera_name.as_bytes();
        out.write_u16::<LittleEndian>(bytes.len() as u16)?;
        out.write_all(bytes)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ExpoBlock {
    pub shutter_us: u64,
    pub iso: u32,
}

impl ExpoBlock {
    pub const WIRE_LEN: usize = 8 + 4;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        Ok(Self {
            shutter_us: data.read_u64::<LittleEndian>()?,
            iso: data.read_u32::<LittleEndian>()?,
        })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u64::<LittleEndian>(self.shutter_us)?;
        out.write_u32::<LittleEndian>(self.iso)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LensBlock {
    pub focal_len_mm: f32,
    pub aperture: f32,
}

impl LensBlock {
    pub const WIRE_LEN: usize = 4 + 4;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        Ok(Self {
            focal_len_mm: data.read_f32::<LittleEndian>()?,
            aperture: data.read_f32::<LittleEndian>()?,
        })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_f32::<LittleEndian>(self.focal_len_mm)?;
        out.write_f32::<LittleEndian>(self.aperture)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WbalBlock {
    pub gain_r: f64,
    pub gain_g: f64,
    pub gain_b: f64,
}

impl WbalBlock {
    pub const WIRE_LEN: usize = 8 * 3;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        Ok(Self {
            gain_r: data.read_f64::<LittleEndian>()?,
            gain_g: data.read_f64::<LittleEndian>()?,
            gain_b: data.read_f64::<LittleEndian>()?,
        })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_f64::<LittleEndian>(self.gain_r)?;
        out.write_f64::<LittleEndian>(self.gain_g)?;
        out.write_f64::<LittleEndian>(self.gain_b)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WaviBlock {
    pub format_tag: u16,
    pub channels: u16,
    pub samples_per_sec: u32,
    pub bits_per_sample: u16,
}

impl WaviBlock {
    pub const WIRE_LEN: usize = 2 + 2 + 4 + 2 + 2;

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        let format_tag = data.read_u16::<LittleEndian>()?;
        let channels = data.read_u16::<LittleEndian>()?;
        let samples_per_sec = data.read_u32::<LittleEndian>()?;
        let bits_per_sample = data.read_u16::<LittleEndian>()?;
        let _reserved = data.read_u16::<LittleEndian>()?;
        Ok(Self { format_tag, channels, samples_per_sec, bits_per_sample })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u16::<LittleEndian>(self.format_tag)?;
        out.write_u16::<LittleEndian>(self.channels)?;
        out.write_u32::<LittleEndian>(self.samples_per_sec)?;
        out.write_u16::<LittleEndian>(self.bits_per_sample)?;
        out.write_u16::<LittleEndian>(0)
    }

    pub fn block_align(&self) -> u16 {
        self.channels * (self.bits_per_sample / 8)
    }

    pub fn byte_rate(&self) -> u32 {
        self.samples_per_sec * self.block_align() as u32
    }
}

/// Fixed part of a `VIDF`/`AUDF` block, common to both frame kinds.
#[derive(Debug, Clone, Copy)]
pub struct FrameBlockHeader {
    pub frame_number: u32,
    pub frame_space: u32,
}

impl FrameBlockHeader {
    pub const WIRE_LEN: usize = 4 + 4 + 4; // includes 4 reserved bytes

    pub fn parse(mut data: impl Read) -> io::Result<Self> {
        let frame_number = data.read_u32::<LittleEndian>()?;
        let frame_space = data.read_u32::<LittleEndian>()?;
        let _reserved = data.read_u32::<LittleEndian>()?;
        Ok(Self { frame_number, frame_space })
    }

    pub fn write(&self, mut out: impl Write) -> io::Result<()> {
        out.write_u32::<LittleEndian>(self.frame_number)?;
        out.write_u32::<LittleEndian>(self.frame_space)?;
        out.write_u32::<LittleEndian>(0)
    }
}

/// A `VIDF` block's header plus where its pixel payload lives.
#[derive(Debug, Clone, Copy)]
pub struct VidfHeader {
    pub frame_number: u32,
    pub timestamp: u64,
    pub frame_space: u32,
    /// Absolute chunk-relative offset of the first payload byte.
    pub payload_offset: u64,
    /// Length of the payload (compressed or packed, per `MLVI.videoClass`).
    pub payload_len: u32,
}

/// An `AUDF` block's header plus where its PCM payload lives.
#[derive(Debug, Clone, Copy)]
pub struct AudfHeader {
    pub timestamp: u64,
    pub payload_offset: u64,
    pub payload_len: u32,
}

pub(crate) fn cursor(data: &[u8]) -> Cursor<&[u8]> {
    Cursor::new(data)
}
