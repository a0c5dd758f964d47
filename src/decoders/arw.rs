use std::cmp;
use std::collections::HashSet;
use std::io::Cursor;
use std::sync::atomic::{AtomicU64, Ordering};

use log::debug;

use crate::bits::{Endian, LEu32};
use crate::decoders::{decode_threaded, ensure_not_cancelled, fetch_tiff_tag, RawDetails, RawType, Wb};
use crate::formats::tiff::{TiffError, TiffReader, Value, IFD};
use crate::imgop::curve::{sony_knee_curve, CurveLut};
use crate::imgop::develop::{develop_raw, DevelopParams};
use crate::packed::decode_raw14;
use crate::pixarray::{PixU16, Rgba16};
use crate::pumps::{BitPump, BitPumpLSB};
use crate::rawsource::RawSource;
use crate::sr2::sr2_decrypt;
use crate::tags::{Sr2IfdTag, TiffCommonTag};
use crate::{ArwError, CancelToken, DecodeOptions, Result};

/// Black level of the reference sensor generation on the 14 bit scale,
/// used when the SR2 block carries no level tags.
const DEFAULT_BLACK_LEVEL: u16 = 512;

/// Decoder for Sony ARW files.
///
/// Construction parses the TIFF tree (including the nested Exif, GPS and
/// Sony private IFDs); the raw payload is only touched by `raw_image`.
#[derive(Debug, Clone)]
pub struct ArwDecoder {
  source: RawSource,
  tiff: TiffReader,
}

impl ArwDecoder {
  pub fn new(source: &RawSource) -> Result<Self> {
    let tiff = TiffReader::new(&mut source.reader())?;
    Ok(ArwDecoder {
      source: source.clone(),
      tiff,
    })
  }

  pub fn tiff(&self) -> &TiffReader {
    &self.tiff
  }

  /// Parse the vendor makernote as a TIFF fragment. Entries with unknown
  /// tags are preserved as opaque values; a file without makernotes
  /// yields `None`.
  pub fn makernote(&self) -> Result<Option<IFD>> {
    match self.tiff.find_first_ifd_with_tag(TiffCommonTag::MakerNote) {
      Some(ifd) => Ok(ifd.parse_makernote(&mut self.source.reader(), self.source.len())?),
      None => Ok(None),
    }
  }

  /// Byte extent of the embedded JPEG preview, if the file carries one.
  /// Extracting the bytes is a plain range copy left to the caller.
  pub fn thumbnail_range(&self) -> Option<(u64, u64)> {
    let offset = self.tiff.get_entry(TiffCommonTag::JPEGInterchangeFormat)?.get_u32(0)?;
    let length = self.tiff.get_entry(TiffCommonTag::JPEGInterchangeFormatLength)?.get_u32(0)?;
    Some((offset as u64, length as u64))
  }

  /// Gather payload geometry and calibration for the raw image: the data
  /// IFD's strip tags, the declared raw type, and the white balance,
  /// black level and tone curve hidden in the encrypted SR2 sub-IFD.
  pub fn raw_details(&self) -> Result<RawDetails> {
    let data = self.tiff.find_ifds_with_tag(TiffCommonTag::StripOffsets);
    if data.is_empty() {
      return Err(ArwError::MissingTag(TiffCommonTag::StripOffsets as u16));
    }
    let raw = data[0];

    let width = fetch_tiff_tag!(raw, TiffCommonTag::ImageWidth).force_usize(0);
    let height = fetch_tiff_tag!(raw, TiffCommonTag::ImageLength).force_usize(0);
    let bit_depth = fetch_tiff_tag!(raw, TiffCommonTag::BitsPerSample).force_usize(0);
    let offset = fetch_tiff_tag!(raw, TiffCommonTag::StripOffsets).force_u32(0) as u64;
    let length = fetch_tiff_tag!(raw, TiffCommonTag::StripByteCounts).force_u32(0) as u64;

    if offset + length > self.source.len() {
      return Err(
        TiffError::OffsetOutOfRange {
          offset,
          len: length,
          file_len: self.source.len(),
        }
        .into(),
      );
    }

    let raw_type = self.raw_type(raw, bit_depth)?;

    // RowsPerStrip is repurposed by the raw14 layout as twice the stored
    // samples-per-row count.
    let stride = match raw_type {
      RawType::Raw14 => raw
        .get_entry(TiffCommonTag::RowsPerStrip)
        .and_then(|e| e.get_usize(0))
        .map(|rows| rows / 2)
        .unwrap_or(width),
      _ => width,
    };

    let gamma_curve = match raw_type {
      RawType::Craw => Self::get_curve(raw)?,
      _ => None,
    };

    let sr2 = self.sr2_calibration()?;
    if sr2.is_none() {
      debug!("No SR2 calibration found, falling back to neutral development");
    }
    let sr2 = sr2.unwrap_or_default();

    let details = RawDetails {
      width,
      height,
      bit_depth,
      raw_type,
      offset,
      length,
      stride: stride.max(width),
      black_level: sr2.black_level.unwrap_or(DEFAULT_BLACK_LEVEL),
      white_balance: sr2.wb.unwrap_or_default(),
      brightness: 1.0,
      gamma_curve,
    };
    debug!("ARW raw details: {:?}", details);
    Ok(details)
  }

  /// Unpack the raw payload into the Bayer grid.
  pub fn raw_image(&self, details: &RawDetails, cancel: &CancelToken) -> Result<PixU16> {
    let src = self.source.subview(details.offset, details.length)?;
    match details.raw_type {
      RawType::Raw14 => decode_raw14(src, details.width, details.height, details.stride, cancel),
      RawType::Craw => Self::decode_craw(src, details.width, details.height, cancel),
      unsupported => Err(ArwError::UnsupportedRawType(unsupported as u16)),
    }
  }

  /// Run the full decode: details, unpack, develop.
  pub fn decode(&self, options: &DecodeOptions) -> Result<Rgba16> {
    let mut details = self.raw_details()?;
    if let Some(black) = options.black_level_override {
      details.black_level = black;
    }
    if let Some(wb) = options.white_balance_override {
      details.white_balance = wb;
    }

    let grid = self.raw_image(&details, &options.cancel)?;

    let params = DevelopParams {
      black_level: details.black_level,
      wb: details.white_balance,
      brightness: details.brightness,
      curve: if options.disable_gamma { None } else { details.gamma_curve.clone() },
      demosaic: options.demosaic,
    };
    develop_raw(&grid, &params, &options.cancel)
  }

  fn raw_type(&self, raw: &IFD, bit_depth: usize) -> Result<RawType> {
    if let Some(entry) = self.tiff.get_entry(TiffCommonTag::SonyRawFileType) {
      let value = entry.force_u16(0);
      return RawType::from_tag(value).ok_or(ArwError::UnsupportedRawType(value));
    }
    // Older files carry no raw type tag; infer it from the compression
    // scheme and sample depth.
    let compression = raw.get_entry(TiffCommonTag::Compression).and_then(|e| e.get_u32(0)).unwrap_or(1);
    match (compression, bit_depth) {
      (32767, 8) => Ok(RawType::Craw),
      (32767, 12) | (1, 12) => Ok(RawType::Raw12),
      (1, _) => Ok(RawType::Raw14),
      _ => Err(ArwError::UnsupportedRawType(compression as u16)),
    }
  }

  /// Decode the cRAW payload. Each row is a byte-per-sample bitstream of
  /// 16-sample sub-blocks, two of them channel-interleaved per 32 pixel
  /// span: 11 bit max, 11 bit min, two 4 bit anchor positions and 14
  /// deltas of 7 bits. The quantization shift follows from how far
  /// max-min exceeds the 7 bit delta range. Blocks whose anchors are
  /// inverted (min > max) poison the decode as a corrupt stream.
  pub(crate) fn decode_craw(buf: &[u8], width: usize, height: usize, cancel: &CancelToken) -> Result<PixU16> {
    if buf.len() < width * height {
      return Err(ArwError::CorruptRawStream(buf.len() as u64));
    }
    let corrupt_at = AtomicU64::new(u64::MAX);

    let data = decode_threaded(width, height, &(|out: &mut [u16], row| {
      if cancel.is_cancelled() {
        return;
      }
      let mut pump = BitPumpLSB::new(&buf[(row * width)..(row + 1) * width]);

      for (span, out) in out.chunks_exact_mut(32).enumerate() {
        // Process 32 pixels at a time in interleaved fashion
        for j in 0..2 {
          let max = pump.get_bits(11);
          let min = pump.get_bits(11);
          if min > max {
            corrupt_at.fetch_min((row * width + span * 32) as u64, Ordering::Relaxed);
            return;
          }
          let delta = max - min;
          // A delta of 11 bits needs a shift of 4, 10 bits of 3, etc.
          let delta_shift: u32 = cmp::max(0, (32 - (delta.leading_zeros() as i32)) - 7) as u32;
          let imax = pump.get_bits(4) as usize;
          let imin = pump.get_bits(4) as usize;

          for i in 0..16 {
            let val = if i == imax {
              max
            } else if i == imin {
              min
            } else {
              cmp::min(0x7ff, (pump.get_bits(7) << delta_shift) + min)
            };
            out[j + (i * 2)] = (val << 3) as u16;
          }
        }
      }
    }));

    let corrupt = corrupt_at.load(Ordering::Relaxed);
    if corrupt != u64::MAX {
      return Err(ArwError::CorruptRawStream(corrupt));
    }
    ensure_not_cancelled(cancel)?;
    Ok(PixU16::new_with(data, width, height))
  }

  /// Build the linearization curve from the four knee points of the tone
  /// curve tag, when present.
  fn get_curve(raw: &IFD) -> Result<Option<CurveLut>> {
    match raw.get_entry(TiffCommonTag::SonyToneCurve) {
      Some(entry) if entry.count() >= 4 => {
        let points = [entry.force_u32(0), entry.force_u32(1), entry.force_u32(2), entry.force_u32(3)];
        Ok(Some(sony_knee_curve(&points)))
      }
      _ => Ok(None),
    }
  }

  /// Locate, decrypt and parse the SR2 private sub-IFD.
  ///
  /// The SR2 tags live in the IFD behind DNGPrivateData. The decrypted
  /// region is a TIFF fragment whose entries sit at offset 0 but whose
  /// value pointers are absolute file offsets, hence the negative offset
  /// correction when re-parsing from the plaintext buffer.
  fn sr2_calibration(&self) -> Result<Option<Sr2Calibration>> {
    let sr2_offset = match self.tiff.get_entry(TiffCommonTag::SR2SubIFDOffset) {
      Some(entry) => entry.force_u32(0),
      None => return Ok(None),
    };
    let sr2_length = fetch_tiff_tag!(self.tiff, TiffCommonTag::SR2SubIFDLength).force_u32(0);
    // The key tag is of type UNDEFINED and contains a 32 bit value
    let sr2_key = {
      let entry = fetch_tiff_tag!(self.tiff, TiffCommonTag::SR2SubIFDKey);
      match &entry.value {
        Value::Undefined(data) | Value::Byte(data) if data.len() >= 4 => LEu32(data, 0),
        _ => entry.force_u32(0),
      }
    };
    debug!("SR2 sub-IFD offset: {}, length: {}", sr2_offset, sr2_length);

    let cipher = self.source.subview(sr2_offset as u64, sr2_length as u64)?;
    let plain = sr2_decrypt(cipher, sr2_key);

    let mut reader = Cursor::new(plain.as_slice());
    let mut visited = HashSet::new();
    let sr2 = IFD::parse(
      &mut reader,
      0,
      -(sr2_offset as i32),
      0,
      Endian::Little,
      &mut visited,
      plain.len() as u64,
    )?;

    Ok(Some(Sr2Calibration {
      wb: Self::get_wb(&sr2),
      black_level: Self::get_blacklevel(&sr2),
    }))
  }

  fn get_blacklevel(sr2: &IFD) -> Option<u16> {
    sr2
      .get_entry(Sr2IfdTag::BlackLevel2)
      .or_else(|| sr2.get_entry(Sr2IfdTag::BlackLevel1))
      .map(|entry| entry.force_u16(0))
  }

  fn get_wb(sr2: &IFD) -> Option<Wb> {
    if let Some(levels) = sr2.get_entry(Sr2IfdTag::WhiteBalanceGRBG) {
      Some(normalize_wb(
        levels.force_u32(1) as f32,
        levels.force_u32(0) as f32,
        levels.force_u32(3) as f32,
        levels.force_u32(2) as f32,
      ))
    } else {
      sr2.get_entry(Sr2IfdTag::WhiteBalanceRGGB).map(|levels| {
        normalize_wb(
          levels.force_u32(0) as f32,
          levels.force_u32(1) as f32,
          levels.force_u32(2) as f32,
          levels.force_u32(3) as f32,
        )
      })
    }
  }
}

/// Reduce RGGB levels to RGB gains, normalized so green is 1.0.
fn normalize_wb(r: f32, g1: f32, g2: f32, b: f32) -> Wb {
  debug!("ARW raw wb levels: {} {} {} {}", r, g1, g2, b);
  if !g1.is_normal() {
    return Wb::neutral();
  }
  Wb::new(r / g1, (g1 + g2) / (2.0 * g1), b / g1)
}

#[derive(Debug, Default)]
struct Sr2Calibration {
  wb: Option<Wb>,
  black_level: Option<u16>,
}
