use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub mod arw;

pub use arw::ArwDecoder;

pub use crate::imgop::curve::CurveLut;
pub use crate::imgop::develop::{DemosaicMethod, Wb};
use crate::CancelToken;

macro_rules! fetch_tiff_tag {
  ($holder:expr, $tag:expr) => {
    $holder.get_entry($tag).ok_or($crate::ArwError::MissingTag($tag as u16))?
  };
}

pub(crate) use fetch_tiff_tag;

/// Raw payload layout as declared by the SonyRawFileType tag.
#[derive(Debug, Copy, Clone, PartialEq, Eq, enumn::N, Serialize, Deserialize)]
#[repr(u16)]
pub enum RawType {
  /// 14 bit packed samples, 16 samples per 28 bytes
  Raw14 = 1,
  /// 12 bit packed samples (recognized, not decoded)
  Raw12 = 2,
  /// Compressed raw with per-block min/max anchors and quantized deltas
  Craw = 3,
  /// Lossless compressed raw (recognized, not decoded)
  CrawLossless = 4,
}

impl RawType {
  pub fn from_tag(value: u16) -> Option<Self> {
    Self::n(value)
  }
}

/// Everything the unpackers and the development pipeline need to know
/// about the raw payload, gathered from the TIFF tree and the decrypted
/// SR2 calibration block.
#[derive(Debug, Clone)]
pub struct RawDetails {
  pub width: usize,
  pub height: usize,
  pub bit_depth: usize,
  pub raw_type: RawType,
  /// Byte offset of the payload inside the file
  pub offset: u64,
  /// Byte length of the payload
  pub length: u64,
  /// Samples per stored row (>= width)
  pub stride: usize,
  pub black_level: u16,
  pub white_balance: Wb,
  pub brightness: f32,
  pub gamma_curve: Option<CurveLut>,
}

/// Caller configuration for one decode.
#[derive(Debug, Clone, Default)]
pub struct DecodeOptions {
  pub black_level_override: Option<u16>,
  pub white_balance_override: Option<Wb>,
  pub disable_gamma: bool,
  pub demosaic: DemosaicMethod,
  pub cancel: CancelToken,
}

/// Run a row-sliced decoder closure over all image rows in parallel.
pub fn decode_threaded<F>(width: usize, height: usize, closure: &F) -> Vec<u16>
where
  F: Fn(&mut [u16], usize) + Sync,
{
  let mut out = vec![0_u16; width * height];
  out.par_chunks_mut(width).enumerate().for_each(|(row, line)| {
    closure(line, row);
  });
  out
}

/// Turn a raised cancellation token into the decode result.
pub(crate) fn ensure_not_cancelled(cancel: &CancelToken) -> crate::Result<()> {
  if cancel.is_cancelled() {
    Err(crate::ArwError::Cancelled)
  } else {
    Ok(())
  }
}
