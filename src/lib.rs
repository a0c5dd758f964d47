//! Decoder for Sony ARW raw camera images.
//!
//! An ARW file is a TIFF/EP container holding the Bayer-mosaiced sensor
//! samples next to thumbnails, EXIF metadata and Sony's encrypted SR2
//! calibration block. This crate parses the container, decrypts the SR2
//! sub-IFD, unpacks the 14 bit packed and compressed (cRAW) payloads and
//! develops the mosaic into a 14-bit-per-channel RGB image.
//!
//! # Example
//! ```rust,no_run
//! use arwloader::DecodeOptions;
//!
//! let image = arwloader::decode_file("sample.ARW", &DecodeOptions::default()).unwrap();
//! println!("{}x{} pixels", image.width, image.height);
//! ```

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use thiserror::Error;

pub mod bits;
pub mod decoders;
pub mod formats;
pub mod imgop;
pub mod packed;
pub mod pixarray;
pub mod pumps;
pub mod rawsource;
pub mod sr2;
pub mod tags;

pub use decoders::{ArwDecoder, DecodeOptions, DemosaicMethod, RawDetails, RawType, Wb};
pub use formats::tiff::TiffError;
pub use pixarray::{PixU16, Rgba16};
pub use rawsource::RawSource;

/// Error type for any reason for the decode to fail
#[derive(Debug, Error)]
pub enum ArwError {
  #[error("TIFF structure error: {0}")]
  Tiff(#[from] TiffError),

  #[error("Missing required tag {0:#06x}")]
  MissingTag(u16),

  #[error("Unsupported raw file type: {0}")]
  UnsupportedRawType(u16),

  #[error("Corrupt raw stream near position {0}")]
  CorruptRawStream(u64),

  #[error("Decode was cancelled")]
  Cancelled,

  #[error("I/O error: {:?}", _0)]
  Io(#[from] std::io::Error),
}

/// Result type for decode operations
pub type Result<T> = std::result::Result<T, ArwError>;

/// Cooperative cancellation handle, checked at row boundaries of the
/// parallel decode passes. Clones share the same flag.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn cancel(&self) {
    self.0.store(true, Ordering::Relaxed);
  }

  pub fn is_cancelled(&self) -> bool {
    self.0.load(Ordering::Relaxed)
  }
}

/// Decode an ARW file into a 14-bit-per-channel RGB image.
pub fn decode_file<P: AsRef<Path>>(path: P, options: &DecodeOptions) -> Result<Rgba16> {
  let source = RawSource::new(path.as_ref())?;
  decode_source(&source, options)
}

/// Decode an in-memory ARW byte image.
pub fn decode_buffer(buf: &[u8], options: &DecodeOptions) -> Result<Rgba16> {
  let source = RawSource::new_from_slice(buf);
  decode_source(&source, options)
}

/// Decode from an existing byte source.
pub fn decode_source(source: &RawSource, options: &DecodeOptions) -> Result<Rgba16> {
  ArwDecoder::new(source)?.decode(options)
}
