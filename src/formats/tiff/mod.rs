// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use thiserror::Error;

pub mod entry;
pub mod ifd;
pub mod reader;
pub mod value;

pub use entry::Entry;
pub use ifd::IFD;
pub use reader::{Header, TiffReader};
pub use value::{Rational, SRational, TiffAscii, Value};

pub(crate) const TIFF_MAGIC: u16 = 42;

/// Nesting limit for sub-IFD recursion. ARW files go three levels deep
/// (root -> Exif -> makernote); anything past this is a malformed or
/// hostile file.
pub(crate) const MAX_IFD_DEPTH: usize = 8;

/// Error variants for the TIFF structure engine
#[derive(Debug, Error)]
pub enum TiffError {
  #[error("Invalid magic marker for TIFF: {0:#06x}")]
  BadMagic(u16),

  #[error("Unsupported TIFF field type: {0}")]
  UnsupportedFieldType(u16),

  #[error("IFD nesting at offset {0} exceeds the depth limit")]
  StructureTooDeep(u32),

  #[error("Offset range {offset}+{len} exceeds the file size of {file_len}")]
  OffsetOutOfRange { offset: u64, len: u64, file_len: u64 },

  #[error("Truncated IFD: {0}")]
  TruncatedEntry(String),

  #[error("General error: {0}")]
  General(String),

  /// Short reads on the underlying cursor surface here
  #[error("I/O error: {:?}", _0)]
  Io(#[from] std::io::Error),
}

/// Result type for TIFF structure operations
pub type Result<T> = std::result::Result<T, TiffError>;

pub(crate) fn apply_corr(offset: u32, corr: i32) -> u32 {
  ((offset as i64) + (corr as i64)) as u32
}
