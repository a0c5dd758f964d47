use crate::decoders::{decode_threaded, ensure_not_cancelled};
use crate::pixarray::PixU16;
use crate::pumps::{BitPump, BitPumpLSB};
use crate::{ArwError, CancelToken, Result};

/// Number of samples per packed group.
const GROUP_SAMPLES: usize = 16;
/// Byte size of one packed group (16 x 14 bits).
const GROUP_BYTES: usize = 28;

/// Unpack the Sony 14 bit packed layout: 16 samples per 28 bytes, bytes
/// concatenated least-significant-byte-first, consecutive 14 bit fields
/// extracted from bit 0.
///
/// `stride` is the samples-per-row count of the stored payload (at least
/// `width`); each row consumes the stride rounded up to whole groups, and
/// samples beyond `width` are discarded. A payload too short for the
/// advertised geometry fails with `CorruptRawStream` before any row is
/// touched.
pub fn decode_raw14(buf: &[u8], width: usize, height: usize, stride: usize, cancel: &CancelToken) -> Result<PixU16> {
  let stride = stride.max(width);
  let row_bytes = stride.div_ceil(GROUP_SAMPLES) * GROUP_BYTES;
  if buf.len() < height * row_bytes {
    return Err(ArwError::CorruptRawStream(buf.len() as u64));
  }

  let data = decode_threaded(width, height, &(|out: &mut [u16], row| {
    if cancel.is_cancelled() {
      return;
    }
    let mut pump = BitPumpLSB::new(&buf[row * row_bytes..(row + 1) * row_bytes]);
    for pix in out.iter_mut() {
      *pix = pump.get_bits(14) as u16;
    }
  }));
  ensure_not_cancelled(cancel)?;
  Ok(PixU16::new_with(data, width, height))
}
