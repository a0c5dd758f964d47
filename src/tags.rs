/// Marker trait for the tag enums accepted by the IFD lookup API.
pub trait TiffTagEnum: Copy + Clone + std::fmt::Debug + Into<u16> {}

macro_rules! tiff_tag_enum {
  ($enum:ty) => {
    impl $crate::tags::TiffTagEnum for $enum {}

    impl From<$enum> for u16 {
      fn from(v: $enum) -> Self {
        v as u16
      }
    }

    impl TryFrom<u16> for $enum {
      type Error = String;

      fn try_from(value: u16) -> std::result::Result<Self, Self::Error> {
        Self::n(value).ok_or(format!("Unable to convert tag value {} to enum {}", value, stringify!($enum)))
      }
    }
  };
}

/// TIFF and ARW tags consulted by the decoder. Anything not listed here is
/// still parsed and retained, it just has no symbolic name.
#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum TiffCommonTag {
  ImageWidth = 0x0100,
  ImageLength = 0x0101,
  BitsPerSample = 0x0102,
  Compression = 0x0103,
  StripOffsets = 0x0111,
  RowsPerStrip = 0x0116,
  StripByteCounts = 0x0117,
  SubIFDs = 0x014A,
  JPEGInterchangeFormat = 0x0201,
  JPEGInterchangeFormatLength = 0x0202,
  SonyRawFileType = 0x7000,
  SonyToneCurve = 0x7010,
  SR2SubIFDOffset = 0x7200,
  SR2SubIFDLength = 0x7201,
  SR2SubIFDKey = 0x7221,
  IdcIFD = 0x7240,
  ExifIFD = 0x8769,
  GPSIFD = 0x8825,
  MakerNote = 0x927C,
  DNGPrivateData = 0xC634,
}

tiff_tag_enum!(TiffCommonTag);

/// Tags inside the decrypted SR2 private sub-IFD. These carry the sensor
/// calibration the color pipeline needs.
#[derive(Debug, Copy, Clone, PartialEq, enumn::N)]
#[repr(u16)]
pub enum Sr2IfdTag {
  BlackLevel1 = 0x7300,
  WhiteBalanceGRBG = 0x7303,
  BlackLevel2 = 0x7310,
  WhiteBalanceRGGB = 0x7313,
  WhiteLevel = 0x787f,
}

tiff_tag_enum!(Sr2IfdTag);

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn tag_roundtrip() {
    assert_eq!(u16::from(TiffCommonTag::ImageWidth), 256);
    assert_eq!(TiffCommonTag::try_from(0x7200_u16), Ok(TiffCommonTag::SR2SubIFDOffset));
    assert!(TiffCommonTag::try_from(0xdead_u16).is_err());
  }
}
