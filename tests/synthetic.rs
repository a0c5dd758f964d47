//! End-to-end tests over synthesized ARW byte images.
//!
//! Every fixture is generated in memory: TIFF header, IFD tree, encrypted
//! SR2 calibration block and raw payload, then pushed through the public
//! decode API.

use std::io::Cursor;

use arwloader::decoders::{DecodeOptions, DemosaicMethod, RawType, Wb};
use arwloader::formats::tiff::{TiffError, TiffReader, Value};
use arwloader::imgop::{Dim2, Point, Rect};
use arwloader::sr2::sr2_decrypt;
use arwloader::tags::TiffCommonTag;
use arwloader::{ArwDecoder, ArwError, CancelToken, RawSource};

#[derive(Clone)]
enum Val {
  Short(Vec<u16>),
  Long(Vec<u32>),
  Undefined(Vec<u8>),
  /// Entry with a hand-picked value pointer, for malformed fixtures
  Ptr { typ: u16, count: u32, offset: u32 },
}

fn encode(val: &Val) -> (u16, u32, Vec<u8>) {
  match val {
    Val::Short(v) => (3, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
    Val::Long(v) => (4, v.len() as u32, v.iter().flat_map(|x| x.to_le_bytes()).collect()),
    Val::Undefined(v) => (7, v.len() as u32, v.clone()),
    Val::Ptr { .. } => unreachable!("pointer entries are written directly"),
  }
}

/// Append an IFD (entry count, sorted entries, next-IFD pointer) at the
/// end of `buf` and return its offset within `buf`. Out-of-line values
/// land right after the directory; `ptr_base` is added to their recorded
/// offsets for fragments that will live at a non-zero file position.
fn write_ifd(buf: &mut Vec<u8>, entries: &[(u16, Val)], next_ifd: u32, ptr_base: u32) -> u32 {
  let mut entries = entries.to_vec();
  entries.sort_by_key(|e| e.0);
  let at = buf.len() as u32;
  let n = entries.len() as u32;
  let mut data_off = at + 2 + 12 * n + 4;
  let mut dir = Vec::new();
  let mut data = Vec::new();
  for (tag, val) in &entries {
    dir.extend(tag.to_le_bytes());
    if let Val::Ptr { typ, count, offset } = val {
      dir.extend(typ.to_le_bytes());
      dir.extend(count.to_le_bytes());
      dir.extend(offset.to_le_bytes());
      continue;
    }
    let (typ, count, bytes) = encode(val);
    dir.extend(typ.to_le_bytes());
    dir.extend(count.to_le_bytes());
    if bytes.len() <= 4 {
      let mut inline = bytes;
      inline.resize(4, 0);
      dir.extend(inline);
    } else {
      dir.extend((data_off + ptr_base).to_le_bytes());
      data_off += bytes.len() as u32;
      data.extend(bytes);
    }
  }
  buf.extend((n as u16).to_le_bytes());
  buf.extend(dir);
  buf.extend(next_ifd.to_le_bytes());
  buf.extend(data);
  at
}

fn finish_header(buf: &mut Vec<u8>, first_ifd: u32) {
  buf[4..8].copy_from_slice(&first_ifd.to_le_bytes());
}

fn new_le_file() -> Vec<u8> {
  b"II\x2a\x00\x00\x00\x00\x00".to_vec()
}

/// Pack samples into the 14 bit layout (16 samples per 28 bytes, bytes
/// least-significant-first).
fn pack_raw14(samples: &[u16], width: usize, height: usize) -> Vec<u8> {
  let row_bytes = width.div_ceil(16) * 28;
  let mut out = vec![0u8; height * row_bytes];
  for (row, line) in samples.chunks(width).enumerate() {
    for (i, sample) in line.iter().enumerate() {
      let bitpos = i * 14;
      let mut acc = (*sample as u32 & 0x3fff) << (bitpos % 8);
      let mut byte = row * row_bytes + bitpos / 8;
      while acc != 0 {
        out[byte] |= (acc & 0xff) as u8;
        acc >>= 8;
        byte += 1;
      }
    }
  }
  out
}

/// LSB-first bit writer for synthesizing cRAW payloads.
struct LsbWriter {
  out: Vec<u8>,
  bitpos: usize,
}

impl LsbWriter {
  fn new() -> Self {
    Self { out: Vec::new(), bitpos: 0 }
  }

  fn push(&mut self, value: u32, bits: usize) {
    for i in 0..bits {
      let byte = self.bitpos / 8;
      if byte >= self.out.len() {
        self.out.push(0);
      }
      if (value >> i) & 1 != 0 {
        self.out[byte] |= 1 << (self.bitpos % 8);
      }
      self.bitpos += 1;
    }
  }

  fn push_block(&mut self, max: u32, min: u32, imax: u32, imin: u32, deltas: &[u32; 14]) {
    self.push(max, 11);
    self.push(min, 11);
    self.push(imax, 4);
    self.push(imin, 4);
    for d in deltas {
      self.push(*d, 7);
    }
  }
}

const SR2_KEY: u32 = 0x1234_5678;

/// Raw14 reference sensor fixture: RGGB tile of known samples, SR2 block
/// with black level 512 and an R gain of 2.0, plus a thumbnail extent.
struct Raw14Fixture {
  file: Vec<u8>,
  width: usize,
  height: usize,
  thumb_offset: u32,
}

const TILE_R: u16 = 1512;
const TILE_G1: u16 = 1024;
const TILE_G2: u16 = 1536;
const TILE_B: u16 = 2560;

fn tile_sample(row: usize, col: usize) -> u16 {
  match (row & 1, col & 1) {
    (0, 0) => TILE_R,
    (0, 1) => TILE_G1,
    (1, 0) => TILE_G2,
    _ => TILE_B,
  }
}

fn build_raw14_arw() -> Raw14Fixture {
  let width = 32usize;
  let height = 4usize;
  let samples: Vec<u16> = (0..height).flat_map(|r| (0..width).map(move |c| tile_sample(r, c))).collect();
  let payload = pack_raw14(&samples, width, height);

  let mut file = new_le_file();

  let payload_offset = file.len() as u32;
  file.extend(&payload);

  let thumb_offset = file.len() as u32;
  file.extend(b"JFIFDATA");

  // SR2 fragment: entries at offset 0, value pointers are absolute file
  // offsets. Black levels are stored four-fold, white balance as RGGB
  // levels normalized against green (1024).
  let sr2_offset = file.len() as u32;
  let mut fragment = Vec::new();
  write_ifd(
    &mut fragment,
    &[
      (0x7310, Val::Short(vec![512, 512, 512, 512])),
      (0x7313, Val::Long(vec![2048, 1024, 1024, 1024])),
    ],
    0,
    sr2_offset,
  );
  file.extend(sr2_decrypt(&fragment, SR2_KEY));

  let priv_offset = write_ifd(
    &mut file,
    &[
      (TiffCommonTag::SR2SubIFDOffset as u16, Val::Long(vec![sr2_offset])),
      (TiffCommonTag::SR2SubIFDLength as u16, Val::Long(vec![fragment.len() as u32])),
      (TiffCommonTag::SR2SubIFDKey as u16, Val::Undefined(SR2_KEY.to_le_bytes().to_vec())),
    ],
    0,
    0,
  );

  let ifd0 = write_ifd(
    &mut file,
    &[
      (TiffCommonTag::ImageWidth as u16, Val::Short(vec![width as u16])),
      (TiffCommonTag::ImageLength as u16, Val::Short(vec![height as u16])),
      (TiffCommonTag::BitsPerSample as u16, Val::Short(vec![14])),
      (TiffCommonTag::Compression as u16, Val::Short(vec![1])),
      (TiffCommonTag::StripOffsets as u16, Val::Long(vec![payload_offset])),
      (TiffCommonTag::RowsPerStrip as u16, Val::Short(vec![(width * 2) as u16])),
      (TiffCommonTag::StripByteCounts as u16, Val::Long(vec![payload.len() as u32])),
      (TiffCommonTag::JPEGInterchangeFormat as u16, Val::Long(vec![thumb_offset])),
      (TiffCommonTag::JPEGInterchangeFormatLength as u16, Val::Long(vec![8])),
      (TiffCommonTag::SonyRawFileType as u16, Val::Short(vec![RawType::Raw14 as u16])),
      (TiffCommonTag::DNGPrivateData as u16, Val::Long(vec![priv_offset])),
    ],
    0,
    0,
  );
  finish_header(&mut file, ifd0);

  Raw14Fixture {
    file,
    width,
    height,
    thumb_offset,
  }
}

#[test]
fn raw14_details_from_synthesized_file() {
  let fx = build_raw14_arw();
  let source = RawSource::new_from_slice(&fx.file);
  let decoder = ArwDecoder::new(&source).unwrap();
  let details = decoder.raw_details().unwrap();

  assert_eq!(details.width, fx.width);
  assert_eq!(details.height, fx.height);
  assert_eq!(details.bit_depth, 14);
  assert_eq!(details.raw_type, RawType::Raw14);
  assert_eq!(details.stride, fx.width);
  assert_eq!(details.black_level, 512);
  assert_eq!(details.white_balance, Wb::new(2.0, 1.0, 1.0));
  assert_eq!(decoder.thumbnail_range(), Some((fx.thumb_offset as u64, 8)));
}

#[test]
fn raw14_full_pipeline() {
  let fx = build_raw14_arw();
  let image = arwloader::decode_buffer(&fx.file, &DecodeOptions::default()).unwrap();

  assert_eq!(image.width, fx.width);
  assert_eq!(image.height, fx.height);
  assert_eq!(image.rect(), Rect::new(Point::zero(), Dim2::new(fx.width, fx.height)));

  // (0,0): R=1512, G=(1024+1536)/2, B=2560, black 512, R gain 2.0
  assert_eq!(image.at(0, 0), &[2000, 768, 2048, u16::MAX]);
  // (1,1) anchors the window on B; its 2x2 neighbours are G2/G1/R
  let expected_r = (TILE_B - 512) * 2;
  let expected_g = ((TILE_G2 - 512) + (TILE_G1 - 512)) / 2;
  let expected_b = TILE_R - 512;
  assert_eq!(image.at(1, 1), &[expected_r, expected_g, expected_b, u16::MAX]);

  for pix in image.pixels() {
    assert!(pix[0] <= 16383 && pix[1] <= 16383 && pix[2] <= 16383);
    assert_eq!(pix[3], u16::MAX);
  }
}

#[test]
fn raw14_pass_through_populates_native_channels() {
  let fx = build_raw14_arw();
  let options = DecodeOptions {
    demosaic: DemosaicMethod::PassThrough,
    white_balance_override: Some(Wb::neutral()),
    ..Default::default()
  };
  let image = arwloader::decode_buffer(&fx.file, &options).unwrap();

  for row in 0..fx.height {
    for col in 0..fx.width {
      let pix = image.at(row, col);
      let nonzero: Vec<usize> = (0..3).filter(|ch| pix[*ch] != 0).collect();
      let expected_ch = match (row & 1, col & 1) {
        (0, 0) => 0,
        (1, 1) => 2,
        _ => 1,
      };
      assert_eq!(nonzero, vec![expected_ch], "wrong channel at {}:{}", row, col);
      assert_eq!(pix[expected_ch], tile_sample(row, col) - 512);
    }
  }
}

#[test]
fn cancelled_token_aborts_decode() {
  let fx = build_raw14_arw();
  let cancel = CancelToken::new();
  cancel.cancel();
  let options = DecodeOptions {
    cancel,
    ..Default::default()
  };
  assert!(matches!(arwloader::decode_buffer(&fx.file, &options), Err(ArwError::Cancelled)));
}

#[test]
fn overrides_replace_sr2_calibration() {
  let fx = build_raw14_arw();
  let options = DecodeOptions {
    black_level_override: Some(0),
    white_balance_override: Some(Wb::neutral()),
    ..Default::default()
  };
  let image = arwloader::decode_buffer(&fx.file, &options).unwrap();
  assert_eq!(image.at(0, 0), &[1512, 1280, 2560, u16::MAX]);
}

fn build_craw_arw(raw_type: u16) -> Vec<u8> {
  let width = 32usize;
  let height = 2usize;

  let mut payload = Vec::new();
  for _ in 0..height {
    let mut w = LsbWriter::new();
    w.push_block(600, 520, 0, 1, &[10; 14]);
    w.push_block(1000, 900, 0, 1, &[20; 14]);
    w.out.resize(width, 0);
    payload.extend(w.out);
  }

  let mut file = new_le_file();
  let payload_offset = file.len() as u32;
  file.extend(&payload);

  let ifd0 = write_ifd(
    &mut file,
    &[
      (TiffCommonTag::ImageWidth as u16, Val::Short(vec![width as u16])),
      (TiffCommonTag::ImageLength as u16, Val::Short(vec![height as u16])),
      (TiffCommonTag::BitsPerSample as u16, Val::Short(vec![8])),
      (TiffCommonTag::Compression as u16, Val::Short(vec![32767])),
      (TiffCommonTag::StripOffsets as u16, Val::Long(vec![payload_offset])),
      (TiffCommonTag::StripByteCounts as u16, Val::Long(vec![payload.len() as u32])),
      (TiffCommonTag::SonyRawFileType as u16, Val::Short(vec![raw_type])),
      (
        TiffCommonTag::SonyToneCurve as u16,
        Val::Long(vec![800 << 2, 1600 << 2, 2400 << 2, 3200 << 2]),
      ),
    ],
    0,
    0,
  );
  finish_header(&mut file, ifd0);
  file
}

#[test]
fn craw_full_pipeline_without_curve() {
  let file = build_craw_arw(RawType::Craw as u16);
  let options = DecodeOptions {
    black_level_override: Some(0),
    demosaic: DemosaicMethod::PassThrough,
    disable_gamma: true,
    ..Default::default()
  };
  let image = arwloader::decode_buffer(&file, &options).unwrap();

  assert_eq!(image.width, 32);
  assert_eq!(image.height, 2);
  // channel 0 (even columns of row 0 are red sites): anchors then min+delta
  assert_eq!(image.at(0, 0)[0], 600 << 3);
  assert_eq!(image.at(0, 2)[0], 520 << 3);
  assert_eq!(image.at(0, 4)[0], 530 << 3);
  // channel 1 (odd columns)
  assert_eq!(image.at(0, 1)[1], 1000 << 3);
  assert_eq!(image.at(0, 3)[1], 900 << 3);
  assert_eq!(image.at(0, 5)[1], 920 << 3);
}

#[test]
fn craw_curve_keeps_values_in_range_and_order() {
  let file = build_craw_arw(RawType::Craw as u16);
  let options = DecodeOptions {
    black_level_override: Some(0),
    demosaic: DemosaicMethod::PassThrough,
    ..Default::default()
  };
  let image = arwloader::decode_buffer(&file, &options).unwrap();

  for pix in image.pixels() {
    assert!(pix[0] <= 16383 && pix[1] <= 16383 && pix[2] <= 16383);
  }
  // the tone curve is monotonic: larger quantized input, larger output
  let lo = image.at(0, 2)[0]; // 520
  let hi = image.at(0, 0)[0]; // 600
  assert!(hi >= lo);
}

#[test]
fn lossless_craw_is_declined() {
  let file = build_craw_arw(RawType::CrawLossless as u16);
  let err = arwloader::decode_buffer(&file, &DecodeOptions::default()).unwrap_err();
  assert!(matches!(err, ArwError::UnsupportedRawType(4)));
}

#[test]
fn raw12_is_recognized_but_declined() {
  let file = build_craw_arw(RawType::Raw12 as u16);
  let err = arwloader::decode_buffer(&file, &DecodeOptions::default()).unwrap_err();
  assert!(matches!(err, ArwError::UnsupportedRawType(2)));
}

#[test]
fn unknown_raw_type_value_is_declined() {
  let file = build_craw_arw(99);
  let err = arwloader::decode_buffer(&file, &DecodeOptions::default()).unwrap_err();
  assert!(matches!(err, ArwError::UnsupportedRawType(99)));
}

#[test]
fn inline_and_pointer_values_resolve() {
  let mut file = new_le_file();
  let ifd0 = write_ifd(
    &mut file,
    &[
      (0x0100, Val::Short(vec![0x1800])),
      (0x0111, Val::Long(vec![0x1000, 0x2000])),
    ],
    0,
    0,
  );
  finish_header(&mut file, ifd0);

  let tiff = TiffReader::new(&mut Cursor::new(&file)).unwrap();
  let root = tiff.root_ifd();
  assert_eq!(root.entry_count(), 2);
  assert_eq!(root.get_entry(TiffCommonTag::ImageWidth).unwrap().value, Value::Short(vec![0x1800]));
  let strips = root.get_entry(TiffCommonTag::StripOffsets).unwrap();
  assert_eq!(strips.value, Value::Long(vec![0x1000, 0x2000]));
  // a two-element LONG cannot be inline
  assert!(strips.offset as usize >= 8);
}

#[test]
fn empty_ifd_parses() {
  let mut file = new_le_file();
  let ifd0 = write_ifd(&mut file, &[], 0, 0);
  finish_header(&mut file, ifd0);

  let tiff = TiffReader::new(&mut Cursor::new(&file)).unwrap();
  assert_eq!(tiff.root_ifd().entry_count(), 0);
  assert_eq!(tiff.root_ifd().next_ifd(), 0);
}

#[test]
fn big_endian_file_parses() {
  let mut file = b"MM\x00\x2a\x00\x00\x00\x08".to_vec();
  // one entry: ImageWidth (0x0100), SHORT, count 1, value 0x1800 inline
  file.extend(1u16.to_be_bytes());
  file.extend(0x0100u16.to_be_bytes());
  file.extend(3u16.to_be_bytes());
  file.extend(1u32.to_be_bytes());
  file.extend(0x1800u16.to_be_bytes());
  file.extend([0u8, 0]);
  file.extend(0u32.to_be_bytes());

  let tiff = TiffReader::new(&mut Cursor::new(&file)).unwrap();
  assert_eq!(tiff.root_ifd().get_entry(TiffCommonTag::ImageWidth).unwrap().value, Value::Short(vec![0x1800]));
}

#[test]
fn bad_magic_is_rejected() {
  let err = arwloader::decode_buffer(b"II\x2b\x00\x08\x00\x00\x00", &DecodeOptions::default()).unwrap_err();
  assert!(matches!(err, ArwError::Tiff(TiffError::BadMagic(0x2b))));
}

#[test]
fn value_pointer_beyond_eof_is_rejected() {
  let mut file = new_le_file();
  let ifd0 = write_ifd(
    &mut file,
    &[(
      0x0111,
      Val::Ptr {
        typ: 4,
        count: 2,
        offset: 0x0010_0000,
      },
    )],
    0,
    0,
  );
  finish_header(&mut file, ifd0);

  let err = TiffReader::new(&mut Cursor::new(&file)).unwrap_err();
  assert!(matches!(err, TiffError::OffsetOutOfRange { .. }));
}

#[test]
fn truncated_directory_is_rejected() {
  let mut file = new_le_file();
  // claim 100 entries but provide none
  file.extend(100u16.to_le_bytes());
  finish_header(&mut file, 8);

  let err = TiffReader::new(&mut Cursor::new(&file)).unwrap_err();
  assert!(matches!(err, TiffError::TruncatedEntry(_)));
}

#[test]
fn deep_nesting_is_rejected() {
  let mut file = new_le_file();
  let mut inner = write_ifd(&mut file, &[], 0, 0);
  for _ in 0..8 {
    inner = write_ifd(&mut file, &[(TiffCommonTag::SubIFDs as u16, Val::Long(vec![inner]))], 0, 0);
  }
  finish_header(&mut file, inner);

  let err = TiffReader::new(&mut Cursor::new(&file)).unwrap_err();
  assert!(matches!(err, TiffError::StructureTooDeep(_)));
}

#[test]
fn shallow_nesting_is_fine() {
  let mut file = new_le_file();
  let mut inner = write_ifd(&mut file, &[(0x0100, Val::Short(vec![7]))], 0, 0);
  for _ in 0..3 {
    inner = write_ifd(&mut file, &[(TiffCommonTag::SubIFDs as u16, Val::Long(vec![inner]))], 0, 0);
  }
  finish_header(&mut file, inner);

  let tiff = TiffReader::new(&mut Cursor::new(&file)).unwrap();
  assert_eq!(tiff.get_entry(TiffCommonTag::ImageWidth).unwrap().value, Value::Short(vec![7]));
}

#[test]
fn ifd_cycle_is_rejected() {
  let mut file = new_le_file();
  let at = file.len() as u32;
  let ifd0 = write_ifd(&mut file, &[(TiffCommonTag::SubIFDs as u16, Val::Long(vec![at]))], 0, 0);
  finish_header(&mut file, ifd0);

  let err = TiffReader::new(&mut Cursor::new(&file)).unwrap_err();
  assert!(matches!(err, TiffError::General(_)));
}

#[test]
fn makernote_parses_with_unknown_entries_retained() {
  let mut file = new_le_file();

  // Inner makernote IFD, hand-built with inline values only: one SHORT
  // entry and one entry with an unrecognized field type.
  let mut mn_ifd = Vec::new();
  mn_ifd.extend(2u16.to_le_bytes());
  mn_ifd.extend(0xb000u16.to_le_bytes());
  mn_ifd.extend(3u16.to_le_bytes());
  mn_ifd.extend(1u32.to_le_bytes());
  mn_ifd.extend(2u32.to_le_bytes());
  mn_ifd.extend(0xb001u16.to_le_bytes());
  mn_ifd.extend(200u16.to_le_bytes());
  mn_ifd.extend(2u32.to_le_bytes());
  mn_ifd.extend([0xaa, 0xbb, 0, 0]);
  mn_ifd.extend(0u32.to_le_bytes());

  let mut makernote = b"SONY DSC \0\0\0".to_vec();
  makernote.extend(&mn_ifd);

  let exif_off = write_ifd(&mut file, &[(TiffCommonTag::MakerNote as u16, Val::Undefined(makernote))], 0, 0);
  let ifd0 = write_ifd(&mut file, &[(TiffCommonTag::ExifIFD as u16, Val::Long(vec![exif_off]))], 0, 0);
  finish_header(&mut file, ifd0);

  let source = RawSource::new_from_slice(&file);
  let decoder = ArwDecoder::new(&source).unwrap();
  let mn = decoder.makernote().unwrap().expect("makernote IFD");
  assert_eq!(mn.entries().get(&0xb000).unwrap().value, Value::Short(vec![2]));
  assert_eq!(mn.entries().get(&0xb001).unwrap().value, Value::Unknown(200, vec![0xaa, 0xbb]));
}

#[test]
fn sr2_block_decrypts_to_parsable_fragment() {
  let fx = build_raw14_arw();
  let source = RawSource::new_from_slice(&fx.file);
  let decoder = ArwDecoder::new(&source).unwrap();

  // The SR2 pointer tags are reachable through the DNGPrivateData sub-IFD
  let tiff = decoder.tiff();
  assert!(tiff.has_entry(TiffCommonTag::SR2SubIFDOffset));
  assert!(tiff.has_entry(TiffCommonTag::SR2SubIFDLength));
  assert!(tiff.has_entry(TiffCommonTag::SR2SubIFDKey));
}
