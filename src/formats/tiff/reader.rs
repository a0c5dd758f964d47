// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::collections::HashSet;
use std::io::{Read, Seek, SeekFrom};

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};
use serde::{Deserialize, Serialize};

use crate::bits::Endian;
use crate::tags::TiffTagEnum;

use super::ifd::IFD;
use super::{Entry, Result, TiffError, TIFF_MAGIC};

/// Parsed TIFF file header: byte order mark, magic and the offset of the
/// first IFD. The byte order governs every scalar read that follows, until
/// a nested fragment carries its own mark.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
  pub endian: Endian,
  pub first_ifd: u32,
}

impl Header {
  pub fn parse<R: Read + Seek>(reader: &mut R) -> Result<Header> {
    reader.seek(SeekFrom::Start(0))?;
    let endian = match reader.read_u16::<LittleEndian>()? {
      0x4949 => Endian::Little,
      0x4d4d => Endian::Big,
      marker => {
        return Err(TiffError::BadMagic(marker));
      }
    };
    let mut reader = EndianReader::new(reader, endian);
    let magic = reader.read_u16()?;
    if magic != TIFF_MAGIC {
      return Err(TiffError::BadMagic(magic));
    }
    let first_ifd = reader.read_u32()?;
    Ok(Header { endian, first_ifd })
  }
}

/// Reader for a full TIFF structure: header plus the chain of IFDs linked
/// through their next-IFD pointers, with sub-IFDs resolved recursively.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TiffReader {
  pub chain: Vec<IFD>,
  pub endian: Endian,
}

impl TiffReader {
  /// Check if a buffer looks like a TIFF file
  pub fn is_tiff<T: AsRef<[u8]>>(buffer: T) -> bool {
    let buffer = buffer.as_ref();
    buffer.len() >= 4 && (&buffer[0..2] == b"II" || &buffer[0..2] == b"MM")
  }

  pub fn new<R: Read + Seek>(reader: &mut R) -> Result<Self> {
    let file_len = reader.seek(SeekFrom::End(0))?;
    let header = Header::parse(reader)?;
    if header.first_ifd == 0 {
      return Err(TiffError::General("TIFF header contains no root IFD".into()));
    }

    // One visited set per parse guards the whole offset graph (chain and
    // sub-IFDs) against reference cycles in hostile files.
    let mut visited: HashSet<u32> = HashSet::new();
    let mut chain = Vec::new();
    let mut next_ifd = header.first_ifd;
    while next_ifd != 0 {
      let ifd = IFD::parse(reader, next_ifd, 0, 0, header.endian, &mut visited, file_len)?;
      next_ifd = ifd.next_ifd;
      chain.push(ifd);
    }

    if chain.is_empty() {
      return Err(TiffError::General("TIFF is invalid, must contain at least one IFD".into()));
    }
    Ok(Self {
      chain,
      endian: header.endian,
    })
  }

  pub fn root_ifd(&self) -> &IFD {
    &self.chain[0]
  }

  pub fn get_entry<T: TiffTagEnum>(&self, tag: T) -> Option<&Entry> {
    self.chain.iter().find_map(|ifd| ifd.get_entry_recursive(tag))
  }

  pub fn has_entry<T: TiffTagEnum>(&self, tag: T) -> bool {
    self.get_entry(tag).is_some()
  }

  pub fn find_ifds_with_tag<T: TiffTagEnum>(&self, tag: T) -> Vec<&IFD> {
    let mut ifds = Vec::new();
    for ifd in &self.chain {
      ifd.collect_ifds_with_tag(tag, &mut ifds);
    }
    ifds
  }

  pub fn find_first_ifd_with_tag<T: TiffTagEnum>(&self, tag: T) -> Option<&IFD> {
    self.find_ifds_with_tag(tag).first().copied()
  }
}

pub trait ReadByteOrder {
  fn read_u8(&mut self) -> std::io::Result<u8>;
  fn read_u16(&mut self) -> std::io::Result<u16>;
  fn read_u32(&mut self) -> std::io::Result<u32>;

  fn read_u8_into(&mut self, dst: &mut [u8]) -> std::io::Result<()>;
  fn read_i8_into(&mut self, dst: &mut [i8]) -> std::io::Result<()>;
  fn read_u16_into(&mut self, dst: &mut [u16]) -> std::io::Result<()>;
  fn read_i16_into(&mut self, dst: &mut [i16]) -> std::io::Result<()>;
  fn read_u32_into(&mut self, dst: &mut [u32]) -> std::io::Result<()>;
  fn read_i32_into(&mut self, dst: &mut [i32]) -> std::io::Result<()>;
  fn read_f32_into(&mut self, dst: &mut [f32]) -> std::io::Result<()>;
  fn read_f64_into(&mut self, dst: &mut [f64]) -> std::io::Result<()>;
}

/// Endian-aware scalar reader over any seekable stream.
pub struct EndianReader<'a, R: Read + Seek + 'a> {
  endian: Endian,
  inner: &'a mut R,
}

impl<'a, R: Read + Seek + 'a> EndianReader<'a, R> {
  pub fn new(inner: &'a mut R, endian: Endian) -> Self {
    Self { endian, inner }
  }

  pub fn into_inner(self) -> &'a mut R {
    self.inner
  }

  pub fn position(&mut self) -> Result<u32> {
    Ok(self.inner.stream_position().map(|v| v as u32)?)
  }

  pub fn goto(&mut self, offset: u32) -> Result<()> {
    self.inner.seek(SeekFrom::Start(offset as u64))?;
    Ok(())
  }
}

impl<'a, R: Read + Seek + 'a> ReadByteOrder for EndianReader<'a, R> {
  fn read_u8(&mut self) -> std::io::Result<u8> {
    self.inner.read_u8()
  }

  fn read_u16(&mut self) -> std::io::Result<u16> {
    match self.endian {
      Endian::Little => self.inner.read_u16::<LittleEndian>(),
      Endian::Big => self.inner.read_u16::<BigEndian>(),
    }
  }

  fn read_u32(&mut self) -> std::io::Result<u32> {
    match self.endian {
      Endian::Little => self.inner.read_u32::<LittleEndian>(),
      Endian::Big => self.inner.read_u32::<BigEndian>(),
    }
  }

  fn read_u8_into(&mut self, dst: &mut [u8]) -> std::io::Result<()> {
    self.inner.read_exact(dst)
  }

  fn read_i8_into(&mut self, dst: &mut [i8]) -> std::io::Result<()> {
    self.inner.read_i8_into(dst)
  }

  fn read_u16_into(&mut self, dst: &mut [u16]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_u16_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_u16_into::<BigEndian>(dst),
    }
  }

  fn read_i16_into(&mut self, dst: &mut [i16]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_i16_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_i16_into::<BigEndian>(dst),
    }
  }

  fn read_u32_into(&mut self, dst: &mut [u32]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_u32_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_u32_into::<BigEndian>(dst),
    }
  }

  fn read_i32_into(&mut self, dst: &mut [i32]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_i32_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_i32_into::<BigEndian>(dst),
    }
  }

  fn read_f32_into(&mut self, dst: &mut [f32]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_f32_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_f32_into::<BigEndian>(dst),
    }
  }

  fn read_f64_into(&mut self, dst: &mut [f64]) -> std::io::Result<()> {
    match self.endian {
      Endian::Little => self.inner.read_f64_into::<LittleEndian>(dst),
      Endian::Big => self.inner.read_f64_into::<BigEndian>(dst),
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Cursor;

  use super::*;

  #[test]
  fn header_little_endian() {
    let mut data = Cursor::new(b"II\x2a\x00\x08\x00\x00\x00".to_vec());
    let header = Header::parse(&mut data).unwrap();
    assert_eq!(header.endian, Endian::Little);
    assert_eq!(header.first_ifd, 8);
  }

  #[test]
  fn header_big_endian() {
    let mut data = Cursor::new(b"MM\x00\x2a\x00\x00\x00\x08".to_vec());
    let header = Header::parse(&mut data).unwrap();
    assert_eq!(header.endian, Endian::Big);
    assert_eq!(header.first_ifd, 8);
  }

  #[test]
  fn header_bad_magic() {
    let mut data = Cursor::new(b"II\x2b\x00\x08\x00\x00\x00".to_vec());
    assert!(matches!(Header::parse(&mut data), Err(TiffError::BadMagic(0x2b))));
    let mut data = Cursor::new(b"XX\x2a\x00\x08\x00\x00\x00".to_vec());
    assert!(matches!(Header::parse(&mut data), Err(TiffError::BadMagic(_))));
  }
}
