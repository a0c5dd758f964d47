// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use std::collections::{BTreeMap, HashMap, HashSet};
use std::io::{Read, Seek, SeekFrom};

use log::warn;
use serde::{Deserialize, Serialize};

use crate::bits::Endian;
use crate::tags::{TiffCommonTag, TiffTagEnum};

use super::entry::Entry;
use super::reader::{EndianReader, ReadByteOrder};
use super::value::Value;
use super::{apply_corr, Result, TiffError, MAX_IFD_DEPTH};

/// Tags whose LONG values are offsets of nested IFDs. These are followed
/// recursively during the parse; everything else stays flat.
const SUB_IFD_TAGS: [u16; 5] = [
  TiffCommonTag::SubIFDs as u16,
  TiffCommonTag::ExifIFD as u16,
  TiffCommonTag::GPSIFD as u16,
  TiffCommonTag::DNGPrivateData as u16,
  TiffCommonTag::IdcIFD as u16,
];

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct IFD {
  pub offset: u32,
  pub next_ifd: u32,
  pub entries: BTreeMap<u16, Entry>,
  pub endian: Endian,
  pub sub: HashMap<u16, Vec<IFD>>,
}

impl IFD {
  /// Parse the IFD at `offset`: entry count, the 12-byte entries, and the
  /// next-IFD pointer. Nested IFDs referenced by the known sub-IFD tags
  /// are parsed by recursive application at their offsets.
  ///
  /// `visited` spans the whole parse so offset cycles are rejected, and
  /// `depth` caps the recursion independently of cycle detection.
  pub fn parse<R: Read + Seek>(
    reader: &mut R,
    offset: u32,
    corr: i32,
    depth: usize,
    endian: Endian,
    visited: &mut HashSet<u32>,
    file_len: u64,
  ) -> Result<IFD> {
    if depth >= MAX_IFD_DEPTH {
      return Err(TiffError::StructureTooDeep(offset));
    }
    if !visited.insert(offset) {
      return Err(TiffError::General(format!("IFD cycle detected at offset {}", offset)));
    }
    if offset as u64 + 2 > file_len {
      return Err(TiffError::OffsetOutOfRange {
        offset: offset as u64,
        len: 2,
        file_len,
      });
    }
    reader.seek(SeekFrom::Start(offset as u64))?;
    let mut reader = EndianReader::new(reader, endian);
    let entry_count = reader.read_u16()?;
    if offset as u64 + 2 + entry_count as u64 * 12 > file_len {
      return Err(TiffError::TruncatedEntry(format!(
        "IFD at offset {} claims {} entries beyond the end of file",
        offset, entry_count
      )));
    }

    let mut entries = BTreeMap::new();
    let mut sub_ifd_offsets: HashMap<u16, Vec<u32>> = HashMap::new();
    for _ in 0..entry_count {
      let tag = reader.read_u16()?;
      let entry = Entry::parse(&mut reader, corr, tag, file_len)?;

      if SUB_IFD_TAGS.contains(&tag) {
        if let Some(offsets) = sub_ifd_pointers(&entry.value, endian) {
          sub_ifd_offsets.insert(tag, offsets);
        }
      }
      entries.insert(entry.tag, entry);
    }

    // Some TIFF writers skip the next ifd pointer
    // If we get an I/O error, we fallback to 0, signaling the end of IFD chains.
    let next_ifd = match reader.read_u32() {
      Ok(ptr) => ptr,
      Err(e) => {
        warn!("TIFF IFD reader failed to get next IFD pointer, fallback to 0. Error was: {}", e);
        0
      }
    };

    // Process sub-IFDs
    let reader = reader.into_inner();
    let mut sub = HashMap::new();
    for (tag, offsets) in sub_ifd_offsets {
      let mut ifds = Vec::new();
      for sub_offset in offsets {
        let ifd = Self::parse(reader, apply_corr(sub_offset, corr), corr, depth + 1, endian, visited, file_len)?;
        ifds.push(ifd);
      }
      sub.insert(tag, ifds);
    }

    Ok(IFD {
      offset,
      next_ifd: if next_ifd == 0 { 0 } else { apply_corr(next_ifd, corr) },
      entries,
      endian,
      sub,
    })
  }

  pub fn entry_count(&self) -> u16 {
    self.entries.len() as u16
  }

  pub fn next_ifd(&self) -> u32 {
    self.next_ifd
  }

  pub fn entries(&self) -> &BTreeMap<u16, Entry> {
    &self.entries
  }

  pub fn sub_ifds(&self) -> &HashMap<u16, Vec<IFD>> {
    &self.sub
  }

  pub fn get_entry<T: TiffTagEnum>(&self, tag: T) -> Option<&Entry> {
    self.entries.get(&tag.into())
  }

  pub fn get_entry_recursive<T: TiffTagEnum>(&self, tag: T) -> Option<&Entry> {
    self
      .entries
      .get(&tag.into())
      .or_else(|| self.sub.values().flatten().find_map(|ifd| ifd.get_entry_recursive(tag)))
  }

  pub fn has_entry<T: TiffTagEnum>(&self, tag: T) -> bool {
    self.get_entry(tag).is_some()
  }

  pub(crate) fn collect_ifds_with_tag<'a, T: TiffTagEnum>(&'a self, tag: T, out: &mut Vec<&'a IFD>) {
    if self.has_entry(tag) {
      out.push(self);
    }
    for ifds in self.sub.values() {
      for ifd in ifds {
        ifd.collect_ifds_with_tag(tag, out);
      }
    }
  }

  /// Parse the makernote entry as a TIFF-in-TIFF fragment.
  ///
  /// Sony makernotes start with a maker signature and may carry their own
  /// byte order mark; value offsets inside are absolute file offsets. Only
  /// the entries with known tags get symbolic meaning, the rest ride along
  /// as opaque values.
  pub fn parse_makernote<R: Read + Seek>(&self, reader: &mut R, file_len: u64) -> Result<Option<IFD>> {
    if let Some(entry) = self.get_entry(TiffCommonTag::MakerNote) {
      let offset = entry.offset;
      match &entry.value {
        Value::Undefined(data) => {
          let mut off = 0;
          let mut endian = self.endian;

          if data.len() >= 12 && (data[0..9] == b"SONY DSC "[..] || data[0..9] == b"SONY CAM "[..]) {
            off += 12;
          }

          // Some have MM or II to indicate endianness - read that
          if data.len() >= off + 2 {
            if data[off..off + 2] == b"II"[..] {
              off += 2;
              endian = Endian::Little;
            } else if data[off..off + 2] == b"MM"[..] {
              off += 2;
              endian = Endian::Big;
            }
          }

          let mut visited = HashSet::new();
          Ok(Some(IFD::parse(reader, offset + off as u32, 0, 0, endian, &mut visited, file_len)?))
        }
        _ => Err(TiffError::General("Makernote entry has unknown value type".into())),
      }
    } else {
      Ok(None)
    }
  }

  pub fn dump<T: TiffTagEnum + TryFrom<u16>>(&self, limit: usize) -> Vec<String> {
    let mut out = Vec::new();
    out.push(format!("IFD entries: {}\n", self.entries.len()));
    for (tag, entry) in &self.entries {
      let tag_name = match T::try_from(*tag) {
        Ok(name) => format!("{:?}", name),
        Err(_) => format!("<?{}>", tag),
      };
      out.push(format!(
        "{0:#06x} : {1:<20} | {2:<10} | {3:<6}",
        tag,
        tag_name,
        entry.type_name(),
        entry.count().min(limit)
      ));
    }
    for (tag, ifds) in self.sub_ifds().iter() {
      for (i, sub) in ifds.iter().enumerate() {
        out.push(format!("SubIFD({}:{})", tag, i));
        for line in sub.dump::<T>(limit) {
          out.push(format!("   {}", line));
        }
      }
    }
    out
  }
}

/// Extract nested IFD offsets from a sub-IFD entry value. `SubIFDs` is a
/// LONG array, `DNGPrivateData` is written by Sony as raw bytes holding a
/// single offset word.
fn sub_ifd_pointers(value: &Value, endian: Endian) -> Option<Vec<u32>> {
  match value {
    Value::Long(offsets) => Some(offsets.clone()),
    Value::Byte(data) | Value::Undefined(data) if data.len() >= 4 => Some(vec![endian.read_u32(data, 0)]),
    _ => None,
  }
}
