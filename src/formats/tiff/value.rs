// SPDX-License-Identifier: MIT
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use serde::{Deserialize, Serialize};

/// Type to represent tiff values of type `RATIONAL`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct Rational {
  pub n: u32,
  pub d: u32,
}

impl Rational {
  pub fn new(n: u32, d: u32) -> Self {
    Self { n, d }
  }

  pub fn as_f32(&self) -> f32 {
    self.n as f32 / self.d as f32
  }
}

impl PartialEq for Rational {
  fn eq(&self, other: &Self) -> bool {
    (self.n as u64 * other.d as u64).eq(&(self.d as u64 * other.n as u64))
  }
}

impl Eq for Rational {}

/// Type to represent tiff values of type `SRATIONAL`
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct SRational {
  pub n: i32,
  pub d: i32,
}

impl SRational {
  pub fn new(n: i32, d: i32) -> Self {
    Self { n, d }
  }

  pub fn as_f32(&self) -> f32 {
    self.n as f32 / self.d as f32
  }
}

impl PartialEq for SRational {
  fn eq(&self, other: &Self) -> bool {
    (self.n as i64 * other.d as i64).eq(&(self.d as i64 * other.n as i64))
  }
}

impl Eq for SRational {}

/// NUL-delimited string list as stored in `ASCII` fields.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TiffAscii {
  raw: Vec<u8>,
}

impl TiffAscii {
  pub fn new_from_raw(raw: &[u8]) -> Self {
    Self { raw: Vec::from(raw) }
  }

  pub fn as_bytes(&self) -> &Vec<u8> {
    &self.raw
  }

  pub fn strings(&self) -> Vec<String> {
    self
      .raw
      .split(|b| *b == 0)
      .filter(|s| !s.is_empty())
      .map(|s| String::from_utf8_lossy(s).into_owned())
      .collect()
  }

  pub fn first(&self) -> String {
    self.strings().into_iter().next().unwrap_or_default()
  }
}

/// A TIFF entry value, resolved to its typed representation.
///
/// Unknown field types are never an error, they are retained byte-wise in
/// the `Unknown` variant together with the original type code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
  /// 8-bit unsigned integer
  Byte(Vec<u8>),
  /// 8-bit byte that contains a 7-bit ASCII code; the last byte must be zero
  Ascii(TiffAscii),
  /// 16-bit unsigned integer
  Short(Vec<u16>),
  /// 32-bit unsigned integer
  Long(Vec<u32>),
  /// Fraction stored as two 32-bit unsigned integers
  Rational(Vec<Rational>),
  /// 8-bit signed integer
  SByte(Vec<i8>),
  /// 8-bit byte that may contain anything, depending on the field
  Undefined(Vec<u8>),
  /// 16-bit signed integer
  SShort(Vec<i16>),
  /// 32-bit signed integer
  SLong(Vec<i32>),
  /// Fraction stored as two 32-bit signed integers
  SRational(Vec<SRational>),
  /// 32-bit IEEE floating point
  Float(Vec<f32>),
  /// 64-bit IEEE floating point
  Double(Vec<f64>),
  /// Unknown type, wrapped in u8
  Unknown(u16, Vec<u8>),
}

impl Value {
  pub fn count(&self) -> usize {
    match self {
      Self::Byte(v) => v.len(),
      Self::Ascii(v) => v.as_bytes().len(),
      Self::Short(v) => v.len(),
      Self::Long(v) => v.len(),
      Self::Rational(v) => v.len(),
      Self::SByte(v) => v.len(),
      Self::Undefined(v) => v.len(),
      Self::SShort(v) => v.len(),
      Self::SLong(v) => v.len(),
      Self::SRational(v) => v.len(),
      Self::Float(v) => v.len(),
      Self::Double(v) => v.len(),
      Self::Unknown(_, v) => v.len(),
    }
  }

  pub fn value_type(&self) -> u16 {
    match self {
      Self::Byte(_) => 1,
      Self::Ascii(_) => 2,
      Self::Short(_) => 3,
      Self::Long(_) => 4,
      Self::Rational(_) => 5,
      Self::SByte(_) => 6,
      Self::Undefined(_) => 7,
      Self::SShort(_) => 8,
      Self::SLong(_) => 9,
      Self::SRational(_) => 10,
      Self::Float(_) => 11,
      Self::Double(_) => 12,
      Self::Unknown(t, _) => *t,
    }
  }

  pub fn value_type_name(&self) -> String {
    match self {
      Self::Byte(_) => "BYTE".into(),
      Self::Ascii(_) => "ASCII".into(),
      Self::Short(_) => "SHORT".into(),
      Self::Long(_) => "LONG".into(),
      Self::Rational(_) => "RATIONAL".into(),
      Self::SByte(_) => "SBYTE".into(),
      Self::Undefined(_) => "UNDEFINED".into(),
      Self::SShort(_) => "SSHORT".into(),
      Self::SLong(_) => "SLONG".into(),
      Self::SRational(_) => "SRATIONAL".into(),
      Self::Float(_) => "FLOAT".into(),
      Self::Double(_) => "DOUBLE".into(),
      Self::Unknown(t, _) => format!("UNKNOWN({})", t),
    }
  }

  /// Byte-typed payload access for `UNDEFINED` style values.
  pub fn get_data(&self) -> &Vec<u8> {
    match self {
      Value::Ascii(data) => data.as_bytes(),
      Value::Byte(data) => data,
      Value::Undefined(data) => data,
      Value::Unknown(_, data) => data,
      _ => {
        panic!("Unable to call get_data() on this value type");
      }
    }
  }

  pub fn get_u16(&self, idx: usize) -> Option<u16> {
    match self {
      Value::Byte(v) => v.get(idx).map(|x| *x as u16),
      Value::Short(v) => v.get(idx).copied(),
      Value::Long(v) => v.get(idx).map(|x| *x as u16),
      Value::SShort(v) => v.get(idx).map(|x| *x as u16),
      Value::SLong(v) => v.get(idx).map(|x| *x as u16),
      _ => None,
    }
  }

  pub fn get_u32(&self, idx: usize) -> Option<u32> {
    match self {
      Value::Byte(v) => v.get(idx).map(|x| *x as u32),
      Value::Short(v) => v.get(idx).map(|x| *x as u32),
      Value::Long(v) => v.get(idx).copied(),
      Value::SShort(v) => v.get(idx).map(|x| *x as u32),
      Value::SLong(v) => v.get(idx).map(|x| *x as u32),
      _ => None,
    }
  }

  pub fn get_usize(&self, idx: usize) -> Option<usize> {
    self.get_u32(idx).map(|x| x as usize)
  }

  pub fn get_f32(&self, idx: usize) -> Option<f32> {
    match self {
      Value::Byte(v) => v.get(idx).map(|x| *x as f32),
      Value::Short(v) => v.get(idx).map(|x| *x as f32),
      Value::Long(v) => v.get(idx).map(|x| *x as f32),
      Value::SShort(v) => v.get(idx).map(|x| *x as f32),
      Value::SLong(v) => v.get(idx).map(|x| *x as f32),
      Value::Rational(v) => v.get(idx).map(|x| x.as_f32()),
      Value::SRational(v) => v.get(idx).map(|x| x.as_f32()),
      Value::Float(v) => v.get(idx).copied(),
      Value::Double(v) => v.get(idx).map(|x| *x as f32),
      _ => None,
    }
  }

  pub fn force_u16(&self, idx: usize) -> u16 {
    self.force(self.get_u16(idx))
  }

  pub fn force_u32(&self, idx: usize) -> u32 {
    self.force(self.get_u32(idx))
  }

  pub fn force_usize(&self, idx: usize) -> usize {
    self.force(self.get_usize(idx))
  }

  pub fn force_f32(&self, idx: usize) -> f32 {
    self.force(self.get_f32(idx))
  }

  fn force<T: Default>(&self, value: Option<T>) -> T {
    match value {
      Some(v) => v,
      None => {
        log::error!("TIFF value of type {} could not be cast, forced to default", self.value_type_name());
        Default::default()
      }
    }
  }
}
