// SPDX-License-Identifier: LGPL-2.1
// Copyright 2021 Daniel Vogelbacher <daniel@chaospixel.com>

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::imgop::clip;
use crate::imgop::curve::CurveLut;
use crate::pixarray::{PixU16, Rgba16};
use crate::{ArwError, CancelToken, Result};

/// White balance gains, one multiplier per color channel.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Wb {
  pub r: f32,
  pub g: f32,
  pub b: f32,
}

impl Wb {
  pub fn new(r: f32, g: f32, b: f32) -> Self {
    Self { r, g, b }
  }

  pub fn neutral() -> Self {
    Self { r: 1.0, g: 1.0, b: 1.0 }
  }
}

impl Default for Wb {
  fn default() -> Self {
    Self::neutral()
  }
}

/// Demosaic mode of the development pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum DemosaicMethod {
  /// 2x2 window average: one red, two greens, one blue per output pixel.
  #[default]
  Average2x2,
  /// Each sample lands in its native channel, the other channels stay
  /// zero. Useful for inspecting the mosaic in tests.
  PassThrough,
}

/// Parameters for developing a Bayer grid into the RGB output image.
#[derive(Debug, Clone)]
pub struct DevelopParams {
  pub black_level: u16,
  pub wb: Wb,
  pub brightness: f32,
  pub curve: Option<CurveLut>,
  pub demosaic: DemosaicMethod,
}

impl Default for DevelopParams {
  fn default() -> Self {
    Self {
      black_level: 0,
      wb: Wb::neutral(),
      brightness: 1.0,
      curve: None,
      demosaic: DemosaicMethod::default(),
    }
  }
}

const CH_MAX: f32 = 16383.0;

/// Develop an RGGB Bayer grid into a 14 bit RGB image of the same
/// dimensions.
///
/// Per output pixel: black level subtraction, demosaic over the 2x2
/// window anchored at the pixel (out-of-bounds neighbours clamp to the
/// nearest in-bounds sample), white balance and brightness gains, tone
/// curve lookup, clamp to the 14 bit range. Alpha is always opaque.
///
/// Rows are processed in parallel; the cancellation token is checked at
/// row boundaries.
pub fn develop_raw(grid: &PixU16, params: &DevelopParams, cancel: &CancelToken) -> Result<Rgba16> {
  let dim = grid.dim();
  let (w, h) = (dim.w, dim.h);
  let black = params.black_level;
  let mut out = Rgba16::new(w, h);

  let sample = |row: usize, col: usize| -> u16 { grid.at(row.min(h - 1), col.min(w - 1)).saturating_sub(black) };

  out.data.par_chunks_mut(w).enumerate().for_each(|(row, line)| {
    if cancel.is_cancelled() {
      return;
    }
    match params.demosaic {
      DemosaicMethod::Average2x2 => {
        for (col, pix) in line.iter_mut().enumerate() {
          let r = sample(row, col);
          let g = (sample(row, col + 1) as u32 + sample(row + 1, col) as u32) / 2;
          let b = sample(row + 1, col + 1);
          *pix = finish_pixel(r as f32, g as f32, b as f32, params);
        }
      }
      DemosaicMethod::PassThrough => {
        for (col, pix) in line.iter_mut().enumerate() {
          let s = sample(row, col) as f32;
          let (r, g, b) = match (row & 1, col & 1) {
            (0, 0) => (s, 0.0, 0.0),
            (1, 1) => (0.0, 0.0, s),
            _ => (0.0, s, 0.0),
          };
          *pix = finish_pixel(r, g, b, params);
        }
      }
    }
  });

  if cancel.is_cancelled() {
    return Err(ArwError::Cancelled);
  }
  Ok(out)
}

#[inline(always)]
fn finish_pixel(r: f32, g: f32, b: f32, params: &DevelopParams) -> [u16; 4] {
  let gain = params.brightness;
  let mut r = clip(r * params.wb.r * gain, 0.0, CH_MAX) as u16;
  let mut g = clip(g * params.wb.g * gain, 0.0, CH_MAX) as u16;
  let mut b = clip(b * params.wb.b * gain, 0.0, CH_MAX) as u16;
  if let Some(curve) = &params.curve {
    r = curve.interpolate(r);
    g = curve.interpolate(g);
    b = curve.interpolate(b);
  }
  [r, g, b, u16::MAX]
}

#[cfg(test)]
mod tests {
  use super::*;

  fn grid_2x2() -> PixU16 {
    PixU16::new_with(vec![100, 200, 300, 400], 2, 2)
  }

  #[test]
  fn demosaic_at_origin() {
    let out = develop_raw(&grid_2x2(), &DevelopParams::default(), &CancelToken::new()).unwrap();
    assert_eq!(out.at(0, 0), &[100, 250, 400, u16::MAX]);
  }

  #[test]
  fn edges_clamp_to_nearest_sample() {
    let out = develop_raw(&grid_2x2(), &DevelopParams::default(), &CancelToken::new()).unwrap();
    // bottom-right: every window position clamps onto (1, 1)
    assert_eq!(out.at(1, 1), &[400, 400, 400, u16::MAX]);
    // right edge of row 0: x+1 clamps back onto x
    assert_eq!(out.at(0, 1), &[200, 300, 400, u16::MAX]);
  }

  #[test]
  fn black_level_saturates_at_zero() {
    let params = DevelopParams {
      black_level: 150,
      ..Default::default()
    };
    let out = develop_raw(&grid_2x2(), &params, &CancelToken::new()).unwrap();
    assert_eq!(out.at(0, 0), &[0, 100, 250, u16::MAX]);
  }

  #[test]
  fn white_balance_and_brightness_scale_channels() {
    let params = DevelopParams {
      wb: Wb::new(2.0, 1.0, 0.5),
      brightness: 2.0,
      ..Default::default()
    };
    let out = develop_raw(&grid_2x2(), &params, &CancelToken::new()).unwrap();
    assert_eq!(out.at(0, 0), &[400, 500, 400, u16::MAX]);
  }

  #[test]
  fn output_clamps_to_14bit() {
    let grid = PixU16::new_with(vec![16383; 4], 2, 2);
    let params = DevelopParams {
      wb: Wb::new(100.0, 100.0, 100.0),
      ..Default::default()
    };
    let out = develop_raw(&grid, &params, &CancelToken::new()).unwrap();
    assert_eq!(out.at(0, 0), &[16383, 16383, 16383, u16::MAX]);
  }

  #[test]
  fn pass_through_keeps_single_channel() {
    let grid = PixU16::new_with((1..=16).collect::<Vec<u16>>(), 4, 4);
    let params = DevelopParams {
      demosaic: DemosaicMethod::PassThrough,
      ..Default::default()
    };
    let out = develop_raw(&grid, &params, &CancelToken::new()).unwrap();
    for row in 0..4 {
      for col in 0..4 {
        let pix = out.at(row, col);
        let nonzero = pix[0..3].iter().filter(|v| **v != 0).count();
        assert_eq!(nonzero, 1, "expected a single populated channel at {}:{}", row, col);
        let expected_ch = match (row & 1, col & 1) {
          (0, 0) => 0,
          (1, 1) => 2,
          _ => 1,
        };
        assert_eq!(pix[expected_ch], *grid.at(row, col));
      }
    }
  }

  #[test]
  fn cancelled_decode_reports_cancelled() {
    let cancel = CancelToken::new();
    cancel.cancel();
    assert!(matches!(develop_raw(&grid_2x2(), &DevelopParams::default(), &cancel), Err(ArwError::Cancelled)));
  }
}
