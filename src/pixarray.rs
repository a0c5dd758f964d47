use crate::imgop::{Dim2, Point, Rect};

/// Planar single-channel pixel grid, used for the Bayer mosaic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pix2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<T>,
}

pub type PixU16 = Pix2D<u16>;

impl<T> Pix2D<T>
where
  T: Copy + Default + Send,
{
  pub fn new_with(data: Vec<T>, width: usize, height: usize) -> Self {
    assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new(width: usize, height: usize) -> Self {
    let data = vec![T::default(); width * height];
    Self { data, width, height }
  }

  pub fn into_inner(self) -> Vec<T> {
    self.data
  }

  pub fn pixels(&self) -> &[T] {
    &self.data
  }

  pub fn pixels_mut(&mut self) -> &mut [T] {
    &mut self.data
  }

  pub fn pixel_rows(&self) -> std::slice::ChunksExact<'_, T> {
    self.data.chunks_exact(self.width)
  }

  pub fn pixel_rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, T> {
    self.data.chunks_exact_mut(self.width)
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &T {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut T {
    &mut self.data[row * self.width + col]
  }

  pub fn dim(&self) -> Dim2 {
    Dim2::new(self.width, self.height)
  }
}

/// Four-channel pixel image. The decoder's output is `Rgba2D<u16>` with an
/// effective 14 bit range per color channel and an always-opaque alpha,
/// stored in 16 bit fields for downstream 16 bit consumers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rgba2D<T> {
  pub width: usize,
  pub height: usize,
  pub data: Vec<[T; 4]>,
}

pub type Rgba16 = Rgba2D<u16>;

impl<T> Rgba2D<T>
where
  T: Copy + Default + Send,
{
  pub fn new_with(data: Vec<[T; 4]>, width: usize, height: usize) -> Self {
    assert_eq!(data.len(), height * width);
    Self { data, width, height }
  }

  pub fn new(width: usize, height: usize) -> Self {
    let data = vec![<[T; 4]>::default(); width * height];
    Self { data, width, height }
  }

  pub fn into_inner(self) -> Vec<[T; 4]> {
    self.data
  }

  pub fn pixels(&self) -> &[[T; 4]] {
    &self.data
  }

  pub fn pixels_mut(&mut self) -> &mut [[T; 4]] {
    &mut self.data
  }

  pub fn pixel_rows(&self) -> std::slice::ChunksExact<'_, [T; 4]> {
    self.data.chunks_exact(self.width)
  }

  pub fn pixel_rows_mut(&mut self) -> std::slice::ChunksExactMut<'_, [T; 4]> {
    self.data.chunks_exact_mut(self.width)
  }

  #[inline(always)]
  pub fn at(&self, row: usize, col: usize) -> &[T; 4] {
    &self.data[row * self.width + col]
  }

  #[inline(always)]
  pub fn at_mut(&mut self, row: usize, col: usize) -> &mut [T; 4] {
    &mut self.data[row * self.width + col]
  }

  /// Full-image rectangle anchored at the top-left origin.
  pub fn rect(&self) -> Rect {
    Rect::new(Point::zero(), Dim2::new(self.width, self.height))
  }
}
