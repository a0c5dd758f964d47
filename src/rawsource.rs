use std::{
  fmt::Debug,
  fs::File,
  io::Cursor,
  ops::Deref,
  path::{Path, PathBuf},
  sync::Arc,
};

use memmap2::MmapOptions;

/// Random-access byte source for a single decode.
///
/// Backed either by a memory mapped file or by a shared in-memory buffer.
/// Clones are cheap (`Arc` inside), which matters because decrypted SR2
/// blocks are wrapped into a fresh `RawSource` and re-parsed as TIFF
/// fragments while the outer parse is still borrowing the original.
#[derive(Clone)]
pub struct RawSource {
  path: PathBuf,
  inner: Arc<RawSourceImpl>,
}

enum RawSourceImpl {
  Memmap(memmap2::Mmap),
  Memory(Vec<u8>),
}

impl RawSource {
  pub fn new(path: &Path) -> std::io::Result<Self> {
    let file = File::open(path)?;
    let mmap = unsafe { MmapOptions::new().populate().map(&file)? };
    #[cfg(unix)]
    {
      mmap.advise(memmap2::Advice::WillNeed)?;
      mmap.advise(memmap2::Advice::Sequential)?;
    }
    Ok(Self {
      path: path.canonicalize().unwrap_or_else(|_| path.to_owned()),
      inner: Arc::new(RawSourceImpl::Memmap(mmap)),
    })
  }

  pub fn new_from_vec(buf: Vec<u8>) -> Self {
    Self {
      path: PathBuf::default(),
      inner: Arc::new(RawSourceImpl::Memory(buf)),
    }
  }

  pub fn new_from_slice(buf: &[u8]) -> Self {
    Self::new_from_vec(Vec::from(buf))
  }

  pub fn path(&self) -> &Path {
    &self.path
  }

  pub fn buf(&self) -> &[u8] {
    self.deref()
  }

  pub fn len(&self) -> u64 {
    self.buf().len() as u64
  }

  pub fn is_empty(&self) -> bool {
    self.buf().is_empty()
  }

  /// Fill `dst` from `offset`, returning the number of bytes copied.
  /// Reads crossing the end of the source are shortened, reads starting
  /// behind it copy nothing.
  pub fn read_at(&self, offset: u64, dst: &mut [u8]) -> std::io::Result<usize> {
    let buf = self.buf();
    if offset >= buf.len() as u64 {
      return Ok(0);
    }
    let avail = &buf[offset as usize..];
    let n = dst.len().min(avail.len());
    dst[..n].copy_from_slice(&avail[..n]);
    Ok(n)
  }

  pub fn subview(&self, offset: u64, size: u64) -> std::io::Result<&[u8]> {
    self.buf().get(offset as usize..(offset + size) as usize).ok_or(std::io::Error::new(
      std::io::ErrorKind::UnexpectedEof,
      format!("subview(): Offset {}+{} is behind EOF", offset, size),
    ))
  }

  pub fn subview_until_eof(&self, offset: u64) -> std::io::Result<&[u8]> {
    self.buf().get(offset as usize..).ok_or(std::io::Error::new(
      std::io::ErrorKind::UnexpectedEof,
      format!("subview_until_eof(): Offset {} is behind EOF", offset),
    ))
  }

  pub fn reader(&self) -> Cursor<&[u8]> {
    Cursor::new(self.buf())
  }
}

impl Deref for RawSource {
  type Target = [u8];

  fn deref(&self) -> &Self::Target {
    match self.inner.as_ref() {
      RawSourceImpl::Memmap(mmap) => mmap.deref(),
      RawSourceImpl::Memory(mem) => mem.as_slice(),
    }
  }
}

impl Debug for RawSource {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("RawSource").field("path", &self.path).field("len", &self.len()).finish()
  }
}
