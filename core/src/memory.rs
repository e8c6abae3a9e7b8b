use crate::gpu::matrix::Matrix;
use core::fmt;

/// Smallest accepted main memory image (4 MiB, the console's base RDRAM size).
pub const MIN_SIZE: usize = 0x40_0000;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum BoundsPolicy {
    /// Out-of-range accesses fail with a [`MemoryAccessError`].
    #[default]
    Fail,
    /// Out-of-range reads return 0 and writes are dropped.
    Clamp,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MemoryAccessError {
    pub addr: u32,
    pub width: u8,
    pub size: usize,
}

impl fmt::Display for MemoryAccessError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}-byte access @ {:#010X} outside of the {:#X}-byte memory image",
            self.width, self.addr, self.size
        )
    }
}

impl std::error::Error for MemoryAccessError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CreationError {
    TooSmall { size: usize },
    SizeNotWordAligned,
}

impl fmt::Display for CreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreationError::TooSmall { size } => write!(
                f,
                "Memory image too small: expected at least {MIN_SIZE} bytes, got {size} bytes"
            ),
            CreationError::SizeNotWordAligned => {
                write!(f, "Memory image size is not a multiple of 4 bytes")
            }
        }
    }
}

impl std::error::Error for CreationError {}

/// The emulated main memory, stored as host little-endian 32-bit words.
///
/// Byte address `a` of the emulated big-endian machine lives at index `a ^ 3`, and the halfword at
/// address `a` lives at `a ^ 2`; word accesses need no swizzling.
#[derive(Clone)]
pub struct MemoryImage {
    bytes: Box<[u8]>,
    policy: BoundsPolicy,
}

impl MemoryImage {
    pub fn new(size: usize, policy: BoundsPolicy) -> Result<Self, CreationError> {
        Self::from_bytes(vec![0; size].into_boxed_slice(), policy)
    }

    pub fn from_bytes(bytes: Box<[u8]>, policy: BoundsPolicy) -> Result<Self, CreationError> {
        if bytes.len() < MIN_SIZE {
            return Err(CreationError::TooSmall { size: bytes.len() });
        }
        if bytes.len() & 3 != 0 {
            return Err(CreationError::SizeNotWordAligned);
        }
        Ok(MemoryImage { bytes, policy })
    }

    /// Builds an image from big-endian machine words.
    pub fn from_words(words: &[u32], policy: BoundsPolicy) -> Result<Self, CreationError> {
        let bytes = words
            .iter()
            .flat_map(|word| word.to_le_bytes())
            .collect::<Box<[u8]>>();
        Self::from_bytes(bytes, policy)
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    #[inline]
    pub fn policy(&self) -> BoundsPolicy {
        self.policy
    }

    #[inline]
    pub fn contains(&self, addr: u32, width: usize) -> bool {
        (addr as usize)
            .checked_add(width)
            .is_some_and(|end| end <= self.bytes.len())
    }

    /// Checks an access; `Ok(None)` means the access was clamped away.
    #[inline]
    fn check(&self, addr: u32, width: u8) -> Result<Option<usize>, MemoryAccessError> {
        if self.contains(addr, width as usize) {
            Ok(Some(addr as usize))
        } else {
            match self.policy {
                BoundsPolicy::Fail => Err(MemoryAccessError {
                    addr,
                    width,
                    size: self.bytes.len(),
                }),
                BoundsPolicy::Clamp => Ok(None),
            }
        }
    }

    pub fn read_u8(&self, addr: u32) -> Result<u8, MemoryAccessError> {
        Ok(self.check(addr, 1)?.map_or(0, |i| self.bytes[i ^ 3]))
    }

    pub fn read_i8(&self, addr: u32) -> Result<i8, MemoryAccessError> {
        self.read_u8(addr).map(|value| value as i8)
    }

    pub fn read_u16(&self, addr: u32) -> Result<u16, MemoryAccessError> {
        Ok(self.check(addr, 2)?.map_or(0, |i| {
            let i = i ^ 2;
            u16::from_le_bytes([self.bytes[i], self.bytes[i + 1]])
        }))
    }

    pub fn read_i16(&self, addr: u32) -> Result<i16, MemoryAccessError> {
        self.read_u16(addr).map(|value| value as i16)
    }

    pub fn read_u32(&self, addr: u32) -> Result<u32, MemoryAccessError> {
        Ok(self.check(addr, 4)?.map_or(0, |i| {
            u32::from_le_bytes([
                self.bytes[i],
                self.bytes[i + 1],
                self.bytes[i + 2],
                self.bytes[i + 3],
            ])
        }))
    }

    pub fn write_u8(&mut self, addr: u32, value: u8) -> Result<(), MemoryAccessError> {
        if let Some(i) = self.check(addr, 1)? {
            self.bytes[i ^ 3] = value;
        }
        Ok(())
    }

    pub fn write_u16(&mut self, addr: u32, value: u16) -> Result<(), MemoryAccessError> {
        if let Some(i) = self.check(addr, 2)? {
            let i = i ^ 2;
            self.bytes[i..i + 2].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    pub fn write_u32(&mut self, addr: u32, value: u32) -> Result<(), MemoryAccessError> {
        if let Some(i) = self.check(addr, 4)? {
            self.bytes[i..i + 4].copy_from_slice(&value.to_le_bytes());
        }
        Ok(())
    }

    /// Writes consecutive big-endian machine words starting at `addr`.
    pub fn write_words(&mut self, addr: u32, words: &[u32]) -> Result<(), MemoryAccessError> {
        for (i, word) in words.iter().enumerate() {
            self.write_u32(addr.wrapping_add(i as u32 * 4), *word)?;
        }
        Ok(())
    }

    #[inline]
    pub fn read_matrix(&self, addr: u32) -> Result<Matrix, MemoryAccessError> {
        Matrix::load(self, addr)
    }
}

impl fmt::Debug for MemoryImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryImage")
            .field("len", &self.bytes.len())
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
