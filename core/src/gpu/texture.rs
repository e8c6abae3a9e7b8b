use crate::memory::{MemoryAccessError, MemoryImage};
use core::fmt;

pub const ATLAS_WIDTH: usize = 1024;
pub const ATLAS_HEIGHT: usize = 1024;
/// Granularity of atlas placement and of the packed bounds.
pub const MIN_TEXTURE_SIZE: u16 = 16;
pub const MAX_TEXTURES: usize = 1024;

pub const FORMAT_RGBA: u8 = 0;
pub const FORMAT_YUV: u8 = 1;
pub const FORMAT_CI: u8 = 2;
pub const FORMAT_IA: u8 = 3;
pub const FORMAT_I: u8 = 4;

pub const SIZE_4: u8 = 0;
pub const SIZE_8: u8 = 1;
pub const SIZE_16: u8 = 2;
pub const SIZE_32: u8 = 3;

proc_bitfield::bitfield! {
    /// The two words of a SETTILE command, `w0` in the high half.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct TileDescriptor(pub u64): Debug {
        pub format: u8 @ 53..=55,
        pub size: u8 @ 51..=52,
        pub line: u16 @ 41..=49,
        pub tmem: u16 @ 32..=40,
        pub tile: u8 @ 24..=26,
        pub palette: u8 @ 20..=23,
        pub clamp_t: bool @ 19,
        pub mirror_t: bool @ 18,
        pub mask_t: u8 @ 14..=17,
        pub shift_t: u8 @ 10..=13,
        pub clamp_s: bool @ 9,
        pub mirror_s: bool @ 8,
        pub mask_s: u8 @ 4..=7,
        pub shift_s: u8 @ 0..=3,
    }
}

proc_bitfield::bitfield! {
    /// Position and size of a texture in the atlas, in units of [`MIN_TEXTURE_SIZE`] pixels.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct AtlasBounds(pub u32): Debug {
        pub x: u8 @ 0..=7,
        pub y: u8 @ 8..=15,
        pub width: u8 @ 16..=23,
        pub height: u8 @ 24..=31,
    }
}

impl AtlasBounds {
    #[inline]
    pub fn x_px(self) -> usize {
        self.x() as usize * MIN_TEXTURE_SIZE as usize
    }

    #[inline]
    pub fn y_px(self) -> usize {
        self.y() as usize * MIN_TEXTURE_SIZE as usize
    }

    #[inline]
    pub fn width_px(self) -> usize {
        self.width() as usize * MIN_TEXTURE_SIZE as usize
    }

    #[inline]
    pub fn height_px(self) -> usize {
        self.height() as usize * MIN_TEXTURE_SIZE as usize
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// The image most recently set by SETTIMG.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TextureImage {
    pub format: u8,
    pub size: u8,
    pub width: u16,
    pub addr: u32,
}

/// Coordinates from SETTILESIZE/LOADBLOCK, in 10.2 fixed point except `lrt` for LOADBLOCK, which
/// holds `dxt`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TextureRect {
    pub uls: u16,
    pub ult: u16,
    pub lrs: u16,
    pub lrt: u16,
}

/// Everything a texture cache needs to locate and decode one texture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TileState {
    pub image: TextureImage,
    pub descriptor: TileDescriptor,
    pub rect: TextureRect,
}

impl TileState {
    /// Returns the size in texels of a LOADBLOCK-loaded 16-bit texture.
    pub fn block_dimensions(&self) -> (u16, u16) {
        let bytes = ((self.rect.lrs as u32 + 1) << self.image.size) >> 1;
        let dxt = self.rect.lrt as u32;
        let row_bytes = if dxt == 0 {
            (self.image.width as u32) << self.image.size >> 1
        } else {
            ((2047 + dxt) / dxt) << 3
        };
        if row_bytes == 0 {
            return (0, 0);
        }
        ((row_bytes / 2) as u16, (bytes / row_bytes) as u16)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AtlasFullError {
    pub width: u16,
    pub height: u16,
}

impl fmt::Display for AtlasFullError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Texture atlas full, couldn't place a {}x{} texture",
            self.width, self.height
        )
    }
}

impl std::error::Error for AtlasFullError {}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoadError {
    AtlasFull(AtlasFullError),
    Memory(MemoryAccessError),
    UnsupportedFormat { format: u8, size: u8 },
    EmptyTexture,
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadError::AtlasFull(err) => write!(f, "{err}"),
            LoadError::Memory(err) => write!(f, "Couldn't read texture: {err}"),
            LoadError::UnsupportedFormat { format, size } => {
                write!(f, "Unsupported texture format {format} with size {size}")
            }
            LoadError::EmptyTexture => write!(f, "Texture has no texels"),
        }
    }
}

impl std::error::Error for LoadError {}

impl From<AtlasFullError> for LoadError {
    fn from(err: AtlasFullError) -> Self {
        LoadError::AtlasFull(err)
    }
}

impl From<MemoryAccessError> for LoadError {
    fn from(err: MemoryAccessError) -> Self {
        LoadError::Memory(err)
    }
}

pub trait TextureCache {
    fn load_or_fetch_texture(
        &mut self,
        tile: &TileState,
        memory: &MemoryImage,
    ) -> Result<TextureId, LoadError>;

    fn resolve_texture_bounds(&self, id: TextureId) -> Option<AtlasBounds>;

    /// The whole atlas, [`ATLAS_WIDTH`] texels per row, RGB565.
    fn texels(&self) -> &[u16];

    fn clear(&mut self);
}

#[inline]
pub fn rgba5551_to_rgb565(pixel: u16) -> u16 {
    (pixel & 0xF800) | ((pixel >> 6) & 0x1F) << 6 | ((pixel >> 1) & 0x1F)
}

#[inline]
fn fnv1a(hash: u32, value: u16) -> u32 {
    let hash = (hash ^ (value & 0xFF) as u32).wrapping_mul(0x0100_0193);
    (hash ^ (value >> 8) as u32).wrapping_mul(0x0100_0193)
}

#[derive(Clone, Copy, Debug)]
struct Entry {
    id: TextureId,
    hash: u32,
    bounds: AtlasBounds,
}

/// A first-fit texture atlas: textures are placed on a 16-texel grid and reused by content hash.
pub struct TextureAtlas {
    texels: Box<[u16]>,
    entries: Vec<Entry>,
    scratch: Vec<u16>,
    next_id: u32,
}

impl TextureAtlas {
    pub fn new() -> Self {
        TextureAtlas {
            texels: vec![0; ATLAS_WIDTH * ATLAS_HEIGHT].into_boxed_slice(),
            entries: Vec::with_capacity(MAX_TEXTURES),
            scratch: Vec::new(),
            next_id: 1,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn id_of_texture_with_hash(&self, hash: u32) -> Option<TextureId> {
        self.entries
            .iter()
            .find(|entry| entry.hash == hash)
            .map(|entry| entry.id)
    }

    fn space_occupied(&self, x: u8, y: u8, width: u8, height: u8) -> bool {
        let (left, top) = (x as u16, y as u16);
        let (right, bottom) = (left + width as u16, top + height as u16);
        self.entries.iter().any(|entry| {
            let b = entry.bounds;
            let (this_left, this_top) = (b.x() as u16, b.y() as u16);
            let this_right = this_left + b.width() as u16;
            let this_bottom = this_top + b.height() as u16;
            left.max(this_left) < right.min(this_right)
                && top.max(this_top) < bottom.min(this_bottom)
        })
    }

    fn find_space(&self, width: u8, height: u8) -> Option<(u8, u8)> {
        let cells_x = (ATLAS_WIDTH / MIN_TEXTURE_SIZE as usize) as u16;
        let cells_y = (ATLAS_HEIGHT / MIN_TEXTURE_SIZE as usize) as u16;
        for y in 0..=cells_y.checked_sub(height as u16)? {
            for x in 0..=cells_x.checked_sub(width as u16)? {
                if !self.space_occupied(x as u8, y as u8, width, height) {
                    return Some((x as u8, y as u8));
                }
            }
        }
        None
    }

    /// Places decoded RGB565 texels in the atlas, tiling them over the rounded-up cell.
    pub fn add_texture(
        &mut self,
        pixels: &[u16],
        width: u16,
        height: u16,
    ) -> Result<TextureId, LoadError> {
        if width == 0 || height == 0 || pixels.len() < width as usize * height as usize {
            return Err(LoadError::EmptyTexture);
        }
        let hash = pixels
            .iter()
            .fold(fnv1a(fnv1a(0x811C_9DC5, width), height), |hash, texel| {
                fnv1a(hash, *texel)
            });
        if let Some(id) = self.id_of_texture_with_hash(hash) {
            return Ok(id);
        }

        let full = AtlasFullError { width, height };
        let cells_w = width.div_ceil(MIN_TEXTURE_SIZE);
        let cells_h = height.div_ceil(MIN_TEXTURE_SIZE);
        if cells_w > 64 || cells_h > 64 || self.entries.len() == MAX_TEXTURES {
            return Err(full.into());
        }
        let (x, y) = self
            .find_space(cells_w as u8, cells_h as u8)
            .ok_or(full)?;
        let bounds = AtlasBounds(0)
            .with_x(x)
            .with_y(y)
            .with_width(cells_w as u8)
            .with_height(cells_h as u8);

        for row in 0..bounds.height_px() {
            let src_row = &pixels[(row % height as usize) * width as usize..][..width as usize];
            let dst_row = &mut self.texels[(bounds.y_px() + row) * ATLAS_WIDTH + bounds.x_px()..]
                [..bounds.width_px()];
            for (col, texel) in dst_row.iter_mut().enumerate() {
                *texel = src_row[col % width as usize];
            }
        }

        let id = TextureId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, hash, bounds });
        Ok(id)
    }
}

impl Default for TextureAtlas {
    fn default() -> Self {
        Self::new()
    }
}

impl TextureCache for TextureAtlas {
    fn load_or_fetch_texture(
        &mut self,
        tile: &TileState,
        memory: &MemoryImage,
    ) -> Result<TextureId, LoadError> {
        if tile.image.size != SIZE_16 || tile.image.format != FORMAT_RGBA {
            return Err(LoadError::UnsupportedFormat {
                format: tile.image.format,
                size: tile.image.size,
            });
        }
        let (width, height) = tile.block_dimensions();
        let mut pixels = core::mem::take(&mut self.scratch);
        pixels.clear();
        let result = (|| -> Result<TextureId, LoadError> {
            for y in 0..height as u32 {
                for x in 0..width as u32 {
                    let addr = tile.image.addr.wrapping_add((y * width as u32 + x) * 2);
                    pixels.push(rgba5551_to_rgb565(memory.read_u16(addr)?));
                }
            }
            self.add_texture(&pixels, width, height)
        })();
        self.scratch = pixels;
        result
    }

    fn resolve_texture_bounds(&self, id: TextureId) -> Option<AtlasBounds> {
        self.entries
            .iter()
            .find(|entry| entry.id == id)
            .map(|entry| entry.bounds)
    }

    fn texels(&self) -> &[u16] {
        &self.texels
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.next_id = 1;
    }
}
