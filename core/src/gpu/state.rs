use super::{
    combiner::{CombineColors, Combiner},
    matrix::Matrix,
    texture::{TextureId, TextureImage, TextureRect, TileDescriptor, TileState},
};
use crate::simd::F32x4;
use bitflags::bitflags;

pub const MATRIX_STACK_SIZE: usize = 16;
pub const VERTEX_CACHE_SIZE: usize = 128;
pub const MAX_LIGHTS: usize = 16;
pub const SEGMENT_COUNT: usize = 16;
pub const TILE_COUNT: usize = 8;

pub const Z_BUCKET_COUNT: u32 = 8;
pub const Z_BUCKET_SIZE: f32 = 2.0 / Z_BUCKET_COUNT as f32;
pub const MAX_Z_BASE: f32 = 1.0 - Z_BUCKET_SIZE / 2.0;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct GeometryMode: u32 {
        const ZBUFFER = 1;
        const TEXTURE_ENABLE = 1 << 1;
        const SHADE = 1 << 2;
        const SHADING_SMOOTH = 1 << 9;
        const CULL_FRONT = 1 << 12;
        const CULL_BACK = 1 << 13;
        const FOG = 1 << 16;
        const LIGHTING = 1 << 17;
        const TEXTURE_GEN = 1 << 18;
        const TEXTURE_GEN_LINEAR = 1 << 19;
        const LOD = 1 << 20;
    }
}

/// Resolves segmented addresses (4-bit selector in bits 24..=27, 24-bit offset).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct SegmentTable(pub [u32; SEGMENT_COUNT]);

impl SegmentTable {
    #[inline]
    pub fn resolve(&self, addr: u32) -> u32 {
        self.0[(addr >> 24 & 0xF) as usize].wrapping_add(addr & 0xFF_FFFF)
    }
}

/// A fixed-capacity matrix stack whose index saturates at both ends.
#[derive(Clone, Debug)]
pub struct MatrixStack {
    matrices: [Matrix; MATRIX_STACK_SIZE],
    index: usize,
}

impl MatrixStack {
    pub fn new() -> Self {
        MatrixStack {
            matrices: [Matrix::identity(); MATRIX_STACK_SIZE],
            index: 0,
        }
    }

    pub fn reset(&mut self) {
        self.matrices[0] = Matrix::identity();
        self.index = 0;
    }

    #[inline]
    pub fn index(&self) -> usize {
        self.index
    }

    #[inline]
    pub fn top(&self) -> &Matrix {
        &self.matrices[self.index]
    }

    #[inline]
    pub fn set_top(&mut self, matrix: Matrix) {
        self.matrices[self.index] = matrix;
    }

    /// Duplicates the top matrix; a no-op when the stack is full.
    pub fn push(&mut self) {
        if self.index < MATRIX_STACK_SIZE - 1 {
            self.matrices[self.index + 1] = self.matrices[self.index];
            self.index += 1;
        }
    }

    /// A no-op when only the bottom matrix is left.
    pub fn pop(&mut self) {
        if self.index > 0 {
            self.index -= 1;
        }
    }
}

impl Default for MatrixStack {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Light {
    pub color: u32,
    /// Normalized, `w` is always 0.
    pub direction: F32x4,
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct Vertex {
    pub position: F32x4,
    pub normal: F32x4,
    pub rgba: u32,
    pub s: i16,
    pub t: i16,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Viewport {
    pub scale: [i16; 4],
    pub translate: [i16; 4],
}

/// State set by the TEXTURE command.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TextureState {
    pub enabled: bool,
    pub tile: u8,
    pub level: u8,
    pub scale_s: u16,
    pub scale_t: u16,
    pub id: Option<TextureId>,
}

/// Everything the interpreter mutates while walking a display list. One instance is owned by
/// each rendering worker.
#[derive(Clone, Debug)]
pub struct GraphicsState {
    pub projection: MatrixStack,
    pub modelview: MatrixStack,
    pub alt_matrix: Matrix,
    pub vertices: Box<[Vertex; VERTEX_CACHE_SIZE]>,
    pub segments: SegmentTable,
    /// Directional lights, followed by the ambient light at `light_count`.
    pub lights: [Light; MAX_LIGHTS + 1],
    pub light_count: usize,
    pub combiner: Combiner,
    pub primitive_color: u32,
    pub environment_color: u32,
    pub fill_color: u32,
    pub blend_color: u32,
    pub geometry_mode: GeometryMode,
    pub other_mode: u64,
    pub texture: TextureState,
    pub texture_image: TextureImage,
    pub tiles: [TileDescriptor; TILE_COUNT],
    pub texture_rect: TextureRect,
    pub viewport: Viewport,
    pub z_base: f32,
}

impl GraphicsState {
    pub fn new() -> Self {
        GraphicsState {
            projection: MatrixStack::new(),
            modelview: MatrixStack::new(),
            alt_matrix: Matrix::identity(),
            vertices: Box::new([Vertex::default(); VERTEX_CACHE_SIZE]),
            segments: SegmentTable::default(),
            lights: [Light::default(); MAX_LIGHTS + 1],
            light_count: 0,
            combiner: Combiner::default(),
            primitive_color: 0,
            environment_color: 0,
            fill_color: 0,
            blend_color: 0,
            geometry_mode: GeometryMode::empty(),
            other_mode: 0,
            texture: TextureState::default(),
            texture_image: TextureImage::default(),
            tiles: [TileDescriptor(0); TILE_COUNT],
            texture_rect: TextureRect::default(),
            viewport: Viewport::default(),
            z_base: MAX_Z_BASE,
        }
    }

    /// Prepares for a new frame; vertex cache contents are left as they are.
    pub fn reset(&mut self, segments: &SegmentTable) {
        self.projection.reset();
        self.modelview.reset();
        self.alt_matrix = Matrix::identity();
        self.segments = *segments;
        self.lights = [Light::default(); MAX_LIGHTS + 1];
        self.light_count = 0;
        self.combiner = Combiner::default();
        self.primitive_color = 0;
        self.environment_color = 0;
        self.fill_color = 0;
        self.blend_color = 0;
        self.geometry_mode = GeometryMode::empty();
        self.other_mode = 0;
        self.texture = TextureState::default();
        self.texture_image = TextureImage::default();
        self.tiles = [TileDescriptor(0); TILE_COUNT];
        self.texture_rect = TextureRect::default();
        self.viewport = Viewport::default();
        self.z_base = MAX_Z_BASE;
    }

    #[inline]
    pub fn ambient_light(&self) -> &Light {
        &self.lights[self.light_count]
    }

    #[inline]
    pub fn combine_colors(&self) -> CombineColors {
        CombineColors {
            primitive: self.primitive_color,
            environment: self.environment_color,
        }
    }

    /// Sets or clears geometry mode bits, stepping the z-bucket base down whenever z-buffering
    /// gets turned on.
    pub fn set_geometry_mode(&mut self, mode: GeometryMode) {
        let was_z_buffered = self.geometry_mode.contains(GeometryMode::ZBUFFER);
        self.geometry_mode = mode;
        if !was_z_buffered && mode.contains(GeometryMode::ZBUFFER) {
            self.z_base = (self.z_base - Z_BUCKET_SIZE).max(-MAX_Z_BASE);
        }
    }

    pub fn tile_state(&self) -> TileState {
        TileState {
            image: self.texture_image,
            descriptor: self.tiles[self.texture.tile as usize & (TILE_COUNT - 1)],
            rect: self.texture_rect,
        }
    }
}

impl Default for GraphicsState {
    fn default() -> Self {
        Self::new()
    }
}
