use tachyon_core::{
    gpu::{
        texture::{AtlasBounds, ATLAS_WIDTH},
        triangle::{Triangle, TriangleSink, TriangleVertex},
        SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    simd::{self, I16x8, I32x4},
};

/// Pixels covered by one step of the inner loop.
pub const PIXEL_STEP_SIZE: usize = I16x8::LANES;

/// Value the depth buffer is cleared to; only nearer (smaller) depths pass the test.
pub const DEPTH_CLEAR: i16 = 0x7FFF;

/// Edge steps are kept below `1 << EDGE_STEP_BITS`; longer edges are scaled down.
const EDGE_STEP_BITS: u32 = 16;

/// Edge values are clamped to this magnitude at the bounding box origin. Stepping across the whole
/// screen changes an edge value by less than this, so the clamp never flips a sign.
const EDGE_LIMIT: i128 = 1 << 30;

/// Fractional bits of the fixed-point attribute planes.
const VARYING_FRACTION_BITS: u32 = 16;

/// The rows of the framebuffer one worker owns: global row `y` belongs to worker
/// `y % worker_count` and is stored at local row `y / worker_count`.
#[derive(Clone)]
pub struct Slice {
    worker_id: usize,
    worker_count: usize,
    rows: usize,
    pixels: Box<[u16]>,
    depth: Box<[i16]>,
}

impl Slice {
    pub fn new(worker_id: usize, worker_count: usize) -> Self {
        let rows = SCREEN_HEIGHT.div_ceil(worker_count);
        Slice {
            worker_id,
            worker_count,
            rows,
            pixels: vec![0; SCREEN_WIDTH * rows].into_boxed_slice(),
            depth: vec![DEPTH_CLEAR; SCREEN_WIDTH * rows].into_boxed_slice(),
        }
    }

    #[inline]
    pub fn worker_id(&self) -> usize {
        self.worker_id
    }

    #[inline]
    pub fn worker_count(&self) -> usize {
        self.worker_count
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn owns_row(&self, y: usize) -> bool {
        y % self.worker_count == self.worker_id
    }

    pub fn clear(&mut self) {
        self.pixels.fill(0);
        self.depth.fill(DEPTH_CLEAR);
    }

    /// Returns the pixels of global row `y`, which must be owned by this slice.
    #[inline]
    pub fn row(&self, y: usize) -> &[u16] {
        debug_assert!(self.owns_row(y));
        let start = y / self.worker_count * SCREEN_WIDTH;
        &self.pixels[start..start + SCREEN_WIDTH]
    }

    #[inline]
    pub fn depth_row(&self, y: usize) -> &[i16] {
        debug_assert!(self.owns_row(y));
        let start = y / self.worker_count * SCREEN_WIDTH;
        &self.depth[start..start + SCREEN_WIDTH]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RasterStats {
    pub pixels_drawn: u64,
    pub z_buffered_pixels_drawn: u64,
    pub triangles_drawn: u64,
}

/// A value that is linear in screen space, kept as eight lanes covering one step of the inner
/// loop. `row` holds the lanes at the start of the current owned row.
#[derive(Clone, Copy, Default)]
struct Plane {
    row: [I32x4; 2],
    x_step: I32x4,
    y_step: I32x4,
}

impl Plane {
    /// Creates a plane from its value at the bounding box origin, its per-pixel horizontal change
    /// and its change between two owned rows. Lane arithmetic wraps, so any value that fits in an
    /// `i32` at a pixel comes out exact regardless of how far the origin value had to travel.
    #[inline]
    fn new(origin: i32, dx: i32, row_step: i32) -> Self {
        let low = I32x4::splat(origin) + I32x4::new([0, 1, 2, 3]) * I32x4::splat(dx);
        let high = low + I32x4::splat(dx.wrapping_mul(4));
        Plane {
            row: [low, high],
            x_step: I32x4::splat(dx.wrapping_mul(PIXEL_STEP_SIZE as i32)),
            y_step: I32x4::splat(row_step),
        }
    }

    #[inline]
    fn start_row(&self) -> Cursor {
        Cursor {
            lanes: self.row,
            step: self.x_step,
        }
    }

    #[inline]
    fn next_row(&mut self) {
        let step = self.y_step;
        self.row = self.row.map(|lanes| lanes + step);
    }
}

/// A plane's lanes at the current step along a row.
#[derive(Clone, Copy)]
struct Cursor {
    lanes: [I32x4; 2],
    step: I32x4,
}

impl Cursor {
    #[inline]
    fn advance(&mut self) {
        let step = self.step;
        self.lanes = self.lanes.map(|lanes| lanes + step);
    }

    /// Rounds fixed-point attribute lanes to the nearest integer.
    #[inline]
    fn to_attribute(self) -> I16x8 {
        let half = I32x4::splat(1 << (VARYING_FRACTION_BITS - 1));
        let [low, high] = self
            .lanes
            .map(|lanes| (lanes + half) >> VARYING_FRACTION_BITS);
        I16x8::from_halves(low, high)
    }
}

/// Sets up the edge function `E(p) = (v0.y - v1.y) * p.x + (v1.x - v0.x) * p.y + c`, which is zero
/// on the line through `v0` and `v1`, for stepping from `(x, y)`.
///
/// Values are exact while both coefficients fit in [`EDGE_STEP_BITS`] bits. Otherwise the function
/// is scaled down by a power of two, which moves the edge by a few thousandths of a pixel at most.
fn edge_plane(
    v0: &TriangleVertex,
    v1: &TriangleVertex,
    x: i32,
    y: i32,
    worker_count: i32,
) -> Plane {
    let a = i64::from(v0.y) - i64::from(v1.y);
    let b = i64::from(v1.x) - i64::from(v0.x);
    let origin = i128::from(a) * i128::from(i64::from(x) - i64::from(v0.x))
        + i128::from(b) * i128::from(i64::from(y) - i64::from(v0.y));

    let bits = u64::BITS - (a.unsigned_abs() | b.unsigned_abs()).leading_zeros();
    let shift = bits.saturating_sub(EDGE_STEP_BITS);
    let origin = (origin >> shift).clamp(-EDGE_LIMIT, EDGE_LIMIT) as i32;
    let (a, b) = ((a >> shift) as i32, (b >> shift) as i32);
    Plane::new(origin, a, b * worker_count)
}

/// Twice the signed area of the triangle, positive when its vertices run clockwise on screen.
fn signed_area(v: &[TriangleVertex; 3]) -> i128 {
    let dx = |i: usize| i128::from(v[i].x) - i128::from(v[0].x);
    let dy = |i: usize| i128::from(v[i].y) - i128::from(v[0].y);
    dx(1) * dy(2) - dx(2) * dy(1)
}

/// Screen-space derivatives shared by every attribute of one triangle.
struct Gradients {
    origin: [f64; 2],
    x: [f64; 2],
    y: [f64; 2],
    row_spacing: f64,
}

impl Gradients {
    fn new(v: &[TriangleVertex; 3], inv_area: f64, x: i32, y: i32, worker_count: i32) -> Self {
        let (x0, y0) = (f64::from(v[0].x), f64::from(v[0].y));
        let (x1, y1) = (f64::from(v[1].x), f64::from(v[1].y));
        let (x2, y2) = (f64::from(v[2].x), f64::from(v[2].y));
        Gradients {
            origin: [f64::from(x) - x0, f64::from(y) - y0],
            // d(lambda1)/dx, d(lambda2)/dx
            x: [(y2 - y0) * inv_area, (y0 - y1) * inv_area],
            y: [(x0 - x2) * inv_area, (x1 - x0) * inv_area],
            row_spacing: f64::from(worker_count),
        }
    }

    /// A fixed-point plane for an attribute taking `values` at the three vertices.
    fn plane(&self, values: [i32; 3]) -> Plane {
        let base = f64::from(values[0]);
        let d1 = f64::from(values[1]) - base;
        let d2 = f64::from(values[2]) - base;
        let dx = d1 * self.x[0] + d2 * self.x[1];
        let dy = d1 * self.y[0] + d2 * self.y[1];
        let origin = base + dx * self.origin[0] + dy * self.origin[1];
        Plane::new(to_fixed(origin), to_fixed(dx), to_fixed(dy * self.row_spacing))
    }
}

/// Converts to the fixed-point attribute format, wrapping out-of-range values.
#[inline]
fn to_fixed(value: f64) -> i32 {
    (value * f64::from(1_u32 << VARYING_FRACTION_BITS)).round() as i64 as i32
}

/// Detects the axis-aligned right triangles that rectangle sprites get split into.
pub fn is_axis_aligned_right_triangle(vertices: &[TriangleVertex; 3]) -> bool {
    (0..3).any(|i| {
        let corner = &vertices[i];
        let j = &vertices[(i + 1) % 3];
        let k = &vertices[(i + 2) % 3];
        (j.x == corner.x && k.y == corner.y) || (j.y == corner.y && k.x == corner.x)
    })
}

/// Draws the part of `triangle` that falls into the rows owned by `slice`; `texels` is the texture
/// atlas the triangle's bounds refer to.
pub fn fill_triangle(
    slice: &mut Slice,
    triangle: &Triangle,
    texels: &[u16],
    stats: &mut RasterStats,
) {
    let mut v = triangle.vertices;
    if is_axis_aligned_right_triangle(&v) {
        return;
    }

    // Screen rows grow downwards, so triangles that are clockwise in clip space have a positive
    // area here.
    let area = signed_area(&v);
    if area == 0 || (area > 0 && triangle.cull_back) {
        return;
    }
    let area = if area < 0 {
        v.swap(1, 2);
        -area
    } else {
        area
    };

    let min_x = v.iter().map(|v| v.x).min().unwrap_or(0).max(0) & !7;
    let min_y = v.iter().map(|v| v.y).min().unwrap_or(0).max(0);
    let max_x = v
        .iter()
        .map(|v| v.x)
        .max()
        .unwrap_or(0)
        .min(SCREEN_WIDTH as i32 - 1);
    let max_y = v
        .iter()
        .map(|v| v.y)
        .max()
        .unwrap_or(0)
        .min(SCREEN_HEIGHT as i32 - 1);
    if min_x > max_x || min_y > max_y {
        return;
    }

    // First owned row inside the bounding box
    let worker_count = slice.worker_count as i32;
    let start_y = min_y + (slice.worker_id as i32 - min_y).rem_euclid(worker_count);
    if start_y > max_y {
        return;
    }

    let mut edges = [(1, 2), (2, 0), (0, 1)]
        .map(|(i, j)| edge_plane(&v[i], &v[j], min_x, start_y, worker_count));

    let inv_area = f64::from(simd::recip(area as f32));
    let gradients = Gradients::new(&v, inv_area, min_x, start_y, worker_count);
    let mut depth = gradients.plane(v.map(|v| i32::from(v.depth)));
    // (s, t) for textured triangles, (r, g, b) otherwise
    let mut shading = match triangle.texture {
        Some(_) => [
            gradients.plane(v.map(|v| i32::from(v.s))),
            gradients.plane(v.map(|v| i32::from(v.t))),
            Plane::default(),
        ],
        None => [24_u32, 16, 8]
            .map(|shift| gradients.plane(v.map(|v| (v.shade >> shift & 0xFF) as i32))),
    };
    let zero = I32x4::splat(0);
    let (black, white) = (I16x8::splat(0), I16x8::splat(0xFF));

    let mut drawn = false;
    let mut y = start_y;
    while y <= max_y {
        let row_start = (y as usize / slice.worker_count) * SCREEN_WIDTH;
        let mut w = edges.map(|edge| edge.start_row());
        let mut z = depth.start_row();
        let mut shade = shading.map(|plane| plane.start_row());
        let mut x = min_x;
        while x <= max_x {
            let inside = [0, 1].map(|half| {
                (w[0].lanes[half] | w[1].lanes[half] | w[2].lanes[half]).simd_ge(zero)
            });
            let mut mask = I16x8::from_halves(inside[0], inside[1]);
            if !mask.is_zero() {
                let index = row_start + x as usize;
                let z = z.to_attribute();
                let depth_block = &mut slice.depth[index..index + PIXEL_STEP_SIZE];
                if triangle.z_buffer {
                    mask = mask & z.simd_lt(I16x8::from_slice(depth_block));
                }
                if !mask.is_zero() {
                    z.store_masked(depth_block, mask);

                    let pixels = match triangle.texture {
                        Some(bounds) => sample_texture(
                            texels,
                            bounds,
                            shade[0].to_attribute(),
                            shade[1].to_attribute(),
                            mask,
                        ),
                        None => {
                            let [r, g, b] = shade
                                .map(|channel| channel.to_attribute().max(black).min(white));
                            (r >> 3) << 11 | (g >> 2) << 5 | b >> 3
                        }
                    };
                    pixels.store_masked_u16(
                        &mut slice.pixels[index..index + PIXEL_STEP_SIZE],
                        mask,
                    );

                    let count = u64::from(mask.count_set());
                    stats.pixels_drawn += count;
                    if triangle.z_buffer {
                        stats.z_buffered_pixels_drawn += count;
                    }
                    drawn = true;
                }
            }
            for cursor in w.iter_mut().chain([&mut z]).chain(shade.iter_mut()) {
                cursor.advance();
            }
            x += PIXEL_STEP_SIZE as i32;
        }
        for plane in edges.iter_mut().chain([&mut depth]).chain(shading.iter_mut()) {
            plane.next_row();
        }
        y += worker_count;
    }

    if drawn {
        stats.triangles_drawn += 1;
    }
}

/// Gathers the texels of the selected lanes, wrapping `s` and `t` into the texture's bounds.
fn sample_texture(texels: &[u16], bounds: AtlasBounds, s: I16x8, t: I16x8, mask: I16x8) -> I16x8 {
    let (width, height) = (bounds.width_px() as i32, bounds.height_px() as i32);
    if width == 0 || height == 0 {
        return I16x8::splat(0);
    }
    let mut result = [0; PIXEL_STEP_SIZE];
    for (i, texel) in result.iter_mut().enumerate() {
        if !mask.lane_set(i) {
            continue;
        }
        let s = i32::from(s.lane(i)).rem_euclid(width) as usize;
        let t = i32::from(t.lane(i)).rem_euclid(height) as usize;
        let index = (bounds.y_px() + t) * ATLAS_WIDTH + bounds.x_px() + s;
        *texel = texels.get(index).copied().unwrap_or(0) as i16;
    }
    I16x8::new(result)
}

/// A [`TriangleSink`] that draws into one worker's slice.
pub struct Rasterizer {
    slice: Slice,
    stats: RasterStats,
}

impl Rasterizer {
    pub fn new(worker_id: usize, worker_count: usize) -> Self {
        Rasterizer {
            slice: Slice::new(worker_id, worker_count),
            stats: RasterStats::default(),
        }
    }

    #[inline]
    pub fn slice(&self) -> &Slice {
        &self.slice
    }

    #[inline]
    pub fn slice_mut(&mut self) -> &mut Slice {
        &mut self.slice
    }

    #[inline]
    pub fn stats(&self) -> RasterStats {
        self.stats
    }

    /// Clears the slice and the statistics for a new frame.
    pub fn start_frame(&mut self) {
        self.slice.clear();
        self.stats = RasterStats::default();
    }
}

impl TriangleSink for Rasterizer {
    fn draw_triangle(&mut self, triangle: &Triangle, texels: &[u16]) {
        fill_triangle(&mut self.slice, triangle, texels, &mut self.stats);
    }
}
