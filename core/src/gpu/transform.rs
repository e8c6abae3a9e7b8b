use super::{
    state::{GeometryMode, GraphicsState, Vertex, Z_BUCKET_COUNT},
    Rgba, SCREEN_HEIGHT, SCREEN_WIDTH,
};
use crate::simd::{self, F32x4};

/// Where the perspective divide by `w` happens.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[cfg_attr(
    feature = "serde",
    derive(serde::Serialize, serde::Deserialize),
    serde(rename_all = "kebab-case")
)]
pub enum PerspectiveDivide {
    /// Cached vertices keep homogeneous clip coordinates; triangles are divided when assembled.
    #[default]
    Deferred,
    /// Cached vertices hold `(x/w, y/w, z/w, 1/w)`.
    InTransform,
}

/// A raw vertex record as read from memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct RawVertex {
    pub x: i16,
    pub y: i16,
    pub z: i16,
    pub flag: u16,
    pub s: i16,
    pub t: i16,
    pub rgba: u32,
}

impl RawVertex {
    /// Decodes the normal stored in the color field's first three (signed) bytes.
    pub fn normal(&self) -> F32x4 {
        let color = Rgba(self.rgba);
        F32x4::new([
            color.r() as i8 as f32 / 127.0,
            color.g() as i8 as f32 / 127.0,
            color.b() as i8 as f32 / 127.0,
            0.0,
        ])
    }
}

pub fn normalize(vec: F32x4) -> F32x4 {
    let len_sq = vec.dot3(vec);
    if len_sq == 0.0 {
        return F32x4::splat(0.0);
    }
    let [x, y, z, _] = vec.to_array();
    let len = len_sq.sqrt();
    F32x4::new([x / len, y / len, z / len, 0.0])
}

/// Computes `ambient + sum of max(n . l, 0) * light color` per channel, clamped, opaque.
pub fn light_vertex(state: &GraphicsState, normal: F32x4) -> u32 {
    let normal = normalize(normal);
    let channels = |color: u32| {
        let color = Rgba(color);
        F32x4::new([color.r() as f32, color.g() as f32, color.b() as f32, 0.0])
    };
    let mut color = channels(state.ambient_light().color);
    for light in &state.lights[..state.light_count] {
        let intensity = normal.dot3(light.direction).max(0.0);
        color = color + channels(light.color) * F32x4::splat(intensity);
    }
    let [r, g, b, _] = color
        .max(F32x4::splat(0.0))
        .min(F32x4::splat(255.0))
        .to_i32()
        .to_array();
    Rgba::from_channels(r as u8, g as u8, b as u8, 0xFF).0
}

#[inline]
fn perspective_divide(position: F32x4) -> F32x4 {
    let [x, y, z, w] = position.to_array();
    let inv_w = simd::recip(w);
    F32x4::new([x * inv_w, y * inv_w, z * inv_w, inv_w])
}

/// Transforms and lights one raw vertex into vertex cache slot `index`. Lighting only applies when
/// `lighting` is set and the geometry mode enables it.
pub fn transform_and_light_vertex(
    state: &mut GraphicsState,
    index: usize,
    raw: &RawVertex,
    divide: PerspectiveDivide,
    lighting: bool,
) {
    let position = F32x4::new([raw.x as f32, raw.y as f32, raw.z as f32, 1.0]);
    let position = state.modelview.top().mul_vec4(position);
    let mut position = state.projection.top().mul_vec4(position);
    if divide == PerspectiveDivide::InTransform && position.lane(3) != 0.0 {
        position = perspective_divide(position);
    }

    let normal = raw.normal();
    let rgba = if lighting && state.geometry_mode.contains(GeometryMode::LIGHTING) {
        light_vertex(state, normal)
    } else {
        raw.rgba
    };

    let mut s = raw.s >> 5;
    let mut t = raw.t >> 5;
    if state.texture.enabled {
        if state.texture.scale_s != 0 {
            s = ((s as i32 * state.texture.scale_s as i32) >> 16) as i16;
        }
        if state.texture.scale_t != 0 {
            t = ((t as i32 * state.texture.scale_t as i32) >> 16) as i16;
        }
    }

    state.vertices[index] = Vertex {
        position,
        normal,
        rgba,
        s,
        t,
    };
}

/// Screen-space position of a cached vertex: pixel coordinates with the origin in the top-left
/// corner, normalized device `z`, and `w`.
#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub struct ScreenPosition {
    pub x: i32,
    pub y: i32,
    pub z: f32,
    pub w: f32,
}

pub fn project_to_screen(vertex: &Vertex, divide: PerspectiveDivide) -> ScreenPosition {
    let ndc = match divide {
        PerspectiveDivide::InTransform => vertex.position,
        PerspectiveDivide::Deferred if vertex.position.lane(3) != 0.0 => {
            perspective_divide(vertex.position)
        }
        PerspectiveDivide::Deferred => vertex.position,
    };
    let half_width = (SCREEN_WIDTH / 2) as f32;
    let half_height = (SCREEN_HEIGHT / 2) as f32;
    let [x, y, z, inv_w] = ndc.to_array();
    ScreenPosition {
        x: (x * half_width + half_width).round() as i32,
        y: (half_height - y * half_height).round() as i32,
        z,
        w: if inv_w == 0.0 { 0.0 } else { 1.0 / inv_w },
    }
}

/// Depth units a z-buffered triangle may spread on either side of its bucket's center. Buckets are
/// `2 * i16::MAX / Z_BUCKET_COUNT` units apart, so this keeps neighboring buckets disjoint.
pub const BUCKET_HALF_SPAN: i32 = i16::MAX as i32 / Z_BUCKET_COUNT as i32 - 1;

/// Folds a normalized depth into the current z bucket, as stored in the depth buffer. Every depth
/// produced for one `z_base` lies within [`BUCKET_HALF_SPAN`] of that bucket's center and below the
/// cleared depth buffer value.
pub fn bucket_depth(z_base: f32, z: f32, z_buffer_enabled: bool) -> i16 {
    let center = (z_base * i16::MAX as f32) as i32;
    let offset = if z_buffer_enabled {
        (z.clamp(-1.0, 1.0) * BUCKET_HALF_SPAN as f32) as i32
    } else {
        0
    };
    (center + offset).clamp(i16::MIN as i32, i16::MAX as i32 - 1) as i16
}
