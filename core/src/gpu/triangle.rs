use super::{
    combiner::CombineOperands,
    state::{GeometryMode, GraphicsState},
    texture::AtlasBounds,
    transform::{bucket_depth, project_to_screen, PerspectiveDivide},
};

/// A vertex ready for rasterization, in pixel coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct TriangleVertex {
    pub x: i32,
    pub y: i32,
    pub depth: i16,
    pub shade: u32,
    pub s: i16,
    pub t: i16,
}

/// Everything a rasterizer needs to draw one triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Triangle {
    pub vertices: [TriangleVertex; 3],
    pub operands: CombineOperands,
    /// Where the triangle's texture lives in the atlas; only set when the combiner samples texels.
    pub texture: Option<AtlasBounds>,
    pub z_buffer: bool,
    pub cull_back: bool,
}

impl Triangle {
    /// Builds a triangle from three vertex cache slots.
    pub fn assemble(
        state: &GraphicsState,
        indices: [usize; 3],
        divide: PerspectiveDivide,
        texture_bounds: Option<AtlasBounds>,
    ) -> Self {
        let z_buffer = state.geometry_mode.contains(GeometryMode::ZBUFFER);
        let shaded = state.geometry_mode.contains(GeometryMode::SHADE);
        let vertices = indices.map(|index| {
            let vertex = &state.vertices[index];
            let screen = project_to_screen(vertex, divide);
            TriangleVertex {
                x: screen.x,
                y: screen.y,
                depth: bucket_depth(state.z_base, screen.z, z_buffer),
                shade: if shaded {
                    vertex.rgba
                } else {
                    state.primitive_color
                },
                s: vertex.s,
                t: vertex.t,
            }
        });
        Triangle {
            vertices,
            operands: state.combiner.operands(&state.combine_colors()),
            texture: texture_bounds.filter(|_| state.combiner.references_texel()),
            z_buffer,
            cull_back: state.geometry_mode.contains(GeometryMode::CULL_BACK),
        }
    }
}

/// Receives the triangles produced while interpreting a display list.
pub trait TriangleSink {
    /// `texels` is the whole texture atlas the triangle's bounds refer to.
    fn draw_triangle(&mut self, triangle: &Triangle, texels: &[u16]);
}

impl TriangleSink for Vec<Triangle> {
    fn draw_triangle(&mut self, triangle: &Triangle, _texels: &[u16]) {
        self.push(*triangle);
    }
}
