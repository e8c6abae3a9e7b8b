use super::Rgba;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum CombineSource {
    #[default]
    Combined = 0,
    Texel0 = 1,
    Texel1 = 2,
    Primitive = 3,
    Shade = 4,
    Environment = 5,
    Center = 6,
    Scale = 7,
    CombinedAlpha = 8,
    Texel0Alpha = 9,
    Texel1Alpha = 10,
    PrimitiveAlpha = 11,
    ShadeAlpha = 12,
    EnvAlpha = 13,
    LodFraction = 14,
    PrimLodFrac = 15,
    Noise = 16,
    K4 = 17,
    K5 = 18,
    One = 19,
    Zero = 20,
}

use CombineSource::*;

pub static SA_RGB: [CombineSource; 16] = [
    Combined, Texel0, Texel1, Primitive, Shade, Environment, One, Noise, Zero, Zero, Zero, Zero,
    Zero, Zero, Zero, Zero,
];

pub static SB_RGB: [CombineSource; 16] = [
    Combined, Texel0, Texel1, Primitive, Shade, Environment, Center, K4, Zero, Zero, Zero, Zero,
    Zero, Zero, Zero, Zero,
];

pub static M_RGB: [CombineSource; 32] = [
    Combined,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    Scale,
    CombinedAlpha,
    Texel0Alpha,
    Texel1Alpha,
    PrimitiveAlpha,
    ShadeAlpha,
    EnvAlpha,
    LodFraction,
    PrimLodFrac,
    K5,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
    Zero,
];

pub static A_RGB: [CombineSource; 8] =
    [Combined, Texel0, Texel1, Primitive, Shade, Environment, One, Zero];

pub static SA_A: [CombineSource; 8] =
    [Combined, Texel0, Texel1, Primitive, Shade, Environment, One, Zero];

pub static SB_A: [CombineSource; 8] =
    [Combined, Texel0, Texel1, Primitive, Shade, Environment, One, Zero];

pub static M_A: [CombineSource; 8] = [
    LodFraction,
    Texel0,
    Texel1,
    Primitive,
    Shade,
    Environment,
    PrimLodFrac,
    Zero,
];

pub static A_A: [CombineSource; 8] =
    [Combined, Texel0, Texel1, Primitive, Shade, Environment, One, Zero];

/// How the rasterizer obtains one operand of the combine equation.
pub const MODE_COLOR: u8 = 0x00;
pub const MODE_SHADE: u8 = 0x7F;
pub const MODE_TEXTURE: u8 = 0xFF;

pub const MODE_SA_SHIFT: u32 = 24;
pub const MODE_SB_SHIFT: u32 = 16;
pub const MODE_M_SHIFT: u32 = 8;
pub const MODE_A_SHIFT: u32 = 0;

/// One `(SA - SB) * M + A` stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CombineStage {
    pub sa: CombineSource,
    pub sb: CombineSource,
    pub m: CombineSource,
    pub a: CombineSource,
}

impl CombineStage {
    #[inline]
    fn sources(&self) -> [CombineSource; 4] {
        [self.sa, self.sb, self.m, self.a]
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct Combiner {
    pub rgb: [CombineStage; 2],
    pub alpha: [CombineStage; 2],
}

/// Constant colors the combine sources can refer to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CombineColors {
    pub primitive: u32,
    pub environment: u32,
}

/// Cycle-0 operands resolved for one triangle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct CombineOperands {
    pub sa: u32,
    pub sb: u32,
    pub m: u32,
    pub a: u32,
    pub rgb_mode: u32,
    pub alpha_mode: u32,
}

fn resolve(source: CombineSource, colors: &CombineColors) -> (u8, Rgba) {
    let replicate_alpha = |color: u32| {
        let a = Rgba(color).a();
        Rgba(0).with_r(a).with_g(a).with_b(a).with_a(a)
    };
    match source {
        Texel0 | Texel1 | Texel0Alpha | Texel1Alpha => (MODE_TEXTURE, Rgba(0)),
        Shade | ShadeAlpha => (MODE_SHADE, Rgba(0)),
        Primitive => (MODE_COLOR, Rgba(colors.primitive)),
        PrimitiveAlpha => (MODE_COLOR, replicate_alpha(colors.primitive)),
        Environment => (MODE_COLOR, Rgba(colors.environment)),
        EnvAlpha => (MODE_COLOR, replicate_alpha(colors.environment)),
        One => (MODE_COLOR, Rgba(0xFFFF_FFFF)),
        _ => (MODE_COLOR, Rgba(0)),
    }
}

impl Combiner {
    /// Decodes the two mux words of a SETCOMBINE command (`mux0` holds the low 24 bits of the
    /// first command word).
    pub fn decode(mux0: u32, mux1: u32) -> Self {
        let f = |value: u32, shift: u32, mask: u32| ((value >> shift) & mask) as usize;
        Combiner {
            rgb: [
                CombineStage {
                    sa: SA_RGB[f(mux0, 20, 0xF)],
                    sb: SB_RGB[f(mux1, 28, 0xF)],
                    m: M_RGB[f(mux0, 15, 0x1F)],
                    a: A_RGB[f(mux1, 15, 7)],
                },
                CombineStage {
                    sa: SA_RGB[f(mux0, 5, 0xF)],
                    sb: SB_RGB[f(mux1, 24, 0xF)],
                    m: M_RGB[f(mux0, 0, 0x1F)],
                    a: A_RGB[f(mux1, 6, 7)],
                },
            ],
            alpha: [
                CombineStage {
                    sa: SA_A[f(mux0, 12, 7)],
                    sb: SB_A[f(mux1, 12, 7)],
                    m: M_A[f(mux0, 9, 7)],
                    a: A_A[f(mux1, 9, 7)],
                },
                CombineStage {
                    sa: SA_A[f(mux1, 21, 7)],
                    sb: SB_A[f(mux1, 3, 7)],
                    m: M_A[f(mux1, 18, 7)],
                    a: A_A[f(mux1, 0, 7)],
                },
            ],
        }
    }

    pub fn references_texel(&self) -> bool {
        self.rgb.iter().any(|stage| {
            stage
                .sources()
                .iter()
                .any(|source| matches!(source, Texel0 | Texel1 | Texel0Alpha | Texel1Alpha))
        })
    }

    /// Resolves the first cycle's operands; each packed color takes its RGB channels from the RGB
    /// stage and its alpha from the alpha stage.
    pub fn operands(&self, colors: &CombineColors) -> CombineOperands {
        let rgb = self.rgb[0].sources();
        let alpha = self.alpha[0].sources();
        let shifts = [MODE_SA_SHIFT, MODE_SB_SHIFT, MODE_M_SHIFT, MODE_A_SHIFT];
        let mut result_colors = [0; 4];
        let mut rgb_mode = 0;
        let mut alpha_mode = 0;
        for i in 0..4 {
            let (mode, color) = resolve(rgb[i], colors);
            let (a_mode, a_color) = resolve(alpha[i], colors);
            result_colors[i] = color.with_a(a_color.a()).0;
            rgb_mode |= (mode as u32) << shifts[i];
            alpha_mode |= (a_mode as u32) << shifts[i];
        }
        CombineOperands {
            sa: result_colors[0],
            sb: result_colors[1],
            m: result_colors[2],
            a: result_colors[3],
            rgb_mode,
            alpha_mode,
        }
    }
}
