pub mod combiner;
pub mod interpreter;
pub mod matrix;
pub mod state;
pub mod texture;
pub mod transform;
pub mod triangle;

pub const SCREEN_WIDTH: usize = 320;
pub const SCREEN_HEIGHT: usize = 240;

proc_bitfield::bitfield! {
    /// A color packed the way the emulated machine stores it, red in the top byte.
    #[derive(Clone, Copy, PartialEq, Eq, Default)]
    pub struct Rgba(pub u32): Debug {
        pub r: u8 @ 24..=31,
        pub g: u8 @ 16..=23,
        pub b: u8 @ 8..=15,
        pub a: u8 @ 0..=7,
    }
}

impl Rgba {
    #[inline]
    pub fn from_channels(r: u8, g: u8, b: u8, a: u8) -> Self {
        Rgba(u32::from_be_bytes([r, g, b, a]))
    }

}

#[inline]
pub fn rgb565(r: u8, g: u8, b: u8) -> u16 {
    (r as u16 >> 3) << 11 | (g as u16 >> 2) << 5 | b as u16 >> 3
}
