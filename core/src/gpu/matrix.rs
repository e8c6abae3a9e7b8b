use crate::{
    memory::{MemoryAccessError, MemoryImage},
    simd::F32x4,
};
use core::ops::Mul;

/// A row-major 4x4 matrix; vectors are multiplied as rows (`v' = v * M`).
#[derive(Clone, Copy, Debug, PartialEq)]
#[repr(align(64))]
pub struct Matrix(pub [F32x4; 4]);

impl Matrix {
    pub fn zero() -> Self {
        Matrix([F32x4::splat(0.0); 4])
    }

    pub fn identity() -> Self {
        Matrix::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ])
    }

    pub fn from_rows(rows: [[f32; 4]; 4]) -> Self {
        Matrix(rows.map(F32x4::new))
    }

    #[inline]
    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.0[row].lane(col)
    }

    /// Returns a copy with element `(row, col)` replaced.
    #[must_use]
    pub fn with(mut self, row: usize, col: usize, value: f32) -> Self {
        let mut lanes = self.0[row].to_array();
        lanes[col] = value;
        self.0[row] = F32x4::new(lanes);
        self
    }

    /// Loads a matrix in the 16.16 fixed-point memory layout: the signed integer halves of all 16
    /// elements come first (row-major, one halfword each), followed 32 bytes later by the unsigned
    /// fractional halves in the same order.
    pub fn load(memory: &MemoryImage, addr: u32) -> Result<Self, MemoryAccessError> {
        let mut rows = [[0.0; 4]; 4];
        for (i, row) in rows.iter_mut().enumerate() {
            for (j, elem) in row.iter_mut().enumerate() {
                let offset = addr.wrapping_add((i * 8 + j * 2) as u32);
                let int = memory.read_u16(offset)? as u32;
                let frac = memory.read_u16(offset.wrapping_add(32))? as u32;
                *elem = (int << 16 | frac) as i32 as f32 / 65536.0;
            }
        }
        Ok(Matrix::from_rows(rows))
    }

    /// Transforms a row vector: `result[c] = sum over r of vec[r] * self[r][c]`.
    #[inline]
    pub fn mul_vec4(&self, vec: F32x4) -> F32x4 {
        let [x, y, z, w] = vec.to_array();
        self.0[0] * F32x4::splat(x)
            + self.0[1] * F32x4::splat(y)
            + self.0[2] * F32x4::splat(z)
            + self.0[3] * F32x4::splat(w)
    }
}

impl Default for Matrix {
    fn default() -> Self {
        Matrix::identity()
    }
}

impl Mul for Matrix {
    type Output = Self;

    fn mul(self, rhs: Self) -> Self {
        Matrix(self.0.map(|row| rhs.mul_vec4(row)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::{BoundsPolicy, MIN_SIZE};

    fn encode(memory: &mut MemoryImage, addr: u32, rows: [[f32; 4]; 4]) {
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                let fixed = (*value * 65536.0) as i32 as u32;
                let offset = addr + (i * 8 + j * 2) as u32;
                memory.write_u16(offset, (fixed >> 16) as u16).unwrap();
                memory.write_u16(offset + 32, fixed as u16).unwrap();
            }
        }
    }

    #[test]
    fn load_reads_split_fixed_point_halves() {
        let mut memory = MemoryImage::new(MIN_SIZE, BoundsPolicy::Fail).unwrap();
        // Row 0: 1.5, 0, 0, 0 / row 1 element 2: -0.25, written as raw machine words
        memory.write_u32(0x1000, 0x0001_0000).unwrap();
        memory.write_u32(0x1020, 0x8000_0000).unwrap();
        memory.write_u32(0x100C, 0xFFFF_0000).unwrap();
        memory.write_u32(0x102C, 0xC000_0000).unwrap();
        memory.write_u32(0x1018, 0x0000_0001).unwrap();
        memory.write_u32(0x1038, 0x0000_0000).unwrap();

        let matrix = memory.read_matrix(0x1000).unwrap();
        assert_eq!(matrix.get(0, 0), 1.5);
        assert_eq!(matrix.get(0, 1), 0.0);
        assert_eq!(matrix.get(1, 2), -0.25);
        assert_eq!(matrix.get(3, 1), 1.0);
        assert_eq!(matrix.get(3, 3), 0.0);
    }

    #[test]
    fn load_round_trips_hand_encoded_values() {
        let mut memory = MemoryImage::new(MIN_SIZE, BoundsPolicy::Fail).unwrap();
        let rows = [
            [1.0, 2.0, -3.5, 0.125],
            [0.0, -1.0, 0.5, 100.0],
            [-0.0625, 7.75, 1.0, 0.0],
            [12.0, -12.0, 0.0, 1.0],
        ];
        encode(&mut memory, 0x2000, rows);
        assert_eq!(Matrix::load(&memory, 0x2000).unwrap(), Matrix::from_rows(rows));
    }

    #[test]
    fn load_out_of_range_fails() {
        let memory = MemoryImage::new(MIN_SIZE, BoundsPolicy::Fail).unwrap();
        assert!(Matrix::load(&memory, MIN_SIZE as u32 - 32).is_err());
    }

    #[test]
    fn multiplication_applies_left_operand_first() {
        let scale = Matrix::from_rows([
            [2.0, 0.0, 0.0, 0.0],
            [0.0, 2.0, 0.0, 0.0],
            [0.0, 0.0, 2.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]);
        let translate = Matrix::from_rows([
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [5.0, 0.0, 0.0, 1.0],
        ]);
        let point = F32x4::splat(1.0);
        assert_eq!((scale * translate).mul_vec4(point).to_array(), [7.0, 2.0, 2.0, 1.0]);
        assert_eq!((translate * scale).mul_vec4(point).to_array(), [12.0, 2.0, 2.0, 1.0]);
        assert_eq!(Matrix::identity() * scale, scale);
    }
}
