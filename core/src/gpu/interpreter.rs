use super::{
    combiner::Combiner,
    state::{GeometryMode, GraphicsState, Light, MAX_LIGHTS, TILE_COUNT, VERTEX_CACHE_SIZE},
    texture::{LoadError, TextureCache, TextureImage, TextureRect, TileDescriptor},
    transform::{normalize, transform_and_light_vertex, PerspectiveDivide, RawVertex},
    triangle::{Triangle, TriangleSink},
};
use crate::{
    memory::{BoundsPolicy, MemoryAccessError, MemoryImage},
    simd::F32x4,
};
use core::fmt;

/// Nesting limit for display-list calls.
pub const MAX_CALL_DEPTH: u32 = 18;

pub const MOVEMEM_VIEWPORT: u8 = 0x80;
pub const MOVEMEM_LIGHT_0: u8 = 0x86;
pub const MOVEMEM_LIGHT_7: u8 = 0x94;
pub const MOVEMEM_MATRIX_1: u8 = 0x9E;

pub const MOVEWORD_MATRIX: u8 = 0x00;
pub const MOVEWORD_NUMLIGHT: u8 = 0x02;
pub const MOVEWORD_CLIP: u8 = 0x04;
pub const MOVEWORD_SEGMENT: u8 = 0x06;
pub const MOVEWORD_LIGHTCOL: u8 = 0x0A;

proc_bitfield::bitfield! {
    /// The first word of a display-list command.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct Command(pub u32): Debug {
        pub op: u8 @ 24..=31,
        pub arg8: u8 @ 16..=23,
        pub arg16: u16 @ 0..=15,
    }
}

proc_bitfield::bitfield! {
    /// The `arg8` field of SETMATRIX.
    #[derive(Clone, Copy, PartialEq, Eq)]
    pub struct MatrixFlags(pub u8): Debug {
        pub projection: bool @ 0,
        pub load: bool @ 1,
        pub push: bool @ 2,
    }
}

/// The task header the host copies out of the coprocessor's data memory.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub struct DisplayListHeader {
    pub type_: u32,
    pub flags: u32,
    pub ucode_boot: u32,
    pub ucode_boot_size: u32,
    pub ucode: u32,
    pub ucode_size: u32,
    pub ucode_data: u32,
    pub ucode_data_size: u32,
    pub dram_stack: u32,
    pub dram_stack_size: u32,
    pub output_buf: u32,
    pub output_buf_size: u32,
    pub data_ptr: u32,
    pub data_size: u32,
    pub yield_data_ptr: u32,
    pub yield_data_size: u32,
}

impl DisplayListHeader {
    pub const SIZE: usize = 64;

    /// Parses the header from 16 little-endian words.
    pub fn from_bytes(bytes: &[u8; Self::SIZE]) -> Self {
        let mut words = [0; 16];
        for (word, chunk) in words.iter_mut().zip(bytes.chunks_exact(4)) {
            *word = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]);
        }
        let [
            type_,
            flags,
            ucode_boot,
            ucode_boot_size,
            ucode,
            ucode_size,
            ucode_data,
            ucode_data_size,
            dram_stack,
            dram_stack_size,
            output_buf,
            output_buf_size,
            data_ptr,
            data_size,
            yield_data_ptr,
            yield_data_size,
        ] = words;
        DisplayListHeader {
            type_,
            flags,
            ucode_boot,
            ucode_boot_size,
            ucode,
            ucode_size,
            ucode_data,
            ucode_data_size,
            dram_stack,
            dram_stack_size,
            output_buf,
            output_buf_size,
            data_ptr,
            data_size,
            yield_data_ptr,
            yield_data_size,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DisplayListError {
    Memory(MemoryAccessError),
    CallDepth(u32),
}

impl fmt::Display for DisplayListError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisplayListError::Memory(err) => write!(f, "Display list memory error: {err}"),
            DisplayListError::CallDepth(depth) => {
                write!(f, "Display list calls nested too deeply ({depth} levels)")
            }
        }
    }
}

impl std::error::Error for DisplayListError {}

impl From<MemoryAccessError> for DisplayListError {
    fn from(err: MemoryAccessError) -> Self {
        DisplayListError::Memory(err)
    }
}

/// What to do after a command has been handled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    /// Continue with the command `8 + displacement` bytes after the current one.
    Next(i32),
    Stop,
}

/// Walks display lists, updating a [`GraphicsState`] and emitting triangles.
pub struct Interpreter {
    divide: PerspectiveDivide,
    lighting: bool,
    #[cfg(feature = "log")]
    logger: slog::Logger,
}

struct Run<'a, T: TextureCache, S: TriangleSink> {
    interpreter: &'a Interpreter,
    state: &'a mut GraphicsState,
    memory: &'a MemoryImage,
    textures: &'a mut T,
    sink: &'a mut S,
}

impl Interpreter {
    pub fn new(
        divide: PerspectiveDivide,
        lighting: bool,
        #[cfg(feature = "log")] logger: slog::Logger,
    ) -> Self {
        Interpreter {
            divide,
            lighting,
            #[cfg(feature = "log")]
            logger,
        }
    }

    /// Runs the display list a task header points to.
    pub fn process_display_list<T: TextureCache, S: TriangleSink>(
        &self,
        header: &DisplayListHeader,
        state: &mut GraphicsState,
        memory: &MemoryImage,
        textures: &mut T,
        sink: &mut S,
    ) -> Result<(), DisplayListError> {
        self.interpret(header.data_ptr, state, memory, textures, sink)
    }

    /// Interprets commands starting at `pc` until the list ends.
    pub fn interpret<T: TextureCache, S: TriangleSink>(
        &self,
        pc: u32,
        state: &mut GraphicsState,
        memory: &MemoryImage,
        textures: &mut T,
        sink: &mut S,
    ) -> Result<(), DisplayListError> {
        Run {
            interpreter: self,
            state,
            memory,
            textures,
            sink,
        }
        .interpret(pc, 0)
    }
}

impl<'a, T: TextureCache, S: TriangleSink> Run<'a, T, S> {
    fn interpret(&mut self, mut pc: u32, depth: u32) -> Result<(), DisplayListError> {
        if depth > MAX_CALL_DEPTH {
            return Err(DisplayListError::CallDepth(depth));
        }
        loop {
            if !self.memory.contains(pc, 8) {
                return match self.memory.policy() {
                    BoundsPolicy::Fail => Err(MemoryAccessError {
                        addr: pc,
                        width: 8,
                        size: self.memory.len(),
                    }
                    .into()),
                    BoundsPolicy::Clamp => Ok(()),
                };
            }
            let command = Command(self.memory.read_u32(pc)?);
            let arg32 = self.memory.read_u32(pc.wrapping_add(4))?;
            match self.execute(command, arg32, pc, depth)? {
                Flow::Next(displacement) => {
                    pc = pc.wrapping_add(8).wrapping_add(displacement as u32);
                }
                Flow::Stop => return Ok(()),
            }
        }
    }

    fn execute(
        &mut self,
        command: Command,
        arg32: u32,
        pc: u32,
        depth: u32,
    ) -> Result<Flow, DisplayListError> {
        match command.op() {
            0x01 => self.set_matrix(command, arg32)?,
            0x03 => self.move_mem(command, arg32)?,
            0x04 => self.load_vertices(command, arg32)?,
            0x06 => {
                let addr = self.state.segments.resolve(arg32);
                if command.arg8() == 0 {
                    self.interpret(addr, depth + 1)?;
                } else {
                    return Ok(Flow::Next(addr.wrapping_sub(pc.wrapping_add(8)) as i32));
                }
            }
            0xB6 => {
                let mode = self.state.geometry_mode.bits() & !arg32;
                self.state
                    .set_geometry_mode(GeometryMode::from_bits_retain(mode));
            }
            0xB7 => {
                let mode = self.state.geometry_mode.bits() | arg32;
                self.state
                    .set_geometry_mode(GeometryMode::from_bits_retain(mode));
            }
            0xB8 => return Ok(Flow::Stop),
            0xB9 => self.set_other_mode(command, arg32, 0),
            0xBA => self.set_other_mode(command, arg32, 32),
            0xBB => {
                let w0 = command.0;
                self.state.texture.enabled = w0 & 0xFF != 0;
                self.state.texture.tile = (w0 >> 8 & 7) as u8;
                self.state.texture.level = (w0 >> 11 & 7) as u8;
                self.state.texture.scale_s = (arg32 >> 16) as u16;
                self.state.texture.scale_t = arg32 as u16;
            }
            0xBC => self.move_word(command, arg32),
            0xBD => {
                if arg32 & 1 != 0 {
                    self.state.projection.pop();
                } else {
                    self.state.modelview.pop();
                }
            }
            0xBF => self.draw_triangle(arg32),
            0xE4 | 0xE5 => return Ok(Flow::Next(16)),
            0xF2 => self.state.texture_rect = texture_rect(command, arg32),
            0xF3 => {
                self.state.texture_rect = texture_rect(command, arg32);
                self.load_block()?;
            }
            0xF5 => {
                let descriptor = TileDescriptor((command.0 as u64) << 32 | arg32 as u64);
                self.state.tiles[descriptor.tile() as usize & (TILE_COUNT - 1)] = descriptor;
            }
            0xF7 => self.state.fill_color = arg32,
            0xF9 => self.state.blend_color = arg32,
            0xFA => self.state.primitive_color = arg32,
            0xFB => self.state.environment_color = arg32,
            0xFC => self.state.combiner = Combiner::decode(command.0 & 0xFF_FFFF, arg32),
            0xFD => {
                let w0 = command.0;
                self.state.texture_image = TextureImage {
                    format: (w0 >> 21 & 7) as u8,
                    size: (w0 >> 19 & 3) as u8,
                    width: (w0 & 0xFFF) as u16 + 1,
                    addr: self.state.segments.resolve(arg32),
                };
            }
            _op => {
                #[cfg(feature = "log")]
                slog::debug!(
                    self.interpreter.logger,
                    "Unknown display list command {:#04X}: {:#010X} {:#010X}",
                    _op,
                    command.0,
                    arg32
                );
            }
        }
        Ok(Flow::Next(0))
    }

    fn set_matrix(&mut self, command: Command, arg32: u32) -> Result<(), MemoryAccessError> {
        let flags = MatrixFlags(command.arg8());
        let matrix = self
            .memory
            .read_matrix(self.state.segments.resolve(arg32))?;
        let stack = if flags.projection() {
            &mut self.state.projection
        } else {
            &mut self.state.modelview
        };
        if flags.push() {
            stack.push();
        }
        if flags.load() {
            stack.set_top(matrix);
        } else {
            let product = matrix * *stack.top();
            stack.set_top(product);
        }
        Ok(())
    }

    fn move_mem(&mut self, command: Command, arg32: u32) -> Result<(), MemoryAccessError> {
        let addr = self.state.segments.resolve(arg32);
        match command.arg8() {
            kind @ MOVEMEM_LIGHT_0..=MOVEMEM_LIGHT_7 if kind & 1 == 0 => {
                let index = ((kind - MOVEMEM_LIGHT_0) >> 1) as usize;
                let direction = F32x4::new([
                    self.memory.read_i8(addr.wrapping_add(8))? as f32,
                    self.memory.read_i8(addr.wrapping_add(9))? as f32,
                    self.memory.read_i8(addr.wrapping_add(10))? as f32,
                    0.0,
                ]);
                self.state.lights[index] = Light {
                    color: self.memory.read_u32(addr)?,
                    direction: normalize(direction),
                };
            }
            MOVEMEM_VIEWPORT => {
                for i in 0..4 {
                    let offset = addr.wrapping_add(i as u32 * 2);
                    self.state.viewport.scale[i] = self.memory.read_i16(offset)?;
                    self.state.viewport.translate[i] =
                        self.memory.read_i16(offset.wrapping_add(8))?;
                }
            }
            MOVEMEM_MATRIX_1 => self.state.alt_matrix = self.memory.read_matrix(addr)?,
            _kind => {
                #[cfg(feature = "log")]
                slog::debug!(
                    self.interpreter.logger,
                    "Ignoring MOVEMEM of type {:#04X} from {:#010X}",
                    _kind,
                    addr
                );
            }
        }
        Ok(())
    }

    fn load_vertices(&mut self, command: Command, arg32: u32) -> Result<(), MemoryAccessError> {
        let count = (command.arg8() >> 4) as usize + 1;
        let start = (command.arg8() & 0xF) as usize;
        let addr = self.state.segments.resolve(arg32);
        for i in 0..count {
            let index = start + i;
            if index >= VERTEX_CACHE_SIZE {
                break;
            }
            let record = addr.wrapping_add(i as u32 * 16);
            let raw = RawVertex {
                x: self.memory.read_i16(record)?,
                y: self.memory.read_i16(record.wrapping_add(2))?,
                z: self.memory.read_i16(record.wrapping_add(4))?,
                flag: self.memory.read_u16(record.wrapping_add(6))?,
                s: self.memory.read_i16(record.wrapping_add(8))?,
                t: self.memory.read_i16(record.wrapping_add(10))?,
                rgba: self.memory.read_u32(record.wrapping_add(12))?,
            };
            transform_and_light_vertex(
                self.state,
                index,
                &raw,
                self.interpreter.divide,
                self.interpreter.lighting,
            );
        }
        Ok(())
    }

    fn move_word(&mut self, command: Command, arg32: u32) {
        let arg16 = command.arg16();
        match arg16 as u8 {
            MOVEWORD_SEGMENT => {
                self.state.segments.0[(arg16 >> 10 & 0xF) as usize] = arg32 & 0xFF_FFFF;
            }
            MOVEWORD_NUMLIGHT => {
                let count = (arg32.wrapping_sub(0x8000_0000) >> 5).wrapping_sub(1);
                self.state.light_count = (count as usize).min(MAX_LIGHTS);
            }
            MOVEWORD_LIGHTCOL => {
                let index = ((command.0 >> 8 & 0xFFFF) >> 5) as usize;
                if let Some(light) = self.state.lights.get_mut(index) {
                    light.color = arg32;
                }
            }
            _kind => {
                #[cfg(feature = "log")]
                slog::debug!(
                    self.interpreter.logger,
                    "Ignoring MOVEWORD of type {:#04X}: {:#010X}",
                    _kind,
                    arg32
                );
            }
        }
    }

    fn set_other_mode(&mut self, command: Command, arg32: u32, base: u32) {
        let shift = (command.0 >> 8 & 0xFF) + base;
        let len = command.0 & 0xFF;
        if len == 0 || shift >= 64 {
            return;
        }
        let mask = (u64::MAX >> (64 - len.min(64 - shift))) << shift;
        let value = (arg32 as u64) << base;
        self.state.other_mode = (self.state.other_mode & !mask) | (value & mask);
    }

    fn draw_triangle(&mut self, arg32: u32) {
        if self.state.geometry_mode.contains(GeometryMode::CULL_FRONT) {
            return;
        }
        let indices = [arg32 >> 16, arg32 >> 8, arg32].map(|i| (i & 0xFF) as usize / 10);
        if indices.iter().any(|&i| i >= VERTEX_CACHE_SIZE) {
            return;
        }
        let bounds = self
            .state
            .texture
            .id
            .and_then(|id| self.textures.resolve_texture_bounds(id));
        let triangle = Triangle::assemble(self.state, indices, self.interpreter.divide, bounds);
        self.sink.draw_triangle(&triangle, self.textures.texels());
    }

    fn load_block(&mut self) -> Result<(), MemoryAccessError> {
        match self
            .textures
            .load_or_fetch_texture(&self.state.tile_state(), self.memory)
        {
            Ok(id) => self.state.texture.id = Some(id),
            Err(LoadError::Memory(err)) => return Err(err),
            Err(_err) => {
                #[cfg(feature = "log")]
                slog::warn!(self.interpreter.logger, "Couldn't load texture: {}", _err);
                self.state.texture.id = None;
            }
        }
        Ok(())
    }
}

fn texture_rect(command: Command, arg32: u32) -> TextureRect {
    TextureRect {
        uls: (command.0 >> 12 & 0xFFF) as u16,
        ult: (command.0 & 0xFFF) as u16,
        lrs: (arg32 >> 12 & 0xFFF) as u16,
        lrt: (arg32 & 0xFFF) as u16,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        gpu::{
            matrix::Matrix,
            state::{Vertex, MAX_Z_BASE, Z_BUCKET_SIZE},
            texture::{TextureAtlas, FORMAT_RGBA, SIZE_16},
        },
        memory::MIN_SIZE,
    };

    const LIST: u32 = 0x1000;

    fn interpreter() -> Interpreter {
        Interpreter::new(
            PerspectiveDivide::Deferred,
            true,
            #[cfg(feature = "log")]
            slog::Logger::root(slog::Discard, slog::o!()),
        )
    }

    struct Harness {
        memory: MemoryImage,
        state: GraphicsState,
        textures: TextureAtlas,
        triangles: Vec<Triangle>,
    }

    impl Harness {
        fn new(policy: BoundsPolicy) -> Self {
            Harness {
                memory: MemoryImage::new(MIN_SIZE, policy).unwrap(),
                state: GraphicsState::new(),
                textures: TextureAtlas::new(),
                triangles: Vec::new(),
            }
        }

        fn run(&mut self, pc: u32) -> Result<(), DisplayListError> {
            interpreter().interpret(
                pc,
                &mut self.state,
                &self.memory,
                &mut self.textures,
                &mut self.triangles,
            )
        }

        fn run_list(&mut self, commands: &[u32]) -> Result<(), DisplayListError> {
            self.memory.write_words(LIST, commands).unwrap();
            self.run(LIST)
        }
    }

    fn write_matrix(memory: &mut MemoryImage, addr: u32, rows: [[f32; 4]; 4]) {
        for (i, row) in rows.iter().enumerate() {
            for (j, value) in row.iter().enumerate() {
                let fixed = (*value * 65536.0) as i32 as u32;
                let offset = addr + (i * 8 + j * 2) as u32;
                memory.write_u16(offset, (fixed >> 16) as u16).unwrap();
                memory.write_u16(offset + 32, fixed as u16).unwrap();
            }
        }
    }

    fn scale(value: f32) -> [[f32; 4]; 4] {
        [
            [value, 0.0, 0.0, 0.0],
            [0.0, value, 0.0, 0.0],
            [0.0, 0.0, value, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ]
    }

    fn write_vertex(memory: &mut MemoryImage, addr: u32, xyz: [i16; 3], rgba: u32) {
        memory.write_u16(addr, xyz[0] as u16).unwrap();
        memory.write_u16(addr + 2, xyz[1] as u16).unwrap();
        memory.write_u16(addr + 4, xyz[2] as u16).unwrap();
        memory.write_u16(addr + 8, 0x40).unwrap();
        memory.write_u16(addr + 10, 0x80).unwrap();
        memory.write_u32(addr + 12, rgba).unwrap();
    }

    #[test]
    fn header_parses_little_endian_words() {
        let mut bytes = [0; DisplayListHeader::SIZE];
        for (i, chunk) in bytes.chunks_exact_mut(4).enumerate() {
            chunk.copy_from_slice(&(i as u32 * 0x100 + 1).to_le_bytes());
        }
        let header = DisplayListHeader::from_bytes(&bytes);
        assert_eq!(header.type_, 1);
        assert_eq!(header.data_ptr, 0xC01);
        assert_eq!(header.yield_data_size, 0xF01);
    }

    #[test]
    fn process_display_list_starts_at_data_ptr() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.memory
            .write_words(0x3000, &[0xFA00_0000, 0x1234_5678, 0xB800_0000, 0])
            .unwrap();
        let header = DisplayListHeader {
            data_ptr: 0x3000,
            ..DisplayListHeader::default()
        };
        interpreter()
            .process_display_list(
                &header,
                &mut h.state,
                &h.memory,
                &mut h.textures,
                &mut h.triangles,
            )
            .unwrap();
        assert_eq!(h.state.primitive_color, 0x1234_5678);
    }

    #[test]
    fn set_matrix_push_load_multiply_and_pop() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        write_matrix(&mut h.memory, 0x2000, scale(2.0));
        write_matrix(&mut h.memory, 0x2040, scale(3.0));
        h.run_list(&[
            0x0102_0000, 0x2000, // load modelview
            0x0104_0000, 0x2040, // push modelview, multiply
            0x0103_0000, 0x2040, // load projection
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.state.modelview.index(), 1);
        assert_eq!(*h.state.modelview.top(), Matrix::from_rows(scale(6.0)));
        assert_eq!(*h.state.projection.top(), Matrix::from_rows(scale(3.0)));
        assert_eq!(h.state.projection.index(), 0);

        h.run_list(&[0xBD00_0000, 0, 0xBD00_0000, 0, 0xBD00_0000, 1, 0xB800_0000, 0])
            .unwrap();
        assert_eq!(h.state.modelview.index(), 0);
        assert_eq!(*h.state.modelview.top(), Matrix::from_rows(scale(2.0)));
        assert_eq!(h.state.projection.index(), 0);
    }

    #[test]
    fn move_word_updates_segments_and_lights() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.run_list(&[
            0xBC00_1806, 0x8012_3456, // segment 6
            0xBC00_0002, 0x8000_0060, // 2 lights
            0xBC00_400A, 0x00FF_00FF, // light 2 (ambient) color
            0xBC00_0004, 0xDEAD_BEEF, // clip, ignored
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.state.segments.0[6], 0x12_3456);
        assert_eq!(h.state.light_count, 2);
        assert_eq!(h.state.ambient_light().color, 0x00FF_00FF);

        h.run_list(&[0xBC00_0002, 0x1000, 0xB800_0000, 0]).unwrap();
        assert_eq!(h.state.light_count, MAX_LIGHTS);
    }

    #[test]
    fn move_mem_loads_normalized_lights_and_viewport() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.memory.write_u32(0x2000, 0xFF80_40FF).unwrap();
        h.memory.write_u8(0x2008, 0).unwrap();
        h.memory.write_u8(0x2009, 0x81).unwrap();
        h.memory.write_u8(0x200A, 0).unwrap();
        h.memory
            .write_words(0x2100, &[0x0280_01E0, 0x01FF_0000, 0x0280_01E0, 0x01FF_0000])
            .unwrap();
        h.run_list(&[
            0x038A_0000, 0x2000, // light 2
            0x0380_0000, 0x2100,
            0x0386_0000, 0x3000, // light 0 from zeroed memory
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.state.lights[2].color, 0xFF80_40FF);
        assert_eq!(h.state.lights[2].direction.to_array(), [0.0, -1.0, 0.0, 0.0]);
        assert_eq!(h.state.lights[0].direction.to_array(), [0.0; 4]);
        assert_eq!(h.state.viewport.scale, [0x280, 0x1E0, 0x1FF, 0]);
        assert_eq!(h.state.viewport.translate, [0x280, 0x1E0, 0x1FF, 0]);
    }

    #[test]
    fn vertices_load_from_start_slot() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        write_vertex(&mut h.memory, 0x2000, [10, 20, 30], 0x1122_3344);
        write_vertex(&mut h.memory, 0x2010, [-5, 0, 0], 0x5566_7788);
        h.run_list(&[0x0413_0000, 0x2000, 0xB800_0000, 0]).unwrap();
        let first = h.state.vertices[3];
        assert_eq!(first.position.to_array(), [10.0, 20.0, 30.0, 1.0]);
        assert_eq!((first.s, first.t), (2, 4));
        assert_eq!(first.rgba, 0x1122_3344);
        assert_eq!(h.state.vertices[4].position.to_array(), [-5.0, 0.0, 0.0, 1.0]);
        assert_eq!(h.state.vertices[2], Vertex::default());
    }

    #[test]
    fn calls_return_and_jumps_do_not() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        // Sub-list reached through segment 1
        h.memory
            .write_words(0x5000, &[0xFB00_0000, 0xAAAA_AAAA, 0xB800_0000, 0])
            .unwrap();
        h.memory
            .write_words(0x6000, &[0xF700_0000, 0xCCCC_CCCC, 0xB800_0000, 0])
            .unwrap();
        h.run_list(&[
            0xBC00_0406, 0x4000, // segment 1 = 0x4000
            0x0600_0000, 0x0100_1000, // call 0x5000
            0xFA00_0000, 0xBBBB_BBBB,
            0x0601_0000, 0x6000, // jump
            0xF900_0000, 0xDDDD_DDDD, // skipped
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.state.environment_color, 0xAAAA_AAAA);
        assert_eq!(h.state.primitive_color, 0xBBBB_BBBB);
        assert_eq!(h.state.fill_color, 0xCCCC_CCCC);
        assert_eq!(h.state.blend_color, 0);
    }

    #[test]
    fn recursive_calls_hit_the_depth_limit() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        assert_eq!(
            h.run_list(&[0x0600_0000, LIST]),
            Err(DisplayListError::CallDepth(MAX_CALL_DEPTH + 1))
        );
    }

    #[test]
    fn bounds_policy_decides_how_lists_end() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        let last = MIN_SIZE as u32 - 8;
        h.memory.write_words(last, &[0xFA00_0000, 0x77]).unwrap();
        assert_eq!(
            h.run(last),
            Err(DisplayListError::Memory(MemoryAccessError {
                addr: MIN_SIZE as u32,
                width: 8,
                size: MIN_SIZE,
            }))
        );
        assert_eq!(h.state.primitive_color, 0x77);

        let mut h = Harness::new(BoundsPolicy::Clamp);
        h.memory.write_words(last, &[0xFA00_0000, 0x77]).unwrap();
        assert_eq!(h.run(last), Ok(()));
        assert_eq!(h.state.primitive_color, 0x77);
    }

    #[test]
    fn geometry_mode_and_z_buckets() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.run_list(&[
            0xB700_0000, 0x0000_0005,
            0xB600_0000, 0x0000_0001,
            0xB700_0000, 0x0000_0001,
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(
            h.state.geometry_mode,
            GeometryMode::ZBUFFER | GeometryMode::SHADE
        );
        assert_eq!(h.state.z_base, MAX_Z_BASE - 2.0 * Z_BUCKET_SIZE);
    }

    #[test]
    fn triangles_are_culled_or_emitted() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        write_vertex(&mut h.memory, 0x2000, [0, 0, 0], 0xFF00_00FF);
        write_vertex(&mut h.memory, 0x2010, [1, 0, 0], 0x00FF_00FF);
        write_vertex(&mut h.memory, 0x2020, [0, 1, 0], 0x0000_FFFF);
        h.run_list(&[
            0x0420_0000, 0x2000,
            0xB700_0000, 0x0000_2004, // shade, cull back
            0xBF00_0000, 0x0000_0A14,
            0xB700_0000, 0x0000_1000, // cull front
            0xBF00_0000, 0x0014_0A00,
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.triangles.len(), 1);
        let triangle = h.triangles[0];
        assert!(triangle.cull_back);
        assert_eq!(triangle.vertices.map(|v| v.shade), [0xFF00_00FF, 0x00FF_00FF, 0x0000_FFFF]);
        assert_eq!(triangle.vertices.map(|v| (v.x, v.y)), [(160, 120), (320, 120), (160, 0)]);
    }

    #[test]
    fn set_combine_decodes_both_words() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.run_list(&[0xFC12_7E24, 0xFFFF_F9FC, 0xB800_0000, 0])
            .unwrap();
        assert_eq!(h.state.combiner, Combiner::decode(0x12_7E24, 0xFFFF_F9FC));
        assert!(h.state.combiner.references_texel());
    }

    #[test]
    fn other_mode_replaces_selected_bits() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        h.state.other_mode = u64::MAX;
        h.run_list(&[
            0xB900_0302, 0x0000_0000, // low half bits 3..=4
            0xBA00_1404, 0x00A0_0000, // high half bits 20..=23
            0xB800_0000, 0,
        ])
        .unwrap();
        assert_eq!(h.state.other_mode, 0xFFAF_FFFF_FFFF_FFE7);
    }

    #[test]
    fn texture_commands_load_into_the_atlas() {
        let mut h = Harness::new(BoundsPolicy::Fail);
        for i in 0..32 {
            h.memory.write_u16(0x8000 + i * 2, 0x07C1).unwrap();
        }
        h.run_list(&[
            0xBB00_0001, 0x8000_FFFF, // texture on
            0xFD10_000F, 0x8000, // RGBA16, width 16
            0xF510_1000, 0x0700_0000,
            0xF300_0000, 0x0701_F200, // 32 texels, dxt 512
            0xE400_0000, 0, 0xB400_0000, 0, 0xB300_0000, 0, // texture rectangle
            0xB800_0000, 0,
        ])
        .unwrap();
        assert!(h.state.texture.enabled);
        assert_eq!(h.state.texture.scale_s, 0x8000);
        assert_eq!(
            h.state.texture_image,
            TextureImage {
                format: FORMAT_RGBA,
                size: SIZE_16,
                width: 16,
                addr: 0x8000,
            }
        );
        assert_eq!(h.state.tiles[7].size(), SIZE_16);
        assert_eq!(h.state.texture_rect.lrs, 31);
        assert_eq!(h.state.texture_rect.lrt, 512);
        let id = h.state.texture.id.unwrap();
        let bounds = h.textures.resolve_texture_bounds(id).unwrap();
        assert_eq!(h.textures.texels()[bounds.x_px()], 0x07C0);

        // Unsupported formats leave triangles untextured
        h.run_list(&[0xFD48_000F, 0x8000, 0xF300_0000, 0x0701_F200, 0xB800_0000, 0])
            .unwrap();
        assert_eq!(h.state.texture.id, None);
    }
}
