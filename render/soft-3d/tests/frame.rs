use std::sync::Arc;
use tachyon_core::{
    config::Config,
    gpu::{
        interpreter::{DisplayListHeader, Interpreter},
        state::{GraphicsState, SegmentTable},
        texture::TextureAtlas,
        SCREEN_HEIGHT, SCREEN_WIDTH,
    },
    memory::{BoundsPolicy, MemoryImage, MIN_SIZE},
};
use tachyon_soft_3d::{raster::Rasterizer, threaded::Renderer, Frame, Presenter};

const LIST_ADDR: u32 = 0x1000;
const EMPTY_LIST_ADDR: u32 = 0x1800;
const SEGMENTED_LIST_ADDR: u32 = 0x1900;
const VERTEX_ADDR: u32 = 0x2000;
const MATRIX_ADDR: u32 = 0x3000;

#[derive(Default)]
struct Capture {
    frames: Vec<Vec<u16>>,
    interrupts: usize,
}

impl Presenter for Capture {
    fn submit_frame(&mut self, frame: &Frame) {
        self.frames.push(frame.pixels().to_vec());
    }

    fn interrupt(&mut self) {
        self.interrupts += 1;
    }
}

fn logger() -> slog::Logger {
    slog::Logger::root(slog::Discard, slog::o!())
}

fn renderer(worker_count: usize) -> Renderer<Capture> {
    let config = Config {
        worker_count,
        ..Config::default()
    };
    let _logger = logger();
    Renderer::new(
        config,
        Capture::default(),
        #[cfg(feature = "log")]
        _logger,
    )
    .expect("couldn't create renderer")
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

fn write_vertex(memory: &mut MemoryImage, addr: u32, xyz: [i16; 3], rgba: u32) {
    memory.write_u16(addr, xyz[0] as u16).unwrap();
    memory.write_u16(addr + 2, xyz[1] as u16).unwrap();
    memory.write_u16(addr + 4, xyz[2] as u16).unwrap();
    memory.write_u32(addr + 12, rgba).unwrap();
}

/// Three overlapping, z-buffered, smooth-shaded triangles, one of them larger than the screen.
fn scene() -> MemoryImage {
    let mut memory = MemoryImage::new(MIN_SIZE, BoundsPolicy::Fail).unwrap();
    let unit = 1.0 / 128.0;
    write_matrix(
        &mut memory,
        MATRIX_ADDR,
        [
            [unit, 0.0, 0.0, 0.0],
            [0.0, unit, 0.0, 0.0],
            [0.0, 0.0, unit, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    );
    let vertices: [([i16; 3], u32); 9] = [
        ([-600, -600, 100], 0xFF00_00FF),
        ([600, -500, 100], 0x00FF_00FF),
        ([0, 700, 100], 0x0000_FFFF),
        ([-60, -50, -50], 0xFFFF_00FF),
        ([90, -10, -50], 0x00FF_FFFF),
        ([10, 110, -50], 0xFF00_FFFF),
        ([-120, 20, 0], 0x8080_80FF),
        ([40, -100, 0], 0x4080_C0FF),
        ([120, 90, 0], 0xC080_40FF),
    ];
    for (i, (xyz, rgba)) in vertices.into_iter().enumerate() {
        write_vertex(&mut memory, VERTEX_ADDR + i as u32 * 16, xyz, rgba);
    }
    memory
        .write_words(
            LIST_ADDR,
            &[
                0x0103_0000, MATRIX_ADDR,
                0xB700_0000, 0x0000_0005, // z-buffer, shade
                0x0480_0000, VERTEX_ADDR,
                0xBF00_0000, 0x0000_0A14,
                0xBF00_0000, 0x001E_2832,
                0xBF00_0000, 0x003C_4650,
                0xB800_0000, 0,
            ],
        )
        .unwrap();
    memory
        .write_words(EMPTY_LIST_ADDR, &[0xB800_0000, 0])
        .unwrap();
    // The same scene with the matrix and vertices addressed through segments 3 and 6
    memory
        .write_words(
            SEGMENTED_LIST_ADDR,
            &[
                0x0103_0000, 0x0300_0000,
                0xB700_0000, 0x0000_0005,
                0x0480_0000, 0x0600_0000,
                0xBF00_0000, 0x0000_0A14,
                0xBF00_0000, 0x001E_2832,
                0xBF00_0000, 0x003C_4650,
                0xB800_0000, 0,
            ],
        )
        .unwrap();
    memory
}

fn header(data_ptr: u32) -> DisplayListHeader {
    DisplayListHeader {
        data_ptr,
        ..DisplayListHeader::default()
    }
}

/// Interprets the list once per worker id on the calling thread and unions the owned rows.
fn reference_frame(memory: &MemoryImage, worker_count: usize) -> Vec<u16> {
    let mut pixels = vec![0; SCREEN_WIDTH * SCREEN_HEIGHT];
    let mut owners = vec![0; SCREEN_HEIGHT];
    for id in 0..worker_count {
        let mut state = GraphicsState::new();
        state.reset(&SegmentTable::default());
        let mut textures = TextureAtlas::new();
        let mut rasterizer = Rasterizer::new(id, worker_count);
        let interpreter = Interpreter::new(
            Config::default().perspective_divide,
            true,
            #[cfg(feature = "log")]
            logger(),
        );
        interpreter
            .process_display_list(
                &header(LIST_ADDR),
                &mut state,
                memory,
                &mut textures,
                &mut rasterizer,
            )
            .unwrap();
        for (y, owner) in owners.iter_mut().enumerate() {
            if rasterizer.slice().owns_row(y) {
                *owner += 1;
                pixels[y * SCREEN_WIDTH..(y + 1) * SCREEN_WIDTH]
                    .copy_from_slice(rasterizer.slice().row(y));
            }
        }
    }
    assert!(owners.iter().all(|&count| count == 1));
    pixels
}

#[test]
fn pool_output_matches_single_threaded_reference() {
    let memory = Arc::new(scene());
    let reference = reference_frame(&memory, 1);
    assert!(reference.iter().all(|&pixel| pixel != 0));

    for worker_count in [1, 2, 3, 4, 8] {
        assert_eq!(reference_frame(&memory, worker_count), reference);

        let mut renderer = renderer(worker_count);
        renderer
            .render_frame(&memory, &header(LIST_ADDR))
            .unwrap();
        let presenter = renderer.presenter();
        assert_eq!(presenter.frames.len(), 1);
        assert_eq!(presenter.interrupts, 1);
        assert!(
            presenter.frames[0] == reference,
            "{worker_count} workers diverged from the reference"
        );
        assert_eq!(renderer.frame().pixels(), &reference[..]);
    }
}

#[test]
fn empty_list_leaves_the_background() {
    let memory = Arc::new(scene());
    let mut renderer = renderer(4);
    renderer
        .render_frame(&memory, &header(EMPTY_LIST_ADDR))
        .unwrap();
    assert!(renderer.presenter().frames[0].iter().all(|&pixel| pixel == 0));
}

#[test]
fn every_frame_starts_from_a_clean_reset() {
    let memory = Arc::new(scene());
    let mut renderer = renderer(4);
    for _ in 0..3 {
        renderer
            .render_frame(&memory, &header(LIST_ADDR))
            .unwrap();
        renderer
            .render_frame(&memory, &header(EMPTY_LIST_ADDR))
            .unwrap();
    }
    let frames = &renderer.presenter().frames;
    assert_eq!(frames.len(), 6);
    for pair in frames.chunks_exact(2) {
        assert_eq!(pair[0], frames[0]);
        assert!(pair[1].iter().all(|&pixel| pixel == 0));
    }
    assert_eq!(renderer.presenter().interrupts, 6);
}

#[test]
fn segment_template_applies_to_every_frame() {
    let memory = Arc::new(scene());
    let mut renderer = renderer(3);
    renderer
        .render_frame(&memory, &header(LIST_ADDR))
        .unwrap();
    let mut segments = SegmentTable::default();
    segments.0[3] = MATRIX_ADDR;
    segments.0[6] = VERTEX_ADDR;
    renderer.set_segment_template(segments);
    for _ in 0..2 {
        renderer
            .render_frame(&memory, &header(SEGMENTED_LIST_ADDR))
            .unwrap();
    }
    let frames = &renderer.presenter().frames;
    assert!(frames[0].iter().any(|&pixel| pixel != 0));
    assert_eq!(frames[1], frames[0]);
    assert_eq!(frames[2], frames[0]);
}

#[test]
fn memory_images_follow_the_configured_policy() {
    let renderer = renderer(1);
    let memory = renderer
        .create_memory_image(vec![0; MIN_SIZE].into_boxed_slice())
        .unwrap();
    assert_eq!(memory.policy(), BoundsPolicy::Fail);
    assert!(renderer
        .create_memory_image(vec![0; 16].into_boxed_slice())
        .is_err());
}
