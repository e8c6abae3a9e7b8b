use crate::{
    raster::{RasterStats, Rasterizer, Slice},
    Frame, Presenter,
};
use core::{fmt, mem};
use parking_lot::{Condvar, Mutex};
use std::{
    io,
    panic::{self, AssertUnwindSafe},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    thread,
};
use tachyon_core::{
    config::{Config, ConfigError},
    gpu::{
        interpreter::{DisplayListError, DisplayListHeader, Interpreter},
        state::{GraphicsState, SegmentTable},
        texture::{TextureAtlas, TextureCache},
        SCREEN_HEIGHT,
    },
    memory::{self, MemoryImage},
};

#[derive(Debug)]
pub enum CreationError {
    Config(ConfigError),
    Spawn(io::Error),
}

impl fmt::Display for CreationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CreationError::Config(err) => write!(f, "Invalid configuration: {err}"),
            CreationError::Spawn(err) => write!(f, "Couldn't spawn rasterizer thread: {err}"),
        }
    }
}

impl std::error::Error for CreationError {}

impl From<ConfigError> for CreationError {
    fn from(err: ConfigError) -> Self {
        CreationError::Config(err)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FrameError {
    DisplayList {
        worker: usize,
        error: DisplayListError,
    },
    WorkerPanicked(usize),
}

impl fmt::Display for FrameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FrameError::DisplayList { worker, error } => {
                write!(f, "Display list error on rasterizer {worker}: {error}")
            }
            FrameError::WorkerPanicked(worker) => write!(f, "Rasterizer {worker} panicked"),
        }
    }
}

impl std::error::Error for FrameError {}

#[derive(Clone)]
struct Job {
    memory: Arc<MemoryImage>,
    header: DisplayListHeader,
    segments: SegmentTable,
}

struct WorkerData {
    rendering: bool,
    job: Option<Job>,
    result: Result<(), FrameError>,
    /// The slice finished last; swapped with the rasterizer's own at the end of every frame.
    slice: Slice,
    stats: RasterStats,
}

struct SharedData {
    stopped: AtomicBool,
    data: Mutex<WorkerData>,
    condvar: Condvar,
}

/// Everything a worker owns and reuses across frames.
struct Context {
    state: GraphicsState,
    textures: TextureAtlas,
    rasterizer: Rasterizer,
    interpreter: Interpreter,
}

type RenderFn = fn(&mut Context, &Job) -> Result<(), DisplayListError>;

fn render_job(ctx: &mut Context, job: &Job) -> Result<(), DisplayListError> {
    ctx.interpreter.process_display_list(
        &job.header,
        &mut ctx.state,
        &job.memory,
        &mut ctx.textures,
        &mut ctx.rasterizer,
    )
}

struct Worker {
    shared_data: Arc<SharedData>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Worker {
    fn spawn(
        id: usize,
        config: &Config,
        render: RenderFn,
        #[cfg(feature = "log")] logger: slog::Logger,
    ) -> Result<Self, CreationError> {
        let shared_data = Arc::new(SharedData {
            stopped: AtomicBool::new(false),
            data: Mutex::new(WorkerData {
                rendering: false,
                job: None,
                result: Ok(()),
                slice: Slice::new(id, config.worker_count),
                stats: RasterStats::default(),
            }),
            condvar: Condvar::new(),
        });
        let mut ctx = Context {
            state: GraphicsState::new(),
            textures: TextureAtlas::new(),
            rasterizer: Rasterizer::new(id, config.worker_count),
            interpreter: Interpreter::new(
                config.perspective_divide,
                config.lighting,
                #[cfg(feature = "log")]
                logger.clone(),
            ),
        };
        let shared_data_ = Arc::clone(&shared_data);
        let thread = thread::Builder::new()
            .name(format!("Rasterizer {id}"))
            .spawn(move || {
                while let Some(job) = wait_for_job(&shared_data_) {
                    ctx.state.reset(&job.segments);
                    ctx.textures.clear();
                    ctx.rasterizer.start_frame();
                    let result =
                        match panic::catch_unwind(AssertUnwindSafe(|| render(&mut ctx, &job))) {
                            Ok(result) => {
                                result.map_err(|error| FrameError::DisplayList { worker: id, error })
                            }
                            Err(_) => {
                                #[cfg(feature = "log")]
                                slog::warn!(logger, "Rasterizer panicked, frame dropped");
                                Err(FrameError::WorkerPanicked(id))
                            }
                        };

                    let mut data = shared_data_.data.lock();
                    mem::swap(&mut data.slice, ctx.rasterizer.slice_mut());
                    data.stats = ctx.rasterizer.stats();
                    data.result = result;
                    data.rendering = false;
                    shared_data_.condvar.notify_all();
                }
            })
            .map_err(CreationError::Spawn)?;
        Ok(Worker {
            shared_data,
            thread: Some(thread),
        })
    }

    fn start(&self, job: Job) {
        let mut data = self.shared_data.data.lock();
        data.job = Some(job);
        data.rendering = true;
        self.shared_data.condvar.notify_all();
    }
}

/// Blocks until the next job arrives; `None` once the pool is shutting down.
fn wait_for_job(shared_data: &SharedData) -> Option<Job> {
    let mut data = shared_data.data.lock();
    loop {
        if shared_data.stopped.load(Ordering::Relaxed) {
            return None;
        }
        if data.rendering {
            if let Some(job) = data.job.take() {
                return Some(job);
            }
        }
        shared_data.condvar.wait(&mut data);
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        if let Some(thread) = self.thread.take() {
            self.shared_data.stopped.store(true, Ordering::Relaxed);
            {
                let _data = self.shared_data.data.lock();
                self.shared_data.condvar.notify_all();
            }
            let _ = thread.join();
        }
    }
}

/// A fixed pool of rasterizer threads that each interpret the whole display list and draw the
/// rows they own, followed by frame assembly and presentation.
pub struct Renderer<P: Presenter> {
    config: Config,
    workers: Vec<Worker>,
    segments: SegmentTable,
    frame: Frame,
    presenter: P,
    #[cfg(feature = "log")]
    logger: slog::Logger,
}

impl<P: Presenter> Renderer<P> {
    pub fn new(
        config: Config,
        presenter: P,
        #[cfg(feature = "log")] logger: slog::Logger,
    ) -> Result<Self, CreationError> {
        Self::with_render_fn(
            config,
            presenter,
            render_job,
            #[cfg(feature = "log")]
            logger,
        )
    }

    fn with_render_fn(
        config: Config,
        presenter: P,
        render: RenderFn,
        #[cfg(feature = "log")] logger: slog::Logger,
    ) -> Result<Self, CreationError> {
        config.validate()?;
        let workers = (0..config.worker_count)
            .map(|id| {
                Worker::spawn(
                    id,
                    &config,
                    render,
                    #[cfg(feature = "log")]
                    logger.new(slog::o!("worker" => id)),
                )
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Renderer {
            config,
            workers,
            segments: SegmentTable::default(),
            frame: Frame::new(),
            presenter,
            #[cfg(feature = "log")]
            logger,
        })
    }

    #[inline]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[inline]
    pub fn presenter(&self) -> &P {
        &self.presenter
    }

    /// The last assembled frame.
    #[inline]
    pub fn frame(&self) -> &Frame {
        &self.frame
    }

    /// Sets the segment table every worker's state starts each frame with.
    pub fn set_segment_template(&mut self, segments: SegmentTable) {
        self.segments = segments;
    }

    /// Wraps a main memory image using the configured bounds policy.
    pub fn create_memory_image(
        &self,
        bytes: Box<[u8]>,
    ) -> Result<Arc<MemoryImage>, memory::CreationError> {
        MemoryImage::from_bytes(bytes, self.config.bounds_policy).map(Arc::new)
    }

    /// Renders one frame and hands it to the presenter.
    ///
    /// The frame is submitted even when a worker fails; the first failure (by worker id) is
    /// returned afterwards.
    pub fn render_frame(
        &mut self,
        memory: &Arc<MemoryImage>,
        header: &DisplayListHeader,
    ) -> Result<(), FrameError> {
        let job = Job {
            memory: Arc::clone(memory),
            header: *header,
            segments: self.segments,
        };
        for worker in &self.workers {
            worker.start(job.clone());
        }

        let mut result = Ok(());
        let mut stats = RasterStats::default();
        for worker in &self.workers {
            let mut data = worker.shared_data.data.lock();
            while data.rendering {
                worker.shared_data.condvar.wait(&mut data);
            }
            if let Err(err) = mem::replace(&mut data.result, Ok(())) {
                if result.is_ok() {
                    result = Err(err);
                }
            }
            stats.pixels_drawn += data.stats.pixels_drawn;
            stats.z_buffered_pixels_drawn += data.stats.z_buffered_pixels_drawn;
            stats.triangles_drawn = stats.triangles_drawn.max(data.stats.triangles_drawn);
            for y in (data.slice.worker_id()..SCREEN_HEIGHT).step_by(self.workers.len()) {
                self.frame.row_mut(y).copy_from_slice(data.slice.row(y));
            }
        }

        #[cfg(feature = "log")]
        slog::debug!(
            self.logger,
            "Frame rendered";
            "pixels" => stats.pixels_drawn,
            "z_buffered_pixels" => stats.z_buffered_pixels_drawn,
            "triangles" => stats.triangles_drawn,
        );
        #[cfg(not(feature = "log"))]
        let _ = stats;

        self.presenter.submit_frame(&self.frame);
        self.presenter.interrupt();
        result
    }
}
