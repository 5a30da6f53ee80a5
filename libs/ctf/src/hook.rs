//! Interfaces to the runtime's sampling machinery.
//!
//! The runtime invokes the five callbacks of [`AllocSink`] serially, on the
//! thread performing the allocation. Callstacks arrive as arrays of opaque
//! [`RawSlot`] identifiers, innermost frame first; a [`SlotResolver`] turns a
//! slot into its source locations when the writer needs to declare it.
//!
//! [`recorder`] holds the process-wide writer slot: at most one trace is
//! recorded at a time.

prelude! {}

/// An opaque raw stack slot, as delivered by the runtime.
pub type RawSlot = u64;

/// Deepest callstack the runtime is asked to capture; deeper stacks are
/// truncated at the sampling site.
pub const MAX_STACK_DEPTH: usize = 4096;

/// The sampling callbacks the runtime drives.
///
/// Allocation callbacks return the ID the trace assigned, which the runtime
/// hands back on promotion and deallocation. All five are invoked serially
/// with respect to each other.
pub trait AllocSink {
    /// A sampled allocation on the minor heap.
    fn alloc_minor(&mut self, len: usize, nsamples: usize, callstack: &[RawSlot]) -> Res<AllocId>;
    /// A sampled allocation directly on the major heap.
    fn alloc_major(&mut self, len: usize, nsamples: usize, callstack: &[RawSlot]) -> Res<AllocId>;
    /// A tracked allocation survived a minor collection.
    fn promote(&mut self, id: AllocId) -> Res<()>;
    /// A tracked minor allocation died.
    fn dealloc_minor(&mut self, id: AllocId) -> Res<()>;
    /// A tracked major allocation died.
    fn dealloc_major(&mut self, id: AllocId) -> Res<()>;
}

/// Resolves a raw stack slot into source locations.
pub trait SlotResolver {
    /// The locations a slot stands for, outermost (least recently entered)
    /// frame first. An empty list means the slot could not be resolved.
    fn resolve(&mut self, slot: RawSlot) -> Res<Vec<RawLocation>>;
}

impl<T: SlotResolver + ?Sized> SlotResolver for Box<T> {
    fn resolve(&mut self, slot: RawSlot) -> Res<Vec<RawLocation>> {
        (**self).resolve(slot)
    }
}

/// A monotone wall clock, in seconds.
pub trait TraceClock {
    /// Seconds elapsed, monotone across calls.
    fn now(&mut self) -> f64;
}

/// System clock counting from its construction time.
pub struct SysClock {
    start: std::time::Instant,
}
impl SysClock {
    /// Constructor; the clock starts now.
    pub fn new() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}
impl TraceClock for SysClock {
    fn now(&mut self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Process-wide recorder slot.
pub mod recorder {
    prelude! {}

    use crate::hook::{AllocSink, SlotResolver, SysClock};
    use crate::write::Writer;

    /// The writer type held in the global slot.
    type FileWriter =
        Writer<std::io::BufWriter<std::fs::File>, Box<dyn SlotResolver + Send>, SysClock>;

    /// A registered recorder and the sampling rate it was started with.
    struct Recorder {
        writer: FileWriter,
        sampling_rate: f64,
    }

    lazy_static! {
        /// Global recorder slot; at most one recorder at a time.
        static ref RECORDER: sync::Mutex<Option<Recorder>> = sync::Mutex::new(None);
    }

    /// Proof that a recorder was started; consumed by [`stop`].
    #[must_use]
    pub struct Handle {
        _seal: (),
    }

    /// Starts recording a trace to `dest`.
    ///
    /// `sampling_rate` is the per-word sampling probability the runtime is
    /// configured with; it must lie in `(0, 1]`. Fails if a recorder is
    /// already registered.
    pub fn start(
        dest: impl AsRef<std::path::Path>,
        sampling_rate: f64,
        resolver: Box<dyn SlotResolver + Send>,
    ) -> Res<Handle> {
        if !(sampling_rate > 0.0 && sampling_rate <= 1.0) {
            bail!("illegal sampling rate {}, expected (0, 1]", sampling_rate)
        }
        let mut slot = RECORDER.lock().expect("recorder slot is poisoned");
        if slot.is_some() {
            bail!("a trace recorder is already registered")
        }
        let file = std::fs::File::create(dest.as_ref())
            .chain_err(|| format!("while creating trace file `{}`", dest.as_ref().display()))?;
        let writer = Writer::new(std::io::BufWriter::new(file), resolver, SysClock::new())?;
        *slot = Some(Recorder {
            writer,
            sampling_rate,
        });
        Ok(Handle { _seal: () })
    }

    /// Stops the recorder: flushes the final packet and closes the
    /// destination.
    pub fn stop(handle: Handle) -> Res<()> {
        destroy(handle);
        let recorder = {
            let mut slot = RECORDER.lock().expect("recorder slot is poisoned");
            match slot.take() {
                Some(recorder) => recorder,
                None => bail!("no trace recorder is registered"),
            }
        };
        let _dest = recorder.writer.finish()?;
        Ok(())
    }

    /// Sampling rate of the registered recorder, if any.
    pub fn sampling_rate() -> Option<f64> {
        RECORDER
            .lock()
            .expect("recorder slot is poisoned")
            .as_ref()
            .map(|recorder| recorder.sampling_rate)
    }

    /// Runs an action on the registered recorder.
    ///
    /// This is how the runtime-callback glue reaches the writer; fails when
    /// no recorder is registered.
    pub fn with<T>(action: impl FnOnce(&mut dyn AllocSink) -> Res<T>) -> Res<T> {
        let mut slot = RECORDER.lock().expect("recorder slot is poisoned");
        match slot.as_mut() {
            Some(recorder) => action(&mut recorder.writer),
            None => bail!("no trace recorder is registered"),
        }
    }
}
