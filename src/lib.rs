//! Stackful cooperative coroutines multiplexed on the calling thread.
//!
//! Each OS thread owns one runtime: a fixed pool of coroutine slots, each with its
//! own stack, and a scheduler that picks the next coroutine at random whenever the
//! running one yields or returns. Nothing is preemptive: a coroutine runs until it
//! calls [`yield_now`], [`wait`], or returns from its body.
//!
//! ```no_run
//! let handle = coropool::start("worker", |n: u32| {
//!     for _ in 0..n {
//!         coropool::yield_now();
//!     }
//! }, 3);
//! coropool::wait(handle);
//! ```
//!
//! The runtime is created on first use from [`Config::from_env`], or explicitly
//! with [`Builder::install`]. Running out of slots aborts the process.

mod config;
mod pool;
mod runtime;
mod scheduler;
mod slot_list;

pub use config::*;
pub use pool::{PoolStats, Status};

use std::io::Result;

use rand::RngCore;
pub(crate) use ucontext::die;

pub type PhantomUnsend = std::marker::PhantomData<std::sync::MutexGuard<'static, ()>>;

/// A started coroutine, consumed by [`wait`]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct Handle {
    id: usize,
    _unsend: PhantomUnsend,
}

impl Handle {
    fn new(id: usize) -> Self {
        Self {
            id,
            _unsend: PhantomUnsend::default(),
        }
    }

    /// Index of the slot holding the coroutine
    #[inline(always)]
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn status(&self) -> Status {
        runtime::with_runtime(|rt| rt.status(self.id))
    }

    pub fn name(&self) -> Option<String> {
        runtime::with_runtime(|rt| rt.name(self.id))
    }

    /// Returns `true` once the body returned, [`wait`] will not yield anymore
    pub fn is_done(&self) -> bool {
        self.status() == Status::Dead
    }
}

/// Starts a coroutine running `entry(arg)` on its own stack.
///
/// The coroutine does not run before the scheduler picks it. Aborts the process
/// when every slot of the pool is taken.
pub fn start<F, A>(name: &str, entry: F, arg: A) -> Handle
where
    F: FnOnce(A) + 'static,
    A: 'static,
{
    let id = runtime::with_runtime(|rt| rt.start(name, Box::new(move || entry(arg))));
    Handle::new(id)
}

/// Suspends the running coroutine (or the main flow) and runs a coroutine picked
/// at random. Returns once the caller is picked again.
pub fn yield_now() {
    runtime::with_runtime(|rt| rt.yield_now())
}

/// Yields until the coroutine of `handle` returned, then reclaims its slot.
///
/// Never returns if the coroutine never returns.
pub fn wait(handle: Handle) {
    runtime::with_runtime(|rt| rt.wait(handle.id))
}

/// Returns the occupancy of the calling thread's pool
pub fn stats() -> PoolStats {
    runtime::with_runtime(|rt| rt.stats())
}

/// Returns the name of the running coroutine, `"main"` outside of any coroutine
pub fn current_name() -> Option<String> {
    runtime::with_runtime(|rt| rt.name(rt.current()))
}

/// Returns `true` when the calling thread already has a runtime
pub fn is_installed() -> bool {
    runtime::is_installed()
}

/// Configures the runtime of the calling thread
pub struct Builder {
    config: Config,
    rng: Option<Box<dyn RngCore>>,
}

impl Default for Builder {
    fn default() -> Self {
        Self::new()
    }
}

impl Builder {
    /// Starts from [`Config::from_env`]
    pub fn new() -> Self {
        Self::with_config(Config::from_env())
    }

    pub fn with_config(config: Config) -> Self {
        Self { config, rng: None }
    }

    pub fn capacity(mut self, capacity: usize) -> Self {
        self.config.capacity = capacity;
        self
    }

    pub fn stack_size(mut self, stack_size: usize) -> Self {
        self.config.stack_size = stack_size;
        self
    }

    /// Makes the scheduling order reproducible
    pub fn seed(mut self, seed: u64) -> Self {
        self.config.seed = Some(seed);
        self
    }

    /// Uses `rng` as the scheduler's random source, the seed is then ignored
    pub fn rng<R: RngCore + 'static>(mut self, rng: R) -> Self {
        self.rng = Some(Box::new(rng));
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Creates the runtime of the calling thread.
    ///
    /// Fails with [`std::io::ErrorKind::AlreadyExists`] when the thread already has
    /// one, [`std::io::ErrorKind::InvalidInput`] for a zero capacity, or when the
    /// stacks can not be allocated.
    pub fn install(self) -> Result<()> {
        runtime::install(self.config, self.rng)
    }
}
