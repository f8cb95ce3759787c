use std::{
    cell::{OnceCell, UnsafeCell},
    io::{Error, ErrorKind, Result},
    panic::AssertUnwindSafe,
};

use rand::RngCore;
use ucontext::Continuation;

use crate::{
    config::Config,
    die,
    pool::{Entry, Pool, PoolStats, Status},
    scheduler::{Dispatch, Scheduler},
    slot_list::SlotId,
    PhantomUnsend,
};

thread_local! {
    static RUNTIME: OnceCell<Runtime> = const { OnceCell::new() };
}

/// Runs `f` with the runtime of the calling thread, creating it from the
/// environment on first use.
pub(crate) fn with_runtime<R>(f: impl FnOnce(&Runtime) -> R) -> R {
    RUNTIME.with(|cell| {
        let rt = match cell.get() {
            Some(rt) => rt,
            None => {
                let rt = Runtime::new(Config::from_env(), None).unwrap_or_else(|err| {
                    die(&format!("Unable to create the coroutine runtime: {err}"))
                });
                cell.get_or_init(|| rt)
            }
        };
        f(rt)
    })
}

/// Creates the runtime of the calling thread with an explicit configuration.
pub(crate) fn install(config: Config, rng: Option<Box<dyn RngCore>>) -> Result<()> {
    RUNTIME.with(|cell| {
        if cell.get().is_some() {
            return Err(Error::new(
                ErrorKind::AlreadyExists,
                "a coroutine runtime is already installed on this thread",
            ));
        }
        let rt = Runtime::new(config, rng)?;
        if cell.set(rt).is_err() {
            die("Coroutine runtime installed twice");
        }
        Ok(())
    })
}

/// Returns `true` when the calling thread already has a runtime
pub(crate) fn is_installed() -> bool {
    RUNTIME.with(|cell| cell.get().is_some())
}

struct Inner {
    pool: Pool,
    scheduler: Scheduler,
    current: SlotId,
}

/// The coroutines of one OS thread: their pool, the scheduler and the slot
/// currently running.
///
/// Exactly one flow runs at any time, the state is only touched by that flow and
/// no reference into it is held across a context switch.
pub(crate) struct Runtime {
    inner: UnsafeCell<Inner>,
    _unsend: PhantomUnsend,
}

impl Drop for Runtime {
    fn drop(&mut self) {
        let stats = self.inner.get_mut().pool.stats();
        log::debug!(
            "Runtime: releasing pool (free: {}, used: {}, dead: {})",
            stats.free,
            stats.used,
            stats.dead
        );
    }
}

impl Runtime {
    pub(crate) fn new(config: Config, rng: Option<Box<dyn RngCore>>) -> Result<Self> {
        let pool = Pool::new(config.capacity, config.stack_size)?;
        let scheduler = match rng {
            Some(rng) => Scheduler::with_rng(rng),
            None => Scheduler::new(config.seed),
        };
        log::debug!(
            "Runtime: {} slots, {} bytes per stack, seed: {:?}",
            pool.capacity(),
            pool.stack_size(),
            config.seed
        );
        let current = pool.main();
        Ok(Self {
            inner: UnsafeCell::new(Inner {
                pool,
                scheduler,
                current,
            }),
            _unsend: PhantomUnsend::default(),
        })
    }

    /// # Safety
    /// The returned reference must be dropped before the next context switch.
    #[allow(clippy::mut_from_ref)]
    #[inline(always)]
    unsafe fn inner(&self) -> &mut Inner {
        unsafe { &mut *self.inner.get() }
    }

    /// Registers a new coroutine. It does not run until the scheduler picks it.
    pub(crate) fn start(&self, name: &str, entry: Entry) -> SlotId {
        let inner = unsafe { self.inner() };
        let id = inner.pool.acquire();
        let slot = inner.pool.slot_mut(id);
        slot.name = Some(name.to_owned());
        slot.entry = Some(entry);
        slot.completion = Some(on_return);
        slot.status = Status::New;
        slot.waiter = None;
        log::trace!("Runtime: started {name:?} in slot {id}");
        id
    }

    /// Suspends the current flow and lets the scheduler pick the next one.
    ///
    /// Returns when the current flow is selected again.
    pub(crate) fn yield_now(&self) {
        self.dispatch();
    }

    /// Yields until `id` is dead, then reclaims its slot.
    pub(crate) fn wait(&self, id: SlotId) {
        loop {
            match self.status(id) {
                Status::New | Status::Running => self.yield_now(),
                Status::Dead => {
                    let inner = unsafe { self.inner() };
                    inner.pool.release(id);
                    log::trace!("Runtime: reclaimed slot {id}");
                    return;
                }
                status => {
                    log::warn!("Runtime: waiting on slot {id} which is {status:?}");
                    return;
                }
            }
        }
    }

    pub(crate) fn status(&self, id: SlotId) -> Status {
        unsafe { self.inner() }.pool.slot(id).status
    }

    pub(crate) fn name(&self, id: SlotId) -> Option<String> {
        unsafe { self.inner() }.pool.slot(id).name.clone()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        unsafe { self.inner() }.pool.stats()
    }

    pub(crate) fn current(&self) -> SlotId {
        unsafe { self.inner() }.current
    }

    /// Picks the next flow and transfers control to it, capturing the current one.
    fn dispatch(&self) {
        let transfer = {
            let inner = unsafe { self.inner() };
            let prev = inner.current;
            let target = inner.scheduler.select(&mut inner.pool);
            let next = target.slot();
            inner.current = next;
            if next == prev {
                return;
            }
            log::trace!("Runtime: {prev} -> {target:?}");
            let from = inner.pool.continuation_ptr(prev);
            match target {
                Dispatch::Enter(id) => {
                    let slot = inner.pool.slot(id);
                    Transfer::Enter {
                        from,
                        stack_top: inner.pool.stack_top(id),
                        completion: slot.completion.unwrap_or(on_return),
                    }
                }
                Dispatch::Resume(id) => Transfer::Resume {
                    from,
                    to: inner.pool.slot(id).continuation,
                },
            }
        };
        let arg = self as *const Self as *mut ();
        match transfer {
            Transfer::Enter {
                from,
                stack_top,
                completion,
            } => unsafe { ucontext::enter(from, stack_top, coroutine_main, completion, arg) },
            Transfer::Resume { from, to } => unsafe { ucontext::switch(from, to) },
        }
    }

    fn take_entry(&self) -> Option<Entry> {
        let inner = unsafe { self.inner() };
        let current = inner.current;
        inner.pool.slot_mut(current).entry.take()
    }

    /// Runs when the body of the current coroutine returns.
    ///
    /// Returns only for the main flow; a coroutine is retired and control moves on.
    fn complete(&self) {
        {
            let inner = unsafe { self.inner() };
            let id = inner.current;
            if id == inner.pool.main() {
                return;
            }
            inner.pool.retire(id);
            log::trace!("Runtime: slot {id} completed");
        }
        self.dispatch();
    }
}

enum Transfer {
    Enter {
        from: *mut Continuation,
        stack_top: *mut u8,
        completion: ucontext::CompletionCb,
    },
    Resume {
        from: *mut Continuation,
        to: Continuation,
    },
}

/// First function run on a coroutine stack
unsafe extern "C" fn coroutine_main(rt: *mut ()) {
    let rt = unsafe { &*(rt as *const Runtime) };
    if let Some(entry) = rt.take_entry() {
        if std::panic::catch_unwind(AssertUnwindSafe(entry)).is_err() {
            die("A coroutine body panicked");
        }
    }
}

/// Called on the coroutine stack once its body returned
unsafe extern "C" fn on_return(rt: *mut ()) -> ! {
    let rt = unsafe { &*(rt as *const Runtime) };
    rt.complete();
    die("A completed coroutine was resumed");
}
