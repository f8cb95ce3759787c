//! Execution-context switching on caller-provided stacks.
//!
//! The crate exposes exactly two transfers of control:
//!  * [`enter`] starts a function on a fresh stack,
//!  * [`switch`] suspends the running flow and resumes another one.
//!
//! Both record the suspended flow in a [`Continuation`] which a later [`switch`]
//! restores. Everything else (who runs next, which stack belongs to whom) is left
//! to the caller.

mod sys;

pub use sys::{stack_growth_downward, StackBlock};

/// Function started on a fresh stack, receives the `arg` given to [`enter`]
pub type EntryCb = unsafe extern "C" fn(arg: *mut ());
/// Function called with the same `arg` when the entry function returns
pub type CompletionCb = unsafe extern "C" fn(arg: *mut ()) -> !;

/// The saved stack pointer of a suspended flow.
///
/// The callee-saved registers of the flow are stored on its own stack, below the
/// saved pointer, so a continuation is a single machine word.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Continuation(*mut ());

impl Default for Continuation {
    fn default() -> Self {
        Self::empty()
    }
}

impl Continuation {
    #[inline(always)]
    pub const fn empty() -> Self {
        Self(std::ptr::null_mut())
    }

    /// Returns `true` when nothing was ever captured into `self`
    #[inline(always)]
    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }
}

/// Suspends the running flow into `from` and resumes `to`.
///
/// Returns when another flow restores `from`.
///
/// # Safety
///  * `from` must be valid for writes until the flow is resumed,
///  * `to` must have been captured by a previous [`switch`] or [`enter`] and not
///    resumed since,
///  * the stack of `to` must still be mapped.
#[inline(always)]
pub unsafe fn switch(from: *mut Continuation, to: Continuation) {
    debug_assert!(!to.is_empty());
    unsafe { __coropool_uctx_asm_swap(from as *mut *mut (), to.0) };
}

/// Suspends the running flow into `from` and calls `entry(arg)` on the stack
/// ending at `stack_top`.
///
/// When `entry` returns, `completion(arg)` is called on the same stack; it must
/// transfer control elsewhere. `enter` itself returns when another flow restores
/// `from`.
///
/// # Safety
///  * `stack_top` must be the upper end of a writable region large enough for
///    `entry`, not used by any live flow,
///  * `from` must be valid for writes until the flow is resumed.
#[inline(always)]
pub unsafe fn enter(
    from: *mut Continuation,
    stack_top: *mut u8,
    entry: EntryCb,
    completion: CompletionCb,
    arg: *mut (),
) {
    let sp = unsafe { sys::asm::setup_coroutine_on_stack(stack_top, entry, completion, arg) };
    unsafe { switch(from, Continuation(sp)) };
}

/// Logs `message` and aborts the process.
#[cold]
pub fn die(message: &str) -> ! {
    log::error!("{}, aborting.", message);
    eprintln!("{}, aborting.", message);
    std::process::abort();
}

unsafe extern "C" {
    unsafe fn __coropool_uctx_asm_swap(from: *mut *mut (), to: *mut ());
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ptr::addr_of_mut;

    struct PingPong {
        root: Continuation,
        coro: Continuation,
        steps: usize,
        finished: bool,
    }

    unsafe extern "C" fn body(arg: *mut ()) {
        let pp = arg as *mut PingPong;
        for _ in 0..3 {
            unsafe {
                (*pp).steps += 1;
                switch(addr_of_mut!((*pp).coro), (*pp).root);
            }
        }
    }

    unsafe extern "C" fn finish(arg: *mut ()) -> ! {
        let pp = arg as *mut PingPong;
        unsafe {
            (*pp).finished = true;
            switch(addr_of_mut!((*pp).coro), (*pp).root);
        }
        die("Finished context resumed");
    }

    #[test]
    fn test_ping_pong() {
        let stacks = StackBlock::allocate(1, StackBlock::DEFAULT_STACK_SIZE).unwrap();
        assert!(Continuation::default().is_empty());
        let pp = Box::into_raw(Box::new(PingPong {
            root: Continuation::default(),
            coro: Continuation::empty(),
            steps: 0,
            finished: false,
        }));
        unsafe {
            enter(addr_of_mut!((*pp).root), stacks.top(0), body, finish, pp as _);
            assert_eq!((*pp).steps, 1);
            assert!(!(*pp).root.is_empty());
            assert!(!(*pp).coro.is_empty());

            for expected in 2..=3 {
                switch(addr_of_mut!((*pp).root), (*pp).coro);
                assert_eq!((*pp).steps, expected);
                assert!(!(*pp).finished);
            }

            switch(addr_of_mut!((*pp).root), (*pp).coro);
            assert_eq!((*pp).steps, 3);
            assert!((*pp).finished);
            drop(Box::from_raw(pp));
        }
    }

    #[test]
    fn test_two_contexts_share_a_block() {
        let stacks = StackBlock::allocate(2, StackBlock::DEFAULT_STACK_SIZE).unwrap();
        let first = Box::into_raw(Box::new(PingPong {
            root: Continuation::empty(),
            coro: Continuation::empty(),
            steps: 0,
            finished: false,
        }));
        let second = Box::into_raw(Box::new(PingPong {
            root: Continuation::empty(),
            coro: Continuation::empty(),
            steps: 0,
            finished: false,
        }));
        unsafe {
            enter(addr_of_mut!((*first).root), stacks.top(0), body, finish, first as _);
            enter(addr_of_mut!((*second).root), stacks.top(1), body, finish, second as _);
            switch(addr_of_mut!((*first).root), (*first).coro);
            assert_eq!((*first).steps, 2);
            assert_eq!((*second).steps, 1);
            drop(Box::from_raw(first));
            drop(Box::from_raw(second));
        }
    }
}
