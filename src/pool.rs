use std::io::{Error, ErrorKind, Result};

use ucontext::{CompletionCb, Continuation, StackBlock};

use crate::{
    die,
    slot_list::{Link, Linked, SlotId, SlotList},
};

/// A coroutine body with its argument already bound
pub(crate) type Entry = Box<dyn FnOnce() + 'static>;

/// Lifecycle state of a coroutine slot
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Status {
    /// Started, never dispatched
    New,
    /// Dispatched at least once, its body has not returned
    Running,
    /// Reserved for a blocking wait, never entered
    Waiting,
    /// The body returned, the slot waits to be reclaimed
    Dead,
    /// Not in use
    #[default]
    Free,
}

/// Occupancy of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub capacity: usize,
    pub free: usize,
    pub used: usize,
    pub dead: usize,
}

/// One coroutine record. A default record is a zeroed, free slot.
#[derive(Default)]
pub(crate) struct Slot {
    pub(crate) name: Option<String>,
    pub(crate) entry: Option<Entry>,
    pub(crate) completion: Option<CompletionCb>,
    pub(crate) status: Status,
    pub(crate) continuation: Continuation,
    link: Link,
    #[allow(dead_code)]
    pub(crate) waiter: Option<SlotId>,
}

impl Linked for Slot {
    #[inline(always)]
    fn link(&self) -> &Link {
        &self.link
    }
    #[inline(always)]
    fn link_mut(&mut self) -> &mut Link {
        &mut self.link
    }
}

/// Fixed arena of coroutine slots.
///
/// The `capacity` user slots are always split between the free, used and dead
/// lists. One extra record, past the user slots, describes the main flow: it has
/// no private stack and is never in any list.
pub(crate) struct Pool {
    slots: Vec<Slot>,
    stacks: StackBlock,
    free: SlotList,
    used: SlotList,
    dead: SlotList,
}

impl Pool {
    pub(crate) const MAIN_NAME: &'static str = "main";

    pub(crate) fn new(capacity: usize, stack_size: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                "a coroutine pool needs at least one slot",
            ));
        }
        let stacks = StackBlock::allocate(capacity, stack_size).ok_or_else(|| {
            Error::new(
                ErrorKind::OutOfMemory,
                format!("unable to map {capacity} stacks of {stack_size} bytes"),
            )
        })?;
        let mut slots: Vec<Slot> = (0..=capacity).map(|_| Slot::default()).collect();
        let mut free = SlotList::new();
        for id in (0..capacity).rev() {
            free.push_front(&mut slots, id);
        }
        let main = &mut slots[capacity];
        main.name = Some(Self::MAIN_NAME.to_owned());
        main.status = Status::Running;

        let pool = Self {
            slots,
            stacks,
            free,
            used: SlotList::new(),
            dead: SlotList::new(),
        };
        pool.check();
        Ok(pool)
    }

    #[inline(always)]
    pub(crate) fn capacity(&self) -> usize {
        self.stacks.len()
    }

    /// Record of the main flow
    #[inline(always)]
    pub(crate) fn main(&self) -> SlotId {
        self.capacity()
    }

    #[inline(always)]
    pub(crate) fn stack_size(&self) -> usize {
        self.stacks.stack_size()
    }

    #[inline(always)]
    pub(crate) fn used_count(&self) -> usize {
        self.used.len()
    }

    pub(crate) fn stats(&self) -> PoolStats {
        PoolStats {
            capacity: self.capacity(),
            free: self.free.len(),
            used: self.used.len(),
            dead: self.dead.len(),
        }
    }

    #[inline(always)]
    pub(crate) fn slot(&self, id: SlotId) -> &Slot {
        &self.slots[id]
    }

    #[inline(always)]
    pub(crate) fn slot_mut(&mut self, id: SlotId) -> &mut Slot {
        &mut self.slots[id]
    }

    /// Where the flow of `id` is captured when it gives up control.
    ///
    /// The arena never grows, so the pointer stays valid for the pool's lifetime.
    #[inline(always)]
    pub(crate) fn continuation_ptr(&mut self, id: SlotId) -> *mut Continuation {
        &mut self.slots[id].continuation as *mut Continuation
    }

    #[inline(always)]
    pub(crate) fn stack_top(&self, id: SlotId) -> *mut u8 {
        debug_assert!(id != self.main());
        self.stacks.top(id)
    }

    /// Moves the front of the free list to the front of the used list.
    ///
    /// Aborts when the pool is exhausted.
    ///
    /// # Complexity
    ///  * O(1)
    pub(crate) fn acquire(&mut self) -> SlotId {
        let capacity = self.capacity();
        let Self {
            slots, free, used, ..
        } = self;
        let Some(id) = free.pop_front(slots) else {
            die(&format!(
                "Coroutine pool exhausted, all {capacity} slots are in use"
            ));
        };
        used.push_front(slots, id);
        self.check();
        id
    }

    /// Moves `id` from the used list to the dead list and marks it dead.
    ///
    /// # Complexity
    ///  * O(n) where n is the position of `id` in the used list
    pub(crate) fn retire(&mut self, id: SlotId) {
        let Self {
            slots, used, dead, ..
        } = self;
        used.remove(slots, id);
        slots[id].status = Status::Dead;
        dead.push_front(slots, id);
        self.check();
    }

    /// Moves `id` from the dead list to the free list, erasing everything it held.
    ///
    /// # Complexity
    ///  * O(n) where n is the position of `id` in the dead list
    pub(crate) fn release(&mut self, id: SlotId) {
        debug_assert!(id != self.main());
        let Self {
            slots,
            stacks,
            dead,
            free,
            ..
        } = self;
        dead.remove(slots, id);
        // The name is owned: drop it before the record is overwritten
        drop(slots[id].name.take());
        slots[id] = Slot::default();
        // The slot is dead, nothing runs or will resume on its stack
        unsafe { stacks.clear(id) };
        free.push_front(slots, id);
        self.check();
    }

    /// Returns the `n`-th dispatch candidate: the used list followed by the main flow
    pub(crate) fn nth_runnable(&self, n: usize) -> Option<SlotId> {
        if n < self.used.len() {
            self.used.nth(&self.slots, n)
        } else if n == self.used.len() {
            Some(self.main())
        } else {
            None
        }
    }

    #[inline(always)]
    fn check(&self) {
        debug_assert_eq!(
            self.free.len() + self.used.len() + self.dead.len(),
            self.capacity()
        );
    }

    #[cfg(test)]
    pub(crate) fn stack_bytes(&self, id: SlotId) -> &[u8] {
        unsafe { self.stacks.bytes(id) }
    }

    #[cfg(test)]
    pub(crate) fn lists_of(&self, id: SlotId) -> (bool, bool, bool) {
        (
            self.free.contains(&self.slots, id),
            self.used.contains(&self.slots, id),
            self.dead.contains(&self.slots, id),
        )
    }
}
