use rand::{rngs::StdRng, Rng, RngCore, SeedableRng};

use crate::{
    die,
    pool::{Pool, Status},
    slot_list::SlotId,
};

/// What the dispatcher has to do with the selected slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Dispatch {
    /// First run: start the body on the slot's stack
    Enter(SlotId),
    /// Restore the continuation captured at its last suspension
    Resume(SlotId),
}

impl Dispatch {
    #[inline(always)]
    pub(crate) fn slot(&self) -> SlotId {
        match *self {
            Dispatch::Enter(id) | Dispatch::Resume(id) => id,
        }
    }
}

/// Uniform random choice among the runnable slots.
///
/// Every call is independent: no priority, no aging, no FIFO order.
pub(crate) struct Scheduler {
    rng: Box<dyn RngCore>,
}

impl Scheduler {
    pub(crate) fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::with_rng(Box::new(rng))
    }

    pub(crate) fn with_rng(rng: Box<dyn RngCore>) -> Self {
        Self { rng }
    }

    /// Picks the next slot to run among the used slots and the main flow.
    ///
    /// A new slot is marked running before it is returned. Slots in any other state
    /// than new or running are skipped and the pick is retried.
    pub(crate) fn select(&mut self, pool: &mut Pool) -> Dispatch {
        let main_runnable = pool.slot(pool.main()).status == Status::Running;
        let runnable = pool.used_count() + main_runnable as usize;
        if runnable == 0 {
            die("Dispatch without any runnable coroutine");
        }
        loop {
            let n = self.rng.gen_range(0..runnable);
            let Some(id) = pool.nth_runnable(n) else {
                die("Dispatch candidate out of range");
            };
            let slot = pool.slot_mut(id);
            match slot.status {
                Status::New => {
                    slot.status = Status::Running;
                    return Dispatch::Enter(id);
                }
                Status::Running => return Dispatch::Resume(id),
                status => log::trace!("Scheduler: skipping slot {id} ({status:?})"),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::mock::StepRng;

    fn pool(capacity: usize) -> Pool {
        Pool::new(capacity, 4096).unwrap()
    }

    #[test]
    fn test_only_main() {
        let mut pool = pool(4);
        let mut scheduler = Scheduler::new(Some(1));
        for _ in 0..16 {
            assert_eq!(scheduler.select(&mut pool), Dispatch::Resume(pool.main()));
        }
    }

    #[test]
    fn test_enter_marks_running() {
        let mut pool = pool(4);
        let id = pool.acquire();
        pool.slot_mut(id).status = Status::New;
        let mut scheduler = Scheduler::new(Some(7));
        let mut entered = 0;
        for _ in 0..64 {
            match scheduler.select(&mut pool) {
                Dispatch::Enter(got) => {
                    assert_eq!(got, id);
                    entered += 1;
                }
                Dispatch::Resume(got) => assert!(got == id || got == pool.main()),
            }
        }
        assert_eq!(entered, 1);
        assert_eq!(pool.slot(id).status, Status::Running);
    }

    #[test]
    fn test_dead_never_selected() {
        let mut pool = pool(4);
        let alive = pool.acquire();
        let dead = pool.acquire();
        pool.slot_mut(alive).status = Status::Running;
        pool.slot_mut(dead).status = Status::Running;
        pool.retire(dead);
        let mut scheduler = Scheduler::new(Some(3));
        for _ in 0..256 {
            assert_ne!(scheduler.select(&mut pool).slot(), dead);
        }
    }

    #[test]
    fn test_skips_unexpected_state() {
        let mut pool = pool(2);
        let waiting = pool.acquire();
        pool.slot_mut(waiting).status = Status::Waiting;
        // StepRng always yields 0 first: the used head, which must be skipped
        let mut scheduler = Scheduler::with_rng(Box::new(StepRng::new(0, 1 << 63)));
        assert_eq!(scheduler.select(&mut pool), Dispatch::Resume(pool.main()));
    }

    #[test]
    fn test_seeded_sequence() {
        let picks = |seed| {
            let mut pool = pool(8);
            for _ in 0..8 {
                let id = pool.acquire();
                pool.slot_mut(id).status = Status::Running;
            }
            let mut scheduler = Scheduler::new(Some(seed));
            (0..32)
                .map(|_| scheduler.select(&mut pool).slot())
                .collect::<Vec<_>>()
        };
        assert_eq!(picks(42), picks(42));
    }

    #[test]
    fn test_uniform_enough() {
        let mut pool = pool(3);
        for _ in 0..3 {
            let id = pool.acquire();
            pool.slot_mut(id).status = Status::Running;
        }
        let mut scheduler = Scheduler::new(Some(11));
        let mut hits = [0usize; 4];
        for _ in 0..4000 {
            hits[scheduler.select(&mut pool).slot()] += 1;
        }
        assert!(hits.iter().all(|h| *h > 700), "{hits:?}");
    }
}
