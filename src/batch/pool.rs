//! Fixed-size pool of worker slots.
//!
//! Each slot owns one UDP socket, bound once and reused for every job the
//! slot runs. During a batch every slot is served by its own worker thread
//! that holds the slot's lock for the whole batch, so a socket is never
//! touched by two jobs at once. The dispatcher only hands work to slots whose
//! busy flag is clear, which caps in-flight jobs at the slot count without
//! an unbounded queue.

use std::net::{SocketAddr, UdpSocket};
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Sender};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crate::tftp::core::{Socket, TftpError, bind_any};

/// How long the dispatcher sleeps when every slot is busy.
pub const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Minimum number of workers regardless of core count.
pub const MIN_WORKERS: usize = 4;

/// Hardware concurrency, floored at [`MIN_WORKERS`].
pub fn default_worker_count() -> usize {
    thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        .max(MIN_WORKERS)
}

/// Last error of a slot, readable while the slot's worker holds the slot.
type ErrorCell = Arc<Mutex<String>>;

fn lock_error(cell: &Mutex<String>) -> MutexGuard<'_, String> {
    cell.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// One pool member: a bound socket plus the last error it ran into.
#[derive(Debug)]
pub struct WorkerSlot {
    index: usize,
    socket: UdpSocket,
    last_error: ErrorCell,
}

impl WorkerSlot {
    fn bind(index: usize) -> Result<Self, TftpError> {
        Ok(Self {
            index,
            socket: bind_any()?,
            last_error: ErrorCell::default(),
        })
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn socket(&self) -> &UdpSocket {
        &self.socket
    }

    pub fn last_error(&self) -> String {
        lock_error(&self.last_error).clone()
    }

    pub fn set_last_error(&mut self, err: impl Into<String>) {
        *lock_error(&self.last_error) = err.into();
    }
}

fn lock_slot(slot: &Mutex<WorkerSlot>) -> MutexGuard<'_, WorkerSlot> {
    slot.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug)]
pub struct WorkerPool {
    slots: Vec<Mutex<WorkerSlot>>,
    errors: Vec<ErrorCell>,
    addrs: Vec<SocketAddr>,
}

impl WorkerPool {
    /// Binds `count` sockets. Fails if `count` is zero or any bind fails.
    pub fn new(count: usize) -> Result<Self, TftpError> {
        if count == 0 {
            return Err(TftpError::config("Worker count must be at least 1"));
        }
        let slots = (0..count)
            .map(WorkerSlot::bind)
            .collect::<Result<Vec<_>, _>>()?;
        let errors = slots.iter().map(|s| Arc::clone(&s.last_error)).collect();
        let addrs = slots
            .iter()
            .map(|s| Socket::local_addr(&s.socket))
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Worker pool ready with {} slot(s)", count);
        Ok(Self {
            slots: slots.into_iter().map(Mutex::new).collect(),
            errors,
            addrs,
        })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Last error recorded by slot `index`, also while a batch is running.
    pub fn last_error(&self, index: usize) -> Option<String> {
        self.errors.get(index).map(|cell| lock_error(cell).clone())
    }

    /// Local socket addresses, one per slot.
    pub fn local_addrs(&self) -> &[SocketAddr] {
        &self.addrs
    }

    /// Starts one worker thread per slot, lets `dispatch` feed them through a
    /// [`Dispatcher`], and returns once `dispatch` has returned and every
    /// in-flight job has finished.
    pub fn run<J, W, D, R>(&self, work: W, dispatch: D) -> R
    where
        J: Send,
        W: Fn(&mut WorkerSlot, J) + Sync,
        D: FnOnce(&Dispatcher<J>) -> R,
    {
        let work = &work;
        let busy: Vec<AtomicBool> = self.slots.iter().map(|_| AtomicBool::new(false)).collect();

        thread::scope(|scope| {
            let mut lanes = Vec::with_capacity(self.slots.len());
            for (slot, busy) in self.slots.iter().zip(&busy) {
                let (tx, rx) = mpsc::channel::<J>();
                scope.spawn(move || {
                    let mut slot = lock_slot(slot);
                    for job in rx {
                        work(&mut slot, job);
                        busy.store(false, Ordering::SeqCst);
                    }
                });
                lanes.push(Lane { busy, tx });
            }

            let dispatcher = Dispatcher { lanes };
            // Dropping the dispatcher closes every channel; the scope then
            // joins the workers once their current job is done.
            dispatch(&dispatcher)
        })
    }
}

struct Lane<'a, J> {
    busy: &'a AtomicBool,
    tx: Sender<J>,
}

/// Hands jobs to idle worker slots during [`WorkerPool::run`].
pub struct Dispatcher<'a, J> {
    lanes: Vec<Lane<'a, J>>,
}

impl<J> Dispatcher<'_, J> {
    /// Gives `job` to the first idle slot and returns its index, or hands
    /// the job back if every slot is busy.
    pub fn try_submit(&self, job: J) -> Result<usize, J> {
        let mut job = job;
        for (index, lane) in self.lanes.iter().enumerate() {
            if lane
                .busy
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_err()
            {
                continue;
            }
            match lane.tx.send(job) {
                Ok(()) => return Ok(index),
                // The worker is gone; leave the slot marked busy
                Err(mpsc::SendError(back)) => job = back,
            }
        }
        Err(job)
    }

    /// Like [`Dispatcher::try_submit`] but waits for a slot to free up,
    /// polling every [`IDLE_POLL_INTERVAL`]. Gives the job back as soon as
    /// `keep_going` returns `false`.
    pub fn submit(&self, job: J, keep_going: impl Fn() -> bool) -> Result<usize, J> {
        let mut job = job;
        loop {
            if !keep_going() {
                return Err(job);
            }
            match self.try_submit(job) {
                Ok(index) => return Ok(index),
                Err(back) => job = back,
            }
            thread::sleep(IDLE_POLL_INTERVAL);
        }
    }

    pub fn idle_count(&self) -> usize {
        self.lanes
            .iter()
            .filter(|lane| !lane.busy.load(Ordering::SeqCst))
            .count()
    }

    pub fn slot_count(&self) -> usize {
        self.lanes.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;
    use std::sync::atomic::AtomicUsize;
    use std::time::Instant;

    #[test]
    fn test_default_worker_count_floor() {
        assert!(default_worker_count() >= MIN_WORKERS);
    }

    #[test]
    fn test_pool_binds_distinct_sockets() {
        let pool = WorkerPool::new(3).unwrap();
        assert_eq!(pool.len(), 3);
        let ports: HashSet<u16> = pool.local_addrs().iter().map(|a| a.port()).collect();
        assert_eq!(ports.len(), 3);
        assert!(WorkerPool::new(0).is_err());
    }

    #[test]
    fn test_in_flight_jobs_capped_and_slots_exclusive() {
        let pool = WorkerPool::new(3).unwrap();
        let in_flight = AtomicUsize::new(0);
        let peak = AtomicUsize::new(0);
        let per_slot: Vec<AtomicUsize> = (0..3).map(|_| AtomicUsize::new(0)).collect();
        let done = AtomicUsize::new(0);

        pool.run(
            |slot: &mut WorkerSlot, _job: u32| {
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                let users = per_slot[slot.index()].fetch_add(1, Ordering::SeqCst) + 1;
                assert_eq!(users, 1, "slot {} used concurrently", slot.index());

                thread::sleep(Duration::from_millis(20));

                per_slot[slot.index()].fetch_sub(1, Ordering::SeqCst);
                in_flight.fetch_sub(1, Ordering::SeqCst);
                done.fetch_add(1, Ordering::SeqCst);
            },
            |dispatcher| {
                for job in 0..10 {
                    assert!(dispatcher.submit(job, || true).is_ok());
                }
            },
        );

        // run() returns only after every job finished
        assert_eq!(done.load(Ordering::SeqCst), 10);
        assert!(peak.load(Ordering::SeqCst) <= 3);
    }

    #[test]
    fn test_submit_gives_up_when_told_to() {
        let pool = WorkerPool::new(1).unwrap();
        let ran = AtomicUsize::new(0);

        let rejected = pool.run(
            |_slot: &mut WorkerSlot, _job: u32| {
                thread::sleep(Duration::from_millis(300));
                ran.fetch_add(1, Ordering::SeqCst);
            },
            |dispatcher| {
                assert_eq!(dispatcher.slot_count(), 1);
                assert_eq!(dispatcher.try_submit(1), Ok(0));
                assert_eq!(dispatcher.idle_count(), 0);
                assert_eq!(dispatcher.try_submit(2), Err(2));
                dispatcher.submit(3, || false)
            },
        );

        assert_eq!(rejected, Err(3));
        assert_eq!(ran.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_last_error_survives_batches() {
        let pool = WorkerPool::new(2).unwrap();
        pool.run(
            |slot: &mut WorkerSlot, msg: String| slot.set_last_error(msg),
            |dispatcher| {
                dispatcher.try_submit("boom".to_string()).unwrap();
            },
        );
        assert_eq!(pool.last_error(0).as_deref(), Some("boom"));
        assert_eq!(pool.last_error(1).as_deref(), Some(""));
        assert_eq!(pool.last_error(5), None);
    }

    #[test]
    fn test_last_error_readable_while_slot_is_held() {
        let pool = WorkerPool::new(1).unwrap();
        let release = AtomicBool::new(false);

        pool.run(
            |slot: &mut WorkerSlot, msg: String| {
                slot.set_last_error(msg);
                assert_eq!(slot.last_error(), "timed out");
                while !release.load(Ordering::SeqCst) {
                    thread::sleep(Duration::from_millis(5));
                }
            },
            |dispatcher| {
                dispatcher.try_submit("timed out".to_string()).unwrap();
                let deadline = Instant::now() + Duration::from_secs(5);
                // The worker still holds its slot here
                while pool.last_error(0).as_deref() != Some("timed out") {
                    assert!(Instant::now() < deadline, "last error never became visible");
                    thread::sleep(Duration::from_millis(5));
                }
                assert_eq!(dispatcher.idle_count(), 0);
                release.store(true, Ordering::SeqCst);
            },
        );
    }
}
