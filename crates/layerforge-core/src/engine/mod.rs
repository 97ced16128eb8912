//! # Scheduler
//!
//! Orchestrates a run: a fixed pool of OS worker threads pulls item indices
//! from a shared queue, solves, reserves, composites, commits and emits —
//! in that order — while the consumer drains a byte-budgeted event stream.
//! Cancellation is cooperative (checked at the loop top, before compositing
//! and after compositing); transient failures are retried; fatal failures
//! surface exactly once and close the stream.

pub mod events;
pub mod queue;

pub use events::{Attribute, CancelReason, Event, GeneratedItem};

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::compile::{self, CompiledRequest};
use crate::composite::{self, cache::DecodeCache, DEFAULT_CACHE_FRAMES};
use crate::error::{ForgeError, Result};
use crate::ledger::UniquenessLedger;
use crate::rarity;
use crate::request::{GenerationRequest, TraitId};
use crate::solve;
use queue::{EventQueue, PushError};

/// Scheduler-level retries per index (solver exhaustion, reservation races,
/// decode failures) before the index is re-queued.
const ITEM_RETRY_LIMIT: u32 = 4;
/// Progress cadence: whichever of these fires first.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(50);
const PROGRESS_ITEM_STRIDE: u32 = 10;

/// Validate, compile and start a run. Validation failures are returned
/// directly; everything after that arrives on the event stream.
pub fn run(request: GenerationRequest) -> Result<GenerationRun> {
    let compiled = compile::compile(request)?;
    Ok(GenerationRun::spawn(Arc::new(compiled)))
}

/// An in-flight run: an iterator over [`Event`]s plus a cancel handle. The
/// stream ends right after its terminal event. Dropping the handle cancels
/// the run and joins the workers.
pub struct GenerationRun {
    shared: Arc<RunShared>,
    workers: Vec<JoinHandle<()>>,
    terminated: bool,
}

impl GenerationRun {
    fn spawn(compiled: Arc<CompiledRequest>) -> Self {
        let worker_count = thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            .min(compiled.worker_cap)
            .max(1);
        let cache_pixels = u64::from(compiled.output_size.width)
            * u64::from(compiled.output_size.height)
            * DEFAULT_CACHE_FRAMES;

        let shared = Arc::new(RunShared {
            ledger: UniquenessLedger::new(&compiled),
            cache: DecodeCache::new(cache_pixels),
            queue: EventQueue::new(compiled.memory_budget_bytes),
            work: Mutex::new(WorkQueue::new(compiled.target_count)),
            recorded: Mutex::new(vec![None; compiled.target_count as usize]),
            poisoned: Mutex::new(HashSet::new()),
            completed: AtomicU32::new(0),
            stop: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            cancel_reason: Mutex::new(None),
            workers_left: AtomicUsize::new(worker_count),
            progress: Mutex::new(ProgressClock {
                last_emit: Instant::now(),
                last_count: 0,
            }),
            deadline: compiled.timeout.map(|t| Instant::now() + t),
            compiled,
        });

        let workers = (0..worker_count)
            .map(|worker_index| {
                let shared = Arc::clone(&shared);
                thread::spawn(move || worker_loop(&shared, worker_index))
            })
            .collect();

        Self {
            shared,
            workers,
            terminated: false,
        }
    }

    /// Ask the run to stop. Cooperative: a `Cancelled` terminal follows
    /// within one composite plus one attempt budget.
    pub fn cancel(&self) {
        self.shared.request_cancel(CancelReason::Requested);
    }

    /// Blocking; `None` once the terminal event has been delivered.
    pub fn next_event(&mut self) -> Option<Event> {
        if self.terminated {
            return None;
        }
        match self.shared.queue.pop() {
            Some(event) => {
                if event.is_terminal() {
                    self.terminated = true;
                }
                Some(event)
            }
            None => {
                self.terminated = true;
                None
            }
        }
    }
}

impl Iterator for GenerationRun {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.next_event()
    }
}

impl Drop for GenerationRun {
    fn drop(&mut self) {
        self.shared.request_cancel(CancelReason::Requested);
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
    }
}

struct RunShared {
    compiled: Arc<CompiledRequest>,
    ledger: UniquenessLedger,
    cache: DecodeCache,
    queue: EventQueue,
    work: Mutex<WorkQueue>,
    recorded: Mutex<Vec<Option<Vec<usize>>>>,
    poisoned: Mutex<HashSet<(usize, usize)>>,
    completed: AtomicU32,
    /// Workers wind down when set, whatever the cause.
    stop: AtomicBool,
    cancelled: AtomicBool,
    failed: AtomicBool,
    cancel_reason: Mutex<Option<CancelReason>>,
    workers_left: AtomicUsize,
    progress: Mutex<ProgressClock>,
    deadline: Option<Instant>,
}

struct ProgressClock {
    last_emit: Instant,
    last_count: u32,
}

/// Shared index queue issuing 1..=N ascending, with one re-queue grace per
/// index.
struct WorkQueue {
    pending: VecDeque<u32>,
    requeued: HashSet<u32>,
}

impl WorkQueue {
    fn new(total: u32) -> Self {
        Self {
            pending: (1..=total).collect(),
            requeued: HashSet::new(),
        }
    }

    fn pop(&mut self) -> Option<u32> {
        self.pending.pop_front()
    }

    fn requeue(&mut self, index: u32) -> bool {
        if self.requeued.insert(index) {
            self.pending.push_back(index);
            true
        } else {
            false
        }
    }
}

impl RunShared {
    fn request_cancel(&self, reason: CancelReason) {
        if !self.cancelled.swap(true, Ordering::SeqCst) {
            *self.cancel_reason.lock() = Some(reason);
        }
        self.stop.store(true, Ordering::SeqCst);
        self.queue.stop_producers();
    }

    /// Stop check hit at every suspension point; promotes an expired
    /// deadline into a timeout cancellation.
    fn should_stop(&self) -> bool {
        if self.stop.load(Ordering::SeqCst) {
            return true;
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                self.request_cancel(CancelReason::Timeout);
                return true;
            }
        }
        false
    }

    /// Surface a fatal error exactly once; cancellation takes precedence.
    fn fail(&self, err: ForgeError) {
        if self.cancelled.load(Ordering::SeqCst) {
            return;
        }
        if !self.failed.swap(true, Ordering::SeqCst) {
            warn!(error = %err, "run failed");
            self.queue.push(Event::Error(err));
            self.stop.store(true, Ordering::SeqCst);
            self.queue.stop_producers();
        }
    }

    fn worker_done(&self) {
        if self.workers_left.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.finalize();
        }
    }

    /// Last worker out emits the terminal event and closes the stream.
    fn finalize(&self) {
        if self.failed.load(Ordering::SeqCst) {
            self.queue.close();
            return;
        }
        if self.cancelled.load(Ordering::SeqCst) {
            let reason = (*self.cancel_reason.lock()).unwrap_or(CancelReason::Requested);
            self.queue.push(Event::Cancelled {
                completed: self.completed.load(Ordering::SeqCst),
                reason,
            });
            self.queue.close();
            return;
        }

        let recorded = std::mem::take(&mut *self.recorded.lock());
        let items: Vec<(u32, Vec<usize>)> = recorded
            .into_iter()
            .enumerate()
            .filter_map(|(i, a)| a.map(|a| (i as u32 + 1, a)))
            .collect();
        match rarity::build_summary(&self.compiled, &items) {
            Ok(summary) => self.queue.push(Event::Complete(Box::new(summary))),
            Err(err) => self.queue.push(Event::Error(err)),
        }
        self.queue.close();
    }

    /// Throttled progress: at most every 50 ms or every 10 items.
    fn maybe_progress(&self) {
        let total = self.compiled.target_count;
        let mut clock = self.progress.lock();
        // Read under the lock: `last_count` only ever holds a value some
        // worker loaded from `completed`, so this load cannot be behind it.
        let completed = self.completed.load(Ordering::SeqCst);
        let due = completed - clock.last_count >= PROGRESS_ITEM_STRIDE
            || clock.last_emit.elapsed() >= PROGRESS_INTERVAL
            || completed == total;
        if !due {
            return;
        }
        clock.last_count = completed;
        clock.last_emit = Instant::now();
        // Emitted while still holding the clock lock so `completed` values
        // on the stream stay monotonic across workers.
        self.queue.push(Event::Progress {
            completed,
            total,
            memory_used_bytes: self.queue.used_bytes(),
        });
    }

    /// Remove a trait from play for the rest of the run (decode failure).
    /// Errors when its layer has nothing left.
    fn poison(&self, trait_id: TraitId) -> Result<()> {
        let located = self.compiled.layers.iter().enumerate().find_map(|(li, l)| {
            l.traits
                .iter()
                .position(|t| t.id == trait_id)
                .map(|ti| (li, ti))
        });
        let Some((li, ti)) = located else {
            return Ok(());
        };

        let mut poisoned = self.poisoned.lock();
        poisoned.insert((li, ti));
        let alive =
            self.compiled.trait_count(li) - poisoned.iter().filter(|&&(l, _)| l == li).count();
        if alive == 0 {
            return Err(ForgeError::Infeasible {
                requested: u64::from(self.compiled.target_count),
                upper_bound: self.ledger.committed_count() as u128,
            });
        }
        Ok(())
    }
}

enum ItemFlow {
    Produced,
    Requeued,
    Stopped,
}

fn worker_loop(shared: &RunShared, worker_index: usize) {
    // Deterministic per-worker stream: request seed XOR worker index.
    let mut rng = StdRng::seed_from_u64(shared.compiled.seed ^ worker_index as u64);
    loop {
        if shared.should_stop() {
            break;
        }
        let Some(index) = shared.work.lock().pop() else {
            break;
        };
        match generate_item(shared, index, &mut rng) {
            Ok(ItemFlow::Produced | ItemFlow::Requeued) => {}
            Ok(ItemFlow::Stopped) => break,
            Err(err) => {
                shared.fail(err);
                break;
            }
        }
    }
    shared.worker_done();
}

fn generate_item(shared: &RunShared, index: u32, rng: &mut StdRng) -> Result<ItemFlow> {
    let compiled = shared.compiled.as_ref();
    let mut attempts = 0u32;

    loop {
        if shared.should_stop() {
            return Ok(ItemFlow::Stopped);
        }
        attempts += 1;
        if attempts > ITEM_RETRY_LIMIT {
            let message = format!("retry exhausted at index {index}");
            warn!("{message}");
            shared.queue.push(Event::Warning { message });
            if shared.work.lock().requeue(index) {
                return Ok(ItemFlow::Requeued);
            }
            return Err(ForgeError::Infeasible {
                requested: u64::from(compiled.target_count),
                upper_bound: shared.ledger.committed_count() as u128,
            });
        }

        let poisoned = shared.poisoned.lock().clone();
        let assignment = match solve::solve(compiled, &shared.ledger, &poisoned, rng) {
            Ok(assignment) => assignment,
            Err(ForgeError::SolverExhausted { budget }) => {
                warn!(index, budget, "solver exhausted, retrying");
                continue;
            }
            Err(err) => return Err(err),
        };

        let Some(token) = shared.ledger.reserve(&assignment) else {
            debug!(index, "lost a reservation race, re-solving");
            continue;
        };

        if shared.should_stop() {
            shared.ledger.release(token, false);
            return Ok(ItemFlow::Stopped);
        }

        let png_bytes = match composite::render(compiled, &assignment, &shared.cache) {
            Ok(bytes) => bytes,
            Err(ForgeError::DecodeFailure { trait_id, reason }) => {
                shared.ledger.release(token, false);
                let message = format!("trait {trait_id} dropped after decode failure: {reason}");
                warn!("{message}");
                shared.queue.push(Event::Warning { message });
                shared.poison(trait_id)?;
                continue;
            }
            Err(err) => {
                shared.ledger.release(token, false);
                return Err(err);
            }
        };

        // In-flight items are dropped on cancellation, not emitted.
        if shared.should_stop() {
            shared.ledger.release(token, false);
            return Ok(ItemFlow::Stopped);
        }

        shared.ledger.release(token, true);

        let bytes = png_bytes.len() as u64;
        let attributes = rarity::attributes(compiled, &assignment);
        match shared.queue.push_item(
            Event::ItemReady(GeneratedItem {
                index,
                png_bytes,
                attributes,
            }),
            bytes,
        ) {
            Ok(()) => {}
            Err(PushError::Cancelled) => return Ok(ItemFlow::Stopped),
            Err(PushError::OverBudget { item_bytes }) => {
                return Err(ForgeError::MemoryBudgetExceeded {
                    item_bytes,
                    budget_bytes: compiled.memory_budget_bytes,
                });
            }
        }

        shared.recorded.lock()[(index - 1) as usize] = Some(assignment);
        shared.completed.fetch_add(1, Ordering::SeqCst);
        shared.maybe_progress();
        return Ok(ItemFlow::Produced);
    }
}
