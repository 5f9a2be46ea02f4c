//! Two-phase work scheduler for the compile batch.
//!
//! Phase one hands out one source file per claim through an atomic cursor.
//! Phase two drains a compile queue that fills as files finish parsing; a
//! worker that runs out of compile jobs while files are still parsing parks
//! on a condvar and re-checks every 100 us as a fallback.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::{Condvar, Mutex};

/// One distinct build to compile: entry `entry` of `file`, permutation
/// `combination`. `slot` indexes the result table.
#[derive(Copy, Clone, Debug)]
pub struct CompileJob {
    pub file: usize,
    pub entry: u16,
    pub combination: u16,
    pub slot: usize,
}

struct State<R> {
    jobs: Vec<CompileJob>,
    next: usize,
    files_done: usize,
    results: Vec<Option<R>>,
}

pub struct Scheduler<R> {
    parse_cursor: AtomicUsize,
    total_files: usize,
    state: Mutex<State<R>>,
    wake: Condvar,
}

impl<R> Scheduler<R> {
    pub fn new(total_files: usize) -> Self {
        Self {
            parse_cursor: AtomicUsize::new(0),
            total_files,
            state: Mutex::new(State {
                jobs: Vec::new(),
                next: 0,
                files_done: 0,
                results: Vec::new(),
            }),
            wake: Condvar::new(),
        }
    }

    /// Claims the next file to parse, or `None` once every file is claimed.
    pub fn next_parse(&self) -> Option<usize> {
        let id = self.parse_cursor.fetch_add(1, Ordering::Relaxed);
        (id < self.total_files).then_some(id)
    }

    /// Marks one file as parsed and queues the compile jobs it produced.
    /// Returns the result slot of the first queued job.
    pub fn finish_parse(
        &self,
        file: usize,
        builds: impl Iterator<Item = (u16, u16)>,
    ) -> usize {
        let mut state = self.state.lock();

        let base = state.jobs.len();

        for (entry, combination) in builds {
            let slot = state.jobs.len();
            state.jobs.push(CompileJob {
                file,
                entry,
                combination,
                slot,
            });
            state.results.push(None);
        }

        state.files_done += 1;
        drop(state);

        self.wake.notify_all();
        base
    }

    /// Claims the next compile job, blocking while more may still be
    /// queued. `None` once every file parsed and the queue drained.
    pub fn next_compile(&self) -> Option<CompileJob> {
        let mut state = self.state.lock();

        loop {
            if state.next < state.jobs.len() {
                let job = state.jobs[state.next];
                state.next += 1;
                return Some(job);
            }

            if state.files_done == self.total_files {
                return None;
            }

            // Fallback poll interval; finish_parse wakes us earlier.
            let _ = self
                .wake
                .wait_for(&mut state, Duration::from_micros(100));
        }
    }

    pub fn store_result(&self, slot: usize, result: R) {
        self.state.lock().results[slot] = Some(result);
    }

    pub fn into_results(self) -> Vec<Option<R>> {
        self.state.into_inner().results
    }
}

#[cfg(test)]
mod tests {
    use super::Scheduler;

    #[test]
    fn test_parse_then_compile() {
        let scheduler: Scheduler<u32> = Scheduler::new(2);

        assert_eq!(scheduler.next_parse(), Some(0));
        assert_eq!(scheduler.next_parse(), Some(1));
        assert_eq!(scheduler.next_parse(), None);

        let base = scheduler.finish_parse(0, [(0u16, 0u16), (0, 1)].into_iter());
        assert_eq!(base, 0);
        scheduler.finish_parse(1, [].into_iter());

        let job = scheduler.next_compile().unwrap();
        assert_eq!((job.file, job.entry, job.combination), (0, 0, 0));
        scheduler.store_result(job.slot, 7);

        let job = scheduler.next_compile().unwrap();
        assert_eq!((job.file, job.combination), (0, 1));
        scheduler.store_result(job.slot, 9);

        assert!(scheduler.next_compile().is_none());
        assert_eq!(scheduler.into_results(), vec![Some(7), Some(9)]);
    }

    #[test]
    fn test_workers_drain_across_threads() {
        let scheduler: Scheduler<usize> = Scheduler::new(8);

        std::thread::scope(|scope| {
            for _ in 0..4 {
                scope.spawn(|| {
                    while let Some(file) = scheduler.next_parse() {
                        scheduler.finish_parse(file, [(file as u16, 0u16)].into_iter());
                    }

                    while let Some(job) = scheduler.next_compile() {
                        scheduler.store_result(job.slot, job.file);
                    }
                });
            }
        });

        let results = scheduler.into_results();
        assert_eq!(results.len(), 8);
        assert!(results.iter().all(Option::is_some));
    }
}
