//! Contiguous completion tracking.

use std::collections::BTreeSet;
use std::sync::Mutex;

#[derive(Debug, Default)]
struct State {
    committed: Option<u64>,
    latest: Option<u64>,
    in_flight: BTreeSet<u64>,
    done: BTreeSet<u64>,
}

/// Tracks dispatched and finished sequence numbers.
///
/// `committed` is the highest finished seq with no unfinished seq below it.
/// It never moves backwards.
#[derive(Debug, Default)]
pub struct SequenceTracker {
    state: Mutex<State>,
}

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start from a previously persisted cursor.
    pub fn resume_from(&self, seq: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.committed = Some(state.committed.map_or(seq, |c| c.max(seq)));
            state.latest = Some(state.latest.map_or(seq, |l| l.max(seq)));
        }
    }

    /// Record that `seq` was handed to a worker.
    pub fn begin(&self, seq: u64) {
        if let Ok(mut state) = self.state.lock() {
            state.in_flight.insert(seq);
            state.latest = Some(state.latest.map_or(seq, |l| l.max(seq)));
        }
    }

    /// Record that `seq` finished, successfully or not.
    pub fn finish(&self, seq: u64) {
        let Ok(mut state) = self.state.lock() else {
            return;
        };
        if !state.in_flight.remove(&seq) {
            return;
        }
        state.done.insert(seq);

        let horizon = state.in_flight.first().copied();
        let ready: Vec<u64> = match horizon {
            Some(h) => state.done.range(..h).copied().collect(),
            None => std::mem::take(&mut state.done).into_iter().collect(),
        };
        for s in &ready {
            state.done.remove(s);
        }
        if let Some(&max) = ready.last() {
            state.committed = Some(state.committed.map_or(max, |c| c.max(max)));
        }
    }

    /// Highest contiguously completed seq.
    pub fn committed(&self) -> Option<u64> {
        self.state.lock().ok().and_then(|s| s.committed)
    }

    /// Highest seq dispatched or resumed from.
    pub fn latest(&self) -> Option<u64> {
        self.state.lock().ok().and_then(|s| s.latest)
    }

    pub fn in_flight(&self) -> usize {
        self.state.lock().map(|s| s.in_flight.len()).unwrap_or(0)
    }
}
