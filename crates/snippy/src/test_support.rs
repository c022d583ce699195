use crate::{BASE62, RandSource, Result, TimeSource, UniquenessProbe};
use parking_lot::Mutex;
use portable_atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Replays a fixed script of values, cycling when it runs out.
#[derive(Clone)]
pub struct ScriptedRandom {
    values: Arc<[u32]>,
    next: Arc<AtomicUsize>,
}

impl ScriptedRandom {
    pub fn new(values: impl IntoIterator<Item = u32>) -> Self {
        let values: Arc<[u32]> = values.into_iter().collect();
        assert!(!values.is_empty(), "script must not be empty");
        Self {
            values,
            next: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Script that makes base62 draws spell out `words`, in order.
    pub fn spelling(words: &[&str]) -> Self {
        Self::new(words.iter().flat_map(|word| {
            word.bytes().map(|b| {
                BASE62
                    .iter()
                    .position(|&c| c == b)
                    .expect("character outside base62") as u32
            })
        }))
    }
}

impl RandSource for ScriptedRandom {
    fn below(&self, bound: u32) -> u32 {
        let i = self.next.fetch_add(1, Ordering::Relaxed);
        self.values[i % self.values.len()] % bound.max(1)
    }
}

#[derive(Clone, Copy)]
pub struct FixedClock(pub u64);

impl TimeSource<u64> for FixedClock {
    fn current_millis(&self) -> u64 {
        self.0
    }
}

/// Answers "exists?" from a script, then with `otherwise`.
pub struct ScriptedProbe {
    answers: Mutex<Vec<bool>>,
    otherwise: bool,
    seen: Mutex<Vec<String>>,
}

impl ScriptedProbe {
    pub fn new(answers: impl IntoIterator<Item = bool>, otherwise: bool) -> Self {
        let mut answers: Vec<bool> = answers.into_iter().collect();
        answers.reverse();
        Self {
            answers: Mutex::new(answers),
            otherwise,
            seen: Mutex::new(Vec::new()),
        }
    }

    pub fn always_taken() -> Self {
        Self::new([], true)
    }

    pub fn never_taken() -> Self {
        Self::new([], false)
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().clone()
    }
}

impl UniquenessProbe for ScriptedProbe {
    async fn exists(&self, candidate: &str) -> Result<bool> {
        self.seen.lock().push(candidate.to_owned());
        Ok(self.answers.lock().pop().unwrap_or(self.otherwise))
    }
}
