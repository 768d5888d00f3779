use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Generation(u64);

impl Generation {
    pub fn value(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Generation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "gen#{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct Generations {
    live: Arc<AtomicU64>,
}

impl Generations {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stamp(&mut self) -> Generation {
        Generation(self.live.fetch_add(1, Ordering::AcqRel) + 1)
    }

    pub fn current(&self) -> Generation {
        Generation(self.live.load(Ordering::Acquire))
    }

    pub fn is_current(&self, generation: Generation) -> bool {
        self.current() == generation
    }

    pub fn watch(&self) -> GenerationWatch {
        GenerationWatch {
            generation: self.current(),
            live: Arc::clone(&self.live),
        }
    }
}

#[derive(Debug, Clone)]
pub struct GenerationWatch {
    generation: Generation,
    live: Arc<AtomicU64>,
}

impl GenerationWatch {
    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.live.load(Ordering::Acquire) == self.generation.0
    }
}
