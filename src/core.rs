use crate::config;
use crate::model::RepeatMode;
use rand::SeedableRng;
use rand::rngs::SmallRng;
use rand::seq::SliceRandom;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShuffleExhaustion {
    #[default]
    ReplayAnchor,
    Stop,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShuffleState {
    pub enabled: bool,
    pub pool: Vec<usize>,
    pub history: Vec<usize>,
    pub anchor: Option<usize>,
    pub seeded: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    Play(usize),
    Cue(usize),
    Restart(usize),
    Rewind(usize),
}

impl Transition {
    pub fn index(self) -> usize {
        match self {
            Self::Play(index) | Self::Cue(index) | Self::Restart(index) | Self::Rewind(index) => {
                index
            }
        }
    }

    pub fn changes_track(self) -> bool {
        matches!(self, Self::Play(_) | Self::Cue(_))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueSnapshot {
    current: Option<usize>,
    shuffle: ShuffleState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Removal {
    pub removed: usize,
    pub removed_current: bool,
}

#[derive(Debug)]
pub struct PlayQueue {
    tracks: Vec<PathBuf>,
    lookup: HashMap<String, usize>,
    current: Option<usize>,
    repeat: RepeatMode,
    shuffle: ShuffleState,
    exhaustion: ShuffleExhaustion,
    rng: SmallRng,
}

impl Default for PlayQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl PlayQueue {
    pub fn new() -> Self {
        Self::with_rng(SmallRng::from_rng(&mut rand::rng()))
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(SmallRng::seed_from_u64(seed))
    }

    fn with_rng(rng: SmallRng) -> Self {
        Self {
            tracks: Vec::new(),
            lookup: HashMap::new(),
            current: None,
            repeat: RepeatMode::Off,
            shuffle: ShuffleState::default(),
            exhaustion: ShuffleExhaustion::default(),
            rng,
        }
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    pub fn tracks(&self) -> &[PathBuf] {
        &self.tracks
    }

    pub fn path(&self, index: usize) -> Option<&Path> {
        self.tracks.get(index).map(PathBuf::as_path)
    }

    pub fn position_of(&self, path: &Path) -> Option<usize> {
        self.lookup.get(&config::path_key(path)).copied()
    }

    pub fn current(&self) -> Option<usize> {
        self.current
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.path(self.current?)
    }

    pub fn repeat(&self) -> RepeatMode {
        self.repeat
    }

    pub fn shuffle(&self) -> &ShuffleState {
        &self.shuffle
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.shuffle.enabled
    }

    pub fn exhaustion(&self) -> ShuffleExhaustion {
        self.exhaustion
    }

    pub fn set_exhaustion(&mut self, exhaustion: ShuffleExhaustion) {
        self.exhaustion = exhaustion;
    }

    pub fn add_tracks<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let mut added = 0;
        for path in paths {
            let path = config::strip_windows_verbatim_prefix(&path.into());
            let key = config::path_key(&path);
            if self.lookup.contains_key(&key) {
                continue;
            }
            self.lookup.insert(key, self.tracks.len());
            self.tracks.push(path);
            added += 1;
        }
        added
    }

    pub fn remove_tracks(&mut self, paths: &[PathBuf]) -> Removal {
        let doomed: HashSet<String> = paths.iter().map(|path| config::path_key(path)).collect();
        if doomed.is_empty() {
            return Removal::default();
        }

        let old = std::mem::take(&mut self.tracks);
        let mut remap = Vec::with_capacity(old.len());
        let mut removed = 0;
        for path in old {
            if doomed.contains(&config::path_key(&path)) {
                remap.push(None);
                removed += 1;
            } else {
                remap.push(Some(self.tracks.len()));
                self.tracks.push(path);
            }
        }

        let moved = |index: usize| remap.get(index).copied().flatten();
        let removed_current = self.current.is_some_and(|current| moved(current).is_none());
        self.current = self.current.and_then(moved);
        self.shuffle.anchor = self.shuffle.anchor.and_then(moved);
        self.shuffle.pool = self.shuffle.pool.iter().filter_map(|i| moved(*i)).collect();
        self.shuffle.history = self
            .shuffle
            .history
            .iter()
            .filter_map(|i| moved(*i))
            .collect();
        self.lookup = build_lookup(&self.tracks);

        Removal {
            removed,
            removed_current,
        }
    }

    pub fn clear(&mut self) {
        self.tracks.clear();
        self.lookup.clear();
        self.current = None;
        self.shuffle.pool.clear();
        self.shuffle.history.clear();
        self.shuffle.anchor = None;
        self.shuffle.seeded = false;
    }

    // Required after every playlist mutation.
    pub fn repair(&mut self) {
        let len = self.tracks.len();
        if let Some(current) = self.current
            && current >= len
        {
            self.current = len.checked_sub(1);
        }

        let current = self.current;
        self.shuffle
            .pool
            .retain(|index| *index < len && Some(*index) != current);
        self.shuffle.history.retain(|index| *index < len);
        if self.shuffle.anchor.is_some_and(|anchor| anchor >= len) {
            self.shuffle.anchor = None;
        }
        self.reseed(true, true);
    }

    pub fn snapshot(&self) -> QueueSnapshot {
        QueueSnapshot {
            current: self.current,
            shuffle: self.shuffle.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: QueueSnapshot) {
        self.current = snapshot.current;
        self.shuffle = snapshot.shuffle;
        self.repair_bounds();
    }

    pub fn select(&mut self, index: usize, user_triggered: bool) -> bool {
        if index >= self.tracks.len() {
            return false;
        }

        self.current = Some(index);
        if self.shuffle.enabled {
            self.shuffle.pool.retain(|queued| *queued != index);
            if user_triggered || self.shuffle.anchor.is_none() {
                self.shuffle.anchor = Some(index);
            }
            if user_triggered {
                self.reseed(true, true);
            }
        }
        true
    }

    // Never pops the shuffle pool; repeated calls agree until a transition.
    pub fn next_index(&mut self) -> Option<usize> {
        if self.tracks.is_empty() {
            return None;
        }
        let current = self.current?;

        if self.repeat == RepeatMode::One {
            return Some(current);
        }

        if self.shuffle.enabled {
            let allow_reseed = !self.shuffle.seeded || self.repeat == RepeatMode::All;
            self.prepare_pool(allow_reseed);
            return self.shuffle.pool.last().copied();
        }

        self.linear_next(current)
    }

    pub fn advance(&mut self, user_triggered: bool) -> Option<Transition> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        let Some(current) = self.current else {
            let first = if self.shuffle.enabled {
                self.reseed(false, true);
                self.shuffle.pool.pop()?
            } else {
                0
            };
            self.select(first, false);
            return Some(Transition::Play(first));
        };

        if self.repeat == RepeatMode::One {
            return Some(Transition::Restart(current));
        }

        if !self.shuffle.enabled {
            let target = self.linear_next(current)?;
            self.select(target, false);
            return Some(Transition::Play(target));
        }

        if len == 1 {
            return Some(if self.repeat == RepeatMode::All {
                Transition::Restart(current)
            } else {
                Transition::Rewind(current)
            });
        }

        if !self.shuffle.seeded {
            self.reseed(true, false);
        }
        self.prepare_pool(false);

        if self.shuffle.pool.is_empty() {
            self.shuffle.history.clear();
            if self.repeat == RepeatMode::All {
                self.reseed(true, true);
            } else {
                return self.replay_from_anchor(user_triggered);
            }
        }

        let target = self.shuffle.pool.pop()?;
        self.shuffle.history.push(current);
        self.select(target, false);
        Some(Transition::Play(target))
    }

    pub fn go_back(&mut self) -> Option<usize> {
        let len = self.tracks.len();
        if len == 0 {
            return None;
        }

        let mut target = None;
        if self.shuffle.enabled {
            while let Some(previous) = self.shuffle.history.pop() {
                if previous < len {
                    target = Some(previous);
                    break;
                }
            }
        }

        let target = target.unwrap_or(match self.current {
            Some(current) => (current + len - 1) % len,
            None => len - 1,
        });
        self.select(target, false);
        Some(target)
    }

    pub fn commit_crossfade(&mut self, target: usize) -> bool {
        let previous = self.current;
        if previous == Some(target) {
            return target < self.tracks.len();
        }

        if self.shuffle.enabled {
            if self.shuffle.pool.last() == Some(&target) {
                self.shuffle.pool.pop();
            } else {
                self.shuffle.pool.retain(|queued| *queued != target);
            }
            if let Some(previous) = previous {
                self.shuffle.history.push(previous);
            }
        }
        self.select(target, false)
    }

    pub fn reseed(&mut self, preserve_current: bool, reset_history: bool) {
        if reset_history {
            self.shuffle.history.clear();
        }
        if !self.shuffle.enabled || self.tracks.is_empty() {
            self.shuffle.pool.clear();
            self.shuffle.seeded = false;
            self.shuffle.anchor = None;
            return;
        }

        let skip = if preserve_current { self.current } else { None };
        let mut indices: Vec<usize> = (0..self.tracks.len())
            .filter(|index| Some(*index) != skip)
            .collect();
        indices.shuffle(&mut self.rng);
        self.shuffle.pool = indices;
        self.shuffle.seeded = true;
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        self.set_shuffle(!self.shuffle.enabled);
        self.shuffle.enabled
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        self.shuffle.enabled = enabled;
        if enabled {
            self.shuffle.anchor = self.current;
            self.reseed(true, true);
        } else {
            self.shuffle.history.clear();
            self.shuffle.pool.clear();
            self.shuffle.seeded = false;
            self.shuffle.anchor = None;
        }
    }

    pub fn set_repeat(&mut self, mode: RepeatMode) {
        self.repeat = mode;
    }

    pub fn cycle_repeat(&mut self) -> RepeatMode {
        self.repeat = self.repeat.next();
        self.repeat
    }

    pub fn upcoming(&self) -> Vec<usize> {
        let Some(current) = self.current else {
            return (0..self.tracks.len()).collect();
        };
        if self.shuffle.enabled {
            return self
                .shuffle
                .pool
                .iter()
                .copied()
                .filter(|index| *index < self.tracks.len() && *index != current)
                .collect();
        }
        ((current + 1)..self.tracks.len()).collect()
    }

    fn linear_next(&self, current: usize) -> Option<usize> {
        let next = current + 1;
        if next < self.tracks.len() {
            Some(next)
        } else if self.repeat == RepeatMode::All {
            Some(0)
        } else {
            None
        }
    }

    fn prepare_pool(&mut self, allow_reseed: bool) {
        if !self.shuffle.enabled {
            self.shuffle.pool.clear();
            self.shuffle.seeded = false;
            self.shuffle.anchor = None;
            return;
        }

        let len = self.tracks.len();
        let current = self.current;
        self.shuffle
            .pool
            .retain(|index| *index < len && Some(*index) != current);

        if self.shuffle.pool.is_empty() && allow_reseed {
            self.reseed(true, false);
        }
    }

    fn replay_from_anchor(&mut self, user_triggered: bool) -> Option<Transition> {
        if self.exhaustion == ShuffleExhaustion::Stop {
            return None;
        }

        let target = match self.shuffle.anchor.filter(|anchor| *anchor < self.tracks.len()) {
            Some(anchor) => anchor,
            None => {
                self.shuffle.anchor = Some(0);
                0
            }
        };
        self.select(target, false);
        self.reseed(true, true);
        Some(if user_triggered {
            Transition::Play(target)
        } else {
            Transition::Cue(target)
        })
    }

    fn repair_bounds(&mut self) {
        let len = self.tracks.len();
        if self.current.is_some_and(|current| current >= len) {
            self.current = None;
        }
        let current = self.current;
        self.shuffle
            .pool
            .retain(|index| *index < len && Some(*index) != current);
        self.shuffle.history.retain(|index| *index < len);
    }
}

fn build_lookup(tracks: &[PathBuf]) -> HashMap<String, usize> {
    let mut map = HashMap::with_capacity(tracks.len());
    for (idx, track) in tracks.iter().enumerate() {
        map.insert(config::path_key(track), idx);
    }
    map
}
