use crate::analysis::DEFAULT_WAVEFORM_SAMPLES;
use crate::cache::{DEFAULT_CAPACITY, DecodeCache};
use crate::core::{PlayQueue, Removal, ShuffleExhaustion, Transition};
use crate::crossfade::{Crossfade, FadeStep};
use crate::decoder::{Decoder, DecoderEvent, DecoderPair, DecoderState, MAX_VOLUME};
use crate::enrich::{Completed, DEFAULT_WORKERS, EnrichmentPool, Job, JobKind, Outcome};
use crate::error::{PlaybackError, Result};
use crate::generation::{Generation, Generations};
use crate::library::MediaInspector;
use crate::model::{Artwork, IDLE_COLOR, RepeatMode, Rgb, fallback_color};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

pub const UNKNOWN_ARTIST: &str = "Unknown Artist";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub volume: u8,
    pub crossfade_seconds: u8,
    pub cache_capacity: usize,
    pub workers: usize,
    pub waveform_samples: usize,
    pub exhaustion: ShuffleExhaustion,
    pub shuffle_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            volume: 50,
            crossfade_seconds: 0,
            cache_capacity: DEFAULT_CAPACITY,
            workers: DEFAULT_WORKERS,
            waveform_samples: DEFAULT_WAVEFORM_SAMPLES,
            exhaustion: ShuffleExhaustion::default(),
            shuffle_seed: None,
        }
    }
}

#[derive(Debug, Clone)]
pub enum PlayerEvent {
    TrackChanged { index: usize, path: PathBuf },
    MetadataReady { title: String, artist: String },
    ArtworkReady(Option<Artwork>),
    DominantColorReady(Rgb),
    WaveformReady(Vec<f32>),
    QueueHighlight(Option<usize>),
    PlayStateChanged(bool),
    PositionChanged(Duration),
    DurationChanged(Duration),
    PlaybackFailed(String),
}

pub struct PlayerSession<D: Decoder> {
    queue: PlayQueue,
    decoders: DecoderPair<D>,
    generations: Generations,
    crossfade: Crossfade,
    artwork_cache: DecodeCache<Option<Artwork>>,
    color_cache: DecodeCache<Rgb>,
    enrichment: EnrichmentPool,
    durations: HashMap<PathBuf, Duration>,
    events: Vec<PlayerEvent>,
    user_volume: u8,
    waveform_samples: usize,
    position: Duration,
    playing: bool,
}

impl<D: Decoder> PlayerSession<D> {
    pub fn new(
        active: D,
        preload: D,
        inspector: Arc<dyn MediaInspector>,
        config: SessionConfig,
    ) -> anyhow::Result<Self> {
        let mut queue = match config.shuffle_seed {
            Some(seed) => PlayQueue::with_seed(seed),
            None => PlayQueue::new(),
        };
        queue.set_exhaustion(config.exhaustion);

        let user_volume = config.volume.min(MAX_VOLUME);
        let mut decoders = DecoderPair::new(active, preload);
        decoders.active_mut().set_volume(user_volume);
        decoders.preload_mut().set_volume(user_volume);

        Ok(Self {
            queue,
            decoders,
            generations: Generations::new(),
            crossfade: Crossfade::new(config.crossfade_seconds),
            artwork_cache: DecodeCache::new(config.cache_capacity),
            color_cache: DecodeCache::new(config.cache_capacity),
            enrichment: EnrichmentPool::spawn(inspector, config.workers)?,
            durations: HashMap::new(),
            events: Vec::new(),
            user_volume,
            waveform_samples: config.waveform_samples,
            position: Duration::ZERO,
            playing: false,
        })
    }

    pub fn queue(&self) -> &PlayQueue {
        &self.queue
    }

    pub fn decoders(&self) -> &DecoderPair<D> {
        &self.decoders
    }

    pub fn decoders_mut(&mut self) -> &mut DecoderPair<D> {
        &mut self.decoders
    }

    pub fn current_index(&self) -> Option<usize> {
        self.queue.current()
    }

    pub fn current_path(&self) -> Option<&Path> {
        self.queue.current_path()
    }

    pub fn generation(&self) -> Generation {
        self.generations.current()
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_fading(&self) -> bool {
        self.crossfade.is_fading()
    }

    pub fn position(&self) -> Duration {
        self.position
    }

    pub fn volume(&self) -> u8 {
        self.user_volume
    }

    pub fn crossfade_seconds(&self) -> u8 {
        self.crossfade.seconds()
    }

    pub fn repeat_mode(&self) -> RepeatMode {
        self.queue.repeat()
    }

    pub fn shuffle_enabled(&self) -> bool {
        self.queue.shuffle_enabled()
    }

    pub fn track_duration(&self, path: &Path) -> Option<Duration> {
        self.durations.get(path).copied()
    }

    pub fn duration(&self) -> Option<Duration> {
        self.decoders
            .active()
            .duration()
            .or_else(|| self.current_path().and_then(|path| self.track_duration(path)))
    }

    pub fn take_events(&mut self) -> Vec<PlayerEvent> {
        std::mem::take(&mut self.events)
    }

    pub fn play_track(&mut self, index: usize, user_triggered: bool, start_paused: bool) -> Result<()> {
        let len = self.queue.len();
        if index >= len {
            return Err(PlaybackError::InvalidIndex { index, len });
        }

        self.cancel_crossfade();
        let snapshot = self.queue.snapshot();
        self.queue.select(index, user_triggered);
        if let Err(err) = self.start_track(index, start_paused) {
            self.queue.restore(snapshot);
            return Err(self.report_failure(err));
        }
        Ok(())
    }

    pub fn next(&mut self) -> Result<()> {
        self.advance(true)
    }

    pub fn previous(&mut self) -> Result<()> {
        self.cancel_crossfade();
        let snapshot = self.queue.snapshot();
        let Some(target) = self.queue.go_back() else {
            return Ok(());
        };
        if let Err(err) = self.start_track(target, false) {
            self.queue.restore(snapshot);
            return Err(self.report_failure(err));
        }
        Ok(())
    }

    pub fn toggle_play(&mut self) -> Result<()> {
        if self.decoders.active().is_playing() {
            self.cancel_crossfade();
            self.decoders.active_mut().pause();
            self.set_playing(false);
            return Ok(());
        }

        if self.queue.current().is_none() {
            if self.queue.is_empty() {
                return Ok(());
            }
            return self.play_track(0, false, false);
        }

        self.decoders.active_mut().play();
        self.set_playing(true);
        Ok(())
    }

    pub fn toggle_shuffle(&mut self) -> bool {
        let enabled = self.queue.toggle_shuffle();
        tracing::info!(enabled, "shuffle toggled");
        self.preload_next();
        enabled
    }

    pub fn set_shuffle(&mut self, enabled: bool) {
        if self.queue.shuffle_enabled() != enabled {
            self.toggle_shuffle();
        }
    }

    pub fn set_repeat_mode(&mut self, mode: RepeatMode) {
        self.queue.set_repeat(mode);
        self.preload_next();
    }

    pub fn cycle_repeat_mode(&mut self) -> RepeatMode {
        let mode = self.queue.cycle_repeat();
        self.preload_next();
        mode
    }

    pub fn set_crossfade_duration(&mut self, seconds: u8) {
        if self.crossfade.set_duration(seconds).is_some() {
            self.restore_after_fade();
        }
    }

    pub fn seek(&mut self, position: Duration) -> Result<()> {
        if self.queue.current().is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }
        self.cancel_crossfade();
        self.decoders.active_mut().seek(position)?;
        self.position = position;
        self.events.push(PlayerEvent::PositionChanged(position));
        Ok(())
    }

    pub fn set_volume(&mut self, volume: u8) {
        self.user_volume = volume.min(MAX_VOLUME);
        if !self.crossfade.is_fading() {
            self.decoders.active_mut().set_volume(self.user_volume);
            self.decoders.preload_mut().set_volume(self.user_volume);
        }
    }

    pub fn add_tracks<I, P>(&mut self, paths: I) -> usize
    where
        I: IntoIterator<Item = P>,
        P: Into<PathBuf>,
    {
        let was_empty = self.queue.is_empty();
        let added = self.queue.add_tracks(paths);
        if added == 0 {
            return 0;
        }
        tracing::info!(added, total = self.queue.len(), "tracks added");

        self.queue.repair();
        if was_empty {
            let _ = self.play_track(0, false, false);
        } else {
            self.preload_next();
        }
        added
    }

    pub fn remove_tracks(&mut self, paths: &[PathBuf]) -> Removal {
        self.cancel_crossfade();
        let stored: Vec<PathBuf> = paths
            .iter()
            .filter_map(|path| self.queue.position_of(path))
            .filter_map(|index| self.queue.path(index).map(Path::to_path_buf))
            .collect();
        let removal = self.queue.remove_tracks(paths);
        if removal.removed == 0 {
            return removal;
        }
        tracing::info!(removed = removal.removed, removed_current = removal.removed_current, "tracks removed");

        for path in &stored {
            self.artwork_cache.remove(path);
            self.color_cache.remove(path);
            self.durations.remove(path);
        }
        if stored.iter().any(|path| self.decoders.preload_holds(path)) {
            self.decoders.preload_mut().unload();
        }
        self.queue.repair();

        if removal.removed_current {
            let generation = self.generations.stamp();
            tracing::debug!(generation = generation.value(), "current track removed");
            self.decoders.active_mut().unload();
            self.set_playing(false);
            if self.queue.is_empty() {
                self.show_idle();
            } else {
                let _ = self.play_track(0, false, false);
            }
        } else {
            self.events
                .push(PlayerEvent::QueueHighlight(self.queue.current()));
            self.preload_next();
        }
        removal
    }

    pub fn clear(&mut self) {
        self.cancel_crossfade();
        self.queue.clear();
        self.decoders.active_mut().unload();
        self.decoders.preload_mut().unload();
        self.artwork_cache.clear();
        self.color_cache.clear();
        self.durations.clear();
        self.generations.stamp();
        self.set_playing(false);
        self.show_idle();
        tracing::info!("playlist cleared");
    }

    pub fn remaining_time(&self) -> Duration {
        let Some(current) = self.queue.current() else {
            return self
                .queue
                .tracks()
                .iter()
                .filter_map(|path| self.track_duration(path))
                .sum();
        };

        let current_duration = self.duration().unwrap_or_default();
        let position = self.position.min(current_duration);
        let ahead: Duration = self
            .queue
            .upcoming()
            .into_iter()
            .filter(|index| *index != current)
            .filter_map(|index| self.queue.path(index))
            .filter_map(|path| self.track_duration(path))
            .sum();
        current_duration.saturating_sub(position) + ahead
    }

    pub fn on_position_changed(&mut self, position: Duration) {
        self.handle_position(position, Instant::now());
    }

    pub fn on_duration_changed(&mut self, duration: Duration) {
        if let Some(path) = self.queue.current_path().map(Path::to_path_buf) {
            self.durations.insert(path, duration);
        }
        self.events.push(PlayerEvent::DurationChanged(duration));
    }

    pub fn on_state_changed(&mut self, state: DecoderState) {
        if self.crossfade.is_fading() {
            return;
        }
        self.set_playing(state == DecoderState::Playing);
    }

    pub fn on_media_end(&mut self) {
        if self.crossfade.is_fading() {
            return;
        }
        tracing::debug!(index = ?self.queue.current(), "media ended");
        let _ = self.advance(false);
    }

    pub fn tick(&mut self) {
        self.tick_at(Instant::now());
    }

    pub fn tick_at(&mut self, now: Instant) {
        self.pump_decoder_events(now);
        self.step_crossfade(now);
        self.pump_enrichment();
    }

    fn advance(&mut self, user_triggered: bool) -> Result<()> {
        self.cancel_crossfade();
        let snapshot = self.queue.snapshot();
        let Some(transition) = self.queue.advance(user_triggered) else {
            if !user_triggered {
                tracing::info!("end of queue");
                self.decoders.active_mut().stop();
                self.position = Duration::ZERO;
                self.set_playing(false);
            }
            return Ok(());
        };

        let result = match transition {
            Transition::Play(index) => self.start_track(index, false),
            Transition::Cue(index) => self.start_track(index, true),
            Transition::Restart(_) => self.rewind_active(true),
            Transition::Rewind(_) => self.rewind_active(false),
        };
        if let Err(err) = result {
            self.queue.restore(snapshot);
            return Err(self.report_failure(err));
        }
        Ok(())
    }

    fn start_track(&mut self, index: usize, start_paused: bool) -> Result<()> {
        let len = self.queue.len();
        let path = self
            .queue
            .path(index)
            .map(Path::to_path_buf)
            .ok_or(PlaybackError::InvalidIndex { index, len })?;

        if self.decoders.preload_holds(&path) {
            tracing::debug!(index, "preload hit");
        } else {
            let idle = self.decoders.preload_mut();
            if let Err(err) = idle.load(&path) {
                idle.unload();
                return Err(err);
            }
        }

        let retired = self.decoders.swap();
        retired.stop();
        retired.set_volume(self.user_volume);

        let active = self.decoders.active_mut();
        active.set_volume(self.user_volume);
        active.stop();
        let _ = active.poll_events();
        if !start_paused {
            active.play();
        }

        self.position = Duration::ZERO;
        let generation = self.generations.stamp();
        tracing::info!(index, %generation, path = %path.display(), paused = start_paused, "track changed");
        self.on_track_changed(index, &path, generation);
        self.set_playing(!start_paused);
        self.preload_next();
        Ok(())
    }

    fn rewind_active(&mut self, play: bool) -> Result<()> {
        if self.decoders.active().source().is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }
        let active = self.decoders.active_mut();
        active.stop();
        if play {
            active.play();
        }
        self.position = Duration::ZERO;
        self.events.push(PlayerEvent::PositionChanged(Duration::ZERO));
        self.set_playing(play);
        Ok(())
    }

    fn on_track_changed(&mut self, index: usize, path: &Path, generation: Generation) {
        self.events.push(PlayerEvent::TrackChanged {
            index,
            path: path.to_path_buf(),
        });
        self.events.push(PlayerEvent::QueueHighlight(Some(index)));
        self.events.push(PlayerEvent::PositionChanged(Duration::ZERO));

        let known = self.decoders.active().duration();
        if let Some(duration) = known {
            self.durations.insert(path.to_path_buf(), duration);
        }
        if let Some(duration) = known.or_else(|| self.track_duration(path)) {
            self.events.push(PlayerEvent::DurationChanged(duration));
        }

        self.dispatch(index, path, JobKind::Metadata);

        match self.artwork_cache.get(path) {
            Some(artwork) => {
                let color = self
                    .color_cache
                    .get(path)
                    .unwrap_or_else(|| fallback_color(index));
                self.events.push(PlayerEvent::ArtworkReady(artwork));
                self.events.push(PlayerEvent::DominantColorReady(color));
            }
            None => {
                self.events
                    .push(PlayerEvent::DominantColorReady(fallback_color(index)));
                self.dispatch(index, path, JobKind::Artwork);
            }
        }

        self.dispatch(
            index,
            path,
            JobKind::Waveform {
                samples: self.waveform_samples,
            },
        );
        tracing::trace!(%generation, "enrichment dispatched");
    }

    fn preload_next(&mut self) {
        if self.crossfade.is_fading() {
            return;
        }
        let Some(next) = self.queue.next_index() else {
            return;
        };
        let Some(path) = self.queue.path(next).map(Path::to_path_buf) else {
            return;
        };

        if !self.decoders.preload_holds(&path) {
            let preload = self.decoders.preload_mut();
            match preload.load(&path) {
                Ok(()) => preload.set_volume(self.user_volume),
                Err(err) => {
                    tracing::debug!(index = next, error = %err, "preload failed");
                    preload.unload();
                }
            }
        }

        if !self.artwork_cache.contains(&path) {
            self.dispatch(next, &path, JobKind::Prefetch);
        }
    }

    fn dispatch(&self, index: usize, path: &Path, kind: JobKind) {
        self.enrichment.dispatch(Job {
            watch: self.generations.watch(),
            index,
            path: path.to_path_buf(),
            kind,
        });
    }

    fn handle_position(&mut self, position: Duration, now: Instant) {
        self.position = position;
        self.events.push(PlayerEvent::PositionChanged(position));

        let playing = self.decoders.active().is_playing();
        if self.crossfade.should_start(playing, position, self.duration()) {
            self.begin_crossfade(now);
        }
    }

    fn begin_crossfade(&mut self, now: Instant) {
        let Some(target) = self.queue.next_index() else {
            return;
        };
        let Some(path) = self.queue.path(target).map(Path::to_path_buf) else {
            return;
        };

        if !self.decoders.preload_holds(&path) {
            let preload = self.decoders.preload_mut();
            if let Err(err) = preload.load(&path) {
                tracing::debug!(index = target, error = %err, "crossfade target did not load");
                preload.unload();
                return;
            }
        }

        let preload = self.decoders.preload_mut();
        preload.set_volume(0);
        preload.play();
        self.crossfade.begin(target, now);
    }

    fn step_crossfade(&mut self, now: Instant) {
        match self.crossfade.step(now, self.user_volume) {
            Some(FadeStep::Ramp(levels)) => {
                self.decoders.active_mut().set_volume(levels.outgoing);
                self.decoders.preload_mut().set_volume(levels.incoming);
            }
            Some(FadeStep::Complete { target }) => self.finalize_crossfade(target),
            None => {}
        }
    }

    fn finalize_crossfade(&mut self, target: usize) {
        let retired = self.decoders.swap();
        retired.stop();
        retired.set_volume(self.user_volume);
        self.decoders.active_mut().set_volume(self.user_volume);

        if !self.queue.commit_crossfade(target) {
            tracing::warn!(target_index = target, "crossfade target vanished");
        }
        let Some(path) = self.queue.path(target).map(Path::to_path_buf) else {
            return;
        };

        self.position = self.decoders.active().position();
        let generation = self.generations.stamp();
        tracing::info!(index = target, %generation, "crossfade finished");
        self.on_track_changed(target, &path, generation);
        self.set_playing(true);
        self.preload_next();
    }

    fn cancel_crossfade(&mut self) {
        if self.crossfade.cancel().is_some() {
            self.restore_after_fade();
        }
    }

    fn restore_after_fade(&mut self) {
        self.decoders.active_mut().set_volume(self.user_volume);
        let preload = self.decoders.preload_mut();
        if preload.is_playing() {
            preload.stop();
        }
        preload.set_volume(self.user_volume);
    }

    fn pump_decoder_events(&mut self, now: Instant) {
        let generation = self.generations.current();
        for event in self.decoders.poll_active_events() {
            match event {
                DecoderEvent::PositionChanged(position) => self.handle_position(position, now),
                DecoderEvent::DurationChanged(duration) => self.on_duration_changed(duration),
                DecoderEvent::StateChanged(state) => self.on_state_changed(state),
                DecoderEvent::MediaEnded => self.on_media_end(),
            }
            // A handler switched tracks; the rest of the batch belongs to the old source.
            if !self.generations.is_current(generation) {
                break;
            }
        }
    }

    fn pump_enrichment(&mut self) {
        for completed in self.enrichment.drain() {
            if !self.generations.is_current(completed.generation) {
                tracing::trace!(generation = %completed.generation, path = %completed.path.display(), "dropping stale result");
                continue;
            }
            self.apply_enrichment(completed);
        }
    }

    fn apply_enrichment(&mut self, completed: Completed) {
        let Completed {
            index, path, outcome, ..
        } = completed;

        match outcome {
            Outcome::Metadata(metadata) => {
                if let Some(duration) = metadata.duration {
                    self.durations.entry(path.clone()).or_insert(duration);
                }
                self.events.push(PlayerEvent::MetadataReady {
                    title: metadata.display_title(&path),
                    artist: metadata
                        .artist
                        .clone()
                        .unwrap_or_else(|| UNKNOWN_ARTIST.to_string()),
                });
            }
            Outcome::Artwork {
                artwork,
                color,
                prefetch,
            } => {
                self.artwork_cache.set(path.clone(), artwork.clone());
                if let Some(color) = color {
                    self.color_cache.set(path, color);
                }
                if !prefetch {
                    self.events.push(PlayerEvent::ArtworkReady(artwork));
                    self.events.push(PlayerEvent::DominantColorReady(
                        color.unwrap_or_else(|| fallback_color(index)),
                    ));
                }
            }
            Outcome::Waveform(values) => self.events.push(PlayerEvent::WaveformReady(values)),
        }
    }

    fn set_playing(&mut self, playing: bool) {
        if self.playing != playing {
            self.playing = playing;
            self.events.push(PlayerEvent::PlayStateChanged(playing));
        }
    }

    fn show_idle(&mut self) {
        self.position = Duration::ZERO;
        self.events.push(PlayerEvent::QueueHighlight(None));
        self.events.push(PlayerEvent::ArtworkReady(None));
        self.events.push(PlayerEvent::DominantColorReady(IDLE_COLOR));
        self.events.push(PlayerEvent::PositionChanged(Duration::ZERO));
    }

    fn report_failure(&mut self, err: PlaybackError) -> PlaybackError {
        tracing::warn!(error = %err, "playback failed");
        self.events.push(PlayerEvent::PlaybackFailed(err.to_string()));
        err
    }
}
