use super::{Decoder, DecoderEvent, DecoderState, MAX_VOLUME};
use crate::error::{PlaybackError, Result};
use rodio::Source;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

#[derive(Debug)]
pub struct NullDecoder {
    source: Option<PathBuf>,
    state: DecoderState,
    volume: u8,
    started_at: Option<Instant>,
    position_offset: Duration,
    duration: Option<Duration>,
    last_reported: Duration,
    events: Vec<DecoderEvent>,
}

impl NullDecoder {
    pub fn new() -> Self {
        Self {
            source: None,
            state: DecoderState::Stopped,
            volume: MAX_VOLUME,
            started_at: None,
            position_offset: Duration::ZERO,
            duration: None,
            last_reported: Duration::ZERO,
            events: Vec::new(),
        }
    }

    fn estimate_duration(path: &Path) -> Option<Duration> {
        let file = File::open(path).ok()?;
        let source = rodio::Decoder::try_from(file).ok()?;
        source
            .total_duration()
            .filter(|duration| !duration.is_zero())
    }

    fn current_position(&self) -> Duration {
        let mut position = self.position_offset;
        if self.state == DecoderState::Playing
            && let Some(started_at) = self.started_at
        {
            position = position.saturating_add(started_at.elapsed());
        }
        if let Some(duration) = self.duration {
            return position.min(duration);
        }
        position
    }

    fn set_state(&mut self, state: DecoderState) {
        if self.state != state {
            self.state = state;
            self.events.push(DecoderEvent::StateChanged(state));
        }
    }
}

impl Default for NullDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl Decoder for NullDecoder {
    fn load(&mut self, path: &Path) -> Result<()> {
        self.source = Some(path.to_path_buf());
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.last_reported = Duration::ZERO;
        self.duration = Self::estimate_duration(path);
        self.set_state(DecoderState::Stopped);
        if let Some(duration) = self.duration {
            self.events.push(DecoderEvent::DurationChanged(duration));
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.source = None;
        self.duration = None;
        self.started_at = None;
        self.position_offset = Duration::ZERO;
        self.set_state(DecoderState::Stopped);
    }

    fn play(&mut self) {
        if self.source.is_none() || self.state == DecoderState::Playing {
            return;
        }
        self.started_at = Some(Instant::now());
        self.set_state(DecoderState::Playing);
    }

    fn pause(&mut self) {
        if self.source.is_none() {
            return;
        }
        self.position_offset = self.current_position();
        self.started_at = None;
        self.set_state(DecoderState::Paused);
    }

    fn stop(&mut self) {
        self.position_offset = Duration::ZERO;
        self.started_at = None;
        self.set_state(DecoderState::Stopped);
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.source.is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }

        self.position_offset = self
            .duration
            .map_or(position, |duration| position.min(duration));
        self.started_at = (self.state == DecoderState::Playing).then(Instant::now);
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
    }

    fn volume(&self) -> u8 {
        self.volume
    }

    fn state(&self) -> DecoderState {
        self.state
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn position(&self) -> Duration {
        self.current_position()
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn poll_events(&mut self) -> Vec<DecoderEvent> {
        if self.source.is_some() {
            let position = self.current_position();
            if position != self.last_reported {
                self.last_reported = position;
                self.events.push(DecoderEvent::PositionChanged(position));
            }

            if self.state == DecoderState::Playing
                && self.duration.is_some_and(|duration| position >= duration)
            {
                self.position_offset = Duration::ZERO;
                self.started_at = None;
                self.set_state(DecoderState::Stopped);
                self.events.push(DecoderEvent::MediaEnded);
            }
        }
        std::mem::take(&mut self.events)
    }
}
