mod null;
mod rodio_backend;

pub use null::NullDecoder;
pub use rodio_backend::{AudioOutput, RodioDecoder};

use crate::config;
use crate::error::Result;
use std::path::Path;
use std::time::Duration;

pub const MAX_VOLUME: u8 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DecoderState {
    Playing,
    Paused,
    #[default]
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecoderEvent {
    PositionChanged(Duration),
    DurationChanged(Duration),
    StateChanged(DecoderState),
    MediaEnded,
}

pub trait Decoder {
    // Leaves the decoder stopped at position zero.
    fn load(&mut self, path: &Path) -> Result<()>;
    fn unload(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn stop(&mut self);
    fn seek(&mut self, position: Duration) -> Result<()>;
    fn set_volume(&mut self, volume: u8);
    fn volume(&self) -> u8;
    fn state(&self) -> DecoderState;
    fn source(&self) -> Option<&Path>;
    fn position(&self) -> Duration;
    fn duration(&self) -> Option<Duration>;
    fn poll_events(&mut self) -> Vec<DecoderEvent>;

    fn is_playing(&self) -> bool {
        self.state() == DecoderState::Playing
    }
}

impl<T: Decoder + ?Sized> Decoder for Box<T> {
    fn load(&mut self, path: &Path) -> Result<()> {
        (**self).load(path)
    }

    fn unload(&mut self) {
        (**self).unload();
    }

    fn play(&mut self) {
        (**self).play();
    }

    fn pause(&mut self) {
        (**self).pause();
    }

    fn stop(&mut self) {
        (**self).stop();
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        (**self).seek(position)
    }

    fn set_volume(&mut self, volume: u8) {
        (**self).set_volume(volume);
    }

    fn volume(&self) -> u8 {
        (**self).volume()
    }

    fn state(&self) -> DecoderState {
        (**self).state()
    }

    fn source(&self) -> Option<&Path> {
        (**self).source()
    }

    fn position(&self) -> Duration {
        (**self).position()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }

    fn poll_events(&mut self) -> Vec<DecoderEvent> {
        (**self).poll_events()
    }
}

#[derive(Debug)]
pub struct DecoderPair<D> {
    active: D,
    preload: D,
}

impl<D: Decoder> DecoderPair<D> {
    pub fn new(active: D, preload: D) -> Self {
        Self { active, preload }
    }

    pub fn active(&self) -> &D {
        &self.active
    }

    pub fn active_mut(&mut self) -> &mut D {
        &mut self.active
    }

    pub fn preload(&self) -> &D {
        &self.preload
    }

    pub fn preload_mut(&mut self) -> &mut D {
        &mut self.preload
    }

    // The retired decoder's queued events are discarded.
    pub fn swap(&mut self) -> &mut D {
        std::mem::swap(&mut self.active, &mut self.preload);
        let _ = self.preload.poll_events();
        &mut self.preload
    }

    pub fn preload_holds(&self, path: &Path) -> bool {
        holds(&self.preload, path)
    }

    pub fn active_holds(&self, path: &Path) -> bool {
        holds(&self.active, path)
    }

    pub fn poll_active_events(&mut self) -> Vec<DecoderEvent> {
        let _ = self.preload.poll_events();
        self.active.poll_events()
    }
}

fn holds<D: Decoder>(decoder: &D, path: &Path) -> bool {
    decoder
        .source()
        .is_some_and(|source| config::same_track(source, path))
}

fn volume_scale(volume: u8) -> f32 {
    f32::from(volume.min(MAX_VOLUME)) / f32::from(MAX_VOLUME)
}
