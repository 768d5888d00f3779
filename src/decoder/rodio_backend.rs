use super::{Decoder, DecoderEvent, DecoderState, MAX_VOLUME, volume_scale};
use crate::error::{PlaybackError, Result};
use anyhow::Context;
use rodio::Source;
use rodio::cpal::traits::{DeviceTrait, HostTrait};
use rodio::{OutputStream, OutputStreamBuilder, Sink};
#[cfg(unix)]
use std::ffi::CString;
use std::fmt;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::time::Duration;

pub struct AudioOutput {
    stream: OutputStream,
}

impl fmt::Debug for AudioOutput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioOutput").finish_non_exhaustive()
    }
}

impl AudioOutput {
    pub fn open() -> anyhow::Result<Rc<Self>> {
        let mut stream = with_silenced_stderr(open_default_or_fallback)?;
        stream.log_on_drop(false);
        Ok(Rc::new(Self { stream }))
    }
}

fn open_default_or_fallback() -> anyhow::Result<OutputStream> {
    let default_err = match OutputStreamBuilder::from_default_device()
        .context("failed to open default system output stream")
        .and_then(|builder| {
            builder
                .with_error_callback(|_| {})
                .open_stream_or_fallback()
                .context("failed to start default output stream")
        }) {
        Ok(stream) => return Ok(stream),
        Err(err) => err,
    };

    let host = rodio::cpal::default_host();
    let mut candidates: Vec<String> = host
        .output_devices()
        .ok()
        .into_iter()
        .flatten()
        .filter_map(|device| device.name().ok())
        .collect();
    candidates.sort_by_cached_key(|name| {
        let lower = name.to_ascii_lowercase();
        let rank = if lower.contains("pulse") {
            0_u8
        } else if lower.contains("pipewire") {
            1_u8
        } else if lower.contains("default") {
            2_u8
        } else {
            3_u8
        };
        (rank, lower)
    });
    candidates.dedup();

    for candidate in candidates {
        let Some(device) = host
            .output_devices()
            .ok()
            .into_iter()
            .flatten()
            .find(|entry| entry.name().ok().as_deref() == Some(candidate.as_str()))
        else {
            continue;
        };
        let opened = OutputStreamBuilder::from_device(device)
            .context("failed to open fallback output device")
            .and_then(|builder| {
                builder
                    .with_error_callback(|_| {})
                    .open_stream_or_fallback()
                    .context("failed to start fallback output stream")
            });
        if let Ok(stream) = opened {
            tracing::info!(device = %candidate, "using fallback output device");
            return Ok(stream);
        }
    }

    Err(default_err.context("unable to start any audio output stream"))
}

pub struct RodioDecoder {
    output: Rc<AudioOutput>,
    sink: Option<Sink>,
    source: Option<PathBuf>,
    duration: Option<Duration>,
    state: DecoderState,
    volume: u8,
    needs_reload: bool,
    last_reported: Duration,
    events: Vec<DecoderEvent>,
}

impl fmt::Debug for RodioDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RodioDecoder")
            .field("source", &self.source)
            .field("state", &self.state)
            .field("volume", &self.volume)
            .finish_non_exhaustive()
    }
}

impl RodioDecoder {
    pub fn new(output: Rc<AudioOutput>) -> Self {
        Self {
            output,
            sink: None,
            source: None,
            duration: None,
            state: DecoderState::Stopped,
            volume: MAX_VOLUME,
            needs_reload: false,
            last_reported: Duration::ZERO,
            events: Vec::new(),
        }
    }

    fn open_sink(&self, path: &Path) -> Result<(Sink, Option<Duration>)> {
        let file = File::open(path).map_err(|err| PlaybackError::decode_load(path, err))?;
        let source =
            rodio::Decoder::try_from(file).map_err(|err| PlaybackError::decode_load(path, err))?;
        let duration = source.total_duration().filter(|value| !value.is_zero());

        let sink = Sink::connect_new(self.output.stream.mixer());
        sink.pause();
        sink.set_volume(volume_scale(self.volume));
        sink.append(source);
        Ok((sink, duration))
    }

    fn replace_sink(&mut self, sink: Option<Sink>) {
        if let Some(old) = std::mem::replace(&mut self.sink, sink) {
            old.stop();
        }
    }

    fn reload_if_needed(&mut self) -> Result<()> {
        if !self.needs_reload {
            return Ok(());
        }
        let Some(path) = self.source.clone() else {
            return Ok(());
        };
        let (sink, _) = self.open_sink(&path)?;
        self.replace_sink(Some(sink));
        self.needs_reload = false;
        self.last_reported = Duration::ZERO;
        Ok(())
    }

    fn set_state(&mut self, state: DecoderState) {
        if self.state != state {
            self.state = state;
            self.events.push(DecoderEvent::StateChanged(state));
        }
    }
}

impl Decoder for RodioDecoder {
    fn load(&mut self, path: &Path) -> Result<()> {
        let (sink, duration) = self.open_sink(path)?;
        self.replace_sink(Some(sink));
        self.source = Some(path.to_path_buf());
        self.duration = duration;
        self.needs_reload = false;
        self.last_reported = Duration::ZERO;
        self.set_state(DecoderState::Stopped);
        if let Some(duration) = duration {
            self.events.push(DecoderEvent::DurationChanged(duration));
        }
        Ok(())
    }

    fn unload(&mut self) {
        self.replace_sink(None);
        self.source = None;
        self.duration = None;
        self.needs_reload = false;
        self.set_state(DecoderState::Stopped);
    }

    fn play(&mut self) {
        if self.source.is_none() {
            return;
        }
        if let Err(err) = self.reload_if_needed() {
            tracing::warn!(error = %err, "could not reopen source");
            return;
        }
        if let Some(sink) = &self.sink {
            sink.play();
            self.set_state(DecoderState::Playing);
        }
    }

    fn pause(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            self.set_state(DecoderState::Paused);
        }
    }

    fn stop(&mut self) {
        if let Some(sink) = &self.sink {
            sink.pause();
            if sink.try_seek(Duration::ZERO).is_err() {
                self.needs_reload = true;
            }
        }
        self.last_reported = Duration::ZERO;
        self.set_state(DecoderState::Stopped);
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        if self.source.is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }
        if let Err(err) = self.reload_if_needed() {
            return Err(PlaybackError::Seek(err.to_string()));
        }
        let sink = self.sink.as_ref().ok_or(PlaybackError::NoActiveTrack)?;
        sink.try_seek(position)
            .map_err(|err| PlaybackError::Seek(format!("{err:?}")))
    }

    fn set_volume(&mut self, volume: u8) {
        self.volume = volume.min(MAX_VOLUME);
        if let Some(sink) = &self.sink {
            sink.set_volume(volume_scale(self.volume));
        }
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
        if self.needs_reload {
            return Duration::ZERO;
        }
        self.sink.as_ref().map_or(Duration::ZERO, Sink::get_pos)
    }

    fn duration(&self) -> Option<Duration> {
        self.duration
    }

    fn poll_events(&mut self) -> Vec<DecoderEvent> {
        let position = self.position();
        if self.source.is_some() && position != self.last_reported {
            self.last_reported = position;
            self.events.push(DecoderEvent::PositionChanged(position));
        }

        let drained = self.sink.as_ref().is_some_and(Sink::empty);
        if self.state == DecoderState::Playing && drained {
            self.needs_reload = true;
            self.set_state(DecoderState::Stopped);
            self.events.push(DecoderEvent::MediaEnded);
        }

        std::mem::take(&mut self.events)
    }
}

#[cfg(unix)]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    let saved = unsafe { libc::dup(libc::STDERR_FILENO) };
    if saved < 0 {
        return operation();
    }

    let devnull = CString::new("/dev/null")
        .ok()
        .map(|path| unsafe { libc::open(path.as_ptr(), libc::O_WRONLY) })
        .unwrap_or(-1);

    if devnull >= 0 {
        unsafe {
            libc::dup2(devnull, libc::STDERR_FILENO);
            libc::close(devnull);
        }
    }

    let result = operation();

    unsafe {
        libc::dup2(saved, libc::STDERR_FILENO);
        libc::close(saved);
    }

    result
}

#[cfg(not(unix))]
fn with_silenced_stderr<T>(operation: impl FnOnce() -> T) -> T {
    operation()
}
