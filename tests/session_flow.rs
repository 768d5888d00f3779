use aurion::decoder::{Decoder, DecoderEvent, DecoderState};
use aurion::error::{PlaybackError, Result};
use aurion::library::MediaInspector;
use aurion::model::{IDLE_COLOR, TrackMetadata};
use aurion::session::{PlayerEvent, PlayerSession, SessionConfig};
use std::cell::RefCell;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_SECONDS: u64 = 180;

fn scripted_length(path: &Path) -> Duration {
    let seconds = path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .and_then(|stem| stem.rsplit_once('-'))
        .and_then(|(_, tail)| tail.parse().ok())
        .unwrap_or(DEFAULT_SECONDS);
    Duration::from_secs(seconds)
}

#[derive(Debug, Default)]
struct Slot {
    source: Option<PathBuf>,
    state: DecoderState,
    volume: u8,
    position: Duration,
    duration: Option<Duration>,
    events: Vec<DecoderEvent>,
    loads: usize,
}

#[derive(Debug, Clone, Default)]
struct FakeDecoder {
    source: Option<PathBuf>,
    slot: Rc<RefCell<Slot>>,
}

impl FakeDecoder {
    fn loads(&self) -> usize {
        self.slot.borrow().loads
    }

    fn inject(&self, event: DecoderEvent) {
        self.slot.borrow_mut().events.push(event);
    }

    fn set_state(&self, state: DecoderState) {
        let mut slot = self.slot.borrow_mut();
        if slot.state != state {
            slot.state = state;
            slot.events.push(DecoderEvent::StateChanged(state));
        }
    }
}

impl Decoder for FakeDecoder {
    fn load(&mut self, path: &Path) -> Result<()> {
        if path.to_string_lossy().contains("corrupt") {
            return Err(PlaybackError::decode_load(path, "bad header"));
        }
        self.source = Some(path.to_path_buf());
        let mut slot = self.slot.borrow_mut();
        slot.source = Some(path.to_path_buf());
        slot.state = DecoderState::Stopped;
        slot.position = Duration::ZERO;
        slot.duration = Some(scripted_length(path));
        slot.loads += 1;
        Ok(())
    }

    fn unload(&mut self) {
        self.source = None;
        let mut slot = self.slot.borrow_mut();
        slot.source = None;
        slot.state = DecoderState::Stopped;
        slot.position = Duration::ZERO;
        slot.duration = None;
    }

    fn play(&mut self) {
        if self.slot.borrow().source.is_some() {
            self.set_state(DecoderState::Playing);
        }
    }

    fn pause(&mut self) {
        if self.slot.borrow().source.is_some() {
            self.set_state(DecoderState::Paused);
        }
    }

    fn stop(&mut self) {
        self.slot.borrow_mut().position = Duration::ZERO;
        self.set_state(DecoderState::Stopped);
    }

    fn seek(&mut self, position: Duration) -> Result<()> {
        let mut slot = self.slot.borrow_mut();
        if slot.source.is_none() {
            return Err(PlaybackError::NoActiveTrack);
        }
        slot.position = position;
        Ok(())
    }

    fn set_volume(&mut self, volume: u8) {
        self.slot.borrow_mut().volume = volume.min(100);
    }

    fn volume(&self) -> u8 {
        self.slot.borrow().volume
    }

    fn state(&self) -> DecoderState {
        self.slot.borrow().state
    }

    fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    fn position(&self) -> Duration {
        self.slot.borrow().position
    }

    fn duration(&self) -> Option<Duration> {
        self.slot.borrow().duration
    }

    fn poll_events(&mut self) -> Vec<DecoderEvent> {
        std::mem::take(&mut self.slot.borrow_mut().events)
    }
}

struct FakeInspector {
    metadata_delay: Duration,
    art_delay: Duration,
    art: Option<Vec<u8>>,
}

impl FakeInspector {
    fn quick() -> Self {
        Self {
            metadata_delay: Duration::ZERO,
            art_delay: Duration::ZERO,
            art: None,
        }
    }
}

impl MediaInspector for FakeInspector {
    fn extract_metadata(&self, path: &Path) -> anyhow::Result<TrackMetadata> {
        thread::sleep(self.metadata_delay);
        let stem = path
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or_default();
        Ok(TrackMetadata {
            title: Some(format!("Title of {stem}")),
            artist: Some(String::from("Fake Artist")),
            duration: Some(scripted_length(path)),
        })
    }

    fn extract_album_art(&self, _path: &Path) -> anyhow::Result<Option<Vec<u8>>> {
        thread::sleep(self.art_delay);
        Ok(self.art.clone())
    }

    fn compute_waveform(&self, _path: &Path, samples: usize) -> anyhow::Result<Vec<f32>> {
        Ok(vec![0.25; samples])
    }
}

struct Harness {
    session: PlayerSession<FakeDecoder>,
    first: FakeDecoder,
    second: FakeDecoder,
}

fn harness(inspector: FakeInspector, config: SessionConfig) -> Harness {
    let first = FakeDecoder::default();
    let second = FakeDecoder::default();
    let session = PlayerSession::new(
        first.clone(),
        second.clone(),
        Arc::new(inspector),
        SessionConfig {
            shuffle_seed: Some(11),
            workers: 1,
            waveform_samples: 16,
            ..config
        },
    )
    .expect("session");
    Harness {
        session,
        first,
        second,
    }
}

fn png_bytes() -> Vec<u8> {
    let mut png = Vec::new();
    image::DynamicImage::ImageRgba8(image::RgbaImage::from_pixel(
        4,
        4,
        image::Rgba([200, 60, 60, 255]),
    ))
    .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
    .expect("encode png");
    png
}

fn pump_until(
    session: &mut PlayerSession<FakeDecoder>,
    done: impl Fn(&[PlayerEvent]) -> bool,
) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + Duration::from_secs(5);
    let mut events = Vec::new();
    while Instant::now() < deadline {
        session.tick();
        events.extend(session.take_events());
        if done(&events) {
            break;
        }
        thread::sleep(Duration::from_millis(5));
    }
    events
}

fn pump_for(session: &mut PlayerSession<FakeDecoder>, window: Duration) -> Vec<PlayerEvent> {
    let deadline = Instant::now() + window;
    let mut events = Vec::new();
    while Instant::now() < deadline {
        session.tick();
        events.extend(session.take_events());
        thread::sleep(Duration::from_millis(5));
    }
    events
}

fn source_of(decoder: &FakeDecoder) -> Option<PathBuf> {
    decoder.slot.borrow().source.clone()
}

#[test]
fn adding_to_empty_playlist_starts_first_track_and_preloads_second() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3", "c.mp3"]);

    assert_eq!(h.session.current_index(), Some(0));
    assert!(h.session.is_playing());
    assert!(h.session.decoders().preload_holds(Path::new("b.mp3")));

    let events = h.session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        PlayerEvent::TrackChanged { index: 0, path } if path == Path::new("a.mp3")
    )));
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::PlayStateChanged(true)))
    );
}

#[test]
fn next_promotes_the_preloaded_decoder_without_reloading() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3", "c.mp3"]);

    // a was cold-loaded into the second slot and swapped in; b went into the first.
    assert_eq!(source_of(&h.second).as_deref(), Some(Path::new("a.mp3")));
    assert_eq!(source_of(&h.first).as_deref(), Some(Path::new("b.mp3")));
    let loads_before = h.first.loads();

    h.session.next().expect("next");

    assert_eq!(h.session.current_index(), Some(1));
    assert_eq!(h.first.loads(), loads_before);
    assert_eq!(h.first.state(), DecoderState::Playing);
    assert_eq!(source_of(&h.second).as_deref(), Some(Path::new("c.mp3")));
    assert_eq!(h.second.state(), DecoderState::Stopped);
}

#[test]
fn failed_load_keeps_the_previous_track_playing() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session
        .add_tracks(["a.mp3", "corrupt.mp3", "c.mp3"]);
    let generation = h.session.generation();
    h.session.take_events();

    let err = h.session.play_track(1, true, false).expect_err("corrupt file");
    assert!(matches!(err, PlaybackError::DecodeLoad { .. }));

    assert_eq!(h.session.current_index(), Some(0));
    assert_eq!(h.session.generation(), generation);
    assert!(h.session.is_playing());
    assert!(h.session.decoders().active_holds(Path::new("a.mp3")));
    let events = h.session.take_events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::PlaybackFailed(_)))
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, PlayerEvent::TrackChanged { .. }))
    );
}

#[test]
fn out_of_range_index_is_rejected() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3"]);
    assert!(matches!(
        h.session.play_track(4, true, false),
        Err(PlaybackError::InvalidIndex { index: 4, len: 1 })
    ));
    assert_eq!(h.session.current_index(), Some(0));
}

fn fading_harness() -> Harness {
    let mut h = harness(
        FakeInspector::quick(),
        SessionConfig {
            volume: 80,
            crossfade_seconds: 2,
            ..SessionConfig::default()
        },
    );
    h.session.add_tracks(["a-100.mp3", "b-100.mp3"]);
    h.session.take_events();
    h.session.on_position_changed(Duration::from_secs(99));
    assert!(h.session.is_fading());
    h
}

#[test]
fn crossfade_keeps_the_volume_sum_and_hands_over() {
    let mut h = fading_harness();
    assert_eq!(h.first.state(), DecoderState::Playing);
    assert_eq!(h.second.state(), DecoderState::Playing);

    h.session.tick_at(Instant::now() + Duration::from_secs(1));
    assert!(h.session.is_fading());
    assert_eq!(h.first.volume() + h.second.volume(), 80);
    assert_eq!(h.session.current_index(), Some(0));

    h.session.tick_at(Instant::now() + Duration::from_secs(3));
    assert!(!h.session.is_fading());
    assert_eq!(h.session.current_index(), Some(1));
    assert!(h.session.decoders().active_holds(Path::new("b-100.mp3")));
    assert_eq!(h.session.decoders().active().volume(), 80);
    assert_eq!(h.session.decoders().preload().state(), DecoderState::Stopped);

    let events = h.session.take_events();
    assert!(events.iter().any(|event| matches!(
        event,
        PlayerEvent::TrackChanged { index: 1, .. }
    )));
}

#[test]
fn media_end_is_ignored_while_fading() {
    let mut h = fading_harness();
    let generation = h.session.generation();

    h.session.on_media_end();
    h.first.inject(DecoderEvent::MediaEnded);
    h.second.inject(DecoderEvent::MediaEnded);
    h.session.tick_at(Instant::now());

    assert!(h.session.is_fading());
    assert_eq!(h.session.current_index(), Some(0));
    assert_eq!(h.session.generation(), generation);
}

#[test]
fn pausing_cancels_the_fade_and_restores_volume() {
    let mut h = fading_harness();
    h.session.tick_at(Instant::now() + Duration::from_secs(1));

    h.session.toggle_play().expect("pause");

    assert!(!h.session.is_fading());
    assert!(!h.session.is_playing());
    assert_eq!(h.session.decoders().active().volume(), 80);
    assert_eq!(h.session.decoders().preload().volume(), 80);
    assert_eq!(h.session.decoders().preload().state(), DecoderState::Stopped);
}

#[test]
fn skipping_during_a_fade_cancels_it() {
    let mut h = fading_harness();
    h.session.tick_at(Instant::now() + Duration::from_secs(1));

    h.session.next().expect("next");

    assert!(!h.session.is_fading());
    assert_eq!(h.session.current_index(), Some(1));
    assert!(h.session.decoders().active_holds(Path::new("b-100.mp3")));
    assert_eq!(h.session.decoders().active().volume(), 80);
    assert_eq!(h.session.decoders().preload().volume(), 80);
    assert_eq!(h.session.decoders().preload().state(), DecoderState::Stopped);
}

#[test]
fn zero_crossfade_duration_cancels_a_running_fade() {
    let mut h = fading_harness();
    h.session.tick_at(Instant::now() + Duration::from_secs(1));

    h.session.set_crossfade_duration(0);

    assert!(!h.session.is_fading());
    assert_eq!(h.session.crossfade_seconds(), 0);
    assert_eq!(h.session.current_index(), Some(0));
    assert_eq!(h.session.decoders().active().volume(), 80);
    assert_eq!(h.session.decoders().preload().volume(), 80);
    assert_eq!(h.session.decoders().preload().state(), DecoderState::Stopped);
}

#[test]
fn media_end_advances_when_not_fading() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3"]);
    h.session.decoders().active().inject(DecoderEvent::MediaEnded);
    h.session.tick();
    assert_eq!(h.session.current_index(), Some(1));

    h.session.decoders().active().inject(DecoderEvent::MediaEnded);
    h.session.tick();
    assert_eq!(h.session.current_index(), Some(1));
    assert!(!h.session.is_playing());
}

#[test]
fn stale_metadata_never_reaches_the_view() {
    let mut h = harness(
        FakeInspector {
            metadata_delay: Duration::from_millis(60),
            ..FakeInspector::quick()
        },
        SessionConfig::default(),
    );
    h.session.add_tracks(["first.mp3", "second.mp3"]);
    h.session.next().expect("next");

    let events = pump_until(&mut h.session, |events| {
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::MetadataReady { .. }))
    });

    let titles: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::MetadataReady { title, .. } => Some(title.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["Title of second"]);
}

#[test]
fn only_the_last_of_quick_changes_reports_enrichment() {
    let mut h = harness(
        FakeInspector {
            metadata_delay: Duration::from_millis(60),
            art_delay: Duration::from_millis(60),
            art: Some(png_bytes()),
        },
        SessionConfig::default(),
    );
    h.session.add_tracks(["a.mp3", "b.mp3", "c.mp3"]);
    h.session.play_track(1, true, false).expect("play b");
    h.session.play_track(2, true, false).expect("play c");
    h.session.take_events();

    let events = pump_until(&mut h.session, |events| {
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::MetadataReady { .. }))
            && events
                .iter()
                .any(|event| matches!(event, PlayerEvent::ArtworkReady(Some(_))))
    });
    let events: Vec<PlayerEvent> = events
        .into_iter()
        .chain(pump_for(&mut h.session, Duration::from_millis(200)))
        .collect();

    let titles: Vec<&str> = events
        .iter()
        .filter_map(|event| match event {
            PlayerEvent::MetadataReady { title, .. } => Some(title.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(titles, vec!["Title of c"]);
    let artworks = events
        .iter()
        .filter(|event| matches!(event, PlayerEvent::ArtworkReady(Some(_))))
        .count();
    assert_eq!(artworks, 1);
    assert_eq!(h.session.current_index(), Some(2));
}

#[test]
fn cached_artwork_is_emitted_without_waiting() {
    let mut h = harness(
        FakeInspector {
            art: Some(png_bytes()),
            ..FakeInspector::quick()
        },
        SessionConfig::default(),
    );
    h.session.add_tracks(["a.mp3", "b.mp3"]);
    let events = pump_until(&mut h.session, |events| {
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::ArtworkReady(Some(_))))
    });
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::ArtworkReady(Some(_))))
    );

    h.session.next().expect("next");
    h.session.previous().expect("previous");
    assert_eq!(h.session.current_index(), Some(0));

    let immediate = h.session.take_events();
    let after_return = immediate
        .iter()
        .rposition(|event| matches!(event, PlayerEvent::TrackChanged { index: 0, .. }))
        .expect("returned to first track");
    assert!(
        immediate[after_return..]
            .iter()
            .any(|event| matches!(event, PlayerEvent::ArtworkReady(Some(_))))
    );
}

#[test]
fn removing_the_current_track_restarts_from_the_top() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3", "c.mp3"]);
    h.session.play_track(1, true, false).expect("play b");

    let removal = h.session.remove_tracks(&[PathBuf::from("b.mp3")]);
    assert_eq!(removal.removed, 1);
    assert!(removal.removed_current);
    assert_eq!(h.session.current_index(), Some(0));
    assert!(h.session.decoders().active_holds(Path::new("a.mp3")));
}

#[test]
fn removing_the_only_track_drops_its_pending_results() {
    let mut h = harness(
        FakeInspector {
            metadata_delay: Duration::from_millis(80),
            ..FakeInspector::quick()
        },
        SessionConfig::default(),
    );
    h.session.add_tracks(["gone.mp3"]);
    let generation = h.session.generation();

    h.session.remove_tracks(&[PathBuf::from("gone.mp3")]);
    assert!(h.session.generation().value() > generation.value());

    let events = pump_for(&mut h.session, Duration::from_millis(300));
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, PlayerEvent::MetadataReady { .. }))
    );
    assert!(
        !events
            .iter()
            .any(|event| matches!(event, PlayerEvent::WaveformReady(_)))
    );
}

#[test]
fn removal_forgets_durations_under_any_spelling_of_the_path() {
    let dir = tempfile::tempdir().expect("tempdir");
    let first = dir.path().join("a-100.mp3");
    let second = dir.path().join("b-200.mp3");
    std::fs::write(&first, b"").expect("write a");
    std::fs::write(&second, b"").expect("write b");
    let name = dir.path().file_name().expect("dir name");
    let detour = dir.path().join("..").join(name).join("a-100.mp3");

    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks([first.clone(), second.clone()]);
    h.session.play_track(1, true, false).expect("play b");
    assert_eq!(
        h.session.track_duration(&first),
        Some(Duration::from_secs(100))
    );

    let removal = h.session.remove_tracks(&[detour]);

    assert_eq!(removal.removed, 1);
    assert_eq!(h.session.track_duration(&first), None);
    assert_eq!(h.session.current_path(), Some(second.as_path()));
}

#[test]
fn removing_other_tracks_remaps_the_current_index() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3", "c.mp3"]);
    h.session.play_track(2, true, false).expect("play c");
    let generation = h.session.generation();

    h.session.remove_tracks(&[PathBuf::from("a.mp3")]);

    assert_eq!(h.session.current_index(), Some(1));
    assert_eq!(h.session.current_path(), Some(Path::new("c.mp3")));
    assert_eq!(h.session.generation(), generation);
}

#[test]
fn removing_everything_shows_idle() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3"]);
    h.session.take_events();

    h.session
        .remove_tracks(&[PathBuf::from("a.mp3"), PathBuf::from("b.mp3")]);

    assert!(h.session.queue().is_empty());
    assert_eq!(h.session.current_index(), None);
    let events = h.session.take_events();
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::QueueHighlight(None)))
    );
    assert!(
        events
            .iter()
            .any(|event| matches!(event, PlayerEvent::DominantColorReady(color) if *color == IDLE_COLOR))
    );
}

#[test]
fn clear_stops_everything_and_invalidates_work() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session.add_tracks(["a.mp3", "b.mp3"]);
    let generation = h.session.generation();

    h.session.clear();

    assert!(h.session.queue().is_empty());
    assert!(!h.session.is_playing());
    assert!(h.session.generation().value() > generation.value());
    assert_eq!(source_of(&h.first), None);
    assert_eq!(source_of(&h.second), None);
}

#[test]
fn remaining_time_counts_current_and_upcoming_tracks() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    h.session
        .add_tracks(["a-100.mp3", "b-200.mp3", "c-300.mp3"]);
    h.session.play_track(2, true, false).expect("c");
    h.session.play_track(1, true, false).expect("b");
    h.session.play_track(0, true, false).expect("a");

    h.session.on_position_changed(Duration::from_secs(40));

    assert_eq!(h.session.remaining_time(), Duration::from_secs(60 + 200 + 300));
}

#[test]
fn seek_moves_the_active_decoder() {
    let mut h = harness(FakeInspector::quick(), SessionConfig::default());
    assert!(matches!(
        h.session.seek(Duration::from_secs(5)),
        Err(PlaybackError::NoActiveTrack)
    ));

    h.session.add_tracks(["a.mp3"]);
    h.session.seek(Duration::from_secs(42)).expect("seek");
    assert_eq!(h.session.position(), Duration::from_secs(42));
    assert_eq!(h.session.decoders().active().position(), Duration::from_secs(42));
}
