use crate::config;
use crate::crossfade::CROSSFADE_TICK;
use crate::decoder::{AudioOutput, Decoder, NullDecoder, RodioDecoder};
use crate::library::{self, LibraryInspector};
use crate::model::{Artwork, IDLE_COLOR, Rgb, Settings, file_stem_title};
use crate::session::{PlayerEvent, PlayerSession, SessionConfig};
use anyhow::Result;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use std::io::{Stdout, stdout};
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

const SEEK_STEP: Duration = Duration::from_secs(5);
const VOLUME_STEP: u8 = 5;
const REDRAW_INTERVAL: Duration = Duration::from_millis(250);

#[derive(Debug, Default, Clone)]
pub struct StartupOptions {
    pub inputs: Vec<PathBuf>,
    pub crossfade_seconds: Option<u8>,
    pub shuffle: bool,
}

#[derive(Debug, Clone)]
pub struct NowPlaying {
    pub index: Option<usize>,
    pub title: String,
    pub artist: String,
    pub artwork: Option<Artwork>,
    pub color: Rgb,
    pub waveform: Vec<f32>,
    pub playing: bool,
    pub position: Duration,
    pub duration: Option<Duration>,
    pub selected: usize,
    pub status: String,
    pub dirty: bool,
}

impl Default for NowPlaying {
    fn default() -> Self {
        Self {
            index: None,
            title: String::from("No track playing"),
            artist: String::new(),
            artwork: None,
            color: IDLE_COLOR,
            waveform: Vec::new(),
            playing: false,
            position: Duration::ZERO,
            duration: None,
            selected: 0,
            status: String::from("Ready"),
            dirty: true,
        }
    }
}

impl NowPlaying {
    pub fn apply(&mut self, event: PlayerEvent) {
        match event {
            PlayerEvent::TrackChanged { index, path } => {
                self.index = Some(index);
                self.selected = index;
                self.title = file_stem_title(&path);
                self.artist = String::from("...");
                self.artwork = None;
                self.waveform.clear();
                self.duration = None;
            }
            PlayerEvent::MetadataReady { title, artist } => {
                self.title = title;
                self.artist = artist;
            }
            PlayerEvent::ArtworkReady(artwork) => self.artwork = artwork,
            PlayerEvent::DominantColorReady(color) => self.color = color,
            PlayerEvent::WaveformReady(values) => self.waveform = values,
            PlayerEvent::QueueHighlight(index) => {
                self.index = index;
                if index.is_none() {
                    self.title = String::from("No track playing");
                    self.artist.clear();
                    self.waveform.clear();
                    self.duration = None;
                }
            }
            PlayerEvent::PlayStateChanged(playing) => self.playing = playing,
            PlayerEvent::PositionChanged(position) => self.position = position,
            PlayerEvent::DurationChanged(duration) => self.duration = Some(duration),
            PlayerEvent::PlaybackFailed(reason) => self.status = format!("playback error: {reason}"),
        }
        self.dirty = true;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    Continue,
    Quit,
}

pub fn run_with_startup(options: StartupOptions) -> Result<()> {
    let mut settings = config::load_settings().unwrap_or_else(|err| {
        tracing::warn!(error = %err, "settings unreadable, using defaults");
        Settings::default()
    });
    if let Some(seconds) = options.crossfade_seconds {
        settings.crossfade_seconds = seconds;
    }
    if options.shuffle {
        settings.shuffle = true;
    }

    let (active, preload) = open_decoders();
    let mut session = PlayerSession::new(
        active,
        preload,
        Arc::new(LibraryInspector),
        SessionConfig {
            volume: settings.volume,
            crossfade_seconds: settings.crossfade_seconds,
            ..SessionConfig::default()
        },
    )?;
    session.set_repeat_mode(settings.repeat);
    session.set_shuffle(settings.shuffle);

    let mut inputs = options.inputs;
    if inputs.is_empty()
        && let Some(folder) = settings.saved_folder.clone()
    {
        inputs.push(folder);
    }
    if let Some(folder) = inputs.iter().find(|input| input.is_dir()) {
        settings.saved_folder = Some(config::normalize_path(folder));
    }
    let tracks = library::collect_tracks(&inputs);
    tracing::info!(inputs = inputs.len(), tracks = tracks.len(), "startup scan finished");

    let mut view = NowPlaying::default();
    session.add_tracks(tracks);

    enable_raw_mode()?;
    let mut out = stdout();
    execute!(out, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(out);
    let mut terminal = Terminal::new(backend)?;
    terminal.clear()?;

    let result = event_loop(&mut terminal, &mut session, &mut view);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    settings.volume = session.volume();
    settings.crossfade_seconds = session.crossfade_seconds();
    settings.shuffle = session.shuffle_enabled();
    settings.repeat = session.repeat_mode();
    let save_result = config::save_settings(&settings);
    result?;
    save_result?;
    Ok(())
}

fn event_loop<D: Decoder>(
    terminal: &mut Terminal<CrosstermBackend<Stdout>>,
    session: &mut PlayerSession<D>,
    view: &mut NowPlaying,
) -> Result<()> {
    let mut last_draw = Instant::now();
    loop {
        session.tick();
        for event in session.take_events() {
            view.apply(event);
        }

        if view.dirty || last_draw.elapsed() > REDRAW_INTERVAL {
            terminal.draw(|frame| crate::ui::draw(frame, session, view))?;
            view.dirty = false;
            last_draw = Instant::now();
        }

        if !event::poll(CROSSFADE_TICK)? {
            continue;
        }

        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }

        if handle_key(session, view, key) == KeyOutcome::Quit {
            return Ok(());
        }
    }
}

fn open_decoders() -> (Box<dyn Decoder>, Box<dyn Decoder>) {
    match AudioOutput::open() {
        Ok(output) => (
            Box::new(RodioDecoder::new(Rc::clone(&output))),
            Box::new(RodioDecoder::new(output)),
        ),
        Err(err) => {
            tracing::warn!(error = %format!("{err:#}"), "no audio output, playing silently");
            (Box::new(NullDecoder::new()), Box::new(NullDecoder::new()))
        }
    }
}

pub fn handle_key<D: Decoder>(
    session: &mut PlayerSession<D>,
    view: &mut NowPlaying,
    key: KeyEvent,
) -> KeyOutcome {
    let len = session.queue().len();
    let outcome = match key.code {
        KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
            return KeyOutcome::Quit;
        }
        KeyCode::Char('q') => return KeyOutcome::Quit,
        KeyCode::Char(' ') => session.toggle_play().map(|()| {
            if session.is_playing() {
                String::from("Playing")
            } else {
                String::from("Paused")
            }
        }),
        KeyCode::Char('n') => session.next().map(|()| String::from("Next track")),
        KeyCode::Char('b') => session.previous().map(|()| String::from("Previous track")),
        KeyCode::Char('s') => {
            let enabled = session.toggle_shuffle();
            Ok(format!("Shuffle {}", if enabled { "on" } else { "off" }))
        }
        KeyCode::Char('r') => {
            let mode = session.cycle_repeat_mode();
            Ok(format!("Repeat {}", mode.label()))
        }
        KeyCode::Char('+') | KeyCode::Char('=') => {
            session.set_volume(session.volume().saturating_add(VOLUME_STEP));
            Ok(format!("Volume: {}%", session.volume()))
        }
        KeyCode::Char('-') => {
            session.set_volume(session.volume().saturating_sub(VOLUME_STEP));
            Ok(format!("Volume: {}%", session.volume()))
        }
        KeyCode::Char(']') => {
            session.set_crossfade_duration(session.crossfade_seconds().saturating_add(1));
            Ok(format!("Crossfade: {}s", session.crossfade_seconds()))
        }
        KeyCode::Char('[') => {
            session.set_crossfade_duration(session.crossfade_seconds().saturating_sub(1));
            Ok(format!("Crossfade: {}s", session.crossfade_seconds()))
        }
        KeyCode::Right => session
            .seek(session.position().saturating_add(SEEK_STEP))
            .map(|()| String::from("Seek +5s")),
        KeyCode::Left => session
            .seek(session.position().saturating_sub(SEEK_STEP))
            .map(|()| String::from("Seek -5s")),
        KeyCode::Down => {
            if len > 0 {
                view.selected = (view.selected + 1).min(len - 1);
            }
            Ok(String::new())
        }
        KeyCode::Up => {
            view.selected = view.selected.saturating_sub(1);
            Ok(String::new())
        }
        KeyCode::Enter => session
            .play_track(view.selected, true, false)
            .map(|()| String::from("Playing selection")),
        KeyCode::Delete | KeyCode::Char('d') => {
            let selected: Vec<PathBuf> = session
                .queue()
                .path(view.selected)
                .map(|path| vec![path.to_path_buf()])
                .unwrap_or_default();
            let removed = session.remove_tracks(&selected).removed;
            view.selected = view.selected.min(session.queue().len().saturating_sub(1));
            Ok(format!("Removed {removed} track(s)"))
        }
        KeyCode::Char('x') => {
            session.clear();
            view.selected = 0;
            Ok(String::from("Playlist cleared"))
        }
        _ => return KeyOutcome::Continue,
    };

    match outcome {
        Ok(status) if status.is_empty() => {}
        Ok(status) => view.status = status,
        Err(err) => view.status = format!("playback error: {err}"),
    }
    view.dirty = true;
    KeyOutcome::Continue
}
