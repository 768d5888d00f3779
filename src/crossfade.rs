use std::time::{Duration, Instant};

pub const CROSSFADE_TICK: Duration = Duration::from_millis(30);
pub const START_MARGIN: Duration = Duration::from_millis(200);
pub const MAX_CROSSFADE_SECONDS: u8 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CrossfadeSession {
    pub target: usize,
    pub started_at: Instant,
    pub duration: Duration,
}

impl CrossfadeSession {
    pub fn ratio(&self, now: Instant) -> f64 {
        if self.duration.is_zero() {
            return 1.0;
        }
        let elapsed = now.saturating_duration_since(self.started_at);
        (elapsed.as_secs_f64() / self.duration.as_secs_f64()).min(1.0)
    }
}

// outgoing + incoming always equals the user volume.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FadeLevels {
    pub outgoing: u8,
    pub incoming: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeStep {
    Ramp(FadeLevels),
    Complete { target: usize },
}

pub fn fade_levels(user_volume: u8, ratio: f64) -> FadeLevels {
    let ratio = ratio.clamp(0.0, 1.0);
    let incoming = (f64::from(user_volume) * ratio).round() as u8;
    FadeLevels {
        outgoing: user_volume - incoming.min(user_volume),
        incoming: incoming.min(user_volume),
    }
}

#[derive(Debug, Default)]
pub struct Crossfade {
    duration: Duration,
    session: Option<CrossfadeSession>,
}

impl Crossfade {
    pub fn new(seconds: u8) -> Self {
        let mut crossfade = Self::default();
        crossfade.set_duration(seconds);
        crossfade
    }

    pub fn duration(&self) -> Duration {
        self.duration
    }

    pub fn seconds(&self) -> u8 {
        self.duration.as_secs() as u8
    }

    pub fn is_enabled(&self) -> bool {
        !self.duration.is_zero()
    }

    pub fn set_duration(&mut self, seconds: u8) -> Option<CrossfadeSession> {
        let seconds = seconds.min(MAX_CROSSFADE_SECONDS);
        self.duration = Duration::from_secs(u64::from(seconds));
        if seconds == 0 { self.cancel() } else { None }
    }

    pub fn session(&self) -> Option<&CrossfadeSession> {
        self.session.as_ref()
    }

    pub fn is_fading(&self) -> bool {
        self.session.is_some()
    }

    pub fn target(&self) -> Option<usize> {
        self.session.map(|session| session.target)
    }

    pub fn should_start(
        &self,
        active_playing: bool,
        position: Duration,
        track_duration: Option<Duration>,
    ) -> bool {
        if !self.is_enabled() || self.is_fading() || !active_playing {
            return false;
        }
        let Some(track_duration) = track_duration.filter(|value| !value.is_zero()) else {
            return false;
        };
        let remaining = track_duration.saturating_sub(position);
        remaining <= self.duration + START_MARGIN
    }

    pub fn begin(&mut self, target: usize, now: Instant) -> CrossfadeSession {
        let session = CrossfadeSession {
            target,
            started_at: now,
            duration: self.duration,
        };
        self.session = Some(session);
        tracing::debug!(target_index = target, duration = ?self.duration, "crossfade started");
        session
    }

    pub fn step(&mut self, now: Instant, user_volume: u8) -> Option<FadeStep> {
        let session = self.session?;
        let ratio = session.ratio(now);
        if ratio >= 1.0 {
            self.session = None;
            return Some(FadeStep::Complete {
                target: session.target,
            });
        }
        Some(FadeStep::Ramp(fade_levels(user_volume, ratio)))
    }

    pub fn cancel(&mut self) -> Option<CrossfadeSession> {
        let session = self.session.take();
        if let Some(session) = &session {
            tracing::debug!(target_index = session.target, "crossfade cancelled");
        }
        session
    }
}
