use crate::analysis;
use crate::generation::{Generation, GenerationWatch};
use crate::library::MediaInspector;
use crate::model::{Artwork, Rgb, TrackMetadata};
use anyhow::{Context, Result};
use crossbeam::channel::{self, Receiver, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

pub const DEFAULT_WORKERS: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobKind {
    Metadata,
    Artwork,
    Prefetch,
    Waveform { samples: usize },
}

#[derive(Debug, Clone)]
pub struct Job {
    pub watch: GenerationWatch,
    pub index: usize,
    pub path: PathBuf,
    pub kind: JobKind,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Metadata(TrackMetadata),
    Artwork {
        artwork: Option<Artwork>,
        color: Option<Rgb>,
        prefetch: bool,
    },
    Waveform(Vec<f32>),
}

#[derive(Debug, Clone)]
pub struct Completed {
    pub generation: Generation,
    pub index: usize,
    pub path: PathBuf,
    pub outcome: Outcome,
}

pub struct EnrichmentPool {
    jobs: Option<Sender<Job>>,
    results: Receiver<Completed>,
    workers: Vec<JoinHandle<()>>,
}

impl EnrichmentPool {
    pub fn spawn(inspector: Arc<dyn MediaInspector>, workers: usize) -> Result<Self> {
        let (job_tx, job_rx) = channel::unbounded::<Job>();
        let (result_tx, result_rx) = channel::unbounded::<Completed>();

        let mut handles = Vec::with_capacity(workers.max(1));
        for worker in 0..workers.max(1) {
            let jobs = job_rx.clone();
            let results = result_tx.clone();
            let inspector = Arc::clone(&inspector);
            let handle = thread::Builder::new()
                .name(format!("aurion-enrich-{worker}"))
                .spawn(move || run_worker(inspector.as_ref(), &jobs, &results))
                .context("failed to spawn enrichment worker")?;
            handles.push(handle);
        }

        Ok(Self {
            jobs: Some(job_tx),
            results: result_rx,
            workers: handles,
        })
    }

    pub fn dispatch(&self, job: Job) {
        let Some(jobs) = &self.jobs else {
            return;
        };
        if jobs.send(job).is_err() {
            tracing::warn!("enrichment workers are gone; job dropped");
        }
    }

    pub fn drain(&self) -> Vec<Completed> {
        self.results.try_iter().collect()
    }
}

impl Drop for EnrichmentPool {
    fn drop(&mut self) {
        self.jobs.take();
        for handle in self.workers.drain(..) {
            if handle.join().is_err() {
                tracing::error!("enrichment worker panicked");
            }
        }
    }
}

fn run_worker(inspector: &dyn MediaInspector, jobs: &Receiver<Job>, results: &Sender<Completed>) {
    while let Ok(job) = jobs.recv() {
        if !job.watch.is_current() {
            tracing::trace!(generation = %job.watch.generation(), kind = ?job.kind, "skipping stale job");
            continue;
        }

        let Some(outcome) = perform(inspector, &job) else {
            tracing::trace!(generation = %job.watch.generation(), kind = ?job.kind, "abandoned stale job");
            continue;
        };
        if !job.watch.is_current() {
            continue;
        }

        let completed = Completed {
            generation: job.watch.generation(),
            index: job.index,
            path: job.path,
            outcome,
        };
        if results.send(completed).is_err() {
            break;
        }
    }
}

// None when the job went stale part way through.
pub fn perform(inspector: &dyn MediaInspector, job: &Job) -> Option<Outcome> {
    match job.kind {
        JobKind::Metadata => {
            let metadata = inspector.extract_metadata(&job.path).unwrap_or_else(|err| {
                tracing::debug!(path = %job.path.display(), error = %err, "metadata unavailable");
                TrackMetadata::default()
            });
            Some(Outcome::Metadata(metadata))
        }
        JobKind::Artwork | JobKind::Prefetch => {
            let (artwork, color) = load_artwork(inspector, job)?;
            Some(Outcome::Artwork {
                artwork,
                color,
                prefetch: job.kind == JobKind::Prefetch,
            })
        }
        JobKind::Waveform { samples } => {
            let waveform = inspector
                .compute_waveform(&job.path, samples)
                .unwrap_or_else(|err| {
                    tracing::debug!(path = %job.path.display(), error = %err, "using synthetic waveform");
                    analysis::synthetic_waveform(&job.path, samples)
                });
            Some(Outcome::Waveform(waveform))
        }
    }
}

fn load_artwork(
    inspector: &dyn MediaInspector,
    job: &Job,
) -> Option<(Option<Artwork>, Option<Rgb>)> {
    let bytes = match inspector.extract_album_art(&job.path) {
        Ok(Some(bytes)) => bytes,
        Ok(None) => return Some((None, None)),
        Err(err) => {
            tracing::debug!(path = %job.path.display(), error = %err, "album art unavailable");
            return Some((None, None));
        }
    };
    if !job.watch.is_current() {
        return None;
    }

    let artwork = match inspector.decode_artwork(&bytes) {
        Ok(artwork) => artwork,
        Err(err) => {
            tracing::debug!(path = %job.path.display(), error = %err, "album art did not decode");
            return Some((None, None));
        }
    };
    if !job.watch.is_current() {
        return None;
    }

    let color = inspector.compute_dominant_color(&artwork);
    Some((Some(artwork), color))
}
