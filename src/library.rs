use crate::analysis;
use crate::config::strip_windows_verbatim_prefix;
use crate::model::{Artwork, Rgb, TrackMetadata};
use anyhow::{Context, Result};
use lofty::file::{AudioFile, TaggedFileExt};
use lofty::prelude::Accessor;
use lofty::probe::Probe;
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};
use std::time::Duration;
use symphonia::core::codecs::CodecParameters;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::{MediaSourceStream, MediaSourceStreamOptions};
use symphonia::core::meta::{MetadataOptions, StandardTagKey, Tag, Visual};
use symphonia::core::probe::{Hint, ProbeResult};
use symphonia::default::get_probe;
use walkdir::WalkDir;

const AUDIO_EXTENSIONS: &[&str] = &["mp3", "flac", "wav", "ogg", "m4a", "aac", "opus"];

pub trait MediaInspector: Send + Sync {
    fn extract_metadata(&self, path: &Path) -> Result<TrackMetadata>;

    fn extract_album_art(&self, path: &Path) -> Result<Option<Vec<u8>>>;

    fn decode_artwork(&self, bytes: &[u8]) -> Result<Artwork> {
        analysis::decode_artwork(bytes)
    }

    fn compute_dominant_color(&self, artwork: &Artwork) -> Option<Rgb> {
        analysis::dominant_color(&artwork.image)
    }

    fn compute_waveform(&self, path: &Path, samples: usize) -> Result<Vec<f32>>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct LibraryInspector;

impl MediaInspector for LibraryInspector {
    fn extract_metadata(&self, path: &Path) -> Result<TrackMetadata> {
        let path = strip_windows_verbatim_prefix(path);
        let probed = symphonia_metadata(&path);
        if let Ok(metadata) = &probed
            && (metadata.title.is_some() || metadata.artist.is_some())
        {
            return probed;
        }

        match lofty_metadata(&path) {
            Ok(mut metadata) => {
                if let Ok(probed) = &probed {
                    metadata.duration = metadata.duration.or(probed.duration);
                }
                Ok(metadata)
            }
            Err(err) => probed.map_err(|_| err),
        }
    }

    fn extract_album_art(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        let path = strip_windows_verbatim_prefix(path);
        match symphonia_cover_art(&path) {
            Ok(Some(bytes)) => Ok(Some(bytes)),
            probed => match lofty_cover_art(&path) {
                Ok(found) => Ok(found),
                Err(err) => probed.map_err(|_| err),
            },
        }
    }

    fn compute_waveform(&self, path: &Path, samples: usize) -> Result<Vec<f32>> {
        analysis::waveform(&strip_windows_verbatim_prefix(path), samples)
    }
}

pub fn scan_folder(root: &Path) -> Vec<PathBuf> {
    let mut tracks: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|entry| entry.file_type().is_file() && is_audio(entry.path()))
        .map(|entry| strip_windows_verbatim_prefix(entry.path()))
        .collect();

    tracks.sort();
    tracks
}

pub fn collect_tracks(inputs: &[PathBuf]) -> Vec<PathBuf> {
    let mut tracks = Vec::new();
    for input in inputs {
        if input.is_dir() {
            tracks.extend(scan_folder(input));
        } else if is_audio(input) {
            tracks.push(input.clone());
        } else {
            tracing::debug!(path = %input.display(), "skipping non-audio input");
        }
    }
    tracks
}

pub fn is_audio(path: &Path) -> bool {
    let ext = path.extension().and_then(OsStr::to_str).unwrap_or_default();
    AUDIO_EXTENSIONS
        .iter()
        .any(|supported| ext.eq_ignore_ascii_case(supported))
}

fn probe(path: &Path) -> Result<ProbeResult> {
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let source = MediaSourceStream::new(Box::new(file), MediaSourceStreamOptions::default());

    let mut hint = Hint::new();
    if let Some(extension) = path.extension().and_then(OsStr::to_str) {
        hint.with_extension(extension);
    }

    get_probe()
        .format(
            &hint,
            source,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .with_context(|| format!("unrecognized audio container {}", path.display()))
}

fn probe_revision(probed: &mut ProbeResult) -> (Vec<Tag>, Vec<Visual>) {
    if let Some(revision) = probed.format.metadata().current()
        && (!revision.tags().is_empty() || !revision.visuals().is_empty())
    {
        return (revision.tags().to_vec(), revision.visuals().to_vec());
    }

    probed
        .metadata
        .get()
        .and_then(|metadata| {
            metadata
                .current()
                .map(|revision| (revision.tags().to_vec(), revision.visuals().to_vec()))
        })
        .unwrap_or_default()
}

fn symphonia_metadata(path: &Path) -> Result<TrackMetadata> {
    let mut probed = probe(path)?;
    let duration = probed
        .format
        .default_track()
        .and_then(|track| codec_duration(&track.codec_params));
    let (tags, _) = probe_revision(&mut probed);

    Ok(TrackMetadata {
        title: tag_value(&tags, StandardTagKey::TrackTitle, &["title"]),
        artist: tag_value(
            &tags,
            StandardTagKey::Artist,
            &["artist", "albumartist", "album_artist"],
        ),
        duration,
    })
}

fn symphonia_cover_art(path: &Path) -> Result<Option<Vec<u8>>> {
    let mut probed = probe(path)?;
    let (_, visuals) = probe_revision(&mut probed);
    Ok(visuals
        .iter()
        .find(|visual| !visual.data.is_empty())
        .map(|visual| visual.data.to_vec()))
}

fn lofty_metadata(path: &Path) -> Result<TrackMetadata> {
    let tagged = Probe::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .read()
        .with_context(|| format!("failed to parse tags for {}", path.display()))?;

    let duration = Some(tagged.properties().duration()).filter(|value| !value.is_zero());
    let Some(tag) = tagged.primary_tag().or_else(|| tagged.first_tag()) else {
        return Ok(TrackMetadata {
            duration,
            ..TrackMetadata::default()
        });
    };

    Ok(TrackMetadata {
        title: tag.title().as_deref().and_then(clean_metadata_value),
        artist: tag.artist().as_deref().and_then(clean_metadata_value),
        duration,
    })
}

fn lofty_cover_art(path: &Path) -> Result<Option<Vec<u8>>> {
    let tagged = Probe::open(path)
        .with_context(|| format!("failed to open {}", path.display()))?
        .read()
        .with_context(|| format!("failed to parse tags for {}", path.display()))?;

    Ok(tagged
        .tags()
        .iter()
        .flat_map(|tag| tag.pictures())
        .find(|picture| !picture.data().is_empty())
        .map(|picture| picture.data().to_vec()))
}

fn codec_duration(codec_params: &CodecParameters) -> Option<Duration> {
    if let (Some(time_base), Some(frame_count)) = (codec_params.time_base, codec_params.n_frames) {
        let time = time_base.calc_time(frame_count);
        return Some(Duration::from_secs(time.seconds) + Duration::from_secs_f64(time.frac));
    }

    codec_params
        .n_frames
        .zip(codec_params.sample_rate)
        .filter(|(_, sample_rate)| *sample_rate > 0)
        .map(|(frame_count, sample_rate)| {
            Duration::from_secs_f64(frame_count as f64 / f64::from(sample_rate))
        })
}

fn clean_metadata_value(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn tag_value(tags: &[Tag], standard_key: StandardTagKey, fallback_keys: &[&str]) -> Option<String> {
    let from_standard = tags
        .iter()
        .find(|tag| tag.std_key == Some(standard_key))
        .map(|tag| tag.value.to_string());

    let from_fallback = || {
        tags.iter()
            .find(|tag| {
                fallback_keys
                    .iter()
                    .any(|key| tag.key.eq_ignore_ascii_case(key))
            })
            .map(|tag| tag.value.to_string())
    };

    from_standard
        .or_else(from_fallback)
        .and_then(|value| clean_metadata_value(&value))
}
