use crate::model::{Artwork, Rgb};
use anyhow::{Context, Result};
use image::RgbaImage;
use image::imageops::{self, FilterType};
use rodio::{Decoder, Source};
use sha2::{Digest, Sha256};
use std::fs::File;
use std::path::Path;

pub const ALBUM_ART_SIZE: u32 = 300;
pub const DEFAULT_WAVEFORM_SAMPLES: usize = 1000;

const COLOR_SAMPLE_SIZE: u32 = 150;
const SATURATION_BOOST: f32 = 1.5;
const SYNTHETIC_FLOOR: f32 = 0.02;

pub fn decode_artwork(bytes: &[u8]) -> Result<Artwork> {
    let decoded = image::load_from_memory(bytes).context("artwork is not a supported image")?;
    let scaled = decoded.resize(ALBUM_ART_SIZE, ALBUM_ART_SIZE, FilterType::Triangle);
    Ok(Artwork::new(scaled.to_rgba8()))
}

pub fn dominant_color(image: &RgbaImage) -> Option<Rgb> {
    if image.width() == 0 || image.height() == 0 {
        return None;
    }

    let small = imageops::resize(image, COLOR_SAMPLE_SIZE, COLOR_SAMPLE_SIZE, FilterType::Triangle);
    let pixels: Vec<[u32; 3]> = small
        .pixels()
        .map(|pixel| {
            let [r, g, b, _] = pixel.0;
            [u32::from(r), u32::from(g), u32::from(b)]
        })
        .collect();

    let mid_tones: Vec<[u32; 3]> = pixels
        .iter()
        .copied()
        .filter(|[r, g, b]| {
            let sum = r + g + b;
            sum > 50 && sum < 700
        })
        .collect();
    let chosen = if mid_tones.is_empty() {
        &pixels
    } else {
        &mid_tones
    };
    if chosen.is_empty() {
        return None;
    }

    let count = chosen.len() as u32;
    let mut total = [0_u32; 3];
    for pixel in chosen {
        for (acc, channel) in total.iter_mut().zip(pixel) {
            *acc += channel;
        }
    }
    let average = total.map(|sum| sum / count);
    Some(boost_saturation(average))
}

fn boost_saturation([r, g, b]: [u32; 3]) -> Rgb {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    if max == 0 {
        return Rgb::new(0, 0, 0);
    }

    let mid = (max + min) as f32 / 2.0;
    let push = |channel: u32| -> u8 {
        let value = (mid + (channel as f32 - mid) * SATURATION_BOOST) as i32;
        value.clamp(0, 255) as u8
    };
    Rgb::new(push(r), push(g), push(b))
}

pub fn waveform(path: &Path, samples: usize) -> Result<Vec<f32>> {
    let samples = samples.max(1);
    let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
    let source =
        Decoder::try_from(file).with_context(|| format!("failed to decode {}", path.display()))?;

    let channels = usize::from(source.channels()).max(1);
    let sample_rate = usize::try_from(source.sample_rate())
        .unwrap_or(44_100)
        .max(1);
    let total_frames = source
        .total_duration()
        .map(|duration| (duration.as_secs_f64() * sample_rate as f64) as usize)
        .filter(|frames| *frames > 0);

    let amplitudes = match total_frames {
        Some(frames) => {
            let bucket = (frames / samples).max(1).saturating_mul(channels);
            bucket_rms(source, bucket, samples)
        }
        None => {
            let decoded: Vec<f32> = source.collect();
            let bucket = (decoded.len() / samples).max(1);
            bucket_rms(decoded.into_iter(), bucket, samples)
        }
    };

    if amplitudes.is_empty() {
        anyhow::bail!("no audio frames in {}", path.display());
    }
    Ok(amplitudes)
}

fn bucket_rms(source: impl Iterator<Item = f32>, bucket: usize, limit: usize) -> Vec<f32> {
    let mut amplitudes = Vec::with_capacity(limit);
    let mut sum_sq = 0.0_f64;
    let mut count = 0_usize;

    for sample in source {
        let value = f64::from(sample);
        sum_sq += value * value;
        count += 1;
        if count == bucket {
            amplitudes.push(((sum_sq / count as f64).sqrt() as f32).min(1.0));
            if amplitudes.len() >= limit {
                return amplitudes;
            }
            sum_sq = 0.0;
            count = 0;
        }
    }

    if count > 0 && amplitudes.len() < limit {
        amplitudes.push(((sum_sq / count as f64).sqrt() as f32).min(1.0));
    }
    amplitudes
}

pub fn synthetic_waveform(path: &Path, samples: usize) -> Vec<f32> {
    let seed = path.to_string_lossy();
    let mut values = Vec::with_capacity(samples);
    let mut last = 0.5_f32;
    let mut block = 0_u64;

    while values.len() < samples {
        let mut hasher = Sha256::new();
        hasher.update(seed.as_bytes());
        hasher.update(block.to_le_bytes());
        let digest = hasher.finalize();

        for word in digest.chunks_exact(4) {
            if values.len() == samples {
                break;
            }
            let raw = u32::from_le_bytes([word[0], word[1], word[2], word[3]]);
            let noise = raw as f32 / u32::MAX as f32;
            last = (last * 0.8 + noise * 0.2).max(SYNTHETIC_FLOOR);
            values.push(last);
        }
        block += 1;
    }
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decoder::fixtures::write_test_wav;
    use image::Rgba;
    use std::io::Cursor;
    use std::path::PathBuf;

    fn solid(width: u32, height: u32, color: [u8; 3]) -> RgbaImage {
        RgbaImage::from_pixel(width, height, Rgba([color[0], color[1], color[2], 255]))
    }

    #[test]
    fn dominant_color_of_solid_image_is_saturated() {
        let color = dominant_color(&solid(40, 40, [200, 100, 50])).expect("color");
        // mid = 125, each channel pushed 1.5x away from it
        assert_eq!(color, Rgb::new(237, 87, 12));
    }

    #[test]
    fn near_black_images_fall_back_to_all_pixels() {
        let color = dominant_color(&solid(10, 10, [5, 5, 5])).expect("color");
        assert_eq!(color, Rgb::new(5, 5, 5));
    }

    #[test]
    fn extreme_pixels_are_ignored_when_mid_tones_exist() {
        let mut image = solid(150, 150, [0, 0, 0]);
        for y in 0..150 {
            for x in 0..75 {
                image.put_pixel(x, y, Rgba([100, 100, 100, 255]));
            }
        }
        let color = dominant_color(&image).expect("color");
        assert!(color.r >= 90 && color.r <= 110, "got {color:?}");
    }

    #[test]
    fn decode_artwork_scales_to_fit() {
        let mut png = Vec::new();
        image::DynamicImage::ImageRgba8(solid(600, 300, [10, 20, 30]))
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .expect("encode png");

        let art = decode_artwork(&png).expect("decode");
        assert_eq!(art.width(), ALBUM_ART_SIZE);
        assert_eq!(art.height(), ALBUM_ART_SIZE / 2);
    }

    #[test]
    fn decode_artwork_rejects_garbage() {
        assert!(decode_artwork(b"definitely not an image").is_err());
    }

    #[test]
    fn synthetic_waveform_is_deterministic_and_floored() {
        let path = PathBuf::from("music/unreadable.ogg");
        let first = synthetic_waveform(&path, 250);
        let second = synthetic_waveform(&path, 250);
        assert_eq!(first, second);
        assert_eq!(first.len(), 250);
        assert!(
            first
                .iter()
                .all(|value| *value >= SYNTHETIC_FLOOR && *value <= 1.0)
        );
        assert_ne!(first, synthetic_waveform(Path::new("music/other.ogg"), 250));
    }

    #[test]
    fn waveform_reads_wav_amplitudes() {
        let dir = tempfile::tempdir().expect("tempdir");
        let track = dir.path().join("tone.wav");
        write_test_wav(&track, 500);

        let amplitudes = waveform(&track, 50).expect("waveform");
        assert!(!amplitudes.is_empty() && amplitudes.len() <= 50);
        assert!(amplitudes.iter().all(|value| (0.0..=1.0).contains(value)));
        assert!(amplitudes.iter().any(|value| *value > 0.0));
    }

    #[test]
    fn waveform_of_missing_file_is_an_error() {
        assert!(waveform(Path::new("missing.wav"), 10).is_err());
    }
}
