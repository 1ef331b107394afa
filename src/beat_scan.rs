use anyhow::Result;
use clap::Parser;
use log::info;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::time::Duration;

use beatscape::audio::{
    extract_bands, AudioSource, BeatDetector, FrequencyBands, RodioLoader, SourceLoader,
    SpectrumAnalyzer,
};
use beatscape::VisualizerConfig;

#[derive(Parser)]
#[command(name = "beat-scan")]
#[command(about = "Offline pass over a track through the band and beat pipeline, reported as JSON")]
struct Args {
    /// Audio file to scan
    audio_file: String,

    /// Write the report here instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Simulated frame rate
    #[arg(long, default_value = "60")]
    fps: f32,

    /// Include every frame's band levels
    #[arg(long)]
    frame_by_frame: bool,
}

#[derive(Debug, Default, Serialize)]
struct BandStats {
    peak: f32,
    mean: f32,
}

#[derive(Debug, Serialize)]
struct BeatEvent {
    time: f64,
    bass: f32,
}

#[derive(Debug, Serialize)]
struct FrameLevels {
    time: f64,
    bass: f32,
    mids: f32,
    highs: f32,
    overall: f32,
    beat: bool,
}

#[derive(Debug, Serialize)]
struct ScanReport {
    file: String,
    duration_seconds: f64,
    sample_rate: u32,
    channels: u16,
    frames: usize,
    fps: f32,
    beat_count: usize,
    estimated_bpm: f32,
    bass: BandStats,
    mids: BandStats,
    highs: BandStats,
    overall: BandStats,
    beats: Vec<BeatEvent>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    frame_levels: Vec<FrameLevels>,
}

#[derive(Default)]
struct Accumulator {
    peak: FrequencyBands,
    sum: FrequencyBands,
}

impl Accumulator {
    fn add(&mut self, bands: &FrequencyBands) {
        self.peak.bass = self.peak.bass.max(bands.bass);
        self.peak.mids = self.peak.mids.max(bands.mids);
        self.peak.highs = self.peak.highs.max(bands.highs);
        self.peak.overall = self.peak.overall.max(bands.overall);
        self.sum.bass += bands.bass;
        self.sum.mids += bands.mids;
        self.sum.highs += bands.highs;
        self.sum.overall += bands.overall;
    }

    fn stats(peak: f32, sum: f32, frames: usize) -> BandStats {
        BandStats {
            peak,
            mean: if frames == 0 { 0.0 } else { sum / frames as f32 },
        }
    }
}

/// Beats per minute from the median gap between beats.
fn estimate_bpm(beats: &[BeatEvent]) -> f32 {
    let mut gaps: Vec<f64> = beats.windows(2).map(|w| w[1].time - w[0].time).collect();
    if gaps.is_empty() {
        return 0.0;
    }
    gaps.sort_by(|a, b| a.total_cmp(b));
    let median = gaps[gaps.len() / 2];
    if median > 0.0 {
        (60.0 / median) as f32
    } else {
        0.0
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };
    anyhow::ensure!(
        args.fps.is_finite() && args.fps > 0.0,
        "--fps must be positive, got {}",
        args.fps
    );

    info!("Scanning {} at {} FPS", args.audio_file, args.fps);
    let loader = RodioLoader::new(Duration::from_secs_f64(config.audio.load_timeout_secs));
    let track = loader.load(AudioSource::from_uri(&args.audio_file)?).await?;

    let mut analyzer = SpectrumAnalyzer::new(config.analyzer.clone());
    let mut detector = BeatDetector::new(config.beat.clone());
    let mut acc = Accumulator::default();
    let mut beats = Vec::new();
    let mut frame_levels = Vec::new();

    let frames = (track.duration * args.fps as f64).ceil() as usize;
    for frame in 0..frames {
        let time = frame as f64 / args.fps as f64;
        let window = track.mono_window(time, analyzer.fft_size());
        let data = analyzer.frequency_data(window);
        let bands = extract_bands(
            &data,
            track.sample_rate as f32,
            analyzer.fft_size(),
            &config.bands,
        );
        let beat = detector.detect_beat(bands.bass, time * 1000.0);

        acc.add(&bands);
        if beat {
            beats.push(BeatEvent {
                time,
                bass: bands.bass,
            });
        }
        if args.frame_by_frame {
            frame_levels.push(FrameLevels {
                time,
                bass: bands.bass,
                mids: bands.mids,
                highs: bands.highs,
                overall: bands.overall,
                beat,
            });
        }
        if frame > 0 && frame % 600 == 0 {
            info!("Scanned {:.1}s of {:.1}s", time, track.duration);
        }
    }

    let report = ScanReport {
        file: track.name.clone(),
        duration_seconds: track.duration,
        sample_rate: track.sample_rate,
        channels: track.channels,
        frames,
        fps: args.fps,
        beat_count: beats.len(),
        estimated_bpm: estimate_bpm(&beats),
        bass: Accumulator::stats(acc.peak.bass, acc.sum.bass, frames),
        mids: Accumulator::stats(acc.peak.mids, acc.sum.mids, frames),
        highs: Accumulator::stats(acc.peak.highs, acc.sum.highs, frames),
        overall: Accumulator::stats(acc.peak.overall, acc.sum.overall, frames),
        beats,
        frame_levels,
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => {
            let mut file = File::create(path)?;
            file.write_all(json.as_bytes())?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }

    info!(
        "{} beats in {:.2}s (~{:.1} BPM), bass peak {:.2}",
        report.beat_count, report.duration_seconds, report.estimated_bpm, report.bass.peak
    );
    Ok(())
}
