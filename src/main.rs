use anyhow::{Context, Result};
use clap::Parser;
use log::{debug, info};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

use beatscape::audio::{AudioOutput, AudioSource, NullOutput, RodioLoader, RodioOutput, SourceLoader};
use beatscape::effects::{BeatFlash, CrowdEffect, EffectHandle};
use beatscape::performance::PerformancePreset;
use beatscape::{FrameDriver, VisualizerConfig};

#[derive(Parser)]
#[command(name = "beatscape")]
#[command(about = "Audio-reactive visualizer driver: plays a track and animates effects to it")]
struct Args {
    /// Audio file to play (WAV, MP3, OGG, FLAC)
    audio_file: String,

    /// Analyse without opening an audio device
    #[arg(long)]
    headless: bool,

    /// Pin a quality preset (ultra, high, medium, low, potato) instead of adapting
    #[arg(long)]
    preset: Option<PerformancePreset>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Target frame rate
    #[arg(long)]
    fps: Option<f32>,

    /// Playback volume between 0 and 1
    #[arg(long)]
    volume: Option<f32>,
}

fn load_config(args: &Args) -> Result<VisualizerConfig> {
    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path)?,
        None => VisualizerConfig::default(),
    };
    if let Some(fps) = args.fps {
        config.performance.target_fps = fps;
    }
    if let Some(volume) = args.volume {
        config.audio.volume = volume;
    }
    if let Some(preset) = args.preset {
        config.performance.auto = false;
        config.performance.preset = preset;
    }
    config.validate()?;
    Ok(config)
}

async fn run<O: AudioOutput>(output: O, config: VisualizerConfig, args: Args) -> Result<()> {
    let mut driver = FrameDriver::new(output, &config);
    let crowd = EffectHandle::attach(CrowdEffect::default(), driver.scheduler_mut())?;
    let flash = EffectHandle::attach(BeatFlash::default(), driver.scheduler_mut())?;
    info!(
        "Registered {} animations, quality {}",
        driver.scheduler().len(),
        driver.quality().preset()
    );

    let loader = RodioLoader::new(Duration::from_secs_f64(config.audio.load_timeout_secs));
    let source = AudioSource::from_uri(&args.audio_file)?;

    let mut interval =
        tokio::time::interval(Duration::from_secs_f32(1.0 / config.performance.target_fps));
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let started = Instant::now();
    let now_ms = || started.elapsed().as_secs_f64() * 1000.0;

    // Keep animating idle frames while the decode runs
    let load = loader.load(source);
    tokio::pin!(load);
    let track = loop {
        tokio::select! {
            result = &mut load => break result.with_context(|| format!("loading {}", args.audio_file))?,
            _ = interval.tick() => {
                driver.frame(now_ms());
            }
        }
    };

    driver.session_mut().attach(track)?;
    driver
        .session_mut()
        .play()
        .context("could not start playback (try --headless)")?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut beats = 0u64;

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let report = driver.frame(now_ms());
                if report.snapshot.beat_detected {
                    beats += 1;
                    debug!(
                        "Beat at {:.2}s (bass {:.2})",
                        report.snapshot.current_time, report.snapshot.bass
                    );
                }
                if let Some(preset) = report.preset_change {
                    info!("Quality preset changed to {}", preset);
                }
                if !driver.session().is_playing() {
                    info!("Playback finished");
                    break;
                }
            }
            _ = &mut ctrl_c => {
                info!("Interrupted");
                break;
            }
        }
    }

    info!(
        "{} beats over {:.1}s, {} flashes, crowd of {}, final quality {}",
        beats,
        driver.session().current_time(),
        flash.state().flashes(),
        crowd.state().len(),
        driver.quality().preset()
    );

    crowd.detach();
    flash.detach();
    driver.session_mut().close();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    let config = load_config(&args)?;

    info!("Starting beatscape");
    info!("File: {}", args.audio_file);
    info!(
        "Target {} FPS, volume {:.2}, headless: {}",
        config.performance.target_fps, config.audio.volume, args.headless
    );

    if args.headless {
        run(NullOutput::new(), config, args).await
    } else {
        run(RodioOutput::new(), config, args).await
    }
}
