//! CLI command implementations

use crate::output::{format_rows, to_json, OutputFormat};
use crate::scenario::{Scenario, StepAction};
use async_trait::async_trait;
use console::style;
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tabled::Tabled;
use tokio::time::Instant;
use tsuki_core::stream::{probe_manifest, ScriptedClientFactory};
use tsuki_core::{
    format_time, MediaSurface, MemorySurface, NativeTextTrack, Player, PlayerConfig, ProgressSink, ProgressUpdate,
    StreamConfig, TouchPoint,
};

/// Fetch and summarize an HLS manifest
pub async fn probe(url: &str, headers: &[String], format: OutputFormat) -> anyhow::Result<()> {
    let mut config = StreamConfig::default();
    for header in headers {
        let (name, value) = header
            .split_once(':')
            .ok_or_else(|| anyhow::anyhow!("header must be NAME:VALUE, got '{}'", header))?;
        config = config.with_header(name.trim(), value.trim());
    }

    let summary = probe_manifest(url, &config).await?;

    if format == OutputFormat::Json {
        println!("{}", to_json(&summary));
        return Ok(());
    }

    println!("{}", style("Manifest").bold());
    println!("  URL:      {}", summary.url);
    println!("  Kind:     {:?}", summary.kind);
    println!("  Live:     {}", summary.is_live);
    println!(
        "  Duration: {}",
        summary.duration.map(format_time).unwrap_or_else(|| "unknown".to_string())
    );
    if let Some(buffer) = summary.buffer {
        println!(
            "  Buffer:   {} segments ahead (cap {}), {} behind",
            buffer.ahead, buffer.ahead_cap, buffer.behind
        );
    }

    if !summary.levels.is_empty() {
        #[derive(Serialize, Tabled)]
        struct LevelRow {
            bandwidth: u64,
            resolution: String,
            codecs: String,
            uri: String,
        }

        let rows: Vec<LevelRow> = summary
            .levels
            .iter()
            .map(|l| LevelRow {
                bandwidth: l.bandwidth,
                resolution: match (l.width, l.height) {
                    (Some(w), Some(h)) => format!("{}x{}", w, h),
                    _ => "-".to_string(),
                },
                codecs: l.codecs.clone().unwrap_or_else(|| "-".to_string()),
                uri: l.uri.clone(),
            })
            .collect();
        println!("\n{}", style("Levels").bold());
        println!("{}", format_rows(&rows, OutputFormat::Table));
    }

    Ok(())
}

/// Print the effective configuration
pub fn config(file: Option<PathBuf>) -> anyhow::Result<()> {
    let config = match file {
        Some(path) => PlayerConfig::from_file(&path)?,
        None => PlayerConfig::default(),
    };
    config.validate()?;
    println!("{}", config.to_json());
    Ok(())
}

#[derive(Default)]
struct CollectingSink {
    updates: Mutex<Vec<ProgressUpdate>>,
}

#[async_trait]
impl ProgressSink for CollectingSink {
    async fn on_progress_update(&self, update: ProgressUpdate) {
        self.updates.lock().push(update);
    }
}

#[derive(Debug, Serialize, Tabled)]
struct TimelineRow {
    at_ms: u64,
    step: String,
    outcome: String,
    position: String,
    playing: bool,
    volume: String,
    controls: bool,
}

#[derive(Debug, Serialize, Tabled)]
struct ProgressRow {
    reason: String,
    position: String,
    duration: String,
}

#[derive(Debug, Serialize)]
struct SimulationReport {
    timeline: Vec<TimelineRow>,
    progress: Vec<ProgressRow>,
    final_state: tsuki_core::ControlsView,
    client_log: Vec<String>,
}

fn settle_pump(player: &Player) {
    while player.pump() > 0 {}
}

async fn settle(player: &Player) {
    tokio::time::sleep(Duration::from_millis(1)).await;
    settle_pump(player);
}

fn elapsed_ms(start: Instant) -> u64 {
    start.elapsed().as_millis() as u64
}

/// Replay a scenario against an in-memory surface on a virtual clock
pub async fn simulate(path: &Path, format: OutputFormat) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(path)?;

    // Timers (double-tap commit, auto-hide) run on virtual time
    tokio::time::pause();

    let factory = if scenario.client_unsupported {
        ScriptedClientFactory::unsupported()
    } else {
        ScriptedClientFactory::new()
    };
    for (url, events) in &scenario.scripts {
        factory.script(url.clone(), events.clone());
    }
    let factory = Arc::new(factory);
    let surface = Arc::new(MemorySurface::new());
    let sink = Arc::new(CollectingSink::default());

    let mut player = Player::new(
        surface.clone(),
        factory.clone(),
        scenario.config.clone(),
        Some(sink.clone() as Arc<dyn ProgressSink>),
    )?;
    player.set_surface_size(scenario.surface);

    let start = Instant::now();
    let mut timeline = Vec::new();

    let outcome = player.set_source(scenario.item.clone())?;
    settle(&player).await;
    if let Some(duration) = scenario.duration {
        load(&surface, duration, &scenario.native_tracks);
        settle(&player).await;
    }
    timeline.push(row(&player, 0, format!("source {}", scenario.item.url), format!("{:?}", outcome)));

    for step in &scenario.steps {
        tokio::time::sleep_until(start + Duration::from_millis(step.at_ms)).await;
        settle_pump(&player);

        let at = elapsed_ms(start);
        let outcome = match &step.action {
            StepAction::Advance { seconds } => {
                let mut remaining = *seconds;
                while remaining > 0.0 {
                    let chunk = remaining.min(0.25);
                    tokio::time::sleep(Duration::from_secs_f64(chunk)).await;
                    surface.advance(chunk);
                    settle_pump(&player);
                    remaining -= chunk;
                }
                format!("at {}", format_time(surface.current_time()))
            }
            StepAction::Tap { x, y } => {
                player.touch_start(TouchPoint::new(*x, *y, at));
                format!("{:?}", player.touch_end(TouchPoint::new(*x, *y, at + 40)))
            }
            StepAction::Swipe { x, from_y, to_y } => {
                player.touch_start(TouchPoint::new(*x, *from_y, at));
                for i in 1..=5 {
                    let y = from_y + (to_y - from_y) * i as f64 / 5.0;
                    player.touch_move(TouchPoint::new(*x, y, at + i * 16));
                }
                format!("{:?}", player.touch_end(TouchPoint::new(*x, *to_y, at + 100)))
            }
            StepAction::Control { action } => match player.dispatch(action.clone()) {
                Ok(()) => "ok".to_string(),
                Err(e) => format!("error: {}", e),
            },
            StepAction::Key { key } => match player.handle_key(key) {
                Ok(true) => "ok".to_string(),
                Ok(false) => "unbound".to_string(),
                Err(e) => format!("error: {}", e),
            },
            StepAction::Stall => {
                surface.stall();
                "stalled".to_string()
            }
            StepAction::Recover => {
                surface.recover();
                "recovered".to_string()
            }
            StepAction::Metadata { duration } => {
                load(&surface, *duration, &scenario.native_tracks);
                "loaded".to_string()
            }
            StepAction::Source { item } => match player.set_source(item.clone()) {
                Ok(outcome) => format!("{:?}", outcome),
                Err(e) => format!("error: {}", e),
            },
        };
        settle(&player).await;
        timeline.push(row(&player, at, step.action.describe(), outcome));
    }

    // Let pending gesture timers resolve before the final snapshot
    tokio::time::sleep(Duration::from_secs(1)).await;
    settle_pump(&player);
    let final_state = player.view();

    player.shutdown();
    tokio::time::sleep(Duration::from_millis(10)).await;

    let progress = sink
        .updates
        .lock()
        .iter()
        .map(|u| ProgressRow {
            reason: format!("{:?}", u.reason),
            position: format_time(u.current_time),
            duration: format_time(u.duration),
        })
        .collect();
    let report = SimulationReport {
        timeline,
        progress,
        final_state,
        client_log: factory.log().iter().map(|e| format!("{:?}", e)).collect(),
    };

    print_report(&report, format);
    Ok(())
}

fn load(surface: &MemorySurface, duration: f64, tracks: &[String]) {
    surface.load_metadata(duration);
    for label in tracks {
        surface.add_text_track(NativeTextTrack::new(label.clone(), ""));
    }
}

fn row(player: &Player, at_ms: u64, step: String, outcome: String) -> TimelineRow {
    let view = player.view();
    TimelineRow {
        at_ms,
        step,
        outcome,
        position: format!("{} / {}", view.current_time_label, view.duration_label),
        playing: view.is_playing,
        volume: format!("{:.2}{}", view.volume, if view.is_muted { " (muted)" } else { "" }),
        controls: view.controls_visible,
    }
}

fn print_report(report: &SimulationReport, format: OutputFormat) {
    if format == OutputFormat::Json {
        println!("{}", to_json(report));
        return;
    }

    println!("{}", style("Timeline").bold());
    println!("{}", format_rows(&report.timeline, format));

    println!("\n{}", style("Progress reports").bold());
    if report.progress.is_empty() {
        println!("  (none)");
    } else {
        println!("{}", format_rows(&report.progress, format));
    }

    if !report.client_log.is_empty() {
        println!("\n{}", style("Streaming client").bold());
        for entry in &report.client_log {
            println!("  {}", entry);
        }
    }

    let state = &report.final_state;
    println!("\n{}", style("Final state").bold());
    println!("  Position: {} / {}", state.current_time_label, state.duration_label);
    println!("  Playing:  {}", state.is_playing);
    println!("  Subtitle: {}", state.selected_subtitle.as_deref().unwrap_or("Off"));
    match &state.load_error {
        Some(error) => println!("  Error:    {}", style(error).red()),
        None => println!("  Error:    {}", style("none").green()),
    }
}
