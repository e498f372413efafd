// stepgrid - Terminal step sequencer
//
// Usage: stepgrid [config.ron]
// Reads one command per line from stdin; the first line unlocks the engine.

use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::Duration;

use stepgrid::{
    AudioEngine, CaptureArtifact, Command, Notification, NotificationCategory, NotificationLevel,
    OutputDevice, OutputRenderer, Outcome, RingCaptureSink, SequencerConfig, Session,
    tracks_from_config,
};

/// UI refresh period
const POLL_INTERVAL: Duration = Duration::from_millis(16);

const HELP: &str = "\
Commands:
  t <track> <step>   toggle a cell
  start | stop       transport
  bpm <n>            tempo
  rec [bars]         capture N bars (default from config)
  grid               show the pattern
  impact             show the impact readout
  cursor             follow the playhead on/off
  help               this text
  quit";

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("ERROR: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), String> {
    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SequencerConfig::load_or_default(config_path.as_deref()).map_err(|e| e.to_string())?;

    let output = OutputDevice::default_output().map_err(|e| e.to_string())?;
    let sample_rate = output.sample_rate();
    let block_size = config.block_size;
    let output_dir = config.output_dir.clone().unwrap_or_else(|| PathBuf::from("."));

    let tracks = tracks_from_config(&config.tracks, sample_rate);
    let (mut session, player, tap) = Session::build(config, tracks, sample_rate);
    let engine = AudioEngine::start(output, OutputRenderer::new(player, tap, block_size))
        .map_err(|e| e.to_string())?;

    println!("=== stepgrid ===");
    println!("{}\n", HELP);
    print_grid(&session, None);

    let lines = spawn_stdin_reader();
    let mut show_cursor = false;
    let mut reported_stream_error = false;

    loop {
        match lines.recv_timeout(POLL_INTERVAL) {
            Ok(line) => {
                // Any key press counts as the unlocking gesture
                if !session.transport().is_unlocked() {
                    session.unlock();
                }

                match line.trim() {
                    "" => {}
                    "quit" | "q" | "exit" => break,
                    "help" | "?" => println!("{}", HELP),
                    "grid" => print_grid(&session, Some(session.transport().current_step())),
                    "impact" => println!("{}", session.impact()),
                    "cursor" => show_cursor = !show_cursor,
                    input => match input.parse::<Command>() {
                        Ok(command) => match session.handle(command) {
                            Ok(outcome) => report(&session, &outcome),
                            Err(e) => println!("{}", e),
                        },
                        Err(e) => println!("{} (type 'help')", e),
                    },
                }
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => break,
        }

        let mut latest_step = None;
        if let Some(artifact) = session.poll(|event| latest_step = Some(event.step)) {
            save_capture(&artifact, &output_dir);
        }
        if show_cursor {
            if let Some(step) = latest_step {
                print_cursor(&session, step);
            }
        }
        // Already logged when raised; warnings also go to the prompt
        for notification in session.take_notifications() {
            if notification.level != NotificationLevel::Info {
                println!("\n{}", notification);
            }
        }

        if !engine.is_healthy() && !reported_stream_error {
            session.notify(Notification::error(
                NotificationCategory::Audio,
                "Audio stream reported an error; output may have stopped",
            ));
            reported_stream_error = true;
        }
    }

    // Close a capture in progress rather than losing it
    session.on_stop();
    while let Some(artifact) = session.poll(|_| {}) {
        save_capture(&artifact, &output_dir);
    }

    println!("Bye");
    Ok(())
}

/// Forward stdin lines to the UI loop
fn spawn_stdin_reader() -> mpsc::Receiver<String> {
    let (tx, rx) = mpsc::channel();
    thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(e) => {
                    log::error!("stdin: {}", e);
                    break;
                }
            }
        }
    });
    rx
}

fn report(session: &Session<RingCaptureSink>, outcome: &Outcome) {
    match outcome {
        Outcome::Unlocked => println!("Engine unlocked"),
        Outcome::Toggled { .. } => {
            print_grid(session, None);
            println!("{}", session.impact());
        }
        Outcome::Started => println!("Playing at {}", session.transport().tempo()),
        Outcome::Stopped => println!("Stopped"),
        Outcome::TempoChanged(tempo) => println!("Tempo {}", tempo),
        Outcome::Recording(plan) => println!(
            "Recording {} bars ({:.2}s at {})",
            plan.bars, plan.seconds, plan.tempo
        ),
    }
}

fn print_grid(session: &Session<RingCaptureSink>, playhead: Option<usize>) {
    let pattern = session.pattern();
    let names = &session.config().tracks;

    for track in 0..pattern.tracks() {
        let name = names.get(track).map(|t| t.name.as_str()).unwrap_or("?");
        let mut line = format!("{:>2} {:<6}", track, name);
        if let Ok(row) = pattern.row(track) {
            for (step, active) in row.iter().enumerate() {
                if step % 4 == 0 {
                    line.push(' ');
                }
                line.push(match (*active, playhead == Some(step)) {
                    (true, true) => '#',
                    (false, true) => '|',
                    (true, false) => 'x',
                    (false, false) => '.',
                });
            }
        }
        println!("{}", line);
    }
}

fn print_cursor(session: &Session<RingCaptureSink>, step: usize) {
    let steps = session.pattern().steps();
    let bar: String = (0..steps).map(|s| if s == step { '^' } else { '-' }).collect();
    let progress = session
        .capture_progress()
        .map(|p| format!("  rec {:>3.0}%", p * 100.0))
        .unwrap_or_default();
    print!("\r[{}] step {:>2}{}", bar, step, progress);
    let _ = io::stdout().flush();
}

fn save_capture(artifact: &CaptureArtifact, dir: &Path) {
    match artifact.save(dir) {
        Ok(path) => println!("\nSaved {}", path.display()),
        Err(e) => eprintln!("\nCould not save capture: {}", e),
    }
}
