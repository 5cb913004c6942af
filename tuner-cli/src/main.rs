// tuner-cli/src/main.rs

//! Command line front-end for the StringThing tuner.
//!
//! `listen` runs a session against an input device and prints every snapshot
//! it publishes. `devices` and `presets` list what is available.

use anyhow::{Context, bail};
use clap::{Arg, ArgAction, ArgMatches, Command, value_parser};
use crossbeam_channel::{Receiver, after, never};
use log::info;
use std::fs;
use std::io::{self, Write};
use std::thread;
use std::time::{Duration, Instant};

use stringthing_core::audio::{self, CpalInputProvider};
use stringthing_core::catalog::{self, Instrument, TuningPreset};
use stringthing_core::meter::{self, TuningStatus};
use stringthing_core::notes;
use stringthing_core::scheduler::FrameClock;
use stringthing_core::{Session, SessionConfig, SessionSnapshot, SessionState};

/// Width of the text meter, odd so 0 cents has a centre cell.
const METER_WIDTH: usize = 21;

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let matches = Command::new("stringthing")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Chromatic tuner for guitar and bass")
        .subcommand_required(true)
        .subcommand(
            Command::new("listen")
                .about("Listen to an input device and show the detected pitch")
                .arg(
                    Arg::new("device")
                        .short('d')
                        .long("device")
                        .value_name("NAME")
                        .help("Input device name (default: system default input)"),
                )
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .value_name("FILE")
                        .help("JSON session configuration; flags below override it"),
                )
                .arg(
                    Arg::new("rate")
                        .long("rate")
                        .value_name("HZ")
                        .value_parser(value_parser!(u32))
                        .help("Requested sample rate in Hz (default: 48000)"),
                )
                .arg(
                    Arg::new("window")
                        .long("window")
                        .value_name("SAMPLES")
                        .value_parser(value_parser!(usize))
                        .help("Analysis window in samples (default: 4096)"),
                )
                .arg(
                    Arg::new("silence")
                        .long("silence")
                        .value_name("RMS")
                        .value_parser(value_parser!(f64))
                        .help("RMS level treated as silence (default: 0.01)"),
                )
                .arg(
                    Arg::new("clarity")
                        .long("clarity")
                        .value_name("NUMBER")
                        .value_parser(value_parser!(f64))
                        .help("Minimum correlation of a pitched window, 0-1 (default: 0.8)"),
                )
                .arg(
                    Arg::new("seconds")
                        .short('s')
                        .long("seconds")
                        .value_name("SECONDS")
                        .value_parser(value_parser!(f64))
                        .help("Stop after this many seconds (default: run until interrupted)"),
                )
                .arg(
                    Arg::new("preset")
                        .short('p')
                        .long("preset")
                        .value_name("NAME")
                        .help("Tune against the nearest string of a preset, e.g. \"DADGAD\""),
                )
                .arg(
                    Arg::new("target")
                        .short('t')
                        .long("target")
                        .value_name("NOTE")
                        .conflicts_with("preset")
                        .help("Tune against a fixed note, e.g. \"E2\" or \"C#3\""),
                )
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print one JSON snapshot per line"),
                ),
        )
        .subcommand(Command::new("devices").about("List audio input devices"))
        .subcommand(
            Command::new("presets")
                .about("List the tuning presets")
                .arg(
                    Arg::new("json")
                        .long("json")
                        .action(ArgAction::SetTrue)
                        .help("Print the presets as JSON"),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("listen", args)) => listen(args),
        Some(("devices", _)) => list_devices(),
        Some(("presets", args)) => list_presets(args.get_flag("json")),
        _ => unreachable!("a subcommand is required"),
    }
}

/// What the status line measures cents against.
enum Reference {
    Chromatic,
    Preset(&'static TuningPreset),
    Note(String, f64),
}

fn listen(args: &ArgMatches) -> anyhow::Result<()> {
    let config = session_config(args)?;
    let reference = reference(args)?;
    let duration = run_duration(args)?;
    let json = args.get_flag("json");

    let provider = match args.get_one::<String>("device") {
        Some(name) => CpalInputProvider::with_device(name.clone()),
        None => CpalInputProvider::new(),
    };

    let mut session = Session::new(config, provider, FrameClock::default())
        .context("Invalid session configuration")?;
    let snapshots = session.subscribe();
    let printer = thread::spawn(move || print_snapshots(snapshots, reference, json));

    let shutdown: Receiver<Instant> = duration.map_or_else(never, after);

    info!("Listening; interrupt to stop");
    session.start_listening();
    session.run_until(&shutdown);

    let failure = (session.state() == SessionState::Error)
        .then(|| session.error().unwrap_or("unknown error").to_string());
    // Closes the snapshot channel so the printer finishes.
    drop(session);
    if printer.join().is_err() {
        bail!("Snapshot printer panicked");
    }

    match failure {
        Some(message) => bail!("Audio input failed: {message}"),
        None => Ok(()),
    }
}

/// How long `listen` runs, `None` for until interrupted.
fn run_duration(args: &ArgMatches) -> anyhow::Result<Option<Duration>> {
    match args.get_one::<f64>("seconds") {
        Some(&seconds) if seconds.is_finite() && seconds > 0.0 => {
            Ok(Some(Duration::from_secs_f64(seconds)))
        }
        Some(seconds) => bail!("--seconds must be a positive number, got {seconds}"),
        None => Ok(None),
    }
}

fn session_config(args: &ArgMatches) -> anyhow::Result<SessionConfig> {
    let mut config = match args.get_one::<String>("config") {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("Cannot read config file '{path}'"))?;
            serde_json::from_str::<SessionConfig>(&text)
                .with_context(|| format!("Invalid config file '{path}'"))?
        }
        None => SessionConfig::default(),
    };

    if let Some(&rate) = args.get_one::<u32>("rate") {
        config.sample_rate = rate;
    }
    if let Some(&window) = args.get_one::<usize>("window") {
        config.window_size = window;
    }
    if let Some(&silence) = args.get_one::<f64>("silence") {
        config.estimator.silence_threshold = silence;
    }
    if let Some(&clarity) = args.get_one::<f64>("clarity") {
        config.estimator.clarity_threshold = clarity;
    }
    Ok(config)
}

fn reference(args: &ArgMatches) -> anyhow::Result<Reference> {
    if let Some(name) = args.get_one::<String>("preset") {
        let preset = catalog::find_preset(name)
            .with_context(|| format!("Unknown preset '{name}'; see `stringthing presets`"))?;
        return Ok(Reference::Preset(preset));
    }
    if let Some(note) = args.get_one::<String>("target") {
        let (class, octave) = notes::parse_note(note)?;
        return Ok(Reference::Note(
            format!("{class}{octave}"),
            notes::note_frequency(class, octave),
        ));
    }
    Ok(Reference::Chromatic)
}

fn print_snapshots(snapshots: Receiver<SessionSnapshot>, reference: Reference, json: bool) {
    let stdout = io::stdout();
    for snapshot in snapshots {
        let mut out = stdout.lock();
        let written = if json {
            match serde_json::to_string(&snapshot) {
                Ok(line) => writeln!(out, "{line}"),
                Err(err) => writeln!(out, "{{\"error\":\"{err}\"}}"),
            }
        } else {
            write!(out, "\r{:<80}", status_line(&snapshot, &reference)).and_then(|_| out.flush())
        };
        if written.is_err() {
            return;
        }
    }
    if !json {
        println!();
    }
}

fn status_line(snapshot: &SessionSnapshot, reference: &Reference) -> String {
    let reading = &snapshot.reading;
    match snapshot.state {
        SessionState::Listening if reading.is_playing() => {
            let (label, cents) = match reference {
                Reference::Chromatic => (reading.to_string(), reading.cents() as f64),
                Reference::Preset(preset) => match preset.nearest_string(reading.frequency()) {
                    Some((string, cents)) => (
                        format!("string {} {string} ({:.2} Hz)", string.string, reading.frequency()),
                        cents,
                    ),
                    None => (reading.to_string(), reading.cents() as f64),
                },
                Reference::Note(name, target) => (
                    format!("{name} ({:.2} Hz)", reading.frequency()),
                    notes::cents_between(reading.frequency(), *target),
                ),
            };
            let status = TuningStatus::classify(cents);
            format!("{label:<32} {cents:+6.1} {} {status}", meter_bar(cents))
        }
        SessionState::Listening => format!("{:<32} {:>6} {}", "-", "", meter_bar(f64::NAN)),
        SessionState::Error => format!(
            "error: {}",
            snapshot.error.as_deref().unwrap_or("unknown error")
        ),
        state => format!("{state}..."),
    }
}

fn meter_bar(cents: f64) -> String {
    let position = meter::cents_indicator(cents) / 100.0 * (METER_WIDTH - 1) as f64;
    let needle = position.round() as usize;
    let centre = METER_WIDTH / 2;
    let cells: String = (0..METER_WIDTH)
        .map(|i| {
            if cents.is_nan() {
                if i == centre { '|' } else { '-' }
            } else if i == needle {
                '*'
            } else if i == centre {
                '|'
            } else {
                '-'
            }
        })
        .collect();
    format!("[{cells}]")
}

fn list_devices() -> anyhow::Result<()> {
    let default = audio::default_input_device_name();
    for name in audio::input_device_names()? {
        let marker = if default.as_deref() == Some(name.as_str()) { "*" } else { " " };
        println!("{marker} {name}");
    }
    Ok(())
}

fn list_presets(json: bool) -> anyhow::Result<()> {
    if json {
        let presets: Vec<&TuningPreset> = catalog::all_presets().collect();
        println!("{}", serde_json::to_string_pretty(&presets)?);
        return Ok(());
    }

    for instrument in Instrument::ALL {
        println!("{instrument}");
        for preset in catalog::presets(instrument) {
            let strings: Vec<String> = preset
                .strings
                .iter()
                .map(|string| format!("{string} {:.2} Hz", string.frequency))
                .collect();
            println!("  {:<36} {}", preset.name, strings.join(", "));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn listen_args(extra: &[&str]) -> ArgMatches {
        let command = Command::new("listen").arg(
            Arg::new("seconds")
                .long("seconds")
                .allow_negative_numbers(true)
                .value_parser(value_parser!(f64)),
        );
        command
            .try_get_matches_from(std::iter::once("listen").chain(extra.iter().copied()))
            .unwrap()
    }

    #[test]
    fn run_duration_rejects_non_positive_seconds() {
        assert!(run_duration(&listen_args(&["--seconds", "0"])).is_err());
        assert!(run_duration(&listen_args(&["--seconds", "-2"])).is_err());
        assert!(run_duration(&listen_args(&["--seconds", "inf"])).is_err());
        assert_eq!(
            run_duration(&listen_args(&["--seconds", "1.5"])).unwrap(),
            Some(Duration::from_millis(1500))
        );
        assert_eq!(run_duration(&listen_args(&[])).unwrap(), None);
    }

    #[test]
    fn meter_needle_tracks_cents() {
        assert_eq!(meter_bar(0.0), "[----------*----------]");
        assert_eq!(meter_bar(-50.0), "[*---------|----------]");
        assert_eq!(meter_bar(80.0), "[----------|---------*]");
        assert_eq!(meter_bar(f64::NAN), "[----------|----------]");
    }
}
