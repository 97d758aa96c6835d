//! Terminal front end.
//!
//! `capty displays` lists monitors, `capty select` prints a picked area,
//! `capty record` records until Enter or Ctrl-C. Without `--area` or
//! `--display`, `record` launches the area selector first.

use crate::capture::{self, Region, Selection};
use crate::config::RecorderConfig;
use crate::recording::{
    default_base_name, AudioSources, OutputFormat, OutputSpec, Outcome, SessionController,
    SessionEvent, SessionReport,
};
use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::UnboundedReceiver;

const DEFAULT_FPS: u32 = 30;

#[derive(Debug, Parser)]
#[command(
    name = "capty",
    about = "Record a screen area to MP4 or GIF",
    version,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// List monitors.
    Displays {
        /// Print the list as JSON (for scripting).
        #[arg(long)]
        json: bool,
    },
    /// Pick an area and print it as X,Y,W,H.
    Select,
    /// Record until Enter or Ctrl-C.
    Record(RecordArgs),
}

#[derive(Debug, Args)]
pub struct RecordArgs {
    /// Base file name (default: capture-<timestamp>).
    #[arg(long)]
    pub name: Option<String>,
    /// Produce a GIF instead of an MP4.
    #[arg(long)]
    pub gif: bool,
    /// Frame rate.
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,
    /// Seconds to wait before the encoder starts.
    #[arg(long, value_name = "SECS", default_value_t = 0)]
    pub delay: u64,
    /// Record the microphone.
    #[arg(long)]
    pub mic: bool,
    /// Record system audio.
    #[arg(long)]
    pub system_audio: bool,
    /// Record this rectangle.
    #[arg(long, value_name = "X,Y,W,H", value_parser = parse_area, conflicts_with = "display")]
    pub area: Option<Region>,
    /// Record a whole monitor (see `capty displays`).
    #[arg(long, value_name = "ID")]
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetArg {
    Area(Region),
    Display(String),
    Interactive,
}

impl RecordArgs {
    pub fn spec(&self) -> OutputSpec {
        OutputSpec {
            base_name: self.name.clone().unwrap_or_else(default_base_name),
            format: if self.gif {
                OutputFormat::Gif
            } else {
                OutputFormat::Mp4
            },
            fps: self.fps,
            audio: AudioSources {
                mic: self.mic,
                system_audio: self.system_audio,
            },
            start_delay_secs: self.delay,
        }
    }

    pub fn target(&self) -> TargetArg {
        match (&self.area, &self.display) {
            (Some(region), _) => TargetArg::Area(*region),
            (None, Some(id)) => TargetArg::Display(id.clone()),
            (None, None) => TargetArg::Interactive,
        }
    }
}

/// Parses `X,Y,W,H`.
fn parse_area(raw: &str) -> Result<Region, String> {
    let bad = || format!("expected X,Y,W,H, got '{}'", raw);
    let parts: Vec<&str> = raw.split(',').map(str::trim).collect();
    let [x, y, w, h] = parts.as_slice() else {
        return Err(bad());
    };
    Region::new(
        x.parse().map_err(|_| bad())?,
        y.parse().map_err(|_| bad())?,
        w.parse().map_err(|_| bad())?,
        h.parse().map_err(|_| bad())?,
    )
    .map_err(|e| e.to_string())
}

/// Runs the terminal front end and exits the process.
pub fn run() {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start async runtime: {}", e);
            std::process::exit(1);
        }
    };

    let config = RecorderConfig::from_env();
    let code = runtime.block_on(execute(config, cli.command));

    // A pending stdin read would otherwise hold up shutdown.
    runtime.shutdown_background();
    std::process::exit(code);
}

async fn execute(config: RecorderConfig, command: Commands) -> i32 {
    let result = match command {
        Commands::Displays { json } => print_displays(&config, json).await,
        Commands::Select => print_selection(&config).await,
        Commands::Record(args) => record(config, args).await,
    };

    match result {
        Ok(()) => 0,
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

async fn print_displays(config: &RecorderConfig, json: bool) -> Result<(), String> {
    let displays =
        capture::list_displays(&config.tools.display_lister, config.fallback_resolution).await;
    if json {
        let text = serde_json::to_string_pretty(&displays).map_err(|e| e.to_string())?;
        println!("{}", text);
        return Ok(());
    }
    for d in displays {
        println!(
            "{}\t{}x{}\t+{}+{}",
            d.id, d.resolution.0, d.resolution.1, d.origin.0, d.origin.1
        );
    }
    Ok(())
}

async fn print_selection(config: &RecorderConfig) -> Result<(), String> {
    match capture::select_area(&config.tools.selector)
        .await
        .map_err(|e| e.to_string())?
    {
        Selection::Picked(region) => {
            println!(
                "{},{},{},{}",
                region.x(),
                region.y(),
                region.width(),
                region.height()
            );
            Ok(())
        }
        Selection::Cancelled => Err("Selection cancelled".to_string()),
    }
}

async fn record(config: RecorderConfig, args: RecordArgs) -> Result<(), String> {
    let (controller, mut events) = SessionController::new(config);

    match args.target() {
        TargetArg::Area(region) => controller.set_area(region),
        TargetArg::Display(id) => {
            let display = controller
                .list_displays()
                .await
                .into_iter()
                .find(|d| d.id == id)
                .ok_or_else(|| format!("No display named '{}' (see `capty displays`)", id))?;
            controller.set_display(display);
        }
        TargetArg::Interactive => {
            let selection = controller.select_area().await.map_err(|e| e.to_string())?;
            if selection == Selection::Cancelled {
                return Err("Selection cancelled".to_string());
            }
        }
    }

    controller
        .start_session(args.spec())
        .map_err(|e| e.to_string())?;
    eprintln!("Press Enter or Ctrl-C to stop.");

    let stdin = BufReader::new(tokio::io::stdin());
    let report = drive_session(&controller, &mut events, stdin).await?;
    finish(report)
}

/// Prints session events until the session ends, then acknowledges it.
///
/// A line on `input` or Ctrl-C requests a stop. A closed or unreadable
/// `input` is not a stop request; Ctrl-C keeps working.
async fn drive_session<R>(
    controller: &SessionController,
    events: &mut UnboundedReceiver<SessionEvent>,
    input: R,
) -> Result<SessionReport, String>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut input_open = true;
    let mut stop_sent = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => {
                    eprintln!("[{}] {}", event.phase, event.status);
                    if event.phase.is_terminal() {
                        break;
                    }
                }
                None => break,
            },
            line = lines.next_line(), if input_open && !stop_sent => match line {
                Ok(Some(_)) => {
                    stop_sent = true;
                    request_stop(controller);
                }
                Ok(None) => {
                    log::info!("[CLI] Input closed; Ctrl-C still stops the recording");
                    input_open = false;
                }
                Err(e) => {
                    log::warn!("[CLI] Input unreadable ({}); Ctrl-C still stops the recording", e);
                    input_open = false;
                }
            },
            _ = tokio::signal::ctrl_c(), if !stop_sent => {
                stop_sent = true;
                request_stop(controller);
            }
        }
    }

    controller.acknowledge().await.map_err(|e| e.to_string())
}

fn request_stop(controller: &SessionController) {
    match controller.stop_session() {
        Ok(ack) => log::info!("[CLI] Stop requested: {:?}", ack),
        Err(e) => log::info!("[CLI] Stop ignored: {}", e),
    }
}

fn finish(report: SessionReport) -> Result<(), String> {
    match report.outcome {
        Outcome::Completed { artifact, .. } => {
            println!("{}", artifact.display());
            Ok(())
        }
        // Only a stop during the start delay ends here.
        Outcome::Cancelled => {
            eprintln!("Recording cancelled before it started.");
            Ok(())
        }
        Outcome::Failed(err) => Err(err.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn parse(line: &str) -> Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("capty").chain(line.split_whitespace()))
    }

    fn record_args(line: &str) -> RecordArgs {
        match parse(line).unwrap().command {
            Commands::Record(args) => args,
            other => panic!("expected record, got {:?}", other),
        }
    }

    #[test]
    fn no_arguments_is_an_error_with_help() {
        let err = parse("").unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::DisplayHelpOnMissingArgumentOrSubcommand
        );
    }

    #[test]
    fn simple_commands() {
        assert!(matches!(
            parse("displays").unwrap().command,
            Commands::Displays { json: false }
        ));
        assert!(matches!(
            parse("displays --json").unwrap().command,
            Commands::Displays { json: true }
        ));
        assert!(parse("displays --yaml").is_err());
        assert!(matches!(parse("select").unwrap().command, Commands::Select));
        assert!(parse("select now").is_err());
        assert!(parse("screenshot").is_err());
    }

    #[test]
    fn record_defaults() {
        let args = record_args("record");
        let spec = args.spec();
        assert_eq!(args.target(), TargetArg::Interactive);
        assert_eq!(spec.format, OutputFormat::Mp4);
        assert_eq!(spec.fps, DEFAULT_FPS);
        assert_eq!(spec.start_delay_secs, 0);
        assert!(!spec.audio.any());
        assert!(spec.base_name.starts_with("capture-"));
    }

    #[test]
    fn record_with_everything() {
        let args = record_args(
            "record --name demo --gif --fps 12 --delay 3 --mic --system-audio --area 10,20,300,200",
        );
        let spec = args.spec();
        assert_eq!(spec.base_name, "demo");
        assert_eq!(spec.format, OutputFormat::Gif);
        assert_eq!(spec.fps, 12);
        assert_eq!(spec.start_delay_secs, 3);
        assert!(spec.audio.mic && spec.audio.system_audio);
        assert_eq!(
            args.target(),
            TargetArg::Area(Region::new(10, 20, 300, 200).unwrap())
        );
    }

    #[test]
    fn record_display_target() {
        let args = record_args("record --display HDMI-1");
        assert_eq!(args.target(), TargetArg::Display("HDMI-1".to_string()));
    }

    #[test]
    fn bad_record_options() {
        assert!(parse("record --fps").is_err());
        assert!(parse("record --fps fast").is_err());
        assert!(parse("record --area 1,2,3").is_err());
        assert!(parse("record --area 0,0,0,10").is_err());
        assert!(parse("record --area 0,0,10,10 --display HDMI-1").is_err());
        assert!(parse("record --loud").is_err());
    }

    fn session(out: &std::path::Path) -> (SessionController, UnboundedReceiver<SessionEvent>) {
        let mut config = RecorderConfig::default();
        config.output_dir = out.to_path_buf();
        config.tools.encoder = PathBuf::from("true");
        let (controller, events) = SessionController::new(config);
        controller.set_area(Region::new(0, 0, 64, 64).unwrap());
        (controller, events)
    }

    fn delayed_spec(secs: u64) -> OutputSpec {
        OutputSpec {
            base_name: "clip".to_string(),
            format: OutputFormat::Mp4,
            fps: 10,
            audio: AudioSources::default(),
            start_delay_secs: secs,
        }
    }

    #[tokio::test]
    async fn closed_input_does_not_stop_the_session() {
        let out = tempfile::tempdir().unwrap();
        let (controller, mut events) = session(out.path());
        controller.start_session(delayed_spec(1)).unwrap();

        let report = drive_session(&controller, &mut events, &b""[..])
            .await
            .unwrap();
        assert!(
            matches!(report.outcome, Outcome::Completed { .. }),
            "{:?}",
            report.outcome
        );
    }

    #[tokio::test]
    async fn a_line_of_input_stops_the_session() {
        let out = tempfile::tempdir().unwrap();
        let (controller, mut events) = session(out.path());
        controller.start_session(delayed_spec(30)).unwrap();

        let report = drive_session(&controller, &mut events, &b"\n"[..])
            .await
            .unwrap();
        assert_eq!(report.outcome, Outcome::Cancelled);
    }
}
