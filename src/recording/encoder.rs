//! Encoder process management — ffmpeg x11grab invocation, stop signal,
//! exit classification.
//!
//! The encoder runs in its own process group so a stop request can reach
//! everything it spawned, and so the terminal's Ctrl-C never reaches it
//! directly. Stopping is always two steps: SIGINT to the group, then wait.
//! A group still alive after the grace period gets SIGKILL.

use super::output::OutputSpec;
use crate::capture::Region;
use crate::config::RecorderConfig;
use serde::Serialize;
use std::os::unix::process::ExitStatusExt;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};

/// ffmpeg's exit code after it was interrupted and finalized the file.
pub const FFMPEG_INTERRUPT_EXIT: i32 = 255;

/// Which non-zero exits count as a clean stop.
///
/// Some encoders (ffmpeg among them) treat SIGINT as "finish the file and
/// quit" and report a non-zero code for it. Others treat interruption as a
/// failure. This is only consulted when a stop was actually requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitPolicy {
    pub accept_interrupt: bool,
    /// Exit codes that mean "interrupted and finalized".
    pub interrupt_codes: Vec<i32>,
}

impl Default for ExitPolicy {
    fn default() -> Self {
        Self {
            accept_interrupt: true,
            interrupt_codes: vec![FFMPEG_INTERRUPT_EXIT],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExitClass {
    /// Exit code 0.
    Clean,
    /// Terminated by our stop request in an accepted way.
    Interrupted,
    /// Anything else, with a printable description.
    Abnormal(String),
}

impl ExitClass {
    pub fn is_success(&self) -> bool {
        !matches!(self, ExitClass::Abnormal(_))
    }
}

impl ExitPolicy {
    pub fn classify(&self, status: ExitStatus, stop_requested: bool) -> ExitClass {
        if status.success() {
            return ExitClass::Clean;
        }

        if stop_requested && self.accept_interrupt {
            if let Some(code) = status.code() {
                if self.interrupt_codes.contains(&code) {
                    return ExitClass::Interrupted;
                }
            }
            if let Some(sig) = status.signal() {
                if sig == libc::SIGINT || sig == libc::SIGTERM {
                    return ExitClass::Interrupted;
                }
            }
        }

        ExitClass::Abnormal(describe_status(status))
    }
}

pub fn describe_status(status: ExitStatus) -> String {
    match (status.code(), status.signal()) {
        (Some(code), _) => format!("exit code {}", code),
        (None, Some(sig)) => format!("killed by signal {}", sig),
        _ => status.to_string(),
    }
}

/// Builds the encoder argument list for one recording.
///
/// `-n` makes the encoder refuse to overwrite an existing file, backing up
/// the path allocator.
pub fn encoder_args(
    config: &RecorderConfig,
    region: &Region,
    spec: &OutputSpec,
    output: &Path,
) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-loglevel".into(),
        "error".into(),
        "-nostdin".into(),
        "-n".into(),
        "-f".into(),
        "x11grab".into(),
        "-video_size".into(),
        region.size_arg(),
        "-framerate".into(),
        spec.fps.to_string(),
        "-draw_mouse".into(),
        (if config.video.draw_mouse { "1" } else { "0" }).to_string(),
        "-i".into(),
        format!("{}+{},{}", config.x11_display, region.x(), region.y()),
    ];

    let mut audio_inputs = Vec::new();
    if spec.audio.mic {
        audio_inputs.push(config.audio.mic_source.as_str());
    }
    if spec.audio.system_audio {
        audio_inputs.push(config.audio.system_source.as_str());
    }
    for source in &audio_inputs {
        push_all(&mut args, &["-f", "pulse", "-i", *source]);
    }

    match audio_inputs.len() {
        0 => {}
        1 => push_all(&mut args, &["-map", "0:v", "-map", "1:a"]),
        _ => push_all(
            &mut args,
            &[
                "-filter_complex",
                "[1:a][2:a]amix=inputs=2:duration=longest[a]",
                "-map",
                "0:v",
                "-map",
                "[a]",
            ],
        ),
    }

    let crf = config.video.crf.to_string();
    push_all(
        &mut args,
        &[
            "-c:v",
            config.video.codec.as_str(),
            "-preset",
            config.video.preset.as_str(),
            "-crf",
            crf.as_str(),
            "-pix_fmt",
            "yuv420p",
            // yuv420p needs even dimensions
            "-vf",
            "crop=trunc(iw/2)*2:trunc(ih/2)*2",
        ],
    );

    if spec.audio.any() {
        push_all(&mut args, &["-c:a", "aac"]);
    }

    args.push(output.to_string_lossy().into_owned());
    args
}

fn push_all(args: &mut Vec<String>, items: &[&str]) {
    args.extend(items.iter().map(|s| s.to_string()));
}

/// Spawns the encoder as the leader of a new process group.
pub fn spawn_encoder(program: &Path, args: &[String]) -> std::io::Result<Child> {
    log::info!("[ENCODER] {} {}", program.display(), args.join(" "));

    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .process_group(0)
        .spawn()
}

/// How a stop request reached the encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SignalDelivery {
    /// SIGINT delivered to the whole process group.
    ProcessGroup,
    /// Group signaling failed; SIGTERM was sent to the encoder itself.
    DirectProcess { group_error: String },
    /// Neither signal could be delivered (usually: already exited).
    Undelivered { error: String },
}

/// Asks the encoder (and everything in its group) to finish up.
///
/// Best effort: a failed group signal falls back to SIGTERM on the pid,
/// and the outcome is reported rather than raised.
pub fn interrupt_group(pid: u32) -> SignalDelivery {
    let pid = pid as libc::pid_t;

    // Safety: getpgid/killpg/kill take plain integers and touch no memory.
    let group_result = unsafe {
        let pgid = libc::getpgid(pid);
        if pgid < 0 {
            -1
        } else {
            libc::killpg(pgid, libc::SIGINT)
        }
    };

    if group_result == 0 {
        log::info!("[ENCODER] Sent SIGINT to process group of {}", pid);
        return SignalDelivery::ProcessGroup;
    }

    let group_error = std::io::Error::last_os_error().to_string();
    log::warn!(
        "[ENCODER] Group signal for {} failed ({}) — falling back to SIGTERM",
        pid,
        group_error
    );

    if unsafe { libc::kill(pid, libc::SIGTERM) } == 0 {
        SignalDelivery::DirectProcess { group_error }
    } else {
        let error = std::io::Error::last_os_error().to_string();
        log::warn!("[ENCODER] SIGTERM to {} failed: {}", pid, error);
        SignalDelivery::Undelivered { error }
    }
}

/// Kills the encoder's whole process group with SIGKILL.
///
/// Used once the stop grace period has run out. Returns false if the group
/// could not be signalled; the caller then kills the direct child.
pub fn kill_group(pid: u32) -> bool {
    let pid = pid as libc::pid_t;

    // Safety: see interrupt_group.
    let result = unsafe {
        let pgid = libc::getpgid(pid);
        if pgid < 0 {
            -1
        } else {
            libc::killpg(pgid, libc::SIGKILL)
        }
    };

    if result == 0 {
        log::warn!("[ENCODER] Killed process group of {}", pid);
        true
    } else {
        log::warn!(
            "[ENCODER] SIGKILL to group of {} failed: {}",
            pid,
            std::io::Error::last_os_error()
        );
        false
    }
}
