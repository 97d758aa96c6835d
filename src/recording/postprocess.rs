//! GIF conversion pipeline: palette → encode → optimize.
//!
//! Stages run strictly in order and stop at the first failure. Each stage
//! is one external invocation whose only success signal is exit status 0.
//! The palette and the recorded video are left on disk afterwards.

use super::error::SessionError;
use super::output::OutputPaths;
use crate::config::RecorderConfig;
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Palette,
    Encode,
    Optimize,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::Palette => "palette",
            Stage::Encode => "encode",
            Stage::Optimize => "optimize",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineReport {
    pub artifact: PathBuf,
    /// False when the optimizer was not installed.
    pub optimized: bool,
}

/// One external invocation.
#[derive(Debug, Clone)]
struct StageCommand {
    stage: Stage,
    program: PathBuf,
    args: Vec<String>,
}

fn lanczos_filter(fps: u32) -> String {
    format!("fps={},scale=iw:-1:flags=lanczos", fps)
}

/// `{gif}.part`: the encode stage writes here and the result is published
/// on success, so a failed encode never leaves a file at the artifact path.
pub fn staging_path(gif: &Path) -> PathBuf {
    let mut name = gif.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

fn palette_command(encoder: &Path, fps: u32, video: &Path, palette: &Path) -> StageCommand {
    StageCommand {
        stage: Stage::Palette,
        program: encoder.to_path_buf(),
        args: vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostdin".into(),
            "-n".into(),
            "-i".into(),
            video.to_string_lossy().into_owned(),
            "-vf".into(),
            format!("{},palettegen", lanczos_filter(fps)),
            palette.to_string_lossy().into_owned(),
        ],
    }
}

fn encode_command(encoder: &Path, fps: u32, video: &Path, palette: &Path, staging: &Path) -> StageCommand {
    StageCommand {
        stage: Stage::Encode,
        program: encoder.to_path_buf(),
        args: vec![
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-nostdin".into(),
            "-n".into(),
            "-i".into(),
            video.to_string_lossy().into_owned(),
            "-i".into(),
            palette.to_string_lossy().into_owned(),
            "-filter_complex".into(),
            format!("{}[x];[x][1:v]paletteuse", lanczos_filter(fps)),
            "-f".into(),
            "gif".into(),
            staging.to_string_lossy().into_owned(),
        ],
    }
}

fn optimize_command(optimizer: &Path, gif: &Path) -> StageCommand {
    let gif = gif.to_string_lossy().into_owned();
    StageCommand {
        stage: Stage::Optimize,
        program: optimizer.to_path_buf(),
        args: vec!["-O3".into(), gif.clone(), "-o".into(), gif],
    }
}

/// Converts the recorded video into the GIF at `paths.primary`.
pub async fn run(config: &RecorderConfig, fps: u32, paths: &OutputPaths) -> Result<PipelineReport, SessionError> {
    let start = Instant::now();

    let video = paths.recording_path();
    let palette = paths.palette.as_deref().ok_or_else(|| SessionError::PostProcess {
        stage: Stage::Palette,
        reason: "no palette path was allocated".to_string(),
    })?;
    let gif = paths.primary.as_path();
    let staging = staging_path(gif);

    run_stage(palette_command(&config.tools.encoder, fps, video, palette)).await?;

    run_stage(encode_command(&config.tools.encoder, fps, video, palette, &staging)).await?;
    publish(&staging, gif).await?;

    let optimized = match which::which(&config.tools.optimizer) {
        Ok(optimizer) => {
            run_stage(optimize_command(&optimizer, gif)).await?;
            true
        }
        Err(_) => {
            log::info!(
                "[PIPELINE] {} not found — skipping optimization",
                config.tools.optimizer.display()
            );
            false
        }
    };

    log::info!(
        "[PIPELINE] {} ready in {}ms (optimized: {})",
        gif.display(),
        start.elapsed().as_millis(),
        optimized
    );

    Ok(PipelineReport {
        artifact: gif.to_path_buf(),
        optimized,
    })
}

/// Moves the finished staging file to `gif` without replacing anything.
///
/// A hard link fails if `gif` exists. Filesystems without hard links fall
/// back to an existence check followed by a rename.
async fn publish(staging: &Path, gif: &Path) -> Result<(), SessionError> {
    let failed = |reason: String| SessionError::PostProcess {
        stage: Stage::Encode,
        reason,
    };

    match tokio::fs::hard_link(staging, gif).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            discard(staging).await;
            return Err(failed(format!(
                "{} appeared after the name was allocated; not replacing it",
                gif.display()
            )));
        }
        Err(e) => {
            log::warn!("[PIPELINE] Hard link into place failed ({}), renaming instead", e);
            if tokio::fs::try_exists(gif).await.unwrap_or(true) {
                discard(staging).await;
                return Err(failed(format!(
                    "{} already exists; not replacing it",
                    gif.display()
                )));
            }
            return tokio::fs::rename(staging, gif).await.map_err(|e| {
                failed(format!("could not move {} into place: {}", staging.display(), e))
            });
        }
    }

    discard(staging).await;
    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        log::warn!("[PIPELINE] Could not remove {}: {}", path.display(), e);
    }
}

async fn run_stage(cmd: StageCommand) -> Result<(), SessionError> {
    let start = Instant::now();
    log::info!(
        "[PIPELINE] {}: {} {}",
        cmd.stage,
        cmd.program.display(),
        cmd.args.join(" ")
    );

    let output = Command::new(&cmd.program)
        .args(&cmd.args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SessionError::PostProcess {
            stage: cmd.stage,
            reason: format!("failed to run {}: {}", cmd.program.display(), e),
        })?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let detail = stderr.lines().last().unwrap_or("").trim();
        log::error!("[PIPELINE] {} failed ({}): {}", cmd.stage, output.status, detail);
        return Err(SessionError::PostProcess {
            stage: cmd.stage,
            reason: if detail.is_empty() {
                output.status.to_string()
            } else {
                format!("{}: {}", output.status, detail)
            },
        });
    }

    log::info!("[PIPELINE] {} done in {}ms", cmd.stage, start.elapsed().as_millis());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names() {
        assert_eq!(Stage::Palette.to_string(), "palette");
        assert_eq!(Stage::Encode.to_string(), "encode");
        assert_eq!(Stage::Optimize.to_string(), "optimize");
    }

    #[test]
    fn palette_stage_uses_session_fps() {
        let cmd = palette_command(
            Path::new("ffmpeg"),
            24,
            Path::new("/v/demo.mp4"),
            Path::new("/v/demo_palette.png"),
        );
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-i /v/demo.mp4"));
        assert!(joined.contains("fps=24,scale=iw:-1:flags=lanczos,palettegen"));
        assert_eq!(cmd.args.last().unwrap(), "/v/demo_palette.png");
    }

    #[test]
    fn encode_stage_writes_to_staging_file() {
        let gif = Path::new("/v/demo.gif");
        let staging = staging_path(gif);
        assert_eq!(staging, PathBuf::from("/v/demo.gif.part"));

        let cmd = encode_command(
            Path::new("ffmpeg"),
            15,
            Path::new("/v/demo.mp4"),
            Path::new("/v/demo_palette.png"),
            &staging,
        );
        let joined = cmd.args.join(" ");
        assert!(joined.contains("-i /v/demo.mp4 -i /v/demo_palette.png"));
        assert!(joined.contains("fps=15,scale=iw:-1:flags=lanczos[x];[x][1:v]paletteuse"));
        assert!(joined.contains("-f gif"));
        assert!(cmd.args.contains(&"-n".to_string()));
        assert!(!cmd.args.contains(&"-y".to_string()));
        assert_eq!(cmd.args.last().unwrap(), "/v/demo.gif.part");
    }

    #[test]
    fn optimize_stage_rewrites_in_place() {
        let cmd = optimize_command(Path::new("/usr/bin/gifsicle"), Path::new("/v/demo.gif"));
        assert_eq!(cmd.args, vec!["-O3", "/v/demo.gif", "-o", "/v/demo.gif"]);
    }

    #[tokio::test]
    async fn publish_moves_staging_into_place() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("demo.gif");
        let staging = staging_path(&gif);
        std::fs::write(&staging, b"GIF89a").unwrap();

        publish(&staging, &gif).await.unwrap();
        assert_eq!(std::fs::read(&gif).unwrap(), b"GIF89a");
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn publish_never_replaces_an_existing_gif() {
        let dir = tempfile::tempdir().unwrap();
        let gif = dir.path().join("demo.gif");
        let staging = staging_path(&gif);
        std::fs::write(&gif, b"precious").unwrap();
        std::fs::write(&staging, b"GIF89a").unwrap();

        let err = publish(&staging, &gif).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Encode));
        assert_eq!(std::fs::read(&gif).unwrap(), b"precious");
        assert!(!staging.exists());
    }

    #[tokio::test]
    async fn mp4_paths_cannot_be_post_processed() {
        let paths = OutputPaths {
            primary: PathBuf::from("/v/demo.mp4"),
            intermediate: None,
            palette: None,
        };
        let err = run(&RecorderConfig::default(), 24, &paths).await.unwrap_err();
        assert_eq!(err.stage(), Some(Stage::Palette));
    }
}
