//! Output request validation and collision-free path allocation.
//!
//! A recording never overwrites anything: before the encoder starts we pick
//! a stem for which `{stem}.mp4`, `{stem}.gif`, the GIF staging file
//! `{stem}.gif.part` and `{stem}_palette.png` are all free, trying `name`,
//! `name(1)`, `name(2)`, ... in order.

use super::error::{PathError, SessionError};
use serde::{Deserialize, Serialize};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};

pub const MIN_FPS: u32 = 1;
pub const MAX_FPS: u32 = 240;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Gif,
}

impl OutputFormat {
    pub fn label(&self) -> &'static str {
        match self {
            OutputFormat::Mp4 => "MP4",
            OutputFormat::Gif => "GIF",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AudioSources {
    pub mic: bool,
    pub system_audio: bool,
}

impl AudioSources {
    pub fn any(&self) -> bool {
        self.mic || self.system_audio
    }
}

/// What the caller wants recorded, supplied at record-start.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputSpec {
    pub base_name: String,
    pub format: OutputFormat,
    pub fps: u32,
    #[serde(default)]
    pub audio: AudioSources,
    #[serde(default)]
    pub start_delay_secs: u64,
}

impl OutputSpec {
    /// Checks the request before anything touches the disk or spawns.
    pub fn validate(&self) -> Result<(), SessionError> {
        let name = self.base_name.trim();
        if name.is_empty() {
            return Err(SessionError::Validation(
                "Please enter a file name".to_string(),
            ));
        }
        if name == "." || name == ".." || name.contains(['/', '\\', '\0']) {
            return Err(SessionError::Validation(format!(
                "File name '{}' must not contain path separators",
                name
            )));
        }
        if !(MIN_FPS..=MAX_FPS).contains(&self.fps) {
            return Err(SessionError::Validation(format!(
                "Frame rate {} is outside {}..={}",
                self.fps, MIN_FPS, MAX_FPS
            )));
        }
        Ok(())
    }
}

/// `capture-2026-10-16-14-03-59` — the name offered when the user has not typed one.
pub fn default_base_name() -> String {
    chrono::Local::now()
        .format("capture-%Y-%m-%d-%H-%M-%S")
        .to_string()
}

/// Where one recording attempt writes. Fixed for the session's lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputPaths {
    /// The artifact handed back to the user.
    pub primary: PathBuf,
    /// Recorded video that gets converted (GIF only).
    pub intermediate: Option<PathBuf>,
    /// Palette image, pipeline-private (GIF only).
    pub palette: Option<PathBuf>,
}

impl OutputPaths {
    /// The file the encoder writes to.
    pub fn recording_path(&self) -> &Path {
        self.intermediate.as_deref().unwrap_or(&self.primary)
    }
}

/// Picks collision-free output paths for `base_name` inside `dir`.
///
/// Creates `dir` if needed and fails with [`PathError`] if it cannot be
/// created or written to.
pub fn allocate(dir: &Path, base_name: &str, format: OutputFormat) -> Result<OutputPaths, PathError> {
    ensure_writable(dir)?;

    let base_name = base_name.trim();
    for n in 0..=u32::MAX {
        let stem = if n == 0 {
            base_name.to_string()
        } else {
            format!("{}({})", base_name, n)
        };

        let mp4 = dir.join(format!("{}.mp4", stem));
        let gif = dir.join(format!("{}.gif", stem));
        let palette = dir.join(format!("{}_palette.png", stem));
        let staging = super::postprocess::staging_path(&gif);

        if [&mp4, &gif, &staging, &palette].iter().any(|p| is_taken(p)) {
            continue;
        }

        if n > 0 {
            log::info!("[PATHS] '{}' is taken — using '{}'", base_name, stem);
        }

        return Ok(match format {
            OutputFormat::Mp4 => OutputPaths {
                primary: mp4,
                intermediate: None,
                palette: None,
            },
            OutputFormat::Gif => OutputPaths {
                primary: gif,
                intermediate: Some(mp4),
                palette: Some(palette),
            },
        });
    }

    Err(PathError::Exhausted {
        dir: dir.to_path_buf(),
        base: base_name.to_string(),
    })
}

// An existence check that errors counts as taken.
fn is_taken(path: &Path) -> bool {
    path.try_exists().unwrap_or(true)
}

fn ensure_writable(dir: &Path) -> Result<(), PathError> {
    std::fs::create_dir_all(dir).map_err(|e| PathError::CreateDir {
        dir: dir.to_path_buf(),
        reason: e.to_string(),
    })?;

    let probe = dir.join(format!(".capty-probe-{}", std::process::id()));
    match OpenOptions::new().write(true).create_new(true).open(&probe) {
        Ok(_) => {
            let _ = std::fs::remove_file(&probe);
            Ok(())
        }
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => Ok(()),
        Err(e) => Err(PathError::NotWritable {
            dir: dir.to_path_buf(),
            reason: e.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn spec(name: &str, fps: u32) -> OutputSpec {
        OutputSpec {
            base_name: name.to_string(),
            format: OutputFormat::Mp4,
            fps,
            audio: AudioSources::default(),
            start_delay_secs: 0,
        }
    }

    #[test]
    fn validation_rejects_bad_requests() {
        assert!(spec("demo", 30).validate().is_ok());
        assert!(matches!(spec("  ", 30).validate(), Err(SessionError::Validation(_))));
        assert!(matches!(spec("a/b", 30).validate(), Err(SessionError::Validation(_))));
        assert!(matches!(spec("..", 30).validate(), Err(SessionError::Validation(_))));
        assert!(matches!(spec("demo", 0).validate(), Err(SessionError::Validation(_))));
        assert!(matches!(spec("demo", 241).validate(), Err(SessionError::Validation(_))));
        assert!(spec("demo", 240).validate().is_ok());
    }

    #[test]
    fn empty_dir_uses_base_name() {
        let dir = tempfile::tempdir().unwrap();
        let paths = allocate(dir.path(), "demo", OutputFormat::Gif).unwrap();
        assert_eq!(paths.primary, dir.path().join("demo.gif"));
        assert_eq!(paths.intermediate, Some(dir.path().join("demo.mp4")));
        assert_eq!(paths.palette, Some(dir.path().join("demo_palette.png")));
        assert_eq!(paths.recording_path(), dir.path().join("demo.mp4"));
    }

    #[test]
    fn mp4_has_no_intermediates() {
        let dir = tempfile::tempdir().unwrap();
        let paths = allocate(dir.path(), "demo", OutputFormat::Mp4).unwrap();
        assert_eq!(paths.primary, dir.path().join("demo.mp4"));
        assert!(paths.intermediate.is_none());
        assert!(paths.palette.is_none());
        assert_eq!(paths.recording_path(), paths.primary.as_path());
    }

    #[test]
    fn existing_mp4_is_never_reused() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo.mp4"), b"old").unwrap();

        for format in [OutputFormat::Mp4, OutputFormat::Gif] {
            let paths = allocate(dir.path(), "foo", format).unwrap();
            assert_ne!(paths.recording_path(), dir.path().join("foo.mp4"));
            assert_eq!(paths.recording_path(), dir.path().join("foo(1).mp4"));
        }
    }

    #[test]
    fn any_member_of_the_triple_blocks_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo_palette.png"), b"").unwrap();
        fs::write(dir.path().join("foo(1).gif"), b"").unwrap();

        let paths = allocate(dir.path(), "foo", OutputFormat::Gif).unwrap();
        assert_eq!(paths.primary, dir.path().join("foo(2).gif"));

        let existing: Vec<PathBuf> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().path())
            .collect();
        for p in [
            Some(&paths.primary),
            paths.intermediate.as_ref(),
            paths.palette.as_ref(),
        ]
        .into_iter()
        .flatten()
        {
            assert!(!existing.contains(p), "{} already existed", p.display());
        }
    }

    #[test]
    fn leftover_gif_staging_file_blocks_the_stem() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("foo.gif.part"), b"").unwrap();

        let paths = allocate(dir.path(), "foo", OutputFormat::Gif).unwrap();
        assert_eq!(paths.primary, dir.path().join("foo(1).gif"));
    }

    #[test]
    fn creates_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        let paths = allocate(&nested, "demo", OutputFormat::Mp4).unwrap();
        assert!(nested.is_dir());
        assert_eq!(paths.primary, nested.join("demo.mp4"));
    }

    #[test]
    fn file_in_place_of_directory_is_path_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("not-a-dir");
        fs::write(&blocker, b"").unwrap();

        let result = allocate(&blocker, "demo", OutputFormat::Mp4);
        assert!(matches!(result, Err(PathError::CreateDir { .. })));
    }

    #[test]
    fn default_name_has_timestamp() {
        let name = default_base_name();
        assert!(name.starts_with("capture-"));
        assert_eq!(name.len(), "capture-2026-10-16-14-03-59".len());
    }
}
