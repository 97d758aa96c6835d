//! Recorder configuration — tool locations, encoder parameters, output dir.
//!
//! Values come from the environment (a `.env` file is loaded first if one
//! exists). Anything unset or unparsable falls back to the defaults below.
//! Output goes to the platform video directory:
//!   Linux: ~/Videos (XDG_VIDEOS_DIR)
//!   macOS: ~/Movies

use crate::recording::ExitPolicy;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// External programs the recorder drives.
#[derive(Debug, Clone)]
pub struct ToolPaths {
    pub encoder: PathBuf,
    pub selector: PathBuf,
    pub display_lister: PathBuf,
    pub optimizer: PathBuf,
}

impl Default for ToolPaths {
    fn default() -> Self {
        Self {
            encoder: PathBuf::from("ffmpeg"),
            selector: PathBuf::from("slop"),
            display_lister: PathBuf::from("xrandr"),
            optimizer: PathBuf::from("gifsicle"),
        }
    }
}

/// PulseAudio sources used when a recording asks for audio.
#[derive(Debug, Clone)]
pub struct AudioDevices {
    pub mic_source: String,
    pub system_source: String,
}

impl Default for AudioDevices {
    fn default() -> Self {
        Self {
            mic_source: "default".to_string(),
            system_source: "@DEFAULT_MONITOR@".to_string(),
        }
    }
}

/// Video codec parameters passed to the encoder.
#[derive(Debug, Clone)]
pub struct VideoParams {
    pub codec: String,
    pub preset: String,
    /// Constant Rate Factor (0-51, lower = better quality)
    pub crf: u8,
    pub draw_mouse: bool,
}

impl Default for VideoParams {
    fn default() -> Self {
        Self {
            codec: "libx264".to_string(),
            preset: "ultrafast".to_string(),
            crf: 18,
            draw_mouse: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RecorderConfig {
    pub output_dir: PathBuf,
    pub tools: ToolPaths,
    /// X11 display the encoder grabs from, e.g. `:0.0`.
    pub x11_display: String,
    pub audio: AudioDevices,
    pub video: VideoParams,
    pub exit_policy: ExitPolicy,
    /// How long a stopped encoder may take to exit before it is killed.
    /// `None` waits indefinitely.
    pub stop_grace: Option<Duration>,
    /// Geometry of the synthetic display used when enumeration finds nothing.
    pub fallback_resolution: (u32, u32),
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            tools: ToolPaths::default(),
            x11_display: ":0.0".to_string(),
            audio: AudioDevices::default(),
            video: VideoParams::default(),
            exit_policy: ExitPolicy::default(),
            stop_grace: Some(Duration::from_secs(10)),
            fallback_resolution: (1920, 1080),
        }
    }
}

impl RecorderConfig {
    /// Loads `.env` (if present) and overlays `CAPTY_*` variables on the defaults.
    pub fn from_env() -> Self {
        match dotenvy::dotenv() {
            Ok(path) => log::info!("[CONFIG] Loaded {}", path.display()),
            Err(e) if e.not_found() => {}
            Err(e) => log::warn!("[CONFIG] Ignoring .env: {}", e),
        }

        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup.
    ///
    /// Split out from [`RecorderConfig::from_env`] so parsing can be
    /// exercised without touching the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(dir) = lookup("CAPTY_OUTPUT_DIR") {
            config.output_dir = PathBuf::from(dir);
        }
        if let Some(p) = lookup("CAPTY_FFMPEG") {
            config.tools.encoder = PathBuf::from(p);
        }
        if let Some(p) = lookup("CAPTY_SLOP") {
            config.tools.selector = PathBuf::from(p);
        }
        if let Some(p) = lookup("CAPTY_XRANDR") {
            config.tools.display_lister = PathBuf::from(p);
        }
        if let Some(p) = lookup("CAPTY_GIFSICLE") {
            config.tools.optimizer = PathBuf::from(p);
        }
        if let Some(d) = lookup("DISPLAY") {
            config.x11_display = d;
        }
        if let Some(s) = lookup("CAPTY_MIC_SOURCE") {
            config.audio.mic_source = s;
        }
        if let Some(s) = lookup("CAPTY_SYSTEM_AUDIO_SOURCE") {
            config.audio.system_source = s;
        }
        if let Some(c) = lookup("CAPTY_VIDEO_CODEC") {
            config.video.codec = c;
        }
        if let Some(p) = lookup("CAPTY_VIDEO_PRESET") {
            config.video.preset = p;
        }
        if let Some(crf) = parsed(&lookup, "CAPTY_VIDEO_CRF") {
            config.video.crf = crf;
        }
        if let Some(draw) = parsed(&lookup, "CAPTY_DRAW_MOUSE") {
            config.video.draw_mouse = draw;
        }
        if let Some(accept) = parsed(&lookup, "CAPTY_ACCEPT_INTERRUPT") {
            config.exit_policy.accept_interrupt = accept;
        }
        let grace_secs: Option<u64> = parsed(&lookup, "CAPTY_STOP_GRACE_SECS");
        if let Some(secs) = grace_secs {
            config.stop_grace = (secs > 0).then(|| Duration::from_secs(secs));
        }
        if let Some(raw) = lookup("CAPTY_FALLBACK_RESOLUTION") {
            match parse_resolution(&raw) {
                Some(res) => config.fallback_resolution = res,
                None => log::warn!(
                    "[CONFIG] CAPTY_FALLBACK_RESOLUTION='{}' is not WxH — keeping default",
                    raw
                ),
            }
        }

        config
    }
}

/// Base directory for recordings.
pub fn default_output_dir() -> PathBuf {
    dirs::video_dir()
        .or_else(|| dirs::home_dir().map(|home| home.join("Videos")))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn parsed<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    let raw = lookup(key)?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            log::warn!("[CONFIG] {}='{}' is invalid — keeping default", key, raw);
            None
        }
    }
}

/// Parses `1920x1080`.
pub fn parse_resolution(raw: &str) -> Option<(u32, u32)> {
    let (w, h) = raw.trim().split_once('x')?;
    let w: u32 = w.parse().ok()?;
    let h: u32 = h.parse().ok()?;
    (w > 0 && h > 0).then_some((w, h))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = RecorderConfig::from_lookup(|_| None);
        assert_eq!(config.tools.encoder, PathBuf::from("ffmpeg"));
        assert_eq!(config.x11_display, ":0.0");
        assert_eq!(config.video.crf, 18);
        assert_eq!(config.stop_grace, Some(Duration::from_secs(10)));
        assert!(config.exit_policy.accept_interrupt);
    }

    #[test]
    fn overrides_are_applied() {
        let config = RecorderConfig::from_lookup(lookup_from(&[
            ("CAPTY_OUTPUT_DIR", "/tmp/captures"),
            ("CAPTY_FFMPEG", "/opt/ffmpeg/bin/ffmpeg"),
            ("DISPLAY", ":1"),
            ("CAPTY_VIDEO_CRF", "23"),
            ("CAPTY_ACCEPT_INTERRUPT", "false"),
            ("CAPTY_STOP_GRACE_SECS", "0"),
            ("CAPTY_FALLBACK_RESOLUTION", "1366x768"),
        ]));
        assert_eq!(config.output_dir, PathBuf::from("/tmp/captures"));
        assert_eq!(config.tools.encoder, PathBuf::from("/opt/ffmpeg/bin/ffmpeg"));
        assert_eq!(config.x11_display, ":1");
        assert_eq!(config.video.crf, 23);
        assert!(!config.exit_policy.accept_interrupt);
        assert_eq!(config.stop_grace, None);
        assert_eq!(config.fallback_resolution, (1366, 768));
    }

    #[test]
    fn invalid_values_keep_defaults() {
        let config = RecorderConfig::from_lookup(lookup_from(&[
            ("CAPTY_VIDEO_CRF", "high"),
            ("CAPTY_FALLBACK_RESOLUTION", "wide"),
        ]));
        assert_eq!(config.video.crf, 18);
        assert_eq!(config.fallback_resolution, (1920, 1080));
    }

    #[test]
    fn resolution_parsing() {
        assert_eq!(parse_resolution("2560x1440"), Some((2560, 1440)));
        assert_eq!(parse_resolution("0x1440"), None);
        assert_eq!(parse_resolution("2560"), None);
    }
}
