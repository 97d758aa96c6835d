//! Display enumeration via `xrandr --listmonitors`.
//!
//! Enumeration never fails outright: if the tool is missing, errors, or
//! prints nothing we understand, callers get a single synthetic
//! "default" display so the display picker always has an entry.

use super::region::Display;
use regex::Regex;
use std::path::Path;
use std::process::Stdio;
use std::sync::LazyLock;
use tokio::process::Command;

// ` 1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1`
static MONITOR_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\d+:\s+[+*]*(\S+)\s+(\d+)/\d+x(\d+)/\d+\+(-?\d+)\+(-?\d+)").unwrap()
});

/// Lists connected displays, degrading to a synthetic entry.
///
/// # Arguments
/// * `program` - The enumerator binary (normally `xrandr`)
/// * `fallback_resolution` - Geometry of the synthetic entry
pub async fn list_displays(program: &Path, fallback_resolution: (u32, u32)) -> Vec<Display> {
    let output = Command::new(program)
        .arg("--listmonitors")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .await;

    let displays = match output {
        Ok(out) if out.status.success() => parse_listmonitors(&String::from_utf8_lossy(&out.stdout)),
        Ok(out) => {
            log::warn!("[DISPLAYS] {} exited with {}", program.display(), out.status);
            Vec::new()
        }
        Err(e) => {
            log::warn!("[DISPLAYS] Failed to run {}: {}", program.display(), e);
            Vec::new()
        }
    };

    with_fallback(displays, fallback_resolution)
}

/// Parses the monitor lines of `xrandr --listmonitors`.
///
/// Lines that do not describe a monitor (the `Monitors: N` header,
/// blank lines) are skipped.
pub fn parse_listmonitors(output: &str) -> Vec<Display> {
    output
        .lines()
        .filter_map(|line| {
            let caps = MONITOR_LINE.captures(line)?;
            let width: u32 = caps[2].parse().ok()?;
            let height: u32 = caps[3].parse().ok()?;
            let x: i32 = caps[4].parse().ok()?;
            let y: i32 = caps[5].parse().ok()?;
            Some(Display {
                id: caps[1].to_string(),
                resolution: (width, height),
                origin: (x, y),
            })
        })
        .collect()
}

fn with_fallback(displays: Vec<Display>, fallback_resolution: (u32, u32)) -> Vec<Display> {
    if displays.is_empty() {
        log::info!("[DISPLAYS] No displays found — using synthetic default");
        return vec![Display::fallback(fallback_resolution)];
    }

    log::info!("[DISPLAYS] Found {} display(s)", displays.len());
    for d in &displays {
        log::info!(
            "  {} {}x{} at {},{}",
            d.id,
            d.resolution.0,
            d.resolution.1,
            d.origin.0,
            d.origin.1
        );
    }
    displays
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MONITORS: &str = "Monitors: 2\n \
        0: +*eDP-1 1920/344x1080/194+0+0  eDP-1\n \
        1: +HDMI-1 2560/597x1440/336+1920+0  HDMI-1\n";

    #[test]
    fn parses_two_monitors() {
        let displays = parse_listmonitors(TWO_MONITORS);
        assert_eq!(displays.len(), 2);
        assert_eq!(displays[0].id, "eDP-1");
        assert_eq!(displays[0].resolution, (1920, 1080));
        assert_eq!(displays[0].origin, (0, 0));
        assert_eq!(displays[1].id, "HDMI-1");
        assert_eq!(displays[1].origin, (1920, 0));
    }

    #[test]
    fn parses_negative_offsets() {
        let displays = parse_listmonitors(" 0: +DP-2 1280/338x1024/270+-1280+-200  DP-2");
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].origin, (-1280, -200));
    }

    #[test]
    fn ignores_header_and_noise() {
        assert!(parse_listmonitors("Monitors: 0\n\n").is_empty());
    }

    #[test]
    fn empty_list_degrades_to_default() {
        let displays = with_fallback(Vec::new(), (1366, 768));
        assert_eq!(displays, vec![Display::fallback((1366, 768))]);
    }

    #[tokio::test]
    async fn missing_enumerator_degrades_to_default() {
        let displays = list_displays(Path::new("/nonexistent/capty-xrandr"), (1920, 1080)).await;
        assert_eq!(displays.len(), 1);
        assert_eq!(displays[0].id, "default");
    }
}
