//! Interactive region selection using `slop`.
//!
//! This is the infrastructure layer — it talks to the OS.
//! The user drags a rectangle; slop prints it on stdout and we turn it
//! into a [`Region`]. Backing out of the selection is not an error.

use super::region::Region;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

/// Result of asking the user for a rectangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Picked(Region),
    Cancelled,
}

/// Runs the selector and waits for the user to draw a rectangle.
///
/// Non-zero exit or empty output means the user cancelled.
pub async fn select_area(program: &Path) -> Result<Selection, SelectError> {
    let start = std::time::Instant::now();

    let output = Command::new(program)
        .args(["-f", "%x %y %w %h"])
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await
        .map_err(|e| SelectError::Launch {
            program: program.display().to_string(),
            reason: e.to_string(),
        })?;

    if !output.status.success() {
        log::info!(
            "[SELECT] Selector exited with {} — treating as cancelled",
            output.status
        );
        return Ok(Selection::Cancelled);
    }

    let stdout = String::from_utf8_lossy(&output.stdout);
    let selection = parse_selection(&stdout)?;

    if let Selection::Picked(region) = &selection {
        log::info!(
            "[SELECT] Selected {} in {}ms",
            region,
            start.elapsed().as_millis()
        );
    }

    Ok(selection)
}

/// Parses `x y w h` as printed by the selector.
///
/// Empty output and zero-sized rectangles (a click without a drag) are
/// cancellations. Anything else that does not parse is malformed.
pub fn parse_selection(stdout: &str) -> Result<Selection, SelectError> {
    let text = stdout.trim();
    if text.is_empty() {
        return Ok(Selection::Cancelled);
    }

    let fields: Vec<&str> = text.split_whitespace().collect();
    if fields.len() != 4 {
        return Err(SelectError::Malformed(text.to_string()));
    }

    let malformed = || SelectError::Malformed(text.to_string());
    let x: i32 = fields[0].parse().map_err(|_| malformed())?;
    let y: i32 = fields[1].parse().map_err(|_| malformed())?;
    let width: u32 = fields[2].parse().map_err(|_| malformed())?;
    let height: u32 = fields[3].parse().map_err(|_| malformed())?;

    match Region::new(x, y, width, height) {
        Ok(region) => Ok(Selection::Picked(region)),
        Err(e) => {
            log::info!("[SELECT] {} — treating as cancelled", e);
            Ok(Selection::Cancelled)
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SelectError {
    #[error("Failed to run region selector '{program}': {reason}")]
    Launch { program: String, reason: String },

    #[error("Region selector printed unexpected output: '{0}'")]
    Malformed(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_selector_output() {
        let selection = parse_selection("100 100 640 480\n").unwrap();
        assert_eq!(
            selection,
            Selection::Picked(Region::new(100, 100, 640, 480).unwrap())
        );
    }

    #[test]
    fn empty_output_is_cancellation() {
        assert_eq!(parse_selection("").unwrap(), Selection::Cancelled);
        assert_eq!(parse_selection("  \n").unwrap(), Selection::Cancelled);
    }

    #[test]
    fn zero_sized_rectangle_is_cancellation() {
        assert_eq!(parse_selection("10 10 0 0").unwrap(), Selection::Cancelled);
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(
            parse_selection("10 10 abc 20"),
            Err(SelectError::Malformed(_))
        ));
        assert!(matches!(
            parse_selection("10 10 20"),
            Err(SelectError::Malformed(_))
        ));
    }

    #[tokio::test]
    async fn missing_selector_is_launch_error() {
        let result = select_area(Path::new("/nonexistent/capty-slop")).await;
        assert!(matches!(result, Err(SelectError::Launch { .. })));
    }
}
