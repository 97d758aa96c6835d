//! Pure capture geometry — functional core.
//!
//! This module has zero infrastructure dependencies.
//! It describes what to record; the selector and display enumerator
//! produce these values, the session controller consumes them.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A confirmed capture rectangle in screen coordinates.
///
/// Width and height are always non-zero. The fields are private so a
/// `Region` cannot change once it has been validated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Region {
    x: i32,
    y: i32,
    width: u32,
    height: u32,
}

impl Region {
    /// Builds a region, rejecting zero-sized rectangles.
    ///
    /// # Arguments
    /// * `x` - Left edge of the rectangle
    /// * `y` - Top edge of the rectangle
    /// * `width` - Width in pixels
    /// * `height` - Height in pixels
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Result<Self, RegionError> {
        if width == 0 || height == 0 {
            return Err(RegionError::ZeroDimension { width, height });
        }

        Ok(Self {
            x,
            y,
            width,
            height,
        })
    }

    pub fn x(&self) -> i32 {
        self.x
    }

    pub fn y(&self) -> i32 {
        self.y
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// `WxH`, the form x11grab expects for `-video_size`.
    pub fn size_arg(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{} {}x{}", self.x, self.y, self.width, self.height)
    }
}

/// A monitor as published by the display enumerator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Display {
    pub id: String,
    pub resolution: (u32, u32),
    pub origin: (i32, i32),
}

impl Display {
    /// The synthetic entry used when no displays could be enumerated.
    pub fn fallback(resolution: (u32, u32)) -> Self {
        Self {
            id: "default".to_string(),
            resolution,
            origin: (0, 0),
        }
    }

    /// The region covering this whole display.
    pub fn to_region(&self) -> Result<Region, RegionError> {
        Region::new(
            self.origin.0,
            self.origin.1,
            self.resolution.0,
            self.resolution.1,
        )
    }
}

/// What the next recording will capture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "camelCase")]
pub enum CaptureTarget {
    Area(Region),
    Display(Display),
}

impl CaptureTarget {
    /// Resolves the target to concrete geometry.
    ///
    /// Displays are converted here, at record time, not when selected.
    pub fn region(&self) -> Result<Region, RegionError> {
        match self {
            CaptureTarget::Area(region) => Ok(*region),
            CaptureTarget::Display(display) => display.to_region(),
        }
    }
}

impl fmt::Display for CaptureTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureTarget::Area(region) => write!(f, "area {}", region),
            CaptureTarget::Display(display) => write!(
                f,
                "display {} ({}x{}+{}+{})",
                display.id,
                display.resolution.0,
                display.resolution.1,
                display.origin.0,
                display.origin.1
            ),
        }
    }
}

/// The mutually exclusive area/display choice.
///
/// Selecting one kind always replaces the other; there is no state in
/// which both are set.
#[derive(Debug, Default, Clone)]
pub struct TargetSelection {
    current: Option<CaptureTarget>,
}

impl TargetSelection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_area(&mut self, region: Region) {
        self.current = Some(CaptureTarget::Area(region));
    }

    pub fn set_display(&mut self, display: Display) {
        self.current = Some(CaptureTarget::Display(display));
    }

    pub fn clear(&mut self) {
        self.current = None;
    }

    pub fn current(&self) -> Option<&CaptureTarget> {
        self.current.as_ref()
    }

    pub fn is_empty(&self) -> bool {
        self.current.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegionError {
    #[error("Capture rectangle has zero width or height ({width}x{height})")]
    ZeroDimension { width: u32, height: u32 },
}

#[cfg(test)]
mod tests {
    use super::*;

    fn monitor() -> Display {
        Display {
            id: "HDMI-1".to_string(),
            resolution: (2560, 1440),
            origin: (1920, 0),
        }
    }

    #[test]
    fn region_rejects_zero_dimension() {
        assert!(matches!(
            Region::new(0, 0, 0, 50),
            Err(RegionError::ZeroDimension { .. })
        ));
        assert!(matches!(
            Region::new(0, 0, 50, 0),
            Err(RegionError::ZeroDimension { .. })
        ));
    }

    #[test]
    fn region_accepts_negative_origin() {
        let region = Region::new(-1280, -200, 1280, 1024).unwrap();
        assert_eq!(region.x(), -1280);
        assert_eq!(region.to_string(), "-1280,-200 1280x1024");
    }

    #[test]
    fn display_converts_to_region() {
        let region = monitor().to_region().unwrap();
        assert_eq!(region, Region::new(1920, 0, 2560, 1440).unwrap());
        assert_eq!(region.size_arg(), "2560x1440");
    }

    #[test]
    fn switching_to_display_clears_area() {
        let mut selection = TargetSelection::new();
        selection.set_area(Region::new(100, 100, 640, 480).unwrap());
        selection.set_display(monitor());

        match selection.current() {
            Some(CaptureTarget::Display(d)) => assert_eq!(d.id, "HDMI-1"),
            other => panic!("expected display target, got {:?}", other),
        }
    }

    #[test]
    fn switching_to_area_clears_display() {
        let mut selection = TargetSelection::new();
        selection.set_display(monitor());
        selection.set_area(Region::new(1, 2, 3, 4).unwrap());

        assert!(matches!(selection.current(), Some(CaptureTarget::Area(_))));
    }

    #[test]
    fn clear_empties_selection() {
        let mut selection = TargetSelection::new();
        selection.set_area(Region::new(1, 2, 3, 4).unwrap());
        selection.clear();
        assert!(selection.is_empty());
        assert!(selection.current().is_none());
    }

    #[test]
    fn fallback_display_sits_at_origin() {
        let d = Display::fallback((1920, 1080));
        assert_eq!(d.id, "default");
        assert_eq!(d.to_region().unwrap(), Region::new(0, 0, 1920, 1080).unwrap());
    }
}
