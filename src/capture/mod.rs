//! Capture target domain — public API.
//!
//! This module owns everything about *what* gets recorded: the geometry
//! model and the two external tools that produce it (region selector and
//! display enumerator). External code should only use the items exported here.

mod displays;
mod region;
mod selector;

pub use displays::{list_displays, parse_listmonitors};
pub use region::{CaptureTarget, Display, Region, RegionError, TargetSelection};
pub use selector::{parse_selection, select_area, SelectError, Selection};
