//! Tauri commands for the control panel.
//!
//! Thin wrappers over [`SessionController`]: errors are flattened to strings
//! for the frontend, phase changes arrive separately as `session-phase`
//! events.

use crate::capture::{CaptureTarget, Display, Selection};
use crate::recording::{default_base_name, OutputSpec, Phase, SessionController, StopAck};
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

type Controller<'a> = tauri::State<'a, Arc<SessionController>>;

/// Session summary returned by [`acknowledge`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub phase: Phase,
    pub status: String,
    pub artifact: Option<PathBuf>,
}

/// Tauri command: list monitors the user can record.
#[tauri::command]
pub async fn list_displays(controller: Controller<'_>) -> Result<Vec<Display>, String> {
    Ok(controller.list_displays().await)
}

/// Tauri command: launch the area selector and make the result the target.
///
/// Returns `None` if the user cancelled; the previous target is kept.
#[tauri::command]
pub async fn select_area(controller: Controller<'_>) -> Result<Option<CaptureTarget>, String> {
    match controller.select_area().await.map_err(|e| e.to_string())? {
        Selection::Picked(_) => Ok(controller.capture_target()),
        Selection::Cancelled => Ok(None),
    }
}

/// Tauri command: make a whole display the target.
#[tauri::command]
pub fn set_display(controller: Controller<'_>, display: Display) -> Result<CaptureTarget, String> {
    controller.set_display(display);
    controller
        .capture_target()
        .ok_or_else(|| "No capture target set".to_string())
}

#[tauri::command]
pub fn capture_target(controller: Controller<'_>) -> Option<CaptureTarget> {
    controller.capture_target()
}

#[tauri::command]
pub fn default_name() -> String {
    default_base_name()
}

/// Tauri command: start recording the current target.
#[tauri::command]
pub fn start_recording(controller: Controller<'_>, spec: OutputSpec) -> Result<String, String> {
    controller
        .start_session(spec)
        .map(|id| id.to_string())
        .map_err(|e| e.to_string())
}

#[tauri::command]
pub fn stop_recording(controller: Controller<'_>) -> Result<StopAck, String> {
    controller.stop_session().map_err(|e| e.to_string())
}

#[tauri::command]
pub fn session_phase(controller: Controller<'_>) -> Phase {
    controller.phase()
}

/// Tauri command: dismiss a finished session so a new one can start.
#[tauri::command]
pub async fn acknowledge(controller: Controller<'_>) -> Result<SessionSummary, String> {
    let report = controller.acknowledge().await.map_err(|e| e.to_string())?;

    let artifact = match &report.outcome {
        crate::recording::Outcome::Completed { artifact, .. } => Some(artifact.clone()),
        _ => None,
    };
    Ok(SessionSummary {
        phase: report.phase,
        status: report.outcome.status(),
        artifact,
    })
}
