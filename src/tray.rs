//! System tray setup and menu handler.
//!
//! The tray is the primary entry point in desktop mode. Left-click opens
//! the control panel; the menu drives recording without it.

use crate::capture::Selection;
use crate::recording::{default_base_name, AudioSources, OutputFormat, OutputSpec, SessionController};
use std::sync::Arc;
use tauri::{
    menu::{MenuBuilder, MenuItem, MenuItemBuilder, PredefinedMenuItem},
    tray::TrayIconBuilder,
    AppHandle, Manager, Wry,
};

const TRAY_ID: &str = "capty";
const TRAY_FPS: u32 = 30;

/// Disabled menu entry showing the latest session status.
struct StatusItem(MenuItem<Wry>);

/// Sets up the system tray icon with its menu.
///
/// Left-click: shows the control panel window.
/// Menu: select area, record MP4/GIF, stop, quit.
pub fn setup_tray(app: &AppHandle) -> Result<(), Box<dyn std::error::Error>> {
    let status_item = MenuItemBuilder::with_id("status", "Ready")
        .enabled(false)
        .build(app)?;
    let select_item = MenuItemBuilder::with_id("select", "Select Area").build(app)?;
    let mp4_item = MenuItemBuilder::with_id("record-mp4", "Record MP4").build(app)?;
    let gif_item = MenuItemBuilder::with_id("record-gif", "Record GIF").build(app)?;
    let stop_item = MenuItemBuilder::with_id("stop", "Stop Recording\tCtrl+Alt+S").build(app)?;
    let quit_item = MenuItemBuilder::with_id("quit", "Quit Capty").build(app)?;
    let separator = PredefinedMenuItem::separator(app)?;

    let menu = MenuBuilder::new(app)
        .item(&status_item)
        .item(&separator)
        .item(&select_item)
        .item(&mp4_item)
        .item(&gif_item)
        .item(&stop_item)
        .item(&separator)
        .item(&quit_item)
        .build()?;

    app.manage(StatusItem(status_item));

    let mut builder = TrayIconBuilder::with_id(TRAY_ID)
        .tooltip("Capty — Ready")
        .menu(&menu)
        .show_menu_on_left_click(false)
        .on_tray_icon_event(|tray_icon, event| {
            if let tauri::tray::TrayIconEvent::Click {
                button: tauri::tray::MouseButton::Left,
                ..
            } = event
            {
                show_panel(tray_icon.app_handle());
            }
        })
        .on_menu_event(|app, event| match event.id().as_ref() {
            "select" => spawn_select(app),
            "record-mp4" => spawn_record(app, OutputFormat::Mp4),
            "record-gif" => spawn_record(app, OutputFormat::Gif),
            "stop" => stop_recording(app),
            "quit" => {
                log::info!("Quit requested from tray menu");
                app.exit(0);
            }
            _ => {}
        });

    if let Some(icon) = app.default_window_icon() {
        builder = builder.icon(icon.clone().to_owned());
    }
    builder.build(app)?;

    Ok(())
}

fn controller(app: &AppHandle) -> Arc<SessionController> {
    app.state::<Arc<SessionController>>().inner().clone()
}

fn show_panel(app: &AppHandle) {
    if let Some(window) = app.get_webview_window("main") {
        let _ = window.show();
        let _ = window.set_focus();
    }
}

/// Mirrors a session status line into the tray menu and tooltip.
pub fn update_status(app: &AppHandle, status: &str) {
    if let Some(item) = app.try_state::<StatusItem>() {
        if let Err(e) = item.0.set_text(status) {
            log::warn!("Failed to update tray status: {}", e);
        }
    }
    if let Some(tray) = app.tray_by_id(TRAY_ID) {
        let _ = tray.set_tooltip(Some(format!("Capty — {}", status)));
    }
}

/// Requests a stop. Used by the tray menu and the global shortcut.
pub fn stop_recording(app: &AppHandle) {
    match controller(app).stop_session() {
        Ok(ack) => log::info!("Stop requested: {:?}", ack),
        Err(e) => log::info!("Stop ignored: {}", e),
    }
}

fn spawn_select(app: &AppHandle) {
    let controller = controller(app);
    tauri::async_runtime::spawn(async move {
        if let Err(e) = select_into(&controller).await {
            log::error!("Area selection failed: {}", e);
        }
    });
}

/// Runs the selector; `Ok(false)` when the user cancelled.
async fn select_into(controller: &SessionController) -> Result<bool, String> {
    match controller.select_area().await {
        Ok(selection) => Ok(selection != Selection::Cancelled),
        Err(e) => Err(e.to_string()),
    }
}

/// Starts a recording with default settings, asking for an area first if
/// none is selected. A finished session is acknowledged on the way.
fn spawn_record(app: &AppHandle, format: OutputFormat) {
    let controller = controller(app);
    tauri::async_runtime::spawn(async move {
        if controller.phase().is_terminal() {
            if let Ok(report) = controller.acknowledge().await {
                log::info!("Dismissed session {}: {}", report.session, report.outcome.status());
            }
        }

        if controller.capture_target().is_none() {
            match select_into(&controller).await {
                Ok(true) => {}
                Ok(false) => return,
                Err(e) => {
                    log::error!("Area selection failed: {}", e);
                    return;
                }
            }
        }

        let spec = OutputSpec {
            base_name: default_base_name(),
            format,
            fps: TRAY_FPS,
            audio: AudioSources::default(),
            start_delay_secs: 0,
        };
        if let Err(e) = controller.start_session(spec) {
            log::error!("Failed to start recording: {}", e);
        }
    });
}
