//! Capty — screen recorder entry point.
//!
//! This is the shell that wires together:
//! - Capture targets: area selector and display enumeration (capture/)
//! - Recording sessions: encoder control, output naming, GIF pipeline (recording/)
//! - Configuration from the environment (config.rs)
//! - Terminal front end (cli.rs)
//! - With the `desktop` feature: system tray, control panel window and
//!   global stop shortcut (tray.rs, commands.rs)

pub mod capture;
pub mod cli;
pub mod config;
pub mod recording;

#[cfg(feature = "desktop")]
mod commands;
#[cfg(feature = "desktop")]
mod tray;

/// Entry point.
///
/// With the `desktop` feature and no arguments this starts the tray app;
/// otherwise the terminal front end handles the arguments.
pub fn run() {
    env_logger::init();

    #[cfg(feature = "desktop")]
    {
        if std::env::args().len() <= 1 {
            return desktop::run();
        }
    }

    cli::run();
}

#[cfg(feature = "desktop")]
mod desktop {
    use crate::config::RecorderConfig;
    use crate::recording::SessionController;
    use std::sync::Arc;
    use tauri::{Emitter, Manager};
    use tauri_plugin_global_shortcut::{Code, GlobalShortcutExt, Modifiers, Shortcut, ShortcutState};

    /// Event carrying every [`crate::recording::SessionEvent`] to the webview.
    pub const PHASE_EVENT: &str = "session-phase";

    pub fn run() {
        let config = RecorderConfig::from_env();
        log::info!("Recordings go to {}", config.output_dir.display());

        let stop_shortcut = Shortcut::new(Some(Modifiers::CONTROL | Modifiers::ALT), Code::KeyS);
        let pressed = stop_shortcut.clone();

        let result = tauri::Builder::default()
            .plugin(
                tauri_plugin_global_shortcut::Builder::new()
                    .with_handler(move |app, shortcut, event| {
                        if shortcut == &pressed && event.state() == ShortcutState::Pressed {
                            log::info!("Stop shortcut pressed");
                            crate::tray::stop_recording(app);
                        }
                    })
                    .build(),
            )
            .invoke_handler(tauri::generate_handler![
                crate::commands::list_displays,
                crate::commands::select_area,
                crate::commands::set_display,
                crate::commands::capture_target,
                crate::commands::default_name,
                crate::commands::start_recording,
                crate::commands::stop_recording,
                crate::commands::session_phase,
                crate::commands::acknowledge,
            ])
            .setup(move |app| {
                log::info!("Capty starting up");

                let (controller, mut events) =
                    tauri::async_runtime::block_on(async { SessionController::new(config) });
                app.manage(Arc::new(controller));

                let handle = app.handle().clone();
                tauri::async_runtime::spawn(async move {
                    while let Some(event) = events.recv().await {
                        crate::tray::update_status(&handle, &event.status);
                        if let Err(e) = handle.emit(PHASE_EVENT, &event) {
                            log::warn!("Failed to forward {} event: {}", PHASE_EVENT, e);
                        }
                    }
                });

                crate::tray::setup_tray(app.handle())?;
                app.global_shortcut().register(stop_shortcut)?;

                log::info!("System tray initialized — Ctrl+Alt+S stops a recording");
                Ok(())
            })
            .build(tauri::generate_context!());

        let app = match result {
            Ok(app) => app,
            Err(e) => {
                log::error!("Error starting Capty: {}", e);
                std::process::exit(1);
            }
        };

        app.run(|app, event| {
            if let tauri::RunEvent::ExitRequested { .. } = event {
                let controller = app.state::<Arc<SessionController>>().inner().clone();
                if let Some(report) = tauri::async_runtime::block_on(controller.shutdown()) {
                    log::info!("Session {} closed on exit: {}", report.session, report.outcome.status());
                }
            }
        });
    }
}
