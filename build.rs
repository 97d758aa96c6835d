//! Build script for Capty.
//!
//! The Tauri codegen only runs when the `desktop` feature is enabled; the
//! recording core and the terminal front end need no build step.

fn main() {
    #[cfg(feature = "desktop")]
    tauri_build::build();
}
