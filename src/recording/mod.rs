//! Recording domain — public API.
//!
//! Session lifecycle, encoder process control, output naming and the GIF
//! pipeline. Front ends talk to [`SessionController`] and consume its
//! [`SessionEvent`] stream; the rest is exported for tooling and tests.

mod controller;
mod encoder;
mod error;
mod output;
mod phase;
mod postprocess;

pub use controller::{Outcome, SessionController, SessionEvent, SessionId, SessionReport, StopAck};
pub use encoder::{
    describe_status, encoder_args, interrupt_group, kill_group, spawn_encoder, ExitClass, ExitPolicy,
    SignalDelivery, FFMPEG_INTERRUPT_EXIT,
};
pub use error::{PathError, SessionError};
pub use output::{
    allocate, default_base_name, AudioSources, OutputFormat, OutputPaths, OutputSpec, MAX_FPS,
    MIN_FPS,
};
pub use phase::Phase;
pub use postprocess::{staging_path, PipelineReport, Stage};
