//! Collect rendered frames and assemble them into an animated GIF.
//!
//! A [`GifSession`] owns a scratch directory next to the output file. Each
//! [`GifSession::add_frame`] writes one numbered PNG there; [`GifSession::make`] hands the ordered
//! list to ImageMagick's `convert` (and optionally `ffmpeg` for a WebM), then removes the scratch
//! directory.
#![forbid(unsafe_code)]

pub mod command;
pub mod error;
pub mod frame;
pub mod scratch;
pub mod session;
pub mod toolchain;

pub use command::{ToolCommand, delay_ticks};
pub use error::{GifError, GifResult};
pub use frame::{BASE_DPI, FrameSaveOpts, ImageFile, Renderable};
pub use scratch::{FRAME_PATTERN, ScratchDir, frame_file_name};
pub use session::{GifSession, MakeOpts, MakeReport, SessionOpts};
pub use toolchain::{Toolchain, init};
