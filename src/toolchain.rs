//! Locating and probing the external binaries the assembler shells out to.
//!
//! Animation assembly needs ImageMagick's `convert`; video output needs `ffmpeg`. The process-wide
//! check runs once through [`init`] and is cached for the lifetime of the process.

use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::sync::OnceLock;

use crate::error::{GifError, GifResult};

/// Default name of the ImageMagick conversion binary.
pub const DEFAULT_CONVERT: &str = "convert";
/// Default name of the video encoder binary.
pub const DEFAULT_FFMPEG: &str = "ffmpeg";

const CONVERT_FAMILY: &str = "imagemagick";

/// Paths to the external tools used by a session.
#[derive(Clone, Debug)]
pub struct Toolchain {
    convert: PathBuf,
    ffmpeg: PathBuf,
    convert_version: Option<String>,
    ffmpeg_available: bool,
}

impl Default for Toolchain {
    fn default() -> Self {
        Self::new(DEFAULT_CONVERT, DEFAULT_FFMPEG)
    }
}

impl Toolchain {
    /// Use the given binaries without probing them.
    pub fn new(convert: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> Self {
        Self {
            convert: convert.into(),
            ffmpeg: ffmpeg.into(),
            convert_version: None,
            ffmpeg_available: false,
        }
    }

    /// Use the given binaries after checking that `convert` self-identifies as ImageMagick.
    pub fn probe(convert: impl Into<PathBuf>, ffmpeg: impl Into<PathBuf>) -> GifResult<Self> {
        let mut toolchain = Self::new(convert, ffmpeg);
        let version = probe_convert(&toolchain.convert)?;
        tracing::info!(convert = %toolchain.convert.display(), version = %version, "found ImageMagick");
        toolchain.convert_version = Some(version);
        toolchain.ffmpeg_available = is_tool_available(&toolchain.ffmpeg, "-version");
        if !toolchain.ffmpeg_available {
            tracing::info!(ffmpeg = %toolchain.ffmpeg.display(), "ffmpeg not found; video output unavailable");
        }
        Ok(toolchain)
    }

    pub fn convert(&self) -> &Path {
        &self.convert
    }

    pub fn ffmpeg(&self) -> &Path {
        &self.ffmpeg
    }

    /// First line of `convert --version`, when the toolchain was probed.
    pub fn convert_version(&self) -> Option<&str> {
        self.convert_version.as_deref()
    }

    /// Whether `ffmpeg -version` succeeded during probing.
    pub fn ffmpeg_available(&self) -> bool {
        self.ffmpeg_available
    }
}

/// Run the process-wide toolchain check once and return the cached result.
///
/// Fails with [`GifError::Toolchain`] when `convert` is missing or is not ImageMagick. Later calls
/// return the same outcome without spawning anything.
pub fn init() -> GifResult<&'static Toolchain> {
    static SYSTEM: OnceLock<Result<Toolchain, String>> = OnceLock::new();

    SYSTEM
        .get_or_init(|| {
            Toolchain::probe(DEFAULT_CONVERT, DEFAULT_FFMPEG).map_err(|e| match e {
                GifError::Toolchain(msg) => msg,
                other => other.to_string(),
            })
        })
        .as_ref()
        .map_err(|msg| GifError::toolchain(msg.clone()))
}

/// Run `<program> --version` and return its first output line if it names ImageMagick.
pub fn probe_convert(program: &Path) -> GifResult<String> {
    let output = Command::new(program)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output()
        .map_err(|e| {
            GifError::toolchain(format!(
                "failed to run '{}' (is ImageMagick installed and on PATH?): {e}",
                program.display()
            ))
        })?;

    let stdout = String::from_utf8_lossy(&output.stdout);
    if !stdout.to_lowercase().contains(CONVERT_FAMILY) {
        return Err(GifError::toolchain(format!(
            "'{}' does not identify as ImageMagick: {}",
            program.display(),
            stdout.trim()
        )));
    }

    Ok(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Return `true` when `program` can be invoked with `version_flag` and exits successfully.
pub fn is_tool_available(program: &Path, version_flag: &str) -> bool {
    Command::new(program)
        .arg(version_flag)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|s| s.success())
        .unwrap_or(false)
}
