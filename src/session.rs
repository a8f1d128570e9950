use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde::{Deserialize, Serialize};

use crate::command::{ToolCommand, convert_command, webm_command};
use crate::error::{GifError, GifResult};
use crate::frame::{FrameSaveOpts, Renderable};
use crate::scratch::ScratchDir;
use crate::toolchain::{self, Toolchain};

/// Per-session settings. Missing JSON fields take the defaults.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOpts {
    /// Frames per second; fractional rates such as 12.5 are allowed.
    pub fps: f64,
    pub dpi: u32,
    /// Number of times the animation repeats; 0 loops forever.
    pub loop_count: u32,
    pub auto_clean: bool,
    pub transparent: bool,
    /// Background for opaque frames (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
}

impl Default for SessionOpts {
    fn default() -> Self {
        Self {
            fps: 30.0,
            dpi: 100,
            loop_count: 0,
            auto_clean: true,
            transparent: false,
            bg_rgba: [255, 255, 255, 255],
        }
    }
}

impl SessionOpts {
    pub fn validate(&self) -> GifResult<()> {
        if !(self.fps.is_finite() && self.fps > 0.0) {
            return Err(GifError::validation(format!(
                "fps must be finite and positive, got {}",
                self.fps
            )));
        }
        if self.dpi == 0 {
            return Err(GifError::validation("dpi must be non-zero"));
        }
        Ok(())
    }

    pub fn frame_save_opts(&self) -> FrameSaveOpts {
        FrameSaveOpts {
            dpi: self.dpi,
            bg_rgba: self.bg_rgba,
            transparent: self.transparent,
        }
    }
}

/// What [`GifSession::make`] should produce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MakeOpts {
    pub make_gif: bool,
    pub make_video: bool,
    pub verbose: bool,
    pub make_script: bool,
    pub delete_first: bool,
    pub round_trip: bool,
    /// Index into the frame list (after `delete_first`) to copy out as a still image.
    pub preview_frame: Option<usize>,
}

impl Default for MakeOpts {
    fn default() -> Self {
        Self {
            make_gif: true,
            make_video: false,
            verbose: false,
            make_script: false,
            delete_first: false,
            round_trip: false,
            preview_frame: None,
        }
    }
}

/// Outcome of [`GifSession::make`].
#[derive(Clone, Debug)]
pub struct MakeReport {
    /// Ordered frame list handed to the converter.
    pub frames: Vec<PathBuf>,
    /// The animation command, whether or not it was run.
    pub command: ToolCommand,
    pub gif_path: Option<PathBuf>,
    pub script_path: Option<PathBuf>,
    pub preview_path: Option<PathBuf>,
    pub video_path: Option<PathBuf>,
    /// Scratch directory left on disk when auto-clean is off.
    pub scratch_dir: Option<PathBuf>,
}

/// Collects frames into a scratch directory and assembles them into an animation.
#[derive(Debug)]
pub struct GifSession {
    out_path: PathBuf,
    opts: SessionOpts,
    toolchain: Toolchain,
    scratch: ScratchDir,
    index: u64,
}

impl GifSession {
    /// Start a session using the system toolchain.
    ///
    /// Runs the process-wide ImageMagick check first (see [`toolchain::init`]).
    pub fn new(out_path: impl Into<PathBuf>, opts: SessionOpts) -> GifResult<Self> {
        let toolchain = toolchain::init()?;
        Self::with_toolchain(out_path, opts, toolchain.clone())
    }

    /// Start a session with explicit tool paths. No probing is done.
    pub fn with_toolchain(
        out_path: impl Into<PathBuf>,
        opts: SessionOpts,
        toolchain: Toolchain,
    ) -> GifResult<Self> {
        let out_path = out_path.into();
        opts.validate()?;
        ensure_parent_dir(&out_path)?;
        let scratch = ScratchDir::create(&out_path, opts.auto_clean)?;

        Ok(Self {
            out_path,
            opts,
            toolchain,
            scratch,
            index: 0,
        })
    }

    pub fn out_path(&self) -> &Path {
        &self.out_path
    }

    pub fn opts(&self) -> &SessionOpts {
        &self.opts
    }

    pub fn toolchain(&self) -> &Toolchain {
        &self.toolchain
    }

    pub fn scratch_dir(&self) -> &Path {
        self.scratch.path()
    }

    /// Number of frames added so far (and the index the next frame gets).
    pub fn frame_count(&self) -> u64 {
        self.index
    }

    /// Save `frame` as the next numbered image and return its path.
    ///
    /// If saving with the session's dpi/background/transparency fails, the frame is saved again
    /// with its own defaults. Only a failure of that second attempt is returned.
    pub fn add_frame<R: Renderable + ?Sized>(&mut self, frame: &R) -> GifResult<PathBuf> {
        let path = self.scratch.frame_path(self.index);
        tracing::info!(frame = %path.display(), "saving frame");

        if let Err(e) = frame.save_frame(&path, &self.opts.frame_save_opts()) {
            tracing::warn!(frame = %path.display(), error = %e, "frame save failed, retrying with defaults");
            frame.save_plain(&path)?;
        }

        self.index += 1;
        Ok(path)
    }

    /// Assemble the collected frames, then clean up the scratch directory if auto-clean is on.
    #[tracing::instrument(skip(self, make), fields(out = %self.out_path.display()))]
    pub fn make(self, make: &MakeOpts) -> GifResult<MakeReport> {
        let mut frames = self.scratch.list_frames()?;
        if frames.is_empty() {
            return Err(GifError::validation("no frames to assemble"));
        }

        // Everything that can reject the request is checked before any frame leaves the disk.
        let dropped = make.delete_first.then(|| frames.remove(0));
        if frames.is_empty() {
            return Err(GifError::validation(
                "no frames left to assemble after dropping the first",
            ));
        }
        if let Some(idx) = make.preview_frame
            && idx >= frames.len()
        {
            return Err(GifError::validation(format!(
                "preview frame {idx} out of range ({} frames)",
                frames.len()
            )));
        }

        if let Some(first) = dropped {
            tracing::info!(frame = %first.display(), "dropping first frame");
            std::fs::remove_file(&first)
                .with_context(|| format!("failed to delete frame '{}'", first.display()))?;
        }

        let preview_path = match make.preview_frame {
            Some(idx) => {
                let src = &frames[idx];
                let dst = preview_path_for(&self.out_path);
                std::fs::copy(src, &dst).with_context(|| {
                    format!(
                        "failed to copy preview '{}' to '{}'",
                        src.display(),
                        dst.display()
                    )
                })?;
                tracing::info!(preview = %dst.display(), "wrote preview frame");
                Some(dst)
            }
            None => None,
        };

        if make.round_trip {
            let backward: Vec<PathBuf> = frames.iter().rev().cloned().collect();
            frames.extend(backward);
        }

        let command = convert_command(
            self.toolchain.convert(),
            self.opts.fps,
            self.opts.loop_count,
            make.verbose,
            &frames,
            &self.out_path,
        );

        let script_path = if make.make_script {
            let path = script_path_for(&self.out_path);
            command.write_script(&path)?;
            Some(path)
        } else {
            None
        };

        let gif_path = if make.make_gif {
            tracing::info!(gif = %self.out_path.display(), frames = frames.len(), "running ImageMagick convert");
            command.run()?;
            Some(self.out_path.clone())
        } else {
            None
        };

        let video_path = if make.make_video {
            let path = video_path_for(&self.out_path);
            tracing::info!(video = %path.display(), "running ffmpeg");
            webm_command(
                self.toolchain.ffmpeg(),
                self.opts.fps,
                &self.scratch.frame_pattern(),
                &path,
            )
            .run()?;
            Some(path)
        } else {
            None
        };

        let scratch_dir = if self.scratch.auto_clean() {
            self.scratch.remove()?;
            None
        } else {
            Some(self.scratch.keep())
        };

        Ok(MakeReport {
            frames,
            command,
            gif_path,
            script_path,
            preview_path,
            video_path,
            scratch_dir,
        })
    }

    /// End the session without assembling.
    ///
    /// With auto-clean the frames are deleted and any failure is returned; otherwise the scratch
    /// directory is left in place and its path returned.
    pub fn close(self) -> GifResult<Option<PathBuf>> {
        if self.scratch.auto_clean() {
            self.scratch.remove()?;
            Ok(None)
        } else {
            Ok(Some(self.scratch.keep()))
        }
    }
}

/// `<dir>/make_<stem>.sh` next to the output.
pub fn script_path_for(out_path: &Path) -> PathBuf {
    let stem = out_path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = format!("make_{stem}.sh");
    match out_path.parent() {
        Some(parent) => parent.join(name),
        None => PathBuf::from(name),
    }
}

/// Still image copied out of the sequence: `<stem>.png`.
pub fn preview_path_for(out_path: &Path) -> PathBuf {
    out_path.with_extension("png")
}

/// `<stem>.webm`.
pub fn video_path_for(out_path: &Path) -> PathBuf {
    out_path.with_extension("webm")
}

/// Ensure the parent directory of `path` exists.
pub fn ensure_parent_dir(path: &Path) -> GifResult<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create output directory '{}'", parent.display()))?;
    }
    Ok(())
}
