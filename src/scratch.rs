use std::ffi::OsString;
use std::path::{Path, PathBuf};

use anyhow::Context as _;

use crate::error::{GifError, GifResult};

/// Extension of frame images written to the scratch directory.
pub const FRAME_EXT: &str = "png";
/// printf-style frame template, as understood by ffmpeg's `image2` demuxer.
pub const FRAME_PATTERN: &str = "frame_%09d.png";

const FRAME_PREFIX: &str = "frame";

/// File name of the frame with the given index: `frame_000000042.png`.
pub fn frame_file_name(index: u64) -> String {
    format!("{FRAME_PREFIX}_{index:09}.{FRAME_EXT}")
}

/// Scratch directory path for `out_path` with the given random suffix.
///
/// The directory is a sibling of the output: `out.gif` becomes `out.gif_<suffix>.tmp`.
pub fn scratch_dir_candidate(out_path: &Path, suffix: u32) -> GifResult<PathBuf> {
    let file_name = out_path.file_name().ok_or_else(|| {
        GifError::validation(format!(
            "output path '{}' has no file name",
            out_path.display()
        ))
    })?;
    let mut name = OsString::from(file_name);
    name.push(format!("_{suffix}.tmp"));
    Ok(out_path.with_file_name(name))
}

/// Disposable directory holding the frames of one session.
///
/// When auto-clean is on, the directory and its frames are removed when the guard is dropped
/// (best-effort, failures are logged) unless [`ScratchDir::remove`] or [`ScratchDir::keep`] ran
/// first.
#[derive(Debug)]
pub struct ScratchDir {
    path: PathBuf,
    auto_clean: bool,
    armed: bool,
}

impl ScratchDir {
    /// Create a uniquely named scratch directory next to `out_path`.
    pub fn create(out_path: &Path, auto_clean: bool) -> GifResult<Self> {
        loop {
            let candidate = scratch_dir_candidate(out_path, rand::random::<u32>())?;
            match std::fs::create_dir(&candidate) {
                Ok(()) => {
                    tracing::info!(dir = %candidate.display(), "created scratch directory");
                    return Ok(Self {
                        path: candidate,
                        auto_clean,
                        armed: true,
                    });
                }
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                    tracing::debug!(dir = %candidate.display(), "scratch directory exists, retrying");
                }
                Err(e) => {
                    return Err(anyhow::Error::new(e)
                        .context(format!(
                            "failed to create scratch directory '{}'",
                            candidate.display()
                        ))
                        .into());
                }
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn auto_clean(&self) -> bool {
        self.auto_clean
    }

    pub fn frame_path(&self, index: u64) -> PathBuf {
        self.path.join(frame_file_name(index))
    }

    /// Frame template inside this directory, for tools that expand it themselves.
    pub fn frame_pattern(&self) -> PathBuf {
        self.path.join(FRAME_PATTERN)
    }

    /// All frame files currently in the directory, sorted by name (and so by index).
    pub fn list_frames(&self) -> GifResult<Vec<PathBuf>> {
        let entries = std::fs::read_dir(&self.path).with_context(|| {
            format!("failed to list scratch directory '{}'", self.path.display())
        })?;

        let mut frames = Vec::new();
        for entry in entries {
            let entry = entry.with_context(|| {
                format!("failed to list scratch directory '{}'", self.path.display())
            })?;
            let path = entry.path();
            let is_frame = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(FRAME_PREFIX))
                && has_frame_ext(&path);
            if is_frame {
                frames.push(path);
            }
        }
        frames.sort();
        Ok(frames)
    }

    /// Delete the frames and the directory now, reporting any failure.
    pub fn remove(mut self) -> GifResult<()> {
        self.armed = false;
        tracing::info!(dir = %self.path.display(), "cleaning up scratch directory");
        clean_dir(&self.path)
            .with_context(|| format!("failed to remove scratch directory '{}'", self.path.display()))?;
        Ok(())
    }

    /// Leave the directory on disk and return its path.
    pub fn keep(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }
}

impl Drop for ScratchDir {
    fn drop(&mut self) {
        if !(self.armed && self.auto_clean) || !self.path.exists() {
            return;
        }
        tracing::info!(dir = %self.path.display(), "abnormal exit, deleting scratch directory");
        if let Err(e) = clean_dir(&self.path) {
            tracing::warn!(dir = %self.path.display(), error = %e, "scratch cleanup failed");
        }
    }
}

fn has_frame_ext(path: &Path) -> bool {
    path.extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case(FRAME_EXT))
}

fn clean_dir(dir: &Path) -> std::io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_file() && has_frame_ext(&path) {
            std::fs::remove_file(&path)?;
        }
    }
    std::fs::remove_dir(dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_names_are_zero_padded() {
        assert_eq!(frame_file_name(0), "frame_000000000.png");
        assert_eq!(frame_file_name(42), "frame_000000042.png");
        assert!(frame_file_name(9) < frame_file_name(10));
    }

    #[test]
    fn candidate_is_sibling_of_output() {
        let p = scratch_dir_candidate(Path::new("plots/anim.gif"), 7).unwrap();
        assert_eq!(p, PathBuf::from("plots/anim.gif_7.tmp"));
    }

    #[test]
    fn candidate_requires_file_name() {
        assert!(scratch_dir_candidate(Path::new("/"), 1).is_err());
    }

    #[test]
    fn back_to_back_dirs_never_collide() {
        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("a.gif");
        let a = ScratchDir::create(&out, true).unwrap();
        let b = ScratchDir::create(&out, true).unwrap();
        assert_ne!(a.path(), b.path());
        assert!(a.path().is_dir());
        assert!(b.path().is_dir());
    }

    #[test]
    fn drop_removes_dir_when_auto_clean() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), true).unwrap();
        std::fs::write(dir.frame_path(0), b"x").unwrap();
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(!path.exists());
    }

    #[test]
    fn drop_keeps_dir_without_auto_clean() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), false).unwrap();
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(path.is_dir());
    }

    #[test]
    fn drop_tolerates_foreign_files() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), true).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        std::fs::write(dir.frame_path(0), b"x").unwrap();
        let path = dir.path().to_path_buf();
        drop(dir);
        assert!(path.join("notes.txt").exists());
        assert!(!path.join(frame_file_name(0)).exists());
    }

    #[test]
    fn remove_reports_failure() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), true).unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"keep").unwrap();
        assert!(dir.remove().is_err());
    }

    #[test]
    fn list_frames_is_sorted_and_filtered() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), true).unwrap();
        for i in [2u64, 0, 11, 1] {
            std::fs::write(dir.frame_path(i), b"x").unwrap();
        }
        std::fs::write(dir.path().join("other.png"), b"x").unwrap();
        std::fs::write(dir.path().join("frame_notes.txt"), b"x").unwrap();

        let names: Vec<String> = dir
            .list_frames()
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(
            names,
            vec![
                frame_file_name(0),
                frame_file_name(1),
                frame_file_name(2),
                frame_file_name(11)
            ]
        );
    }

    #[test]
    fn keep_disarms_cleanup() {
        let root = tempfile::tempdir().unwrap();
        let dir = ScratchDir::create(&root.path().join("a.gif"), true).unwrap();
        let kept = dir.keep();
        assert!(kept.is_dir());
    }
}
