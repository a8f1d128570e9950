//! Command lines for the external tools, and their shell-script form.

use std::borrow::Cow;
use std::ffi::{OsStr, OsString};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use anyhow::Context as _;

use crate::error::{GifError, GifResult};

/// Interpreter line written at the top of generated scripts.
pub const SCRIPT_SHEBANG: &str = "#! /bin/bash";

/// An external program plus its ordered argument list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ToolCommand {
    program: PathBuf,
    args: Vec<OsString>,
}

impl ToolCommand {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_os_string());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args
            .extend(args.into_iter().map(|a| a.as_ref().to_os_string()));
        self
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    pub fn get_args(&self) -> &[OsString] {
        &self.args
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        cmd
    }

    /// The command as one line of POSIX shell, quoting arguments that need it.
    pub fn to_shell_line(&self) -> String {
        std::iter::once(self.program.as_os_str())
            .chain(self.args.iter().map(OsString::as_os_str))
            .map(|a| shell_quote(&a.to_string_lossy()).into_owned())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Full script text: shebang, a blank line, the command line.
    pub fn to_script(&self) -> String {
        format!("{SCRIPT_SHEBANG}\n\n{}\n", self.to_shell_line())
    }

    /// Run to completion, failing on spawn errors or a non-zero exit status.
    pub fn run(&self) -> GifResult<()> {
        let name = self.program.display().to_string();
        tracing::info!(program = %name, args = self.args.len(), "running external tool");

        let output = self
            .to_command()
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::piped())
            .output()
            .map_err(|e| {
                GifError::subprocess(format!(
                    "failed to spawn {name} (is it installed and on PATH?): {e}"
                ))
            })?;

        let stderr = String::from_utf8_lossy(&output.stderr);
        if !output.status.success() {
            return Err(GifError::subprocess(format!(
                "{name} exited with status {}: {}",
                output.status,
                stderr.trim()
            )));
        }
        if !stderr.trim().is_empty() {
            tracing::debug!(program = %name, stderr = %stderr.trim(), "tool stderr");
        }
        Ok(())
    }

    /// Write [`ToolCommand::to_script`] to `path` and make it executable.
    pub fn write_script(&self, path: &Path) -> GifResult<()> {
        std::fs::write(path, self.to_script())
            .with_context(|| format!("failed to write script '{}'", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt as _;
            std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
                .with_context(|| format!("failed to mark script '{}' executable", path.display()))?;
        }

        tracing::info!(script = %path.display(), "wrote assembly script");
        Ok(())
    }
}

/// Frame delay in ImageMagick ticks (hundredths of a second).
pub fn delay_ticks(fps: f64) -> f64 {
    100.0 / fps
}

/// `-delay` argument value, one decimal place.
pub fn format_delay(fps: f64) -> String {
    format!("{:.1}", delay_ticks(fps))
}

/// `convert [-verbose] -delay <ticks> -loop <n> <frames...> <out>`
pub fn convert_command(
    program: &Path,
    fps: f64,
    loop_count: u32,
    verbose: bool,
    frames: &[PathBuf],
    out_path: &Path,
) -> ToolCommand {
    let mut cmd = ToolCommand::new(program);
    if verbose {
        cmd = cmd.arg("-verbose");
    }
    cmd.args(["-delay".to_string(), format_delay(fps)])
        .args(["-loop".to_string(), loop_count.to_string()])
        .args(frames)
        .arg(out_path)
}

/// VP9 WebM (with alpha) from a printf-style frame pattern.
pub fn webm_command(program: &Path, fps: f64, frame_pattern: &Path, out_path: &Path) -> ToolCommand {
    ToolCommand::new(program)
        .args(["-y", "-framerate", &format_framerate(fps), "-f", "image2", "-i"])
        .arg(frame_pattern)
        .args(["-c:v", "libvpx-vp9", "-pix_fmt", "yuva420p"])
        .arg(out_path)
}

/// `-framerate` value: whole rates print without a fraction (`30`), others as-is (`12.5`).
pub fn format_framerate(fps: f64) -> String {
    fps.to_string()
}

fn shell_quote(s: &str) -> Cow<'_, str> {
    let safe = !s.is_empty()
        && s.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | '/' | ',' | ':' | '=' | '+' | '%' | '@')
        });
    if safe {
        Cow::Borrowed(s)
    } else {
        Cow::Owned(format!("'{}'", s.replace('\'', r"'\''")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frames(names: &[&str]) -> Vec<PathBuf> {
        names.iter().map(PathBuf::from).collect()
    }

    #[test]
    fn delay_from_fps() {
        assert_eq!(delay_ticks(25.0), 4.0);
        assert_eq!(format_delay(25.0), "4.0");
        assert_eq!(format_delay(30.0), "3.3");
        assert_eq!(format_delay(1.0), "100.0");
        assert_eq!(format_delay(12.5), "8.0");
        assert_eq!(format_delay(7.5), "13.3");
    }

    #[test]
    fn framerate_keeps_fractions() {
        assert_eq!(format_framerate(30.0), "30");
        assert_eq!(format_framerate(12.5), "12.5");
    }

    #[test]
    fn convert_args_are_ordered() {
        let cmd = convert_command(
            Path::new("convert"),
            25.0,
            0,
            false,
            &frames(&["d/frame_000000000.png", "d/frame_000000001.png"]),
            Path::new("out.gif"),
        );
        assert_eq!(cmd.program(), Path::new("convert"));
        assert_eq!(
            cmd.get_args(),
            &[
                "-delay",
                "4.0",
                "-loop",
                "0",
                "d/frame_000000000.png",
                "d/frame_000000001.png",
                "out.gif"
            ]
            .map(OsString::from)
        );
    }

    #[test]
    fn verbose_follows_program_name() {
        let cmd = convert_command(
            Path::new("convert"),
            10.0,
            3,
            true,
            &frames(&["a.png"]),
            Path::new("o.gif"),
        );
        assert_eq!(cmd.get_args()[0], OsString::from("-verbose"));
        assert_eq!(cmd.get_args()[1], OsString::from("-delay"));
        assert_eq!(cmd.get_args()[4], OsString::from("3"));
    }

    #[test]
    fn fractional_fps_reaches_both_tools() {
        let gif = convert_command(
            Path::new("convert"),
            12.5,
            0,
            false,
            &frames(&["a.png"]),
            Path::new("o.gif"),
        );
        assert_eq!(gif.to_shell_line(), "convert -delay 8.0 -loop 0 a.png o.gif");

        let webm = webm_command(
            Path::new("ffmpeg"),
            12.5,
            Path::new("d/frame_%09d.png"),
            Path::new("o.webm"),
        );
        assert!(webm.to_shell_line().contains("-framerate 12.5 "));
    }

    #[test]
    fn webm_uses_frame_pattern() {
        let cmd = webm_command(
            Path::new("ffmpeg"),
            30.0,
            Path::new("d/frame_%09d.png"),
            Path::new("o.webm"),
        );
        assert_eq!(
            cmd.to_shell_line(),
            "ffmpeg -y -framerate 30 -f image2 -i d/frame_%09d.png -c:v libvpx-vp9 -pix_fmt yuva420p o.webm"
        );
    }

    #[test]
    fn script_matches_command() {
        let cmd = convert_command(
            Path::new("convert"),
            20.0,
            0,
            false,
            &frames(&["a.png", "b.png"]),
            Path::new("o.gif"),
        );
        assert_eq!(
            cmd.to_script(),
            "#! /bin/bash\n\nconvert -delay 5.0 -loop 0 a.png b.png o.gif\n"
        );
    }

    #[test]
    fn awkward_arguments_are_quoted() {
        assert_eq!(shell_quote("plain/path.png"), "plain/path.png");
        assert_eq!(shell_quote("with space.png"), "'with space.png'");
        assert_eq!(shell_quote("it's"), r"'it'\''s'");
        assert_eq!(shell_quote(""), "''");
    }

    #[cfg(unix)]
    #[test]
    fn written_script_is_executable() {
        use std::os::unix::fs::PermissionsExt as _;
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("make_x.sh");
        ToolCommand::new("true").write_script(&path).unwrap();
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o111, 0o111);
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "#! /bin/bash\n\ntrue\n"
        );
    }

    #[cfg(unix)]
    #[test]
    fn failing_tool_is_a_subprocess_error() {
        let err = ToolCommand::new("sh")
            .args(["-c", "echo nope >&2; exit 3"])
            .run()
            .unwrap_err();
        assert!(matches!(err, GifError::Subprocess(_)));
        assert!(err.to_string().contains("nope"));
    }

    #[test]
    fn missing_tool_is_a_subprocess_error() {
        let err = ToolCommand::new("gifreel-definitely-not-a-real-binary")
            .run()
            .unwrap_err();
        assert!(matches!(err, GifError::Subprocess(_)));
    }
}
