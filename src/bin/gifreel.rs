use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use gifreel::{GifSession, ImageFile, MakeOpts, SessionOpts, Toolchain};

#[derive(Parser, Debug)]
#[command(name = "gifreel", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check that ImageMagick (and optionally ffmpeg) can be found.
    Check(CheckArgs),
    /// Assemble image files into an animated GIF.
    Assemble(AssembleArgs),
}

#[derive(Parser, Debug)]
struct CheckArgs {
    /// Path to ImageMagick `convert`.
    #[arg(long)]
    convert: Option<PathBuf>,

    /// Path to `ffmpeg`.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct AssembleArgs {
    /// Input images, in playback order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Output GIF path.
    #[arg(long)]
    out: PathBuf,

    /// JSON file with `session` and `make` option blocks. Flags override it.
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    fps: Option<f64>,

    #[arg(long)]
    dpi: Option<u32>,

    /// Repeat count; 0 loops forever.
    #[arg(long = "loop")]
    loop_count: Option<u32>,

    /// Keep frame transparency instead of flattening over the background.
    #[arg(long)]
    transparent: bool,

    /// Leave the scratch directory and its frames on disk.
    #[arg(long)]
    keep_frames: bool,

    /// Skip running `convert` (useful with --script).
    #[arg(long)]
    no_gif: bool,

    /// Also write a WebM next to the GIF (requires `ffmpeg`).
    #[arg(long)]
    video: bool,

    /// Write `make_<name>.sh` with the convert command.
    #[arg(long)]
    script: bool,

    /// Pass -verbose to convert.
    #[arg(long)]
    verbose: bool,

    /// Drop the first frame.
    #[arg(long)]
    delete_first: bool,

    /// Play forward then backward.
    #[arg(long)]
    round_trip: bool,

    /// Copy this frame out as `<name>.png`.
    #[arg(long)]
    preview: Option<usize>,

    /// Path to ImageMagick `convert`.
    #[arg(long)]
    convert: Option<PathBuf>,

    /// Path to `ffmpeg`.
    #[arg(long)]
    ffmpeg: Option<PathBuf>,
}

#[derive(Deserialize, Debug, Default)]
#[serde(default)]
struct ConfigFile {
    session: SessionOpts,
    make: MakeOpts,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Check(args) => cmd_check(args),
        Command::Assemble(args) => cmd_assemble(args),
    }
}

fn resolve_toolchain(
    convert: Option<&Path>,
    ffmpeg: Option<&Path>,
    probe: bool,
) -> anyhow::Result<Toolchain> {
    let overridden = convert.is_some() || ffmpeg.is_some();
    let convert = convert.unwrap_or(Path::new(gifreel::toolchain::DEFAULT_CONVERT));
    let ffmpeg = ffmpeg.unwrap_or(Path::new(gifreel::toolchain::DEFAULT_FFMPEG));

    let toolchain = match (probe, overridden) {
        (false, _) => Toolchain::new(convert, ffmpeg),
        (true, true) => Toolchain::probe(convert, ffmpeg)?,
        (true, false) => gifreel::init()?.clone(),
    };
    Ok(toolchain)
}

fn cmd_check(args: CheckArgs) -> anyhow::Result<()> {
    let toolchain = resolve_toolchain(args.convert.as_deref(), args.ffmpeg.as_deref(), true)?;

    println!(
        "convert: {} ({})",
        toolchain.convert().display(),
        toolchain.convert_version().unwrap_or("unknown version")
    );
    println!(
        "ffmpeg:  {} ({})",
        toolchain.ffmpeg().display(),
        if toolchain.ffmpeg_available() {
            "available"
        } else {
            "not found"
        }
    );
    Ok(())
}

fn read_config(path: &Path) -> anyhow::Result<ConfigFile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("open config '{}'", path.display()))?;
    let cfg: ConfigFile = serde_json::from_str(&text).with_context(|| "parse config JSON")?;
    Ok(cfg)
}

fn cmd_assemble(args: AssembleArgs) -> anyhow::Result<()> {
    let ConfigFile {
        session: mut session_opts,
        make: mut make_opts,
    } = match &args.config {
        Some(path) => read_config(path)?,
        None => ConfigFile::default(),
    };

    if let Some(fps) = args.fps {
        session_opts.fps = fps;
    }
    if let Some(dpi) = args.dpi {
        session_opts.dpi = dpi;
    }
    if let Some(loop_count) = args.loop_count {
        session_opts.loop_count = loop_count;
    }
    session_opts.transparent |= args.transparent;
    session_opts.auto_clean &= !args.keep_frames;

    make_opts.make_gif &= !args.no_gif;
    make_opts.make_video |= args.video;
    make_opts.make_script |= args.script;
    make_opts.verbose |= args.verbose;
    make_opts.delete_first |= args.delete_first;
    make_opts.round_trip |= args.round_trip;
    if args.preview.is_some() {
        make_opts.preview_frame = args.preview;
    }

    let runs_tools = make_opts.make_gif || make_opts.make_video;
    let toolchain = resolve_toolchain(args.convert.as_deref(), args.ffmpeg.as_deref(), runs_tools)?;

    let mut session = GifSession::with_toolchain(&args.out, session_opts, toolchain)?;
    for input in &args.inputs {
        session
            .add_frame(&ImageFile::new(input))
            .with_context(|| format!("add frame '{}'", input.display()))?;
    }

    let report = session.make(&make_opts)?;

    if let Some(path) = &report.gif_path {
        eprintln!("wrote {}", path.display());
    }
    if let Some(path) = &report.video_path {
        eprintln!("wrote {}", path.display());
    }
    if let Some(path) = &report.script_path {
        eprintln!("wrote {}", path.display());
    }
    if let Some(path) = &report.preview_path {
        eprintln!("wrote {}", path.display());
    }
    if let Some(dir) = &report.scratch_dir {
        eprintln!("kept frames in {}", dir.display());
    }
    Ok(())
}
