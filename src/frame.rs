use std::path::{Path, PathBuf};

use anyhow::Context as _;
use image::{DynamicImage, ImageFormat, RgbaImage, imageops::FilterType};

use crate::error::{GifError, GifResult};

/// Resolution at which an image's native pixel size is taken to be rendered.
pub const BASE_DPI: u32 = 100;

/// Rendering parameters a session hands to each frame.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameSaveOpts {
    pub dpi: u32,
    /// Background used to flatten alpha when `transparent` is off (RGBA8, straight alpha).
    pub bg_rgba: [u8; 4],
    pub transparent: bool,
}

impl Default for FrameSaveOpts {
    fn default() -> Self {
        Self {
            dpi: BASE_DPI,
            bg_rgba: [255, 255, 255, 255],
            transparent: false,
        }
    }
}

/// Something that can write itself to an image file as one animation frame.
///
/// `save_frame` honours the session's rendering parameters. `save_plain` is the fallback used when
/// that fails and should write the frame with whatever defaults the renderable has.
pub trait Renderable {
    fn save_frame(&self, path: &Path, opts: &FrameSaveOpts) -> GifResult<()>;

    fn save_plain(&self, path: &Path) -> GifResult<()>;
}

impl Renderable for RgbaImage {
    fn save_frame(&self, path: &Path, opts: &FrameSaveOpts) -> GifResult<()> {
        let prepared = prepare_rgba(self, opts)?;
        prepared.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }

    fn save_plain(&self, path: &Path) -> GifResult<()> {
        self.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

impl Renderable for DynamicImage {
    fn save_frame(&self, path: &Path, opts: &FrameSaveOpts) -> GifResult<()> {
        self.to_rgba8().save_frame(path, opts)
    }

    fn save_plain(&self, path: &Path) -> GifResult<()> {
        self.save_with_format(path, ImageFormat::Png)?;
        Ok(())
    }
}

/// An image already on disk, decoded when the frame is saved.
#[derive(Clone, Debug)]
pub struct ImageFile {
    path: PathBuf,
}

impl ImageFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn decode(&self) -> GifResult<DynamicImage> {
        image::open(&self.path).map_err(|e| {
            GifError::render(format!(
                "failed to decode image '{}': {e}",
                self.path.display()
            ))
        })
    }
}

impl Renderable for ImageFile {
    fn save_frame(&self, path: &Path, opts: &FrameSaveOpts) -> GifResult<()> {
        self.decode()?.save_frame(path, opts)
    }

    /// Copies the source bytes as they are, so undecodable inputs still yield a frame.
    fn save_plain(&self, path: &Path) -> GifResult<()> {
        std::fs::copy(&self.path, path).with_context(|| {
            format!(
                "failed to copy image '{}' to '{}'",
                self.path.display(),
                path.display()
            )
        })?;
        Ok(())
    }
}

/// Scale `img` to `opts.dpi` and, unless transparency is kept, flatten it over the background.
pub fn prepare_rgba(img: &RgbaImage, opts: &FrameSaveOpts) -> GifResult<RgbaImage> {
    if opts.dpi == 0 {
        return Err(GifError::render("frame dpi must be non-zero"));
    }

    let (width, height) = (
        scale_dim(img.width(), opts.dpi),
        scale_dim(img.height(), opts.dpi),
    );
    if width == 0 || height == 0 {
        return Err(GifError::render(format!(
            "{}x{} image at {} dpi scales to an empty frame",
            img.width(),
            img.height(),
            opts.dpi
        )));
    }

    let mut out = if (width, height) == img.dimensions() {
        img.clone()
    } else {
        image::imageops::resize(img, width, height, FilterType::Lanczos3)
    };

    if !opts.transparent {
        flatten_over_bg(&mut out, opts.bg_rgba);
    }
    Ok(out)
}

fn scale_dim(px: u32, dpi: u32) -> u32 {
    let base = u64::from(BASE_DPI);
    ((u64::from(px) * u64::from(dpi) + base / 2) / base).min(u64::from(u32::MAX)) as u32
}

/// Composite straight-alpha RGBA8 pixels over an opaque background.
fn flatten_over_bg(img: &mut RgbaImage, bg_rgba: [u8; 4]) {
    let bg_r = bg_rgba[0] as u16;
    let bg_g = bg_rgba[1] as u16;
    let bg_b = bg_rgba[2] as u16;

    for px in img.pixels_mut() {
        let s = px.0;
        let a = s[3] as u16;
        if a == 255 {
            continue;
        }

        let inv = 255u16 - a;
        let r = mul_div255(s[0] as u16, a) + mul_div255(bg_r, inv);
        let g = mul_div255(s[1] as u16, a) + mul_div255(bg_g, inv);
        let b = mul_div255(s[2] as u16, a) + mul_div255(bg_b, inv);

        px.0 = [r.min(255) as u8, g.min(255) as u8, b.min(255) as u8, 255];
    }
}

fn mul_div255(x: u16, y: u16) -> u16 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u16
}
