//! Rasterisation: turn the resolved input into one `DynamicImage`.
//!
//! PDFs are rendered page-by-page through pdfium; only the selected page is
//! touched. PNG and JPEG inputs are decoded with the `image` crate. Either way
//! the result is capped at `max_rendered_pixels` on its longest edge.
//!
//! ## Why spawn_blocking?
//!
//! pdfium uses thread-local state and is not safe to call from async
//! contexts, and decoding a large camera JPEG is CPU-bound. Both run on the
//! blocking pool so Tokio worker threads never stall.

use crate::config::FlowConfig;
use crate::error::FlowError;
use crate::pipeline::input::{InputFormat, ResolvedInput};
use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Load the flowchart image for a resolved input.
pub async fn load_image(
    input: &ResolvedInput,
    config: &FlowConfig,
) -> Result<DynamicImage, FlowError> {
    let path = input.path().to_path_buf();
    let format = input.format();
    let dpi = config.dpi;
    let max_pixels = config.max_rendered_pixels;
    let page = config.page;
    let password = config.password.clone();

    tokio::task::spawn_blocking(move || match format {
        InputFormat::Pdf => render_pdf_page(&path, dpi, max_pixels, password.as_deref(), page),
        InputFormat::Png => decode_raster(&path, ImageFormat::Png, max_pixels),
        InputFormat::Jpeg => decode_raster(&path, ImageFormat::Jpeg, max_pixels),
    })
    .await
    .map_err(|e| FlowError::Internal(format!("Rasterise task panicked: {e}")))?
}

/// Bind pdfium from `PDFIUM_LIB_PATH` if set, else from the system library.
fn bind_pdfium() -> Result<Pdfium, FlowError> {
    let bindings = match std::env::var("PDFIUM_LIB_PATH") {
        Ok(lib) => Pdfium::bind_to_library(PathBuf::from(lib)),
        Err(_) => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| FlowError::PdfiumBindingFailed(format!("{e:?}")))?;
    Ok(Pdfium::new(bindings))
}

fn render_pdf_page(
    pdf_path: &Path,
    dpi: u32,
    max_pixels: u32,
    password: Option<&str>,
    page_num: usize,
) -> Result<DynamicImage, FlowError> {
    let pdfium = bind_pdfium()?;

    let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
        let err_str = format!("{e:?}");
        if err_str.to_lowercase().contains("password") {
            if password.is_some() {
                FlowError::WrongPassword {
                    path: pdf_path.to_path_buf(),
                }
            } else {
                FlowError::PasswordRequired {
                    path: pdf_path.to_path_buf(),
                }
            }
        } else {
            FlowError::CorruptPdf {
                path: pdf_path.to_path_buf(),
                detail: err_str,
            }
        }
    })?;

    let pages = document.pages();
    let total = pages.len() as usize;
    if page_num == 0 || page_num > total {
        return Err(FlowError::PageOutOfRange {
            page: page_num,
            total,
        });
    }
    info!("PDF loaded: {} pages, rendering page {}", total, page_num);

    let page = pages
        .get((page_num - 1) as u16)
        .map_err(|e| FlowError::RasterisationFailed {
            page: page_num,
            detail: format!("{e:?}"),
        })?;

    let (width, height) = scaled_size(
        page.width().value,
        page.height().value,
        dpi,
        max_pixels,
    );
    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(height as i32);

    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| FlowError::RasterisationFailed {
            page: page_num,
            detail: format!("{e:?}"),
        })?;

    let image = bitmap.as_image();
    debug!(
        "Rendered page {} → {}x{} px",
        page_num,
        image.width(),
        image.height()
    );
    Ok(image)
}

/// Pixel size for a page measured in points at `dpi`, longest edge capped.
fn scaled_size(width_pt: f32, height_pt: f32, dpi: u32, max_pixels: u32) -> (u32, u32) {
    let scale = dpi as f32 / 72.0;
    let (w, h) = (width_pt * scale, height_pt * scale);
    let longest = w.max(h).max(1.0);
    let cap = (max_pixels as f32 / longest).min(1.0);
    (
        ((w * cap).round() as u32).max(1),
        ((h * cap).round() as u32).max(1),
    )
}

fn decode_raster(
    path: &Path,
    format: ImageFormat,
    max_pixels: u32,
) -> Result<DynamicImage, FlowError> {
    let bytes = std::fs::read(path).map_err(|e| match e.kind() {
        std::io::ErrorKind::PermissionDenied => FlowError::PermissionDenied {
            path: path.to_path_buf(),
        },
        _ => FlowError::FileNotFound {
            path: path.to_path_buf(),
        },
    })?;

    let image = image::load_from_memory_with_format(&bytes, format).map_err(|e| {
        FlowError::RasterisationFailed {
            page: 1,
            detail: e.to_string(),
        }
    })?;
    Ok(fit_within(image, max_pixels))
}

/// Downscale so neither edge exceeds `max_pixels`; smaller images pass through.
pub fn fit_within(image: DynamicImage, max_pixels: u32) -> DynamicImage {
    if image.width().max(image.height()) <= max_pixels {
        return image;
    }
    let resized = image.resize(max_pixels, max_pixels, FilterType::Triangle);
    debug!(
        "Downscaled {}x{} → {}x{} px",
        image.width(),
        image.height(),
        resized.width(),
        resized.height()
    );
    resized
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn scaled_size_at_dpi() {
        // US Letter at 150 DPI.
        assert_eq!(scaled_size(612.0, 792.0, 150, 5000), (1275, 1650));
    }

    #[test]
    fn scaled_size_caps_longest_edge() {
        let (w, h) = scaled_size(612.0, 792.0, 300, 2000);
        assert_eq!(h, 2000);
        assert!(w < h);
    }

    #[test]
    fn fit_within_keeps_small_images() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(40, 20, Rgb([0, 0, 0])));
        let out = fit_within(img, 100);
        assert_eq!((out.width(), out.height()), (40, 20));
    }

    #[test]
    fn fit_within_preserves_aspect() {
        let img = DynamicImage::ImageRgb8(RgbImage::from_pixel(400, 200, Rgb([0, 0, 0])));
        let out = fit_within(img, 100);
        assert_eq!((out.width(), out.height()), (100, 50));
    }

    #[test]
    fn corrupt_png_fails_rasterisation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.png");
        std::fs::write(&path, [0x89, b'P', b'N', b'G', 0, 0, 0]).unwrap();
        let err = decode_raster(&path, ImageFormat::Png, 100).unwrap_err();
        assert!(matches!(err, FlowError::RasterisationFailed { .. }));
    }

    #[tokio::test]
    async fn loads_png_input() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("flow.png");
        RgbImage::from_pixel(300, 150, Rgb([255, 255, 255]))
            .save(&path)
            .unwrap();
        let resolved = crate::pipeline::input::resolve_input(path.to_str().unwrap(), 5)
            .await
            .unwrap();
        let config = FlowConfig::builder().max_rendered_pixels(150).build().unwrap();
        let img = load_image(&resolved, &config).await.unwrap();
        assert_eq!((img.width(), img.height()), (150, 75));
    }
}
