//! Trasformazioni su file immagine
//!
//! Il backend apre, ridimensiona, ritaglia e salva; le funzioni di questo
//! modulo combinano quelle primitive in transcode, resize e crop.

use image::imageops::FilterType;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};

use crate::config::DEFAULT_MAX_PIXELS;
use crate::error::{AppError, Result};
use crate::models::{Action, BoundingBox};
use crate::utils::file_extension;

/// Capacità di elaborazione immagini usata dai worker.
///
/// Le implementazioni devono segnalare file corrotti o troncati con un
/// errore, mai con un panic.
pub trait ImageBackend: Send + Sync + 'static {
    type Handle: Send;

    fn open(&self, path: &Path) -> Result<Self::Handle>;

    fn resize(&self, image: Self::Handle, width: u32, height: u32) -> Result<Self::Handle>;

    fn crop(&self, image: Self::Handle, bbox: BoundingBox) -> Result<Self::Handle>;

    fn save(&self, image: &Self::Handle, path: &Path) -> Result<()>;
}

/// Backend basato sul crate `image`
#[derive(Debug, Clone, Copy)]
pub struct RasterBackend {
    max_pixels: u64,
}

impl RasterBackend {
    pub fn new(max_pixels: u64) -> Self {
        Self { max_pixels }
    }

    /// Rifiuta un resize il cui risultato, o il buffer intermedio, supera
    /// il limite di pixel. Il controllo precede ogni allocazione.
    fn check_budget(&self, image: &DynamicImage, width: u32, height: u32) -> Result<()> {
        let output = u64::from(width).checked_mul(u64::from(height));
        // Il passaggio verticale produce un buffer largo quanto il sorgente
        let intermediate = u64::from(image.width()).checked_mul(u64::from(height));

        match (output, intermediate) {
            (Some(out), Some(mid)) if out <= self.max_pixels && mid <= self.max_pixels => Ok(()),
            _ => Err(AppError::TransformFailure(format!(
                "Resize {}x{} oltre il limite di {} pixel",
                width, height, self.max_pixels
            ))),
        }
    }
}

impl Default for RasterBackend {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PIXELS)
    }
}

impl ImageBackend for RasterBackend {
    type Handle = DynamicImage;

    fn open(&self, path: &Path) -> Result<DynamicImage> {
        Ok(image::open(path)?)
    }

    fn resize(&self, image: DynamicImage, width: u32, height: u32) -> Result<DynamicImage> {
        self.check_budget(&image, width, height)?;
        // Resize esatto, come richiesto dal chiamante
        Ok(image.resize_exact(width, height, FilterType::Lanczos3))
    }

    fn crop(&self, image: DynamicImage, bbox: BoundingBox) -> Result<DynamicImage> {
        if bbox.x0 >= image.width() || bbox.y0 >= image.height() {
            return Err(AppError::TransformFailure(format!(
                "Box ({}, {}, {}, {}) fuori dall'immagine {}x{}",
                bbox.x0,
                bbox.y0,
                bbox.x1,
                bbox.y1,
                image.width(),
                image.height()
            )));
        }
        Ok(image.crop_imm(bbox.x0, bbox.y0, bbox.width(), bbox.height()))
    }

    fn save(&self, image: &DynamicImage, path: &Path) -> Result<()> {
        let format = image_format_for(path)?;

        match format {
            // JPEG non supporta il canale alpha
            ImageFormat::Jpeg => DynamicImage::ImageRgb8(image.to_rgb8()).save_with_format(path, format)?,
            _ => image.save_with_format(path, format)?,
        }

        Ok(())
    }
}

fn image_format_for(path: &Path) -> Result<ImageFormat> {
    let ext = file_extension(path).unwrap_or_default();

    match ext.as_str() {
        "png" => Ok(ImageFormat::Png),
        "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
        "bmp" => Ok(ImageFormat::Bmp),
        _ => Err(AppError::UnsupportedFormat(format!(
            "Formato non supportato: {}",
            ext
        ))),
    }
}

/// Destinazione di un transcode: stessa cartella e nome, nuova estensione
pub fn transcode_destination(src: &Path, extension: &str) -> PathBuf {
    src.with_extension(extension)
}

fn ensure_parent_dir(dest: &Path) -> Result<()> {
    if let Some(dir) = dest.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    Ok(())
}

/// Scrive `src` nel formato di `dest`.
///
/// Il sorgente resta al suo posto: lo rimuove il chiamante, dopo aver
/// aggiornato la posizione registrata. Una destinazione già presente non
/// viene sovrascritta.
pub fn transcode<B: ImageBackend>(backend: &B, src: &Path, dest: &Path) -> Result<()> {
    if src != dest && dest.exists() {
        return Err(AppError::TransformFailure(format!(
            "Destinazione già esistente: {}",
            dest.display()
        )));
    }

    let image = backend.open(src)?;
    ensure_parent_dir(dest)?;
    backend.save(&image, dest)
}

pub fn resize<B: ImageBackend>(
    backend: &B,
    src: &Path,
    dest: &Path,
    width: u32,
    height: u32,
) -> Result<()> {
    let image = backend.open(src)?;
    let image = backend.resize(image, width, height)?;
    ensure_parent_dir(dest)?;
    backend.save(&image, dest)
}

pub fn crop<B: ImageBackend>(backend: &B, src: &Path, dest: &Path, bbox: BoundingBox) -> Result<()> {
    let image = backend.open(src)?;
    let image = backend.crop(image, bbox)?;
    ensure_parent_dir(dest)?;
    backend.save(&image, dest)
}

/// Esegue l'azione sul file `src` e ritorna il percorso risultante.
///
/// Ogni errore viene riportato come `TransformFailure`. Dopo un transcode
/// verso un nuovo percorso il vecchio file è ancora presente.
pub fn apply<B: ImageBackend>(backend: &B, action: &Action, src: &Path) -> Result<PathBuf> {
    let result = match action {
        Action::Transcode { extension } => {
            let dest = transcode_destination(src, extension);
            transcode(backend, src, &dest).map(|_| dest)
        }
        Action::Resize { width, height } => {
            resize(backend, src, src, *width, *height).map(|_| src.to_path_buf())
        }
        Action::Crop { bbox } => crop(backend, src, src, *bbox).map(|_| src.to_path_buf()),
    };

    result.map_err(|e| match e {
        AppError::TransformFailure(_) => e,
        other => AppError::TransformFailure(other.to_string()),
    })
}
