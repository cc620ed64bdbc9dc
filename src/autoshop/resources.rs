//! Vehicle images kept under the application's resource root.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info, instrument, warn};

use crate::autoshop::error::{ReportError, Result};

/// Directory under the resource root that holds managed images.
pub const IMAGES_DIR: &str = "Images";
pub const DEFAULT_IMAGE_NAME: &str = "default_vehicle.png";

/// Image used whenever a vehicle has none, compiled into the binary.
pub const DEFAULT_VEHICLE_IMAGE: &[u8] = include_bytes!("../../assets/default_vehicle.png");

const PNG_SIGNATURE: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
const JPEG_SIGNATURE: &[u8] = &[0xFF, 0xD8, 0xFF];

/// Container formats accepted for embedded pictures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
}

impl ImageKind {
    /// Detects the format from the file signature.
    pub fn detect(bytes: &[u8]) -> Result<Self> {
        if bytes.starts_with(PNG_SIGNATURE) {
            Ok(ImageKind::Png)
        } else if bytes.starts_with(JPEG_SIGNATURE) {
            Ok(ImageKind::Jpeg)
        } else {
            Err(ReportError::InvalidData(
                "vehicle image is neither PNG nor JPEG".into(),
            ))
        }
    }

    pub fn extension(self) -> &'static str {
        match self {
            ImageKind::Png => "png",
            ImageKind::Jpeg => "jpeg",
        }
    }

    pub fn content_type(self) -> &'static str {
        match self {
            ImageKind::Png => "image/png",
            ImageKind::Jpeg => "image/jpeg",
        }
    }
}

/// Resolves relative image references against a resource root.
#[derive(Debug, Clone)]
pub struct ResourceResolver {
    root: PathBuf,
}

impl ResourceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn images_dir(&self) -> PathBuf {
        self.root.join(IMAGES_DIR)
    }

    pub fn default_image_path(&self) -> PathBuf {
        self.images_dir().join(DEFAULT_IMAGE_NAME)
    }

    /// Absolute path of `relative`, or of the default image when the
    /// reference is empty or points at nothing.
    pub fn resolve_or_default(&self, relative: Option<&str>) -> PathBuf {
        match relative.map(str::trim).filter(|value| !value.is_empty()) {
            Some(value) => {
                let candidate = self.root.join(value);
                if candidate.is_file() {
                    candidate
                } else {
                    debug!(image = value, "image missing, using default");
                    self.default_image_path()
                }
            }
            None => self.default_image_path(),
        }
    }

    /// Bytes of the resolved image. Falls back to the bundled default when
    /// even the default file is absent from the resource root.
    pub fn load_image(&self, relative: Option<&str>) -> Result<Vec<u8>> {
        let path = self.resolve_or_default(relative);
        if path.is_file() {
            return Ok(fs::read(&path)?);
        }
        warn!(path = %path.display(), "default image missing, using bundled copy");
        Ok(DEFAULT_VEHICLE_IMAGE.to_vec())
    }

    /// Copies an external image into managed storage, replacing any file of
    /// the same name, and returns the stored relative path.
    #[instrument(level = "info", skip(self), fields(source = %source.display()))]
    pub fn import_image(&self, source: &Path) -> Result<String> {
        if !source.is_file() {
            return Err(ReportError::MissingInput(source.to_path_buf()));
        }
        let file_name = source
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| {
                ReportError::InvalidData(format!("unusable image name {}", source.display()))
            })?;

        fs::create_dir_all(self.images_dir())?;
        let target = self.images_dir().join(file_name);
        fs::copy(source, &target)?;
        info!(target = %target.display(), "imported vehicle image");
        Ok(format!("{IMAGES_DIR}/{file_name}"))
    }
}
