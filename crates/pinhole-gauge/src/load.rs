//! Image decoding and directory listing.

use crate::core::GrayImageView;
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("file not found: {}", .0.display())]
    FileNotFound(PathBuf),
    #[error("could not decode {}: {source}", .path.display())]
    DecodeFailure {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Decode `path` and convert it to 8-bit grayscale.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, LoadError> {
    let path = path.as_ref();
    if !path.is_file() {
        return Err(LoadError::FileNotFound(path.to_path_buf()));
    }
    let img = ::image::open(path).map_err(|source| LoadError::DecodeFailure {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(img.to_luma8())
}

/// Convert an `image::GrayImage` into the lightweight core view type.
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Files in `dir` whose extension matches one of `extensions`
/// (case-insensitive), sorted by path.
pub fn list_images(dir: impl AsRef<Path>, extensions: &[String]) -> Result<Vec<PathBuf>, LoadError> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(LoadError::FileNotFound(dir.to_path_buf()));
    }
    let mut files: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|p| p.is_file())
        .filter(|p| {
            p.extension()
                .and_then(|e| e.to_str())
                .is_some_and(|e| extensions.iter().any(|x| x.eq_ignore_ascii_case(e)))
        })
        .collect();
    files.sort();
    Ok(files)
}

/// File name used to label a view in logs and records.
pub fn label_for(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
