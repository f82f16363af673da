//! Image decoding at the pipeline boundary.

use std::path::{Path, PathBuf};

use image::ImageReader;
use sfm_core::Image;
use tracing::debug;

use crate::error::{SfmError, SfmResult};

const IMAGE_EXTENSIONS: [&str; 3] = ["jpg", "jpeg", "png"];

/// Decodes one file into an RGB8 [`Image`] with its grayscale copy
pub fn load_image<P: AsRef<Path>>(path: P) -> SfmResult<Image> {
    let path = path.as_ref();
    let decoded = ImageReader::open(path)
        .and_then(|r| r.with_guessed_format())
        .map_err(|e| SfmError::io(path, e))?
        .decode()
        .map_err(|source| SfmError::ImageDecode {
            path: path.to_path_buf(),
            source,
        })?;

    let rgb = decoded.to_rgb8();
    let (width, height) = rgb.dimensions();
    debug!(path = %path.display(), width, height, "decoded image");
    Ok(Image::from_rgb(width as usize, height as usize, rgb.into_raw())?)
}

/// Decodes every path in order; the first failure aborts the load
pub fn load_images<P: AsRef<Path>>(paths: &[P]) -> SfmResult<Vec<Image>> {
    paths.iter().map(load_image).collect()
}

/// `.jpg`, `.jpeg` and `.png` files directly inside `dir`, sorted by name
pub fn collect_image_paths<P: AsRef<Path>>(dir: P) -> SfmResult<Vec<PathBuf>> {
    let dir = dir.as_ref();
    if !dir.is_dir() {
        return Err(SfmError::InvalidArgument(format!("{} is not a directory", dir.display())));
    }

    let mut paths = Vec::new();
    for entry in std::fs::read_dir(dir).map_err(|e| SfmError::io(dir, e))? {
        let path = entry.map_err(|e| SfmError::io(dir, e))?.path();
        let is_image = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()));
        if is_image && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_load_png_keeps_color_and_gray() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let mut img = RgbImage::new(4, 3);
        img.put_pixel(1, 2, Rgb([200, 10, 40]));
        img.save(&path).unwrap();

        let loaded = load_image(&path).unwrap();
        assert_eq!(loaded.dimensions(), (4, 3));
        assert_eq!(loaded.color_at(1.0, 2.0), Some([200, 10, 40]));
        assert_eq!(loaded.gray().len(), 12);
        assert_eq!(loaded.gray()[0], 0);
    }

    #[test]
    fn test_collect_sorted_images_only() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.png", "a.JPG", "c.jpeg", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("d.png")).unwrap();

        let names: Vec<String> = collect_image_paths(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, ["a.JPG", "b.png", "c.jpeg"]);
    }

    #[test]
    fn test_missing_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = collect_image_paths(dir.path().join("nope")).unwrap_err();
        assert!(matches!(err, SfmError::InvalidArgument(_)));
    }

    #[test]
    fn test_load_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(load_image(dir.path().join("absent.png")), Err(SfmError::Io { .. })));

        let garbage = dir.path().join("garbage.png");
        std::fs::write(&garbage, b"definitely not a png").unwrap();
        assert!(matches!(load_image(&garbage), Err(SfmError::ImageDecode { .. })));
    }
}
