// THEORY:
// The `corpus` module owns the boundary between the filesystem and the
// pipeline. A corpus is a flat folder of image files; its iteration order
// is the directory's natural listing order, captured exactly once at the
// start of a run. Every downstream ordering guarantee (summaries in corpus
// order, comparable repeated runs) hangs off that single captured listing,
// so nothing else in the engine ever re-reads the directory.

use crate::error::{Error, Result};
use image::DynamicImage;
use log::debug;
use std::path::{Path, PathBuf};

/// Lists the corpus in the directory's natural order. The listing is the
/// run's fixed image order; callers must not re-list mid-run.
pub fn list_corpus(data_folder: &Path) -> Result<Vec<PathBuf>> {
    if !data_folder.is_dir() {
        return Err(Error::not_found(format!(
            "corpus folder '{}'",
            data_folder.display()
        )));
    }
    let mut entries = Vec::new();
    for entry in std::fs::read_dir(data_folder)? {
        let path = entry?.path();
        if path.is_file() {
            entries.push(path);
        }
    }
    debug!(
        "corpus '{}': {} images",
        data_folder.display(),
        entries.len()
    );
    Ok(entries)
}

/// Decodes one corpus image.
pub fn load_image(path: &Path) -> Result<DynamicImage> {
    if !path.is_file() {
        return Err(Error::not_found(format!("image '{}'", path.display())));
    }
    Ok(image::open(path)?)
}

/// The identifier a summary records for one image: its file name.
pub fn image_id(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, RgbImage};

    fn write_png(dir: &Path, name: &str) {
        let img = DynamicImage::ImageRgb8(RgbImage::new(8, 8));
        img.save(dir.join(name)).expect("write test image");
    }

    #[test]
    fn listing_is_stable_within_a_run() {
        let dir = tempfile::tempdir().expect("tempdir");
        for name in ["a.png", "b.png", "c.png"] {
            write_png(dir.path(), name);
        }
        let first = list_corpus(dir.path()).expect("list");
        let second = list_corpus(dir.path()).expect("list");
        assert_eq!(first, second);
        assert_eq!(first.len(), 3);
    }

    #[test]
    fn missing_folder_is_not_found() {
        let err = list_corpus(Path::new("/definitely/not/here")).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn load_image_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        write_png(dir.path(), "img.png");
        let img = load_image(&dir.path().join("img.png")).expect("load");
        assert_eq!((img.width(), img.height()), (8, 8));
    }

    #[test]
    fn image_id_is_the_file_name() {
        assert_eq!(image_id(Path::new("/data/orig/cat.png")), "cat.png");
    }
}
