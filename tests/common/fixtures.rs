use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use image::{ImageBuffer, Rgb};
use tempfile::NamedTempFile;
use zip::write::SimpleFileOptions;

/// Manifest shipped with the test datasets
pub const TEST_MANIFEST: &str = "\
train: ../train/images
val: ../valid/images
nc: 2
names: ['car', 'person']
roboflow:
  workspace: drishti
  version: 3
";

/// Architecture template as found in the detection framework checkout
pub const TEST_MODEL_TEMPLATE: &str = "\
nc: 80
depth_multiple: 0.33
width_multiple: 0.50
anchors:
  - [10,13, 16,30, 33,23]
backbone:
  - [-1, 1, Conv, [64, 6, 2, 2]]
";

/// Creates a 100x100 red test image and returns the temp file.
/// The file will be automatically cleaned up when dropped.
pub fn create_test_image() -> NamedTempFile {
    let img = ImageBuffer::from_fn(100, 100, |_, _| Rgb([255u8, 0u8, 0u8]));
    let file = tempfile::Builder::new()
        .suffix(".jpg")
        .tempfile()
        .expect("Failed to create temp image file");
    img.save_with_format(file.path(), image::ImageFormat::Jpeg)
        .expect("Failed to save test image");
    file
}

/// Write a zip archive at `path` with the given `(name, contents)` files.
/// Names ending in `/` become directory entries.
pub fn write_zip(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("Failed to create zip file");
    let mut zip = zip::ZipWriter::new(file);
    let options = SimpleFileOptions::default();
    for (name, contents) in entries {
        if name.ends_with('/') {
            zip.add_directory(*name, options)
                .expect("Failed to add zip directory");
        } else {
            zip.start_file(*name, options).expect("Failed to start zip entry");
            zip.write_all(contents).expect("Failed to write zip entry");
        }
    }
    zip.finish().expect("Failed to finish zip");
}

/// Zip archive bytes holding a complete dataset: `train/`, `valid/` and
/// `data.yaml`.
pub fn dataset_zip_bytes() -> Vec<u8> {
    let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
    let path = dir.path().join("data.zip");
    write_zip(
        &path,
        &[
            ("train/images/img1.jpg", b"jpeg"),
            ("train/labels/img1.txt", b"0 0.5 0.5 0.1 0.1"),
            ("valid/images/img2.jpg", b"jpeg"),
            ("data.yaml", TEST_MANIFEST.as_bytes()),
        ],
    );
    fs::read(&path).expect("Failed to read zip")
}

/// Write a zstd-compressed tarball at `path` with the given files
pub fn write_tar_zst(path: &Path, entries: &[(&str, &[u8])]) {
    let file = File::create(path).expect("Failed to create tar.zst file");
    let encoder = zstd::Encoder::new(file, 0).expect("Failed to create zstd encoder");
    let mut builder = tar::Builder::new(encoder);
    for (name, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, name, *contents)
            .expect("Failed to append tar entry");
    }
    let encoder = builder.into_inner().expect("Failed to finish tar");
    encoder.finish().expect("Failed to finish zstd stream");
}

/// Lay out the pieces of a detection framework checkout the trainer reads:
/// `models/<stem>.yaml`.
pub fn create_yolo_checkout(yolo_dir: &Path) -> PathBuf {
    let models = yolo_dir.join("models");
    fs::create_dir_all(&models).expect("Failed to create models dir");
    let template = models.join("yolov5s.yaml");
    fs::write(&template, TEST_MODEL_TEMPLATE).expect("Failed to write model template");
    template
}

/// Feature store with the manifest and both split directories
pub fn create_feature_store(dir: &Path) {
    fs::create_dir_all(dir.join("train/images")).expect("Failed to create train dir");
    fs::create_dir_all(dir.join("valid/images")).expect("Failed to create valid dir");
    fs::write(dir.join("data.yaml"), TEST_MANIFEST).expect("Failed to write manifest");
}

/// Sorted top-level entry names of `dir`
pub fn list_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<String> = fs::read_dir(dir)
        .expect("Failed to list dir")
        .map(|e| e.expect("bad entry").file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    names
}
