//! Shared helpers for the integration tests: small PDFs written with lopdf.

#![allow(dead_code)]

use barcode_pdf::config::Directories;
use barcode_pdf::core::barcode::code128;
use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Document, Object, Stream};
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// A one-page letter-size PDF. With a payload, the barcode is drawn as
/// vector bars near the top-left corner of the page.
pub fn write_pdf(path: &Path, payload: Option<&str>) {
    let mut operations = Vec::new();
    if let Some(payload) = payload {
        operations.push(Operation::new("g", vec![0.into()]));
        let (x, y, module, height) = (40.0_f32, 700.0_f32, 2.0_f32, 50.0_f32);
        for (index, bar) in code128::modules(payload).unwrap().into_iter().enumerate() {
            if bar {
                operations.push(Operation::new(
                    "re",
                    vec![(x + index as f32 * module).into(), y.into(), module.into(), height.into()],
                ));
            }
        }
        operations.push(Operation::new("f", vec![]));
    }

    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let content = Content { operations }.encode().unwrap();
    let content_id = doc.add_object(Stream::new(dictionary! {}, content));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => content_id,
        "Resources" => dictionary! {},
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![Object::from(page_id)],
            "Count" => 1,
            "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
        }),
    );
    let catalog_id = doc.add_object(dictionary! { "Type" => "Catalog", "Pages" => pages_id });
    doc.trailer.set("Root", catalog_id);
    doc.save(path).unwrap();
}

/// A temp root with `processing/` created and `error/`, `done/` left for
/// the code under test to create.
pub fn directories() -> (TempDir, Directories) {
    let temp = TempDir::new().unwrap();
    let directories = Directories {
        processing: temp.path().join("processing"),
        error: temp.path().join("error"),
        done: temp.path().join("done"),
    };
    fs::create_dir_all(&directories.processing).unwrap();
    (temp, directories)
}
