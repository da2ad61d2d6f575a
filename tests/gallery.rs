mod common;

use std::fs;

use common::{solid, ColorAnalyzer, POISON};
use epiwatch::Gallery;
use image::RgbImage;

fn write_png(dir: &std::path::Path, name: &str, color: [u8; 3]) {
    solid(color).save(dir.join(name)).unwrap();
}

#[test]
fn loads_images_named_after_their_stem() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "bob.png", [150, 100, 100]);
    write_png(dir.path(), "alice.png", [100, 100, 100]);
    fs::rename(dir.path().join("alice.png"), dir.path().join("alice.PNG")).unwrap();
    fs::write(dir.path().join("notes.txt"), "not a face").unwrap();

    let mut analyzer = ColorAnalyzer::new(vec![]);
    let gallery = Gallery::load(dir.path(), &mut analyzer).unwrap();

    let names: Vec<&str> = gallery.identities().iter().map(|i| i.name.as_str()).collect();
    assert_eq!(names, vec!["alice", "bob"]);
    assert_eq!(gallery.dimension(), Some(3));
    assert_eq!(gallery.identities()[1].embedding.to_vec(), vec![150.0, 100.0, 100.0]);
}

#[test]
fn unreadable_or_unembeddable_files_are_skipped() {
    let dir = tempfile::tempdir().unwrap();
    write_png(dir.path(), "carol.png", [10, 20, 30]);
    RgbImage::from_pixel(8, 8, POISON)
        .save(dir.path().join("dave.png"))
        .unwrap();
    fs::write(dir.path().join("erin.jpg"), b"definitely not a jpeg").unwrap();

    let mut analyzer = ColorAnalyzer::new(vec![]);
    let gallery = Gallery::load(dir.path(), &mut analyzer).unwrap();

    assert_eq!(gallery.len(), 1);
    assert_eq!(gallery.identities()[0].name, "carol");
}

#[test]
fn empty_directory_gives_empty_gallery() {
    let dir = tempfile::tempdir().unwrap();
    let gallery = Gallery::load(dir.path(), &mut ColorAnalyzer::new(vec![])).unwrap();
    assert!(gallery.is_empty());
    assert_eq!(gallery.dimension(), None);
}

#[test]
fn missing_directory_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let missing = dir.path().join("nope");
    assert!(Gallery::load(&missing, &mut ColorAnalyzer::new(vec![])).is_err());
}
