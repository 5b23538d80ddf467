use std::path::Path;

use tempfile::TempDir;

use morsel::{IndexManifest, IndexWriter, IndexingConfig};

fn write_doc(dir: &Path, name: &str, body: &str) {
    let doc = serde_json::json!({ "title": name, "body": body });
    std::fs::write(dir.join(name), serde_json::to_vec(&doc).unwrap()).unwrap();
}

fn writer() -> IndexWriter {
    IndexWriter::new(IndexingConfig::default().with_num_threads(2)).unwrap()
}

fn fixture() -> (TempDir, TempDir) {
    let src = TempDir::new().unwrap();
    let out = TempDir::new().unwrap();
    write_doc(src.path(), "a.json", "forenote on mobile device detection");
    write_doc(src.path(), "b.json", "forenote on stop words");
    (src, out)
}

#[test]
fn unchanged_sources_keep_index_version() {
    let (src, out) = fixture();
    let first = writer().build(src.path(), out.path()).unwrap();
    assert_eq!(first.added_files, 2);
    assert_eq!(first.num_new_docs, 2);

    let second = writer().build_incremental(src.path(), out.path()).unwrap();
    assert_eq!(second.unchanged_files, 2);
    assert_eq!(second.num_new_docs, 0);
    assert_eq!(second.num_deleted_docs, 0);
    assert_eq!(second.index_ver, first.index_ver);
}

#[test]
fn modified_file_replaces_its_document() {
    let (src, out) = fixture();
    let first = writer().build(src.path(), out.path()).unwrap();

    write_doc(src.path(), "b.json", "forenote on stop words and a much longer body");
    let second = writer().build_incremental(src.path(), out.path()).unwrap();

    assert_eq!(second.updated_files, 1);
    assert_eq!(second.unchanged_files, 1);
    assert_eq!(second.num_new_docs, 1);
    assert_eq!(second.num_deleted_docs, 1);
    // Ids are never reused
    assert_eq!(second.num_docs, 3);
    assert_ne!(second.index_ver, first.index_ver);

    let manifest = IndexManifest::load(out.path()).unwrap();
    assert_eq!(manifest.index_ver, second.index_ver);
    assert_eq!(manifest.num_docs, 3);
}

#[test]
fn added_file_extends_index() {
    let (src, out) = fixture();
    writer().build(src.path(), out.path()).unwrap();

    write_doc(src.path(), "c.json", "a third document");
    let summary = writer().build_incremental(src.path(), out.path()).unwrap();
    assert_eq!(summary.added_files, 1);
    assert_eq!(summary.unchanged_files, 2);
    assert_eq!(summary.num_new_docs, 1);
    assert_eq!(summary.num_docs, 3);
}

#[test]
fn incremental_without_previous_index_builds_fully() {
    let (src, out) = fixture();
    let summary = writer().build_incremental(src.path(), out.path()).unwrap();
    assert_eq!(summary.added_files, 2);
    assert_eq!(summary.num_docs, 2);
    assert!(out.path().join("morsel_config.json").exists());
}

#[test]
fn link_target_appearing_later_updates_its_owner() {
    let (src, out) = fixture();
    std::fs::write(
        src.path().join("owner.json"),
        r#"{"fields": [["title", "Owner"]], "links": ["parts/extra.dat"]}"#,
    )
    .unwrap();
    let first = writer().build(src.path(), out.path()).unwrap();
    assert_eq!(first.num_new_docs, 3);

    std::fs::create_dir(src.path().join("parts")).unwrap();
    std::fs::write(src.path().join("parts/extra.dat"), "linkedword").unwrap();
    let second = writer().build_incremental(src.path(), out.path()).unwrap();

    assert_eq!(second.updated_files, 1);
    assert_eq!(second.num_new_docs, 1);
    assert_eq!(second.num_deleted_docs, 1);
    assert_ne!(second.index_ver, first.index_ver);
}

#[test]
fn overlong_max_token_length_is_capped() {
    let (src, out) = fixture();
    write_doc(src.path(), "c.json", &format!("short {}", "z".repeat(300)));

    let mut config = IndexingConfig::default().with_num_threads(2);
    config.tokenizer.max_token_length = 1000;
    let summary = IndexWriter::new(config)
        .unwrap()
        .build(src.path(), out.path())
        .unwrap();
    assert_eq!(summary.num_docs, 3);

    let manifest = IndexManifest::load(out.path()).unwrap();
    assert_eq!(manifest.lang.max_token_length, 255);
}
