#![allow(missing_docs)]

use std::path::{Path, PathBuf};

fn collect_rs_files(root: &Path, out: &mut Vec<PathBuf>) {
    if let Ok(entries) = std::fs::read_dir(root) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                collect_rs_files(&path, out);
            } else if path.extension().and_then(std::ffi::OsStr::to_str) == Some("rs") {
                out.push(path);
            }
        }
    }
}

#[test]
fn only_the_client_writes_to_the_transport() {
    let manifest_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    let src_dir = manifest_dir.join("src");
    let mut files = Vec::new();
    collect_rs_files(&src_dir, &mut files);
    assert!(!files.is_empty());

    let allowed = [
        src_dir.join("client.rs"),
        src_dir.join("transport").join("pipe.rs"),
        src_dir.join("transport").join("websocket.rs"),
    ];

    let offenders: Vec<String> = files
        .iter()
        .filter_map(|file| {
            if allowed.iter().any(|allowed_file| allowed_file == file) {
                return None;
            }
            let content = std::fs::read_to_string(file).ok()?;
            if content.contains("transport.send(") {
                Some(file.display().to_string())
            } else {
                None
            }
        })
        .collect();

    assert!(
        offenders.is_empty(),
        "only the protocol client may write frames: {offenders:?}"
    );
}
