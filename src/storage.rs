use std::path::{Path, PathBuf};

use crate::eid::TaskId;

/// Write through a temp file in the same directory and rename into place,
/// so readers never observe a half-written document.
pub fn write_atomic(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().to_string())
        .unwrap_or_default();
    let temp_path = path.with_file_name(format!(".{}-{file_name}", TaskId::new()));

    std::fs::write(&temp_path, data)?;

    std::fs::rename(&temp_path, path)
}

/// Copy frames into `dir` as `unique_frame_000001.<ext>`, ...
///
/// Frames that fail to copy are logged and skipped; the returned list holds
/// only the files that now exist, in input order.
pub fn save_frames(frames: &[PathBuf], dir: &Path) -> std::io::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)?;

    let mut saved = Vec::with_capacity(frames.len());
    for (idx, src) in frames.iter().enumerate() {
        let ext = src
            .extension()
            .map(|ext| ext.to_string_lossy().to_string())
            .unwrap_or_else(|| "jpg".to_string());
        let dst = dir.join(format!("unique_frame_{:06}.{ext}", idx + 1));

        match std::fs::copy(src, &dst) {
            Ok(_) => saved.push(dst),
            Err(e) => log::warn!("failed to save {}: {e}", src.display()),
        }
    }

    log::debug!("saved {} frames to {}", saved.len(), dir.display());
    Ok(saved)
}

/// `path` relative to `base` with forward slashes, as stored in the notes.
pub fn relative_to(path: &Path, base: &Path) -> String {
    let rel = path.strip_prefix(base).unwrap_or(path);
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy().to_string())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_atomic_replaces_content() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("doc.json");

        write_atomic(&path, b"first").unwrap();
        write_atomic(&path, b"second").unwrap();

        assert_eq!(std::fs::read(&path).unwrap(), b"second");
        let leftovers = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(leftovers, 1);
    }

    #[test]
    fn test_save_frames_numbers_in_order_and_skips_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let a = tmp.path().join("a.png");
        let b = tmp.path().join("b.jpg");
        std::fs::write(&a, b"a").unwrap();
        std::fs::write(&b, b"b").unwrap();
        let missing = tmp.path().join("gone.jpg");

        let out = tmp.path().join("out");
        let saved = save_frames(&[b.clone(), missing, a.clone()], &out).unwrap();

        assert_eq!(
            saved,
            vec![
                out.join("unique_frame_000001.jpg"),
                out.join("unique_frame_000003.png"),
            ]
        );
        assert_eq!(std::fs::read(&saved[0]).unwrap(), b"b");
    }

    #[test]
    fn test_relative_to() {
        let base = Path::new("/data/out");
        let path = base.join("frames").join("segment_1").join("unique_frame_000001.jpg");
        assert_eq!(
            relative_to(&path, base),
            "frames/segment_1/unique_frame_000001.jpg"
        );
    }
}
