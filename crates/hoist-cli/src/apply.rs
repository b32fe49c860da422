use anyhow::{Context, Result};
use hoist_refactor::FileId;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Write every file whose text differs from `original`. Each write goes
/// through a temporary file in the same directory followed by a rename.
pub(crate) fn write_changes(
    root: &Path,
    original: &BTreeMap<FileId, String>,
    changed: &BTreeMap<FileId, String>,
) -> Result<Vec<FileId>> {
    let mut written = Vec::new();
    for (file, text) in changed {
        if original.get(file) == Some(text) {
            continue;
        }
        let path = path_for_file_id(root, file);
        atomic_write(&path, text.as_bytes())
            .with_context(|| format!("failed to write {}", path.display()))?;
        tracing::debug!(target: "hoist.cli", path = %path.display(), "wrote file");
        written.push(file.clone());
    }
    Ok(written)
}

fn path_for_file_id(root: &Path, file: &FileId) -> PathBuf {
    file.as_str()
        .split('/')
        .fold(root.to_path_buf(), |path, part| path.join(part))
}

fn atomic_write(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let parent = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|err| err.error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn writes_only_changed_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("pkg")).unwrap();
        std::fs::write(dir.path().join("pkg/a.py"), "a = 1\n").unwrap();
        std::fs::write(dir.path().join("b.py"), "b = 1\n").unwrap();

        let original = BTreeMap::from([
            (FileId::new("pkg/a.py"), "a = 1\n".to_string()),
            (FileId::new("b.py"), "b = 1\n".to_string()),
        ]);
        let mut changed = original.clone();
        changed.insert(FileId::new("pkg/a.py"), "a = 2\n".to_string());

        let written = write_changes(dir.path(), &original, &changed).unwrap();
        assert_eq!(written, vec![FileId::new("pkg/a.py")]);
        assert_eq!(
            std::fs::read_to_string(dir.path().join("pkg/a.py")).unwrap(),
            "a = 2\n"
        );
        assert_eq!(
            std::fs::read_to_string(dir.path().join("b.py")).unwrap(),
            "b = 1\n"
        );
    }
}
