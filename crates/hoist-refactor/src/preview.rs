use std::collections::BTreeMap;

use serde::Serialize;
use similar::TextDiff;

use crate::db::RefactorDatabase;
use crate::edit::{apply_workspace_edit, EditError, FileId, WorkspaceEdit};

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct FilePreview {
    pub file: FileId,
    #[serde(skip)]
    pub original: String,
    #[serde(skip)]
    pub modified: String,
    pub unified_diff: String,
    pub edit_count: usize,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RefactoringPreview {
    pub total_files: usize,
    pub total_edits: usize,
    pub files: Vec<FilePreview>,
}

impl RefactoringPreview {
    /// All file diffs concatenated, in file order.
    #[must_use]
    pub fn unified_diff(&self) -> String {
        self.files
            .iter()
            .map(|file| file.unified_diff.as_str())
            .collect()
    }
}

/// Render per-file unified diffs for `edit` against the database snapshot.
pub fn generate_preview(
    db: &dyn RefactorDatabase,
    edit: &WorkspaceEdit,
) -> Result<RefactoringPreview, EditError> {
    let mut normalized = edit.clone();
    normalized.normalize()?;

    let mut original_files: BTreeMap<FileId, String> = BTreeMap::new();
    for e in &normalized.text_edits {
        if original_files.contains_key(&e.file) {
            continue;
        }
        let Some(text) = db.file_text(&e.file) else {
            return Err(EditError::UnknownFile(e.file.clone()));
        };
        original_files.insert(e.file.clone(), text.to_string());
    }

    let modified_files = apply_workspace_edit(&original_files, &normalized)?;

    let mut files = Vec::new();
    for (file, original) in &original_files {
        let modified = modified_files
            .get(file)
            .map(String::as_str)
            .unwrap_or_default();
        if original == modified {
            continue;
        }

        let diff = TextDiff::from_lines(original.as_str(), modified);
        let unified_diff = diff
            .unified_diff()
            .context_radius(3)
            .header(&format!("a/{file}"), &format!("b/{file}"))
            .to_string();

        let edit_count = normalized
            .text_edits
            .iter()
            .filter(|e| &e.file == file)
            .count();

        files.push(FilePreview {
            file: file.clone(),
            original: original.clone(),
            modified: modified.to_string(),
            unified_diff,
            edit_count,
        });
    }

    tracing::trace!(target: "hoist.refactor", files = files.len(), "preview generated");

    Ok(RefactoringPreview {
        total_files: files.len(),
        total_edits: normalized.text_edits.len(),
        files,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::{TextEdit, TextRange};
    use hoist_syntax::ParseResult;
    use pretty_assertions::assert_eq;

    struct Files(BTreeMap<FileId, String>);

    impl RefactorDatabase for Files {
        fn file_text(&self, file: &FileId) -> Option<&str> {
            self.0.get(file).map(String::as_str)
        }

        fn parsed(&self, _file: &FileId) -> Option<&ParseResult> {
            None
        }

        fn importable_module_name(&self, _file: &FileId) -> Option<String> {
            None
        }
    }

    #[test]
    fn renders_unified_diff_with_headers() {
        let file = FileId::new("pkg/a.py");
        let db = Files(BTreeMap::from([(file.clone(), "x = 1\ny = 2\n".to_string())]));
        let edit = WorkspaceEdit::new(vec![TextEdit::replace(
            file.clone(),
            TextRange::new(4, 5),
            "10",
        )]);

        let preview = generate_preview(&db, &edit).unwrap();
        assert_eq!(preview.total_files, 1);
        assert_eq!(preview.total_edits, 1);
        assert_eq!(preview.files[0].modified, "x = 10\ny = 2\n");
        assert_eq!(
            preview.unified_diff(),
            "--- a/pkg/a.py\n+++ b/pkg/a.py\n@@ -1,2 +1,2 @@\n-x = 1\n+x = 10\n y = 2\n"
        );
    }

    #[test]
    fn no_op_edits_produce_no_file_previews() {
        let file = FileId::new("a.py");
        let db = Files(BTreeMap::from([(file.clone(), "x = 1\n".to_string())]));
        let edit = WorkspaceEdit::new(vec![TextEdit::replace(
            file,
            TextRange::new(4, 5),
            "1",
        )]);

        let preview = generate_preview(&db, &edit).unwrap();
        assert!(preview.files.is_empty());
        assert_eq!(preview.total_edits, 1);
    }

    #[test]
    fn edits_to_unknown_files_fail() {
        let db = Files(BTreeMap::new());
        let edit = WorkspaceEdit::new(vec![TextEdit::insert(FileId::new("a.py"), 0, "x")]);
        assert_eq!(
            generate_preview(&db, &edit),
            Err(EditError::UnknownFile(FileId::new("a.py")))
        );
    }
}
