use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use hoist_syntax::TextRange;

/// Identifier for a workspace file: its path relative to the workspace root,
/// with `/` separators.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct FileId(pub String);

impl FileId {
    pub fn new(path: impl Into<String>) -> Self {
        Self(path.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A single file edit.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct TextEdit {
    pub file: FileId,
    pub range: TextRange,
    pub replacement: String,
}

impl TextEdit {
    pub fn insert(file: FileId, offset: usize, text: impl Into<String>) -> Self {
        Self {
            file,
            range: TextRange::new(offset, offset),
            replacement: text.into(),
        }
    }

    pub fn replace(file: FileId, range: TextRange, text: impl Into<String>) -> Self {
        Self {
            file,
            range,
            replacement: text.into(),
        }
    }

    pub fn delete(file: FileId, range: TextRange) -> Self {
        Self {
            file,
            range,
            replacement: String::new(),
        }
    }
}

/// A set of edits across potentially multiple files.
///
/// Edits are expected to be normalized (sorted, deduplicated, non-overlapping)
/// before being applied.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct WorkspaceEdit {
    pub text_edits: Vec<TextEdit>,
}

impl WorkspaceEdit {
    pub fn new(text_edits: Vec<TextEdit>) -> Self {
        Self { text_edits }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.text_edits.is_empty()
    }

    /// Returns edits grouped by file in deterministic order.
    pub fn edits_by_file(&self) -> BTreeMap<&FileId, Vec<&TextEdit>> {
        let mut map: BTreeMap<&FileId, Vec<&TextEdit>> = BTreeMap::new();
        for edit in &self.text_edits {
            map.entry(&edit.file).or_default().push(edit);
        }
        for edits in map.values_mut() {
            edits.sort_by_key(|e| (e.range.start, e.range.end));
        }
        map
    }

    /// Sort by file and position, drop exact duplicates, join inserts at one
    /// offset, and fail on overlapping or inverted ranges.
    ///
    /// The sort is stable, so several inserts at one offset keep the order in
    /// which they were produced.
    pub fn normalize(&mut self) -> Result<(), EditError> {
        let mut edits = std::mem::take(&mut self.text_edits);
        edits.sort_by(|a, b| {
            (&a.file, a.range.start, a.range.end).cmp(&(&b.file, b.range.start, b.range.end))
        });

        let mut out: Vec<TextEdit> = Vec::with_capacity(edits.len());
        for edit in edits {
            if edit.range.start > edit.range.end {
                return Err(EditError::InvalidRange {
                    file: edit.file,
                    range: edit.range,
                });
            }
            match out.last_mut() {
                Some(prev) if prev.file == edit.file => {
                    if *prev == edit {
                        continue;
                    }
                    if prev.range == edit.range && edit.range.is_empty() {
                        prev.replacement.push_str(&edit.replacement);
                        continue;
                    }
                    if edit.range.start < prev.range.end || prev.range == edit.range {
                        return Err(EditError::OverlappingEdits {
                            file: edit.file,
                            first: prev.range,
                            second: edit.range,
                        });
                    }
                }
                _ => {}
            }
            out.push(edit);
        }
        self.text_edits = out;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EditError {
    #[error("invalid text range {range:?} in '{file}'")]
    InvalidRange { file: FileId, range: TextRange },
    #[error("overlapping edits in '{file}': {first:?} overlaps {second:?}")]
    OverlappingEdits {
        file: FileId,
        first: TextRange,
        second: TextRange,
    },
    #[error("text edit range {range:?} is outside the file bounds (len={len}) in '{file}'")]
    OutOfBounds {
        file: FileId,
        range: TextRange,
        len: usize,
    },
    #[error("edit targets unknown file '{0}'")]
    UnknownFile(FileId),
}

/// Apply non-overlapping `edits` to `original`.
///
/// Edits may come in any order; inserts at the same offset are applied in
/// the order given.
pub fn apply_text_edits(original: &str, edits: &[TextEdit]) -> Result<String, EditError> {
    let mut ordered: Vec<&TextEdit> = edits.iter().collect();
    ordered.sort_by_key(|edit| (edit.range.start, edit.range.end));

    let mut out = String::with_capacity(original.len());
    let mut cursor = 0;
    for edit in ordered {
        let TextRange { start, end } = edit.range;
        if end > original.len() || start > end {
            return Err(EditError::OutOfBounds {
                file: edit.file.clone(),
                range: edit.range,
                len: original.len(),
            });
        }
        if start < cursor || !original.is_char_boundary(start) || !original.is_char_boundary(end)
        {
            return Err(EditError::InvalidRange {
                file: edit.file.clone(),
                range: edit.range,
            });
        }
        out.push_str(&original[cursor..start]);
        out.push_str(&edit.replacement);
        cursor = end;
    }
    out.push_str(&original[cursor..]);
    Ok(out)
}

/// Apply a workspace edit to an in-memory snapshot, returning the whole new snapshot.
pub fn apply_workspace_edit(
    files: &BTreeMap<FileId, String>,
    edit: &WorkspaceEdit,
) -> Result<BTreeMap<FileId, String>, EditError> {
    let mut normalized = edit.clone();
    normalized.normalize()?;

    let mut out = files.clone();
    for (file, edits) in normalized.edits_by_file() {
        let Some(original) = files.get(file) else {
            return Err(EditError::UnknownFile(file.clone()));
        };
        let edits: Vec<TextEdit> = edits.into_iter().cloned().collect();
        let updated = apply_text_edits(original, &edits)?;
        out.insert(file.clone(), updated);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn file() -> FileId {
        FileId::new("a.py")
    }

    #[test]
    fn inserts_at_one_offset_keep_production_order() {
        let mut edit = WorkspaceEdit::new(vec![
            TextEdit::insert(file(), 0, "b\n"),
            TextEdit::insert(file(), 0, "a\n"),
        ]);
        edit.normalize().unwrap();
        assert_eq!(edit.text_edits.len(), 1);
        assert_eq!(edit.text_edits[0].replacement, "b\na\n");
    }

    #[test]
    fn overlapping_edits_are_rejected() {
        let mut edit = WorkspaceEdit::new(vec![
            TextEdit::replace(file(), TextRange::new(0, 4), "x"),
            TextEdit::replace(file(), TextRange::new(2, 6), "y"),
        ]);
        assert!(matches!(
            edit.normalize(),
            Err(EditError::OverlappingEdits { .. })
        ));
    }

    #[test]
    fn insert_next_to_replacement_is_not_an_overlap() {
        let mut edit = WorkspaceEdit::new(vec![
            TextEdit::replace(file(), TextRange::new(0, 3), "foo"),
            TextEdit::insert(file(), 3, "!"),
        ]);
        edit.normalize().unwrap();
        assert_eq!(apply_text_edits("abcdef", &edit.text_edits).unwrap(), "foo!def");
    }

    #[test]
    fn applies_workspace_edit_to_snapshot() {
        let mut files = BTreeMap::new();
        files.insert(file(), "x = 1\n".to_string());
        files.insert(FileId::new("b.py"), "y = 2\n".to_string());
        let edit = WorkspaceEdit::new(vec![TextEdit::replace(
            file(),
            TextRange::new(4, 5),
            "42",
        )]);
        let out = apply_workspace_edit(&files, &edit).unwrap();
        assert_eq!(out[&file()], "x = 42\n");
        assert_eq!(out[&FileId::new("b.py")], "y = 2\n");
    }

    #[test]
    fn unknown_files_are_reported() {
        let files = BTreeMap::new();
        let edit = WorkspaceEdit::new(vec![TextEdit::insert(file(), 0, "x")]);
        assert_eq!(
            apply_workspace_edit(&files, &edit),
            Err(EditError::UnknownFile(file()))
        );
    }
}
