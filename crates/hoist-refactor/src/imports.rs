use std::collections::BTreeMap;

use hoist_syntax::ast::{Module, Stmt, StmtId};

use crate::edit::{FileId, TextEdit};
use crate::lines;
use crate::make_top_level::MakeTopLevelError;
use crate::scope;

/// Make `symbol` from `module_path` available at module level of `file`.
///
/// Returns `None` when `from <module_path> import <symbol>` is already
/// present. Otherwise the symbol is appended to an existing
/// `from <module_path> import ...`, or a new import line is added after the
/// leading imports (or the docstring, or leading comments).
pub fn ensure_import(
    module: &Module,
    text: &str,
    file: &FileId,
    module_path: &str,
    symbol: &str,
) -> Result<Option<TextEdit>, MakeTopLevelError> {
    let mut existing = None;
    for &stmt in &module.body {
        let Stmt::ImportFrom {
            module: Some(from),
            level: 0,
            names,
            is_star: false,
            ..
        } = module.stmt(stmt)
        else {
            continue;
        };
        if from != module_path {
            continue;
        }
        if names
            .iter()
            .any(|alias| alias.name == symbol && alias.bound_name() == symbol)
        {
            return Ok(None);
        }
        if existing.is_none() {
            existing = names.last().map(|alias| alias.range.end);
        }
    }

    if scope::module_binds_name(module, symbol) {
        return Err(MakeTopLevelError::NameConflict {
            name: symbol.to_string(),
            file: file.clone(),
            offset: 0,
        });
    }

    if let Some(offset) = existing {
        return Ok(Some(TextEdit::insert(
            file.clone(),
            offset,
            format!(", {symbol}"),
        )));
    }

    let nl = lines::newline(text);
    let offset = import_offset(module, text);
    let mut line = format!("from {module_path} import {symbol}{nl}");
    if offset == text.len() && !text.is_empty() && !text.ends_with('\n') {
        line.insert_str(0, nl);
    }
    Ok(Some(TextEdit::insert(file.clone(), offset, line)))
}

/// Where a new import line goes.
fn import_offset(module: &Module, text: &str) -> usize {
    let docstring = module.docstring();
    let mut last: Option<StmtId> = docstring;
    for &stmt in module.body.iter().skip(usize::from(docstring.is_some())) {
        match module.stmt(stmt) {
            Stmt::Import { .. } | Stmt::ImportFrom { .. } => last = Some(stmt),
            _ => break,
        }
    }
    if let Some(stmt) = last {
        return lines::line_end(text, module.stmt(stmt).range().end);
    }

    // Keep a shebang, encoding line and other leading comments first.
    let mut offset = 0;
    while offset < text.len() && text[offset..].starts_with('#') {
        offset = lines::line_end(text, offset);
    }
    offset
}

/// Per-refactoring memo so each file gets at most one import edit.
#[derive(Debug, Default)]
pub struct ImportManager {
    ensured: BTreeMap<FileId, Option<TextEdit>>,
}

impl ImportManager {
    pub fn ensure(
        &mut self,
        module: &Module,
        text: &str,
        file: &FileId,
        module_path: &str,
        symbol: &str,
    ) -> Result<Option<&TextEdit>, MakeTopLevelError> {
        if !self.ensured.contains_key(file) {
            let edit = ensure_import(module, text, file, module_path, symbol)?;
            self.ensured.insert(file.clone(), edit);
        }
        Ok(self.ensured.get(file).and_then(Option::as_ref))
    }

    #[must_use]
    pub fn into_edits(self) -> Vec<TextEdit> {
        self.ensured.into_values().flatten().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::apply_text_edits;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn ensure(text: &str) -> Result<String, MakeTopLevelError> {
        let parsed = parse(text);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let file = FileId::new("use.py");
        let edit = ensure_import(&parsed.module, text, &file, "pkg.shapes", "area")?;
        Ok(match edit {
            Some(edit) => apply_text_edits(text, &[edit]).unwrap(),
            None => text.to_string(),
        })
    }

    #[test]
    fn existing_import_is_left_alone() {
        let text = "from pkg.shapes import Shape, area\n\nprint(area)\n";
        assert_eq!(ensure(text).unwrap(), text);
    }

    #[test]
    fn appends_to_existing_from_import() {
        assert_eq!(
            ensure("from pkg.shapes import Shape\n\nx = 1\n").unwrap(),
            "from pkg.shapes import Shape, area\n\nx = 1\n"
        );
        assert_eq!(
            ensure("from pkg.shapes import (\n    Shape,\n)\n").unwrap(),
            "from pkg.shapes import (\n    Shape, area,\n)\n"
        );
    }

    #[test]
    fn new_line_after_leading_imports() {
        assert_eq!(
            ensure("\"\"\"Doc.\"\"\"\nimport os\nfrom pkg import Shape\n\nx = 1\n").unwrap(),
            "\"\"\"Doc.\"\"\"\nimport os\nfrom pkg import Shape\nfrom pkg.shapes import area\n\nx = 1\n"
        );
    }

    #[test]
    fn new_line_after_docstring_or_comments() {
        assert_eq!(
            ensure("\"\"\"Doc.\"\"\"\nx = 1\n").unwrap(),
            "\"\"\"Doc.\"\"\"\nfrom pkg.shapes import area\nx = 1\n"
        );
        assert_eq!(
            ensure("#!/usr/bin/env python\n# coding: utf-8\nx = 1\n").unwrap(),
            "#!/usr/bin/env python\n# coding: utf-8\nfrom pkg.shapes import area\nx = 1\n"
        );
        assert_eq!(ensure("import os").unwrap(), "import os\nfrom pkg.shapes import area\n");
    }

    #[test]
    fn other_module_level_binding_conflicts() {
        let err = ensure("def area():\n    pass\n").unwrap_err();
        assert!(matches!(err, MakeTopLevelError::NameConflict { .. }));
        let err = ensure("from geometry import area\n").unwrap_err();
        assert!(matches!(err, MakeTopLevelError::NameConflict { .. }));
    }

    #[test]
    fn manager_produces_one_edit_per_file() {
        let text = "x = 1\n";
        let parsed = parse(text);
        let file = FileId::new("use.py");
        let mut manager = ImportManager::default();
        for _ in 0..3 {
            manager
                .ensure(&parsed.module, text, &file, "pkg.shapes", "area")
                .unwrap();
        }
        let edits = manager.into_edits();
        assert_eq!(edits.len(), 1);
        assert_eq!(edits[0].replacement, "from pkg.shapes import area\n");
    }
}
