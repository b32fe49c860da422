//! Workspace snapshot for hoist refactorings.
//!
//! [`Index`] owns the text of every file in a workspace, parses the Python
//! ones once, and answers the two questions the refactoring engine asks:
//! what does a file contain ([`RefactorDatabase`]) and where is a method
//! called ([`UsageIndex`]).

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use hoist_refactor::scope::member_bindings;
use hoist_refactor::{
    CallSite, FileId, MemberBinding, MethodTarget, RefactorDatabase, UsageIndex,
};
use hoist_syntax::ast::Expr;
use hoist_syntax::{is_identifier, is_keyword, parse, ParseResult};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("failed to read `{path}`: {source}")]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// An immutable snapshot of a workspace.
#[derive(Debug)]
pub struct Index {
    files: BTreeMap<FileId, String>,
    parsed: BTreeMap<FileId, ParseResult>,
    source_roots: Vec<PathBuf>,
}

impl Index {
    /// Build an index over `files`, keyed by workspace-relative `/` paths.
    ///
    /// `source_roots` are workspace-relative directories module paths are
    /// computed against; an empty list means the workspace root.
    pub fn new(files: BTreeMap<FileId, String>, source_roots: Vec<PathBuf>) -> Self {
        let mut parsed = BTreeMap::new();
        let mut parse_errors = 0usize;
        for (file, text) in &files {
            if !is_python(file) {
                continue;
            }
            let result = parse(text);
            parse_errors += result.errors.len();
            parsed.insert(file.clone(), result);
        }
        tracing::debug!(
            target: "hoist.index",
            files = files.len(),
            python_files = parsed.len(),
            parse_errors,
            "indexed workspace"
        );

        let source_roots = if source_roots.is_empty() {
            vec![PathBuf::new()]
        } else {
            source_roots.iter().map(|root| normalize(root)).collect()
        };
        Self {
            files,
            parsed,
            source_roots,
        }
    }

    /// Read every `.py` file under `root`, skipping hidden directories and
    /// `__pycache__`.
    pub fn load(root: &Path, source_roots: Vec<PathBuf>) -> Result<Self, IndexError> {
        let mut files = BTreeMap::new();
        let mut walk_errors = 0u64;
        let walker = WalkDir::new(root)
            .follow_links(true)
            .into_iter()
            .filter_entry(|entry| entry.depth() == 0 || !is_skipped_dir(entry));
        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    walk_errors += 1;
                    tracing::debug!(
                        target: "hoist.index",
                        root = %root.display(),
                        path = ?err.path(),
                        error = %err,
                        "failed to walk workspace; skipping entry"
                    );
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            let path = entry.path();
            if path.extension().map_or(true, |ext| ext != "py") {
                continue;
            }
            let Ok(relative) = path.strip_prefix(root) else {
                continue;
            };
            let text = std::fs::read_to_string(path).map_err(|source| IndexError::ReadFile {
                path: path.to_path_buf(),
                source,
            })?;
            files.insert(file_id_for(relative), text);
        }
        if walk_errors > 0 {
            tracing::debug!(target: "hoist.index", root = %root.display(), walk_errors, "workspace walk finished with errors");
        }
        Ok(Self::new(files, source_roots))
    }

    pub fn files(&self) -> impl Iterator<Item = &FileId> {
        self.files.keys()
    }

    /// A copy of all file contents, the input to
    /// [`hoist_refactor::apply_workspace_edit`].
    #[must_use]
    pub fn snapshot(&self) -> BTreeMap<FileId, String> {
        self.files.clone()
    }
}

impl RefactorDatabase for Index {
    fn file_text(&self, file: &FileId) -> Option<&str> {
        self.files.get(file).map(String::as_str)
    }

    fn parsed(&self, file: &FileId) -> Option<&ParseResult> {
        self.parsed.get(file)
    }

    fn importable_module_name(&self, file: &FileId) -> Option<String> {
        self.source_roots
            .iter()
            .filter_map(|root| module_name_for_path(root, Path::new(file.as_str())))
            .min_by(|a, b| {
                a.split('.')
                    .count()
                    .cmp(&b.split('.').count())
                    .then_with(|| a.cmp(b))
            })
    }
}

impl UsageIndex for Index {
    fn find_call_sites(&self, target: &MethodTarget) -> Vec<CallSite> {
        let mut sites = Vec::new();
        for (file, parsed) in &self.parsed {
            let module = &parsed.module;
            for expr in module.walk_exprs() {
                let Expr::Call { func, range, .. } = module.expr(expr) else {
                    continue;
                };
                let Expr::Attribute { value, attr, .. } = module.expr(*func) else {
                    continue;
                };
                if attr.name != target.method_name {
                    continue;
                }
                sites.push(CallSite {
                    file: file.clone(),
                    call: expr,
                    qualifier: Some(*value),
                    range: *range,
                });
            }
        }
        sites.sort_by(|a, b| {
            a.file
                .cmp(&b.file)
                .then_with(|| a.range.start.cmp(&b.range.start))
                .then_with(|| a.range.end.cmp(&b.range.end))
        });
        tracing::trace!(
            target: "hoist.index",
            method = %target.method_name,
            sites = sites.len(),
            "call sites"
        );
        sites
    }

    fn find_member_bindings(&self, target: &MethodTarget) -> Vec<MemberBinding> {
        let mut bindings = Vec::new();
        for (file, parsed) in &self.parsed {
            let method = (file == &target.file).then_some(target.method);
            bindings.extend(
                member_bindings(&parsed.module, &target.method_name, method)
                    .into_iter()
                    .map(|range| MemberBinding {
                        file: file.clone(),
                        range,
                    }),
            );
        }
        tracing::trace!(
            target: "hoist.index",
            method = %target.method_name,
            bindings = bindings.len(),
            "member bindings"
        );
        bindings
    }
}

/// Dotted module path of `path` relative to `root`.
///
/// `pkg/shapes.py` is `pkg.shapes`, `pkg/__init__.py` is `pkg`. Returns
/// `None` when the file is outside `root`, is not a `.py` file, or a
/// component is not a valid identifier.
#[must_use]
pub fn module_name_for_path(root: &Path, path: &Path) -> Option<String> {
    let path = normalize(path);
    let relative = path.strip_prefix(normalize(root)).ok()?;
    let stem = relative.file_stem()?.to_str()?;
    if relative.extension()? != "py" {
        return None;
    }

    let mut parts: Vec<&str> = Vec::new();
    if let Some(parent) = relative.parent() {
        for component in parent.components() {
            parts.push(component.as_os_str().to_str()?);
        }
    }
    if stem != "__init__" {
        parts.push(stem);
    }
    if parts.is_empty()
        || parts
            .iter()
            .any(|part| !is_identifier(part) || is_keyword(part))
    {
        return None;
    }
    Some(parts.join("."))
}

fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|component| !matches!(component, Component::CurDir))
        .collect()
}

fn is_python(file: &FileId) -> bool {
    file.as_str().ends_with(".py")
}

fn is_skipped_dir(entry: &walkdir::DirEntry) -> bool {
    if !entry.file_type().is_dir() {
        return false;
    }
    let name = entry.file_name().to_string_lossy();
    name.starts_with('.') || name == "__pycache__"
}

fn file_id_for(relative: &Path) -> FileId {
    let parts: Vec<String> = relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy().into_owned())
        .collect();
    FileId::new(parts.join("/"))
}
