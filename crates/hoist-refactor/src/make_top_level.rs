use std::collections::BTreeMap;

use hoist_syntax::ast::{ClassDef, Expr, FunctionDef, Module, ParamKind, Stmt, StmtId};
use hoist_syntax::visit;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::builder::{self, NewFunction};
use crate::call_sites::{self, CallSiteRewrite, RewriteContext};
use crate::db::{CallSite, MethodTarget, RefactorDatabase, UsageIndex};
use crate::edit::{apply_workspace_edit, EditError, FileId, TextEdit, TextRange, WorkspaceEdit};
use crate::imports::ImportManager;
use crate::lines;
use crate::params::{argument_style, synthesize, ArgumentStyle, ParameterPlan};
use crate::preview::{self, RefactoringPreview};
use crate::safety::{self, SafetyError};
use crate::scope;

/// Decorators that change how the method is bound.
const UNSUPPORTED_DECORATORS: &[&str] = &[
    "staticmethod",
    "classmethod",
    "property",
    "cached_property",
    "abstractmethod",
    "setter",
    "getter",
    "deleter",
];

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MakeTopLevelError {
    #[error(transparent)]
    Safety(#[from] SafetyError),
    #[error("no importable module path for `{file}`")]
    UnresolvableImportPath { file: FileId },
    #[error("file `{0}` not found")]
    FileNotFound(FileId),
    #[error("failed to parse `{file}`: {message}")]
    Parse { file: FileId, message: String },
    #[error("class `{class}` not found in `{file}`")]
    ClassNotFound { file: FileId, class: String },
    #[error("method `{method}` not found in class `{class}`")]
    MethodNotFound { class: String, method: String },
    #[error("constructors cannot be made top-level (`{method}`)")]
    Constructor { method: String },
    #[error("methods decorated with `{decorator}` are not supported")]
    UnsupportedDecorator { decorator: String },
    #[error("method `{method}` has no instance parameter")]
    MissingInstanceParameter { method: String },
    #[error("`{name}` is already bound in `{file}` (offset {offset})")]
    NameConflict {
        name: String,
        file: FileId,
        offset: usize,
    },
    #[error("unsupported call site in `{file}` at offset {offset}: {reason}")]
    UnsupportedCallSite {
        file: FileId,
        offset: usize,
        reason: String,
    },
    #[error(
        "`{method}` is also a member bound in `{file}` (offset {offset}); its calls cannot be told apart"
    )]
    AmbiguousMember {
        method: String,
        file: FileId,
        offset: usize,
    },
    #[error(transparent)]
    Edit(#[from] EditError),
}

impl MakeTopLevelError {
    /// Whether the refactoring was refused because the code cannot be
    /// converted safely, as opposed to bad input or a broken workspace.
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            MakeTopLevelError::Safety(_)
                | MakeTopLevelError::Constructor { .. }
                | MakeTopLevelError::UnsupportedDecorator { .. }
                | MakeTopLevelError::MissingInstanceParameter { .. }
                | MakeTopLevelError::NameConflict { .. }
                | MakeTopLevelError::UnsupportedCallSite { .. }
                | MakeTopLevelError::AmbiguousMember { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MakeTopLevelParams {
    pub file: FileId,
    pub class_name: String,
    pub method_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MakeTopLevelOptions {
    /// Base name for temporaries introduced at call sites.
    pub temp_name: String,
}

impl Default for MakeTopLevelOptions {
    fn default() -> Self {
        Self {
            temp_name: "tmp".to_string(),
        }
    }
}

/// The fully planned refactoring. Nothing has been applied yet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MakeTopLevelPlan {
    pub function_name: String,
    pub home_file: FileId,
    pub new_function: NewFunction,
    pub parameters: ParameterPlan,
    pub argument_style: ArgumentStyle,
    pub call_sites: Vec<CallSiteRewrite>,
    pub edit: WorkspaceEdit,
}

/// Plan turning `params.class_name.params.method_name` into a module-level
/// function and rewriting every call site found by `index`.
pub fn make_method_top_level(
    db: &dyn RefactorDatabase,
    index: &dyn UsageIndex,
    params: &MakeTopLevelParams,
    options: &MakeTopLevelOptions,
) -> Result<MakeTopLevelPlan, MakeTopLevelError> {
    tracing::debug!(
        target: "hoist.refactor",
        file = %params.file,
        class = %params.class_name,
        method = %params.method_name,
        "planning make-top-level"
    );
    match plan(db, index, params, options) {
        Ok(plan) => {
            tracing::info!(
                target: "hoist.refactor",
                function = %plan.function_name,
                parameters = plan.parameters.len(),
                call_sites = plan.call_sites.len(),
                edits = plan.edit.text_edits.len(),
                "make-top-level planned"
            );
            Ok(plan)
        }
        Err(err) => {
            tracing::debug!(target: "hoist.refactor", error = %err, "make-top-level rejected");
            Err(err)
        }
    }
}

/// Apply a finished plan to a snapshot of file contents.
pub fn commit(
    files: &BTreeMap<FileId, String>,
    plan: &MakeTopLevelPlan,
) -> Result<BTreeMap<FileId, String>, EditError> {
    apply_workspace_edit(files, &plan.edit)
}

/// Unified diffs of a finished plan.
pub fn generate_preview(
    db: &dyn RefactorDatabase,
    plan: &MakeTopLevelPlan,
) -> Result<RefactoringPreview, EditError> {
    preview::generate_preview(db, &plan.edit)
}

fn plan(
    db: &dyn RefactorDatabase,
    index: &dyn UsageIndex,
    params: &MakeTopLevelParams,
    options: &MakeTopLevelOptions,
) -> Result<MakeTopLevelPlan, MakeTopLevelError> {
    let home = &params.file;
    let (text, module) = load(db, home)?;

    let class_stmt = find_class(module, &params.class_name).ok_or_else(|| {
        MakeTopLevelError::ClassNotFound {
            file: home.clone(),
            class: params.class_name.clone(),
        }
    })?;
    let Some(class) = module.stmt(class_stmt).as_class() else {
        return Err(MakeTopLevelError::ClassNotFound {
            file: home.clone(),
            class: params.class_name.clone(),
        });
    };
    let (method, def) = find_method(module, class, &params.method_name).ok_or_else(|| {
        MakeTopLevelError::MethodNotFound {
            class: params.class_name.clone(),
            method: params.method_name.clone(),
        }
    })?;

    check_target(module, text, home, def)?;

    let analysis = scope::analyze(module, method);
    let reads = safety::validate(&analysis)?;
    let mut reserved = analysis.used_names.clone();
    reserved.insert(def.name.name.clone());
    let plan = synthesize(&reads, &reserved);
    let style = argument_style(&def.params);

    let target = MethodTarget {
        file: home.clone(),
        class_name: params.class_name.clone(),
        method_name: params.method_name.clone(),
        method,
        range: def.range,
    };
    let sites = index.find_call_sites(&target);
    tracing::debug!(target: "hoist.refactor", sites = sites.len(), "call sites found");
    if !sites.is_empty() {
        if let Some(binding) = index.find_member_bindings(&target).into_iter().next() {
            return Err(MakeTopLevelError::AmbiguousMember {
                method: params.method_name.clone(),
                file: binding.file,
                offset: binding.range.start,
            });
        }
    }

    let module_path = if sites.iter().any(|site| &site.file != home) {
        Some(
            db.importable_module_name(home)
                .ok_or_else(|| MakeTopLevelError::UnresolvableImportPath { file: home.clone() })?,
        )
    } else {
        None
    };

    let mut by_file: BTreeMap<&FileId, Vec<CallSite>> = BTreeMap::new();
    for site in &sites {
        by_file.entry(&site.file).or_default().push(site.clone());
    }

    let ctx = RewriteContext {
        class_name: &params.class_name,
        function_name: &def.name.name,
        plan: &plan,
        style,
        temp_name: &options.temp_name,
    };
    let home_reads: Vec<(TextRange, String)> = plan
        .iter()
        .flat_map(|entry| {
            entry
                .references
                .iter()
                .map(|&range| (range, entry.parameter.clone()))
        })
        .collect();

    let mut imports = ImportManager::default();
    let mut call_sites = Vec::new();
    let mut edits: Vec<TextEdit> = Vec::new();
    let mut method_edits: Vec<TextEdit> = Vec::new();

    for (file, file_sites) in by_file {
        let (file_text, file_module) = load(db, file)?;
        if file != home {
            if let Some(module_path) = &module_path {
                imports.ensure(file_module, file_text, file, module_path, &def.name.name)?;
            }
        }
        let reads: &[(TextRange, String)] = if file == home { home_reads.as_slice() } else { &[] };
        let rewrite =
            call_sites::rewrite_file(file_module, file_text, &file_sites, &ctx, reads)?;
        call_sites.extend(rewrite.rewrites);
        for edit in rewrite.edits {
            if file == home && def.range.contains(edit.range) {
                method_edits.push(edit);
            } else {
                edits.push(edit);
            }
        }
    }

    let new_function = builder::build(module, text, method, &plan, style, &method_edits)?;

    edits.push(method_removal(text, home, class, method, def));
    let top = module.top_level_stmt(class_stmt);
    edits.push(function_insertion(text, home, module.stmt(top).range().end, &new_function));
    edits.extend(imports.into_edits());

    let mut edit = WorkspaceEdit::new(edits);
    edit.normalize()?;

    Ok(MakeTopLevelPlan {
        function_name: def.name.name.clone(),
        home_file: home.clone(),
        new_function,
        parameters: plan,
        argument_style: style,
        call_sites,
        edit,
    })
}

fn load<'db>(
    db: &'db dyn RefactorDatabase,
    file: &FileId,
) -> Result<(&'db str, &'db Module), MakeTopLevelError> {
    let text = db
        .file_text(file)
        .ok_or_else(|| MakeTopLevelError::FileNotFound(file.clone()))?;
    let parsed = db
        .parsed(file)
        .ok_or_else(|| MakeTopLevelError::FileNotFound(file.clone()))?;
    if let Some(error) = parsed.errors.first() {
        return Err(MakeTopLevelError::Parse {
            file: file.clone(),
            message: error.to_string(),
        });
    }
    Ok((text, &parsed.module))
}

/// Depth-first search for a class, nested classes included.
fn find_class(module: &Module, name: &str) -> Option<StmtId> {
    let mut stack: Vec<StmtId> = module.body.iter().rev().copied().collect();
    while let Some(stmt) = stack.pop() {
        if let Stmt::ClassDef(class) = module.stmt(stmt) {
            if class.name.name == name {
                return Some(stmt);
            }
        }
        stack.extend(visit::stmt_children(module, stmt).into_iter().rev());
    }
    None
}

fn find_method<'m>(
    module: &'m Module,
    class: &ClassDef,
    name: &str,
) -> Option<(StmtId, &'m FunctionDef)> {
    class.body.iter().find_map(|&stmt| match module.stmt(stmt) {
        Stmt::FunctionDef(def) if def.name.name == name => Some((stmt, def)),
        _ => None,
    })
}

fn check_target(
    module: &Module,
    text: &str,
    home: &FileId,
    def: &FunctionDef,
) -> Result<(), MakeTopLevelError> {
    let name = &def.name.name;
    if name == "__init__" || name == "__new__" {
        return Err(MakeTopLevelError::Constructor {
            method: name.clone(),
        });
    }

    for &decorator in &def.decorators {
        let mut expr = decorator;
        if let Expr::Call { func, .. } = module.expr(expr) {
            expr = *func;
        }
        let last = match module.expr(expr) {
            Expr::Name { id, .. } => Some(id.as_str()),
            Expr::Attribute { attr, .. } => Some(attr.name.as_str()),
            _ => None,
        };
        if last.is_some_and(|last| UNSUPPORTED_DECORATORS.contains(&last)) {
            let range = module.expr(decorator).range();
            return Err(MakeTopLevelError::UnsupportedDecorator {
                decorator: format!("@{}", &text[range.start..range.end]),
            });
        }
    }

    let has_instance = def
        .params
        .params
        .first()
        .is_some_and(|param| param.kind == ParamKind::Regular && param.name.is_some());
    if !has_instance {
        return Err(MakeTopLevelError::MissingInstanceParameter {
            method: name.clone(),
        });
    }

    if scope::module_binds_name(module, name) {
        return Err(MakeTopLevelError::NameConflict {
            name: name.clone(),
            file: home.clone(),
            offset: 0,
        });
    }
    Ok(())
}

fn is_blank_line(text: &str, start: usize) -> bool {
    start < text.len() && text[start..lines::line_end(text, start)].trim().is_empty()
}

/// Delete the method's lines (and the blank lines separating it from its
/// neighbours); a class left empty gets `pass`.
fn method_removal(
    text: &str,
    home: &FileId,
    class: &ClassDef,
    method: StmtId,
    def: &FunctionDef,
) -> TextEdit {
    let mut start = lines::line_start(text, def.range.start);
    let mut end = lines::line_end(text, def.range.end);

    if class.body.len() == 1 {
        let indent = lines::indentation(text, def.range.start);
        let pass = format!("{indent}pass{}", lines::newline(text));
        return TextEdit::replace(home.clone(), TextRange::new(start, end), pass);
    }

    let is_last = class.body.last() == Some(&method);
    if is_last {
        while start > 0 {
            let prev = lines::line_start(text, start - 1);
            if !is_blank_line(text, prev) {
                break;
            }
            start = prev;
        }
    } else {
        while is_blank_line(text, end) {
            end = lines::line_end(text, end);
        }
    }
    TextEdit::delete(home.clone(), TextRange::new(start, end))
}

fn function_insertion(text: &str, home: &FileId, after: usize, function: &NewFunction) -> TextEdit {
    let nl = lines::newline(text);
    let offset = lines::line_end(text, after);
    let mut insert = String::new();
    if !text[..offset].ends_with('\n') {
        insert.push_str(nl);
    }
    insert.push_str(nl);
    insert.push_str(nl);
    insert.push_str(&function.text);
    insert.push_str(nl);
    TextEdit::insert(home.clone(), offset, insert)
}
