//! Binding scopes of a method body and the references that cross them.
//!
//! The walker follows Python's rules: class bodies are invisible to the
//! scopes nested in them, the first iterable of a comprehension is evaluated
//! in the enclosing scope, walrus targets bind in the nearest
//! non-comprehension scope, and `global`/`nonlocal` declarations redirect
//! resolution. Decorators, defaults and annotations of the method itself are
//! evaluated in the class body but reported on the method.

use std::collections::BTreeSet;

use hoist_syntax::ast::{Expr, ExprContext, ExprId, FunctionDef, Module, NodeId, Stmt, StmtId};
use hoist_syntax::visit;
use serde::Serialize;

use crate::edit::TextRange;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ScopeKind {
    Method,
    Function,
    Lambda,
    Comprehension,
    Class,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScopeOwner {
    pub kind: ScopeKind,
    pub name: String,
    pub range: TextRange,
}

/// Syntactic role of a read of the instance binding.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ReferenceShape {
    /// `self.attr` in load position.
    AttributeAccess,
    /// `self.attr(...)`.
    MethodCall,
    /// `self.attr = ...`, `self.attr += ...`, `del self.attr`.
    AssignmentTarget,
    /// `self` used on its own.
    BareReference,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NameReference {
    pub name: String,
    pub range: TextRange,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct InstanceRead {
    /// Range of the instance name.
    pub range: TextRange,
    pub shape: ReferenceShape,
    /// The attribute reached through the instance; `None` for bare references.
    pub attribute: Option<NameReference>,
    /// Range of the whole `self.attr` expression (`range` for bare references).
    pub access_range: TextRange,
}

impl InstanceRead {
    fn bare(range: TextRange) -> Self {
        Self {
            range,
            shape: ReferenceShape::BareReference,
            attribute: None,
            access_range: range,
        }
    }
}

/// References of one scope owner, split into disjoint categories.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct UsageReport {
    pub nonlocal_writes: Vec<NameReference>,
    pub instance_reads_from_nested_scope: Vec<NameReference>,
    pub outer_scope_reads: Vec<NameReference>,
    pub instance_writes: Vec<NameReference>,
    pub instance_reads: Vec<InstanceRead>,
}

impl UsageReport {
    fn sort(&mut self) {
        self.nonlocal_writes.sort_by_key(|r| r.range.start);
        self.instance_reads_from_nested_scope
            .sort_by_key(|r| r.range.start);
        self.outer_scope_reads.sort_by_key(|r| r.range.start);
        self.instance_writes.sort_by_key(|r| r.range.start);
        self.instance_reads.sort_by_key(|r| r.range.start);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ScopeAnalysis {
    /// Name of the instance parameter (`self`); empty when the method has none.
    pub instance_name: String,
    /// The method first, then nested scope owners.
    pub scopes: Vec<(ScopeOwner, UsageReport)>,
    /// Every name bound or referenced anywhere in the method.
    pub used_names: BTreeSet<String>,
}

impl ScopeAnalysis {
    pub fn reports(&self) -> impl Iterator<Item = &UsageReport> {
        self.scopes.iter().map(|(_, report)| report)
    }

    #[must_use]
    pub fn method_report(&self) -> Option<&UsageReport> {
        self.scopes.first().map(|(_, report)| report)
    }
}

/// Analyze the method `method` of `module`.
#[must_use]
pub fn analyze(module: &Module, method: StmtId) -> ScopeAnalysis {
    let Some(def) = module.stmt(method).as_function() else {
        return ScopeAnalysis {
            instance_name: String::new(),
            scopes: Vec::new(),
            used_names: BTreeSet::new(),
        };
    };
    let instance_name = def
        .params
        .params
        .first()
        .and_then(|param| param.name.as_ref())
        .map(|ident| ident.name.clone())
        .unwrap_or_default();

    let mut walker = Walker {
        module,
        scopes: Vec::new(),
        owners: Vec::new(),
        refs: Vec::new(),
    };

    // Enclosing function and class scopes, outermost first.
    let ancestors: Vec<StmtId> = module.stmt_ancestors(method).skip(1).collect();
    let mut parent = None;
    for stmt in ancestors.into_iter().rev() {
        if let Some(scope) = walker.enclosing_scope(stmt, parent) {
            parent = Some(scope);
        }
    }

    let method_scope = walker.scopes.len();
    let header_scope = parent;
    walker.walk_function(def, ScopeKind::Method, header_scope, None);

    walker.finish(method_scope, &instance_name)
}

#[derive(Clone, Copy)]
struct Frame {
    scope: usize,
    report: usize,
}

enum Resolution {
    Local(usize),
    Global,
}

struct Scope {
    kind: ScopeKind,
    parent: Option<usize>,
    report: Option<usize>,
    bindings: BTreeSet<String>,
    globals: BTreeSet<String>,
    nonlocals: BTreeSet<String>,
}

struct RawRef {
    name: String,
    range: TextRange,
    ctx: ExprContext,
    /// Scope the reference is evaluated in.
    scope: usize,
    report: usize,
    expr: Option<ExprId>,
}

struct Walker<'a> {
    module: &'a Module,
    scopes: Vec<Scope>,
    /// Scope owner and scope index per report.
    owners: Vec<(ScopeOwner, usize)>,
    refs: Vec<RawRef>,
}

impl<'a> Walker<'a> {
    fn push_scope(&mut self, kind: ScopeKind, parent: Option<usize>) -> usize {
        self.scopes.push(Scope {
            kind,
            parent,
            report: None,
            bindings: BTreeSet::new(),
            globals: BTreeSet::new(),
            nonlocals: BTreeSet::new(),
        });
        self.scopes.len() - 1
    }

    fn push_owned_scope(&mut self, owner: ScopeOwner, parent: Option<usize>) -> Frame {
        let scope = self.push_scope(owner.kind, parent);
        let report = self.owners.len();
        self.owners.push((owner, scope));
        self.scopes[scope].report = Some(report);
        Frame { scope, report }
    }

    fn bind(&mut self, scope: usize, name: &str) {
        self.scopes[scope].bindings.insert(name.to_string());
    }

    // ---- enclosing scopes: bindings only ----

    fn enclosing_scope(&mut self, stmt: StmtId, parent: Option<usize>) -> Option<usize> {
        let module = self.module;
        match module.stmt(stmt) {
            Stmt::FunctionDef(def) => {
                let scope = self.push_scope(ScopeKind::Function, parent);
                for ident in def.params.names() {
                    self.bind(scope, &ident.name);
                }
                for &child in &def.body {
                    self.collect_bindings(scope, child);
                }
                Some(scope)
            }
            Stmt::ClassDef(class) => {
                let scope = self.push_scope(ScopeKind::Class, parent);
                for &child in &class.body {
                    self.collect_bindings(scope, child);
                }
                Some(scope)
            }
            _ => None,
        }
    }

    fn collect_bindings(&mut self, scope: usize, stmt: StmtId) {
        let module = self.module;
        match module.stmt(stmt) {
            Stmt::FunctionDef(def) => {
                self.bind(scope, &def.name.name);
                return;
            }
            Stmt::ClassDef(class) => {
                self.bind(scope, &class.name.name);
                return;
            }
            Stmt::Import { names, .. } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    self.bind(scope, alias.bound_name());
                }
            }
            Stmt::Global { names, .. } => {
                for ident in names {
                    self.scopes[scope].globals.insert(ident.name.clone());
                }
            }
            Stmt::Nonlocal { names, .. } => {
                for ident in names {
                    self.scopes[scope].nonlocals.insert(ident.name.clone());
                }
            }
            Stmt::Try { handlers, .. } => {
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        self.bind(scope, &name.name);
                    }
                }
            }
            _ => {}
        }
        for expr in visit::stmt_exprs(module, stmt) {
            self.collect_expr_bindings(scope, expr);
        }
        for child in visit::stmt_children(module, stmt) {
            self.collect_bindings(scope, child);
        }
    }

    fn collect_expr_bindings(&mut self, scope: usize, expr: ExprId) {
        let module = self.module;
        // (expr, inside a comprehension)
        let mut stack = vec![(expr, false)];
        while let Some((id, nested)) = stack.pop() {
            match module.expr(id) {
                Expr::Name { id: name, ctx, .. } => {
                    if !nested && *ctx != ExprContext::Load {
                        self.bind(scope, name);
                    }
                    continue;
                }
                Expr::NamedExpr { target, value, .. } => {
                    if let Some(name) = module.expr(*target).as_name() {
                        self.bind(scope, name);
                    }
                    stack.push((*value, nested));
                    continue;
                }
                Expr::Lambda { .. } => continue,
                Expr::Comprehension { .. } => {
                    stack.extend(
                        visit::expr_children(module, id)
                            .into_iter()
                            .map(|child| (child, true)),
                    );
                    continue;
                }
                _ => {}
            }
            stack.extend(
                visit::expr_children(module, id)
                    .into_iter()
                    .map(|child| (child, nested)),
            );
        }
    }

    // ---- the method subtree: bindings and references ----

    /// Walk a function definition. The header (decorators, defaults,
    /// annotations, return annotation) is evaluated in `header_scope` and
    /// reported on `header_report`, or on the function itself when `None`.
    fn walk_function(
        &mut self,
        def: &'a FunctionDef,
        kind: ScopeKind,
        header_scope: Option<usize>,
        header_report: Option<usize>,
    ) {
        let frame = self.push_owned_scope(
            ScopeOwner {
                kind,
                name: def.name.name.clone(),
                range: def.range,
            },
            header_scope,
        );

        if let Some(scope) = header_scope {
            let header = Frame {
                scope,
                report: header_report.unwrap_or(frame.report),
            };
            for &decorator in &def.decorators {
                self.visit_expr(header, decorator);
            }
            for param in &def.params.params {
                if let Some(annotation) = param.annotation {
                    self.visit_expr(header, annotation);
                }
                if let Some(default) = param.default {
                    self.visit_expr(header, default);
                }
            }
            if let Some(returns) = def.returns {
                self.visit_expr(header, returns);
            }
        }

        for ident in def.params.names() {
            self.bind(frame.scope, &ident.name);
        }
        for &stmt in &def.body {
            self.visit_stmt(frame, stmt);
        }
    }

    fn store(&mut self, frame: Frame, name: &str, range: TextRange) {
        self.bind(frame.scope, name);
        self.refs.push(RawRef {
            name: name.to_string(),
            range,
            ctx: ExprContext::Store,
            scope: frame.scope,
            report: frame.report,
            expr: None,
        });
    }

    fn visit_stmt(&mut self, frame: Frame, stmt: StmtId) {
        let module = self.module;
        match module.stmt(stmt) {
            Stmt::FunctionDef(def) => {
                self.store(frame, &def.name.name, def.name.range);
                self.walk_function(def, ScopeKind::Function, Some(frame.scope), Some(frame.report));
                return;
            }
            Stmt::ClassDef(class) => {
                for &decorator in &class.decorators {
                    self.visit_expr(frame, decorator);
                }
                for base in &class.bases {
                    self.visit_expr(frame, base.value);
                }
                self.store(frame, &class.name.name, class.name.range);
                let inner = self.push_owned_scope(
                    ScopeOwner {
                        kind: ScopeKind::Class,
                        name: class.name.name.clone(),
                        range: class.range,
                    },
                    Some(frame.scope),
                );
                for &child in &class.body {
                    self.visit_stmt(inner, child);
                }
                return;
            }
            Stmt::Import { names, .. } | Stmt::ImportFrom { names, .. } => {
                for alias in names {
                    let range = alias.asname.as_ref().map_or(alias.range, |ident| ident.range);
                    self.store(frame, alias.bound_name(), range);
                }
            }
            Stmt::Global { names, .. } => {
                for ident in names {
                    self.scopes[frame.scope].globals.insert(ident.name.clone());
                }
            }
            Stmt::Nonlocal { names, .. } => {
                for ident in names {
                    self.scopes[frame.scope].nonlocals.insert(ident.name.clone());
                }
            }
            Stmt::Try { handlers, .. } => {
                for handler in handlers {
                    if let Some(name) = &handler.name {
                        self.store(frame, &name.name, name.range);
                    }
                }
            }
            _ => {}
        }
        for expr in visit::stmt_exprs(module, stmt) {
            self.visit_expr(frame, expr);
        }
        for child in visit::stmt_children(module, stmt) {
            self.visit_stmt(frame, child);
        }
    }

    fn visit_expr(&mut self, frame: Frame, id: ExprId) {
        let module = self.module;
        match module.expr(id) {
            Expr::Name { id: name, ctx, range } => {
                if *ctx != ExprContext::Load {
                    self.bind(frame.scope, name);
                }
                self.refs.push(RawRef {
                    name: name.clone(),
                    range: *range,
                    ctx: *ctx,
                    scope: frame.scope,
                    report: frame.report,
                    expr: Some(id),
                });
            }
            Expr::NamedExpr { target, value, .. } => {
                self.visit_expr(frame, *value);
                match module.expr(*target) {
                    Expr::Name { id: name, range, .. } => {
                        let target_frame = self.walrus_frame(frame);
                        self.bind(target_frame.scope, name);
                        self.refs.push(RawRef {
                            name: name.clone(),
                            range: *range,
                            ctx: ExprContext::Store,
                            scope: target_frame.scope,
                            report: target_frame.report,
                            expr: Some(*target),
                        });
                    }
                    _ => self.visit_expr(frame, *target),
                }
            }
            Expr::Lambda {
                params,
                body,
                range,
            } => {
                for param in &params.params {
                    if let Some(default) = param.default {
                        self.visit_expr(frame, default);
                    }
                }
                let inner = self.push_owned_scope(
                    ScopeOwner {
                        kind: ScopeKind::Lambda,
                        name: "<lambda>".to_string(),
                        range: *range,
                    },
                    Some(frame.scope),
                );
                for ident in params.names() {
                    self.bind(inner.scope, &ident.name);
                }
                self.visit_expr(inner, *body);
            }
            Expr::Comprehension {
                kind,
                element,
                value,
                generators,
                range,
            } => {
                if let Some(first) = generators.first() {
                    self.visit_expr(frame, first.iter);
                }
                let name = match kind {
                    hoist_syntax::ast::ComprehensionKind::List => "<listcomp>",
                    hoist_syntax::ast::ComprehensionKind::Set => "<setcomp>",
                    hoist_syntax::ast::ComprehensionKind::Dict => "<dictcomp>",
                    hoist_syntax::ast::ComprehensionKind::Generator => "<genexpr>",
                };
                let inner = self.push_owned_scope(
                    ScopeOwner {
                        kind: ScopeKind::Comprehension,
                        name: name.to_string(),
                        range: *range,
                    },
                    Some(frame.scope),
                );
                for (i, generator) in generators.iter().enumerate() {
                    self.visit_expr(inner, generator.target);
                    if i > 0 {
                        self.visit_expr(inner, generator.iter);
                    }
                    for &cond in &generator.ifs {
                        self.visit_expr(inner, cond);
                    }
                }
                self.visit_expr(inner, *element);
                if let Some(value) = value {
                    self.visit_expr(inner, *value);
                }
            }
            _ => {
                for child in visit::expr_children(module, id) {
                    self.visit_expr(frame, child);
                }
            }
        }
    }

    fn walrus_frame(&self, frame: Frame) -> Frame {
        let mut scope = frame.scope;
        while self.scopes[scope].kind == ScopeKind::Comprehension {
            match self.scopes[scope].parent {
                Some(parent) => scope = parent,
                None => break,
            }
        }
        Frame {
            scope,
            report: self.scopes[scope].report.unwrap_or(frame.report),
        }
    }

    // ---- resolution and classification ----

    fn resolve(&self, name: &str, scope: usize) -> Resolution {
        let current = &self.scopes[scope];
        if current.globals.contains(name) {
            return Resolution::Global;
        }
        if !current.nonlocals.contains(name) && current.bindings.contains(name) {
            return Resolution::Local(scope);
        }
        self.resolve_enclosing(name, current.parent)
    }

    fn resolve_enclosing(&self, name: &str, mut next: Option<usize>) -> Resolution {
        while let Some(idx) = next {
            let scope = &self.scopes[idx];
            next = scope.parent;
            if scope.kind == ScopeKind::Class {
                continue;
            }
            if scope.globals.contains(name) {
                return Resolution::Global;
            }
            if scope.nonlocals.contains(name) {
                continue;
            }
            if scope.bindings.contains(name) {
                return Resolution::Local(idx);
            }
        }
        Resolution::Global
    }

    fn finish(self, method_scope: usize, instance_name: &str) -> ScopeAnalysis {
        let mut reports = vec![UsageReport::default(); self.owners.len()];
        let mut used_names = BTreeSet::new();
        for scope in &self.scopes[method_scope..] {
            used_names.extend(scope.bindings.iter().cloned());
        }

        for raw in &self.refs {
            used_names.insert(raw.name.clone());
            let report_scope = self.owners[raw.report].1;
            let reference = NameReference {
                name: raw.name.clone(),
                range: raw.range,
            };
            let report = &mut reports[raw.report];
            let resolution = self.resolve(&raw.name, raw.scope);

            match (raw.ctx, resolution) {
                (ExprContext::Load, Resolution::Local(scope))
                    if scope == method_scope && raw.name == instance_name =>
                {
                    if raw.scope == method_scope {
                        let read = match raw.expr {
                            Some(expr) => instance_read(self.module, expr, raw.range),
                            None => InstanceRead::bare(raw.range),
                        };
                        report.instance_reads.push(read);
                    } else {
                        report.instance_reads_from_nested_scope.push(reference);
                    }
                }
                (ExprContext::Load, Resolution::Local(scope)) if scope != report_scope => {
                    report.outer_scope_reads.push(reference);
                }
                (ExprContext::Load, Resolution::Global) => {
                    // Zero-argument `super()` reads the instance implicitly.
                    if raw.name == "super" && raw.expr.is_some_and(|e| is_zero_arg_call(self.module, e)) {
                        if raw.scope == method_scope {
                            report.instance_reads.push(InstanceRead::bare(raw.range));
                        } else {
                            report.instance_reads_from_nested_scope.push(reference);
                        }
                    }
                }
                (ExprContext::Load, Resolution::Local(_)) => {}
                (_, Resolution::Local(scope)) if scope != raw.scope => {
                    report.nonlocal_writes.push(reference);
                }
                (_, Resolution::Local(scope))
                    if scope == method_scope && raw.name == instance_name =>
                {
                    report.instance_writes.push(reference);
                }
                (_, _) => {}
            }
        }

        let scopes = self
            .owners
            .into_iter()
            .zip(reports)
            .map(|((owner, _), mut report)| {
                report.sort();
                (owner, report)
            })
            .collect();

        ScopeAnalysis {
            instance_name: instance_name.to_string(),
            scopes,
            used_names,
        }
    }
}

/// Whether `name` is bound by the parameters or body of the function or
/// class `stmt` (nested scopes excluded).
pub(crate) fn binds_name(module: &Module, stmt: StmtId, name: &str) -> bool {
    let mut walker = Walker {
        module,
        scopes: Vec::new(),
        owners: Vec::new(),
        refs: Vec::new(),
    };
    match walker.enclosing_scope(stmt, None) {
        Some(idx) => {
            let scope = &walker.scopes[idx];
            scope.bindings.contains(name)
                && !scope.globals.contains(name)
                && !scope.nonlocals.contains(name)
        }
        None => false,
    }
}

/// Places in `module` that give some object a member called `name`: class
/// bodies binding it, and attribute assignments `<expr>.name = ...`.
///
/// The class that declares `method` directly is skipped; its attribute
/// assignments are not.
#[must_use]
pub fn member_bindings(module: &Module, name: &str, method: Option<StmtId>) -> Vec<TextRange> {
    let mut found = Vec::new();
    for id in module.walk_stmts() {
        let Stmt::ClassDef(class) = module.stmt(id) else {
            continue;
        };
        if method.is_some_and(|method| class.body.contains(&method)) {
            continue;
        }
        if binds_name(module, id, name) {
            found.push(class.name.range);
        }
    }
    for id in module.walk_exprs() {
        if let Expr::Attribute {
            attr,
            ctx: ExprContext::Store,
            ..
        } = module.expr(id)
        {
            if attr.name == name {
                found.push(attr.range);
            }
        }
    }
    found.sort_by_key(|range| (range.start, range.end));
    found
}

/// Whether `name` is bound at module level (class and function bodies excluded).
pub(crate) fn module_binds_name(module: &Module, name: &str) -> bool {
    let mut walker = Walker {
        module,
        scopes: Vec::new(),
        owners: Vec::new(),
        refs: Vec::new(),
    };
    let scope = walker.push_scope(ScopeKind::Function, None);
    for &stmt in &module.body {
        walker.collect_bindings(scope, stmt);
    }
    walker.scopes[scope].bindings.contains(name)
}

fn instance_read(module: &Module, id: ExprId, range: TextRange) -> InstanceRead {
    let Some(NodeId::Expr(parent)) = module.parent_of_expr(id) else {
        return InstanceRead::bare(range);
    };
    let Expr::Attribute {
        value,
        attr,
        ctx,
        range: access_range,
    } = module.expr(parent)
    else {
        return InstanceRead::bare(range);
    };
    if *value != id {
        return InstanceRead::bare(range);
    }

    let shape = if *ctx != ExprContext::Load {
        ReferenceShape::AssignmentTarget
    } else if is_callee(module, parent) {
        ReferenceShape::MethodCall
    } else {
        ReferenceShape::AttributeAccess
    };
    InstanceRead {
        range,
        shape,
        attribute: Some(NameReference {
            name: attr.name.clone(),
            range: attr.range,
        }),
        access_range: *access_range,
    }
}

pub(crate) fn is_callee(module: &Module, id: ExprId) -> bool {
    match module.parent_of_expr(id) {
        Some(NodeId::Expr(parent)) => {
            matches!(module.expr(parent), Expr::Call { func, .. } if *func == id)
        }
        _ => false,
    }
}

fn is_zero_arg_call(module: &Module, id: ExprId) -> bool {
    match module.parent_of_expr(id) {
        Some(NodeId::Expr(parent)) => matches!(
            module.expr(parent),
            Expr::Call { func, args, .. } if *func == id && args.is_empty()
        ),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn analyze_method(text: &str, name: &str) -> ScopeAnalysis {
        let parsed = parse(text);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let module = &parsed.module;
        let method = module
            .walk_stmts()
            .find(|&id| {
                module
                    .stmt(id)
                    .as_function()
                    .is_some_and(|def| def.name.name == name)
            })
            .unwrap();
        analyze(module, method)
    }

    fn names(refs: &[NameReference]) -> Vec<&str> {
        refs.iter().map(|r| r.name.as_str()).collect()
    }

    #[test]
    fn classifies_instance_read_shapes() {
        let text = "\
class A:
    def m(self):
        a = self.x
        self.y = 1
        self.run()
        print(self)
        del self.z
        return a
";
        let analysis = analyze_method(text, "m");
        assert_eq!(analysis.instance_name, "self");
        let report = analysis.method_report().unwrap();
        let shapes: Vec<_> = report
            .instance_reads
            .iter()
            .map(|read| {
                (
                    read.shape,
                    read.attribute.as_ref().map(|a| a.name.as_str()),
                )
            })
            .collect();
        assert_eq!(
            shapes,
            vec![
                (ReferenceShape::AttributeAccess, Some("x")),
                (ReferenceShape::AssignmentTarget, Some("y")),
                (ReferenceShape::MethodCall, Some("run")),
                (ReferenceShape::BareReference, None),
                (ReferenceShape::AssignmentTarget, Some("z")),
            ]
        );
        let first = &report.instance_reads[0];
        assert_eq!(&text[first.access_range.start..first.access_range.end], "self.x");
        assert!(report.outer_scope_reads.is_empty());
    }

    #[test]
    fn instance_reassignment_is_a_write() {
        let analysis = analyze_method(
            "class A:\n    def m(self, other):\n        self = other\n        return self.x\n",
            "m",
        );
        let report = analysis.method_report().unwrap();
        assert_eq!(names(&report.instance_writes), vec!["self"]);
        assert_eq!(report.instance_reads.len(), 1);
    }

    #[test]
    fn nested_scopes_get_their_own_reports() {
        let text = "\
class A:
    def m(self, k):
        f = lambda: self.x
        g = [i * k for i in range(3)]
        return f, g
";
        let analysis = analyze_method(text, "m");
        let kinds: Vec<_> = analysis.scopes.iter().map(|(owner, _)| owner.kind).collect();
        assert_eq!(
            kinds,
            vec![ScopeKind::Method, ScopeKind::Lambda, ScopeKind::Comprehension]
        );
        assert_eq!(
            names(&analysis.scopes[1].1.instance_reads_from_nested_scope),
            vec!["self"]
        );
        assert_eq!(names(&analysis.scopes[2].1.outer_scope_reads), vec!["k"]);
        assert!(analysis.scopes[0].1.instance_reads.is_empty());
    }

    #[test]
    fn first_comprehension_iterable_belongs_to_enclosing_scope() {
        let analysis = analyze_method(
            "class A:\n    def m(self):\n        return [v for v in self.items]\n",
            "m",
        );
        let method = &analysis.scopes[0].1;
        assert_eq!(method.instance_reads.len(), 1);
        assert_eq!(method.instance_reads[0].shape, ReferenceShape::AttributeAccess);
        assert_eq!(analysis.scopes[1].1, UsageReport::default());
    }

    #[test]
    fn nonlocal_assignments_are_writes() {
        let text = "\
class A:
    def m(self):
        total = 0
        def add(v):
            nonlocal total
            total += v
        add(1)
        return total
";
        let analysis = analyze_method(text, "m");
        let (owner, nested) = &analysis.scopes[1];
        assert_eq!(owner.name, "add");
        assert_eq!(names(&nested.nonlocal_writes), vec!["total"]);
        assert!(nested.outer_scope_reads.is_empty());
    }

    #[test]
    fn globals_and_builtins_are_not_reported() {
        let text = "\
import math

class A:
    def m(self, r):
        global CACHE
        CACHE = math.pi * r
        return len(str(CACHE))
";
        let analysis = analyze_method(text, "m");
        assert_eq!(analysis.scopes.len(), 1);
        assert_eq!(analysis.scopes[0].1, UsageReport::default());
        assert!(analysis.used_names.contains("math"));
        assert!(analysis.used_names.contains("r"));
    }

    #[test]
    fn class_body_names_are_invisible_to_methods() {
        let text = "\
class A:
    scale = 2
    def m(self):
        return scale
";
        let analysis = analyze_method(text, "m");
        assert!(analysis.scopes[0].1.outer_scope_reads.is_empty());
    }

    #[test]
    fn closures_over_enclosing_functions_are_outer_reads() {
        let text = "\
def make(factor):
    class A:
        def m(self):
            return self.x * factor
    return A
";
        let analysis = analyze_method(text, "m");
        assert_eq!(names(&analysis.scopes[0].1.outer_scope_reads), vec!["factor"]);
    }

    #[test]
    fn decorators_resolving_to_class_body_are_outer_reads() {
        let text = "\
class A:
    def deco(f):
        return f

    @deco
    def m(self):
        return 1
";
        let analysis = analyze_method(text, "m");
        assert_eq!(names(&analysis.scopes[0].1.outer_scope_reads), vec!["deco"]);
    }

    #[test]
    fn walrus_in_comprehension_binds_in_method() {
        let text = "\
class A:
    def m(self, items):
        if any((hit := v) > 3 for v in items):
            return hit
";
        let analysis = analyze_method(text, "m");
        for (_, report) in &analysis.scopes {
            assert!(report.nonlocal_writes.is_empty());
            assert!(report.outer_scope_reads.is_empty());
        }
        assert!(analysis.used_names.contains("hit"));
    }

    #[test]
    fn zero_argument_super_reads_the_instance() {
        let analysis = analyze_method(
            "class A(B):\n    def m(self):\n        return super().m()\n",
            "m",
        );
        let reads = &analysis.scopes[0].1.instance_reads;
        assert_eq!(reads.len(), 1);
        assert_eq!(reads[0].shape, ReferenceShape::BareReference);
    }

    #[test]
    fn member_bindings_cover_other_classes_and_attribute_stores() {
        let text = "\
class Shape:
    def area(self):
        return self.w

class Circle:
    def area(self):
        return 3

class Square:
    area = None

class Plain:
    def size(self):
        self.area = 1
";
        let parsed = parse(text);
        let module = &parsed.module;
        let shape_area = module
            .walk_stmts()
            .find(|&id| {
                module
                    .stmt(id)
                    .as_function()
                    .is_some_and(|def| def.name.name == "area")
            })
            .unwrap();
        let found: Vec<&str> = member_bindings(module, "area", Some(shape_area))
            .into_iter()
            .map(|range| &text[range.start..range.end])
            .collect();
        assert_eq!(found, vec!["Circle", "Square", "area"]);
        assert_eq!(member_bindings(module, "size", None).len(), 1);
        assert!(member_bindings(module, "w", None).is_empty());
    }
}
