//! Rewriting `qualifier.method(...)` calls into calls of the new function.
//!
//! Sites of one file are processed innermost first. Edits of a site that lies
//! inside another site's qualifier (and accepted `self.attr` reads there) are
//! folded into the qualifier text, which is what gets reused in the outer
//! site's arguments or temporary.

use std::collections::BTreeSet;

use hoist_syntax::ast::{ArgKind, ComprehensionKind, Expr, ExprId, Module, NodeId, Stmt, StmtId};
use hoist_syntax::visit;
use serde::Serialize;

use crate::db::CallSite;
use crate::edit::{apply_text_edits, FileId, TextEdit, TextRange};
use crate::lines;
use crate::make_top_level::MakeTopLevelError;
use crate::params::{ArgumentStyle, ParameterPlan};
use crate::scope;

/// How the receiver of a call site is reused in the new arguments.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum QualifierShape {
    /// Dotted names only; repeated once per argument.
    PureChain,
    /// Any other receiver when at most one argument is added.
    SingleAttributeTarget,
    /// Any other receiver when several arguments are added; bound to a temporary.
    MultiAttributeTarget,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallSiteRewrite {
    pub file: FileId,
    /// Range of the original call expression.
    pub range: TextRange,
    /// `None` for calls without a receiver, which are left as they are.
    pub shape: Option<QualifierShape>,
    pub temporary: Option<String>,
    /// Argument texts appended to the call.
    pub arguments: Vec<String>,
}

/// Inputs shared by every call site of one refactoring.
#[derive(Clone, Copy, Debug)]
pub struct RewriteContext<'a> {
    pub class_name: &'a str,
    pub function_name: &'a str,
    pub plan: &'a ParameterPlan,
    pub style: ArgumentStyle,
    /// Base name for temporaries (`tmp`, `tmp1`, ...).
    pub temp_name: &'a str,
}

/// Rewrites and edits for all call sites of one file.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileRewrite {
    pub rewrites: Vec<CallSiteRewrite>,
    pub edits: Vec<TextEdit>,
}

#[must_use]
pub fn classify_qualifier(module: &Module, qualifier: ExprId, plan: &ParameterPlan) -> QualifierShape {
    if is_pure_chain(module, qualifier) {
        QualifierShape::PureChain
    } else if plan.len() <= 1 {
        QualifierShape::SingleAttributeTarget
    } else {
        QualifierShape::MultiAttributeTarget
    }
}

fn is_pure_chain(module: &Module, mut expr: ExprId) -> bool {
    loop {
        match module.expr(expr) {
            Expr::Name { .. } => return true,
            Expr::Attribute { value, .. } => expr = *value,
            _ => return false,
        }
    }
}

/// Plan the rewrite of every site in `sites`, all in the file `module` parses.
///
/// `reads` are accepted `self.attr` reads located in this file, with the
/// parameter replacing each; they only matter when a call site sits inside
/// the method being converted.
pub fn rewrite_file(
    module: &Module,
    text: &str,
    sites: &[CallSite],
    ctx: &RewriteContext<'_>,
    reads: &[(TextRange, String)],
) -> Result<FileRewrite, MakeTopLevelError> {
    let mut order: Vec<&CallSite> = sites.iter().collect();
    order.sort_by(|a, b| {
        a.range
            .end
            .cmp(&b.range.end)
            .then_with(|| b.range.start.cmp(&a.range.start))
    });

    let mut avoid: BTreeSet<String> = hoist_syntax::lex(text)
        .0
        .iter()
        .filter(|token| token.kind == hoist_syntax::TokenKind::Name)
        .map(|token| token.text(text).to_string())
        .collect();
    avoid.extend(ctx.plan.parameters().map(str::to_string));
    avoid.insert(ctx.function_name.to_string());

    let mut pending: Vec<TextEdit> = Vec::new();
    // (anchor offset, qualifier end, edit)
    let mut temporaries: Vec<(usize, usize, TextEdit)> = Vec::new();
    let mut rewrites = Vec::new();

    for site in order {
        let rewrite = rewrite_site(
            module,
            text,
            site,
            ctx,
            reads,
            &mut pending,
            &mut temporaries,
            &mut avoid,
        )?;
        rewrites.push(rewrite);
    }

    rewrites.sort_by_key(|rewrite| rewrite.range.start);
    temporaries.sort_by_key(|(anchor, qualifier_end, _)| (*anchor, *qualifier_end));
    let mut edits: Vec<TextEdit> = temporaries.into_iter().map(|(_, _, edit)| edit).collect();
    edits.extend(pending);
    Ok(FileRewrite { rewrites, edits })
}

#[allow(clippy::too_many_arguments)]
fn rewrite_site(
    module: &Module,
    text: &str,
    site: &CallSite,
    ctx: &RewriteContext<'_>,
    reads: &[(TextRange, String)],
    pending: &mut Vec<TextEdit>,
    temporaries: &mut Vec<(usize, usize, TextEdit)>,
    avoid: &mut BTreeSet<String>,
) -> Result<CallSiteRewrite, MakeTopLevelError> {
    let file = &site.file;
    let unsupported = |reason: &str| MakeTopLevelError::UnsupportedCallSite {
        file: file.clone(),
        offset: site.range.start,
        reason: reason.to_string(),
    };

    let Some(qualifier) = site.qualifier else {
        return Ok(CallSiteRewrite {
            file: file.clone(),
            range: site.range,
            shape: None,
            temporary: None,
            arguments: Vec::new(),
        });
    };
    let Expr::Call { func, args, .. } = module.expr(site.call) else {
        return Err(unsupported("not a call expression"));
    };

    match module.expr(qualifier) {
        Expr::Name { id, .. } if id == ctx.class_name => {
            return Err(unsupported("method invoked through its class"));
        }
        Expr::Attribute { attr, .. } if attr.name == ctx.class_name => {
            return Err(unsupported("method invoked through its class"));
        }
        Expr::Call { func, .. }
            if module.expr(*func).as_name() == Some("super") =>
        {
            return Err(unsupported("method invoked through `super()`"));
        }
        _ => {}
    }

    let anchor = module.enclosing_stmt(site.call);
    if let Some(anchor) = anchor {
        if is_shadowed(module, site.call, anchor, ctx.function_name) {
            return Err(MakeTopLevelError::NameConflict {
                name: ctx.function_name.to_string(),
                file: file.clone(),
                offset: site.range.start,
            });
        }
    }

    // Fold inner rewrites into the qualifier text.
    let qualifier_range = module.expr(qualifier).range();
    let (absorbed, kept): (Vec<TextEdit>, Vec<TextEdit>) = std::mem::take(pending)
        .into_iter()
        .partition(|edit| qualifier_range.contains(edit.range));
    *pending = kept;
    let mut inner: Vec<TextEdit> = absorbed
        .into_iter()
        .map(|edit| shifted(edit, qualifier_range.start))
        .collect();
    for (range, parameter) in reads {
        if qualifier_range.contains(*range)
            && !inner
                .iter()
                .any(|edit| !edit.range.is_empty() && edit.range.contains(shift(*range, qualifier_range.start)))
        {
            inner.push(TextEdit::replace(
                file.clone(),
                shift(*range, qualifier_range.start),
                parameter.clone(),
            ));
        }
    }
    let mut local = crate::edit::WorkspaceEdit::new(inner);
    local.normalize()?;
    let qualifier_text = apply_text_edits(
        &text[qualifier_range.start..qualifier_range.end],
        &local.text_edits,
    )?;

    let shape = classify_qualifier(module, qualifier, ctx.plan);
    let mut temporary = None;
    let receiver = match shape {
        QualifierShape::PureChain | QualifierShape::SingleAttributeTarget => qualifier_text.clone(),
        QualifierShape::MultiAttributeTarget => {
            let anchor = temporary_anchor(module, text, site.call).map_err(unsupported)?;
            let anchor_start = module.stmt(anchor).range().start;
            let name = fresh_temporary(ctx.temp_name, avoid);
            avoid.insert(name.clone());
            let line = format!(
                "{}{} = {}{}",
                lines::indentation(text, anchor_start),
                name,
                qualifier_text,
                lines::newline(text),
            );
            temporaries.push((
                lines::line_start(text, anchor_start),
                qualifier_range.end,
                TextEdit::insert(file.clone(), lines::line_start(text, anchor_start), line),
            ));
            temporary = Some(name.clone());
            name
        }
    };

    let keywords = ctx.style == ArgumentStyle::Keyword
        || args
            .iter()
            .any(|arg| matches!(arg.kind, ArgKind::Keyword(_) | ArgKind::DoubleStar));
    let arguments: Vec<String> = ctx
        .plan
        .iter()
        .map(|entry| {
            if keywords {
                format!("{}={}.{}", entry.parameter, receiver, entry.attribute)
            } else {
                format!("{}.{}", receiver, entry.attribute)
            }
        })
        .collect();

    pending.push(TextEdit::replace(
        file.clone(),
        module.expr(*func).range(),
        ctx.function_name,
    ));
    if !arguments.is_empty() {
        match args.last() {
            Some(last) => {
                if args.len() == 1 && is_bare_generator(module, text, last.value) {
                    let value = module.expr(last.value).range();
                    pending.push(TextEdit::insert(file.clone(), value.start, "("));
                    pending.push(TextEdit::insert(file.clone(), value.end, ")"));
                }
                pending.push(TextEdit::insert(
                    file.clone(),
                    last.range.end,
                    format!(", {}", arguments.join(", ")),
                ));
            }
            None => {
                let close = site.range.end.saturating_sub(1);
                pending.push(TextEdit::insert(file.clone(), close, arguments.join(", ")));
            }
        }
    }

    tracing::trace!(
        target: "hoist.refactor",
        file = %file,
        offset = site.range.start,
        ?shape,
        "call site planned"
    );

    Ok(CallSiteRewrite {
        file: file.clone(),
        range: site.range,
        shape: Some(shape),
        temporary,
        arguments,
    })
}

fn shift(range: TextRange, by: usize) -> TextRange {
    TextRange::new(range.start - by, range.end - by)
}

fn shifted(mut edit: TextEdit, by: usize) -> TextEdit {
    edit.range = shift(edit.range, by);
    edit
}

fn fresh_temporary(base: &str, avoid: &BTreeSet<String>) -> String {
    if !avoid.contains(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}{n}"))
        .find(|candidate| !avoid.contains(candidate))
        .unwrap_or_else(|| base.to_string())
}

/// A generator expression passed as the sole argument without its own parens.
fn is_bare_generator(module: &Module, text: &str, value: ExprId) -> bool {
    match module.expr(value) {
        Expr::Comprehension {
            kind: ComprehensionKind::Generator,
            range,
            ..
        } => !text[range.start..].starts_with('('),
        _ => false,
    }
}

/// The statement a temporary for `call` can be inserted before.
fn temporary_anchor(module: &Module, text: &str, call: ExprId) -> Result<StmtId, &'static str> {
    let mut child = call;
    let mut parent = module.parent_of_expr(call);
    loop {
        match parent {
            Some(NodeId::Expr(expr)) => {
                match module.expr(expr) {
                    Expr::Lambda { .. } => return Err("call inside a lambda"),
                    Expr::Comprehension { generators, .. }
                        if generators.first().map(|g| g.iter) != Some(child) =>
                    {
                        return Err("call inside a comprehension");
                    }
                    Expr::BoolOp { values, .. } if values.first() != Some(&child) => {
                        return Err("call in a short-circuit operand");
                    }
                    Expr::IfExp { test, .. } if *test != child => {
                        return Err("call in a conditional expression branch");
                    }
                    _ => {}
                }
                child = expr;
                parent = module.parent_of_expr(expr);
            }
            Some(NodeId::Stmt(stmt)) => {
                match module.stmt(stmt) {
                    Stmt::While { test, .. } if *test == child => {
                        return Err("call in a `while` condition");
                    }
                    Stmt::If {
                        test,
                        is_elif: true,
                        ..
                    } if *test == child => {
                        return Err("call in an `elif` condition");
                    }
                    Stmt::Try { handlers, .. }
                        if handlers.iter().any(|h| h.type_ == Some(child)) =>
                    {
                        return Err("call in an `except` clause");
                    }
                    _ => {}
                }
                let owner = module.stmt_ancestors(stmt).skip(1).find(|&id| {
                    matches!(module.stmt(id), Stmt::FunctionDef(_) | Stmt::ClassDef(_))
                });
                if owner.is_some_and(|id| matches!(module.stmt(id), Stmt::ClassDef(_))) {
                    return Err("call in a class body");
                }
                if !lines::starts_line(text, module.stmt(stmt).range().start) {
                    return Err("statement does not start its own line");
                }
                return Ok(stmt);
            }
            None => return Err("call outside any statement"),
        }
    }
}

/// Whether `name` resolves to a local binding (not the new function) at `call`.
fn is_shadowed(module: &Module, call: ExprId, anchor: StmtId, name: &str) -> bool {
    let mut parent = module.parent_of_expr(call);
    while let Some(NodeId::Expr(expr)) = parent {
        match module.expr(expr) {
            Expr::Lambda { params, .. } if params.names().any(|ident| ident.name == name) => {
                return true;
            }
            Expr::Comprehension { generators, .. } => {
                let binds = generators.iter().any(|generator| {
                    visit::descendants(module, generator.target)
                        .into_iter()
                        .any(|id| module.expr(id).as_name() == Some(name))
                });
                if binds {
                    return true;
                }
            }
            _ => {}
        }
        parent = module.parent_of_expr(expr);
    }

    let mut in_function = false;
    for stmt in module.stmt_ancestors(anchor).skip(1) {
        match module.stmt(stmt) {
            Stmt::FunctionDef(_) => {
                if scope::binds_name(module, stmt, name) {
                    return true;
                }
                in_function = true;
            }
            Stmt::ClassDef(_) if !in_function => {
                if scope::binds_name(module, stmt, name) {
                    return true;
                }
            }
            _ => {}
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::edit::WorkspaceEdit;
    use crate::safety::AttributeRead;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn plan(attrs: &[&str]) -> ParameterPlan {
        let reads: Vec<AttributeRead> = attrs
            .iter()
            .enumerate()
            .map(|(i, attr)| AttributeRead {
                attribute: attr.to_string(),
                range: TextRange::new(i * 10, i * 10 + 4),
            })
            .collect();
        crate::params::synthesize(&reads, &BTreeSet::new())
    }

    fn sites(module: &Module, file: &FileId, method: &str) -> Vec<CallSite> {
        module
            .walk_exprs()
            .filter_map(|call| {
                let Expr::Call { func, range, .. } = module.expr(call) else {
                    return None;
                };
                let Expr::Attribute { value, attr, .. } = module.expr(*func) else {
                    return None;
                };
                (attr.name == method).then(|| CallSite {
                    file: file.clone(),
                    call,
                    qualifier: Some(*value),
                    range: *range,
                })
            })
            .collect()
    }

    fn run(text: &str, attrs: &[&str], style: ArgumentStyle) -> Result<String, MakeTopLevelError> {
        let parsed = parse(text);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let file = FileId::new("main.py");
        let plan = plan(attrs);
        let ctx = RewriteContext {
            class_name: "Shape",
            function_name: "area",
            plan: &plan,
            style,
            temp_name: "tmp",
        };
        let sites = sites(&parsed.module, &file, "area");
        let rewrite = rewrite_file(&parsed.module, text, &sites, &ctx, &[])?;
        let mut edit = WorkspaceEdit::new(rewrite.edits);
        edit.normalize().unwrap();
        Ok(apply_text_edits(text, &edit.text_edits).unwrap())
    }

    #[test]
    fn pure_chain_repeats_the_qualifier() {
        let out = run("print(a.b.c.area())\n", &["w", "h"], ArgumentStyle::Positional).unwrap();
        assert_eq!(out, "print(area(a.b.c.w, a.b.c.h))\n");
    }

    #[test]
    fn empty_plan_only_replaces_the_callee() {
        let out = run("x = make().area(1)\n", &[], ArgumentStyle::Positional).unwrap();
        assert_eq!(out, "x = area(1)\n");
    }

    #[test]
    fn single_attribute_target_inlines_the_qualifier_once() {
        let out = run("x = make().area()\n", &["w"], ArgumentStyle::Positional).unwrap();
        assert_eq!(out, "x = area(make().w)\n");
    }

    #[test]
    fn multi_attribute_target_introduces_a_temporary() {
        let text = "def f():\n    tmp = 0\n    return get_point().area() + tmp\n";
        let out = run(text, &["x", "y"], ArgumentStyle::Positional).unwrap();
        assert_eq!(
            out,
            "def f():\n    tmp = 0\n    tmp1 = get_point()\n    return area(tmp1.x, tmp1.y) + tmp\n"
        );
    }

    #[test]
    fn keyword_arguments_when_signature_or_call_needs_them() {
        let out = run("s.area(k=1)\n", &["w"], ArgumentStyle::Positional).unwrap();
        assert_eq!(out, "area(k=1, w=s.w)\n");
        let out = run("s.area(1)\n", &["w"], ArgumentStyle::Keyword).unwrap();
        assert_eq!(out, "area(1, w=s.w)\n");
    }

    #[test]
    fn bare_generator_argument_gets_parenthesized() {
        let out = run("s.area(v for v in xs)\n", &["w"], ArgumentStyle::Positional).unwrap();
        assert_eq!(out, "area((v for v in xs), s.w)\n");
    }

    #[test]
    fn nested_call_sites_compose() {
        let out = run(
            "r = wrap(get().area()).area()\n",
            &["x", "y"],
            ArgumentStyle::Positional,
        )
        .unwrap();
        assert_eq!(
            out,
            "tmp = get()\ntmp1 = wrap(area(tmp.x, tmp.y))\nr = area(tmp1.x, tmp1.y)\n"
        );
    }

    #[test]
    fn temporaries_follow_evaluation_order() {
        let out = run("r = f().area(g().area())\n", &["x", "y"], ArgumentStyle::Positional).unwrap();
        assert_eq!(
            out,
            "tmp1 = f()\ntmp = g()\nr = area(area(tmp.x, tmp.y), tmp1.x, tmp1.y)\n"
        );
    }

    #[test]
    fn unsafe_temporary_anchors_are_rejected() {
        let cases = [
            "f = lambda: get().area()\n",
            "v = [get().area() for p in ps]\n",
            "v = ok or get().area()\n",
            "v = 1 if ok else get().area()\n",
            "while get().area():\n    pass\n",
            "if a:\n    pass\nelif get().area():\n    pass\n",
            "x = 1; y = get().area()\n",
            "class Sizes(enum.Enum):\n    SMALL = get().area()\n",
            "class Box:\n    if big:\n        size = get().area()\n",
        ];
        for text in cases {
            let err = run(text, &["x", "y"], ArgumentStyle::Positional).unwrap_err();
            assert!(
                matches!(err, MakeTopLevelError::UnsupportedCallSite { .. }),
                "{text:?}: {err:?}"
            );
        }
    }

    #[test]
    fn calls_through_the_class_are_rejected() {
        let err = run("Shape.area(s)\n", &["w"], ArgumentStyle::Positional).unwrap_err();
        assert!(matches!(err, MakeTopLevelError::UnsupportedCallSite { .. }));
    }

    #[test]
    fn local_shadowing_is_a_conflict() {
        let text = "def f(area, s):\n    return s.area()\n";
        let err = run(text, &[], ArgumentStyle::Positional).unwrap_err();
        assert!(matches!(err, MakeTopLevelError::NameConflict { .. }));
    }

    #[test]
    fn classifies_qualifiers() {
        let parsed = parse("a.b\nf().x\n");
        let module = &parsed.module;
        let qualifier = |i: usize| match module.stmt(module.body[i]) {
            Stmt::Expr { value, .. } => *value,
            _ => unreachable!(),
        };
        assert_eq!(
            classify_qualifier(module, qualifier(0), &plan(&["w", "h"])),
            QualifierShape::PureChain
        );
        assert_eq!(
            classify_qualifier(module, qualifier(1), &plan(&["w"])),
            QualifierShape::SingleAttributeTarget
        );
        assert_eq!(
            classify_qualifier(module, qualifier(1), &plan(&["w", "h"])),
            QualifierShape::MultiAttributeTarget
        );
    }
}
