//! Child enumeration over the arena tree, in source order.

use crate::ast::{Expr, ExprId, Module, Parameters, Stmt, StmtId};

/// Expressions owned directly by `stmt` (not by statements nested in its bodies).
#[must_use]
pub fn stmt_exprs(module: &Module, id: StmtId) -> Vec<ExprId> {
    let mut out = Vec::new();
    match module.stmt(id) {
        Stmt::FunctionDef(def) => {
            out.extend(def.decorators.iter().copied());
            push_param_exprs(&def.params, &mut out);
            out.extend(def.returns);
        }
        Stmt::ClassDef(class) => {
            out.extend(class.decorators.iter().copied());
            out.extend(class.bases.iter().map(|arg| arg.value));
        }
        Stmt::Return { value, .. } => out.extend(*value),
        Stmt::Delete { targets, .. } => out.extend(targets.iter().copied()),
        Stmt::Assign { targets, value, .. } => {
            out.extend(targets.iter().copied());
            out.push(*value);
        }
        Stmt::AugAssign { target, value, .. } => {
            out.push(*target);
            out.push(*value);
        }
        Stmt::AnnAssign {
            target,
            annotation,
            value,
            ..
        } => {
            out.push(*target);
            out.push(*annotation);
            out.extend(*value);
        }
        Stmt::For { target, iter, .. } => {
            out.push(*target);
            out.push(*iter);
        }
        Stmt::While { test, .. } | Stmt::If { test, .. } => out.push(*test),
        Stmt::With { items, .. } => {
            for item in items {
                out.push(item.context);
                out.extend(item.target);
            }
        }
        Stmt::Try { handlers, .. } => {
            out.extend(handlers.iter().filter_map(|h| h.type_));
        }
        Stmt::Raise { exc, cause, .. } => {
            out.extend(*exc);
            out.extend(*cause);
        }
        Stmt::Assert { test, msg, .. } => {
            out.push(*test);
            out.extend(*msg);
        }
        Stmt::Expr { value, .. } => out.push(*value),
        Stmt::Import { .. }
        | Stmt::ImportFrom { .. }
        | Stmt::Global { .. }
        | Stmt::Nonlocal { .. }
        | Stmt::Pass { .. }
        | Stmt::Break { .. }
        | Stmt::Continue { .. }
        | Stmt::Error { .. } => {}
    }
    out
}

/// Statements nested in the bodies of `stmt`, in source order.
#[must_use]
pub fn stmt_children(module: &Module, id: StmtId) -> Vec<StmtId> {
    match module.stmt(id) {
        Stmt::FunctionDef(def) => def.body.clone(),
        Stmt::ClassDef(class) => class.body.clone(),
        Stmt::For { body, orelse, .. }
        | Stmt::While { body, orelse, .. }
        | Stmt::If { body, orelse, .. } => body.iter().chain(orelse).copied().collect(),
        Stmt::With { body, .. } => body.clone(),
        Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
            ..
        } => {
            let mut out = body.clone();
            for handler in handlers {
                out.extend(handler.body.iter().copied());
            }
            out.extend(orelse.iter().copied());
            out.extend(finalbody.iter().copied());
            out
        }
        _ => Vec::new(),
    }
}

/// Direct sub-expressions of `expr`, in source order.
#[must_use]
pub fn expr_children(module: &Module, id: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    match module.expr(id) {
        Expr::Name { .. } | Expr::Constant { .. } | Expr::Missing { .. } => {}
        Expr::FString { values, .. } => out.extend(values.iter().copied()),
        Expr::Attribute { value, .. }
        | Expr::Starred { value, .. }
        | Expr::Await { value, .. }
        | Expr::YieldFrom { value, .. } => out.push(*value),
        Expr::Subscript { value, slice, .. } => {
            out.push(*value);
            out.push(*slice);
        }
        Expr::Call { func, args, .. } => {
            out.push(*func);
            out.extend(args.iter().map(|arg| arg.value));
        }
        Expr::BinOp { left, right, .. } => {
            out.push(*left);
            out.push(*right);
        }
        Expr::UnaryOp { operand, .. } => out.push(*operand),
        Expr::BoolOp { values, .. } => out.extend(values.iter().copied()),
        Expr::Compare {
            left, comparators, ..
        } => {
            out.push(*left);
            out.extend(comparators.iter().copied());
        }
        Expr::Lambda { params, body, .. } => {
            push_param_exprs(params, &mut out);
            out.push(*body);
        }
        Expr::IfExp {
            test, body, orelse, ..
        } => {
            out.push(*body);
            out.push(*test);
            out.push(*orelse);
        }
        Expr::NamedExpr { target, value, .. } => {
            out.push(*target);
            out.push(*value);
        }
        Expr::Tuple { elts, .. } | Expr::List { elts, .. } | Expr::Set { elts, .. } => {
            out.extend(elts.iter().copied());
        }
        Expr::Dict { items, .. } => {
            for item in items {
                out.extend(item.key);
                out.push(item.value);
            }
        }
        Expr::Comprehension {
            element,
            value,
            generators,
            ..
        } => {
            out.push(*element);
            out.extend(*value);
            for generator in generators {
                out.push(generator.target);
                out.push(generator.iter);
                out.extend(generator.ifs.iter().copied());
            }
        }
        Expr::Yield { value, .. } => out.extend(*value),
        Expr::Slice {
            lower, upper, step, ..
        } => {
            out.extend(*lower);
            out.extend(*upper);
            out.extend(*step);
        }
    }
    out
}

fn push_param_exprs(params: &Parameters, out: &mut Vec<ExprId>) {
    for param in &params.params {
        out.extend(param.annotation);
        out.extend(param.default);
    }
}

/// Every expression in the subtree rooted at `id` (including `id`), pre-order.
#[must_use]
pub fn descendants(module: &Module, id: ExprId) -> Vec<ExprId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    while let Some(expr) = stack.pop() {
        out.push(expr);
        let children = expr_children(module, expr);
        stack.extend(children.into_iter().rev());
    }
    out
}
