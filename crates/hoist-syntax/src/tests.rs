use pretty_assertions::assert_eq;

use crate::ast::{ArgKind, ConstantKind, Expr, ExprContext, NodeId, ParamKind, Stmt};
use crate::visit::descendants;
use crate::{lex, parse, TokenKind};

fn dump_tokens(input: &str) -> Vec<(TokenKind, String)> {
    lex(input)
        .0
        .into_iter()
        .map(|t| (t.kind, t.text(input).to_string()))
        .collect()
}

fn names_in(input: &str) -> Vec<(String, ExprContext)> {
    let parsed = parse(input);
    let mut out: Vec<_> = parsed
        .module
        .exprs
        .iter()
        .filter_map(|(_, expr)| match expr {
            Expr::Name { id, ctx, range } => Some((range.start, id.clone(), *ctx)),
            _ => None,
        })
        .collect();
    out.sort_by_key(|(start, _, _)| *start);
    out.into_iter().map(|(_, id, ctx)| (id, ctx)).collect()
}

#[test]
fn lexes_indentation_blocks() {
    let input = "if x:\n    y\nz\n";
    let kinds: Vec<_> = dump_tokens(input).into_iter().map(|(k, _)| k).collect();
    assert_eq!(
        kinds,
        vec![
            TokenKind::Keyword(crate::Keyword::If),
            TokenKind::Name,
            TokenKind::Colon,
            TokenKind::Newline,
            TokenKind::Indent,
            TokenKind::Name,
            TokenKind::Newline,
            TokenKind::Dedent,
            TokenKind::Name,
            TokenKind::Newline,
            TokenKind::EndOfFile,
        ]
    );
}

#[test]
fn blank_and_comment_lines_do_not_affect_indentation() {
    let input = "def f():\n    a = 1\n\n  # comment\n    return a\n";
    let parsed = parse(input);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let def = parsed.module.stmt(parsed.module.body[0]).as_function().unwrap();
    assert_eq!(def.body.len(), 2);
}

#[test]
fn implicit_line_joins_inside_brackets() {
    let input = "x = foo(1,\n        2)\ny = 3\n";
    let parsed = parse(input);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    assert_eq!(parsed.module.body.len(), 2);
}

#[test]
fn lexes_longest_operators() {
    let tokens = dump_tokens("a **= b // c -> d := e");
    let ops: Vec<_> = tokens
        .into_iter()
        .filter(|(k, _)| !matches!(k, TokenKind::Name | TokenKind::Newline | TokenKind::EndOfFile))
        .map(|(_, text)| text)
        .collect();
    assert_eq!(ops, vec!["**=", "//", "->", ":="]);
}

#[test]
fn string_prefixes_and_fstrings() {
    let tokens = dump_tokens("rb'x' f\"{y}\" u'''z'''");
    assert_eq!(
        tokens[..3].to_vec(),
        vec![
            (TokenKind::String, "rb'x'".to_string()),
            (TokenKind::FString, "f\"{y}\"".to_string()),
            (TokenKind::String, "u'''z'''".to_string()),
        ]
    );
}

#[test]
fn unterminated_string_is_reported() {
    let parsed = parse("x = 'abc\n");
    assert_eq!(parsed.errors.len(), 1);
    assert_eq!(parsed.errors[0].message, "unterminated string literal");
}

#[test]
fn statement_ranges_exclude_trailing_newline() {
    let input = "class Shape:\n    def area(self):\n        return self.w * self.h\n\nx = 1\n";
    let parsed = parse(input);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let module = &parsed.module;
    let class = module.stmt(module.body[0]).as_class().unwrap();
    assert_eq!(class.name.name, "Shape");
    let method = module.stmt(class.body[0]).as_function().unwrap();
    assert_eq!(
        &input[method.range.start..method.range.end],
        "def area(self):\n        return self.w * self.h"
    );
    assert_eq!(&input[method.params.range.start..method.params.range.end], "(self)");
    let assign = module.stmt(module.body[1]);
    assert_eq!(&input[assign.range().start..assign.range().end], "x = 1");
}

#[test]
fn decorators_are_part_of_the_definition_range() {
    let input = "class A:\n    @staticmethod\n    def f():\n        pass\n";
    let parsed = parse(input);
    let module = &parsed.module;
    let class = module.stmt(module.body[0]).as_class().unwrap();
    let def = module.stmt(class.body[0]).as_function().unwrap();
    assert_eq!(def.decorators.len(), 1);
    assert!(input[def.range.start..].starts_with("@staticmethod"));
}

#[test]
fn parses_parameter_kinds() {
    let parsed = parse("def f(a, b=1, /, c=2, *args, d, e=3, **kw): pass\n");
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let def = parsed.module.stmt(parsed.module.body[0]).as_function().unwrap();
    let kinds: Vec<_> = def.params.params.iter().map(|p| p.kind).collect();
    assert_eq!(
        kinds,
        vec![
            ParamKind::Regular,
            ParamKind::Regular,
            ParamKind::PositionalOnlyMarker,
            ParamKind::Regular,
            ParamKind::VarPositional,
            ParamKind::Regular,
            ParamKind::Regular,
            ParamKind::VarKeyword,
        ]
    );
    let names: Vec<_> = def.params.names().map(|n| n.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c", "args", "d", "e", "kw"]);
}

#[test]
fn assignment_targets_get_store_context() {
    assert_eq!(
        names_in("a, (b, *c) = d\n"),
        vec![
            ("a".to_string(), ExprContext::Store),
            ("b".to_string(), ExprContext::Store),
            ("c".to_string(), ExprContext::Store),
            ("d".to_string(), ExprContext::Load),
        ]
    );
    assert_eq!(
        names_in("del x\nfor i in y: pass\n"),
        vec![
            ("x".to_string(), ExprContext::Del),
            ("i".to_string(), ExprContext::Store),
            ("y".to_string(), ExprContext::Load),
        ]
    );
}

#[test]
fn walrus_target_is_a_store() {
    assert_eq!(
        names_in("if (n := len(a)) > 10: pass\n"),
        vec![
            ("n".to_string(), ExprContext::Store),
            ("len".to_string(), ExprContext::Load),
            ("a".to_string(), ExprContext::Load),
        ]
    );
}

#[test]
fn fstring_fields_are_parsed_at_file_offsets() {
    let input = "s = f\"{self.x!r:>{width}} {{literal}} {y=}\"\n";
    let parsed = parse(input);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let module = &parsed.module;
    let Stmt::Assign { value, .. } = module.stmt(module.body[0]) else {
        panic!("expected assignment");
    };
    let Expr::FString { values, .. } = module.expr(*value) else {
        panic!("expected f-string");
    };
    let texts: Vec<_> = values
        .iter()
        .map(|id| {
            let range = module.expr(*id).range();
            &input[range.start..range.end]
        })
        .collect();
    assert_eq!(texts, vec!["self.x", "width", "y"]);
}

#[test]
fn parenthesized_expression_range_includes_parens() {
    let input = "(a or b).area()\n";
    let parsed = parse(input);
    let module = &parsed.module;
    let Stmt::Expr { value, .. } = module.stmt(module.body[0]) else {
        panic!("expected expression statement");
    };
    let Expr::Call { func, .. } = module.expr(*value) else {
        panic!("expected call");
    };
    let Expr::Attribute { value: qualifier, attr, .. } = module.expr(*func) else {
        panic!("expected attribute");
    };
    assert_eq!(attr.name, "area");
    let range = module.expr(*qualifier).range();
    assert_eq!(&input[range.start..range.end], "(a or b)");
}

#[test]
fn call_arguments_are_classified() {
    let parsed = parse("f(a, *b, c=1, **d)\n");
    let module = &parsed.module;
    let Stmt::Expr { value, .. } = module.stmt(module.body[0]) else {
        panic!("expected expression statement");
    };
    let Expr::Call { args, .. } = module.expr(*value) else {
        panic!("expected call");
    };
    let kinds: Vec<_> = args
        .iter()
        .map(|arg| match &arg.kind {
            ArgKind::Positional => "positional".to_string(),
            ArgKind::Keyword(name) => format!("keyword:{}", name.name),
            ArgKind::Star => "star".to_string(),
            ArgKind::DoubleStar => "double-star".to_string(),
        })
        .collect();
    assert_eq!(kinds, vec!["positional", "star", "keyword:c", "double-star"]);
}

#[test]
fn comprehensions_and_lambdas() {
    let input = "r = [x * k for x in xs if x]\ng = lambda v, w=2: v + w\nd = {k: v for k, v in items}\n";
    let parsed = parse(input);
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let comprehensions = parsed
        .module
        .exprs
        .iter()
        .filter(|(_, e)| matches!(e, Expr::Comprehension { .. }))
        .count();
    assert_eq!(comprehensions, 2);
    let lambda = parsed
        .module
        .exprs
        .iter()
        .find_map(|(_, e)| match e {
            Expr::Lambda { params, .. } => Some(params.names().count()),
            _ => None,
        });
    assert_eq!(lambda, Some(2));
}

#[test]
fn elif_chains_nest_in_orelse() {
    let input = "if a:\n    pass\nelif b:\n    pass\nelse:\n    pass\n";
    let parsed = parse(input);
    let module = &parsed.module;
    let Stmt::If { orelse, is_elif, .. } = module.stmt(module.body[0]) else {
        panic!("expected if");
    };
    assert!(!is_elif);
    assert_eq!(orelse.len(), 1);
    let Stmt::If {
        is_elif: nested_elif,
        orelse: nested_else,
        ..
    } = module.stmt(orelse[0])
    else {
        panic!("expected elif");
    };
    assert!(nested_elif);
    assert_eq!(nested_else.len(), 1);
    assert_eq!(module.parent_of_stmt(orelse[0]), Some(module.body[0]));
}

#[test]
fn imports() {
    let parsed = parse("import os.path as p, sys\nfrom ..pkg.mod import (a, b as c)\nfrom x import *\n");
    assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
    let module = &parsed.module;
    let Stmt::Import { names, .. } = module.stmt(module.body[0]) else {
        panic!("expected import");
    };
    let bound: Vec<_> = names.iter().map(|a| a.bound_name()).collect();
    assert_eq!(bound, vec!["p", "sys"]);

    let Stmt::ImportFrom {
        module: from,
        level,
        names,
        is_star,
        ..
    } = module.stmt(module.body[1])
    else {
        panic!("expected from-import");
    };
    assert_eq!(from.as_deref(), Some("pkg.mod"));
    assert_eq!(*level, 2);
    assert!(!is_star);
    let bound: Vec<_> = names.iter().map(|a| a.bound_name()).collect();
    assert_eq!(bound, vec!["a", "c"]);

    assert!(matches!(
        module.stmt(module.body[2]),
        Stmt::ImportFrom { is_star: true, .. }
    ));
}

#[test]
fn parent_links_reach_the_enclosing_statement() {
    let input = "def f(self):\n    return g(self.x + 1)\n";
    let parsed = parse(input);
    let module = &parsed.module;
    let def = module.stmt(module.body[0]).as_function().unwrap();
    let ret = def.body[0];
    let Stmt::Return { value: Some(value), .. } = module.stmt(ret) else {
        panic!("expected return");
    };
    for expr in descendants(module, *value) {
        assert_eq!(module.enclosing_stmt(expr), Some(ret));
    }
    assert_eq!(module.parent_of_expr(*value), Some(NodeId::Stmt(ret)));
    assert_eq!(module.top_level_stmt(ret), module.body[0]);
}

#[test]
fn docstring_is_detected() {
    let parsed = parse("\"\"\"Module docs.\"\"\"\nimport os\n");
    assert_eq!(parsed.module.docstring(), Some(parsed.module.body[0]));
    assert!(matches!(
        parsed.module.expr(match parsed.module.stmt(parsed.module.body[0]) {
            Stmt::Expr { value, .. } => *value,
            _ => unreachable!(),
        }),
        Expr::Constant {
            kind: ConstantKind::Str,
            ..
        }
    ));
    assert_eq!(parse("import os\n").module.docstring(), None);
}

#[test]
fn recovers_from_garbage_and_keeps_going() {
    let input = "x = = 1\ndef ok():\n    return 1\n)\ny = 2\n";
    let parsed = parse(input);
    assert!(!parsed.errors.is_empty());
    let functions = parsed
        .module
        .body
        .iter()
        .filter(|id| parsed.module.stmt(**id).as_function().is_some())
        .count();
    assert_eq!(functions, 1);
    let last = *parsed.module.body.last().unwrap();
    let range = parsed.module.stmt(last).range();
    assert_eq!(&input[range.start..range.end], "y = 2");
}

#[test]
fn deeply_nested_input_terminates() {
    let input = format!("x = {}1{}\n", "(".repeat(5_000), ")".repeat(5_000));
    let parsed = parse(&input);
    assert!(parsed
        .errors
        .iter()
        .any(|err| err.message.contains("nested too deeply")));
}
