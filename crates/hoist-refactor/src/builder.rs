use hoist_syntax::ast::{Module, ParamKind, StmtId};
use hoist_syntax::TokenKind;
use serde::Serialize;

use crate::edit::{apply_text_edits, EditError, FileId, TextEdit, TextRange, WorkspaceEdit};
use crate::lines;
use crate::params::{ArgumentStyle, ParameterPlan};

/// The top-level function produced from a method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct NewFunction {
    pub name: String,
    /// Source text at module indentation, without a trailing line break.
    pub text: String,
    pub parameters: Vec<String>,
}

/// Build the new function from the text of `method`.
///
/// `extra_edits` are edits in the home file (call sites and temporaries)
/// produced for calls inside the method; those outside the method are
/// ignored. Attribute reads covered by one of them have already been folded
/// into it.
pub fn build(
    module: &Module,
    text: &str,
    method: StmtId,
    plan: &ParameterPlan,
    style: ArgumentStyle,
    extra_edits: &[TextEdit],
) -> Result<NewFunction, EditError> {
    let scratch = FileId::new("<method>");
    let Some(def) = module.stmt(method).as_function() else {
        return Err(EditError::InvalidRange {
            file: scratch,
            range: module.stmt(method).range(),
        });
    };

    let base = lines::line_start(text, def.range.start);
    let end = def.range.end;
    let shift = |range: TextRange| TextRange::new(range.start - base, range.end - base);
    let new_params: Vec<String> = plan.parameters().map(str::to_string).collect();

    let mut edits = parameter_edits(&scratch, def, &new_params, style, base);

    let inner: Vec<&TextEdit> = extra_edits
        .iter()
        .filter(|edit| edit.range.start >= base && edit.range.end <= end)
        .collect();
    for entry in plan.iter() {
        for &reference in &entry.references {
            let absorbed = inner
                .iter()
                .any(|edit| !edit.range.is_empty() && edit.range.contains(reference));
            if !absorbed {
                edits.push(TextEdit::replace(
                    scratch.clone(),
                    shift(reference),
                    entry.parameter.clone(),
                ));
            }
        }
    }
    for edit in inner {
        edits.push(TextEdit::replace(
            scratch.clone(),
            shift(edit.range),
            edit.replacement.clone(),
        ));
    }

    let mut local = WorkspaceEdit::new(edits);
    local.normalize()?;
    let edited = apply_text_edits(&text[base..end], &local.text_edits)?;

    let indent = def.range.start - base;
    Ok(NewFunction {
        name: def.name.name.clone(),
        text: dedent(&edited, indent),
        parameters: new_params,
    })
}

fn parameter_edits(
    file: &FileId,
    def: &hoist_syntax::ast::FunctionDef,
    new_params: &[String],
    style: ArgumentStyle,
    base: usize,
) -> Vec<TextEdit> {
    let params = &def.params.params;
    let Some(instance) = params.first() else {
        return Vec::new();
    };
    let mut dropped = 1;
    if params
        .get(1)
        .is_some_and(|param| param.kind == ParamKind::PositionalOnlyMarker)
    {
        dropped += 1;
    }
    let kept = &params[dropped.min(params.len())..];
    let rel = |offset: usize| offset - base;

    let Some(first_kept) = kept.first() else {
        // Only the instance (and maybe `/`) remained: rewrite the whole list.
        let inside = TextRange::new(
            rel(def.params.range.start + 1),
            rel(def.params.range.end.saturating_sub(1).max(def.params.range.start + 1)),
        );
        let list = match style {
            ArgumentStyle::Positional => new_params.join(", "),
            ArgumentStyle::Keyword if new_params.is_empty() => String::new(),
            ArgumentStyle::Keyword => format!("*, {}", new_params.join(", ")),
        };
        return vec![TextEdit::replace(file.clone(), inside, list)];
    };

    let mut edits = vec![TextEdit::delete(
        file.clone(),
        TextRange::new(rel(instance.range.start), rel(first_kept.range.start)),
    )];
    if new_params.is_empty() {
        return edits;
    }

    let names = new_params.join(", ");
    match style {
        ArgumentStyle::Positional => {
            let last = kept.last().map_or(first_kept.range.end, |p| p.range.end);
            edits.push(TextEdit::insert(file.clone(), rel(last), format!(", {names}")));
        }
        ArgumentStyle::Keyword => {
            let has_star = kept.iter().any(|param| {
                matches!(
                    param.kind,
                    ParamKind::VarPositional | ParamKind::KeywordOnlyMarker
                )
            });
            let star = if has_star { "" } else { "*, " };
            match kept.iter().find(|param| param.kind == ParamKind::VarKeyword) {
                Some(kwargs) => edits.push(TextEdit::insert(
                    file.clone(),
                    rel(kwargs.range.start),
                    format!("{star}{names}, "),
                )),
                None => {
                    let last = kept.last().map_or(first_kept.range.end, |p| p.range.end);
                    edits.push(TextEdit::insert(
                        file.clone(),
                        rel(last),
                        format!(", {star}{names}"),
                    ));
                }
            }
        }
    }
    edits
}

/// Remove up to `width` leading whitespace characters from every line that
/// does not start inside a multi-line string.
fn dedent(block: &str, width: usize) -> String {
    if width == 0 {
        return block.to_string();
    }
    let (tokens, _) = hoist_syntax::lex(block);
    let strings: Vec<TextRange> = tokens
        .iter()
        .filter(|token| matches!(token.kind, TokenKind::String | TokenKind::FString))
        .map(|token| token.range)
        .collect();
    let in_string = |offset: usize| {
        strings
            .iter()
            .any(|range| range.start < offset && offset < range.end)
    };

    let mut out = String::with_capacity(block.len());
    let mut offset = 0;
    for line in block.split_inclusive('\n') {
        if in_string(offset) {
            out.push_str(line);
        } else {
            let mut cut = 0;
            for (removed, (idx, ch)) in line.char_indices().enumerate() {
                if removed >= width || !(ch == ' ' || ch == '\t') {
                    break;
                }
                cut = idx + ch.len_utf8();
            }
            out.push_str(&line[cut..]);
        }
        offset += line.len();
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::params::{argument_style, synthesize};
    use crate::safety::validate;
    use crate::scope::analyze;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn build_method(text: &str, name: &str) -> NewFunction {
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
        let analysis = analyze(module, method);
        let reads = validate(&analysis).unwrap();
        let plan = synthesize(&reads, &analysis.used_names);
        let def = module.stmt(method).as_function().unwrap();
        build(module, text, method, &plan, argument_style(&def.params), &[]).unwrap()
    }

    #[test]
    fn replaces_attribute_reads_with_parameters() {
        let text = "class Shape:\n    def area(self):\n        return self.w * self.h\n";
        let function = build_method(text, "area");
        assert_eq!(function.text, "def area(w, h):\n    return w * h");
        assert_eq!(function.parameters, vec!["w", "h"]);
    }

    #[test]
    fn keeps_existing_parameters_and_appends_new_ones() {
        let text = "class A:\n    def scaled(self, factor):\n        return self.x * factor\n";
        assert_eq!(
            build_method(text, "scaled").text,
            "def scaled(factor, x):\n    return x * factor"
        );
    }

    #[test]
    fn keyword_only_parameters_for_defaults_and_kwargs() {
        let text = "\
class A:
    def f(self, a, b=2, **kw):
        return self.x + a + b
    def g(self, *args):
        return self.y
";
        assert_eq!(
            build_method(text, "f").text,
            "def f(a, b=2, *, x, **kw):\n    return x + a + b"
        );
        assert_eq!(build_method(text, "g").text, "def g(*args, y):\n    return y");
    }

    #[test]
    fn dangling_positional_only_marker_is_dropped() {
        let text = "class A:\n    def f(self, /, a):\n        return a\n";
        assert_eq!(build_method(text, "f").text, "def f(a):\n    return a");
        let text = "class A:\n    def f(self, /):\n        return self.v\n";
        assert_eq!(build_method(text, "f").text, "def f(v):\n    return v");
    }

    #[test]
    fn multi_line_strings_keep_their_indentation() {
        let text = "\
class A:
    @staticdecorator
    def doc(self):
        \"\"\"Line one.
        Line two.
        \"\"\"
        s = '''
    keep
'''
        return s, self.t
";
        assert_eq!(
            build_method(text, "doc").text,
            "\
@staticdecorator
def doc(t):
    \"\"\"Line one.
        Line two.
        \"\"\"
    s = '''
    keep
'''
    return s, t"
        );
    }

    #[test]
    fn colliding_parameter_names_are_suffixed() {
        let text = "class A:\n    def f(self):\n        w = 2\n        return w * self.w\n";
        assert_eq!(
            build_method(text, "f").text,
            "def f(w_1):\n    w = 2\n    return w * w_1"
        );
    }

    #[test]
    fn dedent_strips_only_whitespace() {
        assert_eq!(dedent("    a\n  b\n\n    c", 4), "a\nb\n\nc");
    }
}
