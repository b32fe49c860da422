use std::collections::BTreeSet;

use hoist_syntax::ast::{ParamKind, Parameters};
use indexmap::IndexMap;
use serde::Serialize;

use crate::edit::TextRange;
use crate::safety::AttributeRead;

/// One synthesized parameter and every `self.attr` read it replaces.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ParameterEntry {
    pub attribute: String,
    pub parameter: String,
    pub references: Vec<TextRange>,
}

/// Attribute to parameter mapping, in first-use order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct ParameterPlan {
    entries: IndexMap<String, ParameterEntry>,
}

impl ParameterPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ParameterEntry> {
        self.entries.values()
    }

    #[must_use]
    pub fn get(&self, attribute: &str) -> Option<&ParameterEntry> {
        self.entries.get(attribute)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &str> {
        self.entries.values().map(|entry| entry.parameter.as_str())
    }
}

/// How new parameters are passed at call sites.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum ArgumentStyle {
    /// Appended after the existing parameters and passed positionally.
    Positional,
    /// Keyword-only, passed as `name=value`.
    Keyword,
}

/// Style for a method signature; the first (instance) parameter is ignored.
#[must_use]
pub fn argument_style(params: &Parameters) -> ArgumentStyle {
    let needs_keywords = params.params.iter().skip(1).any(|param| {
        param.default.is_some()
            || matches!(
                param.kind,
                ParamKind::VarPositional | ParamKind::KeywordOnlyMarker | ParamKind::VarKeyword
            )
    });
    if needs_keywords {
        ArgumentStyle::Keyword
    } else {
        ArgumentStyle::Positional
    }
}

/// Deduplicate `reads` by attribute and pick a parameter name for each,
/// avoiding `reserved`, Python keywords and earlier parameters.
#[must_use]
pub fn synthesize(reads: &[AttributeRead], reserved: &BTreeSet<String>) -> ParameterPlan {
    let mut entries: IndexMap<String, ParameterEntry> = IndexMap::new();
    let mut taken: BTreeSet<String> = BTreeSet::new();

    for read in reads {
        if let Some(entry) = entries.get_mut(&read.attribute) {
            entry.references.push(read.range);
            continue;
        }
        let parameter = fresh_name(&read.attribute, |candidate| {
            reserved.contains(candidate)
                || taken.contains(candidate)
                || hoist_syntax::is_keyword(candidate)
        });
        taken.insert(parameter.clone());
        entries.insert(
            read.attribute.clone(),
            ParameterEntry {
                attribute: read.attribute.clone(),
                parameter,
                references: vec![read.range],
            },
        );
    }

    ParameterPlan { entries }
}

fn fresh_name(base: &str, is_taken: impl Fn(&str) -> bool) -> String {
    if !is_taken(base) {
        return base.to_string();
    }
    (1..)
        .map(|n| format!("{base}_{n}"))
        .find(|candidate| !is_taken(candidate))
        .unwrap_or_else(|| base.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn read(attribute: &str, start: usize) -> AttributeRead {
        AttributeRead {
            attribute: attribute.to_string(),
            range: TextRange::new(start, start + 5 + attribute.len()),
        }
    }

    #[test]
    fn deduplicates_in_first_use_order() {
        let reads = [read("w", 0), read("h", 10), read("w", 20)];
        let plan = synthesize(&reads, &BTreeSet::new());
        let params: Vec<_> = plan.parameters().collect();
        assert_eq!(params, vec!["w", "h"]);
        assert_eq!(plan.get("w").unwrap().references.len(), 2);
        assert_eq!(plan, synthesize(&reads, &BTreeSet::new()));
    }

    #[test]
    fn avoids_used_names_and_earlier_parameters() {
        let reserved: BTreeSet<String> = ["w", "w_1"].iter().map(|s| s.to_string()).collect();
        let reads = [read("w", 0), read("match", 10), read("w_2", 20)];
        let plan = synthesize(&reads, &reserved);
        let params: Vec<_> = plan.parameters().collect();
        assert_eq!(params, vec!["w_2", "match", "w_2_1"]);
    }

    #[test]
    fn argument_style_follows_remaining_signature() {
        let cases = [
            ("def f(self, a, b): pass\n", ArgumentStyle::Positional),
            ("def f(self, a, /, b): pass\n", ArgumentStyle::Positional),
            ("def f(self, a=1): pass\n", ArgumentStyle::Keyword),
            ("def f(self, *args): pass\n", ArgumentStyle::Keyword),
            ("def f(self, *, k): pass\n", ArgumentStyle::Keyword),
            ("def f(self, **kw): pass\n", ArgumentStyle::Keyword),
        ];
        for (text, expected) in cases {
            let parsed = parse(text);
            let def = parsed.module.stmt(parsed.module.body[0]).as_function().unwrap();
            assert_eq!(argument_style(&def.params), expected, "{text}");
        }
    }
}
