use serde::Serialize;
use thiserror::Error;

use crate::edit::TextRange;
use crate::scope::{NameReference, ReferenceShape, ScopeAnalysis};

/// Why a method body cannot be turned into a top-level function.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SafetyError {
    #[error("writes to enclosing-scope names are not representable as arguments (`{name}`)")]
    NonlocalWrite { name: String, range: TextRange },
    #[error("instance reads inside a nested scope cannot be hoisted to parameters safely (`{name}`)")]
    InstanceEscapesNestedScope { name: String, range: TextRange },
    #[error("reads of other enclosing-scope names are not representable (`{name}`)")]
    OuterScopeRead { name: String, range: TextRange },
    #[error("reassigning the instance binding changes semantics when it becomes an ordinary parameter (`{name}`)")]
    InstanceReassigned { name: String, range: TextRange },
    #[error("attribute writes are not convertible to parameters (`{attribute}`)")]
    AttributeWrite { attribute: String, range: TextRange },
    #[error("private attributes cannot be exposed as parameters (`{attribute}`)")]
    PrivateAttribute { attribute: String, range: TextRange },
    #[error("method calls on the instance cannot be hoisted (`{attribute}`)")]
    MethodCallOnInstance { attribute: String, range: TextRange },
    #[error("the instance is used directly and cannot be eliminated (`{name}`)")]
    BareInstanceUsage { name: String, range: TextRange },
}

impl SafetyError {
    /// Location of the offending reference in the home file.
    #[must_use]
    pub fn range(&self) -> TextRange {
        match self {
            SafetyError::NonlocalWrite { range, .. }
            | SafetyError::InstanceEscapesNestedScope { range, .. }
            | SafetyError::OuterScopeRead { range, .. }
            | SafetyError::InstanceReassigned { range, .. }
            | SafetyError::AttributeWrite { range, .. }
            | SafetyError::PrivateAttribute { range, .. }
            | SafetyError::MethodCallOnInstance { range, .. }
            | SafetyError::BareInstanceUsage { range, .. } => *range,
        }
    }
}

/// An instance-attribute read that can be replaced by a parameter.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct AttributeRead {
    pub attribute: String,
    /// Range of the whole `self.attr` expression.
    pub range: TextRange,
}

/// Check every report of `analysis`, returning the accepted attribute reads
/// in source order. The first violation wins.
pub fn validate(analysis: &ScopeAnalysis) -> Result<Vec<AttributeRead>, SafetyError> {
    if let Some(r) = first(analysis, |report| &report.nonlocal_writes) {
        return Err(SafetyError::NonlocalWrite {
            name: r.name.clone(),
            range: r.range,
        });
    }
    if let Some(r) = first(analysis, |report| &report.instance_reads_from_nested_scope) {
        return Err(SafetyError::InstanceEscapesNestedScope {
            name: r.name.clone(),
            range: r.range,
        });
    }
    if let Some(r) = first(analysis, |report| &report.outer_scope_reads) {
        return Err(SafetyError::OuterScopeRead {
            name: r.name.clone(),
            range: r.range,
        });
    }
    if let Some(r) = first(analysis, |report| &report.instance_writes) {
        return Err(SafetyError::InstanceReassigned {
            name: r.name.clone(),
            range: r.range,
        });
    }

    let mut accepted = Vec::new();
    for read in analysis.reports().flat_map(|report| &report.instance_reads) {
        let attribute = match (&read.attribute, read.shape) {
            (Some(attribute), ReferenceShape::AssignmentTarget) => {
                return Err(SafetyError::AttributeWrite {
                    attribute: attribute.name.clone(),
                    range: read.access_range,
                });
            }
            (Some(attribute), _) if attribute.name.starts_with('_') => {
                return Err(SafetyError::PrivateAttribute {
                    attribute: attribute.name.clone(),
                    range: read.access_range,
                });
            }
            (Some(attribute), ReferenceShape::MethodCall) => {
                return Err(SafetyError::MethodCallOnInstance {
                    attribute: attribute.name.clone(),
                    range: read.access_range,
                });
            }
            (Some(attribute), ReferenceShape::AttributeAccess) => attribute,
            (_, ReferenceShape::BareReference) | (None, _) => {
                return Err(SafetyError::BareInstanceUsage {
                    name: analysis.instance_name.clone(),
                    range: read.range,
                });
            }
        };
        accepted.push(AttributeRead {
            attribute: attribute.name.clone(),
            range: read.access_range,
        });
    }

    tracing::debug!(
        target: "hoist.refactor",
        accepted = accepted.len(),
        scopes = analysis.scopes.len(),
        "method body validated"
    );
    Ok(accepted)
}

fn first<'a>(
    analysis: &'a ScopeAnalysis,
    category: impl Fn(&'a crate::scope::UsageReport) -> &'a Vec<NameReference>,
) -> Option<&'a NameReference> {
    analysis
        .reports()
        .flat_map(|report| category(report).iter())
        .min_by_key(|r| r.range.start)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scope::analyze;
    use hoist_syntax::parse;
    use pretty_assertions::assert_eq;

    fn check(body: &str) -> Result<Vec<AttributeRead>, SafetyError> {
        let text = format!("class A:\n    def m(self):\n{body}");
        let parsed = parse(&text);
        assert!(parsed.errors.is_empty(), "{:?}", parsed.errors);
        let module = &parsed.module;
        let method = module
            .walk_stmts()
            .find(|&id| {
                module
                    .stmt(id)
                    .as_function()
                    .is_some_and(|def| def.name.name == "m")
            })
            .unwrap();
        validate(&analyze(module, method))
    }

    #[test]
    fn accepts_plain_attribute_reads() {
        let reads = check("        return self.w * self.h + self.w\n").unwrap();
        let attrs: Vec<_> = reads.iter().map(|r| r.attribute.as_str()).collect();
        assert_eq!(attrs, vec!["w", "h", "w"]);
    }

    #[test]
    fn rejects_each_category() {
        let cases: &[(&str, fn(&SafetyError) -> bool)] = &[
            (
                "        n = 0\n        def f():\n            nonlocal n\n            n = 1\n",
                |e| matches!(e, SafetyError::NonlocalWrite { .. }),
            ),
            (
                "        return [self.x for _ in range(2)]\n",
                |e| matches!(e, SafetyError::InstanceEscapesNestedScope { .. }),
            ),
            (
                "        k = 2\n        return (lambda: k)()\n",
                |e| matches!(e, SafetyError::OuterScopeRead { .. }),
            ),
            (
                "        self = None\n",
                |e| matches!(e, SafetyError::InstanceReassigned { .. }),
            ),
            (
                "        self.x = 1\n",
                |e| matches!(e, SafetyError::AttributeWrite { .. }),
            ),
            (
                "        return self._secret\n",
                |e| matches!(e, SafetyError::PrivateAttribute { .. }),
            ),
            (
                "        return self.helper()\n",
                |e| matches!(e, SafetyError::MethodCallOnInstance { .. }),
            ),
            (
                "        return print(self)\n",
                |e| matches!(e, SafetyError::BareInstanceUsage { .. }),
            ),
        ];
        for (body, expected) in cases {
            let err = check(body).unwrap_err();
            assert!(expected(&err), "{body:?} produced {err:?}");
        }
    }

    #[test]
    fn category_priority_beats_source_order() {
        let err = check("        self.x = 1\n        return lambda: self.y\n").unwrap_err();
        assert!(matches!(err, SafetyError::InstanceEscapesNestedScope { .. }));
    }

    #[test]
    fn per_read_checks_follow_encounter_order() {
        let err = check("        a = self.helper()\n        self.x = a\n").unwrap_err();
        assert_eq!(
            err,
            SafetyError::MethodCallOnInstance {
                attribute: "helper".to_string(),
                range: TextRange::new(38, 49),
            }
        );
    }

    #[test]
    fn messages_name_the_offender() {
        let err = check("        return self._secret\n").unwrap_err();
        assert_eq!(
            err.to_string(),
            "private attributes cannot be exposed as parameters (`_secret`)"
        );
    }
}
