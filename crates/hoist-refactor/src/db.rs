//! Host services consumed by the refactoring.

use hoist_syntax::ast::{ExprId, StmtId};
use hoist_syntax::ParseResult;
use serde::Serialize;

use crate::edit::{FileId, TextRange};

/// Read access to the workspace snapshot.
pub trait RefactorDatabase {
    fn file_text(&self, file: &FileId) -> Option<&str>;

    fn parsed(&self, file: &FileId) -> Option<&ParseResult>;

    /// The dotted module path `file` can be imported as (`pkg.shapes`), if any.
    fn importable_module_name(&self, file: &FileId) -> Option<String>;
}

/// The method being converted, as resolved in its home file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MethodTarget {
    pub file: FileId,
    pub class_name: String,
    pub method_name: String,
    pub method: StmtId,
    /// Range of the method definition, decorators included.
    pub range: TextRange,
}

/// A call expression that may invoke the target method.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CallSite {
    pub file: FileId,
    #[serde(skip)]
    pub call: ExprId,
    /// `None` when the callee is a bare name rather than `<qualifier>.<method>`.
    #[serde(skip)]
    pub qualifier: Option<ExprId>,
    pub range: TextRange,
}

/// Usage discovery.
pub trait UsageIndex {
    /// Every call that may invoke `target`, as a complete list ordered by file
    /// and offset.
    fn find_call_sites(&self, target: &MethodTarget) -> Vec<CallSite>;

    /// Every other class or attribute assignment giving some object a member
    /// named like `target`. Calls through such a member look the same as
    /// calls to `target`.
    fn find_member_bindings(&self, target: &MethodTarget) -> Vec<MemberBinding>;
}

/// A member binding found by [`UsageIndex::find_member_bindings`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct MemberBinding {
    pub file: FileId,
    pub range: TextRange,
}
