//! Refactoring entrypoints for hoist.
//!
//! Today this crate exposes one refactoring, "make method top-level"
//! ([`make_method_top_level`]): an instance method that only reads
//! attributes of its instance is turned into a module-level function taking
//! those attributes as parameters, and every call site is rewritten.
//!
//! The pieces are usable on their own:
//! - scope analysis of a method body ([`scope`]),
//! - the safety rules deciding whether the conversion is allowed ([`safety`]),
//! - parameter naming ([`params`]),
//! - call-site rewriting ([`call_sites`]) and import insertion ([`imports`]),
//! - text edits and previews ([`edit`], [`preview`]).
//!
//! Nothing here touches the filesystem; callers feed file contents through a
//! [`RefactorDatabase`] and apply the resulting [`WorkspaceEdit`] themselves.

pub mod builder;
pub mod call_sites;
pub mod db;
pub mod edit;
pub mod imports;
mod lines;
mod make_top_level;
pub mod params;
pub mod preview;
pub mod safety;
pub mod scope;

pub use builder::NewFunction;
pub use call_sites::{CallSiteRewrite, QualifierShape};
pub use db::{CallSite, MemberBinding, MethodTarget, RefactorDatabase, UsageIndex};
pub use edit::{
    apply_text_edits, apply_workspace_edit, EditError, FileId, TextEdit, TextRange, WorkspaceEdit,
};
pub use make_top_level::{
    commit, generate_preview, make_method_top_level, MakeTopLevelError, MakeTopLevelOptions,
    MakeTopLevelParams, MakeTopLevelPlan,
};
pub use params::{ArgumentStyle, ParameterPlan};
pub use preview::{FilePreview, RefactoringPreview};
pub use safety::SafetyError;
