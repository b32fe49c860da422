//! Arena-allocated Python syntax tree.
//!
//! Every node carries the byte range it was parsed from so that refactorings
//! can turn structural decisions into precise text edits.

use std::fmt;

use crate::TextRange;

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ExprId(u32);

impl ExprId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        ExprId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for ExprId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ExprId({})", self.0)
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StmtId(u32);

impl StmtId {
    pub(crate) fn from_raw(raw: u32) -> Self {
        StmtId(raw)
    }

    #[must_use]
    pub fn idx(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for StmtId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StmtId({})", self.0)
    }
}

/// Either kind of node; used for parent links.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NodeId {
    Stmt(StmtId),
    Expr(ExprId),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arena<T> {
    data: Vec<T>,
}

impl<T> Arena<T> {
    pub fn alloc(&mut self, value: T) -> u32 {
        let idx = self.data.len() as u32;
        self.data.push(value);
        idx
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, &T)> {
        self.data.iter().enumerate().map(|(i, v)| (i as u32, v))
    }

    pub(crate) fn get_mut(&mut self, id: ExprId) -> Option<&mut T> {
        self.data.get_mut(id.idx())
    }
}

impl<T> Default for Arena<T> {
    fn default() -> Self {
        Arena { data: Vec::new() }
    }
}

impl<T> std::ops::Index<ExprId> for Arena<T> {
    type Output = T;

    fn index(&self, index: ExprId) -> &Self::Output {
        &self.data[index.idx()]
    }
}

impl<T> std::ops::Index<StmtId> for Arena<T> {
    type Output = T;

    fn index(&self, index: StmtId) -> &Self::Output {
        &self.data[index.idx()]
    }
}

/// A parsed file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Module {
    pub body: Vec<StmtId>,
    pub stmts: Arena<Stmt>,
    pub exprs: Arena<Expr>,
    pub range: TextRange,
    pub(crate) expr_parents: Vec<Option<NodeId>>,
    pub(crate) stmt_parents: Vec<Option<StmtId>>,
}

impl Module {
    #[must_use]
    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id]
    }

    #[must_use]
    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id]
    }

    /// The node that directly contains `id`.
    #[must_use]
    pub fn parent_of_expr(&self, id: ExprId) -> Option<NodeId> {
        self.expr_parents.get(id.idx()).copied().flatten()
    }

    /// The compound statement whose body contains `id`; `None` at module level.
    #[must_use]
    pub fn parent_of_stmt(&self, id: StmtId) -> Option<StmtId> {
        self.stmt_parents.get(id.idx()).copied().flatten()
    }

    /// The innermost statement containing `id`.
    #[must_use]
    pub fn enclosing_stmt(&self, id: ExprId) -> Option<StmtId> {
        let mut current = self.parent_of_expr(id)?;
        loop {
            match current {
                NodeId::Stmt(stmt) => return Some(stmt),
                NodeId::Expr(expr) => current = self.parent_of_expr(expr)?,
            }
        }
    }

    /// Statements enclosing `id`, innermost first (including `id` itself).
    pub fn stmt_ancestors(&self, id: StmtId) -> impl Iterator<Item = StmtId> + '_ {
        std::iter::successors(Some(id), move |&stmt| self.parent_of_stmt(stmt))
    }

    /// The module-level statement containing `id`.
    #[must_use]
    pub fn top_level_stmt(&self, id: StmtId) -> StmtId {
        self.stmt_ancestors(id).last().unwrap_or(id)
    }

    /// Module docstring statement, if the first statement is a string literal.
    #[must_use]
    pub fn docstring(&self) -> Option<StmtId> {
        let first = *self.body.first()?;
        match self.stmt(first) {
            Stmt::Expr { value, .. } => match self.expr(*value) {
                Expr::Constant {
                    kind: ConstantKind::Str,
                    ..
                } => Some(first),
                _ => None,
            },
            _ => None,
        }
    }

    pub fn walk_stmts(&self) -> impl Iterator<Item = StmtId> {
        (0..self.stmts.len() as u32).map(StmtId::from_raw)
    }

    pub fn walk_exprs(&self) -> impl Iterator<Item = ExprId> {
        (0..self.exprs.len() as u32).map(ExprId::from_raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ident {
    pub name: String,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprContext {
    Load,
    Store,
    Del,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantKind {
    Number,
    Str,
    Bytes,
    True,
    False,
    None,
    Ellipsis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    FloorDiv,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Not,
    Invert,
    UAdd,
    USub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComprehensionKind {
    List,
    Set,
    Dict,
    Generator,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Generator {
    pub target: ExprId,
    pub iter: ExprId,
    pub ifs: Vec<ExprId>,
    pub is_async: bool,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DictItem {
    /// `None` for `**mapping` unpacking.
    pub key: Option<ExprId>,
    pub value: ExprId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArgKind {
    Positional,
    Keyword(Ident),
    /// `*iterable`
    Star,
    /// `**mapping`
    DoubleStar,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arg {
    pub kind: ArgKind,
    pub value: ExprId,
    pub range: TextRange,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParamKind {
    Regular,
    /// `*args`
    VarPositional,
    /// A bare `*` separating keyword-only parameters.
    KeywordOnlyMarker,
    /// The `/` separating positional-only parameters.
    PositionalOnlyMarker,
    /// `**kwargs`
    VarKeyword,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub kind: ParamKind,
    pub name: Option<Ident>,
    pub annotation: Option<ExprId>,
    pub default: Option<ExprId>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parameters {
    pub params: Vec<Param>,
    /// For `def`, the range from `(` to `)` inclusive. For `lambda`, the span
    /// between the keyword and the colon.
    pub range: TextRange,
}

impl Parameters {
    pub fn names(&self) -> impl Iterator<Item = &Ident> {
        self.params.iter().filter_map(|p| p.name.as_ref())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionDef {
    pub name: Ident,
    pub decorators: Vec<ExprId>,
    pub params: Parameters,
    pub returns: Option<ExprId>,
    pub body: Vec<StmtId>,
    pub is_async: bool,
    /// Includes decorators.
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: Ident,
    pub decorators: Vec<ExprId>,
    pub bases: Vec<Arg>,
    pub body: Vec<StmtId>,
    /// Includes decorators.
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WithItem {
    pub context: ExprId,
    pub target: Option<ExprId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptHandler {
    pub type_: Option<ExprId>,
    pub name: Option<Ident>,
    pub body: Vec<StmtId>,
    pub range: TextRange,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Alias {
    /// Dotted name as written (`os.path`).
    pub name: String,
    pub asname: Option<Ident>,
    pub range: TextRange,
}

impl Alias {
    /// The name this alias binds in the importing scope.
    #[must_use]
    pub fn bound_name(&self) -> &str {
        match &self.asname {
            Some(ident) => &ident.name,
            None => self.name.split('.').next().unwrap_or(&self.name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Stmt {
    FunctionDef(FunctionDef),
    ClassDef(ClassDef),
    Return {
        value: Option<ExprId>,
        range: TextRange,
    },
    Delete {
        targets: Vec<ExprId>,
        range: TextRange,
    },
    Assign {
        targets: Vec<ExprId>,
        value: ExprId,
        range: TextRange,
    },
    AugAssign {
        target: ExprId,
        op: BinaryOp,
        value: ExprId,
        range: TextRange,
    },
    AnnAssign {
        target: ExprId,
        annotation: ExprId,
        value: Option<ExprId>,
        range: TextRange,
    },
    For {
        is_async: bool,
        target: ExprId,
        iter: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
        range: TextRange,
    },
    While {
        test: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
        range: TextRange,
    },
    /// `elif` branches are represented as a nested `If` with `is_elif` set,
    /// stored as the single statement of the parent's `orelse`.
    If {
        test: ExprId,
        body: Vec<StmtId>,
        orelse: Vec<StmtId>,
        is_elif: bool,
        range: TextRange,
    },
    With {
        is_async: bool,
        items: Vec<WithItem>,
        body: Vec<StmtId>,
        range: TextRange,
    },
    Try {
        body: Vec<StmtId>,
        handlers: Vec<ExceptHandler>,
        orelse: Vec<StmtId>,
        finalbody: Vec<StmtId>,
        range: TextRange,
    },
    Raise {
        exc: Option<ExprId>,
        cause: Option<ExprId>,
        range: TextRange,
    },
    Assert {
        test: ExprId,
        msg: Option<ExprId>,
        range: TextRange,
    },
    Import {
        names: Vec<Alias>,
        range: TextRange,
    },
    ImportFrom {
        /// Dotted module path without leading dots.
        module: Option<String>,
        level: u32,
        names: Vec<Alias>,
        is_star: bool,
        range: TextRange,
    },
    Global {
        names: Vec<Ident>,
        range: TextRange,
    },
    Nonlocal {
        names: Vec<Ident>,
        range: TextRange,
    },
    Expr {
        value: ExprId,
        range: TextRange,
    },
    Pass {
        range: TextRange,
    },
    Break {
        range: TextRange,
    },
    Continue {
        range: TextRange,
    },
    /// Placeholder produced by error recovery.
    Error {
        range: TextRange,
    },
}

impl Stmt {
    #[must_use]
    pub fn range(&self) -> TextRange {
        match self {
            Stmt::FunctionDef(def) => def.range,
            Stmt::ClassDef(class) => class.range,
            Stmt::Return { range, .. }
            | Stmt::Delete { range, .. }
            | Stmt::Assign { range, .. }
            | Stmt::AugAssign { range, .. }
            | Stmt::AnnAssign { range, .. }
            | Stmt::For { range, .. }
            | Stmt::While { range, .. }
            | Stmt::If { range, .. }
            | Stmt::With { range, .. }
            | Stmt::Try { range, .. }
            | Stmt::Raise { range, .. }
            | Stmt::Assert { range, .. }
            | Stmt::Import { range, .. }
            | Stmt::ImportFrom { range, .. }
            | Stmt::Global { range, .. }
            | Stmt::Nonlocal { range, .. }
            | Stmt::Expr { range, .. }
            | Stmt::Pass { range }
            | Stmt::Break { range }
            | Stmt::Continue { range }
            | Stmt::Error { range } => *range,
        }
    }

    #[must_use]
    pub fn as_function(&self) -> Option<&FunctionDef> {
        match self {
            Stmt::FunctionDef(def) => Some(def),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_class(&self) -> Option<&ClassDef> {
        match self {
            Stmt::ClassDef(class) => Some(class),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    Name {
        id: String,
        ctx: ExprContext,
        range: TextRange,
    },
    Constant {
        kind: ConstantKind,
        range: TextRange,
    },
    /// An f-string; `values` are the expressions of its replacement fields.
    FString {
        values: Vec<ExprId>,
        range: TextRange,
    },
    Attribute {
        value: ExprId,
        attr: Ident,
        ctx: ExprContext,
        range: TextRange,
    },
    Subscript {
        value: ExprId,
        slice: ExprId,
        ctx: ExprContext,
        range: TextRange,
    },
    Call {
        func: ExprId,
        args: Vec<Arg>,
        range: TextRange,
    },
    Starred {
        value: ExprId,
        ctx: ExprContext,
        range: TextRange,
    },
    BinOp {
        left: ExprId,
        op: BinaryOp,
        right: ExprId,
        range: TextRange,
    },
    UnaryOp {
        op: UnaryOp,
        operand: ExprId,
        range: TextRange,
    },
    BoolOp {
        op: BoolOp,
        values: Vec<ExprId>,
        range: TextRange,
    },
    Compare {
        left: ExprId,
        ops: Vec<CmpOp>,
        comparators: Vec<ExprId>,
        range: TextRange,
    },
    Lambda {
        params: Parameters,
        body: ExprId,
        range: TextRange,
    },
    IfExp {
        test: ExprId,
        body: ExprId,
        orelse: ExprId,
        range: TextRange,
    },
    NamedExpr {
        target: ExprId,
        value: ExprId,
        range: TextRange,
    },
    Tuple {
        elts: Vec<ExprId>,
        ctx: ExprContext,
        parenthesized: bool,
        range: TextRange,
    },
    List {
        elts: Vec<ExprId>,
        ctx: ExprContext,
        range: TextRange,
    },
    Set {
        elts: Vec<ExprId>,
        range: TextRange,
    },
    Dict {
        items: Vec<DictItem>,
        range: TextRange,
    },
    /// List/set/dict comprehensions and generator expressions. For dict
    /// comprehensions `element` is the key and `value` the value.
    Comprehension {
        kind: ComprehensionKind,
        element: ExprId,
        value: Option<ExprId>,
        generators: Vec<Generator>,
        range: TextRange,
    },
    Await {
        value: ExprId,
        range: TextRange,
    },
    Yield {
        value: Option<ExprId>,
        range: TextRange,
    },
    YieldFrom {
        value: ExprId,
        range: TextRange,
    },
    Slice {
        lower: Option<ExprId>,
        upper: Option<ExprId>,
        step: Option<ExprId>,
        range: TextRange,
    },
    /// Placeholder produced by error recovery.
    Missing {
        range: TextRange,
    },
}

impl Expr {
    #[must_use]
    pub fn range(&self) -> TextRange {
        match self {
            Expr::Name { range, .. }
            | Expr::Constant { range, .. }
            | Expr::FString { range, .. }
            | Expr::Attribute { range, .. }
            | Expr::Subscript { range, .. }
            | Expr::Call { range, .. }
            | Expr::Starred { range, .. }
            | Expr::BinOp { range, .. }
            | Expr::UnaryOp { range, .. }
            | Expr::BoolOp { range, .. }
            | Expr::Compare { range, .. }
            | Expr::Lambda { range, .. }
            | Expr::IfExp { range, .. }
            | Expr::NamedExpr { range, .. }
            | Expr::Tuple { range, .. }
            | Expr::List { range, .. }
            | Expr::Set { range, .. }
            | Expr::Dict { range, .. }
            | Expr::Comprehension { range, .. }
            | Expr::Await { range, .. }
            | Expr::Yield { range, .. }
            | Expr::YieldFrom { range, .. }
            | Expr::Slice { range, .. }
            | Expr::Missing { range } => *range,
        }
    }

    pub(crate) fn range_mut(&mut self) -> &mut TextRange {
        match self {
            Expr::Name { range, .. }
            | Expr::Constant { range, .. }
            | Expr::FString { range, .. }
            | Expr::Attribute { range, .. }
            | Expr::Subscript { range, .. }
            | Expr::Call { range, .. }
            | Expr::Starred { range, .. }
            | Expr::BinOp { range, .. }
            | Expr::UnaryOp { range, .. }
            | Expr::BoolOp { range, .. }
            | Expr::Compare { range, .. }
            | Expr::Lambda { range, .. }
            | Expr::IfExp { range, .. }
            | Expr::NamedExpr { range, .. }
            | Expr::Tuple { range, .. }
            | Expr::List { range, .. }
            | Expr::Set { range, .. }
            | Expr::Dict { range, .. }
            | Expr::Comprehension { range, .. }
            | Expr::Await { range, .. }
            | Expr::Yield { range, .. }
            | Expr::YieldFrom { range, .. }
            | Expr::Slice { range, .. }
            | Expr::Missing { range } => range,
        }
    }

    #[must_use]
    pub fn ctx(&self) -> ExprContext {
        match self {
            Expr::Name { ctx, .. }
            | Expr::Attribute { ctx, .. }
            | Expr::Subscript { ctx, .. }
            | Expr::Starred { ctx, .. }
            | Expr::Tuple { ctx, .. }
            | Expr::List { ctx, .. } => *ctx,
            _ => ExprContext::Load,
        }
    }

    #[must_use]
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Expr::Name { id, .. } => Some(id),
            _ => None,
        }
    }
}
