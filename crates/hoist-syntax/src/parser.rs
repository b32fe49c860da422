//! Recursive-descent parser for Python 3 modules.
//!
//! The parser never fails: malformed input produces [`Stmt::Error`] /
//! [`Expr::Missing`] placeholders plus [`ParseError`]s, and always makes
//! progress so that arbitrary input terminates.

use crate::ast::*;
use crate::lexer::{lex, lex_fragment, Keyword, Token, TokenKind};
use crate::visit::{expr_children, stmt_children, stmt_exprs};
use crate::{ParseError, ParseResult, TextRange};

const MAX_NESTING: usize = 100;

/// Parse a whole module.
pub fn parse(text: &str) -> ParseResult {
    let (tokens, lex_errors) = lex(text);
    let mut parser = Parser::new(text, tokens);
    let body = parser.module_body();

    let mut errors = lex_errors;
    errors.extend(parser.errors);
    errors.sort_by_key(|err| (err.range.start, err.range.end));

    let mut module = Module {
        body,
        stmts: parser.stmts,
        exprs: parser.exprs,
        range: TextRange::new(0, text.len()),
        expr_parents: Vec::new(),
        stmt_parents: Vec::new(),
    };
    link_parents(&mut module);

    if !errors.is_empty() {
        tracing::trace!(target: "hoist.syntax", errors = errors.len(), "parsed with errors");
    }

    ParseResult { module, errors }
}

fn link_parents(module: &mut Module) {
    let mut expr_parents = vec![None; module.exprs.len()];
    let mut stmt_parents = vec![None; module.stmts.len()];

    let mut stmt_stack: Vec<(StmtId, Option<StmtId>)> =
        module.body.iter().rev().map(|&id| (id, None)).collect();
    while let Some((stmt, parent)) = stmt_stack.pop() {
        stmt_parents[stmt.idx()] = parent;

        let mut expr_stack: Vec<(ExprId, NodeId)> = stmt_exprs(module, stmt)
            .into_iter()
            .map(|expr| (expr, NodeId::Stmt(stmt)))
            .collect();
        while let Some((expr, parent)) = expr_stack.pop() {
            expr_parents[expr.idx()] = Some(parent);
            expr_stack.extend(
                expr_children(module, expr)
                    .into_iter()
                    .map(|child| (child, NodeId::Expr(expr))),
            );
        }

        stmt_stack.extend(
            stmt_children(module, stmt)
                .into_iter()
                .rev()
                .map(|child| (child, Some(stmt))),
        );
    }

    module.expr_parents = expr_parents;
    module.stmt_parents = stmt_parents;
}

struct Parser<'a> {
    text: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    /// End offset of the last consumed non-layout token.
    last_end: usize,
    depth: usize,
    stmts: Arena<Stmt>,
    exprs: Arena<Expr>,
    errors: Vec<ParseError>,
}

impl<'a> Parser<'a> {
    fn new(text: &'a str, tokens: Vec<Token>) -> Self {
        Self {
            text,
            tokens,
            pos: 0,
            last_end: 0,
            depth: 0,
            stmts: Arena::default(),
            exprs: Arena::default(),
            errors: Vec::new(),
        }
    }

    // ---- token helpers -------------------------------------------------

    fn nth(&self, n: usize) -> Token {
        match self.tokens.get(self.pos + n) {
            Some(token) => *token,
            None => {
                let end = self.tokens.last().map_or(0, |t| t.range.end);
                Token {
                    kind: TokenKind::EndOfFile,
                    range: TextRange::new(end, end),
                }
            }
        }
    }

    fn current(&self) -> Token {
        self.nth(0)
    }

    fn peek(&self) -> TokenKind {
        self.nth(0).kind
    }

    fn at(&self, kind: TokenKind) -> bool {
        self.peek() == kind
    }

    fn at_kw(&self, kw: Keyword) -> bool {
        self.peek() == TokenKind::Keyword(kw)
    }

    fn bump(&mut self) -> Token {
        let token = self.current();
        if token.kind != TokenKind::EndOfFile {
            self.pos += 1;
            if !matches!(
                token.kind,
                TokenKind::Newline | TokenKind::Indent | TokenKind::Dedent
            ) {
                self.last_end = token.range.end;
            }
        }
        token
    }

    fn eat(&mut self, kind: TokenKind) -> Option<Token> {
        if self.at(kind) {
            Some(self.bump())
        } else {
            None
        }
    }

    fn eat_kw(&mut self, kw: Keyword) -> Option<Token> {
        self.eat(TokenKind::Keyword(kw))
    }

    fn expect(&mut self, kind: TokenKind, what: &str) -> Option<Token> {
        if let Some(token) = self.eat(kind) {
            return Some(token);
        }
        self.error_here(format!("expected {what}"));
        None
    }

    fn error_here(&mut self, message: impl Into<String>) {
        let range = self.current().range;
        self.errors.push(ParseError {
            message: message.into(),
            range,
        });
    }

    fn token_text(&self, token: Token) -> &'a str {
        let text = self.text;
        &text[token.range.start..token.range.end]
    }

    fn alloc_expr(&mut self, expr: Expr) -> ExprId {
        ExprId::from_raw(self.exprs.alloc(expr))
    }

    fn alloc_stmt(&mut self, stmt: Stmt) -> StmtId {
        StmtId::from_raw(self.stmts.alloc(stmt))
    }

    fn expr_range(&self, id: ExprId) -> TextRange {
        self.exprs[id].range()
    }

    fn range_from(&self, start: usize) -> TextRange {
        TextRange::new(start, self.last_end.max(start))
    }

    fn can_start_expr(&self) -> bool {
        match self.peek() {
            TokenKind::Name
            | TokenKind::Number
            | TokenKind::String
            | TokenKind::FString
            | TokenKind::LParen
            | TokenKind::LBracket
            | TokenKind::LBrace
            | TokenKind::Minus
            | TokenKind::Plus
            | TokenKind::Tilde
            | TokenKind::Star
            | TokenKind::Ellipsis => true,
            TokenKind::Keyword(kw) => matches!(
                kw,
                Keyword::Not
                    | Keyword::Lambda
                    | Keyword::Await
                    | Keyword::None
                    | Keyword::True
                    | Keyword::False
            ),
            _ => false,
        }
    }

    /// Skips the rest of the logical line, leaving the `Newline` in place.
    fn recover_to_newline(&mut self) {
        while !matches!(self.peek(), TokenKind::Newline | TokenKind::EndOfFile) {
            self.bump();
        }
    }

    // ---- statements ----------------------------------------------------

    fn module_body(&mut self) -> Vec<StmtId> {
        let mut body = Vec::new();
        while !self.at(TokenKind::EndOfFile) {
            match self.peek() {
                TokenKind::Newline | TokenKind::Dedent => {
                    self.bump();
                }
                TokenKind::Indent => {
                    self.error_here("unexpected indent");
                    self.bump();
                }
                _ => {
                    let before = self.pos;
                    self.statement(&mut body);
                    if self.pos == before {
                        self.bump();
                    }
                }
            }
        }
        body
    }

    fn statement(&mut self, out: &mut Vec<StmtId>) {
        let stmt = match self.peek() {
            TokenKind::Keyword(Keyword::If) => self.if_stmt(),
            TokenKind::Keyword(Keyword::While) => self.while_stmt(),
            TokenKind::Keyword(Keyword::For) => self.for_stmt(None),
            TokenKind::Keyword(Keyword::Try) => self.try_stmt(),
            TokenKind::Keyword(Keyword::With) => self.with_stmt(None),
            TokenKind::Keyword(Keyword::Def) => self.function_def(Vec::new(), None),
            TokenKind::Keyword(Keyword::Class) => self.class_def(Vec::new(), None),
            TokenKind::At => self.decorated(),
            TokenKind::Keyword(Keyword::Async)
                if matches!(
                    self.nth(1).kind,
                    TokenKind::Keyword(Keyword::Def | Keyword::For | Keyword::With)
                ) =>
            {
                let start = self.bump().range.start;
                match self.peek() {
                    TokenKind::Keyword(Keyword::Def) => {
                        self.function_def_inner(Vec::new(), start, true)
                    }
                    TokenKind::Keyword(Keyword::For) => self.for_stmt(Some(start)),
                    _ => self.with_stmt(Some(start)),
                }
            }
            _ => {
                self.simple_stmts(out);
                return;
            }
        };
        out.push(stmt);
    }

    fn simple_stmts(&mut self, out: &mut Vec<StmtId>) {
        loop {
            let before = self.pos;
            let stmt = self.small_stmt();
            out.push(stmt);
            if self.pos == before {
                self.bump();
            }
            if self.eat(TokenKind::Semicolon).is_none() {
                break;
            }
            if matches!(self.peek(), TokenKind::Newline | TokenKind::EndOfFile) {
                break;
            }
        }

        if self.eat(TokenKind::Newline).is_none() && !self.at(TokenKind::EndOfFile) {
            self.error_here("expected end of statement");
            self.recover_to_newline();
            self.eat(TokenKind::Newline);
        }
    }

    fn small_stmt(&mut self) -> StmtId {
        let start = self.current().range.start;
        match self.peek() {
            TokenKind::Keyword(Keyword::Pass) => {
                let range = self.bump().range;
                self.alloc_stmt(Stmt::Pass { range })
            }
            TokenKind::Keyword(Keyword::Break) => {
                let range = self.bump().range;
                self.alloc_stmt(Stmt::Break { range })
            }
            TokenKind::Keyword(Keyword::Continue) => {
                let range = self.bump().range;
                self.alloc_stmt(Stmt::Continue { range })
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.bump();
                let value = self
                    .can_start_expr()
                    .then(|| self.testlist_star_expr());
                let range = self.range_from(start);
                self.alloc_stmt(Stmt::Return { value, range })
            }
            TokenKind::Keyword(Keyword::Del) => {
                self.bump();
                let target = self.exprlist();
                self.set_ctx(target, ExprContext::Del);
                let targets = match &self.exprs[target] {
                    Expr::Tuple {
                        elts,
                        parenthesized: false,
                        ..
                    } => elts.clone(),
                    _ => vec![target],
                };
                let range = self.range_from(start);
                self.alloc_stmt(Stmt::Delete { targets, range })
            }
            TokenKind::Keyword(Keyword::Global) | TokenKind::Keyword(Keyword::Nonlocal) => {
                let is_global = self.at_kw(Keyword::Global);
                self.bump();
                let mut names = Vec::new();
                loop {
                    match self.eat(TokenKind::Name) {
                        Some(token) => names.push(Ident {
                            name: self.token_text(token).to_string(),
                            range: token.range,
                        }),
                        None => {
                            self.error_here("expected name");
                            break;
                        }
                    }
                    if self.eat(TokenKind::Comma).is_none() {
                        break;
                    }
                }
                let range = self.range_from(start);
                if is_global {
                    self.alloc_stmt(Stmt::Global { names, range })
                } else {
                    self.alloc_stmt(Stmt::Nonlocal { names, range })
                }
            }
            TokenKind::Keyword(Keyword::Import) => self.import_stmt(),
            TokenKind::Keyword(Keyword::From) => self.import_from_stmt(),
            TokenKind::Keyword(Keyword::Raise) => {
                self.bump();
                let mut exc = None;
                let mut cause = None;
                if self.can_start_expr() {
                    exc = Some(self.test());
                    if self.eat_kw(Keyword::From).is_some() {
                        cause = Some(self.test());
                    }
                }
                let range = self.range_from(start);
                self.alloc_stmt(Stmt::Raise { exc, cause, range })
            }
            TokenKind::Keyword(Keyword::Assert) => {
                self.bump();
                let test = self.test();
                let msg = self.eat(TokenKind::Comma).map(|_| self.test());
                let range = self.range_from(start);
                self.alloc_stmt(Stmt::Assert { test, msg, range })
            }
            _ => self.expr_stmt(),
        }
    }

    fn expr_stmt(&mut self) -> StmtId {
        let start = self.current().range.start;
        if !self.can_start_expr() && !self.at_kw(Keyword::Yield) {
            self.error_here("expected statement");
            self.recover_to_newline();
            let range = TextRange::new(start, self.last_end.max(start));
            return self.alloc_stmt(Stmt::Error { range });
        }

        let first = if self.at_kw(Keyword::Yield) {
            self.yield_expr()
        } else {
            self.testlist_star_expr()
        };

        if self.eat(TokenKind::Colon).is_some() {
            self.set_ctx(first, ExprContext::Store);
            let annotation = self.test();
            let value = self.eat(TokenKind::Equal).map(|_| self.assign_rhs());
            let range = self.range_from(start);
            return self.alloc_stmt(Stmt::AnnAssign {
                target: first,
                annotation,
                value,
                range,
            });
        }

        if let Some(op) = aug_assign_op(self.peek()) {
            self.bump();
            self.set_ctx(first, ExprContext::Store);
            let value = self.assign_rhs();
            let range = self.range_from(start);
            return self.alloc_stmt(Stmt::AugAssign {
                target: first,
                op,
                value,
                range,
            });
        }

        if self.at(TokenKind::Equal) {
            let mut chain = vec![first];
            while self.eat(TokenKind::Equal).is_some() {
                chain.push(self.assign_rhs());
            }
            let value = chain.pop().unwrap_or(first);
            for &target in &chain {
                self.set_ctx(target, ExprContext::Store);
            }
            let range = self.range_from(start);
            return self.alloc_stmt(Stmt::Assign {
                targets: chain,
                value,
                range,
            });
        }

        let range = self.range_from(start);
        self.alloc_stmt(Stmt::Expr { value: first, range })
    }

    fn assign_rhs(&mut self) -> ExprId {
        if self.at_kw(Keyword::Yield) {
            self.yield_expr()
        } else {
            self.testlist_star_expr()
        }
    }

    fn dotted_name(&mut self) -> Option<(String, TextRange)> {
        let first = self.eat(TokenKind::Name)?;
        let mut name = self.token_text(first).to_string();
        let mut range = first.range;
        while self.at(TokenKind::Dot) && self.nth(1).kind == TokenKind::Name {
            self.bump();
            let part = self.bump();
            name.push('.');
            name.push_str(self.token_text(part));
            range = TextRange::new(range.start, part.range.end);
        }
        Some((name, range))
    }

    fn alias(&mut self, dotted: bool) -> Option<Alias> {
        let (name, name_range) = if dotted {
            self.dotted_name()?
        } else {
            let token = self.eat(TokenKind::Name)?;
            (self.token_text(token).to_string(), token.range)
        };
        let asname = if self.eat_kw(Keyword::As).is_some() {
            match self.eat(TokenKind::Name) {
                Some(token) => Some(Ident {
                    name: self.token_text(token).to_string(),
                    range: token.range,
                }),
                None => {
                    self.error_here("expected name after `as`");
                    None
                }
            }
        } else {
            None
        };
        Some(Alias {
            name,
            asname,
            range: self.range_from(name_range.start),
        })
    }

    fn import_stmt(&mut self) -> StmtId {
        let start = self.bump().range.start;
        let mut names = Vec::new();
        loop {
            match self.alias(true) {
                Some(alias) => names.push(alias),
                None => {
                    self.error_here("expected module name");
                    break;
                }
            }
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::Import { names, range })
    }

    fn import_from_stmt(&mut self) -> StmtId {
        let start = self.bump().range.start;
        let mut level = 0u32;
        loop {
            if self.eat(TokenKind::Dot).is_some() {
                level += 1;
            } else if self.eat(TokenKind::Ellipsis).is_some() {
                level += 3;
            } else {
                break;
            }
        }
        let module = self.dotted_name().map(|(name, _)| name);
        if module.is_none() && level == 0 {
            self.error_here("expected module name");
        }
        self.expect(TokenKind::Keyword(Keyword::Import), "`import`");

        let mut names = Vec::new();
        let mut is_star = false;
        if self.eat(TokenKind::Star).is_some() {
            is_star = true;
        } else {
            let parenthesized = self.eat(TokenKind::LParen).is_some();
            loop {
                match self.alias(false) {
                    Some(alias) => names.push(alias),
                    None => break,
                }
                if self.eat(TokenKind::Comma).is_none() {
                    break;
                }
            }
            if names.is_empty() {
                self.error_here("expected imported name");
            }
            if parenthesized {
                self.expect(TokenKind::RParen, "`)`");
            }
        }
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::ImportFrom {
            module,
            level,
            names,
            is_star,
            range,
        })
    }

    /// Parses `: <suite>`.
    fn block(&mut self) -> Vec<StmtId> {
        let mut body = Vec::new();
        if self.expect(TokenKind::Colon, "`:`").is_none() {
            self.recover_to_newline();
            self.eat(TokenKind::Newline);
            if self.eat(TokenKind::Indent).is_some() {
                self.skip_indented_block();
            }
            return body;
        }
        if self.eat(TokenKind::Newline).is_some() {
            if self.eat(TokenKind::Indent).is_none() {
                self.error_here("expected an indented block");
                return body;
            }
            if self.depth >= MAX_NESTING {
                self.error_here("block is nested too deeply");
                self.skip_indented_block();
                return body;
            }
            self.depth += 1;
            while !matches!(self.peek(), TokenKind::Dedent | TokenKind::EndOfFile) {
                if self.eat(TokenKind::Newline).is_some() {
                    continue;
                }
                if self.at(TokenKind::Indent) {
                    self.error_here("unexpected indent");
                    self.bump();
                    continue;
                }
                let before = self.pos;
                self.statement(&mut body);
                if self.pos == before {
                    self.bump();
                }
            }
            self.depth -= 1;
            self.eat(TokenKind::Dedent);
        } else {
            self.simple_stmts(&mut body);
        }
        body
    }

    /// Skips to just past the `Dedent` closing the block whose `Indent` was consumed.
    fn skip_indented_block(&mut self) {
        let mut level = 1usize;
        while level > 0 && !self.at(TokenKind::EndOfFile) {
            match self.bump().kind {
                TokenKind::Indent => level += 1,
                TokenKind::Dedent => level -= 1,
                _ => {}
            }
        }
    }

    fn if_stmt(&mut self) -> StmtId {
        let keyword = self.bump();
        let is_elif = keyword.kind == TokenKind::Keyword(Keyword::Elif);
        let start = keyword.range.start;
        let test = self.namedexpr_test();
        let body = self.block();
        let orelse = if self.at_kw(Keyword::Elif) {
            vec![self.if_stmt()]
        } else if self.eat_kw(Keyword::Else).is_some() {
            self.block()
        } else {
            Vec::new()
        };
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::If {
            test,
            body,
            orelse,
            is_elif,
            range,
        })
    }

    fn while_stmt(&mut self) -> StmtId {
        let start = self.bump().range.start;
        let test = self.namedexpr_test();
        let body = self.block();
        let orelse = if self.eat_kw(Keyword::Else).is_some() {
            self.block()
        } else {
            Vec::new()
        };
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::While {
            test,
            body,
            orelse,
            range,
        })
    }

    fn for_stmt(&mut self, async_start: Option<usize>) -> StmtId {
        let for_start = self.bump().range.start;
        let start = async_start.unwrap_or(for_start);
        let target = self.exprlist();
        self.set_ctx(target, ExprContext::Store);
        self.expect(TokenKind::Keyword(Keyword::In), "`in`");
        let iter = self.testlist_star_expr();
        let body = self.block();
        let orelse = if self.eat_kw(Keyword::Else).is_some() {
            self.block()
        } else {
            Vec::new()
        };
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::For {
            is_async: async_start.is_some(),
            target,
            iter,
            body,
            orelse,
            range,
        })
    }

    fn try_stmt(&mut self) -> StmtId {
        let start = self.bump().range.start;
        let body = self.block();
        let mut handlers = Vec::new();
        while self.at_kw(Keyword::Except) {
            let handler_start = self.bump().range.start;
            self.eat(TokenKind::Star);
            let mut type_ = None;
            let mut name = None;
            if !self.at(TokenKind::Colon) {
                type_ = Some(self.test());
                if self.eat_kw(Keyword::As).is_some() {
                    match self.eat(TokenKind::Name) {
                        Some(token) => {
                            name = Some(Ident {
                                name: self.token_text(token).to_string(),
                                range: token.range,
                            });
                        }
                        None => self.error_here("expected name after `as`"),
                    }
                }
            }
            let handler_body = self.block();
            handlers.push(ExceptHandler {
                type_,
                name,
                body: handler_body,
                range: self.range_from(handler_start),
            });
        }
        let orelse = if self.eat_kw(Keyword::Else).is_some() {
            self.block()
        } else {
            Vec::new()
        };
        let finalbody = if self.eat_kw(Keyword::Finally).is_some() {
            self.block()
        } else {
            Vec::new()
        };
        if handlers.is_empty() && finalbody.is_empty() {
            self.error_here("expected `except` or `finally` block");
        }
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::Try {
            body,
            handlers,
            orelse,
            finalbody,
            range,
        })
    }

    fn with_stmt(&mut self, async_start: Option<usize>) -> StmtId {
        let with_start = self.bump().range.start;
        let start = async_start.unwrap_or(with_start);
        let mut items = Vec::new();
        loop {
            let context = self.test();
            let target = if self.eat_kw(Keyword::As).is_some() {
                let target = self.star_or_bitor();
                self.set_ctx(target, ExprContext::Store);
                Some(target)
            } else {
                None
            };
            items.push(WithItem { context, target });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        let body = self.block();
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::With {
            is_async: async_start.is_some(),
            items,
            body,
            range,
        })
    }

    fn decorated(&mut self) -> StmtId {
        let start = self.current().range.start;
        let mut decorators = Vec::new();
        while self.eat(TokenKind::At).is_some() {
            decorators.push(self.namedexpr_test());
            if self.eat(TokenKind::Newline).is_none() {
                self.error_here("expected newline after decorator");
                self.recover_to_newline();
                self.eat(TokenKind::Newline);
            }
        }
        match self.peek() {
            TokenKind::Keyword(Keyword::Def) => self.function_def(decorators, Some(start)),
            TokenKind::Keyword(Keyword::Class) => self.class_def(decorators, Some(start)),
            TokenKind::Keyword(Keyword::Async)
                if self.nth(1).kind == TokenKind::Keyword(Keyword::Def) =>
            {
                self.bump();
                self.function_def_inner(decorators, start, true)
            }
            _ => {
                self.error_here("expected `def` or `class` after decorator");
                let range = self.range_from(start);
                self.alloc_stmt(Stmt::Error { range })
            }
        }
    }

    fn function_def(&mut self, decorators: Vec<ExprId>, start: Option<usize>) -> StmtId {
        let start = start.unwrap_or(self.current().range.start);
        self.function_def_inner(decorators, start, false)
    }

    fn function_def_inner(
        &mut self,
        decorators: Vec<ExprId>,
        start: usize,
        is_async: bool,
    ) -> StmtId {
        self.expect(TokenKind::Keyword(Keyword::Def), "`def`");
        let name = self.ident_or_missing();
        let params = if self.at(TokenKind::LParen) {
            self.parameters()
        } else {
            self.error_here("expected `(`");
            let at = self.current().range.start;
            Parameters {
                params: Vec::new(),
                range: TextRange::new(at, at),
            }
        };
        let returns = self.eat(TokenKind::Arrow).map(|_| self.test());
        let body = self.block();
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::FunctionDef(FunctionDef {
            name,
            decorators,
            params,
            returns,
            body,
            is_async,
            range,
        }))
    }

    fn class_def(&mut self, decorators: Vec<ExprId>, start: Option<usize>) -> StmtId {
        let start = start.unwrap_or(self.current().range.start);
        self.bump();
        let name = self.ident_or_missing();
        let bases = if self.eat(TokenKind::LParen).is_some() {
            let args = self.call_args();
            self.expect(TokenKind::RParen, "`)`");
            args
        } else {
            Vec::new()
        };
        let body = self.block();
        let range = self.range_from(start);
        self.alloc_stmt(Stmt::ClassDef(ClassDef {
            name,
            decorators,
            bases,
            body,
            range,
        }))
    }

    fn ident_or_missing(&mut self) -> Ident {
        match self.eat(TokenKind::Name) {
            Some(token) => Ident {
                name: self.token_text(token).to_string(),
                range: token.range,
            },
            None => {
                self.error_here("expected name");
                let at = self.current().range.start;
                Ident {
                    name: String::new(),
                    range: TextRange::new(at, at),
                }
            }
        }
    }

    fn parameters(&mut self) -> Parameters {
        let open = self.bump();
        let params = self.param_list(TokenKind::RParen, true);
        let end = match self.expect(TokenKind::RParen, "`)`") {
            Some(token) => token.range.end,
            None => self.last_end,
        };
        Parameters {
            params,
            range: TextRange::new(open.range.start, end.max(open.range.end)),
        }
    }

    fn param_list(&mut self, terminator: TokenKind, annotations: bool) -> Vec<Param> {
        let mut params = Vec::new();
        while !self.at(terminator) && !self.at(TokenKind::EndOfFile) {
            let start = self.current().range.start;
            let (kind, name) = match self.peek() {
                TokenKind::Slash => {
                    self.bump();
                    (ParamKind::PositionalOnlyMarker, None)
                }
                TokenKind::Star => {
                    self.bump();
                    match self.eat(TokenKind::Name) {
                        Some(token) => (
                            ParamKind::VarPositional,
                            Some(Ident {
                                name: self.token_text(token).to_string(),
                                range: token.range,
                            }),
                        ),
                        None => (ParamKind::KeywordOnlyMarker, None),
                    }
                }
                TokenKind::DoubleStar => {
                    self.bump();
                    (ParamKind::VarKeyword, Some(self.ident_or_missing()))
                }
                TokenKind::Name => {
                    let token = self.bump();
                    (
                        ParamKind::Regular,
                        Some(Ident {
                            name: self.token_text(token).to_string(),
                            range: token.range,
                        }),
                    )
                }
                _ => {
                    self.error_here("expected parameter");
                    break;
                }
            };

            let annotation = if annotations && name.is_some() {
                self.eat(TokenKind::Colon).map(|_| self.test())
            } else {
                None
            };
            let default = if kind == ParamKind::Regular {
                self.eat(TokenKind::Equal).map(|_| self.test())
            } else {
                None
            };
            params.push(Param {
                kind,
                name,
                annotation,
                default,
                range: self.range_from(start),
            });
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        params
    }

    // ---- expressions ---------------------------------------------------

    /// `a, *b, c` (a tuple if there is a comma).
    fn testlist_star_expr(&mut self) -> ExprId {
        let first = self.star_or_namedexpr();
        if !self.at(TokenKind::Comma) {
            return first;
        }
        let start = self.expr_range(first).start;
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if !self.can_start_expr() {
                break;
            }
            elts.push(self.star_or_namedexpr());
        }
        let range = self.range_from(start);
        self.alloc_expr(Expr::Tuple {
            elts,
            ctx: ExprContext::Load,
            parenthesized: false,
            range,
        })
    }

    /// Targets of `for`/`del`/comprehensions: stops before `in`.
    fn exprlist(&mut self) -> ExprId {
        let first = self.star_or_bitor();
        if !self.at(TokenKind::Comma) {
            return first;
        }
        let start = self.expr_range(first).start;
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if !self.can_start_expr() {
                break;
            }
            elts.push(self.star_or_bitor());
        }
        let range = self.range_from(start);
        self.alloc_expr(Expr::Tuple {
            elts,
            ctx: ExprContext::Load,
            parenthesized: false,
            range,
        })
    }

    fn star_or_bitor(&mut self) -> ExprId {
        if self.at(TokenKind::Star) {
            let start = self.bump().range.start;
            let value = self.binary(0);
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Starred {
                value,
                ctx: ExprContext::Load,
                range,
            });
        }
        self.binary(0)
    }

    fn star_or_namedexpr(&mut self) -> ExprId {
        if self.at(TokenKind::Star) {
            let start = self.bump().range.start;
            let value = self.binary(0);
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Starred {
                value,
                ctx: ExprContext::Load,
                range,
            });
        }
        self.namedexpr_test()
    }

    fn namedexpr_test(&mut self) -> ExprId {
        if self.at(TokenKind::Name) && self.nth(1).kind == TokenKind::ColonEqual {
            let token = self.bump();
            let target = self.alloc_expr(Expr::Name {
                id: self.token_text(token).to_string(),
                ctx: ExprContext::Store,
                range: token.range,
            });
            self.bump();
            let value = self.test();
            let range = self.range_from(token.range.start);
            return self.alloc_expr(Expr::NamedExpr {
                target,
                value,
                range,
            });
        }
        self.test()
    }

    fn test(&mut self) -> ExprId {
        if self.depth >= MAX_NESTING {
            self.error_here("expression is nested too deeply");
            let range = self.current().range;
            if !matches!(self.peek(), TokenKind::Newline | TokenKind::EndOfFile) {
                self.bump();
            }
            return self.alloc_expr(Expr::Missing { range });
        }
        self.depth += 1;
        let expr = self.test_inner();
        self.depth -= 1;
        expr
    }

    fn test_inner(&mut self) -> ExprId {
        if self.at_kw(Keyword::Lambda) {
            return self.lambda();
        }
        let body = self.or_test();
        if self.at_kw(Keyword::If) {
            self.bump();
            let test = self.or_test();
            self.expect(TokenKind::Keyword(Keyword::Else), "`else`");
            let orelse = self.test();
            let range = self.range_from(self.expr_range(body).start);
            return self.alloc_expr(Expr::IfExp {
                test,
                body,
                orelse,
                range,
            });
        }
        body
    }

    fn lambda(&mut self) -> ExprId {
        let keyword = self.bump();
        let params_start = self.current().range.start;
        let params = self.param_list(TokenKind::Colon, false);
        let params_range = TextRange::new(params_start, self.last_end.max(params_start));
        self.expect(TokenKind::Colon, "`:`");
        let body = self.test();
        let range = self.range_from(keyword.range.start);
        self.alloc_expr(Expr::Lambda {
            params: Parameters {
                params,
                range: params_range,
            },
            body,
            range,
        })
    }

    fn or_test(&mut self) -> ExprId {
        self.bool_op(Keyword::Or)
    }

    fn bool_op(&mut self, kw: Keyword) -> ExprId {
        let first = if kw == Keyword::Or {
            self.bool_op(Keyword::And)
        } else {
            self.not_test()
        };
        if !self.at_kw(kw) {
            return first;
        }
        let mut values = vec![first];
        while self.eat_kw(kw).is_some() {
            let next = if kw == Keyword::Or {
                self.bool_op(Keyword::And)
            } else {
                self.not_test()
            };
            values.push(next);
        }
        let op = if kw == Keyword::Or {
            BoolOp::Or
        } else {
            BoolOp::And
        };
        let range = self.range_from(self.expr_range(first).start);
        self.alloc_expr(Expr::BoolOp { op, values, range })
    }

    fn not_test(&mut self) -> ExprId {
        if self.at_kw(Keyword::Not) {
            if self.depth >= MAX_NESTING {
                return self.test();
            }
            let start = self.bump().range.start;
            self.depth += 1;
            let operand = self.not_test();
            self.depth -= 1;
            let range = self.range_from(start);
            return self.alloc_expr(Expr::UnaryOp {
                op: UnaryOp::Not,
                operand,
                range,
            });
        }
        self.comparison()
    }

    fn comparison_op(&mut self) -> Option<CmpOp> {
        let op = match self.peek() {
            TokenKind::Less => CmpOp::Lt,
            TokenKind::Greater => CmpOp::Gt,
            TokenKind::EqEqual => CmpOp::Eq,
            TokenKind::GreaterEqual => CmpOp::GtE,
            TokenKind::LessEqual => CmpOp::LtE,
            TokenKind::NotEqual => CmpOp::NotEq,
            TokenKind::Keyword(Keyword::In) => CmpOp::In,
            TokenKind::Keyword(Keyword::Not)
                if self.nth(1).kind == TokenKind::Keyword(Keyword::In) =>
            {
                self.bump();
                CmpOp::NotIn
            }
            TokenKind::Keyword(Keyword::Is) => {
                self.bump();
                return Some(if self.eat_kw(Keyword::Not).is_some() {
                    CmpOp::IsNot
                } else {
                    CmpOp::Is
                });
            }
            _ => return None,
        };
        self.bump();
        Some(op)
    }

    fn comparison(&mut self) -> ExprId {
        let left = self.binary(0);
        let mut ops = Vec::new();
        let mut comparators = Vec::new();
        while let Some(op) = self.comparison_op() {
            ops.push(op);
            comparators.push(self.binary(0));
        }
        if ops.is_empty() {
            return left;
        }
        let range = self.range_from(self.expr_range(left).start);
        self.alloc_expr(Expr::Compare {
            left,
            ops,
            comparators,
            range,
        })
    }

    fn binary(&mut self, min_prec: u8) -> ExprId {
        let mut left = self.factor();
        while let Some((op, prec)) = binary_op(self.peek()) {
            if prec < min_prec {
                break;
            }
            self.bump();
            let right = self.binary(prec + 1);
            let range = self.range_from(self.expr_range(left).start);
            left = self.alloc_expr(Expr::BinOp {
                left,
                op,
                right,
                range,
            });
        }
        left
    }

    fn factor(&mut self) -> ExprId {
        if self.depth >= MAX_NESTING {
            return self.test();
        }
        let op = match self.peek() {
            TokenKind::Plus => UnaryOp::UAdd,
            TokenKind::Minus => UnaryOp::USub,
            TokenKind::Tilde => UnaryOp::Invert,
            _ => return self.power(),
        };
        self.depth += 1;
        let start = self.bump().range.start;
        let operand = self.factor();
        self.depth -= 1;
        let range = self.range_from(start);
        self.alloc_expr(Expr::UnaryOp { op, operand, range })
    }

    fn power(&mut self) -> ExprId {
        let base = if self.at_kw(Keyword::Await) {
            let start = self.bump().range.start;
            let value = self.primary();
            let range = self.range_from(start);
            self.alloc_expr(Expr::Await { value, range })
        } else {
            self.primary()
        };
        if self.eat(TokenKind::DoubleStar).is_some() {
            self.depth += 1;
            let right = self.factor();
            self.depth -= 1;
            let range = self.range_from(self.expr_range(base).start);
            return self.alloc_expr(Expr::BinOp {
                left: base,
                op: BinaryOp::Pow,
                right,
                range,
            });
        }
        base
    }

    fn primary(&mut self) -> ExprId {
        let mut expr = self.atom();
        loop {
            let start = self.expr_range(expr).start;
            match self.peek() {
                TokenKind::LParen => {
                    self.bump();
                    let args = self.call_args();
                    self.expect(TokenKind::RParen, "`)`");
                    let range = self.range_from(start);
                    expr = self.alloc_expr(Expr::Call {
                        func: expr,
                        args,
                        range,
                    });
                }
                TokenKind::LBracket => {
                    self.bump();
                    let slice = self.subscript_list();
                    self.expect(TokenKind::RBracket, "`]`");
                    let range = self.range_from(start);
                    expr = self.alloc_expr(Expr::Subscript {
                        value: expr,
                        slice,
                        ctx: ExprContext::Load,
                        range,
                    });
                }
                TokenKind::Dot => {
                    self.bump();
                    let attr = self.ident_or_missing();
                    let range = self.range_from(start);
                    expr = self.alloc_expr(Expr::Attribute {
                        value: expr,
                        attr,
                        ctx: ExprContext::Load,
                        range,
                    });
                }
                _ => break,
            }
        }
        expr
    }

    fn call_args(&mut self) -> Vec<Arg> {
        let mut args = Vec::new();
        while !matches!(self.peek(), TokenKind::RParen | TokenKind::EndOfFile) {
            let start = self.current().range.start;
            let arg = match self.peek() {
                TokenKind::Star => {
                    self.bump();
                    let value = self.test();
                    Arg {
                        kind: ArgKind::Star,
                        value,
                        range: self.range_from(start),
                    }
                }
                TokenKind::DoubleStar => {
                    self.bump();
                    let value = self.test();
                    Arg {
                        kind: ArgKind::DoubleStar,
                        value,
                        range: self.range_from(start),
                    }
                }
                TokenKind::Name if self.nth(1).kind == TokenKind::Equal => {
                    let token = self.bump();
                    let keyword = Ident {
                        name: self.token_text(token).to_string(),
                        range: token.range,
                    };
                    self.bump();
                    let value = self.test();
                    Arg {
                        kind: ArgKind::Keyword(keyword),
                        value,
                        range: self.range_from(start),
                    }
                }
                _ => {
                    let mut value = self.namedexpr_test();
                    if self.at_comprehension() {
                        let generators = self.comprehension_clauses();
                        let range = self.range_from(start);
                        value = self.alloc_expr(Expr::Comprehension {
                            kind: ComprehensionKind::Generator,
                            element: value,
                            value: None,
                            generators,
                            range,
                        });
                    }
                    Arg {
                        kind: ArgKind::Positional,
                        value,
                        range: self.range_from(start),
                    }
                }
            };
            args.push(arg);
            if self.eat(TokenKind::Comma).is_none() {
                break;
            }
        }
        args
    }

    fn subscript_list(&mut self) -> ExprId {
        let first = self.subscript_item();
        if !self.at(TokenKind::Comma) {
            return first;
        }
        let start = self.expr_range(first).start;
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RBracket) {
                break;
            }
            elts.push(self.subscript_item());
        }
        let range = self.range_from(start);
        self.alloc_expr(Expr::Tuple {
            elts,
            ctx: ExprContext::Load,
            parenthesized: false,
            range,
        })
    }

    fn subscript_item(&mut self) -> ExprId {
        let start = self.current().range.start;
        let lower = if self.at(TokenKind::Colon) {
            None
        } else {
            let expr = self.star_or_namedexpr();
            if !self.at(TokenKind::Colon) {
                return expr;
            }
            Some(expr)
        };
        self.bump();
        let slice_part = |this: &mut Self| {
            if this.can_start_expr() {
                Some(this.test())
            } else {
                None
            }
        };
        let upper = slice_part(self);
        let step = if self.eat(TokenKind::Colon).is_some() {
            slice_part(self)
        } else {
            None
        };
        let range = self.range_from(start);
        self.alloc_expr(Expr::Slice {
            lower,
            upper,
            step,
            range,
        })
    }

    fn at_comprehension(&self) -> bool {
        self.at_kw(Keyword::For)
            || (self.at_kw(Keyword::Async) && self.nth(1).kind == TokenKind::Keyword(Keyword::For))
    }

    fn comprehension_clauses(&mut self) -> Vec<Generator> {
        let mut generators = Vec::new();
        while self.at_comprehension() {
            let start = self.current().range.start;
            let is_async = self.eat_kw(Keyword::Async).is_some();
            self.bump();
            let target = self.exprlist();
            self.set_ctx(target, ExprContext::Store);
            self.expect(TokenKind::Keyword(Keyword::In), "`in`");
            let iter = self.or_test();
            let mut ifs = Vec::new();
            while self.eat_kw(Keyword::If).is_some() {
                ifs.push(self.or_test());
            }
            generators.push(Generator {
                target,
                iter,
                ifs,
                is_async,
                range: self.range_from(start),
            });
        }
        generators
    }

    fn yield_expr(&mut self) -> ExprId {
        let start = self.bump().range.start;
        if self.eat_kw(Keyword::From).is_some() {
            let value = self.test();
            let range = self.range_from(start);
            return self.alloc_expr(Expr::YieldFrom { value, range });
        }
        let value = self
            .can_start_expr()
            .then(|| self.testlist_star_expr());
        let range = self.range_from(start);
        self.alloc_expr(Expr::Yield { value, range })
    }

    fn atom(&mut self) -> ExprId {
        let token = self.current();
        match token.kind {
            TokenKind::Name => {
                self.bump();
                self.alloc_expr(Expr::Name {
                    id: self.token_text(token).to_string(),
                    ctx: ExprContext::Load,
                    range: token.range,
                })
            }
            TokenKind::Number => {
                self.bump();
                self.alloc_expr(Expr::Constant {
                    kind: ConstantKind::Number,
                    range: token.range,
                })
            }
            TokenKind::String | TokenKind::FString => self.strings(),
            TokenKind::Ellipsis => {
                self.bump();
                self.alloc_expr(Expr::Constant {
                    kind: ConstantKind::Ellipsis,
                    range: token.range,
                })
            }
            TokenKind::Keyword(kw @ (Keyword::None | Keyword::True | Keyword::False)) => {
                self.bump();
                let kind = match kw {
                    Keyword::None => ConstantKind::None,
                    Keyword::True => ConstantKind::True,
                    _ => ConstantKind::False,
                };
                self.alloc_expr(Expr::Constant {
                    kind,
                    range: token.range,
                })
            }
            TokenKind::LParen => self.paren_atom(),
            TokenKind::LBracket => self.list_atom(),
            TokenKind::LBrace => self.brace_atom(),
            _ => {
                self.error_here("expected expression");
                if !matches!(
                    token.kind,
                    TokenKind::RParen
                        | TokenKind::RBracket
                        | TokenKind::RBrace
                        | TokenKind::Newline
                        | TokenKind::Indent
                        | TokenKind::Dedent
                        | TokenKind::EndOfFile
                        | TokenKind::Comma
                        | TokenKind::Colon
                ) {
                    self.bump();
                }
                self.alloc_expr(Expr::Missing { range: token.range })
            }
        }
    }

    fn strings(&mut self) -> ExprId {
        let start = self.current().range.start;
        let mut kind = ConstantKind::Str;
        let mut fstring_parts = Vec::new();
        let mut any_fstring = false;
        while matches!(self.peek(), TokenKind::String | TokenKind::FString) {
            let token = self.bump();
            let text = self.token_text(token);
            if token.kind == TokenKind::FString {
                any_fstring = true;
                fstring_parts.push(token);
            } else if text
                .bytes()
                .take_while(|b| *b != b'"' && *b != b'\'')
                .any(|b| b == b'b' || b == b'B')
            {
                kind = ConstantKind::Bytes;
            }
        }
        let range = self.range_from(start);
        if !any_fstring {
            return self.alloc_expr(Expr::Constant { kind, range });
        }

        let mut values = Vec::new();
        for token in fstring_parts {
            for (field_start, field_end) in fstring_fields(self.text, token.range) {
                if let Some(expr) = self.parse_fragment(field_start, field_end) {
                    values.push(expr);
                }
            }
        }
        self.alloc_expr(Expr::FString { values, range })
    }

    /// Parses an expression embedded in an f-string replacement field.
    fn parse_fragment(&mut self, start: usize, end: usize) -> Option<ExprId> {
        let text = self.text;
        let fragment = &text[start..end];
        if fragment.trim().is_empty() || self.depth >= MAX_NESTING {
            return None;
        }
        let (tokens, errors) = lex_fragment(fragment, start);
        self.errors.extend(errors);

        let saved_tokens = std::mem::replace(&mut self.tokens, tokens);
        let saved_pos = std::mem::replace(&mut self.pos, 0);
        let saved_last_end = self.last_end;

        self.depth += 1;
        let expr = if self.at_kw(Keyword::Yield) {
            self.yield_expr()
        } else {
            self.testlist_star_expr()
        };
        self.depth -= 1;
        if !self.at(TokenKind::EndOfFile) {
            self.error_here("unexpected token in f-string expression");
        }

        self.tokens = saved_tokens;
        self.pos = saved_pos;
        self.last_end = saved_last_end;
        Some(expr)
    }

    /// Widens the range of a parenthesized expression to include its parentheses,
    /// so that its source text can be reused verbatim.
    fn set_range(&mut self, id: ExprId, range: TextRange) {
        if let Some(expr) = self.exprs.get_mut(id) {
            *expr.range_mut() = range;
        }
    }

    fn paren_atom(&mut self) -> ExprId {
        let start = self.bump().range.start;
        if self.eat(TokenKind::RParen).is_some() {
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Tuple {
                elts: Vec::new(),
                ctx: ExprContext::Load,
                parenthesized: true,
                range,
            });
        }
        if self.at_kw(Keyword::Yield) {
            let expr = self.yield_expr();
            self.expect(TokenKind::RParen, "`)`");
            let range = self.range_from(start);
            self.set_range(expr, range);
            return expr;
        }

        let first = self.star_or_namedexpr();
        if self.at_comprehension() {
            let generators = self.comprehension_clauses();
            self.expect(TokenKind::RParen, "`)`");
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Comprehension {
                kind: ComprehensionKind::Generator,
                element: first,
                value: None,
                generators,
                range,
            });
        }
        if !self.at(TokenKind::Comma) {
            self.expect(TokenKind::RParen, "`)`");
            let range = self.range_from(start);
            self.set_range(first, range);
            return first;
        }

        let mut elts = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RParen) {
                break;
            }
            let before = self.pos;
            elts.push(self.star_or_namedexpr());
            if self.pos == before {
                break;
            }
        }
        self.expect(TokenKind::RParen, "`)`");
        let range = self.range_from(start);
        self.alloc_expr(Expr::Tuple {
            elts,
            ctx: ExprContext::Load,
            parenthesized: true,
            range,
        })
    }

    fn list_atom(&mut self) -> ExprId {
        let start = self.bump().range.start;
        if self.eat(TokenKind::RBracket).is_some() {
            let range = self.range_from(start);
            return self.alloc_expr(Expr::List {
                elts: Vec::new(),
                ctx: ExprContext::Load,
                range,
            });
        }
        let first = self.star_or_namedexpr();
        if self.at_comprehension() {
            let generators = self.comprehension_clauses();
            self.expect(TokenKind::RBracket, "`]`");
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Comprehension {
                kind: ComprehensionKind::List,
                element: first,
                value: None,
                generators,
                range,
            });
        }
        let mut elts = vec![first];
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RBracket) {
                break;
            }
            let before = self.pos;
            elts.push(self.star_or_namedexpr());
            if self.pos == before {
                break;
            }
        }
        self.expect(TokenKind::RBracket, "`]`");
        let range = self.range_from(start);
        self.alloc_expr(Expr::List {
            elts,
            ctx: ExprContext::Load,
            range,
        })
    }

    fn brace_atom(&mut self) -> ExprId {
        let start = self.bump().range.start;
        if self.eat(TokenKind::RBrace).is_some() {
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Dict {
                items: Vec::new(),
                range,
            });
        }

        let first_is_unpack = self.at(TokenKind::DoubleStar);
        let first_key = if first_is_unpack {
            None
        } else {
            Some(self.star_or_namedexpr())
        };

        let is_dict = first_is_unpack || self.at(TokenKind::Colon);
        if !is_dict {
            let first = first_key.unwrap_or_else(|| self.star_or_namedexpr());
            if self.at_comprehension() {
                let generators = self.comprehension_clauses();
                self.expect(TokenKind::RBrace, "`}`");
                let range = self.range_from(start);
                return self.alloc_expr(Expr::Comprehension {
                    kind: ComprehensionKind::Set,
                    element: first,
                    value: None,
                    generators,
                    range,
                });
            }
            let mut elts = vec![first];
            while self.eat(TokenKind::Comma).is_some() {
                if self.at(TokenKind::RBrace) {
                    break;
                }
                let before = self.pos;
                elts.push(self.star_or_namedexpr());
                if self.pos == before {
                    break;
                }
            }
            self.expect(TokenKind::RBrace, "`}`");
            let range = self.range_from(start);
            return self.alloc_expr(Expr::Set { elts, range });
        }

        let mut items = Vec::new();
        let first_item = self.dict_item(first_key);
        if first_item.key.is_some() && self.at_comprehension() {
            let generators = self.comprehension_clauses();
            self.expect(TokenKind::RBrace, "`}`");
            let range = self.range_from(start);
            let element = first_item.key.unwrap_or(first_item.value);
            return self.alloc_expr(Expr::Comprehension {
                kind: ComprehensionKind::Dict,
                element,
                value: Some(first_item.value),
                generators,
                range,
            });
        }
        items.push(first_item);
        while self.eat(TokenKind::Comma).is_some() {
            if self.at(TokenKind::RBrace) {
                break;
            }
            let before = self.pos;
            let key = if self.at(TokenKind::DoubleStar) {
                None
            } else {
                Some(self.test())
            };
            items.push(self.dict_item(key));
            if self.pos == before {
                break;
            }
        }
        self.expect(TokenKind::RBrace, "`}`");
        let range = self.range_from(start);
        self.alloc_expr(Expr::Dict { items, range })
    }

    /// Parses the rest of a dict item whose key (if any) was already parsed.
    fn dict_item(&mut self, key: Option<ExprId>) -> DictItem {
        match key {
            Some(key) => {
                self.expect(TokenKind::Colon, "`:`");
                let value = self.test();
                DictItem {
                    key: Some(key),
                    value,
                }
            }
            None => {
                self.expect(TokenKind::DoubleStar, "`**`");
                let value = self.binary(0);
                DictItem { key: None, value }
            }
        }
    }

    fn set_ctx(&mut self, id: ExprId, ctx: ExprContext) {
        let mut stack = vec![id];
        while let Some(id) = stack.pop() {
            let Some(expr) = self.exprs.get_mut(id) else {
                continue;
            };
            match expr {
                Expr::Name { ctx: c, .. }
                | Expr::Attribute { ctx: c, .. }
                | Expr::Subscript { ctx: c, .. } => *c = ctx,
                Expr::Starred { ctx: c, value, .. } => {
                    *c = ctx;
                    stack.push(*value);
                }
                Expr::Tuple { ctx: c, elts, .. } | Expr::List { ctx: c, elts, .. } => {
                    *c = ctx;
                    stack.extend(elts.iter().copied());
                }
                Expr::Missing { .. } => {}
                other => {
                    let range = other.range();
                    let message = match ctx {
                        ExprContext::Del => "cannot delete expression",
                        _ => "cannot assign to expression",
                    };
                    self.errors.push(ParseError {
                        message: message.to_string(),
                        range,
                    });
                }
            }
        }
    }
}

fn aug_assign_op(kind: TokenKind) -> Option<BinaryOp> {
    let op = match kind {
        TokenKind::PlusEqual => BinaryOp::Add,
        TokenKind::MinusEqual => BinaryOp::Sub,
        TokenKind::StarEqual => BinaryOp::Mult,
        TokenKind::AtEqual => BinaryOp::MatMult,
        TokenKind::SlashEqual => BinaryOp::Div,
        TokenKind::DoubleSlashEqual => BinaryOp::FloorDiv,
        TokenKind::PercentEqual => BinaryOp::Mod,
        TokenKind::DoubleStarEqual => BinaryOp::Pow,
        TokenKind::LeftShiftEqual => BinaryOp::LShift,
        TokenKind::RightShiftEqual => BinaryOp::RShift,
        TokenKind::VbarEqual => BinaryOp::BitOr,
        TokenKind::CircumflexEqual => BinaryOp::BitXor,
        TokenKind::AmperEqual => BinaryOp::BitAnd,
        _ => return None,
    };
    Some(op)
}

/// Binary operators handled by precedence climbing, loosest first.
fn binary_op(kind: TokenKind) -> Option<(BinaryOp, u8)> {
    let op = match kind {
        TokenKind::Vbar => (BinaryOp::BitOr, 0),
        TokenKind::Circumflex => (BinaryOp::BitXor, 1),
        TokenKind::Amper => (BinaryOp::BitAnd, 2),
        TokenKind::LeftShift => (BinaryOp::LShift, 3),
        TokenKind::RightShift => (BinaryOp::RShift, 3),
        TokenKind::Plus => (BinaryOp::Add, 4),
        TokenKind::Minus => (BinaryOp::Sub, 4),
        TokenKind::Star => (BinaryOp::Mult, 5),
        TokenKind::At => (BinaryOp::MatMult, 5),
        TokenKind::Slash => (BinaryOp::Div, 5),
        TokenKind::DoubleSlash => (BinaryOp::FloorDiv, 5),
        TokenKind::Percent => (BinaryOp::Mod, 5),
        _ => return None,
    };
    Some(op)
}

/// Byte spans of the replacement-field expressions of one f-string token.
fn fstring_fields(text: &str, token: TextRange) -> Vec<(usize, usize)> {
    let literal = &text[token.start..token.end];
    let prefix_len = literal
        .bytes()
        .take_while(|b| *b != b'"' && *b != b'\'')
        .count();
    let Some(&quote) = literal.as_bytes().get(prefix_len) else {
        return Vec::new();
    };
    let quote_len = if literal[prefix_len..]
        .as_bytes()
        .starts_with(&[quote, quote, quote])
    {
        3
    } else {
        1
    };
    let body_start = token.start + prefix_len + quote_len;
    let mut body_end = token.end;
    let closing = &literal.as_bytes()[prefix_len + quote_len..];
    if closing.len() >= quote_len
        && closing[closing.len() - quote_len..]
            .iter()
            .all(|b| *b == quote)
    {
        body_end -= quote_len;
    }
    let mut out = Vec::new();
    if body_start <= body_end {
        scan_fields(text, body_start, body_end, false, &mut out);
    }
    out
}

/// Scans `text[start..end]` for `{...}` fields; returns the offset just after
/// the closing brace when `in_spec` is set and the enclosing field closes.
fn scan_fields(
    text: &str,
    start: usize,
    end: usize,
    in_spec: bool,
    out: &mut Vec<(usize, usize)>,
) -> usize {
    let bytes = text.as_bytes();
    let mut i = start;
    while i < end {
        match bytes[i] {
            b'{' if !in_spec && bytes.get(i + 1) == Some(&b'{') && i + 1 < end => i += 2,
            b'}' if !in_spec && bytes.get(i + 1) == Some(&b'}') && i + 1 < end => i += 2,
            b'}' if in_spec => return i + 1,
            b'{' => {
                let expr_start = i + 1;
                let expr_end = field_expr_end(bytes, expr_start, end);
                out.push((expr_start, expr_end));
                i = expr_end;
                if i < end && bytes[i] == b'=' {
                    i += 1;
                }
                if i < end && bytes[i] == b'!' {
                    while i < end && bytes[i] != b':' && bytes[i] != b'}' {
                        i += 1;
                    }
                }
                if i < end && bytes[i] == b':' {
                    i = scan_fields(text, i + 1, end, true, out);
                } else if i < end && bytes[i] == b'}' {
                    i += 1;
                }
            }
            _ => i += 1,
        }
    }
    end
}

/// Finds where the expression of a replacement field ends.
fn field_expr_end(bytes: &[u8], start: usize, end: usize) -> usize {
    let mut depth = 0usize;
    let mut in_string: Option<u8> = None;
    let mut i = start;
    while i < end {
        let b = bytes[i];
        if let Some(quote) = in_string {
            if b == b'\\' {
                i += 2;
                continue;
            }
            if b == quote {
                in_string = None;
            }
            i += 1;
            continue;
        }
        match b {
            b'\'' | b'"' => in_string = Some(b),
            b'(' | b'[' | b'{' => depth += 1,
            b')' | b']' => depth = depth.saturating_sub(1),
            b'}' if depth == 0 => return i,
            b'}' => depth -= 1,
            b'!' if depth == 0 && bytes.get(i + 1) != Some(&b'=') => return i,
            b':' if depth == 0 => return i,
            b'=' if depth == 0 => {
                let prev = if i > start { bytes[i - 1] } else { b' ' };
                let next = bytes.get(i + 1).copied().unwrap_or(b'}');
                if matches!(next, b'}' | b'!' | b':') && !matches!(prev, b'=' | b'!' | b'<' | b'>')
                {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    end.min(bytes.len())
}
