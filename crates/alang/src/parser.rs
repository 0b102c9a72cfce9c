//! Recursive-descent Pratt parser: token stream -> AST.
//!
//! Each precedence level in `parse_binary` delegates to the next tighter
//! level, bottoming out at `parse_unary` and `parse_postfix`. Statement
//! parsing collects every error it can recover from (via `synchronize`)
//! instead of stopping at the first one, matching the "report everything
//! found in one pass" shape used by IDE-facing tooling.

use std::rc::Rc;

use thiserror::Error;

use crate::ast::*;
use crate::lexer::{LexError, Lexer};
use crate::token::{Token, TokenKind};

#[derive(Debug, Clone, Error)]
#[error("{message} at line {line}, column {column}")]
pub struct ParseError {
    pub line: u32,
    pub column: u32,
    pub message: String,
}

impl From<LexError> for ParseError {
    fn from(e: LexError) -> Self {
        ParseError { line: e.line, column: e.column, message: e.message }
    }
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    errors: Vec<ParseError>,
}

type PResult<T> = Result<T, ParseError>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        Self { tokens, pos: 0, errors: Vec::new() }
    }

    /// Parses a full program. Returns every recoverable error collected
    /// during the pass; the caller decides whether any errors make the
    /// result unusable.
    pub fn parse_program(source: &str) -> Result<Vec<Stmt>, Vec<ParseError>> {
        let tokens = Lexer::tokenize(source).map_err(|e| vec![ParseError::from(e)])?;
        let mut parser = Self::new(tokens);
        let mut statements = Vec::new();
        while !parser.is_at_end() {
            match parser.declaration() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    parser.errors.push(e);
                    parser.synchronize();
                }
            }
        }
        if parser.errors.is_empty() {
            Ok(statements)
        } else {
            Err(parser.errors)
        }
    }

    // ---- token stream plumbing ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek_at(&self, offset: usize) -> &Token {
        let idx = (self.pos + offset).min(self.tokens.len() - 1);
        &self.tokens[idx]
    }

    fn previous(&self) -> &Token {
        &self.tokens[self.pos.saturating_sub(1)]
    }

    fn is_at_end(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn advance(&mut self) -> Token {
        if !self.is_at_end() {
            self.pos += 1;
        }
        self.previous().clone()
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(&self.peek().kind) == std::mem::discriminant(kind)
    }

    fn matches(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind, context: &str) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.error(format!("expected {context}, found {:?}", self.peek().kind)))
        }
    }

    fn error(&self, message: impl Into<String>) -> ParseError {
        let tok = self.peek();
        ParseError { line: tok.line, column: tok.column, message: message.into() }
    }

    fn check_identifier(&self) -> bool {
        matches!(self.peek().kind, TokenKind::Identifier)
    }

    fn expect_identifier(&mut self, context: &str) -> PResult<String> {
        if self.check_identifier() {
            Ok(self.advance().lexeme)
        } else {
            Err(self.error(format!("expected {context}, found {:?}", self.peek().kind)))
        }
    }

    /// Recovers to a statement boundary after a parse error, so later
    /// statements can still be checked in the same pass.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if self.previous().kind == TokenKind::Semicolon {
                return;
            }
            if matches!(
                self.peek().kind,
                TokenKind::Class
                    | TokenKind::Function
                    | TokenKind::Let
                    | TokenKind::Var
                    | TokenKind::Const
                    | TokenKind::For
                    | TokenKind::Foreach
                    | TokenKind::If
                    | TokenKind::While
                    | TokenKind::Return
                    | TokenKind::Import
                    | TokenKind::Interface
            ) {
                return;
            }
            self.advance();
        }
    }

    // ---- statements ----

    fn declaration(&mut self) -> PResult<Stmt> {
        let exported = self.matches(&TokenKind::Export);
        let decorators = self.parse_decorators()?;
        if !decorators.is_empty() {
            if self.matches(&TokenKind::Let) || self.matches(&TokenKind::Var) || self.matches(&TokenKind::Const) {
                return Err(self.error("decorators may not precede a variable declaration"));
            }
            if self.matches(&TokenKind::Interface) {
                return Err(self.error("decorators may not precede an interface declaration"));
            }
            if self.check(&TokenKind::Import) || self.check(&TokenKind::From) {
                return Err(self.error("decorators may not precede an import"));
            }
            if self.check(&TokenKind::Extends) {
                return Err(self.error("decorators may not precede an 'extends' block"));
            }
            if self.matches(&TokenKind::Class) {
                return self.class_declaration(exported, decorators);
            }
            return self.expect_function_statement(exported, decorators);
        }
        if self.matches(&TokenKind::Let) || self.matches(&TokenKind::Var) || self.matches(&TokenKind::Const) {
            return self.finish_variable_decl(exported);
        }
        if self.check(&TokenKind::Function) || (self.check(&TokenKind::Async) && self.peek_at(1).kind == TokenKind::Function) {
            return self.function_statement(exported, Vec::new());
        }
        if self.matches(&TokenKind::Class) {
            return self.class_declaration(exported, Vec::new());
        }
        if self.matches(&TokenKind::Interface) {
            return self.interface_declaration(exported);
        }
        if self.matches(&TokenKind::Import) {
            return self.import_declaration();
        }
        if self.check(&TokenKind::From) {
            return self.from_import_declaration();
        }
        if self.check(&TokenKind::Extends) {
            return self.extends_block();
        }
        self.statement()
    }

    fn parse_decorators(&mut self) -> PResult<Vec<Decorator>> {
        let mut decorators = Vec::new();
        while self.check(&TokenKind::At) {
            let line = self.peek().line;
            self.advance();
            let expr = self.call_or_primary()?;
            decorators.push(Decorator { expr, line });
        }
        Ok(decorators)
    }

    fn expect_function_statement(&mut self, exported: bool, decorators: Vec<Decorator>) -> PResult<Stmt> {
        self.function_statement(exported, decorators)
    }

    fn finish_variable_decl(&mut self, exported: bool) -> PResult<Stmt> {
        let line = self.previous().line;
        if self.check(&TokenKind::LBracket) || self.check(&TokenKind::LBrace) {
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::Eq, "'=' in destructuring declaration")?;
            let initializer = self.expression()?;
            self.expect(&TokenKind::Semicolon, "';' after variable declaration")?;
            return Ok(Stmt::DestructuringVariableDecl { pattern, initializer, exported, line });
        }
        let name = self.expect_identifier("variable name")?;
        let initializer = if self.matches(&TokenKind::Eq) { Some(self.expression()?) } else { None };
        self.expect(&TokenKind::Semicolon, "';' after variable declaration")?;
        Ok(Stmt::VariableDecl { name, initializer, exported, line })
    }

    fn function_statement(&mut self, exported: bool, decorators: Vec<Decorator>) -> PResult<Stmt> {
        let line = self.peek().line;
        let is_async = self.matches(&TokenKind::Async);
        self.expect(&TokenKind::Function, "'function'")?;
        let is_generator = self.matches(&TokenKind::Star);
        let name = self.expect_identifier("function name")?;
        let decl = self.finish_function_decl(Some(name), is_async, is_generator, line)?;
        Ok(Stmt::Function { decl: Rc::new(decl), exported, decorators, line })
    }

    fn finish_function_decl(
        &mut self,
        name: Option<String>,
        is_async: bool,
        is_generator: bool,
        line: u32,
    ) -> PResult<FunctionDecl> {
        self.expect(&TokenKind::LParen, "'(' after function name")?;
        let (params, rest_index) = self.parse_params()?;
        self.expect(&TokenKind::RParen, "')' after parameters")?;
        let type_annotation = if self.matches(&TokenKind::Colon) { Some(self.expect_identifier("return type")?) } else { None };
        let body = self.block_statements()?;
        Ok(FunctionDecl {
            name,
            params,
            rest_index,
            type_annotation,
            body: Rc::new(body),
            is_async,
            is_generator,
            line,
        })
    }

    fn parse_params(&mut self) -> PResult<(Vec<Param>, Option<usize>)> {
        let mut params = Vec::new();
        let mut rest_index = None;
        while !self.check(&TokenKind::RParen) {
            if self.matches(&TokenKind::DotDotDot) {
                let name = self.expect_identifier("rest parameter name")?;
                params.push(Param { pattern: Pattern::Identifier { name, default: None } });
                rest_index = Some(params.len() - 1);
                break;
            }
            let pattern = self.parse_pattern()?;
            params.push(Param { pattern });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok((params, rest_index))
    }

    /// A destructuring pattern used as a parameter or a declaration target.
    fn parse_pattern(&mut self) -> PResult<Pattern> {
        if self.matches(&TokenKind::LBracket) {
            let mut elements = Vec::new();
            let mut rest = None;
            while !self.check(&TokenKind::RBracket) {
                if self.matches(&TokenKind::DotDotDot) {
                    rest = Some(Box::new(self.parse_pattern()?));
                    break;
                }
                elements.push(self.parse_pattern()?);
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBracket, "']' after array pattern")?;
            return Ok(Pattern::Array { elements, rest });
        }
        if self.matches(&TokenKind::LBrace) {
            let mut properties = Vec::new();
            let mut rest = None;
            while !self.check(&TokenKind::RBrace) {
                if self.matches(&TokenKind::DotDotDot) {
                    rest = Some(self.expect_identifier("rest binding name")?);
                    break;
                }
                let key = self.expect_identifier("property key")?;
                let sub_pattern = if self.matches(&TokenKind::Colon) {
                    self.parse_pattern()?
                } else {
                    Pattern::Identifier { name: key.clone(), default: None }
                };
                let sub_pattern = if self.matches(&TokenKind::Eq) {
                    let default = self.assignment()?;
                    match sub_pattern {
                        Pattern::Identifier { name, .. } => Pattern::Identifier { name, default: Some(default) },
                        other => other,
                    }
                } else {
                    sub_pattern
                };
                properties.push((key, sub_pattern));
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace, "'}' after object pattern")?;
            return Ok(Pattern::Object { properties, rest });
        }
        let name = self.expect_identifier("binding name")?;
        let default = if self.matches(&TokenKind::Eq) { Some(self.assignment()?) } else { None };
        Ok(Pattern::Identifier { name, default })
    }

    fn class_declaration(&mut self, exported: bool, decorators: Vec<Decorator>) -> PResult<Stmt> {
        let line = self.previous().line;
        let name = self.expect_identifier("class name")?;
        let mut supers = Vec::new();
        if self.matches(&TokenKind::Extends) {
            supers.push(self.expect_identifier("superclass name")?);
            while self.matches(&TokenKind::Comma) {
                supers.push(self.expect_identifier("superclass name")?);
            }
        }
        let members = self.class_body()?;
        let decl = ClassDecl { name, supers, members, decorators, line };
        Ok(Stmt::Class { decl: Rc::new(decl), exported, line })
    }

    fn extends_block(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        self.advance();
        let name = self.expect_identifier("class name")?;
        let members = self.class_body()?;
        Ok(Stmt::ExtendsBlock { name, members, line })
    }

    fn class_body(&mut self) -> PResult<Vec<ClassMember>> {
        self.expect(&TokenKind::LBrace, "'{' to open class body")?;
        let mut members = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let is_static = self.matches(&TokenKind::Static);
            let is_async = self.matches(&TokenKind::Async);
            self.matches(&TokenKind::Function);
            let is_generator = self.matches(&TokenKind::Star);
            let line = self.peek().line;
            let name = self.expect_identifier("method name")?;
            let decl = self.finish_function_decl(Some(name.clone()), is_async, is_generator, line)?;
            members.push(ClassMember { name, function: Rc::new(decl), is_static });
        }
        self.expect(&TokenKind::RBrace, "'}' to close class body")?;
        Ok(members)
    }

    fn interface_declaration(&mut self, exported: bool) -> PResult<Stmt> {
        let line = self.previous().line;
        let name = self.expect_identifier("interface name")?;
        self.expect(&TokenKind::LBrace, "'{' to open interface body")?;
        let mut method_names = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let method_name = self.expect_identifier("method signature name")?;
            self.expect(&TokenKind::LParen, "'(' in interface method signature")?;
            while !self.check(&TokenKind::RParen) {
                self.advance();
            }
            self.expect(&TokenKind::RParen, "')' in interface method signature")?;
            self.matches(&TokenKind::Semicolon);
            method_names.push(method_name);
        }
        self.expect(&TokenKind::RBrace, "'}' to close interface body")?;
        let decl = InterfaceDecl { name, method_names, line };
        Ok(Stmt::Interface { decl: Rc::new(decl), exported, line })
    }

    fn import_path(&mut self) -> PResult<Vec<String>> {
        let mut path = vec![self.expect_identifier("package segment")?];
        while self.matches(&TokenKind::Dot) {
            if self.check(&TokenKind::Star) {
                break;
            }
            path.push(self.expect_identifier("package segment")?);
        }
        Ok(path)
    }

    fn import_declaration(&mut self) -> PResult<Stmt> {
        let line = self.previous().line;
        if let TokenKind::String(_) = self.peek().kind {
            let path = self.expect_string_literal()?;
            let alias = if self.matches(&TokenKind::As) { Some(self.expect_identifier("import alias")?) } else { None };
            self.expect(&TokenKind::Semicolon, "';' after import")?;
            return Ok(Stmt::Import { decl: ImportDecl { kind: ImportKind::FileWhole { path, alias }, line }, line });
        }
        let mut path = vec![self.expect_identifier("package segment")?];
        loop {
            if !self.matches(&TokenKind::Dot) {
                break;
            }
            if self.matches(&TokenKind::Star) {
                self.expect(&TokenKind::Semicolon, "';' after wildcard import")?;
                return Ok(Stmt::Import {
                    decl: ImportDecl { kind: ImportKind::PackageWildcard { path }, line },
                    line,
                });
            }
            if self.matches(&TokenKind::LParen) {
                let names = self.import_name_list()?;
                self.expect(&TokenKind::RParen, "')' after import names")?;
                self.expect(&TokenKind::Semicolon, "';' after import")?;
                return Ok(Stmt::Import {
                    decl: ImportDecl { kind: ImportKind::PackageNames { path, names }, line },
                    line,
                });
            }
            path.push(self.expect_identifier("package segment")?);
        }
        self.expect(&TokenKind::Semicolon, "';' after import")?;
        Ok(Stmt::Import { decl: ImportDecl { kind: ImportKind::PackageWhole { path }, line }, line })
    }

    fn from_import_declaration(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        self.advance();
        if let TokenKind::String(_) = self.peek().kind {
            let path = self.expect_string_literal()?;
            self.expect(&TokenKind::Import, "'import' after file path")?;
            self.expect(&TokenKind::LParen, "'(' after 'import'")?;
            let names = self.import_name_list()?;
            self.expect(&TokenKind::RParen, "')' after import names")?;
            self.expect(&TokenKind::Semicolon, "';' after import")?;
            return Ok(Stmt::Import { decl: ImportDecl { kind: ImportKind::FileNames { path, names }, line }, line });
        }
        let path = self.import_path()?;
        self.expect(&TokenKind::Import, "'import' after package path")?;
        self.expect(&TokenKind::LParen, "'(' after 'import'")?;
        let names = self.import_name_list()?;
        self.expect(&TokenKind::RParen, "')' after import names")?;
        self.expect(&TokenKind::Semicolon, "';' after import")?;
        Ok(Stmt::Import { decl: ImportDecl { kind: ImportKind::PackageNames { path, names }, line }, line })
    }

    fn import_name_list(&mut self) -> PResult<Vec<(String, Option<String>)>> {
        let mut names = Vec::new();
        while !self.check(&TokenKind::RParen) {
            let name = self.expect_identifier("imported name")?;
            let alias = if self.matches(&TokenKind::As) { Some(self.expect_identifier("import alias")?) } else { None };
            names.push((name, alias));
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok(names)
    }

    fn expect_string_literal(&mut self) -> PResult<String> {
        match &self.peek().kind {
            TokenKind::String(s) => {
                let s = s.clone();
                self.advance();
                Ok(s)
            }
            other => Err(self.error(format!("expected string literal, found {other:?}"))),
        }
    }

    fn statement(&mut self) -> PResult<Stmt> {
        let line = self.peek().line;
        if self.matches(&TokenKind::LBrace) {
            let statements = self.finish_block()?;
            return Ok(Stmt::Block { statements, line });
        }
        if self.matches(&TokenKind::If) {
            return self.if_statement(line);
        }
        if self.matches(&TokenKind::While) {
            return self.while_statement(line);
        }
        if self.matches(&TokenKind::Do) {
            return self.do_while_statement(line);
        }
        if self.matches(&TokenKind::For) {
            return self.for_statement(line);
        }
        if self.matches(&TokenKind::Foreach) {
            return self.foreach_statement(line);
        }
        if self.matches(&TokenKind::Switch) {
            return self.switch_statement(line);
        }
        if self.matches(&TokenKind::Match) {
            return self.match_statement(line);
        }
        if self.matches(&TokenKind::Return) {
            let value = if self.check(&TokenKind::Semicolon) { None } else { Some(self.expression()?) };
            self.expect(&TokenKind::Semicolon, "';' after return value")?;
            return Ok(Stmt::Return { value, line });
        }
        if self.matches(&TokenKind::Throw) {
            let value = self.expression()?;
            self.expect(&TokenKind::Semicolon, "';' after throw value")?;
            return Ok(Stmt::Throw { value, line });
        }
        if self.matches(&TokenKind::Try) {
            return self.try_statement(line);
        }
        if self.matches(&TokenKind::Break) {
            self.expect(&TokenKind::Semicolon, "';' after 'break'")?;
            return Ok(Stmt::Break { line });
        }
        if self.matches(&TokenKind::Continue) {
            self.expect(&TokenKind::Semicolon, "';' after 'continue'")?;
            return Ok(Stmt::Continue { line });
        }
        if self.matches(&TokenKind::Go) {
            let expr = self.expression()?;
            self.expect(&TokenKind::Semicolon, "';' after 'go' expression")?;
            return Ok(Stmt::Go { expr, line });
        }
        if self.matches(&TokenKind::Semicolon) {
            return Ok(Stmt::Empty { line });
        }
        let expr = self.expression()?;
        self.expect(&TokenKind::Semicolon, "';' after expression statement")?;
        Ok(Stmt::Expression { expr, line })
    }

    fn block_statements(&mut self) -> PResult<Vec<Stmt>> {
        self.expect(&TokenKind::LBrace, "'{' to open block")?;
        self.finish_block()
    }

    fn finish_block(&mut self) -> PResult<Vec<Stmt>> {
        let mut statements = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            statements.push(self.declaration()?);
        }
        self.expect(&TokenKind::RBrace, "'}' to close block")?;
        Ok(statements)
    }

    fn if_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'if'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after if condition")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = if self.matches(&TokenKind::Else) { Some(Box::new(self.statement()?)) } else { None };
        Ok(Stmt::If { condition, then_branch, else_branch, line })
    }

    fn while_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after while condition")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::While { condition, body, line })
    }

    fn do_while_statement(&mut self, line: u32) -> PResult<Stmt> {
        let body = Box::new(self.statement()?);
        self.expect(&TokenKind::While, "'while' after do-block")?;
        self.expect(&TokenKind::LParen, "'(' after 'while'")?;
        let condition = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after while condition")?;
        self.expect(&TokenKind::Semicolon, "';' after do-while")?;
        Ok(Stmt::DoWhile { body, condition, line })
    }

    fn for_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'for'")?;
        let init = if self.matches(&TokenKind::Semicolon) {
            None
        } else if self.matches(&TokenKind::Let) || self.matches(&TokenKind::Var) || self.matches(&TokenKind::Const) {
            Some(Box::new(self.finish_variable_decl(false)?))
        } else {
            let expr = self.expression()?;
            self.expect(&TokenKind::Semicolon, "';' after for-initializer")?;
            Some(Box::new(Stmt::Expression { expr, line }))
        };
        let condition = if self.check(&TokenKind::Semicolon) { None } else { Some(self.expression()?) };
        self.expect(&TokenKind::Semicolon, "';' after for-condition")?;
        let update = if self.check(&TokenKind::RParen) { None } else { Some(self.expression()?) };
        self.expect(&TokenKind::RParen, "')' after for-clauses")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::For { init, condition, update, body, line })
    }

    fn foreach_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'foreach'")?;
        self.matches(&TokenKind::Let);
        let binding = self.expect_identifier("loop variable name")?;
        self.expect(&TokenKind::In, "'in' in foreach")?;
        let iterable = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after foreach clause")?;
        let body = Box::new(self.statement()?);
        Ok(Stmt::Foreach { binding, iterable, body, line })
    }

    fn switch_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'switch'")?;
        let discriminant = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after switch discriminant")?;
        self.expect(&TokenKind::LBrace, "'{' to open switch body")?;
        let mut cases = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let test = if self.matches(&TokenKind::Case) {
                let expr = self.expression()?;
                self.expect(&TokenKind::Colon, "':' after case expression")?;
                Some(expr)
            } else {
                self.expect(&TokenKind::Default, "'case' or 'default'")?;
                self.expect(&TokenKind::Colon, "':' after 'default'")?;
                None
            };
            let mut body = Vec::new();
            while !self.check(&TokenKind::Case) && !self.check(&TokenKind::Default) && !self.check(&TokenKind::RBrace) {
                body.push(self.declaration()?);
            }
            cases.push(SwitchCase { test, body });
        }
        self.expect(&TokenKind::RBrace, "'}' to close switch body")?;
        Ok(Stmt::Switch { discriminant, cases, line })
    }

    fn match_statement(&mut self, line: u32) -> PResult<Stmt> {
        self.expect(&TokenKind::LParen, "'(' after 'match'")?;
        let discriminant = self.expression()?;
        self.expect(&TokenKind::RParen, "')' after match discriminant")?;
        self.expect(&TokenKind::LBrace, "'{' to open match body")?;
        let mut arms = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_at_end() {
            let pattern = self.expression()?;
            self.expect(&TokenKind::Arrow, "'->' after match pattern")?;
            let body = if self.matches(&TokenKind::LBrace) {
                self.finish_block()?
            } else {
                let expr = self.expression()?;
                vec![Stmt::Expression { expr, line: self.previous().line }]
            };
            arms.push(MatchArm { pattern, body });
            self.matches(&TokenKind::Comma);
        }
        self.expect(&TokenKind::RBrace, "'}' to close match body")?;
        Ok(Stmt::Match { discriminant, arms, line })
    }

    fn try_statement(&mut self, line: u32) -> PResult<Stmt> {
        let try_block = self.block_statements()?;
        let mut catch_name = None;
        let mut catch_block = None;
        if self.matches(&TokenKind::Catch) {
            if self.matches(&TokenKind::LParen) {
                catch_name = Some(self.expect_identifier("catch binding name")?);
                self.expect(&TokenKind::RParen, "')' after catch binding")?;
            }
            catch_block = Some(self.block_statements()?);
        }
        let finally_block = if self.matches(&TokenKind::Finally) { Some(self.block_statements()?) } else { None };
        Ok(Stmt::TryCatchFinally { try_block, catch_name, catch_block, finally_block, line })
    }

    // ---- expressions ----

    fn expression(&mut self) -> PResult<Expr> {
        self.assignment()
    }

    fn assignment(&mut self) -> PResult<Expr> {
        if (self.check(&TokenKind::LBracket) || self.check(&TokenKind::LBrace)) && self.looks_like_destructuring_assign() {
            let line = self.peek().line;
            let pattern = self.parse_pattern()?;
            self.expect(&TokenKind::Eq, "'=' in destructuring assignment")?;
            let value = Box::new(self.assignment()?);
            let span = Span::new(line, self.peek().column, 0);
            return Ok(Expr::DestructuringAssign { pattern, value, span });
        }

        let expr = self.ternary()?;

        let op = match self.peek().kind {
            TokenKind::Eq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::AddAssign),
            TokenKind::MinusEq => Some(AssignOp::SubAssign),
            TokenKind::StarEq => Some(AssignOp::MulAssign),
            TokenKind::SlashEq => Some(AssignOp::DivAssign),
            TokenKind::PercentEq => Some(AssignOp::RemAssign),
            TokenKind::QuestionQuestionEq => Some(AssignOp::NullishAssign),
            TokenKind::AmpAmpEq => Some(AssignOp::AndAssign),
            TokenKind::PipePipeEq => Some(AssignOp::OrAssign),
            _ => None,
        };
        let Some(op) = op else { return Ok(expr) };
        let eq_tok = self.advance();
        let value = Box::new(self.assignment()?);
        let span = Span::new(eq_tok.line, eq_tok.column, eq_tok.length);
        match expr {
            Expr::Variable { name, .. } => Ok(Expr::Assign { name, op, value, span }),
            Expr::Get { object, name, span: get_span } => Ok(Expr::SetProperty { object, name, value, span: get_span }),
            Expr::Index { object, index, span: idx_span } => {
                Ok(Expr::SetIndex { object, index, value, span: idx_span })
            }
            other => Err(ParseError { line: span.line, column: span.column, message: format!("invalid assignment target: {other:?}") }),
        }
    }

    /// Disambiguates `[a, b] = ...` (destructuring) from `[a, b];` or a
    /// bare array-literal expression by scanning to the matching bracket
    /// and checking whether `=` (not `==`) follows.
    fn looks_like_destructuring_assign(&self) -> bool {
        let open = self.peek().kind.clone();
        let (opener, closer) = match open {
            TokenKind::LBracket => (TokenKind::LBracket, TokenKind::RBracket),
            TokenKind::LBrace => (TokenKind::LBrace, TokenKind::RBrace),
            _ => return false,
        };
        let mut depth = 0i32;
        let mut offset = 0usize;
        loop {
            let tok = self.peek_at(offset);
            if std::mem::discriminant(&tok.kind) == std::mem::discriminant(&opener) {
                depth += 1;
            } else if std::mem::discriminant(&tok.kind) == std::mem::discriminant(&closer) {
                depth -= 1;
                if depth == 0 {
                    return self.peek_at(offset + 1).kind == TokenKind::Eq;
                }
            } else if tok.kind == TokenKind::Eof {
                return false;
            }
            offset += 1;
        }
    }

    fn ternary(&mut self) -> PResult<Expr> {
        let cond = self.nullish_coalesce()?;
        if self.matches(&TokenKind::Question) {
            let line = self.previous().line;
            let then_branch = Box::new(self.assignment()?);
            self.expect(&TokenKind::Colon, "':' in conditional expression")?;
            let else_branch = Box::new(self.assignment()?);
            let span = Span::new(line, cond.span().column, 0);
            return Ok(Expr::Conditional { cond: Box::new(cond), then_branch, else_branch, span });
        }
        Ok(cond)
    }

    fn nullish_coalesce(&mut self) -> PResult<Expr> {
        let mut left = self.logical_or()?;
        while self.matches(&TokenKind::QuestionQuestion) {
            let line = self.previous().line;
            let right = self.logical_or()?;
            let span = Span::new(line, left.span().column, 0);
            left = Expr::Logical { op: LogicalOp::NullishCoalesce, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn logical_or(&mut self) -> PResult<Expr> {
        let mut left = self.logical_and()?;
        while self.matches(&TokenKind::PipePipe) {
            let line = self.previous().line;
            let right = self.logical_and()?;
            let span = Span::new(line, left.span().column, 0);
            left = Expr::Logical { op: LogicalOp::Or, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn logical_and(&mut self) -> PResult<Expr> {
        let mut left = self.interface_match()?;
        while self.matches(&TokenKind::AmpAmp) {
            let line = self.previous().line;
            let right = self.interface_match()?;
            let span = Span::new(line, left.span().column, 0);
            left = Expr::Logical { op: LogicalOp::And, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn interface_match(&mut self) -> PResult<Expr> {
        let mut left = self.equality()?;
        while self.matches(&TokenKind::InterfaceMatch) {
            let tok = self.previous().clone();
            let right = self.equality()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op: BinaryOp::InterfaceMatch, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn equality(&mut self) -> PResult<Expr> {
        let mut left = self.comparison()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinaryOp::Eq,
                TokenKind::BangEq => BinaryOp::NotEq,
                TokenKind::EqEqEq => BinaryOp::StrictEq,
                TokenKind::BangEqEq => BinaryOp::StrictNotEq,
                _ => break,
            };
            let tok = self.advance();
            let right = self.comparison()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn comparison(&mut self) -> PResult<Expr> {
        let mut left = self.bitwise_or()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinaryOp::Lt,
                TokenKind::LtEq => BinaryOp::LtEq,
                TokenKind::Gt => BinaryOp::Gt,
                TokenKind::GtEq => BinaryOp::GtEq,
                _ => break,
            };
            let tok = self.advance();
            let right = self.bitwise_or()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn bitwise_or(&mut self) -> PResult<Expr> {
        let mut left = self.bitwise_xor()?;
        while self.check(&TokenKind::Pipe) {
            let tok = self.advance();
            let right = self.bitwise_xor()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op: BinaryOp::BitOr, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn bitwise_xor(&mut self) -> PResult<Expr> {
        let mut left = self.bitwise_and()?;
        while self.matches(&TokenKind::Caret) {
            let tok = self.previous().clone();
            let right = self.bitwise_and()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op: BinaryOp::BitXor, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn bitwise_and(&mut self) -> PResult<Expr> {
        let mut left = self.shift()?;
        while self.check(&TokenKind::Amp) {
            let tok = self.advance();
            let right = self.shift()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op: BinaryOp::BitAnd, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn shift(&mut self) -> PResult<Expr> {
        let mut left = self.additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::LtLt => BinaryOp::Shl,
                TokenKind::GtGt => BinaryOp::Shr,
                _ => break,
            };
            let tok = self.advance();
            let right = self.additive()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn additive(&mut self) -> PResult<Expr> {
        let mut left = self.multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinaryOp::Add,
                TokenKind::Minus => BinaryOp::Sub,
                _ => break,
            };
            let tok = self.advance();
            let right = self.multiplicative()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinaryOp::Mul,
                TokenKind::Slash => BinaryOp::Div,
                TokenKind::Percent => BinaryOp::Rem,
                _ => break,
            };
            let tok = self.advance();
            let right = self.unary()?;
            let span = Span::new(tok.line, tok.column, tok.length);
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), span };
        }
        Ok(left)
    }

    fn unary(&mut self) -> PResult<Expr> {
        let op = match self.peek().kind {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            _ => None,
        };
        if let Some(op) = op {
            let tok = self.advance();
            let expr = Box::new(self.unary()?);
            let span = Span::new(tok.line, tok.column, tok.length);
            return Ok(Expr::Unary { op, expr, span });
        }
        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let op = if self.peek().kind == TokenKind::PlusPlus { UpdateOp::Increment } else { UpdateOp::Decrement };
            let tok = self.advance();
            let target = Box::new(self.unary()?);
            let span = Span::new(tok.line, tok.column, tok.length);
            return Ok(Expr::Update { op, target, prefix: true, span });
        }
        if self.matches(&TokenKind::Await) {
            let tok = self.previous().clone();
            let expr = Box::new(self.unary()?);
            let span = Span::new(tok.line, tok.column, tok.length);
            return Ok(Expr::Await { expr, span });
        }
        if self.matches(&TokenKind::Yield) {
            let tok = self.previous().clone();
            let delegate = self.matches(&TokenKind::Star);
            let expr = if matches!(self.peek().kind, TokenKind::Semicolon | TokenKind::RParen | TokenKind::RBrace) {
                None
            } else {
                Some(Box::new(self.assignment()?))
            };
            let span = Span::new(tok.line, tok.column, tok.length);
            return Ok(Expr::Yield { expr, delegate, span });
        }
        self.postfix()
    }

    fn postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.call_or_primary()?;
        if self.check(&TokenKind::PlusPlus) || self.check(&TokenKind::MinusMinus) {
            let op = if self.peek().kind == TokenKind::PlusPlus { UpdateOp::Increment } else { UpdateOp::Decrement };
            let tok = self.advance();
            let span = Span::new(tok.line, tok.column, tok.length);
            expr = Expr::Update { op, target: Box::new(expr), prefix: false, span };
        }
        Ok(expr)
    }

    fn call_or_primary(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&TokenKind::LParen) {
                let tok = self.previous().clone();
                let args = self.parse_arguments()?;
                self.expect(&TokenKind::RParen, "')' after arguments")?;
                let span = Span::new(tok.line, tok.column, tok.length);
                expr = Expr::Call { callee: Box::new(expr), args, span };
            } else if self.matches(&TokenKind::Dot) {
                let tok = self.previous().clone();
                let name = self.expect_identifier("property name")?;
                let span = Span::new(tok.line, tok.column, tok.length);
                expr = Expr::Get { object: Box::new(expr), name, span };
            } else if self.matches(&TokenKind::QuestionDot) {
                let tok = self.previous().clone();
                let name = self.expect_identifier("property name")?;
                let span = Span::new(tok.line, tok.column, tok.length);
                expr = Expr::OptionalGet { object: Box::new(expr), name, span };
            } else if self.matches(&TokenKind::LBracket) {
                let tok = self.previous().clone();
                let index = Box::new(self.expression()?);
                self.expect(&TokenKind::RBracket, "']' after index expression")?;
                let span = Span::new(tok.line, tok.column, tok.length);
                expr = Expr::Index { object: Box::new(expr), index, span };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn parse_arguments(&mut self) -> PResult<Vec<ArrayElement>> {
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.matches(&TokenKind::DotDotDot) {
                args.push(ArrayElement::Spread(self.assignment()?));
            } else {
                args.push(ArrayElement::Item(self.assignment()?));
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        Ok(args)
    }

    fn primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match &tok.kind {
            TokenKind::Number(n) => {
                self.advance();
                Ok(Expr::Literal { value: LiteralValue::Number(*n), span: span_of(&tok) })
            }
            TokenKind::String(s) => {
                self.advance();
                Ok(Expr::Literal { value: LiteralValue::String(s.clone()), span: span_of(&tok) })
            }
            TokenKind::InterpolatedString(raw) => {
                self.advance();
                let parts = self.parse_interpolated_parts(raw, &tok)?;
                Ok(Expr::Interpolated { parts, span: span_of(&tok) })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal { value: LiteralValue::Boolean(true), span: span_of(&tok) })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal { value: LiteralValue::Boolean(false), span: span_of(&tok) })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal { value: LiteralValue::Null, span: span_of(&tok) })
            }
            TokenKind::Identifier if self.looks_like_bare_arrow_param() => self.bare_arrow_function(tok.line),
            TokenKind::Identifier => {
                self.advance();
                Ok(Expr::Variable { name: tok.lexeme.clone(), span: span_of(&tok) })
            }
            TokenKind::LParen => {
                if self.looks_like_arrow_params() {
                    return self.arrow_function(tok.line);
                }
                self.advance();
                let expr = self.expression()?;
                self.expect(&TokenKind::RParen, "')' after expression")?;
                Ok(expr)
            }
            TokenKind::LBracket => self.array_literal(),
            TokenKind::LBrace => self.object_literal(),
            TokenKind::Function => {
                self.advance();
                let is_generator = self.matches(&TokenKind::Star);
                let name = if self.check_identifier() { Some(self.advance().lexeme) } else { None };
                let decl = self.finish_function_decl(name, false, is_generator, tok.line)?;
                Ok(Expr::FunctionExpr { decl: Rc::new(decl), span: span_of(&tok) })
            }
            TokenKind::Async if self.peek_at(1).kind == TokenKind::Function => {
                self.advance();
                self.advance();
                let is_generator = self.matches(&TokenKind::Star);
                let name = if self.check_identifier() { Some(self.advance().lexeme) } else { None };
                let decl = self.finish_function_decl(name, true, is_generator, tok.line)?;
                Ok(Expr::FunctionExpr { decl: Rc::new(decl), span: span_of(&tok) })
            }
            TokenKind::Async if self.peek_at(1).kind == TokenKind::LParen => {
                self.advance();
                self.arrow_function(tok.line)
            }
            TokenKind::New => {
                self.advance();
                let class_expr = Box::new(self.call_or_primary_no_new_call()?);
                let args = if self.matches(&TokenKind::LParen) {
                    let args = self.parse_arguments()?;
                    self.expect(&TokenKind::RParen, "')' after constructor arguments")?;
                    args
                } else {
                    Vec::new()
                };
                Ok(Expr::New { class_expr, args, span: span_of(&tok) })
            }
            other => Err(self.error(format!("unexpected token {other:?} in expression position"))),
        }
    }

    /// `new` binds its class-expression tighter than a trailing call — the
    /// `(args)` immediately after the identifier belongs to `new`, not to a
    /// method call on the class expression itself.
    fn call_or_primary_no_new_call(&mut self) -> PResult<Expr> {
        let mut expr = self.primary()?;
        loop {
            if self.matches(&TokenKind::Dot) {
                let tok = self.previous().clone();
                let name = self.expect_identifier("property name")?;
                let span = Span::new(tok.line, tok.column, tok.length);
                expr = Expr::Get { object: Box::new(expr), name, span };
            } else {
                break;
            }
        }
        Ok(expr)
    }

    fn looks_like_arrow_params(&self) -> bool {
        let mut depth = 0i32;
        let mut idx = 0usize;
        loop {
            let tok = self.peek_at(idx);
            match tok.kind {
                TokenKind::LParen => depth += 1,
                TokenKind::RParen => {
                    depth -= 1;
                    if depth == 0 {
                        return matches!(self.peek_at(idx + 1).kind, TokenKind::Arrow | TokenKind::FatArrow);
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            idx += 1;
        }
    }

    /// A bare single-identifier lambda, `ident => expr` / `ident => { ... }`.
    /// Only the `=>` spelling applies here; `->` always requires parens.
    fn looks_like_bare_arrow_param(&self) -> bool {
        self.check_identifier() && self.peek_at(1).kind == TokenKind::FatArrow
    }

    fn bare_arrow_function(&mut self, line: u32) -> PResult<Expr> {
        let name = self.expect_identifier("lambda parameter name")?;
        self.expect(&TokenKind::FatArrow, "'=>' in lambda")?;
        let params = vec![Param { pattern: Pattern::Identifier { name, default: None } }];
        self.finish_arrow_body(params, None, line)
    }

    fn arrow_function(&mut self, line: u32) -> PResult<Expr> {
        self.expect(&TokenKind::LParen, "'(' to open arrow parameters")?;
        let (params, rest_index) = self.parse_params()?;
        self.expect(&TokenKind::RParen, "')' after arrow parameters")?;
        if !self.matches(&TokenKind::Arrow) {
            self.expect(&TokenKind::FatArrow, "'->' or '=>' in arrow function")?;
        }
        self.finish_arrow_body(params, rest_index, line)
    }

    fn finish_arrow_body(&mut self, params: Vec<Param>, rest_index: Option<usize>, line: u32) -> PResult<Expr> {
        let body = if self.matches(&TokenKind::LBrace) {
            self.finish_block()?
        } else {
            let expr = self.assignment()?;
            vec![Stmt::Return { value: Some(expr), line }]
        };
        let decl = FunctionDecl {
            name: None,
            params,
            rest_index,
            type_annotation: None,
            body: Rc::new(body),
            is_async: false,
            is_generator: false,
            line,
        };
        Ok(Expr::FunctionExpr { decl: Rc::new(decl), span: Span::new(line, 0, 0) })
    }

    fn array_literal(&mut self) -> PResult<Expr> {
        let tok = self.advance();
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            if self.matches(&TokenKind::DotDotDot) {
                elements.push(ArrayElement::Spread(self.assignment()?));
            } else {
                elements.push(ArrayElement::Item(self.assignment()?));
            }
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket, "']' after array literal")?;
        Ok(Expr::ArrayLiteral { elements, span: span_of(&tok) })
    }

    fn object_literal(&mut self) -> PResult<Expr> {
        let tok = self.advance();
        let mut properties = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.matches(&TokenKind::DotDotDot) {
                properties.push(ObjectProperty::Spread(self.assignment()?));
                if !self.matches(&TokenKind::Comma) {
                    break;
                }
                continue;
            }
            let (key, computed) = if self.matches(&TokenKind::LBracket) {
                let key_expr = self.expression()?;
                self.expect(&TokenKind::RBracket, "']' after computed key")?;
                (expr_as_static_key(&key_expr), true)
            } else if let TokenKind::String(s) = self.peek().kind.clone() {
                self.advance();
                (s, false)
            } else {
                (self.expect_identifier("object key")?, false)
            };
            let value = if self.matches(&TokenKind::Colon) {
                self.assignment()?
            } else {
                Expr::Variable { name: key.clone(), span: span_of(&tok) }
            };
            properties.push(ObjectProperty::KeyValue { key, value, computed });
            if !self.matches(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace, "'}' after object literal")?;
        Ok(Expr::ObjectLiteral { properties, span: span_of(&tok) })
    }

    /// Re-lexes and re-parses each `${...}` segment of an interpolated
    /// string, lowering the whole literal into a flat sequence of
    /// alternating literal-text and sub-expression parts.
    fn parse_interpolated_parts(&mut self, raw: &str, tok: &Token) -> PResult<Vec<Expr>> {
        let mut parts = Vec::new();
        let bytes = raw.as_bytes();
        let mut i = 0usize;
        let mut literal = String::new();
        while i < bytes.len() {
            if bytes[i] == b'$' && i + 1 < bytes.len() && bytes[i + 1] == b'{' {
                if !literal.is_empty() {
                    parts.push(Expr::Literal { value: LiteralValue::String(std::mem::take(&mut literal)), span: span_of(tok) });
                }
                let mut depth = 1i32;
                let start = i + 2;
                let mut j = start;
                while j < bytes.len() && depth > 0 {
                    match bytes[j] {
                        b'{' => depth += 1,
                        b'}' => depth -= 1,
                        _ => {}
                    }
                    if depth > 0 {
                        j += 1;
                    }
                }
                let segment = &raw[start..j];
                let sub_tokens = Lexer::tokenize(segment)?;
                let mut sub_parser = Parser::new(sub_tokens);
                let sub_expr = sub_parser.expression()?;
                parts.push(sub_expr);
                i = j + 1;
            } else {
                literal.push(bytes[i] as char);
                i += 1;
            }
        }
        if !literal.is_empty() {
            parts.push(Expr::Literal { value: LiteralValue::String(literal), span: span_of(tok) });
        }
        Ok(parts)
    }
}

fn span_of(tok: &Token) -> Span {
    Span::new(tok.line, tok.column, tok.length)
}

fn expr_as_static_key(expr: &Expr) -> String {
    match expr {
        Expr::Literal { value: LiteralValue::String(s), .. } => s.clone(),
        Expr::Variable { name, .. } => name.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_arithmetic_precedence() {
        let stmts = Parser::parse_program("let x = 1 + 2 * 3;").unwrap();
        assert_eq!(stmts.len(), 1);
    }

    #[test]
    fn parses_class_with_multiple_supers() {
        let src = "class Duck extends Bird, Swimmer { quack() { return 1; } }";
        let stmts = Parser::parse_program(src).unwrap();
        match &stmts[0] {
            Stmt::Class { decl, .. } => {
                assert_eq!(decl.supers, vec!["Bird".to_string(), "Swimmer".to_string()]);
                assert_eq!(decl.members.len(), 1);
            }
            other => panic!("expected class decl, got {other:?}"),
        }
    }

    #[test]
    fn parses_decorator_on_class_and_rejects_decorator_on_interface() {
        let stmts = Parser::parse_program("@logged class Duck { quack() { return 1; } }").unwrap();
        match &stmts[0] {
            Stmt::Class { decl, .. } => assert_eq!(decl.decorators.len(), 1),
            other => panic!("expected decorated class decl, got {other:?}"),
        }
        let errors = Parser::parse_program("@logged interface Shape { area(); }").unwrap_err();
        assert!(!errors.is_empty());
    }

    #[test]
    fn parses_destructuring_declaration_with_default() {
        let src = "let [a, b = 2] = [1];";
        let stmts = Parser::parse_program(src).unwrap();
        assert!(matches!(stmts[0], Stmt::DestructuringVariableDecl { .. }));
    }

    #[test]
    fn parses_interface_match_expression() {
        let stmts = Parser::parse_program("let ok = thing =~= Shape;").unwrap();
        match &stmts[0] {
            Stmt::VariableDecl { initializer: Some(Expr::Binary { op: BinaryOp::InterfaceMatch, .. }), .. } => {}
            other => panic!("expected interface match binary expr, got {other:?}"),
        }
    }

    #[test]
    fn parses_try_catch_finally() {
        let src = "try { throw 1; } catch (e) { log(e); } finally { cleanup(); }";
        let stmts = Parser::parse_program(src).unwrap();
        assert!(matches!(stmts[0], Stmt::TryCatchFinally { .. }));
    }

    #[test]
    fn parses_import_forms() {
        let forms = [
            "import pkg.sub.*;",
            "import pkg.sub;",
            "import pkg.sub.(a, b as c);",
            "import \"./file\" as f;",
            "from \"./file\" import (a, b as c);",
        ];
        for src in forms {
            Parser::parse_program(src).unwrap_or_else(|e| panic!("failed to parse {src:?}: {e:?}"));
        }
    }

    #[test]
    fn parses_arrow_function_expression_body() {
        let stmts = Parser::parse_program("let f = (x) -> x + 1;").unwrap();
        assert!(matches!(
            stmts[0],
            Stmt::VariableDecl { initializer: Some(Expr::FunctionExpr { .. }), .. }
        ));
    }

    #[test]
    fn parses_fat_arrow_lambda_forms() {
        let stmts = Parser::parse_program("let f = x => x + 1;").unwrap();
        assert!(matches!(
            stmts[0],
            Stmt::VariableDecl { initializer: Some(Expr::FunctionExpr { .. }), .. }
        ));
        let stmts = Parser::parse_program("let g = (a, b) => a + b;").unwrap();
        match &stmts[0] {
            Stmt::VariableDecl { initializer: Some(Expr::FunctionExpr { decl, .. }), .. } => {
                assert_eq!(decl.params.len(), 2);
            }
            other => panic!("expected parenthesized fat-arrow lambda, got {other:?}"),
        }
        Parser::parse_program(r#"p.then(x => record("a:" + x));"#).expect("bare fat-arrow lambda call argument");
    }

    #[test]
    fn reports_multiple_errors_in_one_pass() {
        let src = "let = ; let y = 1 +;";
        let errors = Parser::parse_program(src).unwrap_err();
        assert!(errors.len() >= 1);
    }

    #[test]
    fn parses_string_interpolation() {
        let stmts = Parser::parse_program("let s = \"hi ${1 + 2}!\";").unwrap();
        match &stmts[0] {
            Stmt::VariableDecl { initializer: Some(Expr::Interpolated { parts, .. }), .. } => {
                assert_eq!(parts.len(), 3);
            }
            other => panic!("expected interpolated string, got {other:?}"),
        }
    }
}
