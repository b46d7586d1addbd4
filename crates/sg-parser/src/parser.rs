use sg_core::{SceneGuardError, SourceLocation};

use crate::ast::*;
use crate::lexer::{parse_error, tokenize, TemplateToken, Token, TokenKind};

const ASSIGN_OPS: &[&str] = &[
    "=", "+=", "-=", "*=", "/=", "%=", "**=", "<<=", ">>=", ">>>=", "&=", "|=", "^=", "&&=",
    "||=", "??=",
];

const RESERVED_WORDS: &[&str] = &[
    "break",
    "case",
    "catch",
    "class",
    "const",
    "continue",
    "debugger",
    "default",
    "delete",
    "do",
    "else",
    "export",
    "extends",
    "finally",
    "for",
    "function",
    "if",
    "import",
    "in",
    "instanceof",
    "new",
    "return",
    "super",
    "switch",
    "this",
    "throw",
    "try",
    "typeof",
    "var",
    "void",
    "while",
    "with",
    "null",
    "true",
    "false",
];

pub fn parse_program(source: &str) -> Result<Program, SceneGuardError> {
    let tokens = tokenize(source)?;
    let mut parser = Parser::new(tokens);
    let mut body = Vec::new();
    while !parser.at_eof() {
        body.push(parser.parse_statement()?);
    }
    Ok(Program { body })
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    no_in: bool,
}

impl Parser {
    fn new(mut tokens: Vec<Token>) -> Self {
        if tokens.is_empty() {
            tokens.push(Token {
                kind: TokenKind::Eof,
                location: SourceLocation { line: 1, column: 1 },
                newline_before: false,
            });
        }
        Self {
            tokens,
            pos: 0,
            no_in: false,
        }
    }

    fn peek(&self) -> &Token {
        self.peek_nth(0)
    }

    fn peek_nth(&self, offset: usize) -> &Token {
        let last = self.tokens.len() - 1;
        &self.tokens[(self.pos + offset).min(last)]
    }

    fn advance(&mut self) -> Token {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn at_eof(&self) -> bool {
        self.peek().kind == TokenKind::Eof
    }

    fn is_punct(&self, punct: &str) -> bool {
        self.is_punct_at(0, punct)
    }

    fn is_punct_at(&self, offset: usize, punct: &str) -> bool {
        matches!(&self.peek_nth(offset).kind, TokenKind::Punct(found) if *found == punct)
    }

    fn eat_punct(&mut self, punct: &str) -> bool {
        if self.is_punct(punct) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_punct(&mut self, punct: &str) -> Result<(), SceneGuardError> {
        if self.eat_punct(punct) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        self.is_keyword_at(0, keyword)
    }

    fn is_keyword_at(&self, offset: usize, keyword: &str) -> bool {
        matches!(&self.peek_nth(offset).kind, TokenKind::Identifier(name) if name == keyword)
    }

    fn is_identifier_at(&self, offset: usize) -> bool {
        matches!(&self.peek_nth(offset).kind, TokenKind::Identifier(name) if !RESERVED_WORDS.contains(&name.as_str()))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.is_keyword(keyword) {
            self.advance();
            return true;
        }
        false
    }

    fn expect_keyword(&mut self, keyword: &str) -> Result<(), SceneGuardError> {
        if self.eat_keyword(keyword) {
            return Ok(());
        }
        Err(self.unexpected())
    }

    fn unexpected(&self) -> SceneGuardError {
        let token = self.peek();
        let message = match &token.kind {
            TokenKind::Eof => "Unexpected end of input".to_string(),
            TokenKind::Punct(punct) => format!("Unexpected token '{}'", punct),
            TokenKind::Identifier(name) => format!("Unexpected token '{}'", name),
            TokenKind::PrivateName(name) => format!("Unexpected private name '#{}'", name),
            TokenKind::Number(value) => format!("Unexpected number '{}'", value),
            TokenKind::String(_) => "Unexpected string".to_string(),
            TokenKind::Template(_) => "Unexpected template literal".to_string(),
            TokenKind::Regex(_) => "Unexpected regular expression".to_string(),
        };
        parse_error(message, token.location)
    }

    fn consume_semicolon(&mut self) -> Result<(), SceneGuardError> {
        if self.eat_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().newline_before
        {
            return Ok(());
        }
        Err(parse_error("Missing semicolon", self.peek().location))
    }

    fn at_statement_end(&self) -> bool {
        self.is_punct(";") || self.is_punct("}") || self.at_eof() || self.peek().newline_before
    }

    fn with_in<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SceneGuardError>,
    ) -> Result<T, SceneGuardError> {
        let saved = self.no_in;
        self.no_in = false;
        let result = parse(self);
        self.no_in = saved;
        result
    }

    fn without_in<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SceneGuardError>,
    ) -> Result<T, SceneGuardError> {
        let saved = self.no_in;
        self.no_in = true;
        let result = parse(self);
        self.no_in = saved;
        result
    }

    fn parse_binding_identifier(&mut self) -> Result<Ident, SceneGuardError> {
        if !self.is_identifier_at(0) {
            return Err(self.unexpected());
        }
        let token = self.advance();
        let TokenKind::Identifier(name) = token.kind else {
            return Err(parse_error("Expected identifier", token.location));
        };
        Ok(Ident {
            name,
            location: token.location,
        })
    }

    fn parse_identifier_name(&mut self) -> Result<Ident, SceneGuardError> {
        if !matches!(self.peek().kind, TokenKind::Identifier(_)) {
            return Err(self.unexpected());
        }
        let token = self.advance();
        let TokenKind::Identifier(name) = token.kind else {
            return Err(parse_error("Expected identifier", token.location));
        };
        Ok(Ident {
            name,
            location: token.location,
        })
    }

    fn parse_string_literal(&mut self) -> Result<String, SceneGuardError> {
        if let TokenKind::String(value) = &self.peek().kind {
            let value = value.clone();
            self.advance();
            return Ok(value);
        }
        Err(self.unexpected())
    }

    // ---------------------------------------------------------------- statements

    fn parse_block_body(&mut self) -> Result<Vec<Stmt>, SceneGuardError> {
        self.expect_punct("{")?;
        let mut body = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            body.push(self.parse_statement()?);
        }
        self.advance();
        Ok(body)
    }

    fn parse_function_body_block(&mut self) -> Result<Vec<Stmt>, SceneGuardError> {
        self.with_in(|parser| parser.parse_block_body())
    }

    fn parse_statement(&mut self) -> Result<Stmt, SceneGuardError> {
        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::Punct("{") => Ok(Stmt::Block(self.parse_block_body()?)),
            TokenKind::Punct(";") => {
                self.advance();
                Ok(Stmt::Empty)
            }
            TokenKind::Identifier(name) => self.parse_keyword_statement(&name),
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_keyword_statement(&mut self, name: &str) -> Result<Stmt, SceneGuardError> {
        match name {
            "var" | "const" => self.parse_var_statement(),
            "let" if self.let_starts_declaration() => self.parse_var_statement(),
            "function" => Ok(Stmt::Function(self.parse_function(false)?)),
            "async" if self.is_keyword_at(1, "function") && !self.peek_nth(1).newline_before => {
                self.advance();
                Ok(Stmt::Function(self.parse_function(true)?))
            }
            "class" => Ok(Stmt::Class(self.parse_class()?)),
            "if" => self.parse_if(),
            "for" => self.parse_for(),
            "while" => {
                self.advance();
                let test = self.parse_paren_expression()?;
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::While { test, body })
            }
            "do" => {
                self.advance();
                let body = Box::new(self.parse_statement()?);
                self.expect_keyword("while")?;
                let test = self.parse_paren_expression()?;
                self.eat_punct(";");
                Ok(Stmt::DoWhile { body, test })
            }
            "return" => {
                self.advance();
                let argument = if self.at_statement_end() {
                    None
                } else {
                    Some(self.with_in(|parser| parser.parse_expression())?)
                };
                self.consume_semicolon()?;
                Ok(Stmt::Return(argument))
            }
            "break" | "continue" => {
                self.advance();
                let label = if self.is_identifier_at(0) && !self.peek().newline_before {
                    Some(self.parse_binding_identifier()?)
                } else {
                    None
                };
                self.consume_semicolon()?;
                if name == "break" {
                    Ok(Stmt::Break(label))
                } else {
                    Ok(Stmt::Continue(label))
                }
            }
            "throw" => {
                self.advance();
                if self.peek().newline_before {
                    return Err(parse_error("Illegal newline after throw", self.peek().location));
                }
                let argument = self.with_in(|parser| parser.parse_expression())?;
                self.consume_semicolon()?;
                Ok(Stmt::Throw(argument))
            }
            "try" => self.parse_try(),
            "switch" => self.parse_switch(),
            "debugger" => {
                self.advance();
                self.consume_semicolon()?;
                Ok(Stmt::Debugger)
            }
            "import" if !self.is_punct_at(1, "(") && !self.is_punct_at(1, ".") => {
                self.parse_import()
            }
            "export" => self.parse_export(),
            _ if self.is_punct_at(1, ":") && self.is_identifier_at(0) => {
                let label = self.parse_binding_identifier()?;
                self.advance();
                let body = Box::new(self.parse_statement()?);
                Ok(Stmt::Labeled { label, body })
            }
            _ => self.parse_expression_statement(),
        }
    }

    fn parse_expression_statement(&mut self) -> Result<Stmt, SceneGuardError> {
        let expr = self.with_in(|parser| parser.parse_expression())?;
        self.consume_semicolon()?;
        Ok(Stmt::Expr(expr))
    }

    fn let_starts_declaration(&self) -> bool {
        self.is_identifier_at(1) || self.is_punct_at(1, "[") || self.is_punct_at(1, "{")
    }

    fn parse_var_statement(&mut self) -> Result<Stmt, SceneGuardError> {
        let decl = self.parse_var_decl()?;
        self.consume_semicolon()?;
        Ok(Stmt::Var(decl))
    }

    fn parse_var_decl(&mut self) -> Result<VarDecl, SceneGuardError> {
        let keyword = self.advance();
        let kind = match &keyword.kind {
            TokenKind::Identifier(name) if name == "var" => VarKind::Var,
            TokenKind::Identifier(name) if name == "let" => VarKind::Let,
            _ => VarKind::Const,
        };
        let mut declarators = Vec::new();
        loop {
            let target = self.parse_binding_target()?;
            let init = if self.eat_punct("=") {
                Some(self.parse_assignment()?)
            } else {
                None
            };
            declarators.push(VarDeclarator { target, init });
            if !self.eat_punct(",") {
                break;
            }
        }
        Ok(VarDecl { kind, declarators })
    }

    fn parse_paren_expression(&mut self) -> Result<Expr, SceneGuardError> {
        self.expect_punct("(")?;
        let expr = self.with_in(|parser| parser.parse_expression())?;
        self.expect_punct(")")?;
        Ok(expr)
    }

    fn parse_if(&mut self) -> Result<Stmt, SceneGuardError> {
        self.advance();
        let test = self.parse_paren_expression()?;
        let consequent = Box::new(self.parse_statement()?);
        let alternate = if self.eat_keyword("else") {
            Some(Box::new(self.parse_statement()?))
        } else {
            None
        };
        Ok(Stmt::If {
            test,
            consequent,
            alternate,
        })
    }

    fn parse_for(&mut self) -> Result<Stmt, SceneGuardError> {
        self.advance();
        self.eat_keyword("await");
        self.expect_punct("(")?;

        let init = if self.is_punct(";") {
            None
        } else if self.is_keyword("var")
            || self.is_keyword("const")
            || (self.is_keyword("let") && self.let_starts_declaration())
        {
            let decl = self.without_in(|parser| parser.parse_var_decl())?;
            if decl.declarators.len() == 1
                && decl.declarators[0].init.is_none()
                && (self.is_keyword("in") || self.is_keyword("of"))
            {
                let kind = decl.kind;
                let mut declarators = decl.declarators;
                let declarator = declarators.remove(0);
                return self.parse_for_in_of(ForHead::Var(kind, declarator.target));
            }
            Some(ForInit::Var(decl))
        } else {
            let location = self.peek().location;
            let expr = self.without_in(|parser| parser.parse_expression())?;
            if self.is_keyword("in") || self.is_keyword("of") {
                let target = expr_to_pattern(expr, location)?;
                return self.parse_for_in_of(ForHead::Target(target));
            }
            Some(ForInit::Expr(expr))
        };

        self.expect_punct(";")?;
        let test = if self.is_punct(";") {
            None
        } else {
            Some(self.with_in(|parser| parser.parse_expression())?)
        };
        self.expect_punct(";")?;
        let update = if self.is_punct(")") {
            None
        } else {
            Some(self.with_in(|parser| parser.parse_expression())?)
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        Ok(Stmt::For {
            init,
            test,
            update,
            body,
        })
    }

    fn parse_for_in_of(&mut self, head: ForHead) -> Result<Stmt, SceneGuardError> {
        let is_of = self.is_keyword("of");
        self.advance();
        let right = if is_of {
            self.with_in(|parser| parser.parse_assignment())?
        } else {
            self.with_in(|parser| parser.parse_expression())?
        };
        self.expect_punct(")")?;
        let body = Box::new(self.parse_statement()?);
        if is_of {
            Ok(Stmt::ForOf { head, right, body })
        } else {
            Ok(Stmt::ForIn { head, right, body })
        }
    }

    fn parse_try(&mut self) -> Result<Stmt, SceneGuardError> {
        let try_token = self.advance();
        let block = self.parse_block_body()?;
        let handler = if self.eat_keyword("catch") {
            let param = if self.eat_punct("(") {
                let param = self.parse_binding_target()?;
                self.expect_punct(")")?;
                Some(param)
            } else {
                None
            };
            let body = self.parse_block_body()?;
            Some(CatchClause { param, body })
        } else {
            None
        };
        let finalizer = if self.eat_keyword("finally") {
            Some(self.parse_block_body()?)
        } else {
            None
        };
        if handler.is_none() && finalizer.is_none() {
            return Err(parse_error(
                "Missing catch or finally clause",
                try_token.location,
            ));
        }
        Ok(Stmt::Try {
            block,
            handler,
            finalizer,
        })
    }

    fn parse_switch(&mut self) -> Result<Stmt, SceneGuardError> {
        self.advance();
        let discriminant = self.parse_paren_expression()?;
        self.expect_punct("{")?;
        let mut cases = Vec::new();
        while !self.is_punct("}") {
            let test = if self.eat_keyword("case") {
                Some(self.with_in(|parser| parser.parse_expression())?)
            } else {
                self.expect_keyword("default")?;
                None
            };
            self.expect_punct(":")?;
            let mut consequent = Vec::new();
            while !(self.is_keyword("case")
                || self.is_keyword("default")
                || self.is_punct("}")
                || self.at_eof())
            {
                consequent.push(self.parse_statement()?);
            }
            cases.push(SwitchCase { test, consequent });
        }
        self.advance();
        Ok(Stmt::Switch {
            discriminant,
            cases,
        })
    }

    fn parse_import(&mut self) -> Result<Stmt, SceneGuardError> {
        self.advance();
        let mut locals = Vec::new();
        if let TokenKind::String(source) = &self.peek().kind {
            let source = source.clone();
            self.advance();
            self.consume_semicolon()?;
            return Ok(Stmt::Import(ImportDecl { locals, source }));
        }

        if self.is_identifier_at(0) {
            locals.push(self.parse_binding_identifier()?);
            self.eat_punct(",");
        }
        if self.eat_punct("*") {
            self.expect_keyword("as")?;
            locals.push(self.parse_binding_identifier()?);
        } else if self.eat_punct("{") {
            while !self.is_punct("}") {
                let imported = self.parse_identifier_name()?;
                let local = if self.eat_keyword("as") {
                    self.parse_binding_identifier()?
                } else {
                    imported
                };
                locals.push(local);
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
        }
        self.expect_keyword("from")?;
        let source = self.parse_string_literal()?;
        self.consume_semicolon()?;
        Ok(Stmt::Import(ImportDecl { locals, source }))
    }

    fn parse_export(&mut self) -> Result<Stmt, SceneGuardError> {
        self.advance();
        if self.eat_keyword("default") {
            if self.is_keyword("function") {
                let function = self.parse_function(false)?;
                return Ok(Stmt::Export(ExportDecl::DefaultDeclaration(Box::new(
                    Stmt::Function(function),
                ))));
            }
            if self.is_keyword("async") && self.is_keyword_at(1, "function") {
                self.advance();
                let function = self.parse_function(true)?;
                return Ok(Stmt::Export(ExportDecl::DefaultDeclaration(Box::new(
                    Stmt::Function(function),
                ))));
            }
            if self.is_keyword("class") {
                let class = self.parse_class()?;
                return Ok(Stmt::Export(ExportDecl::DefaultDeclaration(Box::new(
                    Stmt::Class(class),
                ))));
            }
            let expr = self.with_in(|parser| parser.parse_assignment())?;
            self.consume_semicolon()?;
            return Ok(Stmt::Export(ExportDecl::DefaultExpr(expr)));
        }

        if self.eat_punct("*") {
            if self.eat_keyword("as") {
                self.parse_identifier_name()?;
            }
            self.expect_keyword("from")?;
            let source = self.parse_string_literal()?;
            self.consume_semicolon()?;
            return Ok(Stmt::Export(ExportDecl::All { source }));
        }

        if self.eat_punct("{") {
            let mut specifiers = Vec::new();
            while !self.is_punct("}") {
                let local = self.parse_identifier_name()?;
                let exported = if self.eat_keyword("as") {
                    self.parse_identifier_name()?.name
                } else {
                    local.name.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.eat_punct(",") {
                    break;
                }
            }
            self.expect_punct("}")?;
            let source = if self.eat_keyword("from") {
                Some(self.parse_string_literal()?)
            } else {
                None
            };
            self.consume_semicolon()?;
            return Ok(Stmt::Export(ExportDecl::Named { specifiers, source }));
        }

        let location = self.peek().location;
        let declaration = self.parse_statement()?;
        match declaration {
            Stmt::Var(_) | Stmt::Function(_) | Stmt::Class(_) => Ok(Stmt::Export(
                ExportDecl::Declaration(Box::new(declaration)),
            )),
            _ => Err(parse_error("Unexpected export target", location)),
        }
    }

    // ------------------------------------------------------- functions, classes

    fn parse_function(&mut self, is_async: bool) -> Result<Function, SceneGuardError> {
        self.expect_keyword("function")?;
        let is_generator = self.eat_punct("*");
        let id = if self.is_punct("(") {
            None
        } else {
            Some(self.parse_binding_identifier()?)
        };
        let params = self.parse_formal_params()?;
        let body = self.parse_function_body_block()?;
        Ok(Function {
            id,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_generator,
            is_arrow: false,
        })
    }

    fn parse_formal_params(&mut self) -> Result<Vec<Pattern>, SceneGuardError> {
        self.expect_punct("(")?;
        let mut params = Vec::new();
        while !self.is_punct(")") {
            if self.eat_punct("...") {
                params.push(Pattern::Rest(Box::new(self.parse_binding_target()?)));
            } else {
                params.push(self.parse_binding_element()?);
            }
            if !self.eat_punct(",") {
                break;
            }
        }
        self.expect_punct(")")?;
        Ok(params)
    }

    fn parse_method_function(
        &mut self,
        is_async: bool,
        is_generator: bool,
    ) -> Result<Function, SceneGuardError> {
        let params = self.parse_formal_params()?;
        let body = self.parse_function_body_block()?;
        Ok(Function {
            id: None,
            params,
            body: FunctionBody::Block(body),
            is_async,
            is_generator,
            is_arrow: false,
        })
    }

    fn is_key_terminator_at(&self, offset: usize) -> bool {
        ["(", ":", "=", ";", "}", ","]
            .iter()
            .any(|punct| self.is_punct_at(offset, punct))
    }

    fn parse_method_modifiers(&mut self) -> (bool, bool) {
        let mut is_async = false;
        let mut is_generator = false;
        loop {
            if self.is_keyword("async")
                && !self.is_key_terminator_at(1)
                && !self.peek_nth(1).newline_before
            {
                self.advance();
                is_async = true;
            } else if (self.is_keyword("get") || self.is_keyword("set"))
                && !self.is_key_terminator_at(1)
            {
                self.advance();
            } else if self.eat_punct("*") {
                is_generator = true;
            } else {
                return (is_async, is_generator);
            }
        }
    }

    fn parse_prop_key(&mut self) -> Result<PropKey, SceneGuardError> {
        let kind = self.peek().kind.clone();
        let key = match kind {
            TokenKind::Identifier(name) => PropKey::Ident(name),
            TokenKind::String(value) => PropKey::String(value),
            TokenKind::Number(value) => PropKey::Number(value),
            TokenKind::PrivateName(name) => PropKey::Private(name),
            TokenKind::Punct("[") => {
                self.advance();
                let expr = self.with_in(|parser| parser.parse_assignment())?;
                self.expect_punct("]")?;
                return Ok(PropKey::Computed(Box::new(expr)));
            }
            _ => return Err(self.unexpected()),
        };
        self.advance();
        Ok(key)
    }

    fn parse_class(&mut self) -> Result<Class, SceneGuardError> {
        self.expect_keyword("class")?;
        let id = if self.is_identifier_at(0) && !self.is_keyword("extends") {
            Some(self.parse_binding_identifier()?)
        } else {
            None
        };
        let super_class = if self.eat_keyword("extends") {
            Some(Box::new(self.parse_call_member()?))
        } else {
            None
        };

        self.expect_punct("{")?;
        let mut members = Vec::new();
        while !self.is_punct("}") {
            if self.at_eof() {
                return Err(self.unexpected());
            }
            if self.eat_punct(";") {
                continue;
            }
            let mut is_static = false;
            if self.is_keyword("static") && !self.is_key_terminator_at(1) {
                self.advance();
                is_static = true;
                if self.is_punct("{") {
                    members.push(ClassMember::StaticBlock(self.parse_function_body_block()?));
                    continue;
                }
            }
            let (is_async, is_generator) = self.parse_method_modifiers();
            let key = self.parse_prop_key()?;
            if self.is_punct("(") {
                let function = self.parse_method_function(is_async, is_generator)?;
                members.push(ClassMember::Method {
                    key,
                    function,
                    is_static,
                });
                continue;
            }
            let value = if self.eat_punct("=") {
                Some(self.with_in(|parser| parser.parse_assignment())?)
            } else {
                None
            };
            self.consume_semicolon()?;
            members.push(ClassMember::Field {
                key,
                value,
                is_static,
            });
        }
        self.advance();
        Ok(Class {
            id,
            super_class,
            members,
        })
    }

    // ---------------------------------------------------------------- patterns

    fn parse_binding_target(&mut self) -> Result<Pattern, SceneGuardError> {
        if self.is_punct("[") {
            return self.parse_array_pattern();
        }
        if self.is_punct("{") {
            return self.parse_object_pattern();
        }
        Ok(Pattern::Ident(self.parse_binding_identifier()?))
    }

    fn parse_binding_element(&mut self) -> Result<Pattern, SceneGuardError> {
        let target = self.parse_binding_target()?;
        if self.eat_punct("=") {
            let default = self.with_in(|parser| parser.parse_assignment())?;
            return Ok(Pattern::Assign {
                target: Box::new(target),
                default: Box::new(default),
            });
        }
        Ok(target)
    }

    fn parse_array_pattern(&mut self) -> Result<Pattern, SceneGuardError> {
        self.advance();
        let mut elements = Vec::new();
        loop {
            if self.is_punct("]") {
                break;
            }
            if self.eat_punct(",") {
                elements.push(None);
                continue;
            }
            if self.eat_punct("...") {
                elements.push(Some(Pattern::Rest(Box::new(self.parse_binding_target()?))));
            } else {
                elements.push(Some(self.parse_binding_element()?));
            }
            if !self.is_punct("]") {
                self.expect_punct(",")?;
            }
        }
        self.expect_punct("]")?;
        Ok(Pattern::Array(elements))
    }

    fn parse_object_pattern(&mut self) -> Result<Pattern, SceneGuardError> {
        self.advance();
        let mut props = Vec::new();
        while !self.is_punct("}") {
            if self.eat_punct("...") {
                props.push(ObjectPatternProp::Rest(self.parse_binding_target()?));
            } else {
                let key_location = self.peek().location;
                let key = self.parse_prop_key()?;
                if self.eat_punct(":") {
                    let value = self.parse_binding_element()?;
                    props.push(ObjectPatternProp::KeyValue { key, value });
                } else if let PropKey::Ident(name) = key {
                    let default = if self.eat_punct("=") {
                        Some(self.with_in(|parser| parser.parse_assignment())?)
                    } else {
                        None
                    };
                    props.push(ObjectPatternProp::Shorthand {
                        ident: Ident {
                            name,
                            location: key_location,
                        },
                        default,
                    });
                } else {
                    return Err(self.unexpected());
                }
            }
            if !self.is_punct("}") {
                self.expect_punct(",")?;
            }
        }
        self.advance();
        Ok(Pattern::Object(props))
    }

    // ------------------------------------------------------------- expressions

    fn parse_expression(&mut self) -> Result<Expr, SceneGuardError> {
        let first = self.parse_assignment()?;
        if !self.is_punct(",") {
            return Ok(first);
        }
        let mut expressions = vec![first];
        while self.eat_punct(",") {
            expressions.push(self.parse_assignment()?);
        }
        Ok(Expr::Sequence(expressions))
    }

    fn parse_assignment(&mut self) -> Result<Expr, SceneGuardError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }
        if self.is_keyword("yield") {
            return self.parse_yield();
        }

        let left = self.parse_conditional()?;
        let TokenKind::Punct(op) = self.peek().kind else {
            return Ok(left);
        };
        if !ASSIGN_OPS.contains(&op) {
            return Ok(left);
        }
        let location = self.peek().location;
        self.advance();
        let target = expr_to_pattern(left, location)?;
        if op != "=" && !matches!(target, Pattern::Ident(_) | Pattern::Expr(_)) {
            return Err(parse_error(
                "Invalid left-hand side in assignment",
                location,
            ));
        }
        let value = self.parse_assignment()?;
        Ok(Expr::Assign {
            op: op.to_string(),
            target: Box::new(target),
            value: Box::new(value),
        })
    }

    fn parse_yield(&mut self) -> Result<Expr, SceneGuardError> {
        self.advance();
        self.eat_punct("*");
        let ends = [")", "]", "}", ",", ";", ":"]
            .iter()
            .any(|punct| self.is_punct(punct));
        if ends || self.at_eof() || self.peek().newline_before {
            return Ok(Expr::Yield(None));
        }
        Ok(Expr::Yield(Some(Box::new(self.parse_assignment()?))))
    }

    fn arrow_follows_paren(&self, offset: usize) -> bool {
        let mut depth = 0i32;
        let mut index = self.pos + offset;
        while let Some(token) = self.tokens.get(index) {
            match &token.kind {
                TokenKind::Punct("(" | "[" | "{") => depth += 1,
                TokenKind::Punct(")" | "]" | "}") => {
                    depth -= 1;
                    if depth == 0 {
                        return self.tokens.get(index + 1).is_some_and(|next| {
                            next.kind == TokenKind::Punct("=>") && !next.newline_before
                        });
                    }
                }
                TokenKind::Eof => return false,
                _ => {}
            }
            index += 1;
        }
        false
    }

    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, SceneGuardError> {
        let mut offset = 0;
        let mut is_async = false;
        if self.is_keyword("async")
            && !self.peek_nth(1).newline_before
            && ((self.is_identifier_at(1) && self.is_punct_at(2, "=>"))
                || (self.is_punct_at(1, "(") && self.arrow_follows_paren(1)))
        {
            is_async = true;
            offset = 1;
        }

        let params = if self.is_identifier_at(offset) && self.is_punct_at(offset + 1, "=>") {
            if is_async {
                self.advance();
            }
            vec![Pattern::Ident(self.parse_binding_identifier()?)]
        } else if self.is_punct_at(offset, "(") && self.arrow_follows_paren(offset) {
            if is_async {
                self.advance();
            }
            self.parse_formal_params()?
        } else {
            return Ok(None);
        };

        self.expect_punct("=>")?;
        let body = if self.is_punct("{") {
            FunctionBody::Block(self.parse_function_body_block()?)
        } else {
            FunctionBody::Expr(Box::new(self.parse_assignment()?))
        };
        Ok(Some(Expr::Function(Box::new(Function {
            id: None,
            params,
            body,
            is_async,
            is_generator: false,
            is_arrow: true,
        }))))
    }

    fn parse_conditional(&mut self) -> Result<Expr, SceneGuardError> {
        let test = self.parse_binary(1)?;
        if !self.eat_punct("?") {
            return Ok(test);
        }
        let consequent = self.with_in(|parser| parser.parse_assignment())?;
        self.expect_punct(":")?;
        let alternate = self.parse_assignment()?;
        Ok(Expr::Conditional {
            test: Box::new(test),
            consequent: Box::new(consequent),
            alternate: Box::new(alternate),
        })
    }

    fn binary_operator(&self) -> Option<(String, u8)> {
        let precedence = match &self.peek().kind {
            TokenKind::Punct(op) => match *op {
                "??" => 1,
                "||" => 2,
                "&&" => 3,
                "|" => 4,
                "^" => 5,
                "&" => 6,
                "==" | "!=" | "===" | "!==" => 7,
                "<" | ">" | "<=" | ">=" => 8,
                "<<" | ">>" | ">>>" => 9,
                "+" | "-" => 10,
                "*" | "/" | "%" => 11,
                "**" => 12,
                _ => return None,
            },
            TokenKind::Identifier(name) if name == "instanceof" => 8,
            TokenKind::Identifier(name) if name == "in" && !self.no_in => 8,
            _ => return None,
        };
        let op = match &self.peek().kind {
            TokenKind::Punct(op) => (*op).to_string(),
            TokenKind::Identifier(name) => name.clone(),
            _ => return None,
        };
        Some((op, precedence))
    }

    fn parse_binary(&mut self, min_precedence: u8) -> Result<Expr, SceneGuardError> {
        let mut left = self.parse_unary()?;
        while let Some((op, precedence)) = self.binary_operator() {
            if precedence < min_precedence {
                break;
            }
            self.advance();
            let next_min = if op == "**" {
                precedence
            } else {
                precedence + 1
            };
            let right = self.parse_binary(next_min)?;
            left = Expr::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
            };
        }
        Ok(left)
    }

    fn await_starts_expression(&self) -> bool {
        let terminators = [")", ";", ",", "=", ".", "]", "}", ":", "?."];
        !self.at_eof_at(1)
            && !terminators
                .iter()
                .any(|punct| self.is_punct_at(1, punct))
    }

    fn at_eof_at(&self, offset: usize) -> bool {
        self.peek_nth(offset).kind == TokenKind::Eof
    }

    fn parse_unary(&mut self) -> Result<Expr, SceneGuardError> {
        let kind = self.peek().kind.clone();
        match kind {
            TokenKind::Punct(op @ ("!" | "~" | "+" | "-")) => {
                self.advance();
                let argument = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: op.to_string(),
                    argument: Box::new(argument),
                })
            }
            TokenKind::Punct(op @ ("++" | "--")) => {
                self.advance();
                let argument = self.parse_unary()?;
                Ok(Expr::Update {
                    op: op.to_string(),
                    prefix: true,
                    argument: Box::new(argument),
                })
            }
            TokenKind::Identifier(name)
                if name == "typeof" || name == "void" || name == "delete" =>
            {
                self.advance();
                let argument = self.parse_unary()?;
                Ok(Expr::Unary {
                    op: name,
                    argument: Box::new(argument),
                })
            }
            TokenKind::Identifier(name) if name == "await" && self.await_starts_expression() => {
                self.advance();
                Ok(Expr::Await(Box::new(self.parse_unary()?)))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> Result<Expr, SceneGuardError> {
        let expr = self.parse_call_member()?;
        if (self.is_punct("++") || self.is_punct("--")) && !self.peek().newline_before {
            let TokenKind::Punct(op) = self.advance().kind else {
                return Ok(expr);
            };
            return Ok(Expr::Update {
                op: op.to_string(),
                prefix: false,
                argument: Box::new(expr),
            });
        }
        Ok(expr)
    }

    fn parse_member_property(&mut self) -> Result<MemberProp, SceneGuardError> {
        if let TokenKind::PrivateName(name) = &self.peek().kind {
            let ident = Ident {
                name: name.clone(),
                location: self.peek().location,
            };
            self.advance();
            return Ok(MemberProp::Private(ident));
        }
        Ok(MemberProp::Ident(self.parse_identifier_name()?))
    }

    fn parse_call_member(&mut self) -> Result<Expr, SceneGuardError> {
        let mut expr = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let property = self.parse_member_property()?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("?.") {
                if self.is_punct("(") {
                    let arguments = self.parse_arguments()?;
                    expr = Expr::Call {
                        callee: Box::new(expr),
                        arguments,
                        optional: true,
                    };
                } else if self.eat_punct("[") {
                    let property = self.with_in(|parser| parser.parse_expression())?;
                    self.expect_punct("]")?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property: MemberProp::Computed(Box::new(property)),
                        optional: true,
                    };
                } else {
                    let property = self.parse_member_property()?;
                    expr = Expr::Member {
                        object: Box::new(expr),
                        property,
                        optional: true,
                    };
                }
            } else if self.eat_punct("[") {
                let property = self.with_in(|parser| parser.parse_expression())?;
                self.expect_punct("]")?;
                expr = Expr::Member {
                    object: Box::new(expr),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else if self.is_punct("(") {
                let arguments = self.parse_arguments()?;
                expr = Expr::Call {
                    callee: Box::new(expr),
                    arguments,
                    optional: false,
                };
            } else if let TokenKind::Template(template) = &self.peek().kind {
                let template = template.clone();
                self.advance();
                expr = self.build_template(Some(Box::new(expr)), template)?;
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_new(&mut self) -> Result<Expr, SceneGuardError> {
        self.advance();
        if self.eat_punct(".") {
            self.parse_identifier_name()?;
            return Ok(Expr::NewTarget);
        }
        let mut callee = if self.is_keyword("new") {
            self.parse_new()?
        } else {
            self.parse_primary()?
        };
        loop {
            if self.eat_punct(".") {
                let property = self.parse_member_property()?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property,
                    optional: false,
                };
            } else if self.eat_punct("[") {
                let property = self.with_in(|parser| parser.parse_expression())?;
                self.expect_punct("]")?;
                callee = Expr::Member {
                    object: Box::new(callee),
                    property: MemberProp::Computed(Box::new(property)),
                    optional: false,
                };
            } else {
                break;
            }
        }
        let arguments = if self.is_punct("(") {
            self.parse_arguments()?
        } else {
            Vec::new()
        };
        Ok(Expr::New {
            callee: Box::new(callee),
            arguments,
        })
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, SceneGuardError> {
        self.expect_punct("(")?;
        let arguments = self.with_in(|parser| {
            let mut arguments = Vec::new();
            while !parser.is_punct(")") {
                if parser.eat_punct("...") {
                    arguments.push(Expr::Spread(Box::new(parser.parse_assignment()?)));
                } else {
                    arguments.push(parser.parse_assignment()?);
                }
                if !parser.eat_punct(",") {
                    break;
                }
            }
            Ok(arguments)
        })?;
        self.expect_punct(")")?;
        Ok(arguments)
    }

    fn build_template(
        &mut self,
        tag: Option<Box<Expr>>,
        template: TemplateToken,
    ) -> Result<Expr, SceneGuardError> {
        let mut expressions = Vec::new();
        for tokens in template.expressions {
            let mut nested = Parser::new(tokens);
            let expr = nested.parse_expression()?;
            if !nested.at_eof() {
                return Err(nested.unexpected());
            }
            expressions.push(expr);
        }
        Ok(Expr::Template {
            tag,
            quasis: template.quasis,
            expressions,
        })
    }

    fn parse_primary(&mut self) -> Result<Expr, SceneGuardError> {
        let token = self.peek().clone();
        match token.kind {
            TokenKind::Identifier(name) => self.parse_identifier_primary(name, token.location),
            TokenKind::Number(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Number(value)))
            }
            TokenKind::String(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::String(value)))
            }
            TokenKind::Regex(value) => {
                self.advance();
                Ok(Expr::Literal(Literal::Regex(value)))
            }
            TokenKind::Template(template) => {
                self.advance();
                self.build_template(None, template)
            }
            TokenKind::Punct("(") => {
                self.advance();
                let expr = self.with_in(|parser| parser.parse_expression())?;
                self.expect_punct(")")?;
                Ok(expr)
            }
            TokenKind::Punct("[") => self.parse_array_literal(),
            TokenKind::Punct("{") => self.parse_object_literal(),
            _ => Err(self.unexpected()),
        }
    }

    fn parse_identifier_primary(
        &mut self,
        name: String,
        location: SourceLocation,
    ) -> Result<Expr, SceneGuardError> {
        match name.as_str() {
            "this" => {
                self.advance();
                Ok(Expr::This)
            }
            "super" => {
                self.advance();
                Ok(Expr::Super)
            }
            "null" => {
                self.advance();
                Ok(Expr::Literal(Literal::Null))
            }
            "true" | "false" => {
                self.advance();
                Ok(Expr::Literal(Literal::Bool(name == "true")))
            }
            "function" => Ok(Expr::Function(Box::new(self.parse_function(false)?))),
            "async" if self.is_keyword_at(1, "function") && !self.peek_nth(1).newline_before => {
                self.advance();
                Ok(Expr::Function(Box::new(self.parse_function(true)?)))
            }
            "class" => Ok(Expr::Class(Box::new(self.parse_class()?))),
            "import" => {
                self.advance();
                if self.eat_punct(".") {
                    self.parse_identifier_name()?;
                    return Ok(Expr::ImportMeta);
                }
                self.expect_punct("(")?;
                let argument = self.with_in(|parser| parser.parse_assignment())?;
                self.eat_punct(",");
                self.expect_punct(")")?;
                Ok(Expr::ImportCall(Box::new(argument)))
            }
            _ if RESERVED_WORDS.contains(&name.as_str()) => Err(self.unexpected()),
            _ => {
                self.advance();
                Ok(Expr::Ident(Ident { name, location }))
            }
        }
    }

    fn parse_array_literal(&mut self) -> Result<Expr, SceneGuardError> {
        self.advance();
        let elements = self.with_in(|parser| {
            let mut elements = Vec::new();
            loop {
                if parser.is_punct("]") {
                    break;
                }
                if parser.eat_punct(",") {
                    elements.push(None);
                    continue;
                }
                let element = if parser.eat_punct("...") {
                    Expr::Spread(Box::new(parser.parse_assignment()?))
                } else {
                    parser.parse_assignment()?
                };
                elements.push(Some(element));
                if !parser.is_punct("]") {
                    parser.expect_punct(",")?;
                }
            }
            Ok(elements)
        })?;
        self.expect_punct("]")?;
        Ok(Expr::Array(elements))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, SceneGuardError> {
        self.advance();
        let props = self.with_in(|parser| {
            let mut props = Vec::new();
            while !parser.is_punct("}") {
                if parser.eat_punct("...") {
                    props.push(Prop::Spread(parser.parse_assignment()?));
                } else {
                    props.push(parser.parse_object_property()?);
                }
                if !parser.is_punct("}") {
                    parser.expect_punct(",")?;
                }
            }
            Ok(props)
        })?;
        self.expect_punct("}")?;
        Ok(Expr::Object(props))
    }

    fn parse_object_property(&mut self) -> Result<Prop, SceneGuardError> {
        let (is_async, is_generator) = self.parse_method_modifiers();
        let key_location = self.peek().location;
        let key = self.parse_prop_key()?;
        if self.is_punct("(") {
            let function = self.parse_method_function(is_async, is_generator)?;
            return Ok(Prop::Method { key, function });
        }
        if self.eat_punct(":") {
            let value = self.parse_assignment()?;
            return Ok(Prop::KeyValue { key, value });
        }
        let PropKey::Ident(name) = key else {
            return Err(self.unexpected());
        };
        let default = if self.eat_punct("=") {
            Some(self.parse_assignment()?)
        } else {
            None
        };
        Ok(Prop::Shorthand {
            ident: Ident {
                name,
                location: key_location,
            },
            default,
        })
    }
}

fn expr_to_pattern(expr: Expr, location: SourceLocation) -> Result<Pattern, SceneGuardError> {
    match expr {
        Expr::Ident(ident) => Ok(Pattern::Ident(ident)),
        Expr::Member { .. } => Ok(Pattern::Expr(Box::new(expr))),
        Expr::Array(elements) => {
            let mut patterns = Vec::new();
            for element in elements {
                let pattern = match element {
                    None => None,
                    Some(Expr::Spread(inner)) => {
                        Some(Pattern::Rest(Box::new(expr_to_pattern(*inner, location)?)))
                    }
                    Some(other) => Some(expr_to_pattern(other, location)?),
                };
                patterns.push(pattern);
            }
            Ok(Pattern::Array(patterns))
        }
        Expr::Object(props) => {
            let mut patterns = Vec::new();
            for prop in props {
                let pattern = match prop {
                    Prop::KeyValue { key, value } => ObjectPatternProp::KeyValue {
                        key,
                        value: expr_to_pattern(value, location)?,
                    },
                    Prop::Shorthand { ident, default } => {
                        ObjectPatternProp::Shorthand { ident, default }
                    }
                    Prop::Spread(inner) => {
                        ObjectPatternProp::Rest(expr_to_pattern(inner, location)?)
                    }
                    Prop::Method { .. } => {
                        return Err(parse_error("Invalid destructuring target", location));
                    }
                };
                patterns.push(pattern);
            }
            Ok(Pattern::Object(patterns))
        }
        Expr::Assign { op, target, value } if op == "=" => Ok(Pattern::Assign {
            target,
            default: value,
        }),
        _ => Err(parse_error("Invalid assignment target", location)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(source: &str) -> Program {
        parse_program(source).expect("program should parse")
    }

    #[test]
    fn parses_generated_component_body_with_hooks_and_create_element() {
        let program = parse(
            r#"
const meshRef = useRef();
const [hovered, setHovered] = useState(false);
useFrame((state, delta) => {
  if (meshRef.current) meshRef.current.rotation.y += delta * params.speed;
});
return React.createElement('mesh', {
  ref: meshRef,
  onPointerOver: () => setHovered(true),
}, React.createElement('boxGeometry', { args: [1, 1, 1] }));
"#,
        );
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[3], Stmt::Return(Some(_))));
    }

    #[test]
    fn parses_destructuring_defaults_and_rest_parameters() {
        let program = parse("function f({ a, b: [c = 1, ...d] }, e = 2, ...rest) { return a + c; }");
        let Stmt::Function(function) = &program.body[0] else {
            panic!("expected function");
        };
        assert_eq!(function.params.len(), 3);
        let names: Vec<&str> = function
            .params
            .iter()
            .flat_map(|param| param.bound_names())
            .map(|ident| ident.name.as_str())
            .collect();
        assert_eq!(names, vec!["a", "c", "d", "e", "rest"]);
    }

    #[test]
    fn parses_arrow_functions_in_all_shapes() {
        let program = parse(
            "const a = x => x; const b = (x, { y }) => ({ x, y }); const c = async () => { await go(); };",
        );
        let Stmt::Var(decl) = &program.body[2] else {
            panic!("expected var");
        };
        let Some(Expr::Function(function)) = &decl.declarators[0].init else {
            panic!("expected arrow");
        };
        assert!(function.is_arrow);
        assert!(function.is_async);
    }

    #[test]
    fn applies_automatic_semicolon_insertion_and_restricted_return() {
        let program = parse("let a = 1\nlet b = a\nreturn\na + b");
        assert_eq!(program.body.len(), 4);
        assert!(matches!(program.body[2], Stmt::Return(None)));
    }

    #[test]
    fn parses_for_in_of_classes_switch_and_try() {
        let program = parse(
            r#"
for (const item of items) { use(item); }
for (let i = 0, n = 3; i < n; i++) {}
for (key in obj) {}
class Orbit extends Base { static count = 0; #secret = 1; get speed() { return this.#secret; } tick() {} }
switch (mode) { case 'a': run(); break; default: stop(); }
try { risky(); } catch ({ message }) { log(message); } finally { done(); }
label: for (;;) { break label; }
"#,
        );
        assert_eq!(program.body.len(), 7);
        assert!(matches!(program.body[0], Stmt::ForOf { .. }));
        assert!(matches!(program.body[2], Stmt::ForIn { .. }));
        assert!(matches!(program.body[6], Stmt::Labeled { .. }));
    }

    #[test]
    fn parses_imports_exports_templates_and_optional_chaining() {
        let program = parse(
            r#"
import React, { useState as useLocal } from 'react';
import * as THREE from 'three';
export default function Scene() { return `${a?.b ?? 'x'}-${c?.[0]}` + f?.(); }
export { Scene as Main };
"#,
        );
        let Stmt::Import(import) = &program.body[0] else {
            panic!("expected import");
        };
        let locals: Vec<&str> = import.locals.iter().map(|ident| ident.name.as_str()).collect();
        assert_eq!(locals, vec!["React", "useLocal"]);
        assert!(matches!(
            program.body[2],
            Stmt::Export(ExportDecl::DefaultDeclaration(_))
        ));
    }

    #[test]
    fn converts_assignment_targets_into_patterns() {
        let program = parse("[a, b] = [b, a]; ({ x, y: z = 1 } = point); obj.prop += 1;");
        let Stmt::Expr(Expr::Assign { target, .. }) = &program.body[0] else {
            panic!("expected assignment");
        };
        assert!(matches!(target.as_ref(), Pattern::Array(_)));
        let Stmt::Expr(Expr::Assign { target, op, .. }) = &program.body[2] else {
            panic!("expected compound assignment");
        };
        assert_eq!(op, "+=");
        assert!(matches!(target.as_ref(), Pattern::Expr(_)));
    }

    #[test]
    fn reports_syntax_errors_with_location_in_message() {
        let error = parse_program("const a = ;").expect_err("should fail");
        assert_eq!(error.code, "JS_PARSE_ERROR");
        assert_eq!(error.message, "Unexpected token ';' (1:11)");

        let error = parse_program("function f() {\n  return 1\n").expect_err("should fail");
        assert!(error.message.starts_with("Unexpected end of input"));

        let error = parse_program("a b").expect_err("should fail");
        assert!(error.message.starts_with("Missing semicolon"));

        let error = parse_program("1 = 2").expect_err("should fail");
        assert!(error.message.starts_with("Invalid assignment target"));
    }
}
