use std::str::FromStr;

use hashbrown::HashSet;

use crate::{
    frontend::{
        SourceFile,
        lexer::{Keyword, Lexer, Token, TokenKind},
    },
    middle::mir,
};

#[derive(Debug)]
pub struct Parser<'source> {
    lexer: Lexer<'source>,
}

impl<'source> Parser<'source> {
    /// Reads a whole compilation unit. Identifiers that name a global, a
    /// function or a built-in become names and everything else becomes a
    /// temporary.
    pub fn parse_compilation_unit(source_file: &'source SourceFile) -> mir::CompilationUnit {
        let mut parser = Self {
            lexer: Lexer::new(source_file),
        };

        let mut unit = mir::CompilationUnit::default();

        while let Some(peeked) = parser.lexer.peek() {
            match peeked.kind {
                TokenKind::Keyword(Keyword::Const) => {
                    unit.global_variables.push(parser.parse_global_variable())
                }
                TokenKind::Keyword(Keyword::Function) => unit.functions.push(parser.parse_function()),
                _ => parser.report_fatal_error(&format!(
                    "Expected `const` or `function` but found: {} ({:?})",
                    parser.value_of(&peeked),
                    peeked.kind
                )),
            }
        }

        resolve_names(unit)
    }

    fn report_fatal_error(&self, message: &str) -> ! {
        eprintln!(
            "Fatal error reported in Parser ({}:{}:{}):",
            self.lexer.source().origin,
            self.lexer.line_number() + 1,
            self.lexer.column()
        );
        eprintln!("{message}");
        std::process::exit(1);
    }

    fn value_of(&self, token: &Token) -> &'source str {
        self.lexer.source().value_of_span(token.span)
    }

    fn expect_peek(&mut self, expecting: &str) -> Token {
        let Some(token) = self.lexer.peek() else {
            self.report_fatal_error(&format!("Expected {expecting} but reached end of file"))
        };

        token
    }

    fn expect_next(&mut self, expecting: &str) -> Token {
        let Some(token) = self.lexer.next() else {
            self.report_fatal_error(&format!("Expected {expecting} but reached end of file"))
        };

        token
    }

    fn expect_next_to_be(&mut self, kind: TokenKind) -> Token {
        let token = self.expect_next(&format!("{kind:?}"));

        if token.kind != kind {
            self.report_fatal_error(&format!(
                "Expected {:?} but found {:?} ({})",
                kind,
                token.kind,
                self.value_of(&token)
            ))
        }

        token
    }

    fn expect_keyword(&mut self, keyword: Keyword) -> Token {
        self.expect_next_to_be(TokenKind::Keyword(keyword))
    }

    fn expect_identifier(&mut self) -> String {
        let token = self.expect_next_to_be(TokenKind::Identifier);
        self.value_of(&token).to_owned()
    }

    fn next_is(&mut self, kind: TokenKind) -> bool {
        self.lexer.peek().is_some_and(|token| token.kind == kind)
    }

    /// const NAME = "content";
    fn parse_global_variable(&mut self) -> mir::GlobalVariable {
        self.expect_keyword(Keyword::Const);
        let name = self.expect_identifier();
        self.expect_next_to_be(TokenKind::Equals);

        let literal = self.expect_next_to_be(TokenKind::StringLiteral);
        let content = self.unescape_string(self.value_of(&literal));
        self.expect_next_to_be(TokenKind::Semicolon);

        mir::GlobalVariable { name, content }
    }

    fn unescape_string(&self, literal: &str) -> String {
        let inner = &literal[1..literal.len() - 1];
        let mut content = String::with_capacity(inner.len());
        let mut chars = inner.chars();

        while let Some(c) = chars.next() {
            if c != '\\' {
                content.push(c);
                continue;
            }

            match chars.next() {
                Some('n') => content.push('\n'),
                Some('t') => content.push('\t'),
                Some('"') => content.push('"'),
                Some('\\') => content.push('\\'),
                other => self.report_fatal_error(&format!("Unknown escape sequence: \\{other:?}")),
            }
        }

        content
    }

    /// function NAME { let p = _ARG0; statements }
    fn parse_function(&mut self) -> mir::Function {
        self.expect_keyword(Keyword::Function);
        let name = self.expect_identifier();
        self.expect_next_to_be(TokenKind::OpenBrace);

        let mut parameters = Vec::new();
        while self.next_is(TokenKind::Keyword(Keyword::Let)) {
            self.expect_keyword(Keyword::Let);
            let parameter = self.expect_identifier();
            self.expect_next_to_be(TokenKind::Equals);

            let argument = self.expect_identifier();
            if argument != format!("_ARG{}", parameters.len()) {
                self.report_fatal_error(&format!(
                    "Expected _ARG{} but found {argument}",
                    parameters.len()
                ));
            }
            self.expect_next_to_be(TokenKind::Semicolon);

            parameters.push(parameter);
        }

        let mut body = Vec::new();
        while !self.next_is(TokenKind::CloseBrace) {
            body.push(self.parse_statement());
        }
        self.expect_next_to_be(TokenKind::CloseBrace);

        let has_return = body
            .iter()
            .any(|statement| matches!(statement, mir::Statement::Return(Some(_))));

        mir::Function {
            name,
            parameters,
            body,
            has_return,
        }
    }

    fn parse_statement(&mut self) -> mir::Statement {
        let peeked = self.expect_peek("statement");

        match peeked.kind {
            TokenKind::Keyword(Keyword::Goto) => {
                self.expect_keyword(Keyword::Goto);
                let label = self.expect_identifier();
                self.expect_next_to_be(TokenKind::Semicolon);

                mir::Statement::Jump(label)
            }
            TokenKind::Keyword(Keyword::If) => {
                self.expect_keyword(Keyword::If);
                self.expect_next_to_be(TokenKind::OpenParen);
                let condition = self.parse_expression();
                self.expect_next_to_be(TokenKind::CloseParen);
                self.expect_keyword(Keyword::Goto);
                let label = self.expect_identifier();
                self.expect_next_to_be(TokenKind::Semicolon);

                mir::Statement::ConditionalJumpFallThrough { condition, label }
            }
            TokenKind::Keyword(Keyword::Return) => {
                self.expect_keyword(Keyword::Return);
                let value = if self.next_is(TokenKind::Semicolon) {
                    None
                } else {
                    Some(self.parse_expression())
                };
                self.expect_next_to_be(TokenKind::Semicolon);

                mir::Statement::Return(value)
            }
            TokenKind::Keyword(Keyword::Mem) => {
                self.expect_keyword(Keyword::Mem);
                self.expect_next_to_be(TokenKind::OpenBracket);
                let address = self.parse_expression();
                self.expect_next_to_be(TokenKind::CloseBracket);
                self.expect_next_to_be(TokenKind::Equals);
                let source = self.parse_expression();
                self.expect_next_to_be(TokenKind::Semicolon);

                mir::Statement::MoveMemory { address, source }
            }
            TokenKind::Identifier => {
                let identifier = self.expect_identifier();
                let next = self.expect_next("`:`, `=` or `(`");

                match next.kind {
                    TokenKind::Colon => mir::Statement::Label(identifier),
                    TokenKind::OpenParen => {
                        self.parse_call_rest(mir::Expression::Temporary(identifier), None)
                    }
                    TokenKind::Equals => {
                        let source = self.parse_expression();

                        if self.next_is(TokenKind::OpenParen) {
                            self.expect_next_to_be(TokenKind::OpenParen);
                            return self.parse_call_rest(source, Some(identifier));
                        }
                        self.expect_next_to_be(TokenKind::Semicolon);

                        mir::Statement::MoveTemporary {
                            destination: identifier,
                            source,
                        }
                    }
                    _ => self.report_fatal_error(&format!(
                        "Expected `:`, `=` or `(` after {identifier} but found {}",
                        self.value_of(&next)
                    )),
                }
            }
            _ => self.report_fatal_error(&format!(
                "Expected statement but found: {} ({:?})",
                self.value_of(&peeked),
                peeked.kind
            )),
        }
    }

    /// a, b); with the opening paren already consumed
    fn parse_call_rest(
        &mut self,
        callee: mir::Expression,
        collector: Option<String>,
    ) -> mir::Statement {
        let mut arguments = Vec::new();

        while !self.next_is(TokenKind::CloseParen) {
            arguments.push(self.parse_expression());

            if !self.next_is(TokenKind::CloseParen) {
                self.expect_next_to_be(TokenKind::Comma);
            }
        }
        self.expect_next_to_be(TokenKind::CloseParen);
        self.expect_next_to_be(TokenKind::Semicolon);

        mir::Statement::Call {
            callee,
            arguments,
            collector,
        }
    }

    fn parse_expression(&mut self) -> mir::Expression {
        let token = self.expect_next("expression");

        match token.kind {
            TokenKind::IntegerLiteral => {
                let value = self.value_of(&token);
                match value.parse() {
                    Ok(value) => mir::Expression::Constant(value),
                    Err(_) => self.report_fatal_error(&format!("Integer literal {value} does not fit in 64 bits")),
                }
            }
            TokenKind::Identifier => mir::Expression::Temporary(self.value_of(&token).to_owned()),
            TokenKind::Keyword(Keyword::Mem) => {
                self.expect_next_to_be(TokenKind::OpenBracket);
                let address = self.parse_expression();
                self.expect_next_to_be(TokenKind::CloseBracket);

                mir::Expression::memory(address)
            }
            TokenKind::OpenParen => {
                let left = self.parse_expression();
                let operator_token = self.expect_next("binary operator");
                let operator = match mir::BinaryOperator::from_str(self.value_of(&operator_token)) {
                    Ok(operator) => operator,
                    Err(_) => self.report_fatal_error(&format!(
                        "Expected binary operator but found {}",
                        self.value_of(&operator_token)
                    )),
                };
                let right = self.parse_expression();
                self.expect_next_to_be(TokenKind::CloseParen);

                mir::Expression::binary(operator, left, right)
            }
            _ => self.report_fatal_error(&format!(
                "Expected expression but found: {} ({:?})",
                self.value_of(&token),
                token.kind
            )),
        }
    }
}

/// Turns temporaries that refer to globals, functions or built-ins into
/// names.
fn resolve_names(unit: mir::CompilationUnit) -> mir::CompilationUnit {
    let names = unit
        .global_variables
        .iter()
        .map(|global| global.name.clone())
        .chain(unit.functions.iter().map(|function| function.name.clone()))
        .collect::<HashSet<_>>();

    let resolve = |expression: &mir::Expression| {
        expression.rewrite_bottom_up(&mut |expression| match expression {
            mir::Expression::Temporary(name)
                if names.contains(&name) || mir::Builtin::from_str(&name).is_ok() =>
            {
                mir::Expression::Name(name)
            }
            expression => expression,
        })
    };

    unit.map_functions(|function| {
        function.with_body(
            function
                .body
                .iter()
                .map(|statement| statement.map_expressions(&resolve))
                .collect(),
        )
    })
}
