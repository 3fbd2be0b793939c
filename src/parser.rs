use super::ast::{Expression, FunctionDecl, Literal, Statement};
use super::token::{Token, TokenType};
use std::error::Error;
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

#[derive(Debug)]
pub struct ParseError {
    pub token: Token,
    pub message: String,
}

impl ParseError {
    fn new(token: Token, message: &str) -> ParseError {
        ParseError {
            token,
            message: message.to_string(),
        }
    }
}

impl fmt::Display for ParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self.token.tokentype {
            TokenType::EOF => write!(
                f,
                "[line {}] Error at end: {}",
                self.token.line, self.message
            ),
            _ => write!(
                f,
                "[line {}] Error at '{}': {}",
                self.token.line, self.token.lexeme, self.message
            ),
        }
    }
}

impl Error for ParseError {
    fn description(&self) -> &str {
        &self.message
    }
}

/// What kind of function body is currently being parsed. Drives the static
/// checks on `return` that would otherwise need a separate resolution pass.
#[derive(Clone, Copy, Debug, PartialEq)]
enum FunctionKind {
    Function,
    Method,
    Initializer,
}

pub struct Parser<'a> {
    tokens: &'a [Token],
    current: usize,
    errors: Vec<ParseError>,
    functions: Vec<FunctionKind>,
    class_depth: usize,
}

macro_rules! consume {
    ($self:expr, $pattern:pat, $message:expr) => {
        match $self.peek().tokentype {
            $pattern => Ok($self.advance().clone()),
            _ => Err($self.error($message)),
        }
    };
}

/// Parses a whole program. Each malformed statement produces exactly one
/// diagnostic and no AST node; a program with any syntax error yields `Err`
/// with every error found, so callers never execute a partial parse.
pub fn parse(tokens: &[Token]) -> Result<Vec<Statement>, Vec<ParseError>> {
    let mut parser = Parser {
        tokens,
        current: 0,
        errors: Vec::new(),
        functions: Vec::new(),
        class_depth: 0,
    };
    let mut statements: Vec<Statement> = Vec::new();
    while !parser.is_at_end() {
        if let Some(statement) = parser.declaration() {
            statements.push(statement);
        }
    }
    if parser.errors.is_empty() {
        Ok(statements)
    } else {
        Err(parser.errors)
    }
}

impl<'a> Parser<'a> {
    /// Panic-mode boundary: a failed declaration is reported, the token
    /// stream is resynchronized, and parsing picks up at the next statement.
    fn declaration(&mut self) -> Option<Statement> {
        let result = match self.peek().tokentype {
            TokenType::Class => {
                self.advance();
                self.class_declaration()
            }
            TokenType::Fun => {
                self.advance();
                self.function(FunctionKind::Function)
                    .map(Statement::Function)
            }
            TokenType::Var => {
                self.advance();
                self.var_declaration()
            }
            _ => self.statement(),
        };
        match result {
            Ok(statement) => Some(statement),
            Err(e) => {
                self.errors.push(e);
                self.synchronize();
                None
            }
        }
    }
    fn class_declaration(&mut self) -> Result<Statement, ParseError> {
        let name = consume!(self, TokenType::Identifier(_), "Expect class name.")?;
        consume!(self, TokenType::LeftBrace, "Expect '{' before class body.")?;
        self.class_depth += 1;
        let body = self.class_body();
        self.class_depth -= 1;
        let methods = body?;
        consume!(self, TokenType::RightBrace, "Expect '}' after class body.")?;
        Ok(Statement::Class { name, methods })
    }
    fn class_body(&mut self) -> Result<Vec<Rc<FunctionDecl>>, ParseError> {
        let mut methods: Vec<Rc<FunctionDecl>> = Vec::new();
        while !self.is_at_end() {
            if let TokenType::RightBrace = self.peek().tokentype {
                break;
            }
            methods.push(self.function(FunctionKind::Method)?);
        }
        Ok(methods)
    }
    fn function(&mut self, kind: FunctionKind) -> Result<Rc<FunctionDecl>, ParseError> {
        let what = match kind {
            FunctionKind::Method => "method",
            _ => "function",
        };
        let name = consume!(
            self,
            TokenType::Identifier(_),
            &format!("Expect {} name.", what)
        )?;
        let kind = if kind == FunctionKind::Method && name.lexeme == "init" {
            FunctionKind::Initializer
        } else {
            kind
        };
        consume!(
            self,
            TokenType::LeftParen,
            &format!("Expect '(' after {} name.", what)
        )?;
        let mut params: Vec<Token> = Vec::new();
        match self.peek().tokentype {
            TokenType::RightParen => (),
            _ => loop {
                if params.len() >= 255 {
                    let token = self.peek().clone();
                    self.errors
                        .push(ParseError::new(token, "Can't have more than 255 parameters."));
                }
                params.push(consume!(
                    self,
                    TokenType::Identifier(_),
                    "Expect parameter name."
                )?);
                match self.peek().tokentype {
                    TokenType::Comma => {
                        self.advance();
                    }
                    _ => break,
                }
            },
        }
        consume!(self, TokenType::RightParen, "Expect ')' after parameters.")?;
        consume!(
            self,
            TokenType::LeftBrace,
            &format!("Expect '{{' before {} body.", what)
        )?;
        self.functions.push(kind);
        let body = self.block_statements();
        self.functions.pop();
        Ok(Rc::new(FunctionDecl {
            name,
            params,
            body: body?,
        }))
    }
    fn var_declaration(&mut self) -> Result<Statement, ParseError> {
        let name = consume!(self, TokenType::Identifier(_), "Expect variable name.")?;
        let initializer = match self.peek().tokentype {
            TokenType::Equal => {
                self.advance();
                Some(self.expression()?)
            }
            _ => None,
        };
        consume!(
            self,
            TokenType::Semicolon,
            "Expect ';' after variable declaration."
        )?;
        Ok(Statement::Var { name, initializer })
    }
    fn statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek().tokentype {
            TokenType::If => {
                self.advance();
                self.if_statement()
            }
            TokenType::For => {
                self.advance();
                self.for_statement()
            }
            TokenType::While => {
                self.advance();
                self.while_statement()
            }
            TokenType::Return => {
                self.advance();
                self.return_statement()
            }
            TokenType::Print => {
                self.advance();
                self.print_statement()
            }
            TokenType::LeftBrace => {
                self.advance();
                Ok(Statement::Block(self.block_statements()?))
            }
            _ => self.expression_statement(),
        }
    }
    /// `for` never reaches the evaluator: it is rewritten here into the
    /// equivalent `while`, with the initializer in an enclosing block and the
    /// increment appended to the loop body.
    fn for_statement(&mut self) -> Result<Statement, ParseError> {
        consume!(self, TokenType::LeftParen, "Expect '(' after 'for'.")?;
        let initializer: Option<Statement> = match self.peek().tokentype {
            TokenType::Semicolon => {
                self.advance();
                None
            }
            TokenType::Var => {
                self.advance();
                Some(self.var_declaration()?)
            }
            _ => Some(self.expression_statement()?),
        };

        let condition = match self.peek().tokentype {
            TokenType::Semicolon => Expression::Literal(Literal::Boolean(true)),
            _ => self.expression()?,
        };
        consume!(
            self,
            TokenType::Semicolon,
            "Expect ';' after loop condition."
        )?;

        let increment: Option<Expression> = match self.peek().tokentype {
            TokenType::RightParen => None,
            _ => Some(self.expression()?),
        };
        consume!(self, TokenType::RightParen, "Expect ')' after for clauses.")?;

        let mut body = self.statement()?;

        if let Some(x) = increment {
            body = Statement::Block(vec![body, Statement::Expression(x)]);
        }
        body = Statement::While {
            condition,
            body: Box::new(body),
        };
        match initializer {
            None => Ok(body),
            Some(x) => Ok(Statement::Block(vec![x, body])),
        }
    }
    fn while_statement(&mut self) -> Result<Statement, ParseError> {
        consume!(self, TokenType::LeftParen, "Expect '(' after 'while'.")?;
        let condition = self.expression()?;
        consume!(
            self,
            TokenType::RightParen,
            "Expect ')' after while condition."
        )?;
        let body = self.statement()?;
        Ok(Statement::While {
            condition,
            body: Box::new(body),
        })
    }
    fn if_statement(&mut self) -> Result<Statement, ParseError> {
        consume!(self, TokenType::LeftParen, "Expect '(' after 'if'.")?;
        let condition = self.expression()?;
        consume!(self, TokenType::RightParen, "Expect ')' after if condition.")?;
        let then_branch = Box::new(self.statement()?);
        let else_branch = match self.peek().tokentype {
            TokenType::Else => {
                self.advance();
                Some(Box::new(self.statement()?))
            }
            _ => None,
        };
        Ok(Statement::If {
            condition,
            then_branch,
            else_branch,
        })
    }
    fn return_statement(&mut self) -> Result<Statement, ParseError> {
        let keyword = self.previous().clone();
        if self.functions.is_empty() {
            return Err(ParseError::new(
                keyword,
                "Cannot return from top-level code.",
            ));
        }
        let value = match self.peek().tokentype {
            TokenType::Semicolon => None,
            _ => Some(self.expression()?),
        };
        if value.is_some() && self.functions.last() == Some(&FunctionKind::Initializer) {
            return Err(ParseError::new(
                keyword,
                "Cannot return a value from an initializer.",
            ));
        }
        consume!(
            self,
            TokenType::Semicolon,
            "Expect ';' after return value."
        )?;
        Ok(Statement::Return { keyword, value })
    }
    // Caller has consumed the '{'.
    fn block_statements(&mut self) -> Result<Vec<Statement>, ParseError> {
        let mut statements: Vec<Statement> = Vec::new();
        while !self.is_at_end() {
            if let TokenType::RightBrace = self.peek().tokentype {
                break;
            }
            if let Some(statement) = self.declaration() {
                statements.push(statement);
            }
        }
        consume!(self, TokenType::RightBrace, "Expect '}' after block.")?;
        Ok(statements)
    }
    fn print_statement(&mut self) -> Result<Statement, ParseError> {
        let expr = self.expression()?;
        consume!(self, TokenType::Semicolon, "Expect ';' after value.")?;
        Ok(Statement::Print(expr))
    }
    fn expression_statement(&mut self) -> Result<Statement, ParseError> {
        let expr = self.expression()?;
        consume!(self, TokenType::Semicolon, "Expect ';' after expression.")?;
        Ok(Statement::Expression(expr))
    }
    fn expression(&mut self) -> Result<Expression, ParseError> {
        self.assignment()
    }
    fn assignment(&mut self) -> Result<Expression, ParseError> {
        let expr = self.or()?;
        match self.peek().tokentype {
            TokenType::Equal => {
                self.advance();
                let equals = self.previous().clone();
                let value = self.assignment()?;
                match expr {
                    Expression::Variable(name) => Ok(Expression::Assign {
                        name,
                        value: Box::new(value),
                    }),
                    Expression::Get { object, name } => Ok(Expression::Set {
                        object,
                        name,
                        value: Box::new(value),
                    }),
                    // Not fatal: report it and keep going with the
                    // right-hand side.
                    _ => {
                        self.errors
                            .push(ParseError::new(equals, "Invalid assignment target."));
                        Ok(value)
                    }
                }
            }
            _ => Ok(expr),
        }
    }
    fn or(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.and()?;
        loop {
            match self.peek().tokentype {
                TokenType::Or => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.and()?;
                    expr = Expression::Logical {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn and(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.equality()?;
        loop {
            match self.peek().tokentype {
                TokenType::And => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.equality()?;
                    expr = Expression::Logical {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn equality(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.comparison()?;
        loop {
            match self.peek().tokentype {
                TokenType::BangEqual | TokenType::EqualEqual => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.comparison()?;
                    expr = Expression::Binary {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn comparison(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.addition()?;
        loop {
            match self.peek().tokentype {
                TokenType::Greater
                | TokenType::GreaterEqual
                | TokenType::Less
                | TokenType::LessEqual => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.addition()?;
                    expr = Expression::Binary {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn addition(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.multiplication()?;
        loop {
            match self.peek().tokentype {
                TokenType::Minus | TokenType::Plus => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.multiplication()?;
                    expr = Expression::Binary {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn multiplication(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.unary()?;
        loop {
            match self.peek().tokentype {
                TokenType::Slash | TokenType::Star => {
                    self.advance();
                    let operator = self.previous().clone();
                    let right = self.unary()?;
                    expr = Expression::Binary {
                        left: Box::new(expr),
                        operator,
                        right: Box::new(right),
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn unary(&mut self) -> Result<Expression, ParseError> {
        match self.peek().tokentype {
            TokenType::Bang | TokenType::Minus => {
                self.advance();
                let operator = self.previous().clone();
                let right = self.unary()?;
                Ok(Expression::Unary {
                    operator,
                    right: Box::new(right),
                })
            }
            _ => self.call(),
        }
    }
    fn call(&mut self) -> Result<Expression, ParseError> {
        let mut expr = self.primary()?;
        loop {
            match self.peek().tokentype {
                TokenType::LeftParen => {
                    self.advance();
                    expr = self.finish_call(expr)?;
                }
                TokenType::Dot => {
                    self.advance();
                    let name = consume!(
                        self,
                        TokenType::Identifier(_),
                        "Expect property name after '.'."
                    )?;
                    expr = Expression::Get {
                        object: Box::new(expr),
                        name,
                    };
                }
                _ => break,
            }
        }
        Ok(expr)
    }
    fn finish_call(&mut self, callee: Expression) -> Result<Expression, ParseError> {
        let mut arguments: Vec<Expression> = Vec::new();
        match self.peek().tokentype {
            TokenType::RightParen => (),
            _ => loop {
                if arguments.len() >= 255 {
                    let token = self.peek().clone();
                    self.errors
                        .push(ParseError::new(token, "Can't have more than 255 arguments."));
                }
                arguments.push(self.expression()?);
                match self.peek().tokentype {
                    TokenType::Comma => {
                        self.advance();
                    }
                    _ => break,
                }
            },
        }
        let paren = consume!(self, TokenType::RightParen, "Expect ')' after arguments.")?;
        Ok(Expression::Call {
            callee: Box::new(callee),
            paren,
            arguments,
        })
    }
    fn primary(&mut self) -> Result<Expression, ParseError> {
        match &self.peek().tokentype {
            TokenType::False => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(false)))
            }
            TokenType::True => {
                self.advance();
                Ok(Expression::Literal(Literal::Boolean(true)))
            }
            TokenType::Nil => {
                self.advance();
                Ok(Expression::Literal(Literal::Nil))
            }
            TokenType::Number(x) => {
                let x = *x;
                self.advance();
                Ok(Expression::Literal(Literal::Number(x)))
            }
            TokenType::String(x) => {
                let x = x.clone();
                self.advance();
                Ok(Expression::Literal(Literal::String(x)))
            }
            TokenType::Identifier(_) => Ok(Expression::Variable(self.advance().clone())),
            TokenType::This => {
                if self.class_depth == 0 {
                    return Err(self.error("Cannot use 'this' outside of a class."));
                }
                Ok(Expression::This(self.advance().clone()))
            }
            TokenType::LeftParen => {
                self.advance();
                let expr = self.expression()?;
                consume!(self, TokenType::RightParen, "Expect ')' after expression.")?;
                Ok(Expression::Grouping(Box::new(expr)))
            }
            _ => Err(self.error("Expect expression.")),
        }
    }
    /// Discards tokens until a statement boundary so one malformed statement
    /// yields one diagnostic instead of a cascade.
    fn synchronize(&mut self) {
        self.advance();
        while !self.is_at_end() {
            if let TokenType::Semicolon = self.previous().tokentype {
                return;
            }
            match self.peek().tokentype {
                TokenType::Class
                | TokenType::Fun
                | TokenType::Var
                | TokenType::For
                | TokenType::If
                | TokenType::While
                | TokenType::Print
                | TokenType::Return => return,
                _ => (),
            }
            self.advance();
        }
    }
    fn advance(&mut self) -> &'a Token {
        if !self.is_at_end() {
            self.current += 1;
        }
        self.previous()
    }
    fn is_at_end(&self) -> bool {
        match self.peek().tokentype {
            TokenType::EOF => true,
            _ => false,
        }
    }
    fn peek(&self) -> &'a Token {
        self.tokens.get(self.current).unwrap()
    }
    fn previous(&self) -> &'a Token {
        self.tokens
            .get(if self.current > 0 {
                self.current - 1
            } else {
                0
            })
            .expect("Failed to get previous")
    }
    fn error(&self, msg: &str) -> ParseError {
        ParseError::new(self.peek().clone(), msg)
    }
}

#[cfg(test)]
mod parser_tests {
    use crate::ast::{Expression, Statement};
    use crate::parser;
    use crate::scanner;
    use crate::token::TokenType;

    fn parse(source: &str) -> Vec<Statement> {
        let (tokens, scan_errors) = scanner::scan_tokens(source);
        assert!(scan_errors.is_empty());
        parser::parse(&tokens).expect("source should parse")
    }

    fn parse_errors(source: &str) -> Vec<parser::ParseError> {
        let (tokens, scan_errors) = scanner::scan_tokens(source);
        assert!(scan_errors.is_empty());
        parser::parse(&tokens).expect_err("source should not parse")
    }

    #[test]
    fn multiplication_binds_tighter_than_addition() {
        let program = parse("1 + 2 * 3;");
        assert_eq!(program.len(), 1);
        match &program[0] {
            Statement::Expression(Expression::Binary {
                operator, right, ..
            }) => {
                assert_eq!(operator.tokentype, TokenType::Plus);
                match right.as_ref() {
                    Expression::Binary { operator, .. } => {
                        assert_eq!(operator.tokentype, TokenType::Star)
                    }
                    other => panic!("expected nested product, got {:?}", other),
                }
            }
            other => panic!("expected binary expression, got {:?}", other),
        }
    }

    #[test]
    fn grouping_overrides_precedence() {
        let program = parse("(1 + 2) * 3;");
        match &program[0] {
            Statement::Expression(Expression::Binary { left, operator, .. }) => {
                assert_eq!(operator.tokentype, TokenType::Star);
                assert!(matches!(left.as_ref(), Expression::Grouping(_)));
            }
            other => panic!("expected binary expression, got {:?}", other),
        }
    }

    #[test]
    fn assignment_is_right_associative() {
        let program = parse("var a = 1; var b = 2; a = b = 3;");
        match &program[2] {
            Statement::Expression(Expression::Assign { name, value }) => {
                assert_eq!(name.lexeme, "a");
                assert!(matches!(value.as_ref(), Expression::Assign { .. }));
            }
            other => panic!("expected assignment, got {:?}", other),
        }
    }

    #[test]
    fn for_desugars_to_while_in_a_block() {
        let program = parse("for (var i = 0; i < 3; i = i + 1) print i;");
        assert_eq!(program.len(), 1);
        match &program[0] {
            Statement::Block(stmts) => {
                assert_eq!(stmts.len(), 2);
                assert!(matches!(stmts[0], Statement::Var { .. }));
                match &stmts[1] {
                    Statement::While { body, .. } => match body.as_ref() {
                        Statement::Block(inner) => {
                            assert!(matches!(inner[0], Statement::Print(_)));
                            assert!(matches!(
                                inner[1],
                                Statement::Expression(Expression::Assign { .. })
                            ));
                        }
                        other => panic!("expected block body, got {:?}", other),
                    },
                    other => panic!("expected while loop, got {:?}", other),
                }
            }
            other => panic!("expected enclosing block, got {:?}", other),
        }
    }

    #[test]
    fn for_without_clauses_still_desugars() {
        let program = parse("for (;;) print 1;");
        assert!(matches!(program[0], Statement::While { .. }));
    }

    #[test]
    fn var_without_initializer() {
        let program = parse("var a;");
        assert!(matches!(
            program[0],
            Statement::Var {
                initializer: None,
                ..
            }
        ));
    }

    #[test]
    fn two_malformed_statements_yield_two_errors() {
        let errors = parse_errors("var = 1; print +;");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].message, "Expect variable name.");
        assert_eq!(errors[1].message, "Expect expression.");
    }

    #[test]
    fn invalid_assignment_target_is_reported_once() {
        let errors = parse_errors("1 = 2;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Invalid assignment target.");
    }

    #[test]
    fn argument_count_is_capped() {
        let args = vec!["1"; 256].join(", ");
        let errors = parse_errors(&format!("noop({});", args));
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Can't have more than 255 arguments.");
    }

    #[test]
    fn return_at_top_level_is_rejected() {
        let errors = parse_errors("return 1;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Cannot return from top-level code.");
    }

    #[test]
    fn this_outside_a_class_is_rejected() {
        let errors = parse_errors("print this;");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].message, "Cannot use 'this' outside of a class.");
    }

    #[test]
    fn initializer_cannot_return_a_value() {
        let errors = parse_errors("class C { init() { return 1; } }");
        assert_eq!(errors[0].message, "Cannot return a value from an initializer.");
    }

    #[test]
    fn class_bodies_hold_methods() {
        let program = parse("class Pair { init(a, b) { this.a = a; } first() { return this.a; } }");
        match &program[0] {
            Statement::Class { name, methods } => {
                assert_eq!(name.lexeme, "Pair");
                assert_eq!(methods.len(), 2);
                assert_eq!(methods[0].name.lexeme, "init");
                assert_eq!(methods[1].name.lexeme, "first");
            }
            other => panic!("expected class declaration, got {:?}", other),
        }
    }

    #[test]
    fn property_calls_chain() {
        let program = parse("a.b(1).c = 2;");
        assert!(matches!(
            program[0],
            Statement::Expression(Expression::Set { .. })
        ));
    }

    #[test]
    fn recovery_resumes_inside_blocks() {
        let errors = parse_errors("{ var = 1; var ok = 2; print +; } print 3;");
        assert_eq!(errors.len(), 2);
    }
}
