use super::token::Token;
use std::fmt;
use std::fmt::Formatter;
use std::rc::Rc;

/// A literal value as it appears in source, before evaluation.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Nil => write!(f, "nil"),
            Literal::Boolean(x) => write!(f, "{}", x),
            Literal::Number(x) => write!(f, "{}", x),
            Literal::String(x) => write!(f, "\"{}\"", x),
        }
    }
}

#[derive(Debug)]
pub enum Expression {
    Binary {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Grouping(Box<Expression>),
    Literal(Literal),
    Logical {
        left: Box<Expression>,
        operator: Token,
        right: Box<Expression>,
    },
    Unary {
        operator: Token,
        right: Box<Expression>,
    },
    Variable(Token),
    Assign {
        name: Token,
        value: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        paren: Token,
        arguments: Vec<Expression>,
    },
    Get {
        object: Box<Expression>,
        name: Token,
    },
    Set {
        object: Box<Expression>,
        name: Token,
        value: Box<Expression>,
    },
    This(Token),
}

pub trait Visitor<T, Output> {
    fn visit(&mut self, n: &T) -> Output;
}

impl Expression {
    pub fn accept<T>(&self, v: &mut dyn Visitor<Expression, T>) -> T {
        v.visit(self)
    }
}

/// A function or method declaration. Shared via `Rc` so the closure values
/// created at runtime can hold the declaration without copying the body.
#[derive(Debug)]
pub struct FunctionDecl {
    pub name: Token,
    pub params: Vec<Token>,
    pub body: Vec<Statement>,
}

#[derive(Debug)]
pub enum Statement {
    Print(Expression),
    Expression(Expression),
    Var {
        name: Token,
        initializer: Option<Expression>,
    },
    Block(Vec<Statement>),
    If {
        condition: Expression,
        then_branch: Box<Statement>,
        else_branch: Option<Box<Statement>>,
    },
    While {
        condition: Expression,
        body: Box<Statement>,
    },
    Function(Rc<FunctionDecl>),
    Return {
        keyword: Token,
        value: Option<Expression>,
    },
    Class {
        name: Token,
        methods: Vec<Rc<FunctionDecl>>,
    },
}

impl Statement {
    pub fn accept<T>(&self, v: &mut dyn Visitor<Statement, T>) -> T {
        v.visit(self)
    }
}

/// Prints an AST back out as source text. The output is deterministic and
/// reparses to the same tree, which makes it useful both for debugging and
/// for round-trip tests.
pub struct AstPrinter {}

impl AstPrinter {
    pub fn print(&mut self, statements: &[Statement]) -> String {
        statements
            .iter()
            .map(|s| s.accept(self))
            .collect::<Vec<String>>()
            .join(" ")
    }
    fn block(&mut self, statements: &[Statement]) -> String {
        if statements.is_empty() {
            return String::from("{ }");
        }
        format!("{{ {} }}", self.print(statements))
    }
    fn function(&mut self, decl: &FunctionDecl) -> String {
        let params = decl
            .params
            .iter()
            .map(|p| p.lexeme.clone())
            .collect::<Vec<String>>()
            .join(", ");
        format!("{}({}) {}", decl.name.lexeme, params, self.block(&decl.body))
    }
}

impl Visitor<Expression, String> for AstPrinter {
    fn visit(&mut self, n: &Expression) -> String {
        match n {
            Expression::Binary {
                left,
                operator,
                right,
            }
            | Expression::Logical {
                left,
                operator,
                right,
            } => format!(
                "{} {} {}",
                left.accept(self),
                operator.lexeme,
                right.accept(self)
            ),
            Expression::Grouping(x) => format!("({})", x.accept(self)),
            Expression::Literal(x) => format!("{}", x),
            Expression::Unary { operator, right } => {
                format!("{}{}", operator.lexeme, right.accept(self))
            }
            Expression::Variable(x) => x.lexeme.clone(),
            Expression::Assign { name, value } => {
                format!("{} = {}", name.lexeme, value.accept(self))
            }
            Expression::Call {
                callee, arguments, ..
            } => {
                let args = arguments
                    .iter()
                    .map(|a| a.accept(self))
                    .collect::<Vec<String>>()
                    .join(", ");
                format!("{}({})", callee.accept(self), args)
            }
            Expression::Get { object, name } => {
                format!("{}.{}", object.accept(self), name.lexeme)
            }
            Expression::Set {
                object,
                name,
                value,
            } => format!(
                "{}.{} = {}",
                object.accept(self),
                name.lexeme,
                value.accept(self)
            ),
            Expression::This(_) => String::from("this"),
        }
    }
}

impl Visitor<Statement, String> for AstPrinter {
    fn visit(&mut self, n: &Statement) -> String {
        match n {
            Statement::Print(e) => format!("print {};", e.accept(self)),
            Statement::Expression(e) => format!("{};", e.accept(self)),
            Statement::Var {
                name,
                initializer: Some(init),
            } => format!("var {} = {};", name.lexeme, init.accept(self)),
            Statement::Var {
                name,
                initializer: None,
            } => format!("var {};", name.lexeme),
            Statement::Block(stmts) => self.block(stmts),
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let mut out = format!(
                    "if ({}) {}",
                    condition.accept(self),
                    then_branch.accept(self)
                );
                if let Some(else_branch) = else_branch {
                    out.push_str(&format!(" else {}", else_branch.accept(self)));
                }
                out
            }
            Statement::While { condition, body } => {
                format!("while ({}) {}", condition.accept(self), body.accept(self))
            }
            Statement::Function(decl) => format!("fun {}", self.function(decl)),
            Statement::Return {
                value: Some(value), ..
            } => format!("return {};", value.accept(self)),
            Statement::Return { value: None, .. } => String::from("return;"),
            Statement::Class { name, methods } => {
                if methods.is_empty() {
                    return format!("class {} {{ }}", name.lexeme);
                }
                let body = methods
                    .iter()
                    .map(|m| self.function(m))
                    .collect::<Vec<String>>()
                    .join(" ");
                format!("class {} {{ {} }}", name.lexeme, body)
            }
        }
    }
}
