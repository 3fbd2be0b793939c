use crate::ast::{Expression, Literal, Statement, Visitor};
use crate::callable::{LoxFunction, NativeFunction};
use crate::class::Class;
use crate::environment::Environment;
use crate::instance::Instance;
use crate::token::{Token, TokenType};
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt;
use std::fmt::Formatter;
use std::io;
use std::io::Write;
use std::time::{SystemTime, UNIX_EPOCH};
use strum_macros::Display;

/// Everything an expression can evaluate to.
#[derive(Debug, Clone)]
pub enum Value {
    Nil,
    Boolean(bool),
    Number(f64),
    String(String),
    Function(LoxFunction),
    Native(NativeFunction),
    Class(Class),
    Instance(Instance),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Value::Nil => write!(f, "nil"),
            Value::Boolean(x) => write!(f, "{}", x),
            Value::Number(x) => write!(f, "{}", x),
            Value::String(x) => write!(f, "{}", x),
            Value::Function(x) => write!(f, "{}", x),
            Value::Native(x) => write!(f, "{}", x),
            Value::Class(x) => write!(f, "{}", x),
            Value::Instance(x) => write!(f, "{}", x),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum RuntimeErrorKind {
    TypeMismatch,
    UndefinedVariable,
    ArityMismatch,
    NotCallable,
}

#[derive(Debug)]
pub struct RuntimeError {
    pub kind: RuntimeErrorKind,
    pub message: String,
    pub token: Option<Token>,
}

impl RuntimeError {
    /// Wraps straight into the evaluator's error channel, which is how
    /// nearly every caller wants it.
    pub fn new(kind: RuntimeErrorKind, message: &str, token: Option<&Token>) -> ErrorType {
        ErrorType::Runtime(RuntimeError {
            kind,
            message: message.to_string(),
            token: token.cloned(),
        })
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match &self.token {
            Some(token) => write!(
                f,
                "[line {}] {}: {}",
                token.line, self.kind, self.message
            ),
            None => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl Error for RuntimeError {
    fn description(&self) -> &str {
        &self.message
    }
}

/// Why statement execution stopped early. `Return` is ordinary control flow
/// riding the error channel; it unwinds exactly to the enclosing call
/// boundary, where `LoxFunction::call` absorbs it.
#[derive(Debug)]
pub enum ErrorType {
    Runtime(RuntimeError),
    Return(Value),
}

pub struct Interpreter {
    pub globals: Environment,
    environment: Environment,
    output: Box<dyn Write>,
}

fn native_clock(_interpreter: &mut Interpreter, _arguments: &[Value]) -> Result<Value, ErrorType> {
    let seconds = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0);
    Ok(Value::Number(seconds))
}

impl Visitor<Expression, Result<Value, ErrorType>> for Interpreter {
    fn visit(&mut self, expr: &Expression) -> Result<Value, ErrorType> {
        match expr {
            Expression::Literal(x) => Ok(match x {
                Literal::Nil => Value::Nil,
                Literal::Boolean(y) => Value::Boolean(*y),
                Literal::Number(y) => Value::Number(*y),
                Literal::String(y) => Value::String(y.clone()),
            }),
            Expression::Grouping(x) => self.evaluate(x),
            Expression::Unary { operator, right } => {
                let rv = self.evaluate(right)?;
                match operator.tokentype {
                    TokenType::Minus => match rv {
                        Value::Number(r) => Ok(Value::Number(-r)),
                        _ => Err(RuntimeError::new(
                            RuntimeErrorKind::TypeMismatch,
                            "Operand must be a number.",
                            Some(operator),
                        )),
                    },
                    _ => Ok(Value::Boolean(!is_truthy(&rv))),
                }
            }
            Expression::Binary {
                left,
                operator,
                right,
            } => {
                let lv = self.evaluate(left)?;
                let rv = self.evaluate(right)?;
                self.binary(lv, operator, rv)
            }
            Expression::Variable(token) => self.environment.get(token),
            Expression::Assign { name, value } => {
                let value = self.evaluate(value)?;
                self.environment.assign(name, value.clone())?;
                Ok(value)
            }
            Expression::Logical {
                left,
                operator,
                right,
            } => {
                let left = self.evaluate(left)?;
                // The right operand only runs when the left side has not
                // already decided the result.
                match operator.tokentype {
                    TokenType::Or => {
                        if is_truthy(&left) {
                            Ok(left)
                        } else {
                            self.evaluate(right)
                        }
                    }
                    _ => {
                        if !is_truthy(&left) {
                            Ok(left)
                        } else {
                            self.evaluate(right)
                        }
                    }
                }
            }
            Expression::Call {
                callee,
                paren,
                arguments,
            } => {
                let callee = self.evaluate(callee)?;
                let mut evaluated: Vec<Value> = Vec::with_capacity(arguments.len());
                for argument in arguments {
                    evaluated.push(self.evaluate(argument)?);
                }
                self.call_value(callee, &evaluated, paren)
            }
            Expression::Get { object, name } => match self.evaluate(object)? {
                Value::Instance(instance) => instance.get(name),
                _ => Err(RuntimeError::new(
                    RuntimeErrorKind::TypeMismatch,
                    "Only instances have properties.",
                    Some(name),
                )),
            },
            Expression::Set {
                object,
                name,
                value,
            } => match self.evaluate(object)? {
                Value::Instance(instance) => {
                    let value = self.evaluate(value)?;
                    instance.set(name, value.clone());
                    Ok(value)
                }
                _ => Err(RuntimeError::new(
                    RuntimeErrorKind::TypeMismatch,
                    "Only instances have fields.",
                    Some(name),
                )),
            },
            Expression::This(keyword) => self.environment.get(keyword),
        }
    }
}

impl Visitor<Statement, Result<(), ErrorType>> for Interpreter {
    fn visit(&mut self, stmt: &Statement) -> Result<(), ErrorType> {
        match stmt {
            Statement::Print(e) => {
                let val = self.evaluate(e)?;
                let _ = writeln!(self.output, "{}", val);
                Ok(())
            }
            Statement::Expression(e) => {
                self.evaluate(e)?;
                Ok(())
            }
            Statement::Var { name, initializer } => {
                let val = match initializer {
                    Some(e) => self.evaluate(e)?,
                    None => Value::Nil,
                };
                self.environment.define(&name.lexeme, val);
                Ok(())
            }
            Statement::Block(stmts) => {
                let child = self.environment.new_child();
                self.execute_block(stmts, child)
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if is_truthy(&self.evaluate(condition)?) {
                    self.execute(then_branch)
                } else if let Some(else_branch) = else_branch {
                    self.execute(else_branch)
                } else {
                    Ok(())
                }
            }
            Statement::While { condition, body } => {
                while is_truthy(&self.evaluate(condition)?) {
                    self.execute(body)?;
                }
                Ok(())
            }
            Statement::Function(declaration) => {
                // The closure is the environment at the declaration site, not
                // wherever the function later gets called from.
                let function =
                    LoxFunction::new(declaration.clone(), self.environment.clone(), false);
                self.environment
                    .define(&declaration.name.lexeme, Value::Function(function));
                Ok(())
            }
            Statement::Return { keyword: _, value } => {
                let val = match value {
                    Some(e) => self.evaluate(e)?,
                    None => Value::Nil,
                };
                Err(ErrorType::Return(val))
            }
            Statement::Class { name, methods } => {
                // Two-stage define/assign so the methods can refer to the
                // class by name through their closure.
                self.environment.define(&name.lexeme, Value::Nil);
                let mut table: BTreeMap<String, LoxFunction> = BTreeMap::new();
                for declaration in methods {
                    let is_initializer = declaration.name.lexeme == "init";
                    let method = LoxFunction::new(
                        declaration.clone(),
                        self.environment.clone(),
                        is_initializer,
                    );
                    table.insert(declaration.name.lexeme.clone(), method);
                }
                let class = Class::new(&name.lexeme, table);
                self.environment.assign(name, Value::Class(class))
            }
        }
    }
}

impl Interpreter {
    pub fn new() -> Interpreter {
        Interpreter::with_output(Box::new(io::stdout()))
    }
    /// Program output (the `print` statement) goes through the given writer,
    /// which lets embedders and tests capture it.
    pub fn with_output(output: Box<dyn Write>) -> Interpreter {
        let globals = Environment::new();
        globals.define(
            "clock",
            Value::Native(NativeFunction {
                name: "clock",
                arity: 0,
                body: native_clock,
            }),
        );
        Interpreter {
            environment: globals.clone(),
            globals,
            output,
        }
    }
    fn evaluate(&mut self, expr: &Expression) -> Result<Value, ErrorType> {
        expr.accept(self)
    }
    pub fn execute(&mut self, stmt: &Statement) -> Result<(), ErrorType> {
        stmt.accept(self)
    }
    /// Runs the statements in the given environment, restoring the previous
    /// one afterwards even when execution stops early.
    pub fn execute_block(
        &mut self,
        statements: &[Statement],
        environment: Environment,
    ) -> Result<(), ErrorType> {
        let previous = std::mem::replace(&mut self.environment, environment);
        let mut result = Ok(());
        for statement in statements {
            result = self.execute(statement);
            if result.is_err() {
                break;
            }
        }
        self.environment = previous;
        result
    }
    /// Executes a whole program. The first runtime error aborts the run;
    /// side effects already performed stay visible.
    pub fn interpret(&mut self, statements: &[Statement]) -> Result<(), RuntimeError> {
        for statement in statements {
            match self.execute(statement) {
                Ok(()) => (),
                // The parser rejects `return` at the top level, so a stray
                // unwind reaching here just ends the run.
                Err(ErrorType::Return(_)) => break,
                Err(ErrorType::Runtime(e)) => return Err(e),
            }
        }
        Ok(())
    }
    fn binary(&mut self, lv: Value, operator: &Token, rv: Value) -> Result<Value, ErrorType> {
        match operator.tokentype {
            TokenType::EqualEqual => Ok(Value::Boolean(is_equal(&lv, &rv))),
            TokenType::BangEqual => Ok(Value::Boolean(!is_equal(&lv, &rv))),
            TokenType::Plus => match (lv, rv) {
                (Value::Number(l), Value::Number(r)) => Ok(Value::Number(l + r)),
                (Value::String(l), Value::String(r)) => {
                    let mut joined = l;
                    joined.push_str(r.as_str());
                    Ok(Value::String(joined))
                }
                _ => Err(RuntimeError::new(
                    RuntimeErrorKind::TypeMismatch,
                    "Operands must be two numbers or two strings.",
                    Some(operator),
                )),
            },
            _ => {
                let (l, r) = match (lv, rv) {
                    (Value::Number(l), Value::Number(r)) => (l, r),
                    _ => {
                        return Err(RuntimeError::new(
                            RuntimeErrorKind::TypeMismatch,
                            "Operands must be numbers.",
                            Some(operator),
                        ));
                    }
                };
                match operator.tokentype {
                    TokenType::Minus => Ok(Value::Number(l - r)),
                    TokenType::Slash => Ok(Value::Number(l / r)),
                    TokenType::Star => Ok(Value::Number(l * r)),
                    TokenType::Greater => Ok(Value::Boolean(l > r)),
                    TokenType::GreaterEqual => Ok(Value::Boolean(l >= r)),
                    TokenType::Less => Ok(Value::Boolean(l < r)),
                    TokenType::LessEqual => Ok(Value::Boolean(l <= r)),
                    _ => Err(RuntimeError::new(
                        RuntimeErrorKind::TypeMismatch,
                        "Unsupported binary operator.",
                        Some(operator),
                    )),
                }
            }
        }
    }
    fn call_value(
        &mut self,
        callee: Value,
        arguments: &[Value],
        paren: &Token,
    ) -> Result<Value, ErrorType> {
        match callee {
            Value::Function(function) => {
                check_arity(function.arity(), arguments.len(), paren)?;
                function.call(self, arguments)
            }
            Value::Native(native) => {
                check_arity(native.arity, arguments.len(), paren)?;
                (native.body)(self, arguments)
            }
            Value::Class(class) => {
                check_arity(class.arity(), arguments.len(), paren)?;
                let instance = Instance::new(class.clone());
                // The initializer's own return value is discarded;
                // construction always yields the new instance.
                if let Some(init) = class.find_method("init") {
                    init.bind(&instance).call(self, arguments)?;
                }
                Ok(Value::Instance(instance))
            }
            _ => Err(RuntimeError::new(
                RuntimeErrorKind::NotCallable,
                "Can only call functions and classes.",
                Some(paren),
            )),
        }
    }
}

fn check_arity(expected: usize, got: usize, paren: &Token) -> Result<(), ErrorType> {
    if expected == got {
        Ok(())
    } else {
        Err(RuntimeError::new(
            RuntimeErrorKind::ArityMismatch,
            &format!("Expected {} arguments but got {}.", expected, got),
            Some(paren),
        ))
    }
}

/// nil and false are falsey; every other value is truthy, including zero and
/// the empty string.
fn is_truthy(x: &Value) -> bool {
    match x {
        Value::Nil => false,
        Value::Boolean(x) => *x,
        _ => true,
    }
}

/// Equality is defined over any two values and never fails. Values of
/// different kinds are unequal; functions, classes and instances compare by
/// identity.
fn is_equal(lv: &Value, rv: &Value) -> bool {
    match (lv, rv) {
        (Value::Nil, Value::Nil) => true,
        (Value::Boolean(l), Value::Boolean(r)) => l == r,
        (Value::Number(l), Value::Number(r)) => l == r,
        (Value::String(l), Value::String(r)) => l == r,
        (Value::Function(l), Value::Function(r)) => l.equals(r),
        (Value::Native(l), Value::Native(r)) => l.equals(r),
        (Value::Class(l), Value::Class(r)) => l.equals(r),
        (Value::Instance(l), Value::Instance(r)) => l.equals(r),
        _ => false,
    }
}

#[cfg(test)]
mod interpreter_tests {
    use crate::interpreter::{Interpreter, RuntimeError, RuntimeErrorKind};
    use crate::parser;
    use crate::scanner;
    use std::cell::RefCell;
    use std::io;
    use std::io::Write;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    struct SharedBuffer(Rc<RefCell<Vec<u8>>>);

    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn run(source: &str) -> (String, Result<(), RuntimeError>) {
        let buffer = SharedBuffer::default();
        let mut interpreter = Interpreter::with_output(Box::new(buffer.clone()));
        let (tokens, scan_errors) = scanner::scan_tokens(source);
        assert!(scan_errors.is_empty(), "scan errors: {:?}", scan_errors);
        let program = match parser::parse(&tokens) {
            Ok(program) => program,
            Err(errors) => panic!("parse errors: {:?}", errors),
        };
        let result = interpreter.interpret(&program);
        let output = String::from_utf8(buffer.0.borrow().clone()).unwrap();
        (output, result)
    }

    fn run_output(source: &str) -> String {
        let (output, result) = run(source);
        assert!(result.is_ok(), "unexpected runtime error: {:?}", result);
        output
    }

    fn run_error(source: &str) -> (String, RuntimeError) {
        let (output, result) = run(source);
        (output, result.expect_err("expected a runtime error"))
    }

    #[test]
    fn arithmetic_respects_precedence() {
        assert_eq!(run_output("print 1 + 2 * 3;"), "7\n");
        assert_eq!(run_output("print (1 + 2) * 3;"), "21\n");
        assert_eq!(run_output("print 10 / 4 - 1;"), "1.5\n");
        assert_eq!(run_output("print -2 * 3;"), "-6\n");
    }

    #[test]
    fn plus_concatenates_two_strings() {
        assert_eq!(run_output("print \"foo\" + \"bar\";"), "foobar\n");
    }

    #[test]
    fn plus_on_number_and_string_is_a_type_mismatch() {
        let (_, err) = run_error("print 1 + \"bar\";");
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn ordering_requires_numbers() {
        let (_, err) = run_error("print \"a\" < \"b\";");
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn unary_minus_requires_a_number() {
        let (_, err) = run_error("print -\"a\";");
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn zero_and_empty_string_are_truthy() {
        assert_eq!(
            run_output("if (0) print \"yes\"; else print \"no\";"),
            "yes\n"
        );
        assert_eq!(run_output("if (\"\") print \"yes\";"), "yes\n");
    }

    #[test]
    fn nil_and_false_are_falsey() {
        assert_eq!(run_output("if (nil) print \"a\"; else print \"b\";"), "b\n");
        assert_eq!(run_output("print !false; print !nil; print !0;"), "true\ntrue\nfalse\n");
    }

    #[test]
    fn equality_is_total_across_kinds() {
        assert_eq!(
            run_output(
                "print 1 == 1; print 1 == \"1\"; print nil == nil; \
                 print nil == false; print \"a\" != \"b\";"
            ),
            "true\nfalse\ntrue\nfalse\ntrue\n"
        );
    }

    #[test]
    fn logical_operators_short_circuit() {
        let source = "\
            var calls = 0; \
            fun touch() { calls = calls + 1; return true; } \
            var a = false and touch(); \
            var b = true or touch(); \
            print calls; print a; print b;";
        assert_eq!(run_output(source), "0\nfalse\ntrue\n");
    }

    #[test]
    fn logical_operators_yield_operand_values() {
        assert_eq!(
            run_output("print nil or \"fallback\"; print 0 and 1;"),
            "fallback\n1\n"
        );
    }

    #[test]
    fn blocks_shadow_and_restore() {
        let source = "\
            var a = 1; \
            { var a = 2; print a; a = 3; print a; } \
            print a;";
        assert_eq!(run_output(source), "2\n3\n1\n");
    }

    #[test]
    fn assignment_in_block_mutates_outer_binding() {
        assert_eq!(run_output("var a = 1; { a = 2; } print a;"), "2\n");
    }

    #[test]
    fn block_local_is_gone_after_the_block() {
        let (_, err) = run_error("{ var hidden = 1; } print hidden;");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable);
    }

    #[test]
    fn assignment_never_declares() {
        let (_, err) = run_error("missing = 1;");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable);
    }

    #[test]
    fn for_loop_desugars_and_scopes_its_variable() {
        assert_eq!(
            run_output("for (var i = 0; i < 3; i = i + 1) print i;"),
            "0\n1\n2\n"
        );
        let (_, err) = run_error("for (var i = 0; i < 3; i = i + 1) print i; print i;");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable);
    }

    #[test]
    fn while_loop_reevaluates_its_condition() {
        assert_eq!(
            run_output("var n = 3; while (n > 0) { print n; n = n - 1; }"),
            "3\n2\n1\n"
        );
    }

    #[test]
    fn closures_from_the_same_factory_are_independent() {
        let source = "\
            fun make_counter() { \
                var count = 0; \
                fun increment() { count = count + 1; return count; } \
                return increment; \
            } \
            var a = make_counter(); \
            var b = make_counter(); \
            print a(); print a(); print b();";
        assert_eq!(run_output(source), "1\n2\n1\n");
    }

    #[test]
    fn function_without_return_yields_nil() {
        assert_eq!(run_output("fun noop() {} print noop();"), "nil\n");
    }

    #[test]
    fn return_unwinds_through_blocks_and_loops() {
        let source = "\
            fun first() { \
                while (true) { \
                    { return \"early\"; print \"unreachable\"; } \
                } \
            } \
            print first();";
        assert_eq!(run_output(source), "early\n");
    }

    #[test]
    fn recursion_works() {
        let source = "\
            fun fib(n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); } \
            print fib(10);";
        assert_eq!(run_output(source), "55\n");
    }

    #[test]
    fn arity_is_checked() {
        let (_, err) = run_error("fun two(a, b) {} two(1);");
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);
        assert_eq!(err.message, "Expected 2 arguments but got 1.");
    }

    #[test]
    fn only_functions_and_classes_are_callable() {
        let (_, err) = run_error("\"text\"();");
        assert_eq!(err.kind, RuntimeErrorKind::NotCallable);
    }

    #[test]
    fn class_construction_binds_this() {
        let source = "\
            class Point { \
                init(x, y) { this.x = x; this.y = y; } \
                sum() { return this.x + this.y; } \
            } \
            var p = Point(1, 2); \
            print p.sum(); print p.x;";
        assert_eq!(run_output(source), "3\n1\n");
    }

    #[test]
    fn fields_can_be_set_and_read() {
        let source = "class Bag {} var b = Bag(); b.thing = 7; print b.thing;";
        assert_eq!(run_output(source), "7\n");
    }

    #[test]
    fn method_values_stay_bound_to_their_receiver() {
        let source = "\
            class Greeter { \
                init(name) { this.name = name; } \
                greet() { return \"hi \" + this.name; } \
            } \
            var m = Greeter(\"ada\").greet; \
            print m();";
        assert_eq!(run_output(source), "hi ada\n");
    }

    #[test]
    fn initializer_early_return_still_yields_the_instance() {
        let source = "class Thing { init() { return; print \"skipped\"; } } print Thing();";
        assert_eq!(run_output(source), "Thing instance\n");
    }

    #[test]
    fn class_arity_follows_init() {
        let (_, err) = run_error("class Pair { init(a, b) {} } Pair(1);");
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);
        let (_, err) = run_error("class Empty {} Empty(1);");
        assert_eq!(err.kind, RuntimeErrorKind::ArityMismatch);
    }

    #[test]
    fn undefined_property_is_reported() {
        let (_, err) = run_error("class Bag {} print Bag().nothing;");
        assert_eq!(err.kind, RuntimeErrorKind::UndefinedVariable);
        assert_eq!(err.message, "Undefined property 'nothing'.");
    }

    #[test]
    fn only_instances_have_properties() {
        let (_, err) = run_error("var x = 1; print x.y;");
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn runtime_error_halts_the_run_but_keeps_prior_output() {
        let (output, err) = run_error("print 1; print nil - 1; print 2;");
        assert_eq!(output, "1\n");
        assert_eq!(err.kind, RuntimeErrorKind::TypeMismatch);
    }

    #[test]
    fn clock_native_returns_a_number() {
        assert_eq!(run_output("print clock() >= 0;"), "true\n");
    }

    #[test]
    fn values_display_like_the_language() {
        let source = "\
            print nil; print true; print 2.5; \
            fun f() {} print f; \
            print clock; \
            class C {} print C; print C();";
        assert_eq!(
            run_output(source),
            "nil\ntrue\n2.5\n<fn f>\n<native fn>\nC\nC instance\n"
        );
    }
}
