use crate::ast::FunctionDecl;
use crate::environment::Environment;
use crate::instance::Instance;
use crate::interpreter::{ErrorType, Interpreter, Value};
use std::fmt;
use std::fmt::Debug;
use std::rc::Rc;

/// A user-declared function or method. The closure is the environment that
/// was active at the declaration site, fixed once and never rebound at call
/// time.
#[derive(Clone)]
pub struct LoxFunction {
    declaration: Rc<FunctionDecl>,
    closure: Environment,
    is_initializer: bool,
}

impl LoxFunction {
    pub fn new(
        declaration: Rc<FunctionDecl>,
        closure: Environment,
        is_initializer: bool,
    ) -> LoxFunction {
        LoxFunction {
            declaration,
            closure,
            is_initializer,
        }
    }
    /// Returns a copy of this method whose closure has the receiver bound as
    /// `this`, so the body resolves `this` through the normal scope chain.
    pub fn bind(&self, instance: &Instance) -> LoxFunction {
        let bound = self.closure.new_child();
        bound.define("this", Value::Instance(instance.clone()));
        LoxFunction {
            declaration: self.declaration.clone(),
            closure: bound,
            is_initializer: self.is_initializer,
        }
    }
    pub fn arity(&self) -> usize {
        self.declaration.params.len()
    }
    pub fn name(&self) -> &str {
        &self.declaration.name.lexeme
    }
    pub fn call(
        &self,
        interpreter: &mut Interpreter,
        arguments: &[Value],
    ) -> Result<Value, ErrorType> {
        let environment = self.closure.new_child();
        for (param, value) in self.declaration.params.iter().zip(arguments.iter()) {
            environment.define(&param.lexeme, value.clone());
        }
        match interpreter.execute_block(&self.declaration.body, environment) {
            Ok(()) => {
                if self.is_initializer {
                    Ok(self.this_from_closure())
                } else {
                    Ok(Value::Nil)
                }
            }
            Err(ErrorType::Return(value)) => {
                // An initializer always yields the instance, even when a bare
                // `return` exits it early.
                if self.is_initializer {
                    Ok(self.this_from_closure())
                } else {
                    Ok(value)
                }
            }
            Err(e) => Err(e),
        }
    }
    // Only meaningful on a bound initializer, whose closure defines `this`.
    fn this_from_closure(&self) -> Value {
        self.closure.get_by_name("this").unwrap_or(Value::Nil)
    }
    pub fn equals(&self, other: &LoxFunction) -> bool {
        Rc::ptr_eq(&self.declaration, &other.declaration) && self.closure.equals(&other.closure)
    }
}

impl Debug for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

impl fmt::Display for LoxFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<fn {}>", self.name())
    }
}

/// A host-provided function exposed to programs through the same calling
/// convention as user functions.
#[derive(Clone)]
pub struct NativeFunction {
    pub name: &'static str,
    pub arity: usize,
    pub body: fn(&mut Interpreter, &[Value]) -> Result<Value, ErrorType>,
}

impl NativeFunction {
    pub fn equals(&self, other: &NativeFunction) -> bool {
        self.name == other.name && self.body == other.body
    }
}

impl Debug for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn>")
    }
}

impl fmt::Display for NativeFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<native fn>")
    }
}
