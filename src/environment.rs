use crate::interpreter::{ErrorType, RuntimeError, RuntimeErrorKind, Value};
use crate::token::Token;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::rc::Rc;

/// One frame of the scope chain. Frames point at their enclosing frame only,
/// so the chain is acyclic; `Rc` keeps a captured frame alive for as long as
/// any closure still references it.
#[derive(Debug)]
struct Frame {
    values: BTreeMap<String, Value>,
    enclosing: Option<Environment>,
}

#[derive(Clone, Debug)]
pub struct Environment {
    frame: Rc<RefCell<Frame>>,
}

impl Environment {
    pub fn new() -> Environment {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                values: BTreeMap::new(),
                enclosing: None,
            })),
        }
    }
    /// A fresh empty frame whose lookups fall through to `self`.
    pub fn new_child(&self) -> Environment {
        Environment {
            frame: Rc::new(RefCell::new(Frame {
                values: BTreeMap::new(),
                enclosing: Some(self.clone()),
            })),
        }
    }
    /// Always succeeds; shadows any binding of the same name in an
    /// enclosing frame.
    pub fn define(&self, name: &str, value: Value) {
        self.frame
            .borrow_mut()
            .values
            .insert(name.to_string(), value);
    }
    pub fn get(&self, token: &Token) -> Result<Value, ErrorType> {
        match self.get_by_name(&token.lexeme) {
            Some(value) => Ok(value),
            None => Err(RuntimeError::new(
                RuntimeErrorKind::UndefinedVariable,
                &format!("Undefined variable '{}'.", token.lexeme),
                Some(token),
            )),
        }
    }
    pub fn get_by_name(&self, name: &str) -> Option<Value> {
        let enclosing = {
            let frame = self.frame.borrow();
            if let Some(value) = frame.values.get(name) {
                return Some(value.clone());
            }
            frame.enclosing.clone()
        };
        enclosing.and_then(|parent| parent.get_by_name(name))
    }
    /// Mutates the innermost frame that already binds the name; assignment
    /// never declares.
    pub fn assign(&self, token: &Token, value: Value) -> Result<(), ErrorType> {
        let enclosing = {
            let mut frame = self.frame.borrow_mut();
            if let Some(slot) = frame.values.get_mut(token.lexeme.as_str()) {
                *slot = value;
                return Ok(());
            }
            frame.enclosing.clone()
        };
        match enclosing {
            Some(parent) => parent.assign(token, value),
            None => Err(RuntimeError::new(
                RuntimeErrorKind::UndefinedVariable,
                &format!("Undefined variable '{}'.", token.lexeme),
                Some(token),
            )),
        }
    }
    pub fn equals(&self, other: &Environment) -> bool {
        Rc::ptr_eq(&self.frame, &other.frame)
    }
}

#[cfg(test)]
mod environment_tests {
    use crate::environment::Environment;
    use crate::interpreter::{ErrorType, RuntimeErrorKind, Value};
    use crate::token::{Token, TokenType};

    fn ident(name: &str) -> Token {
        Token::new(TokenType::Identifier(name.to_string()), name, 1)
    }

    fn as_number(value: Value) -> f64 {
        match value {
            Value::Number(x) => x,
            other => panic!("expected number, got {:?}", other),
        }
    }

    #[test]
    fn define_then_get() {
        let env = Environment::new();
        env.define("a", Value::Number(1.0));
        assert_eq!(as_number(env.get(&ident("a")).unwrap()), 1.0);
    }

    #[test]
    fn get_walks_outward() {
        let globals = Environment::new();
        globals.define("a", Value::Number(1.0));
        let inner = globals.new_child().new_child();
        assert_eq!(as_number(inner.get(&ident("a")).unwrap()), 1.0);
    }

    #[test]
    fn define_shadows_outer_binding() {
        let globals = Environment::new();
        globals.define("a", Value::Number(1.0));
        let inner = globals.new_child();
        inner.define("a", Value::Number(2.0));
        assert_eq!(as_number(inner.get(&ident("a")).unwrap()), 2.0);
        assert_eq!(as_number(globals.get(&ident("a")).unwrap()), 1.0);
    }

    #[test]
    fn assign_mutates_the_owning_frame() {
        let globals = Environment::new();
        globals.define("a", Value::Number(1.0));
        let inner = globals.new_child();
        inner.assign(&ident("a"), Value::Number(5.0)).unwrap();
        assert_eq!(as_number(globals.get(&ident("a")).unwrap()), 5.0);
    }

    #[test]
    fn assign_never_declares() {
        let env = Environment::new();
        let err = env.assign(&ident("missing"), Value::Nil).unwrap_err();
        match err {
            ErrorType::Runtime(e) => {
                assert_eq!(e.kind, RuntimeErrorKind::UndefinedVariable)
            }
            ErrorType::Return(_) => panic!("expected a runtime error"),
        }
    }

    #[test]
    fn captured_frame_outlives_the_block_that_made_it() {
        let globals = Environment::new();
        let captured = {
            let block = globals.new_child();
            block.define("state", Value::Number(42.0));
            block
        };
        // The block scope is gone, but the capture keeps the frame alive.
        assert_eq!(as_number(captured.get(&ident("state")).unwrap()), 42.0);
    }
}
