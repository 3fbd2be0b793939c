use crate::class::Class;
use crate::interpreter::{ErrorType, RuntimeError, RuntimeErrorKind, Value};
use crate::token::Token;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// An object: a reference to its class plus a mutable field map. Cloning an
/// `Instance` clones the handle, not the object, so every copy sees the same
/// fields.
#[derive(Clone, Debug)]
pub struct Instance {
    data: Rc<RefCell<InstanceImpl>>,
}

#[derive(Debug)]
struct InstanceImpl {
    class: Class,
    fields: BTreeMap<String, Value>,
}

impl Instance {
    pub fn new(class: Class) -> Instance {
        Instance {
            data: Rc::new(RefCell::new(InstanceImpl {
                class,
                fields: BTreeMap::new(),
            })),
        }
    }
    /// Fields shadow methods. A method found in the class's table comes back
    /// bound to this receiver, so `this` resolves inside its body even when
    /// the method value is stored and called later.
    pub fn get(&self, name: &Token) -> Result<Value, ErrorType> {
        let data = self.data.borrow();
        if let Some(value) = data.fields.get(&name.lexeme) {
            return Ok(value.clone());
        }
        match data.class.find_method(&name.lexeme) {
            Some(method) => Ok(Value::Function(method.bind(self))),
            None => Err(RuntimeError::new(
                RuntimeErrorKind::UndefinedVariable,
                &format!("Undefined property '{}'.", name.lexeme),
                Some(name),
            )),
        }
    }
    pub fn set(&self, name: &Token, value: Value) {
        self.data
            .borrow_mut()
            .fields
            .insert(name.lexeme.clone(), value);
    }
    pub fn equals(&self, other: &Instance) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Display for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} instance", self.data.borrow().class)
    }
}
