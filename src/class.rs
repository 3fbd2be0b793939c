use crate::callable::LoxFunction;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

/// A class value: a name plus its method table. Calling the class value
/// constructs an instance (see `Interpreter`). The table is fixed at
/// declaration, so no interior mutability is needed.
#[derive(Clone, Debug)]
pub struct Class {
    data: Rc<ClassImpl>,
}

#[derive(Debug)]
struct ClassImpl {
    name: String,
    methods: BTreeMap<String, LoxFunction>,
}

impl Class {
    pub fn new(name: &str, methods: BTreeMap<String, LoxFunction>) -> Class {
        Class {
            data: Rc::new(ClassImpl {
                name: name.to_string(),
                methods,
            }),
        }
    }
    pub fn name(&self) -> &str {
        &self.data.name
    }
    pub fn find_method(&self, name: &str) -> Option<LoxFunction> {
        self.data.methods.get(name).cloned()
    }
    /// Constructor arity is the arity of `init`, or zero without one.
    pub fn arity(&self) -> usize {
        self.find_method("init").map_or(0, |init| init.arity())
    }
    pub fn equals(&self, other: &Class) -> bool {
        Rc::ptr_eq(&self.data, &other.data)
    }
}

impl fmt::Display for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.data.name)
    }
}
