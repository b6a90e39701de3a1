//! Variable frames forming the first link of the lookup chain.
//!
//! A child frame sees every variable of its ancestors; assignments always
//! land in the frame they are made in.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{Body, Param, Template};
use crate::value::{Object, Value};

/// Macro defined by a template
#[derive(Debug)]
pub struct MacroDef {
    pub name: String,
    pub params: Vec<Param>,
    pub body: Body,
    pub template: Rc<Template>,
}

/// Collection resolved by a `with`/`while` expression, consumed by a bare `each`
#[derive(Debug, Clone)]
pub struct EachContext {
    pub alias: String,
    pub collection: Value,
    pub keys: Vec<String>,
}

impl EachContext {
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

#[derive(Debug, Default)]
struct Frame {
    vars: RefCell<Object>,
    macros: RefCell<HashMap<String, Rc<MacroDef>>>,
    each: RefCell<Option<Rc<EachContext>>>,
    parent: Option<Scope>,
}

#[derive(Debug, Clone, Default)]
pub struct Scope(Rc<Frame>);

impl Scope {
    pub fn new(vars: Object) -> Self {
        Scope(Rc::new(Frame {
            vars: RefCell::new(vars),
            ..Default::default()
        }))
    }

    /// Root frame from a value; only objects contribute variables
    pub fn from_value(value: &Value) -> Self {
        match value {
            Value::Object(entries) => Scope::new(entries.as_ref().clone()),
            _ => Scope::default(),
        }
    }

    pub fn child(&self) -> Self {
        Scope(Rc::new(Frame {
            parent: Some(self.clone()),
            ..Default::default()
        }))
    }

    /// Child frame pre-filled with the entries of `vars` when it is an object
    pub fn child_with(&self, vars: &Value) -> Self {
        let child = self.child();
        if let Value::Object(entries) = vars {
            for (key, value) in entries.iter() {
                child.set(key, value.clone());
            }
        }
        child
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(value) = scope.0.vars.borrow().get(name) {
                return Some(value.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }

    /// Value set in this frame itself, ignoring ancestors
    pub fn get_own(&self, name: &str) -> Option<Value> {
        self.0.vars.borrow().get(name).cloned()
    }

    pub fn set(&self, name: &str, value: Value) {
        self.0.vars.borrow_mut().insert(name.to_string(), value);
    }

    pub fn define_macro(&self, definition: MacroDef) {
        self.0
            .macros
            .borrow_mut()
            .insert(definition.name.clone(), Rc::new(definition));
    }

    pub fn find_macro(&self, name: &str) -> Option<Rc<MacroDef>> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(definition) = scope.0.macros.borrow().get(name) {
                return Some(definition.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }

    pub fn set_each_context(&self, context: Rc<EachContext>) {
        *self.0.each.borrow_mut() = Some(context);
    }

    /// Nearest each-context on the chain
    pub fn each_context(&self) -> Option<Rc<EachContext>> {
        let mut frame = Some(self);
        while let Some(scope) = frame {
            if let Some(context) = scope.0.each.borrow().as_ref() {
                return Some(context.clone());
            }
            frame = scope.0.parent.as_ref();
        }
        None
    }
}
