use std::collections::HashMap;

use crate::runtime_value::RuntimeValue;

/// Variable scopes of running embedded code. The first scope holds the
/// globals (`Model`, `Html`); blocks and loop bodies push nested scopes.
#[derive(Debug)]
pub struct Environment {
    scopes: Vec<HashMap<String, RuntimeValue>>,
}

impl Environment {
    pub fn new() -> Self {
        Environment {
            scopes: vec![HashMap::new()],
        }
    }

    pub fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    pub fn pop_scope(&mut self) {
        if self.scopes.len() > 1 {
            self.scopes.pop();
        }
    }

    /// Declare a variable in the innermost scope, shadowing outer ones.
    pub fn declare(&mut self, name: &str, value: RuntimeValue) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), value);
        }
    }

    /// Declare a variable in the global scope.
    pub fn declare_global(&mut self, name: &str, value: RuntimeValue) {
        self.scopes[0].insert(name.to_string(), value);
    }

    /// Look up a variable, searching from innermost scope outward.
    pub fn get(&self, name: &str) -> Option<&RuntimeValue> {
        self.scopes.iter().rev().find_map(|scope| scope.get(name))
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut RuntimeValue> {
        self.scopes
            .iter_mut()
            .rev()
            .find_map(|scope| scope.get_mut(name))
    }

    /// Assign to the nearest existing variable; an unknown name becomes a global.
    pub fn assign(&mut self, name: &str, value: RuntimeValue) {
        match self.get_mut(name) {
            Some(slot) => *slot = value,
            None => {
                self.scopes[0].insert(name.to_string(), value);
            }
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}
