//! Scope tree used by the analyzer for name resolution.
//!
//! Scopes live in an arena and point at their parent by index, so the tree
//! has no ownership cycles. Lookup walks parent links toward the root;
//! declaration inserts into the innermost scope unless the name is already
//! bound somewhere up the chain, in which case that binding is replaced.

use std::collections::HashMap;

use crate::vars::VarId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeId(usize);

#[derive(Debug)]
pub struct Scope {
    pub id: ScopeId,
    pub name: String,
    pub parent: Option<ScopeId>,
    pub bindings: HashMap<String, VarId>,
}

#[derive(Debug)]
pub struct ScopeArena {
    scopes: Vec<Scope>,
}

impl ScopeArena {
    /// Creates the arena with its root scope already in place.
    pub fn new() -> Self {
        let root = Scope {
            id: ScopeId(0),
            name: "scope_0".to_string(),
            parent: None,
            bindings: HashMap::new(),
        };
        ScopeArena { scopes: vec![root] }
    }

    pub fn root(&self) -> ScopeId {
        ScopeId(0)
    }

    pub fn push(&mut self, parent: ScopeId) -> ScopeId {
        let id = ScopeId(self.scopes.len());
        self.scopes.push(Scope {
            id,
            name: format!("scope_{}", id.0),
            parent: Some(parent),
            bindings: HashMap::new(),
        });
        id
    }

    /// Resolves `name` starting from `scope` and walking toward the root.
    pub fn lookup(&self, scope: ScopeId, name: &str) -> Option<VarId> {
        let mut current = Some(scope);
        while let Some(id) = current {
            let s = &self.scopes[id.0];
            if let Some(&var) = s.bindings.get(name) {
                return Some(var);
            }
            current = s.parent;
        }
        None
    }

    /// Binds `name` to `var`. If the name is already bound in `scope` or
    /// any ancestor, the binding in that scope is replaced (redeclaration);
    /// otherwise the name is declared in the innermost scope. Returns true
    /// when a new binding was created.
    pub fn declare(&mut self, scope: ScopeId, name: &str, var: VarId) -> bool {
        let mut current = Some(scope);
        while let Some(id) = current {
            if self.scopes[id.0].bindings.contains_key(name) {
                self.scopes[id.0].bindings.insert(name.to_string(), var);
                return false;
            }
            current = self.scopes[id.0].parent;
        }
        self.scopes[scope.0].bindings.insert(name.to_string(), var);
        true
    }
}

impl Default for ScopeArena {
    fn default() -> Self {
        ScopeArena::new()
    }
}
