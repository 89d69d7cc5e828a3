//! Lexical environments, bindings and the mapped arguments object (spec.md
//! §3 "Environment", §4.8).
//!
//! Grounded on `boa/src/environment/environment_record_trait.rs`'s
//! recursive-helper shape (`has_binding`/`create_mutable_binding`/
//! `initialize_binding`/`set_mutable_binding`/`get_binding_value`/
//! `delete_binding`) and the four concrete record kinds in the sibling
//! files, collapsed into one `Environment` struct with a `Kind` tag since
//! this crate's evaluator doesn't need record kinds to be separate Rust
//! types — only their binding-resolution *behaviour* differs, and that's
//! captured by `Kind` + `Binding::mutable`.

use crate::error::{JsNativeError, JsResult};
use crate::gc::{empty_trace, Finalize, Trace};
use crate::object::JsObject;
use crate::property::PropertyKey;
use crate::value::JsValue;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeclarationKind {
    Var,
    Let,
    Const,
}

#[derive(Debug, Clone)]
struct Binding {
    /// `None` marks the temporal-dead-zone: declared but not yet
    /// initialized (spec.md §3 Environment: "an uninitialized marker").
    value: Option<JsValue>,
    kind: DeclarationKind,
}

#[derive(Debug)]
enum Kind {
    Declarative,
    Function {
        this_value: RefCell<Option<JsValue>>,
        new_target: JsValue,
    },
    Global {
        global_object: JsObject,
    },
    Object {
        binding_object: JsObject,
    },
}

#[derive(Debug)]
struct Inner {
    kind: Kind,
    parent: Option<Environment>,
    bindings: RefCell<HashMap<String, Binding>>,
}

/// A reference-counted handle to one environment record in the scope
/// chain (spec.md §3: "owns ... a parent reference; a mapping from symbol
/// to binding").
#[derive(Debug, Clone)]
pub struct Environment(Rc<Inner>);

unsafe impl Trace for Environment {
    empty_trace!();
}
impl Finalize for Environment {}

impl Environment {
    fn new(kind: Kind, parent: Option<Environment>) -> Self {
        Self(Rc::new(Inner {
            kind,
            parent,
            bindings: RefCell::new(HashMap::new()),
        }))
    }

    pub fn new_declarative(parent: Option<Environment>) -> Self {
        Self::new(Kind::Declarative, parent)
    }

    pub fn new_function(parent: Option<Environment>, this_value: Option<JsValue>, new_target: JsValue) -> Self {
        Self::new(
            Kind::Function {
                this_value: RefCell::new(this_value),
                new_target,
            },
            parent,
        )
    }

    pub fn new_global(global_object: JsObject) -> Self {
        Self::new(Kind::Global { global_object }, None)
    }

    pub fn new_object(binding_object: JsObject, parent: Option<Environment>) -> Self {
        Self::new(Kind::Object { binding_object }, parent)
    }

    pub fn parent(&self) -> Option<&Environment> {
        self.0.parent.as_ref()
    }

    pub fn global_object(&self) -> Option<JsObject> {
        match &self.0.kind {
            Kind::Global { global_object } => Some(global_object.clone()),
            _ => self.0.parent.as_ref().and_then(Environment::global_object),
        }
    }

    /// `this` resolution walks outward to the nearest function environment
    /// (arrow functions are lexical-`this` and don't create one).
    pub fn resolve_this(&self) -> JsValue {
        match &self.0.kind {
            Kind::Function { this_value, .. } => {
                this_value.borrow().clone().unwrap_or(JsValue::undefined())
            }
            Kind::Global { global_object } => JsValue::Object(global_object.clone()),
            _ => self
                .0
                .parent
                .as_ref()
                .map(Environment::resolve_this)
                .unwrap_or(JsValue::undefined()),
        }
    }

    pub fn new_target(&self) -> JsValue {
        match &self.0.kind {
            Kind::Function { new_target, .. } => new_target.clone(),
            _ => self
                .0
                .parent
                .as_ref()
                .map(Environment::new_target)
                .unwrap_or(JsValue::undefined()),
        }
    }

    pub fn has_binding(&self, name: &str) -> bool {
        if self.0.bindings.borrow().contains_key(name) {
            return true;
        }
        if let Kind::Object { binding_object } = &self.0.kind {
            if crate::object::operations::own_keys(binding_object)
                .iter()
                .any(|k| matches!(k, PropertyKey::String(s) if s.as_str() == name))
            {
                return true;
            }
        }
        self.0
            .parent
            .as_ref()
            .map(|p| p.has_binding(name))
            .unwrap_or(false)
    }

    pub fn create_mutable_binding(&self, name: &str, kind: DeclarationKind) {
        self.0.bindings.borrow_mut().entry(name.to_string()).or_insert(Binding {
            value: if kind == DeclarationKind::Var {
                Some(JsValue::undefined())
            } else {
                None
            },
            kind,
        });
    }

    pub fn initialize_binding(&self, name: &str, value: JsValue) {
        if let Some(b) = self.0.bindings.borrow_mut().get_mut(name) {
            b.value = Some(value);
        }
    }

    /// §9.1.1.1.5 SetMutableBinding, generalized to walk outward (spec.md
    /// §4.8: "`Assign(symbol,value)` walks outward to the binding's owner").
    pub fn assign(&self, name: &str, value: JsValue) -> JsResult<()> {
        if let Some(b) = self.0.bindings.borrow_mut().get_mut(name) {
            match b.value {
                None => {
                    return Err(JsNativeError::reference(format!(
                        "cannot access '{name}' before initialization"
                    ))
                    .into())
                }
                Some(_) if b.kind == DeclarationKind::Const => {
                    return Err(JsNativeError::typ(format!("assignment to constant variable '{name}'")).into())
                }
                _ => {
                    b.value = Some(value);
                    return Ok(());
                }
            }
        }
        if let Kind::Object { binding_object } = &self.0.kind {
            let key = PropertyKey::from_str(name);
            if crate::object::operations::own_keys(binding_object).contains(&key) {
                let obj = binding_object.clone();
                crate::object::operations::set(&obj, key, value, &JsValue::Object(obj.clone()), &mut |_, _, _| {
                    Ok(JsValue::undefined())
                })?;
                return Ok(());
            }
        }
        match &self.0.parent {
            Some(p) => p.assign(name, value),
            None => Err(JsNativeError::reference(format!("{name} is not defined")).into()),
        }
    }

    pub fn get_binding_value(&self, name: &str) -> JsResult<Option<JsValue>> {
        if let Some(b) = self.0.bindings.borrow().get(name) {
            return match &b.value {
                Some(v) => Ok(Some(v.clone())),
                None => Err(JsNativeError::reference(format!(
                    "cannot access '{name}' before initialization"
                ))
                .into()),
            };
        }
        if let Kind::Object { binding_object } = &self.0.kind {
            let key = PropertyKey::from_str(name);
            if crate::object::operations::own_keys(binding_object).contains(&key) {
                let obj = binding_object.clone();
                let mut getter = |_: &JsValue, _: &JsValue, _: &[JsValue]| Ok(JsValue::undefined());
                let v = crate::object::operations::try_get(&obj, &key, &JsValue::Object(obj.clone()), &mut getter)?;
                return Ok(v);
            }
        }
        match &self.0.parent {
            Some(p) => p.get_binding_value(name),
            None => Ok(None),
        }
    }

    pub fn delete_binding(&self, name: &str) -> bool {
        self.0.bindings.borrow_mut().remove(name).is_some()
    }

    /// Every name bound directly on this environment (not its parents), in
    /// no particular order. `crate::realm`'s module namespace construction
    /// uses this to treat every top-level binding of a module body as an
    /// export, since this crate's AST has no static `export` syntax to
    /// enumerate instead (see DESIGN.md's module-linking resolution).
    pub fn own_binding_names(&self) -> Vec<String> {
        self.0.bindings.borrow().keys().cloned().collect()
    }
}

/// The arguments-object exotic mapping (spec.md §4.8): index `i` reflects
/// into the i-th parameter binding in `environment`, two-way, as long as
/// the callee is non-strict and the index hasn't been "unmapped" by a
/// reconfiguring `defineProperty`.
#[derive(Debug, Trace, Finalize)]
pub struct ArgumentsData {
    #[unsafe_ignore_trace]
    pub mapped: RefCell<Vec<Option<String>>>,
    pub environment: Environment,
    #[unsafe_ignore_trace]
    pub strict: bool,
}

impl ArgumentsData {
    pub fn new(param_names: Vec<String>, environment: Environment, strict: bool) -> Self {
        Self {
            mapped: RefCell::new(param_names.into_iter().map(Some).collect()),
            environment,
            strict,
        }
    }

    pub fn get_mapped(&self, index: u32) -> Option<JsValue> {
        let mapped = self.mapped.borrow();
        let name = mapped.get(index as usize)?.as_ref()?;
        self.environment.get_binding_value(name).ok().flatten()
    }

    pub fn set_mapped(&self, index: u32, value: JsValue) -> bool {
        let mapped = self.mapped.borrow();
        let Some(Some(name)) = mapped.get(index as usize) else {
            return false;
        };
        self.environment.assign(name, value).is_ok()
    }

    /// Reconfiguring an index via `defineProperty` into an accessor or
    /// non-writable slot unmaps it thereafter (spec.md §4.8).
    pub fn unmap(&self, index: u32) {
        if let Some(slot) = self.mapped.borrow_mut().get_mut(index as usize) {
            *slot = None;
        }
    }

    pub fn is_mapped(&self, index: u32) -> bool {
        self.mapped
            .borrow()
            .get(index as usize)
            .map(|s| s.is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tdz_access_throws_reference_error() {
        let env = Environment::new_declarative(None);
        env.create_mutable_binding("x", DeclarationKind::Let);
        assert!(env.get_binding_value("x").is_err());
        env.initialize_binding("x", JsValue::from(1.0));
        assert_eq!(env.get_binding_value("x").unwrap().unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn const_rebind_is_a_type_error() {
        let env = Environment::new_declarative(None);
        env.create_mutable_binding("x", DeclarationKind::Const);
        env.initialize_binding("x", JsValue::from(1.0));
        assert!(env.assign("x", JsValue::from(2.0)).is_err());
    }

    #[test]
    fn assign_walks_outward_to_owning_frame() {
        let outer = Environment::new_declarative(None);
        outer.create_mutable_binding("x", DeclarationKind::Var);
        outer.initialize_binding("x", JsValue::from(1.0));
        let inner = Environment::new_declarative(Some(outer.clone()));
        inner.assign("x", JsValue::from(2.0)).unwrap();
        assert_eq!(outer.get_binding_value("x").unwrap().unwrap().as_number(), Some(2.0));
    }

    #[test]
    fn arguments_mapping_reflects_parameter_writes() {
        let env = Environment::new_declarative(None);
        env.create_mutable_binding("a", DeclarationKind::Var);
        env.initialize_binding("a", JsValue::from(1.0));
        let args = ArgumentsData::new(vec!["a".to_string()], env.clone(), false);
        assert_eq!(args.get_mapped(0).unwrap().as_number(), Some(1.0));
        env.assign("a", JsValue::from(42.0)).unwrap();
        assert_eq!(args.get_mapped(0).unwrap().as_number(), Some(42.0));
        assert!(args.set_mapped(0, JsValue::from(7.0)));
        assert_eq!(env.get_binding_value("a").unwrap().unwrap().as_number(), Some(7.0));
        args.unmap(0);
        assert!(!args.is_mapped(0));
    }
}
