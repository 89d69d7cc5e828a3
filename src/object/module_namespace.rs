//! The immutable module namespace object (spec.md §3 "ModuleNamespace",
//! §4.8).
//!
//! Grounded on `boa/src/object/internal_methods/mod.rs`'s per-kind
//! internal-method override pattern — `set`/`delete`/`setPrototypeOf` are
//! overridden to always fail, exactly as `internal_methods/string.rs` and
//! `arguments.rs` override specific traps rather than the whole vtable.

use crate::error::{JsNativeError, JsResult};
use crate::gc::{Finalize, Trace};
use crate::value::JsValue;
use std::rc::Rc;

/// A live-binding lookup: given an export name, returns its current value,
/// or the uninitialized sentinel if TDZ hasn't cleared yet (spec.md's
/// namespace-plus-lookup-thunk resolution of the module-linking Open
/// Question — see DESIGN.md).
pub type BindingLookup = Rc<dyn Fn(&str) -> Option<JsValue>>;

#[derive(Trace, Finalize)]
pub struct ModuleNamespaceData {
    #[unsafe_ignore_trace]
    pub export_names: Vec<String>,
    #[unsafe_ignore_trace]
    lookup: BindingLookup,
}

impl std::fmt::Debug for ModuleNamespaceData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleNamespaceData")
            .field("export_names", &self.export_names)
            .finish()
    }
}

impl ModuleNamespaceData {
    pub fn new(mut export_names: Vec<String>, lookup: BindingLookup) -> Self {
        export_names.sort();
        Self { export_names, lookup }
    }

    /// §10.4.6.8 ModuleNamespaceGetOwnProperty / [[Get]]: throws
    /// ReferenceError on an uninitialized (TDZ) binding.
    pub fn get(&self, name: &str) -> JsResult<Option<JsValue>> {
        if !self.export_names.iter().any(|n| n == name) {
            return Ok(None);
        }
        match (self.lookup)(name) {
            Some(v) => Ok(Some(v)),
            None => Err(JsNativeError::reference(format!(
                "cannot access '{name}' before initialization"
            ))
            .into()),
        }
    }

    pub fn has(&self, name: &str) -> bool {
        self.export_names.iter().any(|n| n == name)
    }
}

/// `set`/`delete`/`setPrototypeOf(non-null)` on a module namespace always
/// fail, per spec.md §4.8.
pub fn reject_mutation(op: &str) -> JsResult<bool> {
    Err(JsNativeError::typ(format!("cannot {op} on a module namespace object")).into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uninitialized_export_throws_reference_error() {
        let ns = ModuleNamespaceData::new(vec!["x".into()], Rc::new(|_| None));
        assert!(ns.get("x").is_err());
    }

    #[test]
    fn initialized_export_resolves_through_thunk() {
        let ns = ModuleNamespaceData::new(
            vec!["x".into()],
            Rc::new(|n| if n == "x" { Some(JsValue::from(1.0)) } else { None }),
        );
        assert_eq!(ns.get("x").unwrap().unwrap().as_number(), Some(1.0));
    }

    #[test]
    fn unknown_export_is_absent_not_an_error() {
        let ns = ModuleNamespaceData::new(vec!["x".into()], Rc::new(|_| None));
        assert!(ns.get("y").unwrap().is_none());
    }
}
