//! Interned Symbols.
//!
//! Every `JsSymbol` carries a globally unique id plus an optional
//! description; equality is by id, never by description, matching the
//! language's `Symbol()` semantics. `Symbol.for`/`Symbol.keyFor` are backed
//! by a separate realm-independent global registry keyed on description,
//! mirroring the single shared table real engines keep for the global
//! symbol registry.

use crate::gc::{empty_trace, Finalize, Trace};
use std::{
    cell::RefCell,
    collections::HashMap,
    fmt,
    hash::{Hash, Hasher},
    rc::Rc,
    sync::atomic::{AtomicU64, Ordering},
};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Clone)]
pub struct JsSymbol(Rc<Inner>);

struct Inner {
    id: u64,
    description: Option<Rc<str>>,
}

unsafe impl Trace for JsSymbol {
    empty_trace!();
}
impl Finalize for JsSymbol {}

impl JsSymbol {
    pub fn new(description: Option<&str>) -> Self {
        let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
        Self(Rc::new(Inner {
            id,
            description: description.map(Rc::from),
        }))
    }

    pub fn description(&self) -> Option<&str> {
        self.0.description.as_deref()
    }

    pub fn id(&self) -> u64 {
        self.0.id
    }
}

impl PartialEq for JsSymbol {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}
impl Eq for JsSymbol {}

impl Hash for JsSymbol {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state)
    }
}

impl fmt::Debug for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({:?})", self.0.description)
    }
}

impl fmt::Display for JsSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0.description.as_deref().unwrap_or(""))
    }
}

thread_local! {
    static GLOBAL_REGISTRY: RefCell<HashMap<Rc<str>, JsSymbol>> = RefCell::new(HashMap::new());
}

/// `Symbol.for(key)`.
pub fn symbol_for(key: &str) -> JsSymbol {
    GLOBAL_REGISTRY.with(|reg| {
        let mut reg = reg.borrow_mut();
        if let Some(sym) = reg.values().find(|s| s.description() == Some(key)) {
            return sym.clone();
        }
        let sym = JsSymbol::new(Some(key));
        reg.insert(Rc::from(key), sym.clone());
        sym
    })
}

/// `Symbol.keyFor(sym)`.
pub fn symbol_key_for(sym: &JsSymbol) -> Option<String> {
    GLOBAL_REGISTRY.with(|reg| {
        reg.borrow()
            .iter()
            .find(|(_, v)| *v == sym)
            .map(|(k, _)| k.to_string())
    })
}

/// Well-known symbols, created once per process and shared across realms,
/// matching how `@@iterator` etc. are specified to be singleton symbols.
#[derive(Debug, Clone)]
pub struct WellKnownSymbols {
    pub iterator: JsSymbol,
    pub async_iterator: JsSymbol,
    pub to_primitive: JsSymbol,
    pub to_string_tag: JsSymbol,
    pub has_instance: JsSymbol,
    pub species: JsSymbol,
    pub is_concat_spreadable: JsSymbol,
    pub unscopables: JsSymbol,
    pub r#match: JsSymbol,
    pub match_all: JsSymbol,
    pub replace: JsSymbol,
    pub search: JsSymbol,
    pub split: JsSymbol,
}

impl Default for WellKnownSymbols {
    fn default() -> Self {
        Self {
            iterator: JsSymbol::new(Some("Symbol.iterator")),
            async_iterator: JsSymbol::new(Some("Symbol.asyncIterator")),
            to_primitive: JsSymbol::new(Some("Symbol.toPrimitive")),
            to_string_tag: JsSymbol::new(Some("Symbol.toStringTag")),
            has_instance: JsSymbol::new(Some("Symbol.hasInstance")),
            species: JsSymbol::new(Some("Symbol.species")),
            is_concat_spreadable: JsSymbol::new(Some("Symbol.isConcatSpreadable")),
            unscopables: JsSymbol::new(Some("Symbol.unscopables")),
            r#match: JsSymbol::new(Some("Symbol.match")),
            match_all: JsSymbol::new(Some("Symbol.matchAll")),
            replace: JsSymbol::new(Some("Symbol.replace")),
            search: JsSymbol::new(Some("Symbol.search")),
            split: JsSymbol::new(Some("Symbol.split")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identity_not_description_equality() {
        let a = JsSymbol::new(Some("x"));
        let b = JsSymbol::new(Some("x"));
        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn global_registry_round_trips() {
        let a = symbol_for("shared");
        let b = symbol_for("shared");
        assert_eq!(a, b);
        assert_eq!(symbol_key_for(&a).as_deref(), Some("shared"));
    }
}
