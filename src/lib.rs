//! `ecma_rt`: an embeddable ECMAScript interpreter (spec.md §1).
//!
//! This crate evaluates an already-parsed `ast::Program` — tokenization and
//! parsing are an external collaborator (spec.md §1, §6) — and drives the
//! object model, environments, Promise/scheduler job queue, and the rest of
//! the language runtime described in SPEC_FULL.md. A host embeds it by
//! constructing a [`Context`] and calling [`Context::evaluate`] /
//! [`Context::evaluate_module`].
//!
//! Module layout mirrors the subsystems in spec.md §4: `object` (the
//! property protocol and exotic object kinds), `environment` (lexical
//! scopes and the arguments object), `exec` (the tree-walking evaluator),
//! `cps` (the generator/async lowering seams), `promise` + `scheduler` (the
//! cooperative task queue), `regexp` (the `regress`-backed normalizer), and
//! `realm` (the intrinsic prototypes every object is built against).

pub mod ast;
pub mod bigint;
pub mod context;
pub mod cps;
pub mod environment;
pub mod error;
pub mod exec;
pub mod gc;
pub mod object;
pub mod promise;
pub mod property;
pub mod realm;
pub mod regexp;
pub mod scheduler;
pub mod string;
pub mod symbol;
pub mod value;

pub use ast::Program;
pub use context::Context;
pub use error::{EngineError, ErrorKind, JsError, JsNativeError, JsResult};
pub use object::{JsObject, ObjectData};
pub use property::{Attribute, PropertyDescriptor, PropertyKey};
pub use realm::Realm;
pub use string::JsString;
pub use symbol::JsSymbol;
pub use value::JsValue;

pub use bigint::JsBigInt;
