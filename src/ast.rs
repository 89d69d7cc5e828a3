//! The external parser's output contract (spec.md §1 "source tokenization/
//! parsing to AST" is out of scope as an external collaborator; this module
//! is the interface boundary a host frontend targets).
//!
//! Node-kind naming is cross-checked against `boa_ast/src/expression/
//! {await,yield,call,access,new,...}.rs` and `boa_ast/src/statement_list.rs`,
//! trimmed to the set `crate::exec` and `crate::cps` actually consume — this
//! crate does not ship a lexer/parser, so the shape only needs to be
//! expressive enough for those two consumers, not a literal port of
//! `boa_ast`'s much larger node catalogue.

pub use crate::environment::DeclarationKind;
use std::rc::Rc;

/// A full parsed program: the statement list, plus whether the source was
/// parsed as strict-mode (module code, or a `"use strict"` directive).
#[derive(Debug, Clone)]
pub struct Program {
    pub body: Vec<Statement>,
    pub strict: bool,
}

#[derive(Debug, Clone)]
pub enum Statement {
    Expression(Expression),
    VariableDeclaration {
        kind: DeclarationKind,
        declarations: Vec<(Binding, Option<Expression>)>,
    },
    FunctionDeclaration(Rc<FunctionNode>),
    Block(Vec<Statement>),
    If {
        test: Expression,
        consequent: Box<Statement>,
        alternate: Option<Box<Statement>>,
    },
    For {
        init: Option<Box<Statement>>,
        test: Option<Expression>,
        update: Option<Expression>,
        body: Box<Statement>,
    },
    ForOf {
        binding: Binding,
        kind: Option<DeclarationKind>,
        is_await: bool,
        iterable: Expression,
        body: Box<Statement>,
    },
    ForIn {
        binding: Binding,
        kind: Option<DeclarationKind>,
        object: Expression,
        body: Box<Statement>,
    },
    While {
        test: Expression,
        body: Box<Statement>,
    },
    DoWhile {
        body: Box<Statement>,
        test: Expression,
    },
    Return(Option<Expression>),
    Break(Option<String>),
    Continue(Option<String>),
    Throw(Expression),
    Try {
        block: Vec<Statement>,
        handler: Option<(Option<Binding>, Vec<Statement>)>,
        finalizer: Option<Vec<Statement>>,
    },
    Labeled {
        label: String,
        body: Box<Statement>,
    },
    Empty,
}

/// A binding pattern. Destructuring is intentionally left as a single
/// `Identifier` case plus an `Array`/`Object` shorthand sufficient for the
/// `for-of`/`for-in`/declaration forms `crate::exec` drives; full pattern
/// matching nuance (default values inside nested patterns, rest elements in
/// arbitrary positions) is left to the external parser to desugar before
/// handing the evaluator a tree, matching spec.md §1's framing of parsing as
/// an external collaborator.
#[derive(Debug, Clone)]
pub enum Binding {
    Identifier(String),
    Array(Vec<Option<Binding>>),
    Object(Vec<(PropertyKeyNode, Binding)>),
}

#[derive(Debug, Clone)]
pub enum PropertyKeyNode {
    Identifier(String),
    Computed(Box<Expression>),
}

#[derive(Debug, Clone)]
pub struct FunctionNode {
    pub name: Option<String>,
    pub params: Vec<Binding>,
    pub body: Vec<Statement>,
    pub is_async: bool,
    pub is_generator: bool,
    pub is_arrow: bool,
    /// Arrow functions are lexical-`this`; the evaluator skips installing a
    /// function environment's `this` binding when this is `true`.
    pub strict: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    In,
    InstanceOf,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
    Coalesce,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Minus,
    Plus,
    Not,
    BitNot,
    TypeOf,
    Void,
    Delete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    UShr,
    LogicalAnd,
    LogicalOr,
    Coalesce,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Undefined,
    Null,
    Boolean(bool),
    Number(f64),
    BigInt(String),
    String(String),
}

#[derive(Debug, Clone)]
pub enum Expression {
    This,
    Literal(Literal),
    Identifier(String),
    Array(Vec<Option<ArrayElement>>),
    Object(Vec<ObjectProperty>),
    Function(Rc<FunctionNode>),
    Regexp {
        source: String,
        flags: String,
    },
    Template {
        quasis: Vec<String>,
        expressions: Vec<Expression>,
    },
    Unary(UnaryOp, Box<Expression>),
    Update {
        op: UpdateOp,
        prefix: bool,
        target: Box<Expression>,
    },
    Binary(BinaryOp, Box<Expression>, Box<Expression>),
    Logical(LogicalOp, Box<Expression>, Box<Expression>),
    Assign {
        op: AssignOp,
        target: Box<Expression>,
        value: Box<Expression>,
    },
    Conditional {
        test: Box<Expression>,
        consequent: Box<Expression>,
        alternate: Box<Expression>,
    },
    Call {
        callee: Box<Expression>,
        arguments: Vec<ArrayElement>,
        optional: bool,
    },
    New {
        callee: Box<Expression>,
        arguments: Vec<ArrayElement>,
    },
    Member {
        object: Box<Expression>,
        property: MemberProperty,
        optional: bool,
    },
    Sequence(Vec<Expression>),
    Await(Box<Expression>),
    Yield {
        argument: Option<Box<Expression>>,
        delegate: bool,
    },
    Spread(Box<Expression>),
    /// `Promise.resolve`-equivalent, never produced by a hand-written source
    /// tree: `crate::cps::lower_function`'s await-splitting synthesizes this
    /// in place of a literal `Await` so the operand is wrapped in a resolved
    /// promise without draining the job queue (spec.md §4.7).
    AwaitResolve(Box<Expression>),
    /// `GetIterator` (§7.4.2), synthesized by the `for-of`/`for-await-of`
    /// lowering in place of the loop statement's own iterator setup.
    GetIterator(Box<Expression>),
    /// `IteratorStep` (§7.4.3) flattened into a `{value, done}` object,
    /// synthesized alongside `GetIterator` by the same lowering.
    IteratorNext(Box<Expression>),
    /// A generator suspension point, synthesized by `crate::cps::
    /// lower_generator_body` in place of a literal `Yield { delegate: false,
    /// .. }`: `value` is the yielded value, `next` the continuation to run
    /// on the following `.next()`/`.throw()`/`.return()`, invoked directly
    /// by `GeneratorStepper::resume` rather than through any script-visible
    /// call.
    YieldSignal {
        value: Box<Expression>,
        next: Rc<FunctionNode>,
    },
}

#[derive(Debug, Clone)]
pub enum MemberProperty {
    Identifier(String),
    Computed(Box<Expression>),
    Private(String),
}

#[derive(Debug, Clone)]
pub enum ArrayElement {
    Item(Expression),
    Spread(Expression),
}

#[derive(Debug, Clone)]
pub enum ObjectProperty {
    KeyValue {
        key: PropertyKeyNode,
        value: Expression,
        computed: bool,
    },
    Shorthand(String),
    Method {
        key: PropertyKeyNode,
        function: Rc<FunctionNode>,
    },
    Spread(Expression),
}

impl Program {
    /// Collects every top-level `var`-scoped identifier name so the
    /// evaluator can pre-declare them on the enclosing environment before
    /// executing any statement (`crate::exec::declaration`'s var hoisting
    /// pass), without recursing into nested function bodies (those hoist
    /// into their own environment when called).
    pub fn hoisted_var_names(&self) -> Vec<String> {
        let mut out = Vec::new();
        for stmt in &self.body {
            collect_var_names(stmt, &mut out);
        }
        out
    }
}

fn collect_var_names(stmt: &Statement, out: &mut Vec<String>) {
    match stmt {
        Statement::VariableDeclaration {
            kind: DeclarationKind::Var,
            declarations,
        } => {
            for (binding, _) in declarations {
                collect_binding_names(binding, out);
            }
        }
        Statement::Block(body) => {
            for s in body {
                collect_var_names(s, out);
            }
        }
        Statement::If {
            consequent,
            alternate,
            ..
        } => {
            collect_var_names(consequent, out);
            if let Some(alt) = alternate {
                collect_var_names(alt, out);
            }
        }
        Statement::For { init, body, .. } => {
            if let Some(init) = init {
                collect_var_names(init, out);
            }
            collect_var_names(body, out);
        }
        Statement::ForOf { binding, kind, body, .. } | Statement::ForIn { binding, kind, body, .. } => {
            if matches!(kind, Some(DeclarationKind::Var)) {
                collect_binding_names(binding, out);
            }
            collect_var_names(body, out);
        }
        Statement::While { body, .. } | Statement::DoWhile { body, .. } | Statement::Labeled { body, .. } => {
            collect_var_names(body, out);
        }
        Statement::Try {
            block,
            handler,
            finalizer,
        } => {
            for s in block {
                collect_var_names(s, out);
            }
            if let Some((_, body)) = handler {
                for s in body {
                    collect_var_names(s, out);
                }
            }
            if let Some(body) = finalizer {
                for s in body {
                    collect_var_names(s, out);
                }
            }
        }
        _ => {}
    }
}

pub fn collect_binding_names(binding: &Binding, out: &mut Vec<String>) {
    match binding {
        Binding::Identifier(name) => out.push(name.clone()),
        Binding::Array(elements) => {
            for el in elements.iter().flatten() {
                collect_binding_names(el, out);
            }
        }
        Binding::Object(props) => {
            for (_, b) in props {
                collect_binding_names(b, out);
            }
        }
    }
}
