//! The minimal AST contract this core consumes.
//!
//! The parser itself is an external collaborator: it is responsible for lexing, parsing, and
//! handing the evaluator a tree of [`Expr`]/[`Stmt`] nodes, each carrying a stable [`NodeId`] that
//! the evaluator uses as a cache key and that the binder uses to attach
//! [`crate::scope::Scope`]/[`crate::scope::FlowNode`] metadata. This module defines only the
//! *shape* of that contract; constructing real trees from source text is out of scope for this
//! crate.

use std::fmt;

/// A stable identity for an AST node, assigned by the producing parser. IDs are never reused
/// within one parsed module (the arena is append-only for the lifetime of the module).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub u32);

/// Hands out fresh, strictly-increasing [`NodeId`]s. Stands in for the parser's node arena when
/// building fixtures in tests.
#[derive(Debug, Default)]
pub struct NodeIdGen(u32);

impl NodeIdGen {
    pub fn new() -> Self {
        Self(0)
    }

    pub fn next(&mut self) -> NodeId {
        let id = NodeId(self.0);
        self.0 += 1;
        id
    }
}

/// A byte offset range into the source text, used only for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextRange {
    pub start: u32,
    pub end: u32,
}

impl TextRange {
    pub fn new(start: u32, end: u32) -> Self {
        debug_assert!(start <= end);
        Self { start, end }
    }
}

impl fmt::Display for TextRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Anything with a source range, so diagnostics can be attached without downcasting.
pub trait Ranged {
    fn range(&self) -> TextRange;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExprContext {
    Load,
    Store,
    Del,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Invert,
    UAdd,
    USub,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mult,
    MatMult,
    Div,
    Mod,
    Pow,
    LShift,
    RShift,
    BitOr,
    BitXor,
    BitAnd,
    FloorDiv,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    NotEq,
    Lt,
    LtE,
    Gt,
    GtE,
    Is,
    IsNot,
    In,
    NotIn,
}

impl CmpOp {
    pub fn negate(self) -> Self {
        match self {
            CmpOp::Eq => CmpOp::NotEq,
            CmpOp::NotEq => CmpOp::Eq,
            CmpOp::Lt => CmpOp::GtE,
            CmpOp::LtE => CmpOp::Gt,
            CmpOp::Gt => CmpOp::LtE,
            CmpOp::GtE => CmpOp::Lt,
            CmpOp::Is => CmpOp::IsNot,
            CmpOp::IsNot => CmpOp::Is,
            CmpOp::In => CmpOp::NotIn,
            CmpOp::NotIn => CmpOp::In,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Constant {
    None,
    Bool(bool),
    Ellipsis,
}

/// A single Python expression node.
///
/// One variant per node kind the evaluator's expression dispatch must handle, no more.
/// Statement-shaped sub-expressions (comprehensions, lambda bodies) embed a
/// small amount of statement-like structure inline rather than pulling in a full `Stmt` variant.
#[derive(Debug, Clone)]
pub enum Expr {
    Name {
        id: NodeId,
        range: TextRange,
        name: crate::name::Name,
        ctx: ExprContext,
    },
    MemberAccess {
        id: NodeId,
        range: TextRange,
        value: Box<Expr>,
        attr: crate::name::Name,
        ctx: ExprContext,
    },
    Index {
        id: NodeId,
        range: TextRange,
        value: Box<Expr>,
        index: Box<Expr>,
        ctx: ExprContext,
    },
    Slice {
        id: NodeId,
        range: TextRange,
        lower: Option<Box<Expr>>,
        upper: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
    },
    Call {
        id: NodeId,
        range: TextRange,
        func: Box<Expr>,
        args: Vec<Expr>,
        keywords: Vec<(Option<crate::name::Name>, Expr)>,
    },
    Tuple {
        id: NodeId,
        range: TextRange,
        elements: Vec<Expr>,
        ctx: ExprContext,
    },
    List {
        id: NodeId,
        range: TextRange,
        elements: Vec<Expr>,
        ctx: ExprContext,
    },
    SetExpr {
        id: NodeId,
        range: TextRange,
        elements: Vec<Expr>,
    },
    Dict {
        id: NodeId,
        range: TextRange,
        keys: Vec<Option<Expr>>,
        values: Vec<Expr>,
    },
    Constant {
        id: NodeId,
        range: TextRange,
        value: Constant,
    },
    Number {
        id: NodeId,
        range: TextRange,
        is_int: bool,
        is_complex: bool,
    },
    StringList {
        id: NodeId,
        range: TextRange,
        value: String,
        is_bytes: bool,
    },
    Ellipsis {
        id: NodeId,
        range: TextRange,
    },
    UnaryOp {
        id: NodeId,
        range: TextRange,
        op: UnaryOp,
        operand: Box<Expr>,
    },
    BinOp {
        id: NodeId,
        range: TextRange,
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolOp {
        id: NodeId,
        range: TextRange,
        op: BoolOp,
        values: Vec<Expr>,
    },
    Compare {
        id: NodeId,
        range: TextRange,
        left: Box<Expr>,
        ops: Vec<CmpOp>,
        comparators: Vec<Expr>,
    },
    Await {
        id: NodeId,
        range: TextRange,
        value: Box<Expr>,
    },
    Ternary {
        id: NodeId,
        range: TextRange,
        test: Box<Expr>,
        body: Box<Expr>,
        or_else: Box<Expr>,
    },
    ListComprehension {
        id: NodeId,
        range: TextRange,
        element: Box<Expr>,
        target: Box<Expr>,
        iter: Box<Expr>,
        ifs: Vec<Expr>,
        is_async: bool,
    },
    Lambda {
        id: NodeId,
        range: TextRange,
        parameters: Vec<Parameter>,
        body: Box<Expr>,
    },
    Assignment {
        id: NodeId,
        range: TextRange,
        targets: Vec<Expr>,
        value: Box<Expr>,
    },
    AssignmentExpression {
        id: NodeId,
        range: TextRange,
        target: crate::name::Name,
        value: Box<Expr>,
    },
    Yield {
        id: NodeId,
        range: TextRange,
        value: Option<Box<Expr>>,
    },
    YieldFrom {
        id: NodeId,
        range: TextRange,
        value: Box<Expr>,
    },
    Unpack {
        id: NodeId,
        range: TextRange,
        value: Box<Expr>,
    },
    TypeAnnotation {
        id: NodeId,
        range: TextRange,
        annotation: Box<Expr>,
    },
    Error {
        id: NodeId,
        range: TextRange,
    },
}

impl Expr {
    pub fn id(&self) -> NodeId {
        macro_rules! id_of {
            ($($variant:ident),* $(,)?) => {
                match self {
                    $(Expr::$variant { id, .. } => *id,)*
                }
            };
        }
        id_of!(
            Name,
            MemberAccess,
            Index,
            Slice,
            Call,
            Tuple,
            List,
            SetExpr,
            Dict,
            Constant,
            Number,
            StringList,
            Ellipsis,
            UnaryOp,
            BinOp,
            BoolOp,
            Compare,
            Await,
            Ternary,
            ListComprehension,
            Lambda,
            Assignment,
            AssignmentExpression,
            Yield,
            YieldFrom,
            Unpack,
            TypeAnnotation,
            Error,
        )
    }

    pub fn as_name(&self) -> Option<(&crate::name::Name, ExprContext)> {
        match self {
            Expr::Name { name, ctx, .. } => Some((name, *ctx)),
            _ => None,
        }
    }
}

impl Ranged for Expr {
    fn range(&self) -> TextRange {
        macro_rules! range_of {
            ($($variant:ident),* $(,)?) => {
                match self {
                    $(Expr::$variant { range, .. } => *range,)*
                }
            };
        }
        range_of!(
            Name,
            MemberAccess,
            Index,
            Slice,
            Call,
            Tuple,
            List,
            SetExpr,
            Dict,
            Constant,
            Number,
            StringList,
            Ellipsis,
            UnaryOp,
            BinOp,
            BoolOp,
            Compare,
            Await,
            Ternary,
            ListComprehension,
            Lambda,
            Assignment,
            AssignmentExpression,
            Yield,
            YieldFrom,
            Unpack,
            TypeAnnotation,
            Error,
        )
    }
}

/// A function/lambda parameter, pre-kind-split by the binder into positional-only, regular,
/// `*args`, keyword-only, and `**kwargs` buckets (see `crate::types::signatures`).
#[derive(Debug, Clone)]
pub struct Parameter {
    pub id: NodeId,
    pub name: crate::name::Name,
    pub annotation: Option<Expr>,
    pub default: Option<Expr>,
    pub kind: ParameterKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterKind {
    PositionalOnly,
    PositionalOrKeyword,
    Vararg,
    KeywordOnly,
    KwVararg,
}

#[derive(Debug, Clone)]
pub struct Decorator {
    pub expression: Expr,
}

/// A class or function definition statement, the two statement kinds the evaluator's
/// `get_type_of_class`/`get_type_of_function` entry points operate on directly.
#[derive(Debug, Clone)]
pub struct ClassDefStmt {
    pub id: NodeId,
    pub range: TextRange,
    pub name: crate::name::Name,
    pub bases: Vec<Expr>,
    pub keywords: Vec<(crate::name::Name, Expr)>,
    pub decorators: Vec<Decorator>,
    pub type_params: Vec<crate::name::Name>,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionDefStmt {
    pub id: NodeId,
    pub range: TextRange,
    pub name: crate::name::Name,
    pub parameters: Vec<Parameter>,
    pub returns: Option<Expr>,
    pub decorators: Vec<Decorator>,
    pub type_params: Vec<crate::name::Name>,
    pub is_async: bool,
    pub is_generator: bool,
    pub body: Vec<Stmt>,
    pub doc: Option<String>,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Expr(Expr),
    Assign { targets: Vec<Expr>, value: Expr },
    AnnAssign { target: Expr, annotation: Expr, value: Option<Expr> },
    AugAssign { target: Expr, op: BinOp, value: Expr },
    Return(Option<Expr>),
    ClassDef(Box<ClassDefStmt>),
    FunctionDef(Box<FunctionDefStmt>),
    If { test: Expr, body: Vec<Stmt>, or_else: Vec<Stmt> },
    While { test: Expr, body: Vec<Stmt>, or_else: Vec<Stmt> },
    For { target: Expr, iter: Expr, body: Vec<Stmt>, or_else: Vec<Stmt>, is_async: bool },
    Try { body: Vec<Stmt>, handlers: Vec<Stmt>, or_else: Vec<Stmt>, finally_body: Vec<Stmt> },
    With { items: Vec<(Expr, Option<Expr>)>, body: Vec<Stmt>, is_async: bool },
    Import { modules: Vec<(crate::name::Name, Option<crate::name::Name>)> },
    ImportFrom { module: Option<crate::name::Name>, names: Vec<(crate::name::Name, Option<crate::name::Name>)>, level: u32 },
    Pass,
    Delete(Vec<Expr>),
    Raise(Option<Expr>),
    Global(Vec<crate::name::Name>),
    Nonlocal(Vec<crate::name::Name>),
}
