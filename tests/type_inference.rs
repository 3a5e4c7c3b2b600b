//! Integration tests that build a small multi-statement program directly as `ty_core::ast` nodes
//! (this crate has no parser of its own — see DESIGN.md) and assert on the types the evaluator
//! derives for it end to end: class body collection, dataclass synthesis, method binding, and the
//! diagnostics produced along the way.

use ty_core::ast::{
    ClassDefStmt, CmpOp, Constant, Decorator, Expr, ExprContext, FunctionDefStmt, NodeId, Parameter,
    ParameterKind, Stmt, TextRange,
};
use ty_core::evaluator::{Evaluator, EvaluatorOptions};
use ty_core::module::InMemoryImportTable;
use ty_core::name::Name;
use ty_core::scope::{FlowGraph, FlowNode, ReferenceBinding, Scope, ScopeId, ScopeKind};
use ty_core::symbol::{Symbol, SymbolId};

fn init_tracing() {
    let _ = tracing_subscriber::fmt::try_init();
}

fn name_expr(id: u32, name: &str) -> Expr {
    Expr::Name { id: NodeId(id), range: TextRange::default(), name: Name::new(name), ctx: ExprContext::Load }
}

fn none_expr(id: u32) -> Expr {
    Expr::Constant { id: NodeId(id), range: TextRange::default(), value: Constant::None }
}

/// `class Point:\n    x: int\n    y: int\n    def dist(self) -> None: ...` turned into a
/// `@dataclass` and checked for its synthesized `__init__` and its own declared method.
#[test]
fn dataclass_synthesizes_init_alongside_user_methods() {
    init_tracing();
    let table = InMemoryImportTable::new();
    let evaluator = Evaluator::new(&table, EvaluatorOptions::default());

    let method = FunctionDefStmt {
        id: NodeId(10),
        range: TextRange::default(),
        name: Name::new("dist"),
        parameters: vec![Parameter {
            id: NodeId(11),
            name: Name::new("self"),
            annotation: None,
            default: None,
            kind: ParameterKind::PositionalOrKeyword,
        }],
        returns: Some(name_expr(12, "None")),
        decorators: vec![],
        type_params: vec![],
        is_async: false,
        is_generator: false,
        body: vec![Stmt::Return(Some(none_expr(13)))],
        doc: None,
    };

    let class = ClassDefStmt {
        id: NodeId(1),
        range: TextRange::default(),
        name: Name::new("Point"),
        bases: vec![],
        keywords: vec![],
        decorators: vec![Decorator { expression: name_expr(2, "dataclass") }],
        type_params: vec![],
        body: vec![
            Stmt::AnnAssign { target: name_expr(3, "x"), annotation: name_expr(4, "int"), value: None },
            Stmt::AnnAssign { target: name_expr(5, "y"), annotation: name_expr(6, "int"), value: None },
            Stmt::FunctionDef(Box::new(method)),
        ],
        doc: None,
    };

    let class_ty = evaluator.get_type_of_class(&class).expect("not cancelled");
    let class_ref = class_ty.as_class_ref().expect("a Class(...) type");

    assert!(class_ref.member("__init__").is_some(), "dataclass synthesis should add __init__");
    assert!(class_ref.member("dist").is_some(), "user-declared method should still be a member");
    assert!(class_ref.member("no_such_member").is_none());
    assert_eq!(evaluator.diagnostics.iter().len(), 0);
}

/// Two independent classes: looking up the second class's own member must not see the first's.
#[test]
fn sibling_classes_do_not_leak_members() {
    init_tracing();
    let table = InMemoryImportTable::new();
    let evaluator = Evaluator::new(&table, EvaluatorOptions::default());

    let make_class = |id: u32, class_name: &str, member_name: &str| ClassDefStmt {
        id: NodeId(id),
        range: TextRange::default(),
        name: Name::new(class_name),
        bases: vec![],
        keywords: vec![],
        decorators: vec![],
        type_params: vec![],
        body: vec![Stmt::AnnAssign {
            target: name_expr(id * 10, member_name),
            annotation: name_expr(id * 10 + 1, "int"),
            value: None,
        }],
        doc: None,
    };

    let first = make_class(1, "First", "only_on_first");
    let second = make_class(2, "Second", "only_on_second");

    let first_ty = evaluator.get_type_of_class(&first).unwrap();
    let second_ty = evaluator.get_type_of_class(&second).unwrap();

    let first_ref = first_ty.as_class_ref().unwrap();
    let second_ref = second_ty.as_class_ref().unwrap();

    assert!(first_ref.member("only_on_first").is_some());
    assert!(first_ref.member("only_on_second").is_none());
    assert!(second_ref.member("only_on_second").is_some());
    assert!(second_ref.member("only_on_first").is_none());
}

/// A `@final` class reported as the base of an override is rejected by `can_override_method`,
/// independent of the parameter/return shapes matching.
#[test]
fn overriding_a_method_of_a_final_class_is_rejected() {
    init_tracing();
    let table = InMemoryImportTable::new();
    let evaluator = Evaluator::new(&table, EvaluatorOptions::default());

    let make_method = |id: u32| FunctionDefStmt {
        id: NodeId(id),
        range: TextRange::default(),
        name: Name::new("run"),
        parameters: vec![Parameter {
            id: NodeId(id + 1),
            name: Name::new("self"),
            annotation: None,
            default: None,
            kind: ParameterKind::PositionalOrKeyword,
        }],
        returns: None,
        decorators: vec![],
        type_params: vec![],
        is_async: false,
        is_generator: false,
        body: vec![Stmt::Pass],
        doc: None,
    };

    let base_method = evaluator.get_type_of_function(&make_method(1)).unwrap();
    let over_method = evaluator.get_type_of_function(&make_method(3)).unwrap();

    let (base_fn, over_fn) = match (base_method, over_method) {
        (ty_core::Type::Function(a), ty_core::Type::Function(b)) => (a, b),
        _ => panic!("expected Function types"),
    };

    assert!(!evaluator.can_override_method(&base_fn, &over_fn, true));
    assert_eq!(evaluator.diagnostics.iter().len(), 1);
}

/// `x: int | None` narrowed by `if x is None:` — a `Name` load inside the branch resolves through
/// an attached scope/symbol and is then narrowed along the attached flow position, exercising both
/// name resolution and code-flow narrowing end to end through the public entry point.
#[test]
fn name_load_narrows_to_none_inside_is_none_branch() {
    init_tracing();
    let table = InMemoryImportTable::new();
    let evaluator = Evaluator::new(&table, EvaluatorOptions::default());

    let scope_id = ScopeId(0);
    let mut symbols = ty_core::symbol::SymbolTable::new();
    let mut x = Symbol::new(Name::new("x"));
    let declared = ty_core::types::union_of([evaluator.builtins.int_instance(None), ty_core::Type::None]);
    x.synthesized_type = Some(declared);
    let symbol_id: SymbolId = symbols.insert(x);
    let scope = Scope {
        kind: ScopeKind::Module,
        parent: None,
        node: NodeId(0),
        symbols: std::rc::Rc::new(std::cell::RefCell::new(symbols)),
    };
    evaluator.attach_scope(scope_id, scope);

    // The test expression `x is None`, evaluated once as a statement's own `if` test.
    let test_subject = name_expr(101, "x");
    evaluator.attach_reference(NodeId(101), ReferenceBinding { scope: scope_id, flow: None });
    let test_expr = Expr::Compare {
        id: NodeId(100),
        range: TextRange::default(),
        left: Box::new(test_subject),
        ops: vec![CmpOp::Is],
        comparators: vec![none_expr(102)],
    };

    let mut graph = FlowGraph::new();
    let start = graph.push(FlowNode::Start);
    let narrowed_read = name_expr(103, "x");
    graph.mark_narrowing_subject(narrowed_read.id());
    let true_branch = graph.push(FlowNode::TrueCondition { antecedent: start, test_node: NodeId(100) });
    evaluator.attach_test_expression(NodeId(100), test_expr);

    evaluator.attach_reference(
        NodeId(103),
        ReferenceBinding { scope: scope_id, flow: Some((std::rc::Rc::new(graph), true_branch)) },
    );

    let _ = symbol_id;
    let ty = evaluator.get_type(&narrowed_read).expect("not cancelled");
    assert!(ty.is_none(), "expected narrowed type to be exactly None, got {ty:?}");
}
