use std::sync::Arc;

use rstest::{fixture, rstest};
use treequery_xpath::{
    ArithmeticOp, BinaryOp, ComparisonOp, Error, ErrorCode, EvaluationContext, ExpandedName, Expr, LogicalOp, XObject,
    default_function_registry, evaluate, evaluate_first, evaluate_to_vec,
};

#[fixture]
fn ctx() -> EvaluationContext {
    EvaluationContext::builder()
        .with_context_item(XObject::from(5_i64))
        .with_variable(ExpandedName::local("n"), XObject::from(4_i64))
        .with_variable(ExpandedName::local("names"), vec![XObject::from("ada"), XObject::from("grace")])
        .build()
}

fn number(expr: &Expr, ctx: &mut EvaluationContext) -> f64 {
    evaluate(expr, ctx).unwrap().as_number().unwrap()
}

fn boolean(expr: &Expr, ctx: &mut EvaluationContext) -> bool {
    evaluate(expr, ctx).unwrap().as_bool().unwrap()
}

fn arith(op: ArithmeticOp, a: Expr, b: Expr) -> Expr {
    Expr::arithmetic(op, a, b)
}

#[rstest]
#[case(ArithmeticOp::Add, 7, 3, 10.0)]
#[case(ArithmeticOp::Sub, 7, 3, 4.0)]
#[case(ArithmeticOp::Mul, 7, 3, 21.0)]
#[case(ArithmeticOp::Div, 7, 2, 3.5)]
#[case(ArithmeticOp::IDiv, 7, 2, 3.0)]
#[case(ArithmeticOp::IDiv, -7, 2, -3.0)]
#[case(ArithmeticOp::Mod, 7, 3, 1.0)]
#[case(ArithmeticOp::Mod, -7, 3, -1.0)]
fn arithmetic_on_integers(
    mut ctx: EvaluationContext,
    #[case] op: ArithmeticOp,
    #[case] a: i64,
    #[case] b: i64,
    #[case] expected: f64,
) {
    assert_eq!(number(&arith(op, Expr::integer(a), Expr::integer(b)), &mut ctx), expected);
}

#[rstest]
fn division_edge_cases(mut ctx: EvaluationContext) {
    assert_eq!(number(&arith(ArithmeticOp::Div, Expr::integer(1), Expr::integer(0)), &mut ctx), f64::INFINITY);
    let err = evaluate(&arith(ArithmeticOp::IDiv, Expr::integer(1), Expr::integer(0)), &mut ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOAR0001);
    let nan = arith(ArithmeticOp::Div, Expr::integer(0), Expr::integer(0));
    let err = evaluate(&arith(ArithmeticOp::IDiv, nan, Expr::integer(2)), &mut ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::FOCA0002);
}

#[rstest]
fn arithmetic_with_an_empty_operand_is_empty(mut ctx: EvaluationContext) {
    let e = arith(ArithmeticOp::Add, Expr::integer(1), Expr::empty_parenthesized());
    assert!(evaluate_to_vec(&e, &mut ctx).unwrap().is_empty());
    let neg = Expr::negate(Expr::sequence(vec![]));
    assert!(evaluate_first(&neg, &mut ctx).unwrap().is_none());
}

#[rstest]
fn arithmetic_rejects_multi_item_operands(mut ctx: EvaluationContext) {
    let e = arith(ArithmeticOp::Add, Expr::var("names"), Expr::integer(1));
    assert_eq!(evaluate(&e, &mut ctx).unwrap_err().code, ErrorCode::XPTY0004);
}

#[rstest]
fn strings_are_converted_to_numbers(mut ctx: EvaluationContext) {
    assert_eq!(number(&arith(ArithmeticOp::Mul, Expr::string(" 2.5 "), Expr::integer(2)), &mut ctx), 5.0);
    assert!(number(&arith(ArithmeticOp::Add, Expr::string("two"), Expr::integer(2)), &mut ctx).is_nan());
}

#[rstest]
#[case(Expr::compare(ComparisonOp::Eq, Expr::var("names"), Expr::string("grace")), true)]
#[case(Expr::compare(ComparisonOp::Ne, Expr::var("names"), Expr::string("grace")), true)]
#[case(Expr::compare(ComparisonOp::Eq, Expr::var("names"), Expr::string("linus")), false)]
#[case(Expr::compare(ComparisonOp::Eq, Expr::empty_parenthesized(), Expr::empty_parenthesized()), false)]
#[case(Expr::compare(ComparisonOp::Lt, Expr::string("10"), Expr::string("9")), false)]
#[case(Expr::compare(ComparisonOp::Eq, Expr::string("10"), Expr::integer(10)), true)]
#[case(Expr::compare(ComparisonOp::Ge, Expr::var("n"), Expr::integer(4)), true)]
#[case(Expr::compare(ComparisonOp::Eq, Expr::call("true", vec![]), Expr::string("x")), true)]
#[case(Expr::compare(ComparisonOp::Gt, Expr::range(Expr::integer(1), Expr::integer(3)), Expr::integer(2)), true)]
fn general_comparisons(mut ctx: EvaluationContext, #[case] expr: Expr, #[case] expected: bool) {
    assert_eq!(boolean(&expr, &mut ctx), expected);
}

#[rstest]
fn logic_short_circuits(mut ctx: EvaluationContext) {
    let or = Expr::binary(BinaryOp::Logical(LogicalOp::Or), Expr::call("true", vec![]), Expr::var("missing"));
    assert!(boolean(&or, &mut ctx));
    let and = Expr::binary(BinaryOp::Logical(LogicalOp::And), Expr::integer(0), Expr::var("missing"));
    assert!(!boolean(&and, &mut ctx));
    let evaluated = Expr::binary(BinaryOp::Logical(LogicalOp::And), Expr::integer(1), Expr::var("missing"));
    assert_eq!(evaluate(&evaluated, &mut ctx).unwrap_err().code, ErrorCode::XPST0008);
}

#[rstest]
fn ranges(mut ctx: EvaluationContext) {
    let up = Expr::range(Expr::integer(3), Expr::var("n"));
    let values: Vec<f64> = evaluate_to_vec(&up, &mut ctx).unwrap().iter().filter_map(XObject::as_number).collect();
    assert_eq!(values, [3.0, 4.0]);
    let backwards = Expr::range(Expr::integer(5), Expr::integer(1));
    assert!(evaluate_to_vec(&backwards, &mut ctx).unwrap().is_empty());
    let fractional = Expr::range(Expr::double(1.5), Expr::integer(3));
    assert_eq!(evaluate(&fractional, &mut ctx).unwrap_err().code, ErrorCode::XPTY0004);
    let count = Expr::call("count", vec![Expr::range(Expr::integer(1), Expr::integer(1000))]);
    assert_eq!(number(&count, &mut ctx), 1000.0);
}

#[rstest]
fn conditionals_take_one_branch(mut ctx: EvaluationContext) {
    let pick = Expr::if_then_else(Expr::var("n"), Expr::string("some"), Expr::var("missing"));
    assert_eq!(evaluate(&pick, &mut ctx).unwrap().as_str(), Some("some"));
    let other = Expr::if_then_else(Expr::string(""), Expr::var("missing"), Expr::integer(2));
    assert_eq!(number(&other, &mut ctx), 2.0);
}

#[rstest]
fn conditions_over_several_atomics_have_no_boolean_value(mut ctx: EvaluationContext) {
    let ambiguous = Expr::if_then_else(Expr::var("names"), Expr::string("some"), Expr::string("none"));
    assert_eq!(evaluate(&ambiguous, &mut ctx).unwrap_err().code, ErrorCode::FORG0006);
}

#[rstest]
fn variables(mut ctx: EvaluationContext) {
    assert_eq!(number(&Expr::var("n"), &mut ctx), 4.0);
    let err = evaluate(&Expr::var("missing"), &mut ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0008);
    assert!(err.message.contains("missing"));
}

#[rstest]
fn context_item_and_focus_functions(mut ctx: EvaluationContext) {
    assert_eq!(number(&Expr::context_item(), &mut ctx), 5.0);
    assert_eq!(number(&Expr::call("position", vec![]), &mut ctx), 1.0);
    let mut empty = EvaluationContext::default();
    assert_eq!(evaluate(&Expr::context_item(), &mut empty).unwrap_err().code, ErrorCode::XPDY0002);
    assert_eq!(evaluate(&Expr::call("last", vec![]), &mut empty).unwrap_err().code, ErrorCode::XPDY0002);
}

#[rstest]
fn function_resolution_errors(mut ctx: EvaluationContext) {
    let unknown = evaluate(&Expr::call("frobnicate", vec![]), &mut ctx).unwrap_err();
    assert_eq!(unknown.code, ErrorCode::XPST0017);
    let arity = evaluate(&Expr::call("count", vec![]), &mut ctx).unwrap_err();
    assert_eq!(arity.code, ErrorCode::XPST0017);
    assert!(arity.message.contains("accepts 1 argument"));
}

#[rstest]
fn string_functions(mut ctx: EvaluationContext) {
    let joined = Expr::call("concat", vec![Expr::string("a"), Expr::integer(1), Expr::call("true", vec![])]);
    assert_eq!(evaluate(&joined, &mut ctx).unwrap().as_str(), Some("a1true"));
    let length = Expr::call("string-length", vec![Expr::string("grace")]);
    assert_eq!(number(&length, &mut ctx), 5.0);
    let of_context = Expr::call("string", vec![]);
    assert_eq!(evaluate(&of_context, &mut ctx).unwrap().as_str(), Some("5"));
    assert!(boolean(&Expr::call("empty", vec![Expr::empty_parenthesized()]), &mut ctx));
    assert!(boolean(&Expr::call("exists", vec![Expr::var("names")]), &mut ctx));
}

#[rstest]
fn custom_functions_can_be_registered() {
    let mut registry = default_function_registry();
    registry.register(
        ExpandedName::local("twice"),
        1,
        Arc::new(|_: &EvaluationContext, args: Vec<XObject>| -> Result<XObject, Error> {
            let n = args.first().and_then(XObject::as_number).unwrap_or(f64::NAN);
            Ok(XObject::Number(n * 2.0))
        }),
    );
    let mut ctx = EvaluationContext::builder().with_functions(Arc::new(registry)).build();
    let call = Expr::call("twice", vec![Expr::integer(21)]);
    assert_eq!(number(&call, &mut ctx), 42.0);
    assert_eq!(number(&Expr::call("count", vec![Expr::integer(1)]), &mut ctx), 1.0);
}

#[rstest]
fn built_ins_need_the_default_namespace() {
    let mut ctx = EvaluationContext::builder().with_default_function_namespace(None).build();
    let err = evaluate(&Expr::call("true", vec![]), &mut ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::XPST0017);
}

#[rstest]
#[case(Expr::string(""), false)]
#[case(Expr::string("0"), true)]
#[case(Expr::integer(0), false)]
#[case(Expr::arithmetic(ArithmeticOp::Div, Expr::integer(0), Expr::integer(0)), false)]
#[case(Expr::empty_parenthesized(), false)]
#[case(Expr::var("n"), true)]
fn effective_boolean_values(mut ctx: EvaluationContext, #[case] expr: Expr, #[case] expected: bool) {
    assert_eq!(boolean(&Expr::call("boolean", vec![expr]), &mut ctx), expected);
}

#[rstest]
fn effective_boolean_of_several_atomics_is_an_error(mut ctx: EvaluationContext) {
    let err = evaluate(&Expr::call("not", vec![Expr::var("names")]), &mut ctx).unwrap_err();
    assert_eq!(err.code, ErrorCode::FORG0006);
}
