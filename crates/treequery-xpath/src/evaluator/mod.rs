//! Tree-walking evaluator.
//!
//! [`evaluate`] produces an [`XObject`] for an expression. Comma sequences and ranges come
//! back as lazy sequences; paths, filters and function results are materialized.
//! Everything that needs the current item takes it from the context's focus stack and
//! changes it only through scoped guards.
use itertools::Itertools;
use treequery_dtm::{NodeHandle, compare_document_order};

use crate::ast::{ArithmeticOp, BinaryOp, ComparisonOp, Expr, Literal, LogicalOp, PathStart, Slots};
use crate::context::EvaluationContext;
use crate::error::{Error, ErrorCode};
use crate::seqctor::{ExprSequence, SequenceMode};
use crate::sequence::RangeSequence;
use crate::xobject::{ExpandedName, XObject, format_number, parse_number};

mod axes;
mod casting;
mod traversal;

pub use traversal::{KindMask, NodeFilter, NodeIterator, node_iterator, single_node};

/// Evaluates `expr` against `ctx`. The focus depth of `ctx` is the same afterwards,
/// whether evaluation succeeds or fails.
pub fn evaluate(expr: &Expr, ctx: &mut EvaluationContext) -> Result<XObject, Error> {
    match expr {
        Expr::Literal(Literal::String(s)) => Ok(XObject::String(s.clone())),
        Expr::Literal(Literal::Integer(i)) => Ok(XObject::from(*i)),
        Expr::Literal(Literal::Double(d)) => Ok(XObject::Number(*d)),
        Expr::ContextItem => ctx.current_item(),
        Expr::VarRef(q) => ctx.variable(&ExpandedName::from(q)),
        Expr::Parenthesized(slots) => match slots.get(0) {
            Some(inner) => evaluate(inner, ctx),
            None => Ok(XObject::empty()),
        },
        Expr::Sequence(slots) if slots.is_empty() => Ok(XObject::empty()),
        Expr::Sequence(slots) => {
            Ok(XObject::Sequence(Box::new(ExprSequence::from_slots(slots.share(), ctx, SequenceMode::ForwardOnly))))
        }
        Expr::Binary(b) => {
            let (left, right) = (required(&b.operands, 0, "left operand")?, required(&b.operands, 1, "right operand")?);
            match b.op {
                BinaryOp::Arithmetic(op) => arithmetic(ctx, op, left, right),
                BinaryOp::Comparison(op) => general_compare(ctx, op, left, right),
                BinaryOp::Logical(op) => logical(ctx, op, left, right),
                BinaryOp::Range => range(ctx, left, right),
            }
        }
        Expr::Unary(u) => {
            let operand = required(&u.operand, 0, "operand")?;
            let Some(n) = optional_number(ctx, operand, "unary minus")? else {
                return Ok(XObject::empty());
            };
            Ok(XObject::Number(if u.negate { -n } else { n }))
        }
        Expr::If(i) => {
            let cond = required(&i.branches, 0, "condition")?;
            let branch = if effective_boolean(evaluate(cond, ctx)?)? { 1 } else { 2 };
            evaluate(required(&i.branches, branch, "branch")?, ctx)
        }
        Expr::CastOrTreat(c) if c.is_cast() => casting::cast(ctx, c),
        Expr::CastOrTreat(c) => casting::treat(ctx, c),
        Expr::FunctionCall(f) => {
            let name = ExpandedName::from(&f.name);
            let func = ctx.functions().resolve(&name, f.args.len(), ctx.default_function_namespace())?.clone();
            let mut args = Vec::with_capacity(f.args.len());
            for i in 0..f.args.len() {
                args.push(evaluate(required(&f.args, i, "argument")?, ctx)?);
            }
            func(&*ctx, args)
        }
        Expr::Path(p) => path(ctx, p.start, &p.steps),
        Expr::Step(s) => {
            let node = ctx.current_node()?.ok_or_else(|| {
                Error::from_code(ErrorCode::XPTY0020, format!("axis step {} needs a node as context item", s.axis.name()))
            })?;
            let nodes = axes::step(ctx, node, s)?;
            Ok(into_value(nodes.into_iter().map(XObject::Node).collect()))
        }
        Expr::Filter(f) => {
            let base = flatten(evaluate(required(&f.slots, 0, "filter base")?, ctx)?)?;
            let mut items = base;
            for i in 1..f.slots.len() {
                let pred = required(&f.slots, i, "predicate")?;
                items = apply_predicate(ctx, items, pred)?;
            }
            Ok(into_value(items))
        }
    }
}

/// Evaluates and drains the result into its flattened items.
pub fn evaluate_to_vec(expr: &Expr, ctx: &mut EvaluationContext) -> Result<Vec<XObject>, Error> {
    flatten(evaluate(expr, ctx)?)
}

/// First item of the result, without draining lazy sequences.
pub fn evaluate_first(expr: &Expr, ctx: &mut EvaluationContext) -> Result<Option<XObject>, Error> {
    first_item(evaluate(expr, ctx)?)
}

pub(crate) fn required<'a>(slots: &'a Slots, i: usize, what: &str) -> Result<&'a Expr, Error> {
    slots.get(i).ok_or_else(|| Error::malformed(format!("{what} (slot {i}) was never attached")))
}

/// A single item stays as is; anything else becomes a materialized sequence.
pub(crate) fn into_value(mut items: Vec<XObject>) -> XObject {
    if items.len() == 1
        && let Some(item) = items.pop()
    {
        return item;
    }
    XObject::sequence(items)
}

pub(crate) fn flatten(value: XObject) -> Result<Vec<XObject>, Error> {
    let mut out = Vec::new();
    push_flat(value, &mut out)?;
    Ok(out)
}

fn push_flat(value: XObject, out: &mut Vec<XObject>) -> Result<(), Error> {
    match value {
        XObject::Sequence(mut seq) => {
            while let Some(v) = seq.next()? {
                push_flat(v, out)?;
            }
        }
        item => out.push(item),
    }
    Ok(())
}

pub(crate) fn first_item(value: XObject) -> Result<Option<XObject>, Error> {
    let mut value = value;
    loop {
        match value {
            XObject::Sequence(mut seq) => match seq.next()? {
                Some(v) => value = v,
                None => return Ok(None),
            },
            item => return Ok(Some(item)),
        }
    }
}

/// Nodes become their string value; other items are returned unchanged.
pub(crate) fn atomize(ctx: &EvaluationContext, item: XObject) -> Result<XObject, Error> {
    match item {
        XObject::Node(h) => Ok(XObject::String(ctx.owner_of(h)?.string_value(h)?)),
        other => Ok(other),
    }
}

/// String value of the first item; the empty sequence is `""`.
pub(crate) fn string_value(ctx: &EvaluationContext, value: XObject) -> Result<String, Error> {
    Ok(match first_item(value)? {
        None => String::new(),
        Some(XObject::String(s)) => s,
        Some(XObject::Number(n)) => format_number(n),
        Some(XObject::Boolean(b)) => b.to_string(),
        Some(XObject::Node(h)) => ctx.owner_of(h)?.string_value(h)?,
        Some(XObject::Sequence(_)) => String::new(),
    })
}

/// Number value of the first item; the empty sequence is NaN.
pub(crate) fn number_value(ctx: &EvaluationContext, value: XObject) -> Result<f64, Error> {
    Ok(match first_item(value)? {
        None | Some(XObject::Sequence(_)) => f64::NAN,
        Some(XObject::Number(n)) => n,
        Some(XObject::Boolean(b)) => f64::from(u8::from(b)),
        Some(XObject::String(s)) => parse_number(&s),
        Some(XObject::Node(h)) => parse_number(&ctx.owner_of(h)?.string_value(h)?),
    })
}

fn atomic_boolean(item: &XObject) -> bool {
    match item {
        XObject::Boolean(b) => *b,
        XObject::String(s) => !s.is_empty(),
        XObject::Number(n) => *n != 0.0 && !n.is_nan(),
        XObject::Node(_) | XObject::Sequence(_) => true,
    }
}

/// Effective boolean value. A sequence is false when empty and true when it starts with
/// a node; a single atomic item decides by itself; anything else is `FORG0006`.
pub(crate) fn effective_boolean(value: XObject) -> Result<bool, Error> {
    let seq = match value {
        XObject::Sequence(seq) => seq,
        item => return Ok(atomic_boolean(&item)),
    };
    let mut stack = vec![seq];
    let mut first = None;
    while let Some(top) = stack.last_mut() {
        match top.next()? {
            None => {
                stack.pop();
            }
            Some(XObject::Sequence(inner)) => stack.push(inner),
            Some(item) if first.is_none() => {
                if item.is_node() {
                    return Ok(true);
                }
                first = Some(item);
            }
            Some(_) => {
                return Err(Error::from_code(
                    ErrorCode::FORG0006,
                    "effective boolean value is undefined for a sequence of several atomic values",
                ));
            }
        }
    }
    Ok(first.is_some_and(|f| atomic_boolean(&f)))
}

fn optional_number(ctx: &mut EvaluationContext, expr: &Expr, op: &str) -> Result<Option<f64>, Error> {
    let mut items = flatten(evaluate(expr, ctx)?)?;
    if items.len() > 1 {
        return Err(Error::type_error(format!("{op} expects at most one item, got {}", items.len())));
    }
    match items.pop() {
        None => Ok(None),
        Some(item) => Ok(Some(number_value(ctx, atomize(ctx, item)?)?)),
    }
}

fn arithmetic(ctx: &mut EvaluationContext, op: ArithmeticOp, left: &Expr, right: &Expr) -> Result<XObject, Error> {
    let (Some(a), Some(b)) = (optional_number(ctx, left, "arithmetic")?, optional_number(ctx, right, "arithmetic")?)
    else {
        return Ok(XObject::empty());
    };
    let n = match op {
        ArithmeticOp::Add => a + b,
        ArithmeticOp::Sub => a - b,
        ArithmeticOp::Mul => a * b,
        ArithmeticOp::Div => a / b,
        ArithmeticOp::Mod => a % b,
        ArithmeticOp::IDiv => {
            if b == 0.0 {
                return Err(Error::from_code(ErrorCode::FOAR0001, "integer division by zero"));
            }
            if a.is_nan() || b.is_nan() || a.is_infinite() {
                return Err(Error::from_code(
                    ErrorCode::FOCA0002,
                    format!("cannot integer-divide {} by {}", format_number(a), format_number(b)),
                ));
            }
            (a / b).trunc()
        }
    };
    Ok(XObject::Number(n))
}

fn compare_numbers(op: ComparisonOp, a: f64, b: f64) -> bool {
    match op {
        ComparisonOp::Eq => a == b,
        ComparisonOp::Ne => a != b,
        ComparisonOp::Lt => a < b,
        ComparisonOp::Le => a <= b,
        ComparisonOp::Gt => a > b,
        ComparisonOp::Ge => a >= b,
    }
}

/// Compares two atomized items with the XPath 1.0 conversion rules: booleans win, then
/// numbers; two strings compare as strings for (in)equality and as numbers otherwise.
fn compare_atomic(op: ComparisonOp, a: &XObject, b: &XObject) -> bool {
    let is_bool = |x: &XObject| matches!(x, XObject::Boolean(_));
    let num = |x: &XObject| match x {
        XObject::Number(n) => *n,
        XObject::String(s) => parse_number(s),
        other => f64::from(u8::from(atomic_boolean(other))),
    };
    if (is_bool(a) || is_bool(b)) && matches!(op, ComparisonOp::Eq | ComparisonOp::Ne) {
        return compare_numbers(op, f64::from(u8::from(atomic_boolean(a))), f64::from(u8::from(atomic_boolean(b))));
    }
    match (a, b, op) {
        (XObject::String(x), XObject::String(y), ComparisonOp::Eq) => x == y,
        (XObject::String(x), XObject::String(y), ComparisonOp::Ne) => x != y,
        _ => compare_numbers(op, num(a), num(b)),
    }
}

/// General comparison: true when some pair of items satisfies `op`.
fn general_compare(ctx: &mut EvaluationContext, op: ComparisonOp, left: &Expr, right: &Expr) -> Result<XObject, Error> {
    let lhs: Vec<XObject> = flatten(evaluate(left, ctx)?)?.into_iter().map(|v| atomize(ctx, v)).collect::<Result<_, _>>()?;
    let rhs: Vec<XObject> = flatten(evaluate(right, ctx)?)?.into_iter().map(|v| atomize(ctx, v)).collect::<Result<_, _>>()?;
    let hit = lhs.iter().cartesian_product(rhs.iter()).any(|(a, b)| compare_atomic(op, a, b));
    Ok(XObject::Boolean(hit))
}

fn logical(ctx: &mut EvaluationContext, op: LogicalOp, left: &Expr, right: &Expr) -> Result<XObject, Error> {
    let l = effective_boolean(evaluate(left, ctx)?)?;
    let decided = match op {
        LogicalOp::And => !l,
        LogicalOp::Or => l,
    };
    if decided {
        return Ok(XObject::Boolean(l));
    }
    Ok(XObject::Boolean(effective_boolean(evaluate(right, ctx)?)?))
}

fn range_bound(ctx: &mut EvaluationContext, expr: &Expr) -> Result<Option<i64>, Error> {
    let Some(n) = optional_number(ctx, expr, "range")? else {
        return Ok(None);
    };
    if !n.is_finite() || n.fract() != 0.0 || n.abs() > 9.0e15 {
        return Err(Error::type_error(format!("range bound {} is not an integer", format_number(n))));
    }
    #[allow(clippy::cast_possible_truncation)]
    let bound = n as i64;
    Ok(Some(bound))
}

fn range(ctx: &mut EvaluationContext, from: &Expr, to: &Expr) -> Result<XObject, Error> {
    let (Some(start), Some(end)) = (range_bound(ctx, from)?, range_bound(ctx, to)?) else {
        return Ok(XObject::empty());
    };
    Ok(XObject::Sequence(Box::new(RangeSequence::new(start, end))))
}

/// Keeps the items for which `pred` holds, evaluated with each item in focus.
pub(crate) fn apply_predicate(ctx: &mut EvaluationContext, items: Vec<XObject>, pred: &Expr) -> Result<Vec<XObject>, Error> {
    let size = items.len();
    let mut kept = Vec::with_capacity(size);
    for (i, item) in items.into_iter().enumerate() {
        let position = i + 1;
        let value = {
            let mut scope = ctx.scoped_focus(item.clone(), position, size);
            evaluate(pred, &mut scope)?
        };
        if predicate_truth(value, position)? {
            kept.push(item);
        }
    }
    Ok(kept)
}

/// A single number selects by position; anything else by effective boolean value.
#[allow(clippy::cast_precision_loss)]
fn predicate_truth(value: XObject, position: usize) -> Result<bool, Error> {
    let value = match value {
        XObject::Sequence(_) => into_value(flatten(value)?),
        other => other,
    };
    match value {
        XObject::Number(n) => Ok(n == position as f64),
        other => effective_boolean(other),
    }
}

fn path(ctx: &mut EvaluationContext, start: PathStart, steps: &Slots) -> Result<XObject, Error> {
    let mut rest = 0..steps.len();
    let mut current: Vec<XObject> = match start {
        PathStart::Relative => {
            let Some(first) = rest.next() else {
                return Ok(XObject::empty());
            };
            flatten(evaluate(required(steps, first, "path step")?, ctx)?)?
        }
        PathStart::Root | PathStart::RootDescendants => {
            let node = ctx.current_node()?.ok_or_else(|| {
                Error::from_code(ErrorCode::XPTY0020, "a path starting at the root needs a node as context item")
            })?;
            let model = ctx.owner_of(node)?;
            let root = model.document();
            if start == PathStart::Root {
                vec![XObject::Node(root)]
            } else {
                model.descendants(root, true)?.into_iter().map(XObject::Node).collect()
            }
        }
    };
    for i in rest {
        let step = required(steps, i, "path step")?;
        let inputs = nodes_of(&current)?;
        let size = inputs.len();
        let mut next = Vec::new();
        for (pos, node) in inputs.into_iter().enumerate() {
            let mut scope = ctx.scoped_focus(XObject::Node(node), pos + 1, size);
            push_flat(evaluate(step, &mut scope)?, &mut next)?;
        }
        current = document_order(next)?;
    }
    Ok(into_value(current))
}

fn nodes_of(items: &[XObject]) -> Result<Vec<NodeHandle>, Error> {
    items
        .iter()
        .map(|item| {
            item.as_node().ok_or_else(|| {
                Error::from_code(
                    ErrorCode::XPTY0019,
                    format!("path step applied to a non-node ({})", item.type_name()),
                )
            })
        })
        .collect()
}

/// Sorts node results into document order without duplicates. Atomic results keep their
/// order; a mix of both is a type error.
fn document_order(items: Vec<XObject>) -> Result<Vec<XObject>, Error> {
    let nodes = items.iter().filter(|i| i.is_node()).count();
    if nodes == 0 {
        return Ok(items);
    }
    if nodes != items.len() {
        return Err(Error::from_code(ErrorCode::XPTY0019, "path step returned both nodes and atomic values"));
    }
    Ok(items
        .into_iter()
        .filter_map(|i| i.as_node())
        .sorted_by(|a, b| compare_document_order(*a, *b))
        .dedup()
        .map(XObject::Node)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_boolean_of_sequences() {
        assert!(!effective_boolean(XObject::empty()).unwrap());
        assert!(effective_boolean(XObject::sequence(vec![XObject::from("x")])).unwrap());
        let err = effective_boolean(XObject::sequence(vec![XObject::from(1.0), XObject::from(2.0)])).unwrap_err();
        assert_eq!(err.code, ErrorCode::FORG0006);
    }

    #[test]
    fn comparisons_follow_conversion_order() {
        assert!(compare_atomic(ComparisonOp::Eq, &XObject::from("1.0"), &XObject::from(1.0)));
        assert!(!compare_atomic(ComparisonOp::Eq, &XObject::from("1.0"), &XObject::from("1")));
        assert!(compare_atomic(ComparisonOp::Lt, &XObject::from("2"), &XObject::from("10")));
        assert!(compare_atomic(ComparisonOp::Eq, &XObject::from(true), &XObject::from("x")));
    }

    #[test]
    fn first_item_does_not_drain() {
        let first = first_item(XObject::sequence(vec![XObject::from("a"), XObject::from("b")])).unwrap();
        assert_eq!(first.and_then(|v| v.as_str().map(str::to_string)).as_deref(), Some("a"));
    }
}
