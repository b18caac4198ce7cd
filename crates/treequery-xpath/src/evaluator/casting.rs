//! `cast as` and `treat as`.
use crate::ast::{AtomicType, CastOrTreatExpr, Expr, ItemType, Occurrence, SequenceType};
use crate::context::EvaluationContext;
use crate::error::{Error, ErrorCode};
use crate::evaluator::{atomize, evaluate, flatten, into_value};
use crate::xobject::{XObject, format_number};

fn parts(node: &CastOrTreatExpr) -> Result<(&SequenceType, &Expr), Error> {
    let what = if node.is_cast() { "cast" } else { "treat" };
    let ty: &SequenceType = node.sequence_type().ok_or_else(|| Error::malformed(format!("{what} expression without a target type")))?;
    let operand = node.operand().ok_or_else(|| Error::malformed(format!("{what} expression without an operand")))?;
    Ok((ty, operand))
}

fn unknown_type(ty: impl core::fmt::Display) -> Error {
    Error::from_code(ErrorCode::XPST0051, format!("{ty} is not a known atomic type"))
}

/// Target of a cast: a known atomic type with occurrence `1` or `?`.
fn cast_target(ty: &SequenceType) -> Result<(AtomicType, bool), Error> {
    let SequenceType::Typed { item: ItemType::Atomic(q), occ } = ty else {
        return Err(unknown_type(ty));
    };
    let atomic = AtomicType::from_qname(q).filter(|a| *a != AtomicType::AnyAtomic).ok_or_else(|| unknown_type(q))?;
    match occ {
        Occurrence::One => Ok((atomic, false)),
        Occurrence::ZeroOrOne => Ok((atomic, true)),
        _ => Err(Error::malformed(format!("cast target {ty} may only carry the '?' indicator"))),
    }
}

pub(super) fn cast(ctx: &mut EvaluationContext, node: &CastOrTreatExpr) -> Result<XObject, Error> {
    let (ty, operand) = parts(node)?;
    let (target, allow_empty) = cast_target(ty)?;
    let mut items = flatten(evaluate(operand, ctx)?)?;
    if items.len() > 1 || (items.is_empty() && !allow_empty) {
        return Err(Error::type_error(format!("cast as {ty} needs a single item, got {}", items.len())));
    }
    let Some(item) = items.pop() else {
        return Ok(XObject::empty());
    };
    cast_atomic(atomize(ctx, item)?, target)
}

fn invalid(value: &str, target: AtomicType) -> Error {
    Error::from_code(ErrorCode::FORG0001, format!("cannot cast {value:?} to {target:?}"))
}

fn bool_number(b: bool) -> f64 {
    f64::from(u8::from(b))
}

/// `[+-]?digits`
fn is_integer_lexical(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    !body.is_empty() && body.bytes().all(|b| b.is_ascii_digit())
}

/// `[+-]?(digits(.digits?)?|.digits)`
fn is_decimal_lexical(s: &str) -> bool {
    let body = s.strip_prefix(['+', '-']).unwrap_or(s);
    let (int, frac) = body.split_once('.').unwrap_or((body, ""));
    (!int.is_empty() || !frac.is_empty())
        && int.bytes().all(|b| b.is_ascii_digit())
        && frac.bytes().all(|b| b.is_ascii_digit())
        && body != "."
}

/// Decimal with an optional exponent, or one of `INF`, `-INF`, `NaN`.
fn parse_double(s: &str) -> Option<f64> {
    match s {
        "INF" | "+INF" => return Some(f64::INFINITY),
        "-INF" => return Some(f64::NEG_INFINITY),
        "NaN" => return Some(f64::NAN),
        _ => {}
    }
    let (mantissa, exp) = match s.find(['e', 'E']) {
        Some(i) => (&s[..i], Some(&s[i + 1..])),
        None => (s, None),
    };
    if !is_decimal_lexical(mantissa) || exp.is_some_and(|e| !is_integer_lexical(e)) {
        return None;
    }
    s.parse().ok()
}

fn cast_atomic(value: XObject, target: AtomicType) -> Result<XObject, Error> {
    match target {
        AtomicType::String | AtomicType::UntypedAtomic | AtomicType::AnyUri => Ok(XObject::String(match value {
            XObject::String(s) => s,
            XObject::Number(n) => format_number(n),
            XObject::Boolean(b) => b.to_string(),
            other => return Err(Error::type_error(format!("cannot cast {} to a string", other.type_name()))),
        })),
        AtomicType::Boolean => match value {
            XObject::Boolean(b) => Ok(XObject::Boolean(b)),
            XObject::Number(n) => Ok(XObject::Boolean(n != 0.0 && !n.is_nan())),
            XObject::String(s) => match s.trim() {
                "true" | "1" => Ok(XObject::Boolean(true)),
                "false" | "0" => Ok(XObject::Boolean(false)),
                _ => Err(invalid(&s, target)),
            },
            other => Err(Error::type_error(format!("cannot cast {} to a boolean", other.type_name()))),
        },
        AtomicType::Double | AtomicType::Float => match value {
            XObject::Number(n) => Ok(XObject::Number(n)),
            XObject::Boolean(b) => Ok(XObject::Number(bool_number(b))),
            XObject::String(s) => parse_double(s.trim()).map(XObject::Number).ok_or_else(|| invalid(&s, target)),
            other => Err(Error::type_error(format!("cannot cast {} to a number", other.type_name()))),
        },
        AtomicType::Decimal | AtomicType::Integer => {
            let n = match value {
                XObject::Number(n) if n.is_finite() => n,
                XObject::Number(n) => {
                    return Err(Error::from_code(
                        ErrorCode::FOCA0002,
                        format!("{} has no {target:?} value", format_number(n)),
                    ));
                }
                XObject::Boolean(b) => bool_number(b),
                XObject::String(s) => {
                    let t = s.trim();
                    let ok = if target == AtomicType::Integer { is_integer_lexical(t) } else { is_decimal_lexical(t) };
                    if !ok {
                        return Err(invalid(&s, target));
                    }
                    t.parse::<f64>().map_err(|_| invalid(&s, target))?
                }
                other => return Err(Error::type_error(format!("cannot cast {} to a number", other.type_name()))),
            };
            Ok(XObject::Number(if target == AtomicType::Integer { n.trunc() } else { n }))
        }
        AtomicType::AnyAtomic => Err(unknown_type("xs:anyAtomicType")),
    }
}

fn atomic_instance(value: &XObject, ty: AtomicType) -> bool {
    match (ty, value) {
        (_, XObject::Node(_) | XObject::Sequence(_)) => false,
        (AtomicType::AnyAtomic, _) => true,
        (AtomicType::String | AtomicType::UntypedAtomic | AtomicType::AnyUri, XObject::String(_)) => true,
        (AtomicType::Boolean, XObject::Boolean(_)) => true,
        (AtomicType::Double | AtomicType::Float | AtomicType::Decimal, XObject::Number(_)) => true,
        (AtomicType::Integer, XObject::Number(n)) => n.is_finite() && n.fract() == 0.0,
        _ => false,
    }
}

fn item_matches(ctx: &EvaluationContext, value: &XObject, item: &ItemType) -> Result<bool, Error> {
    match item {
        ItemType::Item => Ok(true),
        ItemType::Atomic(q) => {
            let ty = AtomicType::from_qname(q).ok_or_else(|| unknown_type(q))?;
            Ok(atomic_instance(value, ty))
        }
        ItemType::Kind(k) => match value {
            XObject::Node(h) => super::axes::kind_test_matches(&*ctx.owner_of(*h)?, *h, k),
            _ => Ok(false),
        },
    }
}

pub(super) fn treat(ctx: &mut EvaluationContext, node: &CastOrTreatExpr) -> Result<XObject, Error> {
    let (ty, operand) = parts(node)?;
    if let SequenceType::Typed { item: ItemType::Atomic(q), .. } = ty
        && AtomicType::from_qname(q).is_none()
    {
        return Err(unknown_type(q));
    }
    let items = flatten(evaluate(operand, ctx)?)?;
    let mismatch = |why: String| Error::from_code(ErrorCode::XPDY0050, format!("treat as {ty}: {why}"));
    match ty {
        SequenceType::EmptySequence if !items.is_empty() => {
            return Err(mismatch(format!("expected no items, got {}", items.len())));
        }
        SequenceType::EmptySequence => {}
        SequenceType::Typed { item, occ } => {
            if !occ.allows(items.len()) {
                return Err(mismatch(format!("{} item(s) do not satisfy the occurrence indicator", items.len())));
            }
            for value in &items {
                if !item_matches(ctx, value, item)? {
                    return Err(mismatch(format!("{} does not match {item}", value.type_name())));
                }
            }
        }
    }
    Ok(into_value(items))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lexical_forms() {
        assert!(is_integer_lexical("-42"));
        assert!(!is_integer_lexical("4.2"));
        assert!(is_decimal_lexical(".5"));
        assert!(is_decimal_lexical("5."));
        assert!(!is_decimal_lexical("."));
        assert_eq!(parse_double("1.5e2"), Some(150.0));
        assert_eq!(parse_double("-INF"), Some(f64::NEG_INFINITY));
        assert_eq!(parse_double("inf"), None);
        assert_eq!(parse_double("1e"), None);
    }

    #[test]
    fn infinite_values_have_no_integer() {
        let err = cast_atomic(XObject::Number(f64::INFINITY), AtomicType::Integer).unwrap_err();
        assert_eq!(err.code, ErrorCode::FOCA0002);
        let err = cast_atomic(XObject::Number(f64::NAN), AtomicType::Decimal).unwrap_err();
        assert_eq!(err.code, ErrorCode::FOCA0002);
    }

    #[test]
    fn integer_cast_truncates_numbers() {
        let v = cast_atomic(XObject::Number(-2.7), AtomicType::Integer).unwrap();
        assert_eq!(v.as_number(), Some(-2.0));
    }
}
