//! Expression tree.
//!
//! Nodes are built in two steps: construct the node, then attach its children through
//! [`Expr::attach_child`]. Attaching is the only place where the tree shape changes: a
//! parenthesized expression or a comma sequence with exactly one child is replaced by
//! that child before it is stored. Component constructors such as
//! [`CastOrTreatExpr::new`] and in-place edits through [`Expr::edit_child`] apply the
//! same reduction.
//!
//! Cloning is deep. Sequence-type descriptors are immutable and shared between clones.
use std::rc::Rc;
use std::sync::Arc;

use treequery_dtm::QName;

use crate::error::Error;

mod render;
pub mod types;

pub use types::{AtomicType, Axis, ItemType, KindTest, NameTest, NodeTest, Occurrence, SequenceType};

/// Child slots of a node. A slot stays `None` until something is attached to it.
#[derive(Debug)]
pub struct Slots(Rc<Vec<Option<Expr>>>);

impl Clone for Slots {
    fn clone(&self) -> Self {
        Slots(Rc::new(self.0.iter().cloned().collect()))
    }
}

impl Slots {
    pub(crate) fn with_arity(n: usize) -> Self {
        Slots(Rc::new(vec![None; n]))
    }

    pub(crate) fn from_exprs(exprs: Vec<Expr>) -> Self {
        Slots(Rc::new(exprs.into_iter().map(|e| Some(reduce(e))).collect()))
    }

    /// Second handle onto the same children, without copying them. Mutation through
    /// either handle copies on write.
    pub(crate) fn share(&self) -> Self {
        Slots(Rc::clone(&self.0))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, i: usize) -> Option<&Expr> {
        self.0.get(i).and_then(Option::as_ref)
    }

    pub fn iter(&self) -> impl Iterator<Item = Option<&Expr>> {
        self.0.iter().map(Option::as_ref)
    }

    /// Runs `edit` on the stored child at `i`, then reduces the result like an attach.
    fn edit(&mut self, i: usize, edit: impl FnOnce(&mut Expr)) -> Result<(), Error> {
        let len = self.0.len();
        let Some(Some(stored)) = Rc::make_mut(&mut self.0).get_mut(i) else {
            return Err(Error::malformed(format!("no attached child at slot {i} (arity {len})")));
        };
        edit(stored);
        let edited = std::mem::replace(stored, Expr::ContextItem);
        *stored = reduce(edited);
        Ok(())
    }

    /// Stores `expr` in `slot` after reduction. Growable slot lists accept
    /// `slot == len` as an append.
    fn attach(&mut self, slot: usize, expr: Expr, growable: bool) -> Result<(), Error> {
        let slots = Rc::make_mut(&mut self.0);
        let expr = reduce(expr);
        if slot < slots.len() {
            slots[slot] = Some(expr);
        } else if growable && slot == slots.len() {
            slots.push(Some(expr));
        } else {
            return Err(Error::malformed(format!("no child slot {slot} (arity {})", slots.len())));
        }
        Ok(())
    }

    fn into_single(self) -> Result<Expr, Slots> {
        if self.0.len() != 1 || self.0[0].is_none() {
            return Err(self);
        }
        match Rc::try_unwrap(self.0) {
            Ok(v) => v.into_iter().next().flatten().ok_or_else(|| Slots::with_arity(1)),
            Err(rc) => match rc[0].clone() {
                Some(e) => Ok(e),
                None => Err(Slots(rc)),
            },
        }
    }
}

/// Replaces a reducible wrapper by its sole child. Applied once, when attaching.
fn reduce(expr: Expr) -> Expr {
    match expr {
        Expr::Parenthesized(slots) => slots.into_single().unwrap_or_else(Expr::Parenthesized),
        Expr::Sequence(slots) => slots.into_single().unwrap_or_else(Expr::Sequence),
        other => other,
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    String(String),
    Integer(i64),
    Double(f64),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithmeticOp {
    Add,
    Sub,
    Mul,
    Div,
    IDiv,
    Mod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparisonOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogicalOp {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Arithmetic(ArithmeticOp),
    Comparison(ComparisonOp),
    Logical(LogicalOp),
    /// `to`
    Range,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathStart {
    Relative,
    /// `/`
    Root,
    /// `//`
    RootDescendants,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExprKind {
    Literal,
    ContextItem,
    VarRef,
    Parenthesized,
    Sequence,
    Binary,
    Unary,
    If,
    Cast,
    Treat,
    FunctionCall,
    Path,
    Step,
    Filter,
}

#[derive(Debug, Clone)]
pub struct BinaryExpr {
    pub op: BinaryOp,
    pub(crate) operands: Slots,
}

impl BinaryExpr {
    pub fn empty(op: BinaryOp) -> Self {
        Self { op, operands: Slots::with_arity(2) }
    }
}

#[derive(Debug, Clone)]
pub struct UnaryExpr {
    pub negate: bool,
    pub(crate) operand: Slots,
}

#[derive(Debug, Clone)]
pub struct IfExpr {
    pub(crate) branches: Slots,
}

/// `cast as T(expr)` or `treat as T(expr)`. Which one is fixed at construction.
#[derive(Debug, Clone)]
pub struct CastOrTreatExpr {
    ty: Option<Arc<SequenceType>>,
    pub(crate) operand: Slots,
    is_cast: bool,
}

impl CastOrTreatExpr {
    pub fn new(ty: Arc<SequenceType>, operand: Expr, is_cast: bool) -> Self {
        Self { ty: Some(ty), operand: Slots::from_exprs(vec![operand]), is_cast }
    }

    /// Node with both slots vacant, to be filled through [`Expr::attach_child`].
    pub fn empty(is_cast: bool) -> Self {
        Self { ty: None, operand: Slots::with_arity(1), is_cast }
    }

    pub fn is_cast(&self) -> bool {
        self.is_cast
    }

    pub fn sequence_type(&self) -> Option<&Arc<SequenceType>> {
        self.ty.as_ref()
    }

    pub fn operand(&self) -> Option<&Expr> {
        self.operand.get(0)
    }
}

#[derive(Debug, Clone)]
pub struct FunctionCall {
    pub name: QName,
    pub(crate) args: Slots,
}

#[derive(Debug, Clone)]
pub struct PathExpr {
    pub start: PathStart,
    pub(crate) steps: Slots,
}

#[derive(Debug, Clone)]
pub struct StepExpr {
    pub axis: Axis,
    pub test: NodeTest,
    pub(crate) predicates: Slots,
}

/// Primary expression followed by predicates; slot 0 holds the base.
#[derive(Debug, Clone)]
pub struct FilterExpr {
    pub(crate) slots: Slots,
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal(Literal),
    ContextItem,
    VarRef(QName),
    Parenthesized(Slots),
    Sequence(Slots),
    Binary(BinaryExpr),
    Unary(UnaryExpr),
    If(IfExpr),
    CastOrTreat(CastOrTreatExpr),
    FunctionCall(FunctionCall),
    Path(PathExpr),
    Step(StepExpr),
    Filter(FilterExpr),
}

/// A child being attached: an expression, or the sequence type of a cast/treat node.
#[derive(Debug, Clone)]
pub enum AstChild {
    Expr(Expr),
    SequenceType(Arc<SequenceType>),
}

impl From<Expr> for AstChild {
    fn from(e: Expr) -> Self {
        AstChild::Expr(e)
    }
}

#[derive(Debug, Clone, Copy)]
pub enum AstChildRef<'a> {
    Expr(&'a Expr),
    SequenceType(&'a SequenceType),
}

impl<'a> AstChildRef<'a> {
    pub fn as_expr(self) -> Option<&'a Expr> {
        match self {
            AstChildRef::Expr(e) => Some(e),
            AstChildRef::SequenceType(_) => None,
        }
    }
}

impl Expr {
    pub fn string(s: impl Into<String>) -> Self {
        Expr::Literal(Literal::String(s.into()))
    }

    pub fn integer(i: i64) -> Self {
        Expr::Literal(Literal::Integer(i))
    }

    pub fn double(d: f64) -> Self {
        Expr::Literal(Literal::Double(d))
    }

    pub fn context_item() -> Self {
        Expr::ContextItem
    }

    pub fn var(name: &str) -> Self {
        Expr::VarRef(QName::parse_lexical(name))
    }

    pub fn empty_parenthesized() -> Self {
        Expr::Parenthesized(Slots::with_arity(1))
    }

    pub fn parenthesized(inner: Expr) -> Self {
        Expr::Parenthesized(Slots::from_exprs(vec![inner]))
    }

    /// Comma sequence; an empty list is `()`.
    pub fn sequence(items: Vec<Expr>) -> Self {
        Expr::Sequence(Slots::from_exprs(items))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary(BinaryExpr { op, operands: Slots::from_exprs(vec![left, right]) })
    }

    pub fn arithmetic(op: ArithmeticOp, left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Arithmetic(op), left, right)
    }

    pub fn compare(op: ComparisonOp, left: Expr, right: Expr) -> Self {
        Self::binary(BinaryOp::Comparison(op), left, right)
    }

    pub fn range(from: Expr, to: Expr) -> Self {
        Self::binary(BinaryOp::Range, from, to)
    }

    pub fn negate(operand: Expr) -> Self {
        Expr::Unary(UnaryExpr { negate: true, operand: Slots::from_exprs(vec![operand]) })
    }

    pub fn if_then_else(cond: Expr, then: Expr, otherwise: Expr) -> Self {
        Expr::If(IfExpr { branches: Slots::from_exprs(vec![cond, then, otherwise]) })
    }

    pub fn cast(ty: Arc<SequenceType>, operand: Expr) -> Self {
        Expr::CastOrTreat(CastOrTreatExpr::new(ty, operand, true))
    }

    pub fn treat(ty: Arc<SequenceType>, operand: Expr) -> Self {
        Expr::CastOrTreat(CastOrTreatExpr::new(ty, operand, false))
    }

    pub fn call(name: &str, args: Vec<Expr>) -> Self {
        Expr::FunctionCall(FunctionCall { name: QName::parse_lexical(name), args: Slots::from_exprs(args) })
    }

    pub fn path(start: PathStart, steps: Vec<Expr>) -> Self {
        Expr::Path(PathExpr { start, steps: Slots::from_exprs(steps) })
    }

    pub fn step(axis: Axis, test: NodeTest, predicates: Vec<Expr>) -> Self {
        Expr::Step(StepExpr { axis, test, predicates: Slots::from_exprs(predicates) })
    }

    /// `child::name`
    pub fn child(name: &str) -> Self {
        Self::step(Axis::Child, NodeTest::name(name), Vec::new())
    }

    /// `attribute::name`
    pub fn attribute(name: &str) -> Self {
        Self::step(Axis::Attribute, NodeTest::name(name), Vec::new())
    }

    pub fn filter(base: Expr, predicates: Vec<Expr>) -> Self {
        let mut all = Vec::with_capacity(predicates.len() + 1);
        all.push(base);
        all.extend(predicates);
        Expr::Filter(FilterExpr { slots: Slots::from_exprs(all) })
    }

    pub fn kind(&self) -> ExprKind {
        match self {
            Expr::Literal(_) => ExprKind::Literal,
            Expr::ContextItem => ExprKind::ContextItem,
            Expr::VarRef(_) => ExprKind::VarRef,
            Expr::Parenthesized(_) => ExprKind::Parenthesized,
            Expr::Sequence(_) => ExprKind::Sequence,
            Expr::Binary(_) => ExprKind::Binary,
            Expr::Unary(_) => ExprKind::Unary,
            Expr::If(_) => ExprKind::If,
            Expr::CastOrTreat(c) if c.is_cast => ExprKind::Cast,
            Expr::CastOrTreat(_) => ExprKind::Treat,
            Expr::FunctionCall(_) => ExprKind::FunctionCall,
            Expr::Path(_) => ExprKind::Path,
            Expr::Step(_) => ExprKind::Step,
            Expr::Filter(_) => ExprKind::Filter,
        }
    }

    /// Expression slots of the node, if it has any.
    fn slots(&self) -> Option<&Slots> {
        match self {
            Expr::Literal(_) | Expr::ContextItem | Expr::VarRef(_) => None,
            Expr::Parenthesized(s) | Expr::Sequence(s) => Some(s),
            Expr::Binary(b) => Some(&b.operands),
            Expr::Unary(u) => Some(&u.operand),
            Expr::If(i) => Some(&i.branches),
            Expr::CastOrTreat(c) => Some(&c.operand),
            Expr::FunctionCall(f) => Some(&f.args),
            Expr::Path(p) => Some(&p.steps),
            Expr::Step(s) => Some(&s.predicates),
            Expr::Filter(f) => Some(&f.slots),
        }
    }

    fn slots_mut(&mut self) -> Option<(&mut Slots, bool)> {
        match self {
            Expr::Literal(_) | Expr::ContextItem | Expr::VarRef(_) => None,
            Expr::Parenthesized(s) => Some((s, false)),
            Expr::Sequence(s) => Some((s, true)),
            Expr::Binary(b) => Some((&mut b.operands, false)),
            Expr::Unary(u) => Some((&mut u.operand, false)),
            Expr::If(i) => Some((&mut i.branches, false)),
            Expr::CastOrTreat(c) => Some((&mut c.operand, false)),
            Expr::FunctionCall(f) => Some((&mut f.args, true)),
            Expr::Path(p) => Some((&mut p.steps, true)),
            Expr::Step(s) => Some((&mut s.predicates, true)),
            Expr::Filter(f) => Some((&mut f.slots, true)),
        }
    }

    /// Number of child slots. Cast and treat count their type descriptor as slot 0.
    pub fn arity(&self) -> usize {
        let exprs = self.slots().map_or(0, Slots::len);
        if matches!(self, Expr::CastOrTreat(_)) { exprs + 1 } else { exprs }
    }

    pub fn child_at(&self, i: usize) -> Option<AstChildRef<'_>> {
        match self {
            Expr::CastOrTreat(c) if i == 0 => c.ty.as_deref().map(AstChildRef::SequenceType),
            Expr::CastOrTreat(c) => c.operand.get(i - 1).map(AstChildRef::Expr),
            other => other.slots()?.get(i).map(AstChildRef::Expr),
        }
    }

    /// Edits the attached expression child at `i` in place. Whatever the closure leaves
    /// in the slot is reduced exactly as [`Expr::attach_child`] would reduce it.
    pub fn edit_child(&mut self, i: usize, edit: impl FnOnce(&mut Expr)) -> Result<(), Error> {
        let kind = self.kind();
        let result = match self {
            Expr::CastOrTreat(_) if i == 0 => {
                return Err(Error::malformed(format!("{kind:?} node: slot 0 holds the sequence type")));
            }
            Expr::CastOrTreat(c) => c.operand.edit(i - 1, edit),
            other => match other.slots_mut() {
                Some((slots, _)) => slots.edit(i, edit),
                None => return Err(Error::malformed(format!("{kind:?} node has no child slots"))),
            },
        };
        result.map_err(|err| Error::malformed(format!("{kind:?} node: {}", err.message)))
    }

    /// Attaches `child` at `slot`, replacing whatever was there. A parenthesized
    /// expression or one-item sequence is stored as its sole child instead.
    pub fn attach_child(&mut self, child: impl Into<AstChild>, slot: usize) -> Result<(), Error> {
        let kind = self.kind();
        match (self, child.into()) {
            (Expr::CastOrTreat(c), AstChild::SequenceType(ty)) if slot == 0 => {
                c.ty = Some(ty);
                Ok(())
            }
            (Expr::CastOrTreat(c), AstChild::Expr(e)) if slot == 1 => c.operand.attach(0, e, false),
            (_, AstChild::SequenceType(_)) => {
                Err(Error::malformed(format!("{kind:?} node takes no sequence type at slot {slot}")))
            }
            (Expr::CastOrTreat(_), AstChild::Expr(_)) => {
                Err(Error::malformed(format!("{kind:?} node takes its operand at slot 1, not {slot}")))
            }
            (node, AstChild::Expr(e)) => match node.slots_mut() {
                Some((slots, growable)) => slots
                    .attach(slot, e, growable)
                    .map_err(|err| Error::malformed(format!("{kind:?} node: {}", err.message))),
                None => Err(Error::malformed(format!("{kind:?} node has no child slots"))),
            },
        }
    }

    pub(crate) fn shared_slots(&self) -> Option<Slots> {
        self.slots().map(Slots::share)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn int_type() -> Arc<SequenceType> {
        Arc::new(SequenceType::atomic("integer", Occurrence::One))
    }

    #[test]
    fn cast_node_kind_is_fixed_at_construction() {
        let c = Expr::cast(int_type(), Expr::string("1"));
        let t = Expr::treat(int_type(), Expr::string("1"));
        assert_eq!(c.kind(), ExprKind::Cast);
        assert_eq!(t.kind(), ExprKind::Treat);
        assert_eq!(c.arity(), 2);
        assert!(matches!(c.child_at(0), Some(AstChildRef::SequenceType(_))));
        assert!(matches!(c.child_at(1), Some(AstChildRef::Expr(Expr::Literal(_)))));
    }

    #[test]
    fn constructors_reduce_wrappers() {
        let c = Expr::cast(int_type(), Expr::parenthesized(Expr::string("7")));
        assert_eq!(c.child_at(1).and_then(|ch| ch.as_expr().map(Expr::kind)), Some(ExprKind::Literal));
    }

    #[test]
    fn wrappers_with_several_children_are_kept() {
        let mut c = Expr::CastOrTreat(CastOrTreatExpr::empty(true));
        c.attach_child(Expr::sequence(vec![Expr::integer(1), Expr::integer(2)]), 1).unwrap();
        assert_eq!(c.child_at(1).and_then(|ch| ch.as_expr().map(Expr::kind)), Some(ExprKind::Sequence));
    }

    #[test]
    fn vacant_wrapper_is_not_reduced() {
        let mut s = Expr::sequence(vec![]);
        s.attach_child(Expr::empty_parenthesized(), 0).unwrap();
        assert_eq!(s.child_at(0).and_then(|ch| ch.as_expr().map(Expr::kind)), Some(ExprKind::Parenthesized));
    }

    #[test]
    fn edited_children_are_reduced_again() {
        let mut c = Expr::cast(int_type(), Expr::string("1"));
        c.edit_child(1, |e| *e = Expr::parenthesized(Expr::integer(2))).unwrap();
        assert_eq!(c.child_at(1).and_then(|ch| ch.as_expr().map(Expr::kind)), Some(ExprKind::Literal));
        assert_eq!(c.to_string(), "cast as xs:integer(2)");
        assert!(c.edit_child(0, |_| {}).is_err());
        assert!(c.edit_child(2, |_| {}).is_err());
    }

    #[test]
    fn invalid_slots_are_static_errors() {
        let mut c = Expr::CastOrTreat(CastOrTreatExpr::empty(false));
        let err = c.attach_child(Expr::integer(1), 0).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::XPST0003);
        let err = c.attach_child(AstChild::SequenceType(int_type()), 1).unwrap_err();
        assert_eq!(err.code, crate::error::ErrorCode::XPST0003);
        let mut lit = Expr::integer(1);
        assert!(lit.attach_child(Expr::integer(2), 0).is_err());
        let mut b = Expr::Binary(BinaryExpr::empty(BinaryOp::Range));
        assert!(b.attach_child(Expr::integer(2), 2).is_err());
    }

    #[test]
    fn growable_nodes_append_at_len() {
        let mut f = Expr::call("concat", vec![Expr::string("a")]);
        f.attach_child(Expr::string("b"), 1).unwrap();
        assert_eq!(f.arity(), 2);
        assert!(f.attach_child(Expr::string("c"), 5).is_err());
    }

    #[test]
    fn shared_slots_copy_on_write() {
        let mut seq = Expr::sequence(vec![Expr::integer(1), Expr::integer(2)]);
        let shared = seq.shared_slots().unwrap();
        seq.attach_child(Expr::integer(9), 0).unwrap();
        assert!(matches!(shared.get(0), Some(Expr::Literal(Literal::Integer(1)))));
        assert_eq!(shared.len(), 2);
    }
}
