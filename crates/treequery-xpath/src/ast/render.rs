use core::fmt;

use super::{
    ArithmeticOp, Axis, BinaryOp, ComparisonOp, Expr, KindTest, Literal, LogicalOp, NodeTest, PathStart, Slots,
    StepExpr,
};

// Binding strength, loosest first.
const PREC_IF: u8 = 0;
const PREC_OR: u8 = 1;
const PREC_AND: u8 = 2;
const PREC_COMPARE: u8 = 3;
const PREC_RANGE: u8 = 4;
const PREC_ADDITIVE: u8 = 5;
const PREC_MULTIPLICATIVE: u8 = 6;
const PREC_UNARY: u8 = 7;
const PREC_PATH: u8 = 8;
const PREC_PRIMARY: u8 = 9;

fn binary_prec(op: BinaryOp) -> u8 {
    match op {
        BinaryOp::Logical(LogicalOp::Or) => PREC_OR,
        BinaryOp::Logical(LogicalOp::And) => PREC_AND,
        BinaryOp::Comparison(_) => PREC_COMPARE,
        BinaryOp::Range => PREC_RANGE,
        BinaryOp::Arithmetic(ArithmeticOp::Add | ArithmeticOp::Sub) => PREC_ADDITIVE,
        BinaryOp::Arithmetic(_) => PREC_MULTIPLICATIVE,
    }
}

fn op_token(op: BinaryOp) -> &'static str {
    match op {
        BinaryOp::Arithmetic(ArithmeticOp::Add) => "+",
        BinaryOp::Arithmetic(ArithmeticOp::Sub) => "-",
        BinaryOp::Arithmetic(ArithmeticOp::Mul) => "*",
        BinaryOp::Arithmetic(ArithmeticOp::Div) => "div",
        BinaryOp::Arithmetic(ArithmeticOp::IDiv) => "idiv",
        BinaryOp::Arithmetic(ArithmeticOp::Mod) => "mod",
        BinaryOp::Comparison(ComparisonOp::Eq) => "=",
        BinaryOp::Comparison(ComparisonOp::Ne) => "!=",
        BinaryOp::Comparison(ComparisonOp::Lt) => "<",
        BinaryOp::Comparison(ComparisonOp::Le) => "<=",
        BinaryOp::Comparison(ComparisonOp::Gt) => ">",
        BinaryOp::Comparison(ComparisonOp::Ge) => ">=",
        BinaryOp::Logical(LogicalOp::And) => "and",
        BinaryOp::Logical(LogicalOp::Or) => "or",
        BinaryOp::Range => "to",
    }
}

impl Expr {
    fn precedence(&self) -> u8 {
        match self {
            Expr::If(_) => PREC_IF,
            Expr::Binary(b) => binary_prec(b.op),
            Expr::Unary(_) => PREC_UNARY,
            Expr::Path(_) => PREC_PATH,
            _ => PREC_PRIMARY,
        }
    }

    /// Appends the textual form of this node. With `abbreviated`, axis steps use the
    /// short syntax (`name`, `@name`, `.`, `..`). Vacant slots render as nothing.
    pub fn render(&self, buf: &mut String, abbreviated: bool) {
        match self {
            Expr::Literal(lit) => render_literal(lit, buf),
            Expr::ContextItem => buf.push('.'),
            Expr::VarRef(q) => {
                buf.push('$');
                buf.push_str(&q.to_string());
            }
            Expr::Parenthesized(s) | Expr::Sequence(s) => {
                buf.push('(');
                render_list(s, ", ", buf, abbreviated);
                buf.push(')');
            }
            Expr::Binary(b) => {
                let prec = binary_prec(b.op);
                render_operand(b.operands.get(0), prec, false, buf, abbreviated);
                buf.push(' ');
                buf.push_str(op_token(b.op));
                buf.push(' ');
                render_operand(b.operands.get(1), prec, true, buf, abbreviated);
            }
            Expr::Unary(u) => {
                buf.push(if u.negate { '-' } else { '+' });
                render_operand(u.operand.get(0), PREC_UNARY, false, buf, abbreviated);
            }
            Expr::If(i) => {
                buf.push_str("if (");
                render_slot(i.branches.get(0), buf, abbreviated);
                buf.push_str(") then ");
                render_slot(i.branches.get(1), buf, abbreviated);
                buf.push_str(" else ");
                render_slot(i.branches.get(2), buf, abbreviated);
            }
            Expr::CastOrTreat(c) => {
                buf.push_str(if c.is_cast { "cast as " } else { "treat as " });
                if let Some(ty) = &c.ty {
                    buf.push_str(&ty.to_string());
                }
                buf.push('(');
                render_slot(c.operand.get(0), buf, abbreviated);
                buf.push(')');
            }
            Expr::FunctionCall(f) => {
                buf.push_str(&f.name.to_string());
                buf.push('(');
                render_list(&f.args, ", ", buf, abbreviated);
                buf.push(')');
            }
            Expr::Path(p) => {
                match p.start {
                    PathStart::Relative => {}
                    PathStart::Root => buf.push('/'),
                    PathStart::RootDescendants => buf.push_str("//"),
                }
                for (i, step) in p.steps.iter().enumerate() {
                    if i > 0 {
                        buf.push('/');
                    }
                    render_operand(step, PREC_PATH, true, buf, abbreviated);
                }
            }
            Expr::Step(s) => render_step(s, buf, abbreviated),
            Expr::Filter(f) => {
                render_operand(f.slots.get(0), PREC_PRIMARY, true, buf, abbreviated);
                for pred in f.slots.iter().skip(1) {
                    render_predicate(pred, buf, abbreviated);
                }
            }
        }
    }
}

fn render_slot(e: Option<&Expr>, buf: &mut String, abbreviated: bool) {
    if let Some(e) = e {
        e.render(buf, abbreviated);
    }
}

fn render_list(slots: &Slots, sep: &str, buf: &mut String, abbreviated: bool) {
    for (i, e) in slots.iter().enumerate() {
        if i > 0 {
            buf.push_str(sep);
        }
        render_slot(e, buf, abbreviated);
    }
}

/// Operands binding looser than their parent get parentheses; on the right-hand side
/// equal binding strength does too, since every binary operator associates left.
fn render_operand(e: Option<&Expr>, parent: u8, right: bool, buf: &mut String, abbreviated: bool) {
    let Some(e) = e else {
        return;
    };
    let p = e.precedence();
    let wrap = p < parent || (right && p == parent && p < PREC_PATH);
    if wrap {
        buf.push('(');
    }
    e.render(buf, abbreviated);
    if wrap {
        buf.push(')');
    }
}

fn render_predicate(pred: Option<&Expr>, buf: &mut String, abbreviated: bool) {
    buf.push('[');
    render_slot(pred, buf, abbreviated);
    buf.push(']');
}

fn render_step(s: &StepExpr, buf: &mut String, abbreviated: bool) {
    let any_node = matches!(s.test, NodeTest::Kind(KindTest::AnyKind));
    match (abbreviated, s.axis) {
        (true, Axis::Child) => buf.push_str(&s.test.to_string()),
        (true, Axis::Attribute) => {
            buf.push('@');
            buf.push_str(&s.test.to_string());
        }
        (true, Axis::SelfAxis) if any_node && s.predicates.is_empty() => buf.push('.'),
        (true, Axis::Parent) if any_node && s.predicates.is_empty() => buf.push_str(".."),
        _ => {
            buf.push_str(s.axis.name());
            buf.push_str("::");
            buf.push_str(&s.test.to_string());
        }
    }
    for pred in s.predicates.iter() {
        render_predicate(pred, buf, abbreviated);
    }
}

fn render_literal(lit: &Literal, buf: &mut String) {
    match lit {
        Literal::String(s) => {
            buf.push('"');
            buf.push_str(&s.replace('"', "\"\""));
            buf.push('"');
        }
        Literal::Integer(i) => buf.push_str(&i.to_string()),
        Literal::Double(d) if d.is_finite() => {
            let text = d.to_string();
            buf.push_str(&text);
            if !text.contains('.') {
                buf.push_str(".0");
            }
        }
        Literal::Double(d) => buf.push_str(crate::xobject::format_number(*d).as_str()),
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut buf = String::new();
        self.render(&mut buf, true);
        f.write_str(&buf)
    }
}
