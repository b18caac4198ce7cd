//! Flattening sequence over a list of expressions.
//!
//! `ExprSequence` evaluates its expressions one at a time, on demand. A result that is
//! itself a sequence is opened and drained before the next expression runs, so
//! `("a", ("b", "c"), "d")` yields `a b c d`. Nested sequences are kept on an explicit
//! stack; deeply nested or long inputs never grow the call stack.
use core::fmt;

use crate::ast::{Expr, Slots};
use crate::context::{ContextHandle, EvaluationContext, Focus};
use crate::error::Error;
use crate::evaluator::{evaluate, required};
use crate::sequence::{ReplayCache, XSequence};
use crate::xobject::XObject;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SequenceMode {
    /// `next` and `reset` only; reset re-evaluates the expressions.
    #[default]
    ForwardOnly,
    /// Buffers every value; `previous` and `reset` replay from the buffer.
    Cached,
}

pub struct ExprSequence {
    exprs: Slots,
    handle: ContextHandle,
    focus: Option<Focus>,
    cursor: usize,
    nested: Vec<Box<dyn XSequence>>,
    mode: SequenceMode,
    replay: ReplayCache,
}

impl fmt::Debug for ExprSequence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExprSequence")
            .field("exprs", &self.exprs.len())
            .field("cursor", &self.cursor)
            .field("nested", &self.nested.len())
            .field("mode", &self.mode)
            .finish_non_exhaustive()
    }
}

impl ExprSequence {
    /// Captures the current item of `ctx`; every expression is evaluated with that item
    /// in focus, whatever the context looks like when the sequence is pulled.
    pub fn new(exprs: Vec<Expr>, ctx: &EvaluationContext, mode: SequenceMode) -> Self {
        Self::from_slots(Slots::from_exprs(exprs), ctx, mode)
    }

    pub(crate) fn from_slots(exprs: Slots, ctx: &EvaluationContext, mode: SequenceMode) -> Self {
        let focus = ctx.current_item().ok().map(|item| Focus {
            item,
            position: ctx.position().unwrap_or(1),
            size: ctx.size().unwrap_or(1),
        });
        Self {
            exprs,
            handle: ctx.snapshot(),
            focus,
            cursor: 0,
            nested: Vec::new(),
            mode,
            replay: ReplayCache::default(),
        }
    }

    pub fn mode(&self) -> SequenceMode {
        self.mode
    }

    fn evaluate_at(&self, index: usize) -> Result<XObject, Error> {
        let expr = required(&self.exprs, index, "sequence item")?;
        self.handle.with_context(|ctx| match &self.focus {
            Some(f) => {
                let mut scope = ctx.scoped_focus(f.item.clone(), f.position, f.size);
                evaluate(expr, &mut scope)
            }
            None => evaluate(expr, ctx),
        })
    }

    /// Pulls the next flattened value from the producers.
    fn advance(&mut self) -> Result<Option<XObject>, Error> {
        loop {
            if let Some(top) = self.nested.last_mut() {
                match top.next()? {
                    Some(XObject::Sequence(inner)) => {
                        tracing::trace!(depth = self.nested.len() + 1, "opened nested sequence");
                        self.nested.push(inner);
                    }
                    Some(item) => return Ok(Some(item)),
                    None => {
                        self.nested.pop();
                        tracing::trace!(depth = self.nested.len(), "closed nested sequence");
                    }
                }
                continue;
            }
            if self.cursor >= self.exprs.len() {
                return Ok(None);
            }
            let index = self.cursor;
            self.cursor += 1;
            match self.evaluate_at(index)? {
                XObject::Sequence(seq) => {
                    tracing::trace!(expr = index, "opened nested sequence");
                    self.nested.push(seq);
                }
                item => return Ok(Some(item)),
            }
        }
    }
}

impl XSequence for ExprSequence {
    fn next(&mut self) -> Result<Option<XObject>, Error> {
        if self.mode == SequenceMode::Cached
            && let Some(item) = self.replay.replay()
        {
            return Ok(Some(item));
        }
        let item = self.advance()?;
        if self.mode == SequenceMode::Cached
            && let Some(item) = &item
        {
            self.replay.record(item);
        }
        Ok(item)
    }

    fn previous(&mut self) -> Result<Option<XObject>, Error> {
        match self.mode {
            SequenceMode::Cached => Ok(self.replay.previous()),
            SequenceMode::ForwardOnly => {
                Err(Error::unsupported("previous() needs a sequence constructed in cached mode"))
            }
        }
    }

    fn reset(&mut self) {
        match self.mode {
            SequenceMode::Cached => self.replay.rewind(),
            SequenceMode::ForwardOnly => {
                self.nested.clear();
                self.cursor = 0;
            }
        }
    }

    fn is_cached(&self) -> bool {
        self.mode == SequenceMode::Cached
    }

    fn boxed_clone(&self) -> Box<dyn XSequence> {
        Box::new(Self {
            exprs: self.exprs.share(),
            handle: self.handle.clone(),
            focus: self.focus.clone(),
            cursor: 0,
            nested: Vec::new(),
            mode: self.mode,
            replay: ReplayCache::default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(seq: &mut dyn XSequence) -> Vec<String> {
        let mut out = Vec::new();
        while let Some(v) = seq.next().unwrap() {
            out.push(v.as_str().unwrap_or("?").to_string());
        }
        out
    }

    #[test]
    fn nested_sequences_are_flattened_depth_first() {
        let ctx = EvaluationContext::default();
        let inner = Expr::sequence(vec![Expr::string("b"), Expr::sequence(vec![Expr::string("c"), Expr::string("d")])]);
        let mut seq =
            ExprSequence::new(vec![Expr::string("a"), inner, Expr::sequence(vec![])], &ctx, SequenceMode::ForwardOnly);
        assert_eq!(strings(&mut seq), ["a", "b", "c", "d"]);
        assert!(seq.next().unwrap().is_none());
    }

    #[test]
    fn context_item_is_the_captured_one() {
        let mut ctx = EvaluationContext::builder().with_context_item("captured").build();
        let mut seq = ExprSequence::new(vec![Expr::context_item()], &ctx, SequenceMode::ForwardOnly);
        ctx.push_current_item(XObject::from("later"));
        assert_eq!(strings(&mut seq), ["captured"]);
        assert_eq!(ctx.depth(), 2);
    }
}
