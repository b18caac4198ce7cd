//! Lazy, pull-based sequences.
//!
//! A sequence is either forward-only (`next` and `reset`) or cached. Cached sequences
//! keep every value yielded so far and additionally move backwards with `previous`,
//! which behaves like a list iterator: it returns the value most recently passed and
//! moves the cursor in front of it.
use std::rc::Rc;

use crate::error::Error;
use crate::xobject::XObject;

pub trait XSequence {
    /// Next value, or `None` at the end. Calls past the end keep returning `None`.
    fn next(&mut self) -> Result<Option<XObject>, Error>;

    fn previous(&mut self) -> Result<Option<XObject>, Error> {
        Err(Error::unsupported("backward iteration requires a cached sequence"))
    }

    /// Rewinds to the start. Forward-only sequences restart their producer.
    fn reset(&mut self);

    fn is_cached(&self) -> bool {
        false
    }

    /// A fresh cursor over the same producer, positioned at the start.
    fn boxed_clone(&self) -> Box<dyn XSequence>;

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, None)
    }
}

impl<'s> dyn XSequence + 's {
    pub fn iter(&mut self) -> SequenceIter<'_> {
        SequenceIter { seq: self, failed: false }
    }

    /// Drains the remaining values.
    pub fn materialize(&mut self) -> Result<Vec<XObject>, Error> {
        self.iter().collect()
    }
}

/// Iterator adapter; stops after the first error.
pub struct SequenceIter<'a> {
    seq: &'a mut (dyn XSequence + 'a),
    failed: bool,
}

impl Iterator for SequenceIter<'_> {
    type Item = Result<XObject, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.seq.next() {
            Ok(v) => v.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.seq.size_hint()
    }
}

/// Replay buffer behind cached sequences.
#[derive(Debug, Clone, Default)]
pub(crate) struct ReplayCache {
    items: Vec<XObject>,
    pos: usize,
}

impl ReplayCache {
    /// Buffered value at the cursor, if the cursor has been there before.
    pub(crate) fn replay(&mut self) -> Option<XObject> {
        let item = self.items.get(self.pos)?.clone();
        self.pos += 1;
        Some(item)
    }

    pub(crate) fn record(&mut self, item: &XObject) {
        self.items.push(item.clone());
        self.pos = self.items.len();
    }

    pub(crate) fn previous(&mut self) -> Option<XObject> {
        self.pos = self.pos.checked_sub(1)?;
        self.items.get(self.pos).cloned()
    }

    pub(crate) fn rewind(&mut self) {
        self.pos = 0;
    }

    pub(crate) fn len(&self) -> usize {
        self.items.len()
    }
}

/// Materialized sequence.
#[derive(Debug, Clone)]
pub struct VecSequence {
    items: Rc<[XObject]>,
    pos: usize,
}

impl VecSequence {
    pub fn new(items: Vec<XObject>) -> Self {
        Self { items: items.into(), pos: 0 }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl XSequence for VecSequence {
    fn next(&mut self) -> Result<Option<XObject>, Error> {
        let item = self.items.get(self.pos).cloned();
        if item.is_some() {
            self.pos += 1;
        }
        Ok(item)
    }

    fn previous(&mut self) -> Result<Option<XObject>, Error> {
        let Some(pos) = self.pos.checked_sub(1) else {
            return Ok(None);
        };
        self.pos = pos;
        Ok(self.items.get(pos).cloned())
    }

    fn reset(&mut self) {
        self.pos = 0;
    }

    fn is_cached(&self) -> bool {
        true
    }

    fn boxed_clone(&self) -> Box<dyn XSequence> {
        Box::new(Self { items: Rc::clone(&self.items), pos: 0 })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.items.len() - self.pos;
        (rest, Some(rest))
    }
}

/// Lazy `start to end` integer range.
#[derive(Debug, Clone)]
pub struct RangeSequence {
    start: i64,
    end: i64,
    next: Option<i64>,
}

impl RangeSequence {
    /// Empty when `start > end`.
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end, next: (start <= end).then_some(start) }
    }
}

impl XSequence for RangeSequence {
    fn next(&mut self) -> Result<Option<XObject>, Error> {
        let Some(cur) = self.next else {
            return Ok(None);
        };
        self.next = if cur < self.end { cur.checked_add(1) } else { None };
        Ok(Some(XObject::from(cur)))
    }

    fn reset(&mut self) {
        self.next = (self.start <= self.end).then_some(self.start);
    }

    fn boxed_clone(&self) -> Box<dyn XSequence> {
        Box::new(Self::new(self.start, self.end))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rest = self.next.map_or(0, |n| usize::try_from(self.end.abs_diff(n)).map_or(usize::MAX, |d| d.saturating_add(1)));
        (rest, Some(rest))
    }
}

/// Adds a replay buffer to a forward-only sequence. The wrapped producer runs at most
/// once; `reset` and `previous` only move through the buffer.
pub struct CachedSequence {
    inner: Box<dyn XSequence>,
    cache: ReplayCache,
    inner_done: bool,
}

impl CachedSequence {
    pub fn new(inner: Box<dyn XSequence>) -> Self {
        Self { inner, cache: ReplayCache::default(), inner_done: false }
    }

    /// Number of values pulled from the producer so far.
    pub fn buffered(&self) -> usize {
        self.cache.len()
    }
}

impl XSequence for CachedSequence {
    fn next(&mut self) -> Result<Option<XObject>, Error> {
        if let Some(item) = self.cache.replay() {
            return Ok(Some(item));
        }
        if self.inner_done {
            return Ok(None);
        }
        match self.inner.next()? {
            Some(item) => {
                self.cache.record(&item);
                Ok(Some(item))
            }
            None => {
                self.inner_done = true;
                Ok(None)
            }
        }
    }

    fn previous(&mut self) -> Result<Option<XObject>, Error> {
        Ok(self.cache.previous())
    }

    fn reset(&mut self) {
        self.cache.rewind();
    }

    fn is_cached(&self) -> bool {
        true
    }

    fn boxed_clone(&self) -> Box<dyn XSequence> {
        Box::new(CachedSequence::new(self.inner.boxed_clone()))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let (lo, hi) = self.inner.size_hint();
        let buffered = self.cache.len();
        (lo, hi.map(|h| h.saturating_add(buffered)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn numbers(seq: &mut dyn XSequence) -> Vec<f64> {
        let mut out = Vec::new();
        while let Some(v) = seq.next().unwrap() {
            out.push(v.as_number().unwrap());
        }
        out
    }

    #[test]
    fn range_is_lazy_and_restartable() {
        let mut r = RangeSequence::new(1, 3);
        assert_eq!(r.size_hint(), (3, Some(3)));
        assert_eq!(numbers(&mut r), vec![1.0, 2.0, 3.0]);
        assert!(r.next().unwrap().is_none());
        assert!(r.next().unwrap().is_none());
        r.reset();
        assert_eq!(numbers(&mut r), vec![1.0, 2.0, 3.0]);
        assert!(RangeSequence::new(3, 1).next().unwrap().is_none());
    }

    #[test]
    fn forward_only_rejects_previous() {
        let mut r = RangeSequence::new(1, 3);
        r.next().unwrap();
        let err = r.previous().unwrap_err();
        assert!(err.is_unsupported());
    }

    #[test]
    fn vec_sequence_moves_both_ways() {
        let mut v = VecSequence::new(vec![XObject::from(1.0), XObject::from(2.0)]);
        assert_eq!(v.previous().unwrap().map(|x| x.as_number()), None);
        assert_eq!(v.next().unwrap().unwrap().as_number(), Some(1.0));
        assert_eq!(v.next().unwrap().unwrap().as_number(), Some(2.0));
        assert_eq!(v.previous().unwrap().unwrap().as_number(), Some(2.0));
        assert_eq!(v.previous().unwrap().unwrap().as_number(), Some(1.0));
        assert!(v.previous().unwrap().is_none());
    }

    #[test]
    fn cached_sequence_replays_without_rerunning_producer() {
        let mut c = CachedSequence::new(Box::new(RangeSequence::new(1, 4)));
        assert_eq!(c.next().unwrap().unwrap().as_number(), Some(1.0));
        assert_eq!(c.next().unwrap().unwrap().as_number(), Some(2.0));
        assert_eq!(c.previous().unwrap().unwrap().as_number(), Some(2.0));
        assert_eq!(c.next().unwrap().unwrap().as_number(), Some(2.0));
        assert_eq!(c.buffered(), 2);
        assert_eq!(numbers(&mut c), vec![3.0, 4.0]);
        c.reset();
        assert_eq!(numbers(&mut c), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(c.buffered(), 4);
    }

    #[test]
    fn materialize_drains_the_rest() {
        let mut s: Box<dyn XSequence> = Box::new(RangeSequence::new(5, 7));
        s.next().unwrap();
        let rest = s.materialize().unwrap();
        assert_eq!(rest.len(), 2);
    }
}
