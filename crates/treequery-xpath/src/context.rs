//! Evaluation context: the focus stack, variable bindings, the function registry and the
//! tree model manager used to resolve node handles.
//!
//! The focus is an explicit stack. Sub-evaluations that change the current item do so
//! through [`EvaluationContext::scoped_item`] or [`EvaluationContext::scoped_focus`],
//! whose guard truncates the stack back to its previous depth when dropped, on normal
//! return as well as on `?` propagation and unwinding.
use core::fmt;
use core::ops::{Deref, DerefMut};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::Arc;

use smallvec::SmallVec;
use treequery_dtm::{NodeHandle, TreeModel, TreeModelManager};

use crate::error::{Error, ErrorCode};
use crate::functions::{FunctionRegistry, default_function_registry};
use crate::xobject::{ExpandedName, FNS, XObject};

/// One focus entry: the current item with its 1-based position and the size of the
/// sequence it was taken from.
#[derive(Debug, Clone)]
pub struct Focus {
    pub item: XObject,
    pub position: usize,
    pub size: usize,
}

#[derive(Clone)]
pub struct EvaluationContext {
    focus: SmallVec<[Focus; 8]>,
    variables: Rc<HashMap<ExpandedName, XObject>>,
    functions: Arc<FunctionRegistry>,
    manager: Option<Arc<TreeModelManager>>,
    default_function_namespace: Option<String>,
}

impl fmt::Debug for EvaluationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("focus_depth", &self.focus.len())
            .field("variables", &self.variables.len())
            .field("manager", &self.manager.is_some())
            .finish_non_exhaustive()
    }
}

impl Default for EvaluationContext {
    fn default() -> Self {
        Self {
            focus: SmallVec::new(),
            variables: Rc::new(HashMap::new()),
            functions: Arc::new(default_function_registry()),
            manager: None,
            default_function_namespace: Some(FNS.to_string()),
        }
    }
}

impl EvaluationContext {
    pub fn builder() -> EvaluationContextBuilder {
        EvaluationContextBuilder::new()
    }

    pub fn push_current_item(&mut self, item: XObject) {
        self.push_focus(item, 1, 1);
    }

    pub fn push_focus(&mut self, item: XObject, position: usize, size: usize) {
        self.focus.push(Focus { item, position, size });
    }

    pub fn pop_current_item(&mut self) -> Option<XObject> {
        self.focus.pop().map(|f| f.item)
    }

    /// Pushes `item` and returns a guard that pops it again when dropped.
    pub fn scoped_item(&mut self, item: XObject) -> FocusScope<'_> {
        self.scoped_focus(item, 1, 1)
    }

    pub fn scoped_focus(&mut self, item: XObject, position: usize, size: usize) -> FocusScope<'_> {
        let depth = self.focus.len();
        self.push_focus(item, position, size);
        FocusScope { ctx: self, depth }
    }

    fn focus(&self) -> Result<&Focus, Error> {
        self.focus.last().ok_or_else(|| Error::from_code(ErrorCode::XPDY0002, "context item is undefined"))
    }

    /// The current item; fails with `XPDY0002` when no item is in focus.
    pub fn current_item(&self) -> Result<XObject, Error> {
        self.focus().map(|f| f.item.clone())
    }

    pub fn current_node(&self) -> Result<Option<NodeHandle>, Error> {
        self.focus().map(|f| f.item.as_node())
    }

    pub fn position(&self) -> Result<usize, Error> {
        self.focus().map(|f| f.position)
    }

    pub fn size(&self) -> Result<usize, Error> {
        self.focus().map(|f| f.size)
    }

    pub fn depth(&self) -> usize {
        self.focus.len()
    }

    pub(crate) fn truncate_focus(&mut self, depth: usize) {
        self.focus.truncate(depth);
    }

    pub fn variable(&self, name: &ExpandedName) -> Result<XObject, Error> {
        self.variables.get(name).cloned().ok_or_else(|| Error::unbound_variable(name))
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    pub fn default_function_namespace(&self) -> Option<&str> {
        self.default_function_namespace.as_deref()
    }

    pub fn manager(&self) -> Result<&Arc<TreeModelManager>, Error> {
        self.manager
            .as_ref()
            .ok_or_else(|| Error::from_code(ErrorCode::TQDM0001, "no tree model manager bound to the context"))
    }

    /// Model owning `node`.
    pub fn owner_of(&self, node: NodeHandle) -> Result<Arc<TreeModel>, Error> {
        Ok(self.manager()?.owner_of(node)?)
    }

    /// A copy to be evaluated against later, for lazily produced sequences.
    pub fn snapshot(&self) -> ContextHandle {
        ContextHandle::new(self.clone())
    }
}

/// Restores the focus depth of the borrowed context on drop.
pub struct FocusScope<'a> {
    ctx: &'a mut EvaluationContext,
    depth: usize,
}

impl Deref for FocusScope<'_> {
    type Target = EvaluationContext;

    fn deref(&self) -> &Self::Target {
        self.ctx
    }
}

impl DerefMut for FocusScope<'_> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.ctx
    }
}

impl Drop for FocusScope<'_> {
    fn drop(&mut self) {
        self.ctx.focus.truncate(self.depth);
    }
}

struct HandleInner {
    snapshot: EvaluationContext,
    cache: RefCell<Option<EvaluationContext>>,
}

/// Shared snapshot of a context plus one reusable working copy. Cloning the handle
/// shares both.
#[derive(Clone)]
pub struct ContextHandle {
    inner: Rc<HandleInner>,
}

impl fmt::Debug for ContextHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContextHandle").field("depth", &self.inner.snapshot.depth()).finish_non_exhaustive()
    }
}

impl ContextHandle {
    pub fn new(snapshot: EvaluationContext) -> Self {
        Self { inner: Rc::new(HandleInner { snapshot, cache: RefCell::new(None) }) }
    }

    /// Runs `f` on a working copy of the snapshot. The copy is reused across calls and its
    /// focus is reset to the snapshot's before it is stored again. Nested calls get
    /// their own copy.
    pub fn with_context<R>(&self, f: impl FnOnce(&mut EvaluationContext) -> R) -> R {
        let cached = self.inner.cache.borrow_mut().take();
        let mut ctx = cached.unwrap_or_else(|| self.inner.snapshot.clone());
        let out = f(&mut ctx);
        ctx.truncate_focus(self.inner.snapshot.depth());
        *self.inner.cache.borrow_mut() = Some(ctx);
        out
    }

    pub fn snapshot(&self) -> &EvaluationContext {
        &self.inner.snapshot
    }
}

pub struct EvaluationContextBuilder {
    ctx: EvaluationContext,
    variables: HashMap<ExpandedName, XObject>,
}

impl Default for EvaluationContextBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EvaluationContextBuilder {
    pub fn new() -> Self {
        Self { ctx: EvaluationContext::default(), variables: HashMap::new() }
    }

    pub fn with_context_item(mut self, item: impl Into<XObject>) -> Self {
        self.ctx.focus.clear();
        self.ctx.push_current_item(item.into());
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<XObject>) -> Self {
        self.variables.insert(name, value.into());
        self
    }

    pub fn with_functions(mut self, reg: Arc<FunctionRegistry>) -> Self {
        self.ctx.functions = reg;
        self
    }

    pub fn with_manager(mut self, manager: Arc<TreeModelManager>) -> Self {
        self.ctx.manager = Some(manager);
        self
    }

    /// `None` requires every function name to carry its namespace.
    pub fn with_default_function_namespace(mut self, uri: Option<&str>) -> Self {
        self.ctx.default_function_namespace = uri.map(str::to_string);
        self
    }

    pub fn build(mut self) -> EvaluationContext {
        self.ctx.variables = Rc::new(self.variables);
        self.ctx
    }
}
