//! XPath-family expressions over treequery tree models.
//!
//! Expressions are built programmatically as [`Expr`] trees and evaluated with
//! [`evaluate`] against an [`EvaluationContext`]. Results are [`XObject`]s; sequence
//! results are pulled lazily through the [`XSequence`] cursor interface.
//!
//! ```
//! use std::sync::Arc;
//! use treequery_dtm::TreeModelManager;
//! use treequery_dtm::simple::{attr, doc, elem, text};
//! use treequery_xpath::{EvaluationContext, Expr, PathStart, evaluate_to_vec};
//!
//! let manager = Arc::new(TreeModelManager::with_defaults());
//! let source = doc()
//!     .child(
//!         elem("shelf")
//!             .child(elem("book").attr(attr("lang", "en")).child(text("Dune")))
//!             .child(elem("book").attr(attr("lang", "de")).child(text("Momo"))),
//!     )
//!     .into_source("urn:example:shelf");
//! let model = manager.create(&source, false).unwrap();
//!
//! let mut ctx = EvaluationContext::builder()
//!     .with_manager(manager.clone())
//!     .with_context_item(model.document())
//!     .build();
//! let titles = Expr::path(PathStart::Root, vec![Expr::child("shelf"), Expr::child("book")]);
//! assert_eq!(evaluate_to_vec(&titles, &mut ctx).unwrap().len(), 2);
//! ```
pub mod ast;
pub mod context;
pub mod error;
pub mod evaluator;
pub mod functions;
pub mod seqctor;
pub mod sequence;
pub mod xobject;

pub use ast::{
    ArithmeticOp, AstChild, AstChildRef, AtomicType, Axis, BinaryOp, CastOrTreatExpr, ComparisonOp, Expr, ExprKind,
    ItemType, KindTest, Literal, LogicalOp, NameTest, NodeTest, Occurrence, PathStart, SequenceType,
};
pub use context::{ContextHandle, EvaluationContext, EvaluationContextBuilder, Focus, FocusScope};
pub use error::{ERR_NS, Error, ErrorCode};
pub use evaluator::{
    KindMask, NodeFilter, NodeIterator, evaluate, evaluate_first, evaluate_to_vec, node_iterator, single_node,
};
pub use functions::{FunctionImpl, FunctionRegistry, ResolveError, default_function_registry};
pub use seqctor::{ExprSequence, SequenceMode};
pub use sequence::{CachedSequence, RangeSequence, SequenceIter, VecSequence, XSequence};
pub use xobject::{ExpandedName, FNS, XObject, XS, format_number, parse_number};
