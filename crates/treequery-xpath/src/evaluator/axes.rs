use itertools::Itertools;
use treequery_dtm::{NodeHandle, NodeKind, QName, TreeModel, compare_document_order};

use crate::ast::{Axis, KindTest, NameTest, NodeTest, StepExpr};
use crate::context::EvaluationContext;
use crate::error::Error;
use crate::evaluator::{apply_predicate, required};
use crate::xobject::XObject;

/// Nodes on `axis` from `node`, nearest first.
fn axis_nodes(model: &TreeModel, node: NodeHandle, axis: Axis) -> Result<Vec<NodeHandle>, Error> {
    Ok(match axis {
        Axis::Child => model.children(node)?,
        Axis::Descendant => model.descendants(node, false)?,
        Axis::DescendantOrSelf => model.descendants(node, true)?,
        Axis::Attribute => model.attributes(node)?,
        Axis::Namespace => model.namespaces(node)?,
        Axis::SelfAxis => vec![node],
        Axis::Parent => model.parent(node)?.into_iter().collect(),
        Axis::Ancestor => model.ancestors(node, false)?,
        Axis::AncestorOrSelf => model.ancestors(node, true)?,
        Axis::FollowingSibling => siblings(model, node, TreeModel::next_sibling)?,
        Axis::PrecedingSibling => siblings(model, node, TreeModel::previous_sibling)?,
        Axis::Following => {
            // everything after the last descendant, attributes and namespaces excluded
            let last = model.descendants(node, false)?.last().copied().unwrap_or(node);
            model.descendants(model.document(), false)?.into_iter().filter(|n| *n > last).collect()
        }
        Axis::Preceding => {
            let ancestors = model.ancestors(node, false)?;
            let mut out: Vec<NodeHandle> = model
                .descendants(model.document(), false)?
                .into_iter()
                .filter(|n| *n < node && !ancestors.contains(n))
                .collect();
            out.reverse();
            out
        }
    })
}

fn siblings(
    model: &TreeModel,
    node: NodeHandle,
    next: fn(&TreeModel, NodeHandle) -> Result<Option<NodeHandle>, treequery_dtm::DtmError>,
) -> Result<Vec<NodeHandle>, Error> {
    let mut out = Vec::new();
    let mut cur = next(model, node)?;
    while let Some(n) = cur {
        out.push(n);
        cur = next(model, n)?;
    }
    Ok(out)
}

fn principal_kind(axis: Axis) -> NodeKind {
    match axis {
        Axis::Attribute => NodeKind::Attribute,
        Axis::Namespace => NodeKind::Namespace,
        _ => NodeKind::Element,
    }
}

/// Prefix-only test names (no namespace bound) match on prefix and local name.
fn name_matches(test: &QName, name: Option<&QName>) -> bool {
    let Some(name) = name else {
        return false;
    };
    if test.ns_uri.is_none() && test.prefix.is_some() {
        return test.prefix == name.prefix && test.local == name.local;
    }
    test.matches(name)
}

pub(super) fn kind_test_matches(model: &TreeModel, node: NodeHandle, test: &KindTest) -> Result<bool, Error> {
    let kind = model.kind(node)?;
    Ok(match test {
        KindTest::AnyKind => true,
        KindTest::Document => kind.is_root(),
        KindTest::Text => kind == NodeKind::Text,
        KindTest::Comment => kind == NodeKind::Comment,
        KindTest::Element(name) | KindTest::Attribute(name) => {
            let wanted = if matches!(test, KindTest::Element(_)) { NodeKind::Element } else { NodeKind::Attribute };
            kind == wanted && name.as_ref().is_none_or(|q| name_matches(q, model.name(node).ok().flatten().as_ref()))
        }
        KindTest::ProcessingInstruction(target) => {
            kind == NodeKind::ProcessingInstruction
                && target.as_ref().is_none_or(|t| model.name(node).ok().flatten().is_some_and(|q| &q.local == t))
        }
    })
}

fn node_test_matches(model: &TreeModel, node: NodeHandle, test: &NodeTest, principal: NodeKind) -> Result<bool, Error> {
    match test {
        NodeTest::Kind(k) => kind_test_matches(model, node, k),
        NodeTest::Name(NameTest::Any) => Ok(model.kind(node)? == principal),
        NodeTest::Name(NameTest::QName(q)) => {
            Ok(model.kind(node)? == principal && name_matches(q, model.name(node)?.as_ref()))
        }
    }
}

/// Evaluates an axis step from `node`: collect the axis, apply the node test, then each
/// predicate with positions counted along the axis. The result is in document order.
pub(super) fn step(ctx: &mut EvaluationContext, node: NodeHandle, step: &StepExpr) -> Result<Vec<NodeHandle>, Error> {
    let model = ctx.owner_of(node)?;
    let principal = principal_kind(step.axis);
    let mut candidates = Vec::new();
    for n in axis_nodes(&model, node, step.axis)? {
        if node_test_matches(&model, n, &step.test, principal)? {
            candidates.push(XObject::Node(n));
        }
    }
    for i in 0..step.predicates.len() {
        let pred = required(&step.predicates, i, "predicate")?;
        candidates = apply_predicate(ctx, candidates, pred)?;
    }
    Ok(candidates
        .into_iter()
        .filter_map(|c| c.as_node())
        .sorted_by(|a, b| compare_document_order(*a, *b))
        .collect())
}
