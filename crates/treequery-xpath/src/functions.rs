//! Function registry and the built-in function library.
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use itertools::Itertools;
use treequery_dtm::{NodeHandle, compare_document_order};

use crate::context::EvaluationContext;
use crate::error::{Error, ErrorCode};
use crate::evaluator::{effective_boolean, first_item, flatten, number_value, string_value};
use crate::xobject::{ExpandedName, FNS, XObject};

pub type Arity = usize;

/// Error type returned by function resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// No function with the (possibly default-namespace resolved) name exists.
    Unknown(ExpandedName),
    /// Function exists, but not for the requested arity.
    WrongArity { name: ExpandedName, available: Vec<Arity> },
}

impl From<ResolveError> for Error {
    fn from(e: ResolveError) -> Self {
        match e {
            ResolveError::Unknown(name) => Error::from_code(ErrorCode::XPST0017, format!("unknown function {name}")),
            ResolveError::WrongArity { name, available } => Error::from_code(
                ErrorCode::XPST0017,
                format!("function {name} accepts {} argument(s)", available.iter().join(", ")),
            ),
        }
    }
}

pub type FunctionImpl = Arc<dyn Fn(&EvaluationContext, Vec<XObject>) -> Result<XObject, Error> + Send + Sync>;

// (min_arity, max_arity, impl); `None` max means variadic
pub type FunctionOverload = (Arity, Option<Arity>, FunctionImpl);

#[derive(Default)]
pub struct FunctionRegistry {
    fns: HashMap<ExpandedName, Vec<FunctionOverload>>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: ExpandedName, arity: Arity, func: FunctionImpl) {
        self.register_range(name, arity, Some(arity), func);
    }

    /// Overlapping ranges are allowed; the overload with the highest minimum arity wins.
    pub fn register_range(&mut self, name: ExpandedName, min_arity: Arity, max_arity: Option<Arity>, func: FunctionImpl) {
        match self.fns.entry(name) {
            Entry::Vacant(e) => {
                e.insert(vec![(min_arity, max_arity, func)]);
            }
            Entry::Occupied(mut e) => {
                let v = e.get_mut();
                v.push((min_arity, max_arity, func));
                v.sort_by(|a, b| b.0.cmp(&a.0).then_with(|| a.1.unwrap_or(usize::MAX).cmp(&b.1.unwrap_or(usize::MAX))));
            }
        }
    }

    pub fn register_ns_range<F>(&mut self, ns_uri: &str, local: &str, min_arity: Arity, max_arity: Option<Arity>, f: F)
    where
        F: 'static + Send + Sync + Fn(&EvaluationContext, Vec<XObject>) -> Result<XObject, Error>,
    {
        self.register_range(ExpandedName::new(Some(ns_uri.to_string()), local), min_arity, max_arity, Arc::new(f));
    }

    pub fn register_ns<F>(&mut self, ns_uri: &str, local: &str, arity: Arity, f: F)
    where
        F: 'static + Send + Sync + Fn(&EvaluationContext, Vec<XObject>) -> Result<XObject, Error>,
    {
        self.register_ns_range(ns_uri, local, arity, Some(arity), f);
    }

    /// Resolves `name` for `arity`. Names without a namespace are looked up as given
    /// first, then in `default_ns`.
    pub fn resolve(&self, name: &ExpandedName, arity: Arity, default_ns: Option<&str>) -> Result<&FunctionImpl, ResolveError> {
        let fits = |(min, max, _): &&FunctionOverload| arity >= *min && max.is_none_or(|m| arity <= m);
        if let Some(f) = self.fns.get(name).and_then(|c| c.iter().find(fits)) {
            return Ok(&f.2);
        }
        let effective = match (&name.ns_uri, default_ns) {
            (None, Some(ns)) => ExpandedName::new(Some(ns.to_string()), name.local.clone()),
            _ => name.clone(),
        };
        let Some(cands) = self.fns.get(&effective).or_else(|| self.fns.get(name)) else {
            return Err(ResolveError::Unknown(effective));
        };
        if let Some(f) = cands.iter().find(fits) {
            return Ok(&f.2);
        }
        let available = cands
            .iter()
            .flat_map(|(min, max, _)| *min..=max.unwrap_or(*min))
            .sorted_unstable()
            .dedup()
            .collect();
        Err(ResolveError::WrongArity { name: effective, available })
    }

    pub fn contains(&self, name: &ExpandedName) -> bool {
        self.fns.contains_key(name)
    }
}

fn single_arg(args: Vec<XObject>) -> Option<XObject> {
    args.into_iter().next()
}

/// Argument 0 if given, else the context item.
fn arg_or_context(ctx: &EvaluationContext, args: Vec<XObject>) -> Result<XObject, Error> {
    match single_arg(args) {
        Some(v) => Ok(v),
        None => ctx.current_item(),
    }
}

/// Optional node argument: the empty sequence is `None`, a non-node is a type error.
fn optional_node(ctx: &EvaluationContext, args: Vec<XObject>, func: &str) -> Result<Option<NodeHandle>, Error> {
    match first_item(arg_or_context(ctx, args)?)? {
        None => Ok(None),
        Some(XObject::Node(h)) => Ok(Some(h)),
        Some(other) => Err(Error::type_error(format!("{func}() expects a node, got {}", other.type_name()))),
    }
}

fn node_name(ctx: &EvaluationContext, args: Vec<XObject>, func: &str, local_only: bool) -> Result<XObject, Error> {
    let Some(node) = optional_node(ctx, args, func)? else {
        return Ok(XObject::from(""));
    };
    let name = ctx.owner_of(node)?.name(node)?;
    Ok(XObject::from(match name {
        Some(q) if local_only => q.local,
        Some(q) => q.to_string(),
        None => String::new(),
    }))
}

fn id_lookup(ctx: &EvaluationContext, args: Vec<XObject>) -> Result<XObject, Error> {
    let mut args = args.into_iter();
    let ids = args.next().map(flatten).transpose()?.unwrap_or_default();
    let anchor = match args.next() {
        Some(v) => first_item(v)?,
        None => Some(ctx.current_item()?),
    };
    let node = match anchor {
        Some(XObject::Node(h)) => h,
        Some(other) => return Err(Error::type_error(format!("id() needs a node, got {}", other.type_name()))),
        None => return Err(Error::from_code(ErrorCode::XPDY0002, "id() without a context node")),
    };
    let model = ctx.owner_of(node)?;
    let mut found = Vec::new();
    for value in ids {
        let tokens = string_value(ctx, value)?;
        found.extend(tokens.split_whitespace().filter_map(|t| model.element_by_id(t)));
    }
    let nodes: Vec<XObject> =
        found.into_iter().sorted_by(|a, b| compare_document_order(*a, *b)).dedup().map(XObject::Node).collect();
    Ok(XObject::sequence(nodes))
}

fn unparsed_entity_uri(ctx: &EvaluationContext, args: Vec<XObject>) -> Result<XObject, Error> {
    let name = string_value(ctx, single_arg(args).unwrap_or_else(XObject::empty))?;
    let node = ctx.current_node()?.ok_or_else(|| {
        Error::from_code(ErrorCode::XPDY0002, "unparsed-entity-uri() requires a node as context item")
    })?;
    let model = ctx.owner_of(node)?;
    Ok(XObject::from(model.unparsed_entity_uri(&name).unwrap_or_default()))
}

/// The built-in library, registered in the functions namespace.
#[allow(clippy::cast_precision_loss)]
pub fn default_function_registry() -> FunctionRegistry {
    let mut reg = FunctionRegistry::new();
    reg.register_ns(FNS, "true", 0, |_, _| Ok(XObject::Boolean(true)));
    reg.register_ns(FNS, "false", 0, |_, _| Ok(XObject::Boolean(false)));
    reg.register_ns(FNS, "not", 1, |_, args| {
        Ok(XObject::Boolean(!effective_boolean(single_arg(args).unwrap_or_else(XObject::empty))?))
    });
    reg.register_ns(FNS, "boolean", 1, |_, args| {
        Ok(XObject::Boolean(effective_boolean(single_arg(args).unwrap_or_else(XObject::empty))?))
    });
    reg.register_ns_range(FNS, "string", 0, Some(1), |ctx, args| {
        Ok(XObject::String(string_value(ctx, arg_or_context(ctx, args)?)?))
    });
    reg.register_ns_range(FNS, "number", 0, Some(1), |ctx, args| {
        Ok(XObject::Number(number_value(ctx, arg_or_context(ctx, args)?)?))
    });
    reg.register_ns_range(FNS, "string-length", 0, Some(1), |ctx, args| {
        let s = string_value(ctx, arg_or_context(ctx, args)?)?;
        Ok(XObject::Number(s.chars().count() as f64))
    });
    reg.register_ns(FNS, "count", 1, |_, args| {
        let n = single_arg(args).map(flatten).transpose()?.map_or(0, |v| v.len());
        Ok(XObject::Number(n as f64))
    });
    reg.register_ns(FNS, "empty", 1, |_, args| {
        Ok(XObject::Boolean(first_item(single_arg(args).unwrap_or_else(XObject::empty))?.is_none()))
    });
    reg.register_ns(FNS, "exists", 1, |_, args| {
        Ok(XObject::Boolean(first_item(single_arg(args).unwrap_or_else(XObject::empty))?.is_some()))
    });
    reg.register_ns_range(FNS, "concat", 2, None, |ctx, args| {
        let mut out = String::new();
        for a in args {
            out.push_str(&string_value(ctx, a)?);
        }
        Ok(XObject::String(out))
    });
    reg.register_ns(FNS, "sum", 1, |ctx, args| {
        let mut total = 0.0;
        for item in single_arg(args).map(flatten).transpose()?.unwrap_or_default() {
            total += number_value(ctx, item)?;
        }
        Ok(XObject::Number(total))
    });
    reg.register_ns(FNS, "position", 0, |ctx, _| Ok(XObject::Number(ctx.position()? as f64)));
    reg.register_ns(FNS, "last", 0, |ctx, _| Ok(XObject::Number(ctx.size()? as f64)));
    reg.register_ns_range(FNS, "name", 0, Some(1), |ctx, args| node_name(ctx, args, "name", false));
    reg.register_ns_range(FNS, "local-name", 0, Some(1), |ctx, args| node_name(ctx, args, "local-name", true));
    reg.register_ns_range(FNS, "id", 1, Some(2), id_lookup);
    reg.register_ns(FNS, "unparsed-entity-uri", 1, unparsed_entity_uri);
    reg
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fn_name(local: &str) -> ExpandedName {
        ExpandedName::new(Some(FNS.to_string()), local)
    }

    #[test]
    fn default_namespace_applies_to_unprefixed_names() {
        let reg = default_function_registry();
        assert!(reg.resolve(&ExpandedName::local("count"), 1, Some(FNS)).is_ok());
        assert!(matches!(reg.resolve(&ExpandedName::local("count"), 1, None), Err(ResolveError::Unknown(_))));
    }

    #[test]
    fn wrong_arity_lists_accepted_counts() {
        let reg = default_function_registry();
        let Err(err) = reg.resolve(&fn_name("string"), 3, None) else { panic!("expected an arity error") };
        assert_eq!(err, ResolveError::WrongArity { name: fn_name("string"), available: vec![0, 1] });
        let err: Error = err.into();
        assert_eq!(err.code, ErrorCode::XPST0017);
        assert!(err.message.contains("0, 1"));
    }

    #[test]
    fn variadic_overloads_accept_any_higher_arity() {
        let reg = default_function_registry();
        assert!(reg.resolve(&fn_name("concat"), 7, None).is_ok());
        assert!(reg.resolve(&fn_name("concat"), 1, None).is_err());
    }

    #[test]
    fn position_and_last_read_the_focus() {
        let reg = default_function_registry();
        let mut ctx = EvaluationContext::default();
        ctx.push_focus(XObject::from("x"), 2, 5);
        let pos = reg.resolve(&fn_name("position"), 0, None).unwrap();
        let last = reg.resolve(&fn_name("last"), 0, None).unwrap();
        assert_eq!(pos(&ctx, vec![]).unwrap().as_number(), Some(2.0));
        assert_eq!(last(&ctx, vec![]).unwrap().as_number(), Some(5.0));
    }
}
