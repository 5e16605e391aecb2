//! Per-request handler argument assembly.

use crate::route_registry::{ParameterBinding, ParameterSource};
use crate::{Error, RequestContext, Result};
use serde::de::DeserializeOwned;

/// One extracted handler argument.
#[derive(Clone, Debug)]
pub enum Argument {
    Context(RequestContext),
    Body(serde_json::Value),
    /// Path or query value; `None` when the request did not carry the key.
    Value(Option<String>),
}

/// Sparse argument list built from a handler's bindings.
#[derive(Clone, Debug, Default)]
pub struct Arguments {
    slots: Vec<Option<Argument>>,
}

impl Arguments {
    /// Arguments of a handler without bindings: the context at index 0.
    pub fn implicit(ctx: RequestContext) -> Self {
        Self {
            slots: vec![Some(Argument::Context(ctx))],
        }
    }

    /// Extract every binding from `ctx`.
    ///
    /// The list is sized to the highest bound index; unbound positions stay
    /// empty.
    pub fn assemble(ctx: &RequestContext, bindings: &[ParameterBinding]) -> Result<Self> {
        if bindings.is_empty() {
            return Ok(Self::implicit(ctx.clone()));
        }

        let len = bindings
            .iter()
            .map(|binding| binding.argument_index)
            .max()
            .map_or(0, |max| max + 1);
        let mut slots = vec![None; len];

        for binding in bindings {
            let key = binding.key.as_deref().unwrap_or_default();
            let argument = match binding.source {
                ParameterSource::Context => Argument::Context(ctx.clone()),
                ParameterSource::Body => Argument::Body(ctx.body()?),
                ParameterSource::PathParam => Argument::Value(ctx.param(key)),
                ParameterSource::Query => Argument::Value(ctx.query(key)),
            };
            slots[binding.argument_index] = Some(argument);
        }

        Ok(Self { slots })
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn is_bound(&self, index: usize) -> bool {
        matches!(self.slots.get(index), Some(Some(_)))
    }

    pub fn get(&self, index: usize) -> Option<&Argument> {
        self.slots.get(index).and_then(Option::as_ref)
    }

    /// The request context bound at `index`.
    pub fn context(&self, index: usize) -> Result<RequestContext> {
        match self.get(index) {
            Some(Argument::Context(ctx)) => Ok(ctx.clone()),
            other => Err(unexpected(index, "request context", other)),
        }
    }

    /// The parsed body at `index`, deserialized into `T`.
    pub fn body<T: DeserializeOwned>(&self, index: usize) -> Result<T> {
        let value = self.body_value(index)?;
        serde_json::from_value(value.clone()).map_err(|e| Error::MalformedBody(e.to_string()))
    }

    pub fn body_value(&self, index: usize) -> Result<&serde_json::Value> {
        match self.get(index) {
            Some(Argument::Body(value)) => Ok(value),
            other => Err(unexpected(index, "request body", other)),
        }
    }

    /// Path or query value at `index`; `None` when absent from the request
    /// or when nothing of that kind is bound there.
    pub fn value(&self, index: usize) -> Option<&str> {
        match self.get(index) {
            Some(Argument::Value(value)) => value.as_deref(),
            _ => None,
        }
    }

    /// Path parameter at `index`.
    pub fn path(&self, index: usize) -> Option<&str> {
        self.value(index)
    }

    /// Query parameter at `index`.
    pub fn query(&self, index: usize) -> Option<&str> {
        self.value(index)
    }
}

fn unexpected(index: usize, wanted: &str, found: Option<&Argument>) -> Error {
    let found = match found {
        None => "nothing",
        Some(Argument::Context(_)) => "the request context",
        Some(Argument::Body(_)) => "the request body",
        Some(Argument::Value(_)) => "a path or query value",
    };
    Error::Internal(format!(
        "handler argument {} should hold the {} but holds {}",
        index, wanted, found
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::HttpRequest;
    use serde::Deserialize;
    use serde_json::json;
    use std::collections::HashMap;

    #[derive(Debug, Deserialize, PartialEq)]
    struct NewUser {
        name: String,
    }

    fn context() -> RequestContext {
        let req = HttpRequest::new("PUT", "/users/42?notify=yes")
            .with_json(&json!({"name": "ada"}))
            .unwrap();
        let ctx = RequestContext::new(req);
        ctx.set_path_params(HashMap::from([("id".to_string(), "42".to_string())]));
        ctx
    }

    #[test]
    fn test_no_bindings_passes_context() {
        let ctx = context();
        let args = Arguments::assemble(&ctx, &[]).unwrap();
        assert_eq!(args.len(), 1);
        assert_eq!(args.context(0).unwrap().id(), ctx.id());
    }

    #[test]
    fn test_sparse_bindings() {
        let ctx = context();
        let bindings = vec![
            ParameterBinding::query(4, "notify"),
            ParameterBinding::path(0, "id"),
            ParameterBinding::body(2),
        ];
        let args = Arguments::assemble(&ctx, &bindings).unwrap();

        assert_eq!(args.len(), 5);
        assert_eq!(args.path(0), Some("42"));
        assert!(!args.is_bound(1));
        assert_eq!(args.body::<NewUser>(2).unwrap(), NewUser { name: "ada".into() });
        assert!(!args.is_bound(3));
        assert_eq!(args.query(4), Some("yes"));
    }

    #[test]
    fn test_missing_keys_are_absent() {
        let ctx = context();
        let bindings = vec![
            ParameterBinding::path(0, "slug"),
            ParameterBinding::query(1, "page"),
        ];
        let args = Arguments::assemble(&ctx, &bindings).unwrap();
        assert!(args.is_bound(0));
        assert_eq!(args.path(0), None);
        assert_eq!(args.query(1), None);
    }

    #[test]
    fn test_malformed_body_fails_assembly() {
        let req = HttpRequest::new("POST", "/users")
            .with_header("Content-Type", "application/json")
            .with_body("{");
        let ctx = RequestContext::new(req);
        let err = Arguments::assemble(&ctx, &[ParameterBinding::body(0)]).unwrap_err();
        assert!(matches!(err, Error::MalformedBody(_)));
    }

    #[test]
    fn test_body_shape_mismatch_is_malformed() {
        let ctx = context();
        let args = Arguments::assemble(&ctx, &[ParameterBinding::body(0)]).unwrap();
        let err = args.body::<Vec<u32>>(0).unwrap_err();
        assert!(matches!(err, Error::MalformedBody(_)));
    }

    #[test]
    fn test_wrong_accessor() {
        let ctx = context();
        let args = Arguments::assemble(&ctx, &[ParameterBinding::context(1)]).unwrap();
        assert!(matches!(args.context(0), Err(Error::Internal(_))));
        assert!(args.body_value(1).is_err());
        assert_eq!(args.value(1), None);
    }
}
