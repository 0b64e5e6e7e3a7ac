//! Maps procedure kinds to transformation constructors.

use std::any::{type_name, Any};
use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::context::ExecutionContext;
use crate::dataset::Dataset;
use crate::error::{Error, Result};
use crate::transformation::Transformation;
use crate::union::UnionTransformation;
use crate::window_transform::{FixedWindowTransformation, WindowSpec};

pub const WINDOW_KIND: &str = "window";
pub const UNION_KIND: &str = "union";

/// The planned parameters of one operator.
pub trait ProcedureSpec: fmt::Debug + Send + Sync {
    fn kind(&self) -> &'static str;
    fn as_any(&self) -> &dyn Any;
}

/// Borrow `spec` as the concrete type a constructor expects.
pub fn downcast_spec<S: ProcedureSpec + 'static>(spec: &dyn ProcedureSpec) -> Result<&S> {
    spec.as_any()
        .downcast_ref::<S>()
        .ok_or_else(|| Error::InvalidSpecType {
            expected: type_name::<S>(),
            actual: spec.kind().to_string(),
        })
}

impl ProcedureSpec for WindowSpec {
    fn kind(&self) -> &'static str {
        WINDOW_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Union takes no parameters beyond its parents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnionSpec;

impl ProcedureSpec for UnionSpec {
    fn kind(&self) -> &'static str {
        UNION_KIND
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

/// Builds a transformation writing into `Dataset` from a spec and its execution context.
pub type Constructor = Box<
    dyn Fn(&dyn ProcedureSpec, Dataset, &ExecutionContext) -> Result<Box<dyn Transformation>>
        + Send
        + Sync,
>;

/// The transformations an execution can instantiate, built once at start-up.
#[derive(Default)]
pub struct TransformationRegistry {
    constructors: HashMap<String, Constructor>,
}

impl fmt::Debug for TransformationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut kinds = self.kinds();
        kinds.sort_unstable();
        f.debug_struct("TransformationRegistry")
            .field("kinds", &kinds)
            .finish()
    }
}

impl TransformationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry holding the window and union transformations.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .constructors
            .insert(WINDOW_KIND.to_string(), Box::new(new_window));
        registry
            .constructors
            .insert(UNION_KIND.to_string(), Box::new(new_union));
        registry
    }

    pub fn register(&mut self, kind: &str, constructor: Constructor) -> Result<()> {
        if self.constructors.contains_key(kind) {
            return Err(Error::DuplicateProcedure(kind.to_string()));
        }
        self.constructors.insert(kind.to_string(), constructor);
        Ok(())
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.constructors.contains_key(kind)
    }

    pub fn kinds(&self) -> Vec<&str> {
        self.constructors.keys().map(String::as_str).collect()
    }

    /// Instantiate the transformation registered for `kind`.
    pub fn create(
        &self,
        kind: &str,
        spec: &dyn ProcedureSpec,
        d: Dataset,
        ctx: &ExecutionContext,
    ) -> Result<Box<dyn Transformation>> {
        let constructor = self
            .constructors
            .get(kind)
            .ok_or_else(|| Error::UnknownProcedure(kind.to_string()))?;
        constructor(spec, d, ctx)
    }
}

fn new_window(
    spec: &dyn ProcedureSpec,
    d: Dataset,
    ctx: &ExecutionContext,
) -> Result<Box<dyn Transformation>> {
    let spec = downcast_spec::<WindowSpec>(spec)?;
    Ok(Box::new(FixedWindowTransformation::new(spec, ctx.bounds, d)?))
}

fn new_union(
    spec: &dyn ProcedureSpec,
    d: Dataset,
    ctx: &ExecutionContext,
) -> Result<Box<dyn Transformation>> {
    downcast_spec::<UnionSpec>(spec)?;
    Ok(Box::new(UnionTransformation::new(d, &ctx.parents)))
}
