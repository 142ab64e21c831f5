//! Operator schema registry.
//!
//! Schemas declare the arity and attribute contract of each public op kind
//! and are consulted when ops are added to a graph. The registry follows a
//! "register at initialization, read afterwards" discipline; builtins are
//! installed on first access.

mod defs;
pub mod shape_infer;

use std::collections::{BTreeMap, HashMap};
use std::ops::RangeInclusive;
use std::sync::{Arc, OnceLock, RwLock};

use crate::error::{GraphError, GraphResult};
use crate::ir::attribute::{AttrKind, AttrValue};
use crate::ir::op::{Op, OpKind};
use crate::ir::tensor::LogicalTensor;

/// Shape rule: derives output tensors from input tensors and op attributes.
pub type ShapeInferFn = fn(&Op, &[LogicalTensor], &mut Vec<LogicalTensor>) -> GraphResult<()>;

/// Declared contract for a single attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct AttrSpec {
    pub kind: AttrKind,
    pub required: bool,
    pub default: Option<AttrValue>,
}

/// Arity, attribute, and validation contract of an op kind.
#[derive(Clone)]
pub struct OpSchema {
    kind: OpKind,
    inputs: RangeInclusive<usize>,
    outputs: RangeInclusive<usize>,
    attrs: BTreeMap<&'static str, AttrSpec>,
    shape_infer: Option<ShapeInferFn>,
}

impl OpSchema {
    pub fn new(kind: OpKind, inputs: RangeInclusive<usize>, outputs: RangeInclusive<usize>) -> Self {
        Self {
            kind,
            inputs,
            outputs,
            attrs: BTreeMap::new(),
            shape_infer: None,
        }
    }

    pub fn required_attr(mut self, name: &'static str, kind: AttrKind) -> Self {
        self.attrs.insert(
            name,
            AttrSpec {
                kind,
                required: true,
                default: None,
            },
        );
        self
    }

    pub fn optional_attr(mut self, name: &'static str, default: impl Into<AttrValue>) -> Self {
        let default = default.into();
        self.attrs.insert(
            name,
            AttrSpec {
                kind: default.kind(),
                required: false,
                default: Some(default),
            },
        );
        self
    }

    /// Optional attribute with no default; only the tag is checked when set.
    pub fn optional_attr_of(mut self, name: &'static str, kind: AttrKind) -> Self {
        self.attrs.insert(
            name,
            AttrSpec {
                kind,
                required: false,
                default: None,
            },
        );
        self
    }

    pub fn shape_rule(mut self, rule: ShapeInferFn) -> Self {
        self.shape_infer = Some(rule);
        self
    }

    pub fn kind(&self) -> OpKind {
        self.kind
    }

    pub fn num_inputs(&self) -> &RangeInclusive<usize> {
        &self.inputs
    }

    pub fn num_outputs(&self) -> &RangeInclusive<usize> {
        &self.outputs
    }

    pub fn attr_spec(&self, name: &str) -> Option<&AttrSpec> {
        self.attrs.get(name)
    }

    /// Populates missing attributes with schema defaults.
    pub fn set_default_attributes(&self, op: &mut Op) {
        for (name, spec) in &self.attrs {
            if let Some(default) = &spec.default {
                if !op.has_attr(name) {
                    op.set_attr(*name, default.clone());
                }
            }
        }
    }

    /// Verifies arity and attribute contract. Extra attributes not named by
    /// the schema are permitted.
    pub fn verify(&self, op: &Op) -> bool {
        if !self.inputs.contains(&op.num_inputs()) || !self.outputs.contains(&op.num_outputs()) {
            return false;
        }
        for (name, spec) in &self.attrs {
            match op.attr(name) {
                Some(value) => {
                    if value.kind() != spec.kind {
                        return false;
                    }
                }
                None => {
                    if spec.required {
                        return false;
                    }
                }
            }
        }
        true
    }

    /// Runs the schema's shape rule, writing derived output tensors.
    pub fn infer_shape(
        &self,
        op: &Op,
        inputs: &[LogicalTensor],
        outputs: &mut Vec<LogicalTensor>,
    ) -> GraphResult<()> {
        let rule = self.shape_infer.ok_or_else(|| {
            GraphError::unsupported(format!("shape inference for {}", self.kind))
        })?;
        rule(op, inputs, outputs)
    }

    fn same_contract(&self, other: &OpSchema) -> bool {
        self.kind == other.kind
            && self.inputs == other.inputs
            && self.outputs == other.outputs
            && self.attrs == other.attrs
    }
}

struct SchemaRegistry {
    schemas: RwLock<HashMap<OpKind, Arc<OpSchema>>>,
}

impl SchemaRegistry {
    fn with_builtins() -> Self {
        let mut schemas = HashMap::new();
        for schema in defs::builtin_schemas() {
            schemas.insert(schema.kind(), Arc::new(schema));
        }
        Self {
            schemas: RwLock::new(schemas),
        }
    }

    fn register(&self, schema: OpSchema) -> GraphResult<()> {
        let mut schemas = self
            .schemas
            .write()
            .map_err(|_| GraphError::invalid_argument("schema registry lock poisoned"))?;
        if let Some(existing) = schemas.get(&schema.kind()) {
            if existing.same_contract(&schema) {
                return Ok(());
            }
            return Err(GraphError::invalid_argument(format!(
                "conflicting schema registration for {}",
                schema.kind()
            )));
        }
        schemas.insert(schema.kind(), Arc::new(schema));
        Ok(())
    }

    fn lookup(&self, kind: OpKind) -> Option<Arc<OpSchema>> {
        self.schemas.read().ok()?.get(&kind).cloned()
    }
}

static GLOBAL_SCHEMAS: OnceLock<SchemaRegistry> = OnceLock::new();

fn global_schemas() -> &'static SchemaRegistry {
    GLOBAL_SCHEMAS.get_or_init(SchemaRegistry::with_builtins)
}

/// Registers a schema. Re-registration with identical content is a no-op;
/// conflicting content is rejected.
pub fn register_schema(schema: OpSchema) -> GraphResult<()> {
    global_schemas().register(schema)
}

/// Looks up the schema for `kind`, if one is registered.
pub fn lookup_schema(kind: OpKind) -> Option<Arc<OpSchema>> {
    global_schemas().lookup(kind)
}
