//! Schema engine boundary and a reference engine.
//!
//! The locator only needs two capabilities from a schema: reaching the
//! sub-schema at a dotted path (resolving conditional branches against the
//! current values) and describing a schema given its value, parent and
//! context. [`Schema`] captures both.
//!
//! [`SchemaNode`] is a small builder-style engine implementing the trait,
//! with conditional (`when`) branches and references. [`FieldDescription`]
//! also implements it: a precomputed description acts as a static schema
//! with no conditional branches left to resolve.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::LocateError;
use crate::reference::{path_segments, ComputedRef, Reference};
use crate::types::{FieldDescription, FieldType, InnerType, Param, Pattern, TestDescription};

static NULL: Value = Value::Null;

/// Inputs for describing a schema against concrete data.
#[derive(Debug, Clone, Copy, Default)]
pub struct DescribeOptions<'a> {
    /// The value of the described field.
    pub value: Option<&'a Value>,
    /// The value of the object holding the field.
    pub parent: Option<&'a Value>,
    pub context: Option<&'a Value>,
}

/// Capabilities the locator needs from a schema engine.
pub trait Schema: Sized {
    /// The sub-schema at a dotted path, with conditional branches resolved
    /// against `values` and `context`.
    fn reach(&self, path: &str, values: &Value, context: Option<&Value>)
        -> Result<Self, LocateError>;

    /// Describe this schema for the given value, parent and context.
    fn describe(&self, options: &DescribeOptions<'_>) -> FieldDescription;
}

/// Builds the active branch of a conditional schema from the resolved
/// dependency values and the schema without its conditions.
pub type Branch = Arc<dyn Fn(&[Value], SchemaNode) -> SchemaNode + Send + Sync>;

#[derive(Clone)]
struct Condition {
    dependencies: Vec<ComputedRef>,
    branch: Branch,
}

impl fmt::Debug for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let keys: Vec<&str> = self.dependencies.iter().map(ComputedRef::key).collect();
        f.debug_struct("Condition")
            .field("dependencies", &keys)
            .finish_non_exhaustive()
    }
}

#[derive(Debug, Clone)]
enum Kind {
    Mixed,
    String,
    Number,
    Boolean,
    Date,
    Object(BTreeMap<String, SchemaNode>),
    Array(Option<Box<SchemaNode>>),
    Tuple(Vec<SchemaNode>),
    Custom(String),
}

impl Kind {
    fn field_type(&self) -> FieldType {
        match self {
            Kind::Mixed => FieldType::Mixed,
            Kind::String => FieldType::String,
            Kind::Number => FieldType::Number,
            Kind::Boolean => FieldType::Boolean,
            Kind::Date => FieldType::Date,
            Kind::Object(_) => FieldType::Object,
            Kind::Array(_) => FieldType::Array,
            Kind::Tuple(_) => FieldType::Tuple,
            Kind::Custom(name) => FieldType::parse(name),
        }
    }
}

/// A schema definition with applied tests and conditional branches.
///
/// ```
/// use field_props::{Param, SchemaNode};
///
/// let schema = SchemaNode::object([
///     ("age", SchemaNode::number().required().min(18i64)),
///     ("nickname", SchemaNode::string().max(Param::reference("age"))),
/// ]);
/// # let _ = schema;
/// ```
#[derive(Debug, Clone)]
pub struct SchemaNode {
    kind: Kind,
    label: Option<String>,
    optional: bool,
    nullable: bool,
    default: Option<Param>,
    one_of: Vec<Param>,
    not_one_of: Vec<Param>,
    tests: Vec<TestDescription>,
    conditions: Vec<Condition>,
}

impl SchemaNode {
    fn new(kind: Kind) -> Self {
        Self {
            kind,
            label: None,
            optional: true,
            nullable: false,
            default: None,
            one_of: Vec::new(),
            not_one_of: Vec::new(),
            tests: Vec::new(),
            conditions: Vec::new(),
        }
    }

    pub fn mixed() -> Self {
        Self::new(Kind::Mixed)
    }

    pub fn string() -> Self {
        Self::new(Kind::String)
    }

    pub fn number() -> Self {
        Self::new(Kind::Number)
    }

    pub fn boolean() -> Self {
        Self::new(Kind::Boolean)
    }

    pub fn date() -> Self {
        Self::new(Kind::Date)
    }

    pub fn object<I, K>(fields: I) -> Self
    where
        I: IntoIterator<Item = (K, SchemaNode)>,
        K: Into<String>,
    {
        Self::new(Kind::Object(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    /// A sequence whose elements all follow `inner`.
    pub fn array(inner: SchemaNode) -> Self {
        Self::new(Kind::Array(Some(Box::new(inner))))
    }

    /// A sequence with no element type.
    pub fn array_of_any() -> Self {
        Self::new(Kind::Array(None))
    }

    /// A fixed-length sequence with one schema per position.
    pub fn tuple(items: Vec<SchemaNode>) -> Self {
        Self::new(Kind::Tuple(items))
    }

    /// A schema of an extension type, described with `type_name`.
    pub fn custom(type_name: impl Into<String>) -> Self {
        Self::new(Kind::Custom(type_name.into()))
    }

    pub fn field_type(&self) -> FieldType {
        self.kind.field_type()
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Disallow both `undefined` and `null`.
    pub fn required(mut self) -> Self {
        self.optional = false;
        self.nullable = false;
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    pub fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Allow both `undefined` and `null`.
    pub fn not_required(mut self) -> Self {
        self.optional = true;
        self.nullable = true;
        self
    }

    pub fn default(mut self, value: impl Into<Param>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn one_of<I: IntoIterator<Item = Param>>(mut self, values: I) -> Self {
        self.one_of.extend(values);
        self
    }

    pub fn not_one_of<I: IntoIterator<Item = Param>>(mut self, values: I) -> Self {
        self.not_one_of.extend(values);
        self
    }

    /// Apply a named test. A test with the same name is replaced.
    pub fn test(mut self, name: &str, params: Option<Param>) -> Self {
        self.tests.retain(|t| t.name.as_deref() != Some(name));
        self.tests.push(TestDescription::new(name, params));
        self
    }

    pub fn min(self, min: impl Into<Param>) -> Self {
        self.test("min", Some(Param::record("min", min)))
    }

    pub fn max(self, max: impl Into<Param>) -> Self {
        self.test("max", Some(Param::record("max", max)))
    }

    pub fn length(self, length: impl Into<Param>) -> Self {
        self.test("length", Some(Param::record("length", length)))
    }

    /// Exclusive lower bound, reported through the `min` test.
    pub fn more_than(self, more: impl Into<Param>) -> Self {
        self.test("min", Some(Param::record("more", more)))
    }

    /// Exclusive upper bound, reported through the `max` test.
    pub fn less_than(self, less: impl Into<Param>) -> Self {
        self.test("max", Some(Param::record("less", less)))
    }

    pub fn integer(self) -> Self {
        self.test("integer", None)
    }

    pub fn matches(self, pattern: Pattern) -> Self {
        self.test("matches", Some(Param::record("regex", pattern)))
    }

    pub fn email(self) -> Self {
        self.test("email", None)
    }

    pub fn url(self) -> Self {
        self.test("url", None)
    }

    pub fn uuid(self) -> Self {
        self.test("uuid", None)
    }

    /// ISO datetime strings, optionally with an offset and a fixed number of
    /// fractional-second digits.
    pub fn datetime(self, allow_offset: bool, precision: Option<u32>) -> Self {
        let schema = self
            .test("datetime", None)
            .test(
                "datetime_offset",
                Some(Param::record("allowOffset", allow_offset)),
            );
        match precision {
            Some(precision) => schema.test(
                "datetime_precision",
                Some(Param::record("precision", i64::from(precision))),
            ),
            None => schema,
        }
    }

    /// Add a conditional branch depending on other values.
    ///
    /// Dependency keys resolve like references: relative to the parent
    /// value, or to the context with a `$` prefix.
    pub fn when<F>(mut self, dependencies: &[&str], branch: F) -> Self
    where
        F: Fn(&[Value], SchemaNode) -> SchemaNode + Send + Sync + 'static,
    {
        let dependencies = dependencies
            .iter()
            .filter_map(|key| match Reference::computed(key) {
                Reference::Computed(computed) => Some(computed),
                Reference::Stamped { .. } => None,
            })
            .collect();
        self.conditions.push(Condition {
            dependencies,
            branch: Arc::new(branch),
        });
        self
    }

    /// Apply conditional branches for a field whose object holds `parent`.
    pub fn resolve(&self, parent: Option<&Value>, context: Option<&Value>) -> SchemaNode {
        if self.conditions.is_empty() {
            return self.clone();
        }

        let mut base = self.clone();
        let conditions = std::mem::take(&mut base.conditions);
        let parent = parent.unwrap_or(&NULL);
        let resolved = conditions.iter().fold(base, |schema, condition| {
            let values: Vec<Value> = condition
                .dependencies
                .iter()
                .map(|dependency| {
                    dependency
                        .get_value(parent, parent, context)
                        .unwrap_or(Value::Null)
                })
                .collect();
            (condition.branch)(&values, schema)
        });

        if resolved.conditions.is_empty() {
            resolved
        } else {
            resolved.resolve(Some(parent), context)
        }
    }

    fn describe_resolved(&self, options: &DescribeOptions<'_>) -> FieldDescription {
        let mut description = FieldDescription {
            kind: self.kind.field_type(),
            label: self.label.clone(),
            optional: self.optional,
            nullable: self.nullable,
            one_of: self.one_of.iter().map(stamp).collect(),
            not_one_of: self.not_one_of.iter().map(stamp).collect(),
            default: self.default.clone(),
            tests: self.tests.clone(),
            fields: None,
            inner_type: None,
        };

        let value = options.value;
        match &self.kind {
            Kind::Object(fields) => {
                let described = fields
                    .iter()
                    .map(|(name, field)| {
                        let child = DescribeOptions {
                            value: value.and_then(|v| v.get(name)),
                            parent: value,
                            context: options.context,
                        };
                        (name.clone(), field.describe(&child))
                    })
                    .collect();
                description.fields = Some(described);
            }
            Kind::Array(Some(inner)) => {
                let child = DescribeOptions {
                    value: value.and_then(|v| v.get(0)),
                    parent: value,
                    context: options.context,
                };
                description.inner_type = Some(InnerType::Single(Box::new(inner.describe(&child))));
            }
            Kind::Tuple(items) => {
                let described = items
                    .iter()
                    .enumerate()
                    .map(|(idx, item)| {
                        let child = DescribeOptions {
                            value: value.and_then(|v| v.get(idx)),
                            parent: value,
                            context: options.context,
                        };
                        item.describe(&child)
                    })
                    .collect();
                description.inner_type = Some(InnerType::Tuple(described));
            }
            _ => {}
        }

        description
    }
}

/// Enumerated values are described with references in stamped form.
fn stamp(param: &Param) -> Param {
    match param {
        Param::Ref(reference) => Param::Ref(reference.to_stamped()),
        other => other.clone(),
    }
}

fn element_index(segment: &str) -> Option<Option<usize>> {
    if segment.is_empty() {
        Some(None)
    } else {
        segment.parse::<usize>().ok().map(Some)
    }
}

impl Schema for SchemaNode {
    fn reach(
        &self,
        path: &str,
        values: &Value,
        context: Option<&Value>,
    ) -> Result<Self, LocateError> {
        let segments = path_segments(path).ok_or(LocateError::EmptyName)?;

        let mut schema = self.clone();
        let mut parent: Option<&Value> = None;
        let mut value: Option<&Value> = Some(values);

        for segment in segments {
            let current = schema.resolve(parent, context);
            let next = match &current.kind {
                Kind::Object(fields) => {
                    let child = fields.get(segment).ok_or_else(|| LocateError::FieldNotFound {
                        name: path.to_string(),
                    })?;
                    parent = value;
                    value = value.and_then(|v| v.get(segment));
                    child.clone()
                }
                Kind::Array(inner) => {
                    let idx = element_index(segment).ok_or_else(|| LocateError::FieldNotFound {
                        name: path.to_string(),
                    })?;
                    parent = value;
                    value = value.and_then(|v| v.get(idx.unwrap_or(0)));
                    inner.as_deref().cloned().unwrap_or_else(SchemaNode::mixed)
                }
                Kind::Tuple(items) => {
                    let item = segment
                        .parse::<usize>()
                        .ok()
                        .and_then(|idx| items.get(idx).map(|item| (idx, item)));
                    let (idx, item) = item.ok_or_else(|| LocateError::FieldNotFound {
                        name: path.to_string(),
                    })?;
                    parent = value;
                    value = value.and_then(|v| v.get(idx));
                    item.clone()
                }
                other => {
                    return Err(LocateError::NotAContainer {
                        name: path.to_string(),
                        segment: segment.to_string(),
                        actual: other.field_type().to_string(),
                    })
                }
            };
            schema = next;
        }

        Ok(schema.resolve(parent, context))
    }

    fn describe(&self, options: &DescribeOptions<'_>) -> FieldDescription {
        self.resolve(options.parent, options.context)
            .describe_resolved(options)
    }
}

impl Schema for FieldDescription {
    fn reach(
        &self,
        path: &str,
        _values: &Value,
        _context: Option<&Value>,
    ) -> Result<Self, LocateError> {
        let segments = path_segments(path).ok_or(LocateError::EmptyName)?;
        let not_found = || LocateError::FieldNotFound {
            name: path.to_string(),
        };

        let mut current = self;
        for segment in segments {
            current = match (&current.kind, &current.fields, &current.inner_type) {
                (_, Some(fields), _) => fields.get(segment).ok_or_else(not_found)?,
                (_, None, Some(InnerType::Single(inner))) => {
                    element_index(segment).ok_or_else(not_found)?;
                    &**inner
                }
                (_, None, Some(InnerType::Tuple(items))) => segment
                    .parse::<usize>()
                    .ok()
                    .and_then(|idx| items.get(idx))
                    .ok_or_else(not_found)?,
                (FieldType::Object | FieldType::Array | FieldType::Tuple, None, None) => {
                    return Err(not_found())
                }
                (kind, None, None) => {
                    return Err(LocateError::NotAContainer {
                        name: path.to_string(),
                        segment: segment.to_string(),
                        actual: kind.to_string(),
                    })
                }
            };
        }
        Ok(current.clone())
    }

    fn describe(&self, _options: &DescribeOptions<'_>) -> FieldDescription {
        self.clone()
    }
}
