//! Reference tokens and their resolution against values and context.
//!
//! A constraint parameter is either a literal or a [`Reference`] meaning
//! "read this other value instead". Two kinds exist:
//!
//! - **Stamped** references only carry a key (`{ "type": "ref", "key": "a.b" }`),
//!   as produced when a description is serialized. They are looked up from
//!   the root of the values tree (or the context, for `$`-prefixed keys).
//! - **Computed** references carry a value-producing capability, invoked
//!   with the values, the field's parent value (or the context) and the
//!   context.
//!
//! Resolution never fails: a reference that produces nothing resolves to
//! [`PropValue::Undefined`] and the failure is logged at debug level.

use std::fmt;
use std::sync::Arc;

use serde::{Serialize, Serializer};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ReferenceError;
use crate::types::{Constraints, Param, PropValue};

/// Value-producing capability of a computed reference.
///
/// Called with `(values, root, context)` where `root` is the field's parent
/// value, or the context for context-scoped references.
pub type Getter =
    Arc<dyn Fn(&Value, &Value, Option<&Value>) -> Result<Value, ReferenceError> + Send + Sync>;

static NULL: Value = Value::Null;

/// Where a computed reference reads from, derived from its key prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefScope {
    /// No prefix: relative to the field's parent value.
    Sibling,
    /// `$` prefix: relative to the context.
    Context,
    /// `.` prefix: relative to the root of the values tree.
    Value,
}

impl RefScope {
    /// Split a reference key into its scope and the path within that scope.
    pub fn parse(key: &str) -> (RefScope, &str) {
        if let Some(path) = key.strip_prefix('$') {
            (RefScope::Context, path)
        } else if let Some(path) = key.strip_prefix('.') {
            (RefScope::Value, path)
        } else {
            (RefScope::Sibling, key)
        }
    }
}

/// A reference with a value-producing capability.
#[derive(Clone)]
pub struct ComputedRef {
    key: String,
    path: String,
    scope: RefScope,
    getter: Getter,
}

impl ComputedRef {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn scope(&self) -> RefScope {
        self.scope
    }

    pub fn is_context(&self) -> bool {
        self.scope == RefScope::Context
    }

    pub fn is_value(&self) -> bool {
        self.scope == RefScope::Value
    }

    pub fn is_sibling(&self) -> bool {
        self.scope == RefScope::Sibling
    }

    /// Invoke the value-producing capability.
    pub fn get_value(
        &self,
        values: &Value,
        root: &Value,
        context: Option<&Value>,
    ) -> Result<Value, ReferenceError> {
        (self.getter)(values, root, context)
    }
}

impl fmt::Debug for ComputedRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComputedRef")
            .field("key", &self.key)
            .field("path", &self.path)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

impl PartialEq for ComputedRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key && self.scope == other.scope
    }
}

/// An indirection standing in for a literal constraint parameter.
#[derive(Debug, Clone, PartialEq)]
pub enum Reference {
    Stamped { key: String, path: Option<String> },
    Computed(ComputedRef),
}

impl Reference {
    /// A key-only reference, looked up from the root values.
    pub fn stamped(key: impl Into<String>) -> Self {
        Reference::Stamped {
            key: key.into(),
            path: None,
        }
    }

    /// A computed reference reading `key` from its scope.
    pub fn computed(key: &str) -> Self {
        let (scope, path) = RefScope::parse(key);
        let getter = path_getter(key.to_string(), scope, path.to_string());
        Reference::Computed(ComputedRef {
            key: key.to_string(),
            path: path.to_string(),
            scope,
            getter,
        })
    }

    /// A computed reference with a custom value-producing capability.
    pub fn computed_with<F>(key: &str, getter: F) -> Self
    where
        F: Fn(&Value, &Value, Option<&Value>) -> Result<Value, ReferenceError>
            + Send
            + Sync
            + 'static,
    {
        let (scope, path) = RefScope::parse(key);
        Reference::Computed(ComputedRef {
            key: key.to_string(),
            path: path.to_string(),
            scope,
            getter: Arc::new(getter),
        })
    }

    pub fn key(&self) -> &str {
        match self {
            Reference::Stamped { key, .. } => key,
            Reference::Computed(computed) => computed.key(),
        }
    }

    /// The stamped form of this reference.
    pub fn to_stamped(&self) -> Reference {
        match self {
            Reference::Stamped { .. } => self.clone(),
            Reference::Computed(computed) => Reference::Stamped {
                key: computed.key.clone(),
                path: None,
            },
        }
    }

    pub fn to_json(&self) -> Value {
        json!({ "type": "ref", "key": self.key() })
    }
}

impl Serialize for Reference {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn path_getter(key: String, scope: RefScope, path: String) -> Getter {
    Arc::new(move |values: &Value, root: &Value, context: Option<&Value>| {
        let base = match scope {
            RefScope::Context => context.ok_or_else(|| ReferenceError::MissingContext {
                key: key.clone(),
            })?,
            RefScope::Value => values,
            RefScope::Sibling => root,
        };
        if path.is_empty() {
            return Ok(base.clone());
        }
        get_in(base, &path)
            .cloned()
            .ok_or_else(|| ReferenceError::PathNotFound { path: path.clone() })
    })
}

/// Split a dotted path into segments.
///
/// `a.b[0].c` yields `a`, `b`, `0`, `c`; `tags[]` yields `tags` and an empty
/// segment. Returns `None` for an empty path, an empty dotted segment or an
/// unterminated bracket.
pub(crate) fn path_segments(path: &str) -> Option<Vec<&str>> {
    if path.is_empty() {
        return None;
    }

    let mut segments = Vec::new();
    for part in path.split('.') {
        if part.is_empty() {
            return None;
        }
        let (head, mut rest) = match part.find('[') {
            Some(idx) => part.split_at(idx),
            None => (part, ""),
        };
        if !head.is_empty() {
            segments.push(head);
        }
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            segments.push(&inner[..close]);
            rest = &inner[close + 1..];
        }
    }
    Some(segments)
}

/// Look up a dotted path in a value tree.
///
/// Numeric and bracketed segments index arrays. Returns `None` when any
/// segment is missing.
pub fn get_in<'a>(value: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = value;
    for segment in path_segments(path)? {
        if segment.is_empty() {
            return None;
        }
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Whether references are resolved or passed through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    /// Resolve references against values and context.
    Resolve,
    /// Keep references as [`PropValue::Reference`].
    Literal,
}

/// Inputs for resolving the parameters of one field.
#[derive(Debug, Clone, Copy)]
pub struct ResolveScope<'a> {
    pub values: &'a Value,
    /// Dotted name of the field whose parameters are resolved.
    pub name: &'a str,
    pub context: Option<&'a Value>,
    pub mode: Resolution,
}

impl<'a> ResolveScope<'a> {
    pub fn new(values: &'a Value, name: &'a str, context: Option<&'a Value>) -> Self {
        Self {
            values,
            name,
            context,
            mode: Resolution::Resolve,
        }
    }

    /// A scope that passes references through unresolved.
    pub fn literal(name: &'a str) -> Self {
        Self {
            values: &NULL,
            name,
            context: None,
            mode: Resolution::Literal,
        }
    }

    /// The same scope for another field name.
    pub fn with_name<'b>(&self, name: &'b str) -> ResolveScope<'b>
    where
        'a: 'b,
    {
        ResolveScope {
            values: self.values,
            name,
            context: self.context,
            mode: self.mode,
        }
    }

    /// Value of the field's parent: the name minus its last segment.
    pub fn parent(&self) -> Option<&'a Value> {
        match self.name.rsplit_once('.') {
            Some((parent_path, _)) if !parent_path.is_empty() => get_in(self.values, parent_path),
            _ => Some(self.values),
        }
    }
}

/// Resolve a parameter to a concrete value.
///
/// Non-reference parameters are returned as they are.
pub fn resolve_ref(param: &Param, scope: &ResolveScope<'_>) -> PropValue {
    match param {
        Param::Ref(reference) if scope.mode == Resolution::Resolve => {
            resolve_reference(reference, scope)
        }
        other => PropValue::from_param(other),
    }
}

fn resolve_reference(reference: &Reference, scope: &ResolveScope<'_>) -> PropValue {
    let result = match reference {
        Reference::Computed(computed) => {
            let root = if computed.is_context() {
                scope.context.unwrap_or(&NULL)
            } else {
                scope.parent().unwrap_or(&NULL)
            };
            computed.get_value(scope.values, root, scope.context)
        }
        Reference::Stamped { key, path } => {
            let target = path.as_deref().filter(|p| !p.is_empty()).unwrap_or(key);
            lookup_stamped(target, scope)
        }
    };

    match result {
        Ok(value) => PropValue::Json(value),
        Err(err) => {
            debug!(
                field = scope.name,
                reference = reference.key(),
                error = %err,
                "reference resolved to undefined"
            );
            PropValue::Undefined
        }
    }
}

fn lookup_stamped(target: &str, scope: &ResolveScope<'_>) -> Result<Value, ReferenceError> {
    let (root, path) = match target.strip_prefix('$') {
        Some(path) => (
            scope.context.ok_or_else(|| ReferenceError::MissingContext {
                key: target.to_string(),
            })?,
            path,
        ),
        None => (scope.values, target),
    };
    get_in(root, path)
        .cloned()
        .ok_or_else(|| ReferenceError::PathNotFound {
            path: target.to_string(),
        })
}

/// Runtime type check applied to a resolved extractor parameter.
#[derive(Clone, Copy)]
pub enum TypeCheck {
    Any,
    /// Matches [`PropValue::type_name`], e.g. `"number"` or `"boolean"`.
    Named(&'static str),
    Predicate(fn(&PropValue) -> bool),
}

impl fmt::Debug for TypeCheck {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeCheck::Any => f.write_str("Any"),
            TypeCheck::Named(name) => f.debug_tuple("Named").field(name).finish(),
            TypeCheck::Predicate(_) => f.write_str("Predicate(..)"),
        }
    }
}

impl TypeCheck {
    pub fn accepts(&self, value: &PropValue) -> bool {
        match self {
            TypeCheck::Any => true,
            TypeCheck::Named(name) => value.type_name() == *name,
            TypeCheck::Predicate(check) => check(value),
        }
    }
}

/// Resolve an extractor parameter into a single-key contribution.
///
/// Absent parameters, parameters resolving to undefined and values failing
/// `check` all yield an empty contribution. `convert` runs after the check.
pub fn resolve_for_extractor(
    param: Option<&Param>,
    scope: &ResolveScope<'_>,
    key: &str,
    check: TypeCheck,
    convert: Option<fn(PropValue) -> PropValue>,
) -> Constraints {
    let mut contribution = Constraints::new();
    let Some(param) = param else {
        return contribution;
    };

    let resolved = resolve_ref(param, scope);
    if resolved.is_undefined() {
        return contribution;
    }
    if !check.accepts(&resolved) {
        debug!(
            field = scope.name,
            key,
            actual = resolved.type_name(),
            "parameter failed type check"
        );
        return contribution;
    }

    let value = match convert {
        Some(convert) => convert(resolved),
        None => resolved,
    };
    contribution.insert(key.to_string(), value);
    contribution
}
