//! Core types for field description lookup and property extraction.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};

use crate::reference::{Reference, ResolveScope};

/// Identity fields carried by a serialized reference class.
pub const REFERENCE_KEYS: &[&str] = &["key", "isContext", "isValue", "isSibling", "path"];

/// Constraint name to resolved value, as contributed by one extractor.
pub type Constraints = BTreeMap<String, PropValue>;

/// Returns the JSON type name for error messages.
pub fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Declared type of a described field.
///
/// Known kinds get exhaustive dispatch; anything else is kept verbatim in
/// [`FieldType::Other`] so extension types survive a round trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum FieldType {
    #[default]
    Mixed,
    String,
    Number,
    Boolean,
    Date,
    Object,
    Array,
    Tuple,
    Other(String),
}

impl FieldType {
    /// Parse a type string. Never fails: unknown names become `Other`.
    pub fn parse(s: &str) -> Self {
        match s {
            "mixed" => FieldType::Mixed,
            "string" => FieldType::String,
            "number" => FieldType::Number,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "object" => FieldType::Object,
            "array" => FieldType::Array,
            "tuple" => FieldType::Tuple,
            other => FieldType::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            FieldType::Mixed => "mixed",
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Object => "object",
            FieldType::Array => "array",
            FieldType::Tuple => "tuple",
            FieldType::Other(name) => name,
        }
    }
}

impl From<String> for FieldType {
    fn from(s: String) -> Self {
        FieldType::parse(&s)
    }
}

impl From<FieldType> for String {
    fn from(kind: FieldType) -> Self {
        kind.as_str().to_string()
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A compiled regular expression, compared by source.
#[derive(Debug, Clone)]
pub struct Pattern(Regex);

impl Pattern {
    /// Compile a pattern from plain source or the delimited `/source/flags` form.
    ///
    /// Flags `i`, `m` and `s` become inline flags; `g`, `u` and `y` carry no
    /// meaning for a single match and are dropped.
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Regex::new(&inline_flags(source)).map(Pattern)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    pub fn regex(&self) -> &Regex {
        &self.0
    }

    pub fn is_match(&self, haystack: &str) -> bool {
        self.0.is_match(haystack)
    }
}

fn inline_flags(source: &str) -> String {
    let delimited = source
        .strip_prefix('/')
        .and_then(|rest| rest.rfind('/').map(|end| (&rest[..end], &rest[end + 1..])));

    match delimited {
        Some((body, flags)) if flags.chars().all(|c| "gimsuy".contains(c)) => {
            let inline: String = flags.chars().filter(|c| "ims".contains(*c)).collect();
            if inline.is_empty() {
                body.to_string()
            } else {
                format!("(?{}){}", inline, body)
            }
        }
        _ => source.to_string(),
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern(regex)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

/// A parameter as reported by a field description: a literal or a reference.
#[derive(Debug, Clone, PartialEq)]
pub enum Param {
    Literal(Value),
    Date(DateTime<Utc>),
    Pattern(Pattern),
    Ref(Reference),
    Record(BTreeMap<String, Param>),
}

impl Param {
    /// A reference to another value, resolved relative to the field's parent
    /// (or the context, for `$`-prefixed keys).
    pub fn reference(key: &str) -> Self {
        Param::Ref(Reference::computed(key))
    }

    /// A single-entry parameter record.
    pub fn record(key: &str, value: impl Into<Param>) -> Self {
        Param::Record(BTreeMap::from([(key.to_string(), value.into())]))
    }

    /// Convert a JSON value, recognizing serialized references.
    ///
    /// An object tagged `"type": "ref"` or carrying every reference identity
    /// field becomes a stamped reference; other objects become records.
    pub fn from_json(value: Value) -> Self {
        match value {
            Value::Object(map) => {
                let tagged = map.get("type").and_then(Value::as_str) == Some("ref");
                let identity = REFERENCE_KEYS.iter().all(|key| map.contains_key(*key));
                if tagged || identity {
                    let key = map.get("key").and_then(Value::as_str).unwrap_or_default();
                    let is_context = map.get("isContext").and_then(Value::as_bool) == Some(true);
                    // Context paths are stored without their `$` prefix.
                    let path = map.get("path").and_then(Value::as_str).map(|path| {
                        if is_context && !path.starts_with('$') {
                            format!("${}", path)
                        } else {
                            path.to_string()
                        }
                    });
                    Param::Ref(Reference::Stamped {
                        key: key.to_string(),
                        path,
                    })
                } else {
                    Param::Record(
                        map.into_iter()
                            .map(|(k, v)| (k, Param::from_json(v)))
                            .collect(),
                    )
                }
            }
            other => Param::Literal(other),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Param::Literal(value) => value.clone(),
            Param::Date(date) => date_to_json(date),
            Param::Pattern(pattern) => Value::String(pattern.as_str().to_string()),
            Param::Ref(reference) => reference.to_json(),
            Param::Record(record) => Value::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }

    /// Entry of a parameter record. `None` for scalar parameters.
    pub fn get(&self, key: &str) -> Option<&Param> {
        match self {
            Param::Record(record) => record.get(key),
            _ => None,
        }
    }

    pub fn as_reference(&self) -> Option<&Reference> {
        match self {
            Param::Ref(reference) => Some(reference),
            _ => None,
        }
    }
}

impl From<Value> for Param {
    fn from(value: Value) -> Self {
        Param::Literal(value)
    }
}

impl From<&str> for Param {
    fn from(s: &str) -> Self {
        Param::Literal(Value::String(s.to_string()))
    }
}

impl From<String> for Param {
    fn from(s: String) -> Self {
        Param::Literal(Value::String(s))
    }
}

impl From<bool> for Param {
    fn from(b: bool) -> Self {
        Param::Literal(Value::Bool(b))
    }
}

impl From<i64> for Param {
    fn from(n: i64) -> Self {
        Param::Literal(Value::from(n))
    }
}

impl From<f64> for Param {
    fn from(n: f64) -> Self {
        Param::Literal(Value::from(n))
    }
}

impl From<DateTime<Utc>> for Param {
    fn from(date: DateTime<Utc>) -> Self {
        Param::Date(date)
    }
}

impl From<Pattern> for Param {
    fn from(pattern: Pattern) -> Self {
        Param::Pattern(pattern)
    }
}

impl From<Reference> for Param {
    fn from(reference: Reference) -> Self {
        Param::Ref(reference)
    }
}

impl Serialize for Param {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Param {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Param::from_json)
    }
}

/// A resolved property value.
///
/// `Undefined` is kept distinct from JSON `null`: it marks a reference that
/// produced nothing. `Reference` only appears in bags built without
/// reference resolution.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum PropValue {
    #[default]
    Undefined,
    Json(Value),
    Date(DateTime<Utc>),
    Pattern(Pattern),
    Reference(Reference),
    Record(BTreeMap<String, PropValue>),
}

impl PropValue {
    /// Convert a parameter without resolving references.
    pub fn from_param(param: &Param) -> Self {
        match param {
            Param::Literal(value) => PropValue::Json(value.clone()),
            Param::Date(date) => PropValue::Date(*date),
            Param::Pattern(pattern) => PropValue::Pattern(pattern.clone()),
            Param::Ref(reference) => PropValue::Reference(reference.clone()),
            Param::Record(record) => PropValue::Record(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), PropValue::from_param(v)))
                    .collect(),
            ),
        }
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, PropValue::Undefined)
    }

    /// `undefined` or JSON `null`.
    pub fn is_nullish(&self) -> bool {
        matches!(self, PropValue::Undefined | PropValue::Json(Value::Null))
    }

    /// Runtime type name used by named type checks.
    pub fn type_name(&self) -> &'static str {
        match self {
            PropValue::Undefined => "undefined",
            PropValue::Json(value) => json_type_name(value),
            PropValue::Date(_) => "date",
            PropValue::Pattern(_) => "pattern",
            PropValue::Reference(_) => "reference",
            PropValue::Record(_) => "object",
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PropValue::Json(value) => value.as_f64(),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropValue::Json(value) => value.as_bool(),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropValue::Json(value) => value.as_str(),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            PropValue::Date(date) => Some(date),
            _ => None,
        }
    }

    pub fn as_pattern(&self) -> Option<&Pattern> {
        match self {
            PropValue::Pattern(pattern) => Some(pattern),
            _ => None,
        }
    }

    /// JSON rendering. `Undefined` renders as `null`.
    pub fn to_json(&self) -> Value {
        match self {
            PropValue::Undefined => Value::Null,
            PropValue::Json(value) => value.clone(),
            PropValue::Date(date) => date_to_json(date),
            PropValue::Pattern(pattern) => Value::String(pattern.as_str().to_string()),
            PropValue::Reference(reference) => reference.to_json(),
            PropValue::Record(record) => Value::Object(
                record
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect::<Map<String, Value>>(),
            ),
        }
    }
}

impl From<Value> for PropValue {
    fn from(value: Value) -> Self {
        PropValue::Json(value)
    }
}

impl From<&str> for PropValue {
    fn from(s: &str) -> Self {
        PropValue::Json(Value::String(s.to_string()))
    }
}

impl From<bool> for PropValue {
    fn from(b: bool) -> Self {
        PropValue::Json(Value::Bool(b))
    }
}

impl From<i64> for PropValue {
    fn from(n: i64) -> Self {
        PropValue::Json(Value::from(n))
    }
}

impl From<f64> for PropValue {
    fn from(n: f64) -> Self {
        PropValue::Json(Value::from(n))
    }
}

impl Serialize for PropValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

fn date_to_json(date: &DateTime<Utc>) -> Value {
    Value::String(date.to_rfc3339_opts(SecondsFormat::Millis, true))
}

/// One applied validation rule as reported by a description.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TestDescription {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Param>,
}

impl TestDescription {
    pub fn new(name: impl Into<String>, params: Option<Param>) -> Self {
        Self {
            name: Some(name.into()),
            params,
        }
    }

    /// Entry `key` of the parameter record, if the parameters are a record.
    pub fn param(&self, key: &str) -> Option<&Param> {
        self.params.as_ref().and_then(|params| params.get(key))
    }
}

/// Element description of a sequence: one shared type, or one per position.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InnerType {
    Tuple(Vec<FieldDescription>),
    Single(Box<FieldDescription>),
}

fn default_optional() -> bool {
    true
}

/// Live description of one schema node, evaluated against concrete values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDescription {
    #[serde(rename = "type", default)]
    pub kind: FieldType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
    #[serde(default = "default_optional")]
    pub optional: bool,
    #[serde(default)]
    pub nullable: bool,
    #[serde(default)]
    pub one_of: Vec<Param>,
    #[serde(default)]
    pub not_one_of: Vec<Param>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<Param>,
    #[serde(default)]
    pub tests: Vec<TestDescription>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<BTreeMap<String, FieldDescription>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub inner_type: Option<InnerType>,
}

impl FieldDescription {
    /// Unconstrained description of a field of the given type.
    pub fn of_type(kind: FieldType) -> Self {
        Self {
            kind,
            label: None,
            optional: true,
            nullable: false,
            one_of: Vec::new(),
            not_one_of: Vec::new(),
            default: None,
            tests: Vec::new(),
            fields: None,
            inner_type: None,
        }
    }

    /// Description of the fallback "any" type.
    pub fn mixed() -> Self {
        Self::of_type(FieldType::Mixed)
    }

    /// Child description of an object node.
    pub fn field(&self, name: &str) -> Option<&FieldDescription> {
        self.fields.as_ref().and_then(|fields| fields.get(name))
    }

    /// Shared element description of an array node. `None` for tuples.
    pub fn inner(&self) -> Option<&FieldDescription> {
        match &self.inner_type {
            Some(InnerType::Single(inner)) => Some(inner),
            _ => None,
        }
    }
}

impl Default for FieldDescription {
    fn default() -> Self {
        Self::mixed()
    }
}

/// Options for a single field lookup.
#[derive(Debug, Clone, Copy)]
pub struct FieldQuery<'a> {
    /// Dotted field name, e.g. `nested.nestedString`.
    pub name: &'a str,
    /// Current values of the whole form.
    pub values: &'a Value,
    /// Side values for `$`-prefixed references.
    pub context: Option<&'a Value>,
    /// When true, a missing field or an assembly failure is returned as an
    /// error instead of degrading to the unconstrained "mixed" props.
    pub strict: bool,
}

impl<'a> FieldQuery<'a> {
    /// Create a non-strict query without context.
    pub fn new(name: &'a str, values: &'a Value) -> Self {
        Self {
            name,
            values,
            context: None,
            strict: false,
        }
    }

    /// Set the context tree.
    pub fn context(mut self, context: &'a Value) -> Self {
        self.context = Some(context);
        self
    }

    /// Set strict mode.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub(crate) fn scope(&self) -> ResolveScope<'a> {
        ResolveScope::new(self.values, self.name, self.context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn field_type_parse_known_and_extension() {
        assert_eq!(FieldType::parse("string"), FieldType::String);
        assert_eq!(FieldType::parse("tuple"), FieldType::Tuple);
        assert_eq!(
            FieldType::parse("money"),
            FieldType::Other("money".to_string())
        );
        assert_eq!(FieldType::Other("money".into()).as_str(), "money");
    }

    #[test]
    fn pattern_accepts_delimited_form() {
        let pattern = Pattern::new("/^[a-z]+$/i").unwrap();
        assert!(pattern.is_match("ABC"));
        assert_eq!(pattern.as_str(), "(?i)^[a-z]+$");

        let plain = Pattern::new("^[a-z]+$").unwrap();
        assert!(!plain.is_match("ABC"));
        assert_eq!(plain, Pattern::new("/^[a-z]+$/g").unwrap());
    }

    #[test]
    fn pattern_rejects_bad_source() {
        assert!(Pattern::new("([a-z]").is_err());
    }

    #[test]
    fn param_from_json_stamped_reference() {
        let param = Param::from_json(json!({ "type": "ref", "key": "a.b" }));
        assert_eq!(param, Param::Ref(Reference::stamped("a.b")));
    }

    #[test]
    fn param_from_json_identity_fields_reference() {
        let param = Param::from_json(json!({
            "key": "$ctx",
            "isContext": true,
            "isValue": false,
            "isSibling": false,
            "path": "ctx"
        }));
        assert_eq!(
            param,
            Param::Ref(Reference::Stamped {
                key: "$ctx".into(),
                path: Some("$ctx".into())
            })
        );
    }

    #[test]
    fn param_from_json_record_and_literal() {
        let param = Param::from_json(json!({ "min": 3 }));
        assert_eq!(param.get("min"), Some(&Param::Literal(json!(3))));
        assert_eq!(Param::from_json(json!(2)), Param::Literal(json!(2)));
        assert_eq!(Param::from_json(json!(2)).get("min"), None);
    }

    #[test]
    fn prop_value_type_names() {
        assert_eq!(PropValue::Undefined.type_name(), "undefined");
        assert_eq!(PropValue::from(3i64).type_name(), "number");
        assert_eq!(PropValue::from("x").type_name(), "string");
        assert_eq!(PropValue::Record(BTreeMap::new()).type_name(), "object");
    }

    #[test]
    fn description_deserializes_with_defaults() {
        let description: FieldDescription = serde_json::from_value(json!({
            "type": "object",
            "fields": {
                "tags": {
                    "type": "array",
                    "optional": false,
                    "innerType": { "type": "string" }
                },
                "pair": {
                    "type": "tuple",
                    "innerType": [{ "type": "string" }, { "type": "number" }]
                }
            }
        }))
        .unwrap();

        assert!(description.optional);
        let tags = description.field("tags").unwrap();
        assert!(!tags.optional);
        assert_eq!(tags.inner().unwrap().kind, FieldType::String);

        let pair = description.field("pair").unwrap();
        assert!(pair.inner().is_none());
        assert!(matches!(pair.inner_type, Some(InnerType::Tuple(ref items)) if items.len() == 2));
    }

    #[test]
    fn description_serializes_type_key() {
        let description = FieldDescription::of_type(FieldType::Number);
        let json = serde_json::to_value(&description).unwrap();
        assert_eq!(json["type"], json!("number"));
        assert_eq!(json["oneOf"], json!([]));
        assert!(json.get("default").is_none());
    }

    #[test]
    fn field_query_builder() {
        let values = json!({ "a": 1 });
        let context = json!({ "c": 2 });
        let query = FieldQuery::new("a", &values).context(&context).strict(true);
        assert!(query.strict);
        assert_eq!(query.context, Some(&context));
    }
}
