//! Field property assembly.
//!
//! A [`FieldProps`] bag flattens a field description into what form code
//! needs to render hints: type, required and nullable flags, enumerations,
//! and every constraint recognized by the type's extractor. Tests that no
//! extractor recognizes are carried through under their own name.

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::PropsError;
use crate::extractors::extractor_for;
use crate::locator::{locate, locate_by_path, locate_in_description};
use crate::reference::{resolve_ref, ResolveScope};
use crate::schema::Schema;
use crate::types::{
    Constraints, FieldDescription, FieldQuery, FieldType, Param, PropValue, TestDescription,
};

/// Keys always present on a bag. Custom tests never take these names.
const BASE_KEYS: &[&str] = &[
    "type",
    "required",
    "nullable",
    "oneOf",
    "notOneOf",
    "default",
    "description",
    "tests",
];

/// Property bag for one field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldProps {
    #[serde(rename = "type")]
    pub kind: FieldType,
    pub required: bool,
    pub nullable: bool,
    pub one_of: Vec<PropValue>,
    pub not_one_of: Vec<PropValue>,
    /// Omitted when the default resolves to nothing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<PropValue>,
    /// The description the bag was built from.
    pub description: FieldDescription,
    pub tests: Vec<TestDescription>,
    /// Extracted constraints and custom tests, keyed by name.
    #[serde(flatten)]
    pub constraints: Constraints,
    /// Element bag of an array field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub of: Option<Box<FieldProps>>,
}

impl FieldProps {
    /// The unconstrained "mixed" bag used when a field cannot be described.
    pub fn fallback() -> Self {
        Self::base(&FieldDescription::mixed())
    }

    fn base(description: &FieldDescription) -> Self {
        Self {
            kind: description.kind.clone(),
            required: !description.optional,
            nullable: description.nullable,
            one_of: Vec::new(),
            not_one_of: Vec::new(),
            default: None,
            description: description.clone(),
            tests: description.tests.clone(),
            constraints: Constraints::new(),
            of: None,
        }
    }

    /// Whether the bag already has a property named `key`.
    pub fn contains_key(&self, key: &str) -> bool {
        BASE_KEYS.contains(&key)
            || (key == "of" && self.of.is_some())
            || self.constraints.contains_key(key)
    }

    /// A constraint or custom test value.
    pub fn get(&self, key: &str) -> Option<&PropValue> {
        self.constraints.get(key)
    }

    /// A numeric constraint such as `min` or `lessThan`.
    pub fn number(&self, key: &str) -> Option<f64> {
        self.get(key).and_then(PropValue::as_f64)
    }

    /// Whether a flag constraint such as `email` or `integer` is set.
    pub fn flag(&self, key: &str) -> bool {
        self.get(key).and_then(PropValue::as_bool).unwrap_or(false)
    }
}

/// Assemble the bag for a located description.
///
/// A missing description, or a failure while assembling, yields
/// [`FieldProps::fallback`] unless `query.strict` is set.
pub fn field_props_from_description(
    description: Option<&FieldDescription>,
    query: &FieldQuery<'_>,
) -> Result<FieldProps, PropsError> {
    let Some(description) = description else {
        if query.strict {
            return Err(PropsError::MissingDescription {
                name: query.name.to_string(),
            });
        }
        warn!(field = query.name, "no field description, using fallback props");
        return Ok(FieldProps::fallback());
    };

    match assemble(description, &query.scope()) {
        Ok(props) => Ok(props),
        Err(err) if query.strict => Err(err),
        Err(err) => {
            warn!(field = query.name, error = %err, "field props assembly failed, using fallback props");
            Ok(FieldProps::fallback())
        }
    }
}

/// Locate the field named by `query.name` and assemble its bag.
pub fn field_props<S: Schema>(schema: &S, query: &FieldQuery<'_>) -> Result<FieldProps, PropsError> {
    match locate(schema, query)? {
        Some(description) => field_props_from_description(Some(&description), query),
        None => {
            // `locate` already warned about the missing field.
            debug!(field = query.name, "using fallback props");
            Ok(FieldProps::fallback())
        }
    }
}

fn assemble(
    description: &FieldDescription,
    scope: &ResolveScope<'_>,
) -> Result<FieldProps, PropsError> {
    let resolve = |param: &Param| resolve_ref(param, scope);

    let mut props = FieldProps::base(description);
    props.one_of = description.one_of.iter().map(resolve).collect();
    props.not_one_of = description.not_one_of.iter().map(resolve).collect();
    props.default = description
        .default
        .as_ref()
        .map(resolve)
        .filter(|value| !value.is_undefined());

    let Some(extract) = extractor_for(&description.kind) else {
        return Ok(props);
    };

    let mut custom = Vec::new();
    for test in &description.tests {
        let Some(name) = test.name.as_deref() else {
            continue;
        };
        match extract(test, scope)? {
            Some(contribution) => props.constraints.extend(contribution),
            None => custom.push((name, test)),
        }
    }

    for (name, test) in custom {
        if props.contains_key(name) {
            debug!(field = scope.name, test = name, "custom test collides with an existing prop");
            continue;
        }
        let value = custom_params(test, scope);
        let value = if value.is_nullish() {
            PropValue::from(true)
        } else {
            value
        };
        props.constraints.insert(name.to_string(), value);
    }

    if description.kind == FieldType::Array {
        if let Some(inner) = description.inner() {
            let element_name = format!("{}[]", scope.name);
            let of = assemble(inner, &scope.with_name(&element_name))?;
            props.constraints.remove("of");
            props.of = Some(Box::new(of));
        }
    }

    Ok(props)
}

/// Parameters of a custom test, with record entries resolved one by one.
fn custom_params(test: &TestDescription, scope: &ResolveScope<'_>) -> PropValue {
    match &test.params {
        Some(Param::Record(record)) => PropValue::Record(
            record
                .iter()
                .map(|(key, param)| (key.clone(), resolve_ref(param, scope)))
                .collect(),
        ),
        Some(param) => resolve_ref(param, scope),
        None => PropValue::Undefined,
    }
}

/// Assemble a bag without resolving references.
///
/// For callers holding only a precomputed description. References stay as
/// [`PropValue::Reference`]; extractor parameters that are references fail
/// their type check and are left out. Never fails: problems degrade to the
/// fallback bag.
pub fn props_from_description(description: Option<&FieldDescription>) -> FieldProps {
    literal_props("", description)
}

/// Literal bag for the field named `name` in a description tree.
pub fn props_from_name_and_description(name: &str, description: &FieldDescription) -> FieldProps {
    literal_props(name, locate_in_description(name, description))
}

/// Literal bag for the field at a `fields`-interleaved description path.
pub fn props_from_path_and_description(path: &str, description: &FieldDescription) -> FieldProps {
    literal_props(path, locate_by_path(path, description))
}

fn literal_props(name: &str, description: Option<&FieldDescription>) -> FieldProps {
    let Some(description) = description else {
        warn!(field = name, "no field description, using fallback props");
        return FieldProps::fallback();
    };

    assemble(description, &ResolveScope::literal(name)).unwrap_or_else(|err| {
        warn!(field = name, error = %err, "field props assembly failed, using fallback props");
        FieldProps::fallback()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;
    use crate::schema::{DescribeOptions, SchemaNode};
    use crate::types::Pattern;
    use serde_json::{json, Value};

    fn described(schema: SchemaNode) -> FieldDescription {
        schema.describe(&DescribeOptions::default())
    }

    #[test]
    fn fallback_bag_is_mixed_and_unconstrained() {
        let props = FieldProps::fallback();
        assert_eq!(props.kind, FieldType::Mixed);
        assert!(!props.required);
        assert!(!props.nullable);
        assert!(props.one_of.is_empty());
        assert!(props.tests.is_empty());
        assert_eq!(props.default, None);
        assert_eq!(props.description, FieldDescription::mixed());
    }

    #[test]
    fn required_mirrors_optional() {
        let props = props_from_description(Some(&described(SchemaNode::string().required())));
        assert!(props.required);
        let props = props_from_description(Some(&described(SchemaNode::string())));
        assert!(!props.required);
    }

    #[test]
    fn number_bounds_inclusive_and_exclusive() {
        let values = json!({});
        let query = FieldQuery::new("age", &values);

        let description = described(SchemaNode::number().min(18i64));
        let props = field_props_from_description(Some(&description), &query).unwrap();
        assert_eq!(props.number("min"), Some(18.0));
        assert_eq!(props.get("moreThan"), None);

        let description = described(SchemaNode::number().more_than(18i64));
        let props = field_props_from_description(Some(&description), &query).unwrap();
        assert_eq!(props.number("moreThan"), Some(18.0));
        assert_eq!(props.get("min"), None);
    }

    #[test]
    fn custom_test_collision_keeps_recognized_constraint() {
        let description = described(
            SchemaNode::number()
                .more_than(5i64)
                .test("moreThan", Some(Param::from(99i64)))
                .test("step", Some(Param::from(2i64))),
        );
        let props = props_from_description(Some(&description));
        assert_eq!(props.number("moreThan"), Some(5.0));
        assert_eq!(props.number("step"), Some(2.0));
    }

    #[test]
    fn custom_test_on_string_with_base_key_name_is_dropped() {
        let description = described(
            SchemaNode::string().test("required", Some(Param::from("no"))),
        );
        let props = props_from_description(Some(&description));
        assert!(props.get("required").is_none());
        assert!(!props.required);
    }

    #[test]
    fn custom_test_without_params_is_a_flag() {
        let description = described(SchemaNode::string().test("customTest", None));
        let props = props_from_description(Some(&description));
        assert!(props.flag("customTest"));
    }

    #[test]
    fn custom_test_with_unresolved_scalar_param_is_a_flag() {
        let values = json!({});
        let query = FieldQuery::new("age", &values);
        let description = described(
            SchemaNode::number()
                .test("step", Some(Param::reference("missing")))
                .test("unit", Some(Param::from(Value::Null))),
        );
        let props = field_props_from_description(Some(&description), &query).unwrap();
        assert_eq!(props.get("step"), Some(&PropValue::from(true)));
        assert_eq!(props.get("unit"), Some(&PropValue::from(true)));
    }

    #[test]
    fn custom_test_record_params_resolve_each_entry() {
        let values = json!({ "other": 30 });
        let query = FieldQuery::new("age", &values);
        let description = described(SchemaNode::number().test(
            "isMidpoint",
            Some(Param::record("midpoint", Param::reference("other"))),
        ));
        let props = field_props_from_description(Some(&description), &query).unwrap();
        assert_eq!(
            props.get("isMidpoint"),
            Some(&PropValue::Record(
                [("midpoint".to_string(), PropValue::from(30i64))].into()
            ))
        );
    }

    #[test]
    fn tests_on_types_without_extractor_are_not_merged() {
        let description = described(SchemaNode::boolean().test("customTest", None));
        let props = props_from_description(Some(&description));
        assert!(props.constraints.is_empty());
        assert_eq!(props.tests.len(), 1);
    }

    #[test]
    fn unnamed_tests_are_skipped() {
        let mut description = described(SchemaNode::string());
        description.tests.push(TestDescription::default());
        let props = props_from_description(Some(&description));
        assert!(props.constraints.is_empty());
    }

    #[test]
    fn undefined_default_is_omitted() {
        let values = json!({});
        let query = FieldQuery::new("age", &values);
        let description = described(SchemaNode::number().default(Param::reference("missing")));
        let props = field_props_from_description(Some(&description), &query).unwrap();
        assert_eq!(props.default, None);
        let json = serde_json::to_value(&props).unwrap();
        assert!(json.get("default").is_none());
    }

    #[test]
    fn missing_description_non_strict_and_strict() {
        let values = json!({});
        let query = FieldQuery::new("ghost", &values);
        assert_eq!(
            field_props_from_description(None, &query).unwrap(),
            FieldProps::fallback()
        );
        assert!(matches!(
            field_props_from_description(None, &query.strict(true)),
            Err(PropsError::MissingDescription { .. })
        ));
    }

    #[test]
    fn bad_pattern_follows_strict_policy() {
        let values = json!({});
        let mut description = described(SchemaNode::string().min(1i64));
        description
            .tests
            .push(TestDescription::new("matches", Some(Param::record("regex", "([a-z]"))));

        let query = FieldQuery::new("code", &values);
        assert_eq!(
            field_props_from_description(Some(&description), &query).unwrap(),
            FieldProps::fallback()
        );
        assert!(matches!(
            field_props_from_description(Some(&description), &query.strict(true)),
            Err(PropsError::InvalidPattern { .. })
        ));
        assert_eq!(props_from_description(Some(&description)), FieldProps::fallback());
    }

    #[test]
    fn array_element_bags_nest() {
        let description = described(
            SchemaNode::array(SchemaNode::array(SchemaNode::string().required()).required())
                .min(1i64),
        );
        let props = props_from_description(Some(&description));
        assert_eq!(props.number("min"), Some(1.0));
        let of = props.of.as_deref().unwrap();
        assert_eq!(of.kind, FieldType::Array);
        assert!(of.required);
        let inner = of.of.as_deref().unwrap();
        assert_eq!(inner.kind, FieldType::String);
        assert!(inner.required);
        assert!(inner.of.is_none());
    }

    #[test]
    fn literal_pipeline_keeps_references() {
        let description = described(
            SchemaNode::string()
                .one_of([Param::reference("name"), Param::from("bla")])
                .max(Param::reference("limit")),
        );
        let props = props_from_description(Some(&description));
        assert_eq!(
            props.one_of,
            vec![
                PropValue::Reference(Reference::stamped("name")),
                PropValue::from("bla")
            ]
        );
        assert!(props.get("max").is_none());
    }

    #[test]
    fn literal_lookup_by_name_and_path() {
        let root = described(SchemaNode::object([(
            "nested",
            SchemaNode::object([(
                "code",
                SchemaNode::string().matches(Pattern::new("^[A-Z]+$").unwrap()),
            )]),
        )]));

        let by_name = props_from_name_and_description("nested.code", &root);
        let by_path = props_from_path_and_description("nested.fields.code", &root);
        assert_eq!(by_name, by_path);
        assert_eq!(
            by_name.get("matches").and_then(PropValue::as_pattern).map(Pattern::as_str),
            Some("^[A-Z]+$")
        );

        assert_eq!(
            props_from_name_and_description("nested.missing", &root),
            FieldProps::fallback()
        );
    }

    #[test]
    fn bag_serializes_flat() {
        let description = described(SchemaNode::string().required().min(3i64).email());
        let json = serde_json::to_value(props_from_description(Some(&description))).unwrap();
        assert_eq!(json["type"], json!("string"));
        assert_eq!(json["required"], json!(true));
        assert_eq!(json["min"], json!(3));
        assert_eq!(json["email"], json!(true));
        assert_eq!(json["oneOf"], json!([]));
        assert!(json["description"].is_object());
        assert!(json["tests"].is_array());
    }
}
