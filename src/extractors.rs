//! Per-type extraction of named constraints from applied tests.
//!
//! Each extractor maps one test of a field of known type to a contribution:
//!
//! - `Ok(None)` - the test name is not recognized for this type; the
//!   assembler treats the test as custom.
//! - `Ok(Some(empty))` - recognized, but no usable parameter.
//! - `Ok(Some(constraints))` - recognized constraint keys and values.
//!
//! | Type | Test | Keys |
//! |------|------|------|
//! | string | `min` / `max` / `length` | `min` / `max` / `length` |
//! | string | `matches` | `matches` |
//! | string | `email` / `url` / `uuid` / `datetime` | flag `true` |
//! | string | `datetime_offset` | `datetimeAllowOffset` |
//! | string | `datetime_precision` | `datetimePrecision` |
//! | number | `min` (`min` or `more`) | `min` / `moreThan` |
//! | number | `max` (`max` or `less`) | `max` / `lessThan` |
//! | number | `integer` | `integer` |
//! | date | `min` / `max` | `min` / `max` |
//! | array | `min` / `max` / `length` | `min` / `max` / `length` |

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::Value;
use tracing::debug;

use crate::error::PropsError;
use crate::reference::{resolve_for_extractor, resolve_ref, ResolveScope, TypeCheck};
use crate::types::{Constraints, FieldType, Pattern, PropValue, TestDescription};

/// Strategy extracting constraints from one test.
pub type Extractor =
    fn(&TestDescription, &ResolveScope<'_>) -> Result<Option<Constraints>, PropsError>;

const NUMBER: TypeCheck = TypeCheck::Predicate(is_valid_number);

/// Extractor for a declared field type. `None` means every test on such a
/// field is custom.
pub fn extractor_for(kind: &FieldType) -> Option<Extractor> {
    match kind {
        FieldType::String => Some(extract_string),
        FieldType::Number => Some(extract_number),
        FieldType::Date => Some(extract_date),
        FieldType::Array => Some(extract_array),
        FieldType::Mixed
        | FieldType::Boolean
        | FieldType::Object
        | FieldType::Tuple
        | FieldType::Other(_) => None,
    }
}

fn is_valid_number(value: &PropValue) -> bool {
    value.as_f64().map_or(false, f64::is_finite)
}

fn flag(key: &str) -> Constraints {
    Constraints::from([(key.to_string(), PropValue::from(true))])
}

fn numeric(test: &TestDescription, scope: &ResolveScope<'_>, name: &str) -> Constraints {
    resolve_for_extractor(test.param(name), scope, name, NUMBER, None)
}

/// Constraints of a string field.
pub fn extract_string(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
) -> Result<Option<Constraints>, PropsError> {
    let Some(name) = test.name.as_deref() else {
        return Ok(None);
    };

    let constraints = match name {
        "min" | "max" | "length" => numeric(test, scope, name),
        "matches" => extract_pattern(test, scope)?,
        "email" | "url" | "uuid" | "datetime" => flag(name),
        "datetime_offset" => resolve_for_extractor(
            test.param("allowOffset"),
            scope,
            "datetimeAllowOffset",
            TypeCheck::Named("boolean"),
            None,
        ),
        "datetime_precision" => resolve_for_extractor(
            test.param("precision"),
            scope,
            "datetimePrecision",
            NUMBER,
            None,
        ),
        _ => return Ok(None),
    };
    Ok(Some(constraints))
}

fn extract_pattern(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
) -> Result<Constraints, PropsError> {
    let mut constraints = Constraints::new();
    let Some(param) = test.param("regex") else {
        return Ok(constraints);
    };

    let pattern = match resolve_ref(param, scope) {
        PropValue::Pattern(pattern) => pattern,
        PropValue::Json(Value::String(text)) => {
            Pattern::new(&text).map_err(|source| PropsError::InvalidPattern {
                name: scope.name.to_string(),
                pattern: text.clone(),
                source,
            })?
        }
        other => {
            debug!(
                field = scope.name,
                actual = other.type_name(),
                "matches parameter is not a pattern"
            );
            return Ok(constraints);
        }
    };
    constraints.insert("matches".to_string(), PropValue::Pattern(pattern));
    Ok(constraints)
}

/// Constraints of a number field.
///
/// `min` and `max` tests carry either an inclusive (`min`, `max`) or an
/// exclusive (`more`, `less`) parameter; the parameter name decides the key.
pub fn extract_number(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
) -> Result<Option<Constraints>, PropsError> {
    let Some(name) = test.name.as_deref() else {
        return Ok(None);
    };

    let constraints = match name {
        "min" => bound(test, scope, ("min", "min"), ("more", "moreThan")),
        "max" => bound(test, scope, ("max", "max"), ("less", "lessThan")),
        "integer" => flag("integer"),
        _ => return Ok(None),
    };
    Ok(Some(constraints))
}

fn bound(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
    inclusive: (&str, &str),
    exclusive: (&str, &str),
) -> Constraints {
    if let Some(param) = test.param(inclusive.0) {
        resolve_for_extractor(Some(param), scope, inclusive.1, NUMBER, None)
    } else if let Some(param) = test.param(exclusive.0) {
        resolve_for_extractor(Some(param), scope, exclusive.1, NUMBER, None)
    } else {
        Constraints::new()
    }
}

/// Constraints of a date field.
pub fn extract_date(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
) -> Result<Option<Constraints>, PropsError> {
    match test.name.as_deref() {
        Some(name @ ("min" | "max")) => Ok(Some(resolve_for_extractor(
            test.param(name),
            scope,
            name,
            TypeCheck::Predicate(is_date_like),
            Some(into_date),
        ))),
        _ => Ok(None),
    }
}

/// Constraints of an array field.
pub fn extract_array(
    test: &TestDescription,
    scope: &ResolveScope<'_>,
) -> Result<Option<Constraints>, PropsError> {
    match test.name.as_deref() {
        Some(name @ ("min" | "max" | "length")) => Ok(Some(numeric(test, scope, name))),
        _ => Ok(None),
    }
}

fn is_date_like(value: &PropValue) -> bool {
    parse_date(value).is_some()
}

fn into_date(value: PropValue) -> PropValue {
    parse_date(&value).map_or(PropValue::Undefined, PropValue::Date)
}

/// Interpret a resolved value as a date.
///
/// Accepts dates, RFC 3339 strings, `YYYY-MM-DD` and `YYYY-MM-DDTHH:MM:SS`
/// strings (read as UTC), and millisecond timestamps.
pub fn parse_date(value: &PropValue) -> Option<DateTime<Utc>> {
    match value {
        PropValue::Date(date) => Some(*date),
        PropValue::Json(Value::String(s)) => parse_date_str(s),
        PropValue::Json(Value::Number(n)) => {
            let millis = n.as_i64().or_else(|| n.as_f64().map(|f| f as i64))?;
            Utc.timestamp_millis_opt(millis).single()
        }
        _ => None,
    }
}

fn parse_date_str(s: &str) -> Option<DateTime<Utc>> {
    if let Ok(date) = DateTime::parse_from_rfc3339(s) {
        return Some(date.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reference::Reference;
    use crate::types::Param;
    use serde_json::json;

    fn test(name: &str, params: Option<Param>) -> TestDescription {
        TestDescription::new(name, params)
    }

    fn run(
        extractor: Extractor,
        test: &TestDescription,
        values: &Value,
    ) -> Option<Constraints> {
        let scope = ResolveScope::new(values, "field", None);
        extractor(test, &scope).unwrap()
    }

    #[test]
    fn dispatch_by_type() {
        assert!(extractor_for(&FieldType::String).is_some());
        assert!(extractor_for(&FieldType::Number).is_some());
        assert!(extractor_for(&FieldType::Date).is_some());
        assert!(extractor_for(&FieldType::Array).is_some());
        assert!(extractor_for(&FieldType::Boolean).is_none());
        assert!(extractor_for(&FieldType::Mixed).is_none());
        assert!(extractor_for(&FieldType::Other("money".into())).is_none());
    }

    #[test]
    fn string_bounds() {
        let values = json!({});
        let result = run(extract_string, &test("min", Some(Param::record("min", 3i64))), &values);
        assert_eq!(result.unwrap().get("min"), Some(&PropValue::from(3i64)));

        let result = run(
            extract_string,
            &test("length", Some(Param::record("length", 10i64))),
            &values,
        );
        assert_eq!(result.unwrap().get("length"), Some(&PropValue::from(10i64)));
    }

    #[test]
    fn string_bound_rejects_non_number() {
        let values = json!({});
        let result = run(
            extract_string,
            &test("max", Some(Param::record("max", "fifty"))),
            &values,
        );
        assert_eq!(result, Some(Constraints::new()));
    }

    #[test]
    fn string_flags() {
        let values = json!({});
        for name in ["email", "url", "uuid", "datetime"] {
            let result = run(extract_string, &test(name, None), &values).unwrap();
            assert_eq!(result.get(name), Some(&PropValue::from(true)));
        }
    }

    #[test]
    fn string_matches_pattern_and_source() {
        let values = json!({});
        let pattern = Pattern::new("^[a-zA-Z]+$").unwrap();
        let result = run(
            extract_string,
            &test("matches", Some(Param::record("regex", pattern.clone()))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("matches"), Some(&PropValue::Pattern(pattern.clone())));

        let result = run(
            extract_string,
            &test("matches", Some(Param::record("regex", "/^[a-zA-Z]+$/"))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("matches"), Some(&PropValue::Pattern(pattern)));
    }

    #[test]
    fn string_matches_invalid_source_errors() {
        let values = json!({});
        let scope = ResolveScope::new(&values, "field", None);
        let result = extract_string(
            &test("matches", Some(Param::record("regex", "([a-z]"))),
            &scope,
        );
        assert!(matches!(result, Err(PropsError::InvalidPattern { .. })));
    }

    #[test]
    fn string_datetime_options() {
        let values = json!({});
        let result = run(
            extract_string,
            &test("datetime_offset", Some(Param::record("allowOffset", true))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("datetimeAllowOffset"), Some(&PropValue::from(true)));

        let result = run(
            extract_string,
            &test("datetime_precision", Some(Param::record("precision", 2i64))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("datetimePrecision"), Some(&PropValue::from(2i64)));
    }

    #[test]
    fn string_unrecognized_is_none() {
        let values = json!({});
        assert_eq!(run(extract_string, &test("customTest", None), &values), None);
        assert_eq!(run(extract_string, &TestDescription::default(), &values), None);
    }

    #[test]
    fn number_inclusive_and_exclusive() {
        let values = json!({});
        let result = run(extract_number, &test("min", Some(Param::record("min", 18i64))), &values);
        assert_eq!(result.unwrap().get("min"), Some(&PropValue::from(18i64)));

        let result = run(extract_number, &test("min", Some(Param::record("more", 18i64))), &values)
            .unwrap();
        assert_eq!(result.get("moreThan"), Some(&PropValue::from(18i64)));
        assert!(result.get("min").is_none());

        let result = run(extract_number, &test("max", Some(Param::record("less", 65i64))), &values)
            .unwrap();
        assert_eq!(result.get("lessThan"), Some(&PropValue::from(65i64)));

        let result = run(extract_number, &test("max", None), &values);
        assert_eq!(result, Some(Constraints::new()));
    }

    #[test]
    fn number_integer_flag() {
        let values = json!({});
        let result = run(extract_number, &test("integer", None), &values).unwrap();
        assert_eq!(result.get("integer"), Some(&PropValue::from(true)));
    }

    #[test]
    fn number_bound_from_reference() {
        let values = json!({ "limit": 12 });
        let result = run(
            extract_number,
            &test("max", Some(Param::record("max", Reference::stamped("limit")))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("max"), Some(&PropValue::from(12i64)));
    }

    #[test]
    fn date_bounds_parse_values() {
        let values = json!({ "start": "2000-01-01" });
        let expected = Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).unwrap();

        let result = run(
            extract_date,
            &test("min", Some(Param::record("min", Reference::stamped("start")))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("min"), Some(&PropValue::Date(expected)));

        let result = run(
            extract_date,
            &test("max", Some(Param::record("max", expected))),
            &values,
        )
        .unwrap();
        assert_eq!(result.get("max"), Some(&PropValue::Date(expected)));
    }

    #[test]
    fn date_invalid_value_suppresses_key() {
        let values = json!({});
        let result = run(
            extract_date,
            &test("min", Some(Param::record("min", "not a date"))),
            &values,
        );
        assert_eq!(result, Some(Constraints::new()));
        assert_eq!(run(extract_date, &test("customTest", None), &values), None);
    }

    #[test]
    fn parse_date_formats() {
        let expected = Utc.with_ymd_and_hms(2020, 12, 31, 0, 0, 0).unwrap();
        assert_eq!(parse_date(&PropValue::from("2020-12-31")), Some(expected));
        assert_eq!(
            parse_date(&PropValue::from("2020-12-31T00:00:00.000Z")),
            Some(expected)
        );
        assert_eq!(
            parse_date(&PropValue::from(expected.timestamp_millis())),
            Some(expected)
        );
        assert_eq!(parse_date(&PropValue::from(true)), None);
    }

    #[test]
    fn array_bounds() {
        let values = json!({});
        for name in ["min", "max", "length"] {
            let result = run(extract_array, &test(name, Some(Param::record(name, 2i64))), &values)
                .unwrap();
            assert_eq!(result.get(name), Some(&PropValue::from(2i64)));
        }
        assert_eq!(run(extract_array, &test("customTest", None), &values), None);
    }
}
