//! Field Props
//!
//! Structured, UI-ready constraints for one field of a validation schema.
//!
//! Given a schema, the current form values and an optional context, this
//! library answers "what applies to field X right now": its type, whether it
//! is required or nullable, allowed and disallowed values, and every bound,
//! pattern or format flag its tests carry. Conditional branches and
//! cross-field references are evaluated against the values.
//!
//! # Example
//!
//! ```
//! use field_props::{field_props, FieldQuery, Param, SchemaNode};
//! use serde_json::json;
//!
//! let schema = SchemaNode::object([
//!     ("age", SchemaNode::number().required().min(18i64)),
//!     (
//!         "nickname",
//!         SchemaNode::string().min(3i64).max(Param::reference("$maxNickname")),
//!     ),
//! ]);
//!
//! let values = json!({ "age": 30 });
//! let context = json!({ "maxNickname": 12 });
//!
//! let age = field_props(&schema, &FieldQuery::new("age", &values)).unwrap();
//! assert!(age.required);
//! assert_eq!(age.number("min"), Some(18.0));
//!
//! let query = FieldQuery::new("nickname", &values).context(&context);
//! let nickname = field_props(&schema, &query).unwrap();
//! assert_eq!(nickname.number("max"), Some(12.0));
//! ```
//!
//! # Pipelines
//!
//! | Input | Lookup | References |
//! |-------|--------|------------|
//! | live [`Schema`] + values | [`field_props`] | resolved |
//! | description tree | [`props_from_name_and_description`] | kept as written |
//!
//! Missing fields and assembly failures degrade to the unconstrained
//! "mixed" bag with a warning unless the query is strict.

mod error;
mod extractors;
mod loader;
mod locator;
mod props;
mod reference;
mod schema;
mod types;

pub use error::{LoadError, LocateError, PropsError, ReferenceError};
pub use extractors::{
    extract_array, extract_date, extract_number, extract_string, extractor_for, parse_date,
    Extractor,
};
pub use loader::{load_description, load_description_str, load_values};
pub use locator::{
    description_path_from_name, field_paths_from_name, locate, locate_by_path,
    locate_from_paths, locate_in_description, FieldPaths,
};
pub use props::{
    field_props, field_props_from_description, props_from_description,
    props_from_name_and_description, props_from_path_and_description, FieldProps,
};
pub use reference::{
    get_in, resolve_for_extractor, resolve_ref, ComputedRef, Getter, RefScope, Reference,
    Resolution, ResolveScope, TypeCheck,
};
pub use schema::{Branch, DescribeOptions, Schema, SchemaNode};
pub use types::{
    json_type_name, Constraints, FieldDescription, FieldQuery, FieldType, InnerType, Param,
    Pattern, PropValue, TestDescription, REFERENCE_KEYS,
};
