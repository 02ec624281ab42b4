//! Field description lookup by dotted name.
//!
//! Two ways to find a field's description:
//!
//! - [`locate`] / [`locate_from_paths`] reach into a live [`Schema`] with the
//!   current values, so conditional branches reflect those values.
//! - [`locate_in_description`] / [`locate_by_path`] walk a precomputed
//!   description tree. No schema is needed, but conditional branches stay as
//!   they were when the tree was described.

use tracing::warn;

use crate::error::LocateError;
use crate::reference::get_in;
use crate::schema::{DescribeOptions, Schema};
use crate::types::{FieldDescription, FieldQuery};

/// A dotted name split into the path of its object and its last segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldPaths<'a> {
    /// Everything before the last segment; empty for top-level fields.
    pub parent_path: &'a str,
    pub value_path: &'a str,
}

pub fn field_paths_from_name(name: &str) -> FieldPaths<'_> {
    match name.rsplit_once('.') {
        Some((parent_path, value_path)) => FieldPaths {
            parent_path,
            value_path,
        },
        None => FieldPaths {
            parent_path: "",
            value_path: name,
        },
    }
}

/// Describe the field named by `query.name`.
///
/// Returns `Ok(None)` when the field cannot be found, unless `query.strict`
/// is set.
pub fn locate<S: Schema>(
    schema: &S,
    query: &FieldQuery<'_>,
) -> Result<Option<FieldDescription>, LocateError> {
    let paths = field_paths_from_name(query.name);
    locate_from_paths(schema, paths.value_path, paths.parent_path, query)
}

/// Like [`locate`], with the name already split.
pub fn locate_from_paths<S: Schema>(
    schema: &S,
    value_path: &str,
    parent_path: &str,
    query: &FieldQuery<'_>,
) -> Result<Option<FieldDescription>, LocateError> {
    match describe_at(schema, value_path, parent_path, query) {
        Ok(description) => Ok(Some(description)),
        Err(err) if query.strict => Err(err),
        Err(err) => {
            warn!(field = query.name, error = %err, "field description not found");
            Ok(None)
        }
    }
}

fn describe_at<S: Schema>(
    schema: &S,
    value_path: &str,
    parent_path: &str,
    query: &FieldQuery<'_>,
) -> Result<FieldDescription, LocateError> {
    let path = if parent_path.is_empty() {
        value_path.to_string()
    } else {
        format!("{}.{}", parent_path, value_path)
    };
    if path.is_empty() {
        return Err(LocateError::EmptyName);
    }

    let parent = if parent_path.is_empty() {
        Some(query.values)
    } else {
        get_in(query.values, parent_path)
    };
    let value = parent.and_then(|parent| get_in(parent, value_path));

    let field_schema = schema.reach(&path, query.values, query.context)?;
    Ok(field_schema.describe(&DescribeOptions {
        value,
        parent,
        context: query.context,
    }))
}

/// Translate a dotted name into a description path.
///
/// `address.street` becomes `address.fields.street`; an element marker
/// `tags[]` becomes `tags.innerType`.
pub fn description_path_from_name(name: &str) -> String {
    name.split('.')
        .map(|segment| {
            let mut base = segment;
            let mut depth = 0;
            while let Some(stripped) = base.strip_suffix("[]") {
                base = stripped;
                depth += 1;
            }
            let mut part = base.to_string();
            for _ in 0..depth {
                part.push_str(".innerType");
            }
            part
        })
        .collect::<Vec<_>>()
        .join(".fields.")
}

/// Walk a description path relative to the root's `fields`.
pub fn locate_by_path<'d>(
    path: &str,
    description: &'d FieldDescription,
) -> Option<&'d FieldDescription> {
    if path.is_empty() {
        return None;
    }

    let mut segments = path.split('.');
    let mut current = description.field(segments.next()?)?;
    while let Some(segment) = segments.next() {
        current = match segment {
            "fields" => current.field(segments.next()?)?,
            "innerType" => current.inner()?,
            _ => return None,
        };
    }
    Some(current)
}

/// Find a field in a precomputed description tree by dotted name.
pub fn locate_in_description<'d>(
    name: &str,
    description: &'d FieldDescription,
) -> Option<&'d FieldDescription> {
    locate_by_path(&description_path_from_name(name), description)
}
