//! Projection plan from `include`/`exclude`/`fileId` parameters.

use super::{keys, QueryOptions};
use crate::{
    codec::{source_entry, variant},
    storage::{FieldProjection, Filter, Projection},
};

/// Build the projection of variant documents for `options`.
///
/// Field names are data model names (`chromosome`, `sourceEntries`, ...) and are mapped
/// to their stored short names; unknown names are logged and ignored.
pub fn build_projection(options: &QueryOptions) -> Projection {
    let mut projection = Projection::default();

    let include = options.get_list(keys::INCLUDE);
    if !include.is_empty() {
        for field in &include {
            match variant::short_name(field) {
                Some(short) => projection = projection.include(short),
                None => tracing::warn!("unknown include field: {}", field),
            }
        }
    } else {
        for (_, short) in variant::FIELDS {
            projection = projection.include(short);
        }
        for field in options.get_list(keys::EXCLUDE) {
            match variant::short_name(&field) {
                Some(short) => {
                    projection.fields.shift_remove(short);
                }
                None => tracing::warn!("unknown exclude field: {}", field),
            }
        }
    }

    if let Some(file_id) = options.get_str(keys::FILE_ID) {
        if projection.contains(variant::FILES_FIELD) {
            projection.fields.insert(
                variant::FILES_FIELD.to_string(),
                FieldProjection::ElemMatch(Filter::eq(source_entry::FILE_ID_FIELD, file_id)),
            );
        }
    }

    tracing::debug!("projection: {:?}", &projection);
    projection
}
