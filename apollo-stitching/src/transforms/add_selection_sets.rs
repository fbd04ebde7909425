use apollo_compiler::ast;

use super::DelegationContext;
use super::Transform;
use super::visit::Scope;
use super::visit::TypedWalk;
use crate::error::DelegationError;
use crate::stitch::add_selections;
use crate::subschema::SubschemaRequest;

/// Adds the fields merged types and configured resolvers depend on.
///
/// A field returning a merged type gets the selection set of that type; a selection set on a
/// type with configured resolvers gets the fields those resolvers read.
pub(crate) struct AddSelectionSets;

impl Transform for AddSelectionSets {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let stitched = context.stitched_schema();
        let info = stitched.stitching_info();
        if info.merged_types.is_empty() && info.selection_sets_by_field.is_empty() {
            return Ok(request);
        }
        let return_type = context.return_type.inner_named_type();
        let walk = TypedWalk::new(stitched.schema()).with_root_field_type(return_type);
        walk.rewrite_document(
            &mut request.document,
            &mut |walk: &TypedWalk<'_>, scope: Scope<'_>, mut selections: Vec<ast::Selection>| {
                for selection in &mut selections {
                    let ast::Selection::Field(field) = selection else {
                        continue;
                    };
                    if field.selection_set.is_empty() {
                        continue;
                    }
                    let Some(field_type) = walk.field_type(scope, field) else {
                        continue;
                    };
                    if let Some(required) = info.type_selection_set(&field_type) {
                        add_selections(&mut field.make_mut().selection_set, required);
                    }
                }

                if let Some(parent) = scope.parent {
                    let required = selections
                        .iter()
                        .filter_map(|selection| match selection {
                            ast::Selection::Field(field) => {
                                info.field_selection_set(parent, &field.name)
                            }
                            _ => None,
                        })
                        .flatten()
                        .cloned()
                        .collect::<Vec<_>>();
                    add_selections(&mut selections, &required);
                }
                selections
            },
        );
        Ok(request)
    }
}
