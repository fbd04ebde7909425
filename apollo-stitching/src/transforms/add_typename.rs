use apollo_compiler::ast;

use super::DelegationContext;
use super::Transform;
use super::is_typename;
use super::typename_selection;
use super::visit::Scope;
use super::visit::TypedWalk;
use crate::error::DelegationError;
use crate::schema;
use crate::subschema::SubschemaRequest;

/// Requests `__typename` on every selection over an interface or a union.
pub(crate) struct AddTypenameToAbstract;

impl Transform for AddTypenameToAbstract {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        let target = context.target_schema();
        TypedWalk::new(target).rewrite_document(
            &mut request.document,
            &mut |_: &TypedWalk<'_>, scope: Scope<'_>, mut selections: Vec<ast::Selection>| {
                if scope
                    .parent
                    .is_some_and(|parent| schema::is_abstract(target, parent))
                    && !selections.iter().any(is_typename)
                {
                    selections.push(typename_selection());
                }
                selections
            },
        );
        Ok(request)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::stitch::StitchingConfig;
    use crate::stitch::stitch_schemas;
    use crate::subschema::SubschemaId;
    use crate::transforms::tests::reprint;
    use crate::transforms::tests::request;
    use crate::transforms::tests::subschema;

    #[test]
    fn abstract_selections_get_a_typename() {
        let schema = stitch_schemas(StitchingConfig::new().with_subschema(subschema(
            "search",
            r#"
            type Query { search: [Result] node: Node }
            union Result = Book | Movie
            interface Node { id: ID! }
            type Book implements Node { id: ID! title: String }
            type Movie implements Node { id: ID! }
            "#,
        )))
        .unwrap();
        let context = DelegationContext {
            schema,
            subschema: SubschemaId(0),
            field_name: apollo_compiler::name!("search"),
            return_type: ast::Type::Named(apollo_compiler::name!("Result")).list(),
            args: None,
        };
        let request = AddTypenameToAbstract
            .transform_request(
                request("{ search { ... on Book { title } } node { __typename id } }"),
                &context,
            )
            .unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint("{ search { ... on Book { title } __typename } node { __typename id } }")
        );
    }
}
