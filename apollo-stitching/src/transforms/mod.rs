//! Transforms rewrite a subschema as the stitched schema sees it, and rewrite each delegated
//! request and its result to match.
//!
//! A delegated request runs through a pipeline of transforms, each one moving the document a
//! step closer to what the target subschema accepts:
//!
//! 1. [`AddSelectionSets`]: fields required by merged types and configured resolvers
//! 2. [`ExpandAbstractTypes`]: fragments on types the subschema only knows as objects
//! 3. transforms passed to the delegation, then the subschema transforms, last one first
//! 4. [`AddArgumentsAsVariables`]: explicit arguments of the delegation
//! 5. [`FilterToSchema`]: whatever the subschema does not know
//! 6. [`AddTypenameToAbstract`]: `__typename` on abstract selections
//!
//! Results come back through the same pipeline in reverse.

mod add_arguments;
mod add_selection_sets;
mod add_typename;
mod expand_abstract_types;
mod filter;
mod filter_to_schema;
mod rename_root_fields;
mod rename_types;
mod visit;
mod wrap_query;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::name;
use apollo_compiler::validation::Valid;

pub(crate) use self::add_arguments::AddArgumentsAsVariables;
pub(crate) use self::add_selection_sets::AddSelectionSets;
pub(crate) use self::add_typename::AddTypenameToAbstract;
pub(crate) use self::expand_abstract_types::ExpandAbstractTypes;
pub use self::filter::FilterRootFields;
pub use self::filter::FilterTypes;
pub(crate) use self::filter_to_schema::FilterToSchema;
pub use self::rename_root_fields::RenameRootFields;
pub use self::rename_types::RenameTypes;
pub use self::wrap_query::WrapQuery;
use crate::error::DelegationError;
use crate::error::StitchingError;
use crate::execution::StitchedSchema;
use crate::graphql;
use crate::json_ext::Object;
use crate::stitch::SubschemaEntry;
use crate::subschema::Subschema;
use crate::subschema::SubschemaId;
use crate::subschema::SubschemaRequest;

/// A rewrite of a subschema, its requests and their results.
///
/// Every hook defaults to leaving its input unchanged.
pub trait Transform: Send + Sync {
    /// Rewrites the schema of the subschema, as seen by the stitched schema.
    fn transform_schema(&self, schema: Schema) -> Result<Schema, StitchingError> {
        Ok(schema)
    }

    /// Rewrites a request on its way to the subschema.
    fn transform_request(
        &self,
        request: SubschemaRequest,
        _context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        Ok(request)
    }

    /// Rewrites a response on its way back from the subschema.
    fn transform_result(
        &self,
        response: graphql::Response,
        _context: &DelegationContext,
    ) -> graphql::Response {
        response
    }
}

/// One delegation, as transforms see it.
#[derive(Clone)]
pub struct DelegationContext {
    pub(crate) schema: StitchedSchema,
    pub(crate) subschema: SubschemaId,
    pub(crate) field_name: Name,
    pub(crate) return_type: ast::Type,
    pub(crate) args: Option<Object>,
}

impl DelegationContext {
    pub(crate) fn entry(&self) -> &SubschemaEntry {
        self.schema.stitching_info().subschema(self.subschema)
    }

    pub fn subschema(&self) -> &Subschema {
        self.entry().subschema()
    }

    pub fn subschema_id(&self) -> SubschemaId {
        self.subschema
    }

    /// The schema of the subschema, before its transforms.
    pub fn target_schema(&self) -> &Valid<Schema> {
        self.subschema().schema()
    }

    /// The schema of the subschema, after its transforms.
    pub fn transformed_schema(&self) -> &Valid<Schema> {
        self.entry().transformed_schema()
    }

    pub fn stitched_schema(&self) -> &StitchedSchema {
        &self.schema
    }

    /// The root field targeted in the subschema, as named in the stitched schema.
    pub fn field_name(&self) -> &Name {
        &self.field_name
    }

    /// The type of the delegated field in the stitched schema.
    pub fn return_type(&self) -> &ast::Type {
        &self.return_type
    }

    /// Arguments set explicitly for the delegation.
    pub fn args(&self) -> Option<&Object> {
        self.args.as_ref()
    }
}

pub(crate) fn typename_selection() -> ast::Selection {
    ast::Selection::Field(Node::new(ast::Field {
        alias: None,
        name: name!("__typename"),
        arguments: Vec::new(),
        directives: ast::DirectiveList::default(),
        selection_set: Vec::new(),
    }))
}

pub(crate) fn is_typename(selection: &ast::Selection) -> bool {
    matches!(
        selection,
        ast::Selection::Field(field) if field.alias.is_none() && field.name.as_str() == "__typename"
    )
}

#[cfg(test)]
pub(crate) mod tests {
    use apollo_compiler::Schema;
    use apollo_compiler::name;

    use super::*;
    use crate::context::Context;
    use crate::schema::OperationKind;
    use crate::stitch::StitchingConfig;
    use crate::stitch::stitch_schemas;
    use crate::subschema::MergedTypeConfig;

    pub(crate) fn subschema(name: &str, sdl: &str) -> Subschema {
        Subschema::new(
            name,
            Schema::parse_and_validate(sdl, format!("{name}.graphql")).unwrap(),
        )
    }

    pub(crate) fn products() -> Subschema {
        subschema(
            "products",
            r#"
            type Query { topProducts(first: Int = 5): [Product] }
            type Product { upc: String! name: String }
            "#,
        )
    }

    pub(crate) fn inventory() -> Subschema {
        subschema(
            "inventory",
            r#"
            schema { query: InventoryQuery }
            type InventoryQuery { productByUpc(upc: String!): Product }
            type Product { upc: String! price: Int weight: Int }
            "#,
        )
        .with_merged_type(
            name!("Product"),
            MergedTypeConfig::new()
                .with_selection_set("{ upc }")
                .with_field_name("productByUpc"),
        )
    }

    /// A delegation of `productByUpc` to the inventory subschema.
    pub(crate) fn delegation_context(args: Option<Object>) -> DelegationContext {
        let schema = stitch_schemas(
            StitchingConfig::new()
                .with_subschema(products())
                .with_subschema(inventory()),
        )
        .unwrap();
        DelegationContext {
            schema,
            subschema: SubschemaId(1),
            field_name: name!("productByUpc"),
            return_type: ast::Type::Named(name!("Product")),
            args,
        }
    }

    pub(crate) fn request(query: &str) -> SubschemaRequest {
        SubschemaRequest {
            document: ast::Document::parse(query, "request.graphql").unwrap(),
            variables: Object::new(),
            operation_name: None,
            operation_kind: OperationKind::Query,
            context: Context::new(),
        }
    }

    /// `query` as printed after a parse.
    pub(crate) fn reprint(query: &str) -> String {
        ast::Document::parse(query, "expected.graphql")
            .unwrap()
            .to_string()
    }
}
