use std::fmt;

use apollo_compiler::ast;

use super::DelegationContext;
use super::Transform;
use crate::error::DelegationError;
use crate::graphql;
use crate::json_ext::Value;
use crate::subschema::SubschemaRequest;

type Wrapper = Box<dyn Fn(Vec<ast::Selection>) -> ast::Selection + Send + Sync>;
type Extractor = Box<dyn Fn(Value) -> Value + Send + Sync>;

/// Wraps the selections under a field of the request, then unwraps the matching result.
///
/// `path` lists response keys from the root of the operation. The selections of the field it
/// points to are replaced by `wrapper(selections)`; in the result, every value found at `path`
/// is replaced by `extractor(value)`, going through lists along the way.
pub struct WrapQuery {
    path: Vec<String>,
    wrapper: Wrapper,
    extractor: Extractor,
}

impl WrapQuery {
    pub fn new(
        path: impl IntoIterator<Item = impl Into<String>>,
        wrapper: impl Fn(Vec<ast::Selection>) -> ast::Selection + Send + Sync + 'static,
        extractor: impl Fn(Value) -> Value + Send + Sync + 'static,
    ) -> Self {
        Self {
            path: path.into_iter().map(Into::into).collect(),
            wrapper: Box::new(wrapper),
            extractor: Box::new(extractor),
        }
    }

    fn wrap(&self, selections: &mut [ast::Selection], path: &[String]) {
        let Some((key, rest)) = path.split_first() else {
            return;
        };
        for selection in selections {
            match selection {
                ast::Selection::Field(field) => {
                    let response_key = field.alias.as_ref().unwrap_or(&field.name);
                    if response_key.as_str() != key {
                        continue;
                    }
                    let field = field.make_mut();
                    if rest.is_empty() {
                        let selections = std::mem::take(&mut field.selection_set);
                        field.selection_set = vec![(self.wrapper)(selections)];
                    } else {
                        self.wrap(&mut field.selection_set, rest);
                    }
                }
                ast::Selection::InlineFragment(inline) => {
                    self.wrap(&mut inline.make_mut().selection_set, path);
                }
                ast::Selection::FragmentSpread(_) => {}
            }
        }
    }

    fn extract(&self, value: &mut Value, path: &[String]) {
        match value {
            Value::Array(items) => {
                for item in items {
                    self.extract(item, path);
                }
            }
            Value::Object(object) => {
                let Some((key, rest)) = path.split_first() else {
                    return;
                };
                let Some(child) = object.get_mut(key.as_str()) else {
                    return;
                };
                if rest.is_empty() {
                    *child = self.extract_value(std::mem::replace(child, Value::Null));
                } else {
                    self.extract(child, rest);
                }
            }
            _ => {}
        }
    }

    fn extract_value(&self, value: Value) -> Value {
        match value {
            Value::Array(items) => Value::Array(
                items
                    .into_iter()
                    .map(|item| self.extract_value(item))
                    .collect(),
            ),
            Value::Null => Value::Null,
            value => (self.extractor)(value),
        }
    }
}

impl fmt::Debug for WrapQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WrapQuery").field("path", &self.path).finish()
    }
}

impl Transform for WrapQuery {
    fn transform_request(
        &self,
        mut request: SubschemaRequest,
        _context: &DelegationContext,
    ) -> Result<SubschemaRequest, DelegationError> {
        if let Some(operation) = request.operation_mut() {
            self.wrap(&mut operation.selection_set, &self.path);
        }
        Ok(request)
    }

    fn transform_result(
        &self,
        mut response: graphql::Response,
        _context: &DelegationContext,
    ) -> graphql::Response {
        if let Some(data) = &mut response.data {
            self.extract(data, &self.path);
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use apollo_compiler::Node;
    use apollo_compiler::name;
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;
    use crate::transforms::tests::delegation_context;
    use crate::transforms::tests::reprint;
    use crate::transforms::tests::request;

    fn transform() -> WrapQuery {
        WrapQuery::new(
            ["productByUpc"],
            |selections| {
                ast::Selection::Field(Node::new(ast::Field {
                    alias: None,
                    name: name!("node"),
                    arguments: Vec::new(),
                    directives: ast::DirectiveList::default(),
                    selection_set: selections,
                }))
            },
            |value| match value {
                Value::Object(mut object) => object.remove("node").unwrap_or(Value::Null),
                value => value,
            },
        )
    }

    #[test]
    fn selections_are_wrapped() {
        let request = transform()
            .transform_request(
                request(r#"{ productByUpc(upc: "1") { upc price } }"#),
                &delegation_context(None),
            )
            .unwrap();
        assert_eq!(
            request.document.to_string(),
            reprint(r#"{ productByUpc(upc: "1") { node { upc price } } }"#)
        );
    }

    #[test]
    fn results_are_unwrapped() {
        let response = transform().transform_result(
            graphql::Response::builder()
                .data(json!({"productByUpc": {"node": {"upc": "1", "price": 899}}}))
                .build(),
            &delegation_context(None),
        );
        assert_eq!(
            response.data,
            Some(json!({"productByUpc": {"upc": "1", "price": 899}}))
        );
    }
}
