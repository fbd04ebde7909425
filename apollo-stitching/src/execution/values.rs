//! Input values of an operation, as JSON.

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::request;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::validation::Valid;

use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// Converts a literal to JSON, substituting variables.
///
/// Unset variables become `null`.
pub(crate) fn ast_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => name.as_str().into(),
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::String(s) => s.as_str().into(),
        ast::Value::Float(f) => f.as_str().parse::<f64>().map(Into::into).unwrap_or_default(),
        ast::Value::Int(i) => {
            let s = i.as_str();
            s.parse::<i64>()
                .map(Into::into)
                .or_else(|_| s.parse::<f64>().map(Into::into))
                .unwrap_or_default()
        }
        ast::Value::Boolean(b) => Value::Bool(*b),
        ast::Value::List(items) => Value::Array(
            items
                .iter()
                .map(|item| ast_to_json(item, variables))
                .collect(),
        ),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), ast_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// The argument values of `field`, with defaults applied.
pub(crate) fn coerce_argument_values(
    definition: &FieldDefinition,
    field: &ast::Field,
    variables: &Object,
) -> Object {
    let mut values = Object::new();
    for argument in &definition.arguments {
        let provided = field
            .arguments
            .iter()
            .find(|provided| provided.name == argument.name)
            .map(|provided| &*provided.value);
        let value = match provided {
            Some(ast::Value::Variable(variable)) if !variables.contains_key(variable.as_str()) => {
                argument.default_value.as_deref()
            }
            Some(value) => Some(value),
            None => argument.default_value.as_deref(),
        };
        if let Some(value) = value {
            values.insert(argument.name.as_str(), ast_to_json(value, variables));
        }
    }
    values
}

/// The variable values of the operation named `operation_name`, coerced to their declared types,
/// with defaults applied.
pub(crate) fn coerce_variable_values(
    schema: &Valid<Schema>,
    document: &Valid<ExecutableDocument>,
    operation_name: Option<&str>,
    provided: &Object,
) -> Result<Object, Vec<graphql::Error>> {
    let operation = document
        .operations
        .get(operation_name)
        .map_err(|error| vec![error.to_graphql_error(&document.sources).into()])?;
    request::coerce_variable_values(schema, operation, provided)
        .map(Valid::into_inner)
        .map_err(|error| {
            let mut error: graphql::Error = error.to_graphql_error(&document.sources).into();
            error
                .extensions
                .entry("code")
                .or_insert_with(|| "BAD_USER_INPUT".into());
            vec![error]
        })
}

/// Evaluates `@skip` and `@include`.
pub(crate) fn should_include(directives: &ast::DirectiveList, variables: &Object) -> bool {
    directives.iter().all(|directive| {
        let condition = directive
            .arguments
            .iter()
            .find(|argument| argument.name.as_str() == "if")
            .map(|argument| ast_to_json(&argument.value, variables));
        match (directive.name.as_str(), condition) {
            ("skip", Some(Value::Bool(true))) => false,
            ("include", Some(Value::Bool(false))) => false,
            _ => true,
        }
    })
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json_bytes::json;

    use super::*;

    fn operation(source: &str) -> ast::OperationDefinition {
        let document = ast::Document::parse(source, "operation.graphql").unwrap();
        document
            .definitions
            .iter()
            .find_map(|definition| match definition {
                ast::Definition::OperationDefinition(operation) => Some((**operation).clone()),
                _ => None,
            })
            .unwrap()
    }

    fn root_field(operation: &ast::OperationDefinition) -> ast::Field {
        match &operation.selection_set[0] {
            ast::Selection::Field(field) => (**field).clone(),
            _ => panic!("expected a field"),
        }
    }

    #[test]
    fn literals_and_variables_become_json() {
        let operation = operation(
            r#"query($upc: String) { search(input: {upc: $upc, limit: 5, ratio: 0.5, tags: ["a", B], exact: true, after: null}) }"#,
        );
        let field = root_field(&operation);
        let mut variables = Object::new();
        variables.insert("upc", json!("1"));
        assert_eq!(
            ast_to_json(&field.arguments[0].value, &variables),
            json!({"upc": "1", "limit": 5, "ratio": 0.5, "tags": ["a", "B"], "exact": true, "after": null})
        );
    }

    #[test]
    fn arguments_fall_back_to_defaults() {
        let schema = Schema::parse_and_validate(
            "type Query { topProducts(first: Int = 5, after: String): [String] }",
            "products.graphql",
        )
        .unwrap();
        let definition = &schema.get_object("Query").unwrap().fields["topProducts"];
        let field = root_field(&operation("query($first: Int) { topProducts(first: $first) }"));

        assert_eq!(
            coerce_argument_values(definition, &field, &Object::new()),
            json!({"first": 5}).as_object().unwrap().clone()
        );
        let mut variables = Object::new();
        variables.insert("first", json!(2));
        assert_eq!(
            coerce_argument_values(definition, &field, &variables),
            json!({"first": 2}).as_object().unwrap().clone()
        );
    }

    fn coerce(source: &str, provided: &Object) -> Result<Object, Vec<graphql::Error>> {
        let schema = Schema::parse_and_validate(
            "type Query { a(upc: String, first: Int): String }",
            "products.graphql",
        )
        .unwrap();
        let document = ast::Document::parse(source, "operation.graphql")
            .unwrap()
            .to_executable_validate(&schema)
            .unwrap();
        coerce_variable_values(&schema, &document, None, provided)
    }

    #[test]
    fn required_variables_must_be_provided() {
        let source = "query($upc: String!, $first: Int = 3) { a(upc: $upc, first: $first) }";
        let errors = coerce(source, &Object::new()).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("upc"));
        assert_eq!(errors[0].extension_code().as_deref(), Some("BAD_USER_INPUT"));

        let mut provided = Object::new();
        provided.insert("upc", json!("1"));
        assert_eq!(
            coerce(source, &provided).unwrap(),
            json!({"upc": "1", "first": 3}).as_object().unwrap().clone()
        );
    }

    #[test]
    fn variables_must_match_their_declared_types() {
        let source = "query($first: Int) { a(first: $first) }";
        let mut provided = Object::new();
        provided.insert("first", json!("five"));
        let errors = coerce(source, &provided).unwrap_err();
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("first"));

        let mut provided = Object::new();
        provided.insert("first", json!(null));
        assert_eq!(
            coerce("query($first: Int!) { a(first: $first) }", &provided)
                .unwrap_err()
                .len(),
            1
        );
    }

    #[test]
    fn skip_and_include() {
        let operation = operation(
            "query($no: Boolean!) { a @skip(if: true) b @include(if: $no) c @include(if: true) }",
        );
        let mut variables = Object::new();
        variables.insert("no", json!(false));
        let included = operation
            .selection_set
            .iter()
            .filter_map(|selection| match selection {
                ast::Selection::Field(field) => Some(field),
                _ => None,
            })
            .filter(|field| should_include(&field.directives, &variables))
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(included, ["c"]);
    }
}
