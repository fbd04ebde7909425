//! Walks over the selection sets of a document.

use std::mem;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::ast;

use crate::schema;

/// Where a selection set sits.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Scope<'a> {
    /// The type the selections apply to, if the schema knows it.
    pub(crate) parent: Option<&'a Name>,
    /// Whether the selections are root fields of an operation.
    pub(crate) is_root: bool,
}

pub(crate) type Rewrite<'f> =
    dyn FnMut(&TypedWalk<'_>, Scope<'_>, Vec<ast::Selection>) -> Vec<ast::Selection> + 'f;

/// Rewrites selection sets bottom-up, knowing the type of each against a schema.
pub(crate) struct TypedWalk<'a> {
    pub(crate) schema: &'a Schema,
    /// Overrides the type of root fields, such as the return type of a delegated field.
    pub(crate) root_field_type: Option<&'a Name>,
}

impl<'a> TypedWalk<'a> {
    pub(crate) fn new(schema: &'a Schema) -> Self {
        Self {
            schema,
            root_field_type: None,
        }
    }

    pub(crate) fn with_root_field_type(mut self, root_field_type: &'a Name) -> Self {
        self.root_field_type = Some(root_field_type);
        self
    }

    /// The named type of `field` in `scope`.
    pub(crate) fn field_type(&self, scope: Scope<'_>, field: &ast::Field) -> Option<Name> {
        if field.name.as_str() == "__typename" {
            return None;
        }
        if scope.is_root
            && let Some(root_field_type) = self.root_field_type
        {
            return Some(root_field_type.clone());
        }
        schema::field_definition(self.schema, scope.parent?, &field.name)
            .map(|definition| definition.ty.inner_named_type().clone())
    }

    /// Calls `f` on every selection set of `document`, children before their parent.
    pub(crate) fn rewrite_document(&self, document: &mut ast::Document, f: &mut Rewrite<'_>) {
        for definition in &mut document.definitions {
            match definition {
                ast::Definition::OperationDefinition(operation) => {
                    let parent =
                        schema::root_type_name(self.schema, operation.operation_type.into()).cloned();
                    let operation = operation.make_mut();
                    let scope = Scope {
                        parent: parent.as_ref(),
                        is_root: true,
                    };
                    let selections = mem::take(&mut operation.selection_set);
                    operation.selection_set = self.rewrite(scope, selections, f);
                }
                ast::Definition::FragmentDefinition(fragment) => {
                    let parent = self
                        .schema
                        .types
                        .contains_key(&fragment.type_condition)
                        .then(|| fragment.type_condition.clone());
                    let fragment = fragment.make_mut();
                    let scope = Scope {
                        parent: parent.as_ref(),
                        is_root: false,
                    };
                    let selections = mem::take(&mut fragment.selection_set);
                    fragment.selection_set = self.rewrite(scope, selections, f);
                }
                _ => {}
            }
        }
    }

    fn rewrite(
        &self,
        scope: Scope<'_>,
        selections: Vec<ast::Selection>,
        f: &mut Rewrite<'_>,
    ) -> Vec<ast::Selection> {
        let mut rewritten = Vec::with_capacity(selections.len());
        for selection in selections {
            rewritten.push(match selection {
                ast::Selection::Field(mut field) => {
                    if !field.selection_set.is_empty() {
                        let field_type = self.field_type(scope, &field);
                        let field_scope = Scope {
                            parent: field_type.as_ref(),
                            is_root: false,
                        };
                        let field_mut = field.make_mut();
                        let children = mem::take(&mut field_mut.selection_set);
                        field_mut.selection_set = self.rewrite(field_scope, children, f);
                    }
                    ast::Selection::Field(field)
                }
                ast::Selection::InlineFragment(mut inline) => {
                    let condition = match &inline.type_condition {
                        Some(condition) => self
                            .schema
                            .types
                            .contains_key(condition)
                            .then(|| condition.clone()),
                        None => scope.parent.cloned(),
                    };
                    let inline_scope = Scope {
                        parent: condition.as_ref(),
                        is_root: scope.is_root,
                    };
                    let inline_mut = inline.make_mut();
                    let children = mem::take(&mut inline_mut.selection_set);
                    inline_mut.selection_set = self.rewrite(inline_scope, children, f);
                    ast::Selection::InlineFragment(inline)
                }
                spread @ ast::Selection::FragmentSpread(_) => spread,
            });
        }
        f(self, scope, rewritten)
    }
}

/// Calls `f` on every selection set of `document`, without type information.
pub(crate) fn for_each_selection_set(
    document: &mut ast::Document,
    f: &mut dyn FnMut(&mut Vec<ast::Selection>),
) {
    fn walk(selections: &mut Vec<ast::Selection>, f: &mut dyn FnMut(&mut Vec<ast::Selection>)) {
        f(selections);
        for selection in selections.iter_mut() {
            match selection {
                ast::Selection::Field(field) => {
                    if !field.selection_set.is_empty() {
                        walk(&mut field.make_mut().selection_set, f);
                    }
                }
                ast::Selection::InlineFragment(inline) => {
                    walk(&mut inline.make_mut().selection_set, f);
                }
                ast::Selection::FragmentSpread(_) => {}
            }
        }
    }

    for definition in &mut document.definitions {
        match definition {
            ast::Definition::OperationDefinition(operation) => {
                walk(&mut operation.make_mut().selection_set, f);
            }
            ast::Definition::FragmentDefinition(fragment) => {
                walk(&mut fragment.make_mut().selection_set, f);
            }
            _ => {}
        }
    }
}
