use crate::adapter::{
    AdapterError, DeclNode, ParseUnit, SyntaxAdapter, location, node_text, path_parts,
};
use crate::language::Language;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

/// Bases that mark a class as structural interface rather than a parent.
const PROTOCOL_BASES: &[&str] = &["Protocol", "typing.Protocol", "typing_extensions.Protocol"];

/// Bases that contribute no members worth modelling.
const IGNORED_BASES: &[&str] = &["object", "ABC", "abc.ABC", "Generic", "typing.Generic"];

struct Context<'a> {
    path: &'a str,
}

pub struct PythonAdapter {
    parser: Parser,
}

impl PythonAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let mut parser = Parser::new();
        let language = tree_sitter_python::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|source| AdapterError::Grammar {
                language: Language::Python,
                source,
            })?;
        Ok(Self { parser })
    }
}

impl SyntaxAdapter for PythonAdapter {
    fn language(&self) -> Language {
        Language::Python
    }

    fn scope_from_rel_path(&self, rel_path: &str) -> String {
        scope_from_rel_path(rel_path)
    }

    fn adapt(&mut self, source: &str, rel_path: &str) -> Result<ParseUnit, AdapterError> {
        let mut unit = ParseUnit::new(
            rel_path,
            &self.scope_from_rel_path(rel_path),
            Language::Python,
        );
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(unit);
        };
        let ctx = Context { path: rel_path };
        let root = tree.root_node();
        let mut cursor = root.walk();
        for child in root.named_children(&mut cursor) {
            if let Some(class) = unwrap_decorated(child, "class_definition") {
                handle_class(class, &ctx, source, &mut unit);
            }
        }
        Ok(unit)
    }
}

/// Dotted module path; a package's `__init__` is scoped by the package.
pub fn scope_from_rel_path(rel_path: &str) -> String {
    let (mut parts, stem) = path_parts(rel_path);
    if stem != "__init__" && !stem.is_empty() {
        parts.push(stem);
    }
    if parts.is_empty() {
        "__init__".to_string()
    } else {
        parts.join(".")
    }
}

/// The definition inside a `decorated_definition`, or the node itself.
fn unwrap_decorated<'a>(node: Node<'a>, kind: &str) -> Option<Node<'a>> {
    let definition = if node.kind() == "decorated_definition" {
        node.child_by_field_name("definition")?
    } else {
        node
    };
    (definition.kind() == kind).then_some(definition)
}

fn handle_class(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }

    let mut is_protocol = false;
    let mut bases = Vec::new();
    if let Some(superclasses) = node.child_by_field_name("superclasses") {
        let mut cursor = superclasses.walk();
        for child in superclasses.named_children(&mut cursor) {
            // `metaclass=ABCMeta` and friends.
            if child.kind() == "keyword_argument" {
                continue;
            }
            let text = node_text(child, source);
            let base = text.split('[').next().unwrap_or(&text).trim().to_string();
            if base.is_empty() {
                continue;
            }
            if PROTOCOL_BASES.contains(&base.as_str()) {
                is_protocol = true;
            } else if !IGNORED_BASES.contains(&base.as_str()) {
                bases.push((base, child));
            }
        }
    }

    if is_protocol {
        unit.push(DeclNode::interface_decl(&name, location(node, ctx.path)));
    } else {
        unit.push(DeclNode::type_decl(&name, location(node, ctx.path)));
    }
    for (base, base_node) in bases {
        unit.push(DeclNode::extends(&name, &base, location(base_node, ctx.path)));
    }

    if let Some(body) = node.child_by_field_name("body") {
        walk_class_body(body, &name, ctx, source, unit);
    }
}

fn walk_class_body(
    body: Node<'_>,
    class_name: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let mut fields = HashSet::new();
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        if child.kind() == "expression_statement" {
            let mut inner = child.walk();
            for expr in child.named_children(&mut inner) {
                if expr.kind() == "assignment" {
                    handle_class_attribute(expr, class_name, ctx, source, unit, &mut fields);
                }
            }
            continue;
        }
        let Some(function) = unwrap_decorated(child, "function_definition") else {
            continue;
        };
        let Some(name_node) = function.child_by_field_name("name") else {
            continue;
        };
        let name = node_text(name_node, source);
        if name == "__init__" {
            if let Some(init_body) = function.child_by_field_name("body") {
                collect_self_assignments(init_body, class_name, ctx, source, unit, &mut fields);
            }
            continue;
        }
        let skip_receiver = !has_decorator(child, "staticmethod", source);
        let params = function
            .child_by_field_name("parameters")
            .map(|list| parameter_types(list, skip_receiver, source))
            .unwrap_or_default();
        let returns = function
            .child_by_field_name("return_type")
            .map(|ret| node_text(ret, source))
            .filter(|ret| !ret.is_empty() && ret != "None")
            .into_iter()
            .collect();
        unit.push(DeclNode::method(
            class_name,
            &name,
            params,
            returns,
            location(child, ctx.path),
        ));
    }
}

/// `name: T = value` or `name = value` directly in the class body.
fn handle_class_attribute(
    node: Node<'_>,
    class_name: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
    seen: &mut HashSet<String>,
) {
    let Some(left) = node.child_by_field_name("left") else {
        return;
    };
    if left.kind() != "identifier" {
        return;
    }
    let name = node_text(left, source);
    if name.is_empty() || !seen.insert(name.clone()) {
        return;
    }
    let ty = node
        .child_by_field_name("type")
        .map(|ty| node_text(ty, source))
        .unwrap_or_default();
    unit.push(DeclNode::field(class_name, &name, &ty, location(node, ctx.path)));
}

/// `self.name = ...` anywhere in `__init__`, outside nested definitions.
fn collect_self_assignments(
    node: Node<'_>,
    class_name: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
    seen: &mut HashSet<String>,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            "function_definition" | "class_definition" | "decorated_definition" | "lambda" => {}
            "assignment" => {
                if let Some(left) = child.child_by_field_name("left")
                    && let Some(name) = self_attribute(left, source)
                    && seen.insert(name.clone())
                {
                    let ty = child
                        .child_by_field_name("type")
                        .map(|ty| node_text(ty, source))
                        .unwrap_or_default();
                    unit.push(DeclNode::field(
                        class_name,
                        &name,
                        &ty,
                        location(child, ctx.path),
                    ));
                }
                if let Some(right) = child.child_by_field_name("right") {
                    collect_self_assignments(right, class_name, ctx, source, unit, seen);
                }
            }
            _ => collect_self_assignments(child, class_name, ctx, source, unit, seen),
        }
    }
}

fn self_attribute(node: Node<'_>, source: &str) -> Option<String> {
    if node.kind() != "attribute" {
        return None;
    }
    let object = node.child_by_field_name("object")?;
    if node_text(object, source) != "self" {
        return None;
    }
    let attribute = node.child_by_field_name("attribute")?;
    let name = node_text(attribute, source);
    (!name.is_empty()).then_some(name)
}

fn has_decorator(node: Node<'_>, decorator: &str, source: &str) -> bool {
    if node.kind() != "decorated_definition" {
        return false;
    }
    let mut cursor = node.walk();
    let found = node.named_children(&mut cursor).any(|child| {
        child.kind() == "decorator" && node_text(child, source).trim_start_matches('@') == decorator
    });
    found
}

/// Annotated parameter types, `""` where unannotated. The receiver
/// (`self`/`cls`) is dropped unless `skip_receiver` is false.
fn parameter_types(list: Node<'_>, skip_receiver: bool, source: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut skipped = !skip_receiver;
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        let ty = match param.kind() {
            "identifier" | "default_parameter" | "list_splat_pattern"
            | "dictionary_splat_pattern" => String::new(),
            "typed_parameter" | "typed_default_parameter" => param
                .child_by_field_name("type")
                .map(|ty| node_text(ty, source))
                .unwrap_or_default(),
            // `*` and `/` separators.
            _ => continue,
        };
        if !skipped {
            skipped = true;
            continue;
        }
        types.push(ty);
    }
    types
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_is_dotted_module() {
        assert_eq!(scope_from_rel_path("app/models/user.py"), "app.models.user");
        assert_eq!(scope_from_rel_path("app/models/__init__.py"), "app.models");
        assert_eq!(scope_from_rel_path("__init__.py"), "__init__");
    }
}
