use crate::adapter::{
    AdapterError, DeclNode, ParseUnit, SyntaxAdapter, location, node_text, path_parts,
};
use crate::language::Language;
use std::collections::HashSet;
use tree_sitter::{Node, Parser};

struct Context<'a> {
    path: &'a str,
}

pub struct TypescriptAdapter {
    parser: Parser,
}

impl TypescriptAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let mut parser = Parser::new();
        let language = tree_sitter_typescript::LANGUAGE_TYPESCRIPT;
        parser
            .set_language(&language.into())
            .map_err(|source| AdapterError::Grammar {
                language: Language::TypeScript,
                source,
            })?;
        Ok(Self { parser })
    }
}

impl SyntaxAdapter for TypescriptAdapter {
    fn language(&self) -> Language {
        Language::TypeScript
    }

    fn scope_from_rel_path(&self, rel_path: &str) -> String {
        scope_from_rel_path(rel_path)
    }

    fn adapt(&mut self, source: &str, rel_path: &str) -> Result<ParseUnit, AdapterError> {
        let mut unit = ParseUnit::new(
            rel_path,
            &self.scope_from_rel_path(rel_path),
            Language::TypeScript,
        );
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(unit);
        };
        let ctx = Context { path: rel_path };
        walk_node(tree.root_node(), &ctx, source, &mut unit);
        Ok(unit)
    }
}

/// Module path without extension; `index` files are scoped by their directory.
pub fn scope_from_rel_path(rel_path: &str) -> String {
    let (mut parts, stem) = path_parts(rel_path);
    if stem != "index" && !stem.is_empty() {
        parts.push(stem);
    }
    if parts.is_empty() {
        "index".to_string()
    } else {
        parts.join("/")
    }
}

fn walk_node(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    match node.kind() {
        "program" | "export_statement" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                walk_node(child, ctx, source, unit);
            }
        }
        "class_declaration" | "abstract_class_declaration" => {
            handle_class(node, ctx, source, unit);
        }
        "interface_declaration" => {
            handle_interface(node, ctx, source, unit);
        }
        _ => {}
    }
}

fn handle_class(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    unit.push(DeclNode::type_decl(&name, location(node, ctx.path)));
    handle_class_heritage(node, &name, ctx, source, unit);
    if let Some(body) = node.child_by_field_name("body") {
        walk_class_body(body, &name, ctx, source, unit);
    }
}

fn handle_class_heritage(
    node: Node<'_>,
    class_name: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let mut seen = HashSet::new();
    for target in collect_clause_targets_from(node, "extends_clause", source) {
        if target.is_empty() || !seen.insert(target.clone()) {
            continue;
        }
        unit.push(DeclNode::extends(class_name, &target, location(node, ctx.path)));
    }
    for target in collect_clause_targets_from(node, "implements_clause", source) {
        if target.is_empty() {
            continue;
        }
        unit.push(DeclNode::implements(
            class_name,
            &target,
            location(node, ctx.path),
        ));
    }
}

fn handle_interface(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    unit.push(DeclNode::interface_decl(&name, location(node, ctx.path)));
    let mut targets = collect_clause_targets_from(node, "extends_type_clause", source);
    targets.extend(collect_clause_targets_from(node, "extends_clause", source));
    for target in targets {
        if target.is_empty() {
            continue;
        }
        unit.push(DeclNode::extends(&name, &target, location(node, ctx.path)));
    }
    let Some(body) = node.child_by_field_name("body") else {
        return;
    };
    let mut cursor = body.walk();
    for child in body.named_children(&mut cursor) {
        match child.kind() {
            "property_signature" => {
                let Some(field_name) = member_name(child, source) else {
                    continue;
                };
                let ty = annotation_type(child.child_by_field_name("type"), source);
                unit.push(DeclNode::field(
                    &name,
                    &field_name,
                    &ty,
                    location(child, ctx.path),
                ));
            }
            "method_signature" => {
                handle_method(child, &name, ctx, source, unit);
            }
            _ => {}
        }
    }
}

fn collect_clause_targets_from(node: Node<'_>, clause_kind: &str, source: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        match child.kind() {
            kind if kind == clause_kind => {
                targets.extend(clause_targets(child, source));
            }
            "class_heritage" => {
                let mut inner = child.walk();
                for clause in child.named_children(&mut inner) {
                    if clause.kind() == clause_kind {
                        targets.extend(clause_targets(clause, source));
                    }
                }
            }
            _ => {}
        }
    }
    targets
}

/// Base names listed in a heritage clause, type arguments dropped.
fn clause_targets(node: Node<'_>, source: &str) -> Vec<String> {
    let mut targets = Vec::new();
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        let kind = child.kind();
        if kind == "type_arguments" || kind == "type_parameters" {
            continue;
        }
        let text = node_text(child, source);
        let name = text.split('<').next().unwrap_or(&text).trim();
        if !name.is_empty() {
            targets.push(name.to_string());
        }
    }
    targets
}

fn walk_class_body(
    node: Node<'_>,
    class_name: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if is_static(child) {
            continue;
        }
        match child.kind() {
            "public_field_definition" => {
                let Some(field_name) = member_name(child, source) else {
                    continue;
                };
                let ty = annotation_type(child.child_by_field_name("type"), source);
                unit.push(
                    DeclNode::field(class_name, &field_name, &ty, location(child, ctx.path))
                        .with_keyword(accessibility(child, source)),
                );
            }
            "method_definition" => {
                if member_name(child, source).as_deref() == Some("constructor") {
                    handle_parameter_properties(child, class_name, ctx, source, unit);
                } else {
                    handle_method(child, class_name, ctx, source, unit);
                }
            }
            "abstract_method_signature" => {
                handle_method(child, class_name, ctx, source, unit);
            }
            _ => {}
        }
    }
}

fn handle_method(
    node: Node<'_>,
    owner: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let Some(name) = member_name(node, source) else {
        return;
    };
    let params = node
        .child_by_field_name("parameters")
        .map(|list| parameter_types(list, source))
        .unwrap_or_default();
    let returns = match annotation_type(node.child_by_field_name("return_type"), source) {
        ret if ret.is_empty() || ret == "void" => Vec::new(),
        ret => vec![ret],
    };
    unit.push(
        DeclNode::method(owner, &name, params, returns, location(node, ctx.path))
            .with_keyword(accessibility(node, source)),
    );
}

/// `constructor(private id: string)` declares a field named `id`.
fn handle_parameter_properties(
    node: Node<'_>,
    owner: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let Some(params) = node.child_by_field_name("parameters") else {
        return;
    };
    let mut cursor = params.walk();
    for param in params.named_children(&mut cursor) {
        if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
            continue;
        }
        let keyword = accessibility(param, source);
        if keyword.is_none() && !has_token(param, "readonly") {
            continue;
        }
        let Some(pattern) = param.child_by_field_name("pattern") else {
            continue;
        };
        let name = node_text(pattern, source);
        if name.is_empty() {
            continue;
        }
        let ty = annotation_type(param.child_by_field_name("type"), source);
        unit.push(
            DeclNode::field(owner, &name, &ty, location(param, ctx.path)).with_keyword(keyword),
        );
    }
}

fn parameter_types(list: Node<'_>, source: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        if !matches!(param.kind(), "required_parameter" | "optional_parameter") {
            continue;
        }
        // `this` parameters only constrain the receiver.
        if param
            .child_by_field_name("pattern")
            .is_some_and(|pattern| pattern.kind() == "this")
        {
            continue;
        }
        types.push(annotation_type(param.child_by_field_name("type"), source));
    }
    types
}

fn member_name(node: Node<'_>, source: &str) -> Option<String> {
    let name_node = node.child_by_field_name("name")?;
    let name = node_text(name_node, source);
    (!name.is_empty()).then_some(name)
}

/// Type text of a `: T` annotation, without the colon.
fn annotation_type(node: Option<Node<'_>>, source: &str) -> String {
    let Some(node) = node else {
        return String::new();
    };
    node_text(node, source)
        .trim_start_matches(':')
        .trim()
        .to_string()
}

fn accessibility(node: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = node.walk();
    let keyword = node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "accessibility_modifier")
        .map(|child| node_text(child, source));
    keyword
}

fn is_static(node: Node<'_>) -> bool {
    has_token(node, "static")
}

fn has_token(node: Node<'_>, token: &str) -> bool {
    let mut cursor = node.walk();
    let found = node.children(&mut cursor).any(|child| child.kind() == token);
    found
}
