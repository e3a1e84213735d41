use crate::adapter::{
    AdapterError, DeclNode, ParseUnit, SyntaxAdapter, location, node_text, path_parts,
};
use crate::language::Language;
use tree_sitter::{Node, Parser};

struct Context<'a> {
    path: &'a str,
}

pub struct GoAdapter {
    parser: Parser,
}

impl GoAdapter {
    pub fn new() -> Result<Self, AdapterError> {
        let mut parser = Parser::new();
        let language = tree_sitter_go::LANGUAGE;
        parser
            .set_language(&language.into())
            .map_err(|source| AdapterError::Grammar {
                language: Language::Go,
                source,
            })?;
        Ok(Self { parser })
    }
}

impl SyntaxAdapter for GoAdapter {
    fn language(&self) -> Language {
        Language::Go
    }

    fn scope_from_rel_path(&self, rel_path: &str) -> String {
        scope_from_rel_path(rel_path)
    }

    fn adapt(&mut self, source: &str, rel_path: &str) -> Result<ParseUnit, AdapterError> {
        let mut unit = ParseUnit::new(rel_path, &self.scope_from_rel_path(rel_path), Language::Go);
        let Some(tree) = self.parser.parse(source, None) else {
            return Ok(unit);
        };
        let root = tree.root_node();
        // Files at the repository root are scoped by their package clause.
        if !rel_path.contains('/')
            && let Some(package) = package_name(root, source)
        {
            unit.scope = package;
        }
        let ctx = Context { path: rel_path };
        walk_node(root, &ctx, source, &mut unit);
        Ok(unit)
    }
}

/// Go scopes are packages, which are directories.
pub fn scope_from_rel_path(rel_path: &str) -> String {
    let (dirs, _) = path_parts(rel_path);
    if dirs.is_empty() {
        "main".to_string()
    } else {
        dirs.join("/")
    }
}

fn package_name(root: Node<'_>, source: &str) -> Option<String> {
    let mut cursor = root.walk();
    let clause = root
        .named_children(&mut cursor)
        .find(|child| child.kind() == "package_clause")?;
    let mut cursor = clause.walk();
    let name = clause
        .named_children(&mut cursor)
        .find(|child| child.kind() == "package_identifier")
        .map(|node| node_text(node, source))?;
    (!name.is_empty()).then_some(name)
}

fn walk_node(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    match node.kind() {
        "source_file" => {
            let mut cursor = node.walk();
            for child in node.named_children(&mut cursor) {
                walk_node(child, ctx, source, unit);
            }
        }
        "type_declaration" => {
            handle_type_declaration(node, ctx, source, unit);
        }
        "method_declaration" => {
            handle_method(node, ctx, source, unit);
        }
        _ => {}
    }
}

fn handle_type_declaration(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let mut cursor = node.walk();
    for child in node.named_children(&mut cursor) {
        if child.kind() == "type_spec" {
            handle_type_spec(child, ctx, source, unit);
        }
    }
}

fn handle_type_spec(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    let Some(type_node) = node.child_by_field_name("type") else {
        return;
    };

    match type_node.kind() {
        "struct_type" => {
            unit.push(DeclNode::type_decl(&name, location(node, ctx.path)));
            handle_struct_fields(type_node, &name, ctx, source, unit);
        }
        "interface_type" => {
            unit.push(DeclNode::interface_decl(&name, location(node, ctx.path)));
            handle_interface_elems(type_node, &name, ctx, source, unit);
        }
        // Named non-struct types (`type Celsius float64`) carry no members.
        _ => {}
    }
}

fn handle_struct_fields(
    struct_node: Node<'_>,
    owner: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let mut cursor = struct_node.walk();
    let Some(list) = struct_node
        .named_children(&mut cursor)
        .find(|child| child.kind() == "field_declaration_list")
    else {
        return;
    };
    let mut cursor = list.walk();
    for field in list.named_children(&mut cursor) {
        if field.kind() != "field_declaration" {
            continue;
        }
        let Some(type_node) = field.child_by_field_name("type") else {
            continue;
        };
        let ty = node_text(type_node, source);
        let mut names_cursor = field.walk();
        let names: Vec<String> = field
            .children_by_field_name("name", &mut names_cursor)
            .map(|name| node_text(name, source))
            .filter(|name| !name.is_empty())
            .collect();
        if names.is_empty() {
            // Embedded field; the optional `*` is a sibling token of the type.
            let pointer = has_pointer_token(field);
            let raw = if pointer { format!("*{ty}") } else { ty };
            unit.push(DeclNode::embedded(owner, &raw, location(field, ctx.path)));
            continue;
        }
        for name in names {
            unit.push(DeclNode::field(owner, &name, &ty, location(field, ctx.path)));
        }
    }
}

fn has_pointer_token(field: Node<'_>) -> bool {
    let mut cursor = field.walk();
    let found = field
        .children(&mut cursor)
        .any(|child| !child.is_named() && child.kind() == "*");
    found
}

fn handle_interface_elems(
    iface_node: Node<'_>,
    owner: &str,
    ctx: &Context<'_>,
    source: &str,
    unit: &mut ParseUnit,
) {
    let mut cursor = iface_node.walk();
    for child in iface_node.named_children(&mut cursor) {
        match child.kind() {
            "method_elem" | "method_spec" => {
                let Some(name_node) = child.child_by_field_name("name") else {
                    continue;
                };
                let name = node_text(name_node, source);
                if name.is_empty() {
                    continue;
                }
                let (params, returns) = signature_types(child, source);
                unit.push(DeclNode::method(
                    owner,
                    &name,
                    params,
                    returns,
                    location(child, ctx.path),
                ));
            }
            "type_elem" => {
                // A single named type is an embedded interface; unions and
                // approximations (`~int | ~string`) are type constraints.
                let mut elem_cursor = child.walk();
                let types: Vec<Node<'_>> = child.named_children(&mut elem_cursor).collect();
                if let [only] = types.as_slice()
                    && matches!(only.kind(), "type_identifier" | "qualified_type")
                {
                    let ty = node_text(*only, source);
                    unit.push(DeclNode::embedded(owner, &ty, location(child, ctx.path)));
                }
            }
            "type_identifier" | "qualified_type" => {
                let ty = node_text(child, source);
                unit.push(DeclNode::embedded(owner, &ty, location(child, ctx.path)));
            }
            _ => {}
        }
    }
}

fn handle_method(node: Node<'_>, ctx: &Context<'_>, source: &str, unit: &mut ParseUnit) {
    let Some(name_node) = node.child_by_field_name("name") else {
        return;
    };
    let name = node_text(name_node, source);
    if name.is_empty() {
        return;
    }
    let Some(receiver) = extract_receiver_type(node, source) else {
        return;
    };
    let (params, returns) = signature_types(node, source);
    unit.push(DeclNode::method(
        &receiver,
        &name,
        params,
        returns,
        location(node, ctx.path),
    ));
}

fn extract_receiver_type(node: Node<'_>, source: &str) -> Option<String> {
    let receiver = node.child_by_field_name("receiver")?;
    let mut cursor = receiver.walk();
    for child in receiver.named_children(&mut cursor) {
        if child.kind() == "parameter_declaration"
            && let Some(type_node) = child.child_by_field_name("type")
        {
            let type_text = node_text(type_node, source);
            // Strip pointer prefix and type arguments: `*List[T]` -> `List`.
            let type_text = type_text.trim_start_matches('*').trim();
            let type_text = type_text.split('[').next().unwrap_or(type_text).trim();
            if !type_text.is_empty() {
                return Some(type_text.to_string());
            }
        }
    }
    None
}

/// Parameter and result types of a method or interface method element.
fn signature_types(node: Node<'_>, source: &str) -> (Vec<String>, Vec<String>) {
    let params = node
        .child_by_field_name("parameters")
        .map(|list| parameter_types(list, source))
        .unwrap_or_default();
    let returns = match node.child_by_field_name("result") {
        Some(result) if result.kind() == "parameter_list" => parameter_types(result, source),
        Some(result) => vec![node_text(result, source)],
        None => Vec::new(),
    };
    (params, returns)
}

/// One entry per declared parameter: `a, b int` yields `["int", "int"]`.
fn parameter_types(list: Node<'_>, source: &str) -> Vec<String> {
    let mut types = Vec::new();
    let mut cursor = list.walk();
    for param in list.named_children(&mut cursor) {
        let variadic = match param.kind() {
            "parameter_declaration" => false,
            "variadic_parameter_declaration" => true,
            _ => continue,
        };
        let Some(type_node) = param.child_by_field_name("type") else {
            continue;
        };
        let mut ty = node_text(type_node, source);
        if variadic {
            ty = format!("...{ty}");
        }
        let mut names_cursor = param.walk();
        let count = param
            .children_by_field_name("name", &mut names_cursor)
            .count()
            .max(1);
        types.extend(std::iter::repeat_n(ty, count));
    }
    types
}
