//! Entity extraction: one parse unit in, raw entities out.
//!
//! Visibility is canonicalised here; type references stay as source text
//! until the resolver sees every unit.

use crate::adapter::{DeclKind, DeclNode, ParseUnit};
use crate::language::Language;
use crate::model::{EntityKind, SourceLocation, Visibility};
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawField {
    pub name: String,
    pub ty: String,
    pub visibility: Visibility,
    pub anonymous: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMethod {
    pub name: String,
    pub params: Vec<String>,
    pub returns: Vec<String>,
    pub visibility: Visibility,
    pub location: SourceLocation,
}

/// An `Extends` or `Implements` declaration, target still unresolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBinding {
    pub target: String,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RawItem {
    Field(RawField),
    Method(RawMethod),
    Base(RawBinding),
    Implements(RawBinding),
}

impl RawItem {
    pub fn name(&self) -> &str {
        match self {
            RawItem::Field(field) => &field.name,
            RawItem::Method(method) => &method.name,
            RawItem::Base(binding) | RawItem::Implements(binding) => &binding.target,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEntity {
    pub name: String,
    pub kind: EntityKind,
    pub visibility: Visibility,
    pub location: SourceLocation,
    pub fields: Vec<RawField>,
    pub methods: Vec<RawMethod>,
    pub bases: Vec<RawBinding>,
    pub implements: Vec<RawBinding>,
}

impl RawEntity {
    pub fn push(&mut self, item: RawItem) {
        match item {
            RawItem::Field(field) => self.fields.push(field),
            RawItem::Method(method) => self.methods.push(method),
            RawItem::Base(binding) => self.bases.push(binding),
            RawItem::Implements(binding) => self.implements.push(binding),
        }
    }
}

/// An item whose owner is not declared in the same unit (a Go method in a
/// sibling file of its package). Attached when all units are merged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detached {
    pub owner: String,
    pub item: RawItem,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawUnit {
    pub path: String,
    pub scope: String,
    pub language: Language,
    /// Declaration order.
    pub entities: Vec<RawEntity>,
    pub detached: Vec<Detached>,
}

pub fn extract_unit(unit: &ParseUnit) -> RawUnit {
    let language = unit.language;
    let mut entities: Vec<RawEntity> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();

    // Types first: members may precede their owner in the file.
    for decl in &unit.decls {
        let kind = match decl.kind {
            DeclKind::TypeDeclaration => EntityKind::Record,
            DeclKind::InterfaceDeclaration => EntityKind::Interface,
            _ => continue,
        };
        index.entry(decl.name.as_str()).or_insert(entities.len());
        entities.push(RawEntity {
            name: decl.name.clone(),
            kind,
            visibility: language.visibility(&decl.name, decl.visibility.keyword.as_deref()),
            location: decl.location.clone(),
            fields: Vec::new(),
            methods: Vec::new(),
            bases: Vec::new(),
            implements: Vec::new(),
        });
    }

    let mut detached = Vec::new();
    for decl in &unit.decls {
        let Some(item) = raw_item(language, decl) else {
            continue;
        };
        let Some(owner) = decl.owner.as_deref() else {
            continue;
        };
        match index.get(owner) {
            Some(&slot) => entities[slot].push(item),
            None => detached.push(Detached {
                owner: owner.to_string(),
                item,
            }),
        }
    }

    RawUnit {
        path: unit.path.clone(),
        scope: unit.scope.clone(),
        language,
        entities,
        detached,
    }
}

fn raw_item(language: Language, decl: &DeclNode) -> Option<RawItem> {
    let keyword = decl.visibility.keyword.as_deref();
    let item = match decl.kind {
        DeclKind::TypeDeclaration | DeclKind::InterfaceDeclaration => return None,
        DeclKind::Field => RawItem::Field(RawField {
            name: decl.name.clone(),
            ty: decl.type_ref.clone().unwrap_or_default(),
            // An embedded field is exactly as visible as the type it names.
            visibility: language.visibility(&decl.name, keyword),
            anonymous: decl.anonymous,
            location: decl.location.clone(),
        }),
        DeclKind::Method => RawItem::Method(RawMethod {
            name: decl.name.clone(),
            params: decl.params.clone(),
            returns: decl.returns.clone(),
            visibility: language.visibility(&decl.name, keyword),
            location: decl.location.clone(),
        }),
        DeclKind::Extends => RawItem::Base(binding(decl)),
        DeclKind::Implements => RawItem::Implements(binding(decl)),
    };
    Some(item)
}

fn binding(decl: &DeclNode) -> RawBinding {
    RawBinding {
        target: decl.type_ref.clone().unwrap_or_else(|| decl.name.clone()),
        location: decl.location.clone(),
    }
}
