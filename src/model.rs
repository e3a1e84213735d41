use crate::language::{Language, normalize_type_text, strip_type_sigils};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Arena index of an entity inside one [`UnifiedModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(u32);

impl EntityId {
    pub(crate) fn new(index: usize) -> Self {
        EntityId(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Record,
    Interface,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Visibility {
    Public,
    /// Inherited by subtypes in any scope, never part of a public contract.
    Protected,
    Private,
}

#[derive(
    Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct SourceLocation {
    pub file: String,
    pub start_line: u32,
    pub start_col: u32,
    pub end_line: u32,
    pub end_col: u32,
}

impl SourceLocation {
    pub fn new(file: impl Into<String>, start_line: u32, end_line: u32) -> Self {
        Self {
            file: file.into(),
            start_line,
            start_col: 1,
            end_line,
            end_col: 1,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.start_line, self.start_col)
    }
}

/// What a declared type reference turned out to name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    Resolved(EntityId),
    Builtin,
    /// Qualified reference into a package the model does not contain.
    External,
    /// Container, union, generic or function type; never linked to an entity.
    Composite,
    /// No annotation in a dynamically typed language.
    Untyped,
    Unresolved,
    Ambiguous(Vec<EntityId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeRef {
    pub raw: String,
    pub resolution: Resolution,
}

impl TypeRef {
    pub fn resolved_entity(&self) -> Option<EntityId> {
        match self.resolution {
            Resolution::Resolved(id) => Some(id),
            _ => None,
        }
    }

    pub fn normalized(&self) -> String {
        normalize_type_text(&self.raw)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    pub ty: TypeRef,
    pub visibility: Visibility,
    /// Embedded field (no name of its own in source).
    pub anonymous: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Method {
    pub name: String,
    pub params: Vec<TypeRef>,
    pub returns: Vec<TypeRef>,
    pub visibility: Visibility,
    pub location: SourceLocation,
}

impl Method {
    pub fn signature(&self) -> Signature {
        Signature {
            params: self.params.iter().map(TypeKey::of).collect(),
            returns: self.returns.iter().map(TypeKey::of).collect(),
        }
    }
}

/// One parameter or return type as signatures compare it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TypeKey {
    /// A reference that resolved to a model entity, with its pointer or
    /// reference sigils (`*`, `&`).
    Entity { id: EntityId, sigils: String },
    /// Anything else, whitespace-normalized.
    Text(String),
}

impl TypeKey {
    pub fn of(ty: &TypeRef) -> Self {
        match ty.resolution {
            Resolution::Resolved(id) => {
                let trimmed = ty.raw.trim();
                let bare = strip_type_sigils(trimmed);
                let sigils = &trimmed[..trimmed.len() - bare.len()];
                TypeKey::Entity {
                    id,
                    sigils: normalize_type_text(sigils),
                }
            }
            _ => TypeKey::Text(ty.normalized()),
        }
    }
}

/// Parameter and return type sequences.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Signature {
    pub params: Vec<TypeKey>,
    pub returns: Vec<TypeKey>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum MemberKind {
    Field,
    Method,
}

/// Points at one declared field or method: `index` is into the owning
/// entity's `fields` or `methods`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MemberRef {
    pub entity: EntityId,
    pub kind: MemberKind,
    pub index: usize,
}

#[derive(Debug, Clone, Copy)]
pub enum Member<'a> {
    Field(&'a Field),
    Method(&'a Method),
}

impl<'a> Member<'a> {
    pub fn name(&self) -> &'a str {
        match self {
            Member::Field(field) => &field.name,
            Member::Method(method) => &method.name,
        }
    }

    pub fn visibility(&self) -> Visibility {
        match self {
            Member::Field(field) => field.visibility,
            Member::Method(method) => method.visibility,
        }
    }

    pub fn kind(&self) -> MemberKind {
        match self {
            Member::Field(_) => MemberKind::Field,
            Member::Method(_) => MemberKind::Method,
        }
    }

    pub fn location(&self) -> &'a SourceLocation {
        match self {
            Member::Field(field) => &field.location,
            Member::Method(method) => &method.location,
        }
    }

    /// Fields have no call signature; two fields compare equal by name alone.
    pub fn signature(&self) -> Option<Signature> {
        match self {
            Member::Field(_) => None,
            Member::Method(method) => Some(method.signature()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    pub id: EntityId,
    pub name: String,
    pub qualified_name: String,
    pub scope: String,
    pub language: Language,
    pub kind: EntityKind,
    pub visibility: Visibility,
    pub location: SourceLocation,
    pub fields: Vec<Field>,
    pub methods: Vec<Method>,
    /// Explicit base types (`extends`, Python bases), declaration order.
    pub bases: Vec<TypeRef>,
    /// Interfaces named in an `implements` clause.
    pub interfaces: Vec<TypeRef>,
}

impl Entity {
    pub fn member(&self, kind: MemberKind, index: usize) -> Option<Member<'_>> {
        match kind {
            MemberKind::Field => self.fields.get(index).map(Member::Field),
            MemberKind::Method => self.methods.get(index).map(Member::Method),
        }
    }

    /// Own members in declaration order: fields first, then methods.
    pub fn own_members(&self) -> impl Iterator<Item = (MemberRef, Member<'_>)> + '_ {
        let fields = self.fields.iter().enumerate().map(|(index, field)| {
            (
                MemberRef {
                    entity: self.id,
                    kind: MemberKind::Field,
                    index,
                },
                Member::Field(field),
            )
        });
        let methods = self.methods.iter().enumerate().map(|(index, method)| {
            (
                MemberRef {
                    entity: self.id,
                    kind: MemberKind::Method,
                    index,
                },
                Member::Method(method),
            )
        });
        fields.chain(methods)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RelationKind {
    Composes,
    Embeds,
    Implements,
}

impl RelationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Composes => "composes",
            RelationKind::Embeds => "embeds",
            RelationKind::Implements => "implements",
        }
    }
}

/// The native construct a relationship was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case", tag = "type", content = "name")]
pub enum RelationBasis {
    /// A field of the source entity, named or anonymous.
    Field(String),
    /// An explicit base-type clause (`extends`, Python bases).
    BaseType,
    /// An explicit `implements` clause.
    Declared,
    /// Method-set matching.
    Structural,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Relationship {
    pub kind: RelationKind,
    pub source: EntityId,
    pub target: EntityId,
    pub basis: RelationBasis,
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectiveMember {
    pub name: String,
    pub kind: MemberKind,
    pub origin: MemberRef,
    /// Declaring entity when the member arrived through embedding.
    pub promoted_from: Option<EntityId>,
    /// Embedded entities traversed between the owner and the declaring
    /// entity, shallowest first; empty for own and directly promoted members.
    pub via: Vec<EntityId>,
    pub depth: u32,
    pub visibility: Visibility,
}

impl EffectiveMember {
    pub fn is_own(&self) -> bool {
        self.promoted_from.is_none()
    }
}

/// A promoted member hidden by a shallower declaration of the same name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Override {
    pub name: String,
    pub active: MemberRef,
    pub overridden: MemberRef,
    /// Same signature (a true override) rather than a plain name shadow.
    pub exact: bool,
}

/// Two embeds at the same depth provide the same name; `kept` came from the
/// earlier declared embed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SiblingConflict {
    pub name: String,
    pub kept: MemberRef,
    pub dropped: MemberRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EffectiveSet {
    pub members: Vec<EffectiveMember>,
    pub overrides: Vec<Override>,
    pub conflicts: Vec<SiblingConflict>,
    /// Promotion was skipped because the entity sits on an embedding cycle.
    pub cyclic: bool,
}

impl EffectiveSet {
    pub fn get(&self, name: &str) -> Option<&EffectiveMember> {
        self.members.iter().find(|member| member.name == name)
    }

    pub fn methods(&self) -> impl Iterator<Item = &EffectiveMember> + '_ {
        self.members
            .iter()
            .filter(|member| member.kind == MemberKind::Method)
    }
}

/// A member whose owning type was never declared in its scope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrphanMember {
    pub scope: String,
    pub owner: String,
    pub language: Language,
    pub kind: MemberKind,
    pub name: String,
    pub location: SourceLocation,
}

impl OrphanMember {
    pub fn owner_qualified_name(&self) -> String {
        qualify(&self.scope, &self.owner)
    }
}

/// Entities, their relationships and the derived effective member sets.
#[derive(Debug, Clone, Default)]
pub struct UnifiedModel {
    entities: Vec<Entity>,
    relationships: Vec<Relationship>,
    effective: Vec<EffectiveSet>,
    orphans: Vec<OrphanMember>,
    by_name: BTreeMap<String, EntityId>,
}

impl UnifiedModel {
    pub fn from_parts(
        entities: Vec<Entity>,
        relationships: Vec<Relationship>,
        mut effective: Vec<EffectiveSet>,
        orphans: Vec<OrphanMember>,
    ) -> Self {
        effective.resize_with(entities.len(), EffectiveSet::default);
        let by_name = entities
            .iter()
            .map(|entity| (entity.qualified_name.clone(), entity.id))
            .collect();
        Self {
            entities,
            relationships,
            effective,
            orphans,
            by_name,
        }
    }

    /// Add derived relationships (structural `implements`) to a built model.
    pub fn with_relationships(mut self, extra: Vec<Relationship>) -> Self {
        self.relationships.extend(extra);
        self
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn orphans(&self) -> &[OrphanMember] {
        &self.orphans
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(id.index())
    }

    pub fn find(&self, qualified_name: &str) -> Option<&Entity> {
        self.by_name
            .get(qualified_name)
            .and_then(|id| self.entity(*id))
    }

    pub fn effective(&self, id: EntityId) -> Option<&EffectiveSet> {
        self.effective.get(id.index())
    }

    pub fn member(&self, member: MemberRef) -> Option<Member<'_>> {
        self.entity(member.entity)?
            .member(member.kind, member.index)
    }

    pub fn relationships_from(
        &self,
        id: EntityId,
    ) -> impl Iterator<Item = &Relationship> + '_ {
        self.relationships
            .iter()
            .filter(move |relationship| relationship.source == id)
    }

    pub fn has_relationship(&self, kind: RelationKind, source: EntityId, target: EntityId) -> bool {
        self.relationships.iter().any(|relationship| {
            relationship.kind == kind
                && relationship.source == source
                && relationship.target == target
        })
    }

    pub fn qualified_name(&self, id: EntityId) -> String {
        self.entity(id)
            .map(|entity| entity.qualified_name.clone())
            .unwrap_or_else(|| format!("<missing #{}>", id.index()))
    }

    /// `Entity.member` label for a member reference.
    pub fn member_label(&self, member: MemberRef) -> String {
        let name = self
            .member(member)
            .map(|member| member.name().to_string())
            .unwrap_or_else(|| format!("<{}#{}>", kind_label(member.kind), member.index));
        format!("{}.{}", self.qualified_name(member.entity), name)
    }
}

fn kind_label(kind: MemberKind) -> &'static str {
    match kind {
        MemberKind::Field => "field",
        MemberKind::Method => "method",
    }
}

pub fn qualify(scope: &str, name: &str) -> String {
    if scope.is_empty() {
        name.to_string()
    } else {
        format!("{scope}.{name}")
    }
}
