//! Serializable view of a normalized model.
//!
//! Entities are keyed by qualified name and every cross reference is a
//! qualified name or `Entity.member` label, so the export reads on its own.

use crate::diagnostics::{self, Diagnostic};
use crate::language::Language;
use crate::model::{
    EffectiveMember, Entity, EntityKind, Field, MemberKind, Method, RelationBasis, RelationKind,
    Relationship, Resolution, SourceLocation, TypeRef, UnifiedModel, Visibility,
};
use crate::normalize::Normalized;
use anyhow::{Context, Result, bail};
use blake3::Hasher;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::str::FromStr;

pub const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    #[default]
    Json,
    Yaml,
}

impl FromStr for Format {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(Format::Json),
            "yaml" | "yml" => Ok(Format::Yaml),
            other => bail!("unknown output format: {other} (expected json or yaml)"),
        }
    }
}

/// How much of the model an export carries.
///
/// `method` is everything, `class` keeps public members only and `package`
/// collapses entities into their scopes with the relationships between them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum DetailLevel {
    Package,
    Class,
    #[default]
    Method,
}

impl FromStr for DetailLevel {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "package" => Ok(DetailLevel::Package),
            "class" => Ok(DetailLevel::Class),
            "method" => Ok(DetailLevel::Method),
            other => bail!("unknown detail level: {other} (expected package, class or method)"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelExport {
    pub version: u32,
    #[serde(default)]
    pub level: DetailLevel,
    /// Counts over the whole model, whatever the level.
    pub summary: ModelSummary,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub entities: BTreeMap<String, EntityRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub relationships: Vec<RelationshipRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub packages: Vec<PackageRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub package_relationships: Vec<PackageRelationshipRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub orphans: Vec<OrphanRecord>,
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ModelSummary {
    pub entities: usize,
    pub records: usize,
    pub interfaces: usize,
    pub fields: usize,
    pub methods: usize,
    pub relationships: usize,
    pub composes: usize,
    pub embeds: usize,
    pub implements: usize,
    pub errors: usize,
    pub warnings: usize,
}

impl ModelSummary {
    pub fn of(model: &UnifiedModel, diagnostics: &[Diagnostic]) -> Self {
        let entities = model.entities();
        let relationships = model.relationships();
        let count_kind = |kind: RelationKind| relationships.iter().filter(|r| r.kind == kind).count();
        let (errors, warnings) = diagnostics::count(diagnostics);
        Self {
            entities: entities.len(),
            records: entities
                .iter()
                .filter(|e| e.kind == EntityKind::Record)
                .count(),
            interfaces: entities
                .iter()
                .filter(|e| e.kind == EntityKind::Interface)
                .count(),
            fields: entities.iter().map(|e| e.fields.len()).sum(),
            methods: entities.iter().map(|e| e.methods.len()).sum(),
            relationships: relationships.len(),
            composes: count_kind(RelationKind::Composes),
            embeds: count_kind(RelationKind::Embeds),
            implements: count_kind(RelationKind::Implements),
            errors,
            warnings,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EntityRecord {
    pub name: String,
    pub scope: String,
    pub language: Language,
    pub kind: EntityKind,
    pub visibility: Visibility,
    pub location: SourceLocation,
    pub fields: Vec<FieldRecord>,
    pub methods: Vec<MethodRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bases: Vec<TypeRefRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub interfaces: Vec<TypeRefRecord>,
    /// Own members first, then promoted ones by depth and declaration order.
    pub effective: Vec<EffectiveRecord>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub overrides: Vec<OverrideRecord>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub cyclic: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct FieldRecord {
    pub name: String,
    #[serde(rename = "type")]
    pub ty: TypeRefRecord,
    pub visibility: Visibility,
    #[serde(default, skip_serializing_if = "is_false")]
    pub anonymous: bool,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct MethodRecord {
    pub name: String,
    pub params: Vec<TypeRefRecord>,
    pub returns: Vec<TypeRefRecord>,
    pub visibility: Visibility,
    pub location: SourceLocation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionKind {
    Resolved,
    Builtin,
    External,
    Composite,
    Untyped,
    Unresolved,
    Ambiguous,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct TypeRefRecord {
    pub raw: String,
    pub resolution: ResolutionKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub candidates: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct EffectiveRecord {
    pub name: String,
    pub kind: MemberKind,
    /// Declaring entity.
    pub origin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub promoted_from: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub via: Vec<String>,
    pub depth: u32,
    pub visibility: Visibility,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OverrideRecord {
    pub name: String,
    pub active: String,
    pub overridden: String,
    pub exact: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RelationshipRecord {
    pub kind: RelationKind,
    pub source: String,
    pub target: String,
    pub basis: RelationBasis,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct OrphanRecord {
    pub owner: String,
    pub kind: MemberKind,
    pub name: String,
    pub language: Language,
    pub location: SourceLocation,
}

/// One scope at `package` level.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct PackageRecord {
    pub name: String,
    pub languages: Vec<Language>,
    pub entities: usize,
    /// Location of the first entity declared in the scope.
    pub location: SourceLocation,
}

/// Entity relationships lifted to their scopes; one per kind and pair.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct PackageRelationshipRecord {
    pub source: String,
    pub target: String,
    pub kind: RelationKind,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ModelExport {
    pub fn from_normalized(normalized: &Normalized) -> Self {
        Self::new(&normalized.model, &normalized.diagnostics)
    }

    pub fn new(model: &UnifiedModel, diagnostics: &[Diagnostic]) -> Self {
        let entities = model
            .entities()
            .iter()
            .map(|entity| (entity.qualified_name.clone(), entity_record(model, entity)))
            .collect();
        let relationships = model
            .relationships()
            .iter()
            .map(|relationship| relationship_record(model, relationship))
            .collect();
        let orphans = model
            .orphans()
            .iter()
            .map(|orphan| OrphanRecord {
                owner: orphan.owner_qualified_name(),
                kind: orphan.kind,
                name: orphan.name.clone(),
                language: orphan.language,
                location: orphan.location.clone(),
            })
            .collect();
        Self {
            version: FORMAT_VERSION,
            level: DetailLevel::Method,
            summary: ModelSummary::of(model, diagnostics),
            entities,
            relationships,
            packages: Vec::new(),
            package_relationships: Vec::new(),
            orphans,
            diagnostics: diagnostics.to_vec(),
        }
    }

    /// Reduce a full export to `level`. Orphans and diagnostics are kept at
    /// every level.
    pub fn with_level(mut self, level: DetailLevel) -> Self {
        match level {
            DetailLevel::Method => {}
            DetailLevel::Class => {
                for record in self.entities.values_mut() {
                    keep_public_members(record);
                }
            }
            DetailLevel::Package => {
                self.packages = package_records(&self.entities);
                self.package_relationships =
                    package_relationships(&self.entities, &self.relationships);
                self.entities.clear();
                self.relationships.clear();
            }
        }
        self.level = level;
        self
    }

    pub fn to_json(&self, pretty: bool) -> Result<String> {
        let out = if pretty {
            serde_json::to_string_pretty(self)
        } else {
            serde_json::to_string(self)
        };
        out.context("serialize model as json")
    }

    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml_ng::to_string(self).context("serialize model as yaml")
    }

    pub fn render(&self, format: Format, pretty: bool) -> Result<String> {
        match format {
            Format::Json => self.to_json(pretty),
            Format::Yaml => self.to_yaml(),
        }
    }

    /// blake3 of the compact JSON form; equal models hash equal.
    pub fn digest(&self) -> Result<String> {
        let json = self.to_json(false)?;
        let mut hasher = Hasher::new();
        hasher.update(json.as_bytes());
        Ok(hasher.finalize().to_hex().to_string())
    }
}

/// JSON Schema of [`ModelExport`].
pub fn schema() -> Result<serde_json::Value> {
    let schema = schemars::schema_for!(ModelExport);
    serde_json::to_value(schema).context("serialize export schema")
}

fn keep_public_members(record: &mut EntityRecord) {
    record
        .fields
        .retain(|field| field.visibility == Visibility::Public);
    record
        .methods
        .retain(|method| method.visibility == Visibility::Public);
    record
        .effective
        .retain(|member| member.visibility == Visibility::Public);
    let kept: BTreeSet<&str> = record
        .effective
        .iter()
        .map(|member| member.name.as_str())
        .collect();
    record
        .overrides
        .retain(|item| kept.contains(item.name.as_str()));
}

fn package_records(entities: &BTreeMap<String, EntityRecord>) -> Vec<PackageRecord> {
    let mut packages: BTreeMap<&str, PackageRecord> = BTreeMap::new();
    for record in entities.values() {
        let package = packages
            .entry(record.scope.as_str())
            .or_insert_with(|| PackageRecord {
                name: record.scope.clone(),
                languages: Vec::new(),
                entities: 0,
                location: record.location.clone(),
            });
        package.entities += 1;
        if !package.languages.contains(&record.language) {
            package.languages.push(record.language);
            package.languages.sort();
        }
        if record.location < package.location {
            package.location = record.location.clone();
        }
    }
    packages.into_values().collect()
}

fn package_relationships(
    entities: &BTreeMap<String, EntityRecord>,
    relationships: &[RelationshipRecord],
) -> Vec<PackageRelationshipRecord> {
    let scope_of = |name: &str| entities.get(name).map(|record| record.scope.as_str());
    let mut lifted = BTreeSet::new();
    for relationship in relationships {
        let (Some(source), Some(target)) =
            (scope_of(&relationship.source), scope_of(&relationship.target))
        else {
            continue;
        };
        if source == target {
            continue;
        }
        lifted.insert(PackageRelationshipRecord {
            source: source.to_string(),
            target: target.to_string(),
            kind: relationship.kind,
        });
    }
    lifted.into_iter().collect()
}

fn entity_record(model: &UnifiedModel, entity: &Entity) -> EntityRecord {
    let set = model.effective(entity.id);
    let effective = set
        .map(|set| {
            set.members
                .iter()
                .map(|member| effective_record(model, member))
                .collect()
        })
        .unwrap_or_default();
    let overrides = set
        .map(|set| {
            set.overrides
                .iter()
                .map(|item| OverrideRecord {
                    name: item.name.clone(),
                    active: model.member_label(item.active),
                    overridden: model.member_label(item.overridden),
                    exact: item.exact,
                })
                .collect()
        })
        .unwrap_or_default();
    EntityRecord {
        name: entity.name.clone(),
        scope: entity.scope.clone(),
        language: entity.language,
        kind: entity.kind,
        visibility: entity.visibility,
        location: entity.location.clone(),
        fields: entity
            .fields
            .iter()
            .map(|field| field_record(model, field))
            .collect(),
        methods: entity
            .methods
            .iter()
            .map(|method| method_record(model, method))
            .collect(),
        bases: type_records(model, &entity.bases),
        interfaces: type_records(model, &entity.interfaces),
        effective,
        overrides,
        cyclic: set.is_some_and(|set| set.cyclic),
    }
}

fn field_record(model: &UnifiedModel, field: &Field) -> FieldRecord {
    FieldRecord {
        name: field.name.clone(),
        ty: type_record(model, &field.ty),
        visibility: field.visibility,
        anonymous: field.anonymous,
        location: field.location.clone(),
    }
}

fn method_record(model: &UnifiedModel, method: &Method) -> MethodRecord {
    MethodRecord {
        name: method.name.clone(),
        params: type_records(model, &method.params),
        returns: type_records(model, &method.returns),
        visibility: method.visibility,
        location: method.location.clone(),
    }
}

fn type_records(model: &UnifiedModel, refs: &[TypeRef]) -> Vec<TypeRefRecord> {
    refs.iter().map(|ty| type_record(model, ty)).collect()
}

fn type_record(model: &UnifiedModel, ty: &TypeRef) -> TypeRefRecord {
    let (resolution, target, candidates) = match &ty.resolution {
        Resolution::Resolved(id) => (
            ResolutionKind::Resolved,
            Some(model.qualified_name(*id)),
            Vec::new(),
        ),
        Resolution::Builtin => (ResolutionKind::Builtin, None, Vec::new()),
        Resolution::External => (ResolutionKind::External, None, Vec::new()),
        Resolution::Composite => (ResolutionKind::Composite, None, Vec::new()),
        Resolution::Untyped => (ResolutionKind::Untyped, None, Vec::new()),
        Resolution::Unresolved => (ResolutionKind::Unresolved, None, Vec::new()),
        Resolution::Ambiguous(ids) => (
            ResolutionKind::Ambiguous,
            None,
            ids.iter().map(|id| model.qualified_name(*id)).collect(),
        ),
    };
    TypeRefRecord {
        raw: ty.raw.clone(),
        resolution,
        target,
        candidates,
    }
}

fn effective_record(model: &UnifiedModel, member: &EffectiveMember) -> EffectiveRecord {
    EffectiveRecord {
        name: member.name.clone(),
        kind: member.kind,
        origin: model.qualified_name(member.origin.entity),
        promoted_from: member.promoted_from.map(|id| model.qualified_name(id)),
        via: member
            .via
            .iter()
            .map(|id| model.qualified_name(*id))
            .collect(),
        depth: member.depth,
        visibility: member.visibility,
    }
}

fn relationship_record(model: &UnifiedModel, relationship: &Relationship) -> RelationshipRecord {
    RelationshipRecord {
        kind: relationship.kind,
        source: model.qualified_name(relationship.source),
        target: model.qualified_name(relationship.target),
        basis: relationship.basis.clone(),
        location: relationship.location.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DeclNode, ParseUnit};
    use crate::normalize::normalize;

    fn shop() -> ModelExport {
        let m = "shop/models/user.go";
        let s = "shop/service/service.go";
        let loc = |file: &str, line| SourceLocation::new(file, line, line);
        let mut models = ParseUnit::new(m, "shop/models", Language::Go);
        for decl in [
            DeclNode::type_decl("User", loc(m, 1)),
            DeclNode::field("User", "Name", "string", loc(m, 2)),
            DeclNode::field("User", "id", "string", loc(m, 3)),
            DeclNode::method("User", "Hello", vec![], vec!["string".into()], loc(m, 5)),
            DeclNode::method("User", "reset", vec![], vec![], loc(m, 6)),
        ] {
            models.push(decl);
        }
        let mut service = ParseUnit::new(s, "shop/service", Language::Go);
        for decl in [
            DeclNode::type_decl("Service", loc(s, 1)),
            DeclNode::field("Service", "users", "*models.User", loc(s, 2)),
            DeclNode::type_decl("Admin", loc(s, 4)),
            DeclNode::embedded("Admin", "*models.User", loc(s, 5)),
            DeclNode::field("Admin", "Owner", "models.User", loc(s, 6)),
        ] {
            service.push(decl);
        }
        ModelExport::from_normalized(&normalize(&[models, service]))
    }

    #[test]
    fn format_parsing() {
        assert_eq!("json".parse::<Format>().unwrap(), Format::Json);
        assert_eq!("YML".parse::<Format>().unwrap(), Format::Yaml);
        assert!("toml".parse::<Format>().is_err());
    }

    #[test]
    fn level_parsing() {
        assert_eq!("Package".parse::<DetailLevel>().unwrap(), DetailLevel::Package);
        assert_eq!("class".parse::<DetailLevel>().unwrap(), DetailLevel::Class);
        assert_eq!(DetailLevel::default(), DetailLevel::Method);
        assert!("module".parse::<DetailLevel>().is_err());
    }

    #[test]
    fn empty_model_exports_and_hashes() {
        let export = ModelExport::new(&UnifiedModel::default(), &[]);
        assert_eq!(export.summary, ModelSummary::default());
        let json = export.to_json(false).unwrap();
        let back: ModelExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, export);
        assert_eq!(export.digest().unwrap(), back.digest().unwrap());
    }

    #[test]
    fn schema_names_top_level_fields() {
        let schema = schema().unwrap();
        let properties = &schema["properties"];
        for key in [
            "version",
            "level",
            "summary",
            "entities",
            "relationships",
            "packages",
            "diagnostics",
        ] {
            assert!(properties.get(key).is_some(), "missing {key}");
        }
    }

    #[test]
    fn class_level_keeps_public_members() {
        let full = shop();
        let class = full.clone().with_level(DetailLevel::Class);
        assert_eq!(class.level, DetailLevel::Class);
        assert_eq!(class.summary, full.summary);
        assert_eq!(class.relationships, full.relationships);

        let user = &class.entities["shop/models.User"];
        let fields: Vec<&str> = user.fields.iter().map(|f| f.name.as_str()).collect();
        let methods: Vec<&str> = user.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(fields, vec!["Name"]);
        assert_eq!(methods, vec!["Hello"]);
        assert!(
            user.effective
                .iter()
                .all(|member| member.visibility == Visibility::Public)
        );
        assert_eq!(full.entities["shop/models.User"].fields.len(), 2);
    }

    #[test]
    fn package_level_lifts_relationships_to_scopes() {
        let full = shop();
        let package = full.clone().with_level(DetailLevel::Package);
        assert!(package.entities.is_empty());
        assert!(package.relationships.is_empty());
        assert_eq!(package.summary, full.summary);

        let names: Vec<(&str, usize)> = package
            .packages
            .iter()
            .map(|p| (p.name.as_str(), p.entities))
            .collect();
        assert_eq!(names, vec![("shop/models", 1), ("shop/service", 2)]);
        assert_eq!(package.packages[1].languages, vec![Language::Go]);
        assert_eq!(package.packages[1].location.start_line, 1);

        // Two composes edges and one embeds edge collapse to one per kind.
        let lifted: Vec<(&str, &str, RelationKind)> = package
            .package_relationships
            .iter()
            .map(|r| (r.source.as_str(), r.target.as_str(), r.kind))
            .collect();
        assert_eq!(
            lifted,
            vec![
                ("shop/service", "shop/models", RelationKind::Composes),
                ("shop/service", "shop/models", RelationKind::Embeds),
            ]
        );

        let json = package.to_json(false).unwrap();
        let back: ModelExport = serde_json::from_str(&json).unwrap();
        assert_eq!(back, package);
    }
}
