//! Cross-unit merge and type resolution.
//!
//! Runs once every unit has been extracted. Entities get their arena ids
//! here, detached members find their owners, and every type reference is
//! classified. Fields naming another entity become `composes` or `embeds`
//! edges, explicit bases become `embeds`, `implements` clauses become
//! declared `implements` edges.

use super::extract::{Detached, RawBinding, RawEntity, RawField, RawItem, RawMethod, RawUnit};
use crate::diagnostics::Diagnostic;
use crate::language::{Language, strip_type_sigils};
use crate::model::{
    Entity, EntityId, Field, MemberKind, Method, OrphanMember, RelationBasis, RelationKind,
    Relationship, Resolution, TypeRef, qualify,
};
use std::collections::HashMap;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Resolved {
    pub entities: Vec<Entity>,
    pub relationships: Vec<Relationship>,
    pub orphans: Vec<OrphanMember>,
    pub diagnostics: Vec<Diagnostic>,
}

struct Pending {
    raw: RawEntity,
    scope: String,
    language: Language,
    qualified: String,
}

pub fn resolve(mut units: Vec<RawUnit>) -> Resolved {
    units.sort_by(|a, b| a.path.cmp(&b.path));

    let mut diagnostics = Vec::new();
    let mut pending: Vec<Pending> = Vec::new();
    let mut by_qualified: HashMap<String, usize> = HashMap::new();
    let mut detached: Vec<(String, Language, Detached)> = Vec::new();

    for unit in units {
        let RawUnit {
            scope,
            language,
            entities,
            detached: unit_detached,
            ..
        } = unit;
        for raw in entities {
            let qualified = qualify(&scope, &raw.name);
            if by_qualified.contains_key(&qualified) {
                diagnostics.push(Diagnostic::duplicate_entity(
                    &qualified,
                    Some(raw.location.clone()),
                ));
                continue;
            }
            by_qualified.insert(qualified.clone(), pending.len());
            pending.push(Pending {
                raw,
                scope: scope.clone(),
                language,
                qualified,
            });
        }
        detached.extend(
            unit_detached
                .into_iter()
                .map(|item| (scope.clone(), language, item)),
        );
    }

    let mut orphans = Vec::new();
    for (scope, language, item) in detached {
        let owner = qualify(&scope, &item.owner);
        match by_qualified.get(&owner) {
            Some(&slot) if pending[slot].language == language => pending[slot].raw.push(item.item),
            _ => {
                if let Some(orphan) = orphan_member(&scope, language, item) {
                    orphans.push(orphan);
                }
            }
        }
    }

    let index = TypeIndex::new(&pending);
    let mut entities = Vec::with_capacity(pending.len());
    let mut relationships = Vec::new();
    for (slot, entry) in pending.into_iter().enumerate() {
        let id = EntityId::new(slot);
        let entity = build_entity(id, entry, &index);
        collect_relationships(&entity, &mut relationships);
        entities.push(entity);
    }

    debug!(
        entities = entities.len(),
        relationships = relationships.len(),
        orphans = orphans.len(),
        "resolved"
    );
    Resolved {
        entities,
        relationships,
        orphans,
        diagnostics,
    }
}

fn orphan_member(scope: &str, language: Language, detached: Detached) -> Option<OrphanMember> {
    let (kind, name, location) = match detached.item {
        RawItem::Field(field) => (MemberKind::Field, field.name, field.location),
        RawItem::Method(method) => (MemberKind::Method, method.name, method.location),
        RawItem::Base(_) | RawItem::Implements(_) => {
            debug!(owner = %detached.owner, "dropping binding for undeclared owner");
            return None;
        }
    };
    Some(OrphanMember {
        scope: scope.to_string(),
        owner: detached.owner,
        language,
        kind,
        name,
        location,
    })
}

fn build_entity(id: EntityId, entry: Pending, index: &TypeIndex) -> Entity {
    let Pending {
        raw,
        scope,
        language,
        qualified,
    } = entry;
    let lookup = |raw: &str| TypeRef {
        raw: raw.to_string(),
        resolution: index.resolve(language, &scope, raw),
    };
    let fields = raw
        .fields
        .into_iter()
        .map(|field: RawField| Field {
            ty: lookup(&field.ty),
            name: field.name,
            visibility: field.visibility,
            anonymous: field.anonymous,
            location: field.location,
        })
        .collect();
    let methods = raw
        .methods
        .into_iter()
        .map(|method: RawMethod| Method {
            params: method.params.iter().map(|ty| lookup(ty)).collect(),
            returns: method.returns.iter().map(|ty| lookup(ty)).collect(),
            name: method.name,
            visibility: method.visibility,
            location: method.location,
        })
        .collect();
    let bases = raw
        .bases
        .iter()
        .map(|binding: &RawBinding| lookup(&binding.target))
        .collect();
    let interfaces = raw
        .implements
        .iter()
        .map(|binding: &RawBinding| lookup(&binding.target))
        .collect();
    Entity {
        id,
        name: raw.name,
        qualified_name: qualified,
        scope,
        language,
        kind: raw.kind,
        visibility: raw.visibility,
        location: raw.location,
        fields,
        methods,
        bases,
        interfaces,
    }
}

fn collect_relationships(entity: &Entity, out: &mut Vec<Relationship>) {
    for field in &entity.fields {
        let Some(target) = field.ty.resolved_entity() else {
            continue;
        };
        let kind = if field.anonymous {
            RelationKind::Embeds
        } else {
            RelationKind::Composes
        };
        out.push(Relationship {
            kind,
            source: entity.id,
            target,
            basis: RelationBasis::Field(field.name.clone()),
            location: Some(field.location.clone()),
        });
    }
    for base in &entity.bases {
        if let Some(target) = base.resolved_entity() {
            out.push(Relationship {
                kind: RelationKind::Embeds,
                source: entity.id,
                target,
                basis: RelationBasis::BaseType,
                location: Some(entity.location.clone()),
            });
        }
    }
    for interface in &entity.interfaces {
        if let Some(target) = interface.resolved_entity() {
            out.push(Relationship {
                kind: RelationKind::Implements,
                source: entity.id,
                target,
                basis: RelationBasis::Declared,
                location: Some(entity.location.clone()),
            });
        }
    }
}

/// Entity names by language, for type reference lookup.
struct TypeIndex {
    scopes: Vec<String>,
    by_name: HashMap<(Language, String), Vec<usize>>,
}

impl TypeIndex {
    fn new(pending: &[Pending]) -> Self {
        let mut by_name: HashMap<(Language, String), Vec<usize>> = HashMap::new();
        for (slot, entry) in pending.iter().enumerate() {
            by_name
                .entry((entry.language, entry.raw.name.clone()))
                .or_default()
                .push(slot);
        }
        Self {
            scopes: pending.iter().map(|entry| entry.scope.clone()).collect(),
            by_name,
        }
    }

    fn resolve(&self, language: Language, scope: &str, raw: &str) -> Resolution {
        if raw.trim().is_empty() {
            return Resolution::Untyped;
        }
        let mut name = strip_type_sigils(raw);
        if language == Language::Python {
            name = name.trim_matches(['"', '\'']);
        }
        if is_composite(name) {
            return Resolution::Composite;
        }
        if language.is_builtin_type(name) {
            return Resolution::Builtin;
        }

        if let Some((qualifier, simple)) = name.rsplit_once('.') {
            let candidates: Vec<usize> = self
                .candidates(language, simple)
                .iter()
                .copied()
                .filter(|&slot| scope_matches_qualifier(&self.scopes[slot], qualifier))
                .collect();
            if candidates.is_empty() {
                return Resolution::External;
            }
            return self.nearest(&candidates, scope);
        }

        let candidates = self.candidates(language, name);
        if candidates.is_empty() {
            return Resolution::Unresolved;
        }
        self.nearest(candidates, scope)
    }

    fn candidates(&self, language: Language, name: &str) -> &[usize] {
        self.by_name
            .get(&(language, name.to_string()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Same scope first, then the longest shared scope prefix. A tie at the
    /// best distance is ambiguous.
    fn nearest(&self, candidates: &[usize], scope: &str) -> Resolution {
        if let Some(&slot) = candidates
            .iter()
            .find(|&&slot| self.scopes[slot] == scope)
        {
            return Resolution::Resolved(EntityId::new(slot));
        }
        let from = scope_segments(scope);
        let scored: Vec<(usize, usize)> = candidates
            .iter()
            .map(|&slot| (slot, shared_prefix(&from, &scope_segments(&self.scopes[slot]))))
            .collect();
        let best = scored.iter().map(|(_, score)| *score).max().unwrap_or(0);
        let winners: Vec<EntityId> = scored
            .iter()
            .filter(|(_, score)| *score == best)
            .map(|(slot, _)| EntityId::new(*slot))
            .collect();
        match winners.as_slice() {
            [only] => Resolution::Resolved(*only),
            _ => Resolution::Ambiguous(winners),
        }
    }
}

/// Containers, unions, generics, function and channel types never name a
/// single entity.
fn is_composite(name: &str) -> bool {
    name.contains(['<', '[', '|', '&', '(', '{', ',', ' ']) || name.starts_with("...")
}

fn scope_matches_qualifier(scope: &str, qualifier: &str) -> bool {
    scope == qualifier
        || scope.ends_with(&format!("/{qualifier}"))
        || scope.ends_with(&format!(".{qualifier}"))
}

fn scope_segments(scope: &str) -> Vec<&str> {
    scope
        .split(['/', '.'])
        .filter(|segment| !segment.is_empty())
        .collect()
}

fn shared_prefix(a: &[&str], b: &[&str]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DeclNode, ParseUnit};
    use crate::model::SourceLocation;
    use crate::normalize::extract::extract_unit;
    use rstest::rstest;

    fn loc(path: &str, line: u32) -> SourceLocation {
        SourceLocation::new(path, line, line)
    }

    fn unit(path: &str, scope: &str, language: Language, decls: Vec<DeclNode>) -> RawUnit {
        let mut unit = ParseUnit::new(path, scope, language);
        unit.decls = decls;
        extract_unit(&unit)
    }

    fn go_unit(path: &str, scope: &str, decls: Vec<DeclNode>) -> RawUnit {
        unit(path, scope, Language::Go, decls)
    }

    #[rstest]
    #[case("", Resolution::Untyped)]
    #[case("string", Resolution::Builtin)]
    #[case("*int64", Resolution::Builtin)]
    #[case("[]Address", Resolution::Composite)]
    #[case("map[string]Address", Resolution::Composite)]
    #[case("func(int) error", Resolution::Composite)]
    #[case("chan Address", Resolution::Composite)]
    #[case("time.Time", Resolution::External)]
    #[case("Missing", Resolution::Unresolved)]
    #[case("*Address", Resolution::Resolved(EntityId::new(0)))]
    fn go_type_classification(#[case] raw: &str, #[case] expected: Resolution) {
        let path = "shop/address.go";
        let units = vec![go_unit(
            path,
            "shop",
            vec![
                DeclNode::type_decl("Address", loc(path, 1)),
                DeclNode::type_decl("Probe", loc(path, 2)),
                DeclNode::field("Probe", "value", raw, loc(path, 3)),
            ],
        )];
        let resolved = resolve(units);
        assert_eq!(resolved.entities[1].fields[0].ty.resolution, expected);
    }

    #[test]
    fn named_and_anonymous_fields_become_composes_and_embeds() {
        let path = "zoo/animals.go";
        let units = vec![go_unit(
            path,
            "zoo",
            vec![
                DeclNode::type_decl("Address", loc(path, 1)),
                DeclNode::type_decl("BaseAnimal", loc(path, 2)),
                DeclNode::type_decl("Dog", loc(path, 3)),
                DeclNode::embedded("Dog", "*BaseAnimal", loc(path, 4)),
                DeclNode::field("Dog", "Home", "Address", loc(path, 5)),
            ],
        )];
        let resolved = resolve(units);
        let kinds: Vec<(RelationKind, usize, usize)> = resolved
            .relationships
            .iter()
            .map(|r| (r.kind, r.source.index(), r.target.index()))
            .collect();
        assert_eq!(
            kinds,
            vec![
                (RelationKind::Embeds, 2, 1),
                (RelationKind::Composes, 2, 0),
            ]
        );
    }

    #[test]
    fn nearest_scope_wins_and_ties_are_ambiguous() {
        let units = vec![
            unit(
                "app/billing/models.py",
                "app.billing.models",
                Language::Python,
                vec![DeclNode::type_decl("Address", loc("app/billing/models.py", 1))],
            ),
            unit(
                "app/shipping/models.py",
                "app.shipping.models",
                Language::Python,
                vec![DeclNode::type_decl("Address", loc("app/shipping/models.py", 1))],
            ),
            unit(
                "app/billing/invoice.py",
                "app.billing.invoice",
                Language::Python,
                vec![
                    DeclNode::type_decl("Invoice", loc("app/billing/invoice.py", 1)),
                    DeclNode::field("Invoice", "address", "Address", loc("app/billing/invoice.py", 2)),
                ],
            ),
            unit(
                "app/report.py",
                "app.report",
                Language::Python,
                vec![
                    DeclNode::type_decl("Report", loc("app/report.py", 1)),
                    DeclNode::field("Report", "address", "Address", loc("app/report.py", 2)),
                ],
            ),
        ];
        let resolved = resolve(units);
        let invoice = resolved
            .entities
            .iter()
            .find(|e| e.name == "Invoice")
            .unwrap();
        let target = invoice.fields[0].ty.resolved_entity().unwrap();
        assert_eq!(
            resolved.entities[target.index()].qualified_name,
            "app.billing.models.Address"
        );

        let report = resolved
            .entities
            .iter()
            .find(|e| e.name == "Report")
            .unwrap();
        assert!(matches!(
            &report.fields[0].ty.resolution,
            Resolution::Ambiguous(ids) if ids.len() == 2
        ));
    }

    #[test]
    fn qualified_reference_selects_package() {
        let units = vec![
            go_unit(
                "svc/models/user.go",
                "svc/models",
                vec![DeclNode::type_decl("User", loc("svc/models/user.go", 1))],
            ),
            go_unit(
                "svc/api/user.go",
                "svc/api",
                vec![
                    DeclNode::type_decl("User", loc("svc/api/user.go", 1)),
                    DeclNode::type_decl("Handler", loc("svc/api/user.go", 2)),
                    DeclNode::field("Handler", "u", "*models.User", loc("svc/api/user.go", 3)),
                ],
            ),
        ];
        let resolved = resolve(units);
        let handler = resolved
            .entities
            .iter()
            .find(|e| e.name == "Handler")
            .unwrap();
        let target = handler.fields[0].ty.resolved_entity().unwrap();
        assert_eq!(resolved.entities[target.index()].qualified_name, "svc/models.User");
    }

    #[test]
    fn duplicates_keep_first_and_detached_members_merge() {
        let units = vec![
            go_unit(
                "zoo/b.go",
                "zoo",
                vec![
                    DeclNode::type_decl("Dog", loc("zoo/b.go", 1)),
                    DeclNode::method("Cat", "Meow", vec![], vec![], loc("zoo/b.go", 3)),
                ],
            ),
            go_unit(
                "zoo/a.go",
                "zoo",
                vec![
                    DeclNode::type_decl("Dog", loc("zoo/a.go", 1)),
                    DeclNode::method("Dog", "Bark", vec![], vec![], loc("zoo/a.go", 2)),
                ],
            ),
            go_unit(
                "zoo/c.go",
                "zoo",
                vec![DeclNode::method("Dog", "Fetch", vec![], vec![], loc("zoo/c.go", 1))],
            ),
        ];
        let resolved = resolve(units);
        assert_eq!(resolved.entities.len(), 1);
        let dog = &resolved.entities[0];
        assert_eq!(dog.location.file, "zoo/a.go");
        let methods: Vec<&str> = dog.methods.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(methods, vec!["Bark", "Fetch"]);
        assert_eq!(resolved.diagnostics.len(), 1);
        assert_eq!(resolved.orphans.len(), 1);
        assert_eq!(resolved.orphans[0].owner_qualified_name(), "zoo.Cat");
    }

    #[test]
    fn resolution_never_crosses_languages() {
        let units = vec![
            go_unit(
                "shared/address.go",
                "shared",
                vec![DeclNode::type_decl("Address", loc("shared/address.go", 1))],
            ),
            unit(
                "shared/person.ts",
                "shared/person",
                Language::TypeScript,
                vec![
                    DeclNode::type_decl("Person", loc("shared/person.ts", 1)),
                    DeclNode::field("Person", "address", "Address", loc("shared/person.ts", 2)),
                ],
            ),
        ];
        let resolved = resolve(units);
        let person = resolved
            .entities
            .iter()
            .find(|e| e.name == "Person")
            .unwrap();
        assert_eq!(person.fields[0].ty.resolution, Resolution::Unresolved);
        assert!(resolved.relationships.is_empty());
    }
}
