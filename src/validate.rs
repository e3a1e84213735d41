//! Read-only invariant checks over a finished model.

use crate::diagnostics::Diagnostic;
use crate::model::{
    Entity, EntityKind, RelationBasis, RelationKind, Resolution, SourceLocation, TypeRef,
    UnifiedModel, Visibility,
};
use crate::normalize::{conformance, promote};
use std::collections::{HashMap, HashSet};

pub fn validate(model: &UnifiedModel) -> Vec<Diagnostic> {
    let mut out = Vec::new();
    check_origins(model, &mut out);
    check_references(model, &mut out);
    check_cycles(model, &mut out);
    check_promotion(model, &mut out);
    check_conformance(model, &mut out);
    check_visibility(model, &mut out);
    out
}

/// I1: every member and edge points at an entity that exists.
fn check_origins(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    for orphan in model.orphans() {
        out.push(Diagnostic::missing_origin(
            &orphan.owner_qualified_name(),
            &orphan.name,
            Some(orphan.location.clone()),
        ));
    }
    for entity in model.entities() {
        let Some(set) = model.effective(entity.id) else {
            continue;
        };
        for member in &set.members {
            if model.member(member.origin).is_none() {
                out.push(Diagnostic::missing_origin(
                    &model.qualified_name(member.origin.entity),
                    &member.name,
                    Some(entity.location.clone()),
                ));
            }
        }
    }
    for relationship in model.relationships() {
        for end in [relationship.source, relationship.target] {
            if model.entity(end).is_none() {
                out.push(Diagnostic::missing_origin(
                    &model.qualified_name(end),
                    relationship.kind.as_str(),
                    relationship.location.clone(),
                ));
            }
        }
    }
}

/// Unresolved references are warnings; ambiguous ones are errors.
fn check_references(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    for entity in model.entities() {
        let mut refs: Vec<(Option<&str>, &TypeRef, &SourceLocation)> = Vec::new();
        for field in &entity.fields {
            refs.push((Some(field.name.as_str()), &field.ty, &field.location));
        }
        for method in &entity.methods {
            for ty in method.params.iter().chain(&method.returns) {
                refs.push((Some(method.name.as_str()), ty, &method.location));
            }
        }
        for ty in entity.bases.iter().chain(&entity.interfaces) {
            refs.push((None, ty, &entity.location));
        }

        for (member, ty, location) in refs {
            match &ty.resolution {
                Resolution::Unresolved => out.push(Diagnostic::unresolved_reference(
                    &entity.qualified_name,
                    member,
                    &ty.raw,
                    Some(location.clone()),
                )),
                Resolution::Ambiguous(candidates) => out.push(Diagnostic::ambiguous_reference(
                    &entity.qualified_name,
                    member,
                    &ty.raw,
                    candidates.iter().map(|id| model.qualified_name(*id)).collect(),
                    Some(location.clone()),
                )),
                _ => {}
            }
        }
    }
}

/// I2: `embeds` is acyclic.
fn check_cycles(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    for cycle in promote::embedding_cycles(model.entities().len(), model.relationships()) {
        let names = cycle.iter().map(|id| model.qualified_name(*id)).collect();
        let location = cycle
            .first()
            .and_then(|id| model.entity(*id))
            .map(|entity| entity.location.clone());
        out.push(Diagnostic::cyclic_embedding(names, location));
    }
}

/// I3: promoted members are exactly what the embedded effective sets offer,
/// minus names declared directly, at the shallowest depth available.
fn check_promotion(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    for entity in model.entities() {
        let Some(set) = model.effective(entity.id) else {
            continue;
        };
        let qualified = &entity.qualified_name;
        let location = Some(entity.location.clone());

        let own: HashSet<&str> = entity.own_members().map(|(_, member)| member.name()).collect();
        for name in &own {
            if !set.get(name).is_some_and(|member| member.is_own()) {
                out.push(Diagnostic::promotion_mismatch(
                    qualified,
                    name,
                    "direct declaration is missing from the effective set",
                    location.clone(),
                ));
            }
        }

        for conflict in &set.conflicts {
            out.push(Diagnostic::sibling_conflict(
                qualified,
                &conflict.name,
                &model.qualified_name(conflict.kept.entity),
                &model.qualified_name(conflict.dropped.entity),
                location.clone(),
            ));
        }

        if set.cyclic {
            if let Some(member) = set.members.iter().find(|member| !member.is_own()) {
                out.push(Diagnostic::promotion_mismatch(
                    qualified,
                    &member.name,
                    "entity is on an embedding cycle but has promoted members",
                    location.clone(),
                ));
            }
            continue;
        }

        let expected = expected_promotions(model, entity, &own);
        let mut seen = HashSet::new();
        for member in set.members.iter().filter(|member| !member.is_own()) {
            seen.insert(member.name.as_str());
            match expected.get(member.name.as_str()) {
                None if own.contains(member.name.as_str()) => {
                    out.push(Diagnostic::promotion_mismatch(
                        qualified,
                        &member.name,
                        "promoted member hides a direct declaration",
                        location.clone(),
                    ));
                }
                None => out.push(Diagnostic::promotion_mismatch(
                    qualified,
                    &member.name,
                    "promoted from no embedded entity",
                    location.clone(),
                )),
                Some(&depth) if depth != member.depth => {
                    out.push(Diagnostic::promotion_mismatch(
                        qualified,
                        &member.name,
                        &format!("promoted at depth {} but depth {depth} is available", member.depth),
                        location.clone(),
                    ));
                }
                Some(_) => {}
            }
        }
        let mut missing: Vec<&str> = expected
            .keys()
            .copied()
            .filter(|name| !seen.contains(name))
            .collect();
        missing.sort_unstable();
        for name in missing {
            out.push(Diagnostic::promotion_mismatch(
                qualified,
                name,
                "offered by an embedded entity but not promoted",
                location.clone(),
            ));
        }
    }
}

/// Shallowest depth at which each name can be promoted into `entity`.
fn expected_promotions<'a>(
    model: &'a UnifiedModel,
    entity: &Entity,
    own: &HashSet<&str>,
) -> HashMap<&'a str, u32> {
    let mut expected: HashMap<&'a str, u32> = HashMap::new();
    for relationship in model.relationships_from(entity.id) {
        if relationship.kind != RelationKind::Embeds {
            continue;
        }
        let Some(inner) = model.effective(relationship.target) else {
            continue;
        };
        for member in &inner.members {
            if own.contains(member.name.as_str())
                || !promote::is_promotable(member, entity, model.entities())
            {
                continue;
            }
            let depth = member.depth + 1;
            expected
                .entry(member.name.as_str())
                .and_modify(|best| *best = (*best).min(depth))
                .or_insert(depth);
        }
    }
    expected
}

/// I4: recorded `implements` edges hold, and structural ones are complete.
fn check_conformance(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    let mut recorded = HashSet::new();
    for relationship in model.relationships() {
        if relationship.kind != RelationKind::Implements {
            continue;
        }
        recorded.insert((relationship.source, relationship.target));
        let source = model.qualified_name(relationship.source);
        let target = model.qualified_name(relationship.target);
        match relationship.basis {
            RelationBasis::Structural => {
                if !conformance::satisfies_structurally(
                    model,
                    relationship.source,
                    relationship.target,
                ) {
                    out.push(Diagnostic::conformance_mismatch(
                        &source,
                        &target,
                        true,
                        relationship.location.clone(),
                    ));
                }
            }
            _ => {
                let missing =
                    conformance::missing_methods(model, relationship.source, relationship.target);
                if !missing.is_empty() {
                    out.push(Diagnostic::signature_mismatch(
                        &source,
                        &target,
                        missing,
                        relationship.location.clone(),
                    ));
                }
            }
        }
    }

    let structural = |entity: &&Entity| !entity.language.has_nominal_interfaces();
    let interfaces: Vec<&Entity> = model
        .entities()
        .iter()
        .filter(structural)
        .filter(|entity| entity.kind == EntityKind::Interface)
        .collect();
    for entity in model.entities().iter().filter(structural) {
        if entity.kind != EntityKind::Record {
            continue;
        }
        for interface in &interfaces {
            if !recorded.contains(&(entity.id, interface.id))
                && conformance::satisfies_structurally(model, entity.id, interface.id)
            {
                out.push(Diagnostic::conformance_mismatch(
                    &entity.qualified_name,
                    &interface.qualified_name,
                    false,
                    Some(entity.location.clone()),
                ));
            }
        }
    }
}

/// I5: private members never cross a scope boundary through promotion.
fn check_visibility(model: &UnifiedModel, out: &mut Vec<Diagnostic>) {
    for entity in model.entities() {
        let Some(set) = model.effective(entity.id) else {
            continue;
        };
        for member in &set.members {
            if member.is_own() || member.visibility != Visibility::Private {
                continue;
            }
            let origin_scope = model
                .entity(member.origin.entity)
                .map(|origin| origin.scope.as_str());
            if origin_scope != Some(entity.scope.as_str()) {
                out.push(Diagnostic::visibility_leak(
                    &entity.qualified_name,
                    &model.member_label(member.origin),
                    "private member promoted across scopes",
                    Some(entity.location.clone()),
                ));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{DeclNode, ParseUnit};
    use crate::diagnostics::DiagnosticCode;
    use crate::language::Language;
    use crate::model::{EffectiveSet, EntityId, Relationship};
    use crate::normalize::normalize;

    fn loc(line: u32) -> SourceLocation {
        SourceLocation::new("zoo/a.go", line, line)
    }

    fn zoo() -> UnifiedModel {
        let mut unit = ParseUnit::new("zoo/a.go", "zoo", Language::Go);
        for decl in [
            DeclNode::interface_decl("Speaker", loc(1)),
            DeclNode::method("Speaker", "Speak", vec![], vec!["string".into()], loc(2)),
            DeclNode::type_decl("Animal", loc(4)),
            DeclNode::field("Animal", "Name", "string", loc(5)),
            DeclNode::method("Animal", "Speak", vec![], vec!["string".into()], loc(6)),
            DeclNode::type_decl("Dog", loc(8)),
            DeclNode::embedded("Dog", "Animal", loc(9)),
        ] {
            unit.push(decl);
        }
        let normalized = normalize(&[unit]);
        assert!(normalized.diagnostics.is_empty(), "{:#?}", normalized.diagnostics);
        normalized.model
    }

    fn rebuild(
        model: &UnifiedModel,
        edit: impl FnOnce(&mut Vec<Relationship>, &mut Vec<EffectiveSet>),
    ) -> UnifiedModel {
        let mut relationships = model.relationships().to_vec();
        let mut effective: Vec<EffectiveSet> = model
            .entities()
            .iter()
            .map(|entity| model.effective(entity.id).cloned().unwrap_or_default())
            .collect();
        edit(&mut relationships, &mut effective);
        UnifiedModel::from_parts(
            model.entities().to_vec(),
            relationships,
            effective,
            model.orphans().to_vec(),
        )
    }

    fn codes(model: &UnifiedModel) -> Vec<DiagnosticCode> {
        validate(model).into_iter().map(|d| d.code).collect()
    }

    #[test]
    fn consistent_model_passes() {
        assert!(codes(&zoo()).is_empty());
    }

    #[test]
    fn dropped_promotion_is_reported() {
        let model = zoo();
        let dog = model.find("zoo.Dog").map(|e| e.id.index()).unwrap();
        let tampered = rebuild(&model, |_, effective| {
            effective[dog].members.retain(|member| member.name != "Name");
        });
        assert_eq!(codes(&tampered), vec![DiagnosticCode::PromotionMismatch]);
    }

    #[test]
    fn missing_structural_edge_is_reported() {
        let model = zoo();
        let tampered = rebuild(&model, |relationships, _| {
            relationships.retain(|r| r.kind != RelationKind::Implements);
        });
        let found = codes(&tampered);
        // Animal and Dog both satisfy Speaker.
        assert_eq!(found, vec![DiagnosticCode::SignatureMismatch; 2]);
    }

    #[test]
    fn structural_edge_that_does_not_hold_is_reported() {
        let model = zoo();
        let speaker = model.find("zoo.Speaker").map(|e| e.id).unwrap();
        let tampered = rebuild(&model, |relationships, _| {
            relationships.push(Relationship {
                kind: RelationKind::Implements,
                source: speaker,
                target: speaker,
                basis: RelationBasis::Structural,
                location: None,
            });
        });
        assert_eq!(codes(&tampered), vec![DiagnosticCode::SignatureMismatch]);
    }

    #[test]
    fn dangling_relationship_is_reported() {
        let model = zoo();
        let dog = model.find("zoo.Dog").map(|e| e.id).unwrap();
        let tampered = rebuild(&model, |relationships, _| {
            relationships.push(Relationship {
                kind: RelationKind::Composes,
                source: dog,
                target: EntityId::new(99),
                basis: RelationBasis::Field("Ghost".into()),
                location: None,
            });
        });
        assert_eq!(codes(&tampered), vec![DiagnosticCode::MissingOrigin]);
    }

    #[test]
    fn private_member_promoted_across_scopes_leaks() {
        let model = zoo();
        let dog = model.find("zoo.Dog").map(|e| e.id.index()).unwrap();
        let tampered = rebuild(&model, |_, effective| {
            for member in &mut effective[dog].members {
                if member.name == "Name" {
                    member.visibility = Visibility::Private;
                }
            }
        });
        // Same scope: allowed.
        assert!(codes(&tampered).is_empty());

        let mut entities = tampered.entities().to_vec();
        let animal = tampered.find("zoo.Animal").map(|e| e.id.index()).unwrap();
        entities[animal].scope = "zoo/internal".to_string();
        let moved = UnifiedModel::from_parts(
            entities,
            tampered.relationships().to_vec(),
            tampered
                .entities()
                .iter()
                .map(|e| tampered.effective(e.id).cloned().unwrap_or_default())
                .collect(),
            Vec::new(),
        );
        let found = codes(&moved);
        assert!(found.contains(&DiagnosticCode::VisibilityLeak), "{found:?}");
    }
}
