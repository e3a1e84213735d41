//! Interface satisfaction over effective method sets.

use crate::model::{
    EntityId, EntityKind, MemberKind, RelationBasis, RelationKind, Relationship, Signature,
    UnifiedModel, Visibility,
};

/// Public methods an interface requires, including ones it embeds.
pub fn required_methods(model: &UnifiedModel, interface: EntityId) -> Vec<(String, Signature)> {
    let Some(set) = model.effective(interface) else {
        return Vec::new();
    };
    set.methods()
        .filter(|member| member.visibility == Visibility::Public)
        .filter_map(|member| {
            let signature = model.member(member.origin)?.signature()?;
            Some((member.name.clone(), signature))
        })
        .collect()
}

/// Names of required methods `entity` lacks or declares with another
/// signature. Private methods never satisfy a requirement.
pub fn missing_methods(model: &UnifiedModel, entity: EntityId, interface: EntityId) -> Vec<String> {
    let provided = model.effective(entity);
    required_methods(model, interface)
        .into_iter()
        .filter(|(name, signature)| {
            let found = provided
                .and_then(|set| set.get(name))
                .filter(|member| {
                    member.kind == MemberKind::Method && member.visibility == Visibility::Public
                })
                .and_then(|member| model.member(member.origin))
                .and_then(|member| member.signature());
            found.as_ref() != Some(signature)
        })
        .map(|(name, _)| name)
        .collect()
}

/// Whether `entity` satisfies `interface` by method set alone. Interfaces
/// that require nothing are satisfied by everything and are not reported.
pub fn satisfies_structurally(model: &UnifiedModel, entity: EntityId, interface: EntityId) -> bool {
    let (Some(source), Some(target)) = (model.entity(entity), model.entity(interface)) else {
        return false;
    };
    entity != interface
        && source.kind == EntityKind::Record
        && target.kind == EntityKind::Interface
        && source.language == target.language
        && !required_methods(model, interface).is_empty()
        && missing_methods(model, entity, interface).is_empty()
}

/// Structural `implements` edges for languages without an `implements`
/// clause.
pub fn structural_implements(model: &UnifiedModel) -> Vec<Relationship> {
    let interfaces: Vec<EntityId> = model
        .entities()
        .iter()
        .filter(|entity| {
            entity.kind == EntityKind::Interface && !entity.language.has_nominal_interfaces()
        })
        .map(|entity| entity.id)
        .collect();
    let mut edges = Vec::new();
    for entity in model.entities() {
        if entity.kind != EntityKind::Record || entity.language.has_nominal_interfaces() {
            continue;
        }
        for &interface in &interfaces {
            if satisfies_structurally(model, entity.id, interface) {
                edges.push(Relationship {
                    kind: RelationKind::Implements,
                    source: entity.id,
                    target: interface,
                    basis: RelationBasis::Structural,
                    location: Some(entity.location.clone()),
                });
            }
        }
    }
    edges
}
