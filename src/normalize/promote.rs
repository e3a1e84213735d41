//! Effective member sets.
//!
//! Entities are visited leaves first over the `embeds` graph so every
//! embedded entity's effective set is final before anything that embeds it
//! reads it. Entities on an embedding cycle keep their own members only.

use crate::model::{
    EffectiveMember, EffectiveSet, Entity, EntityId, MemberRef, Override, RelationKind,
    Relationship, SiblingConflict, Visibility,
};
use std::collections::HashMap;

pub fn effective_sets(entities: &[Entity], relationships: &[Relationship]) -> Vec<EffectiveSet> {
    let graph = embedding_graph(entities.len(), relationships);
    let mut sets: Vec<Option<EffectiveSet>> = vec![None; entities.len()];
    for component in strongly_connected(&graph) {
        let cyclic = is_cycle(&component, &graph);
        for &node in &component {
            let set = if cyclic {
                own_only(&entities[node], true)
            } else {
                promote(&entities[node], &graph[node], entities, &sets)
            };
            sets[node] = Some(set);
        }
    }
    sets.into_iter().map(Option::unwrap_or_default).collect()
}

/// Groups of entities that embed each other, each sorted by id.
pub fn embedding_cycles(entity_count: usize, relationships: &[Relationship]) -> Vec<Vec<EntityId>> {
    let graph = embedding_graph(entity_count, relationships);
    strongly_connected(&graph)
        .into_iter()
        .filter(|component| is_cycle(component, &graph))
        .map(|component| component.into_iter().map(EntityId::new).collect())
        .collect()
}

/// Outgoing `embeds` targets per entity, in declaration order.
fn embedding_graph(entity_count: usize, relationships: &[Relationship]) -> Vec<Vec<usize>> {
    let mut graph: Vec<Vec<usize>> = vec![Vec::new(); entity_count];
    for relationship in relationships {
        if relationship.kind != RelationKind::Embeds {
            continue;
        }
        let (source, target) = (relationship.source.index(), relationship.target.index());
        if source >= entity_count || target >= entity_count {
            continue;
        }
        if !graph[source].contains(&target) {
            graph[source].push(target);
        }
    }
    graph
}

fn is_cycle(component: &[usize], graph: &[Vec<usize>]) -> bool {
    match component {
        [single] => graph[*single].contains(single),
        _ => true,
    }
}

/// Tarjan's algorithm with an explicit work stack. Components come out in
/// reverse topological order: everything a component points at is emitted
/// before it.
fn strongly_connected(graph: &[Vec<usize>]) -> Vec<Vec<usize>> {
    const UNVISITED: usize = usize::MAX;
    let count = graph.len();
    let mut index = vec![UNVISITED; count];
    let mut lowlink = vec![0; count];
    let mut on_stack = vec![false; count];
    let mut stack = Vec::new();
    let mut components = Vec::new();
    let mut next = 0;
    let mut work: Vec<(usize, usize)> = Vec::new();

    for root in 0..count {
        if index[root] != UNVISITED {
            continue;
        }
        work.push((root, 0));
        while let Some((node, edge)) = work.last().copied() {
            if index[node] == UNVISITED {
                index[node] = next;
                lowlink[node] = next;
                next += 1;
                stack.push(node);
                on_stack[node] = true;
            }
            if let Some(&succ) = graph[node].get(edge) {
                if let Some(top) = work.last_mut() {
                    top.1 += 1;
                }
                if index[succ] == UNVISITED {
                    work.push((succ, 0));
                } else if on_stack[succ] {
                    lowlink[node] = lowlink[node].min(index[succ]);
                }
                continue;
            }
            work.pop();
            if let Some(&(parent, _)) = work.last() {
                lowlink[parent] = lowlink[parent].min(lowlink[node]);
            }
            if lowlink[node] == index[node] {
                let mut component = Vec::new();
                while let Some(member) = stack.pop() {
                    on_stack[member] = false;
                    component.push(member);
                    if member == node {
                        break;
                    }
                }
                component.sort_unstable();
                components.push(component);
            }
        }
    }
    components
}

fn own_only(entity: &Entity, cyclic: bool) -> EffectiveSet {
    let members = entity
        .own_members()
        .map(|(origin, member)| EffectiveMember {
            name: member.name().to_string(),
            kind: member.kind(),
            origin,
            promoted_from: None,
            via: Vec::new(),
            depth: 0,
            visibility: member.visibility(),
        })
        .collect();
    EffectiveSet {
        members,
        cyclic,
        ..EffectiveSet::default()
    }
}

/// Private members travel only between entities of the same scope.
pub fn is_promotable(member: &EffectiveMember, into: &Entity, entities: &[Entity]) -> bool {
    member.visibility != Visibility::Private
        || entities
            .get(member.origin.entity.index())
            .is_some_and(|origin| origin.scope == into.scope)
}

struct Candidate {
    member: EffectiveMember,
    /// Position of the embed it arrived through.
    embed: usize,
}

fn promote(
    entity: &Entity,
    embedded: &[usize],
    entities: &[Entity],
    sets: &[Option<EffectiveSet>],
) -> EffectiveSet {
    let mut set = own_only(entity, false);

    let mut groups: Vec<(String, Vec<Candidate>)> = Vec::new();
    let mut group_of: HashMap<String, usize> = HashMap::new();
    for (embed, &target) in embedded.iter().enumerate() {
        let Some(Some(inner)) = sets.get(target) else {
            continue;
        };
        let via_target = EntityId::new(target);
        for member in &inner.members {
            if !is_promotable(member, entity, entities) {
                continue;
            }
            let via = if member.is_own() {
                Vec::new()
            } else {
                std::iter::once(via_target)
                    .chain(member.via.iter().copied())
                    .collect()
            };
            let promoted = EffectiveMember {
                name: member.name.clone(),
                kind: member.kind,
                origin: member.origin,
                promoted_from: Some(member.origin.entity),
                via,
                depth: member.depth + 1,
                visibility: member.visibility,
            };
            let slot = *group_of.entry(member.name.clone()).or_insert_with(|| {
                groups.push((member.name.clone(), Vec::new()));
                groups.len() - 1
            });
            groups[slot].1.push(Candidate {
                member: promoted,
                embed,
            });
        }
    }

    let mut winners: Vec<(u32, usize, EffectiveMember)> = Vec::new();
    for (order, (name, candidates)) in groups.into_iter().enumerate() {
        let Some(depth) = candidates.iter().map(|c| c.member.depth).min() else {
            continue;
        };
        let mut shallowest = candidates.into_iter().filter(|c| c.member.depth == depth);
        let Some(winner) = shallowest.next() else {
            continue;
        };
        if let Some(own) = set.get(&name) {
            let active = own.origin;
            let exact = own.kind == winner.member.kind
                && signatures_match(entities, active, winner.member.origin);
            set.overrides.push(Override {
                name,
                active,
                overridden: winner.member.origin,
                exact,
            });
            continue;
        }
        for other in shallowest {
            if other.embed != winner.embed && other.member.origin != winner.member.origin {
                set.conflicts.push(SiblingConflict {
                    name: name.clone(),
                    kept: winner.member.origin,
                    dropped: other.member.origin,
                });
            }
        }
        winners.push((depth, order, winner.member));
    }

    winners.sort_by_key(|(depth, order, _)| (*depth, *order));
    set.members
        .extend(winners.into_iter().map(|(_, _, member)| member));
    set
}

fn signatures_match(entities: &[Entity], a: MemberRef, b: MemberRef) -> bool {
    let lookup = |member: MemberRef| {
        entities
            .get(member.entity.index())
            .and_then(|entity| entity.member(member.kind, member.index))
            .map(|member| member.signature())
    };
    match (lookup(a), lookup(b)) {
        (Some(left), Some(right)) => left == right,
        _ => false,
    }
}
