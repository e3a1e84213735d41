//! Parse units in, unified model and diagnostics out.
//!
//! Extraction is per unit and runs on the rayon pool; the collect is the
//! merge barrier. Everything after it is single-threaded and pure.

use crate::adapter::ParseUnit;
use crate::diagnostics::{self, Diagnostic};
use crate::model::UnifiedModel;
use crate::validate;
use rayon::prelude::*;
use tracing::{debug, info};

pub mod conformance;
pub mod extract;
pub mod promote;
pub mod resolve;

#[derive(Debug, Clone)]
pub struct Normalized {
    pub model: UnifiedModel,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn normalize(units: &[ParseUnit]) -> Normalized {
    let raw: Vec<extract::RawUnit> = units
        .par_iter()
        .map(|unit| {
            let raw = extract::extract_unit(unit);
            debug!(path = %raw.path, entities = raw.entities.len(), "extracted");
            raw
        })
        .collect();

    let resolved = resolve::resolve(raw);
    let effective = promote::effective_sets(&resolved.entities, &resolved.relationships);
    let model = UnifiedModel::from_parts(
        resolved.entities,
        resolved.relationships,
        effective,
        resolved.orphans,
    );
    let structural = conformance::structural_implements(&model);
    let model = model.with_relationships(structural);

    let mut found = resolved.diagnostics;
    found.extend(validate::validate(&model));
    let diagnostics = diagnostics::finalize(found);

    let (errors, warnings) = diagnostics::count(&diagnostics);
    info!(
        units = units.len(),
        entities = model.entities().len(),
        relationships = model.relationships().len(),
        errors,
        warnings,
        "normalized"
    );
    Normalized { model, diagnostics }
}
