use crate::model::SourceLocation;
use blake3::Hasher;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

impl Severity {
    pub fn as_str(self) -> &'static str {
        match self {
            Severity::Error => "error",
            Severity::Warning => "warning",
        }
    }
}

/// Model invariants checked by the validator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub enum Invariant {
    /// Every member's origin entity exists; references point into the model.
    I1,
    /// `embeds` is acyclic.
    I2,
    /// Promoted members equal the embedded effective set minus redeclared names.
    I3,
    /// `implements` holds iff the method sets match.
    I4,
    /// Private members stay out of interface checks and cross-scope promotion.
    I5,
}

impl Invariant {
    pub fn as_str(self) -> &'static str {
        match self {
            Invariant::I1 => "I1",
            Invariant::I2 => "I2",
            Invariant::I3 => "I3",
            Invariant::I4 => "I4",
            Invariant::I5 => "I5",
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "PascalCase")]
pub enum DiagnosticCode {
    UnresolvedReference,
    AmbiguousReference,
    CyclicEmbedding,
    SignatureMismatch,
    MissingOrigin,
    DuplicateEntity,
    PromotionMismatch,
    VisibilityLeak,
}

impl DiagnosticCode {
    pub fn as_str(self) -> &'static str {
        match self {
            DiagnosticCode::UnresolvedReference => "UnresolvedReference",
            DiagnosticCode::AmbiguousReference => "AmbiguousReference",
            DiagnosticCode::CyclicEmbedding => "CyclicEmbedding",
            DiagnosticCode::SignatureMismatch => "SignatureMismatch",
            DiagnosticCode::MissingOrigin => "MissingOrigin",
            DiagnosticCode::DuplicateEntity => "DuplicateEntity",
            DiagnosticCode::PromotionMismatch => "PromotionMismatch",
            DiagnosticCode::VisibilityLeak => "VisibilityLeak",
        }
    }
}

/// One structured finding about the model. Entities are referred to by
/// qualified name and members as `Entity.member`, so a diagnostic stays
/// meaningful without the model it came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagnosticCode,
    pub invariant: Invariant,
    pub entities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub members: Vec<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    fn new(
        severity: Severity,
        code: DiagnosticCode,
        invariant: Invariant,
        entities: Vec<String>,
        members: Vec<String>,
        message: String,
        location: Option<SourceLocation>,
    ) -> Self {
        Self {
            severity,
            code,
            invariant,
            entities,
            members,
            message,
            location,
        }
    }

    pub fn unresolved_reference(
        entity: &str,
        member: Option<&str>,
        raw: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        let subject = member_subject(entity, member);
        Self::new(
            Severity::Warning,
            DiagnosticCode::UnresolvedReference,
            Invariant::I1,
            vec![entity.to_string()],
            member_list(entity, member),
            format!("{subject} references unknown type `{raw}`"),
            location,
        )
    }

    pub fn ambiguous_reference(
        entity: &str,
        member: Option<&str>,
        raw: &str,
        candidates: Vec<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        let subject = member_subject(entity, member);
        let message = format!(
            "{subject} references `{raw}`, which matches {} entities at the same scope distance: {}",
            candidates.len(),
            candidates.join(", ")
        );
        let mut entities = vec![entity.to_string()];
        entities.extend(candidates);
        Self::new(
            Severity::Error,
            DiagnosticCode::AmbiguousReference,
            Invariant::I1,
            entities,
            member_list(entity, member),
            message,
            location,
        )
    }

    /// Two embeds at the same depth both provide `member`; the earlier
    /// declared one was kept.
    pub fn sibling_conflict(
        entity: &str,
        member: &str,
        kept: &str,
        dropped: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(
            Severity::Warning,
            DiagnosticCode::AmbiguousReference,
            Invariant::I3,
            vec![entity.to_string(), kept.to_string(), dropped.to_string()],
            vec![format!("{entity}.{member}")],
            format!(
                "{entity}.{member} is promoted from both {kept} and {dropped} at the same depth; \
                 {kept} wins by declaration order"
            ),
            location,
        )
    }

    pub fn cyclic_embedding(mut entities: Vec<String>, location: Option<SourceLocation>) -> Self {
        entities.sort();
        entities.dedup();
        let message = format!(
            "embedding cycle between {}; promotion skipped for these entities",
            entities.join(" -> ")
        );
        Self::new(
            Severity::Error,
            DiagnosticCode::CyclicEmbedding,
            Invariant::I2,
            entities,
            Vec::new(),
            message,
            location,
        )
    }

    pub fn signature_mismatch(
        entity: &str,
        interface: &str,
        missing: Vec<String>,
        location: Option<SourceLocation>,
    ) -> Self {
        let message = format!(
            "{entity} declares that it implements {interface} but does not provide: {}",
            missing.join(", ")
        );
        let members = missing
            .iter()
            .map(|name| format!("{interface}.{name}"))
            .collect();
        Self::new(
            Severity::Error,
            DiagnosticCode::SignatureMismatch,
            Invariant::I4,
            vec![entity.to_string(), interface.to_string()],
            members,
            message,
            location,
        )
    }

    pub fn conformance_mismatch(
        entity: &str,
        interface: &str,
        recorded: bool,
        location: Option<SourceLocation>,
    ) -> Self {
        let message = if recorded {
            format!("{entity} is recorded as implementing {interface} but its method set does not match")
        } else {
            format!("{entity} satisfies {interface} structurally but no implements edge was recorded")
        };
        Self::new(
            Severity::Error,
            DiagnosticCode::SignatureMismatch,
            Invariant::I4,
            vec![entity.to_string(), interface.to_string()],
            Vec::new(),
            message,
            location,
        )
    }

    pub fn missing_origin(
        owner: &str,
        member: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(
            Severity::Error,
            DiagnosticCode::MissingOrigin,
            Invariant::I1,
            vec![owner.to_string()],
            vec![format!("{owner}.{member}")],
            format!("{owner}.{member} belongs to {owner}, which is not declared in the model"),
            location,
        )
    }

    pub fn duplicate_entity(entity: &str, location: Option<SourceLocation>) -> Self {
        Self::new(
            Severity::Error,
            DiagnosticCode::DuplicateEntity,
            Invariant::I1,
            vec![entity.to_string()],
            Vec::new(),
            format!("{entity} is declared more than once; the first declaration is kept"),
            location,
        )
    }

    pub fn promotion_mismatch(
        entity: &str,
        member: &str,
        detail: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(
            Severity::Error,
            DiagnosticCode::PromotionMismatch,
            Invariant::I3,
            vec![entity.to_string()],
            vec![format!("{entity}.{member}")],
            format!("{entity}.{member}: {detail}"),
            location,
        )
    }

    pub fn visibility_leak(
        entity: &str,
        member: &str,
        detail: &str,
        location: Option<SourceLocation>,
    ) -> Self {
        Self::new(
            Severity::Error,
            DiagnosticCode::VisibilityLeak,
            Invariant::I5,
            vec![entity.to_string()],
            vec![member.to_string()],
            format!("{member}: {detail}"),
            location,
        )
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Identity of the finding, independent of wording.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Hasher::new();
        push_str(&mut hasher, self.severity.as_str());
        push_str(&mut hasher, self.code.as_str());
        push_str(&mut hasher, self.invariant.as_str());
        for entity in &self.entities {
            push_str(&mut hasher, entity);
        }
        push_str(&mut hasher, "-");
        for member in &self.members {
            push_str(&mut hasher, member);
        }
        push_str(&mut hasher, "-");
        match &self.location {
            Some(location) => push_str(&mut hasher, &location.to_string()),
            None => push_str(&mut hasher, "-"),
        }
        hasher.finalize().to_hex().to_string()
    }

    fn sort_key(&self) -> (String, u32, u32, DiagnosticCode, &[String], &[String], &str) {
        let (file, line, col) = match &self.location {
            Some(location) => (location.file.clone(), location.start_line, location.start_col),
            None => (String::new(), 0, 0),
        };
        (
            file,
            line,
            col,
            self.code,
            &self.entities,
            &self.members,
            &self.message,
        )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}/{}]: {}",
            self.severity.as_str(),
            self.invariant.as_str(),
            self.code.as_str(),
            self.message
        )?;
        if let Some(location) = &self.location {
            write!(f, " ({location})")?;
        }
        Ok(())
    }
}

/// Drop duplicate findings and put the rest in a stable order.
pub fn finalize(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Diagnostic> = diagnostics
        .into_iter()
        .filter(|diagnostic| seen.insert(diagnostic.fingerprint()))
        .collect();
    unique.sort_by(|a, b| a.sort_key().cmp(&b.sort_key()));
    unique
}

pub fn count(diagnostics: &[Diagnostic]) -> (usize, usize) {
    let errors = diagnostics.iter().filter(|d| d.is_error()).count();
    (errors, diagnostics.len() - errors)
}

/// Whether the caller should treat this diagnostic list as a failure.
pub fn is_fatal(diagnostics: &[Diagnostic], deny_warnings: bool) -> bool {
    let (errors, warnings) = count(diagnostics);
    errors > 0 || (deny_warnings && warnings > 0)
}

fn member_subject(entity: &str, member: Option<&str>) -> String {
    match member {
        Some(member) => format!("{entity}.{member}"),
        None => entity.to_string(),
    }
}

fn member_list(entity: &str, member: Option<&str>) -> Vec<String> {
    member
        .map(|member| vec![format!("{entity}.{member}")])
        .unwrap_or_default()
}

fn push_str(hasher: &mut Hasher, value: &str) {
    hasher.update(value.as_bytes());
    hasher.update(b"\n");
}
