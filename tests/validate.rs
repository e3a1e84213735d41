use archir::adapter::{DeclNode, ParseUnit};
use archir::diagnostics::{self, Diagnostic, DiagnosticCode, Invariant, Severity};
use archir::language::Language;
use archir::model::{RelationKind, SourceLocation};
use archir::normalize::normalize;

fn loc(file: &str, line: u32) -> SourceLocation {
    SourceLocation::new(file, line, line)
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|item| item.to_string()).collect()
}

fn unit(path: &str, scope: &str, language: Language, decls: Vec<DeclNode>) -> ParseUnit {
    let mut unit = ParseUnit::new(path, scope, language);
    for decl in decls {
        unit.push(decl);
    }
    unit
}

fn with_code(diagnostics: &[Diagnostic], code: DiagnosticCode) -> Vec<&Diagnostic> {
    diagnostics.iter().filter(|d| d.code == code).collect()
}

#[test]
fn unknown_types_are_warnings() {
    let p = "app/a.go";
    let units = vec![unit(
        p,
        "app",
        Language::Go,
        vec![
            DeclNode::type_decl("Order", loc(p, 1)),
            DeclNode::field("Order", "Customer", "*Ghost", loc(p, 2)),
            DeclNode::field("Order", "Clock", "time.Time", loc(p, 3)),
        ],
    )];
    let normalized = normalize(&units);
    let found = with_code(&normalized.diagnostics, DiagnosticCode::UnresolvedReference);
    assert_eq!(found.len(), 1, "{:#?}", normalized.diagnostics);
    assert_eq!(found[0].severity, Severity::Warning);
    assert_eq!(found[0].members, strings(&["app.Order.Customer"]));
    assert_eq!(found[0].location.as_ref().map(|l| l.start_line), Some(2));

    assert!(!diagnostics::is_fatal(&normalized.diagnostics, false));
    assert!(diagnostics::is_fatal(&normalized.diagnostics, true));
}

#[test]
fn equally_near_candidates_are_ambiguous() {
    let units = vec![
        unit(
            "a/x.py",
            "a.x",
            Language::Python,
            vec![DeclNode::type_decl("Thing", loc("a/x.py", 1))],
        ),
        unit(
            "b/y.py",
            "b.y",
            Language::Python,
            vec![DeclNode::type_decl("Thing", loc("b/y.py", 1))],
        ),
        unit(
            "c/z.py",
            "c.z",
            Language::Python,
            vec![
                DeclNode::type_decl("Holder", loc("c/z.py", 1)),
                DeclNode::field("Holder", "thing", "Thing", loc("c/z.py", 2)),
            ],
        ),
    ];
    let normalized = normalize(&units);
    let found = with_code(&normalized.diagnostics, DiagnosticCode::AmbiguousReference);
    assert_eq!(found.len(), 1, "{:#?}", normalized.diagnostics);
    assert_eq!(found[0].severity, Severity::Error);
    assert_eq!(found[0].invariant, Invariant::I1);
    assert_eq!(found[0].entities, strings(&["c.z.Holder", "a.x.Thing", "b.y.Thing"]));

    let holder = normalized.model.find("c.z.Holder").unwrap();
    assert!(normalized.model.relationships_from(holder.id).next().is_none());
}

#[test]
fn members_without_owner_are_orphans() {
    let p = "svc/handler.go";
    let units = vec![unit(
        p,
        "svc",
        Language::Go,
        vec![DeclNode::method("Handler", "Serve", vec![], vec![], loc(p, 3))],
    )];
    let normalized = normalize(&units);
    assert_eq!(normalized.model.orphans().len(), 1);
    let found = with_code(&normalized.diagnostics, DiagnosticCode::MissingOrigin);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].entities, strings(&["svc.Handler"]));
    assert_eq!(found[0].members, strings(&["svc.Handler.Serve"]));
}

#[test]
fn duplicate_declarations_keep_the_first() {
    let units = vec![
        unit(
            "pkg/b.go",
            "pkg",
            Language::Go,
            vec![
                DeclNode::type_decl("Config", loc("pkg/b.go", 1)),
                DeclNode::field("Config", "Second", "int", loc("pkg/b.go", 2)),
            ],
        ),
        unit(
            "pkg/a.go",
            "pkg",
            Language::Go,
            vec![
                DeclNode::type_decl("Config", loc("pkg/a.go", 1)),
                DeclNode::field("Config", "First", "int", loc("pkg/a.go", 2)),
            ],
        ),
    ];
    let normalized = normalize(&units);
    let found = with_code(&normalized.diagnostics, DiagnosticCode::DuplicateEntity);
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].location.as_ref().map(|l| l.file.as_str()), Some("pkg/b.go"));

    let config = normalized.model.find("pkg.Config").unwrap();
    assert_eq!(config.location.file, "pkg/a.go");
    assert_eq!(config.fields.len(), 1);
    assert_eq!(config.fields[0].name, "First");
}

#[test]
fn sibling_embeds_with_same_member_warn() {
    let p = "io/rw.go";
    let units = vec![unit(
        p,
        "io",
        Language::Go,
        vec![
            DeclNode::type_decl("Reader", loc(p, 1)),
            DeclNode::method("Reader", "Close", vec![], strings(&["error"]), loc(p, 2)),
            DeclNode::type_decl("Writer", loc(p, 4)),
            DeclNode::method("Writer", "Close", vec![], strings(&["error"]), loc(p, 5)),
            DeclNode::type_decl("ReadWriter", loc(p, 7)),
            DeclNode::embedded("ReadWriter", "Reader", loc(p, 8)),
            DeclNode::embedded("ReadWriter", "*Writer", loc(p, 9)),
        ],
    )];
    let normalized = normalize(&units);
    let model = &normalized.model;
    let found = with_code(&normalized.diagnostics, DiagnosticCode::AmbiguousReference);
    assert_eq!(found.len(), 1, "{:#?}", normalized.diagnostics);
    assert_eq!(found[0].severity, Severity::Warning);
    assert_eq!(found[0].invariant, Invariant::I3);
    assert_eq!(found[0].members, strings(&["io.ReadWriter.Close"]));

    let rw = model.find("io.ReadWriter").unwrap();
    let reader = model.find("io.Reader").unwrap();
    let close = model.effective(rw.id).unwrap().get("Close").unwrap();
    assert_eq!(close.promoted_from, Some(reader.id));
    assert!(!diagnostics::is_fatal(&normalized.diagnostics, false));
}

#[test]
fn own_member_settles_sibling_embeds() {
    let p = "z/close.go";
    let units = vec![unit(
        p,
        "z",
        Language::Go,
        vec![
            DeclNode::type_decl("A", loc(p, 1)),
            DeclNode::method("A", "Close", vec![], strings(&["error"]), loc(p, 2)),
            DeclNode::type_decl("B", loc(p, 4)),
            DeclNode::method("B", "Close", vec![], strings(&["error"]), loc(p, 5)),
            DeclNode::type_decl("E", loc(p, 7)),
            DeclNode::embedded("E", "A", loc(p, 8)),
            DeclNode::embedded("E", "B", loc(p, 9)),
            DeclNode::method("E", "Close", vec![], strings(&["error"]), loc(p, 10)),
        ],
    )];
    let normalized = normalize(&units);
    assert!(normalized.diagnostics.is_empty(), "{:#?}", normalized.diagnostics);
    assert!(!diagnostics::is_fatal(&normalized.diagnostics, true));

    let model = &normalized.model;
    let e = model.find("z.E").unwrap();
    let set = model.effective(e.id).unwrap();
    assert!(set.conflicts.is_empty());
    assert!(set.get("Close").unwrap().is_own());
    assert_eq!(set.overrides.len(), 1);
    assert_eq!(set.overrides[0].overridden.entity, model.find("z.A").unwrap().id);
}

#[test]
fn broken_implements_claims_are_errors() {
    let p = "src/shapes.ts";
    let units = vec![unit(
        p,
        "src/shapes",
        Language::TypeScript,
        vec![
            DeclNode::interface_decl("Shape", loc(p, 1)),
            DeclNode::method("Shape", "area", vec![], strings(&["number"]), loc(p, 2)),
            DeclNode::method("Shape", "name", vec![], strings(&["string"]), loc(p, 3)),
            DeclNode::type_decl("Square", loc(p, 5)),
            DeclNode::implements("Square", "Shape", loc(p, 5)),
            DeclNode::method("Square", "area", vec![], strings(&["number"]), loc(p, 6)),
            DeclNode::method("Square", "name", vec![], strings(&["string"]), loc(p, 7))
                .with_keyword(Some("private".to_string())),
        ],
    )];
    let normalized = normalize(&units);
    let found = with_code(&normalized.diagnostics, DiagnosticCode::SignatureMismatch);
    assert_eq!(found.len(), 1, "{:#?}", normalized.diagnostics);
    assert_eq!(found[0].invariant, Invariant::I4);
    assert_eq!(found[0].entities, strings(&["src/shapes.Square", "src/shapes.Shape"]));
    assert_eq!(found[0].members, strings(&["src/shapes.Shape.name"]));

    // The declared edge is kept so the claim stays visible.
    let model = &normalized.model;
    let square = model.find("src/shapes.Square").unwrap();
    let shape = model.find("src/shapes.Shape").unwrap();
    assert!(model.has_relationship(RelationKind::Implements, square.id, shape.id));
}

#[test]
fn private_members_stay_in_their_scope() {
    let a = "lib/base/base.go";
    let b = "app/app.go";
    let units = vec![
        unit(
            a,
            "lib/base",
            Language::Go,
            vec![
                DeclNode::type_decl("Base", loc(a, 1)),
                DeclNode::field("Base", "secret", "string", loc(a, 2)),
                DeclNode::method("Base", "Open", vec![], strings(&["error"]), loc(a, 4)),
                DeclNode::method("Base", "close", vec![], strings(&["error"]), loc(a, 5)),
            ],
        ),
        unit(
            b,
            "app",
            Language::Go,
            vec![
                DeclNode::type_decl("Service", loc(b, 1)),
                DeclNode::embedded("Service", "*base.Base", loc(b, 2)),
                DeclNode::interface_decl("closer", loc(b, 4)),
                DeclNode::method("closer", "close", vec![], strings(&["error"]), loc(b, 5)),
            ],
        ),
    ];
    let normalized = normalize(&units);
    let model = &normalized.model;
    let service = model.find("app.Service").unwrap();
    let set = model.effective(service.id).unwrap();
    assert!(set.get("Open").is_some());
    assert!(set.get("secret").is_none());
    assert!(set.get("close").is_none());

    // Private interface methods are never requirements.
    assert!(
        model
            .relationships()
            .iter()
            .all(|r| r.kind != RelationKind::Implements)
    );
    assert!(normalized.diagnostics.is_empty(), "{:#?}", normalized.diagnostics);
}

#[test]
fn diagnostics_are_ordered_and_unique() {
    let p = "app/a.go";
    let units = vec![unit(
        p,
        "app",
        Language::Go,
        vec![
            DeclNode::type_decl("A", loc(p, 1)),
            DeclNode::field("A", "X", "Missing", loc(p, 2)),
            DeclNode::field("A", "Y", "Missing", loc(p, 3)),
            DeclNode::method("Nobody", "Run", vec![], vec![], loc(p, 5)),
        ],
    )];
    let first = normalize(&units).diagnostics;
    let second = normalize(&units).diagnostics;
    assert_eq!(first, second);
    assert_eq!(first.len(), 3);
    // Source order, not emission order.
    let lines: Vec<u32> = first
        .iter()
        .filter_map(|d| d.location.as_ref().map(|l| l.start_line))
        .collect();
    assert_eq!(lines, vec![2, 3, 5]);
    assert_eq!(first[2].code, DiagnosticCode::MissingOrigin);
}
