use archir::adapter::scan::{ScanOptions, scan_paths, scan_repo_with_options};
use archir::adapter::load_units;
use archir::language::Language;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

fn write(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn repo() -> TempDir {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write(root, "pkg/models/user.go", "package models\n\ntype User struct {\n\tName string\n}\n");
    write(root, "pkg/models/user_methods.go", "package models\n\nfunc (u *User) Hello() string { return u.Name }\n");
    write(root, "web/app.ts", "export class App {\n  run(): void {}\n}\n");
    write(root, "web/types.d.ts", "declare class Hidden {}\n");
    write(root, "py/svc/__init__.py", "class Service:\n    pass\n");
    write(root, "README.md", "# repo\n");
    write(root, "vendor/skip.go", "package skip\n");
    write(root, ".gitignore", "vendor/\n");
    dir
}

fn rel_paths(options: &ScanOptions, root: &Path, paths: &[PathBuf]) -> Vec<String> {
    scan_paths(root, paths, options)
        .unwrap()
        .into_iter()
        .map(|file| file.rel_path)
        .collect()
}

fn options(no_ignore: bool) -> ScanOptions {
    ScanOptions {
        no_ignore,
        max_file_bytes: 0,
        languages: None,
    }
}

#[test]
fn finds_supported_sources_in_order() {
    let dir = repo();
    let files = scan_repo_with_options(dir.path(), &options(false)).unwrap();
    let found: Vec<(&str, Language)> = files
        .iter()
        .map(|file| (file.rel_path.as_str(), file.language))
        .collect();
    assert_eq!(
        found,
        vec![
            ("pkg/models/user.go", Language::Go),
            ("pkg/models/user_methods.go", Language::Go),
            ("py/svc/__init__.py", Language::Python),
            ("web/app.ts", Language::TypeScript),
        ]
    );
}

#[test]
fn no_ignore_includes_ignored_paths() {
    let dir = repo();
    let found = rel_paths(&options(true), dir.path(), &[]);
    assert!(found.contains(&"vendor/skip.go".to_string()));
}

#[test]
fn explicit_paths_and_language_filter() {
    let dir = repo();
    let found = rel_paths(
        &options(false),
        dir.path(),
        &[PathBuf::from("web"), PathBuf::from("pkg/models/user.go")],
    );
    assert_eq!(found, vec!["pkg/models/user.go", "web/app.ts"]);

    let only_go = ScanOptions {
        languages: Some(vec![Language::Go]),
        ..options(false)
    };
    let found = rel_paths(&only_go, dir.path(), &[]);
    assert_eq!(found, vec!["pkg/models/user.go", "pkg/models/user_methods.go"]);
}

#[test]
fn oversized_files_are_skipped() {
    let dir = repo();
    let small = ScanOptions {
        max_file_bytes: 40,
        ..options(false)
    };
    let found = rel_paths(&small, dir.path(), &[]);
    assert!(!found.contains(&"pkg/models/user.go".to_string()));
    assert!(found.contains(&"py/svc/__init__.py".to_string()));
}

#[test]
fn scanned_files_adapt_into_units() {
    let dir = repo();
    let files = scan_repo_with_options(dir.path(), &options(false)).unwrap();
    let units = load_units(&files).unwrap();
    let scopes: Vec<(&str, &str)> = units
        .iter()
        .map(|unit| (unit.path.as_str(), unit.scope.as_str()))
        .collect();
    assert_eq!(
        scopes,
        vec![
            ("pkg/models/user.go", "pkg/models"),
            ("pkg/models/user_methods.go", "pkg/models"),
            ("py/svc/__init__.py", "py.svc"),
            ("web/app.ts", "web/app"),
        ]
    );

    let normalized = archir::normalize::normalize(&units);
    let user = normalized.model.find("pkg/models.User").unwrap();
    assert_eq!(user.methods.len(), 1);
    assert!(normalized.model.find("py.svc.Service").is_some());
    assert!(normalized.model.find("web/app.App").is_some());
}
