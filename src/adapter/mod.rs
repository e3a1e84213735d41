//! Language front ends.
//!
//! Each adapter turns one source file into a [`ParseUnit`]: a flat list of
//! language-neutral [`DeclNode`]s. Adapters classify native constructs
//! (embedded fields, `extends`, `implements`, base classes) into declaration
//! kinds but never interpret visibility or resolve type names; that is the
//! normalizer's job.

use crate::adapter::scan::ScannedFile;
use crate::language::Language;
use crate::model::SourceLocation;
use anyhow::{Context, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, warn};
use tree_sitter::Node;

pub mod go;
pub mod python;
pub mod scan;
pub mod typescript;

#[derive(Debug, Error)]
pub enum AdapterError {
    #[error("no adapter for {0}")]
    Unsupported(String),
    #[error("load {language} grammar: {source}")]
    Grammar {
        language: Language,
        #[source]
        source: tree_sitter::LanguageError,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DeclKind {
    TypeDeclaration,
    InterfaceDeclaration,
    Field,
    Method,
    /// Explicit base-type binding; the owner inherits from `type_ref`.
    Extends,
    /// Explicit interface binding; the owner claims to satisfy `type_ref`.
    Implements,
}

/// Native visibility marker, passed through uninterpreted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct VisibilityHint {
    pub keyword: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclNode {
    pub kind: DeclKind,
    pub name: String,
    /// Enclosing or receiver type for members and bindings.
    pub owner: Option<String>,
    /// Field type, or the target of an `Extends`/`Implements` binding.
    pub type_ref: Option<String>,
    pub params: Vec<String>,
    pub returns: Vec<String>,
    pub visibility: VisibilityHint,
    pub anonymous: bool,
    pub location: SourceLocation,
}

impl DeclNode {
    fn bare(kind: DeclKind, name: &str, location: SourceLocation) -> Self {
        Self {
            kind,
            name: name.to_string(),
            owner: None,
            type_ref: None,
            params: Vec::new(),
            returns: Vec::new(),
            visibility: VisibilityHint::default(),
            anonymous: false,
            location,
        }
    }

    pub fn type_decl(name: &str, location: SourceLocation) -> Self {
        Self::bare(DeclKind::TypeDeclaration, name, location)
    }

    pub fn interface_decl(name: &str, location: SourceLocation) -> Self {
        Self::bare(DeclKind::InterfaceDeclaration, name, location)
    }

    pub fn field(owner: &str, name: &str, ty: &str, location: SourceLocation) -> Self {
        let mut node = Self::bare(DeclKind::Field, name, location);
        node.owner = Some(owner.to_string());
        node.type_ref = Some(ty.to_string());
        node
    }

    /// Anonymous field of type `ty`; the field takes the type's bare name.
    pub fn embedded(owner: &str, ty: &str, location: SourceLocation) -> Self {
        let mut node = Self::field(owner, embedded_field_name(ty), ty, location);
        node.anonymous = true;
        node
    }

    pub fn method(
        owner: &str,
        name: &str,
        params: Vec<String>,
        returns: Vec<String>,
        location: SourceLocation,
    ) -> Self {
        let mut node = Self::bare(DeclKind::Method, name, location);
        node.owner = Some(owner.to_string());
        node.params = params;
        node.returns = returns;
        node
    }

    pub fn extends(owner: &str, target: &str, location: SourceLocation) -> Self {
        let mut node = Self::bare(DeclKind::Extends, target, location);
        node.owner = Some(owner.to_string());
        node.type_ref = Some(target.to_string());
        node
    }

    pub fn implements(owner: &str, target: &str, location: SourceLocation) -> Self {
        let mut node = Self::bare(DeclKind::Implements, target, location);
        node.owner = Some(owner.to_string());
        node.type_ref = Some(target.to_string());
        node
    }

    pub fn with_keyword(mut self, keyword: Option<String>) -> Self {
        self.visibility.keyword = keyword;
        self
    }
}

/// Everything one adapter produced for one source file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseUnit {
    pub path: String,
    /// Qualified container of the declarations (package or module path).
    pub scope: String,
    pub language: Language,
    pub decls: Vec<DeclNode>,
}

impl ParseUnit {
    pub fn new(path: &str, scope: &str, language: Language) -> Self {
        Self {
            path: path.to_string(),
            scope: scope.to_string(),
            language,
            decls: Vec::new(),
        }
    }

    pub fn push(&mut self, decl: DeclNode) {
        self.decls.push(decl);
    }
}

pub trait SyntaxAdapter: Send {
    fn language(&self) -> Language;

    fn scope_from_rel_path(&self, rel_path: &str) -> String;

    fn adapt(&mut self, source: &str, rel_path: &str) -> Result<ParseUnit, AdapterError>;
}

/// One adapter per supported language, looked up by file extension.
pub struct AdapterRegistry {
    adapters: HashMap<Language, Box<dyn SyntaxAdapter>>,
}

impl AdapterRegistry {
    pub fn new() -> Result<Self, AdapterError> {
        let mut adapters: HashMap<Language, Box<dyn SyntaxAdapter>> = HashMap::new();
        adapters.insert(Language::Go, Box::new(go::GoAdapter::new()?));
        adapters.insert(
            Language::TypeScript,
            Box::new(typescript::TypescriptAdapter::new()?),
        );
        adapters.insert(Language::Python, Box::new(python::PythonAdapter::new()?));
        Ok(Self { adapters })
    }

    pub fn languages(&self) -> Vec<Language> {
        let mut languages: Vec<_> = self.adapters.keys().copied().collect();
        languages.sort();
        languages
    }

    pub fn adapter(&mut self, language: Language) -> Option<&mut (dyn SyntaxAdapter + 'static)> {
        self.adapters.get_mut(&language).map(|adapter| adapter.as_mut())
    }

    pub fn adapt(&mut self, source: &str, rel_path: &str) -> Result<ParseUnit, AdapterError> {
        let language = language_for_path(rel_path)
            .ok_or_else(|| AdapterError::Unsupported(rel_path.to_string()))?;
        let adapter = self
            .adapter(language)
            .ok_or_else(|| AdapterError::Unsupported(rel_path.to_string()))?;
        adapter.adapt(source, rel_path)
    }
}

/// Read and adapt every scanned file on the rayon pool. Each worker builds
/// its own registry since parsers are not shareable between threads.
/// Unreadable files are logged and skipped; output keeps input order.
pub fn load_units(files: &[ScannedFile]) -> Result<Vec<ParseUnit>> {
    let results: Vec<Result<Option<ParseUnit>>> = files
        .par_iter()
        .map_init(AdapterRegistry::new, |registry, file| {
            let registry = match registry {
                Ok(registry) => registry,
                Err(err) => return Err(anyhow::anyhow!("init adapters: {err}")),
            };
            let source = match crate::util::read_to_string(&file.abs_path) {
                Ok(source) => source,
                Err(err) => {
                    warn!(path = %file.rel_path, "skipping unreadable file: {err:#}");
                    return Ok(None);
                }
            };
            let unit = registry
                .adapt(&source, &file.rel_path)
                .with_context(|| format!("adapt {}", file.rel_path))?;
            debug!(path = %unit.path, scope = %unit.scope, decls = unit.decls.len(), "adapted");
            Ok(Some(unit))
        })
        .collect();
    let mut units = Vec::with_capacity(results.len());
    for result in results {
        if let Some(unit) = result? {
            units.push(unit);
        }
    }
    Ok(units)
}

pub fn language_for_path(rel_path: &str) -> Option<Language> {
    if rel_path.ends_with(".d.ts") {
        return None;
    }
    let ext = Path::new(rel_path).extension()?.to_str()?;
    Language::from_extension(ext)
}

/// Bare type name an anonymous field is known by: `*pkg.Base[T]` -> `Base`.
pub fn embedded_field_name(ty: &str) -> &str {
    let bare = crate::language::strip_type_sigils(ty);
    let bare = bare.split(['[', '<']).next().unwrap_or(bare);
    bare.rsplit('.').next().unwrap_or(bare)
}

pub(crate) fn location(node: Node<'_>, path: &str) -> SourceLocation {
    let start = node.start_position();
    let end = node.end_position();
    SourceLocation {
        file: path.to_string(),
        start_line: start.row as u32 + 1,
        start_col: start.column as u32 + 1,
        end_line: end.row as u32 + 1,
        end_col: end.column as u32 + 1,
    }
}

pub(crate) fn node_text(node: Node<'_>, source: &str) -> String {
    let start = node.start_byte();
    let end = node.end_byte();
    source.get(start..end).unwrap_or("").trim().to_string()
}

/// Split a relative path into directory segments and the file stem.
pub(crate) fn path_parts(rel_path: &str) -> (Vec<String>, String) {
    let path = Path::new(rel_path);
    let mut parts: Vec<String> = path
        .components()
        .filter_map(|comp| comp.as_os_str().to_str().map(|s| s.to_string()))
        .collect();
    let file = parts.pop().unwrap_or_default();
    let stem = Path::new(&file)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(&file)
        .to_string();
    (parts, stem)
}
