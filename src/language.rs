use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::model::Visibility;

const GO_BUILTINS: &[&str] = &[
    "any", "bool", "byte", "comparable", "complex64", "complex128", "error", "float32", "float64",
    "int", "int8", "int16", "int32", "int64", "rune", "string", "uint", "uint8", "uint16",
    "uint32", "uint64", "uintptr",
];

const TYPESCRIPT_BUILTINS: &[&str] = &[
    "Array", "BigInt", "Date", "Error", "Function", "Map", "Object", "Promise", "ReadonlyArray",
    "Record", "RegExp", "Set", "String", "Number", "Boolean", "Symbol", "WeakMap", "WeakSet",
    "any", "bigint", "boolean", "never", "null", "number", "object", "string", "symbol",
    "undefined", "unknown", "void", "this",
];

const PYTHON_BUILTINS: &[&str] = &[
    "Any", "None", "bool", "bytearray", "bytes", "complex", "dict", "float", "frozenset", "int",
    "list", "object", "set", "str", "tuple", "type", "Callable", "Dict", "List", "Optional",
    "Set", "Tuple", "Union", "Protocol", "ABC", "Exception", "BaseException", "ValueError",
    "Enum", "NamedTuple", "TypedDict", "Iterable", "Iterator", "Sequence", "Mapping",
];

/// Source languages the normalizer knows the conventions of.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    Go,
    TypeScript,
    Python,
}

impl Language {
    pub const ALL: [Language; 3] = [Language::Go, Language::TypeScript, Language::Python];

    pub fn as_str(self) -> &'static str {
        match self {
            Language::Go => "go",
            Language::TypeScript => "typescript",
            Language::Python => "python",
        }
    }

    /// Canonical visibility for a member or type named `name`.
    ///
    /// `keyword` is the native modifier handed through by the adapter, if the
    /// language has one. Go encodes visibility in the identifier's first
    /// letter, Python in a leading underscore, TypeScript in keywords or a
    /// `#` prefix.
    pub fn visibility(self, name: &str, keyword: Option<&str>) -> Visibility {
        match self {
            Language::Go => {
                let bare = strip_type_sigils(name);
                let bare = bare.rsplit('.').next().unwrap_or(bare);
                match bare.chars().next() {
                    Some(ch) if ch.is_uppercase() => Visibility::Public,
                    _ => Visibility::Private,
                }
            }
            Language::TypeScript => {
                if name.starts_with('#') {
                    return Visibility::Private;
                }
                match keyword {
                    Some("private") => Visibility::Private,
                    Some("protected") => Visibility::Protected,
                    _ => Visibility::Public,
                }
            }
            Language::Python => {
                let is_dunder = name.starts_with("__") && name.ends_with("__") && name.len() > 4;
                if name.starts_with('_') && !is_dunder {
                    Visibility::Private
                } else {
                    Visibility::Public
                }
            }
        }
    }

    /// Whether interface satisfaction is declared in source (`implements`)
    /// rather than inferred from method sets.
    pub fn has_nominal_interfaces(self) -> bool {
        matches!(self, Language::TypeScript)
    }

    pub fn is_builtin_type(self, name: &str) -> bool {
        let table = match self {
            Language::Go => GO_BUILTINS,
            Language::TypeScript => TYPESCRIPT_BUILTINS,
            Language::Python => PYTHON_BUILTINS,
        };
        table.contains(&name)
    }

    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Language::Go => &["go"],
            Language::TypeScript => &["ts", "mts", "cts"],
            Language::Python => &["py", "pyi"],
        }
    }

    pub fn from_extension(ext: &str) -> Option<Language> {
        Language::ALL
            .into_iter()
            .find(|language| language.extensions().contains(&ext))
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "go" | "golang" => Ok(Language::Go),
            "ts" | "typescript" => Ok(Language::TypeScript),
            "py" | "python" => Ok(Language::Python),
            other => Err(anyhow::anyhow!("unsupported language: {other}")),
        }
    }
}

/// Strip pointer and reference sigils that do not change which entity a type
/// reference names.
pub fn strip_type_sigils(raw: &str) -> &str {
    raw.trim().trim_start_matches(['*', '&']).trim()
}

/// Collapse whitespace so that `string | null` and `string|null` compare equal.
pub fn normalize_type_text(raw: &str) -> String {
    raw.chars().filter(|ch| !ch.is_whitespace()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Language::Go, "Name", None, Visibility::Public)]
    #[case(Language::Go, "id", None, Visibility::Private)]
    #[case(Language::Go, "*BaseAnimal", None, Visibility::Public)]
    #[case(Language::Go, "models.base", None, Visibility::Private)]
    #[case(Language::TypeScript, "id", Some("private"), Visibility::Private)]
    #[case(Language::TypeScript, "secret", Some("protected"), Visibility::Protected)]
    #[case(Language::TypeScript, "name", Some("public"), Visibility::Public)]
    #[case(Language::TypeScript, "name", None, Visibility::Public)]
    #[case(Language::TypeScript, "#hidden", None, Visibility::Private)]
    #[case(Language::Python, "_cache", None, Visibility::Private)]
    #[case(Language::Python, "__slots__", None, Visibility::Public)]
    #[case(Language::Python, "__mangled", None, Visibility::Private)]
    #[case(Language::Python, "name", None, Visibility::Public)]
    fn visibility_rules(
        #[case] language: Language,
        #[case] name: &str,
        #[case] keyword: Option<&str>,
        #[case] expected: Visibility,
    ) {
        assert_eq!(language.visibility(name, keyword), expected);
    }

    #[test]
    fn language_from_extension() {
        assert_eq!(Language::from_extension("go"), Some(Language::Go));
        assert_eq!(Language::from_extension("ts"), Some(Language::TypeScript));
        assert_eq!(Language::from_extension("pyi"), Some(Language::Python));
        assert_eq!(Language::from_extension("rs"), None);
    }

    #[test]
    fn type_text_normalization() {
        assert_eq!(normalize_type_text("string | null"), "string|null");
        assert_eq!(strip_type_sigils(" *Address"), "Address");
    }
}
