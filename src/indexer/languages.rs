use serde::{Deserialize, Serialize};

/// Language tag derived from a file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Python,
    JavaScript,
    TypeScript,
    Go,
    Rust,
    Java,
    C,
    Cpp,
    Ruby,
    Shell,
    Markdown,
    Text,
}

impl Language {
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "py" | "pyi" => Language::Python,
            "js" | "jsx" | "mjs" | "cjs" => Language::JavaScript,
            "ts" | "tsx" => Language::TypeScript,
            "go" => Language::Go,
            "rs" => Language::Rust,
            "java" => Language::Java,
            "c" | "h" => Language::C,
            "cc" | "cpp" | "cxx" | "hpp" | "hh" => Language::Cpp,
            "rb" => Language::Ruby,
            "sh" | "bash" | "zsh" => Language::Shell,
            "md" | "markdown" => Language::Markdown,
            _ => Language::Text,
        }
    }

    pub fn from_path(path: &str) -> Self {
        let file_name = path.rsplit('/').next().unwrap_or(path);
        match file_name.rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Self::from_extension(ext),
            _ => Language::Text,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::TypeScript => "typescript",
            Language::Go => "go",
            Language::Rust => "rust",
            Language::Java => "java",
            Language::C => "c",
            Language::Cpp => "cpp",
            Language::Ruby => "ruby",
            Language::Shell => "shell",
            Language::Markdown => "markdown",
            Language::Text => "text",
        }
    }
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bundled tree-sitter grammar plus the queries used for dependency extraction.
pub struct GrammarConfig {
    pub language: Language,
    pub grammar: tree_sitter::Language,
    pub import_query: &'static str,
    pub call_query: &'static str,
}

impl GrammarConfig {
    pub fn get_all() -> Vec<GrammarConfig> {
        vec![
            go_config(),
            python_config(),
            typescript_config(),
            javascript_config(),
            rust_config(),
        ]
    }
}

fn go_config() -> GrammarConfig {
    GrammarConfig {
        language: Language::Go,
        grammar: tree_sitter_go::LANGUAGE.into(),
        import_query: r#"
(import_spec
  path: (interpreted_string_literal) @import)
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (selector_expression
    field: (field_identifier) @call))
"#,
    }
}

fn python_config() -> GrammarConfig {
    GrammarConfig {
        language: Language::Python,
        grammar: tree_sitter_python::LANGUAGE.into(),
        import_query: r#"
(import_statement
  name: (dotted_name) @import)
(import_statement
  name: (aliased_import
    name: (dotted_name) @import))
(import_from_statement
  module_name: (dotted_name) @import)
(import_from_statement
  module_name: (relative_import) @import)
"#,
        call_query: r#"
(call
  function: (identifier) @call)
(call
  function: (attribute
    attribute: (identifier) @call))
"#,
    }
}

fn typescript_config() -> GrammarConfig {
    GrammarConfig {
        language: Language::TypeScript,
        grammar: tree_sitter_typescript::LANGUAGE_TYPESCRIPT.into(),
        import_query: r#"
(import_statement
  source: (string) @import)
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
"#,
    }
}

fn javascript_config() -> GrammarConfig {
    GrammarConfig {
        language: Language::JavaScript,
        grammar: tree_sitter_javascript::LANGUAGE.into(),
        import_query: r#"
(import_statement
  source: (string) @import)
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (member_expression
    property: (property_identifier) @call))
"#,
    }
}

fn rust_config() -> GrammarConfig {
    GrammarConfig {
        language: Language::Rust,
        grammar: tree_sitter_rust::LANGUAGE.into(),
        import_query: r#"
(use_declaration
  argument: (scoped_identifier) @import)
(use_declaration
  argument: (identifier) @import)
(use_declaration
  argument: (use_wildcard) @import)
(use_declaration
  argument: (scoped_use_list
    path: (_) @import))
"#,
        call_query: r#"
(call_expression
  function: (identifier) @call)
(call_expression
  function: (field_expression
    field: (field_identifier) @call))
(call_expression
  function: (scoped_identifier
    name: (identifier) @call))
"#,
    }
}
