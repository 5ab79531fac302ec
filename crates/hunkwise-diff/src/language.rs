//! File-name helpers shared by the parser and the classifier.

/// Guess the language tag for `path` from its extension.
///
/// Falls back to the literal file names `Dockerfile` and `Makefile`, and to
/// `"plaintext"` for anything unknown.
///
/// # Examples
///
/// ```
/// use hunkwise_diff::language::detect_language;
///
/// assert_eq!(detect_language("src/Main.RS"), "rust");
/// assert_eq!(detect_language("build/Dockerfile"), "dockerfile");
/// assert_eq!(detect_language("notes"), "plaintext");
/// ```
pub fn detect_language(path: &str) -> &'static str {
    let lang = match extension(path).as_str() {
        ".go" => Some("go"),
        ".py" => Some("python"),
        ".js" | ".jsx" => Some("javascript"),
        ".ts" | ".tsx" => Some("typescript"),
        ".rs" => Some("rust"),
        ".rb" => Some("ruby"),
        ".java" => Some("java"),
        ".kt" => Some("kotlin"),
        ".swift" => Some("swift"),
        ".c" | ".h" => Some("c"),
        ".cpp" => Some("cpp"),
        ".cs" => Some("csharp"),
        ".php" => Some("php"),
        ".sql" => Some("sql"),
        ".sh" | ".bash" | ".zsh" => Some("bash"),
        ".yaml" | ".yml" => Some("yaml"),
        ".json" => Some("json"),
        ".toml" => Some("toml"),
        ".xml" => Some("xml"),
        ".html" => Some("html"),
        ".css" | ".scss" => Some("css"),
        ".md" => Some("markdown"),
        ".proto" => Some("protobuf"),
        ".tf" => Some("terraform"),
        ".dockerfile" => Some("dockerfile"),
        _ => None,
    };
    if let Some(lang) = lang {
        return lang;
    }

    match basename(path).to_lowercase().as_str() {
        "dockerfile" => "dockerfile",
        "makefile" => "makefile",
        _ => "plaintext",
    }
}

/// Last path component.
///
/// # Examples
///
/// ```
/// use hunkwise_diff::language::basename;
///
/// assert_eq!(basename("a/b/c.rs"), "c.rs");
/// assert_eq!(basename("c.rs"), "c.rs");
/// ```
pub fn basename(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

/// Lowercased extension including the leading dot, taken from the last `.`
/// in the file name. Dotfiles count as all-extension (`.env` → `".env"`).
///
/// # Examples
///
/// ```
/// use hunkwise_diff::language::extension;
///
/// assert_eq!(extension("web/App.TSX"), ".tsx");
/// assert_eq!(extension("deploy/.env"), ".env");
/// assert_eq!(extension("Makefile"), "");
/// ```
pub fn extension(path: &str) -> String {
    let name = basename(path);
    match name.rfind('.') {
        Some(idx) => name[idx..].to_lowercase(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_extensions_map_to_tags() {
        assert_eq!(detect_language("main.go"), "go");
        assert_eq!(detect_language("web/index.tsx"), "typescript");
        assert_eq!(detect_language("include/util.h"), "c");
        assert_eq!(detect_language("scripts/run.zsh"), "bash");
        assert_eq!(detect_language("theme.scss"), "css");
        assert_eq!(detect_language("infra/main.tf"), "terraform");
        assert_eq!(detect_language("api/service.proto"), "protobuf");
    }

    #[test]
    fn basename_fallbacks_are_case_insensitive() {
        assert_eq!(detect_language("Makefile"), "makefile");
        assert_eq!(detect_language("docker/DOCKERFILE"), "dockerfile");
        assert_eq!(detect_language("ops/app.dockerfile"), "dockerfile");
    }

    #[test]
    fn unknown_is_plaintext() {
        assert_eq!(detect_language("LICENSE"), "plaintext");
        assert_eq!(detect_language("data.csv"), "plaintext");
        assert_eq!(detect_language(".gitignore"), "plaintext");
    }

    #[test]
    fn extension_uses_last_dot_of_file_name_only() {
        assert_eq!(extension("v1.2/README"), "");
        assert_eq!(extension("archive.tar.gz"), ".gz");
        assert_eq!(extension(".gitignore"), ".gitignore");
    }
}
