//! Substituting a snippet into its template.

use std::path::{Path, PathBuf};

use crate::suite::{ResultCode, SnippetCase, TestFailure};

/// Placeholder replaced by the snippet.
pub const SNIPPET_TAG: &str = "[snippet-code]";

/// Class name Java templates use; replaced by the rendered file name.
pub const GENERIC_JAVA_CLASSNAME: &str = "CodeExampleGenericClass";

/// Longest file name most filesystems accept, in bytes.
const MAX_FILE_NAME: usize = 255;

/// Indent every line but the first of `snippet` to the tag's column.
///
/// The column is the leading whitespace of the first template line that
/// mentions `snippet-code`. Blank lines stay blank.
#[must_use]
pub fn indent_snippet(template: &str, snippet: &str) -> String {
    let width = template
        .lines()
        .find(|line| line.contains("snippet-code"))
        .map_or(0, |line| line.chars().take_while(|c| c.is_whitespace()).count());
    let pad = " ".repeat(width);

    let (first, rest) = match snippet.split_once('\n') {
        Some((first, rest)) => (first, Some(rest)),
        None => (snippet, None),
    };

    let mut out = String::with_capacity(snippet.len() + width * 8);
    out.push_str(first);
    if let Some(rest) = rest {
        for line in rest.split('\n') {
            out.push('\n');
            if !line.trim().is_empty() {
                out.push_str(&pad);
            }
            out.push_str(line);
        }
    }
    out
}

/// Replace every tag in `template`.
///
/// # Errors
///
/// `MISSING_TAG` if the template has no tag.
pub fn render(template: &str, snippet: &str) -> Result<String, TestFailure> {
    if !template.contains(SNIPPET_TAG) {
        return Err(TestFailure::new(
            ResultCode::MissingTag,
            format!("Missing tag {SNIPPET_TAG}"),
        ));
    }
    Ok(template.replace(SNIPPET_TAG, &indent_snippet(template, snippet)))
}

/// Turn a test name into a safe, lowercase file name.
///
/// Path separators, `?<>\:*|"` and control characters are removed,
/// trailing dots and spaces trimmed, and every space becomes `_`.
#[must_use]
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '?' | '<' | '>' | '\\' | ':' | '*' | '|' | '"'))
        .filter(|c| !c.is_control())
        .collect();
    let mut end = cleaned.len().min(MAX_FILE_NAME);
    while !cleaned.is_char_boundary(end) {
        end -= 1;
    }
    let cleaned = cleaned[..end].trim_end_matches(['.', ' ']);
    if cleaned.chars().all(|c| c == '.') || is_reserved_windows_name(cleaned) {
        return String::new();
    }
    cleaned.replace(' ', "_").to_lowercase()
}

fn is_reserved_windows_name(name: &str) -> bool {
    let stem = name.split('.').next().unwrap_or(name).to_ascii_uppercase();
    matches!(stem.as_str(), "CON" | "PRN" | "AUX" | "NUL")
        || ((stem.starts_with("COM") || stem.starts_with("LPT"))
            && stem.len() == 4
            && stem.as_bytes()[3].is_ascii_digit())
}

/// Render `case` and write it to `dir`. Returns the written path.
///
/// # Errors
///
/// `MISSING_TAG` from [`render`], `ERROR` if the template cannot be read,
/// `MISSING_GENERATED_FILE` if the file is not there afterwards.
pub fn write_rendered(case: &SnippetCase, dir: &Path) -> Result<PathBuf, TestFailure> {
    let template = std::fs::read_to_string(&case.template_file).map_err(|e| {
        TestFailure::new(
            ResultCode::Error,
            format!("{}: {e}", case.template_file.display()),
        )
    })?;
    let mut rendered = render(&template, &case.snippet)?;

    let file_name = sanitize_file_name(case.name());
    if case.ext == "java" {
        rendered = rendered.replacen(GENERIC_JAVA_CLASSNAME, &file_name, 1);
    }

    let path = dir.join(format!("{file_name}.{}", case.ext));
    let written = std::fs::create_dir_all(dir).and_then(|()| std::fs::write(&path, rendered));
    if written.is_err() || !path.is_file() {
        return Err(TestFailure::new(
            ResultCode::MissingGeneratedFile,
            format!("Missing generated file: {}", path.display()),
        ));
    }
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indent_follows_tag_column() {
        let template = "async () => {\n    [snippet-code]\n}\n";
        let snippet = "const a = 1;\nif (a) {\n  log(a);\n}";
        assert_eq!(
            render(template, snippet).unwrap(),
            "async () => {\n    const a = 1;\n    if (a) {\n      log(a);\n    }\n}\n"
        );
    }

    #[test]
    fn test_blank_lines_not_indented() {
        let template = "  [snippet-code]";
        assert_eq!(indent_snippet(template, "a\n\n  \nb"), "a\n\n  \n  b");
    }

    #[test]
    fn test_single_line_snippet() {
        assert_eq!(indent_snippet("\t\t[snippet-code]", "x()"), "x()");
    }

    #[test]
    fn test_every_tag_replaced() {
        let rendered = render("[snippet-code]\n--\n[snippet-code]", "go").unwrap();
        assert_eq!(rendered, "go\n--\ngo");
    }

    #[test]
    fn test_missing_tag() {
        let failure = render("no tag here", "x").unwrap_err();
        assert_eq!(failure.code, ResultCode::MissingTag);
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("Document Create"), "document_create");
        assert_eq!(sanitize_file_name("a b c"), "a_b_c");
        assert_eq!(sanitize_file_name("what/is:this?"), "whatisthis");
        assert_eq!(sanitize_file_name("tab\there"), "tabhere");
        assert_eq!(sanitize_file_name("trailing. "), "trailing");
        assert_eq!(sanitize_file_name(".."), "");
        assert_eq!(sanitize_file_name("con"), "");
        assert_eq!(sanitize_file_name(&"x".repeat(300)).len(), 255);
    }
}
