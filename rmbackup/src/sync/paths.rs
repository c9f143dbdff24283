use std::path::{Path, PathBuf};

/// Strips the leading and trailing separators users tend to type, so
/// `/Notes/Taxes` and `Notes/Taxes` name the same document.
pub fn normalize_remote_path(remote_path: &str) -> &str {
    remote_path.trim_matches('/')
}

/// Remote paths are the `/`-joined visible names below the root.
pub fn child_remote_path(parent: &str, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}/{name}")
    }
}

/// Sibling file that receives bytes before being renamed over `target`.
pub fn partial_path(target: &Path) -> PathBuf {
    target.with_extension(format!(
        "{}partial",
        target
            .extension()
            .map(|ext| format!("{}.", ext.to_string_lossy()))
            .unwrap_or_default()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_and_trailing_slashes() {
        assert_eq!(normalize_remote_path("/Notes/Taxes"), "Notes/Taxes");
        assert_eq!(normalize_remote_path("Notes/Taxes/"), "Notes/Taxes");
        assert_eq!(normalize_remote_path("Taxes"), "Taxes");
    }

    #[test]
    fn joins_below_root_without_separator() {
        assert_eq!(child_remote_path("", "A"), "A");
        assert_eq!(child_remote_path("A", "doc1"), "A/doc1");
    }

    #[test]
    fn partial_path_keeps_extension() {
        assert_eq!(
            partial_path(Path::new("/backup/taxes.pdf")),
            PathBuf::from("/backup/taxes.pdf.partial")
        );
        assert_eq!(
            partial_path(Path::new("/backup/mapping")),
            PathBuf::from("/backup/mapping.partial")
        );
    }
}
