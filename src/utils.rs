use std::path::Path;

pub fn ensure_dir(path: &Path) -> std::io::Result<()> {
    if path.as_os_str().is_empty() {
        return Ok(());
    }
    std::fs::create_dir_all(path)
}

/// Lowercase file-name-safe form of `input`, with runs of other characters
/// folded into a single dash.
pub fn slugify<S: AsRef<str>>(input: S) -> String {
    let mut out = String::new();
    for c in input.as_ref().chars() {
        if c.is_alphanumeric() || matches!(c, '_' | '.') {
            out.extend(c.to_lowercase());
        } else if !out.ends_with('-') {
            out.push('-');
        }
    }
    out.trim_matches('-').to_string()
}
