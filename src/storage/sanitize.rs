//! Filename sanitization for untrusted client input

/// Stems Windows refuses as file names regardless of extension
const WINDOWS_DEVICE_NAMES: &[&str] = &[
    "CON", "PRN", "AUX", "NUL", "COM1", "COM2", "COM3", "COM4", "COM5", "COM6", "COM7", "COM8",
    "COM9", "LPT1", "LPT2", "LPT3", "LPT4", "LPT5", "LPT6", "LPT7", "LPT8", "LPT9", "CONIN$",
    "CONOUT$",
];

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-')
}

/// Turn an untrusted file name into one that is safe to join onto a directory.
///
/// Separators become word breaks, whitespace runs collapse to `_`, anything
/// outside `[A-Za-z0-9_.-]` is dropped and leading/trailing `.`/`_` are
/// stripped, so the result has no directory components and is never hidden.
/// Returns `None` when nothing usable is left.
pub fn secure_filename(untrusted: &str) -> Option<String> {
    let ascii: String = untrusted
        .chars()
        .filter(char::is_ascii)
        .map(|c| if c == '/' || c == '\\' { ' ' } else { c })
        .collect();

    let joined = ascii.split_whitespace().collect::<Vec<_>>().join("_");
    let filtered: String = joined.chars().filter(|&c| is_allowed(c)).collect();
    let trimmed = filtered.trim_matches(|c| c == '.' || c == '_');

    if trimmed.is_empty() {
        return None;
    }

    let stem = trimmed.split('.').next().unwrap_or_default();
    if WINDOWS_DEVICE_NAMES
        .iter()
        .any(|device| device.eq_ignore_ascii_case(stem))
    {
        return Some(format!("_{trimmed}"));
    }

    Some(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_names_pass_through() {
        assert_eq!(secure_filename("photo.png").as_deref(), Some("photo.png"));
        assert_eq!(
            secure_filename("scan-01_final.JPG").as_deref(),
            Some("scan-01_final.JPG")
        );
    }

    #[test]
    fn test_path_traversal_is_flattened() {
        assert_eq!(
            secure_filename("../../etc/passwd").as_deref(),
            Some("etc_passwd")
        );
        assert_eq!(
            secure_filename("..\\..\\windows\\win.ini").as_deref(),
            Some("windows_win.ini")
        );
        assert_eq!(
            secure_filename("/var/www/../x.png").as_deref(),
            Some("var_www_.._x.png")
        );
    }

    #[test]
    fn test_whitespace_and_unsafe_characters() {
        assert_eq!(
            secure_filename("my cool  picture.png").as_deref(),
            Some("my_cool_picture.png")
        );
        assert_eq!(
            secure_filename("a<b>c:d|e?.png").as_deref(),
            Some("abcde.png")
        );
        assert_eq!(secure_filename("ünïcödé.png").as_deref(), Some("ncd.png"));
    }

    #[test]
    fn test_hidden_and_empty_results_are_rejected() {
        assert_eq!(secure_filename(".bashrc").as_deref(), Some("bashrc"));
        assert_eq!(secure_filename(""), None);
        assert_eq!(secure_filename(".."), None);
        assert_eq!(secure_filename("../.."), None);
        assert_eq!(secure_filename("???"), None);
    }

    #[test]
    fn test_windows_device_names_are_prefixed() {
        assert_eq!(secure_filename("con.png").as_deref(), Some("_con.png"));
        assert_eq!(secure_filename("LPT1").as_deref(), Some("_LPT1"));
        assert_eq!(secure_filename("console.png").as_deref(), Some("console.png"));
    }

    #[test]
    fn test_result_never_contains_separators() {
        for name in ["a/b", "a\\b", "/", "./a", "a/../../b", " / "] {
            if let Some(safe) = secure_filename(name) {
                assert!(!safe.contains('/') && !safe.contains('\\'), "{safe}");
                assert!(!safe.starts_with('.'), "{safe}");
            }
        }
    }
}
