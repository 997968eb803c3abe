//! Module paths: `file[?subpath[?subpath...]]`.
//!
//! Every `?`-separated component after the file names an entry of the
//! container opened so far, e.g. `disk.trd?tune.$c?+1234`.

/// Component separator.
pub const SEPARATOR: char = '?';

/// Split a full path into the filesystem part and the subpath.
///
/// ```
/// use zxtune_formats::path::split_path;
///
/// assert_eq!(split_path("disk.trd?a.C?+16"), ("disk.trd", "a.C?+16"));
/// assert_eq!(split_path("tune.pt3"), ("tune.pt3", ""));
/// ```
pub fn split_path(full: &str) -> (&str, &str) {
    full.split_once(SEPARATOR).unwrap_or((full, ""))
}

/// Join a base path and a subpath; empty parts are dropped.
pub fn combine_path(base: &str, subpath: &str) -> String {
    match (base.is_empty(), subpath.is_empty()) {
        (_, true) => base.to_string(),
        (true, false) => subpath.to_string(),
        (false, false) => format!("{base}{SEPARATOR}{subpath}"),
    }
}

/// First component of a subpath and the remainder.
pub fn extract_subpath(subpath: &str) -> (&str, &str) {
    let trimmed = subpath.trim_start_matches(SEPARATOR);
    trimmed.split_once(SEPARATOR).unwrap_or((trimmed, ""))
}

/// Last component of a full path, without directories.
pub fn file_name(full: &str) -> &str {
    let (file, subpath) = split_path(full);
    match subpath.rsplit(SEPARATOR).next() {
        Some(last) if !last.is_empty() => last,
        _ => file.rsplit(['/', '\\']).next().unwrap_or(file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_and_combine() {
        let (file, sub) = split_path("music/disk.trd?tune.C?+100");
        assert_eq!(file, "music/disk.trd");
        assert_eq!(sub, "tune.C?+100");
        assert_eq!(combine_path(file, sub), "music/disk.trd?tune.C?+100");
        assert_eq!(combine_path("a.scl", ""), "a.scl");
        assert_eq!(combine_path("", "x.C"), "x.C");
    }

    #[test]
    fn test_extract_subpath() {
        assert_eq!(extract_subpath("tune.C?+100"), ("tune.C", "+100"));
        assert_eq!(extract_subpath("+100"), ("+100", ""));
        assert_eq!(extract_subpath("?x.C"), ("x.C", ""));
        assert_eq!(extract_subpath(""), ("", ""));
    }

    #[test]
    fn test_file_name() {
        assert_eq!(file_name("music/disk.trd?tune.C"), "tune.C");
        assert_eq!(file_name("music/tune.pt3"), "tune.pt3");
        assert_eq!(file_name("C:\\mods\\a.stc"), "a.stc");
    }
}
