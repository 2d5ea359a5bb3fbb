//! Client-supplied location sanitiser.
//!
//! `clean` is the only function in this crate permitted to interpret a
//! client-supplied path. Every other component consumes its output verbatim,
//! so the invariants here (no leading `/`, `.` or `\`; no `: * ? " < > |`;
//! idempotent; trailing `/` preserved as a directory marker) hold crate-wide.

use path_clean::PathClean;
use std::path::Path;

const INVALID_CHARS: [char; 7] = [':', '*', '?', '"', '<', '>', '|'];

/// Normalise a client-supplied location into an object-key prefix.
///
/// Root (`"/"`) and the empty string both canonicalise to `""` — an empty
/// prefix has no meaningful "directory-ness" left to preserve.
pub fn clean(location: &str) -> String {
    let is_dir = location.ends_with('/');

    let without_invalid: String = location.chars().filter(|c| !INVALID_CHARS.contains(c)).collect();

    let cleaned = if without_invalid.is_empty() {
        String::new()
    } else {
        Path::new(&without_invalid)
            .clean()
            .to_string_lossy()
            .into_owned()
    };

    let stripped = cleaned.trim_start_matches(['.', '/', '\\']).to_string();

    if stripped.is_empty() {
        String::new()
    } else if is_dir {
        format!("{stripped}/")
    } else {
        stripped
    }
}

/// Join a cleaned location prefix with a file name (`name+ext`) and clean the
/// result again, producing the final object key.
pub fn object_key(location: &str, file_name: &str) -> String {
    let prefix = clean(location);
    let joined = if prefix.is_empty() || prefix.ends_with('/') {
        format!("{prefix}{file_name}")
    } else {
        format!("{prefix}/{file_name}")
    };
    clean(&joined)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_root() {
        assert_eq!(clean(""), "");
        assert_eq!(clean("/"), "");
        assert_eq!(clean("///"), "");
    }

    #[test]
    fn strips_invalid_chars() {
        assert_eq!(clean("/a/../b/:c*"), "b/c");
    }

    #[test]
    fn preserves_trailing_slash() {
        assert_eq!(clean("a/b/"), "a/b/");
        assert_eq!(clean("a/b"), "a/b");
    }

    #[test]
    fn never_begins_with_illegal_prefix() {
        for input in ["./a", "../a", "/a", "\\a", "....//a"] {
            let out = clean(input);
            assert!(!out.starts_with('/'));
            assert!(!out.starts_with('.'));
            assert!(!out.starts_with('\\'));
        }
    }

    #[test]
    fn idempotent() {
        for input in ["", "/", "a/b/", "a/b", "/a/../b/:c*", "....//weird//"] {
            let once = clean(input);
            let twice = clean(&once);
            assert_eq!(once, twice, "clean not idempotent for {input:?}");
        }
    }

    #[test]
    fn object_key_join() {
        assert_eq!(object_key("/a/../b/:c*", "photo.jpg"), "b/c/photo.jpg");
        assert_eq!(object_key("", "hello.txt"), "hello.txt");
    }
}
