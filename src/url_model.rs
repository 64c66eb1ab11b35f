//! URL sanitization and destination-path derivation.
//!
//! Deliberately literal, matching the external contract rather than the
//! friendlier filename sanitization a browser or package manager would do:
//! the destination is always `<cwd>/<everything from the URL's last '/'
//! onward>`, query string included.

use std::path::{Path, PathBuf};

/// Strips Unicode format characters (general category `Cf`) from `s`, e.g.
/// a zero-width space or byte-order mark pasted into a URL by accident.
///
/// Covers the `Cf` code points that show up in practice (zero-width
/// joiners, bidi controls, the BOM, soft hyphen); it is not an exhaustive
/// Unicode category table.
pub fn strip_format_chars(s: &str) -> String {
    s.chars().filter(|c| !is_format_char(*c)).collect()
}

fn is_format_char(c: char) -> bool {
    matches!(
        c as u32,
        0x00AD
            | 0x0600..=0x0605
            | 0x061C
            | 0x06DD
            | 0x070F
            | 0x08E2
            | 0x180E
            | 0x200B..=0x200F
            | 0x202A..=0x202E
            | 0x2060..=0x2064
            | 0x2066..=0x206F
            | 0xFEFF
            | 0xFFF9..=0xFFFB
            | 0xE0001
            | 0xE0020..=0xE007F
    )
}

/// Derives the destination path: `<cwd>/<basename-after-last-'/'>`, where
/// the basename includes the leading `/` itself, so it's simply appended to
/// `cwd`. If the URL has no `/` at all, the whole string is used verbatim.
pub fn destination_path(cwd: &Path, url: &str) -> PathBuf {
    let tail = match url.rfind('/') {
        Some(idx) => &url[idx..],
        None => url,
    };
    let mut os = cwd.as_os_str().to_owned();
    os.push(tail);
    PathBuf::from(os)
}
