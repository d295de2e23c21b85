//! POSIX-style path handling (§4.A).
//!
//! Grounded on `AzureDLPath` in `core.py`: a thin wrapper that normalizes,
//! joins, trims the leading anchor, extracts a glob-free prefix, and matches
//! a shallow glob (`*`, `?`, anchored at both ends, no `**`).

use std::fmt;

/// A normalized, forward-slash POSIX path. Platform separators on the local
/// side are converted on ingress by `Path::new`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Path(String);

impl Path {
    /// Build a `Path` from any string, converting platform separators and
    /// stripping an `azure://` scheme prefix if present.
    pub fn new(raw: impl AsRef<str>) -> Self {
        let mut s = raw.as_ref().replace('\\', "/");
        if let Some(rest) = s.strip_prefix("azure://") {
            s = rest.to_string();
        }
        Path(s)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Strip a leading `/` anchor, if present.
    pub fn trim(&self) -> Path {
        match self.0.strip_prefix('/') {
            Some(rest) => Path(rest.to_string()),
            None => self.clone(),
        }
    }

    pub fn is_root(&self) -> bool {
        let t = self.trim();
        t.0.is_empty() || t.0 == "."
    }

    /// Parent path; root's parent is itself.
    pub fn parent(&self) -> Path {
        let t = self.trim();
        match t.0.rsplit_once('/') {
            Some((p, _)) => Path(p.to_string()),
            None => Path(String::new()),
        }
    }

    pub fn name(&self) -> &str {
        let s = self.0.trim_end_matches('/');
        match s.rsplit_once('/') {
            Some((_, n)) => n,
            None => s,
        }
    }

    /// Join a child segment onto this path.
    pub fn join(&self, child: impl AsRef<str>) -> Path {
        let child = child.as_ref();
        if self.0.is_empty() {
            return Path::new(child);
        }
        if child.is_empty() {
            return self.clone();
        }
        let base = self.0.trim_end_matches('/');
        Path(format!("{}/{}", base, child.trim_start_matches('/')))
    }

    /// Path relative to `base`: strips `base` as a prefix plus separator.
    pub fn relative_to(&self, base: &Path) -> Option<Path> {
        let b = base.trim();
        let s = self.trim();
        if b.0.is_empty() {
            return Some(s);
        }
        s.0.strip_prefix(&b.0)
            .and_then(|rest| rest.strip_prefix('/').or(Some(rest)))
            .map(|rest| Path(rest.to_string()))
    }

    /// Longest ancestor whose segments contain neither `*` nor `?`.
    pub fn globless_prefix(&self) -> Path {
        let t = self.trim();
        let mut kept = Vec::new();
        for part in t.0.split('/') {
            if part.contains('*') || part.contains('?') {
                break;
            }
            kept.push(part);
        }
        Path(kept.join("/"))
    }

    /// Glob match: `*` matches any run not containing `/`; `?` matches any
    /// single character; the pattern is anchored at both ends.
    pub fn matches(&self, pattern: &Path) -> bool {
        glob_match(self.trim().as_str(), pattern.trim().as_str())
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Path {
    fn from(s: &str) -> Self {
        Path::new(s)
    }
}

impl From<String> for Path {
    fn from(s: String) -> Self {
        Path::new(s)
    }
}

/// Shallow glob matcher: `*` (any run excluding `/`), `?` (single char,
/// excluding `/`), anchored. No `**` support (Non-goal).
fn glob_match(text: &str, pattern: &str) -> bool {
    let t: Vec<char> = text.chars().collect();
    let p: Vec<char> = pattern.chars().collect();
    matches_from(&t, &p)
}

fn matches_from(t: &[char], p: &[char]) -> bool {
    // Standard backtracking glob match, '*' not matching '/'.
    let (mut ti, mut pi) = (0usize, 0usize);
    let (mut star_pi, mut star_ti) = (None, 0usize);
    while ti < t.len() {
        if pi < p.len() && (p[pi] == '?' && t[ti] != '/' || p[pi] == t[ti]) {
            ti += 1;
            pi += 1;
        } else if pi < p.len() && p[pi] == '*' {
            star_pi = Some(pi);
            star_ti = ti;
            pi += 1;
        } else if let Some(sp) = star_pi {
            pi = sp + 1;
            star_ti += 1;
            if star_ti > t.len() {
                return false;
            }
            if t[star_ti - 1] == '/' {
                return false;
            }
            ti = star_ti;
        } else {
            return false;
        }
    }
    while pi < p.len() && p[pi] == '*' {
        pi += 1;
    }
    pi == p.len()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trim_strips_leading_anchor() {
        assert_eq!(Path::new("/a/b").trim().as_str(), "a/b");
        assert_eq!(Path::new("a/b").trim().as_str(), "a/b");
    }

    #[test]
    fn join_then_trim_roundtrips() {
        // Path.trim(Path.join("/", x)) == Path.trim(x)
        let x = Path::new("foo/bar");
        let joined = Path::new("/").join(x.as_str());
        assert_eq!(joined.trim(), x.trim());
    }

    #[test]
    fn globless_prefix_stops_at_first_wildcard_segment() {
        let p = Path::new("/a/b/*.csv");
        assert_eq!(p.globless_prefix().as_str(), "a/b");
        let p2 = Path::new("/a/b?/c");
        assert_eq!(p2.globless_prefix().as_str(), "a");
    }

    #[test]
    fn match_respects_path_separator() {
        assert!(Path::new("a/b.csv").matches(&Path::new("a/*.csv")));
        assert!(!Path::new("a/b/c.csv").matches(&Path::new("a/*.csv")));
        assert!(Path::new("a/bc.csv").matches(&Path::new("a/b?.csv")));
        assert!(!Path::new("a/bcd.csv").matches(&Path::new("a/b?.csv")));
    }

    #[test]
    fn azure_scheme_prefix_is_stripped() {
        assert_eq!(Path::new("azure://store/a/b").as_str(), "store/a/b");
    }

    #[test]
    fn windows_separators_are_converted() {
        assert_eq!(Path::new("a\\b\\c").as_str(), "a/b/c");
    }

    proptest::proptest! {
        #[test]
        fn glob_without_wildcards_is_exact_match(s in "[a-zA-Z0-9/]{0,24}") {
            let p = Path::new(s.clone());
            proptest::prop_assert_eq!(p.matches(&Path::new(s)), true);
        }
    }
}
