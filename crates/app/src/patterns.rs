//! Exclude-pattern matching and extension filters.
//!
//! Patterns are `/`-separated globs: `*` matches within one path segment,
//! `**` matches any number of segments. A pattern without a `/` matches
//! against every path segment (so `node_modules` excludes the directory at
//! any depth).

/// Returns true when `path` matches any of `patterns`.
#[must_use]
pub fn matches_any(path: &str, patterns: &[String]) -> bool {
    let path = normalize(path);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
    patterns.iter().any(|pattern| {
        let pattern = normalize(pattern);
        if pattern.is_empty() {
            return false;
        }
        let pattern_segments: Vec<&str> =
            pattern.split('/').filter(|s| !s.is_empty()).collect();
        if pattern_segments.len() == 1 {
            // Bare segment patterns match anywhere in the path.
            return segments
                .iter()
                .any(|segment| segment_matches(segment, pattern_segments[0]));
        }
        path_matches(&segments, &pattern_segments)
    })
}

/// Returns true when `extension` is allowed by `include_extensions`.
///
/// Comparison is case-insensitive and tolerant of leading dots in the
/// configured list. An empty extension never matches.
#[must_use]
pub fn extension_included(extension: &str, include_extensions: &[String]) -> bool {
    if extension.is_empty() {
        return false;
    }
    include_extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(extension))
}

fn normalize(input: &str) -> String {
    input.trim().replace('\\', "/").trim_matches('/').to_string()
}

fn path_matches(segments: &[&str], pattern: &[&str]) -> bool {
    match pattern.split_first() {
        None => segments.is_empty(),
        Some((&"**", rest)) => {
            if rest.is_empty() {
                return true;
            }
            (0..=segments.len()).any(|skip| path_matches(&segments[skip..], rest))
        },
        Some((&head, rest)) => match segments.split_first() {
            Some((&segment, tail)) => segment_matches(segment, head) && path_matches(tail, rest),
            None => false,
        },
    }
}

fn segment_matches(segment: &str, pattern: &str) -> bool {
    // Glob within one segment: `*` matches any run of characters.
    let parts: Vec<&str> = pattern.split('*').collect();
    if parts.len() == 1 {
        return segment == pattern;
    }
    let mut remainder = segment;
    for (index, part) in parts.iter().enumerate() {
        if part.is_empty() {
            continue;
        }
        if index == 0 {
            let Some(rest) = remainder.strip_prefix(part) else {
                return false;
            };
            remainder = rest;
        } else if index == parts.len() - 1 {
            return remainder.ends_with(part);
        } else {
            let Some(found) = remainder.find(part) else {
                return false;
            };
            remainder = &remainder[found + part.len()..];
        }
    }
    // Pattern ended with `*`.
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patterns(list: &[&str]) -> Vec<String> {
        list.iter().map(|p| (*p).to_string()).collect()
    }

    #[test]
    fn bare_segment_matches_at_any_depth() {
        let excludes = patterns(&["node_modules"]);
        assert!(matches_any("node_modules/lodash/index.js", &excludes));
        assert!(matches_any("packages/a/node_modules/x.js", &excludes));
        assert!(!matches_any("src/modules/index.js", &excludes));
    }

    #[test]
    fn double_star_spans_directories() {
        let excludes = patterns(&["dist/**"]);
        assert!(matches_any("dist/bundle.js", &excludes));
        assert!(matches_any("dist/assets/app.css", &excludes));
        assert!(!matches_any("src/dist.rs", &excludes));

        let nested = patterns(&["**/generated/**"]);
        assert!(matches_any("src/generated/api.ts", &nested));
        assert!(matches_any("generated/api.ts", &nested));
    }

    #[test]
    fn single_star_stays_within_segment() {
        let excludes = patterns(&["src/*.test.ts"]);
        assert!(matches_any("src/app.test.ts", &excludes));
        assert!(!matches_any("src/nested/app.test.ts", &excludes));
        assert!(!matches_any("src/app.ts", &excludes));
    }

    #[test]
    fn star_suffix_and_infix() {
        let excludes = patterns(&["*.min.js"]);
        assert!(matches_any("vendor/jquery.min.js", &excludes));
        let infix = patterns(&["fixture*data"]);
        assert!(matches_any("tests/fixture_big_data", &infix));
        assert!(!matches_any("tests/fixture", &infix));
    }

    #[test]
    fn empty_patterns_never_match() {
        assert!(!matches_any("src/lib.rs", &patterns(&[""])));
        assert!(!matches_any("src/lib.rs", &[]));
    }

    #[test]
    fn extension_filter_is_case_insensitive() {
        let allowed = patterns(&["ts", ".RS"]);
        assert!(extension_included("ts", &allowed));
        assert!(extension_included("rs", &allowed));
        assert!(!extension_included("py", &allowed));
        assert!(!extension_included("", &allowed));
    }
}
