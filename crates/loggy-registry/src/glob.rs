//! Path glob matching: `*` matches a run of non-slash characters
//! within one segment, `**` matches across segments. Grounded on the
//! teacher's `app_registry::PathPattern::glob_match`, adapted from
//! filesystem paths to URL paths.

/// An absent pattern matches any path.
pub fn glob_match(path: &str, pattern: Option<&str>) -> bool {
    let Some(pattern) = pattern else {
        return true;
    };

    let pattern_parts: Vec<&str> = pattern.trim_start_matches('/').split('/').collect();
    let path_parts: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match_parts(&pattern_parts, &path_parts)
}

fn match_parts(pattern: &[&str], path: &[&str]) -> bool {
    if pattern.is_empty() {
        return path.is_empty();
    }

    let head = pattern[0];

    if head == "**" {
        for i in 0..=path.len() {
            if match_parts(&pattern[1..], &path[i..]) {
                return true;
            }
        }
        return false;
    }

    if path.is_empty() {
        return false;
    }

    segment_matches(head, path[0]) && match_parts(&pattern[1..], &path[1..])
}

fn segment_matches(pattern: &str, segment: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    if !pattern.contains('*') {
        return pattern == segment;
    }

    let parts: Vec<&str> = pattern.splitn(2, '*').collect();
    let (prefix, suffix) = (parts[0], parts[1]);
    segment.starts_with(prefix) && segment.ends_with(suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absent_pattern_matches_anything() {
        assert!(glob_match("/any/path", None));
    }

    #[test]
    fn single_star_matches_one_segment_suffix() {
        assert!(glob_match("/us/collect?id=1", Some("/*/collect*")));
        assert!(!glob_match("/us/eu/collect", Some("/*/collect*")));
    }

    #[test]
    fn double_star_matches_across_segments() {
        assert!(glob_match("/v1/batch/extra", Some("/v1/**")));
        assert!(glob_match("/v1", Some("/v1/**")));
    }

    #[test]
    fn exact_segment_requires_match() {
        assert!(glob_match("/v1/track", Some("/v1/*")));
        assert!(!glob_match("/v2/track", Some("/v1/*")));
    }

    #[test]
    fn star_prefix_suffix_within_segment() {
        assert!(glob_match("/rp.gif?x=1", Some("/rp.gif*")));
        assert!(!glob_match("/rq.gif", Some("/rp.gif*")));
    }
}
