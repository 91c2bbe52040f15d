//! Pure path-string lexing: lowercasing, extension splitting, and
//! disc-image sub-path canonicalization.

/// ASCII-lowercase a path. Non-ASCII bytes pass through unchanged.
#[must_use]
pub fn to_lower(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii() { c.to_ascii_lowercase() } else { c })
        .collect()
}

/// Split `path` into `(root, ext)` the way the classical "split extension"
/// rule works: the extension is the substring after the last `.` that lies
/// strictly after the last `/` and is preceded by at least one non-`.`
/// non-`/` character within the same path component. The period itself is
/// not part of `ext`.
#[must_use]
pub fn split_ext(path: &str) -> (&str, &str) {
    let last_slash = path.rfind('/').map_or(0, |i| i + 1);
    let component = &path[last_slash..];

    // Find the last '.' in `component` that is not the first character and
    // is not immediately preceded only by dots (so "a/.hidden" has no ext,
    // but "a/..foo.txt" does).
    let Some(dot_rel) = component.rfind('.') else {
        return (path, "");
    };
    if dot_rel == 0 {
        // "." is the first character of the component: no extension.
        return (path, "");
    }
    let before = &component[..dot_rel];
    if before.chars().all(|c| c == '.') {
        return (path, "");
    }

    let dot_abs = last_slash + dot_rel;
    (&path[..dot_abs], &path[dot_abs + 1..])
}

/// Reduce disc-image sub-files to the directory identity so that a
/// multi-file disc image counts as a single logical video.
#[must_use]
pub fn canonicalize(root: &str, ext: &str) -> String {
    if ext == "m2ts" {
        if let Some(stripped) = strip_bdmv_stream(root) {
            return stripped;
        }
    } else if ext == "vob" {
        if let Some(replaced) = replace_vts_component(root) {
            return replaced;
        }
    }
    root.to_string()
}

/// `…/bdmv/stream/<any> → …` (the directory containing `bdmv/`).
fn strip_bdmv_stream(root: &str) -> Option<String> {
    let parts: Vec<&str> = root.split('/').collect();
    if parts.len() < 3 {
        return None;
    }
    let n = parts.len();
    if parts[n - 2] == "stream" && parts[n - 3] == "bdmv" {
        return Some(parts[..n - 3].join("/"));
    }
    None
}

/// `…/<any>vts[0-9_]* → …/video_ts` (replace the terminal path component).
fn replace_vts_component(root: &str) -> Option<String> {
    let last_slash = root.rfind('/').map_or(0, |i| i + 1);
    let last = &root[last_slash..];
    let idx = last.find("vts")?;
    let tail = &last[idx + 3..];
    if tail.is_empty() || !tail.chars().all(|c| c.is_ascii_digit() || c == '_') {
        return None;
    }
    Some(format!("{}video_ts", &root[..last_slash]))
}
