//! mapping between digests and sharded relative paths
//!
//! a digest `abcdef0123...` with depth 2 and width 2 lives at `ab/cd/ef0123...`.
//! depth or width of zero keeps the digest as a single flat filename.

/// split `digest` into `depth` leading segments of `width` chars plus the remainder
///
/// empty segments are dropped, so keys shorter than `depth * width` still map to a
/// usable (if meaningless) path instead of one with empty components.
pub fn shard(digest: &str, depth: usize, width: usize) -> Vec<String> {
    if depth == 0 || width == 0 {
        return vec![digest.to_string()];
    }

    let chars: Vec<char> = digest.chars().collect();
    let mut segments = Vec::with_capacity(depth + 1);

    let mut start = 0;
    for _ in 0..depth {
        let end = (start + width).min(chars.len());
        segments.push(chars[start..end].iter().collect::<String>());
        start = end;
    }
    segments.push(chars[start..].iter().collect::<String>());

    segments.retain(|s| !s.is_empty());
    segments
}

/// relative path for a digest, segments joined with `/`
pub fn shard_path(digest: &str, depth: usize, width: usize) -> String {
    shard(digest, depth, width).join("/")
}

/// recover the digest from a sharded path
///
/// drops a file extension on the last component and all separators.
pub fn unshard(path: &str) -> String {
    let (dir, file) = match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    };
    // a leading dot marks a hidden file, not an extension
    let stem = match file.rfind('.') {
        Some(dot) if dot > 0 => &file[..dot],
        _ => file,
    };
    dir.split('/').chain(std::iter::once(stem)).collect()
}
