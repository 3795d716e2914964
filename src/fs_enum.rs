use std::io;
use std::path::Path;
// Directory enumeration for LIST replies

/// Names beginning with this prefix are uploads still being written
pub const UPLOAD_PREFIX: &str = ".tinyftp-upload-";

/// Enumerate the entries directly inside `root`, in filesystem order.
/// "." and ".." are never yielded; neither are in-flight uploads.
pub fn list_names(root: &Path) -> io::Result<Vec<String>> {
    use walkdir::WalkDir;

    let mut names = Vec::new();
    for entry in WalkDir::new(root)
        .min_depth(1)
        .max_depth(1)
        .follow_links(false)
    {
        let entry = entry.map_err(io::Error::from)?;
        let name = entry.file_name().to_string_lossy();
        if name == "." || name == ".." || name.starts_with(UPLOAD_PREFIX) {
            continue;
        }
        names.push(name.into_owned());
    }
    Ok(names)
}

/// Serialize names for a LIST_REPLY body: each name newline-terminated,
/// then a NUL terminator for the whole listing
pub fn encode_listing(names: &[String]) -> Vec<u8> {
    let total: usize = names.iter().map(|n| n.len() + 1).sum();
    let mut out = Vec::with_capacity(total + 1);
    for n in names {
        out.extend_from_slice(n.as_bytes());
        out.push(b'\n');
    }
    out.push(0);
    out
}

pub fn decode_listing(payload: &[u8]) -> Vec<String> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end])
        .split('\n')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}
