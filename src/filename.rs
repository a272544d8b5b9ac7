const KNOWN_EXTENSIONS: [&str; 4] = [".jpg", ".jpeg", ".png", ".gif"];
const DEFAULT_EXTENSION: &str = ".jpg";
const UNSAFE_CHARS: [char; 6] = ['?', '&', '=', '%', ':', '/'];

/// Maps a source URL to the name the image is stored under.
///
/// The last `/`-separated segment (query string included) is percent-decoded,
/// unsafe characters become `_`, and `.jpg` is appended when the name does not
/// already end in a known image extension. Distinct URLs may map to the same
/// name.
pub fn normalize_filename(url: &str) -> String {
    let segment = url.rsplit('/').next().unwrap_or_default();
    let decoded = urlencoding::decode_binary(segment.as_bytes());
    let mut name: String = String::from_utf8_lossy(&decoded)
        .chars()
        .map(|ch| if UNSAFE_CHARS.contains(&ch) { '_' } else { ch })
        .collect();
    if !has_known_extension(&name) {
        name.push_str(DEFAULT_EXTENSION);
    }
    name
}

pub fn has_known_extension(name: &str) -> bool {
    KNOWN_EXTENSIONS.iter().any(|ext| name.ends_with(ext))
}
