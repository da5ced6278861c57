use std::path::{Path, PathBuf};

/// Resolve a glTF path, preferring a pre-decompressed sibling when one
/// exists. Compressed sources (e.g. Draco) are not decoded here; a sibling
/// `<name>.decompressed.gltf` is the supported workaround.
pub fn prepare_gltf_path(path: &Path) -> PathBuf {
    let is_gltf = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("gltf"))
        .unwrap_or(false);
    if is_gltf
        && let Some(stem) = path.file_stem().and_then(|s| s.to_str())
    {
        let mut alt = path.to_path_buf();
        alt.set_file_name(format!("{stem}.decompressed.gltf"));
        if alt.exists() {
            return alt;
        }
    }
    path.to_path_buf()
}
