//! Filename sanitization and the deterministic output layout.
//!
//! Output video: `<root>/<anime-title>/Episode_<padded>_<title>.mp4`.
//! Subtitles sit next to it as `<same-base>.<lang>.vtt`.

use std::path::{Path, PathBuf};

/// Byte budget for the title part of an episode base name. Leaves room for
/// the `Episode_NNNN_` prefix and the longest suffix under the 255-byte
/// file name limit.
pub const MAX_TITLE_BYTES: usize = 150;

/// Byte budget for the language part of a subtitle file name.
pub const MAX_LANGUAGE_BYTES: usize = 48;

/// Byte budget for the anime directory name.
pub const MAX_DIR_NAME_BYTES: usize = 200;

/// Sanitizes a single path component for filesystem safety.
///
/// Characters invalid on common filesystems, whitespace, and control
/// characters become `_`; runs of `_` collapse and leading/trailing `_`
/// are trimmed. `.`-only names are rejected by returning an empty string.
#[must_use]
pub fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    let mut prev_sep = false;
    for ch in value.chars() {
        let mapped = match ch {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '\'' => '_',
            c if c.is_whitespace() || c.is_control() => '_',
            c if c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '(' | ')' | '!' | ',') => c,
            _ => '_',
        };
        if mapped == '_' {
            if !prev_sep {
                out.push('_');
                prev_sep = true;
            }
        } else {
            out.push(mapped);
            prev_sep = false;
        }
    }
    let trimmed = out.trim_matches('_');
    if trimmed.chars().all(|c| c == '.') {
        return String::new();
    }
    trimmed.to_string()
}

/// Cuts `value` to at most `max_bytes` on a char boundary, then drops any
/// trailing `_` left at the cut.
#[must_use]
pub fn truncate_component(value: &str, max_bytes: usize) -> &str {
    if value.len() <= max_bytes {
        return value;
    }
    let mut end = max_bytes;
    while !value.is_char_boundary(end) {
        end -= 1;
    }
    value[..end].trim_end_matches('_')
}

/// Zero-padding width derived from the total episode count.
///
/// Chosen so lexicographic and numeric sort agree: 2 digits below 100
/// episodes, 3 below 1000, otherwise 4.
#[must_use]
pub fn padding_width(total_episodes: usize) -> usize {
    match total_episodes {
        0..=99 => 2,
        100..=999 => 3,
        _ => 4,
    }
}

/// Builds the base name (no extension) for one episode's files.
#[must_use]
pub fn episode_base_name(number: u32, title: &str, total_episodes: usize) -> String {
    let width = padding_width(total_episodes);
    let title = sanitize_filename_component(title);
    let title = truncate_component(&title, MAX_TITLE_BYTES);
    if title.is_empty() {
        format!("Episode_{number:0width$}")
    } else {
        format!("Episode_{number:0width$}_{title}")
    }
}

/// Directory that holds every episode of one anime.
#[must_use]
pub fn anime_output_dir(root: &Path, anime_title: &str) -> PathBuf {
    let name = sanitize_filename_component(anime_title);
    let name = truncate_component(&name, MAX_DIR_NAME_BYTES);
    if name.is_empty() {
        root.join("anime")
    } else {
        root.join(name)
    }
}

/// Full path of an episode's video file.
#[must_use]
pub fn episode_video_path(dir: &Path, base_name: &str) -> PathBuf {
    dir.join(format!("{base_name}.mp4"))
}

/// Full path of an episode's subtitle file for `language`.
#[must_use]
pub fn episode_subtitle_path(dir: &Path, base_name: &str, language: &str) -> PathBuf {
    let lang = sanitize_filename_component(&language.to_lowercase());
    let lang = match truncate_component(&lang, MAX_LANGUAGE_BYTES) {
        "" => "und",
        lang => lang,
    };
    dir.join(format!("{base_name}.{lang}.vtt"))
}

/// In-progress path used before the atomic rename onto `final_path`.
#[must_use]
pub fn partial_path(final_path: &Path) -> PathBuf {
    let mut name = final_path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".part");
    final_path.with_file_name(name)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_replaces_reserved_characters() {
        assert_eq!(
            sanitize_filename_component("Re:Zero / Starting Life?"),
            "Re_Zero_Starting_Life"
        );
    }

    #[test]
    fn test_sanitize_rejects_dot_only_names() {
        assert_eq!(sanitize_filename_component(".."), "");
        assert_eq!(sanitize_filename_component("  "), "");
    }

    #[test]
    fn test_padding_width_thresholds() {
        assert_eq!(padding_width(12), 2);
        assert_eq!(padding_width(99), 2);
        assert_eq!(padding_width(100), 3);
        assert_eq!(padding_width(999), 3);
        assert_eq!(padding_width(1000), 4);
    }

    #[test]
    fn test_episode_base_name_pads_number() {
        assert_eq!(episode_base_name(3, "The Beginning", 24), "Episode_03_The_Beginning");
        assert_eq!(episode_base_name(3, "The Beginning", 500), "Episode_003_The_Beginning");
        assert_eq!(episode_base_name(1071, "Gear 5", 1100), "Episode_1071_Gear_5");
    }

    #[test]
    fn test_episode_base_name_without_title() {
        assert_eq!(episode_base_name(7, "", 12), "Episode_07");
    }

    #[test]
    fn test_subtitle_path_uses_lowercased_language() {
        let dir = Path::new("/out/Show");
        assert_eq!(
            episode_subtitle_path(dir, "Episode_01_Pilot", "English"),
            PathBuf::from("/out/Show/Episode_01_Pilot.english.vtt")
        );
    }

    #[test]
    fn test_long_multibyte_title_fits_file_name_limit() {
        let title = "進撃の巨人 最終章 完結編 前編".repeat(8);
        let base = episode_base_name(1071, &title, 1100);
        assert!(base.starts_with("Episode_1071_進撃の巨人"));
        assert!(base.len() <= "Episode_1071_".len() + MAX_TITLE_BYTES);

        let dir = Path::new("/out/Show");
        let part = partial_path(&episode_video_path(dir, &base));
        let subtitle = episode_subtitle_path(dir, &base, &"Português (Brasil)".repeat(10));
        for path in [part, subtitle] {
            let name = path.file_name().unwrap().to_str().unwrap();
            assert!(name.len() <= 255, "{} bytes: {name}", name.len());
        }
    }

    #[test]
    fn test_truncate_component_respects_char_boundaries() {
        assert_eq!(truncate_component("abc", 10), "abc");
        assert_eq!(truncate_component("ab_cd", 3), "ab");
        // "é" is two bytes; a cut inside it backs off to the boundary.
        assert_eq!(truncate_component("aé", 2), "a");
    }

    #[test]
    fn test_partial_path_appends_suffix() {
        assert_eq!(
            partial_path(Path::new("/out/Show/Episode_01.mp4")),
            PathBuf::from("/out/Show/Episode_01.mp4.part")
        );
    }

    #[test]
    fn test_anime_output_dir_sanitizes_title() {
        assert_eq!(
            anime_output_dir(Path::new("/root"), "Fate/Zero"),
            PathBuf::from("/root/Fate_Zero")
        );
    }
}
