//! Output filename building.
//!
//! Titles coming from the extractor are reduced to a conservative ASCII stem, optionally
//! decorated with the uploader and a local timestamp, and then resolved against the target
//! directory so an existing file is never reused.

use crate::model::MediaInfo;
use std::path::{Path, PathBuf};
use time::macros::format_description;
use time::OffsetDateTime;

const MAX_STEM_CHARS: usize = 120;
const FALLBACK_STEM: &str = "video";

/// `~/Downloads` when it exists, otherwise the home directory.
pub fn default_download_folder() -> PathBuf {
    if let Some(downloads) = dirs::download_dir().filter(|p| p.is_dir()) {
        return downloads;
    }
    if let Some(home) = dirs::home_dir() {
        let downloads = home.join("Downloads");
        if downloads.is_dir() {
            return downloads;
        }
        return home;
    }
    PathBuf::from(".")
}

/// ASCII whitespace as regex `\s` sees it: also vertical tab and the `\x1c`..`\x1f` separators.
fn is_title_space(c: char) -> bool {
    c.is_ascii_whitespace() || matches!(c, '\x0b' | '\x1c'..='\x1f')
}

/// Reduce a free-form title to a filesystem-safe stem.
pub fn clean_title(title: &str) -> String {
    if title.is_empty() {
        return FALLBACK_STEM.to_string();
    }

    let mapped: String = title
        .chars()
        .filter(|c| c.is_ascii())
        .filter(|c| !matches!(c, '#' | '@'))
        .map(|c| match c {
            '\\' | '/' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => ' ',
            other => other,
        })
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_' || *c == '-' || is_title_space(*c))
        .collect();

    let collapsed = mapped
        .split(is_title_space)
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ");
    let truncated: String = collapsed.chars().take(MAX_STEM_CHARS).collect();

    if truncated.is_empty() {
        FALLBACK_STEM.to_string()
    } else {
        truncated
    }
}

/// Local timestamp suffix, `YYYYmmdd_HHMMSS`.
pub fn timestamp_suffix(now: OffsetDateTime) -> String {
    now.format(format_description!(
        "[year][month][day]_[hour][minute][second]"
    ))
    .unwrap_or_else(|_| now.unix_timestamp().to_string())
}

/// Current local time, or UTC when the local offset cannot be determined.
pub fn local_now() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// Title stem plus the optional `_uploader` and `_timestamp` parts.
pub fn build_base_filename(
    info: &MediaInfo,
    add_uploader: bool,
    add_timestamp: bool,
    now: OffsetDateTime,
) -> String {
    let mut base = clean_title(info.display_title());
    if add_uploader {
        if let Some(uploader) = info.uploader_name() {
            base.push('_');
            base.push_str(&clean_title(uploader));
        }
    }
    if add_timestamp {
        base.push('_');
        base.push_str(&timestamp_suffix(now));
    }
    base
}

/// Return `dir/base.ext`, or the first free `base_<id>.ext` / `base_<n>.ext` variant.
pub fn make_unique_filepath(dir: &Path, base: &str, ext: &str, fallback_id: Option<&str>) -> PathBuf {
    let candidate = dir.join(format!("{base}.{ext}"));
    if !candidate.exists() {
        return candidate;
    }

    if let Some(id) = fallback_id.filter(|id| !id.is_empty()) {
        let with_id = dir.join(format!("{base}_{id}.{ext}"));
        if !with_id.exists() {
            return with_id;
        }
    }

    let mut i: u64 = 1;
    loop {
        let numbered = dir.join(format!("{base}_{i}.{ext}"));
        if !numbered.exists() {
            return numbered;
        }
        i += 1;
    }
}

/// Unique path in the same directory as `path` with a new extension.
pub fn sibling_with_extension(path: &Path, ext: &str) -> PathBuf {
    let (dir, stem) = split_dir_stem(path);
    make_unique_filepath(&dir, &stem, ext, None)
}

/// Unique `<stem>_<height>p.mp4` next to `path`.
pub fn resolution_variant(path: &Path, height: u32) -> PathBuf {
    let (dir, stem) = split_dir_stem(path);
    make_unique_filepath(&dir, &format!("{stem}_{height}p"), "mp4", None)
}

/// Split an `-o` template directory/base out of a unique path (`<dir>/<base>.%(ext)s`).
pub fn output_template(unique_path: &Path) -> String {
    let (dir, stem) = split_dir_stem(unique_path);
    dir.join(format!("{stem}.%(ext)s"))
        .to_string_lossy()
        .into_owned()
}

fn split_dir_stem(path: &Path) -> (PathBuf, String) {
    let dir = path
        .parent()
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| FALLBACK_STEM.to_string());
    (dir, stem)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use time::macros::datetime;

    #[test]
    fn clean_title_strips_unsafe_characters() {
        assert_eq!(clean_title("Hello: World / Part 2"), "Hello World Part 2");
        assert_eq!(clean_title("#tag @user nice"), "tag user nice");
        assert_eq!(clean_title("Caf\u{e9} \u{1f600} vlog!!"), "Caf vlog");
        assert_eq!(clean_title("a\t\tb\n c"), "a b c");
        assert_eq!(clean_title("a\x0bb\x1fc\x0c"), "a b c");
        assert_eq!(clean_title("keep_under-scores"), "keep_under-scores");
    }

    #[test]
    fn clean_title_falls_back_when_nothing_survives() {
        assert_eq!(clean_title(""), "video");
        assert_eq!(clean_title("\u{1f600}\u{1f600}"), "video");
        assert_eq!(clean_title("?!*"), "video");
    }

    #[test]
    fn clean_title_truncates_to_120_chars() {
        let long = "x".repeat(300);
        assert_eq!(clean_title(&long).len(), 120);
    }

    #[test]
    fn base_filename_appends_uploader_and_timestamp() {
        let info = MediaInfo {
            title: Some("My Clip".into()),
            channel: Some("Some/Channel".into()),
            ..Default::default()
        };
        let now = datetime!(2024-03-05 07:08:09 UTC);
        assert_eq!(build_base_filename(&info, false, false, now), "My Clip");
        assert_eq!(
            build_base_filename(&info, true, true, now),
            "My Clip_Some Channel_20240305_070809"
        );
    }

    #[test]
    fn base_filename_skips_missing_uploader() {
        let info = MediaInfo {
            title: Some("Solo".into()),
            ..Default::default()
        };
        let now = datetime!(2024-01-01 00:00:00 UTC);
        assert_eq!(build_base_filename(&info, true, false, now), "Solo");
    }

    #[test]
    fn unique_path_prefers_id_then_counter() {
        let dir = tempfile::tempdir().unwrap();
        let first = make_unique_filepath(dir.path(), "clip", "mp4", Some("abc"));
        assert_eq!(first, dir.path().join("clip.mp4"));
        File::create(&first).unwrap();

        let second = make_unique_filepath(dir.path(), "clip", "mp4", Some("abc"));
        assert_eq!(second, dir.path().join("clip_abc.mp4"));
        File::create(&second).unwrap();

        let third = make_unique_filepath(dir.path(), "clip", "mp4", Some("abc"));
        assert_eq!(third, dir.path().join("clip_1.mp4"));
        File::create(&third).unwrap();

        let fourth = make_unique_filepath(dir.path(), "clip", "mp4", None);
        assert_eq!(fourth, dir.path().join("clip_2.mp4"));
    }

    #[test]
    fn unique_path_ignores_empty_fallback_id() {
        let dir = tempfile::tempdir().unwrap();
        File::create(dir.path().join("clip.mp3")).unwrap();
        let p = make_unique_filepath(dir.path(), "clip", "mp3", Some(""));
        assert_eq!(p, dir.path().join("clip_1.mp3"));
    }

    #[test]
    fn derived_outputs_never_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("clip.mp4");
        File::create(&src).unwrap();
        assert_eq!(sibling_with_extension(&src, "mp3"), dir.path().join("clip.mp3"));

        File::create(dir.path().join("clip_720p.mp4")).unwrap();
        assert_eq!(
            resolution_variant(&src, 720),
            dir.path().join("clip_720p_1.mp4")
        );
    }

    #[test]
    fn template_keeps_directory_and_stem() {
        let t = output_template(Path::new("/tmp/out/clip_abc.mp4"));
        assert_eq!(t, "/tmp/out/clip_abc.%(ext)s");
    }
}
