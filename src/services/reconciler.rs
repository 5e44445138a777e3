//! Filesystem reconciliation of videos against requested subtitle languages.
//!
//! Every call walks the filesystem from scratch. Acquisition writes the very
//! files this module checks for, so nothing is cached between calls.

use std::path::Path;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::constants::{SUBTITLE_EXTENSION, VIDEO_EXTENSIONS};
use crate::domain::{LanguageSet, MissingSubtitleEntry, PathStatus, ReconcileItem, VideoRecord};

pub const PATH_NOT_FOUND: &str = "path not found or not a directory";

#[derive(Debug, Clone)]
pub struct MediaReconciler {
    video_extensions: Vec<String>,
    subtitle_extension: String,
}

impl Default for MediaReconciler {
    fn default() -> Self {
        Self::new(VIDEO_EXTENSIONS, SUBTITLE_EXTENSION)
    }
}

impl MediaReconciler {
    #[must_use]
    pub fn new(video_extensions: &[&str], subtitle_extension: &str) -> Self {
        Self {
            video_extensions: video_extensions
                .iter()
                .map(|e| e.to_ascii_lowercase())
                .collect(),
            subtitle_extension: subtitle_extension.to_string(),
        }
    }

    /// Lazily yields one item per video (in walk order) and one error item per
    /// configured path that is not an existing directory.
    pub fn reconcile<'a>(
        &'a self,
        paths: &'a [String],
        languages: &'a LanguageSet,
    ) -> impl Iterator<Item = ReconcileItem> + 'a {
        paths.iter().flat_map(move |root| -> Box<dyn Iterator<Item = ReconcileItem> + 'a> {
            if !Path::new(root).is_dir() {
                warn!(path = %root, "Search path is not a directory");
                return Box::new(std::iter::once(ReconcileItem::PathError {
                    path: root.clone(),
                    error: PATH_NOT_FOUND.to_string(),
                }));
            }

            Box::new(self.videos_under(Path::new(root)).map(move |video| {
                let missing = self.missing_languages(&video, languages);
                ReconcileItem::Entry(MissingSubtitleEntry { video, missing })
            }))
        })
    }

    /// Aggregates per path without touching any provider.
    #[must_use]
    pub fn scan_status(&self, paths: &[String], languages: &LanguageSet) -> Vec<PathStatus> {
        paths
            .iter()
            .map(|root| {
                if !Path::new(root).is_dir() {
                    return PathStatus::Error {
                        path: root.clone(),
                        error: PATH_NOT_FOUND.to_string(),
                    };
                }

                let (videos, missing) = self
                    .videos_under(Path::new(root))
                    .fold((0, 0), |(videos, missing), video| {
                        (videos + 1, missing + self.missing_languages(&video, languages).len())
                    });

                debug!(path = %root, videos, missing, "Scanned path");
                PathStatus::Scanned {
                    path: root.clone(),
                    videos,
                    missing,
                }
            })
            .collect()
    }

    #[must_use]
    pub fn missing_languages(&self, video: &VideoRecord, languages: &LanguageSet) -> LanguageSet {
        let missing: Vec<&str> = languages
            .iter()
            .filter(|lang| !video.subtitle_path(lang, &self.subtitle_extension).exists())
            .collect();
        LanguageSet::new(missing.as_slice())
    }

    fn videos_under(&self, root: &Path) -> impl Iterator<Item = VideoRecord> + '_ {
        WalkDir::new(root)
            .follow_links(true)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "Skipping unreadable entry");
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .map(walkdir::DirEntry::into_path)
            .filter(|path| self.is_video(path))
            .map(VideoRecord::new)
    }

    fn is_video(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase)
            .is_some_and(|ext| self.video_extensions.iter().any(|v| *v == ext))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::path::PathBuf;

    struct TempTree(PathBuf);

    impl TempTree {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("subtitlarr-reconcile-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            Self(dir)
        }

        fn touch(&self, rel: &str) -> PathBuf {
            let path = self.0.join(rel);
            fs::create_dir_all(path.parent().unwrap()).unwrap();
            fs::write(&path, b"").unwrap();
            path
        }

        fn root(&self) -> String {
            self.0.display().to_string()
        }
    }

    impl Drop for TempTree {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn langs(codes: &[&str]) -> LanguageSet {
        LanguageSet::new(codes)
    }

    fn entries(items: Vec<ReconcileItem>) -> Vec<MissingSubtitleEntry> {
        items
            .into_iter()
            .filter_map(|i| match i {
                ReconcileItem::Entry(e) => Some(e),
                ReconcileItem::PathError { .. } => None,
            })
            .collect()
    }

    #[test]
    fn finds_videos_recursively_and_ignores_other_files() {
        let tree = TempTree::new();
        tree.touch("a.mkv");
        tree.touch("season 1/b.MP4");
        tree.touch("notes.txt");
        tree.touch("a.en.srt");

        let reconciler = MediaReconciler::default();
        let paths = vec![tree.root()];
        let languages = langs(&["en", "es"]);
        let found = entries(reconciler.reconcile(&paths, &languages).collect());

        assert_eq!(found.len(), 2);
        assert_eq!(found[0].video.display_name(), "a.mkv");
        assert_eq!(found[0].missing.as_slice(), ["es"]);
        assert_eq!(found[1].video.display_name(), "b.MP4");
        assert_eq!(found[1].missing.as_slice(), ["en", "es"]);
    }

    #[test]
    fn missing_path_reports_error_and_continues() {
        let tree = TempTree::new();
        tree.touch("show.mkv");
        let file_root = tree.touch("plain-file");

        let reconciler = MediaReconciler::default();
        let paths = vec![
            "/definitely/not/here".to_string(),
            file_root.display().to_string(),
            tree.root(),
        ];
        let languages = langs(&["en"]);
        let items: Vec<ReconcileItem> = reconciler.reconcile(&paths, &languages).collect();

        assert_eq!(items.len(), 3);
        assert_eq!(
            items[0],
            ReconcileItem::PathError {
                path: "/definitely/not/here".to_string(),
                error: PATH_NOT_FOUND.to_string(),
            }
        );
        assert!(matches!(&items[1], ReconcileItem::PathError { path, .. } if *path == paths[1]));
        assert!(matches!(&items[2], ReconcileItem::Entry(e) if e.missing.as_slice() == ["en"]));
    }

    #[test]
    fn scan_status_counts_missing_pairs() {
        let tree = TempTree::new();
        tree.touch("one.mkv");
        tree.touch("one.en.srt");
        tree.touch("two.avi");

        let reconciler = MediaReconciler::default();
        let paths = vec![tree.root(), "/missing/root".to_string()];
        let status = reconciler.scan_status(&paths, &langs(&["en", "fr"]));

        assert_eq!(
            status[0],
            PathStatus::Scanned {
                path: tree.root(),
                videos: 2,
                missing: 3,
            }
        );
        assert!(matches!(&status[1], PathStatus::Error { path, .. } if path == "/missing/root"));
    }

    #[test]
    fn acquired_subtitle_is_no_longer_missing() {
        let tree = TempTree::new();
        let video = tree.touch("show.mkv");

        let reconciler = MediaReconciler::default();
        let paths = vec![tree.root()];
        let languages = langs(&["en"]);

        let before = entries(reconciler.reconcile(&paths, &languages).collect());
        assert!(before[0].needs_acquisition());

        fs::write(video.with_file_name("show.en.srt"), b"1\n").unwrap();

        let after = entries(reconciler.reconcile(&paths, &languages).collect());
        assert!(!after[0].needs_acquisition());
        assert_eq!(
            reconciler.scan_status(&paths, &languages)[0],
            PathStatus::Scanned {
                path: tree.root(),
                videos: 1,
                missing: 0,
            }
        );
    }

    #[test]
    fn no_languages_means_nothing_missing() {
        let tree = TempTree::new();
        tree.touch("movie.m4v");

        let reconciler = MediaReconciler::default();
        let paths = vec![tree.root()];
        let found = entries(reconciler.reconcile(&paths, &LanguageSet::default()).collect());

        assert_eq!(found.len(), 1);
        assert!(!found[0].needs_acquisition());
    }
}
