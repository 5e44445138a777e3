//! Subtitle provider gateway.
//!
//! The orchestrator only needs "given a video and the languages it lacks, write
//! what you can and tell me how many files you saved". [`SubliminalGateway`]
//! answers that by driving the `subliminal` command line tool.

use async_trait::async_trait;
use std::ffi::OsString;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{Credentials, ProviderAuth, ProviderConfig};
use crate::constants::SUBTITLE_EXTENSION;
use crate::domain::{LanguageSet, VideoRecord};
use crate::services::EventBus;

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Failed to launch {binary}: {source}")]
    Spawn {
        binary: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{binary} exited with {status}")]
    ExitStatus { binary: String, status: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

#[async_trait]
pub trait ProviderGateway: Send + Sync {
    /// Fails when the provider cannot be used at all. Checked once per run.
    async fn check_ready(&self) -> Result<(), ProviderError>;

    /// Returns the number of subtitle files written for `video`.
    async fn acquire(
        &self,
        video: &VideoRecord,
        missing: &LanguageSet,
        credentials: &Credentials,
    ) -> Result<usize, ProviderError>;
}

pub struct SubliminalGateway {
    binary: String,
    extra_args: Vec<String>,
    events: EventBus,
}

impl SubliminalGateway {
    #[must_use]
    pub fn new(config: &ProviderConfig, events: EventBus) -> Self {
        Self {
            binary: config.binary.clone(),
            extra_args: config.extra_args.clone(),
            events,
        }
    }

    /// Provider logins go before the subcommand, download options after it.
    /// The video path is passed through untouched, whatever its encoding.
    #[must_use]
    pub fn build_args(
        &self,
        video: &VideoRecord,
        missing: &LanguageSet,
        credentials: &Credentials,
    ) -> Vec<OsString> {
        let mut args: Vec<OsString> = Vec::new();

        push_login(&mut args, "opensubtitles", &credentials.opensubtitles);
        push_login(&mut args, "opensubtitlescom", &credentials.opensubtitlescom);
        if !credentials.opensubtitlescom.api_key.is_empty() {
            args.push("--provider.opensubtitlescom.apikey".into());
            args.push(credentials.opensubtitlescom.api_key.as_str().into());
        }
        push_login(&mut args, "addic7ed", &credentials.addic7ed);

        args.push("download".into());
        for lang in missing.iter() {
            args.push("-l".into());
            args.push(lang.into());
        }
        args.push("--force-external-subtitles".into());
        args.extend(self.extra_args.iter().map(OsString::from));
        args.push(video.path().as_os_str().to_os_string());

        args
    }

    fn spawn_error(&self, source: std::io::Error) -> ProviderError {
        ProviderError::Spawn {
            binary: self.binary.clone(),
            source,
        }
    }
}

/// A login is sent as soon as a username is set, even with an empty password.
fn push_login(args: &mut Vec<OsString>, provider: &str, auth: &ProviderAuth) {
    if auth.username.is_empty() {
        return;
    }
    args.push(format!("--provider.{provider}.username").into());
    args.push(auth.username.as_str().into());
    args.push(format!("--provider.{provider}.password").into());
    args.push(auth.password.as_str().into());
}

/// Counts the requested languages that now have a sibling subtitle on disk.
#[must_use]
pub fn count_saved(video: &VideoRecord, languages: &LanguageSet) -> usize {
    languages
        .iter()
        .filter(|lang| video.subtitle_path(lang, SUBTITLE_EXTENSION).exists())
        .count()
}

/// Publishes every output line as a log event until the pipe closes.
///
/// Output is not required to be UTF-8. Invalid bytes are replaced so the child
/// is never left writing into a closed pipe.
async fn forward_lines<R>(reader: R, events: EventBus)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break,
            Ok(_) => {
                let line = String::from_utf8_lossy(&buf);
                let line = line.trim();
                if !line.is_empty() {
                    events.log(line);
                }
            }
            Err(e) => {
                warn!(error = %e, "Failed to read provider output");
                break;
            }
        }
    }
}

#[async_trait]
impl ProviderGateway for SubliminalGateway {
    async fn check_ready(&self) -> Result<(), ProviderError> {
        let status = Command::new(&self.binary)
            .arg("--version")
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map_err(|e| self.spawn_error(e))?;

        if status.success() {
            debug!(binary = %self.binary, "Subtitle provider is available");
            Ok(())
        } else {
            Err(ProviderError::ExitStatus {
                binary: self.binary.clone(),
                status: status.to_string(),
            })
        }
    }

    async fn acquire(
        &self,
        video: &VideoRecord,
        missing: &LanguageSet,
        credentials: &Credentials,
    ) -> Result<usize, ProviderError> {
        let args = self.build_args(video, missing, credentials);
        let start = std::time::Instant::now();

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| self.spawn_error(e))?;

        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ProviderError::Other("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ProviderError::Other("stderr was not captured".to_string()))?;

        let ((), (), status) = tokio::join!(
            forward_lines(stdout, self.events.clone()),
            forward_lines(stderr, self.events.clone()),
            child.wait(),
        );
        let status = status?;

        if !status.success() {
            return Err(ProviderError::ExitStatus {
                binary: self.binary.clone(),
                status: status.to_string(),
            });
        }

        let saved = count_saved(video, missing);
        info!(
            event = "provider_finished",
            video = %video.display_name(),
            languages = %missing,
            saved,
            duration_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
            "Subtitle provider finished"
        );
        Ok(saved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::events::EventKind;
    use std::fs;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    fn gateway(extra: &[&str]) -> SubliminalGateway {
        let config = ProviderConfig {
            binary: "subliminal".to_string(),
            extra_args: extra.iter().map(ToString::to_string).collect(),
        };
        SubliminalGateway::new(&config, EventBus::new(8, 8))
    }

    #[test]
    fn args_without_credentials() {
        let video = VideoRecord::new("/media/show.mkv");
        let args = gateway(&[]).build_args(
            &video,
            &LanguageSet::new(&["en", "es"]),
            &Credentials::default(),
        );

        assert_eq!(
            args,
            os(&[
                "download",
                "-l",
                "en",
                "-l",
                "es",
                "--force-external-subtitles",
                "/media/show.mkv"
            ])
        );
    }

    #[test]
    fn args_include_logins_with_a_username() {
        let mut creds = Credentials::default();
        creds.addic7ed.username = "user".to_string();
        creds.addic7ed.password = "pass".to_string();
        creds.opensubtitles.username = "half".to_string();
        creds.opensubtitlescom.password = "no-user".to_string();
        creds.opensubtitlescom.api_key = "key".to_string();

        let video = VideoRecord::new("/media/show.mkv");
        let args = gateway(&["--min-score", "50"]).build_args(
            &video,
            &LanguageSet::new(&["en"]),
            &creds,
        );

        assert_eq!(
            args,
            os(&[
                "--provider.opensubtitles.username",
                "half",
                "--provider.opensubtitles.password",
                "",
                "--provider.opensubtitlescom.apikey",
                "key",
                "--provider.addic7ed.username",
                "user",
                "--provider.addic7ed.password",
                "pass",
                "download",
                "-l",
                "en",
                "--force-external-subtitles",
                "--min-score",
                "50",
                "/media/show.mkv"
            ])
        );
    }

    #[cfg(unix)]
    #[test]
    fn args_pass_non_utf8_path_unchanged() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let raw = OsStr::from_bytes(b"/media/Canci\xf3n.mkv");
        let video = VideoRecord::new(raw);
        let args = gateway(&[]).build_args(
            &video,
            &LanguageSet::new(&["es"]),
            &Credentials::default(),
        );

        assert_eq!(args.last().map(OsString::as_os_str), Some(raw));
    }

    #[tokio::test]
    async fn output_with_invalid_utf8_is_forwarded() {
        let bus = EventBus::new(8, 8);
        let output: &[u8] = b"Downloading\nCanci\xf3n.mkv\n\nDownloaded 1 subtitle";

        forward_lines(output, bus.clone()).await;

        let lines: Vec<String> = bus
            .history()
            .into_iter()
            .filter(|e| e.kind == EventKind::Log)
            .map(|e| e.message)
            .collect();
        assert_eq!(
            lines,
            ["Downloading", "Canci\u{fffd}n.mkv", "Downloaded 1 subtitle"]
        );
    }

    #[test]
    fn count_saved_checks_siblings() {
        let dir = std::env::temp_dir().join(format!("subtitlarr-provider-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        let video = VideoRecord::new(dir.join("movie.mkv"));
        fs::write(video.path(), b"").unwrap();
        fs::write(dir.join("movie.en.srt"), b"1\n").unwrap();

        assert_eq!(count_saved(&video, &LanguageSet::new(&["en", "fr"])), 1);

        let _ = fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn missing_binary_is_not_ready() {
        let config = ProviderConfig {
            binary: format!("subtitlarr-missing-{}", uuid::Uuid::new_v4()),
            extra_args: Vec::new(),
        };
        let gateway = SubliminalGateway::new(&config, EventBus::new(8, 8));

        assert!(matches!(
            gateway.check_ready().await,
            Err(ProviderError::Spawn { .. })
        ));
    }
}
