pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "m4v", "ts"];

pub const SUBTITLE_EXTENSION: &str = "srt";

pub const DEFAULT_NOTIFICATION_TITLE: &str = "Subtitlarr";

pub mod intervals {
    use std::time::Duration;

    pub const SCHEDULER_TICK: Duration = Duration::from_secs(1);

    pub const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

    pub const WEBHOOK_TIMEOUT: Duration = Duration::from_secs(10);
}

pub mod limits {

    pub const DEFAULT_LOG_HISTORY: usize = 1000;

    pub const DEFAULT_EVENT_BUFFER: usize = 100;

    /// One leap year.
    pub const MAX_SCHEDULE_INTERVAL_MINUTES: i64 = 366 * 24 * 60;
}

pub mod colors {

    pub const DISCORD_ERROR: u32 = 15_158_332;

    pub const DISCORD_SUCCESS: u32 = 3_066_993;

    pub const SLACK_ERROR: &str = "#ff0000";

    pub const SLACK_SUCCESS: &str = "#36a64f";
}
