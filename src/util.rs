//! Small formatting and path helpers shared by the CLI and the UI.

const BYTE_UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
const SPEED_UNITS: [&str; 4] = ["B/s", "KB/s", "MB/s", "GB/s"];

/// Derives the destination filename from the last URL path segment.
///
/// Falls back to `"download"` when the URL has no usable segment
/// (e.g. `https://host/`).
pub fn filename_from_url(url: &str) -> String {
    let trimmed = url.split(['?', '#']).next().unwrap_or(url);
    let without_scheme = trimmed.split_once("://").map_or(trimmed, |(_, rest)| rest);
    without_scheme
        .split_once('/')
        .and_then(|(_, path)| path.rsplit('/').next())
        .filter(|seg| !seg.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| "download".to_string())
}

pub fn format_bytes(bytes: u64) -> String {
    if bytes == 0 {
        return "0 B".to_string();
    }

    let mut size = bytes as f64;
    let mut unit = 0;
    while size >= 1024.0 && unit < BYTE_UNITS.len() - 1 {
        size /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", size, BYTE_UNITS[unit])
}

pub fn format_speed(mut bps: f64) -> String {
    if bps <= 0.0 {
        return "-- B/s".to_string();
    }

    let mut unit = 0;
    while bps >= 1024.0 && unit < SPEED_UNITS.len() - 1 {
        bps /= 1024.0;
        unit += 1;
    }

    format!("{:.1} {}", bps, SPEED_UNITS[unit])
}

/// Renders a duration as `h:mm:ss` or `m:ss`; `--:--` when unknown.
pub fn format_eta(secs: Option<u64>) -> String {
    let Some(secs) = secs else {
        return "--:--".to_string();
    };

    let h = secs / 3600;
    let m = (secs % 3600) / 60;
    let s = secs % 60;

    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() > max_len {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{head}...")
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filename_from_url_takes_last_segment() {
        assert_eq!(
            filename_from_url("https://example.com/files/archive.tar.gz"),
            "archive.tar.gz"
        );
        assert_eq!(
            filename_from_url("https://example.com/files/video.mp4?token=abc"),
            "video.mp4"
        );
    }

    #[test]
    fn filename_from_url_falls_back() {
        assert_eq!(filename_from_url("https://example.com/"), "download");
        assert_eq!(filename_from_url("https://example.com"), "download");
    }

    #[test]
    fn format_bytes_scales_units() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512.0 B");
        assert_eq!(format_bytes(1024), "1.0 KB");
        assert_eq!(format_bytes(1_572_864), "1.5 MB");
    }

    #[test]
    fn format_speed_scales_units() {
        assert_eq!(format_speed(0.0), "-- B/s");
        assert_eq!(format_speed(2048.0), "2.0 KB/s");
    }

    #[test]
    fn format_eta_renders() {
        assert_eq!(format_eta(None), "--:--");
        assert_eq!(format_eta(Some(59)), "0:59");
        assert_eq!(format_eta(Some(61)), "1:01");
        assert_eq!(format_eta(Some(3_661)), "1:01:01");
    }

    #[test]
    fn truncate_str_adds_ellipsis() {
        assert_eq!(truncate_str("short", 25), "short");
        assert_eq!(
            truncate_str("a-very-long-filename-that-overflows.bin", 25),
            "a-very-long-filename-t..."
        );
    }
}
