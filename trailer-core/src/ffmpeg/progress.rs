use std::collections::VecDeque;
use std::sync::OnceLock;

use regex::Regex;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Turns one diagnostic line into a frame number, if it carries one.
pub trait ProgressParser: Send + Sync {
    fn parse_frame(&self, line: &str) -> Option<u64>;
}

/// ffmpeg stats lines: `frame=  451 fps= 90 q=-1.0 size=…`.
#[derive(Debug, Default, Clone, Copy)]
pub struct FfmpegProgressParser;

fn frame_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^frame=\s*(\d+)").expect("frame pattern is valid"))
}

impl ProgressParser for FfmpegProgressParser {
    fn parse_frame(&self, line: &str) -> Option<u64> {
        frame_pattern()
            .captures(line.trim())
            .and_then(|captures| captures.get(1))
            .and_then(|value| value.as_str().parse().ok())
    }
}

/// Splits a diagnostic stream into lines on both `\n` and `\r`; ffmpeg
/// rewrites its stats line in place with carriage returns.
pub(crate) struct DiagnosticLines<R> {
    reader: R,
    pending: Vec<u8>,
    ready: VecDeque<String>,
    finished: bool,
}

impl<R: AsyncRead + Unpin> DiagnosticLines<R> {
    pub(crate) fn new(reader: R) -> Self {
        Self {
            reader,
            pending: Vec::new(),
            ready: VecDeque::new(),
            finished: false,
        }
    }

    pub(crate) async fn next_line(&mut self) -> std::io::Result<Option<String>> {
        let mut buffer = [0u8; 4096];
        loop {
            if let Some(line) = self.ready.pop_front() {
                return Ok(Some(line));
            }
            if self.finished {
                return Ok(None);
            }
            let read = self.reader.read(&mut buffer).await?;
            if read == 0 {
                self.finished = true;
                self.flush_pending();
                continue;
            }
            for &byte in &buffer[..read] {
                if byte == b'\n' || byte == b'\r' {
                    self.flush_pending();
                } else {
                    self.pending.push(byte);
                }
            }
        }
    }

    fn flush_pending(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let line = String::from_utf8_lossy(&self.pending).into_owned();
        self.pending.clear();
        self.ready.push_back(line);
    }
}

/// Last `capacity` lines of a diagnostic stream, for error messages.
#[derive(Debug, Clone)]
pub(crate) struct LineTail {
    lines: VecDeque<String>,
    capacity: usize,
}

impl LineTail {
    pub(crate) fn new(capacity: usize) -> Self {
        Self {
            lines: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    pub(crate) fn push(&mut self, line: String) {
        if self.lines.len() == self.capacity {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }

    pub(crate) fn joined(&self) -> String {
        self.lines.iter().cloned().collect::<Vec<_>>().join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_padded_frame_numbers() {
        let parser = FfmpegProgressParser;
        assert_eq!(
            parser.parse_frame("frame=   45 fps=0.0 q=-1.0 size=N/A time=00:00:01.50"),
            Some(45)
        );
        assert_eq!(parser.parse_frame("  frame=1200 fps=300"), Some(1200));
    }

    #[test]
    fn ignores_lines_not_starting_with_frame() {
        let parser = FfmpegProgressParser;
        assert_eq!(parser.parse_frame("Input #0, mov,mp4,m4a, from 'a.mp4':"), None);
        assert_eq!(parser.parse_frame("  Stream #0:0: Video: h264, frame=12"), None);
        assert_eq!(parser.parse_frame("frame=N/A fps=0"), None);
    }

    #[tokio::test]
    async fn splits_on_carriage_returns_and_newlines() {
        let input: &[u8] = b"Input #0\nframe=   10 fps=1\rframe=   20 fps=2\r\nlast";
        let mut lines = DiagnosticLines::new(input);
        let mut collected = Vec::new();
        while let Some(line) = lines.next_line().await.unwrap() {
            collected.push(line);
        }
        assert_eq!(
            collected,
            vec!["Input #0", "frame=   10 fps=1", "frame=   20 fps=2", "last"]
        );
    }

    #[test]
    fn tail_keeps_most_recent_lines() {
        let mut tail = LineTail::new(2);
        tail.push("a".into());
        tail.push("b".into());
        tail.push("c".into());
        assert_eq!(tail.joined(), "b\nc");
    }
}
