//! Line-by-line tailing of an append-only remote log
//!
//! [`LogTailer::next_line`] is a pull-based, finite, non-restartable sequence:
//! it yields [`TailEvent::Line`] items and ends with [`TailEvent::End`], which
//! it keeps returning afterwards.
//!
//! Every suspension point (remote fetch, poll delay) races the cancellation
//! token, so a cancelled session stops without waiting for the network.

use crate::append_log::{AppendLog, Completion, LogChunk};
use crate::error::Result;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Longest line held back waiting for a line break. Longer runs are
/// delivered in pieces of this size.
pub const MAX_LINE_BYTES: usize = 1024 * 1024;

/// Final outcome of a tailing session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminalState {
    Succeeded,
    Failed,
    Cancelled,
}

impl TerminalState {
    pub fn is_success(&self) -> bool {
        matches!(self, TerminalState::Succeeded)
    }
}

impl fmt::Display for TerminalState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TerminalState::Succeeded => "succeeded",
            TerminalState::Failed => "failed",
            TerminalState::Cancelled => "cancelled",
        };
        f.write_str(s)
    }
}

impl From<Completion> for TerminalState {
    fn from(completion: Completion) -> Self {
        match completion {
            Completion::Success => TerminalState::Succeeded,
            Completion::Failure => TerminalState::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TailEvent {
    Line(String),
    End(TerminalState),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TailState {
    Fetching,
    Delivering,
    Finished(TerminalState),
}

pub struct LogTailer {
    log: Box<dyn AppendLog>,
    cancel: CancellationToken,
    poll_interval: Duration,
    cursor: u64,
    partial: Vec<u8>,
    lines: VecDeque<String>,
    completion: Option<Completion>,
    state: TailState,
}

impl LogTailer {
    pub fn new(log: Box<dyn AppendLog>, cancel: CancellationToken) -> Self {
        Self {
            log,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            cursor: 0,
            partial: Vec::new(),
            lines: VecDeque::new(),
            completion: None,
            state: TailState::Fetching,
        }
    }

    /// Delay between fetches that return nothing new.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn state(&self) -> TailState {
        self.state
    }

    /// Bytes consumed from the remote log so far.
    pub fn cursor(&self) -> u64 {
        self.cursor
    }

    /// Next complete line, or the end marker.
    ///
    /// A fetch error is returned once; afterwards the tailer reports
    /// `End(Failed)`.
    pub async fn next_line(&mut self) -> Result<TailEvent> {
        loop {
            if let TailState::Finished(state) = self.state {
                return Ok(TailEvent::End(state));
            }
            if self.cancel.is_cancelled() {
                return Ok(self.finish_cancelled());
            }

            if let Some(line) = self.lines.pop_front() {
                self.state = TailState::Delivering;
                return Ok(TailEvent::Line(line));
            }

            if let Some(completion) = self.completion {
                let state = TerminalState::from(completion);
                tracing::debug!("Log complete at offset {}: {}", self.cursor, state);
                self.state = TailState::Finished(state);
                return Ok(TailEvent::End(state));
            }

            self.state = TailState::Fetching;
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => None,
                result = self.log.fetch(self.cursor) => Some(result),
            };
            let chunk = match fetched {
                None => return Ok(self.finish_cancelled()),
                Some(Ok(chunk)) => chunk,
                Some(Err(e)) if e.is_interrupted() => return Ok(self.finish_cancelled()),
                Some(Err(e)) => {
                    self.state = TailState::Finished(TerminalState::Failed);
                    return Err(e);
                }
            };

            let progressed = !chunk.data.is_empty() || chunk.completion.is_some();
            self.absorb(chunk);

            if !progressed {
                let slept = tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => false,
                    _ = tokio::time::sleep(self.poll_interval) => true,
                };
                if !slept {
                    return Ok(self.finish_cancelled());
                }
            }
        }
    }

    fn absorb(&mut self, chunk: LogChunk) {
        self.cursor += chunk.data.len() as u64;

        // 新しいデータだけを走査する。未完の行は partial に残る
        let data = &chunk.data[..];
        let mut start = 0;
        while let Some(found) = data[start..].iter().position(|&b| b == b'\n') {
            let end = start + found;
            let line = if self.partial.is_empty() {
                data[start..end].to_vec()
            } else {
                let mut line = std::mem::take(&mut self.partial);
                line.extend_from_slice(&data[start..end]);
                line
            };
            self.lines.push_back(decode_line(line));
            start = end + 1;
        }
        self.partial.extend_from_slice(&data[start..]);

        if self.partial.len() >= MAX_LINE_BYTES {
            let overflow = std::mem::take(&mut self.partial);
            let pieces = overflow.chunks_exact(MAX_LINE_BYTES);
            self.partial = pieces.remainder().to_vec();
            for piece in pieces {
                tracing::debug!("Flushing {} bytes without a line break", piece.len());
                self.lines.push_back(decode_line(piece.to_vec()));
            }
        }

        if let Some(completion) = chunk.completion {
            // 改行で終わらない最終行も完了時には届ける
            if !self.partial.is_empty() {
                let rest = std::mem::take(&mut self.partial);
                self.lines.push_back(decode_line(rest));
            }
            self.completion = Some(completion);
        }
    }

    fn finish_cancelled(&mut self) -> TailEvent {
        if self.state != TailState::Finished(TerminalState::Cancelled) {
            tracing::debug!(
                "Tailing cancelled at offset {}, dropping {} buffered lines",
                self.cursor,
                self.lines.len()
            );
        }
        self.lines.clear();
        self.partial.clear();
        self.state = TailState::Finished(TerminalState::Cancelled);
        TailEvent::End(TerminalState::Cancelled)
    }
}

fn decode_line(mut line: Vec<u8>) -> String {
    if line.last() == Some(&b'\r') {
        line.pop();
    }
    match String::from_utf8(line) {
        Ok(s) => s,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::LogError;
    use crate::testing::ScriptedLog;

    const FAST: Duration = Duration::from_millis(5);

    async fn collect(tailer: &mut LogTailer) -> (Vec<String>, TerminalState) {
        let mut lines = Vec::new();
        loop {
            match tailer.next_line().await.unwrap() {
                TailEvent::Line(line) => lines.push(line),
                TailEvent::End(state) => return (lines, state),
            }
        }
    }

    fn tailer(log: ScriptedLog) -> LogTailer {
        LogTailer::new(Box::new(log), CancellationToken::new()).with_poll_interval(FAST)
    }

    #[tokio::test]
    async fn test_lines_split_across_chunks() {
        let log = ScriptedLog::new(vec![
            Ok(LogChunk::new("hello\nwor")),
            Ok(LogChunk::new("ld\n")),
            Ok(LogChunk::empty().complete(Completion::Success)),
        ]);
        let mut tailer = tailer(log);

        let (lines, state) = collect(&mut tailer).await;
        assert_eq!(lines, vec!["hello", "world"]);
        assert_eq!(state, TerminalState::Succeeded);
        assert_eq!(tailer.cursor(), 12);
    }

    #[tokio::test]
    async fn test_end_marker_repeats() {
        let log = ScriptedLog::new(vec![Ok(LogChunk::new("L1\n").complete(Completion::Failure))]);
        let mut tailer = tailer(log);

        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::Line("L1".to_string())
        );
        assert_eq!(tailer.state(), TailState::Delivering);
        for _ in 0..3 {
            assert_eq!(
                tailer.next_line().await.unwrap(),
                TailEvent::End(TerminalState::Failed)
            );
        }
    }

    #[tokio::test]
    async fn test_waits_through_empty_polls() {
        let log = ScriptedLog::new(vec![
            Ok(LogChunk::empty()),
            Ok(LogChunk::new("step 1")),
            Ok(LogChunk::empty()),
            Ok(LogChunk::new("/3\r\nstep 2/3\r\n")),
            Ok(LogChunk::new("step 3/3").complete(Completion::Success)),
        ]);
        let offsets = log.offsets();
        let mut tailer = tailer(log);

        let (lines, state) = collect(&mut tailer).await;
        assert_eq!(lines, vec!["step 1/3", "step 2/3", "step 3/3"]);
        assert_eq!(state, TerminalState::Succeeded);

        let offsets = offsets.lock().unwrap().clone();
        assert_eq!(offsets, vec![0, 0, 6, 6, 20]);
        assert!(offsets.windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_multibyte_split_across_chunks() {
        let text = "ビルド完了\n".as_bytes();
        let log = ScriptedLog::new(vec![
            Ok(LogChunk::new(text[..4].to_vec())),
            Ok(LogChunk::new(text[4..].to_vec()).complete(Completion::Success)),
        ]);
        let (lines, _) = collect(&mut tailer(log)).await;
        assert_eq!(lines, vec!["ビルド完了"]);
    }

    #[tokio::test]
    async fn test_cancel_discards_buffered_lines() {
        let log = ScriptedLog::new(vec![Ok(LogChunk::new("a\nb\nc\n"))]);
        let cancel = CancellationToken::new();
        let mut tailer =
            LogTailer::new(Box::new(log), cancel.clone()).with_poll_interval(FAST);

        assert_eq!(tailer.next_line().await.unwrap(), TailEvent::Line("a".to_string()));
        cancel.cancel();
        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::End(TerminalState::Cancelled)
        );
        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::End(TerminalState::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_cancel_while_polling() {
        // 完了しないログ
        let log = ScriptedLog::new(vec![Ok(LogChunk::new("first\n"))]);
        let cancel = CancellationToken::new();
        let mut tailer =
            LogTailer::new(Box::new(log), cancel.clone()).with_poll_interval(FAST);

        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::Line("first".to_string())
        );

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            trigger.cancel();
        });

        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::End(TerminalState::Cancelled)
        );
    }

    #[tokio::test]
    async fn test_interrupted_read_is_cancellation() {
        let log = ScriptedLog::new(vec![Ok(LogChunk::new("x\n")), Err(LogError::Interrupted)]);
        let (lines, state) = collect(&mut tailer(log)).await;
        assert_eq!(lines, vec!["x"]);
        assert_eq!(state, TerminalState::Cancelled);
    }

    #[tokio::test]
    async fn test_fetch_error_is_surfaced_once() {
        let log = ScriptedLog::new(vec![Err(LogError::Remote {
            status: 403,
            message: "AuthenticationFailed".to_string(),
        })]);
        let mut tailer = tailer(log);

        assert!(matches!(
            tailer.next_line().await,
            Err(LogError::Remote { status: 403, .. })
        ));
        assert_eq!(
            tailer.next_line().await.unwrap(),
            TailEvent::End(TerminalState::Failed)
        );
    }

    #[tokio::test]
    async fn test_large_chunk_splits_in_linear_time() {
        const LINES: usize = 100_000;
        let line = format!("{}\n", "x".repeat(72));
        let log = ScriptedLog::new(vec![Ok(
            LogChunk::new(line.repeat(LINES)).complete(Completion::Success)
        )]);
        let mut tailer = tailer(log);

        let started = std::time::Instant::now();
        let (lines, state) = collect(&mut tailer).await;
        let elapsed = started.elapsed();

        assert_eq!(lines.len(), LINES);
        assert_eq!(state, TerminalState::Succeeded);
        assert_eq!(tailer.cursor(), (LINES * 73) as u64);
        assert!(elapsed < Duration::from_secs(10), "split took {:?}", elapsed);
    }

    #[tokio::test]
    async fn test_unterminated_run_is_capped() {
        let log = ScriptedLog::new(vec![
            Ok(LogChunk::new(vec![b'a'; MAX_LINE_BYTES * 2 + 10])),
            Ok(LogChunk::new("\nnext\n").complete(Completion::Success)),
        ]);

        let (lines, state) = collect(&mut tailer(log)).await;
        let lengths: Vec<usize> = lines.iter().map(String::len).collect();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, MAX_LINE_BYTES, 10, 4]);
        assert_eq!(lines[3], "next");
        assert_eq!(state, TerminalState::Succeeded);
    }

    #[tokio::test]
    async fn test_growing_unterminated_line_flushes_at_cap() {
        let half = vec![b'b'; MAX_LINE_BYTES / 2 + 1];
        let log = ScriptedLog::new(vec![
            Ok(LogChunk::new(half.clone())),
            Ok(LogChunk::new(half)),
            Ok(LogChunk::empty().complete(Completion::Success)),
        ]);

        let (lines, _) = collect(&mut tailer(log)).await;
        let lengths: Vec<usize> = lines.iter().map(String::len).collect();
        assert_eq!(lengths, vec![MAX_LINE_BYTES, 2]);
    }

    #[test]
    fn test_decode_line() {
        assert_eq!(decode_line(b"abc\r".to_vec()), "abc");
        assert_eq!(decode_line(vec![0x66, 0xff, 0x6f]), "f\u{fffd}o");
    }
}
