use serde_json::Value;
use tracing::{debug, trace, warn};

use super::frame::RelayFrame;

pub const DELTA_EVENT: &str = "conversation.message.delta";
pub const DONE_EVENT: &str = "done";
const CHAT_FAILED_EVENT: &str = "conversation.chat.failed";
const ERROR_EVENT: &str = "error";

// ---------------------------------------------------------------------------
// Line reconstruction
// ---------------------------------------------------------------------------

/// Splits `carry + chunk` into complete lines and the new carry.
///
/// Lines are cut on `\n` at the byte level and only decoded once complete, so
/// a multi-byte character straddling two chunks decodes the same as if it had
/// arrived whole. The returned carry never contains `\n`.
pub fn split_lines(mut carry: Vec<u8>, chunk: &[u8]) -> (Vec<String>, Vec<u8>) {
    carry.extend_from_slice(chunk);

    let Some(last_newline) = carry.iter().rposition(|b| *b == b'\n') else {
        return (Vec::new(), carry);
    };

    let rest = carry.split_off(last_newline + 1);
    carry.pop();
    let lines = carry
        .split(|b| *b == b'\n')
        .map(|line| String::from_utf8_lossy(line).into_owned())
        .collect();
    (lines, rest)
}

/// Holds the unterminated tail of the upstream body between chunks.
#[derive(Debug, Default)]
pub struct LineBuffer {
    carry: Vec<u8>,
}

impl LineBuffer {
    pub fn push(&mut self, chunk: &[u8]) -> Vec<String> {
        let (lines, carry) = split_lines(std::mem::take(&mut self.carry), chunk);
        self.carry = carry;
        lines
    }

    pub fn carry(&self) -> &[u8] {
        &self.carry
    }
}

// ---------------------------------------------------------------------------
// Line classification
// ---------------------------------------------------------------------------

/// Whether `data:` lines are currently worth decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventState {
    DeltaActive,
    #[default]
    Other,
}

/// An upstream `event:` label, reduced to what the relay acts on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpstreamEvent {
    MessageDelta,
    Done,
    ChatFailed,
    Error,
    Other(String),
}

impl UpstreamEvent {
    pub fn from_label(label: &str) -> Self {
        match label {
            DELTA_EVENT => UpstreamEvent::MessageDelta,
            DONE_EVENT => UpstreamEvent::Done,
            CHAT_FAILED_EVENT => UpstreamEvent::ChatFailed,
            ERROR_EVENT => UpstreamEvent::Error,
            other => UpstreamEvent::Other(other.to_string()),
        }
    }

    pub fn state(&self) -> EventState {
        match self {
            UpstreamEvent::MessageDelta => EventState::DeltaActive,
            _ => EventState::Other,
        }
    }
}

/// Why a line produced nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// `data:` outside a delta event.
    NotDelta,
    EmptyData,
    InvalidJson,
    /// Decoded, but not a non-empty `answer` fragment.
    NotAnswer,
    /// Neither `event:` nor `data:` (comments, `id:`, `retry:` ...).
    Unrecognized,
}

impl SkipReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipReason::NotDelta => "not_delta",
            SkipReason::EmptyData => "empty_data",
            SkipReason::InvalidJson => "invalid_json",
            SkipReason::NotAnswer => "not_answer",
            SkipReason::Unrecognized => "unrecognized",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LineOutcome {
    Blank,
    Event(UpstreamEvent),
    Frame(RelayFrame),
    Skip(SkipReason),
}

/// Classifies one complete line under `state` and returns the next state.
///
/// Only `event:` lines change the state; nothing here can fail.
pub fn step(state: EventState, line: &str) -> (EventState, LineOutcome) {
    let line = line.trim();
    if line.is_empty() {
        return (state, LineOutcome::Blank);
    }

    if let Some(label) = line.strip_prefix("event:") {
        let event = UpstreamEvent::from_label(label.trim());
        return (event.state(), LineOutcome::Event(event));
    }

    if let Some(data) = line.strip_prefix("data:") {
        if state != EventState::DeltaActive {
            return (state, LineOutcome::Skip(SkipReason::NotDelta));
        }
        return (state, decode_delta(data.trim()));
    }

    (state, LineOutcome::Skip(SkipReason::Unrecognized))
}

fn decode_delta(data: &str) -> LineOutcome {
    if data.is_empty() {
        return LineOutcome::Skip(SkipReason::EmptyData);
    }

    let payload: Value = match serde_json::from_str(data) {
        Ok(v) => v,
        Err(_) => return LineOutcome::Skip(SkipReason::InvalidJson),
    };

    let is_answer = payload.get("type").and_then(Value::as_str) == Some("answer");
    match payload.get("content").and_then(Value::as_str) {
        Some(content) if is_answer && !content.is_empty() => {
            LineOutcome::Frame(RelayFrame::Content(content.to_string()))
        }
        _ => LineOutcome::Skip(SkipReason::NotAnswer),
    }
}

// ---------------------------------------------------------------------------
// Stateful parser
// ---------------------------------------------------------------------------

/// Per-response counters, so drop rates can be observed without touching output.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelayStats {
    pub lines: u64,
    pub frames: u64,
    pub not_delta: u64,
    pub empty_data: u64,
    pub invalid_json: u64,
    pub not_answer: u64,
    pub unrecognized: u64,
    /// Frames withheld because the sentinel was already sent.
    pub after_done: u64,
}

impl RelayStats {
    fn record_skip(&mut self, reason: SkipReason) {
        let counter = match reason {
            SkipReason::NotDelta => &mut self.not_delta,
            SkipReason::EmptyData => &mut self.empty_data,
            SkipReason::InvalidJson => &mut self.invalid_json,
            SkipReason::NotAnswer => &mut self.not_answer,
            SkipReason::Unrecognized => &mut self.unrecognized,
        };
        *counter += 1;
    }

    pub fn skipped(&self) -> u64 {
        self.not_delta + self.empty_data + self.invalid_json + self.not_answer + self.unrecognized
    }
}

/// Parse state for one upstream response. Never shared or reused.
#[derive(Debug, Default)]
pub struct RelayParser {
    lines: LineBuffer,
    state: EventState,
    done: bool,
    stats: RelayStats,
}

impl RelayParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Consumes one upstream chunk and returns the frames it completes, in order.
    pub fn feed(&mut self, chunk: &[u8]) -> Vec<RelayFrame> {
        self.lines
            .push(chunk)
            .iter()
            .filter_map(|line| self.process_line(line))
            .collect()
    }

    fn process_line(&mut self, line: &str) -> Option<RelayFrame> {
        self.stats.lines += 1;
        let (state, outcome) = step(self.state, line);
        self.state = state;

        let frame = match outcome {
            LineOutcome::Blank => None,
            LineOutcome::Event(UpstreamEvent::Done) => Some(RelayFrame::Done),
            LineOutcome::Event(event @ (UpstreamEvent::ChatFailed | UpstreamEvent::Error)) => {
                warn!(?event, "upstream reported a failure event");
                None
            }
            LineOutcome::Event(UpstreamEvent::Other(label)) => {
                trace!(event = %label, "upstream event");
                None
            }
            LineOutcome::Event(_) => None,
            LineOutcome::Frame(frame) => Some(frame),
            LineOutcome::Skip(reason) => {
                trace!(reason = reason.as_str(), line = line.trim(), "dropped upstream line");
                self.stats.record_skip(reason);
                None
            }
        }?;

        if self.done {
            self.stats.after_done += 1;
            return None;
        }
        if frame == RelayFrame::Done {
            self.done = true;
        }
        self.stats.frames += 1;
        Some(frame)
    }

    pub fn is_done(&self) -> bool {
        self.done
    }

    /// Ends the response. An unterminated trailing line is dropped, never flushed.
    pub fn finish(self) -> RelayStats {
        let leftover = self.lines.carry().len();
        if leftover > 0 {
            debug!(bytes = leftover, "discarding unterminated upstream line");
        }
        debug!(
            lines = self.stats.lines,
            frames = self.stats.frames,
            skipped = self.stats.skipped(),
            invalid_json = self.stats.invalid_json,
            done = self.done,
            "relay stream finished"
        );
        self.stats
    }
}
