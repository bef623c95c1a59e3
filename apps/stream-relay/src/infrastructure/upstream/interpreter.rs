//! Frame Interpreter
//!
//! Turns raw upstream frames into [`DomainEvent`]s. The feed speaks a mixed
//! protocol: JSON-RPC envelopes for game lifecycle and a loosely-tagged text
//! stream for table state. `interpret` is pure and total: a structured JSON
//! parse is attempted first, then an ordered set of tag matchers, and any
//! frame that matches nothing becomes `Passthrough` so raw traffic stays
//! observable downstream.
//!
//! Example frames:
//!
//! ```text
//! <betsopen game="4snk87vdzcmdnxkw" table="mrbras531mrbr532" seq="184">
//! <timer time="15"></timer>
//! <betsclosed game="4snk87vdzcmdnxkw">
//! {"gameId":"4snk87vdzcmdnxkw","gameResult":"7 Red"}
//! ```

use crate::domain::event::{DomainEvent, HistoryEntry, color_of};

/// Interpret one raw upstream frame.
#[must_use]
pub fn interpret(raw: &str) -> DomainEvent {
    if let Some(event) = interpret_json(raw) {
        return event;
    }
    if let Some(event) = interpret_tag(raw) {
        return event;
    }
    DomainEvent::Passthrough {
        raw: raw.to_string(),
    }
}

/// Structured parse of JSON frames.
fn interpret_json(raw: &str) -> Option<DomainEvent> {
    let value: serde_json::Value = serde_json::from_str(raw.trim()).ok()?;

    if let Some(results) = value.get("history").and_then(|h| h.as_array()) {
        return Some(DomainEvent::HistorySnapshot {
            results: parse_history_rows(results),
        });
    }

    let game_id = value.get("gameId").and_then(|g| g.as_str())?;
    let game_result = value.get("gameResult").and_then(|r| r.as_str())?;
    let number = parse_result_number(game_result)?;
    Some(DomainEvent::GameResult {
        game_id: game_id.to_string(),
        number,
        color: color_of(number),
    })
}

/// Ordered tag matchers for the text protocol.
fn interpret_tag(raw: &str) -> Option<DomainEvent> {
    let frame = raw.trim_start();

    if frame.starts_with("<betsopen") {
        let game_id = attr(frame, "game")?;
        return Some(DomainEvent::GameStarted {
            game_id: game_id.to_string(),
        });
    }

    // Both spellings appear on the wire.
    if frame.starts_with("<betsclosed") || frame.starts_with("<betsclose") {
        return Some(DomainEvent::BetsClosing);
    }

    if frame.starts_with("<timer") {
        let seconds = attr(frame, "time")
            .and_then(|v| v.parse().ok())
            .or_else(|| tag_body(frame).and_then(|b| b.trim().parse().ok()))?;
        return Some(DomainEvent::Timer {
            seconds_left: seconds,
        });
    }

    if frame.starts_with("<dealer") {
        let name = attr(frame, "name")?;
        return Some(DomainEvent::DealerInfo {
            name: name.to_string(),
        });
    }

    // History blobs sometimes arrive embedded in a larger text frame.
    if let Some(start) = frame.find("{\"history\"") {
        if let Some(fragment) = balanced_json(&frame[start..]) {
            return interpret_json(fragment);
        }
    }

    None
}

/// Extract the value of `name="value"` from a tag.
fn attr<'a>(frame: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{name}=\"");
    let start = frame.find(&needle)? + needle.len();
    let end = frame[start..].find('"')?;
    Some(&frame[start..start + end])
}

/// Extract the text body between `>` and `</` of a tag.
fn tag_body(frame: &str) -> Option<&str> {
    let open = frame.find('>')? + 1;
    let close = frame[open..].find("</")?;
    Some(&frame[open..open + close])
}

/// The leading number of a result string like `"7 Red"`.
fn parse_result_number(game_result: &str) -> Option<u8> {
    let first = game_result.split_whitespace().next()?;
    let number: u8 = first.parse().ok()?;
    (number <= 36).then_some(number)
}

/// Take the balanced JSON object at the start of `fragment`.
fn balanced_json(fragment: &str) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in fragment.char_indices() {
        if escaped {
            escaped = false;
            continue;
        }
        match c {
            '\\' if in_string => escaped = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(&fragment[..=i]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Normalize provider history rows into entries, skipping malformed rows.
fn parse_history_rows(rows: &[serde_json::Value]) -> Vec<HistoryEntry> {
    rows.iter()
        .filter_map(|row| {
            let game_id = row.get("gameId").and_then(|g| g.as_str())?;
            let number = row
                .get("gameResult")
                .and_then(|r| r.as_str())
                .and_then(parse_result_number)
                .or_else(|| {
                    row.get("number")
                        .and_then(serde_json::Value::as_u64)
                        .and_then(|n| u8::try_from(n).ok())
                        .filter(|n| *n <= 36)
                })?;
            Some(HistoryEntry::new(game_id, number))
        })
        .collect()
}
