//! OSC side-channel dispatch.
//!
//! Terminal applications smuggle out-of-band state through OSC strings:
//! window titles, working-directory hints, desktop notifications, and
//! shell-integration prompt markers. This module turns a raw OSC payload
//! (`"<code>;<rest>"`) into a typed [`OscEvent`].
//!
//! Unknown codes are ignored; malformed payloads degrade to best-effort
//! extraction and never error.

/// Shell-integration phases signalled by OSC 133.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// `A` — prompt is about to be drawn.
    PromptStart,
    /// `B` — user command starts (payload carries the command line).
    CommandStart,
    /// `C` — command output begins.
    OutputStart,
    /// `D` — command finished (payload carries the exit code).
    CommandFinished,
}

impl MarkerKind {
    fn from_letter(letter: char) -> Option<Self> {
        match letter {
            'A' => Some(Self::PromptStart),
            'B' => Some(Self::CommandStart),
            'C' => Some(Self::OutputStart),
            'D' => Some(Self::CommandFinished),
            _ => None,
        }
    }
}

/// A typed side-channel event extracted from one OSC string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OscEvent {
    /// OSC 0 / 2 — window title.
    TitleChanged(String),
    /// OSC 7 — working directory hint.
    WorkingDirectoryChanged(String),
    /// OSC 9 / 99 / 777 — desktop notification.
    NotificationReceived {
        title: Option<String>,
        subtitle: Option<String>,
        body: Option<String>,
    },
    /// OSC 133 — shell prompt marker.
    ShellPromptMarker {
        kind: MarkerKind,
        payload: Option<String>,
    },
}

/// Parse one OSC payload into an event. `None` for unknown or
/// unparsable codes.
#[must_use]
pub fn parse_osc(payload: &str) -> Option<OscEvent> {
    let (code, rest) = match payload.split_once(';') {
        Some((code, rest)) => (code, Some(rest)),
        None => (payload, None),
    };

    match code {
        "0" | "2" => Some(OscEvent::TitleChanged(rest.unwrap_or("").to_string())),
        "7" => Some(OscEvent::WorkingDirectoryChanged(extract_path(
            rest.unwrap_or(""),
        ))),
        "9" => {
            let body = rest.unwrap_or("");
            if body.is_empty() {
                return None;
            }
            Some(OscEvent::NotificationReceived {
                title: Some("Terminal".to_string()),
                subtitle: None,
                body: Some(body.to_string()),
            })
        }
        "99" => Some(parse_osc_99(rest.unwrap_or(""))),
        "777" => parse_osc_777(rest.unwrap_or("")),
        "133" => parse_osc_133(rest?),
        _ => None,
    }
}

/// OSC 99 — either `key=value;key=value` with keys `t` (title), `b`
/// (body), `s` (subtitle), or a bare body.
fn parse_osc_99(rest: &str) -> OscEvent {
    let parts: Vec<&str> = rest.split(';').collect();
    let all_keyed = !rest.is_empty()
        && parts.iter().all(|p| {
            matches!(p.as_bytes(), [b't' | b'b' | b's', b'=', ..])
        });

    if all_keyed {
        let mut title = None;
        let mut subtitle = None;
        let mut body = None;
        for part in parts {
            let value = part[2..].to_string();
            match part.as_bytes()[0] {
                b't' => title = Some(value),
                b's' => subtitle = Some(value),
                _ => body = Some(value),
            }
        }
        OscEvent::NotificationReceived {
            title,
            subtitle,
            body,
        }
    } else {
        OscEvent::NotificationReceived {
            title: None,
            subtitle: None,
            body: if rest.is_empty() {
                None
            } else {
                Some(rest.to_string())
            },
        }
    }
}

/// OSC 777 — rxvt-unicode style `notify;title;body`, or a bare body.
fn parse_osc_777(rest: &str) -> Option<OscEvent> {
    if let Some(args) = rest.strip_prefix("notify;") {
        let (title, body) = match args.split_once(';') {
            Some((title, body)) => (title.to_string(), body.to_string()),
            None => (args.to_string(), String::new()),
        };
        if title.is_empty() && body.is_empty() {
            return None;
        }
        Some(OscEvent::NotificationReceived {
            title: Some(title),
            subtitle: None,
            body: Some(body),
        })
    } else if rest.is_empty() {
        None
    } else {
        Some(OscEvent::NotificationReceived {
            title: None,
            subtitle: None,
            body: Some(rest.to_string()),
        })
    }
}

/// OSC 133 — a single marker letter with an optional `;payload`.
fn parse_osc_133(rest: &str) -> Option<OscEvent> {
    let (letter, payload) = match rest.split_once(';') {
        Some((letter, payload)) => (letter, Some(payload.to_string())),
        None => (rest, None),
    };
    let kind = MarkerKind::from_letter(letter.chars().next()?)?;
    Some(OscEvent::ShellPromptMarker { kind, payload })
}

/// Best-effort path extraction for OSC 7.
///
/// Accepts `file://host/path`, `file:///path`, and bare paths. Percent
/// escapes are decoded; a Windows-style `/C:/...` loses its leading
/// slash. Malformed input falls back to the raw string minus scheme.
fn extract_path(value: &str) -> String {
    let path = match value.strip_prefix("file://") {
        Some(rest) => {
            // Skip the authority (host) component up to the next slash.
            match rest.find('/') {
                Some(idx) => &rest[idx..],
                None => rest,
            }
        }
        None => value,
    };

    let decoded = percent_decode(path);

    // file:///C:/src parses to /C:/src — strip the slash before a drive.
    let bytes = decoded.as_bytes();
    if bytes.len() >= 3
        && bytes[0] == b'/'
        && bytes[1].is_ascii_alphabetic()
        && bytes[2] == b':'
    {
        decoded[1..].to_string()
    } else {
        decoded
    }
}

/// Decode `%XX` escapes, leaving malformed escapes untouched.
fn percent_decode(s: &str) -> String {
    fn hex_val(b: u8) -> Option<u8> {
        match b {
            b'0'..=b'9' => Some(b - b'0'),
            b'a'..=b'f' => Some(b - b'a' + 10),
            b'A'..=b'F' => Some(b - b'A' + 10),
            _ => None,
        }
    }

    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            if let (Some(hi), Some(lo)) = (hex_val(bytes[i + 1]), hex_val(bytes[i + 2])) {
                out.push(hi << 4 | lo);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).into_owned()
}

// ─── Tests ──────────────────────────────────────────────────────────────────
