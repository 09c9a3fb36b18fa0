//! Stack trace structuring.
//!
//! SDKs report `exception.stacktrace` as the language runtime printed it.
//! Downstream consumers want frames, so recognised formats (Python
//! tracebacks, Go panics, JavaScript and Java `at ...` lines) are parsed into
//! a JSON array of [`StackFrame`]s, most recent call first. Anything
//! unrecognised is passed through unchanged.

use regex::Regex;
use serde::Serialize;
use std::sync::LazyLock;

/// One frame of a structured stack trace.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_number: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub function_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_content: Option<String>,
}

/// Compiled frame patterns.
struct FramePatterns {
    /// `  File "app.py", line 10, in handler`
    python_frame: Regex,
    /// `    at handler (/srv/app.js:10:5)` or `    at /srv/app.js:10:5`
    js_frame: Regex,
    /// `	at com.example.Foo.bar(Foo.java:10)`
    java_frame: Regex,
    /// `main.handler(0xc000010000)`
    go_function: Regex,
    /// `	/srv/main.go:42 +0x1d`
    go_location: Regex,
}

fn build_patterns() -> Option<FramePatterns> {
    Some(FramePatterns {
        python_frame: Regex::new(r#"^\s*File "(?P<file>[^"]+)", line (?P<line>\d+)(?:, in (?P<func>.+))?$"#)
            .ok()?,
        js_frame: Regex::new(
            r"^\s*at (?:(?P<func>.+?) \()?(?P<file>[^()\s]+?):(?P<line>\d+)(?::(?P<col>\d+))?\)?\s*$",
        )
        .ok()?,
        java_frame: Regex::new(r"^\s*at (?P<func>[^\s(]+)\((?P<file>[^:()]+)(?::(?P<line>\d+))?\)\s*$")
            .ok()?,
        go_function: Regex::new(r"^(?P<func>[^\s(][^(]*)\(.*\)$").ok()?,
        go_location: Regex::new(r"^\t(?P<file>\S+?):(?P<line>\d+)(?: \+0x[0-9a-fA-F]+)?$").ok()?,
    })
}

#[allow(clippy::incompatible_msrv)]
static PATTERNS: LazyLock<Option<FramePatterns>> = LazyLock::new(build_patterns);

/// Structure a raw stack trace.
///
/// Returns a JSON array of frames when the format is recognised, otherwise
/// the input unchanged.
#[must_use]
pub fn structure_stack_trace(stacktrace: &str) -> String {
    let frames = parse_frames(stacktrace);
    if frames.is_empty() {
        return stacktrace.to_owned();
    }
    match serde_json::to_string(&frames) {
        Ok(json) => json,
        Err(e) => {
            tracing::debug!(error = %e, "Failed to serialise stack frames, keeping raw trace");
            stacktrace.to_owned()
        }
    }
}

/// Parse frames from any recognised format, most recent call first.
#[must_use]
pub fn parse_frames(stacktrace: &str) -> Vec<StackFrame> {
    let Some(patterns) = PATTERNS.as_ref() else {
        return Vec::new();
    };

    let lines: Vec<&str> = stacktrace.lines().collect();
    let parsers: [FrameParser; 3] = [parse_python, parse_go, parse_at_frames];
    for parse in parsers {
        let frames = parse(patterns, &lines);
        if !frames.is_empty() {
            return frames;
        }
    }
    Vec::new()
}

type FrameParser = fn(&FramePatterns, &[&str]) -> Vec<StackFrame>;

fn capture_u32(caps: &regex::Captures<'_>, name: &str) -> Option<u32> {
    caps.name(name).and_then(|m| m.as_str().parse().ok())
}

fn capture_string(caps: &regex::Captures<'_>, name: &str) -> Option<String> {
    caps.name(name).map(|m| m.as_str().trim().to_owned())
}

/// Python prints the most recent call last, so frames are reversed.
fn parse_python(patterns: &FramePatterns, lines: &[&str]) -> Vec<StackFrame> {
    let mut frames = Vec::new();
    let mut iter = lines.iter().peekable();

    while let Some(line) = iter.next() {
        let Some(caps) = patterns.python_frame.captures(line) else {
            continue;
        };
        let line_content = iter
            .peek()
            .filter(|next| {
                next.starts_with(char::is_whitespace)
                    && !next.trim().is_empty()
                    && !patterns.python_frame.is_match(next)
            })
            .map(|next| next.trim().to_owned());
        if line_content.is_some() {
            iter.next();
        }
        frames.push(StackFrame {
            file_name: capture_string(&caps, "file"),
            line_number: capture_u32(&caps, "line"),
            function_name: capture_string(&caps, "func"),
            line_content,
            ..Default::default()
        });
    }

    frames.reverse();
    frames
}

/// Go panics print a function line followed by a tab-indented location line.
fn parse_go(patterns: &FramePatterns, lines: &[&str]) -> Vec<StackFrame> {
    let mut frames = Vec::new();

    for pair in lines.windows(2) {
        let (function, location) = (pair[0], pair[1]);
        let Some(loc) = patterns.go_location.captures(location) else {
            continue;
        };
        let function_name = patterns
            .go_function
            .captures(function)
            .and_then(|caps| capture_string(&caps, "func"));
        frames.push(StackFrame {
            file_name: capture_string(&loc, "file"),
            line_number: capture_u32(&loc, "line"),
            function_name,
            ..Default::default()
        });
    }

    frames
}

/// `at ...` frames (JavaScript, Java) are already most recent first.
fn parse_at_frames(patterns: &FramePatterns, lines: &[&str]) -> Vec<StackFrame> {
    lines
        .iter()
        .filter_map(|line| {
            if let Some(caps) = patterns.java_frame.captures(line) {
                return Some(StackFrame {
                    file_name: capture_string(&caps, "file"),
                    line_number: capture_u32(&caps, "line"),
                    function_name: capture_string(&caps, "func"),
                    ..Default::default()
                });
            }
            patterns.js_frame.captures(line).map(|caps| StackFrame {
                file_name: capture_string(&caps, "file"),
                line_number: capture_u32(&caps, "line"),
                column_number: capture_u32(&caps, "col"),
                function_name: capture_string(&caps, "func"),
                ..Default::default()
            })
        })
        .collect()
}
