// src/kernel/dialect.rs

//! How code is framed for, and output parsed from, a resident kernel process.
//!
//! Each submission carries a fresh completion marker. The kernel echoes the
//! marker once per monitored stream when it has finished the submission, so
//! the session knows the run is over without counting messages.
//!
//! - `Shell`: the code is wrapped in `command eval '...'` so syntax errors
//!   and special built-in failures do not terminate the shell. The marker is
//!   printed on stderr, then on stdout followed by the exit status.
//! - `Python`: a resident driver reads one JSON request per line and answers
//!   with JSON lines (`stream`, `display_data`, `error`, `done`).

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::kernel::event::{EventContent, StreamName};
use crate::types::KernelDialect;

/// Resident driver for the `python` dialect.
const PYTHON_DRIVER: &str = r#"
import ast, json, sys, traceback

_out = sys.stdout

def emit(msg):
    _out.write(json.dumps(msg) + "\n")
    _out.flush()

class Stream:
    def __init__(self, name):
        self.name = name
    def write(self, text):
        if text:
            emit({"type": "stream", "name": self.name, "text": text})
        return len(text)
    def flush(self):
        pass

sys.stdout = Stream("stdout")
sys.stderr = Stream("stderr")
ns = {"__name__": "__main__"}

while True:
    try:
        raw = sys.stdin.readline()
    except KeyboardInterrupt:
        continue
    if not raw:
        break
    req = json.loads(raw)
    try:
        tree = ast.parse(req["code"], "<cell>", "exec")
        last = None
        if tree.body and isinstance(tree.body[-1], ast.Expr):
            last = ast.Expression(tree.body.pop().value)
        exec(compile(tree, "<cell>", "exec"), ns)
        if last is not None:
            value = eval(compile(last, "<cell>", "eval"), ns)
            if value is not None:
                emit({"type": "display_data", "data": {"text/plain": repr(value)}})
    except BaseException as e:
        emit({"type": "error", "ename": type(e).__name__, "evalue": str(e),
              "traceback": traceback.format_exception(type(e), e, e.__traceback__)})
    emit({"type": "done", "marker": req["marker"]})
"#;

/// One parsed unit of kernel output.
#[derive(Debug, Clone, PartialEq)]
pub enum KernelLine {
    Output(EventContent),
    /// The completion marker for the current submission was seen on one
    /// stream. The shell reports its exit status alongside the stdout marker.
    Done { status: Option<i32> },
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum DriverMessage {
    Stream {
        name: StreamName,
        text: String,
    },
    DisplayData {
        data: Map<String, Value>,
    },
    Error {
        ename: String,
        evalue: String,
        #[serde(default)]
        traceback: Vec<String>,
    },
    Done {
        marker: String,
    },
}

impl KernelDialect {
    /// Arguments appended after the configured kernel args.
    pub fn spawn_args(self) -> Vec<String> {
        match self {
            KernelDialect::Shell => Vec::new(),
            KernelDialect::Python => vec!["-u".into(), "-c".into(), PYTHON_DRIVER.into()],
        }
    }

    /// Written to stdin once, right after spawning.
    pub fn preamble(self) -> Option<&'static str> {
        match self {
            // A trapped (not ignored) signal is reset in children, so the
            // running command is interrupted while the shell survives.
            // Built-ins run in the shell itself and are not interrupted.
            KernelDialect::Shell => Some("trap 'true' INT\n"),
            KernelDialect::Python => None,
        }
    }

    /// Number of `Done` lines that complete one submission.
    pub fn markers_expected(self) -> usize {
        match self {
            KernelDialect::Shell => 2,
            KernelDialect::Python => 1,
        }
    }

    /// Text written to the kernel's stdin for one submission.
    pub fn frame(self, code: &str, marker: &str) -> String {
        match self {
            KernelDialect::Shell => {
                let escaped = code.replace('\'', r"'\''");
                format!(
                    "command eval '{escaped}'\n\
                     __kg_rc=$?\n\
                     printf '%s\\n' '{marker}' >&2\n\
                     printf '%s %d\\n' '{marker}' \"$__kg_rc\"\n"
                )
            }
            KernelDialect::Python => {
                let request = serde_json::json!({ "code": code, "marker": marker });
                format!("{request}\n")
            }
        }
    }

    /// Parse one line (without its trailing newline) read from `source`.
    pub fn parse_line(self, source: StreamName, line: &str, marker: &str) -> Vec<KernelLine> {
        match self {
            KernelDialect::Shell => parse_shell_line(source, line, marker),
            KernelDialect::Python => parse_python_line(source, line, marker),
        }
    }

    /// Extra event emitted after all markers were seen, before going idle.
    ///
    /// The shell has no exceptions, so a non-zero exit status becomes an
    /// error whose traceback is the stderr text of the run.
    pub fn finish(self, status: Option<i32>, stderr: &str) -> Option<EventContent> {
        match (self, status) {
            (KernelDialect::Shell, Some(code)) if code != 0 => Some(EventContent::Error {
                ename: "ExitStatus".to_string(),
                evalue: code.to_string(),
                traceback: stderr.lines().map(str::to_string).collect(),
            }),
            _ => None,
        }
    }
}

fn stream(name: StreamName, text: String) -> KernelLine {
    KernelLine::Output(EventContent::Stream { name, text })
}

fn parse_shell_line(source: StreamName, line: &str, marker: &str) -> Vec<KernelLine> {
    let Some(idx) = line.find(marker) else {
        return vec![stream(source, format!("{line}\n"))];
    };

    let mut out = Vec::new();
    // Output that did not end with a newline shares the marker's line.
    let prefix = &line[..idx];
    if !prefix.is_empty() {
        out.push(stream(source, prefix.to_string()));
    }

    let status = line[idx + marker.len()..].trim().parse::<i32>().ok();
    out.push(KernelLine::Done { status });
    out
}

fn parse_python_line(source: StreamName, line: &str, marker: &str) -> Vec<KernelLine> {
    if source == StreamName::Stderr {
        return vec![stream(source, format!("{line}\n"))];
    }

    match serde_json::from_str::<DriverMessage>(line) {
        Ok(DriverMessage::Stream { name, text }) => vec![stream(name, text)],
        Ok(DriverMessage::DisplayData { data }) => {
            vec![KernelLine::Output(EventContent::DisplayData { data })]
        }
        Ok(DriverMessage::Error {
            ename,
            evalue,
            traceback,
        }) => vec![KernelLine::Output(EventContent::Error {
            ename,
            evalue,
            traceback,
        })],
        Ok(DriverMessage::Done { marker: seen }) if seen == marker => {
            vec![KernelLine::Done { status: None }]
        }
        Ok(DriverMessage::Done { marker: seen }) => {
            tracing::debug!(marker = %seen, "ignoring stale completion marker");
            Vec::new()
        }
        // Raw writes to fd 1 (e.g. from a child process) bypass the driver.
        Err(_) => vec![stream(source, format!("{line}\n"))],
    }
}
