// src/exec/protocol.rs

//! Worker → controller line protocol.
//!
//! Workers talk to the controller over their stdout, one line per message:
//!
//! - any ordinary line is a free-text status update;
//! - a line starting with [`RESULT_PREFIX`] carries the worker's single
//!   result value (the rest of the line, verbatim).
//!
//! Workers written in Rust can use [`Reporter`]; anything else only has to
//! print lines.

use std::io::{self, Stdout, Write};

use time::OffsetDateTime;
use time::macros::format_description;

/// Reserved prefix marking the result line.
pub const RESULT_PREFIX: &str = "@@memsched:result ";

/// One decoded line of worker output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerLine {
    Update(String),
    Result(String),
}

pub fn parse_line(line: &str) -> WorkerLine {
    let line = line.strip_suffix('\r').unwrap_or(line);
    match line.strip_prefix(RESULT_PREFIX) {
        Some(value) => WorkerLine::Result(value.to_string()),
        None => WorkerLine::Update(line.to_string()),
    }
}

/// Local wall-clock time, falling back to UTC when the offset is unknown.
pub fn now_local() -> OffsetDateTime {
    OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc())
}

/// `[HH:MM:SS]`, the prefix of every update line.
pub fn clock_stamp() -> String {
    let clock = now_local()
        .format(format_description!("[hour]:[minute]:[second]"))
        .unwrap_or_default();
    format!("[{clock}]")
}

/// `YY.MM.DD-HH.MM.SS`, safe to use in file names.
pub fn file_stamp() -> String {
    now_local()
        .format(format_description!(
            "[year repr:last_two].[month].[day]-[hour].[minute].[second]"
        ))
        .unwrap_or_default()
}

/// Worker-side writer for the line protocol.
#[derive(Debug)]
pub struct Reporter<W: Write> {
    out: W,
    result_sent: bool,
}

impl Reporter<Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write> Reporter<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            result_sent: false,
        }
    }

    /// Send a timestamped status update. Embedded newlines are flattened.
    pub fn update(&mut self, message: &str) -> io::Result<()> {
        let flat = message.replace(['\n', '\r'], " ");
        writeln!(self.out, "{} {}", clock_stamp(), flat)?;
        self.out.flush()
    }

    /// Send the result value. At most one result may be sent per process.
    pub fn result(&mut self, value: &str) -> io::Result<()> {
        if self.result_sent {
            return Err(io::Error::new(
                io::ErrorKind::AlreadyExists,
                "a result has already been sent by this worker",
            ));
        }
        if value.contains('\n') {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "result values must fit on a single line",
            ));
        }
        writeln!(self.out, "{RESULT_PREFIX}{value}")?;
        self.out.flush()?;
        self.result_sent = true;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}
