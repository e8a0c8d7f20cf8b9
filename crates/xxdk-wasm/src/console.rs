//! Tracing output on the browser console
//!
//! Each event is buffered and written with the console method matching its
//! level when the writer is dropped, so one event is one console entry.

use std::io;

use tracing::{Level, Metadata};
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::fmt::MakeWriter;
use xxdk_core::logging::env_filter;
use xxdk_core::{LoggingConfig, Result};
use xxdk_logging::{LogFileWriter, RemoteLogFile};

/// Console method an event is written with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ConsoleMethod {
    Error,
    Warn,
    Info,
    Log,
    Debug,
}

impl ConsoleMethod {
    pub(crate) fn for_level(level: &Level) -> Self {
        match *level {
            Level::ERROR => ConsoleMethod::Error,
            Level::WARN => ConsoleMethod::Warn,
            Level::INFO => ConsoleMethod::Info,
            Level::DEBUG => ConsoleMethod::Log,
            Level::TRACE => ConsoleMethod::Debug,
        }
    }
}

/// Makes a [`ConsoleWriter`] per event
#[derive(Debug, Clone, Copy, Default)]
pub struct MakeConsoleWriter;

pub struct ConsoleWriter {
    method: ConsoleMethod,
    buffer: Vec<u8>,
}

impl ConsoleWriter {
    fn new(method: ConsoleMethod) -> Self {
        Self {
            method,
            buffer: Vec::new(),
        }
    }

    /// Buffered text without the trailing newline the formatter appends
    fn line(&self) -> String {
        let text = String::from_utf8_lossy(&self.buffer);
        text.trim_end_matches('\n').to_string()
    }
}

impl io::Write for ConsoleWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Drop for ConsoleWriter {
    fn drop(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        emit(self.method, &self.line());
    }
}

#[cfg(target_arch = "wasm32")]
fn emit(method: ConsoleMethod, line: &str) {
    use wasm_bindgen::JsValue;
    use web_sys::console;

    let line = JsValue::from_str(line);
    match method {
        ConsoleMethod::Error => console::error_1(&line),
        ConsoleMethod::Warn => console::warn_1(&line),
        ConsoleMethod::Info => console::info_1(&line),
        ConsoleMethod::Log => console::log_1(&line),
        ConsoleMethod::Debug => console::debug_1(&line),
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn emit(_: ConsoleMethod, line: &str) {
    eprintln!("{}", line);
}

impl<'a> MakeWriter<'a> for MakeConsoleWriter {
    type Writer = ConsoleWriter;

    fn make_writer(&'a self) -> Self::Writer {
        ConsoleWriter::new(ConsoleMethod::Log)
    }

    fn make_writer_for(&'a self, meta: &Metadata<'_>) -> Self::Writer {
        ConsoleWriter::new(ConsoleMethod::for_level(meta.level()))
    }
}

/// Install the global subscriber: console output without timestamps, and
/// optionally every line mirrored into a log file worker.
///
/// A subscriber that is already installed is left in place.
pub fn init_logging(config: &LoggingConfig, log_file: Option<RemoteLogFile>) -> Result<()> {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config)?)
        .with_ansi(false)
        .without_time();
    let _ = match log_file {
        Some(file) => builder
            .with_writer(MakeConsoleWriter.and(LogFileWriter::new(file)))
            .try_init(),
        None => builder.with_writer(MakeConsoleWriter).try_init(),
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_level_mapping() {
        assert_eq!(ConsoleMethod::for_level(&Level::ERROR), ConsoleMethod::Error);
        assert_eq!(ConsoleMethod::for_level(&Level::WARN), ConsoleMethod::Warn);
        assert_eq!(ConsoleMethod::for_level(&Level::DEBUG), ConsoleMethod::Log);
    }

    #[test]
    fn test_writer_buffers_one_line() {
        let mut writer = ConsoleWriter::new(ConsoleMethod::Info);
        writer.write_all(b" INFO xxdk_worker: ").unwrap();
        writer.write_all(b"Starting worker manager\n").unwrap();
        assert_eq!(writer.line(), " INFO xxdk_worker: Starting worker manager");
    }
}
