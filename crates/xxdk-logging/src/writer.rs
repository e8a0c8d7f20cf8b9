//! Tracing output routed into a [`RemoteLogFile`]

use std::io;

use tracing_subscriber::fmt::MakeWriter;

use crate::remote::RemoteLogFile;

/// `io::Write` sink over a remote log file; also a [`MakeWriter`] so it
/// plugs straight into `tracing_subscriber::fmt().with_writer(..)`
#[derive(Clone)]
pub struct LogFileWriter {
    file: RemoteLogFile,
}

impl LogFileWriter {
    pub fn new(file: RemoteLogFile) -> Self {
        Self { file }
    }

    pub fn file(&self) -> &RemoteLogFile {
        &self.file
    }
}

impl io::Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file
            .write(buf)
            .map_err(|e| io::Error::new(io::ErrorKind::BrokenPipe, e.to_string()))?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogFileWriter {
    type Writer = LogFileWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
