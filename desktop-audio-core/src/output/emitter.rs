use std::io::{self, Write};

use crate::models::error::FeedError;
use crate::models::record::{ChannelRecord, ChannelSamples, OutputFormat};

/// Line-delimited JSON writer for sample records.
///
/// Every record is written as a single line and flushed immediately.
/// There is no backpressure handling: if the reader stalls, the write
/// blocks on the pipe.
///
/// ## Line Format
///
/// **Channels:**
/// ```text
/// {"leftSamples":[0.2,0.9],"rightSamples":[0.3,1.0]}
/// ```
///
/// **Interleaved:**
/// ```text
/// [0.2,0.3,0.9,1.0]
/// ```
pub struct RecordEmitter<W: Write> {
    writer: W,
    format: OutputFormat,
    line: Vec<u8>,
    records_written: u64,
}

impl RecordEmitter<io::Stdout> {
    pub fn stdout(format: OutputFormat) -> Self {
        Self::new(io::stdout(), format)
    }
}

impl<W: Write> RecordEmitter<W> {
    pub fn new(writer: W, format: OutputFormat) -> Self {
        Self {
            writer,
            format,
            line: Vec::new(),
            records_written: 0,
        }
    }

    pub fn format(&self) -> OutputFormat {
        self.format
    }

    pub fn records_written(&self) -> u64 {
        self.records_written
    }

    /// Serialize and write one record, then flush.
    pub fn emit(&mut self, samples: &ChannelSamples) -> Result<(), FeedError> {
        self.line.clear();
        let serialized = match self.format {
            OutputFormat::Channels => serde_json::to_writer(&mut self.line, &ChannelRecord::from(samples)),
            OutputFormat::Interleaved => serde_json::to_writer(&mut self.line, &samples.interleaved()),
        };
        serialized.map_err(|e| FeedError::Emit(format!("failed to serialize record: {}", e)))?;
        self.line.push(b'\n');

        self.writer.write_all(&self.line)?;
        self.writer.flush()?;
        self.records_written += 1;
        Ok(())
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
