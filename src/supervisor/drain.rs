use std::collections::HashMap;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::error::TranscodeError;

use super::classify::{LineClass, LineClassifier};

/// Per-stream tally of classified lines.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    pub stream: &'static str,
    pub lines: HashMap<LineClass, usize>,
}

impl DrainReport {
    fn new(stream: &'static str) -> Self {
        Self {
            stream,
            lines: HashMap::new(),
        }
    }

    pub fn count(&self, class: LineClass) -> usize {
        self.lines.get(&class).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.lines.values().sum()
    }

    fn record(&mut self, class: LineClass) {
        *self.lines.entry(class).or_insert(0) += 1;
    }
}

/// Reads `reader` to EOF, logging every line through `classifier`.
///
/// Lines end at `\n` or `\r`; the transcoder rewrites its progress line in place
/// with bare carriage returns. On a read failure `fault` is cancelled so the
/// supervisor can tear the child down.
pub async fn drain_lines<R>(
    mut reader: R,
    stream: &'static str,
    classifier: LineClassifier,
    fault: CancellationToken,
) -> Result<DrainReport, TranscodeError>
where
    R: AsyncRead + Unpin,
{
    let mut report = DrainReport::new(stream);
    let mut buffer = Vec::with_capacity(8192);
    let mut chunk = [0u8; 4096];

    loop {
        let read = match reader.read(&mut chunk).await {
            Ok(read) => read,
            Err(source) => {
                tracing::error!(stream = %stream, error = %source, "failed to read transcoder output");
                fault.cancel();
                return Err(TranscodeError::StreamDrain { stream, source });
            }
        };
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);

        while let Some(idx) = buffer
            .iter()
            .position(|byte| *byte == b'\r' || *byte == b'\n')
        {
            let line_bytes: Vec<u8> = buffer.drain(..=idx).collect();
            emit(&classifier, &mut report, &line_bytes);
        }
    }

    if !buffer.is_empty() {
        emit(&classifier, &mut report, &buffer);
    }

    tracing::debug!(stream = %stream, lines = report.total(), "transcoder stream closed");
    Ok(report)
}

fn emit(classifier: &LineClassifier, report: &mut DrainReport, bytes: &[u8]) {
    let line = String::from_utf8_lossy(bytes);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return;
    }
    let class = classifier.log(report.stream, trimmed);
    report.record(class);
}
