use std::fmt;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};

use crate::error::Result;

/// Which child stream a line came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKind {
    Stdout,
    Stderr,
}

impl fmt::Display for StreamKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StreamKind::Stdout => f.write_str("stdout"),
            StreamKind::Stderr => f.write_str("stderr"),
        }
    }
}

/// Read `reader` to the end, logging every line and handing it to `on_line`.
///
/// Lines that are not valid UTF-8 are dropped; blank lines are skipped. An
/// error from `on_line` stops draining and is returned. Returns the number of
/// lines delivered.
pub async fn drain_lines<R, F>(
    reader: R,
    instance: usize,
    stream: StreamKind,
    mut on_line: F,
) -> Result<usize>
where
    R: AsyncRead + Unpin,
    F: FnMut(&str) -> Result<()>,
{
    let mut reader = BufReader::new(reader);
    let mut buf = Vec::new();
    let mut delivered = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = match std::str::from_utf8(&buf) {
            Ok(line) => line.trim(),
            Err(e) => {
                tracing::debug!(instance, %stream, error = %e, "skipping undecodable line");
                continue;
            }
        };
        if line.is_empty() {
            continue;
        }

        tracing::info!(target: "octo_core::child", instance, %stream, "{line}");
        on_line(line)?;
        delivered += 1;
    }

    Ok(delivered)
}
