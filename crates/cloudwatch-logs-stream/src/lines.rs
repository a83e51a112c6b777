// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

use crate::error::{ForwardError, LogError};
use crate::session::StreamSession;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tracing::{debug, warn};

/// Logs every non-empty line of `reader` until EOF.
///
/// Line endings (`\n` or `\r\n`) are stripped and bytes that are not valid
/// UTF-8 are replaced, so a bad byte never stops the stream. Lines too large
/// for a batch are skipped with a warning; any other refusal by the session
/// stops forwarding. Returns the number of lines handed to the session.
pub async fn forward_lines<R>(mut reader: R, session: &StreamSession) -> Result<u64, ForwardError>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut forwarded: u64 = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf).await? == 0 {
            break;
        }

        let line = trim_line_ending(&buf);
        if line.is_empty() {
            continue;
        }

        match session.log(String::from_utf8_lossy(line)) {
            // failures are reported by the submission worker
            Ok(_delivery) => forwarded += 1,
            Err(LogError::RecordTooLarge { size, limit }) => {
                warn!("CWL | Skipping line of {size} bytes, limit is {limit} bytes");
            }
            Err(e) => return Err(e.into()),
        }
    }

    debug!("CWL | Input closed after {forwarded} lines");
    Ok(forwarded)
}

fn trim_line_ending(line: &[u8]) -> &[u8] {
    let line = line.strip_suffix(b"\n").unwrap_or(line);
    line.strip_suffix(b"\r").unwrap_or(line)
}
