//! DATA section transparency (RFC 5321 section 4.5.2).

const CRLF: &[u8] = b"\r\n";

/// Prepare a message body for transmission after `DATA`.
///
/// Every line ending (CRLF, bare LF or bare CR) is sent as CRLF, lines that
/// start with `.` get an extra `.`, and the terminating `.` line is appended.
pub fn encode(body: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(body.len() + body.len() / 64 + 5);
    let mut at_line_start = true;
    let mut iter = body.iter().copied().peekable();

    while let Some(byte) = iter.next() {
        match byte {
            b'\r' => {
                if iter.peek() == Some(&b'\n') {
                    iter.next();
                }
                out.extend_from_slice(CRLF);
                at_line_start = true;
            }
            b'\n' => {
                out.extend_from_slice(CRLF);
                at_line_start = true;
            }
            _ => {
                if at_line_start && byte == b'.' {
                    out.push(b'.');
                }
                out.push(byte);
                at_line_start = false;
            }
        }
    }

    if !at_line_start {
        out.extend_from_slice(CRLF);
    }
    out.extend_from_slice(b".\r\n");

    out
}

/// Whether `line` (including its terminator) ends the DATA section
pub fn is_terminator(line: &[u8]) -> bool {
    matches!(line, b".\r\n" | b".\n")
}

/// Undo dot-stuffing on one received DATA line
pub fn unstuff(line: &[u8]) -> &[u8] {
    match line {
        [b'.', rest @ ..] => rest,
        _ => line,
    }
}
