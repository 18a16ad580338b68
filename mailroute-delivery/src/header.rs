//! Trace header added to every relayed message.

/// Name of the header carrying the inbound peer's address
pub const PEER_HEADER: &str = "X-Peer";

/// The line terminator the message already uses, judged by its first line
/// ending. Messages with no line ending at all get CRLF.
fn line_terminator(body: &[u8]) -> &'static [u8] {
    match body.iter().position(|&b| b == b'\r' || b == b'\n') {
        Some(idx) if body[idx] == b'\n' => b"\n",
        Some(idx) if body.get(idx + 1) == Some(&b'\n') => b"\r\n",
        Some(_) => b"\r",
        None => b"\r\n",
    }
}

/// `field-name ":"` per RFC 5322: one or more printable ASCII characters
/// other than the colon, followed by a colon
fn is_header_field(line: &[u8]) -> bool {
    line.iter()
        .position(|&b| b == b':')
        .is_some_and(|colon| colon > 0 && line[..colon].iter().all(|&b| (33..=126).contains(&b)))
}

/// Offset of the first header field line, searching no further than the
/// blank line separating headers from the body.
fn first_header_offset(body: &[u8], terminator: &[u8]) -> usize {
    let mut pos = 0;

    while pos < body.len() {
        let end = body[pos..]
            .windows(terminator.len())
            .position(|window| window == terminator)
            .map_or(body.len(), |idx| pos + idx);

        let line = &body[pos..end];
        if line.is_empty() {
            break;
        }
        if is_header_field(line) {
            return pos;
        }

        pos = end + terminator.len();
    }

    0
}

/// Copy `body`, inserting `X-Peer: <peer>` immediately before its first
/// header line. Everything after the insertion point is copied unchanged.
pub fn inject_peer_header(body: &[u8], peer: &str) -> Vec<u8> {
    let terminator = line_terminator(body);
    let offset = first_header_offset(body, terminator);

    let mut out = Vec::with_capacity(body.len() + PEER_HEADER.len() + peer.len() + 4);
    out.extend_from_slice(&body[..offset]);
    out.extend_from_slice(PEER_HEADER.as_bytes());
    out.extend_from_slice(b": ");
    out.extend_from_slice(peer.as_bytes());
    out.extend_from_slice(terminator);
    out.extend_from_slice(&body[offset..]);
    out
}
