// Line framing over TCP.
//
// Provides the wire format for `message.rs` types: one message per
// newline-terminated UTF-8 line. Both `write_line` and `read_line` operate
// on plain `&str` / `String` — the caller handles message encoding
// separately, keeping this module format-agnostic.
//
// A `MAX_LINE_LEN` constant (8 KiB) protects against unbounded allocation
// from a peer that never sends a terminator. Chat text is the longest
// expected payload; 8 KiB is generous headroom.

use std::io::{self, BufRead, Read, Write};

/// Maximum allowed line length in bytes, terminator excluded. Protects
/// against unbounded allocation from a peer that never sends a newline.
pub const MAX_LINE_LEN: usize = 8 * 1024;

/// Write one newline-terminated line and flush.
///
/// Returns `InvalidInput` for oversized lines or lines already containing a
/// terminator (either would corrupt the stream framing).
pub fn write_line<W: Write>(writer: &mut W, line: &str) -> io::Result<()> {
    if line.len() > MAX_LINE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("line too long: {} bytes (max {MAX_LINE_LEN})", line.len()),
        ));
    }
    if line.contains('\n') {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "line contains embedded newline",
        ));
    }
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")?;
    writer.flush()?;
    Ok(())
}

/// Read one line, stripping the `\n` terminator and an optional preceding
/// `\r` (some client toolkits terminate with CRLF).
///
/// Returns `UnexpectedEof` if the stream closes cleanly between messages,
/// `InvalidData` if a line exceeds `MAX_LINE_LEN` or is not valid UTF-8.
pub fn read_line<R: BufRead>(reader: &mut R) -> io::Result<String> {
    let mut buf = Vec::new();
    let n = reader
        .by_ref()
        .take(MAX_LINE_LEN as u64 + 1)
        .read_until(b'\n', &mut buf)?;
    if n == 0 {
        return Err(io::Error::new(
            io::ErrorKind::UnexpectedEof,
            "connection closed",
        ));
    }
    if buf.last() == Some(&b'\n') {
        buf.pop();
        if buf.last() == Some(&b'\r') {
            buf.pop();
        }
    } else if buf.len() > MAX_LINE_LEN {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("line too long (max {MAX_LINE_LEN})"),
        ));
    }
    String::from_utf8(buf)
        .map_err(|_| io::Error::new(io::ErrorKind::InvalidData, "line is not valid UTF-8"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_multiple_lines() {
        let mut wire = Vec::new();
        write_line(&mut wire, "LOGIN|alice").unwrap();
        write_line(&mut wire, "PING").unwrap();

        let mut cursor = Cursor::new(&wire);
        assert_eq!(read_line(&mut cursor).unwrap(), "LOGIN|alice");
        assert_eq!(read_line(&mut cursor).unwrap(), "PING");
    }

    #[test]
    fn eof_between_messages() {
        let mut cursor = Cursor::new(Vec::new());
        let err = read_line(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn crlf_terminator_stripped() {
        let mut cursor = Cursor::new(b"QUIT\r\n".to_vec());
        assert_eq!(read_line(&mut cursor).unwrap(), "QUIT");
    }

    #[test]
    fn final_line_without_terminator_is_readable() {
        let mut cursor = Cursor::new(b"PING".to_vec());
        assert_eq!(read_line(&mut cursor).unwrap(), "PING");
    }

    #[test]
    fn rejects_oversized_read() {
        let mut wire = vec![b'x'; MAX_LINE_LEN + 10];
        wire.push(b'\n');
        let mut cursor = Cursor::new(wire);
        let err = read_line(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }

    #[test]
    fn rejects_oversized_write() {
        let big = "y".repeat(MAX_LINE_LEN + 1);
        let mut wire = Vec::new();
        let err = write_line(&mut wire, &big).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_embedded_newline_write() {
        let mut wire = Vec::new();
        let err = write_line(&mut wire, "two\nlines").unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[test]
    fn rejects_invalid_utf8() {
        let mut cursor = Cursor::new(vec![0xFF, 0xFE, b'\n']);
        let err = read_line(&mut cursor).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidData);
    }
}
