//! JSON value boundary scanner
//!
//! Finds where a complete JSON value ends in a byte buffer that may hold only
//! a prefix of the document. Values are not validated here; the located slice
//! is handed to serde_json afterwards.

use crate::{Error, Result};

/// Outcome of scanning for one value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// The value ends at this offset (exclusive)
    Complete(usize),
    /// More bytes are needed
    Incomplete,
}

pub fn is_whitespace(byte: u8) -> bool {
    matches!(byte, b' ' | b'\t' | b'\n' | b'\r')
}

fn is_delimiter(byte: u8) -> bool {
    is_whitespace(byte) || matches!(byte, b',' | b']' | b'}' | b':')
}

/// Scan the value starting at `start`. With `at_eof`, a scalar running to the
/// end of the buffer is taken as complete.
pub fn scan_value(buf: &[u8], start: usize, at_eof: bool) -> Result<Scan> {
    match buf.get(start) {
        None => Ok(Scan::Incomplete),
        Some(b'"') => Ok(scan_string(buf, start)),
        Some(b'{' | b'[') => Ok(scan_container(buf, start)),
        Some(b'-' | b'0'..=b'9' | b't' | b'f' | b'n') => Ok(scan_scalar(buf, start, at_eof)),
        Some(&other) => Err(Error::Parse(format!(
            "unexpected character {:?} where a value was expected",
            other as char
        ))),
    }
}

fn scan_string(buf: &[u8], start: usize) -> Scan {
    let mut i = start + 1;
    while i < buf.len() {
        match buf[i] {
            b'\\' => i += 2,
            b'"' => return Scan::Complete(i + 1),
            _ => i += 1,
        }
    }
    Scan::Incomplete
}

fn scan_container(buf: &[u8], start: usize) -> Scan {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &byte) in buf.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if byte == b'\\' {
                escaped = true;
            } else if byte == b'"' {
                in_string = false;
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    return Scan::Complete(i + 1);
                }
            }
            _ => {}
        }
    }
    Scan::Incomplete
}

fn scan_scalar(buf: &[u8], start: usize, at_eof: bool) -> Scan {
    match buf[start..].iter().position(|&b| is_delimiter(b)) {
        Some(len) => Scan::Complete(start + len),
        None if at_eof => Scan::Complete(buf.len()),
        None => Scan::Incomplete,
    }
}
