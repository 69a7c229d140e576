//! Test message construction and DATA encoding

use mail_builder::headers::address::Address;
use mail_builder::MessageBuilder;

/// Build a plain-text RFC 5322 message for a single recipient.
///
/// `Date`, `Message-ID` and `MIME-Version` are filled in by the builder.
pub fn build_message(from: &str, to: &str, subject: &str, body: &str) -> std::io::Result<Vec<u8>> {
    MessageBuilder::new()
        .from(Address::new_address(None::<&str>, from))
        .to(Address::new_address(None::<&str>, to))
        .subject(subject)
        .text_body(body)
        .write_to_vec()
}

/// Encode a message for transmission after `DATA`.
///
/// Line endings are normalized to CRLF, lines starting with `.` are
/// dot-stuffed, and the `CRLF.CRLF` terminator is appended.
pub fn encode_data(message: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(message.len() + message.len() / 64 + 5);
    let mut at_line_start = true;
    let mut previous = 0u8;

    for &byte in message {
        if at_line_start && byte == b'.' {
            out.push(b'.');
        }
        if byte == b'\n' && previous != b'\r' {
            out.push(b'\r');
        }
        out.push(byte);
        at_line_start = byte == b'\n';
        previous = byte;
    }

    if !out.is_empty() && !out.ends_with(b"\r\n") {
        out.extend_from_slice(b"\r\n");
    }
    out.extend_from_slice(b".\r\n");
    out
}
