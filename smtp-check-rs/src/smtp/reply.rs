//! SMTP reply parsing (RFC 5321 section 4.2)
//!
//! A reply is one or more lines sharing a three-digit code. Every line but
//! the last uses `-` after the code, the last uses a space:
//!
//! ```text
//! 250-mail.example.com
//! 250-STARTTLS
//! 250 AUTH PLAIN LOGIN
//! ```

use crate::error::SmtpError;
use std::fmt;

/// A complete server reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub code: u16,
    pub lines: Vec<String>,
}

impl Reply {
    pub fn new(code: u16, lines: Vec<String>) -> Self {
        Self { code, lines }
    }

    /// 2xx
    pub fn is_positive(&self) -> bool {
        (200..300).contains(&self.code)
    }

    /// 3xx, the server is waiting for more input
    pub fn is_intermediate(&self) -> bool {
        (300..400).contains(&self.code)
    }

    /// Reply text with lines joined by `\n`
    pub fn message(&self) -> String {
        self.lines.join("\n")
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code, self.lines.join(" "))
    }
}

/// One parsed reply line
#[derive(Debug, PartialEq, Eq)]
pub(crate) struct ReplyLine<'a> {
    pub code: u16,
    pub last: bool,
    pub text: &'a str,
}

/// Parse a single reply line, with or without its trailing CRLF
pub(crate) fn parse_line(raw: &str) -> Result<ReplyLine<'_>, SmtpError> {
    let line = raw.trim_end_matches(['\r', '\n']);
    let bytes = line.as_bytes();

    if bytes.len() < 3 || !bytes[..3].iter().all(u8::is_ascii_digit) {
        return Err(SmtpError::Malformed(line.to_string()));
    }
    if !(b'2'..=b'5').contains(&bytes[0]) {
        return Err(SmtpError::Malformed(line.to_string()));
    }

    let code = u16::from(bytes[0] - b'0') * 100
        + u16::from(bytes[1] - b'0') * 10
        + u16::from(bytes[2] - b'0');

    match bytes.get(3) {
        None => Ok(ReplyLine {
            code,
            last: true,
            text: "",
        }),
        Some(b' ') => Ok(ReplyLine {
            code,
            last: true,
            text: &line[4..],
        }),
        Some(b'-') => Ok(ReplyLine {
            code,
            last: false,
            text: &line[4..],
        }),
        Some(_) => Err(SmtpError::Malformed(line.to_string())),
    }
}

/// Service extensions advertised in an EHLO reply
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions {
    keywords: Vec<String>,
    auth_mechanisms: Vec<String>,
}

impl Extensions {
    /// Extract keywords from an EHLO reply. The first line is the server's
    /// greeting and carries no extension.
    pub fn from_ehlo(reply: &Reply) -> Self {
        let mut extensions = Self::default();

        for line in reply.lines.iter().skip(1) {
            let mut parts = line.split_whitespace();
            let Some(keyword) = parts.next() else {
                continue;
            };
            let keyword = keyword.to_ascii_uppercase();

            // Some older servers use the pre-standard "AUTH=LOGIN" form
            let (keyword, inline_mechanism) = match keyword.split_once('=') {
                Some((name, mechanism)) if name == "AUTH" => {
                    ("AUTH".to_string(), Some(mechanism.to_string()))
                }
                _ => (keyword, None),
            };

            if keyword == "AUTH" {
                let mechanisms = inline_mechanism
                    .into_iter()
                    .chain(parts.map(|m| m.to_ascii_uppercase()));
                for mechanism in mechanisms {
                    if !extensions.auth_mechanisms.contains(&mechanism) {
                        extensions.auth_mechanisms.push(mechanism);
                    }
                }
            }

            if !extensions.keywords.contains(&keyword) {
                extensions.keywords.push(keyword);
            }
        }

        extensions
    }

    pub fn supports(&self, keyword: &str) -> bool {
        self.keywords.iter().any(|k| k.eq_ignore_ascii_case(keyword))
    }

    pub fn auth_mechanisms(&self) -> &[String] {
        &self.auth_mechanisms
    }
}
