use core::fmt::{self, Display, Formatter};

/// A parsed inbound command line
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Lhlo(String),
    /// `HELO` or `EHLO`; carried so the session can refuse it politely
    Smtp(String),
    MailFrom(String),
    RcptTo(String),
    Data,
    Rset,
    Noop,
    Quit,
    /// A known verb with unusable arguments
    Invalid(String),
    Unknown(String),
}

/// Pull the address out of `<addr> params` (or bare `addr params`)
fn parse_path(arguments: &str) -> Option<String> {
    let arguments = arguments.trim_start();

    if let Some(rest) = arguments.strip_prefix('<') {
        let (path, _params) = rest.split_once('>')?;
        Some(path.trim().to_string())
    } else {
        arguments
            .split_whitespace()
            .next()
            .map(ToString::to_string)
    }
}

/// Match `prefix` (e.g. `FROM:`) case-insensitively at the start of `text`
fn strip_prefix_ignore_case<'a>(text: &'a str, prefix: &str) -> Option<&'a str> {
    let head = text.get(..prefix.len())?;
    head.eq_ignore_ascii_case(prefix)
        .then(|| &text[prefix.len()..])
}

impl Command {
    pub fn parse(line: &str) -> Self {
        let line = line.trim_end_matches(['\r', '\n']);
        let (verb, arguments) = line
            .split_once(' ')
            .map_or((line, ""), |(verb, arguments)| (verb, arguments.trim()));

        match verb.to_ascii_uppercase().as_str() {
            "LHLO" if arguments.is_empty() => Self::Invalid(line.to_string()),
            "LHLO" => Self::Lhlo(arguments.to_string()),
            "HELO" | "EHLO" => Self::Smtp(arguments.to_string()),
            "MAIL" => strip_prefix_ignore_case(arguments, "FROM:")
                .and_then(parse_path)
                .map_or_else(|| Self::Invalid(line.to_string()), Self::MailFrom),
            "RCPT" => strip_prefix_ignore_case(arguments, "TO:")
                .and_then(parse_path)
                .filter(|path| !path.is_empty())
                .map_or_else(|| Self::Invalid(line.to_string()), Self::RcptTo),
            "DATA" => Self::Data,
            "RSET" => Self::Rset,
            "NOOP" => Self::Noop,
            "QUIT" => Self::Quit,
            _ => Self::Unknown(line.to_string()),
        }
    }
}

impl Display for Command {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Lhlo(host) => write!(f, "LHLO {host}"),
            Self::Smtp(host) => write!(f, "EHLO {host}"),
            Self::MailFrom(from) => write!(f, "MAIL FROM:<{from}>"),
            Self::RcptTo(to) => write!(f, "RCPT TO:<{to}>"),
            Self::Data => f.write_str("DATA"),
            Self::Rset => f.write_str("RSET"),
            Self::Noop => f.write_str("NOOP"),
            Self::Quit => f.write_str("QUIT"),
            Self::Invalid(line) | Self::Unknown(line) => f.write_str(line),
        }
    }
}
