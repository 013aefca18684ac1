use std::fmt;
use std::io::IsTerminal;

use tracing::{Event, Subscriber};
use tracing_subscriber::fmt::format::{FormatEvent, FormatFields, Writer};
use tracing_subscriber::fmt::FmtContext;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::EnvFilter;

use crate::config::types::{LogFormat, LogLevel};

/// Tracing formatter that tags access decisions with [ALLOW]/[DENY] and
/// colorizes known field names.
pub struct PrefixedFormatter<E> {
    inner: E,
    ansi: bool,
}

impl<E> PrefixedFormatter<E> {
    pub fn new(inner: E, ansi: bool) -> Self {
        Self { inner, ansi }
    }
}

impl<S, N, E> FormatEvent<S, N> for PrefixedFormatter<E>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
    E: FormatEvent<S, N>,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> fmt::Result {
        let mut visitor = MessageVisitor {
            message: String::new(),
        };
        event.record(&mut visitor);

        if let Some(tag) = decision_tag(&visitor.message.to_lowercase()) {
            if self.ansi {
                let color = if tag == Tag::Deny { "31" } else { "34" };
                write!(writer, "\x1b[{color}m{tag}\x1b[0m ")?;
            } else {
                write!(writer, "{tag} ")?;
            }
        }

        if self.ansi {
            let mut buf = String::new();
            self.inner.format_event(ctx, Writer::new(&mut buf), event)?;
            write!(writer, "{}", colorize_fields(&buf))
        } else {
            self.inner.format_event(ctx, writer, event)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Allow,
    Deny,
}

impl fmt::Display for Tag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Tag::Allow => write!(f, "[ALLOW]"),
            Tag::Deny => write!(f, "[DENY]"),
        }
    }
}

fn decision_tag(msg: &str) -> Option<Tag> {
    const DENY: &[&str] = &[
        "rejected",
        "auth failed",
        "denied",
        "refused",
        "unrecognized user",
    ];
    const ALLOW: &[&str] = &["auth success", "session process started"];

    if DENY.iter().any(|p| msg.contains(p)) {
        Some(Tag::Deny)
    } else if ALLOW.iter().any(|p| msg.contains(p)) {
        Some(Tag::Allow)
    } else {
        None
    }
}

/// Field name → ANSI color code.
const FIELD_COLORS: &[(&str, &str)] = &[
    ("user", "36"),
    ("account", "36"),
    ("ip", "35"),
    ("peer", "35"),
    ("listen", "35"),
    ("conn_id", "2"),
    ("fingerprint", "33"),
    ("pid", "33"),
    ("entrypoint", "33"),
    ("bytes", "32"),
    ("exit_status", "32"),
    ("error", "31"),
    ("reason", "31"),
];

/// Colorize `name=` prefixes of whitespace-separated tokens whose name is known.
fn colorize_fields(line: &str) -> String {
    let mut out = String::with_capacity(line.len() + 32);
    for (i, token) in line.split(' ').enumerate() {
        if i > 0 {
            out.push(' ');
        }
        let colored = token.split_once('=').and_then(|(name, rest)| {
            FIELD_COLORS
                .iter()
                .find(|(field, _)| *field == name)
                .map(|(_, color)| format!("\x1b[{color}m{name}=\x1b[0m{rest}"))
        });
        match colored {
            Some(c) => out.push_str(&c),
            None => out.push_str(token),
        }
    }
    out
}

/// Visitor that extracts the message field from a tracing event.
struct MessageVisitor {
    message: String,
}

impl tracing::field::Visit for MessageVisitor {
    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn fmt::Debug) {
        if field.name() == "message" {
            self.message = format!("{:?}", value);
        }
    }

    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.message = value.to_string();
        }
    }
}

/// Initialize the global tracing subscriber.
///
/// `RUST_LOG`, when set, takes precedence over `level`.
pub fn setup_logging(level: LogLevel, format: LogFormat) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.to_string()))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    match format {
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .json()
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Pretty => {
            let ansi = std::io::stdout().is_terminal();
            let default_format = tracing_subscriber::fmt::format::Format::default();
            tracing_subscriber::fmt()
                .event_format(PrefixedFormatter::new(default_format, ansi))
                .with_env_filter(filter)
                .init();
        }
    }
}
