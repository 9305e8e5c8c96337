/// Labels that precede the round-trip time in `ping` output.
pub const DEFAULT_LATENCY_LABELS: &[&str] = &["time", "时间"];
/// Labels that precede the TTL (or IPv6 hop limit) in `ping` output.
pub const DEFAULT_TTL_LABELS: &[&str] = &["ttl", "hlim"];

/// Latency and TTL read from one echo reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EchoReply {
    pub latency_ms: u64,
    pub ttl: Option<u8>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Reading<'a> {
    Exact(&'a str),
    Below(&'a str),
}

/// Extracts latency and TTL from localized `ping` output.
///
/// A value is recognised as `<label>=<number>` or `<label><<number>`, with
/// optional whitespace around the separator. Matching ignores ASCII case.
#[derive(Debug, Clone)]
pub struct ReplyParser {
    latency_labels: Vec<String>,
    ttl_labels: Vec<String>,
}

impl Default for ReplyParser {
    fn default() -> Self {
        Self::new(DEFAULT_LATENCY_LABELS, DEFAULT_TTL_LABELS)
    }
}

impl ReplyParser {
    pub fn new<S: AsRef<str>>(latency_labels: &[S], ttl_labels: &[S]) -> Self {
        let normalize = |labels: &[S]| -> Vec<String> {
            labels
                .iter()
                .map(|label| label.as_ref().trim().to_lowercase())
                .filter(|label| !label.is_empty())
                .collect()
        };
        Self {
            latency_labels: normalize(latency_labels),
            ttl_labels: normalize(ttl_labels),
        }
    }

    /// Returns `None` when the output carries no round-trip time.
    pub fn parse(&self, output: &str) -> Option<EchoReply> {
        let text = output.to_lowercase();
        let latency_ms = self.latency(&text)?;
        let ttl = self.ttl(&text);
        Some(EchoReply { latency_ms, ttl })
    }

    fn latency(&self, text: &str) -> Option<u64> {
        self.latency_labels
            .iter()
            .find_map(|label| read_after_label(text, label))
            .and_then(|reading| match reading {
                // "time<1ms": anything under a millisecond counts as zero.
                Reading::Below(_) => Some(0),
                Reading::Exact(raw) => raw.parse::<f64>().ok().map(|ms| ms.round() as u64),
            })
    }

    fn ttl(&self, text: &str) -> Option<u8> {
        self.ttl_labels
            .iter()
            .find_map(|label| read_after_label(text, label))
            .and_then(|reading| match reading {
                Reading::Exact(raw) => raw.parse::<u8>().ok(),
                Reading::Below(_) => None,
            })
    }
}

fn read_after_label<'a>(text: &'a str, label: &str) -> Option<Reading<'a>> {
    for (index, _) in text.match_indices(label) {
        let rest = text[index + label.len()..].trim_start();
        let (mut below, rest) = if let Some(rest) = rest.strip_prefix('=') {
            (false, rest.trim_start())
        } else if let Some(rest) = rest.strip_prefix('<') {
            (true, rest.trim_start())
        } else {
            continue;
        };

        // Some localized builds print "=<1ms".
        let rest = match rest.strip_prefix('<') {
            Some(rest) => {
                below = true;
                rest.trim_start()
            }
            None => rest,
        };

        if let Some(number) = leading_number(rest) {
            return Some(if below { Reading::Below(number) } else { Reading::Exact(number) });
        }
    }
    None
}

fn leading_number(text: &str) -> Option<&str> {
    let end = text
        .char_indices()
        .find(|(_, c)| !(c.is_ascii_digit() || *c == '.'))
        .map_or(text.len(), |(index, _)| index);
    let number = text[..end].trim_end_matches('.');
    if number.is_empty() || !number.starts_with(|c: char| c.is_ascii_digit()) {
        None
    } else {
        Some(number)
    }
}
