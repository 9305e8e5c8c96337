use std::fmt;

const ROUTER_MIN_TTL: u8 = 250;
const WINDOWS_MIN_TTL: u8 = 110;
const UNIX_LIKE_MIN_TTL: u8 = 40;

/// Coarse operating system guess derived from the TTL of an echo reply.
///
/// This is best-effort labelling: the buckets assume the usual initial TTLs
/// (255, 128, 64) minus a handful of hops, and real devices overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OsGuess {
    Router,
    Windows,
    /// Linux, BSD, macOS, Android and iOS all start at TTL 64. They cannot be
    /// told apart from the TTL alone, so this bucket stays ambiguous.
    MobileOrUnixLike,
    Unknown,
}

impl OsGuess {
    pub fn from_ttl(ttl: u8) -> Self {
        match ttl {
            t if t >= ROUTER_MIN_TTL => OsGuess::Router,
            t if t >= WINDOWS_MIN_TTL => OsGuess::Windows,
            t if t >= UNIX_LIKE_MIN_TTL => OsGuess::MobileOrUnixLike,
            // Very low TTLs come from devices near the end of their own budget.
            _ => OsGuess::Router,
        }
    }

    pub fn from_optional_ttl(ttl: Option<u8>) -> Self {
        ttl.map_or(OsGuess::Unknown, Self::from_ttl)
    }

    /// Display label, `None` when there is nothing worth showing.
    pub fn label(self) -> Option<&'static str> {
        match self {
            OsGuess::Router => Some("router"),
            OsGuess::Windows => Some("Windows"),
            OsGuess::MobileOrUnixLike => Some("mobile/Unix-like"),
            OsGuess::Unknown => None,
        }
    }
}

impl fmt::Display for OsGuess {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label().unwrap_or("unknown"))
    }
}
