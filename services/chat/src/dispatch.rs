//! Text-protocol grammar.
//!
//! One decision per inbound line, first match wins, patterns anchored at the
//! start of the line. A recognized prefix with a malformed body yields the
//! form-specific error reply rather than falling through to another form.

use crate::contact::ClientId;
use once_cell::sync::Lazy;
use regex::Regex;

static DIRECT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^msg (?P<client_id>\d+) (?P<message>.+)$").expect("valid pattern"));
static BROADCAST_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^broadcast (?P<message>.+)$").expect("valid pattern"));
static URL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^url (?P<client_id>\d+) (?P<url>.+)$").expect("valid pattern"));
static FIB_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^fib (?P<client_id>\d+) (?P<n>\d+)$").expect("valid pattern"));

pub const INVALID_DIRECT: &str = "invalid format to send a message!";
pub const INVALID_BROADCAST: &str = "invalid format to broadcast a message!";
pub const INVALID_URL: &str = "invalid message format to send url size!";
pub const INVALID_FIB: &str = "invalid message format to calculate fibonacci!";
pub const INVALID_COMMAND: &str = "invalid message!";

/// Parsed inbound command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Direct { client_id: ClientId, message: String },
    Who,
    Broadcast { message: String },
    Url { client_id: ClientId, url: String },
    Fib { client_id: ClientId, n: u32 },
    /// Unrecognized or malformed line; `reply` goes back to the sender.
    Malformed { reply: &'static str },
}

pub fn parse(text: &str) -> Command {
    if text.starts_with("msg") {
        parse_direct(text)
    } else if text == "w" {
        Command::Who
    } else if text.starts_with("broadcast") {
        parse_broadcast(text)
    } else if text.starts_with("url") {
        parse_url(text)
    } else if text.starts_with("fib") {
        parse_fib(text)
    } else {
        Command::Malformed {
            reply: INVALID_COMMAND,
        }
    }
}

fn parse_direct(text: &str) -> Command {
    let malformed = Command::Malformed {
        reply: INVALID_DIRECT,
    };
    let Some(caps) = DIRECT_RE.captures(text) else {
        return malformed;
    };
    match caps["client_id"].parse() {
        Ok(client_id) => Command::Direct {
            client_id,
            message: caps["message"].to_string(),
        },
        Err(_) => malformed,
    }
}

fn parse_broadcast(text: &str) -> Command {
    match BROADCAST_RE.captures(text) {
        Some(caps) => Command::Broadcast {
            message: caps["message"].to_string(),
        },
        None => Command::Malformed {
            reply: INVALID_BROADCAST,
        },
    }
}

fn parse_url(text: &str) -> Command {
    let malformed = Command::Malformed {
        reply: INVALID_URL,
    };
    let Some(caps) = URL_RE.captures(text) else {
        return malformed;
    };
    match caps["client_id"].parse() {
        Ok(client_id) => Command::Url {
            client_id,
            url: caps["url"].to_string(),
        },
        Err(_) => malformed,
    }
}

fn parse_fib(text: &str) -> Command {
    let malformed = Command::Malformed {
        reply: INVALID_FIB,
    };
    let Some(caps) = FIB_RE.captures(text) else {
        return malformed;
    };
    match (caps["client_id"].parse(), caps["n"].parse()) {
        (Ok(client_id), Ok(n)) => Command::Fib { client_id, n },
        _ => malformed,
    }
}

/// Iterative Fibonacci with `fib(0) = 0`, `fib(1) = 1`. `None` when the
/// value does not fit in a `u128`.
pub fn fibonacci(n: u32) -> Option<u128> {
    if n == 0 {
        return Some(0);
    }
    let mut first: u128 = 0;
    let mut second: u128 = 1;
    for _ in 1..n {
        let next = first.checked_add(second)?;
        first = second;
        second = next;
    }
    Some(second)
}
