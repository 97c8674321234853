//! Port token grammar shared by the expander and the selector.
//!
//! A token is either a plain decimal port (`25565`) or an inclusive range of
//! two 4-5 digit ports (`25565-25600`). Every port must lie in
//! `(PORT_FLOOR, PORT_CEIL]` and a range may cover at most
//! `PORT_RANGE_LIMIT` ports.

use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AllocationError;

/// Ports at or below this value are reserved
pub const PORT_FLOOR: u16 = 1024;
/// Highest usable port
pub const PORT_CEIL: u16 = 65535;
/// Maximum number of ports a single range token may expand to
pub const PORT_RANGE_LIMIT: u32 = 1000;

static SINGLE_PORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]+$").expect("Invalid single port regex"));
static PORT_RANGE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([0-9]{4,5})-([0-9]{4,5})$").expect("Invalid port range regex"));

/// A validated port token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PortSpec {
    Single(u16),
    /// Inclusive, always stored with `start <= end`
    Range { start: u16, end: u16 },
}

impl PortSpec {
    /// Parse and validate one token.
    ///
    /// The range size is checked before the endpoint bounds, so
    /// `1000-5000` reports `TooManyPortsInRange`.
    pub fn parse(token: &str) -> Result<Self, AllocationError> {
        let token = token.trim();

        if let Some(caps) = PORT_RANGE.captures(token) {
            let first = parse_digits(&caps[1]);
            let second = parse_digits(&caps[2]);
            let (start, end) = if first <= second { (first, second) } else { (second, first) };

            if u64::from(end) - u64::from(start) + 1 > u64::from(PORT_RANGE_LIMIT) {
                return Err(AllocationError::TooManyPortsInRange { start: first, end: second });
            }
            return Ok(PortSpec::Range {
                start: check_bounds(start)?,
                end: check_bounds(end)?,
            });
        }

        if SINGLE_PORT.is_match(token) {
            return Ok(PortSpec::Single(check_bounds(parse_digits(token))?));
        }

        Err(AllocationError::InvalidPortMapping(token.to_string()))
    }

    /// Ports covered by this token, ascending
    pub fn ports(&self) -> RangeInclusive<u16> {
        match *self {
            PortSpec::Single(port) => port..=port,
            PortSpec::Range { start, end } => start..=end,
        }
    }

    pub fn contains(&self, port: u16) -> bool {
        self.ports().contains(&port)
    }

    pub fn len(&self) -> usize {
        self.ports().count()
    }
}

/// Parse every token, failing on the first invalid one
pub fn parse_port_specs<S: AsRef<str>>(tokens: &[S]) -> Result<Vec<PortSpec>, AllocationError> {
    tokens.iter().map(|token| PortSpec::parse(token.as_ref())).collect()
}

// Saturates so that absurdly long digit strings still report PortOutOfRange.
fn parse_digits(digits: &str) -> u32 {
    digits.parse::<u64>().map_or(u32::MAX, |value| value.min(u64::from(u32::MAX)) as u32)
}

fn check_bounds(port: u32) -> Result<u16, AllocationError> {
    if port <= u32::from(PORT_FLOOR) || port > u32::from(PORT_CEIL) {
        return Err(AllocationError::PortOutOfRange(port));
    }
    Ok(port as u16)
}

impl FromStr for PortSpec {
    type Err = AllocationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for PortSpec {
    type Error = AllocationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<PortSpec> for String {
    fn from(spec: PortSpec) -> Self {
        spec.to_string()
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PortSpec::Single(port) => write!(f, "{}", port),
            PortSpec::Range { start, end } => write!(f, "{}-{}", start, end),
        }
    }
}
