//! IP address and prefix matching for the connection allow-list.

use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use thiserror::Error;

const V4_BITS: u8 = 32;
const V6_BITS: u8 = 128;
const V6_GROUPS: usize = 8;
const MAPPED_V4_PREFIX: u128 = 0xFFFF;

/// Address family of a rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    /// IPv4, including IPv4-mapped IPv6 literals.
    V4,
    /// IPv6.
    V6,
}

impl AddressFamily {
    const fn width(self) -> u8 {
        match self {
            Self::V4 => V4_BITS,
            Self::V6 => V6_BITS,
        }
    }
}

/// Errors raised while parsing an address rule.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AddressFormatError {
    /// An IPv4 octet was above 255.
    #[error("'{input}': octet {octet} is outside 0-255")]
    OctetRange {
        /// Rule text.
        input: String,
        /// Offending octet.
        octet: String,
    },
    /// An IPv6 group was above `ffff`.
    #[error("'{input}': group '{group}' is outside 0-ffff")]
    GroupRange {
        /// Rule text.
        input: String,
        /// Offending group.
        group: String,
    },
    /// The address had the wrong number of components.
    #[error("'{input}': expected {expected} components, found {found}")]
    ComponentCount {
        /// Rule text.
        input: String,
        /// Components required.
        expected: usize,
        /// Components present.
        found: usize,
    },
    /// The mask length exceeded the family width.
    #[error("'{input}': mask length {bits} exceeds {max}")]
    MaskRange {
        /// Rule text.
        input: String,
        /// Requested mask length.
        bits: u32,
        /// Family width.
        max: u8,
    },
    /// A component was empty or not a number.
    #[error("'{input}': '{component}' is not a valid component")]
    InvalidComponent {
        /// Rule text.
        input: String,
        /// Offending component.
        component: String,
    },
}

/// Parsed network prefix such as `10.0.0.0/8` or `fe80::/10`.
///
/// The stored value is already masked, so two rules naming the same network
/// compare equal regardless of host bits in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AddressRule {
    family: AddressFamily,
    value: u128,
    mask: u128,
    prefix: u8,
}

impl AddressRule {
    /// Parses `address` or `address/bits`.
    ///
    /// IPv6 literals inside `::ffff:0:0/96` normalise to IPv4 rules, and the
    /// mask length is then validated against 32 bits.
    pub fn parse(text: &str) -> Result<Self, AddressFormatError> {
        let input = text.trim();
        let (address, bits) = match input.split_once('/') {
            Some((address, bits)) => (address, Some(parse_mask_bits(input, bits)?)),
            None => (input, None),
        };

        let (family, value) = if address.contains(':') {
            normalise_mapped(parse_v6(input, address)?)
        } else {
            (AddressFamily::V4, u128::from(parse_v4(input, address)?))
        };

        let width = family.width();
        let prefix = match bits {
            None => width,
            Some(bits) if bits <= u32::from(width) => u8::try_from(bits).unwrap_or(width),
            Some(bits) => {
                return Err(AddressFormatError::MaskRange {
                    input: input.to_owned(),
                    bits,
                    max: width,
                });
            }
        };
        let mask = prefix_mask(family, prefix);
        Ok(Self {
            family,
            value: value & mask,
            mask,
            prefix,
        })
    }

    /// Host rule matching exactly `ip`. IPv4-mapped IPv6 addresses become
    /// IPv4 rules.
    #[must_use]
    pub fn from_ip(ip: IpAddr) -> Self {
        let (family, value) = match ip {
            IpAddr::V4(v4) => (AddressFamily::V4, u128::from(u32::from(v4))),
            IpAddr::V6(v6) => normalise_mapped(u128::from(v6)),
        };
        let prefix = family.width();
        Self {
            family,
            value,
            mask: prefix_mask(family, prefix),
            prefix,
        }
    }

    /// Address family.
    #[must_use]
    pub const fn family(&self) -> AddressFamily {
        self.family
    }

    /// Mask length in bits.
    #[must_use]
    pub const fn prefix_len(&self) -> u8 {
        self.prefix
    }

    /// Whether `candidate` lies inside this network.
    #[must_use]
    pub const fn contains(&self, candidate: &Self) -> bool {
        matches!(
            (self.family, candidate.family),
            (AddressFamily::V4, AddressFamily::V4) | (AddressFamily::V6, AddressFamily::V6)
        ) && candidate.value & self.mask == self.value
    }

    /// Whether the socket address `ip` lies inside this network.
    #[must_use]
    pub fn contains_ip(&self, ip: IpAddr) -> bool {
        self.contains(&Self::from_ip(ip))
    }

    fn network(&self) -> IpAddr {
        match self.family {
            AddressFamily::V4 => IpAddr::V4(Ipv4Addr::from(
                u32::try_from(self.value).unwrap_or_default(),
            )),
            AddressFamily::V6 => IpAddr::V6(Ipv6Addr::from(self.value)),
        }
    }
}

impl FromStr for AddressRule {
    type Err = AddressFormatError;

    fn from_str(text: &str) -> Result<Self, Self::Err> {
        Self::parse(text)
    }
}

impl fmt::Display for AddressRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network(), self.prefix)
    }
}

/// Rules a peer address must match before its connection is served.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowList {
    rules: Vec<AddressRule>,
}

impl AllowList {
    /// Parses every entry, failing on the first malformed one.
    pub fn from_strings<I, S>(entries: I) -> Result<Self, AddressFormatError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let rules = entries
            .into_iter()
            .map(|entry| AddressRule::parse(entry.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { rules })
    }

    /// Whether `ip` may connect. An empty list admits everyone.
    #[must_use]
    pub fn permits(&self, ip: IpAddr) -> bool {
        if self.rules.is_empty() {
            return true;
        }
        let candidate = AddressRule::from_ip(ip);
        self.rules.iter().any(|rule| rule.contains(&candidate))
    }

    /// Whether the list has no rules.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Parsed rules in configuration order.
    #[must_use]
    pub fn rules(&self) -> &[AddressRule] {
        &self.rules
    }
}

fn normalise_mapped(value: u128) -> (AddressFamily, u128) {
    if value >> 32 == MAPPED_V4_PREFIX {
        (AddressFamily::V4, value & u128::from(u32::MAX))
    } else {
        (AddressFamily::V6, value)
    }
}

fn prefix_mask(family: AddressFamily, prefix: u8) -> u128 {
    let width = u32::from(family.width());
    let full = if width == u32::from(V6_BITS) {
        u128::MAX
    } else {
        (1_u128 << width) - 1
    };
    if prefix == 0 {
        return 0;
    }
    (full << (width - u32::from(prefix))) & full
}

fn parse_mask_bits(input: &str, bits: &str) -> Result<u32, AddressFormatError> {
    bits.parse::<u32>()
        .map_err(|_| AddressFormatError::InvalidComponent {
            input: input.to_owned(),
            component: bits.to_owned(),
        })
}

fn parse_v4(input: &str, address: &str) -> Result<u32, AddressFormatError> {
    let octets: Vec<&str> = address.split('.').collect();
    if octets.len() != 4 {
        return Err(AddressFormatError::ComponentCount {
            input: input.to_owned(),
            expected: 4,
            found: octets.len(),
        });
    }
    octets.iter().try_fold(0_u32, |acc, octet| {
        let parsed = octet
            .parse::<u32>()
            .map_err(|_| AddressFormatError::InvalidComponent {
                input: input.to_owned(),
                component: (*octet).to_owned(),
            })?;
        if parsed > 255 {
            return Err(AddressFormatError::OctetRange {
                input: input.to_owned(),
                octet: (*octet).to_owned(),
            });
        }
        Ok((acc << 8) | parsed)
    })
}

fn parse_v6(input: &str, address: &str) -> Result<u128, AddressFormatError> {
    let (head, tail, compressed) = match address.split_once("::") {
        Some((head, tail)) => (head, tail, true),
        None => (address, "", false),
    };
    let mut head_groups = parse_groups(input, head)?;
    let mut tail_groups = parse_groups(input, tail)?;

    let present = head_groups.len() + tail_groups.len();
    let fits = if compressed {
        present < V6_GROUPS
    } else {
        present == V6_GROUPS
    };
    if !fits {
        return Err(AddressFormatError::ComponentCount {
            input: input.to_owned(),
            expected: V6_GROUPS,
            found: present,
        });
    }

    let mut groups = Vec::with_capacity(V6_GROUPS);
    groups.append(&mut head_groups);
    groups.resize(V6_GROUPS - tail_groups.len(), 0);
    groups.append(&mut tail_groups);
    Ok(groups
        .iter()
        .fold(0_u128, |acc, group| (acc << 16) | u128::from(*group)))
}

/// Parses colon-separated groups, expanding a trailing dotted-quad into two
/// groups.
fn parse_groups(input: &str, section: &str) -> Result<Vec<u16>, AddressFormatError> {
    if section.is_empty() {
        return Ok(Vec::new());
    }
    let parts: Vec<&str> = section.split(':').collect();
    let mut groups = Vec::with_capacity(parts.len() + 1);
    let last = parts.len() - 1;
    for (index, part) in parts.iter().enumerate() {
        if index == last && part.contains('.') {
            let embedded = parse_v4(input, part)?;
            groups.push(u16::try_from(embedded >> 16).unwrap_or_default());
            groups.push(u16::try_from(embedded & 0xFFFF).unwrap_or_default());
            continue;
        }
        groups.push(parse_group(input, part)?);
    }
    Ok(groups)
}

fn parse_group(input: &str, group: &str) -> Result<u16, AddressFormatError> {
    let parsed =
        u32::from_str_radix(group, 16).map_err(|_| AddressFormatError::InvalidComponent {
            input: input.to_owned(),
            component: group.to_owned(),
        })?;
    u16::try_from(parsed).map_err(|_| AddressFormatError::GroupRange {
        input: input.to_owned(),
        group: group.to_owned(),
    })
}
