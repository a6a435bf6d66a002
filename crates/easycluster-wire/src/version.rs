use std::cmp::Ordering;

/// Protocol version announced in `INIT` messages.
pub const PROTOCOL_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Oldest peer version the server still talks to.
pub const MIN_PEER_VERSION: &str = "0.1.0";

fn components(version: &str) -> impl Iterator<Item = u64> + '_ {
    version
        .split(['.', '-', '+'])
        .map_while(|part| part.parse::<u64>().ok())
}

fn compare(left: &str, right: &str) -> Ordering {
    let mut lhs = components(left);
    let mut rhs = components(right);
    loop {
        match (lhs.next(), rhs.next()) {
            (None, None) => return Ordering::Equal,
            (l, r) => match l.unwrap_or(0).cmp(&r.unwrap_or(0)) {
                Ordering::Equal => {}
                other => return other,
            },
        }
    }
}

/// Whether a peer announcing `version` is new enough to serve.
///
/// Versions compare numerically component by component, so `0.10` is newer
/// than `0.9`; missing components count as zero.
#[must_use]
pub fn version_is_compatible(version: &str) -> bool {
    components(version).next().is_some() && compare(version, MIN_PEER_VERSION) != Ordering::Less
}
