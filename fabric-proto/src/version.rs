//! Protocol version negotiation between probing endpoints.

use crate::control::ProtocolVersion;

/// Outcome of comparing a local and remote [`ProtocolVersion`] during probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Negotiation {
    /// Both sides are compatible; carry the lower of the two minor versions.
    Agreed(ProtocolVersion),
    /// The remote side's probe version is below what this crate supports.
    Incompatible,
}

/// Negotiates a [`ProtocolVersion`] to use for the remainder of a connection.
///
/// Mirrors the Tx/Rx probe handshake: both sides must support at least
/// [`ProtocolVersion::MIN_SUPPORTED`], and the lower of the two advertised
/// minor versions wins so neither side assumes wire fields the other lacks.
pub fn negotiate(local: ProtocolVersion, remote: ProtocolVersion) -> Negotiation {
    if !local.is_compatible() || !remote.is_compatible() {
        return Negotiation::Incompatible;
    }
    let probe_version_num = local.probe_version_num.min(remote.probe_version_num);
    let (major, minor) = if (remote.major, remote.minor) < (local.major, local.minor) {
        (remote.major, remote.minor)
    } else {
        (local.major, local.minor)
    };
    Negotiation::Agreed(ProtocolVersion {
        probe_version_num,
        major,
        minor,
    })
}
