//! Range sets and firewall rule derivation.
//!
//! Rules are never stored: they are regenerated on demand from a
//! [`RangeSet`] and the allowed-port set, so removal and addition always
//! operate on the exact rule shape the backend understands.

use std::collections::BTreeSet;
use std::fmt;

/// IP version of a range set or rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IpVersion {
    V4,
    V6,
}

impl IpVersion {
    /// Address family string used in firewalld rich rules.
    pub fn family(&self) -> &'static str {
        match self {
            IpVersion::V4 => "ipv4",
            IpVersion::V6 => "ipv6",
        }
    }
}

/// The set of CIDR ranges for one IP version.
///
/// CIDR strings are opaque here; the firewall backend is the arbiter of
/// syntactic validity. A `BTreeSet` keeps rule expansion deterministic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeSet {
    version: IpVersion,
    cidrs: BTreeSet<String>,
}

impl RangeSet {
    pub fn new<I, S>(version: IpVersion, cidrs: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            version,
            cidrs: cidrs.into_iter().map(Into::into).collect(),
        }
    }

    pub fn empty(version: IpVersion) -> Self {
        Self {
            version,
            cidrs: BTreeSet::new(),
        }
    }

    pub fn version(&self) -> IpVersion {
        self.version
    }

    pub fn cidrs(&self) -> &BTreeSet<String> {
        &self.cidrs
    }

    pub fn len(&self) -> usize {
        self.cidrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cidrs.is_empty()
    }

    /// Expand this range set into one rule per (cidr, port) pair.
    pub fn expand(&self, ports: &BTreeSet<u16>) -> Vec<FirewallRule> {
        self.cidrs
            .iter()
            .flat_map(|cidr| {
                ports.iter().map(move |port| FirewallRule {
                    cidr: cidr.clone(),
                    version: self.version,
                    port: *port,
                })
            })
            .collect()
    }
}

/// A single derived allow rule: accept TCP from `cidr` on `port`.
///
/// Protocol and action are fixed; only the source range, family and port
/// vary.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FirewallRule {
    pub cidr: String,
    pub version: IpVersion,
    pub port: u16,
}

impl FirewallRule {
    /// Render the rule as a firewalld rich rule string.
    pub fn rich_rule(&self) -> String {
        format!(
            "rule family=\"{}\" source address=\"{}\" port port=\"{}\" protocol=\"tcp\" accept",
            self.version.family(),
            self.cidr.trim(),
            self.port
        )
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{} port {}", self.cidr, self.version.family(), self.port)
    }
}
