use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Serialize, Serializer};

/// An IPv4 network block in CIDR notation (`10.0.0.0/16`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Cidr {
    network: Ipv4Addr,
    prefix: u8,
}

/// The block covering every IPv4 address.
pub const ANY_IPV4: Ipv4Cidr = Ipv4Cidr {
    network: Ipv4Addr::UNSPECIFIED,
    prefix: 0,
};

impl Ipv4Cidr {
    /// Creates a block, rejecting host bits set below the prefix.
    pub fn new(address: Ipv4Addr, prefix: u8) -> Result<Self, String> {
        if prefix > 32 {
            return Err(format!("prefix length {prefix} is larger than 32"));
        }
        let network = u32::from(address) & mask(prefix);
        if network != u32::from(address) {
            return Err(format!(
                "{address}/{prefix} has host bits set (did you mean {}/{prefix}?)",
                Ipv4Addr::from(network)
            ));
        }
        Ok(Self {
            network: address,
            prefix,
        })
    }

    pub fn network(&self) -> Ipv4Addr {
        self.network
    }

    pub fn prefix(&self) -> u8 {
        self.prefix
    }

    /// Returns true if this block covers every IPv4 address.
    pub fn is_any(&self) -> bool {
        self.prefix == 0
    }

    /// Number of `/subnet_prefix` blocks that fit inside this block.
    pub fn subnet_capacity(&self, subnet_prefix: u8) -> u64 {
        if subnet_prefix < self.prefix || subnet_prefix > 32 {
            return 0;
        }
        1u64 << (subnet_prefix - self.prefix)
    }

    /// Returns the `index`-th consecutive `/subnet_prefix` block inside this one.
    pub fn subnet(&self, subnet_prefix: u8, index: u32) -> Option<Self> {
        if u64::from(index) >= self.subnet_capacity(subnet_prefix) {
            return None;
        }
        let size = 1u64 << (32 - subnet_prefix);
        let start = u64::from(u32::from(self.network)) + u64::from(index) * size;
        let start = u32::try_from(start).ok()?;
        Some(Self {
            network: Ipv4Addr::from(start),
            prefix: subnet_prefix,
        })
    }
}

fn mask(prefix: u8) -> u32 {
    if prefix == 0 {
        0
    } else {
        u32::MAX << (32 - u32::from(prefix))
    }
}

impl FromStr for Ipv4Cidr {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (address, prefix) = s
            .trim()
            .split_once('/')
            .ok_or_else(|| format!("'{s}' is not in address/prefix form"))?;
        let address: Ipv4Addr = address
            .parse()
            .map_err(|_| format!("'{address}' is not an IPv4 address"))?;
        let prefix: u8 = prefix
            .parse()
            .map_err(|_| format!("'{prefix}' is not a prefix length"))?;
        Self::new(address, prefix)
    }
}

impl fmt::Display for Ipv4Cidr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.network, self.prefix)
    }
}

impl Serialize for Ipv4Cidr {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
