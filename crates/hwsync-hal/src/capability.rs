//! Static capability table for the supported ASIC families.

use hwsync_types::ParseError;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsicFamily {
    Fake,
    Trident2,
    Tomahawk,
    Tomahawk3,
}

impl AsicFamily {
    pub const ALL: [AsicFamily; 4] = [
        AsicFamily::Fake,
        AsicFamily::Trident2,
        AsicFamily::Tomahawk,
        AsicFamily::Tomahawk3,
    ];

    pub const fn name(&self) -> &'static str {
        match self {
            AsicFamily::Fake => "fake",
            AsicFamily::Trident2 => "trident2",
            AsicFamily::Tomahawk => "tomahawk",
            AsicFamily::Tomahawk3 => "tomahawk3",
        }
    }

    pub fn capability(&self) -> &'static AsicCapability {
        match self {
            AsicFamily::Fake => &FAKE,
            AsicFamily::Trident2 => &TRIDENT2,
            AsicFamily::Tomahawk => &TOMAHAWK,
            AsicFamily::Tomahawk3 => &TOMAHAWK3,
        }
    }
}

impl fmt::Display for AsicFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for AsicFamily {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        AsicFamily::ALL
            .into_iter()
            .find(|family| family.name().eq_ignore_ascii_case(s))
            .ok_or_else(|| ParseError::InvalidId(format!("unknown ASIC family: {}", s)))
    }
}

/// What an ASIC family supports. Managers branch on these flags only, never
/// on the family itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsicCapability {
    pub family: AsicFamily,
    /// Existing hardware objects must be looked up by key before creating
    /// new ones (the SDK does not dedup on its own).
    pub needs_object_key_cache: bool,
    /// IPv4 and IPv6 routes share one algorithmic LPM table.
    pub alpm_enabled: bool,
    pub max_next_hop_groups: u32,
    pub max_ipv4_routes: u32,
    pub max_ipv6_routes: u32,
    pub max_acl_entries: u32,
    pub max_acl_counters: u32,
}

const FAKE: AsicCapability = AsicCapability {
    family: AsicFamily::Fake,
    needs_object_key_cache: false,
    alpm_enabled: false,
    max_next_hop_groups: 1024,
    max_ipv4_routes: 16_384,
    max_ipv6_routes: 8_192,
    max_acl_entries: 1_024,
    max_acl_counters: 2_048,
};

const TRIDENT2: AsicCapability = AsicCapability {
    family: AsicFamily::Trident2,
    needs_object_key_cache: true,
    alpm_enabled: false,
    max_next_hop_groups: 1_024,
    max_ipv4_routes: 16_384,
    max_ipv6_routes: 8_192,
    max_acl_entries: 4_096,
    max_acl_counters: 4_096,
};

const TOMAHAWK: AsicCapability = AsicCapability {
    family: AsicFamily::Tomahawk,
    needs_object_key_cache: true,
    alpm_enabled: true,
    max_next_hop_groups: 4_096,
    max_ipv4_routes: 131_072,
    max_ipv6_routes: 131_072,
    max_acl_entries: 4_608,
    max_acl_counters: 9_216,
};

const TOMAHAWK3: AsicCapability = AsicCapability {
    family: AsicFamily::Tomahawk3,
    needs_object_key_cache: true,
    alpm_enabled: true,
    max_next_hop_groups: 4_096,
    max_ipv4_routes: 393_216,
    max_ipv6_routes: 393_216,
    max_acl_entries: 6_144,
    max_acl_counters: 12_288,
};

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_family_parse() {
        assert_eq!("Tomahawk".parse::<AsicFamily>().unwrap(), AsicFamily::Tomahawk);
        assert_eq!("fake".parse::<AsicFamily>().unwrap(), AsicFamily::Fake);
        assert!("jericho".parse::<AsicFamily>().is_err());
    }

    #[test]
    fn test_capability_table() {
        for family in AsicFamily::ALL {
            assert_eq!(family.capability().family, family);
        }
        assert!(!AsicFamily::Fake.capability().needs_object_key_cache);
        assert!(AsicFamily::Trident2.capability().needs_object_key_cache);
        assert!(!AsicFamily::Trident2.capability().alpm_enabled);
        assert!(AsicFamily::Tomahawk3.capability().alpm_enabled);
    }
}
