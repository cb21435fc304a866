use std::collections::BTreeSet;

use crate::message::Hello;

/// Picks the protocol version a connection will speak.
#[derive(Clone, Debug)]
pub struct VersionNegotiator {
    supported: BTreeSet<u8>,
}

impl VersionNegotiator {
    pub fn new<I: IntoIterator<Item = u8>>(supported: I) -> VersionNegotiator {
        VersionNegotiator {
            supported: supported.into_iter().collect(),
        }
    }

    pub fn supported(&self) -> Vec<u8> {
        self.supported.iter().copied().collect()
    }

    pub fn max_supported(&self) -> Option<u8> {
        self.supported.iter().next_back().copied()
    }

    /// Highest version both in `versions` and supported locally.
    pub fn from_bitmask(&self, versions: &[u8]) -> Option<u8> {
        versions
            .iter()
            .filter(|v| self.supported.contains(v))
            .max()
            .copied()
    }

    /// The header version, capped at our own maximum, if we support the result.
    pub fn from_single_version(&self, version: u8) -> Option<u8> {
        let candidate = version.min(self.max_supported()?);
        if self.supported.contains(&candidate) {
            Some(candidate)
        } else {
            None
        }
    }

    /// A version bitmap in the hello always wins over the header version.
    pub fn negotiate(&self, header_version: u8, hello: &Hello) -> Option<u8> {
        if !hello.bitmap {
            self.from_single_version(header_version)
        } else {
            self.from_bitmask(&hello.versions)
        }
    }
}
