//! Fixed-size identifiers.
//!
//! [`Id`] is a 32-byte identifier used for chains, subnets, containers and
//! gossipable items. [`NodeId`] is the 20-byte identity of a peer.

use {
    crate::error::{Result, TypesError},
    rand::RngCore,
    serde::{Deserialize, Serialize},
    sha2::{Digest, Sha256},
    std::{
        fmt,
        sync::atomic::{AtomicU64, Ordering},
    },
};

static UNIQUE_COUNTER: AtomicU64 = AtomicU64::new(1);

macro_rules! fixed_id {
    ($(#[$meta:meta])* $name:ident, $len:expr) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name([u8; $len]);

        impl $name {
            /// Length of the identifier in bytes.
            pub const LEN: usize = $len;

            pub const fn new_from_array(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }

            /// Parse an identifier from a slice of exactly [`Self::LEN`] bytes.
            pub fn from_slice(bytes: &[u8]) -> Result<Self> {
                let array: [u8; $len] =
                    bytes
                        .try_into()
                        .map_err(|_| TypesError::InvalidLength {
                            expected: $len,
                            actual: bytes.len(),
                        })?;
                Ok(Self(array))
            }

            /// A process-unique identifier. Intended for tests and local
            /// bookkeeping, never for anything that has to be unpredictable.
            pub fn new_unique() -> Self {
                let n = UNIQUE_COUNTER.fetch_add(1, Ordering::Relaxed);
                let mut bytes = [0u8; $len];
                bytes[..8].copy_from_slice(&n.to_be_bytes());
                Self(bytes)
            }

            pub fn as_bytes(&self) -> &[u8; $len] {
                &self.0
            }

            pub fn to_bytes(self) -> [u8; $len] {
                self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0 == [0u8; $len]
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }

        impl From<[u8; $len]> for $name {
            fn from(bytes: [u8; $len]) -> Self {
                Self(bytes)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", hex::encode(self.0))
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self)
            }
        }
    };
}

fixed_id!(
    /// A 32-byte identifier.
    Id,
    32
);

fixed_id!(
    /// The identity of a peer on the network.
    NodeId,
    20
);

/// Identifies a chain; every chain has its own handler and engine.
pub type ChainId = Id;

/// Identifies a subnet, the unit that owns a validator set.
pub type SubnetId = Id;

/// The primary network's subnet.
pub const PRIMARY_NETWORK_ID: SubnetId = Id::new_from_array([0u8; 32]);

impl Id {
    /// SHA-256 over the concatenation of `parts`.
    pub fn hashv(parts: &[&[u8]]) -> Self {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        Self(hasher.finalize().into())
    }

    /// A uniformly random identifier, suitable for salts.
    pub fn random() -> Self {
        let mut bytes = [0u8; 32];
        rand::rng().fill_bytes(&mut bytes);
        Self(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_unique_differs() {
        let a = Id::new_unique();
        let b = Id::new_unique();
        assert_ne!(a, b);
        assert!(!a.is_empty());
        assert_ne!(NodeId::new_unique(), NodeId::new_unique());
    }

    #[test]
    fn test_from_slice_checks_length() {
        let id = NodeId::new_unique();
        assert_eq!(NodeId::from_slice(id.as_ref()).unwrap(), id);
        assert_eq!(
            NodeId::from_slice(&[0u8; 19]),
            Err(TypesError::InvalidLength {
                expected: 20,
                actual: 19
            })
        );
    }

    #[test]
    fn test_hashv_is_order_sensitive() {
        let a = Id::hashv(&[b"node", b"chain"]);
        let b = Id::hashv(&[b"chain", b"node"]);
        assert_ne!(a, b);
        assert_eq!(a, Id::hashv(&[b"node", b"chain"]));
    }

    #[test]
    fn test_display_is_hex() {
        let id = Id::new_from_array([0xab; 32]);
        assert_eq!(id.to_string(), "ab".repeat(32));
        assert!(format!("{id:?}").starts_with("Id("));
    }

    #[test]
    fn test_serde_round_trip() {
        let id = NodeId::new_unique();
        let bytes = bincode::serialize(&id).unwrap();
        let back: NodeId = bincode::deserialize(&bytes).unwrap();
        assert_eq!(id, back);
    }
}
