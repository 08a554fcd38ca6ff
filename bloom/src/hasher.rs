use sha2::{Digest, Sha256};

/// Hash an element together with a salt into the `u64` a [`Filter`] consumes.
///
/// Salting lets a node rotate its filter so that a false positive against one
/// peer does not repeat forever.
///
/// [`Filter`]: crate::Filter
pub fn hash(item: &[u8], salt: &[u8]) -> u64 {
    let digest = Sha256::new().chain_update(item).chain_update(salt).finalize();
    let mut prefix = [0u8; 8];
    prefix.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(prefix)
}
