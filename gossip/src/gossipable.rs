//! The application side of gossip.

use {crate::error::Result, quorum_types::Id};

/// An item that can be gossiped. Its id must be stable across peers.
pub trait Gossipable {
    fn gossip_id(&self) -> Id;
}

/// Encodes items for the wire.
pub trait Marshaller<T>: Send + Sync {
    fn marshal(&self, item: &T) -> Result<Vec<u8>>;
    fn unmarshal(&self, bytes: &[u8]) -> Result<T>;
}

/// The authoritative collection gossip reads from and adds to.
pub trait Set<T: Gossipable>: Send + Sync {
    /// Add an item learnt from a peer. Errors for items the set refuses,
    /// including ones it already has.
    fn add(&self, item: T) -> Result<()>;

    fn has(&self, id: &Id) -> bool;

    /// Visit items until `f` returns false.
    fn iterate(&self, f: &mut dyn FnMut(&T) -> bool);

    /// The marshalled bloom filter over the set's ids, and its salt.
    fn get_filter(&self) -> (Vec<u8>, Vec<u8>);
}
