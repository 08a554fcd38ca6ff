//! In-memory gossipables and set for tests.

use {
    crate::{
        bloom::{reset_bloom_filter_if_needed, BloomFilter},
        config::BloomFilterConfig,
        error::{GossipError, Result},
        gossipable::{Gossipable, Marshaller, Set},
    },
    indexmap::IndexMap,
    parking_lot::Mutex,
    quorum_monitoring::NoopMetrics,
    quorum_types::Id,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestTx {
    pub id: Id,
    pub payload: Vec<u8>,
}

impl TestTx {
    pub fn new(payload: Vec<u8>) -> Self {
        Self {
            id: Id::new_unique(),
            payload,
        }
    }
}

impl Gossipable for TestTx {
    fn gossip_id(&self) -> Id {
        self.id
    }
}

/// Encodes a [`TestTx`] as its id followed by its payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct TestMarshaller;

impl Marshaller<TestTx> for TestMarshaller {
    fn marshal(&self, item: &TestTx) -> Result<Vec<u8>> {
        let mut bytes = item.id.as_ref().to_vec();
        bytes.extend_from_slice(&item.payload);
        Ok(bytes)
    }

    fn unmarshal(&self, bytes: &[u8]) -> Result<TestTx> {
        if bytes.len() < Id::LEN {
            return Err(GossipError::Marshal(format!(
                "{} bytes is too short for a tx",
                bytes.len()
            )));
        }
        let (id, payload) = bytes.split_at(Id::LEN);
        let id = Id::from_slice(id).map_err(|err| GossipError::Marshal(err.to_string()))?;
        Ok(TestTx {
            id,
            payload: payload.to_vec(),
        })
    }
}

struct Inner {
    items: IndexMap<Id, TestTx>,
    bloom: BloomFilter,
}

/// Insertion-ordered set backed by a bloom filter.
pub struct TestSet {
    inner: Mutex<Inner>,
}

impl Default for TestSet {
    fn default() -> Self {
        Self::new()
    }
}

impl TestSet {
    pub fn new() -> Self {
        let bloom = match BloomFilter::new(BloomFilterConfig::dev_default(), NoopMetrics::shared()) {
            Ok(bloom) => bloom,
            Err(err) => panic!("dev bloom config is valid: {err}"),
        };
        Self {
            inner: Mutex::new(Inner {
                items: IndexMap::new(),
                bloom,
            }),
        }
    }

    pub fn remove(&self, id: &Id) -> Option<TestTx> {
        self.inner.lock().items.shift_remove(id)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn ids(&self) -> Vec<Id> {
        self.inner.lock().items.keys().copied().collect()
    }
}

impl Set<TestTx> for TestSet {
    fn add(&self, item: TestTx) -> Result<()> {
        let mut inner = self.inner.lock();
        if inner.items.contains_key(&item.id) {
            return Err(GossipError::Rejected {
                id: item.id,
                reason: "already known".to_string(),
            });
        }
        inner.bloom.add(&item);
        inner.items.insert(item.id, item);
        let Inner { items, bloom } = &mut *inner;
        if reset_bloom_filter_if_needed(bloom, items.len())? {
            for item in items.values() {
                bloom.add(item);
            }
        }
        Ok(())
    }

    fn has(&self, id: &Id) -> bool {
        self.inner.lock().items.contains_key(id)
    }

    fn iterate(&self, f: &mut dyn FnMut(&TestTx) -> bool) {
        let inner = self.inner.lock();
        for item in inner.items.values() {
            if !f(item) {
                break;
            }
        }
    }

    fn get_filter(&self) -> (Vec<u8>, Vec<u8>) {
        self.inner.lock().bloom.marshal()
    }
}
