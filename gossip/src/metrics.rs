//! Metrics reported by the gossip engine.

use quorum_monitoring::MetricDesc;

pub static GOSSIP_SENT_COUNT: MetricDesc =
    MetricDesc::new("gossip_sent_count", "Gossipables sent to peers");
pub static GOSSIP_SENT_BYTES: MetricDesc =
    MetricDesc::new("gossip_sent_bytes", "Bytes of gossipables sent to peers");
pub static GOSSIP_RECEIVED_COUNT: MetricDesc = MetricDesc::new(
    "gossip_received_count",
    "Gossipables received from peers",
);
pub static GOSSIP_RECEIVED_BYTES: MetricDesc = MetricDesc::new(
    "gossip_received_bytes",
    "Bytes of gossipables received from peers",
);
pub static GOSSIP_TRACKING: MetricDesc = MetricDesc::new(
    "gossip_tracking",
    "Gossipables tracked by the push gossiper",
);
pub static GOSSIP_DISCARDED: MetricDesc = MetricDesc::new(
    "gossip_discarded",
    "Tracked gossipables that left the set before being regossiped",
);
pub static BLOOM_COUNT: MetricDesc =
    MetricDesc::new("bloom_count", "Additions to the current bloom filter");
pub static BLOOM_ENTRIES: MetricDesc =
    MetricDesc::new("bloom_entries", "Size of the current bloom filter in bytes");
pub static BLOOM_RESETS: MetricDesc =
    MetricDesc::new("bloom_resets", "Times the bloom filter was replaced");
