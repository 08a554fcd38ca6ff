//! Metrics reported by the consensus networking layer.

use quorum_monitoring::MetricDesc;

pub static HANDLER_EXPIRED_MESSAGES: MetricDesc = MetricDesc::new(
    "handler_expired_messages",
    "Messages dropped because their deadline passed before processing",
);
pub static HANDLER_PROCESSING_MS: MetricDesc = MetricDesc::new(
    "handler_processing_ms",
    "Time the engine spent on one message",
);
pub static HANDLER_DROPPED_MESSAGES: MetricDesc = MetricDesc::new(
    "handler_dropped_messages",
    "Messages the engine rejected or that arrived after shutdown",
);
pub static ROUTER_PENDING_REQUESTS: MetricDesc = MetricDesc::new(
    "router_pending_requests",
    "Outstanding requests awaiting a response",
);
pub static ROUTER_DROPPED_RESPONSES: MetricDesc = MetricDesc::new(
    "router_dropped_responses",
    "Responses and failures that matched no outstanding request",
);
pub static THROTTLER_AT_LARGE_REMAINING: MetricDesc = MetricDesc::new(
    "throttler_at_large_remaining",
    "Bytes left in the at-large pool",
);
pub static THROTTLER_VALIDATOR_REMAINING: MetricDesc = MetricDesc::new(
    "throttler_validator_remaining",
    "Bytes left in the validator pool",
);
pub static BENCHLIST_BENCHED_WEIGHT: MetricDesc = MetricDesc::new(
    "benchlist_benched_weight",
    "Weight of the validators benched on a chain",
);
pub static BENCHLIST_BENCHED_COUNT: MetricDesc = MetricDesc::new(
    "benchlist_benched_count",
    "Number of validators benched on a chain",
);
