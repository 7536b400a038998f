//! Submitter configuration.

/// Tunables for [`ActorTaskSubmitter`](crate::submitter::ActorTaskSubmitter).
#[derive(Debug, Clone)]
pub struct SubmitterConfig {
    /// First rung of the per-actor queue-warning ladder.
    ///
    /// The warning callback fires when the count of buffered plus in-flight
    /// tasks reaches this threshold, which then doubles: 5 000, 10 000,
    /// 20 000, ... Acknowledgements never reset the ladder.
    pub queue_warn_threshold: u64,

    /// How long a task whose push failed may wait for an authoritative
    /// death cause before being failed as unreachable.
    ///
    /// Only used for actors registered with `fail_if_unreachable = false`;
    /// with the flag set, failed pushes are reported immediately.
    pub wait_for_death_info_timeout_ms: i64,

    /// Birth timestamp of this caller instance, stamped onto every request.
    ///
    /// `None` reads the submitter's time source at construction. Receivers
    /// compare these timestamps to tell a reconstructed caller from a
    /// pre-reconstruction straggler.
    pub instance_timestamp_ms: Option<i64>,
}

impl Default for SubmitterConfig {
    fn default() -> Self {
        Self {
            queue_warn_threshold: 5_000,
            wait_for_death_info_timeout_ms: 1_000,
            instance_timestamp_ms: None,
        }
    }
}
