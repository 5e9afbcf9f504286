pub(crate) mod archival;
pub(crate) mod attempt_lifecycle;
pub(crate) mod attempt_snapshot;
pub(crate) mod attempt_stats;
pub(crate) mod attempt_versions;
pub(crate) mod attempt_workflow;
pub(crate) mod identity;
pub(crate) mod scoring;
pub(crate) mod storage;
