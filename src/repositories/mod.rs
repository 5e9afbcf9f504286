pub(crate) mod answers;
pub(crate) mod attempt_versions;
pub(crate) mod attempts;
pub(crate) mod health;
pub(crate) mod questions;
pub(crate) mod test_definitions;
