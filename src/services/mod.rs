pub(crate) mod attempt_safety;
pub(crate) mod autosave;
pub(crate) mod engine;
pub(crate) mod evaluation;
pub(crate) mod finalize;
pub(crate) mod gatekeeper;
pub(crate) mod timer;
pub(crate) mod violation_policy;
pub(crate) mod violations;
