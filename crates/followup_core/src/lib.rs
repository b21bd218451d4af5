pub mod domain;
pub mod ports;
pub mod results;
pub mod runner;

pub use domain::{
    Answer, CaseResult, Experiment, ExperimentCase, FollowUp, FollowupDraft, Prompt, PromptUpdate,
    Question, User,
};
pub use ports::{DatabaseService, FollowupGenerationService, PortError, PortResult};
pub use results::{group_by_user, summarize, ResultsSummary, UserResults};
pub use runner::{run_experiment, CaseOutcome, RunReport};
