pub mod db;
pub mod followup_llm;

pub use db::DbAdapter;
pub use followup_llm::OpenAiFollowupAdapter;
