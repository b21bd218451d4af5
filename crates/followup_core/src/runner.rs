//! crates/followup_core/src/runner.rs
//!
//! The experiment runner: iterates the selected cases of an experiment,
//! generates one follow-up per case using the experiment prompt's settings,
//! and persists the result. Lives in the core crate so it can be exercised
//! against mock ports.

use uuid::Uuid;

use crate::domain::{ExperimentCase, FollowUp};
use crate::ports::{DatabaseService, FollowupGenerationService, PortResult};

/// The outcome of one case in an experiment run.
#[derive(Debug)]
pub enum CaseOutcome {
    /// A follow-up was generated and persisted for the case's answer.
    Generated {
        case: ExperimentCase,
        followup: FollowUp,
    },
    /// The selected case has no matching answer; skipped as a
    /// data-integrity problem, not a fatal one.
    MissingAnswer { case: ExperimentCase },
    /// Generation or persistence failed for this case. The run continues.
    Failed { case: ExperimentCase, error: String },
}

impl CaseOutcome {
    pub fn case(&self) -> &ExperimentCase {
        match self {
            CaseOutcome::Generated { case, .. }
            | CaseOutcome::MissingAnswer { case }
            | CaseOutcome::Failed { case, .. } => case,
        }
    }
}

/// Per-case outcomes of a full experiment run, in processing order.
#[derive(Debug, Default)]
pub struct RunReport {
    pub experiment_id: Uuid,
    pub outcomes: Vec<CaseOutcome>,
}

impl RunReport {
    pub fn generated_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CaseOutcome::Generated { .. }))
            .count()
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CaseOutcome::Failed { .. }))
            .count()
    }

    pub fn missing_answer_count(&self) -> usize {
        self.outcomes
            .iter()
            .filter(|o| matches!(o, CaseOutcome::MissingAnswer { .. }))
            .count()
    }
}

/// Runs an experiment: one generation call per selected case, sequentially,
/// in case creation order. A failing case is recorded and never aborts the
/// batch. Fails outright only when the experiment or its prompt cannot be
/// loaded at all.
pub async fn run_experiment(
    db: &dyn DatabaseService,
    generator: &dyn FollowupGenerationService,
    experiment_id: Uuid,
) -> PortResult<RunReport> {
    let experiment = db.get_experiment_by_id(experiment_id).await?;
    let prompt = db.get_prompt_by_id(experiment.prompt_id).await?;

    let mut cases: Vec<ExperimentCase> = db
        .get_cases_by_experiment(experiment_id)
        .await?
        .into_iter()
        .filter(|c| c.is_selected)
        .collect();
    // Deterministic processing order: creation time, id as tie-break.
    cases.sort_by(|a, b| (a.created_at, a.id).cmp(&(b.created_at, b.id)));

    let mut report = RunReport {
        experiment_id,
        outcomes: Vec::with_capacity(cases.len()),
    };

    for case in cases {
        let outcome = process_case(db, generator, &prompt, case).await;
        report.outcomes.push(outcome);
    }

    Ok(report)
}

async fn process_case(
    db: &dyn DatabaseService,
    generator: &dyn FollowupGenerationService,
    prompt: &crate::domain::Prompt,
    case: ExperimentCase,
) -> CaseOutcome {
    let question = match db.get_question_by_id(case.question_id).await {
        Ok(q) => q,
        Err(e) => {
            return CaseOutcome::Failed {
                case,
                error: e.to_string(),
            }
        }
    };

    let answer = match db
        .get_answer_by_question_and_user(case.question_id, case.user_id)
        .await
    {
        Ok(Some(a)) => a,
        Ok(None) => return CaseOutcome::MissingAnswer { case },
        Err(e) => {
            return CaseOutcome::Failed {
                case,
                error: e.to_string(),
            }
        }
    };

    let draft = match generator
        .generate_followup(
            &prompt.content,
            &question.question_text,
            &answer.answer_text,
            &prompt.model,
            prompt.temperature,
        )
        .await
    {
        Ok(d) => d,
        Err(e) => {
            return CaseOutcome::Failed {
                case,
                error: e.to_string(),
            }
        }
    };

    // One follow-up per answer: a re-run replaces the previous one.
    if let Err(e) = db.clear_followups_by_answer(answer.id).await {
        return CaseOutcome::Failed {
            case,
            error: e.to_string(),
        };
    }

    let reason = if draft.reason.is_empty() {
        None
    } else {
        Some(draft.reason.as_str())
    };
    match db.create_followup(answer.id, &draft.question, reason).await {
        Ok(followup) => CaseOutcome::Generated { case, followup },
        Err(e) => CaseOutcome::Failed {
            case,
            error: e.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{
        Answer, CaseResult, Experiment, ExperimentCase, FollowUp, FollowupDraft, Prompt,
        PromptUpdate, Question, User,
    };
    use crate::ports::PortError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};
    use std::collections::HashMap;
    use std::sync::Mutex;

    fn prompt() -> Prompt {
        Prompt {
            id: Uuid::new_v4(),
            title: "Interview".into(),
            content: "You are an interviewer.".into(),
            model: "gemini-2.0-flash".into(),
            temperature: 0.7,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    struct MockDb {
        experiment: Experiment,
        prompt: Prompt,
        cases: Vec<ExperimentCase>,
        questions: HashMap<Uuid, Question>,
        answers: HashMap<(Uuid, Uuid), Answer>,
        saved_followups: Mutex<Vec<FollowUp>>,
        cleared_answers: Mutex<Vec<Uuid>>,
    }

    impl MockDb {
        fn new(prompt: Prompt) -> Self {
            let experiment = Experiment {
                id: Uuid::new_v4(),
                name: "exp".into(),
                description: String::new(),
                prompt_id: prompt.id,
                created_at: Utc::now(),
            };
            Self {
                experiment,
                prompt,
                cases: Vec::new(),
                questions: HashMap::new(),
                answers: HashMap::new(),
                saved_followups: Mutex::new(Vec::new()),
                cleared_answers: Mutex::new(Vec::new()),
            }
        }

        /// Adds a case with its question, and an answer unless `answered`
        /// is false. Cases are timestamped in insertion order.
        fn add_case(&mut self, answered: bool, selected: bool) -> ExperimentCase {
            let offset = self.cases.len() as i64;
            let question = Question {
                id: Uuid::new_v4(),
                prompt_id: self.prompt.id,
                question_text: format!("Question {offset}?"),
                created_at: Utc::now(),
            };
            let user_id = Uuid::new_v4();
            if answered {
                self.answers.insert(
                    (question.id, user_id),
                    Answer {
                        id: Uuid::new_v4(),
                        question_id: question.id,
                        user_id,
                        answer_text: format!("Answer {offset}"),
                        created_at: Utc::now(),
                    },
                );
            }
            let case = ExperimentCase {
                id: Uuid::new_v4(),
                experiment_id: self.experiment.id,
                question_id: question.id,
                user_id,
                is_selected: selected,
                created_at: Utc::now() + Duration::seconds(offset),
            };
            self.questions.insert(question.id, question);
            self.cases.push(case.clone());
            case
        }
    }

    #[async_trait]
    impl DatabaseService for MockDb {
        async fn create_prompt(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: f64,
        ) -> PortResult<Prompt> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_prompt_by_id(&self, prompt_id: Uuid) -> PortResult<Prompt> {
            if prompt_id == self.prompt.id {
                Ok(self.prompt.clone())
            } else {
                Err(PortError::NotFound(format!("Prompt {prompt_id}")))
            }
        }

        async fn list_prompts(&self) -> PortResult<Vec<Prompt>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn update_prompt(&self, _: Uuid, _: PromptUpdate) -> PortResult<Prompt> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn delete_prompt(&self, _: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn create_question(&self, _: Uuid, _: &str) -> PortResult<Question> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_question_by_id(&self, question_id: Uuid) -> PortResult<Question> {
            self.questions
                .get(&question_id)
                .cloned()
                .ok_or_else(|| PortError::NotFound(format!("Question {question_id}")))
        }

        async fn get_questions_by_prompt(&self, _: Uuid) -> PortResult<Vec<Question>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn delete_question(&self, _: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn create_user(&self, _: &str, _: Option<&str>) -> PortResult<User> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_user_by_id(&self, _: Uuid) -> PortResult<User> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn list_users(&self) -> PortResult<Vec<User>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn delete_user(&self, _: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn upsert_answer(&self, _: Uuid, _: Uuid, _: &str) -> PortResult<Answer> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_answers_by_question(&self, _: Uuid) -> PortResult<Vec<Answer>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_answer_by_question_and_user(
            &self,
            question_id: Uuid,
            user_id: Uuid,
        ) -> PortResult<Option<Answer>> {
            Ok(self.answers.get(&(question_id, user_id)).cloned())
        }

        async fn create_followup(
            &self,
            answer_id: Uuid,
            followup_text: &str,
            reason: Option<&str>,
        ) -> PortResult<FollowUp> {
            let followup = FollowUp {
                id: Uuid::new_v4(),
                answer_id,
                followup_text: followup_text.to_string(),
                reason: reason.map(str::to_string),
                created_at: Utc::now(),
            };
            self.saved_followups.lock().unwrap().push(followup.clone());
            Ok(followup)
        }

        async fn get_followups_by_answer(&self, _: Uuid) -> PortResult<Vec<FollowUp>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn clear_followups_by_answer(&self, answer_id: Uuid) -> PortResult<()> {
            self.cleared_answers.lock().unwrap().push(answer_id);
            Ok(())
        }

        async fn create_experiment(&self, _: &str, _: &str, _: Uuid) -> PortResult<Experiment> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_experiment_by_id(&self, experiment_id: Uuid) -> PortResult<Experiment> {
            if experiment_id == self.experiment.id {
                Ok(self.experiment.clone())
            } else {
                Err(PortError::NotFound(format!("Experiment {experiment_id}")))
            }
        }

        async fn list_experiments(&self) -> PortResult<Vec<Experiment>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_experiments_by_prompt(&self, _: Uuid) -> PortResult<Vec<Experiment>> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn delete_experiment(&self, _: Uuid) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn create_case(
            &self,
            _: Uuid,
            _: Uuid,
            _: Uuid,
            _: bool,
        ) -> PortResult<ExperimentCase> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_cases_by_experiment(
            &self,
            _: Uuid,
        ) -> PortResult<Vec<ExperimentCase>> {
            Ok(self.cases.clone())
        }

        async fn set_case_selection(&self, _: Uuid, _: bool) -> PortResult<()> {
            Err(PortError::Unexpected("not used".into()))
        }

        async fn get_selected_case_results(&self, _: Uuid) -> PortResult<Vec<CaseResult>> {
            Err(PortError::Unexpected("not used".into()))
        }
    }

    /// Succeeds for every call except those whose question text appears in
    /// `fail_on`.
    struct MockGenerator {
        fail_on: Vec<String>,
        calls: Mutex<Vec<String>>,
    }

    impl MockGenerator {
        fn new(fail_on: Vec<String>) -> Self {
            Self {
                fail_on,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl FollowupGenerationService for MockGenerator {
        async fn generate_followup(
            &self,
            _prompt_context: &str,
            question: &str,
            _answer: &str,
            _model: &str,
            _temperature: f64,
        ) -> PortResult<FollowupDraft> {
            self.calls.lock().unwrap().push(question.to_string());
            if self.fail_on.iter().any(|q| q == question) {
                return Err(PortError::Connectivity("provider unreachable".into()));
            }
            Ok(FollowupDraft {
                question: format!("Why {question}"),
                reason: "To dig deeper".into(),
            })
        }
    }

    #[tokio::test]
    async fn failing_case_does_not_abort_the_batch() {
        let mut db = MockDb::new(prompt());
        db.add_case(true, true);
        let failing = db.add_case(true, true);
        db.add_case(true, true);
        let failing_question = db.questions[&failing.question_id].question_text.clone();

        let generator = MockGenerator::new(vec![failing_question]);
        let report = run_experiment(&db, &generator, db.experiment.id)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 3);
        assert_eq!(report.generated_count(), 2);
        assert_eq!(report.failed_count(), 1);
        assert_eq!(db.saved_followups.lock().unwrap().len(), 2);
        // Exactly one attempt per selected case.
        assert_eq!(generator.calls.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn missing_answer_is_skipped_with_a_warning_outcome() {
        let mut db = MockDb::new(prompt());
        db.add_case(true, true);
        let unanswered = db.add_case(false, true);

        let generator = MockGenerator::new(Vec::new());
        let report = run_experiment(&db, &generator, db.experiment.id)
            .await
            .unwrap();

        assert_eq!(report.generated_count(), 1);
        assert_eq!(report.missing_answer_count(), 1);
        let missing = report
            .outcomes
            .iter()
            .find(|o| matches!(o, CaseOutcome::MissingAnswer { .. }))
            .unwrap();
        assert_eq!(missing.case().id, unanswered.id);
        // The unanswered case never reaches the generator.
        assert_eq!(generator.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unselected_cases_are_excluded() {
        let mut db = MockDb::new(prompt());
        db.add_case(true, true);
        db.add_case(true, false);

        let generator = MockGenerator::new(Vec::new());
        let report = run_experiment(&db, &generator, db.experiment.id)
            .await
            .unwrap();

        assert_eq!(report.outcomes.len(), 1);
        assert_eq!(report.generated_count(), 1);
    }

    #[tokio::test]
    async fn cases_run_in_creation_order_and_rerun_clears_old_followups() {
        let mut db = MockDb::new(prompt());
        let first = db.add_case(true, true);
        let second = db.add_case(true, true);
        // Shuffle storage order; the runner must sort by creation time.
        db.cases.reverse();

        let generator = MockGenerator::new(Vec::new());
        let report = run_experiment(&db, &generator, db.experiment.id)
            .await
            .unwrap();

        let processed: Vec<Uuid> = report.outcomes.iter().map(|o| o.case().id).collect();
        assert_eq!(processed, vec![first.id, second.id]);
        // Every persisted follow-up was preceded by a clear of its answer.
        let cleared = db.cleared_answers.lock().unwrap().clone();
        let saved = db.saved_followups.lock().unwrap();
        assert_eq!(cleared.len(), saved.len());
        for followup in saved.iter() {
            assert!(cleared.contains(&followup.answer_id));
        }
    }

    #[tokio::test]
    async fn unknown_experiment_fails_the_run_itself() {
        let db = MockDb::new(prompt());
        let generator = MockGenerator::new(Vec::new());
        let err = run_experiment(&db, &generator, Uuid::new_v4())
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }
}
