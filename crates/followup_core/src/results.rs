//! crates/followup_core/src/results.rs
//!
//! Read-side aggregation of experiment results. Grouping follow-ups by user
//! is a transform over loaded case results, not a stored structure.

use std::collections::HashSet;

use crate::domain::{CaseResult, User};

/// All of one user's cases within an experiment's results.
#[derive(Debug, Clone)]
pub struct UserResults {
    pub user: User,
    pub cases: Vec<CaseResult>,
}

/// Headline counts for a results view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResultsSummary {
    pub users: usize,
    pub questions: usize,
    pub cases: usize,
    pub followups: usize,
}

/// Groups case results by their answer's user, preserving the order in
/// which users first appear and the case order within each group.
pub fn group_by_user(case_results: Vec<CaseResult>) -> Vec<UserResults> {
    let mut grouped: Vec<UserResults> = Vec::new();
    for case_result in case_results {
        match grouped
            .iter_mut()
            .find(|g| g.user.id == case_result.user.id)
        {
            Some(group) => group.cases.push(case_result),
            None => grouped.push(UserResults {
                user: case_result.user.clone(),
                cases: vec![case_result],
            }),
        }
    }
    grouped
}

pub fn summarize(grouped: &[UserResults]) -> ResultsSummary {
    let mut questions = HashSet::new();
    let mut cases = 0;
    let mut followups = 0;
    for group in grouped {
        for case_result in &group.cases {
            questions.insert(case_result.question.id);
            cases += 1;
            followups += case_result.followups.len();
        }
    }
    ResultsSummary {
        users: grouped.len(),
        questions: questions.len(),
        cases,
        followups,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Answer, ExperimentCase, FollowUp, Question};
    use chrono::Utc;
    use uuid::Uuid;

    fn user(name: &str) -> User {
        User {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email: None,
            created_at: Utc::now(),
        }
    }

    fn case_result(user: &User, question_id: Uuid, followup_count: usize) -> CaseResult {
        let answer_id = Uuid::new_v4();
        CaseResult {
            case: ExperimentCase {
                id: Uuid::new_v4(),
                experiment_id: Uuid::new_v4(),
                question_id,
                user_id: user.id,
                is_selected: true,
                created_at: Utc::now(),
            },
            question: Question {
                id: question_id,
                prompt_id: Uuid::new_v4(),
                question_text: "What is your role?".into(),
                created_at: Utc::now(),
            },
            user: user.clone(),
            answer: Answer {
                id: answer_id,
                question_id,
                user_id: user.id,
                answer_text: "I manage the backend team.".into(),
                created_at: Utc::now(),
            },
            followups: (0..followup_count)
                .map(|_| FollowUp {
                    id: Uuid::new_v4(),
                    answer_id,
                    followup_text: "What technologies do you use?".into(),
                    reason: Some("To assess depth".into()),
                    created_at: Utc::now(),
                })
                .collect(),
        }
    }

    #[test]
    fn groups_cases_under_their_user_in_first_seen_order() {
        let alice = user("Alice");
        let bob = user("Bob");
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();

        let grouped = group_by_user(vec![
            case_result(&alice, q1, 1),
            case_result(&bob, q1, 1),
            case_result(&alice, q2, 0),
        ]);

        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped[0].user.name, "Alice");
        assert_eq!(grouped[0].cases.len(), 2);
        assert_eq!(grouped[1].user.name, "Bob");
        assert_eq!(grouped[1].cases.len(), 1);
    }

    #[test]
    fn summary_counts_distinct_questions_and_all_followups() {
        let alice = user("Alice");
        let bob = user("Bob");
        let q1 = Uuid::new_v4();
        let q2 = Uuid::new_v4();

        let grouped = group_by_user(vec![
            case_result(&alice, q1, 1),
            case_result(&alice, q2, 1),
            case_result(&bob, q1, 0),
        ]);
        let summary = summarize(&grouped);

        assert_eq!(
            summary,
            ResultsSummary {
                users: 2,
                questions: 2,
                cases: 3,
                followups: 2,
            }
        );
    }

    #[test]
    fn empty_results_produce_an_empty_summary() {
        let grouped = group_by_user(Vec::new());
        assert!(grouped.is_empty());
        let summary = summarize(&grouped);
        assert_eq!(summary.users, 0);
        assert_eq!(summary.followups, 0);
    }
}
