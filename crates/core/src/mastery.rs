//! Per-group proficiency derived from a learner's answer history.

use std::collections::{BTreeMap, HashMap};

use crate::model::{AnswerRecord, GroupId, GroupMembership, Question, QuestionId};

/// Proficiency assumed for a group without any correct answers.
pub const DEFAULT_MASTERY: f64 = 1.0;

/// Average level of correctly answered questions, per topic group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MasterySnapshot {
    levels: BTreeMap<GroupId, f64>,
}

impl MasterySnapshot {
    /// Computes the snapshot for the given memberships.
    ///
    /// Every correct record counts once, so a question answered correctly three
    /// times weighs three times. Records whose question is not in `questions`
    /// are ignored. Averages are rounded to two decimals.
    #[must_use]
    pub fn compute(
        memberships: &[GroupMembership],
        questions: &HashMap<QuestionId, Question>,
        records: &[AnswerRecord],
    ) -> Self {
        let mut totals: BTreeMap<GroupId, (u64, u64)> = memberships
            .iter()
            .map(|m| (m.group_id, (0, 0)))
            .collect();

        for record in records {
            let Some(question) = questions.get(&record.question_id) else {
                continue;
            };
            if !record.is_correct_for(question) {
                continue;
            }
            for group in question.groups() {
                if let Some((sum, count)) = totals.get_mut(group) {
                    *sum += u64::from(question.level());
                    *count += 1;
                }
            }
        }

        let levels = totals
            .into_iter()
            .map(|(group, (sum, count))| {
                let level = if count == 0 {
                    DEFAULT_MASTERY
                } else {
                    #[allow(clippy::cast_precision_loss)]
                    let avg = sum as f64 / count as f64;
                    round2(avg)
                };
                (group, level)
            })
            .collect();

        Self { levels }
    }

    /// Mastery for `group`, or the default when the group is unknown.
    #[must_use]
    pub fn level(&self, group: GroupId) -> f64 {
        self.levels.get(&group).copied().unwrap_or(DEFAULT_MASTERY)
    }

    pub fn iter(&self) -> impl Iterator<Item = (GroupId, f64)> + '_ {
        self.levels.iter().map(|(g, l)| (*g, *l))
    }

    /// Groups ordered by `target - mastery`, largest gap first.
    ///
    /// Ties keep ascending group id order.
    #[must_use]
    pub fn by_deficit(&self, memberships: &[GroupMembership]) -> Vec<(GroupId, f64)> {
        let mut deficits: Vec<(GroupId, f64)> = memberships
            .iter()
            .map(|m| (m.group_id, f64::from(m.target_level) - self.level(m.group_id)))
            .collect();
        deficits.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        deficits
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{AnswerState, LearnerId, QuestionContent, RecordId};
    use crate::time::fixed_now;

    fn question(id: u64, groups: &[u64], level: u32) -> Question {
        Question::new(
            QuestionId::new(id),
            groups.iter().copied().map(GroupId::new),
            level,
            QuestionContent::text_only(format!("Q{id}")),
            "yes",
        )
        .unwrap()
    }

    fn answered(id: u64, question: u64, answer: &str) -> AnswerRecord {
        let mut record = AnswerRecord::pending(
            RecordId::new(id),
            QuestionId::new(question),
            LearnerId::new(1),
            fixed_now(),
        );
        record.state = AnswerState::Answered;
        record.submitted_answer = Some(answer.to_string());
        record
    }

    fn index(questions: Vec<Question>) -> HashMap<QuestionId, Question> {
        questions.into_iter().map(|q| (q.id(), q)).collect()
    }

    #[test]
    fn empty_history_defaults_every_group_to_one() {
        let memberships = [
            GroupMembership::new(GroupId::new(1), 4),
            GroupMembership::new(GroupId::new(2), 2),
        ];
        let snapshot = MasterySnapshot::compute(&memberships, &HashMap::new(), &[]);

        assert_eq!(snapshot.level(GroupId::new(1)), 1.0);
        assert_eq!(snapshot.level(GroupId::new(2)), 1.0);
        assert_eq!(snapshot.iter().count(), 2);
    }

    #[test]
    fn averages_correct_answers_only() {
        let memberships = [GroupMembership::new(GroupId::new(1), 5)];
        let questions = index(vec![
            question(1, &[1], 2),
            question(2, &[1], 3),
            question(3, &[1], 5),
        ]);
        let records = vec![
            answered(1, 1, "yes"),
            answered(2, 2, "yes"),
            answered(3, 2, "yes"),
            answered(4, 3, "no"),
        ];

        let snapshot = MasterySnapshot::compute(&memberships, &questions, &records);
        // (2 + 3 + 3) / 3
        assert_eq!(snapshot.level(GroupId::new(1)), 2.67);
    }

    #[test]
    fn shared_questions_count_for_every_member_group() {
        let memberships = [
            GroupMembership::new(GroupId::new(1), 3),
            GroupMembership::new(GroupId::new(2), 3),
        ];
        let questions = index(vec![question(1, &[1, 2], 4), question(2, &[2], 2)]);
        let records = vec![answered(1, 1, "yes"), answered(2, 2, "yes")];

        let snapshot = MasterySnapshot::compute(&memberships, &questions, &records);
        assert_eq!(snapshot.level(GroupId::new(1)), 4.0);
        assert_eq!(snapshot.level(GroupId::new(2)), 3.0);
    }

    #[test]
    fn groups_order_by_largest_deficit() {
        let memberships = [
            GroupMembership::new(GroupId::new(2), 3),
            GroupMembership::new(GroupId::new(1), 4),
        ];
        let questions = index(vec![question(1, &[1], 2), question(2, &[2], 3)]);
        let records = vec![answered(1, 1, "yes"), answered(2, 2, "yes")];
        let snapshot = MasterySnapshot::compute(&memberships, &questions, &records);

        let order: Vec<GroupId> = snapshot
            .by_deficit(&memberships)
            .into_iter()
            .map(|(g, _)| g)
            .collect();
        assert_eq!(order, vec![GroupId::new(1), GroupId::new(2)]);
    }
}
