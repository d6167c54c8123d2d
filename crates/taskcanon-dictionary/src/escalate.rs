//! Escalation of ambiguous groups and merge of the returned labels.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use taskcanon_labeling::{
    context_keys, render_prompt, CancelSignal, Escalator, LabelMapping, LabelingService,
};
use taskcanon_text::normalize;

use crate::builder::{DictionaryDraft, LabeledGroup};

/// A group whose escalation failed and kept its automatic label.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationIncident {
    pub group: usize,
    pub context: String,
    pub fallback_label: String,
    pub members: usize,
    pub attempts: u32,
    pub error: String,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EscalationReport {
    /// Groups sent to the service.
    pub escalated: usize,
    /// Groups the service answered for.
    pub resolved: usize,
    /// Dictionary entries whose label changed.
    pub relabeled: usize,
    pub incidents: Vec<EscalationIncident>,
}

/// Escalate every ambiguous group of `draft`, one request per group, and
/// merge the answers into its dictionary. A failed group keeps its automatic
/// label and yields exactly one incident.
pub async fn escalate_groups<S: LabelingService>(
    draft: &mut DictionaryDraft,
    escalator: &Escalator<S>,
    reserved: &[&str],
    cancel: &CancelSignal,
) -> EscalationReport {
    let mut report = EscalationReport::default();
    let pending: Vec<LabeledGroup> = draft.ambiguous().cloned().collect();

    for group in pending {
        if cancel.is_cancelled() {
            tracing::warn!(group = group.id, "escalation cancelled before submit");
            report.incidents.push(incident(&group, 0, "escalation cancelled".to_string()));
            continue;
        }

        report.escalated += 1;
        let prompt = render_prompt(
            &context_keys([(group.context.as_str(), group.members.clone())]),
            reserved,
        );
        let outcome = escalator.run(&prompt, cancel).await;
        let attempts = outcome.attempts;

        match outcome.into_result() {
            Ok(mapping) => {
                report.resolved += 1;
                report.relabeled += merge_mapping(draft, &group, &mapping);
            }
            Err(err) => {
                tracing::warn!(
                    group = group.id,
                    context = %group.context,
                    fallback = %group.label,
                    attempts,
                    error = %err,
                    "escalation failed, keeping automatic label"
                );
                report.incidents.push(incident(&group, attempts, err.to_string()));
            }
        }
    }

    if report.relabeled > 0 {
        draft.dictionary.enforce_fixed_points();
    }
    tracing::info!(
        escalated = report.escalated,
        resolved = report.resolved,
        relabeled = report.relabeled,
        incidents = report.incidents.len(),
        "escalation done"
    );
    report
}

fn incident(group: &LabeledGroup, attempts: u32, error: String) -> EscalationIncident {
    EscalationIncident {
        group: group.id,
        context: group.context.clone(),
        fallback_label: group.label.clone(),
        members: group.members.len(),
        attempts,
        error,
        at: Utc::now(),
    }
}

/// Apply the service's labels to the raw phrases of `group`. Members the
/// mapping omits, and labels that normalize to nothing, keep the automatic
/// label.
fn merge_mapping(draft: &mut DictionaryDraft, group: &LabeledGroup, mapping: &LabelMapping) -> usize {
    let answers: BTreeMap<String, String> = mapping
        .iter()
        .map(|(phrase, label)| (normalize(phrase), normalize(label)))
        .filter(|(phrase, label)| !phrase.is_empty() && !label.is_empty())
        .collect();

    let mut changed = 0;
    for member in &group.members {
        let Some(label) = answers.get(member) else {
            tracing::debug!(group = group.id, member = %member, "member missing from answer");
            continue;
        };
        let raws = draft.raw_forms.get(member).cloned().unwrap_or_default();
        for raw in raws {
            let previous = draft.dictionary.insert(&raw, label.clone());
            if previous.as_deref() != Some(label.as_str()) {
                changed += 1;
            }
        }
    }
    changed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::DictionaryBuilder;
    use crate::corpus::{Corpus, RawPhrase};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;
    use taskcanon_cluster::{Admission, Group, GroupKey, GroupingPolicy, Stage};
    use taskcanon_labeling::{
        EscalationPolicy, LabelingError, TaskId, TaskSnapshot, TaskStatus, DEFAULT_RESERVED_TOKENS,
    };

    struct Answering {
        submits: AtomicU32,
        answer: Option<&'static str>,
    }

    #[async_trait]
    impl LabelingService for Answering {
        async fn submit(&self, _prompt: &str) -> Result<TaskId, LabelingError> {
            let n = self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(TaskId(n.to_string()))
        }

        async fn poll(&self, _task: &TaskId) -> Result<TaskSnapshot, LabelingError> {
            Ok(match self.answer {
                Some(text) => TaskSnapshot::completed(text),
                None => TaskSnapshot::pending(TaskStatus::Processing),
            })
        }
    }

    fn draft() -> DictionaryDraft {
        let corpus = Corpus::from_records(
            ["HIGIENIZAR CABINE", "higienizacao cabine", "xpto abc", "xpto abd"]
                .iter()
                .enumerate()
                .map(|(i, p)| RawPhrase::new(*p, i.to_string())),
        );
        let groups = vec![
            Group::from_members(
                vec!["higienizacao cabine".into(), "higienizar cabine".into()],
                Admission::MaxDistance(4),
                Stage::Refined,
                GroupingPolicy::CenterFixed,
                GroupKey::Object,
            )
            .unwrap(),
            Group::from_members(
                vec!["xpto abc".into(), "xpto abd".into()],
                Admission::MaxDistance(4),
                Stage::Refined,
                GroupingPolicy::CenterFixed,
                GroupKey::Object,
            )
            .unwrap(),
        ];
        DictionaryBuilder::default().build(&corpus, &groups)
    }

    fn policy() -> EscalationPolicy {
        EscalationPolicy {
            poll_interval: Duration::from_secs(1),
            max_attempts: 2,
            backoff: taskcanon_labeling::Backoff::Fixed(Duration::from_secs(1)),
            timeout: Some(Duration::from_secs(20)),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn answers_relabel_members() {
        let mut draft = draft();
        assert_eq!(draft.ambiguous().count(), 1);
        let escalator = Escalator::new(
            Answering {
                submits: AtomicU32::new(0),
                answer: Some(r#"{"XPTO ABC": "xpto abd", "xpto abd": "xpto abd"}"#),
            },
            policy(),
        );

        let report = escalate_groups(&mut draft, &escalator, DEFAULT_RESERVED_TOKENS, &CancelSignal::never()).await;
        assert_eq!(report.escalated, 1);
        assert_eq!(report.resolved, 1);
        assert_eq!(report.relabeled, 1);
        assert!(report.incidents.is_empty());
        assert_eq!(draft.dictionary.lookup("xpto abc"), Some("xpto abd"));
        assert_eq!(draft.dictionary.lookup("higienizacao cabine"), Some("higienizar cabine"));
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_keeps_fallback_and_reports_once() {
        let mut draft = draft();
        let before = draft.dictionary.clone();
        let escalator = Escalator::new(
            Answering {
                submits: AtomicU32::new(0),
                answer: None,
            },
            policy(),
        );

        let report = escalate_groups(&mut draft, &escalator, DEFAULT_RESERVED_TOKENS, &CancelSignal::never()).await;
        assert_eq!(report.incidents.len(), 1);
        let incident = &report.incidents[0];
        assert_eq!(incident.group, 2);
        assert_eq!(incident.fallback_label, "xpto abc");
        assert_eq!(incident.members, 2);
        assert!(incident.error.contains("deadline"));
        assert_eq!(draft.dictionary, before);
    }
}
