//! Gate evaluator
//!
//! Pure projection of [`GateSignals`] onto the pipeline stages. Every
//! `completed`/`current`/`blocked` flag the portal shows is derived here and
//! nowhere else.
//!
//! **Precedence:** documents → biometrics → payment → review → decision.
//! A later stage never becomes current while an earlier gate is open, no
//! matter which order the external signals arrived in.

use crate::models::{
    default_stages, AvailableActions, DerivedStageView, GateSignals, PipelineSnapshot, Stage,
    StageId,
};

/// Gate state computed once per evaluation
#[derive(Debug, Clone, Copy)]
struct Gates {
    documents_satisfied: bool,
    biometrics_satisfied: bool,
    payment_satisfied: bool,
    decided: bool,
    documents_blocked: bool,
    biometrics_blocked: bool,
    payment_blocked: bool,
}

impl Gates {
    fn from_signals(signals: &GateSignals) -> Self {
        let documents_satisfied = signals.documents_satisfied();
        let biometrics_satisfied = documents_satisfied && signals.biometric_done;
        let payment_satisfied = biometrics_satisfied && signals.payment_done;

        let documents_blocked = !documents_satisfied;
        let biometrics_blocked = !documents_blocked && !signals.biometric_done;
        let payment_blocked = !documents_blocked && !biometrics_blocked && !signals.payment_done;

        Self {
            documents_satisfied,
            biometrics_satisfied,
            payment_satisfied,
            decided: signals.backend_status.is_terminal(),
            documents_blocked,
            biometrics_blocked,
            payment_blocked,
        }
    }

    fn completed(&self, id: StageId) -> bool {
        match id {
            StageId::Submitted => true,
            StageId::DocumentCollection => self.documents_satisfied,
            StageId::BiometricCollection => self.biometrics_satisfied,
            StageId::Payment => self.payment_satisfied,
            StageId::OfficerReview => self.payment_satisfied && self.decided,
            StageId::Decision => self.decided,
        }
    }

    fn blocked(&self, id: StageId) -> bool {
        match id {
            StageId::DocumentCollection => self.documents_blocked,
            StageId::BiometricCollection => self.biometrics_blocked,
            StageId::Payment => self.payment_blocked,
            StageId::Submitted | StageId::OfficerReview | StageId::Decision => false,
        }
    }
}

/// Evaluate the fixed six-stage pipeline
pub fn evaluate(signals: &GateSignals) -> PipelineSnapshot {
    evaluate_stages(&default_stages(), signals)
}

/// Evaluate a caller-supplied stage list
///
/// Stages are sorted by `order` first. The current stage is the first one
/// not completed; `blocked` is only ever set on the current stage.
pub fn evaluate_stages(stages: &[Stage], signals: &GateSignals) -> PipelineSnapshot {
    let gates = Gates::from_signals(signals);

    let mut ordered: Vec<Stage> = stages.to_vec();
    ordered.sort_by_key(|stage| stage.order);

    let mut current_assigned = false;
    let views: Vec<DerivedStageView> = ordered
        .into_iter()
        .map(|stage| {
            let completed = gates.completed(stage.id);
            let current = !completed && !current_assigned;
            current_assigned |= current;
            let blocked = current && gates.blocked(stage.id);
            DerivedStageView {
                stage,
                completed,
                current,
                blocked,
            }
        })
        .collect();

    let total_stages = views.len();
    let completed_count = views.iter().filter(|view| view.completed).count();
    let progress_percent = if total_stages == 0 {
        0
    } else {
        ((completed_count * 100 + total_stages / 2) / total_stages) as u8
    };

    let is_blocked = |id: StageId| views.iter().any(|view| view.stage.id == id && view.blocked);
    let actions = AvailableActions {
        upload_documents: is_blocked(StageId::DocumentCollection),
        capture_biometrics: is_blocked(StageId::BiometricCollection),
        make_payment: is_blocked(StageId::Payment),
    };

    PipelineSnapshot {
        stages: views,
        completed_count,
        total_stages,
        progress_percent,
        actions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use legatio_common::ApplicationStatus;

    fn signals(
        required: usize,
        uploaded: usize,
        biometric_done: bool,
        payment_done: bool,
        backend_status: ApplicationStatus,
    ) -> GateSignals {
        GateSignals {
            mandatory_docs_required: required,
            mandatory_docs_uploaded: uploaded,
            biometric_done,
            payment_done,
            backend_status,
        }
    }

    fn flags(snapshot: &PipelineSnapshot, id: StageId) -> (bool, bool, bool) {
        let view = snapshot.view(id).unwrap();
        (view.completed, view.current, view.blocked)
    }

    #[test]
    fn test_evaluation_is_idempotent() {
        let input = signals(3, 2, true, false, ApplicationStatus::DocumentReview);
        let first = evaluate(&input);
        let second = evaluate(&input);
        assert_eq!(first, second);
    }

    #[test]
    fn test_documents_gate_takes_precedence() {
        let snapshot = evaluate(&signals(3, 1, true, true, ApplicationStatus::Submitted));

        assert_eq!(flags(&snapshot, StageId::DocumentCollection), (false, true, true));
        for later in [
            StageId::BiometricCollection,
            StageId::Payment,
            StageId::OfficerReview,
            StageId::Decision,
        ] {
            let view = snapshot.view(later).unwrap();
            assert!(!view.current, "{} must not be current", later);
            assert!(!view.blocked);
        }
        assert!(snapshot.actions.upload_documents);
        assert!(!snapshot.actions.capture_biometrics);
        assert!(!snapshot.actions.make_payment);
    }

    #[test]
    fn test_officer_review_current_once_gates_satisfied() {
        let snapshot = evaluate(&signals(2, 2, true, true, ApplicationStatus::OfficerReview));

        for done in [
            StageId::Submitted,
            StageId::DocumentCollection,
            StageId::BiometricCollection,
            StageId::Payment,
        ] {
            assert!(snapshot.view(done).unwrap().completed, "{} should be completed", done);
        }
        assert_eq!(flags(&snapshot, StageId::OfficerReview), (false, true, false));
        assert_eq!(flags(&snapshot, StageId::Decision), (false, false, false));
        assert_eq!(snapshot.actions, AvailableActions::default());
    }

    #[test]
    fn test_two_of_six_reports_33_percent() {
        let snapshot = evaluate(&signals(3, 3, false, false, ApplicationStatus::Submitted));
        assert_eq!(snapshot.completed_count, 2);
        assert_eq!(snapshot.total_stages, 6);
        assert_eq!(snapshot.progress_percent, 33);
    }

    #[test]
    fn test_three_of_six_reports_50_percent() {
        let snapshot = evaluate(&signals(1, 1, true, false, ApplicationStatus::Submitted));
        assert_eq!(snapshot.completed_count, 3);
        assert_eq!(snapshot.progress_percent, 50);
    }

    #[test]
    fn test_no_required_documents_unblocks_collection() {
        let snapshot = evaluate(&signals(0, 0, false, false, ApplicationStatus::Submitted));
        assert_eq!(flags(&snapshot, StageId::DocumentCollection), (true, false, false));
        assert_eq!(flags(&snapshot, StageId::BiometricCollection), (false, true, true));
        assert!(snapshot.actions.capture_biometrics);
    }

    #[test]
    fn test_payment_blocked_after_biometrics() {
        let snapshot = evaluate(&signals(2, 2, true, false, ApplicationStatus::BackgroundCheck));
        assert_eq!(flags(&snapshot, StageId::Payment), (false, true, true));
        assert!(snapshot.actions.make_payment);
    }

    #[test]
    fn test_payment_before_biometrics_does_not_skip_ahead() {
        let snapshot = evaluate(&signals(2, 2, false, true, ApplicationStatus::OfficerReview));
        assert_eq!(flags(&snapshot, StageId::BiometricCollection), (false, true, true));
        assert!(!snapshot.view(StageId::Payment).unwrap().completed);
        assert!(!snapshot.view(StageId::OfficerReview).unwrap().current);
    }

    #[test]
    fn test_decided_application_is_fully_complete() {
        let snapshot = evaluate(&signals(2, 2, true, true, ApplicationStatus::Approved));
        assert!(snapshot.is_complete());
        assert!(snapshot.current_stage().is_none());
        assert_eq!(snapshot.progress_percent, 100);
    }

    #[test]
    fn test_decision_without_gates_keeps_documents_current() {
        let snapshot = evaluate(&signals(2, 0, false, false, ApplicationStatus::Rejected));
        assert!(snapshot.view(StageId::Decision).unwrap().completed);
        assert!(!snapshot.view(StageId::OfficerReview).unwrap().completed);
        assert_eq!(
            snapshot.current_stage().map(|view| view.stage.id),
            Some(StageId::DocumentCollection)
        );
    }

    #[test]
    fn test_at_most_one_current_and_blocked_implies_current() {
        let statuses = [
            ApplicationStatus::Submitted,
            ApplicationStatus::DocumentReview,
            ApplicationStatus::BackgroundCheck,
            ApplicationStatus::OfficerReview,
            ApplicationStatus::Approved,
            ApplicationStatus::Rejected,
        ];
        for status in statuses {
            for uploaded in 0..=3 {
                for biometric_done in [false, true] {
                    for payment_done in [false, true] {
                        let snapshot =
                            evaluate(&signals(2, uploaded, biometric_done, payment_done, status));
                        let current = snapshot.stages.iter().filter(|v| v.current).count();
                        assert!(current <= 1);
                        assert!(snapshot.stages.iter().all(|v| !v.blocked || v.current));
                        assert!(snapshot.stages.iter().all(|v| !(v.completed && v.current)));
                    }
                }
            }
        }
    }

    #[test]
    fn test_custom_stage_list_is_sorted_and_counted() {
        let mut stages: Vec<Stage> = default_stages()
            .into_iter()
            .filter(|stage| stage.id != StageId::Payment)
            .collect();
        stages.reverse();

        let snapshot =
            evaluate_stages(&stages, &signals(1, 1, true, false, ApplicationStatus::Approved));
        let ids: Vec<StageId> = snapshot.stages.iter().map(|v| v.stage.id).collect();
        assert_eq!(
            ids,
            vec![
                StageId::Submitted,
                StageId::DocumentCollection,
                StageId::BiometricCollection,
                StageId::OfficerReview,
                StageId::Decision,
            ]
        );
        assert_eq!(snapshot.total_stages, 5);
        assert!(snapshot.view(StageId::Payment).is_none());
        // Unpaid fee still holds back review even with the stage hidden
        assert_eq!(flags(&snapshot, StageId::OfficerReview), (false, true, false));
        assert!(snapshot.view(StageId::Decision).unwrap().completed);
        assert!(!snapshot.actions.make_payment);
    }

    #[test]
    fn test_empty_stage_list() {
        let snapshot = evaluate_stages(&[], &GateSignals::submitted(1));
        assert_eq!(snapshot.total_stages, 0);
        assert_eq!(snapshot.progress_percent, 0);
    }
}
