//! Static loan-lifecycle stage vocabulary.
//!
//! Several A-CAT sub-codes collapse onto the same display label on
//! purpose; the UI shows them as one status.

pub struct Stage {
    pub key: &'static str,
    pub name: &'static str,
    pub statuses: &'static [(&'static str, &'static str)],
}

pub const STAGES: &[Stage] = &[
    Stage {
        key: "new",
        name: "New",
        statuses: &[("new", "New")],
    },
    Stage {
        key: "screening",
        name: "Screening",
        statuses: &[
            ("screening_new", "Screening New"),
            ("screening_inprogress", "Screening In progress"),
            ("eligible", "Eligible"),
            ("screening_approved", "Eligible"),
        ],
    },
    Stage {
        key: "loanApplication",
        name: "Loan Application",
        statuses: &[
            ("loan_application_new", "Loan Application New"),
            ("loan_application_inprogress", "Loan Application In Progress"),
            ("loan_application_accepted", "Loan Application Accepted"),
        ],
    },
    Stage {
        key: "acat",
        name: "A-CAT",
        statuses: &[
            ("ACAT new", "A-CAT New"),
            ("ACAT-Submitted", "A-CAT In Progress"),
            ("ACAT-Declined-For-Review", "A-CAT In Progress"),
            ("ACAT-Resubmitted", "A-CAT In Progress"),
            ("ACAT_IN_PROGRESS", "A-CAT In Progress"),
            ("ACAT-AUTHORIZED", "A-CAT Authorized"),
        ],
    },
    Stage {
        key: "loanGranted",
        name: "Loan Granted",
        statuses: &[("loan_granted", "Loan Granted")],
    },
    Stage {
        key: "loanPaid",
        name: "Loan Paid",
        statuses: &[("loan_paid", "Loan Paid")],
    },
    Stage {
        key: "declined",
        name: "Declined",
        statuses: &[
            ("ineligible", "Ineligible"),
            ("loan_application_rejected", "Loan Application Rejected"),
        ],
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageInfo {
    pub stage: &'static str,
    pub label: &'static str,
}

/// Maps a client status code to its stage and display label.
/// Unknown codes are unclassified.
pub fn stage_of(status_code: &str) -> Option<StageInfo> {
    for stage in STAGES {
        for (code, label) in stage.statuses {
            if *code == status_code {
                return Some(StageInfo {
                    stage: stage.name,
                    label,
                });
            }
        }
    }
    None
}

/// Accepted status codes for a stage key, e.g. `"acat"`.
pub fn status_codes_of(stage_key: &str) -> &'static [(&'static str, &'static str)] {
    STAGES
        .iter()
        .find(|stage| stage.key == stage_key)
        .map(|stage| stage.statuses)
        .unwrap_or(&[])
}

pub fn is_stage_key(stage_key: &str) -> bool {
    STAGES.iter().any(|stage| stage.key == stage_key)
}

#[cfg(test)]
mod tests {
    use super::{stage_of, status_codes_of, STAGES};

    #[test]
    fn eligible_maps_to_screening() {
        let info = stage_of("eligible").expect("eligible is classified");
        assert_eq!(info.stage, "Screening");
        assert_eq!(info.label, "Eligible");
    }

    #[test]
    fn acat_stage_lists_all_sub_codes() {
        let codes: Vec<&str> = status_codes_of("acat").iter().map(|(code, _)| *code).collect();
        assert_eq!(
            codes,
            vec![
                "ACAT new",
                "ACAT-Submitted",
                "ACAT-Declined-For-Review",
                "ACAT-Resubmitted",
                "ACAT_IN_PROGRESS",
                "ACAT-AUTHORIZED",
            ]
        );
        assert!(codes.contains(&"ACAT-AUTHORIZED"));
    }

    #[test]
    fn every_listed_code_is_classified() {
        for stage in STAGES {
            for (code, _) in stage.statuses {
                let info = stage_of(code).unwrap_or_else(|| panic!("unclassified code {code}"));
                assert_eq!(info.stage, stage.name);
            }
        }
    }

    #[test]
    fn unknown_codes_are_unclassified() {
        assert!(stage_of("quarantined").is_none());
        assert!(status_codes_of("underwriting").is_empty());
    }

    #[test]
    fn collapsed_labels_share_display_text() {
        assert_eq!(stage_of("ACAT-Submitted").unwrap().label, "A-CAT In Progress");
        assert_eq!(stage_of("ACAT-Resubmitted").unwrap().label, "A-CAT In Progress");
        assert_eq!(stage_of("screening_approved").unwrap().label, "Eligible");
    }
}
