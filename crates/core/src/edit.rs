//! Clinician edits to a generated report.
//!
//! Only the patient name, diagnosis and treatment plan are editable. The plan arrives as one
//! block of text with an item per line, the way a multi-line text field hands it over.

use crate::report::MedicalReport;
use serde::{Deserialize, Serialize};

/// An edit as typed by the clinician.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEdit {
    pub patient_name: String,
    pub diagnosis: String,
    /// Newline-delimited treatment plan.
    pub plan_text: String,
}

impl ReportEdit {
    pub fn new(
        patient_name: impl Into<String>,
        diagnosis: impl Into<String>,
        plan_text: impl Into<String>,
    ) -> Self {
        Self {
            patient_name: patient_name.into(),
            diagnosis: diagnosis.into(),
            plan_text: plan_text.into(),
        }
    }

    /// Pre-fills an edit with the report's current values.
    pub fn from_report(report: &MedicalReport) -> Self {
        Self {
            patient_name: report.patient_name.clone(),
            diagnosis: report.diagnosis.clone(),
            plan_text: report.treatment_plan.join("\n"),
        }
    }
}

/// Splits plan text into trimmed, non-empty lines in their original order.
pub fn split_plan_lines(plan_text: &str) -> Vec<String> {
    plan_text
        .split('\n')
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

/// Returns a copy of `report` with the edited fields replaced.
pub fn apply_edit(report: &MedicalReport, edit: &ReportEdit) -> MedicalReport {
    MedicalReport {
        patient_name: edit.patient_name.clone(),
        diagnosis: edit.diagnosis.clone(),
        treatment_plan: split_plan_lines(&edit.plan_text),
        ..report.clone()
    }
}
