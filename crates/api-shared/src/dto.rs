//! Request and response bodies of the REST API.
//!
//! Field names are camelCase on the wire, matching the report JSON.

use scribe_core::{DisplayedReport, GenerationOutcome, HistoryItem, MedicalReport, ReportEdit};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct HealthRes {
    pub ok: bool,
    pub message: String,
}

/// Schema mirror of [`MedicalReport`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReportBody {
    pub patient_name: String,
    pub symptoms: Vec<String>,
    pub vitals: BTreeMap<String, String>,
    pub diagnosis: String,
    pub icd10_code: String,
    pub treatment_plan: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_evidence: Option<String>,
    pub risk_score: u8,
}

impl From<MedicalReport> for MedicalReportBody {
    fn from(r: MedicalReport) -> Self {
        Self {
            patient_name: r.patient_name,
            symptoms: r.symptoms,
            vitals: r.vitals,
            diagnosis: r.diagnosis,
            icd10_code: r.icd10_code,
            treatment_plan: r.treatment_plan,
            safety_warning: r.safety_warning,
            visual_evidence: r.visual_evidence,
            risk_score: r.risk_score,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportReq {
    pub dictation: String,
    /// Switches the session's target language before generating.
    #[serde(default)]
    pub language: Option<String>,
}

/// A report as displayed, with its history link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReportRes {
    pub report: MedicalReportBody,
    pub history_id: Option<i64>,
}

impl From<DisplayedReport> for ReportRes {
    fn from(d: DisplayedReport) -> Self {
        Self {
            report: d.report.into(),
            history_id: d.history_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct GenerateReportRes {
    pub report: MedicalReportBody,
    pub history_id: Option<i64>,
    /// False when the model output could not be parsed and the fallback record was returned.
    pub parsed: bool,
}

impl From<GenerationOutcome> for GenerateReportRes {
    fn from(outcome: GenerationOutcome) -> Self {
        let parsed = outcome.is_structured();
        let displayed = match outcome {
            GenerationOutcome::Structured(d) | GenerationOutcome::Fallback(d) => d,
        };
        Self {
            report: displayed.report.into(),
            history_id: displayed.history_id,
            parsed,
        }
    }
}

/// History list entry without the payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: i64,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub patient_name: String,
    pub diagnosis: String,
}

impl From<&HistoryItem> for HistoryEntry {
    fn from(item: &HistoryItem) -> Self {
        Self {
            id: item.id,
            timestamp: item.timestamp,
            patient_name: item.patient_name.clone(),
            diagnosis: item.diagnosis.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListHistoryRes {
    pub items: Vec<HistoryEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct HistoryDetailRes {
    #[serde(flatten)]
    pub entry: HistoryEntry,
    pub report: MedicalReportBody,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ClearHistoryRes {
    pub removed: usize,
}

/// Clinician edit of a stored report.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportReq {
    pub patient_name: String,
    pub diagnosis: String,
    /// Newline-separated treatment plan; blank lines are dropped.
    pub plan: String,
}

impl From<UpdateReportReq> for ReportEdit {
    fn from(req: UpdateReportReq) -> Self {
        ReportEdit::new(req.patient_name, req.diagnosis, req.plan)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateReportRes {
    pub report: ReportRes,
    pub saved_to_history: bool,
}
