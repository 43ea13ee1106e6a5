//! The structured medical report produced from a dictation.
//!
//! The JSON shape of [`MedicalReport`] is both what the model is asked to emit and the payload
//! stored in every history row, so the serde attributes here define the only data format the
//! workspace has.

use crate::constants::{
    DEFAULT_BILLING_CODE, FALLBACK_DIAGNOSIS, FALLBACK_PATIENT_NAME, MAX_RISK_SCORE,
};
use crate::error::{ScribeError, ScribeResult};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;

/// Structured output of transcribing a dictation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MedicalReport {
    pub patient_name: String,
    pub symptoms: Vec<String>,
    #[serde(deserialize_with = "deserialize_vitals")]
    pub vitals: BTreeMap<String, String>,
    pub diagnosis: String,
    /// ICD-10 billing code.
    #[serde(default = "default_billing_code")]
    pub icd10_code: String,
    pub treatment_plan: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub safety_warning: Option<String>,
    /// Reference to supporting evidence (image, scan, document).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_evidence: Option<String>,
    /// 0 to 100.
    #[serde(default)]
    pub risk_score: u8,
}

fn default_billing_code() -> String {
    DEFAULT_BILLING_CODE.to_string()
}

/// Models are inconsistent about quoting vitals (`"heartRate": 88` vs `"88"`), so scalar values
/// are accepted and kept in their text form.
fn deserialize_vitals<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = BTreeMap::<String, serde_json::Value>::deserialize(deserializer)?;
    raw.into_iter()
        .map(|(key, value)| {
            let text = match value {
                serde_json::Value::String(s) => s,
                serde_json::Value::Number(n) => n.to_string(),
                serde_json::Value::Bool(b) => b.to_string(),
                other => {
                    return Err(<D::Error as serde::de::Error>::custom(format!(
                        "vital '{key}' must be a string, number or boolean, got {other}"
                    )))
                }
            };
            Ok((key, text))
        })
        .collect()
}

impl MedicalReport {
    /// Creates a report with the required fields and defaults for everything else.
    pub fn new(
        patient_name: impl Into<String>,
        symptoms: Vec<String>,
        vitals: BTreeMap<String, String>,
        diagnosis: impl Into<String>,
        treatment_plan: Vec<String>,
    ) -> Self {
        Self {
            patient_name: patient_name.into(),
            symptoms,
            vitals,
            diagnosis: diagnosis.into(),
            icd10_code: default_billing_code(),
            treatment_plan,
            safety_warning: None,
            visual_evidence: None,
            risk_score: 0,
        }
    }

    /// The sentinel record substituted when model output cannot be parsed.
    ///
    /// The raw output is kept verbatim as the only treatment plan entry so nothing the model
    /// produced is lost.
    pub fn fallback(raw_output: impl Into<String>) -> Self {
        Self::new(
            FALLBACK_PATIENT_NAME,
            Vec::new(),
            BTreeMap::new(),
            FALLBACK_DIAGNOSIS,
            vec![raw_output.into()],
        )
    }

    /// Returns true if this is the parse-failure sentinel.
    pub fn is_fallback(&self) -> bool {
        self.patient_name == FALLBACK_PATIENT_NAME && self.diagnosis == FALLBACK_DIAGNOSIS
    }

    /// Checks invariants serde cannot express.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::InvalidReport` if the risk score exceeds 100.
    pub fn validate(&self) -> ScribeResult<()> {
        if self.risk_score > MAX_RISK_SCORE {
            return Err(ScribeError::InvalidReport(format!(
                "risk score {} is outside 0..={}",
                self.risk_score, MAX_RISK_SCORE
            )));
        }
        Ok(())
    }

    /// Serialises the report to its compact JSON payload.
    pub fn to_json(&self) -> ScribeResult<String> {
        serde_json::to_string(self).map_err(ScribeError::Serialization)
    }

    /// Decodes and validates a report from JSON.
    ///
    /// Unknown keys are ignored; missing optional keys take their defaults.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::Deserialization` if the text is not a report, or
    /// `ScribeError::InvalidReport` if it decodes but breaks an invariant.
    pub fn from_json(text: &str) -> ScribeResult<Self> {
        let report: Self = serde_json::from_str(text).map_err(ScribeError::Deserialization)?;
        report.validate()?;
        Ok(report)
    }
}
