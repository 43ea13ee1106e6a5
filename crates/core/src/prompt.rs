//! Instruction template sent to the inference engine.

/// Builds the scribe prompt for one dictation.
///
/// The template pins the exact key set of [`crate::MedicalReport`] and forbids markdown, which
/// keeps most responses decodable without any post-processing beyond fence stripping.
pub fn build_prompt(dictation: &str, target_language: &str) -> String {
    format!(
        r#"You are a medical scribe. Convert this doctor's dictation into a JSON format.
Dictation: "{dictation}"

Write every text value in {target_language}.
Return ONLY valid JSON with these keys:
patientName (string), symptoms (list of strings), vitals (object of string values, e.g. heartRate, temperature, spO2),
diagnosis (string), icd10Code (string), treatmentPlan (list of strings),
safetyWarning (string or null), visualEvidence (string or null), riskScore (int from 0 to 100).
Do not add markdown formatting."#
    )
}
