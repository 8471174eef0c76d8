use crate::plan::TreatmentPlanEntry;

/// Prompt turning a clinician-facing plan into a patient explanation.
/// `{treatment_plan}` is replaced with [`format_plan_for_prompt`] output.
pub const PATIENT_EDUCATION_PROMPT: &str = r#"
You are a compassionate healthcare assistant explaining a preliminary treatment plan to a patient.
Be clear, reassuring and easy to understand. Avoid complex medical jargon.

Using the treatment plan below, write a simple explanation for the patient, one paragraph at a time.

**Treatment Plan Data:**
{treatment_plan}

**Instructions:**
1.  Open with a friendly, reassuring introduction.
2.  For each condition, explain in simple terms what it is.
3.  Explain the suggested treatment and why it is recommended.
4.  Keep a positive and supportive tone throughout.
5.  Finish with a patient-friendly version of the disclaimer that this plan is preliminary and does not replace advice from their doctor.

Write the explanation now.
"#;

/// Plan as an indented bullet list:
/// `- Condition: X` followed by `  - Details: a` and `  - b`.
pub fn format_plan_for_prompt(plan: &[TreatmentPlanEntry]) -> String {
    let mut out = String::new();
    for entry in plan {
        let details = if entry.details.is_empty() {
            "No details.".to_string()
        } else {
            entry.details.join("\n  - ")
        };
        out.push_str(&format!(
            "- Condition: {}\n  - Details: {details}\n",
            entry.condition
        ));
    }
    out
}

pub fn build_education_prompt(plan: &[TreatmentPlanEntry]) -> String {
    PATIENT_EDUCATION_PROMPT.replace("{treatment_plan}", &format_plan_for_prompt(plan))
}
