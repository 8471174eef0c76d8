//! Server-rendered HTML pages.

use crate::plan::TreatmentPlanEntry;
use crate::workflow::PlanOutcome;

const STYLE: &str = r#"<style>
*,*::before,*::after{box-sizing:border-box}
body{margin:0;font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:#f8fafc;color:#0f172a;padding:24px}
main{max-width:880px;margin:0 auto}
h1{font-size:1.5rem;margin:0 0 16px}
h2{font-size:1.1rem;margin:24px 0 8px}
.card{background:#fff;border-radius:12px;box-shadow:0 2px 12px rgba(0,0,0,.06);padding:20px;margin-bottom:16px}
pre{white-space:pre-wrap;font-size:.85rem;background:#f1f5f9;border-radius:8px;padding:12px}
.error{background:#fef2f2;border:1px solid #fecaca;color:#991b1b;border-radius:8px;padding:12px}
.muted{color:#64748b}
.code{font-family:monospace;font-size:.75rem;color:#94a3b8}
button{background:#0d9488;color:#fff;border:none;border-radius:8px;padding:10px 16px;font-weight:600;cursor:pointer}
select{padding:8px;border-radius:8px;border:1px solid #cbd5e1;min-width:240px}
</style>"#;

/// Escape text for HTML element content and quoted attributes.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

fn layout(title: &str, body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<meta name="viewport" content="width=device-width, initial-scale=1">
<title>{title}</title>
{STYLE}
</head>
<body>
<main>
{body}
</main>
</body>
</html>"#,
        title = escape_html(title),
    )
}

fn patient_form(patients: &[String], selected: Option<&str>) -> String {
    if patients.is_empty() {
        return r#"<p class="muted">No patient records found.</p>"#.to_string();
    }

    let options: String = patients
        .iter()
        .map(|id| {
            let marker = if Some(id.as_str()) == selected { " selected" } else { "" };
            let id = escape_html(id);
            format!(r#"<option value="{id}"{marker}>{id}</option>"#)
        })
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"<form method="post" action="/generate-plan">
<label for="patient_id">Patient</label>
<select id="patient_id" name="patient_id">
{options}
</select>
<button type="submit">Generate treatment plan</button>
</form>"#
    )
}

fn plan_section(plan: &[TreatmentPlanEntry]) -> String {
    if plan.is_empty() {
        return r#"<p class="muted">No treatment plan was generated.</p>"#.to_string();
    }

    plan.iter()
        .map(|entry| {
            let details: String = entry
                .details
                .iter()
                .map(|d| format!("<li>{}</li>", escape_html(d)))
                .collect();
            format!(
                "<h3>{}</h3>\n<ul>{details}</ul>",
                escape_html(&entry.condition)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Landing page: patient picker.
pub fn render_index_page(patients: &[String]) -> String {
    let body = format!(
        r#"<h1>{app} clinical assistant</h1>
<div class="card">
{form}
</div>"#,
        app = crate::config::APP_NAME,
        form = patient_form(patients, None),
    );
    layout("Clinical assistant", &body)
}

/// Plan result page: picker, patient record, plan and download form.
pub fn render_plan_page(patients: &[String], outcome: &PlanOutcome) -> String {
    let error = outcome
        .error
        .as_deref()
        .map(|e| format!(r#"<div class="error">{}</div>"#, escape_html(e)))
        .unwrap_or_default();

    let download = outcome
        .plan_location
        .as_ref()
        .map(|location| {
            format!(
                r#"<form method="post" action="/generate-education-material">
<input type="hidden" name="plan_file_path" value="{path}">
<button type="submit">Download patient education PDF</button>
</form>"#,
                path = escape_html(&location.to_string_lossy()),
            )
        })
        .unwrap_or_default();

    let body = format!(
        r#"<h1>{app} clinical assistant</h1>
<div class="card">
{form}
</div>
{error}
<div class="card">
<h2>Patient {patient}</h2>
<pre>{info}</pre>
</div>
<div class="card">
<h2>Preliminary treatment plan</h2>
{plan}
{download}
</div>"#,
        app = crate::config::APP_NAME,
        form = patient_form(patients, Some(&outcome.patient_id)),
        patient = escape_html(&outcome.patient_id),
        info = escape_html(&outcome.patient_info),
        plan = plan_section(&outcome.plan),
    );
    layout("Treatment plan", &body)
}

pub fn render_error_page(code: &str, message: &str) -> String {
    let body = format!(
        r#"<div class="card">
<h1>Something went wrong</h1>
<div class="error">{message}</div>
<p class="code">{code}</p>
<p><a href="/">Back to patients</a></p>
</div>"#,
        message = escape_html(message),
        code = escape_html(code),
    );
    layout("Error", &body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn outcome() -> PlanOutcome {
        PlanOutcome {
            patient_id: "p1".into(),
            patient_info: "Conditions: Gout (disorder)".into(),
            plan: vec![TreatmentPlanEntry {
                condition: "Gout".into(),
                details: vec!["Hydrate & rest".into()],
            }],
            plan_location: Some(PathBuf::from("/data/tmp/p1_1700000000_plan.json")),
            error: None,
        }
    }

    #[test]
    fn escape_covers_markup_and_quotes() {
        assert_eq!(
            escape_html(r#"<a href="x">'&'</a>"#),
            "&lt;a href=&quot;x&quot;&gt;&#39;&amp;&#39;&lt;/a&gt;"
        );
    }

    #[test]
    fn index_lists_patients() {
        let html = render_index_page(&["p1".into(), "p2".into()]);
        assert!(html.contains(r#"<option value="p1">p1</option>"#));
        assert!(html.contains(r#"action="/generate-plan""#));
    }

    #[test]
    fn index_without_patients() {
        assert!(render_index_page(&[]).contains("No patient records found."));
    }

    #[test]
    fn plan_page_shows_plan_and_download() {
        let html = render_plan_page(&["p1".into()], &outcome());
        assert!(html.contains("<h3>Gout</h3>"));
        assert!(html.contains("<li>Hydrate &amp; rest</li>"));
        assert!(html.contains(r#"value="/data/tmp/p1_1700000000_plan.json""#));
        assert!(html.contains(r#"<option value="p1" selected>"#));
        assert!(!html.contains(r#"class="error""#));
    }

    #[test]
    fn plan_page_shows_error_without_download() {
        let mut failed = outcome();
        failed.plan.clear();
        failed.plan_location = None;
        failed.error = Some("Could not connect to the RAG service.".into());

        let html = render_plan_page(&["p1".into()], &failed);
        assert!(html.contains("Could not connect to the RAG service."));
        assert!(html.contains("No treatment plan was generated."));
        assert!(!html.contains("plan_file_path"));
        assert!(html.contains("Conditions: Gout (disorder)"));
    }
}
