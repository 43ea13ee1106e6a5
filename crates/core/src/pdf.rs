//! PDF export of a report.
//!
//! Layout and pagination are computed as plain data first (`layout_report`, `paginate`) and only
//! then drawn with printpdf, so page breaks can be tested without parsing PDF output.

use crate::constants::PDF_FILENAME_PREFIX;
use crate::error::{ScribeError, ScribeResult};
use crate::report::MedicalReport;
use chrono::Utc;
use printpdf::{BuiltinFont, Color, IndirectFontRef, Mm, PdfDocument, Rgb};
use std::io::BufWriter;
use std::path::{Path, PathBuf};

/// A4 page size in millimetres.
pub const PAGE_WIDTH_MM: f32 = 210.0;
pub const PAGE_HEIGHT_MM: f32 = 297.0;

const MARGIN_LEFT_MM: f32 = 14.0;
const INDENT_LEFT_MM: f32 = 21.0;
const FIRST_LINE_Y_MM: f32 = PAGE_HEIGHT_MM - 21.0;
const BOTTOM_MARGIN_MM: f32 = 20.0;

const WRAP_COLUMNS: usize = 80;
const LINE_ADVANCE_MM: f32 = 7.0;
const SECTION_GAP_MM: f32 = 7.0;

/// Visual style of one line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineStyle {
    Title,
    Heading,
    Body,
    Diagnosis,
    BillingCode,
    Warning,
}

impl LineStyle {
    fn font_size(self) -> f32 {
        match self {
            LineStyle::Title => 22.0,
            LineStyle::Heading => 13.0,
            _ => 12.0,
        }
    }

    fn is_bold(self) -> bool {
        matches!(self, LineStyle::Title | LineStyle::Heading)
    }

    fn colour(self) -> Color {
        let (r, g, b) = match self {
            LineStyle::Title => (0.0, 0.0, 1.0),
            LineStyle::Diagnosis | LineStyle::Warning => (0.85, 0.0, 0.0),
            LineStyle::BillingCode => (0.18, 0.49, 0.2),
            LineStyle::Heading | LineStyle::Body => (0.0, 0.0, 0.0),
        };
        Color::Rgb(Rgb::new(r, g, b, None))
    }
}

/// One line of laid-out text and the vertical space it consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfLine {
    pub text: String,
    pub style: LineStyle,
    pub indented: bool,
    /// Distance to the next line's baseline, in millimetres.
    pub advance_mm: f32,
}

/// A line positioned on a page.
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedLine {
    pub line: PdfLine,
    pub y_mm: f32,
}

#[derive(Default)]
struct LayoutBuilder {
    lines: Vec<PdfLine>,
}

impl LayoutBuilder {
    fn line(&mut self, text: impl Into<String>, style: LineStyle, advance_mm: f32) {
        self.lines.push(PdfLine {
            text: text.into(),
            style,
            indented: false,
            advance_mm,
        });
    }

    fn item(&mut self, text: &str, style: LineStyle) {
        for wrapped in wrap_text(text, WRAP_COLUMNS) {
            self.lines.push(PdfLine {
                text: wrapped,
                style,
                indented: true,
                advance_mm: LINE_ADVANCE_MM,
            });
        }
    }

    fn section(&mut self, heading: &str, items: impl IntoIterator<Item = String>) {
        self.line(heading, LineStyle::Heading, 9.0);
        for item in items {
            self.item(&item, LineStyle::Body);
        }
        self.gap();
    }

    fn gap(&mut self) {
        if let Some(last) = self.lines.last_mut() {
            last.advance_mm += SECTION_GAP_MM;
        }
    }
}

/// Lays a report out as an ordered list of styled lines.
pub fn layout_report(report: &MedicalReport) -> Vec<PdfLine> {
    let mut b = LayoutBuilder::default();

    b.line("Medical Scribe Report", LineStyle::Title, 14.0);
    b.line(
        format!("Patient: {}", report.patient_name),
        LineStyle::Body,
        10.0,
    );
    b.line(
        format!("Diagnosis: {}", report.diagnosis),
        LineStyle::Diagnosis,
        9.0,
    );
    b.line(
        format!("Billing Code: {}", report.icd10_code),
        LineStyle::BillingCode,
        9.0,
    );
    b.line(
        format!("Risk Score: {}/100", report.risk_score),
        LineStyle::Body,
        LINE_ADVANCE_MM,
    );
    b.gap();

    if !report.symptoms.is_empty() {
        b.section(
            "Symptoms:",
            report.symptoms.iter().map(|s| format!("- {}", s)),
        );
    }

    b.section(
        "Vital Signs:",
        report.vitals.iter().map(|(k, v)| format!("- {}: {}", k, v)),
    );

    b.section(
        "Treatment Plan:",
        report.treatment_plan.iter().map(|p| format!("- {}", p)),
    );

    if let Some(warning) = &report.safety_warning {
        b.line("Safety Warning:", LineStyle::Heading, 9.0);
        b.item(warning, LineStyle::Warning);
        b.gap();
    }

    if let Some(evidence) = &report.visual_evidence {
        b.line("Evidence:", LineStyle::Heading, 9.0);
        b.item(evidence, LineStyle::Body);
    }

    b.lines
}

/// Assigns lines to A4 pages, starting a new page when a line would cross the bottom margin.
pub fn paginate(lines: &[PdfLine]) -> Vec<Vec<PlacedLine>> {
    let mut pages = vec![Vec::new()];
    let mut y = FIRST_LINE_Y_MM;

    for line in lines {
        if y < BOTTOM_MARGIN_MM {
            pages.push(Vec::new());
            y = FIRST_LINE_Y_MM;
        }
        if let Some(page) = pages.last_mut() {
            page.push(PlacedLine {
                line: line.clone(),
                y_mm: y,
            });
        }
        y -= line.advance_mm;
    }

    pages
}

/// Renders the report to PDF bytes.
pub fn render_report_pdf(report: &MedicalReport) -> ScribeResult<Vec<u8>> {
    let pages = paginate(&layout_report(report));

    let (doc, first_page, first_layer) = PdfDocument::new(
        format!("Medical Scribe Report - {}", report.patient_name),
        Mm(PAGE_WIDTH_MM),
        Mm(PAGE_HEIGHT_MM),
        "Page 1",
    );
    let regular = doc
        .add_builtin_font(BuiltinFont::Helvetica)
        .map_err(|e| ScribeError::Pdf(format!("font error: {e}")))?;
    let bold = doc
        .add_builtin_font(BuiltinFont::HelveticaBold)
        .map_err(|e| ScribeError::Pdf(format!("font error: {e}")))?;

    for (index, page) in pages.iter().enumerate() {
        let layer = if index == 0 {
            doc.get_page(first_page).get_layer(first_layer)
        } else {
            let (page_idx, layer_idx) = doc.add_page(
                Mm(PAGE_WIDTH_MM),
                Mm(PAGE_HEIGHT_MM),
                format!("Page {}", index + 1),
            );
            doc.get_page(page_idx).get_layer(layer_idx)
        };

        for placed in page {
            let style = placed.line.style;
            let font: &IndirectFontRef = if style.is_bold() { &bold } else { &regular };
            let x = if placed.line.indented {
                INDENT_LEFT_MM
            } else {
                MARGIN_LEFT_MM
            };
            layer.set_fill_color(style.colour());
            layer.use_text(
                placed.line.text.as_str(),
                style.font_size(),
                Mm(x),
                Mm(placed.y_mm),
                font,
            );
        }
    }

    let mut buf = BufWriter::new(Vec::new());
    doc.save(&mut buf)
        .map_err(|e| ScribeError::Pdf(format!("save error: {e}")))?;
    buf.into_inner()
        .map_err(|e| ScribeError::Pdf(format!("buffer error: {e}")))
}

/// Renders the report and writes it to `MedicalReport_<millis>.pdf` inside `dir`.
///
/// The directory is created if it does not exist. Returns the path of the written file.
pub fn export_report_pdf(report: &MedicalReport, dir: &Path) -> ScribeResult<PathBuf> {
    let bytes = render_report_pdf(report)?;

    std::fs::create_dir_all(dir).map_err(ScribeError::ExportDirCreation)?;
    let path = dir.join(format!(
        "{}{}.pdf",
        PDF_FILENAME_PREFIX,
        Utc::now().timestamp_millis()
    ));
    std::fs::write(&path, bytes).map_err(ScribeError::FileWrite)?;

    tracing::info!("exported report PDF to {}", path.display());
    Ok(path)
}

/// Greedy word wrap on whitespace. Words longer than `max_chars` get a line of their own.
fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();

    for word in text.split_whitespace() {
        let current_len = current.chars().count();
        if current_len > 0 && current_len + word.chars().count() + 1 > max_chars {
            lines.push(std::mem::take(&mut current));
        }
        if !current.is_empty() {
            current.push(' ');
        }
        current.push_str(word);
    }
    if !current.is_empty() || lines.is_empty() {
        lines.push(current);
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn sample_report() -> MedicalReport {
        let mut report = MedicalReport::new(
            "Maria Lopez",
            vec!["Shortness of breath".into()],
            BTreeMap::from([
                ("heartRate".to_string(), "104".to_string()),
                ("spO2".to_string(), "91".to_string()),
            ]),
            "Asthma exacerbation",
            vec!["Salbutamol nebuliser".into(), "Prednisolone 40mg for 5 days".into()],
        );
        report.icd10_code = "J45.901".into();
        report.risk_score = 55;
        report.safety_warning = Some("Escalate if SpO2 below 92%".into());
        report
    }

    fn texts(lines: &[PdfLine]) -> Vec<&str> {
        lines.iter().map(|l| l.text.as_str()).collect()
    }

    #[test]
    fn layout_orders_sections() {
        let lines = layout_report(&sample_report());
        assert_eq!(
            texts(&lines),
            vec![
                "Medical Scribe Report",
                "Patient: Maria Lopez",
                "Diagnosis: Asthma exacerbation",
                "Billing Code: J45.901",
                "Risk Score: 55/100",
                "Symptoms:",
                "- Shortness of breath",
                "Vital Signs:",
                "- heartRate: 104",
                "- spO2: 91",
                "Treatment Plan:",
                "- Salbutamol nebuliser",
                "- Prednisolone 40mg for 5 days",
                "Safety Warning:",
                "Escalate if SpO2 below 92%",
            ]
        );
        assert_eq!(lines[0].style, LineStyle::Title);
        assert_eq!(lines[2].style, LineStyle::Diagnosis);
        assert_eq!(lines[3].style, LineStyle::BillingCode);
    }

    #[test]
    fn layout_skips_empty_symptoms() {
        let mut report = sample_report();
        report.symptoms.clear();
        let lines = layout_report(&report);
        assert!(!texts(&lines).contains(&"Symptoms:"));
        assert!(texts(&lines).contains(&"Vital Signs:"));
    }

    #[test]
    fn long_plan_entries_wrap_without_losing_words() {
        let mut report = sample_report();
        let long = "word ".repeat(40);
        report.treatment_plan = vec![long.trim().to_string()];

        let lines = layout_report(&report);
        let plan_start = texts(&lines)
            .iter()
            .position(|t| *t == "Treatment Plan:")
            .unwrap();
        let wrapped: Vec<&PdfLine> = lines[plan_start + 1..]
            .iter()
            .take_while(|l| l.indented)
            .collect();

        assert!(wrapped.len() > 1);
        assert!(wrapped.iter().all(|l| l.text.chars().count() <= WRAP_COLUMNS));
        let words: usize = wrapped
            .iter()
            .map(|l| l.text.split_whitespace().filter(|w| *w == "word").count())
            .sum();
        assert_eq!(words, 40);
    }

    #[test]
    fn short_report_fits_one_page() {
        let pages = paginate(&layout_report(&sample_report()));
        assert_eq!(pages.len(), 1);
        assert!(pages[0].iter().all(|p| p.y_mm >= BOTTOM_MARGIN_MM));
    }

    #[test]
    fn long_report_spills_onto_more_pages() {
        let mut report = sample_report();
        report.treatment_plan = (1..=80).map(|i| format!("Step {}", i)).collect();

        let lines = layout_report(&report);
        let pages = paginate(&lines);

        assert!(pages.len() > 1);
        assert_eq!(pages.iter().map(Vec::len).sum::<usize>(), lines.len());
        for page in &pages {
            assert_eq!(page[0].y_mm, FIRST_LINE_Y_MM);
            assert!(page.iter().all(|p| p.y_mm >= BOTTOM_MARGIN_MM));
        }
    }

    #[test]
    fn rendered_bytes_are_a_pdf() {
        let bytes = render_report_pdf(&sample_report()).unwrap();
        assert_eq!(&bytes[0..4], b"%PDF");
    }

    #[test]
    fn export_writes_named_file_into_new_directory() {
        let dir = TempDir::new().unwrap();
        let export_dir = dir.path().join("nested").join("exports");

        let path = export_report_pdf(&sample_report(), &export_dir).unwrap();

        assert!(path.starts_with(&export_dir));
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with(PDF_FILENAME_PREFIX));
        assert!(name.ends_with(".pdf"));
        assert_eq!(&std::fs::read(&path).unwrap()[0..4], b"%PDF");
    }

    #[test]
    fn wrap_keeps_single_long_word() {
        let word = "x".repeat(100);
        assert_eq!(wrap_text(&word, 80), vec![word.clone()]);
        assert_eq!(wrap_text("", 80), vec![String::new()]);
    }
}
