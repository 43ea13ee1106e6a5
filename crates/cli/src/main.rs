use clap::{Parser, Subcommand};
use scribe_core::{
    EnvValues, GenerationOutcome, HistoryStore, LlamaServerLoader, MedicalReport, NonEmptyText,
    ReportEdit, ScribeConfig, ScribeSession,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scribe")]
#[command(about = "Medical scribe: dictation in, structured report out")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a report from a dictation
    Generate {
        /// Dictation text
        dictation: String,
        /// Language for the report text (overrides SCRIBE_LANGUAGE)
        #[arg(long)]
        language: Option<String>,
    },
    /// List saved reports, newest first
    History,
    /// Show a saved report
    Show {
        /// History row id
        id: i64,
    },
    /// Edit a saved report
    Edit {
        /// History row id
        id: i64,
        /// New patient name
        #[arg(long)]
        name: Option<String>,
        /// New diagnosis
        #[arg(long)]
        diagnosis: Option<String>,
        /// Treatment plan item (repeat for several items; replaces the whole plan)
        #[arg(long)]
        plan: Vec<String>,
    },
    /// Export a saved report as PDF
    Export {
        /// History row id
        id: i64,
        /// Output directory (defaults to SCRIBE_EXPORT_DIR)
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Delete every saved report
    Clear,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("scribe_core=warn".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let Some(command) = cli.command else {
        println!("Use 'scribe --help' for commands");
        return Ok(());
    };

    let cfg = ScribeConfig::from_env_values(EnvValues {
        db_path: std::env::var("SCRIBE_DB_PATH").ok(),
        model_path: std::env::var("SCRIBE_MODEL_PATH").ok(),
        engine_url: std::env::var("SCRIBE_ENGINE_URL").ok(),
        export_dir: std::env::var("SCRIBE_EXPORT_DIR").ok(),
        language: std::env::var("SCRIBE_LANGUAGE").ok(),
    })?;
    let store = Arc::new(HistoryStore::open(cfg.db_path())?);
    let session = ScribeSession::new(store, cfg.target_language().clone()).await;

    match command {
        Commands::Generate {
            dictation,
            language,
        } => {
            if let Some(language) = language {
                match NonEmptyText::new(language) {
                    Ok(language) => session.set_language(language),
                    Err(e) => {
                        eprintln!("Invalid language: {}", e);
                        return Ok(());
                    }
                }
            }

            if !session
                .start_engine_load(LlamaServerLoader, cfg.engine().clone())
                .await?
            {
                eprintln!(
                    "Model not loaded; check SCRIBE_MODEL_PATH and that the inference server at {} is running",
                    cfg.engine().endpoint
                );
                return Ok(());
            }

            match session.generate_report(&dictation).await {
                Ok(GenerationOutcome::Structured(displayed)) => {
                    print_report(&displayed.report);
                    match displayed.history_id {
                        Some(id) => println!("\nSaved to history as #{}", id),
                        None => println!("\nReport could not be saved to history"),
                    }
                }
                Ok(GenerationOutcome::Fallback(displayed)) => {
                    eprintln!("Model output could not be parsed; raw output follows.");
                    print_report(&displayed.report);
                }
                Err(e) => eprintln!("Error generating report: {}", e),
            }
        }
        Commands::History => match session.refresh_history().await {
            Ok(items) if items.is_empty() => println!("No saved reports."),
            Ok(items) => {
                for item in items {
                    let created = item
                        .created_at()
                        .map(|t| t.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| item.timestamp.to_string());
                    println!(
                        "#{} {}  {} - {}",
                        item.id, created, item.patient_name, item.diagnosis
                    );
                }
            }
            Err(e) => eprintln!("Error listing history: {}", e),
        },
        Commands::Show { id } => match session.open_history(id).await {
            Ok(displayed) => print_report(&displayed.report),
            Err(e) => eprintln!("Error reading report #{}: {}", id, e),
        },
        Commands::Edit {
            id,
            name,
            diagnosis,
            plan,
        } => {
            let original = match session.open_history(id).await {
                Ok(displayed) => displayed,
                Err(e) => {
                    eprintln!("Error reading report #{}: {}", id, e);
                    return Ok(());
                }
            };

            let mut edit = ReportEdit::from_report(&original.report);
            if let Some(name) = name {
                edit.patient_name = name;
            }
            if let Some(diagnosis) = diagnosis {
                edit.diagnosis = diagnosis;
            }
            if !plan.is_empty() {
                edit.plan_text = plan.join("\n");
            }

            let outcome = session.update_report(&original, &edit).await;
            if outcome.saved_to_history {
                println!("Updated report #{}", id);
            } else {
                eprintln!("Report #{} could not be updated", id);
            }
        }
        Commands::Export { id, out } => {
            let dir = out.unwrap_or_else(|| cfg.export_dir().to_path_buf());
            match session.open_history(id).await {
                Ok(displayed) => match session.export_pdf(&displayed.report, &dir).await {
                    Ok(path) => println!("Exported report #{} to {}", id, path.display()),
                    Err(e) => eprintln!("Error exporting report #{}: {}", id, e),
                },
                Err(e) => eprintln!("Error reading report #{}: {}", id, e),
            }
        }
        Commands::Clear => match session.clear_history().await {
            Ok(removed) => println!("Deleted {} saved reports", removed),
            Err(e) => eprintln!("Error clearing history: {}", e),
        },
    }

    session.shutdown().await;
    Ok(())
}

fn print_report(report: &MedicalReport) {
    println!("Patient:    {}", report.patient_name);
    println!("Diagnosis:  {}", report.diagnosis);
    println!("ICD-10:     {}", report.icd10_code);
    println!("Risk score: {}/100", report.risk_score);

    if !report.symptoms.is_empty() {
        println!("\nSymptoms:");
        for symptom in &report.symptoms {
            println!("  - {}", symptom);
        }
    }
    if !report.vitals.is_empty() {
        println!("\nVitals:");
        for (name, value) in &report.vitals {
            println!("  {}: {}", name, value);
        }
    }
    println!("\nTreatment plan:");
    for (n, step) in report.treatment_plan.iter().enumerate() {
        println!("  {}. {}", n + 1, step);
    }
    if let Some(warning) = &report.safety_warning {
        println!("\nSafety warning: {}", warning);
    }
    if let Some(evidence) = &report.visual_evidence {
        println!("Evidence: {}", evidence);
    }
}
