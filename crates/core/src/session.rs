//! The scribe session: state a front end observes, and the actions that change it.
//!
//! A session owns four observable slots (the displayed report, the generating flag, the target
//! language and the history list), each a `tokio::sync::watch` channel written only from here.
//! Background work runs on a [`TaskTracker`] under a [`CancellationToken`]; dropping or shutting
//! down the session cancels whatever is still running.
//!
//! A displayed report carries the id of the history row it was generated from or opened from.
//! Edits use that id to find the row to update.

use crate::edit::{apply_edit, ReportEdit};
use crate::engine::{EngineLoader, EngineOptions, InferenceEngine};
use crate::error::{ScribeError, ScribeResult};
use crate::history::{HistoryItem, HistoryStore};
use crate::pdf::export_report_pdf;
use crate::prompt::build_prompt;
use crate::report::MedicalReport;
use crate::sanitize::{parse_model_output, ParsedOutput};
use scribe_types::NonEmptyText;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

/// A report as shown to the user, linked to its history row when it has one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayedReport {
    pub report: MedicalReport,
    pub history_id: Option<i64>,
}

impl DisplayedReport {
    pub fn unsaved(report: MedicalReport) -> Self {
        Self {
            report,
            history_id: None,
        }
    }
}

/// Result of one generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    /// The model output parsed; the report was published and (normally) saved to history.
    Structured(DisplayedReport),
    /// The model output did not parse; the fallback record was published but not saved.
    Fallback(DisplayedReport),
}

impl GenerationOutcome {
    pub fn displayed(&self) -> &DisplayedReport {
        match self {
            GenerationOutcome::Structured(d) | GenerationOutcome::Fallback(d) => d,
        }
    }

    pub fn is_structured(&self) -> bool {
        matches!(self, GenerationOutcome::Structured(_))
    }
}

/// Result of applying an edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditOutcome {
    pub report: DisplayedReport,
    /// Whether the linked history row was rewritten.
    pub saved_to_history: bool,
}

struct SessionState {
    store: Arc<HistoryStore>,
    engine: watch::Sender<Option<Arc<dyn InferenceEngine>>>,
    report: watch::Sender<Option<DisplayedReport>>,
    is_generating: watch::Sender<bool>,
    target_language: watch::Sender<NonEmptyText>,
    history: watch::Sender<Vec<HistoryItem>>,
}

/// Clears the generating flag when a generation ends, however it ends.
struct GeneratingGuard<'a>(&'a watch::Sender<bool>);

impl Drop for GeneratingGuard<'_> {
    fn drop(&mut self) {
        self.0.send_replace(false);
    }
}

impl SessionState {
    async fn with_store<T, F>(&self, f: F) -> ScribeResult<T>
    where
        F: FnOnce(&HistoryStore) -> ScribeResult<T> + Send + 'static,
        T: Send + 'static,
    {
        let store = Arc::clone(&self.store);
        tokio::task::spawn_blocking(move || f(&store)).await?
    }

    async fn refresh_history(&self) -> ScribeResult<Vec<HistoryItem>> {
        let items = self.with_store(|store| store.list_all()).await?;
        self.history.send_replace(items.clone());
        Ok(items)
    }

    async fn refresh_history_logged(&self) {
        if let Err(e) = self.refresh_history().await {
            tracing::error!("failed to reload history: {}", e);
        }
    }

    /// Saves a snapshot, returning the new row id. Failures are logged and swallowed.
    async fn record(&self, report: &MedicalReport) -> Option<i64> {
        let report = report.clone();
        match self.with_store(move |store| store.record(&report)).await {
            Ok(item) => Some(item.id),
            Err(e) => {
                tracing::error!("failed to save report to history: {}", e);
                None
            }
        }
    }

    async fn generate(&self, dictation: &str) -> ScribeResult<GenerationOutcome> {
        let engine = self.engine.borrow().clone();
        let Some(engine) = engine else {
            tracing::error!("inference engine is not ready yet");
            return Err(ScribeError::EngineUnavailable("model not loaded".into()));
        };

        let dictation = NonEmptyText::new(dictation)
            .map_err(|e| ScribeError::InvalidInput(format!("dictation: {}", e)))?;

        let claimed = self.is_generating.send_if_modified(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !claimed {
            return Err(ScribeError::GenerationInProgress);
        }
        let _guard = GeneratingGuard(&self.is_generating);

        let language = self.target_language.borrow().clone();
        let prompt = build_prompt(dictation.as_str(), language.as_str());

        let raw = engine.generate(&prompt).await.map_err(|e| {
            tracing::error!("generation failed: {}", e);
            e
        })?;
        tracing::debug!("raw model output: {}", raw);

        let outcome = match parse_model_output(&raw) {
            ParsedOutput::Structured(report) => {
                let history_id = self.record(&report).await;
                let displayed = DisplayedReport { report, history_id };
                self.report.send_replace(Some(displayed.clone()));
                self.refresh_history_logged().await;
                GenerationOutcome::Structured(displayed)
            }
            ParsedOutput::Fallback(report) => {
                let displayed = DisplayedReport::unsaved(report);
                self.report.send_replace(Some(displayed.clone()));
                GenerationOutcome::Fallback(displayed)
            }
        };

        Ok(outcome)
    }

    async fn update_report(&self, original: &DisplayedReport, edit: &ReportEdit) -> EditOutcome {
        let updated = DisplayedReport {
            report: apply_edit(&original.report, edit),
            history_id: original.history_id,
        };

        self.report.send_if_modified(|current| {
            if current.as_ref() == Some(original) {
                *current = Some(updated.clone());
                true
            } else {
                false
            }
        });

        let saved_to_history = match original.history_id {
            Some(id) => {
                let report = updated.report.clone();
                match self
                    .with_store(move |store| store.update_report(id, &report))
                    .await
                {
                    Ok(true) => {
                        self.refresh_history_logged().await;
                        true
                    }
                    Ok(false) => {
                        tracing::warn!("history row {} no longer exists; edit not saved", id);
                        false
                    }
                    Err(e) => {
                        tracing::error!("failed to update history row {}: {}", id, e);
                        false
                    }
                }
            }
            None => {
                tracing::debug!("report has no history row; edit kept in memory only");
                false
            }
        };

        EditOutcome {
            report: updated,
            saved_to_history,
        }
    }
}

/// Owner of the observable scribe state and its background work.
pub struct ScribeSession {
    state: Arc<SessionState>,
    tasks: TaskTracker,
    cancel: CancellationToken,
}

impl ScribeSession {
    /// Creates a session over `store` and loads the current history into the history slot.
    ///
    /// A failure to read history is logged; the slot then starts empty.
    pub async fn new(store: Arc<HistoryStore>, target_language: NonEmptyText) -> Self {
        let state = Arc::new(SessionState {
            store,
            engine: watch::Sender::new(None),
            report: watch::Sender::new(None),
            is_generating: watch::Sender::new(false),
            target_language: watch::Sender::new(target_language),
            history: watch::Sender::new(Vec::new()),
        });
        state.refresh_history_logged().await;

        Self {
            state,
            tasks: TaskTracker::new(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn store(&self) -> &Arc<HistoryStore> {
        &self.state.store
    }

    /// Loads an engine in the background. Failures are logged and leave the engine unset.
    ///
    /// The returned handle resolves to whether an engine was installed.
    pub fn start_engine_load<L>(&self, loader: L, options: EngineOptions) -> JoinHandle<bool>
    where
        L: EngineLoader + 'static,
    {
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("engine load cancelled");
                    false
                }
                result = loader.load(&options) => match result {
                    Ok(engine) => {
                        state.engine.send_replace(Some(engine));
                        tracing::info!("inference engine loaded");
                        true
                    }
                    Err(e) => {
                        tracing::error!("failed to load inference engine: {}", e);
                        false
                    }
                },
            }
        })
    }

    /// Installs an already loaded engine.
    pub fn set_engine(&self, engine: Arc<dyn InferenceEngine>) {
        self.state.engine.send_replace(Some(engine));
    }

    pub fn engine_ready(&self) -> bool {
        self.state.engine.borrow().is_some()
    }

    /// Generates a report from a dictation and publishes it.
    ///
    /// Structured results are saved to history; if saving fails the report is still published
    /// without a history link. Unparseable output publishes the fallback record.
    ///
    /// # Errors
    ///
    /// - `ScribeError::EngineUnavailable` if no engine is loaded.
    /// - `ScribeError::InvalidInput` if the dictation is blank.
    /// - `ScribeError::GenerationInProgress` if another generation is running.
    /// - any engine error, in which case the displayed report is left unchanged.
    /// - `ScribeError::Cancelled` if the session shuts down first.
    pub async fn generate_report(&self, dictation: &str) -> ScribeResult<GenerationOutcome> {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ScribeError::Cancelled),
            result = self.state.generate(dictation) => result,
        }
    }

    /// Runs [`Self::generate_report`] in the background; errors are logged.
    pub fn spawn_generate(&self, dictation: String) -> JoinHandle<()> {
        let state = Arc::clone(&self.state);
        let cancel = self.cancel.clone();
        self.tasks.spawn(async move {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::debug!("generation cancelled");
                }
                result = state.generate(&dictation) => {
                    if let Err(e) = result {
                        tracing::warn!("generation did not produce a report: {}", e);
                    }
                }
            }
        })
    }

    /// Applies a clinician edit to `original`.
    ///
    /// The displayed report is replaced only if it is still `original`. The history row linked
    /// to `original` is rewritten if it exists; otherwise the edit stays in memory. Persistence
    /// failures are logged, never returned.
    pub async fn update_report(
        &self,
        original: &DisplayedReport,
        edit: &ReportEdit,
    ) -> EditOutcome {
        self.state.update_report(original, edit).await
    }

    /// Makes `displayed` the current report.
    pub fn load_report(&self, displayed: DisplayedReport) {
        self.state.report.send_replace(Some(displayed));
    }

    /// Makes the snapshot stored in history row `id` the current report.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::HistoryNotFound` if the row does not exist, or a decode error if
    /// its payload is corrupt.
    pub async fn open_history(&self, id: i64) -> ScribeResult<DisplayedReport> {
        let item = self.history_item(id).await?;
        let displayed = DisplayedReport {
            report: item.report()?,
            history_id: Some(item.id),
        };
        self.load_report(displayed.clone());
        Ok(displayed)
    }

    /// Reads history row `id`.
    ///
    /// # Errors
    ///
    /// Returns `ScribeError::HistoryNotFound` if the row does not exist.
    pub async fn history_item(&self, id: i64) -> ScribeResult<HistoryItem> {
        self.state
            .with_store(move |store| store.get(id))
            .await?
            .ok_or(ScribeError::HistoryNotFound(id))
    }

    pub fn set_language(&self, language: NonEmptyText) {
        self.state.target_language.send_replace(language);
    }

    pub fn target_language(&self) -> NonEmptyText {
        self.state.target_language.borrow().clone()
    }

    pub fn current_report(&self) -> Option<DisplayedReport> {
        self.state.report.borrow().clone()
    }

    pub fn is_generating(&self) -> bool {
        *self.state.is_generating.borrow()
    }

    /// History as of the last refresh, newest first.
    pub fn history(&self) -> Vec<HistoryItem> {
        self.state.history.borrow().clone()
    }

    /// Reloads history from the store into the history slot.
    pub async fn refresh_history(&self) -> ScribeResult<Vec<HistoryItem>> {
        self.state.refresh_history().await
    }

    /// Deletes every history row and returns how many were removed.
    pub async fn clear_history(&self) -> ScribeResult<usize> {
        let removed = self.state.with_store(|store| store.clear_all()).await?;
        self.state.history.send_replace(Vec::new());
        tracing::info!("cleared {} history rows", removed);
        Ok(removed)
    }

    /// Writes `report` as a PDF into `dir` and returns the file path.
    pub async fn export_pdf(&self, report: &MedicalReport, dir: &Path) -> ScribeResult<PathBuf> {
        let report = report.clone();
        let dir = dir.to_path_buf();
        tokio::task::spawn_blocking(move || export_report_pdf(&report, &dir)).await?
    }

    pub fn subscribe_report(&self) -> watch::Receiver<Option<DisplayedReport>> {
        self.state.report.subscribe()
    }

    pub fn subscribe_generating(&self) -> watch::Receiver<bool> {
        self.state.is_generating.subscribe()
    }

    pub fn subscribe_history(&self) -> watch::Receiver<Vec<HistoryItem>> {
        self.state.history.subscribe()
    }

    pub fn subscribe_language(&self) -> watch::Receiver<NonEmptyText> {
        self.state.target_language.subscribe()
    }

    /// Cancels background work and waits for it to finish.
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tasks.close();
        self.tasks.wait().await;
    }
}

impl Drop for ScribeSession {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.tasks.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{FALLBACK_DIAGNOSIS, FALLBACK_PATIENT_NAME};
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex;
    use tempfile::TempDir;
    use tokio::sync::Notify;

    const REPORT_JSON: &str = r#"{"patientName":"Grace Hopper","symptoms":["Cough","Fever"],"vitals":{"temperature":"38.9"},"diagnosis":"Influenza","icd10Code":"J11.1","treatmentPlan":["Oseltamivir 75mg BD","Fluids"],"riskScore":30}"#;

    /// Replays canned responses and records the prompts it was given.
    #[derive(Default)]
    struct ScriptedEngine {
        responses: Mutex<VecDeque<ScribeResult<String>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn replying(responses: &[&str]) -> Arc<Self> {
            let engine = Self::default();
            {
                let mut queue = engine.responses.lock().unwrap();
                for r in responses {
                    queue.push_back(Ok(r.to_string()));
                }
            }
            Arc::new(engine)
        }

        fn failing() -> Arc<Self> {
            let engine = Self::default();
            engine
                .responses
                .lock()
                .unwrap()
                .push_back(Err(ScribeError::EngineResponse("out of memory".into())));
            Arc::new(engine)
        }

        fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl InferenceEngine for ScriptedEngine {
        async fn generate(&self, prompt: &str) -> ScribeResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ScribeError::EngineResponse("script exhausted".into())))
        }
    }

    /// Blocks every generation until released.
    struct GatedEngine {
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl InferenceEngine for GatedEngine {
        async fn generate(&self, _prompt: &str) -> ScribeResult<String> {
            self.gate.notified().await;
            Ok(REPORT_JSON.to_string())
        }
    }

    struct StaticLoader(Arc<dyn InferenceEngine>);

    #[async_trait]
    impl EngineLoader for StaticLoader {
        async fn load(&self, _options: &EngineOptions) -> ScribeResult<Arc<dyn InferenceEngine>> {
            Ok(Arc::clone(&self.0))
        }
    }

    struct MissingModelLoader;

    #[async_trait]
    impl EngineLoader for MissingModelLoader {
        async fn load(&self, options: &EngineOptions) -> ScribeResult<Arc<dyn InferenceEngine>> {
            Err(ScribeError::ModelNotFound(options.model_path.clone()))
        }
    }

    async fn session() -> ScribeSession {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        ScribeSession::new(store, NonEmptyText::new("English").unwrap()).await
    }

    async fn session_with(engine: Arc<dyn InferenceEngine>) -> ScribeSession {
        let session = session().await;
        session.set_engine(engine);
        session
    }

    #[tokio::test]
    async fn generate_without_engine_is_refused() {
        let session = session().await;
        let err = session.generate_report("Patient has a cough").await.unwrap_err();

        assert!(matches!(err, ScribeError::EngineUnavailable(_)));
        assert_eq!(session.current_report(), None);
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn structured_output_is_published_and_saved() {
        let engine = ScriptedEngine::replying(&[REPORT_JSON]);
        let session = session_with(engine.clone()).await;

        let outcome = session
            .generate_report("Grace Hopper, fever and cough for three days")
            .await
            .unwrap();

        assert!(outcome.is_structured());
        let displayed = outcome.displayed().clone();
        assert_eq!(displayed.report.patient_name, "Grace Hopper");
        assert_eq!(session.current_report(), Some(displayed.clone()));
        assert!(!session.is_generating());

        let history = session.history();
        assert_eq!(history.len(), 1);
        assert_eq!(displayed.history_id, Some(history[0].id));
        assert_eq!(history[0].report().unwrap(), displayed.report);

        let prompts = engine.prompts();
        assert_eq!(prompts.len(), 1);
        assert!(prompts[0].contains("Grace Hopper, fever and cough for three days"));
    }

    #[tokio::test]
    async fn fenced_output_still_parses() {
        let fenced = format!("```json\n{}\n```", REPORT_JSON);
        let session = session_with(ScriptedEngine::replying(&[&fenced])).await;

        let outcome = session.generate_report("dictation").await.unwrap();
        assert!(outcome.is_structured());
        assert_eq!(outcome.displayed().report.diagnosis, "Influenza");
    }

    #[tokio::test]
    async fn prose_output_publishes_fallback_without_saving() {
        let prose = "I'm sorry, I could not understand the dictation.";
        let session = session_with(ScriptedEngine::replying(&[prose])).await;

        let outcome = session.generate_report("mumble").await.unwrap();

        assert!(!outcome.is_structured());
        let displayed = outcome.displayed();
        assert_eq!(displayed.history_id, None);
        assert_eq!(displayed.report.patient_name, FALLBACK_PATIENT_NAME);
        assert_eq!(displayed.report.diagnosis, FALLBACK_DIAGNOSIS);
        assert_eq!(displayed.report.treatment_plan, vec![prose.to_string()]);
        assert_eq!(session.current_report().as_ref(), Some(displayed));
        assert!(session.store().list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn engine_failure_leaves_displayed_report_alone() {
        let session = session_with(ScriptedEngine::failing()).await;
        let previous = DisplayedReport::unsaved(MedicalReport::fallback("earlier"));
        session.load_report(previous.clone());

        let err = session.generate_report("dictation").await.unwrap_err();

        assert!(matches!(err, ScribeError::EngineResponse(_)));
        assert_eq!(session.current_report(), Some(previous));
        assert!(!session.is_generating());
        assert!(session.history().is_empty());
    }

    #[tokio::test]
    async fn blank_dictation_is_rejected() {
        let session = session_with(ScriptedEngine::replying(&[REPORT_JSON])).await;
        let err = session.generate_report("   \n").await.unwrap_err();
        assert!(matches!(err, ScribeError::InvalidInput(_)));
    }

    #[tokio::test]
    async fn prompt_follows_target_language() {
        let engine = ScriptedEngine::replying(&[REPORT_JSON]);
        let session = session_with(engine.clone()).await;
        session.set_language(NonEmptyText::new("Portuguese").unwrap());

        session.generate_report("dictation").await.unwrap();

        assert_eq!(session.target_language().as_str(), "Portuguese");
        assert!(engine.prompts()[0].contains("Write every text value in Portuguese."));
    }

    #[tokio::test]
    async fn edit_updates_displayed_report_and_linked_row_only() {
        let other = REPORT_JSON.replace("Grace Hopper", "Alan Turing");
        let session = session_with(ScriptedEngine::replying(&[&other, REPORT_JSON])).await;
        let untouched = session.generate_report("first").await.unwrap();
        let original = session.generate_report("second").await.unwrap().displayed().clone();

        let outcome = session
            .update_report(
                &original,
                &ReportEdit::new("Grace B. Hopper", "Influenza A", "Rest\n\nDrink fluids\n"),
            )
            .await;

        assert!(outcome.saved_to_history);
        assert_eq!(outcome.report.history_id, original.history_id);
        assert_eq!(outcome.report.report.treatment_plan, vec!["Rest", "Drink fluids"]);
        assert_eq!(session.current_report(), Some(outcome.report.clone()));

        let row = session
            .store()
            .get(original.history_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(row.patient_name, "Grace B. Hopper");
        assert_eq!(row.diagnosis, "Influenza A");
        assert_eq!(row.report().unwrap(), outcome.report.report);

        let other_row = session
            .store()
            .get(untouched.displayed().history_id.unwrap())
            .unwrap()
            .unwrap();
        assert_eq!(other_row.patient_name, "Alan Turing");

        let listed = session.history();
        assert!(listed.iter().any(|i| i.patient_name == "Grace B. Hopper"));
    }

    #[tokio::test]
    async fn edit_of_stale_report_does_not_replace_current_one() {
        let session =
            session_with(ScriptedEngine::replying(&[REPORT_JSON, REPORT_JSON])).await;
        let first = session.generate_report("first").await.unwrap().displayed().clone();
        let second = session.generate_report("second").await.unwrap().displayed().clone();

        let outcome = session
            .update_report(&first, &ReportEdit::new("Edited", "Edited", "Plan"))
            .await;

        assert!(outcome.saved_to_history);
        assert_eq!(session.current_report(), Some(second));
        let row = session.store().get(first.history_id.unwrap()).unwrap().unwrap();
        assert_eq!(row.patient_name, "Edited");
    }

    #[tokio::test]
    async fn edit_of_fallback_record_stays_in_memory() {
        let session = session_with(ScriptedEngine::replying(&["not json"])).await;
        let original = session.generate_report("x").await.unwrap().displayed().clone();

        let outcome = session
            .update_report(&original, &ReportEdit::new("Fixed Name", "Fixed dx", "Plan A"))
            .await;

        assert!(!outcome.saved_to_history);
        assert_eq!(session.current_report(), Some(outcome.report));
        assert!(session.store().list_all().unwrap().is_empty());
    }

    #[tokio::test]
    async fn edit_after_history_cleared_is_a_no_op_for_history() {
        let session = session_with(ScriptedEngine::replying(&[REPORT_JSON])).await;
        let original = session.generate_report("x").await.unwrap().displayed().clone();
        assert_eq!(session.clear_history().await.unwrap(), 1);

        let outcome = session
            .update_report(&original, &ReportEdit::new("A", "B", "C"))
            .await;

        assert!(!outcome.saved_to_history);
        assert!(session.store().list_all().unwrap().is_empty());
    }

    fn drop_history_table(path: &Path) {
        rusqlite::Connection::open(path)
            .unwrap()
            .execute_batch("DROP TABLE history")
            .unwrap();
    }

    async fn file_backed_session(dir: &TempDir) -> (ScribeSession, PathBuf) {
        let path = dir.path().join("history.db");
        let store = Arc::new(HistoryStore::open(&path).unwrap());
        let session = ScribeSession::new(store, NonEmptyText::new("English").unwrap()).await;
        (session, path)
    }

    #[tokio::test]
    async fn report_is_published_unlinked_when_history_write_fails() {
        let dir = TempDir::new().unwrap();
        let (session, path) = file_backed_session(&dir).await;
        session.set_engine(ScriptedEngine::replying(&[REPORT_JSON]));
        drop_history_table(&path);

        let outcome = session.generate_report("dictation").await.unwrap();

        assert!(outcome.is_structured());
        let displayed = outcome.displayed();
        assert_eq!(displayed.history_id, None);
        assert_eq!(displayed.report.patient_name, "Grace Hopper");
        assert_eq!(session.current_report().as_ref(), Some(displayed));
        assert!(!session.is_generating());
    }

    #[tokio::test]
    async fn edit_survives_history_update_failure() {
        let dir = TempDir::new().unwrap();
        let (session, path) = file_backed_session(&dir).await;
        session.set_engine(ScriptedEngine::replying(&[REPORT_JSON]));
        let original = session.generate_report("x").await.unwrap().displayed().clone();
        assert!(original.history_id.is_some());
        drop_history_table(&path);

        let outcome = session
            .update_report(&original, &ReportEdit::new("Edited", "Edited dx", "Rest"))
            .await;

        assert!(!outcome.saved_to_history);
        assert_eq!(outcome.report.history_id, original.history_id);
        assert_eq!(outcome.report.report.patient_name, "Edited");
        assert_eq!(session.current_report(), Some(outcome.report));
    }

    #[tokio::test]
    async fn edit_with_invalid_report_leaves_row_untouched() {
        let session = session().await;
        let report = MedicalReport::from_json(REPORT_JSON).unwrap();
        let item = session.store().record(&report).unwrap();

        let mut invalid = report.clone();
        invalid.risk_score = 200;
        let original = DisplayedReport {
            report: invalid,
            history_id: Some(item.id),
        };
        session.load_report(original.clone());

        let outcome = session
            .update_report(&original, &ReportEdit::new("Edited", "Edited dx", "Rest"))
            .await;

        assert!(!outcome.saved_to_history);
        let row = session.store().get(item.id).unwrap().unwrap();
        assert_eq!(row.report().unwrap(), report);
    }

    #[tokio::test]
    async fn open_history_links_the_displayed_report() {
        let session = session().await;
        let report = MedicalReport::from_json(REPORT_JSON).unwrap();
        let item = session.store().record(&report).unwrap();

        let displayed = session.open_history(item.id).await.unwrap();

        assert_eq!(displayed.history_id, Some(item.id));
        assert_eq!(displayed.report, report);
        assert_eq!(session.current_report(), Some(displayed));

        let err = session.open_history(item.id + 100).await.unwrap_err();
        assert!(matches!(err, ScribeError::HistoryNotFound(_)));
    }

    #[tokio::test]
    async fn second_generation_while_busy_is_rejected() {
        let gate = Arc::new(Notify::new());
        let session = session_with(Arc::new(GatedEngine { gate: gate.clone() })).await;
        let mut generating = session.subscribe_generating();

        let first = session.spawn_generate("first dictation".into());
        generating.wait_for(|busy| *busy).await.unwrap();

        let err = session.generate_report("second dictation").await.unwrap_err();
        assert!(matches!(err, ScribeError::GenerationInProgress));

        gate.notify_one();
        first.await.unwrap();

        assert!(!session.is_generating());
        assert_eq!(session.history().len(), 1);
        assert_eq!(
            session.current_report().unwrap().report.patient_name,
            "Grace Hopper"
        );
    }

    #[tokio::test]
    async fn shutdown_cancels_in_flight_generation() {
        let gate = Arc::new(Notify::new());
        let session = session_with(Arc::new(GatedEngine { gate })).await;
        let mut generating = session.subscribe_generating();

        let task = session.spawn_generate("never finishes".into());
        generating.wait_for(|busy| *busy).await.unwrap();

        session.shutdown().await;
        task.await.unwrap();

        assert!(!session.is_generating());
        assert_eq!(session.current_report(), None);
        assert!(matches!(
            session.generate_report("after shutdown").await,
            Err(ScribeError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn engine_load_outcome_controls_readiness() {
        let session = session().await;

        let loaded = session
            .start_engine_load(MissingModelLoader, EngineOptions::default())
            .await
            .unwrap();
        assert!(!loaded);
        assert!(!session.engine_ready());

        let engine: Arc<dyn InferenceEngine> = ScriptedEngine::replying(&[]);
        let loaded = session
            .start_engine_load(StaticLoader(engine), EngineOptions::default())
            .await
            .unwrap();
        assert!(loaded);
        assert!(session.engine_ready());
    }

    #[tokio::test]
    async fn new_session_loads_existing_history_newest_first() {
        let store = Arc::new(HistoryStore::open_in_memory().unwrap());
        let report = MedicalReport::from_json(REPORT_JSON).unwrap();
        store.insert(&report, 100).unwrap();
        let mut newer = report.clone();
        newer.patient_name = "Newer".into();
        store.insert(&newer, 200).unwrap();

        let session = ScribeSession::new(store, NonEmptyText::new("English").unwrap()).await;
        let names: Vec<String> = session
            .history()
            .into_iter()
            .map(|i| i.patient_name)
            .collect();
        assert_eq!(names, vec!["Newer", "Grace Hopper"]);
    }

    #[tokio::test]
    async fn clear_history_empties_store_and_slot() {
        let session =
            session_with(ScriptedEngine::replying(&[REPORT_JSON, REPORT_JSON])).await;
        session.generate_report("a").await.unwrap();
        session.generate_report("b").await.unwrap();
        let mut history = session.subscribe_history();
        history.borrow_and_update();

        assert_eq!(session.clear_history().await.unwrap(), 2);

        assert!(history.has_changed().unwrap());
        assert!(history.borrow_and_update().is_empty());
        assert!(session.refresh_history().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn export_pdf_writes_into_directory() {
        let session = session().await;
        let dir = TempDir::new().unwrap();
        let report = MedicalReport::from_json(REPORT_JSON).unwrap();

        let path = session.export_pdf(&report, dir.path()).await.unwrap();

        assert!(path.starts_with(dir.path()));
        assert_eq!(&std::fs::read(path).unwrap()[0..4], b"%PDF");
    }
}
