use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::db::{NewFlashcard, Store};
use crate::error::{Error, Result};
use crate::generate::Generate;
use crate::parser::parse_flashcards;

const MARKDOWN_EXTENSIONS: &[&str] = &["md", "markdown"];
const SPINNER_TICK: Duration = Duration::from_millis(100);

const PROMPT_TEMPLATE: &str = "You are an expert flashcard generator. Your task is to extract spaced repetition flashcards from the following markdown content.

Strictly output ONLY pairs in this format, with no extra text, explanations, or numbering:
Q: <question>
A: <answer>

Repeat for each flashcard. Do not include any other text, headers, or formatting. Do not add explanations, summaries, or comments. Only output Q: and A: pairs, one after another.

Example:
Q: What is the capital of France?
A: Paris
Q: What is 2+2?
A: 4

Markdown:
";

pub fn build_prompt(content: &str) -> String {
    format!("{}{}", PROMPT_TEMPLATE, content)
}

fn is_markdown(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| MARKDOWN_EXTENSIONS.iter().any(|m| e.eq_ignore_ascii_case(m)))
        .unwrap_or(false)
}

/// Markdown files at `path`: the file itself, or every markdown file below a
/// directory. Sorted so runs process files in a stable order.
pub fn discover_files(path: &Path) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::NotFound(path.to_path_buf()));
    }
    if path.is_file() {
        return Ok(if is_markdown(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let mut files = Vec::new();
    for entry in WalkDir::new(path) {
        let entry = match entry {
            Ok(e) => e,
            Err(e) => {
                warn!("Skipping unreadable entry under {}: {}", path.display(), e);
                continue;
            }
        };
        if entry.file_type().is_file() && is_markdown(entry.path()) {
            files.push(entry.into_path());
        }
    }
    files.sort();
    Ok(files)
}

#[derive(Debug)]
pub enum FileOutcome {
    Inserted(usize),
    /// The model produced no usable pairs. Nothing references the file, so
    /// the next run will try it again.
    Empty,
    Skipped,
    Failed(Error),
}

#[derive(Debug, Default)]
pub struct IngestReport {
    pub files: Vec<(PathBuf, FileOutcome)>,
}

impl IngestReport {
    pub fn inserted(&self) -> usize {
        self.files
            .iter()
            .map(|(_, o)| match o {
                FileOutcome::Inserted(n) => *n,
                _ => 0,
            })
            .sum()
    }

    pub fn processed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Inserted(_) | FileOutcome::Empty))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Skipped))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, FileOutcome::Failed(_)))
    }

    fn count(&self, pred: impl Fn(&FileOutcome) -> bool) -> usize {
        self.files.iter().filter(|(_, o)| pred(o)).count()
    }
}

pub struct Ingestor<'a> {
    store: &'a Store,
    generator: Arc<dyn Generate>,
    deadline: Duration,
}

impl<'a> Ingestor<'a> {
    pub fn new(store: &'a Store, generator: Arc<dyn Generate>, deadline: Duration) -> Self {
        Self {
            store,
            generator,
            deadline,
        }
    }

    /// Ingest every markdown file at `path`, one file at a time. A failing
    /// file is reported and skipped; only a bad input path fails the run.
    pub async fn ingest_path(&self, path: &Path) -> Result<IngestReport> {
        let files = discover_files(path)?;
        info!("Found {} markdown files under {}", files.len(), path.display());

        let mut report = IngestReport::default();
        for file in files {
            let abs = std::path::absolute(&file).unwrap_or_else(|_| file.clone());
            let outcome = self.ingest_file(&abs).await;
            match &outcome {
                FileOutcome::Inserted(n) => {
                    println!("Processed: {} ({} flashcards generated)", abs.display(), n)
                }
                FileOutcome::Empty => println!("No flashcards inserted for: {}", abs.display()),
                FileOutcome::Skipped => {
                    println!("Skipping already processed: {}", abs.display())
                }
                FileOutcome::Failed(e) => {
                    warn!(file = %abs.display(), timeout = e.is_timeout(), "ingest failed");
                    eprintln!("Failed: {}: {}", abs.display(), e);
                }
            }
            report.files.push((abs, outcome));
        }
        Ok(report)
    }

    async fn ingest_file(&self, abs: &Path) -> FileOutcome {
        match self.try_ingest_file(abs).await {
            Ok(outcome) => outcome,
            Err(e) => FileOutcome::Failed(e),
        }
    }

    async fn try_ingest_file(&self, abs: &Path) -> Result<FileOutcome> {
        let key = abs.to_string_lossy().to_string();
        if self.store.is_processed(&key)? {
            return Ok(FileOutcome::Skipped);
        }

        let content = std::fs::read_to_string(abs).map_err(|source| Error::ReadError {
            path: abs.to_path_buf(),
            source,
        })?;

        let started = Instant::now();
        let text = self.run_generation(build_prompt(&content), &key).await?;
        debug!(
            file = %key,
            chars = text.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "generation finished"
        );

        let pairs = parse_flashcards(&text);
        if pairs.is_empty() {
            return Ok(FileOutcome::Empty);
        }

        let mut inserted = 0;
        let mut last_error = None;
        for pair in pairs {
            let card = NewFlashcard {
                file: key.clone(),
                question: pair.question,
                answer: pair.answer,
                revisit_in: 0,
            };
            match self.store.insert(&card) {
                Ok(_) => inserted += 1,
                Err(e) => {
                    warn!("Insert failed for {}: {}", key, e);
                    last_error = Some(e);
                }
            }
        }

        match (inserted, last_error) {
            (0, Some(e)) => Err(e),
            (n, _) => Ok(FileOutcome::Inserted(n)),
        }
    }

    /// Run one generation call as a background task. The task reports through
    /// a single-slot channel; the foreground ticks a spinner until the value
    /// arrives or the deadline passes, in which case the task is aborted.
    async fn run_generation(&self, prompt: String, label: &str) -> Result<String> {
        let (tx, rx) = oneshot::channel::<Result<String>>();
        let generator = Arc::clone(&self.generator);
        let deadline = self.deadline;
        let task = tokio::spawn(async move {
            let result = generator.generate(&prompt, deadline).await;
            let _ = tx.send(result);
        });

        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.set_message(format!("Generating flashcards for {}", label));

        let wait = tokio::time::timeout(deadline, rx);
        tokio::pin!(wait);
        let mut ticker = tokio::time::interval(SPINNER_TICK);
        let outcome = loop {
            tokio::select! {
                res = &mut wait => break res,
                _ = ticker.tick() => spinner.tick(),
            }
        };
        spinner.finish_and_clear();

        match outcome {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(Error::service(None, "generation task ended without a result")),
            Err(_) => {
                task.abort();
                Err(Error::Timeout(deadline))
            }
        }
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::TempDir;

    const TWO_CARDS: &str = "Q: What is Rust?\nA: A systems language\nQ: Who owns a value?\nA: Exactly one owner";

    /// Replies by matching a marker in the prompt.
    struct ScriptedGenerator {
        calls: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new() -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
            })
        }
    }

    #[async_trait]
    impl Generate for ScriptedGenerator {
        async fn generate(&self, prompt: &str, _deadline: Duration) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if prompt.contains("HANG") {
                // Ignores its deadline; the pipeline must cut it off.
                tokio::time::sleep(Duration::from_secs(30)).await;
            }
            if prompt.contains("BROKEN") {
                return Err(Error::service(Some(500), "model crashed"));
            }
            if prompt.contains("NOTHING") {
                return Ok("I could not find any facts.".to_string());
            }
            Ok(TWO_CARDS.to_string())
        }
    }

    fn write(dir: &Path, name: &str, body: &[u8]) -> PathBuf {
        let p = dir.join(name);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(&p, body).unwrap();
        p
    }

    fn outcomes(report: &IngestReport) -> Vec<(String, String)> {
        report
            .files
            .iter()
            .map(|(p, o)| {
                let name = p.file_name().unwrap().to_string_lossy().to_string();
                let kind = match o {
                    FileOutcome::Inserted(n) => format!("inserted:{}", n),
                    FileOutcome::Empty => "empty".to_string(),
                    FileOutcome::Skipped => "skipped".to_string(),
                    FileOutcome::Failed(Error::Timeout(_)) => "timeout".to_string(),
                    FileOutcome::Failed(Error::ServiceError { .. }) => "service".to_string(),
                    FileOutcome::Failed(Error::ReadError { .. }) => "read".to_string(),
                    FileOutcome::Failed(e) => format!("failed:{}", e),
                };
                (name, kind)
            })
            .collect()
    }

    #[test]
    fn discover_walks_directories_and_filters_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", b"x");
        write(dir.path(), "nested/deeper/b.markdown", b"x");
        write(dir.path(), "nested/C.MD", b"x");
        write(dir.path(), "notes.txt", b"x");
        write(dir.path(), "md", b"x");

        let names: Vec<String> = discover_files(dir.path())
            .unwrap()
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names.len(), 3);
        for expected in ["a.md", "b.markdown", "C.MD"] {
            assert!(names.contains(&expected.to_string()), "{:?}", names);
        }
    }

    #[test]
    fn discover_single_file() {
        let dir = TempDir::new().unwrap();
        let md = write(dir.path(), "one.md", b"x");
        let txt = write(dir.path(), "one.txt", b"x");
        assert_eq!(discover_files(&md).unwrap(), vec![md]);
        assert!(discover_files(&txt).unwrap().is_empty());
    }

    #[test]
    fn discover_missing_path_is_not_found() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope");
        assert!(matches!(discover_files(&missing), Err(Error::NotFound(_))));
    }

    #[test]
    fn prompt_embeds_content_after_instructions() {
        let prompt = build_prompt("# Ownership\nEvery value has one owner.");
        assert!(prompt.contains("Only output Q: and A: pairs"));
        assert!(prompt.ends_with("Markdown:\n# Ownership\nEvery value has one owner."));
    }

    #[tokio::test]
    async fn second_run_over_same_tree_inserts_nothing() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "rust.md", b"# Rust");
        let store = Store::open_in_memory().unwrap();
        let generator = ScriptedGenerator::new();
        let ingestor = Ingestor::new(&store, generator.clone(), Duration::from_secs(5));

        let first = ingestor.ingest_path(dir.path()).await.unwrap();
        assert_eq!(first.inserted(), 2);
        assert_eq!(store.query_all().unwrap().len(), 2);

        // Content changes do not matter: the path is the dedup key.
        std::fs::write(&file, b"# Rust, revised").unwrap();
        let second = ingestor.ingest_path(dir.path()).await.unwrap();
        assert_eq!(second.inserted(), 0);
        assert_eq!(second.skipped(), 1);
        assert_eq!(store.query_all().unwrap().len(), 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn inserted_cards_are_due_and_keyed_by_absolute_path() {
        let dir = TempDir::new().unwrap();
        let file = write(dir.path(), "rust.md", b"# Rust");
        let store = Store::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, ScriptedGenerator::new(), Duration::from_secs(5));
        ingestor.ingest_path(&file).await.unwrap();

        let abs = std::path::absolute(&file).unwrap().to_string_lossy().to_string();
        let cards = store.query_due().unwrap();
        assert_eq!(cards.len(), 2);
        assert!(cards.iter().all(|c| c.revisit_in == 0 && c.file == abs));
        assert_eq!(cards[0].question, "What is Rust?");
        assert_eq!(cards[1].answer, "Exactly one owner");
        assert!(store.is_processed(&abs).unwrap());
    }

    #[tokio::test]
    async fn one_failing_file_does_not_stop_the_run() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a_hang.md", b"HANG");
        write(dir.path(), "b_broken.md", b"BROKEN");
        write(dir.path(), "c_binary.md", &[0xff, 0xfe, 0x00, 0x80]);
        write(dir.path(), "d_empty.md", b"NOTHING");
        write(dir.path(), "e_good.md", b"fine");

        let store = Store::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, ScriptedGenerator::new(), Duration::from_millis(200));
        let report = ingestor.ingest_path(dir.path()).await.unwrap();

        assert_eq!(
            outcomes(&report),
            vec![
                ("a_hang.md".to_string(), "timeout".to_string()),
                ("b_broken.md".to_string(), "service".to_string()),
                ("c_binary.md".to_string(), "read".to_string()),
                ("d_empty.md".to_string(), "empty".to_string()),
                ("e_good.md".to_string(), "inserted:2".to_string()),
            ]
        );
        assert_eq!(report.failed(), 3);
        assert_eq!(report.processed(), 2);
        assert_eq!(store.list_distinct_files().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn bad_input_path_fails_the_run() {
        let dir = TempDir::new().unwrap();
        let store = Store::open_in_memory().unwrap();
        let ingestor = Ingestor::new(&store, ScriptedGenerator::new(), Duration::from_secs(1));
        let err = ingestor
            .ingest_path(&dir.path().join("missing"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }
}
