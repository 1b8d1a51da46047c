//! CLI binary for pdf2book.
//!
//! A thin shim over the library crate: maps flags onto `ConversionConfig`,
//! drives a `BookQueue` for conversions and reads the `Library` for
//! everything else.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2book::{
    export, inspect, BookProgressCallback, BookQueue, ConversionConfig, ExportOptions, JobStatus,
    Library, PageSeparator, ProgressCallback,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// One 0–100 bar, reused for every book in the queue.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new(total: usize) -> Arc<Self> {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  [{bar:42.green/238}] {pos:>3}%  \
             {msg}  ⏱ {elapsed_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);

        let bar = ProgressBar::new(100);
        bar.set_style(style);
        bar.set_prefix(format!("Book 1/{total}"));
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    fn finish(&self) {
        self.bar.finish_and_clear();
    }
}

impl BookProgressCallback for CliProgressCallback {
    fn on_job_start(&self, job: usize, total: usize) {
        self.bar.reset();
        self.bar.set_prefix(format!("Book {job}/{total}"));
        self.bar.set_message("starting");
    }

    fn on_progress(&self, percent: u8) {
        let percent = u64::from(percent);
        let phase = if percent < 60 { "extracting" } else { "refining" };
        self.bar.set_message(phase);
        self.bar.set_position(percent);
    }

    fn on_chunk_fallback(&self, chunk: usize, total: usize, error: &str) {
        // Truncate very long error messages to keep output tidy.
        let msg: String = if error.chars().count() > 80 {
            let head: String = error.chars().take(79).collect();
            format!("{head}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} Chunk {:>3}/{:<3} kept unrefined  {}",
            cyan("⚠"),
            chunk,
            total,
            dim(&msg),
        ));
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a book into the library
  pdf2book convert novel.pdf

  # Several files, one after another, each also exported to ./books/
  pdf2book convert a.pdf b.pdf https://example.org/c.pdf -o books/

  # Use a specific backend
  pdf2book convert --provider openai --model gpt-4.1-mini novel.pdf

  # Browse the library
  pdf2book list
  pdf2book show 3f2c1a
  pdf2book show 3f2c1a --page 12

  # Export a stored book
  pdf2book export 3f2c1a -o novel.md --separator comment

  # Page count and images (no API key needed)
  pdf2book inspect novel.pdf

ENVIRONMENT VARIABLES:
  GEMINI_API_KEY          Google Gemini API key (preferred backend)
  OPENAI_API_KEY          OpenAI API key
  ANTHROPIC_API_KEY       Anthropic API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (gemini, openai, anthropic, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDF2BOOK_LIBRARY        Library directory
  PDFIUM_LIB_PATH         Path to libpdfium (file or directory)
"#;

/// Convert PDFs into mobile-readable books.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2book",
    version,
    about = "Convert PDFs into paginated, mobile-readable books",
    long_about = "Convert PDF documents (local files or URLs) into books of short pages \
grouped by chapter, using a generative model in two passes: structural extraction, \
then re-pagination. Books are kept in a local library.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Library directory.
    #[arg(long, global = true, env = "PDF2BOOK_LIBRARY")]
    library: Option<PathBuf>,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2BOOK_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2BOOK_QUIET")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Convert PDFs (one at a time) and store them in the library.
    Convert(ConvertArgs),

    /// List stored books, oldest first.
    List {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Print a stored book.
    Show {
        /// Book id or unique id prefix.
        id: String,

        /// Print only this page (1-indexed).
        #[arg(long)]
        page: Option<usize>,
    },

    /// Export a stored book as Markdown or JSON.
    Export {
        /// Book id or unique id prefix.
        id: String,

        #[command(flatten)]
        format: ExportArgs,

        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Remove a book from the library.
    Delete {
        /// Book id or unique id prefix.
        id: String,
    },

    /// Page count and embedded images of a PDF. No model is called.
    Inspect {
        /// Local PDF file path or HTTP/HTTPS URL.
        input: String,

        #[arg(long)]
        json: bool,
    },
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file paths or HTTP/HTTPS URLs.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Also export Markdown: a file for one input, a directory for several.
    #[arg(short, long, env = "PDF2BOOK_OUTPUT")]
    output: Option<PathBuf>,

    #[command(flatten)]
    format: ExportArgs,

    /// Model ID (e.g. gemini-2.5-flash, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// Provider: gemini, openai, anthropic, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "Model provider. Auto-detected from API key env vars if not set.\n\
          'gemini' uses the native Gemini API; anything else goes through edgequake-llm."
    )]
    provider: Option<String>,

    /// Sampling temperature (0.0–2.0).
    #[arg(long, env = "PDF2BOOK_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// Phase-2 chunk ceiling in characters.
    #[arg(long, env = "PDF2BOOK_CHUNK_CHARS", default_value_t = 15_000)]
    chunk_chars: usize,

    /// Max output tokens of the extraction request.
    #[arg(long, env = "PDF2BOOK_EXTRACT_MAX_TOKENS", default_value_t = 65_536)]
    extract_max_tokens: usize,

    /// Max output tokens per refinement request.
    #[arg(long, env = "PDF2BOOK_REFINE_MAX_TOKENS", default_value_t = 16_384)]
    refine_max_tokens: usize,

    /// Do not look for embedded images.
    #[arg(long, env = "PDF2BOOK_NO_IMAGES")]
    no_images: bool,

    /// Directory for extracted images (default: inside the library).
    #[arg(long, env = "PDF2BOOK_ASSET_DIR")]
    asset_dir: Option<PathBuf>,

    /// Text file replacing the extraction instruction.
    #[arg(long)]
    extract_prompt: Option<PathBuf>,

    /// Text file replacing the refinement instruction.
    #[arg(long)]
    refine_prompt: Option<PathBuf>,

    /// HTTP download timeout in seconds.
    #[arg(long, env = "PDF2BOOK_DOWNLOAD_TIMEOUT", default_value_t = 120)]
    download_timeout: u64,

    /// Disable progress bar.
    #[arg(long, env = "PDF2BOOK_NO_PROGRESS")]
    no_progress: bool,
}

#[derive(Args, Debug)]
struct ExportArgs {
    /// Output format.
    #[arg(long, value_enum, default_value = "markdown")]
    format: FormatArg,

    /// Page separator: none, hr, comment, or custom string.
    #[arg(long, default_value = "hr")]
    separator: String,

    /// Omit YAML front matter.
    #[arg(long)]
    no_front_matter: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq)]
enum FormatArg {
    Markdown,
    Json,
}

impl ExportArgs {
    fn options(&self) -> ExportOptions {
        ExportOptions {
            separator: parse_separator(&self.separator),
            front_matter: !self.no_front_matter,
            chapter_headings: true,
        }
    }

    fn render(&self, doc: &pdf2book::Document) -> Result<String> {
        match self.format {
            FormatArg::Markdown => Ok(export::to_markdown(doc, &self.options())),
            FormatArg::Json => export::to_json(doc).context("Failed to serialise book"),
        }
    }

    fn extension(&self) -> &'static str {
        match self.format {
            FormatArg::Markdown => "md",
            FormatArg::Json => "json",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = match cli.command {
        Command::Convert(ref args) => !cli.quiet && !args.no_progress,
        _ => false,
    };
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    let library_dir = cli.library.clone().unwrap_or_else(Library::default_dir);
    let library = Library::open(&library_dir)
        .await
        .with_context(|| format!("Failed to open library at {}", library_dir.display()))?;

    match cli.command {
        Command::Convert(ref args) => run_convert(&cli, args, library, show_progress).await,
        Command::List { json } => run_list(&library, json).await,
        Command::Show { ref id, page } => run_show(&library, id, page).await,
        Command::Export {
            ref id,
            ref format,
            ref output,
        } => run_export(&library, id, format, output.as_deref()).await,
        Command::Delete { ref id } => {
            let book = library.find(id).await.context("Book not found")?;
            library.delete(&book.id).await.context("Failed to delete book")?;
            if !cli.quiet {
                eprintln!("{} Deleted '{}' ({})", green("✔"), book.document.title, book.id);
            }
            Ok(())
        }
        Command::Inspect { ref input, json } => {
            let info = inspect(input, &ConversionConfig::default())
                .await
                .context("Failed to inspect PDF")?;
            if json {
                println!(
                    "{}",
                    serde_json::to_string_pretty(&info).context("Failed to serialise info")?
                );
            } else {
                let unknown = || "unknown".to_string();
                println!("File:    {}", info.name);
                println!("Size:    {} bytes", info.size_bytes);
                println!(
                    "Pages:   {}",
                    info.page_count.map(|n| n.to_string()).unwrap_or_else(unknown)
                );
                println!(
                    "Images:  {}",
                    info.image_count.map(|n| n.to_string()).unwrap_or_else(unknown)
                );
            }
            Ok(())
        }
    }
}

async fn run_convert(
    cli: &Cli,
    args: &ConvertArgs,
    library: Library,
    show_progress: bool,
) -> Result<()> {
    let bar = show_progress.then(|| CliProgressCallback::new(args.inputs.len()));
    let progress = bar.clone().map(|b| b as ProgressCallback);
    let asset_dir = args
        .asset_dir
        .clone()
        .unwrap_or_else(|| library.dir().join("assets"));
    let config = build_config(args, asset_dir, progress).await?;

    let queue = BookQueue::new(library.clone(), config);
    for input in &args.inputs {
        queue.push(input.clone());
    }
    let jobs = queue.run().await;
    if let Some(ref bar) = bar {
        bar.finish();
    }

    let mut failed = 0usize;
    for job in &jobs {
        match job.status {
            JobStatus::Done { book_id } => {
                let book = library.get(&book_id).await.context("Stored book vanished")?;
                if !cli.quiet {
                    eprintln!(
                        "{} {}  {}  {} pages, {} chapters  {}",
                        green("✔"),
                        bold(&book.document.title),
                        dim(&book_id.to_string()[..8]),
                        book.document.pages.len(),
                        book.document.chapters().len(),
                        dim(&job.input),
                    );
                }
                if let Some(ref out) = args.output {
                    let path = export_path(out, &book.document.title, &args.format, jobs.len());
                    let content = args.format.render(&book.document)?;
                    export::write_atomic(&path, &content)
                        .await
                        .with_context(|| format!("Failed to write {}", path.display()))?;
                    if !cli.quiet {
                        eprintln!("   →  {}", bold(&path.display().to_string()));
                    }
                }
            }
            JobStatus::Failed { ref message } => {
                failed += 1;
                eprintln!("{} {}\n   {}", red("✘"), job.input, red(message));
            }
            JobStatus::Pending | JobStatus::Processing { .. } => {}
        }
    }

    if failed > 0 {
        anyhow::bail!("{failed} of {} conversions failed", jobs.len());
    }
    Ok(())
}

async fn run_list(library: &Library, json: bool) -> Result<()> {
    let books = library.list().await.context("Failed to read library")?;
    if json {
        let rows: Vec<_> = books
            .iter()
            .map(|b| {
                serde_json::json!({
                    "id": b.id,
                    "createdAt": b.created_at,
                    "title": b.document.title,
                    "author": b.document.author,
                    "pages": b.document.pages.len(),
                    "sourceName": b.source_name,
                })
            })
            .collect();
        println!(
            "{}",
            serde_json::to_string_pretty(&rows).context("Failed to serialise list")?
        );
        return Ok(());
    }

    if books.is_empty() {
        eprintln!("{}", dim("Library is empty."));
        return Ok(());
    }
    for b in &books {
        println!(
            "{}  {}  {:>4} pages  {}{}",
            cyan(&b.id.to_string()[..8]),
            dim(&b.created_at.format("%Y-%m-%d %H:%M").to_string()),
            b.document.pages.len(),
            bold(&b.document.title),
            b.document
                .author
                .as_deref()
                .map(|a| format!(" — {a}"))
                .unwrap_or_default(),
        );
    }
    Ok(())
}

async fn run_show(library: &Library, id: &str, page: Option<usize>) -> Result<()> {
    let book = library.find(id).await.context("Book not found")?;
    let doc = &book.document;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match page {
        Some(n) => {
            let p = doc
                .pages
                .iter()
                .find(|p| p.page_number == n)
                .with_context(|| format!("'{}' has no page {n} (1–{})", doc.title, doc.pages.len()))?;
            if let Some(ref chapter) = p.chapter_title {
                writeln!(out, "{}", dim(chapter))?;
            }
            writeln!(out, "{}", p.content)?;
            writeln!(out, "{}", dim(&format!("— {n}/{} —", doc.pages.len())))?;
        }
        None => {
            writeln!(out, "{}", bold(&doc.title))?;
            if let Some(ref a) = doc.author {
                writeln!(out, "by {a}")?;
            }
            writeln!(
                out,
                "{}",
                dim(&format!(
                    "{}  ·  {} pages  ·  {} words  ·  from {}",
                    book.id,
                    doc.pages.len(),
                    doc.word_count(),
                    book.source_name
                ))
            )?;
            writeln!(out)?;
            let mut first_page = 1;
            for (i, chapter) in doc.chapters().iter().enumerate() {
                if let Some(p) = doc
                    .pages
                    .iter()
                    .skip(first_page - 1)
                    .find(|p| p.chapter_title.as_deref() == Some(chapter))
                {
                    first_page = p.page_number;
                }
                writeln!(out, "{:>3}. {}  {}", i + 1, chapter, dim(&format!("p. {first_page}")))?;
            }
        }
    }
    Ok(())
}

async fn run_export(
    library: &Library,
    id: &str,
    format: &ExportArgs,
    output: Option<&Path>,
) -> Result<()> {
    let book = library.find(id).await.context("Book not found")?;
    let content = format.render(&book.document)?;
    match output {
        Some(path) => export::write_atomic(path, &content)
            .await
            .with_context(|| format!("Failed to write {}", path.display()))?,
        None => {
            let stdout = io::stdout();
            let mut handle = stdout.lock();
            handle
                .write_all(content.as_bytes())
                .context("Failed to write to stdout")?;
        }
    }
    Ok(())
}

/// Map CLI args to `ConversionConfig`.
async fn build_config(
    args: &ConvertArgs,
    asset_dir: PathBuf,
    progress: Option<ProgressCallback>,
) -> Result<ConversionConfig> {
    let mut builder = ConversionConfig::builder()
        .temperature(args.temperature)
        .chunk_chars(args.chunk_chars)
        .extract_max_tokens(args.extract_max_tokens)
        .refine_max_tokens(args.refine_max_tokens)
        .extract_images(!args.no_images)
        .asset_dir(asset_dir)
        .download_timeout_secs(args.download_timeout);

    if let Some(ref model) = args.model {
        builder = builder.model(model.clone());
    }
    if let Some(ref provider) = args.provider {
        builder = builder.provider_name(provider.clone());
    }
    if let Some(ref path) = args.extract_prompt {
        builder = builder.extract_prompt(read_prompt(path).await?);
    }
    if let Some(ref path) = args.refine_prompt {
        builder = builder.refine_prompt(read_prompt(path).await?);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

async fn read_prompt(path: &Path) -> Result<String> {
    tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read prompt from {:?}", path))
}

/// `out` itself for a single book, `out/<slug>.<ext>` for several.
fn export_path(out: &Path, title: &str, format: &ExportArgs, books: usize) -> PathBuf {
    if books == 1 && !out.is_dir() {
        return out.to_path_buf();
    }
    let slug: String = title
        .chars()
        .map(|c| if c.is_alphanumeric() { c.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-");
    let slug = if slug.is_empty() { "book".to_string() } else { slug };
    out.join(format!("{slug}.{}", format.extension()))
}

/// Parse `--separator` string into `PageSeparator`.
fn parse_separator(s: &str) -> PageSeparator {
    match s.to_lowercase().as_str() {
        "none" => PageSeparator::None,
        "hr" | "---" => PageSeparator::HorizontalRule,
        "comment" => PageSeparator::Comment,
        _ => PageSeparator::Custom(s.to_string()),
    }
}
