use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, Level};
use tracing_subscriber::{EnvFilter, FmtSubscriber};
use wikistash::container::Codec;
use wikistash::content::CategoryTagger;
use wikistash::extract::{convert_file, ConvertOptions, Extractor};
use wikistash::models::{Field, PageRecord};
use wikistash::parser::{DecodeOptions, MalformedPolicy};

#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

#[derive(Parser)]
#[command(name = "wikistash")]
#[command(about = "Convert Wikipedia dumps into an indexed binary container and query it")]
struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Convert an XML dump (.xml or .xml.bz2) into a container plus title indexes
    Convert(ConvertArgs),
    /// Look pages up by title
    Get(GetArgs),
    /// Scan pages in container order
    Iter(IterArgs),
    /// Show the container schema and index sizes
    Info(InfoArgs),
    /// Copy the first pages of a dump into a smaller dump
    Sample(SampleArgs),
}

#[derive(Args)]
struct ConvertArgs {
    /// Path to the Wikipedia dump file (.xml or .xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// Destination directory for the container and indexes
    #[arg(short, long)]
    output: PathBuf,

    /// Stop after this many admitted pages
    #[arg(long)]
    limit: Option<u64>,

    /// Drop redirect pages
    #[arg(long)]
    ignore_redirects: bool,

    /// Namespaces to keep
    #[arg(long, value_delimiter = ',', default_value = "0")]
    namespaces: Vec<i32>,

    /// Keep pages from every namespace
    #[arg(long, conflicts_with = "namespaces")]
    all_namespaces: bool,

    /// Fields to leave out of the container (e.g. timestamp,revision_id)
    #[arg(long, value_delimiter = ',')]
    suppress: Vec<Field>,

    /// Per-record compression: zstd or none
    #[arg(long, default_value = "zstd")]
    codec: Codec,

    /// Fill categories and tags from the page text
    #[arg(long)]
    tags: bool,

    /// Fail on the first malformed page instead of skipping it
    #[arg(long)]
    strict: bool,

    /// Hide the progress spinner
    #[arg(long)]
    no_progress: bool,
}

#[derive(Args)]
struct GetArgs {
    /// Directory written by `convert`
    #[arg(short, long)]
    dir: PathBuf,

    /// Titles to look up
    #[arg(required = true)]
    titles: Vec<String>,

    /// Do not follow redirects
    #[arg(long)]
    no_resolve: bool,

    /// Print page text as well
    #[arg(long)]
    text: bool,
}

#[derive(Args)]
struct IterArgs {
    /// Directory written by `convert`
    #[arg(short, long)]
    dir: PathBuf,

    /// Maximum number of pages
    #[arg(long)]
    limit: Option<usize>,

    /// Pages per batch
    #[arg(long, default_value_t = wikistash::config::DEFAULT_BATCH_SIZE)]
    batch_size: usize,
}

#[derive(Args)]
struct InfoArgs {
    /// Directory written by `convert`
    #[arg(short, long)]
    dir: PathBuf,
}

#[derive(Args)]
struct SampleArgs {
    /// Source dump (.xml or .xml.bz2)
    #[arg(short, long)]
    input: PathBuf,

    /// Output dump; a .bz2 extension compresses it
    #[arg(short, long)]
    output: PathBuf,

    /// Number of pages to copy
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

fn run_convert(args: ConvertArgs) -> Result<()> {
    if !args.input.exists() {
        bail!("Input dump does not exist: {:?}", args.input);
    }

    let decode = DecodeOptions {
        limit: args.limit,
        ignore_redirects: args.ignore_redirects,
        namespaces: if args.all_namespaces {
            Vec::new()
        } else {
            args.namespaces
        },
        malformed: if args.strict {
            MalformedPolicy::Abort
        } else {
            MalformedPolicy::Skip
        },
    };

    let mut options = ConvertOptions {
        decode,
        codec: args.codec,
        show_progress: !args.no_progress,
        ..ConvertOptions::default()
    }
    .suppress(&args.suppress)
    .context("Invalid --suppress list")?;

    if args.tags {
        options.enricher = Some(Arc::new(CategoryTagger));
    }

    let start = Instant::now();
    let report = convert_file(&args.input, &args.output, &options)
        .with_context(|| format!("Failed to convert {:?}", args.input))?;
    let elapsed = start.elapsed();

    println!();
    println!("=== Summary ===");
    println!("Conversion time:    {:.2}s", elapsed.as_secs_f64());
    println!("Pages admitted:     {}", report.admitted);
    println!("Articles:           {}", report.articles);
    println!("Redirects:          {}", report.redirects);
    println!("Skipped redirects:  {}", report.skipped_redirects);
    println!("Skipped empty:      {}", report.skipped_empty);
    println!("Skipped namespace:  {}", report.skipped_namespace);
    println!("Malformed:          {}", report.malformed);
    println!("Container size:     {} bytes", report.container_bytes);

    Ok(())
}

fn print_page(page: &PageRecord, with_text: bool) -> Result<()> {
    let line = if with_text {
        serde_json::to_string(page)?
    } else {
        let mut summary = page.clone();
        summary.text = None;
        serde_json::to_string(&summary)?
    };
    println!("{}", line);
    Ok(())
}

fn run_get(args: GetArgs) -> Result<()> {
    let mut extractor = Extractor::open(&args.dir)
        .with_context(|| format!("Failed to open {:?}", args.dir))?;

    let pages = extractor
        .get_pages_by_title(args.titles.iter().map(String::as_str), !args.no_resolve)
        .context("Title lookup failed")?;

    for title in &args.titles {
        match pages.get(title) {
            Some(page) => print_page(page, args.text)?,
            None => info!(title = %title, "Not found"),
        }
    }
    info!(requested = args.titles.len(), found = pages.len(), "Lookup finished");

    extractor.close();
    Ok(())
}

fn run_iter(args: IterArgs) -> Result<()> {
    let extractor = Extractor::open(&args.dir)
        .with_context(|| format!("Failed to open {:?}", args.dir))?;

    for (n, batch) in extractor
        .iter_page_batches(args.batch_size, args.limit)?
        .enumerate()
    {
        let batch = batch.with_context(|| format!("Failed to read batch {}", n))?;
        info!(batch = n, pages = batch.len(), "Batch read");
        for page in &batch {
            let kind = if page.is_redirect() { "redirect" } else { "article" };
            println!(
                "{}\t{}\t{}",
                page.page_id.map(|id| id.to_string()).unwrap_or_default(),
                kind,
                page.title
            );
        }
    }

    extractor.close();
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<()> {
    let extractor = Extractor::open(&args.dir)
        .with_context(|| format!("Failed to open {:?}", args.dir))?;
    let info = extractor.info();
    let summary = extractor.index_summary();

    println!("Container version:  {}", info.version);
    println!("Codec:              {}", info.codec);
    println!("Records:            {}", info.record_count);
    println!("Data bytes:         {}", info.data_end - info.data_start);
    println!("Indexed titles:     {}", summary.positions);
    println!("Indexed redirects:  {}", summary.redirects);
    println!("Schema:");
    println!("{}", serde_json::to_string_pretty(&info.schema)?);

    extractor.close();
    Ok(())
}

fn run_sample(args: SampleArgs) -> Result<()> {
    let copied = wikistash::sample::write_sample(&args.input, &args.output, args.limit)
        .with_context(|| format!("Failed to sample {:?}", args.input))?;
    println!("Copied {} pages to {:?}", copied, args.output);
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let builder = FmtSubscriber::builder().with_target(false);
    let subscriber_set = if std::env::var_os("RUST_LOG").is_some() {
        tracing::subscriber::set_global_default(
            builder.with_env_filter(EnvFilter::from_default_env()).finish(),
        )
    } else {
        tracing::subscriber::set_global_default(builder.with_max_level(level).finish())
    };
    subscriber_set.expect("Failed to set tracing subscriber");

    let result = match cli.command {
        Commands::Convert(args) => run_convert(args),
        Commands::Get(args) => run_get(args),
        Commands::Iter(args) => run_iter(args),
        Commands::Info(args) => run_info(args),
        Commands::Sample(args) => run_sample(args),
    };

    match result {
        Ok(()) => {
            info!("Completed successfully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!("Error: {:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}
