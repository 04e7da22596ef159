//! leafpress - Digitized book to EPUB converter

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use leafpress::{
    ConvertConfig, Converter, ImageSettings, KakaduPipeline, PageType, PipelineTools,
    SourceBundle,
};

#[derive(Parser)]
#[command(name = "leafpress")]
#[command(version, about = "Digitized book to EPUB converter", long_about = None)]
#[command(after_help = "EXAMPLES:
    leafpress holmes00doyl                     Convert ./holmes00doyl_* to holmes00doyl.epub
    leafpress holmes00doyl out.epub -p books   Read the bundle from ./books
    leafpress -i holmes00doyl                  Show the bundle's scan data")]
struct Cli {
    /// Book identifier; bundle files are named after it
    #[arg(value_name = "BOOK_ID")]
    book_id: String,

    /// Output file [default: BOOK_ID.epub]
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    /// Directory holding the bundle
    #[arg(short = 'p', long, default_value = ".")]
    book_path: PathBuf,

    /// Maximum page image width
    #[arg(long, default_value_t = 600)]
    width: u32,

    /// Maximum page image height
    #[arg(long, default_value_t = 780)]
    height: u32,

    /// JPEG quality for page images
    #[arg(long, default_value_t = 90, value_parser = clap::value_parser!(u8).range(0..=100))]
    quality: u8,

    /// Keep every page of a book without a title page as an image
    #[arg(long)]
    untitled_as_images: bool,

    /// JPEG 2000 decoder program
    #[arg(long, default_value = "kdu_expand")]
    kdu_expand: String,

    /// Show the bundle's scan data without converting
    #[arg(short, long)]
    info: bool,

    /// Suppress output messages
    #[arg(short, long)]
    quiet: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.quiet { "warn" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(filter)).init();

    let result = if cli.info {
        show_info(&cli)
    } else {
        convert(&cli)
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn show_info(cli: &Cli) -> Result<(), leafpress::Error> {
    let bundle = SourceBundle::open(&cli.book_id, &cli.book_path)?;

    println!("Book: {}", bundle.book_id());
    println!("Path: {}", bundle.book_path().display());
    println!("Scan data: {}", bundle.scandata_path().display());
    println!("Leaves: {}", bundle.leaves().len());

    let included = bundle.leaves().iter().filter(|l| l.include).count();
    println!("In access formats: {included}");

    let mut counts: Vec<(String, usize)> = Vec::new();
    for leaf in bundle.leaves() {
        let name = leaf.page_type.as_str();
        match counts.iter_mut().find(|(n, _)| n == name) {
            Some((_, count)) => *count += 1,
            None => counts.push((name.to_string(), 1)),
        }
    }
    for (name, count) in &counts {
        println!("  {name}: {count}");
    }

    let has_title = bundle
        .leaves()
        .iter()
        .any(|l| l.page_type == PageType::Title);
    if !has_title {
        println!("No title page: front matter detection disabled");
    }

    for (label, path) in [
        ("OCR", bundle.ocr_path()),
        ("Images", bundle.images_path()),
    ] {
        let state = if path.is_file() { "present" } else { "missing" };
        println!("{label}: {} ({state})", path.display());
    }

    Ok(())
}

fn convert(cli: &Cli) -> Result<(), leafpress::Error> {
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(format!("{}.epub", cli.book_id)));

    let config = ConvertConfig {
        images: ImageSettings {
            width: cli.width,
            height: cli.height,
            quality: cli.quality,
            ..ImageSettings::default()
        },
        untitled_pages_as_images: cli.untitled_as_images,
        ..ConvertConfig::default()
    };
    let tools = PipelineTools {
        expand: cli.kdu_expand.clone(),
        ..PipelineTools::default()
    };

    let converter = Converter::new()
        .with_config(config)
        .with_pipeline(KakaduPipeline::new().with_tools(tools));
    let book = converter.convert_to_file(&cli.book_id, &cli.book_path, &output)?;

    if !cli.quiet {
        println!(
            "{} -> {} ({} items, {} navpoints)",
            cli.book_id,
            output.display(),
            book.manifest.len(),
            book.nav_points().len()
        );
    }
    Ok(())
}
