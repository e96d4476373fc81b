use std::path::PathBuf;

use clap::Parser;
use colored::Colorize;
use tracing::info;

use voidsent::{
    config::{PatcherSettings, DEFAULT_SETTINGS_FILE},
    il::{
        debug::{annotated_listing, debug_print_patches},
        io::{patch_all, read_listing, ListingDirectory},
    },
    sites::PatchSite,
    types::{PatchEvent, SiteOutcome, Stage, StageProgress},
};

/// Patch method listings with the Voidsent override sites
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Settings file
    #[arg(short, long, default_value = DEFAULT_SETTINGS_FILE)]
    config: PathBuf,

    /// Directory with the original listings
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Directory to write patched listings to
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Only patch these sites (repeatable)
    #[arg(short, long = "site")]
    sites: Vec<String>,

    /// JSON file with additional site definitions
    #[arg(long)]
    extra_sites: Option<PathBuf>,

    /// Print every patched listing with the inserted code highlighted
    #[arg(long)]
    show: bool,
}

fn report(event: PatchEvent) {
    match event.progress {
        StageProgress::Unknown => info!("{}...", event.stage.as_str()),
        StageProgress::Percentage(done) => info!("{}: {:.0}%", event.stage.as_str(), done * 100.0),
        StageProgress::Done => info!("{}: done", event.stage.as_str()),
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let mut settings = PatcherSettings::load(&args.config)?;
    if let Some(input) = args.input {
        settings.input_dir = input;
    }
    if let Some(output) = args.output {
        settings.output_dir = output;
    }
    if !args.sites.is_empty() {
        settings.enabled_sites = args.sites;
    }
    if args.extra_sites.is_some() {
        settings.extra_sites = args.extra_sites;
    }

    report(Stage::LoadingSites.into());
    let sites: Vec<PatchSite> = settings.sites()?;

    let mut host = ListingDirectory::new(&settings.input_dir, &settings.output_dir);
    let result = patch_all(&mut host, &sites, report);

    for (name, outcome) in &result.sites {
        match outcome {
            SiteOutcome::Patched { inserted, applied } => {
                println!(
                    "{} {name}: {} specs, {inserted} instructions inserted",
                    "patched".green(),
                    applied.len()
                );
                let Some(site) = sites.iter().find(|site| &site.name == name) else {
                    continue;
                };
                debug_print_patches(&site.target, applied);
                if args.show {
                    let stream = read_listing(&host.output_path(&site.target))?;
                    println!("{}", annotated_listing(&stream, applied));
                }
            }
            SiteOutcome::Skipped { reason } => println!("{} {name}: {reason}", "skipped".yellow()),
            SiteOutcome::Failed { reason } => println!("{} {name}: {reason}", "failed".red()),
        }
    }

    if result.failed() > 0 {
        anyhow::bail!("{} of {} sites failed to patch", result.failed(), sites.len());
    }
    Ok(())
}
