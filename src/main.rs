//! CLI entry point for the bulk caption downloader.

use std::fs::File;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

use yt_bulk_cc::cli::Args;
use yt_bulk_cc::concat::{ConcatOptions, concatenate};
use yt_bulk_cc::convert::convert_existing;
use yt_bulk_cc::input::{parse_video_id, read_id_file};
use yt_bulk_cc::probe::probe_egress;
use yt_bulk_cc::proxy::{ProxyOptions, gather_pool};
use yt_bulk_cc::run::{RunSummary, Scheduler, render_file_statistics};
use yt_bulk_cc::transport::{TranscriptSource, YoutubeTranscriptSource, load_cookie_jar};
use yt_bulk_cc::worker::{DEFAULT_TRIES, DownloadConfig, Item};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();
    init_tracing(&args)?;
    debug!(?args, "CLI arguments parsed");

    std::fs::create_dir_all(&args.folder)
        .with_context(|| format!("cannot create output folder {}", args.folder.display()))?;

    // Offline conversion short-circuits the whole download pipeline
    if let Some(source) = &args.convert {
        let converted = convert_existing(
            source,
            args.format,
            &args.folder,
            args.include_stats(),
            args.timestamps,
        )?;
        info!(converted, "conversion finished");
        return Ok(ExitCode::SUCCESS);
    }

    let mut items = enumerate_items(&args)?;
    if let Some(limit) = args.limit {
        items.truncate(limit);
    }
    if items.is_empty() {
        info!("nothing to do");
        return Ok(ExitCode::SUCCESS);
    }

    let source = build_source(&args)?;
    let pool = gather_pool(&ProxyOptions {
        explicit: args.proxy.clone(),
        file: args.proxy_file.clone(),
        public_count: args.public_proxy,
        public_country: args.public_proxy_country.clone(),
        public_scheme: args.public_proxy_type,
    })
    .await?
    .map(Arc::new);

    if args.check_ip && !probe_egress(source.as_ref(), pool.as_deref()).await {
        error!("every egress candidate is blocked; aborting");
        return Ok(ExitCode::from(1));
    }

    let config = DownloadConfig {
        folder: args.folder.clone(),
        format: args.format,
        languages: if args.languages.is_empty() {
            vec!["en".to_string()]
        } else {
            args.languages.clone()
        },
        timestamps: args.timestamps || args.format.forces_timestamps(),
        include_stats: args.include_stats(),
        sequence_prefix: !args.no_seq_prefix,
        tries: DEFAULT_TRIES,
        delay_secs: args.sleep,
    };

    // Concatenation needs every document present, so skip-existing is only
    // in effect for plain runs.
    let scheduler = Scheduler::new(
        Arc::clone(&source),
        pool.clone(),
        config,
        usize::from(args.jobs),
        args.overwrite,
        args.concat.is_none(),
    );
    let results = scheduler.run(items).await;

    if let Some(base) = &args.concat {
        let written = concatenate(
            &results,
            &ConcatOptions {
                folder: args.folder.clone(),
                base: base.clone(),
                format: args.format,
                include_stats: args.include_stats(),
                split: args.split,
            },
        )?;
        info!(files = written.len(), "concatenation finished");
    }

    let summary = RunSummary::tally(&results, pool.as_deref());
    println!("{}", summary.render());
    if args.include_stats() {
        if let Some(block) = render_file_statistics(&results, args.stats_top) {
            println!("{block}");
        }
    }

    #[allow(clippy::cast_sign_loss)]
    Ok(ExitCode::from(summary.exit_code() as u8))
}

fn init_tracing(args: &Args) -> Result<()> {
    let default_level = match args.verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    let file_layer = match (&args.log_file, args.no_log) {
        (Some(path), false) => {
            let file = File::create(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            Some(fmt::layer().with_ansi(false).with_writer(Arc::new(file)))
        }
        _ => None,
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();
    Ok(())
}

fn enumerate_items(args: &Args) -> Result<Vec<Item>> {
    if let Some(path) = &args.id_file {
        return Ok(read_id_file(path)?);
    }
    let Some(link) = &args.link else {
        bail!("LINK is required unless --id-file or --convert is used");
    };
    let Some(id) = parse_video_id(link) else {
        bail!("could not find an 11-character video id in {link:?}");
    };
    Ok(vec![Item {
        title: id.clone(),
        id,
    }])
}

fn build_source(args: &Args) -> Result<Arc<dyn TranscriptSource>> {
    let source = match &args.cookie_json {
        Some(path) => {
            let jar = load_cookie_jar(path)?;
            YoutubeTranscriptSource::with_cookie_jar(jar)
        }
        None => YoutubeTranscriptSource::new(),
    };
    Ok(Arc::new(source))
}
