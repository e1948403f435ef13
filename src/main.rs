use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use topic_dict_scorer::{
    aggregate::resample::{bucket_of, date_range},
    bootstrap::{bootstrap_series, bootstrap_sum, write_ensemble},
    records::{read_popularity, read_scored, read_tsv, trim_period, write_scored},
    score_documents, AggregateOptions, Aggregator, Document, Granularity, Occurrence, RunConfig, ScoredDocument,
    Source, TopicDictionary, VectorKind,
};

#[derive(Parser, Debug)]
#[command(name = "topic-dict-scorer", about = "Dictionary based topic scoring and aggregation")]
struct Cli {
    /// Path to a run configuration (JSON); flags override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Keyword table (TSV); overrides the configured path
    #[arg(long, global = true)]
    dict: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Score documents and write the scored-document cache (CBOR).
    Score {
        /// Documents (TSV with date, textbody, cleaned_textbody)
        #[arg(long)]
        docs: PathBuf,
        #[arg(long)]
        out: PathBuf,
        /// Drop documents without any keyword
        #[arg(long)]
        drop_no_topic: bool,
        /// Scale each topic vector to sum to one
        #[arg(long)]
        normalize: bool,
    },

    /// Aggregate scored documents into a dated series (CSV).
    Aggregate {
        #[command(flatten)]
        input: AggregateArgs,
        #[arg(long)]
        out: PathBuf,
    },

    /// Sum scored documents over the whole period (.npy).
    Sum {
        #[command(flatten)]
        input: AggregateArgs,
        #[arg(long)]
        out: PathBuf,
    },

    /// Bootstrap the aggregation (.npy ensemble).
    Bootstrap {
        #[command(flatten)]
        input: AggregateArgs,
        #[arg(long)]
        runs: Option<usize>,
        /// Share of rows drawn per run
        #[arg(long)]
        fraction: Option<f64>,
        #[arg(long)]
        seed: Option<u64>,
        /// Bootstrap whole-period sums instead of series
        #[arg(long)]
        sum: bool,
        #[arg(long)]
        out: PathBuf,
    },

    /// Export the dictionary as topic/words JSON.
    ExportDict {
        #[arg(long)]
        out: PathBuf,
        /// Also write index2topic.json and topic2index.json here
        #[arg(long)]
        index_dir: Option<PathBuf>,
        /// Also write a CBOR snapshot of the dictionary
        #[arg(long)]
        cbor: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
struct AggregateArgs {
    /// Scored-document cache written by `score`
    #[arg(long)]
    scored: PathBuf,
    /// Raw occurrence table (TSV), headlines only
    #[arg(long)]
    raw: Option<PathBuf>,
    /// headline, survey or tweet
    #[arg(long)]
    source: Option<Source>,
    /// topic or word
    #[arg(long)]
    kind: Option<VectorKind>,
    #[arg(long)]
    candidate: Option<String>,
    /// day (D) or week (W)
    #[arg(long)]
    granularity: Option<Granularity>,
    /// Forced output dates, comma separated
    #[arg(long, value_delimiter = ',')]
    window: Vec<NaiveDate>,
    /// Forced window from this date (with --window-to)
    #[arg(long, requires = "window_to")]
    window_from: Option<NaiveDate>,
    #[arg(long, requires = "window_from")]
    window_to: Option<NaiveDate>,
    /// Entity popularity weights (JSON)
    #[arg(long)]
    popularity: Option<PathBuf>,
    /// Keep documents dated on or after this day
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Keep documents dated on or before this day
    #[arg(long)]
    end: Option<NaiveDate>,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => RunConfig::from_json_file(path)
            .with_context(|| format!("reading configuration {}", path.display()))?,
        None => RunConfig::default(),
    };
    if let Some(dict) = cli.dict {
        config.dictionary.path = Some(dict);
    }

    match cli.command {
        Commands::Score { docs, out, drop_no_topic, normalize } => {
            config.scoring.drop_no_topic |= drop_no_topic;
            config.scoring.normalize_topic_vec |= normalize;
            cmd_score(&config, &docs, &out)?;
        }
        Commands::Aggregate { input, out } => {
            let (dict, scored, raw) = load_aggregate_input(&mut config, &input)?;
            let agg = Aggregator::new(&dict, &config.aggregate)?;
            let series = agg.aggregate(&scored, raw.as_deref())?;
            let labels = labels(&dict, config.aggregate.kind);
            series
                .write_csv(&out, &labels)
                .with_context(|| format!("writing series {}", out.display()))?;
            info!(buckets = series.len(), out = %out.display(), "wrote aggregated series");
        }
        Commands::Sum { input, out } => {
            let (dict, scored, raw) = load_aggregate_input(&mut config, &input)?;
            let agg = Aggregator::new(&dict, &config.aggregate)?;
            let total = agg.aggregate_sum(&scored, raw.as_deref())?;
            write_ensemble(&out, &total).with_context(|| format!("writing sum {}", out.display()))?;
            info!(out = %out.display(), "wrote whole-period sum");
        }
        Commands::Bootstrap { input, runs, fraction, seed, sum, out } => {
            if let Some(runs) = runs {
                config.bootstrap.runs = runs;
            }
            if let Some(fraction) = fraction {
                config.bootstrap.sample_fraction = fraction;
            }
            if let Some(seed) = seed {
                config.bootstrap.seed = seed;
            }
            let (dict, scored, raw) = load_aggregate_input(&mut config, &input)?;
            let agg = Aggregator::new(&dict, &config.aggregate)?;
            let prepared = agg.prepare(&scored, raw.as_deref())?;
            let written = if sum {
                let ensemble = bootstrap_sum(&agg, &prepared, &config.bootstrap)?;
                write_ensemble(&out, &ensemble)
            } else {
                let ensemble = bootstrap_series(&agg, &prepared, &config.bootstrap)?;
                write_ensemble(&out, &ensemble)
            };
            written.with_context(|| format!("writing ensemble {}", out.display()))?;
            info!(out = %out.display(), "wrote bootstrap ensemble");
        }
        Commands::ExportDict { out, index_dir, cbor } => {
            let dict = load_dictionary(&config)?;
            dict.write_topic_words_json(&out)
                .with_context(|| format!("writing {}", out.display()))?;
            if let Some(dir) = index_dir {
                std::fs::create_dir_all(&dir)?;
                dict.topic_index_map()
                    .write_json_files(dir.join("index2topic.json"), dir.join("topic2index.json"))?;
            }
            if let Some(path) = cbor {
                dict.save_cbor(&path)
                    .with_context(|| format!("writing {}", path.display()))?;
            }
            info!(topics = dict.n_topics(), words = dict.n_words(), "exported dictionary");
        }
    }

    Ok(())
}

fn load_dictionary(config: &RunConfig) -> anyhow::Result<TopicDictionary> {
    if config.dictionary.path.is_none() {
        bail!("no dictionary given; pass --dict or set dictionary.path in the configuration");
    }
    config.dictionary.load().context("loading dictionary")
}

fn cmd_score(config: &RunConfig, docs_path: &Path, out: &Path) -> anyhow::Result<()> {
    let dict = load_dictionary(config)?;
    let docs: Vec<Document> =
        read_tsv(docs_path).with_context(|| format!("reading documents {}", docs_path.display()))?;
    let report = score_documents(&docs, &dict, &config.scoring);
    write_scored(out, &report.documents).with_context(|| format!("writing {}", out.display()))?;
    info!(
        documents = report.documents.len(),
        failed = report.failed,
        skipped = report.skipped,
        out = %out.display(),
        "wrote scored documents"
    );
    Ok(())
}

type AggregateInput = (TopicDictionary, Vec<ScoredDocument>, Option<Vec<Occurrence>>);

/// Merge flags into the configuration and read every input table.
fn load_aggregate_input(config: &mut RunConfig, args: &AggregateArgs) -> anyhow::Result<AggregateInput> {
    apply_flags(&mut config.aggregate, args);
    if let Some(path) = &args.popularity {
        config.popularity_path = Some(path.clone());
        config.aggregate.weight_by_popularity = true;
    }
    if let Some(path) = &config.popularity_path {
        let map = read_popularity(path).with_context(|| format!("reading popularity {}", path.display()))?;
        config.aggregate.popularity = Some(map);
    }

    let dict = load_dictionary(config)?;
    let mut scored =
        read_scored(&args.scored).with_context(|| format!("reading scored cache {}", args.scored.display()))?;
    let start = args.start.or(config.period_start);
    let end = args.end.or(config.period_end);
    if start.is_some() || end.is_some() {
        scored = trim_period(scored, start.unwrap_or(NaiveDate::MIN), end.unwrap_or(NaiveDate::MAX));
    }

    let raw = match (&args.raw, config.aggregate.source) {
        (Some(path), _) => Some(
            read_tsv::<Occurrence, _>(path).with_context(|| format!("reading occurrences {}", path.display()))?,
        ),
        (None, Source::Headline) => bail!("headline aggregation needs --raw"),
        (None, _) => None,
    };
    Ok((dict, scored, raw))
}

fn apply_flags(opts: &mut AggregateOptions, args: &AggregateArgs) {
    if let Some(source) = args.source {
        opts.source = source;
    }
    if let Some(kind) = args.kind {
        opts.kind = kind;
    }
    if let Some(candidate) = &args.candidate {
        opts.candidate = Some(candidate.clone());
    }
    if let Some(granularity) = args.granularity {
        opts.granularity = granularity;
    }
    if !args.window.is_empty() {
        opts.force_time_window = args.window.clone();
    } else if let (Some(from), Some(to)) = (args.window_from, args.window_to) {
        let g = opts.granularity;
        opts.force_time_window = date_range(bucket_of(from, g), bucket_of(to, g), g);
    }
}

fn labels(dict: &TopicDictionary, kind: VectorKind) -> Vec<String> {
    match kind {
        VectorKind::Topic => dict.topics().map(str::to_string).collect(),
        VectorKind::Word => dict.words().map(str::to_string).collect(),
    }
}
