//! Taskcanon CLI
//!
//! Canonicalizes free-text maintenance task descriptions:
//! - `run`: the full pipeline, writing the universal dictionary (+ audit,
//!   semantic report, optional escalation of ambiguous groups)
//! - `group`: lexical grouping of whole descriptions only, for review
//! - `semantic`: embedding-based clustering of action tokens
//! - `report`: per-task-type counts against an existing dictionary

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{fmt, EnvFilter};

use taskcanon_cli::{
    read_dataset, run_pipeline, semantic_report, PipelineConfig, PipelineRun, SemanticSettings, Settings,
    Similarity, Threshold,
};
use taskcanon_cluster::{group_with, Admission, GroupingPolicy, LexicalOptions, SemanticClustering};
use taskcanon_dictionary::{
    task_counts, write_audit, CanonicalDictionary, Corpus, DictionaryBuilder, DictionaryDraft, EscalationReport,
    VerbLexicon,
};
use taskcanon_text::{extract_action, SynonymTable};

#[derive(Parser)]
#[command(name = "taskcanon")]
#[command(
    author,
    version,
    about = "Taskcanon: canonical labels for maintenance task descriptions"
)]
struct Cli {
    /// Debug-level logging (RUST_LOG takes precedence).
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the whole pipeline and write the universal dictionary.
    Run {
        #[command(flatten)]
        data: DataArgs,
        /// Output dictionary JSON
        #[arg(short, long)]
        out: PathBuf,
        /// Output audit table (group;id;description;max_distance)
        #[arg(long)]
        audit: Option<PathBuf>,
        /// Output semantic clustering report (enables the semantic stage)
        #[arg(long)]
        semantic_report: Option<PathBuf>,
        /// Send ambiguous groups to the labeling service
        #[arg(long)]
        escalate: bool,
        #[command(flatten)]
        overrides: PipelineArgs,
    },

    /// Group whole descriptions lexically and print/write the groups.
    Group {
        #[command(flatten)]
        data: DataArgs,
        /// Maximum edit distance to the group center
        #[arg(long, default_value = "2", allow_hyphen_values = true)]
        threshold: f64,
        /// Admit on similarity `1 - d/max(len)` instead of a raw distance
        #[arg(long)]
        min_similarity: Option<f64>,
        /// center-fixed or windowed
        #[arg(long, default_value = "center-fixed")]
        policy: String,
        /// full or object
        #[arg(long, default_value = "full")]
        key: String,
        /// Compare items across different first letters
        #[arg(long)]
        no_pruning: bool,
        /// Output audit table
        #[arg(long)]
        audit: Option<PathBuf>,
        /// Number of multi-member groups to print
        #[arg(long, default_value = "20")]
        show: usize,
    },

    /// Cluster action tokens by embedding similarity.
    Semantic {
        #[command(flatten)]
        data: DataArgs,
        /// token-hash or ollama
        #[arg(long)]
        backend: Option<String>,
        /// Embedding model name (ollama)
        #[arg(long)]
        model: Option<String>,
        /// Output report JSON (stdout when omitted)
        #[arg(short, long)]
        out: Option<PathBuf>,
    },

    /// Count tasks per canonical label using an existing dictionary.
    Report {
        #[command(flatten)]
        data: DataArgs,
        /// Universal dictionary JSON
        #[arg(long)]
        dict: PathBuf,
        /// Synonym table JSON
        #[arg(long)]
        synonyms: Option<PathBuf>,
        /// Number of rows to print
        #[arg(long, default_value = "30")]
        top: usize,
        /// Print the full ranking as JSON
        #[arg(long)]
        json: bool,
    },
}

/// Dataset location and table shape, shared by every subcommand.
#[derive(Args, Clone)]
struct DataArgs {
    /// Input task table
    #[arg(short, long)]
    input: PathBuf,
    /// Pipeline config JSON
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    separator: Option<String>,
    #[arg(long)]
    description_column: Option<String>,
    #[arg(long)]
    id_column: Option<String>,
}

/// Flag overrides for the `run` configuration.
#[derive(Args, Clone, Default)]
struct PipelineArgs {
    /// Action-token edit distance threshold
    #[arg(long, allow_hyphen_values = true)]
    action_threshold: Option<f64>,
    /// center-fixed or windowed
    #[arg(long)]
    policy: Option<String>,
    /// Compare action tokens across different first letters
    #[arg(long)]
    no_pruning: bool,
    #[arg(long, allow_hyphen_values = true)]
    object_threshold: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    refine_max_size: Option<f64>,
    #[arg(long, allow_hyphen_values = true)]
    refine_threshold: Option<f64>,
    /// Keep size-1 sub-groups produced by refinement
    #[arg(long)]
    keep_singletons: bool,
    #[arg(long, allow_hyphen_values = true)]
    ambiguity_diameter: Option<f64>,
    /// Synonym table JSON
    #[arg(long)]
    synonyms: Option<PathBuf>,
    /// Verb list, one infinitive per line
    #[arg(long)]
    verbs: Option<PathBuf>,
    /// Keep only descriptions containing one of these words
    #[arg(long, value_delimiter = ',')]
    include: Vec<String>,
    /// Drop descriptions containing any of these words
    #[arg(long, value_delimiter = ',')]
    exclude: Vec<String>,
    /// token-hash or ollama
    #[arg(long)]
    backend: Option<String>,
    #[arg(long)]
    model: Option<String>,
}

impl DataArgs {
    fn load_config(&self) -> Result<PipelineConfig> {
        let mut config = match &self.config {
            Some(path) => PipelineConfig::load(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(sep) = &self.separator {
            config.separator = sep.clone();
        }
        if let Some(column) = &self.description_column {
            config.description_column = column.clone();
        }
        if let Some(column) = &self.id_column {
            config.id_column = column.clone();
        }
        Ok(config)
    }
}

impl PipelineArgs {
    fn apply(self, config: &mut PipelineConfig) {
        if let Some(v) = self.action_threshold {
            config.action_threshold = v;
        }
        if let Some(policy) = self.policy {
            config.action_policy = policy;
        }
        if self.no_pruning {
            config.first_letter_pruning = false;
        }
        if let Some(v) = self.object_threshold {
            config.object_threshold = v;
        }
        if let Some(v) = self.refine_max_size {
            config.refine_max_size = v;
        }
        if let Some(v) = self.refine_threshold {
            config.refine_threshold = v;
        }
        if self.keep_singletons {
            config.keep_singletons = true;
        }
        if let Some(v) = self.ambiguity_diameter {
            config.ambiguity_diameter = v;
        }
        if self.synonyms.is_some() {
            config.synonyms = self.synonyms;
        }
        if self.verbs.is_some() {
            config.verbs = self.verbs;
        }
        if !self.include.is_empty() {
            config.include_words = self.include;
        }
        if !self.exclude.is_empty() {
            config.exclude_words = self.exclude;
        }
        if let Some(backend) = self.backend {
            config.semantic.backend = backend;
        }
        if let Some(model) = self.model {
            config.semantic.model = model;
        }
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match cli.command {
        Commands::Run {
            data,
            out,
            audit,
            semantic_report,
            escalate,
            overrides,
        } => {
            let mut config = data.load_config()?;
            overrides.apply(&mut config);
            if semantic_report.is_some() {
                config.semantic.enabled = true;
            }
            cmd_run(&data.input, &config, &out, audit.as_deref(), semantic_report.as_deref(), escalate)
        }
        Commands::Group {
            data,
            threshold,
            min_similarity,
            policy,
            key,
            no_pruning,
            audit,
            show,
        } => {
            let config = data.load_config()?;
            let threshold = Threshold::parse("threshold", threshold)?;
            let mut opts = LexicalOptions::new(threshold.0, policy.parse()?)
                .with_key(key.parse()?)
                .with_pruning(!no_pruning);
            if let Some(raw) = min_similarity {
                if opts.policy != GroupingPolicy::CenterFixed {
                    return Err(anyhow!("--min-similarity only applies to the center-fixed policy"));
                }
                opts.admission = Admission::MinSimilarity(Similarity::parse("min_similarity", raw)?.0);
            }
            cmd_group(&data.input, &config, &opts, audit.as_deref(), show)
        }
        Commands::Semantic {
            data,
            backend,
            model,
            out,
        } => {
            let mut config = data.load_config()?;
            config.semantic.enabled = true;
            if let Some(backend) = backend {
                config.semantic.backend = backend;
            }
            if let Some(model) = model {
                config.semantic.model = model;
            }
            cmd_semantic(&data.input, &config, out.as_deref())
        }
        Commands::Report {
            data,
            dict,
            synonyms,
            top,
            json,
        } => {
            let config = data.load_config()?;
            cmd_report(&data.input, &config, &dict, synonyms.as_deref(), top, json)
        }
    }
}

// ============================================================================
// Shared loading
// ============================================================================

fn load_corpus(input: &Path, settings: &Settings) -> Result<Corpus> {
    println!("{} {}", "Reading".green().bold(), input.display());
    let mut corpus = read_dataset(input, &settings.dataset)?;
    if !settings.filter.is_empty() {
        let before = corpus.len();
        corpus.retain(|phrase| settings.filter.accepts(phrase));
        tracing::info!(before, after = corpus.len(), "keyword filter applied");
        if corpus.is_empty() {
            return Err(anyhow!("no description in `{}` passes the keyword filter", input.display()));
        }
    }
    Ok(corpus)
}

fn load_synonyms(path: Option<&Path>) -> Result<SynonymTable> {
    match path {
        Some(path) => {
            let table = SynonymTable::from_path(path)
                .with_context(|| format!("loading synonym table `{}`", path.display()))?;
            tracing::info!(entries = table.len(), "synonym table loaded");
            Ok(table)
        }
        None => Ok(SynonymTable::new()),
    }
}

fn load_lexicon(path: Option<&Path>) -> Result<VerbLexicon> {
    match path {
        Some(path) => {
            let lexicon =
                VerbLexicon::from_path(path).with_context(|| format!("loading verb list `{}`", path.display()))?;
            tracing::info!(verbs = lexicon.len(), "verb list loaded");
            Ok(lexicon)
        }
        None => Ok(VerbLexicon::builtin()),
    }
}

fn write_json(path: &Path, json: &str) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, json).with_context(|| format!("writing `{}`", path.display()))?;
    println!("  {} {}", "→".cyan(), path.display());
    Ok(())
}

// ============================================================================
// run
// ============================================================================

fn cmd_run(
    input: &Path,
    config: &PipelineConfig,
    out: &Path,
    audit: Option<&Path>,
    semantic_out: Option<&Path>,
    escalate: bool,
) -> Result<()> {
    let settings = config.validate()?;
    let synonyms = load_synonyms(settings.synonyms.as_deref())?;
    let lexicon = load_lexicon(settings.verbs.as_deref())?;
    let labeling = if escalate { Some(labeling_setup()?) } else { None };
    let corpus = load_corpus(input, &settings)?;

    let mut run = run_pipeline(&corpus, &settings, &synonyms, &lexicon);
    print_counts(&run);

    if let (Some(semantic), Some(path)) = (settings.semantic.as_ref(), semantic_out) {
        write_semantic_report(&run.verb_labels(), semantic, Some(path))?;
    }

    if let Some(labeling) = labeling {
        let report = labeling.escalate(&mut run.draft)?;
        print_escalation(&report);
    }

    let json = run.draft.dictionary.to_json_string()?;
    println!(
        "{} dictionary: {} entries, {} labels",
        "Writing".green().bold(),
        run.draft.dictionary.len(),
        run.draft.dictionary.label_count()
    );
    write_json(out, &json)?;

    if let Some(path) = audit {
        write_audit(path, &run.draft, &corpus)?;
        println!("  {} {}", "→".cyan(), path.display());
    }
    Ok(())
}

fn print_counts(run: &PipelineRun) {
    let c = &run.counts;
    println!("{}", "Pipeline".green().bold());
    println!("  records          {}", c.records);
    println!("  distinct phrases {}", c.phrases);
    println!("  action tokens    {} → {} groups → {} merged", c.actions, c.action_groups, c.merged_groups);
    println!("  verb labels      {}", run.verb_labels().len());
    println!(
        "  object groups    {} → {} refined ({} ungrouped)",
        c.object_groups, c.refined_groups, c.ungrouped
    );
    println!("  dictionary       {} entries, {} labels", c.entries, c.labels);
    if c.ambiguous > 0 {
        println!("  {} {}", "ambiguous groups".yellow(), c.ambiguous);
    }
}

fn print_escalation(report: &EscalationReport) {
    println!(
        "{} {} groups: {} resolved, {} entries relabeled",
        "Escalated".green().bold(),
        report.escalated,
        report.resolved,
        report.relabeled
    );
    for incident in &report.incidents {
        println!(
            "  {} group {} ({}, {} members): kept `{}` after {} attempt(s): {}",
            "!".yellow().bold(),
            incident.group,
            incident.context,
            incident.members,
            incident.fallback_label,
            incident.attempts,
            incident.error
        );
    }
}

#[cfg(feature = "labeling-http")]
struct Labeling {
    config: taskcanon_labeling::LabelingConfig,
}

#[cfg(feature = "labeling-http")]
fn labeling_setup() -> Result<Labeling> {
    let config = taskcanon_labeling::LabelingConfig::from_env()
        .context("escalation requires TASKCANON_LABELING_API_KEY")?;
    Ok(Labeling { config })
}

#[cfg(feature = "labeling-http")]
impl Labeling {
    fn escalate(self, draft: &mut DictionaryDraft) -> Result<EscalationReport> {
        use taskcanon_dictionary::escalate_groups;
        use taskcanon_labeling::{CancelHandle, Escalator, HttpLabelingClient, DEFAULT_RESERVED_TOKENS};

        let pending = draft.ambiguous().count();
        if pending == 0 {
            println!("{} nothing ambiguous to escalate", "Escalation".green().bold());
            return Ok(EscalationReport::default());
        }
        println!(
            "{} {} ambiguous groups to {}",
            "Escalating".green().bold(),
            pending,
            self.config.base_url
        );

        let policy = self.config.policy;
        let escalator = Escalator::new(HttpLabelingClient::new(self.config)?, policy);
        let runtime = tokio::runtime::Runtime::new()?;
        let report = runtime.block_on(async {
            let (handle, cancel) = CancelHandle::new();
            let interrupt = tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupt received, cancelling escalation");
                    handle.cancel();
                }
            });
            let report = escalate_groups(draft, &escalator, DEFAULT_RESERVED_TOKENS, &cancel).await;
            interrupt.abort();
            report
        });
        Ok(report)
    }
}

#[cfg(not(feature = "labeling-http"))]
struct Labeling;

#[cfg(not(feature = "labeling-http"))]
fn labeling_setup() -> Result<Labeling> {
    Err(anyhow!("escalation not compiled in (enable the `labeling-http` feature)"))
}

#[cfg(not(feature = "labeling-http"))]
impl Labeling {
    fn escalate(self, _draft: &mut DictionaryDraft) -> Result<EscalationReport> {
        Ok(EscalationReport::default())
    }
}

// ============================================================================
// group
// ============================================================================

fn cmd_group(
    input: &Path,
    config: &PipelineConfig,
    opts: &LexicalOptions,
    audit: Option<&Path>,
    show: usize,
) -> Result<()> {
    let settings = config.validate()?;
    let lexicon = load_lexicon(settings.verbs.as_deref())?;
    let corpus = load_corpus(input, &settings)?;

    let groups = group_with(corpus.normalized(), opts);
    let draft = DictionaryBuilder::new(lexicon)
        .with_ambiguity_diameter(settings.ambiguity_diameter)
        .build(&corpus, &groups);

    let multi: Vec<_> = draft.groups.iter().filter(|g| g.members.len() > 1).collect();
    println!(
        "{} {} groups ({} with more than one member), policy {}, threshold {}",
        "Grouped".green().bold(),
        draft.groups.len(),
        multi.len(),
        opts.policy,
        opts.admission
    );
    let mut largest = multi.clone();
    largest.sort_by(|a, b| b.members.len().cmp(&a.members.len()).then(a.id.cmp(&b.id)));
    for group in largest.into_iter().take(show) {
        let marker = if group.ambiguous { "?".yellow() } else { " ".normal() };
        println!(
            "  {}{:>4} {} (max distance {})",
            marker,
            group.id,
            group.label.bold(),
            group.max_distance
        );
        for member in group.members.iter().filter(|m| **m != group.label) {
            println!("         {}", member.dimmed());
        }
    }

    if let Some(path) = audit {
        write_audit(path, &draft, &corpus)?;
        println!("  {} {}", "→".cyan(), path.display());
    }
    Ok(())
}

// ============================================================================
// semantic
// ============================================================================

fn cmd_semantic(input: &Path, config: &PipelineConfig, out: Option<&Path>) -> Result<()> {
    let settings = config.validate()?;
    let semantic = settings
        .semantic
        .as_ref()
        .ok_or_else(|| anyhow!("semantic stage is disabled"))?;
    let corpus = load_corpus(input, &settings)?;

    let actions: BTreeSet<String> = corpus
        .normalized()
        .iter()
        .map(|form| extract_action(form, &settings.action_rules))
        .filter(|a| !a.is_empty())
        .collect();
    let actions: Vec<String> = actions.into_iter().collect();
    write_semantic_report(&actions, semantic, out)
}

/// Clustering failures are reported and skipped; only I/O on the output
/// file is an error.
fn write_semantic_report(labels: &[String], settings: &SemanticSettings, out: Option<&Path>) -> Result<()> {
    println!(
        "{} {} labels with {} ({})",
        "Clustering".green().bold(),
        labels.len(),
        settings.backend,
        settings.model
    );
    let report = match semantic_report(labels, settings) {
        Ok(report) => report,
        Err(err) => {
            tracing::warn!(error = %err, "semantic clustering failed");
            println!("  {} semantic clustering skipped: {}", "!".yellow().bold(), err);
            return Ok(());
        }
    };
    print_semantic(&report);

    let json = serde_json::to_string_pretty(&report)?;
    match out {
        Some(path) => write_json(path, &json),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn print_semantic(report: &SemanticClustering) {
    println!(
        "  {} clusters, {} noise points, {} rescued",
        report.clusters.len(),
        report.noise,
        report.rescued.len()
    );
    for (id, members) in &report.clusters {
        let center = report.centers.get(id).map(String::as_str).unwrap_or("-");
        tracing::debug!(cluster = id, center, size = members.len(), "semantic cluster");
    }
}

// ============================================================================
// report
// ============================================================================

fn cmd_report(
    input: &Path,
    config: &PipelineConfig,
    dict: &Path,
    synonyms: Option<&Path>,
    top: usize,
    json: bool,
) -> Result<()> {
    let settings = config.validate()?;
    let dictionary = CanonicalDictionary::load_json(dict)?;
    let synonyms = load_synonyms(synonyms.or(settings.synonyms.as_deref()))?;
    let corpus = load_corpus(input, &settings)?;

    let records: Vec<_> = corpus.records().collect();
    let counts = task_counts(records.iter().map(|r| r.text.as_str()), &dictionary, &synonyms);

    if json {
        println!("{}", serde_json::to_string_pretty(&counts)?);
        return Ok(());
    }
    println!(
        "{} {} tasks, {} task types",
        "Counted".green().bold(),
        records.len(),
        counts.len()
    );
    for (label, count) in counts.iter().take(top) {
        println!("  {:>6}  {}", count, label);
    }
    let unmapped = records
        .iter()
        .filter(|r| dictionary.lookup(&r.text).is_none())
        .count();
    if unmapped > 0 {
        println!("  {} {} tasks not in the dictionary", "!".yellow().bold(), unmapped);
    }
    Ok(())
}
