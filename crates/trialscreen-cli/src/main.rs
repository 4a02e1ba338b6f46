//! TrialScreen CLI - clinical trial eligibility screening
//!
//! ## Commands
//!
//! - `validate`: Load and validate a trial catalog
//! - `screen`: Screen a patient cohort against one or all trials
//! - `rank`: Rank trials for one patient
//! - `show`: Full per-criterion trace for one patient and trial

mod output;
mod telemetry;

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, Level};

use output::Format;
use trialscreen_core::{
    evaluate, evaluate_cohort, load_cohort, rank_trials, EligibilityDecision, EligibilityStatus,
    Patient, StatusCounts, TrialCatalog, TrialCriteria,
};
use trialscreen_runtime::ScreeningReport;

#[derive(Parser)]
#[command(name = "trialscreen")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic clinical trial eligibility screening", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load and validate a trial catalog (YAML or JSON)
    Validate {
        /// Trial catalog file
        trials: PathBuf,
    },

    /// Screen a patient cohort against trials
    Screen {
        /// Trial catalog file (YAML or JSON)
        #[arg(short, long)]
        trials: PathBuf,

        /// Patient cohort file (JSON array)
        #[arg(short, long)]
        patients: PathBuf,

        /// Only screen against this trial
        #[arg(long)]
        trial: Option<String>,

        /// Only list patients with these statuses
        #[arg(long, value_enum)]
        status: Vec<StatusFilter>,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Rank trials for one patient, best match first
    Rank {
        /// Trial catalog file (YAML or JSON)
        #[arg(short, long)]
        trials: PathBuf,

        /// Patient cohort file (JSON array)
        #[arg(short, long)]
        patients: PathBuf,

        /// Patient to rank trials for
        #[arg(long)]
        patient: String,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },

    /// Show the per-criterion trace for one patient and trial
    Show {
        /// Trial catalog file (YAML or JSON)
        #[arg(short, long)]
        trials: PathBuf,

        /// Patient cohort file (JSON array)
        #[arg(short, long)]
        patients: PathBuf,

        /// Trial ID
        #[arg(long)]
        trial: String,

        /// Patient ID
        #[arg(long)]
        patient: String,

        /// Attach a rule-based narrative
        #[arg(long)]
        narrate: bool,

        /// Output format
        #[arg(short, long, value_enum, default_value = "text")]
        format: Format,
    },
}

/// Status selector for `screen --status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StatusFilter {
    Eligible,
    Uncertain,
    NotEligible,
}

impl From<StatusFilter> for EligibilityStatus {
    fn from(filter: StatusFilter) -> Self {
        match filter {
            StatusFilter::Eligible => EligibilityStatus::Eligible,
            StatusFilter::Uncertain => EligibilityStatus::Uncertain,
            StatusFilter::NotEligible => EligibilityStatus::NotEligible,
        }
    }
}

/// JSON/YAML shape of one trial's screening results.
#[derive(Serialize)]
struct TrialScreening<'a> {
    trial_id: &'a str,
    title: &'a str,
    counts: StatusCounts,
    decisions: Vec<EligibilityDecision>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { Level::DEBUG } else { Level::WARN };
    telemetry::init_tracing(cli.json_logs, level);

    match cli.command {
        Commands::Validate { trials } => cmd_validate(&trials),
        Commands::Screen {
            trials,
            patients,
            trial,
            status,
            format,
        } => cmd_screen(&trials, &patients, trial.as_deref(), &status, format),
        Commands::Rank {
            trials,
            patients,
            patient,
            format,
        } => cmd_rank(&trials, &patients, &patient, format),
        Commands::Show {
            trials,
            patients,
            trial,
            patient,
            narrate,
            format,
        } => cmd_show(&trials, &patients, &trial, &patient, narrate, format),
    }
}

fn load_catalog(path: &Path) -> Result<TrialCatalog> {
    let catalog = TrialCatalog::from_file(path)
        .with_context(|| format!("Failed to load trials from {}", path.display()))?;
    info!(path = %path.display(), trials = catalog.len(), "Loaded trial catalog");
    Ok(catalog)
}

fn load_patients(path: &Path) -> Result<Vec<Patient>> {
    let patients = load_cohort(path)
        .with_context(|| format!("Failed to load patients from {}", path.display()))?;
    info!(path = %path.display(), patients = patients.len(), "Loaded patient cohort");
    Ok(patients)
}

fn find_trial<'a>(catalog: &'a TrialCatalog, trial_id: &str) -> Result<&'a TrialCriteria> {
    catalog
        .get(trial_id)
        .ok_or_else(|| anyhow!("Trial {} not found in catalog", trial_id))
}

fn find_patient<'a>(patients: &'a [Patient], patient_id: &str) -> Result<&'a Patient> {
    patients
        .iter()
        .find(|p| p.patient_id == patient_id)
        .ok_or_else(|| anyhow!("Patient {} not found in cohort", patient_id))
}

fn cmd_validate(trials: &Path) -> Result<()> {
    let catalog = load_catalog(trials)?;

    println!("{}: {} trial(s) valid", trials.display(), catalog.len());
    for trial in catalog.trials() {
        println!(
            "  {} ({} criteria)",
            output::trial_header(trial),
            trial.len()
        );
    }
    Ok(())
}

fn cmd_screen(
    trials: &Path,
    patients: &Path,
    trial_id: Option<&str>,
    status: &[StatusFilter],
    format: Format,
) -> Result<()> {
    let catalog = load_catalog(trials)?;
    let cohort = load_patients(patients)?;

    let selected: Vec<&TrialCriteria> = match trial_id {
        Some(id) => vec![find_trial(&catalog, id)?],
        None => catalog.trials().iter().collect(),
    };
    let wanted: Vec<EligibilityStatus> = status.iter().map(|s| (*s).into()).collect();

    let mut screenings = Vec::with_capacity(selected.len());
    for trial in selected {
        let decisions = evaluate_cohort(&cohort, trial);
        // Counts cover the whole cohort; the filter only narrows the listing
        let counts = StatusCounts::from_decisions(&decisions);
        let decisions: Vec<EligibilityDecision> = decisions
            .into_iter()
            .filter(|d| wanted.is_empty() || wanted.contains(&d.status))
            .collect();

        screenings.push((trial, counts, decisions));
    }

    let view: Vec<TrialScreening> = screenings
        .iter()
        .map(|(trial, counts, decisions)| TrialScreening {
            trial_id: trial.trial_id(),
            title: trial.title(),
            counts: *counts,
            decisions: decisions.clone(),
        })
        .collect();

    if let Some(text) = output::structured(&view, format)? {
        println!("{}", text);
        return Ok(());
    }

    for (trial, counts, decisions) in &screenings {
        println!("{}", output::trial_header(trial));
        for decision in decisions {
            println!("{}", output::decision_line(decision));
        }
        println!("{}", output::counts_line(counts));
        println!();
    }
    Ok(())
}

fn cmd_rank(trials: &Path, patients: &Path, patient_id: &str, format: Format) -> Result<()> {
    let catalog = load_catalog(trials)?;
    let cohort = load_patients(patients)?;
    let patient = find_patient(&cohort, patient_id)?;

    let ranked = rank_trials(patient, catalog.trials());

    match output::structured(&ranked, format)? {
        Some(text) => println!("{}", text),
        None => println!("{}", output::ranking(patient_id, &ranked)),
    }
    Ok(())
}

fn cmd_show(
    trials: &Path,
    patients: &Path,
    trial_id: &str,
    patient_id: &str,
    narrate: bool,
    format: Format,
) -> Result<()> {
    let catalog = load_catalog(trials)?;
    let cohort = load_patients(patients)?;
    let trial = find_trial(&catalog, trial_id)?;
    let patient = find_patient(&cohort, patient_id)?;

    let decision = evaluate(patient, trial);

    if narrate {
        let report = ScreeningReport::rule_based(decision);
        if let Some(text) = output::structured(&report, format)? {
            println!("{}", text);
            return Ok(());
        }
        println!("{}", output::decision_detail(&report.decision, trial));
        if let Some(narrative) = report.explanation.narrative() {
            println!();
            println!("{}", output::narrative(narrative));
        }
        return Ok(());
    }

    match output::structured(&decision, format)? {
        Some(text) => println!("{}", text),
        None => println!("{}", output::decision_detail(&decision, trial)),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_screen_filters() {
        let cli = Cli::try_parse_from([
            "trialscreen",
            "screen",
            "--trials",
            "trials.yaml",
            "--patients",
            "patients.json",
            "--status",
            "eligible",
            "--status",
            "not-eligible",
            "--format",
            "json",
        ])
        .unwrap();

        match cli.command {
            Commands::Screen { status, format, .. } => {
                assert_eq!(status, vec![StatusFilter::Eligible, StatusFilter::NotEligible]);
                assert_eq!(format, Format::Json);
            }
            _ => panic!("expected screen command"),
        }
    }

    #[test]
    fn test_cli_global_flags() {
        let cli = Cli::try_parse_from([
            "trialscreen",
            "validate",
            "trials.yaml",
            "--verbose",
            "--json-logs",
        ])
        .unwrap();

        assert!(cli.verbose);
        assert!(cli.json_logs);
    }

    #[test]
    fn test_status_filter_maps_to_status() {
        assert_eq!(
            EligibilityStatus::from(StatusFilter::NotEligible),
            EligibilityStatus::NotEligible
        );
    }
}
