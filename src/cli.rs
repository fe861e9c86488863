//! `lexai` command line: one-shot redaction and annotation, plus an
//! interactive audit session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;

use lexai::config::Config;
use lexai::error::ANALYSIS_FALLBACK_MESSAGE;
use lexai::legal::analysis::Completion;
use lexai::legal::audit::{self, AuditTrail};
use lexai::legal::document::ContractDocument;
use lexai::legal::overlay::{AnnotatedText, Segment};
use lexai::legal::redaction::Redactor;
use lexai::legal::session::{Dashboard, SessionState};
use lexai::llm::ExtractionResponse;
use lexai::llm::gemini::GeminiClient;
use lexai::{AuditDesk, DeskOptions, Settings};

#[derive(Parser, Debug)]
#[command(name = "lexai")]
#[command(about = "Contract risk audit with LGPD redaction")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to ~/.lexai/settings.toml)
    #[arg(long, global = true, env = "LEXAI_SETTINGS")]
    settings: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print a contract with personal identifiers masked
    Redact {
        file: PathBuf,

        /// Print per-rule match counts to stderr
        #[arg(long)]
        report: bool,
    },

    /// Overlay findings from a JSON file onto a contract
    Annotate {
        file: PathBuf,

        /// Extraction result (`{"risks": [...], "summary": ...}`)
        #[arg(long)]
        findings: PathBuf,

        /// Highlight text to mark as selected
        #[arg(long)]
        select: Option<String>,

        /// Annotate the raw text instead of the redacted text
        #[arg(long)]
        raw: bool,

        /// Emit the rendered document as JSON instead of HTML
        #[arg(long)]
        json: bool,
    },

    /// Analyze a contract and open an interactive review session
    Audit {
        #[arg(required_unless_present = "sample")]
        file: Option<PathBuf>,

        /// Use the built-in sample contract
        #[arg(long, conflicts_with = "file")]
        sample: bool,

        /// Print the dashboard and exit without opening the REPL
        #[arg(long)]
        no_chat: bool,
    },

    /// Check the hash chain of an audit log
    VerifyAudit {
        /// Log to check (defaults to the configured audit path)
        path: Option<PathBuf>,
    },
}

pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.settings.as_deref())?;
    match cli.command {
        Command::Redact { file, report } => cmd_redact(&config, &file, report),
        Command::Annotate {
            file,
            findings,
            select,
            raw,
            json,
        } => cmd_annotate(&config, &file, &findings, select, raw, json),
        Command::Audit {
            file,
            sample,
            no_chat,
        } => cmd_audit(&config, file.as_deref(), sample, no_chat).await,
        Command::VerifyAudit { path } => {
            cmd_verify_audit(path.as_deref().unwrap_or(config.audit.path.as_path()))
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<Config> {
    let settings = match path.map(Path::to_path_buf).or_else(Settings::default_path) {
        Some(path) => Settings::load(&path)?,
        None => Settings::default(),
    };
    Ok(Config::resolve(&settings)?)
}

fn cmd_redact(config: &Config, file: &Path, report: bool) -> anyhow::Result<()> {
    let document = ContractDocument::from_path(file)?;
    let redactor = Redactor::from_config(&config.redaction);
    let (text, counts) = redactor.redact_with_report(document.content());
    println!("{text}");

    if report {
        for kind in redactor.rule_kinds() {
            eprintln!("{:>8}: {}", kind.as_str(), counts.count(kind));
        }
        eprintln!("{:>8}: {}", "total", counts.total());
    }
    Ok(())
}

fn cmd_annotate(
    config: &Config,
    file: &Path,
    findings: &Path,
    select: Option<String>,
    raw: bool,
    json: bool,
) -> anyhow::Result<()> {
    let document = ContractDocument::from_path(file)?;
    let payload = std::fs::read_to_string(findings)
        .with_context(|| format!("failed to read findings file {}", findings.display()))?;
    let response: ExtractionResponse = serde_json::from_str(&payload)
        .with_context(|| format!("failed to parse findings file {}", findings.display()))?;

    let mut state = SessionState::new(
        Redactor::from_config(&config.redaction),
        config.redaction.hidden_finding_policy,
        !raw,
    );
    let ticket = state.load_document(document);
    if let Completion::Failed { reason } = state.complete_analysis(&ticket, Ok(response)) {
        bail!("invalid findings file: {reason}");
    }
    state.select_highlight(select);

    let rendered = state
        .render()
        .context("no document loaded after annotation")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&rendered)?);
    } else {
        println!("{}", rendered.annotated.to_html());
    }

    for id in &rendered.annotated.unmatched {
        eprintln!("not found in text: {id}");
    }
    for id in &rendered.hidden {
        eprintln!("masked by redaction: {id}");
    }
    Ok(())
}

async fn cmd_audit(
    config: &Config,
    file: Option<&Path>,
    sample: bool,
    no_chat: bool,
) -> anyhow::Result<()> {
    let document = match file {
        Some(path) if !sample => ContractDocument::from_path(path)?,
        _ => ContractDocument::sample(),
    };

    let client = Arc::new(GeminiClient::new(&config.llm)?);
    let trail = AuditTrail::from_config(&config.audit)?;
    let desk = AuditDesk::new(DeskOptions::from_config(config), client.clone(), client)
        .with_audit(trail);

    println!("Analyzing {} ...", document.name);
    if let Completion::Failed { .. } = desk.open(document).await {
        println!("{ANALYSIS_FALLBACK_MESSAGE}");
    }
    if let Some(dashboard) = desk.dashboard().await {
        print_dashboard(&dashboard);
    }

    if !no_chat {
        repl(&desk).await?;
    }

    let counters = desk.audit_counters();
    tracing::info!(
        redactions = counters.redactions,
        stale_results = counters.stale_results,
        failed_analyses = counters.failed_analyses,
        "Audit session closed"
    );
    Ok(())
}

fn cmd_verify_audit(path: &Path) -> anyhow::Result<()> {
    let records = audit::verify(path)?;
    println!("{}: {records} records, chain intact", path.display());
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ReplCommand {
    Risks,
    Validate(String),
    Select(usize),
    Clear,
    Privacy(bool),
    Show,
    Dashboard,
    Reanalyze,
    Help,
    Quit,
    Ask(String),
}

impl ReplCommand {
    fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        let Some(command) = line.strip_prefix(':') else {
            return Ok(Self::Ask(line.to_string()));
        };

        let (name, arg) = match command.split_once(char::is_whitespace) {
            Some((name, arg)) => (name, arg.trim()),
            None => (command, ""),
        };

        match (name, arg) {
            ("risks", "") => Ok(Self::Risks),
            ("validate", "") => Err("usage: :validate <finding-id>".to_string()),
            ("validate", id) => Ok(Self::Validate(id.to_string())),
            ("select", n) => n
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .map(Self::Select)
                .ok_or_else(|| "usage: :select <n> (1-based, see :risks)".to_string()),
            ("clear", "") => Ok(Self::Clear),
            ("privacy", "on") => Ok(Self::Privacy(true)),
            ("privacy", "off") => Ok(Self::Privacy(false)),
            ("privacy", _) => Err("usage: :privacy on|off".to_string()),
            ("show", "") => Ok(Self::Show),
            ("dashboard", "") => Ok(Self::Dashboard),
            ("reanalyze", "") => Ok(Self::Reanalyze),
            ("help", "") => Ok(Self::Help),
            ("quit" | "q" | "exit", "") => Ok(Self::Quit),
            _ => Err(format!("unknown command ':{command}', try :help")),
        }
    }
}

const HELP: &str = "\
:risks              list findings
:validate <id>      toggle reviewer validation
:select <n>         select the n-th finding's highlight
:clear              clear the selection
:privacy on|off     toggle LGPD redaction
:show               print the annotated document
:dashboard          print the risk dashboard
:reanalyze          run the risk extraction again
:quit               leave
anything else is sent to the legal assistant";

fn history_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".lexai").join("history"))
}

async fn repl(desk: &AuditDesk) -> anyhow::Result<()> {
    let mut editor = DefaultEditor::new()?;
    let history = history_path();
    if let Some(path) = history.as_deref() {
        let _ = editor.load_history(path);
    }
    println!("Type a question about the contract, or :help.");

    loop {
        let line = match editor.readline("lexai> ") {
            Ok(line) => line,
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e.into()),
        };
        if line.trim().is_empty() {
            continue;
        }
        let _ = editor.add_history_entry(line.as_str());

        let command = match ReplCommand::parse(&line) {
            Ok(command) => command,
            Err(usage) => {
                println!("{usage}");
                continue;
            }
        };
        if command == ReplCommand::Quit {
            break;
        }
        handle(desk, command).await;
    }

    if let Some(path) = history.as_deref() {
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        if let Err(e) = editor.save_history(path) {
            tracing::debug!("Failed to save REPL history: {}", e);
        }
    }
    Ok(())
}

async fn handle(desk: &AuditDesk, command: ReplCommand) {
    match command {
        ReplCommand::Risks => match desk.dashboard().await {
            Some(dashboard) => print_findings(&dashboard),
            None => println!("No document loaded."),
        },
        ReplCommand::Validate(id) => match desk.toggle_validated(&id).await {
            Ok(true) => println!("{id} validated"),
            Ok(false) => println!("{id} no longer validated"),
            Err(e) => println!("{e}"),
        },
        ReplCommand::Select(n) => {
            let id = desk
                .dashboard()
                .await
                .and_then(|d| d.findings.get(n - 1).map(|f| f.id().to_string()));
            match id {
                Some(id) => match desk.select_finding(&id).await {
                    Ok(()) => show(desk).await,
                    Err(e) => println!("{e}"),
                },
                None => println!("No finding #{n}."),
            }
        }
        ReplCommand::Clear => desk.select_highlight(None).await,
        ReplCommand::Privacy(enabled) => {
            desk.set_privacy_mode(enabled).await;
            println!("LGPD redaction {}", if enabled { "on" } else { "off" });
        }
        ReplCommand::Show => show(desk).await,
        ReplCommand::Dashboard => {
            if let Some(dashboard) = desk.dashboard().await {
                print_dashboard(&dashboard);
            }
        }
        ReplCommand::Reanalyze => {
            let Some(ticket) = desk.reanalyze().await else {
                println!("No document loaded.");
                return;
            };
            println!("Analyzing ...");
            if let Completion::Failed { .. } = desk.run_analysis(&ticket).await {
                println!("{ANALYSIS_FALLBACK_MESSAGE}");
            }
            if let Some(dashboard) = desk.dashboard().await {
                print_dashboard(&dashboard);
            }
        }
        ReplCommand::Help => println!("{HELP}"),
        ReplCommand::Quit => {}
        ReplCommand::Ask(question) => match desk.send_chat(&question).await {
            Ok(answer) => println!("\n{}\n", answer.content),
            Err(e) => println!("{}", e.user_message()),
        },
    }
}

async fn show(desk: &AuditDesk) {
    match desk.render().await {
        Some(rendered) => {
            println!("{}", terminal_markup(&rendered.annotated));
            if !rendered.hidden.is_empty() {
                println!("\nMasked by redaction: {}", rendered.hidden.join(", "));
            }
        }
        None => println!("No document loaded."),
    }
}

/// Highlights as `[[text]]{severity}`, selected ones as `[[>text<]]{severity}`.
fn terminal_markup(annotated: &AnnotatedText) -> String {
    let mut out = String::new();
    for segment in &annotated.segments {
        match segment {
            Segment::Text { text } => out.push_str(text),
            Segment::Highlight(h) => {
                let (open, close) = if h.is_selected { ("[[>", "<]]") } else { ("[[", "]]") };
                out.push_str(open);
                out.push_str(&h.text);
                out.push_str(close);
                out.push('{');
                out.push_str(h.severity.as_str());
                out.push('}');
            }
        }
    }
    out
}

fn print_dashboard(dashboard: &Dashboard) {
    println!();
    println!("{} [{}]", dashboard.document_name, dashboard.status.as_str());
    if !dashboard.parties.is_empty() {
        println!("Parties: {}", dashboard.parties.join(" / "));
    }
    println!(
        "Value: {} | jurisdiction: {} | expires: {}",
        dashboard.value, dashboard.jurisdiction, dashboard.expiry_date,
    );
    println!(
        "Risk level: {} | critical: {} | findings: {} | validated: {}%",
        dashboard.level.as_str(),
        dashboard.metrics.critical_count,
        dashboard.metrics.total,
        dashboard.metrics.validated_percentage,
    );
    if let Some(summary) = &dashboard.summary {
        println!("\n{summary}");
    }
    print_findings(dashboard);
}

fn print_findings(dashboard: &Dashboard) {
    if dashboard.findings.is_empty() {
        println!("No findings.");
        return;
    }
    println!();
    for (n, finding) in dashboard.findings.iter().enumerate() {
        let mut flags = String::new();
        if finding.validated() {
            flags.push_str(" [validated]");
        }
        if dashboard.hidden.iter().any(|h| h == finding.id()) {
            flags.push_str(" [masked]");
        }
        println!(
            "{:>2}. {} ({}) {}{}",
            n + 1,
            finding.clause,
            finding.severity.as_str(),
            finding.id(),
            flags
        );
        println!("    {}", finding.description);
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn plain_lines_are_questions() {
        assert_eq!(
            ReplCommand::parse("  Is clause 4.2 enforceable? "),
            Ok(ReplCommand::Ask("Is clause 4.2 enforceable?".to_string()))
        );
    }

    #[test]
    fn commands_parse_with_arguments() {
        assert_eq!(ReplCommand::parse(":risks"), Ok(ReplCommand::Risks));
        assert_eq!(
            ReplCommand::parse(":validate risk-0-1"),
            Ok(ReplCommand::Validate("risk-0-1".to_string()))
        );
        assert_eq!(ReplCommand::parse(":select 2"), Ok(ReplCommand::Select(2)));
        assert_eq!(ReplCommand::parse(":privacy off"), Ok(ReplCommand::Privacy(false)));
        assert_eq!(ReplCommand::parse(":q"), Ok(ReplCommand::Quit));
    }

    #[test]
    fn bad_arguments_report_usage() {
        assert!(ReplCommand::parse(":select 0").is_err());
        assert!(ReplCommand::parse(":select two").is_err());
        assert!(ReplCommand::parse(":validate").is_err());
        assert!(ReplCommand::parse(":privacy maybe").is_err());
        assert!(ReplCommand::parse(":frobnicate").is_err());
    }

    #[test]
    fn terminal_markup_marks_selection() {
        let finding = lexai::legal::risk::RiskFinding::new(
            "risk-0-1",
            "Multa",
            "Multa abusiva",
            lexai::legal::risk::Severity::High,
            "multa de 100%",
        );
        let annotated = lexai::legal::overlay::annotate(
            "Há multa de 100% aqui.",
            &[finding],
            Some("multa de 100%"),
        );
        assert_eq!(terminal_markup(&annotated), "Há [[>multa de 100%<]]{high} aqui.");
    }
}
