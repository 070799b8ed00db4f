//! CLI commands for checking bot uploads offline.

use std::path::{Path, PathBuf};

use {
    anyhow::Result,
    clap::Subcommand,
    wapanel_auto_reply::{Action, BotUpload, RuleSet},
};

#[derive(Subcommand)]
pub enum RulesAction {
    /// Show which rule (or the welcome text) would answer a message.
    Check {
        /// Bot upload JSON (`welcome` and `rules`).
        #[arg(long)]
        file: PathBuf,
        /// Inbound message text.
        #[arg(long)]
        text: String,
    },
    /// Validate a bot upload and report rules that can never match.
    Validate {
        #[arg(long)]
        file: PathBuf,
        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

pub fn handle_rules(action: RulesAction) -> Result<()> {
    match action {
        RulesAction::Check { file, text } => check(&file, &text),
        RulesAction::Validate { file, json } => validate(&file, json),
    }
}

fn load(file: &Path) -> Result<(Option<String>, RuleSet)> {
    let upload = BotUpload::from_file(file)?;
    Ok((upload.welcome, RuleSet::new(upload.rules)))
}

fn check(file: &Path, text: &str) -> Result<()> {
    let (welcome, rules) = load(file)?;
    print_diagnostics(&rules);

    let matched = rules
        .find(text)
        .and_then(|hit| hit.rule.reply_text().map(|reply| (hit, reply)));
    match (matched, welcome) {
        (Some((hit, reply)), _) => {
            println!(
                "rule {} ({} {:?})",
                hit.index, hit.rule.kind, hit.rule.pattern
            );
            println!("  reply: {reply}");
            for action in &hit.rule.actions {
                println!("  then:  {}", describe(action));
            }
        },
        (None, Some(welcome)) => println!("welcome\n  reply: {welcome}"),
        (None, None) => println!("no reply"),
    }
    Ok(())
}

fn validate(file: &Path, json: bool) -> Result<()> {
    let (welcome, rules) = load(file)?;

    if json {
        let diagnostics: Vec<_> = rules
            .diagnostics()
            .iter()
            .map(|d| serde_json::json!({ "index": d.index(), "error": d.to_string() }))
            .collect();
        let report = serde_json::json!({
            "count": rules.len(),
            "welcome": welcome,
            "diagnostics": diagnostics,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!(
        "{} rule(s), welcome {}",
        rules.len(),
        if welcome.is_some() {
            "set"
        } else {
            "unset"
        }
    );
    print_diagnostics(&rules);
    Ok(())
}

fn print_diagnostics(rules: &RuleSet) {
    for diagnostic in rules.diagnostics() {
        eprintln!("  warning: {diagnostic}");
    }
}

fn describe(action: &Action) -> String {
    match action {
        Action::Delay { ms } => format!("delay {ms}ms"),
        Action::Typing { ms: Some(ms) } => format!("typing {ms}ms"),
        Action::Typing { ms: None } => "typing".into(),
        Action::Text { text } => format!("text {text:?}"),
        Action::Audio {
            file,
            url,
            as_voice,
        } => {
            let source = file.as_deref().or(url.as_deref()).unwrap_or("?");
            let mode = if *as_voice {
                "voice note"
            } else {
                "file"
            };
            format!("audio {source} as {mode}")
        },
    }
}
