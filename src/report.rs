//! Markdown run reports
//!
//! After each pass a timestamped markdown summary is written with one line
//! per target. Account ids and email addresses can be anonymized for
//! reports that leave the operator's machine.

use std::path::PathBuf;

use chrono::Utc;
use tokio::fs;
use tracing::info;

use crate::config::ReportConfig;
use crate::sync::driver::{RunReport, TargetOutcome};

/// Anonymize an email address
///
/// Masks the middle of the local part and of the first domain label:
/// `test@example.com` becomes `t**t@e******.com`.
pub fn anonymize_email(email: &str) -> String {
    let Some((name, domain)) = email.split_once('@') else {
        return email.to_string();
    };

    let name_chars: Vec<char> = name.chars().collect();
    let masked_name = if name_chars.len() > 2 {
        format!(
            "{}{}{}",
            name_chars[0],
            "*".repeat(name_chars.len() - 2),
            name_chars[name_chars.len() - 1]
        )
    } else {
        format!("{}*", name)
    };

    let domain_parts: Vec<&str> = domain.split('.').collect();
    let masked_domain = if domain_parts.len() >= 2 {
        let first: Vec<char> = domain_parts[0].chars().collect();
        let head = first.first().map(|c| c.to_string()).unwrap_or_default();
        format!(
            "{}{}.{}",
            head,
            "*".repeat(first.len().saturating_sub(1)),
            domain_parts[1..].join(".")
        )
    } else {
        domain.to_string()
    };

    format!("{}@{}", masked_name, masked_domain)
}

/// Anonymize an account id
///
/// Short ids pass through; longer ids keep the first six and last four
/// characters: `1234567890abcdef...` becomes `123456...cdef`.
pub fn anonymize_account_id(account_id: &str) -> String {
    let chars: Vec<char> = account_id.chars().collect();
    if chars.len() < 10 {
        return account_id.to_string();
    }

    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Scrub emails and 32-hex account ids out of a rendered line
fn scrub(line: &str) -> String {
    let email_re = regex_lite::Regex::new(r"[\w.\-]+@[\w.\-]+\.\w+")
        .expect("Invalid email scrubbing pattern");
    let id_re =
        regex_lite::Regex::new(r"[a-f0-9]{32}").expect("Invalid account id scrubbing pattern");

    let line = email_re
        .replace_all(line, |caps: &regex_lite::Captures| {
            anonymize_email(&caps[0])
        })
        .into_owned();

    id_re
        .replace_all(&line, |caps: &regex_lite::Captures| {
            anonymize_account_id(&caps[0])
        })
        .into_owned()
}

/// Render the run report as markdown
pub fn render(report: &RunReport, anonymize: bool) -> String {
    let mut out = String::new();

    out.push_str(&format!(
        "# Cloudflare IP List Sync Report - {}\n\n",
        report.started.format("%Y-%m-%d_%H-%M-%S")
    ));
    out.push_str(&format!(
        "**Start Time:** {}\n\n",
        report.started.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str(&format!(
        "**End Time:** {}\n\n",
        report.finished.format("%Y-%m-%d %H:%M:%S")
    ));
    out.push_str("## Summary\n\n");

    for target in &report.targets {
        let line = match &target.outcome {
            TargetOutcome::Synced { batches, members } => format!(
                "- ✅ `{}` (account `{}`): synchronized, {} batches, {} members",
                target.list_name, target.account_id, batches, members
            ),
            TargetOutcome::NoChange => format!(
                "- ✅ `{}` (account `{}`): already in sync",
                target.list_name, target.account_id
            ),
            TargetOutcome::NoUpdate => format!(
                "- ⚠️ `{}` (account `{}`): feed yielded nothing, no update requested",
                target.list_name, target.account_id
            ),
            TargetOutcome::MissingList => format!(
                "- ❌ `{}` (account `{}`): list not found in account",
                target.list_name, target.account_id
            ),
            TargetOutcome::UnknownState(err) => format!(
                "- ❌ `{}` (account `{}`): current state unknown ({}), sync skipped",
                target.list_name, target.account_id, err
            ),
            TargetOutcome::Failed(err) => format!(
                "- ❌ `{}` (account `{}`): sync failed ({})",
                target.list_name, target.account_id, err
            ),
        };

        let line = if anonymize { scrub(&line) } else { line };
        out.push_str(&line);
        out.push('\n');
    }

    out.push_str(&format!(
        "\n**Targets:** {} / **Failures:** {}\n",
        report.targets.len(),
        report.failures()
    ));

    out
}

/// Write the rendered report to a timestamped file
pub async fn write_report(
    report: &RunReport,
    config: &ReportConfig,
    anonymize: bool,
) -> std::io::Result<PathBuf> {
    fs::create_dir_all(&config.dir).await?;

    let timestamp = Utc::now().format("%Y-%m-%d_%H-%M-%S");
    let path = PathBuf::from(&config.dir).join(format!("cf_sync_{}.md", timestamp));

    fs::write(&path, render(report, anonymize)).await?;
    info!(path = %path.display(), "Run report written");

    Ok(path)
}
