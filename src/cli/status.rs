use std::{fmt::Write, net::SocketAddr};

use anyhow::{anyhow, Result};

use crate::{
    daemon::ipc::messages::{InternalRequest, Request, StatusSnapshot},
    utils::time::format_seconds,
};

use super::client::send_request;

pub async fn print_status(address: SocketAddr) -> Result<()> {
    let reply = send_request(address, &Request::Internal(InternalRequest::Status)).await?;
    if !reply.success {
        return Err(anyhow!("Daemon refused status: {}", reply.message));
    }
    let snapshot: StatusSnapshot = serde_json::from_value(
        reply
            .data
            .ok_or_else(|| anyhow!("Daemon sent an empty status"))?,
    )?;
    print!("{}", render_status(&snapshot));
    Ok(())
}

/// Popup-style summary: what is tracked right now, the focus session and today's totals, longest
/// first.
pub fn render_status(status: &StatusSnapshot) -> String {
    let mut out = String::new();
    match &status.tracking {
        Some(domain) => {
            let _ = writeln!(
                out,
                "Tracking {domain} ({} not yet flushed)",
                format_seconds(status.pending_seconds)
            );
        }
        None => out.push_str("Not tracking any domain\n"),
    }

    if status.focus_active {
        let _ = writeln!(
            out,
            "Focus session {}{}: blocking {} ({} rules)",
            status.session_id.as_deref().unwrap_or("-"),
            if status.strict_mode { " (strict)" } else { "" },
            status.blocked_categories.join(", "),
            status.rule_count,
        );
        if let Some(minutes) = status.remaining_minutes {
            let _ = writeln!(
                out,
                "Time left: {}",
                format_seconds((minutes.max(0.0) * 60.0).round() as u64)
            );
        }
        if !status.skipped_domains.is_empty() {
            let _ = writeln!(out, "Skipped: {}", status.skipped_domains.join(", "));
        }
    } else {
        out.push_str("No focus session\n");
    }
    let _ = writeln!(
        out,
        "{} categorised domains, user {}",
        status.categorised_domains,
        status
            .user_id
            .map_or_else(|| "not signed in".to_owned(), |id| id.to_string())
    );

    let mut totals = status.totals.iter().collect::<Vec<_>>();
    totals.sort_by(|a, b| b.seconds.cmp(&a.seconds).then(a.domain.cmp(&b.domain)));
    if !totals.is_empty() {
        out.push_str("\nToday\n");
        let width = totals.iter().map(|t| t.domain.len()).max().unwrap_or(0);
        for total in totals {
            let _ = writeln!(
                out,
                "  {:width$}  {}",
                total.domain,
                format_seconds(total.seconds)
            );
        }
    }
    out
}
