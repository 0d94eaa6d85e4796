//! Plain-text rendering of monitor snapshots for the terminal

use std::fmt::Write;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::config::DisplayConfig;
use crate::monitor::{SessionState, StoreSnapshot, TransactionRecord};

/// Everything one frame needs besides the store snapshot
#[derive(Debug, Clone)]
pub struct FrameContext {
    pub state: SessionState,
    pub endpoint: String,
    pub price_usd: f64,
    pub whale_threshold: u64,
    /// Transactions within the rate window
    pub rate: usize,
    pub rate_window_secs: u64,
    pub now: DateTime<Utc>,
}

/// Render one dashboard frame
pub fn render(snapshot: &StoreSnapshot, ctx: &FrameContext, display: &DisplayConfig) -> String {
    let mut out = String::new();
    let totals = &snapshot.totals;

    let _ = writeln!(out, "XRPL Watch  [{}]  {}", ctx.state, ctx.endpoint);
    let _ = writeln!(
        out,
        "Ledger {:>12}   Price ${:<10.4} Active accounts {}",
        snapshot.current_ledger, ctx.price_usd, totals.active_accounts
    );
    let _ = writeln!(
        out,
        "Transactions {:>9}   Whales {:>6}   Volume {} XRP   {} tx / {}s   Threshold {} XRP",
        totals.total_transactions,
        totals.whale_count,
        format_xrp(totals.total_volume()),
        ctx.rate,
        ctx.rate_window_secs,
        group_thousands(ctx.whale_threshold),
    );

    let feed = snapshot.feed(display.feed_rows, display.whales_only);
    let title = if display.whales_only { "Live feed (whales only)" } else { "Live feed" };
    let _ = writeln!(out, "\n{}", title);
    write_rows(&mut out, &feed);

    let whales = snapshot.recent_whales(display.whale_rows);
    let _ = writeln!(out, "\nRecent whales");
    write_rows(&mut out, &whales);

    let _ = writeln!(out, "\nVolume per minute");
    let buckets = snapshot.volume_by_minute(ctx.now, display.volume_minutes);
    let peak = buckets.iter().map(|b| b.volume_drops).max().unwrap_or(0);
    for bucket in &buckets {
        let width = if peak == 0 {
            0
        } else {
            (bucket.volume_drops * 40 / peak) as usize
        };
        let _ = writeln!(
            out,
            "  {}  {:<40} {}",
            bucket.end.format("%H:%M"),
            "#".repeat(width),
            format_xrp(bucket.volume())
        );
    }

    out
}

fn write_rows(out: &mut String, records: &[Arc<TransactionRecord>]) {
    if records.is_empty() {
        let _ = writeln!(out, "  (none)");
        return;
    }
    for record in records {
        let _ = writeln!(
            out,
            "  {} {:<14} {:<13} -> {:<13} {:>18} {:<14}{}",
            record.observed_at.format("%H:%M:%S"),
            record.tx_type,
            short_account(&record.source_account),
            short_account(&record.destination_account),
            format_xrp(record.amount()),
            record.result,
            if record.is_whale { " WHALE" } else { "" },
        );
    }
}

/// `rAbcdef...wxyz` style abbreviation; empty accounts render as `-`
pub fn short_account(account: &str) -> String {
    if account.is_empty() {
        return "-".to_string();
    }
    let chars: Vec<char> = account.chars().collect();
    if chars.len() <= 12 {
        return account.to_string();
    }
    let head: String = chars[..6].iter().collect();
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("{}...{}", head, tail)
}

/// Two decimals with thousands separators
pub fn format_xrp(amount: f64) -> String {
    let fixed = format!("{:.2}", amount);
    let (whole, frac) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let (sign, digits) = match whole.strip_prefix('-') {
        Some(digits) => ("-", digits),
        None => ("", whole),
    };
    format!("{}{}.{}", sign, group_digits(digits), frac)
}

fn group_thousands(value: u64) -> String {
    group_digits(&value.to_string())
}

fn group_digits(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}
