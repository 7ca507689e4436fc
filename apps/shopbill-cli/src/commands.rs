//! Subcommand handlers.

use anyhow::{bail, Result};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tracing::info;

use shopbill_client::{ClientError, SessionManager, ShopApi};
use shopbill_core::analytics::{daily_sales, top_products, SalesSummary};
use shopbill_core::filter::{BillQuery, DateRange, TransactionQuery};
use shopbill_core::reminder::reminder_candidates;
use shopbill_core::session::TOKEN_KEY;
use shopbill_core::types::{LoginRequest, RegisterRequest};
use shopbill_store::Store;

use crate::cli::{day_range, BillArgs, RegisterArgs, TransactionArgs};

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn signed_out(err: ClientError) -> anyhow::Error {
    match err {
        ClientError::NotAuthenticated => anyhow::anyhow!("Not signed in. Run `shopbill login <email>`"),
        other => other.into(),
    }
}

// =============================================================================
// Session
// =============================================================================

/// What the device database holds, independent of the backend.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub healthy: bool,
    pub keys: Vec<String>,
    pub token_saved_at: Option<DateTime<Utc>>,
}

pub async fn storage_report(store: &Store) -> Result<StorageReport> {
    let healthy = store.health_check().await;
    if !healthy {
        return Ok(StorageReport { healthy, keys: Vec::new(), token_saved_at: None });
    }
    let kv = store.kv();
    Ok(StorageReport {
        healthy,
        keys: kv.keys().await?,
        token_saved_at: kv.updated_at(TOKEN_KEY).await?,
    })
}

pub async fn status(session: &SessionManager, store: &Store) -> Result<()> {
    let flags = session.flags();
    let storage = storage_report(store).await?;
    println!("session:  {}", flags.phase);
    println!("token:    {}", if flags.token_valid { "valid" } else { "none" });
    println!("storage:  {}", if storage.healthy { "ok" } else { "unreachable" });
    if !storage.keys.is_empty() {
        println!("stored:   {}", storage.keys.join(", "));
    }
    if let Some(at) = storage.token_saved_at {
        println!("saved:    {}", at.format("%Y-%m-%d %H:%M UTC"));
    }

    if let Some(user) = session.cached_user().await {
        println!("user:     {} <{}>", user.name, user.email.as_deref().unwrap_or("-"));
        if let Some(shop) = user.shop_name.as_deref() {
            println!("shop:     {}", shop);
        }
    }
    Ok(())
}

pub async fn login(session: &SessionManager, email: String, password: String) -> Result<()> {
    let user = session.login(&LoginRequest { email, password }).await?;
    match user {
        Some(user) => println!("Signed in as {}", user.name),
        None => println!("Signed in"),
    }
    Ok(())
}

pub async fn register(session: &SessionManager, args: RegisterArgs, password: String) -> Result<()> {
    let registration = RegisterRequest {
        name: args.name,
        shop_name: args.shop_name,
        email: args.email,
        phone: args.phone,
        password,
    };
    session.register(&registration).await?;
    println!("Account created, signed in as {}", registration.name);
    Ok(())
}

pub async fn logout(session: &SessionManager) -> Result<()> {
    session.logout().await;
    println!("Signed out");
    Ok(())
}

// =============================================================================
// Bills & Transactions
// =============================================================================

pub async fn bills(shop: &ShopApi, args: BillArgs, json: bool) -> Result<()> {
    let all = shop.bills().await.map_err(signed_out)?;

    let mut query = BillQuery::new()
        .date_range(day_range(args.from, args.to))
        .sort(args.sort);
    if let Some(text) = args.search {
        query = query.search(text);
    }
    if let Some(status) = args.status {
        query = query.status(status);
    }
    if let Some(method) = args.method {
        query = query.payment_method(method);
    }

    let shown = query.apply(&all);
    info!(total = all.len(), shown = shown.len(), "Bills filtered");

    if json {
        return print_json(&shown);
    }
    println!("{:<12} {:<20} {:>10} {:>10} {:<8} {}", "BILL", "CUSTOMER", "TOTAL", "PENDING", "STATUS", "DATE");
    for bill in shown {
        println!(
            "{:<12} {:<20} {:>10} {:>10} {:<8} {}",
            bill.bill_number,
            bill.customer_name(),
            bill.total().to_string(),
            bill.pending().to_string(),
            bill.status().to_string(),
            bill.created_at.format("%Y-%m-%d"),
        );
    }
    Ok(())
}

pub async fn transactions(shop: &ShopApi, args: TransactionArgs, json: bool) -> Result<()> {
    let all = shop.transactions().await.map_err(signed_out)?;

    let mut query = TransactionQuery::new()
        .date_range(day_range(args.from, args.to))
        .sort(args.sort());
    if let Some(text) = args.search {
        query = query.search(text);
    }
    if let Some(method) = args.method {
        query = query.payment_method(method);
    }

    let shown = query.apply(&all);
    if json {
        return print_json(&shown);
    }
    for tx in shown {
        println!(
            "{}  {:<12} {:<20} {:>10} {}",
            tx.created_at.format("%Y-%m-%d %H:%M"),
            tx.bill_number.as_deref().unwrap_or("-"),
            tx.customer_name.as_deref().unwrap_or("-"),
            tx.amount.to_string(),
            tx.payment_method,
        );
    }
    Ok(())
}

// =============================================================================
// Analytics & Reminders
// =============================================================================

pub async fn summary(shop: &ShopApi, top: usize, range: DateRange, daily: bool, json: bool) -> Result<()> {
    let all = shop.bills().await.map_err(signed_out)?;
    let bills = BillQuery::new().date_range(range).apply(&all);

    let summary = SalesSummary::from_bills(bills.iter().copied());
    let best = top_products(bills.iter().copied(), top);
    let per_day = daily_sales(bills.iter().copied());

    if json {
        return print_json(&serde_json::json!({
            "summary": summary,
            "topProducts": best,
            "daily": per_day.iter().map(|(day, net)| (day.to_string(), *net)).collect::<Vec<_>>(),
        }));
    }
    println!("bills:      {} ({} paid, {} pending)", summary.bill_count, summary.paid_count, summary.pending_count);
    println!("net sales:  {}", summary.net);
    println!("discounts:  {}", summary.discounts);
    println!("collected:  {} (cash {}, online {})", summary.collected, summary.collected_cash, summary.collected_online);
    println!("pending:    {}", summary.pending);
    println!("avg bill:   {}", summary.average_bill());
    if !best.is_empty() {
        println!();
        println!("Top products:");
        for (rank, p) in best.iter().enumerate() {
            println!("{:>3}. {:<24} x{:<5} {}", rank + 1, p.name, p.quantity, p.revenue);
        }
    }
    if daily {
        println!();
        for (day, net) in &per_day {
            println!("{}  {:>10}", day, net.to_string());
        }
    }
    Ok(())
}

pub async fn reminders(shop: &ShopApi, min_age_days: u32, send: bool, json: bool) -> Result<()> {
    let bills = shop.bills().await.map_err(signed_out)?;
    let candidates = reminder_candidates(&bills, Utc::now(), Duration::days(i64::from(min_age_days)));

    if send {
        if candidates.is_empty() {
            println!("Nothing to remind");
            return Ok(());
        }
        let expected: usize = candidates.iter().map(|c| c.bill_count()).sum();
        let sent = shop.send_reminders(&candidates).await.map_err(signed_out)?;
        println!("Sent {} of {} reminders", sent, expected);
        if sent < expected {
            bail!("{} reminders failed", expected - sent);
        }
        return Ok(());
    }

    if json {
        return print_json(&candidates);
    }
    for c in &candidates {
        println!(
            "{:<20} {:<14} {:>10}  {} bill(s) since {}",
            c.customer_name,
            c.phone.as_deref().unwrap_or("-"),
            c.total_pending.to_string(),
            c.bill_count(),
            c.oldest_bill_at.format("%Y-%m-%d"),
        );
    }
    Ok(())
}
