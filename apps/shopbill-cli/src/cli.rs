use std::io::BufRead;
use std::path::PathBuf;

use anyhow::{bail, Result};
use chrono::{DateTime, Days, NaiveDate, NaiveTime, Utc};
use clap::{Args, Parser, Subcommand};

use shopbill_client::config::MAX_REMINDER_AGE_DAYS;
use shopbill_core::filter::{BillSort, DateRange, TransactionSort};
use shopbill_core::types::{BillStatus, PaymentMethod};

#[derive(Parser, Debug)]
#[command(name = "shopbill")]
#[command(about = "Billing for small shops: session, bills and collections")]
pub struct Cli {
    /// Path to shopbill.toml (defaults to the platform config dir)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Print JSON instead of tables
    #[arg(long, global = true)]
    pub json: bool,

    /// Debug logging for every crate
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Check the stored session against the backend
    Status,
    /// Sign in and store the session on this device
    Login {
        email: String,
        /// Read from SHOPBILL_PASSWORD or stdin when omitted
        #[arg(long)]
        password: Option<String>,
    },
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Sign out and clear the stored session
    Logout,
    /// List bills with optional filters
    Bills(BillArgs),
    /// List recorded payments
    Transactions(TransactionArgs),
    /// Sales summary and best sellers
    Summary {
        /// Number of top products to show
        #[arg(long, default_value_t = 5)]
        top: usize,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
        /// Also print net sales per day
        #[arg(long)]
        daily: bool,
    },
    /// Customers with pending bills
    Reminders {
        /// Only bills at least this many days old (defaults to config)
        #[arg(long, value_parser = clap::value_parser!(u32).range(0..=i64::from(MAX_REMINDER_AGE_DAYS)))]
        min_age_days: Option<u32>,
        /// Send the reminders instead of listing them
        #[arg(long)]
        send: bool,
    },
}

impl Commands {
    /// Whether the stored session is checked before running.
    pub fn needs_session(&self) -> bool {
        !matches!(self, Commands::Login { .. } | Commands::Register(_))
    }
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[arg(long)]
    pub name: String,
    #[arg(long)]
    pub email: String,
    /// Read from SHOPBILL_PASSWORD or stdin when omitted
    #[arg(long)]
    pub password: Option<String>,
    #[arg(long)]
    pub shop_name: Option<String>,
    #[arg(long)]
    pub phone: Option<String>,
}

#[derive(Args, Debug)]
pub struct BillArgs {
    /// Match customer name, phone or bill number
    #[arg(long)]
    pub search: Option<String>,
    /// paid | pending
    #[arg(long)]
    pub status: Option<BillStatus>,
    /// cash | online
    #[arg(long)]
    pub method: Option<PaymentMethod>,
    /// First day, YYYY-MM-DD
    #[arg(long)]
    pub from: Option<NaiveDate>,
    /// Last day (inclusive), YYYY-MM-DD
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// newest | oldest | total-desc | total-asc | pending | customer
    #[arg(long, default_value = "newest")]
    pub sort: BillSort,
}

#[derive(Args, Debug)]
pub struct TransactionArgs {
    #[arg(long)]
    pub search: Option<String>,
    #[arg(long)]
    pub method: Option<PaymentMethod>,
    #[arg(long)]
    pub from: Option<NaiveDate>,
    #[arg(long)]
    pub to: Option<NaiveDate>,
    /// Oldest first
    #[arg(long)]
    pub oldest: bool,
}

impl TransactionArgs {
    pub fn sort(&self) -> TransactionSort {
        if self.oldest {
            TransactionSort::Oldest
        } else {
            TransactionSort::Newest
        }
    }
}

fn start_of(day: NaiveDate) -> DateTime<Utc> {
    day.and_time(NaiveTime::MIN).and_utc()
}

/// Whole UTC days `from..=to` as a half-open range.
pub fn day_range(from: Option<NaiveDate>, to: Option<NaiveDate>) -> DateRange {
    DateRange::new(
        from.map(start_of),
        to.and_then(|d| d.checked_add_days(Days::new(1))).map(start_of),
    )
}

/// Environment variable consulted when `--password` is not given.
pub const PASSWORD_ENV: &str = "SHOPBILL_PASSWORD";

/// `--password` if given, else `SHOPBILL_PASSWORD`, else the first line of `input`.
pub fn resolve_password(
    flag: Option<String>,
    lookup: impl Fn(&str) -> Option<String>,
    mut input: impl BufRead,
) -> Result<String> {
    if let Some(password) = flag.or_else(|| lookup(PASSWORD_ENV)) {
        return Ok(password);
    }

    let mut line = String::new();
    input.read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']);
    if password.is_empty() {
        bail!("No password given. Pass --password, set {} or pipe it on stdin", PASSWORD_ENV);
    }
    Ok(password.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_day_range_is_inclusive_of_last_day() {
        let from = NaiveDate::from_ymd_opt(2024, 3, 1);
        let to = NaiveDate::from_ymd_opt(2024, 3, 2);
        let range = day_range(from, to);

        let late_on_last_day = "2024-03-02T23:59:59Z".parse::<DateTime<Utc>>().unwrap();
        let next_day = "2024-03-03T00:00:00Z".parse::<DateTime<Utc>>().unwrap();
        let before = "2024-02-29T23:59:59Z".parse::<DateTime<Utc>>().unwrap();

        assert!(range.contains(late_on_last_day));
        assert!(!range.contains(next_day));
        assert!(!range.contains(before));
        assert!(day_range(None, None).is_unbounded());
    }

    #[test]
    fn test_parse_bill_filters() {
        let cli = Cli::try_parse_from([
            "shopbill", "bills", "--status", "pending", "--method", "upi", "--sort", "total-desc", "--from",
            "2024-03-01",
        ])
        .unwrap();

        match cli.command {
            Commands::Bills(args) => {
                assert_eq!(args.status, Some(BillStatus::Pending));
                assert_eq!(args.method, Some(PaymentMethod::Online));
                assert_eq!(args.sort, BillSort::TotalHighToLow);
                assert_eq!(args.from, NaiveDate::from_ymd_opt(2024, 3, 1));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_login_skips_session_check() {
        let cli = Cli::try_parse_from(["shopbill", "login", "a@b.co"]).unwrap();
        assert!(!cli.command.needs_session());

        let cli = Cli::try_parse_from(["shopbill", "--json", "summary"]).unwrap();
        assert!(cli.json);
        assert!(cli.command.needs_session());
    }

    #[test]
    fn test_rejects_unknown_status() {
        assert!(Cli::try_parse_from(["shopbill", "bills", "--status", "lost"]).is_err());
    }

    #[test]
    fn test_password_sources_in_order() {
        let no_env = |_: &str| None;
        let env = |key: &str| (key == PASSWORD_ENV).then(|| "from-env".to_string());

        let flag = resolve_password(Some("from-flag".into()), env, "from-stdin\n".as_bytes()).unwrap();
        assert_eq!(flag, "from-flag");

        let from_env = resolve_password(None, env, "from-stdin\n".as_bytes()).unwrap();
        assert_eq!(from_env, "from-env");

        let piped = resolve_password(None, no_env, " spaced pass \r\n".as_bytes()).unwrap();
        assert_eq!(piped, " spaced pass ");

        assert!(resolve_password(None, no_env, "".as_bytes()).is_err());
        assert!(resolve_password(None, no_env, "\n".as_bytes()).is_err());
    }

    #[test]
    fn test_reminder_age_flag_is_bounded() {
        let cli = Cli::try_parse_from(["shopbill", "reminders", "--min-age-days", "30"]).unwrap();
        match cli.command {
            Commands::Reminders { min_age_days, .. } => assert_eq!(min_age_days, Some(30)),
            other => panic!("unexpected command {:?}", other),
        }

        assert!(Cli::try_parse_from(["shopbill", "reminders", "--min-age-days", "4294967295"]).is_err());
        assert!(Cli::try_parse_from(["shopbill", "reminders", "--min-age-days", "3651"]).is_err());
    }
}
