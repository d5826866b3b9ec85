use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use shop_db::PurchaseStore;
use shop_payments::{ActivationOutcome, PaymentService, PollOutcome, ReferralOutcome};
use shop_schemas::Purchase;

#[derive(Parser)]
#[command(name = "shop")]
#[command(about = "Subscription shop operator CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order (base -> env -> deployment)
        #[arg(required = true)]
        paths: Vec<String>,
    },

    /// Purchase inspection and manual reconciliation
    Purchase {
        #[command(subcommand)]
        cmd: PurchaseCmd,
    },

    /// Referral maintenance
    Referral {
        #[command(subcommand)]
        cmd: ReferralCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,
    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum PurchaseCmd {
    /// Print a purchase row
    Show {
        #[arg(long)]
        id: i64,
    },

    /// Ask Rapyd whether the checkout was paid; activate if so
    Poll {
        #[arg(long)]
        id: i64,

        /// Layered config paths in merge order
        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Re-run activation of a purchase the provider already confirmed but
    /// whose entitlement call failed
    Activate {
        #[arg(long)]
        id: i64,

        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },

    /// Cancel a New/Pending purchase
    Cancel {
        #[arg(long)]
        id: i64,

        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[derive(Subcommand)]
enum ReferralCmd {
    /// Credit the referrer of a referee (no-op once granted)
    Credit {
        /// Referee chat id
        #[arg(long)]
        telegram_id: i64,

        #[arg(long = "config", required = true)]
        config_paths: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = shop_db::connect_from_env().await?;
            match cmd {
                DbCmd::Status => {
                    let s = shop_db::status(&pool).await?;
                    println!("schema_ready={}", s.schema_ready());
                    if !s.missing_tables.is_empty() {
                        println!("missing_tables={}", s.missing_tables.join(","));
                    }
                    for (status, count) in &s.purchases_by_status {
                        println!("purchases_{status}={count}");
                    }
                    println!("held_activation_leases={}", s.held_activation_leases);
                    println!("held_bonus_leases={}", s.held_bonus_leases);
                }
                DbCmd::Migrate => {
                    shop_db::migrate(&pool).await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash { paths } => {
            let path_refs: Vec<&str> = paths.iter().map(|s| s.as_str()).collect();
            let loaded = shop_config::load_layered_yaml(&path_refs)?;
            // Typed view must also parse.
            loaded.shop_config()?;
            println!("config_hash={}", loaded.config_hash);
            println!("{}", loaded.canonical_json);
        }

        Commands::Purchase { cmd } => match cmd {
            PurchaseCmd::Show { id } => {
                let pool = shop_db::connect_from_env().await?;
                let store = shop_db::PgStore::new(pool);
                let p = store
                    .find_purchase(id)
                    .await?
                    .with_context(|| format!("purchase {id} not found"))?;
                print_purchase(&p);
            }

            PurchaseCmd::Poll { id, config_paths } => {
                let svc = live_service(&config_paths).await?;
                match svc.poll_checkout(id).await? {
                    PollOutcome::AlreadyPaid => println!("purchase_id={id} outcome=already_paid"),
                    PollOutcome::NotYetPaid => println!("purchase_id={id} outcome=not_yet_paid"),
                    PollOutcome::Activated(a) => {
                        println!("purchase_id={id} outcome=activated");
                        println!("expire_at={}", a.expire_at.to_rfc3339());
                    }
                }
            }

            PurchaseCmd::Activate { id, config_paths } => {
                let svc = live_service(&config_paths).await?;
                match svc.activate(id).await? {
                    ActivationOutcome::AlreadyPaid => println!("purchase_id={id} outcome=already_paid"),
                    ActivationOutcome::Activated(a) => {
                        println!("purchase_id={id} outcome=activated");
                        println!("expire_at={}", a.expire_at.to_rfc3339());
                        println!("referral={}", referral_label(&a.referral));
                    }
                }
            }

            PurchaseCmd::Cancel { id, config_paths } => {
                let svc = live_service(&config_paths).await?;
                svc.cancel_purchase(id).await?;
                println!("purchase_id={id} status=cancel");
            }
        },

        Commands::Referral { cmd } => match cmd {
            ReferralCmd::Credit {
                telegram_id,
                config_paths,
            } => {
                let svc = live_service(&config_paths).await?;
                let outcome = svc.credit_referral(telegram_id).await?;
                match &outcome {
                    ReferralOutcome::Granted {
                        referrer_telegram_id,
                    } => println!("referral=granted referrer={referrer_telegram_id}"),
                    other => println!("referral={}", referral_label(other)),
                }
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays machine-readable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}

async fn live_service(config_paths: &[String]) -> Result<PaymentService> {
    let path_refs: Vec<&str> = config_paths.iter().map(|s| s.as_str()).collect();
    let loaded = shop_config::load_layered_yaml(&path_refs)?;
    let cfg = loaded.shop_config()?;
    let secrets = shop_config::resolve_secrets(&loaded.config_json)?;
    let pool = shop_db::connect_from_env().await?;
    tracing::info!(config_hash = %loaded.config_hash, "config loaded");
    shop_payments::build_live_service(&cfg, &secrets, pool)
}

fn referral_label(outcome: &ReferralOutcome) -> &'static str {
    match outcome {
        ReferralOutcome::NoReferral => "none",
        ReferralOutcome::AlreadyGranted => "already_granted",
        ReferralOutcome::Granted { .. } => "granted",
        ReferralOutcome::InProgress => "in_progress",
    }
}

fn print_purchase(p: &Purchase) {
    println!("purchase_id={}", p.id);
    println!("customer_id={}", p.customer_id);
    println!("invoice_type={}", p.invoice_type);
    println!("status={}", p.status);
    println!("amount={} {}", p.amount, p.currency);
    println!("months={}", p.months);
    println!("external_id={}", p.external_id().unwrap_or(""));
    println!(
        "external_url={}",
        p.correlation.as_ref().map(|c| c.external_url.as_str()).unwrap_or("")
    );
    println!("created_at={}", p.created_at.to_rfc3339());
    println!("paid_at={}", p.paid_at.map(|t| t.to_rfc3339()).unwrap_or_default());
}

