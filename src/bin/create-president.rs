//! Seeds the organisation's president account.
//!
//! Usage:
//!   DATABASE_URL=... PRESIDENT_PASSWORD=... create-president --cin AB123456 \
//!       --name "..." --email president@example.org
//!
//! The password may also be passed with `--password`; the environment
//! variable keeps it out of shell history.

use anyhow::{bail, Context, Result};
use clap::Parser;

use charity_api::{
    db,
    models::member::{MemberRole, NewMember},
    services::members::MemberService,
    validation::{is_valid_cin, is_valid_email},
};

#[derive(Parser)]
#[command(name = "create-president", about = "Create the president account")]
struct Args {
    /// National id, used as the login
    #[arg(long)]
    cin: String,

    #[arg(long)]
    name: String,

    #[arg(long)]
    email: String,

    #[arg(long, env = "PRESIDENT_PASSWORD", hide_env_values = true)]
    password: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args = Args::parse();
    let cin = args.cin.trim().to_uppercase();
    if !is_valid_cin(&cin) {
        bail!("invalid national id: {cin}");
    }
    if !is_valid_email(args.email.trim()) {
        bail!("invalid email: {}", args.email);
    }
    if args.password.len() < 8 {
        bail!("password must be at least 8 characters");
    }

    let database_url = std::env::var("DATABASE_URL").context("DATABASE_URL required")?;
    let pool = db::create_pool(&database_url).await?;
    db::run_migrations(&pool).await?;

    let president = NewMember {
        cin,
        name: args.name.trim().to_string(),
        email: args.email.trim().to_string(),
        password: args.password,
        role: MemberRole::President,
        subscription_status: true,
        member_type: None,
    };
    let member = MemberService::create(&pool, &president, None)
        .await
        .map_err(|e| anyhow::anyhow!("could not create president: {e}"))?;

    tracing::info!(cin = %member.cin, "president account created");
    Ok(())
}
