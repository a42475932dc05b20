use clap::Subcommand;
use serde_json::json;
use uuid::Uuid;

use crate::auth::RefreshTokenStore;
use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::models::RevokeReason;
use crate::database::PgRefreshTokenStore;

#[derive(Subcommand)]
pub enum SessionCommands {
    #[command(about = "Revoke every live refresh token of a user")]
    Revoke {
        #[arg(long, help = "User id")]
        user: Uuid,

        #[arg(
            long,
            default_value = "administrative",
            help = "logout, password_change, rotated or administrative"
        )]
        reason: RevokeReason,
    },
}

pub async fn handle(cmd: SessionCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        SessionCommands::Revoke { user, reason } => {
            let db = connect_database().await?;
            let store = PgRefreshTokenStore::new(&db);
            let revoked = store.revoke_all_for_user(user, reason, chrono::Utc::now()).await;
            db.close().await;
            let revoked = revoked?;

            tracing::info!(user_id = %user, reason = reason.as_str(), revoked, "Revoked sessions from CLI");
            output_success(
                output_format,
                &format!("Revoked {} session(s) for user {}", revoked, user),
                Some(json!({ "userId": user, "revoked": revoked, "reason": reason.as_str() })),
            )
        }
    }
}
