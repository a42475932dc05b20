use clap::Subcommand;
use serde_json::json;

use crate::auth::JwtKeys;
use crate::cli::utils::*;
use crate::cli::OutputFormat;

#[derive(Subcommand)]
pub enum TokenCommands {
    #[command(about = "Verify a token's signature and print its claims")]
    Inspect {
        #[arg(help = "Encoded JWT")]
        token: String,

        #[arg(long, help = "Treat the token as a refresh token")]
        refresh: bool,
    },
}

pub async fn handle(cmd: TokenCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TokenCommands::Inspect { token, refresh } => {
            let keys = JwtKeys::from_config(&load_config()?.security);
            let now = chrono::Utc::now().timestamp();
            let token = token.trim();

            let details = if refresh {
                let claims = keys.verify_refresh(token)?;
                json!({
                    "kind": "refresh",
                    "sub": claims.sub,
                    "iat": claims.iat,
                    "exp": claims.exp,
                    "expired": claims.exp <= now,
                })
            } else {
                let claims = keys.decode_access_ignoring_expiry(token)?;
                json!({
                    "kind": "access",
                    "sub": claims.sub,
                    "tenantId": claims.tenant_id,
                    "memberId": claims.member_id,
                    "role": claims.role,
                    "iat": claims.iat,
                    "exp": claims.exp,
                    "expired": claims.exp <= now,
                })
            };
            output_item(output_format, "token", details)
        }
    }
}
