use clap::Subcommand;
use serde_json::json;

use crate::cli::utils::*;
use crate::cli::OutputFormat;
use crate::database::PgTenantDirectory;
use crate::tenant::{SchemaName, TenantContext, TenantDirectory, TenantSlug};

#[derive(Subcommand)]
pub enum TenantCommands {
    #[command(about = "Derive the schema name for a workspace slug (offline)")]
    Schema {
        #[arg(help = "Workspace slug")]
        slug: String,
    },

    #[command(about = "Show a workspace from the tenant registry")]
    Show {
        #[arg(help = "Workspace slug")]
        slug: String,
    },
}

pub async fn handle(cmd: TenantCommands, output_format: OutputFormat) -> anyhow::Result<()> {
    match cmd {
        TenantCommands::Schema { slug } => {
            let slug = TenantSlug::parse(slug.trim())?;
            let schema = SchemaName::for_slug(&slug);
            output_item(
                output_format,
                "schema",
                json!({
                    "slug": slug.as_str(),
                    "schemaName": schema.as_str(),
                    "quoted": schema.quoted(),
                }),
            )
        }
        TenantCommands::Show { slug } => {
            let slug = TenantSlug::parse(slug.trim())?;
            let db = connect_database().await?;
            let directory = PgTenantDirectory::new(&db);

            let tenant = directory.find_by_slug(&slug).await?;
            db.close().await;

            let tenant = tenant.ok_or_else(|| anyhow::anyhow!("Workspace '{}' not found", slug))?;
            let context = TenantContext::from_record(&tenant)?;
            output_item(
                output_format,
                "tenant",
                json!({
                    "id": tenant.id,
                    "slug": context.slug,
                    "name": tenant.name,
                    "schemaName": context.schema_name,
                    "isActive": tenant.is_active,
                    "plan": context.plan,
                    "createdAt": tenant.created_at,
                }),
            )
        }
    }
}
