use std::path::PathBuf;

use anyhow::{bail, Context};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

mod config;
mod db;
mod filter;
mod models;
mod progression;
mod queries;
mod report;
mod table;

use config::Config;
use filter::FilterConfig;
use report::{DisplayMode, Page};

#[derive(Parser)]
#[command(name = "sondagem-report")]
#[command(about = "Diagnostic assessment (sondagem) reports for the literacy platform", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Target {
    Primary,
    Dashboard,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the platform-wide totals
    Overview,
    /// Render one report page
    Report {
        #[arg(long, value_enum)]
        page: Page,
        /// JSON file with the column filters to apply
        #[arg(long)]
        filters: Option<PathBuf>,
        /// Turn the filters on even when the filter file leaves them off
        #[arg(long)]
        enable_filters: bool,
        #[arg(long, value_enum, default_value_t = DisplayMode::Markdown)]
        format: DisplayMode,
        /// Write to this file instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Show the filter control each column of a page would get
    Controls {
        #[arg(long, value_enum)]
        page: Page,
        /// Print a filter file with every column at its default instead
        #[arg(long)]
        template: bool,
    },
    /// Check that a database target is reachable
    CheckConn {
        #[arg(long, value_enum, default_value_t = Target::Primary)]
        target: Target,
    },
}

fn load_filters(path: Option<&PathBuf>, enable: bool) -> anyhow::Result<FilterConfig> {
    let mut filters = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read filters from {}", path.display()))?;
            FilterConfig::from_json(&raw)
                .with_context(|| format!("invalid filter file {}", path.display()))?
        }
        None => FilterConfig::disabled(),
    };
    filters.enabled |= enable;
    Ok(filters)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    match cli.command {
        Commands::Overview => {
            let pool = db::connect(&config.primary).await?;
            let metrics = db::fetch_headline_metrics(&pool).await?;
            println!("Quantidade de Logins: {}", metrics.logins);
            println!("Quantidade de Onboardings: {}", metrics.onboardings);
            println!("Quantidade de Sondagens: {}", metrics.diagnostics);
            println!("Quantidade de Alunos Inscritos: {}", metrics.active_students);
            println!("Quantidade de Turmas: {}", metrics.classes);
            println!(
                "Quantidade de Turmas com Mais de 1 Sondagem: {}",
                metrics.classes_with_multiple_assessments
            );
            println!(
                "Total de alunos distintos com evolução: {}",
                metrics.students_with_evolution
            );
            println!(
                "Total de professores com mais de uma turma: {}",
                metrics.teachers_with_multiple_classes
            );
        }
        Commands::Report {
            page,
            filters,
            enable_filters,
            format,
            out,
        } => {
            let filters = load_filters(filters.as_ref(), enable_filters)?;
            let pool = db::connect(&config.primary).await?;
            let table = db::fetch_table(&pool, page.query(), &config.excluded_auth_ids).await?;
            let headline = match page {
                Page::Overview => Some(db::fetch_headline_metrics(&pool).await?),
                _ => None,
            };
            let rendered = report::build_report(page, &table, &filters, format, headline.as_ref())?;

            match out {
                Some(out) => {
                    std::fs::write(&out, rendered)?;
                    println!("Report written to {}.", out.display());
                }
                None => print!("{rendered}"),
            }
        }
        Commands::Controls { page, template } => {
            let pool = db::connect(&config.primary).await?;
            let table = db::fetch_table(&pool, page.query(), &config.excluded_auth_ids).await?;
            let prepared = filter::prepare(&table);
            let output = if template {
                serde_json::to_string_pretty(&FilterConfig::identity(&prepared))?
            } else {
                serde_json::to_string_pretty(&filter::describe_controls(&prepared))?
            };
            println!("{output}");
        }
        Commands::CheckConn { target } => {
            let target = match target {
                Target::Primary => &config.primary,
                Target::Dashboard => match &config.dashboard {
                    Some(dashboard) => dashboard,
                    None => bail!("DB_HOST_DASH, DB_USER_DASH and DB_DATABASE_DASH must be set"),
                },
            };
            db::check_connection(target).await?;
            info!("connection check finished");
            println!("Conexão bem-sucedida!");
        }
    }

    Ok(())
}
