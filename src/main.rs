use anyhow::Context;
use clap::{Parser, Subcommand};
use console::style;
use log::info;
use recommend_a_fragrance::{app, models::RecommendationMode, scripts, Config};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "recommend-a-fragrance", version, about = "Fragrance recommendations from review embeddings")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the web application (default)
    Serve,
    /// Scrape brands, fragrances, notes and reviews, appending to the data files
    Scrape,
    /// Clean scraped reviews for embedding
    Clean,
    /// Embed every cleaned review and write the final review file
    Embed,
    /// Print recommendations for a description
    Recommend {
        description: String,
        #[arg(long, value_enum, default_value_t = Mode::Fragrance)]
        mode: Mode,
        /// Number of recommendations
        #[arg(short = 'n', long)]
        count: Option<usize>,
    },
}

#[derive(Clone, Copy, clap::ValueEnum)]
enum Mode {
    Fragrance,
    Review,
}

impl From<Mode> for RecommendationMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Fragrance => RecommendationMode::Fragrance,
            Mode::Review => RecommendationMode::Review,
        }
    }
}

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let cli = Cli::parse();

    // Setup logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Default to info level if RUST_LOG is not set
                "recommend_a_fragrance=info,actix_web=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Loading configuration...");
    let config = Config::load().context("Failed to load configuration")?;

    match cli.command.unwrap_or(Command::Serve) {
        Command::Serve => {
            let application = app::Application::new(&config);
            application.run().await.context("Server failed")?;
        }
        Command::Scrape => {
            let summary = scripts::scrape_all(&config)
                .await
                .context("Scraping failed")?;
            println!(
                "Scraped {} fragrances ({} reviews) from {} brands; {} failures",
                summary.fragrances, summary.reviews, summary.brands, summary.failed
            );
        }
        Command::Clean => {
            let count = scripts::clean_reviews(&config).context("Cleaning reviews failed")?;
            println!("Cleaned {} reviews", count);
        }
        Command::Embed => {
            let embeddings = app::embedding_service(&config)?;
            let count = scripts::build_embeddings(&config, &embeddings)
                .await
                .context("Building embeddings failed")?;
            println!("Embedded {} reviews", count);
        }
        Command::Recommend {
            description,
            mode,
            count,
        } => {
            let service = app::recommendation_service(&config)?;
            let n = count.unwrap_or(config.default_recommendations);
            let recommendations = service.recommend(&description, n, mode.into()).await?;

            for (i, rec) in recommendations.iter().enumerate() {
                println!(
                    "{} {} {}",
                    style(format!("{}.", i + 1)).dim(),
                    style(&rec.fragrance).bold(),
                    style(format!("(distance {:.3})", rec.distance)).dim()
                );
                println!("   {}", rec.relevant_review);
            }
        }
    }

    Ok(())
}
