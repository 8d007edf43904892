use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tokio::io::{AsyncBufReadExt, BufReader};

use newsbyte::api::{Article, ArticleId, ContentClient};
use newsbyte::config::Config;
use newsbyte::engagement::{AuthState, EngagementController, EngagementState, MutationKind};
use newsbyte::feed::{plan, plan_search, FeedContext, FeedLoader};
use newsbyte::storage::{Database, DatabaseError, GuestPreferences, LocalEngagementStore};
use newsbyte::viewport::ByteFeedViewport;

/// Get the config directory path (~/.config/newsbyte/)
fn get_config_dir() -> Result<PathBuf> {
    let home = std::env::var("HOME").context("HOME environment variable not set")?;
    Ok(PathBuf::from(home).join(".config").join("newsbyte"))
}

fn ensure_config_dir(config_dir: &Path) -> Result<()> {
    if !config_dir.exists() {
        std::fs::create_dir_all(config_dir).context("Failed to create config directory")?;
        tracing::info!(path = %config_dir.display(), "Created config directory");
    }

    // User-only access on Unix
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        match std::fs::metadata(config_dir) {
            Ok(metadata) => {
                let mut perms = metadata.permissions();
                perms.set_mode(0o700);
                if let Err(e) = std::fs::set_permissions(config_dir, perms) {
                    tracing::warn!(
                        path = %config_dir.display(),
                        error = %e,
                        "Failed to set config directory permissions to 0700"
                    );
                }
            }
            Err(e) => {
                tracing::warn!(
                    path = %config_dir.display(),
                    error = %e,
                    "Failed to read config directory metadata"
                );
            }
        }
    }
    Ok(())
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

#[derive(Parser, Debug)]
#[command(name = "newsbyte", about = "Pan-African news feeds from the command line")]
struct Args {
    /// Config file (default: ~/.config/newsbyte/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show the home feed, or one category
    Feed {
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value_t = 0)]
        offset: u32,
    },
    /// Search articles
    Search {
        query: String,
        #[arg(long)]
        category: Option<String>,
    },
    /// Show the NewsBytes feed
    Bytes {
        #[arg(long)]
        limit: Option<u32>,
        /// Step through bytes one at a time, recording views
        #[arg(long)]
        page: bool,
    },
    /// Show one article by id, or by source and slug
    Article {
        #[arg(required_unless_present = "slug", conflicts_with_all = ["source", "slug"])]
        id: Option<String>,
        #[arg(long, requires = "slug")]
        source: Option<String>,
        #[arg(long, requires = "source")]
        slug: Option<String>,
    },
    /// Toggle like on an article
    Like { id: String },
    /// Toggle bookmark on an article
    Save { id: String },
    /// Show or update guest feed preferences
    Prefs {
        /// Comma-separated country codes, e.g. "ng,ke"
        #[arg(long)]
        countries: Option<String>,
        /// Comma-separated category names
        #[arg(long)]
        categories: Option<String>,
    },
}

/// Print a page of articles with the session's view of their engagement.
///
/// Seeding goes through the controller so guests see their on-device likes
/// and saves rather than the anonymous server flags.
async fn print_articles(engagement: &mut EngagementController, articles: &[Article]) {
    if articles.is_empty() {
        println!("No articles.");
        return;
    }
    engagement.seed_articles(articles).await;
    for article in articles {
        let state = engagement
            .snapshot(&article.id)
            .unwrap_or_else(|| EngagementState::from_server(article));
        println!(
            "{:>10}  {}  [{}{} {} likes]",
            article.id,
            article.title,
            if state.is_liked { "♥" } else { " " },
            if state.is_saved { "★" } else { " " },
            state.likes_count
        );
    }
}

/// Step through bytes one at a time. Each byte shown fills the screen; its
/// view is recorded once it has stayed up for the settle window.
async fn page_bytes(bytes: &[Article], viewport: &mut ByteFeedViewport) -> Result<()> {
    viewport.set_articles(bytes);
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    'bytes: for (index, byte) in bytes.iter().enumerate() {
        let mut batch: Vec<(usize, f32)> = vec![(index, 1.0)];
        if let Some(previous) = index.checked_sub(1) {
            batch.push((previous, 0.0));
        }
        viewport.on_visibility(&batch, Instant::now());

        println!("\n[{}/{}] {}", index + 1, bytes.len(), byte.title);
        if let Some(summary) = &byte.summary {
            println!("{summary}");
        }
        println!("(Enter: next, q: quit)");

        loop {
            let deadline = viewport.next_deadline();
            let wake = tokio::time::Instant::from_std(deadline.unwrap_or_else(Instant::now));
            tokio::select! {
                line = lines.next_line() => {
                    match line.context("Failed to read from stdin")? {
                        Some(input) if input.trim().eq_ignore_ascii_case("q") => break 'bytes,
                        None => break 'bytes,
                        Some(_) => break,
                    }
                }
                _ = tokio::time::sleep_until(wake), if deadline.is_some() => {
                    viewport.tick(Instant::now());
                }
            }
        }
    }

    viewport.flush().await;
    Ok(())
}

fn print_state(label: &str, id: &ArticleId, state: Option<EngagementState>) {
    match state {
        Some(state) => println!(
            "{label} {id}: liked={} saved={} likes={}",
            state.is_liked, state.is_saved, state.likes_count
        ),
        None => println!("{label} {id}: unknown"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let config_dir = get_config_dir()?;
    ensure_config_dir(&config_dir)?;
    let config_path = args
        .config
        .clone()
        .unwrap_or_else(|| config_dir.join("config.toml"));
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    let db_path = config.database_path_in(&config_dir);
    let db_path_str = db_path
        .to_str()
        .ok_or_else(|| anyhow::anyhow!("Invalid UTF-8 in database path"))?;
    let db = match Database::open(db_path_str).await {
        Ok(db) => db,
        Err(DatabaseError::InstanceLocked) => {
            eprintln!(
                "Error: Another instance of newsbyte appears to be running. Please close it and try again."
            );
            std::process::exit(1);
        }
        Err(e) => {
            return Err(anyhow::anyhow!("Failed to open database: {}", e));
        }
    };

    let client = Arc::new(
        ContentClient::new(
            &config.api_base_url,
            config.resolve_token(),
            config.request_timeout(),
        )
        .context("Failed to create API client")?,
    );
    let is_authenticated = client.is_authenticated();
    let loader = FeedLoader::new(client.clone(), is_authenticated);
    let auth = if is_authenticated {
        AuthState::Authenticated
    } else {
        AuthState::Anonymous
    };
    let mut engagement = EngagementController::new(
        auth,
        client.clone(),
        Arc::new(LocalEngagementStore::new(db.clone())),
    );
    tracing::debug!(authenticated = is_authenticated, "Session ready");

    match args.command {
        Command::Feed { category, offset } => {
            let prefs = db.load_guest_preferences().await?;
            let query = plan(&FeedContext {
                is_authenticated,
                selected_category: category.as_deref(),
                guest_preferences: &prefs,
                offset,
            });
            let page = loader.load(&query).await?;
            print_articles(&mut engagement, &page.articles).await;
            if let Some(next) = page.next_offset {
                println!("\nMore: --offset {next}");
            }
        }
        Command::Search { query, category } => {
            let prefs = db.load_guest_preferences().await?;
            let ctx = FeedContext {
                is_authenticated,
                selected_category: category.as_deref(),
                guest_preferences: &prefs,
                offset: 0,
            };
            let Some(query) = plan_search(&ctx, &query) else {
                anyhow::bail!("Search query is empty");
            };
            let page = loader.load(&query).await?;
            print_articles(&mut engagement, &page.articles).await;
        }
        Command::Bytes { limit, page } => {
            let bytes = loader
                .load_bytes(limit.unwrap_or(config.bytes_feed_limit))
                .await?;
            if page && !bytes.is_empty() {
                let mut viewport = ByteFeedViewport::new(client.clone(), config.view_settle());
                page_bytes(&bytes, &mut viewport).await?;
            } else {
                print_articles(&mut engagement, &bytes).await;
            }
        }
        Command::Article { id, source, slug } => {
            let article = match (id, source, slug) {
                (Some(id), _, _) => loader.load_article(&ArticleId::new(id)).await?,
                (None, Some(source), Some(slug)) => {
                    loader.load_article_by_slug(&source, &slug).await?
                }
                _ => anyhow::bail!("Provide an article id, or --source with --slug"),
            };
            println!("{}\n", article.title);
            if let Some(summary) = &article.summary {
                println!("{summary}\n");
            }
            if let Some(published) = article.published_at {
                println!("Published: {}", published.format("%Y-%m-%d %H:%M UTC"));
            }
            engagement
                .seed_articles(std::slice::from_ref(&article))
                .await;
            print_state("Engagement", &article.id, engagement.snapshot(&article.id));
        }
        Command::Like { id } => {
            toggle(&mut engagement, &loader, ArticleId::new(id), MutationKind::Like).await?;
        }
        Command::Save { id } => {
            toggle(&mut engagement, &loader, ArticleId::new(id), MutationKind::Save).await?;
        }
        Command::Prefs {
            countries,
            categories,
        } => {
            let current = db.load_guest_preferences().await?;
            if countries.is_none() && categories.is_none() {
                println!("Countries:  {}", current.countries.join(", "));
                println!("Categories: {}", current.categories.join(", "));
            } else {
                let updated = GuestPreferences::new(
                    countries
                        .as_deref()
                        .map(split_list)
                        .unwrap_or(current.countries),
                    categories
                        .as_deref()
                        .map(split_list)
                        .unwrap_or(current.categories),
                );
                db.save_guest_preferences(&updated).await?;
                println!("Preferences saved.");
            }
        }
    }

    Ok(())
}

async fn toggle(
    engagement: &mut EngagementController,
    loader: &FeedLoader,
    id: ArticleId,
    kind: MutationKind,
) -> Result<()> {
    let article = loader.load_article(&id).await?;
    engagement
        .seed_articles(std::slice::from_ref(&article))
        .await;

    let optimistic = engagement.toggle(&article.id, kind)?;
    print_state("Optimistic", &article.id, Some(optimistic));
    engagement.settle_all().await;
    print_state("Settled", &article.id, engagement.snapshot(&article.id));
    Ok(())
}
