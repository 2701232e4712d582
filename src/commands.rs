//! Command-line verbs, dispatched through a registry built once in `main`.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::future::LocalBoxFuture;
use tracing::info;

use crate::app::App;
use crate::config::parse_interval;
use crate::error::{AppError, Result};
use crate::feed::{validate_url, FetcherSettings, HttpFetcher};
use crate::ingest::{Ingestor, Scheduler, Shutdown};
use crate::models::{NewSource, Source};

pub type Handler = for<'a> fn(&'a mut App, &'a [String]) -> LocalBoxFuture<'a, Result<()>>;

const DEFAULT_BROWSE_LIMIT: usize = 2;
const DESCRIPTION_PREVIEW_CHARS: usize = 200;

#[derive(Default)]
pub struct CommandRegistry {
    handlers: BTreeMap<&'static str, Handler>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in command.
    pub fn with_builtin_commands() -> Self {
        let mut registry = Self::new();
        registry.register("login", login);
        registry.register("register", register);
        registry.register("reset", reset);
        registry.register("users", users);
        registry.register("agg", agg);
        registry.register("addfeed", add_feed);
        registry.register("feeds", feeds);
        registry.register("follow", follow);
        registry.register("following", following);
        registry.register("unfollow", unfollow);
        registry.register("browse", browse);
        registry
    }

    pub fn register(&mut self, name: &'static str, handler: Handler) {
        self.handlers.insert(name, handler);
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.handlers.keys().copied().collect()
    }

    pub async fn run(&self, app: &mut App, name: &str, args: &[String]) -> Result<()> {
        let handler = self.handlers.get(name).ok_or_else(|| {
            AppError::InvalidArgument(format!(
                "unknown command: {} (available: {})",
                name,
                self.names().join(", ")
            ))
        })?;
        handler(app, args).await
    }
}

fn usage(text: &str) -> AppError {
    AppError::InvalidArgument(format!("usage: {}", text))
}

fn login<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let name = args.first().ok_or_else(|| usage("login <name>"))?;
        let user = app
            .repository
            .get_user_by_name(name)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("user {:?}", name)))?;
        app.set_current_user(&user.name)?;
        println!("Logged in as {}", user.name);
        Ok(())
    })
}

fn register<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let name = args.first().ok_or_else(|| usage("register <name>"))?;
        let user = app.repository.create_user(name).await?;
        app.set_current_user(&user.name)?;
        println!("User {} has been created", user.name);
        Ok(())
    })
}

fn reset<'a>(app: &'a mut App, _args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let deleted = app.repository.delete_all_users().await?;
        println!("Deleted {} users and everything they registered", deleted);
        Ok(())
    })
}

fn users<'a>(app: &'a mut App, _args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let users = app.repository.list_users().await?;
        if users.is_empty() {
            println!("No users registered");
            return Ok(());
        }

        let current = app.config.current_user.as_deref();
        for user in users {
            if current == Some(user.name.as_str()) {
                println!("* {} (current)", user.name);
            } else {
                println!("* {}", user.name);
            }
        }
        Ok(())
    })
}

fn add_feed<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let [name, url] = args else {
            return Err(usage("addfeed <name> <url>"));
        };
        validate_url(url).map_err(|e| AppError::InvalidArgument(e.to_string()))?;

        let user = app.current_user().await?;
        let source = app
            .repository
            .create_source(NewSource {
                name: name.clone(),
                url: url.clone(),
                user_id: user.id,
            })
            .await?;
        let follow = app.repository.create_follow(user.id, source.id).await?;

        println!("Feed created:");
        println!("* Name: {}", source.name);
        println!("* URL:  {}", source.url);
        println!("* User: {}", user.name);
        println!();
        println!("{} is now following {}", follow.user_name, follow.source_name);
        Ok(())
    })
}

fn feeds<'a>(app: &'a mut App, _args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let sources = app.repository.list_sources().await?;
        if sources.is_empty() {
            println!("No feeds found");
            return Ok(());
        }

        for source in sources {
            let owner = app
                .repository
                .get_user(source.user_id)
                .await?
                .map(|u| u.name)
                .unwrap_or_default();
            let last_fetched = source
                .last_fetched_at
                .map(|t| t.format("%Y-%m-%d %H:%M:%S").to_string())
                .unwrap_or_else(|| "never".to_string());

            println!("* Name: {}", source.name);
            println!("  URL: {}", source.url);
            println!("  User: {}", owner);
            println!("  Last fetched: {}", last_fetched);
            println!();
        }
        Ok(())
    })
}

async fn source_by_url(app: &App, url: &str) -> Result<Source> {
    app.repository
        .get_source_by_url(url)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("feed {}", url)))
}

fn follow<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let url = args.first().ok_or_else(|| usage("follow <url>"))?;
        let user = app.current_user().await?;
        let source = source_by_url(app, url).await?;

        let follow = app.repository.create_follow(user.id, source.id).await?;
        println!("{} is now following {}", follow.user_name, follow.source_name);
        Ok(())
    })
}

fn following<'a>(app: &'a mut App, _args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let user = app.current_user().await?;
        let follows = app.repository.list_follows_for_user(user.id).await?;
        if follows.is_empty() {
            println!("Not following any feeds");
            return Ok(());
        }

        println!("Feeds {} is following:", user.name);
        for follow in follows {
            println!("* {}", follow.source_name);
        }
        Ok(())
    })
}

fn unfollow<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let url = args.first().ok_or_else(|| usage("unfollow <url>"))?;
        let user = app.current_user().await?;
        let source = source_by_url(app, url).await?;

        app.repository.delete_follow(user.id, source.id).await?;
        println!("{} has unfollowed {}", user.name, source.name);
        Ok(())
    })
}

fn agg<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let interval = match args.first() {
            Some(text) => parse_interval(text)?,
            None => app.config.poll_interval(),
        };

        let fetcher = HttpFetcher::new(&FetcherSettings::from(&app.config))?;
        let ingestor = Ingestor::new(Arc::clone(&app.repository), Arc::new(fetcher));
        let scheduler = Scheduler::new(ingestor, interval)?;

        let (stop, shutdown) = Shutdown::channel();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown requested, finishing the current cycle");
                let _ = stop.send(true);
            }
        });

        scheduler.run(shutdown).await;
        Ok(())
    })
}

fn browse<'a>(app: &'a mut App, args: &'a [String]) -> LocalBoxFuture<'a, Result<()>> {
    Box::pin(async move {
        let limit = match args.first() {
            Some(text) => text
                .parse::<usize>()
                .map_err(|e| AppError::InvalidArgument(format!("invalid limit: {}", e)))?,
            None => DEFAULT_BROWSE_LIMIT,
        };

        let user = app.current_user().await?;
        let entries = app.repository.list_entries_for_user(user.id, limit).await?;
        if entries.is_empty() {
            println!("No posts found, follow some feeds and run `agg` first");
            return Ok(());
        }

        println!("Found {} posts for user {}:", entries.len(), user.name);
        for entry in entries {
            println!();
            println!("Title: {}", entry.title);
            println!("URL: {}", entry.url);
            if let Some(description) = &entry.description {
                println!("Description: {}", preview(description));
            }
            println!("Published: {}", entry.published_at.format("%Y-%m-%d %H:%M:%S"));
        }
        Ok(())
    })
}

fn preview(text: &str) -> String {
    if text.chars().count() <= DESCRIPTION_PREVIEW_CHARS {
        return text.to_string();
    }
    let cut: String = text.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
    format!("{}...", cut)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::db::{Repository, SourceStore};
    use crate::models::NewEntry;
    use chrono::Utc;
    use tempfile::TempDir;

    async fn app(dir: &TempDir) -> App {
        let config_path = dir.path().join("config.toml");
        let config = Config::load_from(&config_path).unwrap();
        let repository = Repository::open_in_memory().await.unwrap();
        App::with_repository(config, config_path, repository)
    }

    fn args(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();

        let err = registry.run(&mut app, "launch", &[]).await.unwrap_err();
        assert!(err.to_string().contains("unknown command: launch"));
    }

    #[tokio::test]
    async fn test_register_sets_current_user() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();

        registry
            .run(&mut app, "register", &args(&["kahya"]))
            .await
            .unwrap();

        assert_eq!(app.config.current_user.as_deref(), Some("kahya"));
        let saved = Config::load_from(&dir.path().join("config.toml")).unwrap();
        assert_eq!(saved.current_user.as_deref(), Some("kahya"));
        assert_eq!(app.current_user().await.unwrap().name, "kahya");
    }

    #[tokio::test]
    async fn test_addfeed_requires_current_user() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();

        let err = registry
            .run(&mut app, "addfeed", &args(&["Blog", "https://blog.boot.dev/index.xml"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));
    }

    #[tokio::test]
    async fn test_addfeed_creates_source() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();
        registry
            .run(&mut app, "register", &args(&["kahya"]))
            .await
            .unwrap();

        registry
            .run(&mut app, "addfeed", &args(&["Blog", "https://blog.boot.dev/index.xml"]))
            .await
            .unwrap();

        let sources = app.repository.list_sources().await.unwrap();
        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].name, "Blog");
        assert!(sources[0].last_fetched_at.is_none());
    }

    #[tokio::test]
    async fn test_addfeed_validates_arguments() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();
        registry
            .run(&mut app, "register", &args(&["kahya"]))
            .await
            .unwrap();

        let err = registry
            .run(&mut app, "addfeed", &args(&["only-name"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("usage: addfeed"));

        let err = registry
            .run(&mut app, "addfeed", &args(&["Bad", "ftp://example.com/feed"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported URL scheme"));
    }

    async fn registered(dir: &TempDir, name: &str) -> (App, CommandRegistry) {
        let mut app = app(dir).await;
        let registry = CommandRegistry::with_builtin_commands();
        registry
            .run(&mut app, "register", &args(&[name]))
            .await
            .unwrap();
        (app, registry)
    }

    #[tokio::test]
    async fn test_addfeed_follows_new_source() {
        let dir = TempDir::new().unwrap();
        let (mut app, registry) = registered(&dir, "kahya").await;

        registry
            .run(&mut app, "addfeed", &args(&["Blog", "https://blog.boot.dev/index.xml"]))
            .await
            .unwrap();

        let user = app.current_user().await.unwrap();
        let follows = app.repository.list_follows_for_user(user.id).await.unwrap();
        assert_eq!(follows.len(), 1);
        assert_eq!(follows[0].source_name, "Blog");
    }

    #[tokio::test]
    async fn test_follow_and_unfollow_by_url() {
        let dir = TempDir::new().unwrap();
        let (mut app, registry) = registered(&dir, "kahya").await;
        let url = "https://blog.boot.dev/index.xml";
        registry
            .run(&mut app, "addfeed", &args(&["Blog", url]))
            .await
            .unwrap();
        registry
            .run(&mut app, "register", &args(&["lane"]))
            .await
            .unwrap();
        let lane = app.current_user().await.unwrap();

        registry.run(&mut app, "follow", &args(&[url])).await.unwrap();
        registry.run(&mut app, "following", &[]).await.unwrap();
        assert_eq!(app.repository.list_follows_for_user(lane.id).await.unwrap().len(), 1);

        let err = registry.run(&mut app, "follow", &args(&[url])).await.unwrap_err();
        assert!(matches!(err, AppError::InvalidArgument(_)));

        registry.run(&mut app, "unfollow", &args(&[url])).await.unwrap();
        assert!(app.repository.list_follows_for_user(lane.id).await.unwrap().is_empty());

        let err = registry
            .run(&mut app, "follow", &args(&["https://nowhere.example/feed"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_browse_shows_followed_feeds_only() {
        let dir = TempDir::new().unwrap();
        let (mut app, registry) = registered(&dir, "kahya").await;
        registry
            .run(&mut app, "addfeed", &args(&["Blog", "https://blog.boot.dev/index.xml"]))
            .await
            .unwrap();
        let source = app
            .repository
            .get_source_by_url("https://blog.boot.dev/index.xml")
            .await
            .unwrap()
            .unwrap();
        app.repository
            .insert_entry(NewEntry::new(source.id, "Post", "https://blog.boot.dev/1", "", Utc::now()))
            .await
            .unwrap();

        registry.run(&mut app, "browse", &[]).await.unwrap();
        let user = app.current_user().await.unwrap();
        assert_eq!(
            app.repository.list_entries_for_user(user.id, 2).await.unwrap().len(),
            1
        );

        let err = registry
            .run(&mut app, "browse", &args(&["many"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid limit"));
    }

    #[tokio::test]
    async fn test_login_switches_existing_user_only() {
        let dir = TempDir::new().unwrap();
        let (mut app, registry) = registered(&dir, "kahya").await;
        registry
            .run(&mut app, "register", &args(&["lane"]))
            .await
            .unwrap();

        registry.run(&mut app, "login", &args(&["kahya"])).await.unwrap();
        assert_eq!(app.config.current_user.as_deref(), Some("kahya"));
        registry.run(&mut app, "users", &[]).await.unwrap();

        let err = registry
            .run(&mut app, "login", &args(&["ghost"]))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
        assert_eq!(app.config.current_user.as_deref(), Some("kahya"));
    }

    #[tokio::test]
    async fn test_reset_removes_users() {
        let dir = TempDir::new().unwrap();
        let (mut app, registry) = registered(&dir, "kahya").await;

        registry.run(&mut app, "reset", &[]).await.unwrap();

        assert!(app.repository.list_users().await.unwrap().is_empty());
        let err = app.current_user().await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_agg_rejects_bad_interval() {
        let dir = TempDir::new().unwrap();
        let mut app = app(&dir).await;
        let registry = CommandRegistry::with_builtin_commands();

        let err = registry
            .run(&mut app, "agg", &args(&["soon"]))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("invalid duration"));
    }

    #[test]
    fn test_registry_lists_builtins() {
        let registry = CommandRegistry::with_builtin_commands();
        assert_eq!(
            registry.names(),
            vec![
                "addfeed", "agg", "browse", "feeds", "follow", "following", "login", "register",
                "reset", "unfollow", "users"
            ]
        );
    }

    #[test]
    fn test_preview_truncates_on_char_boundary() {
        let long = "é".repeat(250);
        let shown = preview(&long);
        assert!(shown.ends_with("..."));
        assert_eq!(shown.chars().count(), DESCRIPTION_PREVIEW_CHARS + 3);
        assert_eq!(preview("short"), "short");
    }
}
