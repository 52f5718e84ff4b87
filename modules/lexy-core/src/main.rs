use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use lexy_common::{DateFilter, Post};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use lexy_core::bookmarks::select_repository;
use lexy_core::{
    AddOutcome, AnalysisError, AnalysisOrchestrator, AnalysisState, BookmarkService, ClientConfig,
    CreditGate, DiscussionDialog, Document, FileKv, HistoryLog, HttpAccountStore, HttpBackend,
    LoadMore, LocalStore, Notice, NoticeAction, NoticeLevel, Notifier, OpenOutcome, Platform,
    ResultCount, ResultFetcher, SearchController, SearchInput, SearchOutcome, SiteSelection,
};

#[derive(Parser)]
#[command(name = "lexy", about = "Search discussions across platforms and analyse them with AI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a search and print the first page of results
    Search(SearchArgs),
    /// Summarise the last search's results
    Analyze {
        /// Replace the default summary request
        #[arg(long)]
        prompt: Option<String>,
        /// Continue in an interactive chat after the summary
        #[arg(long)]
        chat: bool,
    },
    /// Chat about a single page
    Discuss {
        link: String,
        #[arg(long, default_value = "")]
        title: String,
    },
    Bookmarks {
        #[command(subcommand)]
        action: BookmarkAction,
    },
    /// Show recent searches
    History,
    /// Show remaining credits
    Credits,
}

#[derive(Args)]
struct SearchArgs {
    #[arg(required = true)]
    text: Vec<String>,
    /// reddit, twitter, quora, hackernews or devto
    #[arg(long, conflicts_with = "custom_url")]
    site: Option<Platform>,
    #[arg(long)]
    custom_url: Option<String>,
    /// today, week, newest, oldest or lifetime
    #[arg(long, default_value = "lifetime")]
    date: DateFilter,
    /// 10, 25 or 50
    #[arg(long, default_value = "10")]
    count: ResultCount,
    /// Pages of results to print
    #[arg(long, default_value_t = 1)]
    pages: usize,
}

#[derive(Subcommand)]
enum BookmarkAction {
    List,
    Add {
        link: String,
        #[arg(long, default_value = "")]
        title: String,
        #[arg(long, default_value = "")]
        snippet: String,
    },
    Remove {
        link: String,
    },
}

/// Prints notices to stderr alongside their follow-up hint.
struct ConsoleNotifier;

impl Notifier for ConsoleNotifier {
    fn notify(&self, notice: Notice) {
        let label = match notice.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Success => "ok",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        let hint = match notice.action {
            Some(NoticeAction::Upgrade) => " (upgrade your plan to get more credits)",
            Some(NoticeAction::SignIn) => " (set LEXY_EMAIL to sign in)",
            None => "",
        };
        eprintln!("[{label}] {}{hint}", notice.message);
    }
}

struct App {
    config: ClientConfig,
    store: LocalStore,
    backend: Arc<HttpBackend>,
    accounts: Arc<HttpAccountStore>,
    gate: Arc<CreditGate>,
    notifier: Arc<dyn Notifier>,
}

impl App {
    async fn init(config: ClientConfig) -> Result<Self> {
        let kv = FileKv::open(&config.store_path)
            .with_context(|| format!("Cannot open {}", config.store_path.display()))?;
        let store = LocalStore::new(Arc::new(kv));
        let backend = Arc::new(HttpBackend::new(&config.api_url));
        let accounts = Arc::new(HttpAccountStore::new(&config.api_url));
        let notifier: Arc<dyn Notifier> = Arc::new(ConsoleNotifier);

        let gate = CreditGate::connect(
            config.identity(),
            accounts.clone(),
            store.clone(),
            config.anon_credits,
            notifier.clone(),
        )
        .await
        .context("Failed to load account")?;

        Ok(Self {
            config,
            store,
            backend,
            accounts,
            gate: Arc::new(gate),
            notifier,
        })
    }

    fn history(&self) -> HistoryLog {
        HistoryLog::new(self.store.clone(), self.config.history_limit)
    }

    fn fetcher(&self) -> ResultFetcher {
        ResultFetcher::new(
            self.backend.clone(),
            self.gate.clone(),
            self.store.clone(),
            self.history(),
        )
    }

    async fn search(&self, args: SearchArgs) -> Result<()> {
        let site = match (args.site, args.custom_url) {
            (Some(platform), _) => SiteSelection::Platform(platform),
            (None, Some(url)) => SiteSelection::Custom(url),
            (None, None) => SiteSelection::Universal,
        };
        let input = SearchInput {
            text: args.text.join(" "),
            site,
            date_filter: args.date,
            result_count: args.count,
        };

        let controller = SearchController::new(Arc::new(self.fetcher()), self.config.page_size);
        match controller.search(input).await {
            SearchOutcome::Results(posts) if posts.is_empty() => {
                println!("No results.");
                return Ok(());
            }
            SearchOutcome::Results(_) => {}
            SearchOutcome::Blocked(_) | SearchOutcome::Superseded => return Ok(()),
        }

        print_posts(&controller.visible(), 0);
        for _ in 1..args.pages {
            match controller.load_more() {
                LoadMore::Revealed { from, to } => print_posts(&controller.visible()[from..to], from),
                LoadMore::Exhausted | LoadMore::Busy => break,
            }
        }

        let session = controller.session();
        if let Some(session) = session.filter(|s| s.paginator.has_more()) {
            println!(
                "\nShowing {} of {}. Use --pages to see more.",
                session.paginator.displayed(),
                session.paginator.results().len()
            );
        }
        Ok(())
    }

    async fn analyze(&self, prompt: Option<String>, chat: bool) -> Result<()> {
        let sources = self
            .fetcher()
            .cached()
            .map(|data| data.results)
            .unwrap_or_default();
        if sources.is_empty() {
            eprintln!("No cached results; analysing an empty result set.");
        }

        let mut orch = AnalysisOrchestrator::new(self.backend.clone(), self.gate.clone(), sources);
        if let Err(e) = orch.generate_summary(prompt.as_deref()).await {
            return report(e);
        }
        print_summary(&orch);

        if !chat {
            return Ok(());
        }

        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        println!("\nAsk a follow-up (/back, /new, /quit):");
        while let Some(line) = lines.next_line().await? {
            let result = match line.trim() {
                "/quit" => break,
                "/back" => orch.back_to_summary().map(|_| print_summary(&orch)),
                "/new" => {
                    orch.new_analysis()?;
                    let generated = orch.generate_summary(prompt.as_deref()).await;
                    generated.map(|_| print_summary(&orch))
                }
                "" => continue,
                text => {
                    if matches!(orch.state(), AnalysisState::SummaryShown { .. }) {
                        orch.continue_in_chat()?;
                    }
                    let sent = orch.send_message(text).await;
                    sent.map(|_| {
                        if let Some(reply) = orch.messages().last() {
                            println!("\n{}\n", Document::parse(&reply.content).to_plain_text());
                        }
                    })
                }
            };
            if let Err(e) = result {
                report(e)?;
            }
        }
        Ok(())
    }

    async fn discuss(&self, link: String, title: String) -> Result<()> {
        let mut dialog = DiscussionDialog::new(self.backend.clone(), self.gate.clone(), self.notifier.clone());
        let title = if title.is_empty() { link.clone() } else { title };

        match dialog.open(Post::new(title, link, "")).await {
            Ok(OpenOutcome::Opened) => {}
            Ok(_) => return Ok(()),
            Err(e) => return report(e),
        }

        println!("Ask about this page (/quit to leave):");
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Some(line) = lines.next_line().await? {
            match line.trim() {
                "/quit" => break,
                "" => continue,
                question => match dialog.ask(question).await {
                    Ok(()) => {
                        if let Some(reply) = dialog.messages().last() {
                            println!("\n{}\n", Document::parse(&reply.content).to_plain_text());
                        }
                    }
                    Err(e) => report(e)?,
                },
            }
        }
        dialog.close();
        Ok(())
    }

    async fn bookmarks(&self, action: BookmarkAction) -> Result<()> {
        let repo = select_repository(&self.config.identity(), self.store.clone(), self.accounts.clone());
        let service = BookmarkService::new(repo, self.notifier.clone());

        match action {
            BookmarkAction::List => {
                let saved = service.list().await?;
                if saved.is_empty() {
                    println!("No bookmarks.");
                }
                for (i, b) in saved.iter().enumerate() {
                    println!("{}. {}\n   {}", i + 1, b.title, b.key());
                }
            }
            BookmarkAction::Add { link, title, snippet } => {
                let title = if title.is_empty() { link.clone() } else { title };
                if service.add(&Post::new(title, link, snippet)).await? == AddOutcome::Added {
                    tracing::debug!("Bookmark added");
                }
            }
            BookmarkAction::Remove { link } => {
                if service.remove(&link).await? == 0 {
                    println!("No bookmark with that link.");
                }
            }
        }
        Ok(())
    }

    fn print_history(&self) {
        let entries = self.history().entries();
        if entries.is_empty() {
            println!("No searches yet.");
        }
        for entry in entries {
            println!("{}  ({} results)", entry.title.trim(), entry.data.len());
        }
    }

    fn print_credits(&self) {
        let account = self.gate.account();
        if account.is_unlimited() {
            println!("{} plan: unlimited", account.membership);
        } else {
            println!("{} plan: {} credits remaining", account.membership, account.credits);
        }
    }
}

fn print_posts(posts: &[Post], offset: usize) {
    for (i, post) in posts.iter().enumerate() {
        println!("{}. {}\n   {}", offset + i + 1, post.title, post.display_link());
        if !post.snippet.is_empty() {
            println!("   {}", post.snippet);
        }
    }
}

fn print_summary(orch: &AnalysisOrchestrator) {
    let Some(doc) = orch.summary_document() else {
        return;
    };
    println!("{}", doc.to_plain_text());
    let citations = doc.citations();
    if !citations.is_empty() {
        println!("\nSources:");
        for (index, href) in citations {
            println!("  [{index}] {href}");
        }
    }
}

/// Gate denials were already shown as notices; other errors are printed.
fn report(err: AnalysisError) -> Result<()> {
    match err {
        AnalysisError::Denied(_) => Ok(()),
        other => {
            eprintln!("{other}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("lexy=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = ClientConfig::from_env()?;
    let app = App::init(config).await?;

    match cli.command {
        Command::Search(args) => app.search(args).await?,
        Command::Analyze { prompt, chat } => app.analyze(prompt, chat).await?,
        Command::Discuss { link, title } => app.discuss(link, title).await?,
        Command::Bookmarks { action } => app.bookmarks(action).await?,
        Command::History => app.print_history(),
        Command::Credits => app.print_credits(),
    }

    Ok(())
}
