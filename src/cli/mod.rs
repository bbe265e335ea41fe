use anyhow::{Context, bail};
use chrono::Utc;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::catalog::spotify::{SpotifyCatalog, SpotifyConnect};
use crate::config::{self, Config};
use crate::domain::ledger::LedgerEntry;
use crate::storage::operations::Storage;
use crate::voting::lookup::TrackQuery;
use crate::voting::session::{Session, Tally};

#[derive(Parser)]
#[command(name = "playvote")]
#[command(version = "0.1")]
#[command(about = "Collaborative playlist voting")]
pub struct Cli {
    /// Path to the config TOML file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,

    /// Catalog access token of the user voting
    #[arg(short, long, env = "PLAYVOTE_TOKEN", hide_env_values = true)]
    pub token: Option<String>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    #[command(flatten)]
    Session(SessionCommands),
    /// Leave or read comments
    #[command(subcommand)]
    Comment(CommentCommands),
    /// Run http server for voting
    Serve,
}

/// Commands acting as the token holder
#[derive(Subcommand)]
pub enum SessionCommands {
    /// Look a track up and show whether it can be voted for
    Search(TrackArgs),
    /// Only tell whether the track is already in the playlist
    Check(TrackArgs),
    /// Propose a track and vote for it
    Propose(TrackArgs),
    /// Vote for a pending track
    Vote {
        /// Ledger url of the pending track
        url: String,
    },
    /// Take back your vote on a pending track
    Veto {
        /// Ledger url of the pending track
        url: String,
    },
    /// Promote every track that has enough votes
    Sweep,
    /// List tracks waiting for votes
    Pending,
}

#[derive(Subcommand)]
pub enum CommentCommands {
    Add {
        #[arg(short, long)]
        author: String,
        text: String,
    },
    List,
}

/// Either a link, or a name together with an artist
#[derive(Args)]
pub struct TrackArgs {
    /// Track link or uri
    #[arg(short, long)]
    pub url: Option<String>,
    #[arg(short, long)]
    pub name: Option<String>,
    #[arg(short, long)]
    pub artist: Option<String>,
}

impl TrackArgs {
    fn to_query(&self) -> anyhow::Result<TrackQuery> {
        Ok(TrackQuery::from_parts(
            self.url.as_deref(),
            self.name.as_deref(),
            self.artist.as_deref(),
        )?)
    }
}

/// Entrypoint for CLI
pub fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let config_path = cli
        .config
        .to_str()
        .context("Config path is not valid UTF-8")?;
    let cfg = config::Config::load(config_path)?;

    match &cli.command {
        Commands::Serve => serve(cfg),
        Commands::Comment(command) => comment(&cfg, command),
        Commands::Session(command) => {
            let Some(token) = cli.token.as_deref() else {
                bail!("A catalog token is needed, pass --token or set PLAYVOTE_TOKEN");
            };
            with_session(&cfg, token, command)
        }
    }
}

fn with_session(cfg: &Config, token: &str, command: &SessionCommands) -> anyhow::Result<()> {
    let catalog = SpotifyCatalog::new(&cfg.catalog, token)?;
    let mut storage = Storage::new(&cfg.ledger)?;
    let playlist = &cfg.catalog.playlist_id;
    let mut session = Session::open(&catalog, &mut storage, playlist, &cfg.voting)?;

    match command {
        SessionCommands::Search(args) => {
            let track = session.search(&args.to_query()?)?;
            let membership = session.check(&track)?;
            println!("{track}");
            println!("  link: {}", track.url);
            println!("  duration: {}", track.duration_display());
            if let Some(image) = &track.image {
                println!("  cover: {image}");
            }
            println!("  {}", membership.reason);
        }

        SessionCommands::Check(args) => {
            let track = session.search(&args.to_query()?)?;
            let membership = session.check(&track)?;
            println!("{}", membership.reason);
        }

        SessionCommands::Propose(args) => {
            let proposal = session.propose(&args.to_query()?)?;
            println!("You voted for {}", proposal.track);
            print_tally(&session, &proposal.tally);
        }

        SessionCommands::Vote { url } => {
            let tally = session.vote(url)?;
            print_tally(&session, &tally);
        }

        SessionCommands::Veto { url } => {
            let tally = session.veto(url)?;
            print_tally(&session, &tally);
        }

        SessionCommands::Sweep => {
            let tally = session.sweep()?;
            if tally.promotion.is_empty() {
                println!("Nothing to promote");
            }
            print_tally(&session, &tally);
        }

        SessionCommands::Pending => {
            let table = session.pending()?;
            print_pending(&session, &table.entries);
        }
    }

    Ok(())
}

fn print_tally(session: &Session, tally: &Tally) {
    for message in tally.promotion.messages() {
        println!("{message}");
    }
    print_pending(session, &tally.pending);
}

fn print_pending(session: &Session, entries: &[LedgerEntry]) {
    if entries.is_empty() {
        println!("No tracks are waiting for votes");
        return;
    }

    println!("Waiting for votes ({}):", entries.len());
    for entry in entries {
        let mark = if session.has_voted(entry) { "*" } else { " " };
        println!(
            "  {mark} [{}] {} - {}  {}",
            entry.votes(),
            entry.name,
            entry.artist,
            entry.url
        );
    }
}

fn comment(cfg: &Config, command: &CommentCommands) -> anyhow::Result<()> {
    let mut storage = Storage::new(&cfg.ledger)?;

    match command {
        CommentCommands::Add { author, text } => {
            let comment = storage.add_comment(author, text, Utc::now())?;
            println!("Thanks {}, your comment was saved", comment.author);
        }
        CommentCommands::List => {
            for comment in storage.list_comments()? {
                println!(
                    "[{}] {}: {}",
                    comment.created_at.format("%Y-%m-%d %H:%M"),
                    comment.author,
                    comment.comment
                );
            }
        }
    }

    Ok(())
}

fn serve(cfg: Config) -> anyhow::Result<()> {
    println!("Starting HTTP server...");

    let storage = Storage::new(&cfg.ledger).context("Failed to initialize storage")?;

    let http_server = crate::http::server::HttpServer::new(
        storage,
        Box::new(SpotifyConnect {
            config: cfg.catalog.clone(),
        }),
        cfg.catalog.playlist_id,
        cfg.voting,
        cfg.http,
    );

    println!(
        "HTTP server running at http://{}:{}",
        http_server.config.bind_addr, http_server.config.port
    );
    http_server.run();
    Ok(())
}
