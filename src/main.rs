use clap::{
    ArgAction, CommandFactory, Parser, Subcommand,
    builder::{
        Styles,
        styling::{AnsiColor, Effects},
    },
};
use clap_complete::{Shell, generate};
use tracing_subscriber::EnvFilter;

use spotwatch::{
    cli,
    client::DEFAULT_PLAYLIST_LIMIT,
    config::{self, Config},
    error,
    types::ItemType,
};

fn styles() -> Styles {
    Styles::styled()
        .header(AnsiColor::White.on_default() | Effects::BOLD)
        .usage(AnsiColor::White.on_default() | Effects::BOLD)
        .literal(AnsiColor::BrightBlue.on_default())
        .placeholder(AnsiColor::BrightGreen.on_default())
}

#[derive(Parser, Debug, Clone)]
#[clap(
  version = env!("CARGO_PKG_VERSION"),
  name=env!("CARGO_PKG_NAME"),
  bin_name=env!("CARGO_PKG_NAME"),
  about=env!("CARGO_PKG_DESCRIPTION"),
  styles=styles(),
)]
struct Cli {
    /// Log library activity (-v debug, -vv trace); RUST_LOG overrides
    #[clap(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[clap(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Authorize with Spotify API
    Auth,

    /// Print playback changes until Ctrl-C
    Watch,

    /// Look up a track, artist, album or playlist by URI, URL, id or name
    Search(SearchOptions),

    /// List or create playlists
    Playlists(PlaylistsOptions),

    /// Recently played tracks
    Recent(RecentOptions),

    /// Profile and current playback of the authorized user
    Me,

    /// Get shell completions
    Completions(CompletionsOption),
}

#[derive(Parser, Debug, Clone)]
pub struct SearchOptions {
    /// URI, URL, id or name
    pub reference: String,

    /// Item type: track, artist, album or playlist
    #[clap(long = "type", default_value = "track", value_parser = parse_item_type)]
    pub item_type: ItemType,

    /// Print the full item as JSON
    #[clap(long)]
    pub json: bool,
}

fn parse_item_type(raw: &str) -> Result<ItemType, String> {
    raw.parse().map_err(|e: spotwatch::Error| e.to_string())
}

#[derive(Parser, Debug, Clone)]
#[command(args_conflicts_with_subcommands = true)]
pub struct PlaylistsOptions {
    /// Page to show, starting at 1
    #[clap(long, default_value_t = 1)]
    pub page: u32,

    /// Playlists per page (1-50)
    #[clap(long, default_value_t = DEFAULT_PLAYLIST_LIMIT)]
    pub limit: u32,

    /// Follow pages until the last one
    #[clap(long)]
    pub all: bool,

    #[command(subcommand)]
    pub command: Option<PlaylistsSubcommand>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum PlaylistsSubcommand {
    /// Create a playlist
    Create(CreatePlaylistOpts),
}

#[derive(Parser, Debug, Clone)]
pub struct CreatePlaylistOpts {
    pub name: String,

    #[clap(long)]
    pub description: Option<String>,

    /// Create a private playlist
    #[clap(long)]
    pub private: bool,

    #[clap(long)]
    pub collaborative: bool,
}

#[derive(Parser, Debug, Clone)]
pub struct RecentOptions {
    /// Number of pages to fetch
    #[clap(long, default_value_t = 1)]
    pub pages: u32,
}

#[derive(Parser, Debug, Clone)]
pub struct CompletionsOption {
    shell: Shell,
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "spotwatch=debug",
        _ => "spotwatch=trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Command::Completions(opt) = &cli.command {
        let mut cmd = Cli::command_for_update();
        let name = cmd.get_name().to_string();
        generate(opt.shell, &mut cmd, name, &mut std::io::stdout());
        return;
    }

    if let Err(e) = config::load_env().await {
        error!("Cannot load environment. Err: {}", e);
    }

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(e) => error!("{}", e),
    };

    match cli.command {
        Command::Auth => cli::auth(&config).await,
        Command::Watch => cli::watch(&config).await,
        Command::Search(opt) => cli::search(&config, &opt.reference, opt.item_type, opt.json).await,
        Command::Playlists(opt) => match opt.command {
            Some(PlaylistsSubcommand::Create(c)) => {
                cli::create_playlist(&config, &c.name, c.description, c.private, c.collaborative)
                    .await
            }
            None => cli::playlists(&config, opt.page, opt.limit, opt.all).await,
        },
        Command::Recent(opt) => cli::recent(&config, opt.pages).await,
        Command::Me => cli::me(&config).await,
        Command::Completions(_) => {}
    }
}
