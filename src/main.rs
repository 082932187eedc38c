use anyhow::{anyhow, Context, Result};
use campaign_keeper::config::{self, Config};
use campaign_keeper::{
    checkout, dice, CampaignBook, Cart, Catalog, Character, CharacterRepository, CheckoutOptions,
    Money, SqliteStore,
};
use chrono::Local;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "campaign-keeper", version, about = "Tabletop session manager")]
struct Cli {
    /// SQLite database path
    #[arg(long, global = true, env = config::ENV_DB)]
    db: Option<PathBuf>,

    /// Shop catalog CSV
    #[arg(long, global = true, env = config::ENV_CATALOG)]
    catalog: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Validate a catalog CSV and list its items
    ImportCatalog { path: PathBuf },

    /// Character sheets
    #[command(subcommand)]
    Character(CharacterCommand),

    /// Buy items from the shop: --item torch:3 --item rope
    Buy {
        character: String,
        #[arg(long = "item", required = true)]
        items: Vec<String>,
        /// Refuse to break coins for change
        #[arg(long)]
        exact_change: bool,
    },

    /// Roll dice, e.g. 2d6+3
    Roll { notation: String },

    /// Campaign notes
    #[command(subcommand)]
    Campaign(CampaignCommand),
}

#[derive(Subcommand)]
enum CharacterCommand {
    New {
        name: String,
        #[arg(long, default_value = "Fighter")]
        class: String,
        #[arg(long, default_value_t = 1)]
        level: u32,
        #[arg(long, default_value_t = 10)]
        hp: u32,
        /// Starting gold
        #[arg(long, default_value_t = 0)]
        gold: u64,
    },
    List,
    Show { name: String },
    /// Add coins: --gold 5 --silver 3
    Credit {
        name: String,
        #[arg(long, default_value_t = 0)]
        copper: u64,
        #[arg(long, default_value_t = 0)]
        silver: u64,
        #[arg(long, default_value_t = 0)]
        electrum: u64,
        #[arg(long, default_value_t = 0)]
        gold: u64,
        #[arg(long, default_value_t = 0)]
        platinum: u64,
    },
}

#[derive(Subcommand)]
enum CampaignCommand {
    New {
        name: String,
        #[arg(long, default_value = "")]
        description: String,
    },
    List,
    /// Append today's session summary
    Log { name: String, summary: String },
}

fn main() -> Result<()> {
    config::init_logging();

    let cli = Cli::parse();
    let mut config = Config::from_env();
    if let Some(db) = cli.db {
        config.db_path = db;
    }
    if let Some(catalog) = cli.catalog {
        config.catalog_path = catalog;
    }

    match cli.command {
        Command::ImportCatalog { path } => run_import_catalog(&path),
        Command::Character(cmd) => run_character(&config, cmd),
        Command::Buy { character, items, exact_change } => {
            run_buy(&config, &character, &items, exact_change)
        }
        Command::Roll { notation } => run_roll(&notation),
        Command::Campaign(cmd) => run_campaign(&config, cmd),
    }
}

fn open_store(config: &Config) -> Result<Arc<SqliteStore>> {
    Ok(Arc::new(SqliteStore::open(&config.db_path)?))
}

fn run_import_catalog(path: &Path) -> Result<()> {
    println!("📂 Loading catalog {:?}...", path);
    let catalog = Catalog::load_csv(path)?;

    for item in catalog.items() {
        println!("  {:<24} {:<12} {}", item.name, item.category, item.price);
    }
    println!("✓ {} items", catalog.len());
    Ok(())
}

fn find_character(repo: &CharacterRepository, name: &str) -> Result<Character> {
    repo.find_by_name(name)?
        .ok_or_else(|| anyhow!("No character named {:?}", name))
}

fn run_character(config: &Config, cmd: CharacterCommand) -> Result<()> {
    let repo = CharacterRepository::new(open_store(config)?, &config.actor);

    match cmd {
        CharacterCommand::New { name, class, level, hp, gold } => {
            let c = repo.create(Character::new(&name, &class, level, hp).with_purse(Money::gold(gold)))?;
            println!("✓ Created {} ({})", c.name, c.id);
        }
        CharacterCommand::List => {
            for c in repo.list()? {
                println!("  {:<20} {:<10} lvl {:<3} {}", c.name, c.class, c.level, c.purse);
            }
        }
        CharacterCommand::Show { name } => {
            let c = find_character(&repo, &name)?;
            println!("{}", serde_json::to_string_pretty(&c)?);
        }
        CharacterCommand::Credit { name, copper, silver, electrum, gold, platinum } => {
            let c = find_character(&repo, &name)?;
            let amount = Money { copper, silver, electrum, gold, platinum };
            let updated = repo.credit(&c.id, &amount)?;
            println!("✓ {} now holds {}", updated.name, updated.purse);
        }
    }

    Ok(())
}

/// "torch:3" → ("torch", 3); "rope" → ("rope", 1)
fn parse_item_arg(arg: &str) -> Result<(String, u32)> {
    match arg.split_once(':') {
        Some((id, qty)) => {
            let qty: i64 = qty.parse().with_context(|| format!("Bad quantity in {:?}", arg))?;
            let qty = campaign_keeper::Quantity::check(qty)?;
            Ok((id.to_string(), u32::try_from(qty).context("Quantity too large")?))
        }
        None => Ok((arg.to_string(), 1)),
    }
}

fn run_buy(config: &Config, character: &str, items: &[String], exact_change: bool) -> Result<()> {
    let catalog = Catalog::load_csv(&config.catalog_path)?;
    let repo = CharacterRepository::new(open_store(config)?, &config.actor);
    let c = find_character(&repo, character)?;

    let mut cart = Cart::new();
    for arg in items {
        let (id, qty) = parse_item_arg(arg)?;
        cart.add(&id, qty);
    }

    let receipt = checkout(&repo, &catalog, &c.id, &cart, CheckoutOptions { exact_change })?;

    println!("🛒 {} paid {}", c.name, receipt.total);
    println!("   purse: {} → {}", receipt.purse_before, receipt.purse_after);
    println!("   receipt: {}", &receipt.receipt_id[..12]);
    Ok(())
}

fn run_roll(notation: &str) -> Result<()> {
    let roll = dice::roll(notation, &mut rand::thread_rng())?;
    println!("🎲 {} → {:?} = {}", roll.expr, roll.rolls, roll.total);
    Ok(())
}

fn run_campaign(config: &Config, cmd: CampaignCommand) -> Result<()> {
    let book = CampaignBook::new(open_store(config)?, &config.actor);

    match cmd {
        CampaignCommand::New { name, description } => {
            let c = book.create(&name, &description)?;
            println!("✓ Created campaign {} ({})", c.name, c.id);
        }
        CampaignCommand::List => {
            for c in book.list()? {
                println!("  {:<30} {} sessions, {} NPCs", c.name, c.sessions.len(), c.npcs.len());
            }
        }
        CampaignCommand::Log { name, summary } => {
            let campaign = book
                .list()?
                .into_iter()
                .find(|c| c.name.eq_ignore_ascii_case(&name))
                .ok_or_else(|| anyhow!("No campaign named {:?}", name))?;
            let note = book.log_session(&campaign.id, Local::now().date_naive(), &summary)?;
            println!("✓ Logged session {} of {}", note.number, campaign.name);
        }
    }

    Ok(())
}
