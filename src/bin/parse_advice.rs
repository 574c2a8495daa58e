/// Show how an oracle response would be parsed, without trading
///
/// Run with: echo "buy SOL 12, sell all" | cargo run --bin parse_advice -- --all-alias AVAX
use clap::Parser;
use newstrader::{AdviceParser, AppConfig};
use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "parse_advice", about = "Parse oracle text from stdin into trade advice")]
struct Args {
    /// Config file to take parser defaults from
    #[arg(long)]
    config: Option<PathBuf>,

    /// Holding time for buys without one
    #[arg(long)]
    default_duration: Option<u32>,

    /// Asset bought for `buy all`
    #[arg(long)]
    all_alias: Option<String>,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let config = AppConfig::load(args.config.as_deref())?;
    let default_duration = args
        .default_duration
        .unwrap_or(config.trading.default_duration_hours);
    let all_alias = args
        .all_alias
        .unwrap_or(config.trading.all_alias_asset);
    if all_alias.is_empty() {
        anyhow::bail!("No `buy all` asset: pass --all-alias or set trading.all_alias_asset");
    }

    let mut text = String::new();
    std::io::stdin().read_to_string(&mut text)?;

    let parser = AdviceParser::new(default_duration, all_alias);
    let advices = parser.parse(&text);

    if advices.is_empty() {
        println!("No trade advice found");
    }
    for (i, advice) in advices.iter().enumerate() {
        println!("{:>2}. {}", i + 1, advice);
    }

    Ok(())
}
