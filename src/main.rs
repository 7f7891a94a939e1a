use anyhow::Result;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use evler_scout::config::Settings;
use evler_scout::models::{ListingRecord, ListingType};
use evler_scout::pipeline::Pipeline;
use evler_scout::rates::{fallback_rates, FixedRateProvider, RateProvider, TcmbRateProvider};
use evler_scout::scrapers::EvlerParser;
use evler_scout::search::{
    fold_turkish, parse_listing_date, query, search, PriceStats, SearchParams, SortSpec,
    DEFAULT_LIMIT, DEFAULT_QUERY_LIMIT,
};
use evler_scout::store::CsvStore;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "evler-scout")]
#[command(about = "Turn saved 101evler listing pages into a normalized CSV dataset")]
struct Cli {
    /// JSON settings file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Use the fallback exchange rates instead of the central bank feed
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract every page not yet in the dataset (default)
    Extract,

    /// Extract repeatedly at a fixed interval
    Watch {
        #[arg(long, default_value_t = 30)]
        interval_minutes: u64,
        #[arg(long, default_value_t = 10)]
        max_runs: usize,
    },

    /// Recompute converted prices for all stored listings
    RefreshPrices,

    /// Re-derive implausibly small land areas from the listing text
    FixAreas {
        #[arg(long, default_value_t = 100.0)]
        threshold: f64,
    },

    /// Filter the stored dataset
    Search(SearchArgs),

    /// Free-text lookup across titles, descriptions, places and agencies
    Query {
        /// Words that must all appear, or a single listing id
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,
        #[arg(long, default_value_t = DEFAULT_QUERY_LIMIT)]
        limit: usize,
        /// Write the matches to this JSON file
        #[arg(long)]
        json: Option<PathBuf>,
    },
}

#[derive(Args)]
struct SearchArgs {
    #[arg(long)]
    city: Option<String>,
    #[arg(long)]
    district: Option<String>,
    /// rent / sale (Kiralık / Satılık)
    #[arg(long, value_parser = listing_type)]
    listing_type: Option<ListingType>,
    #[arg(long)]
    property_type: Option<String>,
    #[arg(long)]
    property_subtype: Option<String>,
    /// Price bounds in TRY
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    #[arg(long)]
    min_area: Option<f64>,
    #[arg(long)]
    max_area: Option<f64>,
    #[arg(long)]
    min_donum: Option<f64>,
    #[arg(long)]
    max_donum: Option<f64>,
    /// Comma separated, e.g. 2+1,3+1
    #[arg(long, value_delimiter = ',')]
    rooms: Vec<String>,
    #[arg(long = "all", value_delimiter = ',')]
    keywords_all: Vec<String>,
    #[arg(long = "any", value_delimiter = ',')]
    keywords_any: Vec<String>,
    #[arg(long = "none", value_delimiter = ',')]
    keywords_none: Vec<String>,
    #[arg(long)]
    has_phone: Option<bool>,
    #[arg(long)]
    has_images: Option<bool>,
    /// DD/MM/YYYY
    #[arg(long, value_parser = listing_date)]
    date_from: Option<NaiveDate>,
    #[arg(long, value_parser = listing_date)]
    date_to: Option<NaiveDate>,
    /// column[:asc|desc]
    #[arg(long)]
    sort: Option<SortSpec>,
    #[arg(long, default_value_t = DEFAULT_LIMIT)]
    limit: usize,
    /// Write the matches to this JSON file
    #[arg(long)]
    json: Option<PathBuf>,
}

impl SearchArgs {
    fn params(&self) -> SearchParams {
        SearchParams {
            city: self.city.clone(),
            district: self.district.clone(),
            listing_type: self.listing_type,
            property_type: self.property_type.clone(),
            property_subtype: self.property_subtype.clone(),
            min_price: self.min_price,
            max_price: self.max_price,
            min_area_m2: self.min_area,
            max_area_m2: self.max_area,
            min_donum: self.min_donum,
            max_donum: self.max_donum,
            rooms: self.rooms.clone(),
            keywords_all: self.keywords_all.clone(),
            keywords_any: self.keywords_any.clone(),
            keywords_none: self.keywords_none.clone(),
            has_phone: self.has_phone,
            has_images: self.has_images,
            date_from: self.date_from,
            date_to: self.date_to,
            sort: self.sort.clone(),
            limit: self.limit,
        }
    }
}

fn listing_type(value: &str) -> Result<ListingType, String> {
    match fold_turkish(value.trim()).as_str() {
        "rent" | "kiralik" => Ok(ListingType::Rent),
        "sale" | "satilik" => Ok(ListingType::Sale),
        other => Err(format!("unknown listing type '{}'", other)),
    }
}

fn listing_date(value: &str) -> Result<NaiveDate, String> {
    parse_listing_date(value).ok_or_else(|| format!("expected DD/MM/YYYY, got '{}'", value))
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref())?;

    let rates: Box<dyn RateProvider> = if cli.offline {
        Box::new(FixedRateProvider::new(fallback_rates(&settings)))
    } else {
        Box::new(TcmbRateProvider::new(&settings)?)
    };
    let parser = EvlerParser::new(settings.country.clone());
    let pipeline = Pipeline::new(settings, parser, rates);

    match cli.command.unwrap_or(Commands::Extract) {
        Commands::Extract => {
            info!("🏠 Evler Scout - extracting saved listings");
            pipeline.run_once().await?;
        }
        Commands::Watch {
            interval_minutes,
            max_runs,
        } => {
            info!("🏠 Evler Scout - {} runs, {} minutes apart", max_runs, interval_minutes);
            let interval = Duration::from_secs(interval_minutes * 60);
            let runs = pipeline.watch(interval, max_runs).await;
            let extracted: usize = runs.iter().map(|run| run.extracted).sum();
            info!("✅ {} runs finished, {} new listings", runs.len(), extracted);
        }
        Commands::RefreshPrices => {
            let updated = pipeline.refresh_prices().await?;
            info!("💱 Refreshed converted prices, updated {} rows", updated);
        }
        Commands::FixAreas { threshold } => {
            let updated = pipeline.store().fix_land_areas(threshold)?;
            info!("📐 Area fix completed, updated {} rows", updated);
        }
        Commands::Search(args) => run_search(pipeline.store(), &args).await?,
        Commands::Query { text, limit, json } => {
            let records = pipeline.store().load()?;
            let results = query(&records, &text.join(" "), limit);
            info!("🔎 {} listings match \"{}\"", results.len(), text.join(" "));

            for (i, record) in results.iter().enumerate() {
                print_listing(i + 1, record);
            }
            if let Some(path) = &json {
                save_json(path, &results).await?;
            }
        }
    }

    Ok(())
}

fn show(value: Option<&str>) -> &str {
    value.unwrap_or("-")
}

fn show_number(value: Option<f64>) -> String {
    value.map(|v| format!("{:.2}", v)).unwrap_or_else(|| "-".to_string())
}

fn print_listing(index: usize, record: &ListingRecord) {
    println!("{}. {}", index, show(record.title.as_deref()));
    println!(
        "   {} {} ({} TRY)",
        show_number(record.price),
        show(record.currency.as_deref()),
        show_number(record.price_in_reference_currency)
    );
    println!(
        "   {} m², {} TRY/m², {} TRY/dönüm",
        show_number(record.area_m2),
        show_number(record.price_per_m2),
        show_number(record.price_per_donum)
    );
    println!(
        "   {} / {} | {}",
        show(record.district.as_deref()),
        show(record.city.as_deref()),
        show(record.room_count.as_deref())
    );
    println!("   ID: {}", show(record.property_id.as_deref()));
    println!("   URL: {}", show(record.url.as_deref()));
    println!();
}

fn print_stats(label: &str, stats: Option<PriceStats>) {
    match stats {
        Some(s) => println!(
            "{}: n={} min={:.2} p25={:.2} median={:.2} p75={:.2} max={:.2} mean={:.2}",
            label, s.count, s.min, s.p25, s.median, s.p75, s.max, s.mean
        ),
        None => println!("{}: no data", label),
    }
}

async fn run_search(store: &CsvStore, args: &SearchArgs) -> Result<()> {
    let records = store.load()?;
    let results = search(&records, &args.params());
    info!("🔎 {} of {} listings match", results.len(), records.len());

    for (i, record) in results.iter().enumerate() {
        print_listing(i + 1, record);
    }

    print_stats(
        "TRY per m²",
        PriceStats::from_values(results.iter().filter_map(|r| r.price_per_m2)),
    );
    print_stats(
        "TRY per dönüm",
        PriceStats::from_values(results.iter().filter_map(|r| r.price_per_donum)),
    );

    if let Some(path) = &args.json {
        save_json(path, &results).await?;
    }

    Ok(())
}

async fn save_json(path: &Path, results: &[&ListingRecord]) -> Result<()> {
    let json = serde_json::to_string_pretty(results)?;
    tokio::fs::write(path, json).await?;
    info!("💾 Saved {} listings to {}", results.len(), path.display());
    Ok(())
}
