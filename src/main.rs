use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;

use storefront_sync::auth::SessionFlag;
use storefront_sync::cache::{CacheResult, CacheSource};
use storefront_sync::config::Config;
use storefront_sync::engine::SyncEngine;
use storefront_sync::fetcher::Params;
use storefront_sync::pagination::Phase;
use storefront_sync::storefront::{HttpFetcher, StorefrontClient};
use storefront_sync::telemetry;

#[derive(Parser, Debug)]
#[command(name = "storefront-sync")]
#[command(about = "Cached command-line client for the storefront API")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/storefront-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Browse the catalog, page by page
  Products {
    #[arg(long)]
    search: Option<String>,
    /// Category id
    #[arg(long)]
    category: Option<u64>,
    #[arg(long)]
    brand: Option<String>,
    #[arg(long)]
    min_price: Option<f64>,
    #[arg(long)]
    max_price: Option<f64>,
    /// Number of pages to load
    #[arg(long, default_value_t = 1)]
    pages: usize,
  },
  /// Show the cart
  Cart,
  /// Add a product to the cart, then show the refreshed cart
  AddToCart {
    product: u64,
    #[arg(short, long, default_value_t = 1)]
    quantity: u32,
  },
  /// Show the wishlist
  Wishlist,
  /// Show past orders
  Orders,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let _guard = telemetry::init(&config.log, &Config::data_dir())?;

  let fetcher = HttpFetcher::new(config.base_url()?, config.timeout(), Config::api_token())?;
  let session = Arc::new(SessionFlag::new(fetcher.is_authenticated()));
  let engine = SyncEngine::builder(fetcher)
    .auth(session)
    .stale_after(config.stale_after())
    .build();
  let client = StorefrontClient::new(engine);

  match args.command {
    Command::Products {
      search,
      category,
      brand,
      min_price,
      max_price,
      pages,
    } => {
      let mut filters = Params::new();
      let optional = [
        ("search", search),
        ("category_id", category.map(|c| c.to_string())),
        ("brand", brand),
        ("min_price", min_price.map(|p| p.to_string())),
        ("max_price", max_price.map(|p| p.to_string())),
      ];
      for (key, value) in optional {
        if let Some(value) = value {
          filters.insert(key, value);
        }
      }
      browse(&client, filters, pages, config.feed.page_size).await?;
    }
    Command::Cart => show_cart(&client).await?,
    Command::AddToCart { product, quantity } => {
      client.add_to_cart(product, quantity).await?;
      println!("Added {} x product {}", quantity, product);
      show_cart(&client).await?;
    }
    Command::Wishlist => {
      let wishlist = signed_in(client.wishlist().await?)?;
      for entry in &wishlist.data {
        let name = entry.product.as_ref().map(|p| p.name.as_str()).unwrap_or("?");
        println!("{:>6}  {}", entry.product_id, name);
      }
      print_origin(&wishlist);
    }
    Command::Orders => {
      let orders = signed_in(client.orders().await?)?;
      for order in &orders.data {
        println!(
          "{}  {:<10} {:>10.2}  {}",
          order.order_number, order.status, order.total_amount, order.created_at
        );
      }
      print_origin(&orders);
    }
  }

  Ok(())
}

async fn browse(
  client: &StorefrontClient,
  filters: Params,
  pages: usize,
  page_size: usize,
) -> Result<()> {
  let mut feed = client.product_feed(page_size);
  feed.on_filters_changed(filters);
  feed.settle().await;

  for _ in 1..pages {
    if !feed.load_more() {
      break;
    }
    feed.settle().await;
  }

  if let Some(error) = feed.error() {
    return Err(eyre!("Failed to load products: {}", error));
  }

  for product in feed.items() {
    let price = product.discount_price.unwrap_or(product.price);
    println!("{:>6}  {:<40} {:>10.2}", product.id, product.name, price);
  }
  let more = if feed.phase() == Phase::Exhausted {
    "end of catalog"
  } else {
    "more available"
  };
  println!("{} products ({})", feed.items().len(), more);
  Ok(())
}

async fn show_cart(client: &StorefrontClient) -> Result<()> {
  let cart = signed_in(client.cart().await?)?;
  for item in &cart.data.items {
    let name = item.product.as_ref().map(|p| p.name.as_str()).unwrap_or("?");
    println!("{:>4} x {}", item.quantity, name);
  }
  println!("{} items", cart.data.item_count());
  print_origin(&cart);
  Ok(())
}

fn signed_in<T>(result: Option<CacheResult<T>>) -> Result<CacheResult<T>> {
  result.ok_or_else(|| eyre!("Not signed in. Set STOREFRONT_TOKEN to a session token."))
}

fn print_origin<T>(result: &CacheResult<T>) {
  if result.source == CacheSource::Cache {
    println!("(cached)");
  }
}
