use billing_sync::billing::{ChangePlanRequest, CheckoutOrder, Product, Purchase};
use billing_sync::{BillingClient, Config};
use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::path::{Path, PathBuf};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "billing-sync")]
#[command(about = "Cache and refresh subscription billing state from the command line")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/billing-sync/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Write logs to this file instead of stderr
  #[arg(long)]
  log_file: Option<PathBuf>,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List products (cached unless --refresh)
  Products {
    #[arg(long)]
    refresh: bool,
  },
  /// List purchases for the stored or given access token
  Purchases {
    #[arg(long)]
    token: Option<String>,
  },
  /// Open a checkout session and print its URL
  Checkout {
    #[arg(long)]
    product: String,
    #[arg(long)]
    price: String,
    #[arg(long)]
    success_url: String,
    #[arg(long)]
    cancel_url: String,
    #[arg(long)]
    email: Option<String>,
  },
  /// Move a subscription to another price
  ChangePlan {
    #[arg(long)]
    purchase: String,
    #[arg(long)]
    price: String,
  },
  /// Fetch purchases and keep refreshing around expirations until Ctrl-C
  ///
  /// Expirations more than about 24.8 days away are never probed during a
  /// single run; restart the watch to pick them up.
  Watch,
  /// Forget the stored access token and product cache
  Clear,
}

/// Install the tracing subscriber. The returned guard flushes the log file.
fn init_logging(log_file: Option<&Path>) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

  match log_file {
    Some(path) => {
      let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
      let (writer, guard) = tracing_appender::non_blocking(file);
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();
      Ok(Some(guard))
    }
    None => {
      tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
      Ok(None)
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _log_guard = init_logging(args.log_file.as_deref())?;

  // Load configuration
  let config = Config::load(args.config.as_deref())?;
  let client = BillingClient::from_config(&config)?;

  match args.command {
    Command::Products { refresh } => {
      let products = if refresh {
        client.refresh_products().await?
      } else {
        client.get_products().await?
      };
      print_products(&products);
    }
    Command::Purchases { token } => {
      let purchases = client.get_purchases(token.as_deref()).await?;
      print_purchases(&purchases);
    }
    Command::Checkout {
      product,
      price,
      success_url,
      cancel_url,
      email,
    } => {
      let order = CheckoutOrder {
        product_id: product,
        price_id: price,
        success_url,
        cancel_url,
        customer_email: email,
      };
      let session = client.create_checkout(&order).await?;
      println!("{}", session.url);
    }
    Command::ChangePlan { purchase, price } => {
      let request = ChangePlanRequest {
        purchase_id: purchase,
        price_id: price,
      };
      let updated = client.change_plan(&request).await?;
      print_purchases(std::slice::from_ref(&updated));
    }
    Command::Watch => {
      let purchases = client.get_purchases(None).await?;
      print_purchases(&purchases);
      info!(
        schedules = client.scheduler().len(),
        "watching for expirations, press Ctrl-C to stop"
      );
      tokio::signal::ctrl_c().await?;
    }
    Command::Clear => {
      client.clear_stored_data();
      println!("Cleared stored billing data");
    }
  }

  Ok(())
}

fn print_products(products: &[Product]) {
  if products.is_empty() {
    println!("No products");
    return;
  }
  for product in products {
    println!("{}  {}", product.id, product.name);
    for price in &product.prices {
      let interval = price.interval.as_deref().unwrap_or("once");
      println!(
        "    {}  {} {} / {}",
        price.id,
        price.amount,
        price.currency.to_uppercase(),
        interval
      );
    }
  }
}

fn print_purchases(purchases: &[Purchase]) {
  if purchases.is_empty() {
    println!("No purchases");
    return;
  }
  for purchase in purchases {
    let expires = purchase
      .expiration_date
      .map(|d| d.to_rfc3339())
      .unwrap_or_else(|| "never".to_string());
    println!(
      "{}  {}  {:?}  expires {}",
      purchase.id, purchase.product_id, purchase.status, expires
    );
  }
}
