use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use mpx_config::ConfigSurface;

mod commands;

#[derive(Parser)]
#[command(name = "mpx")]
#[command(about = "MPX procurement workflow CLI", long_about = None)]
struct Cli {
    /// Layered config paths in merge order (base -> env -> overrides)
    #[arg(long = "config", global = true)]
    config_paths: Vec<String>,

    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Database commands
    Db {
        #[command(subcommand)]
        cmd: DbCmd,
    },

    /// Compute layered config hash + print canonical JSON
    ConfigHash {
        /// Paths in merge order
        #[arg(required = true)]
        paths: Vec<String>,

        /// Which binary's consumed-key registry to check against
        #[arg(long, value_enum, default_value_t = SurfaceArg::Daemon)]
        surface: SurfaceArg,

        /// Fail on keys the surface does not read
        #[arg(long, default_value_t = false)]
        strict: bool,
    },

    /// RFQ inspection
    Rfq {
        #[command(subcommand)]
        cmd: RfqCmd,
    },

    /// Order inspection
    Order {
        #[command(subcommand)]
        cmd: OrderCmd,
    },

    /// Order timeline utilities
    Timeline {
        #[command(subcommand)]
        cmd: TimelineCmd,
    },
}

#[derive(Subcommand)]
enum DbCmd {
    Status,

    /// Apply embedded SQL migrations.
    Migrate,
}

#[derive(Subcommand)]
enum RfqCmd {
    /// Print an RFQ and its quotations
    Show {
        #[arg(long)]
        rfq_id: String,
    },
}

#[derive(Subcommand)]
enum OrderCmd {
    /// Print an order and its timeline
    Show {
        #[arg(long)]
        order_id: String,
    },

    /// List orders where the user is shipowner or supplier
    List {
        #[arg(long)]
        user_id: String,
    },
}

#[derive(Subcommand)]
enum TimelineCmd {
    /// Check the hash chain of an order's timeline
    Verify {
        #[arg(long)]
        order_id: String,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum SurfaceArg {
    Daemon,
    Cli,
}

impl From<SurfaceArg> for ConfigSurface {
    fn from(s: SurfaceArg) -> Self {
        match s {
            SurfaceArg::Daemon => ConfigSurface::Daemon,
            SurfaceArg::Cli => ConfigSurface::Cli,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    let cli = Cli::parse();

    match cli.cmd {
        Commands::Db { cmd } => {
            let pool = commands::connect(&cli.config_paths).await?;
            match cmd {
                DbCmd::Status => {
                    let s = mpx_store::status(&pool).await?;
                    println!("db_ok={} has_documents_table={}", s.ok, s.has_documents_table);
                }
                DbCmd::Migrate => {
                    mpx_store::PgStore::new(pool).migrate().await?;
                    println!("migrations_applied=true");
                }
            }
        }

        Commands::ConfigHash {
            paths,
            surface,
            strict,
        } => {
            let out = commands::config::config_hash(&paths, surface.into(), strict)?;
            for line in out {
                println!("{line}");
            }
        }

        Commands::Rfq { cmd } => match cmd {
            RfqCmd::Show { rfq_id } => {
                let wf = commands::open_workflow(&cli.config_paths).await?;
                for line in commands::inspect::show_rfq(&wf, &rfq_id).await? {
                    println!("{line}");
                }
            }
        },

        Commands::Order { cmd } => {
            let wf = commands::open_workflow(&cli.config_paths).await?;
            let lines = match cmd {
                OrderCmd::Show { order_id } => commands::inspect::show_order(&wf, &order_id).await?,
                OrderCmd::List { user_id } => commands::inspect::list_orders(&wf, &user_id).await?,
            };
            for line in lines {
                println!("{line}");
            }
        }

        Commands::Timeline { cmd } => match cmd {
            TimelineCmd::Verify { order_id } => {
                let wf = commands::open_workflow(&cli.config_paths).await?;
                println!("{}", commands::inspect::verify_order_timeline(&wf, &order_id).await?);
            }
        },
    }

    Ok(())
}

/// Logs go to stderr so stdout stays parseable.
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()),
        )
        .init();
}
