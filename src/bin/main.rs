use anyhow::Result;
use brainbuddy::db::UserCreate;
use brainbuddy::{AppConfig, AuthConfig, DatabaseConfig, TokenClaims, TokenCodec, UserStore};
use clap::{Parser, Subcommand};
use tracing::{Level, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "brainbuddy")]
#[command(about = "Study tools API: doubt solver, essay grader, notes, plans and chat")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the REST server
    Server {
        #[arg(short, long, env = "PORT", default_value = "8000")]
        port: u16,
        /// Bind address
        #[arg(long, env = "BIND_ADDRESS", default_value = "0.0.0.0")]
        bind: String,
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
    /// Initialize the database
    Init {
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
    /// Create an account, optionally with the admin role
    CreateUser {
        username: String,
        #[arg(long, env = "BRAINBUDDY_PASSWORD")]
        password: String,
        #[arg(long)]
        email: Option<String>,
        #[arg(long)]
        full_name: Option<String>,
        #[arg(long, default_value_t = false)]
        admin: bool,
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
    /// Print a signed access token for an existing account
    IssueToken {
        username: String,
        /// Token lifetime; defaults to ACCESS_TOKEN_EXPIRE_MINUTES
        #[arg(long)]
        ttl_minutes: Option<i64>,
        #[arg(long, env = "DATABASE_URL", default_value = "memory")]
        db_url: String,
    },
}

async fn open_store(db_url: String) -> Result<UserStore> {
    let db_config = DatabaseConfig {
        url: db_url,
        ..Default::default()
    };
    info!("Using database url: {}", db_config.url);

    let db = brainbuddy::create_connection(db_config).await?;
    brainbuddy::ensure_schema(&db).await?;
    Ok(UserStore::new(db))
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env()
                .add_directive("brainbuddy=info".parse()?)
                .add_directive("surrealdb=warn".parse()?),
        )
        .with_max_level(Level::INFO)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Server { port, bind, db_url } => {
            let mut config = AppConfig::from_env()?;
            config.database.url = db_url;
            info!("Using database url for REST server: {}", config.database.url);
            if !config.api_prefix.is_empty() {
                info!("Serving routes under {}", config.api_prefix);
            }

            let app = brainbuddy::create_app(&config)?;
            let listener = tokio::net::TcpListener::bind((bind.as_str(), port)).await?;
            info!("Server listening on http://{}:{}", bind, port);

            axum::serve(listener, app).await?;
        }
        Commands::Init { db_url } => {
            info!("Initializing database...");
            open_store(db_url).await?;
            info!("Database initialized successfully");
        }
        Commands::CreateUser {
            username,
            password,
            email,
            full_name,
            admin,
            db_url,
        } => {
            let store = open_store(db_url).await?;
            let roles = if admin {
                vec!["admin".to_string(), "user".to_string()]
            } else {
                Vec::new()
            };

            let user = store
                .register(UserCreate {
                    username,
                    password,
                    email,
                    full_name,
                    roles,
                })
                .await?;

            println!("Account created.");
            println!();
            println!("  Username: {}", user.username);
            println!("  User id:  {}", user.user_id);
            println!("  Roles:    {}", user.roles.join(", "));
        }
        Commands::IssueToken {
            username,
            ttl_minutes,
            db_url,
        } => {
            let store = open_store(db_url).await?;
            let user = store
                .get_user_by_username(&username)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No account named '{}'", username))?;

            let codec = TokenCodec::new(&AuthConfig::from_env()?);
            let claims = TokenClaims::for_user(&user.username, &user.user_id);
            let token = match ttl_minutes {
                Some(minutes) => codec.issue_with_ttl(claims, chrono::Duration::minutes(minutes))?,
                None => codec.issue(claims)?,
            };

            println!("{}", token);
        }
    }

    Ok(())
}
