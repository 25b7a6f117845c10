use std::{net::SocketAddr, path::Path, sync::Arc};

use axum::{
    Router,
    body::Body,
    extract::Request,
    middleware,
    response::Response,
    routing::any,
};
use clap::Parser;
use tower_http::compression::CompressionLayer;
use color_eyre::{
    Result,
    eyre::{Context, eyre},
};
use verge::{
    CircuitBreakerRegistry, GracefulShutdown, HttpClient, HttpClientAdapter, InMemoryCounterStore,
    Ingress, PathSet, RateLimiter, RouteTable, StaticDiscovery,
    adapters::middleware::{create_cookie_watch_middleware, request_context_middleware},
    config::{GatewayConfigValidator, loader::load_config},
    metrics,
    ports::discovery::ServiceDiscovery,
    tracing_setup,
};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    #[clap(subcommand)]
    command: Option<Commands>,

    #[clap(short, long, default_value = "gateway.toml")]
    config: String,
}

#[derive(Parser, Debug)]
enum Commands {
    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
    /// Initialize a new configuration file
    Init {
        /// Output path for the new config file
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
    /// Start the gateway server (default)
    Serve {
        /// Configuration file to use
        #[clap(short, long, default_value = "gateway.toml")]
        config: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let args = Args::parse();

    let (command, config_path) = match args.command {
        Some(Commands::Validate { config }) => ("validate", config),
        Some(Commands::Init { config }) => ("init", config),
        Some(Commands::Serve { config }) => ("serve", config),
        None => ("serve", args.config),
    };

    match command {
        "validate" => {
            return validate_config_command(&config_path).await;
        }
        "init" => {
            return init_config_command(&config_path).await;
        }
        "serve" => {
            // Continue with normal server startup
        }
        _ => unreachable!(),
    }

    let provider = rustls::crypto::aws_lc_rs::default_provider();
    if let Err(e) = rustls::crypto::CryptoProvider::install_default(provider) {
        tracing::warn!(
            "CryptoProvider::install_default for aws-lc-rs reported an error: {:?}. \
            This can happen if a provider was already installed. \
            The application will proceed; ensure a crypto provider is effectively available.",
            e
        );
    }

    tracing_setup::init_tracing().map_err(|e| eyre!("Failed to initialize tracing: {}", e))?;
    metrics::init_metrics();

    tracing::info!("Loading configuration from {config_path}");

    let config = load_config(&config_path)
        .await
        .with_context(|| format!("Failed to load config from {config_path}"))?;
    GatewayConfigValidator::validate(&config).map_err(|e| eyre!("Invalid configuration: {e}"))?;

    let routes =
        RouteTable::from_config(&config.routes).context("Failed to compile route table")?;
    let public_paths =
        PathSet::compile(&config.public_paths).context("Failed to compile public paths")?;
    let watch_paths = Arc::new(
        PathSet::compile(&config.auth.watch_paths)
            .context("Failed to compile cookie watch paths")?,
    );

    let store = Arc::new(InMemoryCounterStore::new());
    let rate_limiter = RateLimiter::from_config(&config.rate_limit, store)
        .context("Failed to build rate limiter")?;
    let breakers = CircuitBreakerRegistry::from_config(&routes, &config.circuit_breakers);

    let discovery: Arc<dyn ServiceDiscovery> = Arc::new(
        StaticDiscovery::from_config(&config.backends)
            .context("Failed to build backend discovery")?,
    );
    let http_client: Arc<dyn HttpClient> = Arc::new(
        HttpClientAdapter::new(&config.http_client)
            .context("Failed to create HTTP client adapter")?,
    );

    let ingress = Arc::new(Ingress::new(
        &config,
        routes,
        public_paths,
        rate_limiter,
        breakers,
        discovery,
        http_client,
    ));

    let graceful_shutdown = Arc::new(GracefulShutdown::new());
    let signal_handler_shutdown = graceful_shutdown.clone();
    tokio::spawn(async move {
        if let Err(e) = signal_handler_shutdown.run_signal_handler().await {
            tracing::error!("Signal handler error: {}", e);
        }
    });

    let make_request_route = |ingress: Arc<Ingress>| {
        any(move |req: Request| {
            let ingress = ingress.clone();
            async move {
                Ok::<Response<Body>, std::convert::Infallible>(ingress.handle(req).await)
            }
        })
    };

    // Request context runs innermost-first on the way in; the cookie watch
    // layer is registered last so it sees the final response.
    let app = Router::new()
        .route("/{*path}", make_request_route(ingress.clone()))
        .route("/", make_request_route(ingress.clone()))
        .layer(CompressionLayer::new())
        .layer(middleware::from_fn(request_context_middleware))
        .layer(middleware::from_fn(create_cookie_watch_middleware(
            watch_paths,
        )));

    let addr: SocketAddr = config
        .listen_addr
        .parse()
        .context("Failed to parse listen address")?;

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    tracing::info!("Verge API Gateway listening on {}", addr);
    for route in &config.routes {
        tracing::info!(
            "Configured route: {} {:?} -> {}",
            route.id,
            route.patterns,
            route.backend
        );
    }

    let mut shutdown_rx = graceful_shutdown.subscribe();
    tokio::select! {
        result = axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        ) => {
            result.context("Server error")?;
        }
        _ = shutdown_rx.recv() => {
            tracing::info!("Shutdown signal received, stopping server");
        }
    }

    tracing::info!("Verge API Gateway stopped");
    Ok(())
}

/// Validate configuration file and exit
async fn validate_config_command(config_path: &str) -> Result<()> {
    // Route overlap warnings surface through tracing; pretty output suits a
    // terminal run better than the server's JSON lines.
    let _ = tracing_setup::init_console_tracing();

    println!("Validating configuration file: {config_path}");

    if !Path::new(config_path).exists() {
        eprintln!("Error: Configuration file '{config_path}' not found");
        std::process::exit(1);
    }

    let config = match load_config(config_path).await {
        Ok(config) => {
            println!("Configuration parsing: OK");
            config
        }
        Err(e) => {
            eprintln!("Configuration parsing failed:");
            eprintln!("   {e}");
            std::process::exit(1);
        }
    };

    match GatewayConfigValidator::validate(&config) {
        Ok(()) => {
            println!("Configuration validation: OK");
            println!();
            println!("Configuration Summary:");
            println!("   Listen Address: {}", config.listen_addr);
            println!("   Backends: {}", config.backends.len());
            println!("   Routes: {}", config.routes.len());
            println!("   Public Paths: {}", config.public_paths.len());
            println!("   Rate Limiting: {}", config.rate_limit.enabled);
            Ok(())
        }
        Err(e) => {
            eprintln!("Configuration validation failed:");
            eprintln!("{e}");
            println!();
            println!("Common fixes:");
            println!("   - Ensure backend URLs start with http:// or https://");
            println!("   - Verify listen address format (e.g., '127.0.0.1:8080')");
            println!("   - Check route patterns start with '/' and use '**' only last");
            println!("   - Ensure durations use valid units (s, m, h)");
            std::process::exit(1);
        }
    }
}

/// Initialize a new configuration file
async fn init_config_command(config_path: &str) -> Result<()> {
    let path = Path::new(config_path);
    if path.exists() {
        eprintln!("Error: Configuration file '{config_path}' already exists");
        std::process::exit(1);
    }

    let default_config = r#"# Verge API Gateway Configuration

# The address to listen on
listen_addr = "127.0.0.1:8080"

# Paths exempt from authentication and rate limiting
public_paths = ["/api/auth/login", "/api/auth/register"]

# Logical backend name -> base URL
[backends]
user-service = "http://localhost:3001"
auth-service = "http://localhost:3002"

# Routes are matched in declaration order; the first match wins.
[[routes]]
id = "auth"
patterns = ["/api/auth/**"]
backend = "auth-service"

[[routes]]
id = "users"
patterns = ["/api/users/**"]
backend = "user-service"
retries = 2

[auth]
cookie_name = "ACCESS_TOKEN"
watch_paths = ["/api/auth/**"]

[rate_limit]
enabled = true
key_prefix = "rl:"
on_store_error = "fail_open"

[rate_limit.default]
limit = 100
window = "60s"

[circuit_breakers.default]
sliding_window_type = "count"
sliding_window_size = 20
failure_rate_threshold = 50.0
wait_duration_open = "30s"
half_open_permits = 3
call_timeout = "5s"
minimum_calls = 10
"#;

    tokio::fs::write(path, default_config)
        .await
        .context("Failed to write config file")?;
    println!("Created default configuration at: {config_path}");
    println!("   Run 'verge serve --config {config_path}' to start the server");
    Ok(())
}
