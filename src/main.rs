use clap::Parser;
use snack_box::{limits::ServerLimits, Request, Response, Router, Server, StatusCode};
use std::{net::IpAddr, path::PathBuf, process::ExitCode};
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Minimal HTTP/1.1 server with a static file fallback.
#[derive(Parser, Debug)]
#[command(name = "snack_box", version, about, long_about = None)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "SNACK_BOX_PORT", default_value_t = 8080)]
    port: u16,

    /// Directory served when no route matches
    #[arg(long, env = "SNACK_BOX_PUBLIC_DIR", default_value = "public")]
    public_dir: PathBuf,

    /// Address to bind
    #[arg(long, default_value = "0.0.0.0")]
    host: IpAddr,

    /// Number of worker tasks serving connections
    #[arg(long, default_value_t = 100)]
    workers: usize,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let server = Server::builder()
        .addr((args.host, args.port))
        .router(routes())
        .public_dir(args.public_dir)
        .server_limits(ServerLimits {
            max_connections: args.workers,
            ..ServerLimits::default()
        })
        .build();

    match server {
        Ok(server) => {
            server.launch().await;
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "failed to start");
            eprintln!("snack_box: {err}");
            ExitCode::FAILURE
        }
    }
}

fn routes() -> Router {
    Router::new()
        .get("/health", |_: &Request| Response::text(StatusCode::OK, "ok"))
        .get("/hello/:name", |req: &Request| {
            let name = req.param("name").unwrap_or("stranger");
            Response::text(StatusCode::OK, format!("Hello, {name}!"))
        })
        .post("/echo", |req: &Request| {
            let content_type = req
                .header("Content-Type")
                .unwrap_or("application/octet-stream")
                .to_string();

            Response::new(StatusCode::OK)
                .with_header("Content-Type", content_type)
                .with_body(req.body().to_vec())
        })
}
