use anyhow::{Context, Result};
use clap::Parser;
use ecole221::server::{DbFile, router};
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "ecole221-store")]
#[command(about = "JSON resource store backing the Ecole 221 dashboard")]
struct Cli {
    /// json-server style document: an object of collection arrays.
    #[arg(long, env = "ECOLE_STORE_DB", default_value = "db.json")]
    db: PathBuf,

    #[arg(long, default_value = "127.0.0.1")]
    host: IpAddr,

    #[arg(long, env = "ECOLE_STORE_PORT", default_value_t = 3000)]
    port: u16,

    /// Serve the document without writing changes back.
    #[arg(long)]
    read_only: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let db = DbFile::new(&cli.db);
    let store = db
        .load()
        .with_context(|| format!("load store document {}", cli.db.display()))?;
    let collections = store.collection_names()?.len();

    let persistence = if cli.read_only { None } else { Some(Arc::new(db)) };
    let app = router(Arc::new(store), persistence);

    let addr = SocketAddr::new(cli.host, cli.port);
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("bind {addr}"))?;
    println!("Ecole 221 store listening on http://{addr} ({collections} collections)");

    axum::serve(listener, app).await?;
    Ok(())
}
