use anyhow::Context;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use nfsgate::config::{self, GatewayConfig};
use nfsgate::repository::{initialize, DEFAULT_ADMIN_EMAIL};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;
    fmt().with_env_filter(filter).init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    if config::has_flag(&args, "--help") || config::has_flag(&args, "-h") {
        print!("{}", config::usage());
        return Ok(());
    }

    let cfg = GatewayConfig::from_env_and_args(&args)?;
    let rust_log = std::env::var("RUST_LOG").unwrap_or_else(|_| "<unset>".to_string());
    info!(
        target: "nfsgate",
        "nfsgate starting: RUST_LOG='{}', http_port={}, data_dir='{}', fs_root='{}'",
        rust_log,
        cfg.http_port,
        cfg.data_dir.display(),
        cfg.fs_root.display()
    );

    if cfg.init {
        let password = cfg
            .admin_password
            .as_deref()
            .context("--init requires NFSGATE_ADMIN_PASSWORD")?;
        std::fs::create_dir_all(&cfg.data_dir)
            .with_context(|| format!("creating data dir {}", cfg.data_dir.display()))?;
        let seeded = initialize(&cfg.data_dir, DEFAULT_ADMIN_EMAIL, password)?;
        info!(
            target: "nfsgate",
            users = seeded.users,
            roles = seeded.roles,
            audit = seeded.audit,
            "seeded data documents"
        );
    }

    nfsgate::server::run(cfg).await
}
