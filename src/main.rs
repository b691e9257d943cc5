use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use ad_privilege_audit::common_types::extract_domain_from_dn;
use ad_privilege_audit::config::AuditConfig;
use ad_privilege_audit::directory::DirectoryGateway;
use ad_privilege_audit::group_audit::run_privileged_members_report;
use ad_privilege_audit::ldap_gateway::LdapDirectoryGateway;
use ad_privilege_audit::ldap_timeout::{
    ldap_bind_with_timeout, ldap_connect_with_timeout, ldap_unbind_with_timeout,
};
use ad_privilege_audit::report_sink::JsonLinesSink;
use ad_privilege_audit::secure_types::SecureString;
use ad_privilege_audit::warnings::Warnings;

const LOG_FILE_NAME: &str = "ad-privilege-audit.log";

/// Audit the effective membership of Active Directory privileged groups
///
/// Report rows are written to stdout as JSON lines; logs go to stderr.
#[derive(Parser, Debug)]
#[command(name = "ad-privilege-audit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Domain controller (host, host:port or ldap[s]:// URL)
    #[arg(short, long)]
    server: Option<String>,

    /// Search base, e.g. DC=corp,DC=local
    #[arg(short, long)]
    base_dn: Option<String>,

    /// Bind user (DOMAIN\user or UPN)
    #[arg(short = 'u', long)]
    bind_user: Option<String>,

    /// Bind password
    #[arg(long, env = "AD_AUDIT_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long)]
    no_tls_verify: bool,

    /// Log filter (overrides logging.level)
    #[arg(long)]
    log_level: Option<String>,

    /// Also write logs to this directory
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

impl Cli {
    fn into_config(self) -> Result<AuditConfig> {
        let mut config = match &self.config {
            Some(path) => AuditConfig::load(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => AuditConfig::default(),
        };

        if let Some(server) = self.server {
            config.connection.server = server;
        }
        if let Some(base_dn) = self.base_dn {
            config.connection.base_dn = base_dn;
        }
        if let Some(user) = self.bind_user {
            config.connection.bind_user = user;
        }
        if let Some(password) = self.password {
            config.connection.bind_password = SecureString::new(password);
        }
        if self.no_tls_verify {
            config.connection.no_tls_verify = true;
        }
        if let Some(level) = self.log_level {
            config.logging.level = level;
        }
        if let Some(dir) = self.log_dir {
            config.logging.log_dir = Some(dir);
        }

        config.validate().context("invalid configuration")?;
        Ok(config)
    }
}

fn init_tracing(config: &AuditConfig) {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    // stdout carries report rows
    let console_layer = fmt::layer().with_writer(io::stderr).with_ansi(true);

    let file_layer = config.logging.log_dir.as_ref().map(|dir| {
        let file_appender = RollingFileAppender::new(Rotation::NEVER, dir, LOG_FILE_NAME);
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
        // Kept alive for the whole run
        std::mem::forget(guard);
        fmt::layer()
            .with_writer(non_blocking)
            .with_ansi(false)
            .with_target(true)
            .with_thread_ids(true)
            .with_file(true)
            .with_line_number(true)
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    if let Some(dir) = &config.logging.log_dir {
        info!("Log file: {}", dir.join(LOG_FILE_NAME).display());
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Cli::parse().into_config()?;
    init_tracing(&config);

    let url = config.ldap_url();
    info!("=======================================================");
    info!("AD privileged group audit starting");
    info!(
        "Server: {} | Domain: {}",
        url,
        extract_domain_from_dn(&config.connection.base_dn)
    );
    info!("=======================================================");

    if !config.uses_ldaps() && !config.credentials().is_anonymous() {
        warn!("Binding over plain LDAP sends the password in clear text; prefer LDAPS (port 636)");
    }

    let catalog = config.load_catalog().context("loading attribute catalog")?;

    let ldap = ldap_connect_with_timeout(&url, config.connect_timeout(), config.connection.no_tls_verify)
        .await
        .with_context(|| format!("connecting to {}", url))?;
    let ldap = ldap_bind_with_timeout(ldap, &config.credentials(), config.connect_timeout())
        .await
        .context("binding to the directory")?;
    info!("Connected to {}", url);

    let mut gateway =
        LdapDirectoryGateway::new(ldap, config.connection.base_dn.clone(), config.search_timeout());

    let unbind_timeout = config.connect_timeout();
    let (gateway, outcome) = tokio::task::spawn_blocking(move || {
        let outcome = (|| -> ad_privilege_audit::Result<_> {
            let domain_sid = match &config.audit.domain_sid {
                Some(sid) => sid.clone(),
                None => gateway.domain_sid()?,
            };
            info!("Domain SID: {}", domain_sid);

            let requests = config.group_requests(&domain_sid);
            let mut warnings = Warnings::new();
            let mut sink = JsonLinesSink::new(io::stdout().lock());
            run_privileged_members_report(&mut gateway, &catalog, &requests, &mut warnings, &mut sink)
        })();
        (gateway, outcome)
    })
    .await
    .context("audit task panicked")?;

    if let Err(e) = ldap_unbind_with_timeout(gateway.into_inner(), unbind_timeout).await {
        warn!("Unbind failed: {}", e);
    }

    match outcome {
        Ok(summary) => {
            info!(
                "Audit complete: {}/{} groups, {} rows, {} warnings",
                summary.groups_resolved, summary.groups_requested, summary.total_rows, summary.warnings
            );
            if !summary.groups_skipped.is_empty() {
                warn!("Groups not found: {}", summary.groups_skipped.join(", "));
            }
            Ok(())
        }
        Err(e) => {
            error!("Audit aborted: {}", e);
            Err(e).context("privileged group audit failed")
        }
    }
}
