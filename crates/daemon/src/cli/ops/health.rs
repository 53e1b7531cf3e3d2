use clap::Args;

use sos_daemon::http_server::health::IdentityRequest;

#[derive(Args, Debug, Clone)]
pub struct Health;

#[derive(Debug, thiserror::Error)]
pub enum HealthError {
    #[error("Health check failed: {0}")]
    Failed(String),
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Health {
    type Error = HealthError;
    type Output = String;

    async fn execute(&self, ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let mut lines = Vec::new();

        // 1. Check config directory
        lines.push("Config:".to_string());
        match ctx.app_state() {
            Ok(state) => {
                lines.push(format!("  directory:    {}", state.sos_dir.display()));
                lines.push("  config.toml:  OK".to_string());
                lines.push(format!("  key.pem:      {}", presence(state.key_path.is_file())));
                lines.push(format!("  store/:       {}", presence(state.store_path.is_dir())));
                lines.push(format!("  api_port:     {}", state.config.api_port));
                lines.push(format!("  capabilities: {}", state.config.capabilities.join(", ")));
            }
            Err(e) => {
                lines.push(format!("  error: {}", e));
            }
        }

        // 2. Check daemon liveness and readiness
        let base = ctx.client.base_url();
        let client = ctx.client.http_client();

        lines.push(String::new());
        lines.push(format!("Daemon ({}):", base));

        for check in ["livez", "readyz"] {
            let url = format!("{}/_status/{}", base.as_str().trim_end_matches('/'), check);
            let line = match client.get(&url).send().await {
                Ok(resp) if resp.status().is_success() => "OK".to_string(),
                Ok(resp) => format!("UNHEALTHY ({})", resp.status()),
                Err(_) => "NOT REACHABLE".to_string(),
            };
            lines.push(format!("  {:<7} {}", format!("{}:", check), line));
        }

        // 3. Who answered
        if let Ok(node) = ctx.client.call(IdentityRequest).await {
            lines.push(format!("  node:   {}", node.guid));
            let services: Vec<String> = node.services.iter().map(|c| c.to_string()).collect();
            lines.push(format!("  offers: {}", services.join(", ")));
        }

        Ok(lines.join("\n"))
    }
}

fn presence(ok: bool) -> &'static str {
    if ok {
        "OK"
    } else {
        "MISSING"
    }
}
