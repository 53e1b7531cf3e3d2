use clap::Args;

use common::build_info;

#[derive(Args, Debug, Clone)]
pub struct Version {
    /// Print as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl crate::cli::op::Op for Version {
    type Error = serde_json::Error;
    type Output = String;

    async fn execute(&self, _ctx: &crate::cli::op::OpContext) -> Result<Self::Output, Self::Error> {
        let build = build_info!();
        if self.json {
            return serde_json::to_string(&build);
        }
        Ok(format!("sos {}", build))
    }
}
