pub mod api;

use crate::agent::LittleToneAgent;
use crate::cli::Args;
use std::error::Error;
use std::sync::Arc;

pub struct Server {
    addr: String,
    agent: Arc<LittleToneAgent>,
    args: Args,
}

impl Server {
    pub fn new(
        addr: String,
        agent: Arc<LittleToneAgent>,
        args: Args,
    ) -> Self {
        Self {
            addr,
            agent,
            args,
        }
    }

    pub async fn run(&self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let state = api::AppState::new(self.agent.clone(), &self.args)?;
        api::start_http_server(&self.addr, state, &self.args).await
    }
}
