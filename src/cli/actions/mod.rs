pub mod server;

use anyhow::Result;

/// Action selected by the CLI.
pub enum Action {
    Server(server::Args),
}

impl Action {
    /// Run the selected action.
    ///
    /// # Errors
    /// Propagates the action's failure.
    pub async fn execute(self) -> Result<()> {
        match self {
            Self::Server(args) => server::execute(args).await,
        }
    }
}
