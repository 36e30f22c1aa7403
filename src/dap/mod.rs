mod protocol;
mod server;

use crate::config::DisconnectPolicy;
use std::io;
use tracing::info;

pub use protocol::{read_message, write_message, DapMessage, DapMessageContent};
pub use server::DapServer;

/// Serves one client over stdin/stdout until it disconnects or the input closes.
pub fn run_dap_mode(default_policy: DisconnectPolicy) -> io::Result<()> {
    info!(?default_policy, "DAP server starting");

    let stdin = io::stdin();
    let mut reader = stdin.lock();
    let mut server = DapServer::new(io::stdout(), default_policy);

    loop {
        match read_message(&mut reader)? {
            Some(msg) => {
                if !server.dispatch(msg) {
                    break;
                }
            }
            None => {
                server.shutdown();
                break;
            }
        }
    }

    info!("DAP server exiting");
    Ok(())
}
