pub mod api;
pub mod websocket;

use crate::cli::Args;
use std::error::Error;
use log::{ info, error };

pub use api::{ build_router, AppState, ApiError };
pub use websocket::Broadcaster;

pub struct Server {
    state: AppState,
    args: Args,
}

impl Server {
    pub fn new(state: AppState, args: Args) -> Self {
        Self { state, args }
    }

    pub async fn run(self) -> Result<(), Box<dyn Error + Send + Sync>> {
        let Server { mut state, args } = self;

        if let Some(ws_addr) = args.ws_addr.clone() {
            let broadcaster = Broadcaster::new();
            state = state.with_broadcaster(broadcaster.clone());
            Self::start_ws_server(&args, ws_addr, broadcaster);
        } else {
            info!("Realtime broadcast disabled (no WS_ADDR).");
        }

        api::start_http_server(state, &args).await
    }

    fn start_ws_server(args: &Args, addr: String, broadcaster: Broadcaster) {
        let api_key = args.server_api_key.clone();
        let tls_paths = args
            .tls_paths()
            .map(|(cert, key)| (cert.to_string(), key.to_string()));

        tokio::spawn(async move {
            if let Err(e) = websocket::start_ws_server(&addr, broadcaster, api_key, tls_paths).await {
                error!("Broadcast server error: {}", e);
            }
        });
    }
}
