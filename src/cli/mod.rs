use clap::Parser;

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    // --- Storage Args ---
    /// Persistence backend for readings and conversations (local, blob, memory)
    #[arg(long, env = "STORAGE_TYPE", default_value = "local")]
    pub storage_type: String,

    /// Directory holding readings.json and conversations.json when STORAGE_TYPE=local
    #[arg(long, env = "DATA_DIR", default_value = "data")]
    pub data_dir: String,

    /// Pre-signed URL of the readings document when STORAGE_TYPE=blob
    #[arg(long, env = "READINGS_BLOB_URL")]
    pub readings_blob_url: Option<String>,

    /// Pre-signed URL of the conversations document when STORAGE_TYPE=blob
    #[arg(long, env = "CONVERSATIONS_BLOB_URL")]
    pub conversations_blob_url: Option<String>,

    // --- AI Provider Args ---
    /// Type of deployment provider (orq, openai)
    #[arg(long, env = "LLM_TYPE", default_value = "orq")]
    pub llm_type: String,

    /// Base URL for the deployment provider API. Overrides the value in the config file.
    #[arg(long, env = "LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Path to the JSON config file carrying the provider API key and insight deployment.
    #[arg(long, env = "CONFIG_PATH", default_value = "config.json")]
    pub config_path: String,

    // --- Server Args ---
    /// Host address and port for the HTTP API to listen on.
    #[arg(long, env = "SERVER_ADDR", default_value = "0.0.0.0:5000")]
    pub server_addr: String,

    /// Optional address for the realtime reading broadcast socket. Disabled when unset.
    #[arg(long, env = "WS_ADDR")]
    pub ws_addr: Option<String>,

    /// Optional API Key required for clients to subscribe to the broadcast socket.
    #[arg(long, env = "SERVER_API_KEY")]
    pub server_api_key: Option<String>,

    /// Optional path to the TLS certificate file (PEM format). Requires --tls-key-path.
    #[arg(long, env = "TLS_CERT_PATH")]
    pub tls_cert_path: Option<String>,

    /// Optional path to the TLS private key file (PEM format). Requires --tls-cert-path.
    #[arg(long, env = "TLS_KEY_PATH")]
    pub tls_key_path: Option<String>,

    #[arg(long, env = "ENABLE_TLS", default_value = "false")]
    pub enable_tls: bool,
}

impl Args {
    pub fn tls_paths(&self) -> Option<(&str, &str)> {
        if !self.enable_tls {
            return None;
        }
        match (&self.tls_cert_path, &self.tls_key_path) {
            (Some(cert), Some(key)) => Some((cert.as_str(), key.as_str())),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_defaults() {
        let args = Args::parse_from([
            "health-monitor",
            "--storage-type",
            "blob",
            "--readings-blob-url",
            "https://example.blob.core.windows.net/data/readings.json?sig=x",
            "--ws-addr",
            "127.0.0.1:5001",
        ]);
        assert_eq!(args.storage_type, "blob");
        assert_eq!(args.ws_addr.as_deref(), Some("127.0.0.1:5001"));
        assert!(args.conversations_blob_url.is_none());
        assert!(args.tls_paths().is_none());
    }

    #[test]
    fn tls_paths_need_flag_and_both_files() {
        let mut args = Args::parse_from([
            "health-monitor",
            "--tls-cert-path",
            "cert.pem",
            "--tls-key-path",
            "key.pem",
        ]);
        assert!(args.tls_paths().is_none());
        args.enable_tls = true;
        assert_eq!(args.tls_paths(), Some(("cert.pem", "key.pem")));
        args.tls_key_path = None;
        assert!(args.tls_paths().is_none());
    }
}
