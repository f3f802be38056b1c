use std::net::SocketAddr;

#[derive(Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub log_level: String,
    pub openai_api_key: Option<String>,
    pub embed_model: String,
    pub v2_enabled: bool,
    pub shadow_sample_rate: f64,
    pub search_cache_size: usize,
    pub search_cache_ttl_secs: u64,
    pub embed_cache_size: usize,
    pub embed_cache_ttl_secs: u64,
    pub db_max_connections: u32,
    pub db_min_connections: u32,
    pub db_acquire_timeout_secs: u64,
    pub db_statement_timeout_secs: u64,
}

impl std::fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppConfig")
            .field("database_url", &"[redacted]")
            .field("bind_addr", &self.bind_addr)
            .field("log_level", &self.log_level)
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[redacted]"),
            )
            .field("embed_model", &self.embed_model)
            .field("v2_enabled", &self.v2_enabled)
            .field("shadow_sample_rate", &self.shadow_sample_rate)
            .field("search_cache_size", &self.search_cache_size)
            .field("search_cache_ttl_secs", &self.search_cache_ttl_secs)
            .field("embed_cache_size", &self.embed_cache_size)
            .field("embed_cache_ttl_secs", &self.embed_cache_ttl_secs)
            .field("db_max_connections", &self.db_max_connections)
            .field("db_min_connections", &self.db_min_connections)
            .field("db_acquire_timeout_secs", &self.db_acquire_timeout_secs)
            .field(
                "db_statement_timeout_secs",
                &self.db_statement_timeout_secs,
            )
            .finish()
    }
}
