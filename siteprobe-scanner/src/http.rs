use crate::error::Result;
use reqwest::Client;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("siteprobe/", env!("CARGO_PKG_VERSION"));

/// Build the HTTP client shared by the sitemap reader, the link probe and the
/// static page driver. `timeout` is the default per-request budget; callers
/// override it per request where a tighter budget applies.
pub fn build_client(timeout: Duration) -> Result<Client> {
    let client = Client::builder()
        .user_agent(USER_AGENT)
        .timeout(timeout)
        .connect_timeout(timeout / 2)
        .pool_max_idle_per_host(10)
        .pool_idle_timeout(Duration::from_secs(90))
        .tcp_keepalive(Duration::from_secs(60))
        .cookie_store(true)
        .redirect(reqwest::redirect::Policy::limited(10))
        .build()?;
    Ok(client)
}
