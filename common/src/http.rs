use crate::config::HttpConfig;
use crate::errors::*;
pub use reqwest::blocking::Client;
use std::time::Duration;

pub const USER_AGENT: &str = concat!("javapkg-tools/", env!("CARGO_PKG_VERSION"));

pub fn client(config: &HttpConfig) -> Result<Client> {
    let user_agent = config.user_agent.as_deref().unwrap_or(USER_AGENT);
    Client::builder()
        .timeout(Duration::from_secs(config.timeout()))
        .user_agent(user_agent)
        .build()
        .map_err(Error::from)
}

pub fn fetch(client: &Client, url: &str) -> Result<Vec<u8>> {
    info!("Downloading {:?}...", url);
    let bytes = client
        .get(url)
        .send()?
        .error_for_status()?
        .bytes()?
        .to_vec();
    Ok(bytes)
}
