//! Simple example of using reqwest-proxy-rotator.

use reqwest_middleware::ClientBuilder;
use reqwest_proxy_rotator::{ProxyPoolConfig, ProxyRotationMiddleware};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    println!("Initializing proxy rotation...");

    let config = ProxyPoolConfig::builder()
        // one proxy per line, `#` comments allowed, scheme defaults to http://
        .sources(vec!["proxies.txt"])
        .proxies(vec!["127.0.0.1:8080"])
        .proxy_delay(Duration::from_secs(2))
        .randomize_delay(true)
        // banned proxies sit out an order of magnitude longer
        .ban_delay(Duration::from_secs(20))
        .no_proxy_timeout(Duration::from_secs(10))
        .retry_count(3)
        .build();

    let rotation = ProxyRotationMiddleware::new(config).await?;
    let scheduler = rotation.scheduler().clone();

    let client = ClientBuilder::new(reqwest::Client::new())
        .with(rotation)
        .build();

    for _ in 0..3 {
        println!("Sending request...");
        let response = client.get("https://httpbin.org/ip").send().await?;
        println!("Status: {}", response.status());
        println!("Response: {}", response.text().await?);

        let (total, available) = scheduler.stats();
        println!("Pool: {}/{} proxies waiting", available, total);
    }

    Ok(())
}
