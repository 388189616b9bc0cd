use std::time::Duration;

use super::{Client, ClientConfig};

/// Client pointed at a mock server with a single quick retry
pub fn create_test_client(url: &str) -> Client {
    Client::new(ClientConfig {
        max_retries: 1,
        retry_delay: Duration::from_millis(1),
        ..ClientConfig::new(url, "test-token")
    })
    .expect("test client")
}
