use redis::RedisResult;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    /// Fixed-window counter. Returns whether `key` is still within `limit`
    /// for the current window.
    pub async fn check_rate_limit(&self, key: &str, limit: i64, window_seconds: i64) -> RedisResult<bool> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;

        let (count,): (i64,) = redis::pipe()
            .atomic()
            .incr(key, 1)
            .expire(key, window_seconds)
            .ignore()
            .query_async(&mut conn)
            .await?;

        Ok(count <= limit)
    }
}

/// Rate-limit bucket for one client on one route family.
pub fn rate_limit_key(scope: &str, client: &str) -> String {
    format!("ratelimit:{}:{}", scope, client)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rate_limit_key_is_scoped() {
        assert_eq!(rate_limit_key("webhooks", "10.0.0.1"), "ratelimit:webhooks:10.0.0.1");
        assert_ne!(rate_limit_key("quotes", "a"), rate_limit_key("webhooks", "a"));
    }
}
