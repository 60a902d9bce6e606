use crate::cache::CacheSettings;
use crate::fanout::{DispatchMode, QueueSettings};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;
use wide_column::TableNamespace;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub cache: FeedCacheConfig,
    pub pagination: PaginationConfig,
    pub fanout: FanoutConfig,
    pub wide_column: WideColumnConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub env: String,
    pub host: String,
    pub port: u16,
}

impl AppConfig {
    pub fn is_production(&self) -> bool {
        self.env == "production"
    }

    pub fn is_test(&self) -> bool {
        self.env == "test"
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    /// Upper bound for every single cache call
    pub op_timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedCacheConfig {
    /// Max entries kept per cached list
    pub list_limit: usize,
    pub ttl_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaginationConfig {
    pub page_size: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    pub batch_size: usize,
    pub workers: usize,
    pub queue_capacity: usize,
    pub max_attempts: u32,
    pub retry_backoff_ms: u64,
    /// Run batches inline instead of on background workers
    pub eager: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WideColumnConfig {
    /// Empty in production
    pub table_prefix: String,
}

impl Config {
    pub fn from_env() -> Result<Self, Box<dyn std::error::Error>> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());
        let is_test = env == "test";
        let is_production = env == "production";

        Ok(Config {
            app: AppConfig {
                env,
                host: std::env::var("APP_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("APP_PORT", 8000)?,
            },
            database: DatabaseConfig {
                url: std::env::var("DATABASE_URL")?,
                max_connections: env_or("DATABASE_MAX_CONNECTIONS", 10)?,
                connect_timeout_secs: env_or("DATABASE_CONNECT_TIMEOUT_SECS", 5)?,
            },
            redis: RedisConfig {
                url: std::env::var("REDIS_URL")
                    .unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string()),
                op_timeout_ms: env_or("REDIS_OP_TIMEOUT_MS", 200)?,
            },
            cache: FeedCacheConfig {
                list_limit: env_or("FEED_CACHE_LIST_LIMIT", default_list_limit(is_test))?,
                ttl_secs: env_or("FEED_CACHE_TTL_SECS", 7 * 24 * 60 * 60)?,
            },
            pagination: PaginationConfig {
                page_size: env_or("FEED_PAGE_SIZE", 20)?,
            },
            fanout: FanoutConfig {
                batch_size: env_or("FANOUT_BATCH_SIZE", 1000)?,
                workers: env_or("FANOUT_WORKERS", 4)?,
                queue_capacity: env_or("FANOUT_QUEUE_CAPACITY", 1024)?,
                max_attempts: env_or("FANOUT_MAX_ATTEMPTS", 3)?,
                retry_backoff_ms: env_or("FANOUT_RETRY_BACKOFF_MS", 200)?,
                eager: env_or("FANOUT_EAGER", false)?,
            },
            wide_column: WideColumnConfig {
                table_prefix: std::env::var("WIDE_COLUMN_TABLE_PREFIX").unwrap_or_else(|_| {
                    if is_production {
                        String::new()
                    } else {
                        "test_".to_string()
                    }
                }),
            },
        })
    }

    pub fn cache_settings(&self) -> CacheSettings {
        CacheSettings {
            capacity: self.cache.list_limit,
            ttl: Duration::from_secs(self.cache.ttl_secs),
            op_timeout: Duration::from_millis(self.redis.op_timeout_ms),
        }
    }

    pub fn queue_settings(&self) -> QueueSettings {
        QueueSettings {
            mode: if self.fanout.eager {
                DispatchMode::Eager
            } else {
                DispatchMode::Background
            },
            workers: self.fanout.workers.max(1),
            capacity: self.fanout.queue_capacity.max(1),
            max_attempts: self.fanout.max_attempts.max(1),
            retry_backoff: Duration::from_millis(self.fanout.retry_backoff_ms),
        }
    }

    pub fn table_namespace(&self) -> TableNamespace {
        if self.wide_column.table_prefix.is_empty() {
            TableNamespace::Production
        } else {
            TableNamespace::Prefixed(self.wide_column.table_prefix.clone())
        }
    }
}

fn default_list_limit(is_test: bool) -> usize {
    if is_test {
        20
    } else {
        1000
    }
}

fn env_or<T>(name: &str, default: T) -> Result<T, Box<dyn std::error::Error>>
where
    T: FromStr,
    T::Err: std::error::Error + 'static,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|e: T::Err| format!("{}: {}", name, e).into()),
        Err(_) => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Config {
        Config {
            app: AppConfig {
                env: "test".into(),
                host: "127.0.0.1".into(),
                port: 8000,
            },
            database: DatabaseConfig {
                url: "postgres://localhost/feed".into(),
                max_connections: 5,
                connect_timeout_secs: 5,
            },
            redis: RedisConfig {
                url: "redis://127.0.0.1:6379".into(),
                op_timeout_ms: 200,
            },
            cache: FeedCacheConfig {
                list_limit: default_list_limit(true),
                ttl_secs: 60,
            },
            pagination: PaginationConfig { page_size: 20 },
            fanout: FanoutConfig {
                batch_size: 1000,
                workers: 0,
                queue_capacity: 16,
                max_attempts: 3,
                retry_backoff_ms: 10,
                eager: true,
            },
            wide_column: WideColumnConfig {
                table_prefix: "test_".into(),
            },
        }
    }

    #[test]
    fn test_list_limit_is_small_in_test_env() {
        assert_eq!(default_list_limit(true), 20);
        assert_eq!(default_list_limit(false), 1000);
    }

    #[test]
    fn test_derived_settings() {
        let config = base();
        assert_eq!(config.cache_settings().capacity, 20);
        assert_eq!(
            config.cache_settings().op_timeout,
            Duration::from_millis(200)
        );

        let queue = config.queue_settings();
        assert_eq!(queue.mode, DispatchMode::Eager);
        assert_eq!(queue.workers, 1);

        assert_eq!(
            config.table_namespace(),
            TableNamespace::Prefixed("test_".into())
        );
    }

    #[test]
    fn test_empty_prefix_means_production_namespace() {
        let mut config = base();
        config.wide_column.table_prefix.clear();
        assert_eq!(config.table_namespace(), TableNamespace::Production);
    }
}
