use std::{path::PathBuf, sync::Arc};

use serde::Deserialize;

use crate::{EventStore, MemoryEventStore, SqliteEventStore};

/// Selects the backing store at runtime.
///
/// SQLite database (production):
/// ```ron
/// Pixelpost (
///     store: Sqlite(path: "/var/lib/pixelpost/queue.db"),
/// )
/// ```
///
/// Memory store, optionally bounded:
/// ```ron
/// Pixelpost (
///     store: Memory(capacity: Some(1000)),
/// )
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub enum StoreConfig {
    Sqlite {
        #[serde(default = "default_path")]
        path: PathBuf,
    },
    Memory {
        #[serde(default)]
        capacity: Option<usize>,
    },
}

fn default_path() -> PathBuf {
    PathBuf::from("./pixelpost.db")
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::Sqlite {
            path: default_path(),
        }
    }
}

impl StoreConfig {
    /// Open the configured store as a trait object.
    pub async fn open(self) -> crate::Result<Arc<dyn EventStore>> {
        match self {
            Self::Sqlite { path } => Ok(Arc::new(SqliteEventStore::open(path).await?)),
            Self::Memory { capacity } => Ok(capacity.map_or_else(
                || Arc::new(MemoryEventStore::new()) as Arc<dyn EventStore>,
                |capacity| Arc::new(MemoryEventStore::with_capacity(capacity)),
            )),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn parses_sqlite_config() {
        let config: StoreConfig =
            ron::from_str(r#"Sqlite(path: "/tmp/queue.db")"#).expect("parse");
        assert_eq!(
            config,
            StoreConfig::Sqlite {
                path: PathBuf::from("/tmp/queue.db")
            }
        );
    }

    #[test]
    fn parses_memory_config() {
        let config: StoreConfig = ron::from_str("Memory(capacity: Some(5))").expect("parse");
        assert_eq!(config, StoreConfig::Memory { capacity: Some(5) });
    }

    #[tokio::test]
    async fn opens_memory_store() {
        let store = StoreConfig::Memory { capacity: None }
            .open()
            .await
            .expect("open");
        assert_eq!(store.count().await.expect("count"), 0);
    }
}
