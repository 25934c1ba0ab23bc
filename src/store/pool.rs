//! Small tokio-postgres connection pool. Idle clients are reused; closed ones are dropped.
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio_postgres::{Client, NoTls};

use crate::error::Result;

#[derive(Debug, Clone)]
pub struct PoolConfig {
    pub database_url: String,
    pub max_idle: usize,
}

impl PoolConfig {
    pub fn new(database_url: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            max_idle: 8,
        }
    }
}

pub struct Pool {
    config: PoolConfig,
    idle: Mutex<Vec<Client>>,
}

impl Pool {
    pub fn new(config: PoolConfig) -> Arc<Self> {
        Arc::new(Self {
            config,
            idle: Mutex::new(Vec::new()),
        })
    }

    fn idle(&self) -> MutexGuard<'_, Vec<Client>> {
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Get a database client, reconnecting if every idle one has gone away.
    pub async fn get(self: &Arc<Self>) -> Result<PooledClient> {
        loop {
            let candidate = self.idle().pop();
            match candidate {
                Some(client) if !client.is_closed() => {
                    return Ok(PooledClient {
                        client: Some(client),
                        pool: Arc::clone(self),
                    });
                }
                Some(_) => continue,
                None => break,
            }
        }

        let client = self.connect().await?;
        Ok(PooledClient {
            client: Some(client),
            pool: Arc::clone(self),
        })
    }

    /// Drops every idle connection.
    pub fn close(&self) {
        self.idle().clear();
    }

    async fn connect(&self) -> Result<Client> {
        let (client, connection) = tokio_postgres::connect(&self.config.database_url, NoTls).await?;

        // Spawn the connection handler
        tokio::spawn(async move {
            if let Err(e) = connection.await {
                tracing::error!("database connection error: {}", e);
            }
        });

        Ok(client)
    }

    fn release(&self, client: Client) {
        if client.is_closed() {
            return;
        }
        let mut idle = self.idle();
        if idle.len() < self.config.max_idle {
            idle.push(client);
        }
    }
}

/// A client checked out of the pool; returned on drop.
pub struct PooledClient {
    client: Option<Client>,
    pool: Arc<Pool>,
}

impl Deref for PooledClient {
    type Target = Client;

    fn deref(&self) -> &Client {
        self.client.as_ref().expect("client is present until drop")
    }
}

impl DerefMut for PooledClient {
    fn deref_mut(&mut self) -> &mut Client {
        self.client.as_mut().expect("client is present until drop")
    }
}

impl Drop for PooledClient {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            self.pool.release(client);
        }
    }
}
