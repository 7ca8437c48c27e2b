// ABOUTME: SQLite persistence layer with explicit schema migration and typed accessors
// ABOUTME: Organized by domain - athletes, ingested activities, webhook dead letters
//
// SPDX-License-Identifier: MIT OR Apache-2.0
// Copyright (c) 2025 GoFast

//! Database layer.
//!
//! A thin, explicitly-constructed handle around a `sqlx` pool. The handle
//! is cheap to clone and injected into services - there is no module-level
//! client singleton. Domain-specific operations live in the submodules and
//! extend [`Database`] via `impl` blocks.

mod activities;
mod athletes;
mod dead_letters;

pub use athletes::GarminTokenUpdate;

use crate::errors::AppResult;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use tracing::info;

/// Database handle wrapping a connection pool
#[derive(Clone)]
pub struct Database {
    pub(crate) pool: SqlitePool,
}

impl Database {
    /// Connect to the database and run migrations
    ///
    /// # Errors
    ///
    /// Returns an error if the connection or any migration fails.
    pub async fn new(database_url: &str) -> AppResult<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect(database_url)
            .await?;

        let db = Self { pool };
        db.migrate().await?;
        info!("database ready at {database_url}");
        Ok(db)
    }

    /// Verify the pool can execute a statement
    ///
    /// # Errors
    ///
    /// Returns an error if the round trip fails.
    pub async fn health_check(&self) -> AppResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    /// Create all tables and indexes
    async fn migrate(&self) -> AppResult<()> {
        self.migrate_athletes().await?;
        self.migrate_activities().await?;
        self.migrate_dead_letters().await?;
        Ok(())
    }
}
