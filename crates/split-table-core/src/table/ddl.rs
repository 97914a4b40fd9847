//! DDL generation and schema sync for a physical table.
//!
//! Sync is additive: missing tables are created, missing columns are added
//! and missing indexes are built. Nothing is ever dropped or retyped.

use snafu::prelude::*;

use crate::{
    table::{EngineSnafu, OutOfSyncSnafu, TableResult, TableSpec},
    value::{quote_identifier, quote_literal},
};

impl TableSpec {
    /// Statements creating the table from scratch, including its indexes
    /// and, when an auto-increment offset above 1 is configured, the seed
    /// row in `sqlite_sequence` that makes the first key equal the offset.
    pub fn create_sql(&self) -> Vec<String> {
        let keys: Vec<_> = self.columns().iter().filter(|c| c.primary).collect();
        let inline_key = keys.len() == 1 && keys[0].auto_increment;

        let mut defs: Vec<String> = self
            .columns()
            .iter()
            .map(|c| c.definition_sql(inline_key && c.primary))
            .collect();
        if !inline_key && !keys.is_empty() {
            let names: Vec<String> = keys.iter().map(|c| quote_identifier(&c.name)).collect();
            defs.push(format!("PRIMARY KEY ({})", names.join(", ")));
        }

        let mut stmts = vec![format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            self.expression(),
            defs.join(", ")
        )];
        stmts.extend(self.indexes().iter().map(|idx| idx.create_sql(self.name())));
        if let Some(seed) = self.sequence_seed_sql() {
            stmts.push(seed);
        }
        stmts
    }

    fn sequence_seed_sql(&self) -> Option<String> {
        let offset = self.auto_increment_offset()?;
        if offset <= 1 || self.auto_increment_column().is_none() {
            return None;
        }
        let name = quote_literal(self.name());
        Some(format!(
            "INSERT INTO sqlite_sequence (name, seq) SELECT {name}, {} \
             WHERE NOT EXISTS (SELECT 1 FROM sqlite_sequence WHERE name = {name})",
            offset - 1
        ))
    }

    /// Statements needed to bring the live table in line with the declared layout.
    /// Empty when already in sync.
    pub async fn sync_sql(&self) -> TableResult<Vec<String>> {
        let existing = self
            .engine()
            .describe_columns(self.name())
            .await
            .context(EngineSnafu { table: self.name() })?;
        let Some(existing) = existing else {
            return Ok(self.create_sql());
        };

        let mut stmts = Vec::new();
        for column in self.columns() {
            if !existing
                .iter()
                .any(|c| c.name.eq_ignore_ascii_case(&column.name))
            {
                stmts.push(format!(
                    "ALTER TABLE {} ADD COLUMN {}",
                    self.expression(),
                    column.add_column_sql()
                ));
            }
        }

        let index_names = self
            .engine()
            .index_names(self.name())
            .await
            .context(EngineSnafu { table: self.name() })?;
        for index in self.indexes() {
            let name = index.name(self.name());
            if !index_names.iter().any(|n| n.eq_ignore_ascii_case(&name)) {
                stmts.push(index.create_sql(self.name()));
            }
        }
        Ok(stmts)
    }

    /// Error with the pending statements when the table is out of sync.
    pub async fn check_sync(&self) -> TableResult<()> {
        let statements = self.sync_sql().await?;
        ensure!(
            statements.is_empty(),
            OutOfSyncSnafu {
                table: self.name(),
                statements,
            }
        );
        Ok(())
    }

    /// Apply [`TableSpec::sync_sql`].
    pub async fn sync(&self) -> TableResult<()> {
        for sql in self.sync_sql().await? {
            self.engine()
                .execute(&sql, &[])
                .await
                .context(EngineSnafu { table: self.name() })?;
        }
        Ok(())
    }
}
