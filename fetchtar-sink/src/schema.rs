// SPDX-FileCopyrightText: 2026 fetchtar contributors
// SPDX-License-Identifier: MIT

//! Database schema definitions for durable sinks.

/// One row per stored block, keyed by its position in the archive.
pub const CHUNKS_SCHEMA_SQL: &str = r#"
create table if not exists chunks (
    position integer primary key not null,
    content  blob not null
);
"#;

/// Bookkeeping of durable stores that may outlive the run that created them.
pub const REGISTRY_SCHEMA_SQL: &str = r#"
create table if not exists stores (
    name      text primary key not null,
    last_used integer not null
);

create index if not exists IndexStoresLastUsed on stores(last_used);
"#;
