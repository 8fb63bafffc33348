//! Document collections.
//!
//! A collection is a table `(id TEXT PRIMARY KEY, doc TEXT)` whose `doc`
//! column holds one JSON document per row. Secondary indexes are expression
//! indexes over `json_extract(doc, '$.<field>')`, named `<collection>_<field>_1`.
//!
//! Collection and field names are embedded into SQL text (expression indexes
//! only match literal paths), so both are validated against
//! `^[a-z_][a-z0-9_]*$` first. Values are always bound.

use super::database::Database;
use super::{DbError, DbResult, IndexFailure};
use log::{error, info};
use once_cell::sync::Lazy;
use regex::Regex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection, ErrorCode, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").expect("valid name regex"));

/// Secondary index definition over one top-level document field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexSpec {
    pub field: String,
    pub unique: bool,
}

impl IndexSpec {
    pub fn unique(field: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            unique: true,
        }
    }

    /// Index name within `collection`, e.g. `users_phone_1`.
    pub fn name_in(&self, collection: &str) -> String {
        format!("{collection}_{}_1", self.field)
    }
}

/// Handle to one collection, borrowed from a [`super::Session`].
pub struct Collection<'s> {
    conn: &'s Connection,
    db: &'s Database,
    name: String,
}

impl<'s> Collection<'s> {
    pub(crate) fn open(db: &'s Database, conn: &'s Connection, name: &str) -> DbResult<Self> {
        let name = validated_name(name)?;
        if !db.is_collection_ready(name) {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {name} (
                    id TEXT PRIMARY KEY NOT NULL,
                    doc TEXT NOT NULL CHECK (json_valid(doc))
                );"
            ))?;
            db.mark_collection_ready(name, true);
        }

        Ok(Self {
            conn,
            db,
            name: name.to_string(),
        })
    }

    /// Inserts one document under `id`.
    ///
    /// Unique index or primary key violations surface as
    /// [`DbError::DuplicateKey`].
    pub fn insert<T: Serialize>(&self, id: &str, doc: &T) -> DbResult<()> {
        let body = serde_json::to_string(doc)?;
        self.conn.execute(
            &format!("INSERT INTO {} (id, doc) VALUES (?1, ?2);", self.name),
            [id, body.as_str()],
        )?;
        Ok(())
    }

    pub fn find_by_id<T: DeserializeOwned>(&self, id: &str) -> DbResult<Option<T>> {
        let body: Option<String> = self
            .conn
            .query_row(
                &format!("SELECT doc FROM {} WHERE id = ?1;", self.name),
                [id],
                |row| row.get(0),
            )
            .optional()?;

        match body {
            Some(body) => Ok(Some(serde_json::from_str(&body)?)),
            None => Ok(None),
        }
    }

    /// Returns up to `limit` documents whose `field` equals `value`, oldest
    /// insert first.
    pub fn find_eq<T: DeserializeOwned>(
        &self,
        field: &str,
        value: &str,
        limit: u32,
    ) -> DbResult<Vec<T>> {
        let field = validated_name(field)?;
        let mut stmt = self.conn.prepare(&format!(
            "SELECT doc FROM {}
             WHERE json_extract(doc, '$.{field}') = ?1
             ORDER BY rowid ASC
             LIMIT ?2;",
            self.name
        ))?;
        let mut rows = stmt.query(rusqlite::params![value, i64::from(limit)])?;

        let mut docs = Vec::new();
        while let Some(row) = rows.next()? {
            let body: String = row.get(0)?;
            docs.push(serde_json::from_str(&body)?);
        }
        Ok(docs)
    }

    /// Overwrites the named top-level fields of the document `id` in one
    /// statement; other fields are left untouched.
    ///
    /// When `touch` is set, that field becomes
    /// `max(now, previous + 1)`, so it strictly increases on every call.
    ///
    /// Returns the number of matched documents (0 or 1).
    pub fn set_fields(
        &self,
        id: &str,
        fields: &[(&str, Value)],
        touch: Option<(&str, i64)>,
    ) -> DbResult<usize> {
        if fields.is_empty() && touch.is_none() {
            return Err(DbError::EmptyUpdate);
        }

        let mut assignments = Vec::with_capacity(fields.len() + 1);
        let mut bind_values = vec![SqlValue::Text(id.to_string())];

        for (field, value) in fields {
            let field = validated_name(field)?;
            bind_values.push(SqlValue::Text(serde_json::to_string(value)?));
            assignments.push(format!("'$.{field}', json(?{})", bind_values.len()));
        }

        if let Some((field, now)) = touch {
            let field = validated_name(field)?;
            bind_values.push(SqlValue::Integer(now));
            assignments.push(format!(
                "'$.{field}', max(?{}, coalesce(json_extract(doc, '$.{field}'), 0) + 1)",
                bind_values.len()
            ));
        }

        let changed = self.conn.execute(
            &format!(
                "UPDATE {} SET doc = json_set(doc, {}) WHERE id = ?1;",
                self.name,
                assignments.join(", ")
            ),
            params_from_iter(bind_values),
        )?;
        Ok(changed)
    }

    /// Creates the index if missing. Idempotent for an identical definition.
    ///
    /// # Errors
    /// - [`IndexFailure::Conflict`] when a same-named index differs in
    ///   uniqueness.
    /// - [`IndexFailure::DuplicateValues`] when existing documents violate a
    ///   requested unique constraint.
    pub fn ensure_index(&self, spec: &IndexSpec) -> DbResult<()> {
        let field = validated_name(&spec.field)?;
        let index = spec.name_in(&self.name);

        let existing: Option<bool> = self
            .conn
            .query_row(
                "SELECT \"unique\" FROM pragma_index_list(?1) WHERE name = ?2;",
                [self.name.as_str(), index.as_str()],
                |row| row.get(0),
            )
            .optional()?;

        if let Some(existing_unique) = existing {
            if existing_unique == spec.unique {
                info!(
                    "event=ensure_index module=db status=ok index={} created=false",
                    index
                );
                return Ok(());
            }
            error!(
                "event=ensure_index module=db status=error index={} error_code=index_conflict existing_unique={}",
                index, existing_unique
            );
            return Err(DbError::Index {
                index,
                failure: IndexFailure::Conflict { existing_unique },
            });
        }

        let unique = if spec.unique { "UNIQUE " } else { "" };
        let created = self.conn.execute_batch(&format!(
            "CREATE {unique}INDEX IF NOT EXISTS {index}
             ON {} (json_extract(doc, '$.{field}'));",
            self.name
        ));

        match created {
            Ok(()) => {
                info!(
                    "event=ensure_index module=db status=ok index={} created=true",
                    index
                );
                Ok(())
            }
            Err(err) => {
                let failure = if err.sqlite_error_code() == Some(ErrorCode::ConstraintViolation) {
                    IndexFailure::DuplicateValues(err)
                } else {
                    IndexFailure::Rejected(err)
                };
                error!(
                    "event=ensure_index module=db status=error index={} error={}",
                    index, failure
                );
                Err(DbError::Index { index, failure })
            }
        }
    }

    pub fn count(&self) -> DbResult<u64> {
        let count: i64 = self.conn.query_row(
            &format!("SELECT count(*) FROM {};", self.name),
            [],
            |row| row.get(0),
        )?;
        Ok(u64::try_from(count).unwrap_or_default())
    }

    /// Drops the collection with its documents and indexes.
    pub fn drop_collection(self) -> DbResult<()> {
        self.conn
            .execute_batch(&format!("DROP TABLE IF EXISTS {};", self.name))?;
        self.db.mark_collection_ready(&self.name, false);
        info!(
            "event=drop_collection module=db status=ok collection={}",
            self.name
        );
        Ok(())
    }
}

fn validated_name(name: &str) -> DbResult<&str> {
    if NAME_RE.is_match(name) {
        Ok(name)
    } else {
        Err(DbError::InvalidName(name.to_string()))
    }
}
