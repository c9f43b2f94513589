//! Destination tables: people, projects, ideas and tasks.
//!
//! Records are built in Rust (see [`DestinationRecord::from_fields`]) and
//! written here column for column, so the PostgreSQL and in-memory stores
//! apply identical defaults.

use async_trait::async_trait;
use sqlx::postgres::PgRow;
use sqlx::{PgConnection, Pool, Postgres, Row};
use uuid::Uuid;

use cerebro_core::{
    Category, DestinationRecord, DestinationRepository, Error, Idea, Person, Project, Result,
    Task,
};

use crate::rows::text_enum;

fn select_sql(category: Category, lock: bool) -> String {
    let columns = match category {
        Category::Person => {
            "id, owner_id, name, context, follow_ups, last_touched, created_at, updated_at"
        }
        Category::Project => {
            "id, owner_id, name, status, next_action, notes, created_at, updated_at"
        }
        Category::Idea => "id, owner_id, title, one_liner, notes, created_at, updated_at",
        Category::Task => {
            "id, owner_id, name, due_date, status, notes, completed_at, created_at, updated_at"
        }
    };
    format!(
        "SELECT {} FROM {} WHERE id = $1 AND owner_id = $2{}",
        columns,
        category.table(),
        if lock { " FOR UPDATE" } else { "" }
    )
}

fn parse_destination_row(category: Category, row: &PgRow) -> Result<DestinationRecord> {
    let record = match category {
        Category::Person => DestinationRecord::Person(Person {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            context: row.try_get("context")?,
            follow_ups: row.try_get("follow_ups")?,
            last_touched: row.try_get("last_touched")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }),
        Category::Project => DestinationRecord::Project(Project {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            status: text_enum(row, "status")?,
            next_action: row.try_get("next_action")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }),
        Category::Idea => DestinationRecord::Idea(Idea {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            title: row.try_get("title")?,
            one_liner: row.try_get("one_liner")?,
            notes: row.try_get("notes")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }),
        Category::Task => DestinationRecord::Task(Task {
            id: row.try_get("id")?,
            owner_id: row.try_get("owner_id")?,
            name: row.try_get("name")?,
            due_date: row.try_get("due_date")?,
            status: text_enum(row, "status")?,
            notes: row.try_get("notes")?,
            completed_at: row.try_get("completed_at")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        }),
    };
    Ok(record)
}

/// Fetch and row-lock a destination inside a transaction.
pub(crate) async fn fetch_for_update(
    conn: &mut PgConnection,
    owner_id: Uuid,
    category: Category,
    id: Uuid,
) -> Result<Option<DestinationRecord>> {
    let row = sqlx::query(&select_sql(category, true))
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *conn)
        .await
        .map_err(Error::Database)?;
    row.as_ref()
        .map(|r| parse_destination_row(category, r))
        .transpose()
}

/// Insert a freshly built destination record.
pub(crate) async fn insert_destination(
    conn: &mut PgConnection,
    record: &DestinationRecord,
) -> Result<()> {
    let query = match record {
        DestinationRecord::Person(p) => sqlx::query(
            "INSERT INTO people (id, owner_id, name, context, follow_ups, last_touched, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(p.id)
        .bind(p.owner_id)
        .bind(&p.name)
        .bind(&p.context)
        .bind(&p.follow_ups)
        .bind(p.last_touched)
        .bind(p.created_at)
        .bind(p.updated_at),
        DestinationRecord::Project(p) => sqlx::query(
            "INSERT INTO projects (id, owner_id, name, status, next_action, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)",
        )
        .bind(p.id)
        .bind(p.owner_id)
        .bind(&p.name)
        .bind(p.status.as_str())
        .bind(&p.next_action)
        .bind(&p.notes)
        .bind(p.created_at)
        .bind(p.updated_at),
        DestinationRecord::Idea(i) => sqlx::query(
            "INSERT INTO ideas (id, owner_id, title, one_liner, notes, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(i.id)
        .bind(i.owner_id)
        .bind(&i.title)
        .bind(&i.one_liner)
        .bind(&i.notes)
        .bind(i.created_at)
        .bind(i.updated_at),
        DestinationRecord::Task(t) => sqlx::query(
            "INSERT INTO tasks (id, owner_id, name, due_date, status, notes, completed_at, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(t.id)
        .bind(t.owner_id)
        .bind(&t.name)
        .bind(t.due_date)
        .bind(t.status.as_str())
        .bind(&t.notes)
        .bind(t.completed_at)
        .bind(t.created_at)
        .bind(t.updated_at),
    };
    query.execute(&mut *conn).await.map_err(Error::Database)?;
    Ok(())
}

/// Write back the mutable columns of an existing destination record.
pub(crate) async fn update_destination(
    conn: &mut PgConnection,
    record: &DestinationRecord,
) -> Result<()> {
    let query = match record {
        DestinationRecord::Person(p) => sqlx::query(
            "UPDATE people SET name = $3, context = $4, follow_ups = $5, last_touched = $6, updated_at = $7
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(p.id)
        .bind(p.owner_id)
        .bind(&p.name)
        .bind(&p.context)
        .bind(&p.follow_ups)
        .bind(p.last_touched)
        .bind(p.updated_at),
        DestinationRecord::Project(p) => sqlx::query(
            "UPDATE projects SET name = $3, status = $4, next_action = $5, notes = $6, updated_at = $7
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(p.id)
        .bind(p.owner_id)
        .bind(&p.name)
        .bind(p.status.as_str())
        .bind(&p.next_action)
        .bind(&p.notes)
        .bind(p.updated_at),
        DestinationRecord::Idea(i) => sqlx::query(
            "UPDATE ideas SET title = $3, one_liner = $4, notes = $5, updated_at = $6
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(i.id)
        .bind(i.owner_id)
        .bind(&i.title)
        .bind(&i.one_liner)
        .bind(&i.notes)
        .bind(i.updated_at),
        DestinationRecord::Task(t) => sqlx::query(
            "UPDATE tasks SET name = $3, due_date = $4, notes = $5, updated_at = $6
             WHERE id = $1 AND owner_id = $2",
        )
        .bind(t.id)
        .bind(t.owner_id)
        .bind(&t.name)
        .bind(t.due_date)
        .bind(&t.notes)
        .bind(t.updated_at),
    };
    let result = query.execute(&mut *conn).await.map_err(Error::Database)?;
    if result.rows_affected() == 0 {
        return Err(Error::NotFound(format!(
            "{} {}",
            record.category(),
            record.id()
        )));
    }
    Ok(())
}

/// PostgreSQL implementation of DestinationRepository.
pub struct PgDestinationRepository {
    pool: Pool<Postgres>,
}

impl PgDestinationRepository {
    pub fn new(pool: Pool<Postgres>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DestinationRepository for PgDestinationRepository {
    async fn fetch(
        &self,
        owner_id: Uuid,
        category: Category,
        id: Uuid,
    ) -> Result<Option<DestinationRecord>> {
        let row = sqlx::query(&select_sql(category, false))
            .bind(id)
            .bind(owner_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(Error::Database)?;
        row.as_ref()
            .map(|r| parse_destination_row(category, r))
            .transpose()
    }
}
