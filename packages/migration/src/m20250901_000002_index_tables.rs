use sea_orm_migration::prelude::*;

#[derive(DeriveMigrationName)]
pub struct Migration;

// Declarative partitioning has no sea-query builder, so this migration is raw SQL.
const UP: [&str; 3] = [
    r#"CREATE TABLE IF NOT EXISTS "index_data" (
        "id" text NOT NULL,
        "name" text NOT NULL,
        "data" jsonb NOT NULL DEFAULT '{}'::jsonb,
        "created_at" timestamptz NOT NULL DEFAULT now(),
        PRIMARY KEY ("id", "name")
    ) PARTITION BY LIST ("name")"#,
    r#"CREATE TABLE IF NOT EXISTS "cat_1001" PARTITION OF "index_data" FOR VALUES IN ('product')"#,
    r#"CREATE TABLE IF NOT EXISTS "index_relation" (
        "id" bigserial PRIMARY KEY,
        "parent_id" text NOT NULL,
        "parent_name" text NOT NULL,
        "child_id" text NOT NULL,
        "child_name" text NOT NULL
    )"#,
];

const DOWN: [&str; 2] = [
    r#"DROP TABLE IF EXISTS "index_relation""#,
    // drops the cat_ partitions with it
    r#"DROP TABLE IF EXISTS "index_data" CASCADE"#,
];

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        for sql in UP {
            conn.execute_unprepared(sql).await?;
        }
        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        let conn = manager.get_connection();
        for sql in DOWN {
            conn.execute_unprepared(sql).await?;
        }
        Ok(())
    }
}
