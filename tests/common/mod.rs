#![allow(dead_code)]

use std::collections::HashMap;

use nested_set::{NestedSetModel, NestedSetRepository};
use sea_orm::{
    ConnectOptions, ConnectionTrait, Database, DatabaseConnection, DbBackend, DbErr, EntityTrait,
    QueryOrder, Statement,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;

pub mod entity {
    pub mod category {
        use nested_set::NestedSetModelDerive as NestedSetModel;
        use sea_orm::entity::prelude::*;
        use serde::Serialize;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, NestedSetModel, Serialize)]
        #[sea_orm(table_name = "categories")]
        #[nested_set(entity_name = "Category")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub parent_id: Option<i32>,
            pub left: i32,
            pub right: i32,
            pub depth: i32,
            pub name: String,
            pub slug: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod menu {
        use nested_set::NestedSetModelDerive as NestedSetModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, NestedSetModel)]
        #[sea_orm(table_name = "menus")]
        #[nested_set(
            entity_name = "Menu",
            left_field = "lft",
            right_field = "rgt",
            depth_field = "level"
        )]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub parent_id: Option<i32>,
            pub lft: i32,
            pub rgt: i32,
            pub level: i32,
            pub title: String,
            pub url: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod organization {
        use nested_set::NestedSetModelDerive as NestedSetModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, NestedSetModel)]
        #[sea_orm(table_name = "organizations")]
        #[nested_set(
            entity_name = "Organization",
            lock_key = "organizations-tree",
            verify_writes = true
        )]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i32,
            pub parent_id: Option<i32>,
            pub left: i32,
            pub right: i32,
            pub depth: i32,
            pub name: String,
            pub code: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }

    pub mod comment {
        use nested_set::NestedSetModelDerive as NestedSetModel;
        use sea_orm::entity::prelude::*;

        #[derive(Clone, Debug, PartialEq, DeriveEntityModel, NestedSetModel)]
        #[sea_orm(table_name = "comments")]
        #[nested_set(entity_name = "Comment")]
        pub struct Model {
            #[sea_orm(primary_key)]
            pub id: i64,
            pub parent_id: Option<i64>,
            pub left: i32,
            pub right: i32,
            pub depth: i32,
            pub post_id: i32,
            pub body: String,
        }

        #[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
        pub enum Relation {}

        impl ActiveModelBehavior for ActiveModel {}
    }
}

/// Per-entity glue the shared scenarios need: table DDL, payload construction and a label.
pub trait Fixture: NestedSetModel + std::fmt::Debug {
    const DDL: &'static [&'static str];

    fn payload(label: &str) -> Self::ActiveModel;
    fn label(&self) -> String;
}

impl Fixture for entity::category::Model {
    const DDL: &'static [&'static str] = &[
        r#"
        CREATE TABLE categories (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER REFERENCES categories(id) ON DELETE CASCADE,
            "left" INTEGER NOT NULL,
            "right" INTEGER NOT NULL,
            depth INTEGER NOT NULL,
            name TEXT NOT NULL,
            slug TEXT NOT NULL
        );
        "#,
        r#"CREATE INDEX categories_bounds ON categories ("left", "right");"#,
    ];

    fn payload(label: &str) -> Self::ActiveModel {
        use sea_orm::ActiveValue::Set;
        entity::category::ActiveModel {
            name: Set(label.to_owned()),
            slug: Set(label.to_lowercase()),
            ..Default::default()
        }
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

impl Fixture for entity::menu::Model {
    const DDL: &'static [&'static str] = &[
        r#"
        CREATE TABLE menus (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER,
            lft INTEGER NOT NULL,
            rgt INTEGER NOT NULL,
            level INTEGER NOT NULL,
            title TEXT NOT NULL,
            url TEXT NOT NULL
        );
        "#,
        "CREATE INDEX menus_bounds ON menus (lft, rgt);",
    ];

    fn payload(label: &str) -> Self::ActiveModel {
        use sea_orm::ActiveValue::Set;
        entity::menu::ActiveModel {
            title: Set(label.to_owned()),
            url: Set(format!("/{}", label.to_lowercase())),
            ..Default::default()
        }
    }

    fn label(&self) -> String {
        self.title.clone()
    }
}

impl Fixture for entity::organization::Model {
    const DDL: &'static [&'static str] = &[
        r#"
        CREATE TABLE organizations (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER,
            "left" INTEGER NOT NULL,
            "right" INTEGER NOT NULL,
            depth INTEGER NOT NULL,
            name TEXT NOT NULL,
            code TEXT NOT NULL
        );
        "#,
        r#"CREATE INDEX organizations_bounds ON organizations ("left", "right");"#,
    ];

    fn payload(label: &str) -> Self::ActiveModel {
        use sea_orm::ActiveValue::Set;
        entity::organization::ActiveModel {
            name: Set(label.to_owned()),
            code: Set(format!("ORG-{label}")),
            ..Default::default()
        }
    }

    fn label(&self) -> String {
        self.name.clone()
    }
}

impl Fixture for entity::comment::Model {
    const DDL: &'static [&'static str] = &[
        r#"
        CREATE TABLE comments (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            parent_id INTEGER REFERENCES comments(id) ON DELETE CASCADE,
            "left" INTEGER NOT NULL,
            "right" INTEGER NOT NULL,
            depth INTEGER NOT NULL,
            post_id INTEGER NOT NULL,
            body TEXT NOT NULL
        );
        "#,
        r#"CREATE INDEX comments_bounds ON comments ("left", "right");"#,
    ];

    fn payload(label: &str) -> Self::ActiveModel {
        use sea_orm::ActiveValue::Set;
        entity::comment::ActiveModel {
            post_id: Set(1),
            body: Set(label.to_owned()),
            ..Default::default()
        }
    }

    fn label(&self) -> String {
        self.body.clone()
    }
}

/// Fresh in-memory SQLite database with the fixture's table created.
pub async fn setup_database<M: Fixture>() -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new("sqlite::memory:");
    options.max_connections(1).min_connections(1).sqlx_logging(false);
    create_tables::<M>(Database::connect(options).await?).await
}

/// SQLite database file at `path` behind a pool of `connections` handles.
pub async fn setup_file_database<M: Fixture>(
    path: &std::path::Path,
    connections: u32,
) -> Result<DatabaseConnection, DbErr> {
    let mut options = ConnectOptions::new(format!("sqlite://{}?mode=rwc", path.display()));
    options
        .max_connections(connections)
        .min_connections(connections)
        .sqlx_logging(false);
    create_tables::<M>(Database::connect(options).await?).await
}

async fn create_tables<M: Fixture>(db: DatabaseConnection) -> Result<DatabaseConnection, DbErr> {
    for ddl in M::DDL {
        db.execute(Statement::from_string(DbBackend::Sqlite, ddl.to_string()))
            .await?;
    }
    Ok(db)
}

/// `(label, left, right, depth)` for every row, in `left` order.
pub async fn snapshot<M: Fixture>(
    db: &DatabaseConnection,
) -> Result<Vec<(String, i32, i32, i32)>, DbErr> {
    let rows = M::Entity::find()
        .order_by_asc(M::left_column())
        .all(db)
        .await?;
    Ok(rows
        .iter()
        .map(|row| (row.label(), row.left(), row.right(), row.depth()))
        .collect())
}

pub fn expected(rows: &[(&str, i32, i32, i32)]) -> Vec<(String, i32, i32, i32)> {
    rows.iter()
        .map(|(label, left, right, depth)| (label.to_string(), *left, *right, *depth))
        .collect()
}

pub fn labels<M: Fixture>(rows: &[M]) -> Vec<String> {
    rows.iter().map(Fixture::label).collect()
}

/// `(row count, highest right bound)`; a move must leave both unchanged.
pub async fn extent<M: Fixture>(db: &DatabaseConnection) -> Result<(usize, i32), DbErr> {
    let rows = M::Entity::find().all(db).await?;
    let max_right = rows.iter().map(|row| row.right()).max().unwrap_or(0);
    Ok((rows.len(), max_right))
}

/// Builds `A -> (B -> D), C` and returns the ids by label.
///
/// ```text
/// A [1,8]
/// |-- B [2,5]
/// |   `-- D [3,4]
/// `-- C [6,7]
/// ```
pub async fn seed<M: Fixture>(
    db: &DatabaseConnection,
    repo: &NestedSetRepository<M>,
) -> Result<HashMap<&'static str, M::Id>, Box<dyn std::error::Error>> {
    let mut ids = HashMap::new();

    let a = repo.insert(db, M::payload("A"), None).await?;
    ids.insert("A", a.id());
    let b = repo.insert(db, M::payload("B"), Some(&a.id())).await?;
    ids.insert("B", b.id());
    let c = repo.insert(db, M::payload("C"), Some(&a.id())).await?;
    ids.insert("C", c.id());
    let d = repo.insert(db, M::payload("D"), Some(&b.id())).await?;
    ids.insert("D", d.id());

    Ok(ids)
}
