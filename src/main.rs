use anyhow::{Context, Result};
use clap::Parser;
use pgrel::ast::{self, Dialect, OrderDirection};
use pgrel::schema::{Entity, EntityTypeBuilder, SchemaRegistry, ValueType};
use pgrel::{Configuration, Pool};
use std::path::PathBuf;

/// Render queries over a small blog schema, and optionally run them
#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Path to a TOML config file (defaults to the user config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Connection string; takes precedence over any config file
    #[arg(long, env = "PGREL_CONNECTION_STRING")]
    connection_string: Option<String>,

    /// Execute the entity query and print its rows as JSON
    #[arg(long)]
    execute: bool,
}

struct User;
struct Article;

impl Entity for User {
    fn describe(t: &mut EntityTypeBuilder<Self>) {
        t.property("id", "id", ValueType::PrimaryKey);
        t.property("email", "email", ValueType::Text);
        t.property("crypted_password", "crypted_password", ValueType::Text);
        t.has_many::<Article>("articles", "author_id");
    }
}

impl Entity for Article {
    fn describe(t: &mut EntityTypeBuilder<Self>) {
        t.property("id", "id", ValueType::PrimaryKey);
        t.property("title", "title", ValueType::Text);
        t.property("created_at", "created_at", ValueType::Timestamp);
        t.belongs_to::<User>("author", "author_id");
        t.property(
            "some_text",
            "some_text",
            ValueType::optional(ValueType::Text),
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup logging
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let registry = SchemaRegistry::global();
    registry.register::<User>()?;
    registry.register::<Article>()?;

    let config = resolve_config(&cli)?;
    let pool = match &config {
        Some(config) => Some(Pool::new(config).context("Failed to create connection pool")?),
        None => None,
    };

    let mut connection = None;
    if let Some(pool) = &pool {
        match pool.acquire().await {
            Ok(conn) => {
                println!(
                    "Connected to PostgreSQL database: {}@{} on {}",
                    conn.user(),
                    conn.database(),
                    conn.host()
                );
                connection = Some(conn);
            }
            Err(e) => {
                println!("Connection failed: {}", e);
                std::process::exit(1);
            }
        }
    }
    let dialect = connection
        .as_ref()
        .map(|c| c.dialect())
        .unwrap_or_else(Dialect::postgres);

    // Hand-written relational algebra over bare relation names.
    let query = ast::projection("articles")
        .filter(
            (ast::raw_column("articles", "title").like("%hej%")?
                & ast::raw_column("articles", "created_at").lt(ast::sql("localtime()"))?)
                | ast::raw_column("articles", "author_id").eq(ast::literal(5))?,
        )
        .left_join(
            "users",
            "article_author",
            ast::raw_column("article_author", "id").eq(ast::raw_column("articles", "author_id"))?,
        )?
        .order(ast::raw_column("articles", "created_at"))
        .reverse_order()?;
    println!("SQL:\n{}\n", ast::compile(&query, &dialect)?);

    let article = registry.lookup::<Article>()?;
    println!("TYPE: {}\nRELATION: {}", article.name, article.relation);
    for property in &article.properties {
        println!("- {} {}", property.value_type, property.column);
    }
    for association in &article.associations {
        println!("@ [{}] {}", association.target.name, association.foreign_key);
    }

    // The same query, typed against the registered entity.
    let articles = registry
        .from::<Article>()?
        .select_entity()?
        .filter(
            (ast::column(&article, "title")?.like("%hej%")?
                & ast::column(&article, "created_at")?.lt(ast::sql("localtime()"))?)
                | ast::column(&article, "author")?.eq(5)?,
        )
        .left_join_association(registry, "author")?
        .order_by(
            ast::column(&article, "created_at")?,
            OrderDirection::Descending,
        );
    println!("SQL2:\n{}", ast::compile(&articles, &dialect)?);

    if let Some(mut conn) = connection {
        if cli.execute {
            let rs = conn.execute_query(&articles).await?;
            println!(
                "{} row(s) in {:?}",
                rs.height(),
                rs.execution_time()
            );
            println!("{}", serde_json::to_string_pretty(&rs.to_json())?);
        }
    }

    Ok(())
}

/// An explicit `--config` must load; the default location is optional.
fn resolve_config(cli: &Cli) -> Result<Option<Configuration>> {
    if let Some(path) = &cli.config {
        let mut config = Configuration::load(path)?;
        if let Some(connection_string) = &cli.connection_string {
            config.connection_string = connection_string.clone();
        }
        return Ok(Some(config));
    }
    if let Some(connection_string) = &cli.connection_string {
        return Ok(Some(Configuration::new(connection_string.clone())));
    }
    let path = Configuration::default_path();
    if path.exists() {
        return Configuration::load(&path).map(Some);
    }
    tracing::debug!("no configuration found, rendering only");
    Ok(None)
}
