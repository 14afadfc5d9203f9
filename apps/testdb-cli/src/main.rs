use clap::{Parser, Subcommand, ValueEnum};
use db_test_utils::infra::db::sanitize_db_url;
use db_test_utils::{
    connect_raw, AdminService, DbTestUtil, EntitySet, OrmWrapper, RawConnection, SeaOrmDriver,
    TestDbConfig, TestDbError,
};
use migration::{migrate, MigrationCommand, Migrator};
use tracing::info;

#[derive(Clone, Copy, ValueEnum)]
enum MigrateCmd {
    Up,
    Down,
    Fresh,
    Reset,
    Refresh,
    Status,
}

impl From<MigrateCmd> for MigrationCommand {
    fn from(cmd: MigrateCmd) -> Self {
        match cmd {
            MigrateCmd::Up => MigrationCommand::Up,
            MigrateCmd::Down => MigrationCommand::Down,
            MigrateCmd::Fresh => MigrationCommand::Fresh,
            MigrateCmd::Reset => MigrationCommand::Reset,
            MigrateCmd::Refresh => MigrationCommand::Refresh,
            MigrateCmd::Status => MigrationCommand::Status,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Print the connection URL of a database
    Url {
        #[arg(long)]
        name: Option<String>,
    },
    /// Create a database if it does not exist
    Create { name: String },
    /// Drop a database, terminating its sessions first
    Drop { name: String },
    /// Create the database, then run pending migrations (or refresh the schema)
    Setup {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Empty every table of a schema, keeping the tables
    Teardown {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        schema: Option<String>,
    },
    /// Run a migration command against a database
    Migrate {
        #[arg(value_enum)]
        command: MigrateCmd,
        #[arg(long)]
        name: Option<String>,
    },
}

#[derive(Parser)]
#[command(name = "testdb")]
#[command(about = "Create, migrate, clear and drop throwaway PostgreSQL test databases")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .without_time()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_env_filter("db_test_utils=info,migration=info,testdb_cli=info,sqlx=warn")
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => e.exit(),
    };

    let config = match TestDbConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Invalid configuration: {e}");
            std::process::exit(2);
        }
    };

    if let Err(e) = run(args.command, config).await {
        eprintln!("testdb failed: {e}");
        std::process::exit(1);
    }
}

async fn run(command: Command, config: TestDbConfig) -> Result<(), TestDbError> {
    match command {
        Command::Url { name } => {
            println!("{}", config.database_url(name.as_deref()));
        }
        Command::Create { name } => {
            DbTestUtil::postgres(&config).create(&name).await?;
            info!(database = %name, "database ready");
        }
        Command::Drop { name } => {
            let util = DbTestUtil::postgres(&config);
            util.admin()
                .drop_database(&name, true)
                .await
                .map_err(|e| TestDbError::shutdown(format!("dropping database {name}"), e))?;
            info!(database = %name, "database dropped");
        }
        Command::Setup { name, schema } => {
            let url = config.database_url(name.as_deref());
            let mut wrapper =
                OrmWrapper::<SeaOrmDriver<Migrator>>::sea_orm(config, EntitySet::new())
                    .with_client_url(url);
            if let Some(schema) = schema {
                wrapper = wrapper.with_schema(schema);
            }
            wrapper.setup_database().await?;
            info!(
                url = %sanitize_db_url(wrapper.client_url()),
                schema = %wrapper.schema(),
                "database set up"
            );
            wrapper.close().await?;
        }
        Command::Teardown { name, schema } => {
            let url = config.database_url(name.as_deref());
            let conn = connect_raw(&url, None)
                .await
                .map_err(|e| TestDbError::provisioning("connecting for teardown", e))?;

            let mut util = DbTestUtil::postgres(&config);
            util.attach_connection(conn.clone());
            let result = util.teardown(schema.as_deref()).await;
            if let Err(e) = conn.destroy().await {
                tracing::warn!(error = %e, "closing teardown connection failed");
            }
            result?;
        }
        Command::Migrate { command, name } => {
            let url = config.database_url(name.as_deref());
            let conn = connect_raw(&url, None)
                .await
                .map_err(|e| TestDbError::provisioning("connecting for migrations", e))?;
            let result = migrate(conn.pool(), command.into())
                .await
                .map_err(|e| TestDbError::migration("running migration command", e));
            if let Err(e) = conn.destroy().await {
                tracing::warn!(error = %e, "closing migration connection failed");
            }
            result?;
        }
    }
    Ok(())
}
