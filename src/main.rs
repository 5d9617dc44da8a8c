use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use actix_web::{middleware, web, App, HttpServer};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use slotbook::{clock::SystemClock, config::Settings, db, effects, routes, state::AppState};

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(err) = run().await {
        eprintln!("Startup error: {err}");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .init();

    let settings = Settings::from_env()?;
    db::ensure_sqlite_dir(&settings.database_url)?;

    let connect_options = SqliteConnectOptions::from_str(&settings.database_url)?
        .create_if_missing(true)
        .busy_timeout(Duration::from_secs(5));

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(connect_options)
        .await?;

    db::run_migrations(&pool).await?;

    let port = settings.port;
    let state = AppState::new(pool, settings, Arc::new(SystemClock));
    let _subscribers = effects::start_subscribers(&state);

    let address = format!("0.0.0.0:{port}");
    log::info!("Starting slot service on http://{address}");

    HttpServer::new(move || {
        App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(routes::json_config())
            .app_data(routes::query_config())
            .wrap(middleware::Logger::default())
            .configure(routes::configure)
    })
    .bind(address)?
    .run()
    .await?;

    Ok(())
}
