// tickr-backend/src/main.rs
mod config;
mod db;
mod error_handler;
mod handlers;
mod models;
pub mod schema;
mod services;
mod store;

use actix_cors::Cors;
use actix_web::{http::header, middleware::Logger, web, App, HttpResponse, HttpServer};
use config::AppConfig;
use db::DbPool;
use store::PgStore;

async fn health_check_handler(
    pool: web::Data<DbPool>,
) -> Result<HttpResponse, error_handler::ServiceError> {
    match pool.get().await {
        Ok(_conn) => Ok(HttpResponse::Ok().json(serde_json::json!({
            "status": "healthy",
            "message": "Backend is running and DB pool accessible"
        }))),
        Err(e) => {
            log::error!("Failed to get connection from pool: {:?}", e);
            Err(error_handler::ServiceError::InternalServerError(
                "Failed to check DB pool".to_string(),
            ))
        }
    }
}

#[actix_web::main]
async fn main() -> std::io::Result<()> {
    env_logger::init();

    if cfg!(debug_assertions) {
        match dotenvy::dotenv() {
            Ok(path) => log::info!(".env file loaded from path: {}", path.display()),
            Err(e) => log::warn!(
                "Could not load .env file: {}, using environment variables.",
                e
            ),
        }
    }

    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };

    let pool = match db::create_pool(&config.database_url, config.pool_size).await {
        Ok(pool) => pool,
        Err(e) => {
            log::error!("Failed to create database connection pool: {}", e);
            return Err(std::io::Error::other(e.to_string()));
        }
    };
    let store = PgStore::new(pool.clone());

    log::info!("🚀 Tickr Backend Service starting...");
    log::info!("Server will start at http://{}", config.bind_address());

    let frontend_url_prod = config.frontend_url_prod.clone();
    let frontend_url_dev = config.frontend_url_dev.clone();

    HttpServer::new(move || {
        let cors = Cors::default()
            .allowed_origin(&frontend_url_prod)
            .allowed_origin(&frontend_url_dev)
            .allowed_methods(vec!["GET", "POST", "PUT", "DELETE", "OPTIONS"])
            .allowed_headers(vec![header::ACCEPT, header::CONTENT_TYPE])
            .supports_credentials()
            .max_age(3600);

        App::new()
            .wrap(Logger::default())
            .wrap(cors)
            .app_data(error_handler::json_config())
            .app_data(error_handler::path_config())
            .app_data(error_handler::query_config())
            .app_data(web::Data::new(pool.clone()))
            .app_data(web::Data::new(store.clone()))
            .service(web::resource("/health").route(web::get().to(health_check_handler)))
            .service(
                web::scope("/tasks")
                    .service(handlers::task_handlers::create_task_handler)
                    .service(handlers::task_handlers::list_tasks_handler)
                    .service(handlers::task_handlers::get_task_handler)
                    .service(handlers::task_handlers::update_task_handler)
                    .service(handlers::task_handlers::delete_task_handler),
            )
            .service(
                web::scope("/habits")
                    .service(handlers::habit_handlers::create_habit_handler)
                    .service(handlers::habit_handlers::list_habits_handler)
                    .service(handlers::habit_handlers::get_habit_handler)
                    .service(handlers::habit_handlers::update_habit_handler)
                    .service(handlers::habit_handlers::delete_habit_handler),
            )
            .service(
                web::scope("/calendar")
                    .service(handlers::calendar_handlers::list_events_handler)
                    // Must precede /events/{id}
                    .service(handlers::calendar_handlers::list_events_in_range_handler)
                    .service(handlers::calendar_handlers::create_event_handler)
                    .service(handlers::calendar_handlers::get_event_handler)
                    .service(handlers::calendar_handlers::update_event_handler)
                    .service(handlers::calendar_handlers::delete_event_handler),
            )
            .service(
                web::scope("/pomodoro")
                    .service(handlers::pomodoro_handlers::create_pomodoro_session_handler)
                    .service(handlers::pomodoro_handlers::pomodoro_stats_handler)
                    .service(handlers::pomodoro_handlers::list_pomodoro_sessions_handler)
                    .service(handlers::pomodoro_handlers::clear_pomodoro_sessions_handler),
            )
            .service(
                web::scope("/productivity")
                    .service(handlers::productivity_handlers::dashboard_handler)
                    .service(handlers::productivity_handlers::start_focus_handler)
                    .service(handlers::productivity_handlers::complete_focus_handler)
                    .service(handlers::productivity_handlers::active_focus_handler)
                    .service(handlers::productivity_handlers::schedule_task_handler)
                    .service(handlers::productivity_handlers::schedule_habit_handler)
                    .service(handlers::productivity_handlers::weekly_analytics_handler),
            )
    })
    .bind(config.bind_address())?
    .run()
    .await
}
